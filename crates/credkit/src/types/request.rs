use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body POSTed to the authority's `/sign` endpoint.
///
/// Built by [`crate::request::build_sign_request`]; fields are read-only so a
/// request is sent exactly as it was built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningRequest {
    pub(crate) key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) validity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) valid_until: Option<DateTime<Utc>>,
    pub(crate) version: String,
}

impl SigningRequest {
    /// The public key as supplied by the caller (authorized_keys format).
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn validity(&self) -> Option<&str> {
        self.validity.as_deref()
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Raw `{status, response}` envelope as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: String,
    pub response: String,
}

impl ResponseEnvelope {
    pub fn ok(certificate: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            response: certificate.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            response: message.into(),
        }
    }
}

/// Decoded authority outcome. The status tag decides which branch the
/// payload belongs to; anything other than `"ok"` is a rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignResponse {
    /// OpenSSH certificate text.
    Ok(String),
    /// Authority diagnostic, opaque to the client.
    Error(String),
}

impl From<ResponseEnvelope> for SignResponse {
    fn from(env: ResponseEnvelope) -> Self {
        if env.status == STATUS_OK {
            SignResponse::Ok(env.response)
        } else {
            SignResponse::Error(env.response)
        }
    }
}
