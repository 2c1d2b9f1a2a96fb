use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::request::parse_duration;

/// Client settings, loadable from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the signing authority.
    pub ca: String,
    /// Requested certificate lifetime (e.g. `24h`). Authority default when unset.
    pub validity: Option<String>,
    /// Disable TLS certificate verification. Never on unless asked for.
    pub skip_tls_verify: bool,
    /// Directory to write credential files into. Nothing is written when unset.
    pub prefix: Option<PathBuf>,
    /// Principal to request the certificate for.
    pub principal: Option<String>,
    /// Bearer token for the authority.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl ClientConfig {
    pub fn new(ca: impl Into<String>) -> Self {
        Self {
            ca: ca.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Check that the settings can drive a signing request.
    pub fn validate(&self) -> Result<(), Error> {
        if self.ca.is_empty() {
            return Err(Error::InvalidInput("authority URL is not set".to_string()));
        }
        if !(self.ca.starts_with("https://") || self.ca.starts_with("http://")) {
            return Err(Error::InvalidInput(format!(
                "authority URL '{}' must be http(s)",
                self.ca
            )));
        }
        if let Some(v) = &self.validity {
            parse_duration(v)?;
        }
        Ok(())
    }

    /// Prefix as a path, empty when persistence is off.
    pub fn prefix_path(&self) -> &Path {
        self.prefix.as_deref().unwrap_or(Path::new(""))
    }
}
