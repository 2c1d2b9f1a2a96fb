use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The authority answered but declined to sign. The message is the
    /// authority's payload, untouched.
    #[error("Authority rejected request: {0}")]
    AuthorityRejected(String),

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    #[error("Certificate has no key identifier or key")]
    KeyRequired,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Certificate expired at {0}")]
    CertificateExpired(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The underlying filesystem error kind, if this is an IO failure.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Error::Io(e) => Some(e.kind()),
            _ => None,
        }
    }
}

#[cfg(feature = "fetch")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<p256::pkcs8::Error> for Error {
    fn from(err: p256::pkcs8::Error) -> Self {
        Error::InvalidKey(err.to_string())
    }
}
