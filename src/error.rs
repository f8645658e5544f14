use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Server identity mismatch: expected {expected:?}, peer presented {found:?}")]
    IdentityMismatch { expected: String, found: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Burp server reported an error: {0}")]
    ServerError(String),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
