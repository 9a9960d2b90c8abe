use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

/// Faults a page driver cannot turn into "no data" / "no next page".
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Driver setup failed: {0}")]
    Setup(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Unreadable table data: {0}")]
    Decode(String),
}

impl DriverError {
    /// Worth another attempt: network hiccups, throttling, server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::Network(_) => true,
            DriverError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DriverError::Decode(err.to_string())
        } else {
            DriverError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Decode(err.to_string())
    }
}
