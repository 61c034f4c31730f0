use thiserror::Error;

pub type Result<T> = std::result::Result<T, SubcountError>;

#[derive(Debug, Error)]
pub enum SubcountError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SubcountError {
    fn from(err: reqwest::Error) -> Self {
        SubcountError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SubcountError {
    fn from(err: serde_json::Error) -> Self {
        SubcountError::Parse(err.to_string())
    }
}
