use thiserror::Error;

pub type Result<T> = std::result::Result<T, SubtallyError>;

#[derive(Error, Debug)]
pub enum SubtallyError {
    #[error("Channel already tracked: {0}")]
    DuplicateChannel(String),

    #[error("Channel not tracked: {0}")]
    UnknownChannel(String),

    #[error("Invalid compare pair: a channel cannot be compared with itself ({0})")]
    InvalidPair(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
