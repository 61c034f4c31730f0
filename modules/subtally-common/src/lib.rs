pub mod config;
pub mod error;
pub mod types;

pub use config::{EnvConfig, PollConfig, ProxyConfig, UserConfig};
pub use error::{Result, SubtallyError};
pub use types::*;
