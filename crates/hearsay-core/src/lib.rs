pub mod config;
pub mod error;
pub mod types;

pub use config::{AudioConfig, ClientConfig, GeneralConfig, ServiceConfig};
pub use error::{AudioError, ConfigError, InitError, QueryError};
pub use types::{AudioChunk, AudioFeed, AudioFormat, AudioStream};
