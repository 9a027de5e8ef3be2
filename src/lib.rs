#![forbid(unsafe_code)]

pub mod channel;
pub mod config;
pub mod error;
pub mod fmi2;
pub mod fmi3;
pub mod snapshot;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the types a backend embedder touches most.
pub use channel::{CommandChannel, HandshakeReply, HandshakeStatus, WireFormat};
pub use config::BackendConfig;
