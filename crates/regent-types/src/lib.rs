//! Foundation types for the Regent administrative console.
//!
//! Shared by every Regent crate: the error type, output severity levels, and
//! the TOML configuration model.

pub mod config;
pub mod error;
pub mod level;

pub use config::{ConsoleConfig, Credentials, Frontend, RegentConfig, RemoteConfig};
pub use error::{RegentError, Result};
pub use level::OutputLevel;
