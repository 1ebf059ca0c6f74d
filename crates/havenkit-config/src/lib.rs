//! Configuration management for the HavenKit console
//!
//! Owns the server's own configuration ([`ServerConfig`]) and the relay's
//! on-disk configuration files (the `.env` file and the relay-list JSON
//! files) through [`ConfigService`].

pub mod handler;
pub mod plugin;
pub mod service;

pub use plugin::ConfigPlugin;
pub use service::{ConfigService, ConfigServiceError, RelayListKind, ServerConfig};
