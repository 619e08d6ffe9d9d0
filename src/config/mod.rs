//! Configuration loading and management.
//!
//! - [`types`]: config struct definitions and loading
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup checks that report every problem at once

mod defaults;
mod types;
pub mod validation;

pub use types::{
    BotConfig, Config, ConfigError, IdentityConfig, ModuleConfig, RuntimeConfig, ServerConfig,
};
