//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::error::InvalidModuleDescriptor;
use slircbot_proto::ChannelExt;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.address must be host:port, got '{0}'")]
    InvalidAddress(String),
    #[error("identity.nick is required")]
    MissingNick,
    #[error("identity.nick may not contain spaces or start with ':' or '#', got '{0}'")]
    InvalidNick(String),
    #[error("bot.queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("runtime.fuel must be at least 1")]
    ZeroFuel,
    #[error("restrictions key is not a channel name: '{0}'")]
    NotAChannel(String),
    #[error("bot.module_dir does not exist: {0}")]
    ModuleDirNotFound(String),
    #[error("module '{0}' is configured more than once")]
    DuplicateModule(String),
    #[error(transparent)]
    Module(#[from] InvalidModuleDescriptor),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Connection
    let address = &config.server.address;
    let port_ok = address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if !port_ok {
        errors.push(ValidationError::InvalidAddress(address.clone()));
    }

    // Identity
    let nick = &config.identity.nick;
    if nick.is_empty() {
        errors.push(ValidationError::MissingNick);
    } else if nick.contains(' ') || nick.starts_with(':') || nick.is_channel_name() {
        errors.push(ValidationError::InvalidNick(nick.clone()));
    }

    if config.bot.queue_capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }
    if config.runtime.fuel == 0 {
        errors.push(ValidationError::ZeroFuel);
    }

    for channel in config.restrictions.keys() {
        if !channel.is_channel_name() {
            errors.push(ValidationError::NotAChannel(channel.clone()));
        }
    }

    // Modules
    let has_wasm = config
        .modules
        .iter()
        .any(|m| m.enabled && m.runtime == crate::modules::RuntimeKind::Wasm);
    if has_wasm && !Path::new(&config.bot.module_dir).is_dir() {
        errors.push(ValidationError::ModuleDirNotFound(config.bot.module_dir.clone()));
    }

    let mut seen = HashSet::new();
    for module in &config.modules {
        if !seen.insert(module.name.as_str()) {
            errors.push(ValidationError::DuplicateModule(module.name.clone()));
        }
        if let Err(e) = module.to_descriptor(&config.bot.command_prefix) {
            errors.push(e.into());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[server]
address = "127.0.0.1:6667"

[identity]
nick = "slircbot"

[[module]]
name = "core"
runtime = "builtin"
trust = "core"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_address_and_nick_fail() {
        let toml = r##"
[server]
address = "localhost"

[identity]
nick = "#bot"
"##;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidAddress(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidNick(_))));
    }

    #[test]
    fn test_collects_every_error() {
        let toml = r#"
[server]
address = "127.0.0.1:6667"

[identity]
nick = ""

[bot]
queue_capacity = 0
module_dir = "/nonexistent/slircbot/modules"

[restrictions]
lobby = "voice"

[[module]]
name = "echo"
path = "echo.wasm"

[[module]]
name = "echo"
path = "echo2.wasm"

[[module]]
name = "broken"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingNick)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroQueueCapacity)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::NotAChannel(c) if c == "lobby")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ModuleDirNotFound(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateModule(n) if n == "echo")));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::Module(InvalidModuleDescriptor::MissingPath(n)) if n == "broken"
        )));
    }
}
