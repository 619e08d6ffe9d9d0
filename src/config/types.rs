//! Core configuration types and loading.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

use super::defaults::{
    default_command_prefix, default_fuel, default_ident, default_max_line_length,
    default_max_memory_mb, default_metrics_bind, default_module_dir, default_queue_capacity,
    default_realname, default_true,
};
use crate::error::InvalidModuleDescriptor;
use crate::modules::{ModuleDescriptor, PermissionOverrides, RuntimeKind, TrustTier, WasmLimits};
use crate::state::{BotIdentity, ChannelRole};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server to connect to.
    pub server: ServerConfig,
    /// Nick, ident and realname.
    pub identity: IdentityConfig,
    #[serde(default)]
    pub bot: BotConfig,
    /// WASM resource limits.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Minimum role required to trigger module commands, per channel.
    ///
    /// ```toml
    /// [restrictions]
    /// "#ops" = "moderator"
    /// ```
    #[serde(default)]
    pub restrictions: HashMap<String, ChannelRole>,
    /// Modules, loaded in the order listed.
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Descriptors for every enabled module, in configured order.
    pub fn module_descriptors(&self) -> Result<Vec<ModuleDescriptor>, InvalidModuleDescriptor> {
        self.modules
            .iter()
            .filter(|m| m.enabled)
            .map(|m| m.to_descriptor(&self.bot.command_prefix))
            .collect()
    }
}

/// Upstream server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` to connect to.
    pub address: String,
    /// Connection password (PASS), if the server requires one.
    pub password: Option<String>,
    /// Longest line accepted from the server.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub nick: String,
    #[serde(default = "default_ident")]
    pub ident: String,
    #[serde(default = "default_realname")]
    pub realname: String,
}

impl IdentityConfig {
    pub fn to_identity(&self) -> BotIdentity {
        BotIdentity {
            nick: self.nick.clone(),
            ident: self.ident.clone(),
            realname: self.realname.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Command prefix for modules that don't set their own.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Base directory for relative module paths.
    #[serde(default = "default_module_dir")]
    pub module_dir: String,
    /// Outbound command queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Prometheus metrics HTTP port. Disabled when unset.
    pub metrics_port: Option<u16>,
    #[serde(default = "default_metrics_bind")]
    pub metrics_bind: IpAddr,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            module_dir: default_module_dir(),
            queue_capacity: default_queue_capacity(),
            metrics_port: None,
            metrics_bind: default_metrics_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Fuel granted per WASM execution.
    #[serde(default = "default_fuel")]
    pub fuel: u64,
    /// Linear memory cap per WASM module, in MiB.
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fuel: default_fuel(),
            max_memory_mb: default_max_memory_mb(),
        }
    }
}

impl RuntimeConfig {
    pub fn limits(&self) -> WasmLimits {
        WasmLimits {
            fuel: self.fuel,
            max_memory_mb: self.max_memory_mb,
        }
    }
}

/// One `[[module]]` block.
///
/// ```toml
/// [[module]]
/// name = "greeter"
/// path = "greeter.wasm"
/// trust = "plugin"
/// permissions = { writer = true }
/// settings = { greeting = "hi" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Source file for WASM modules. Builtins default to their own name.
    pub path: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeKind,
    /// Overrides `bot.command_prefix`.
    pub command_prefix: Option<String>,
    #[serde(default)]
    pub trust: TrustTier,
    #[serde(default)]
    pub permissions: PermissionOverrides,
    #[serde(default)]
    pub settings: toml::Table,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ModuleConfig {
    pub fn to_descriptor(&self, default_prefix: &str) -> Result<ModuleDescriptor, InvalidModuleDescriptor> {
        let path = match (&self.path, self.runtime) {
            (Some(path), _) => path.as_str(),
            (None, RuntimeKind::Builtin) => self.name.as_str(),
            (None, RuntimeKind::Wasm) => "",
        };
        Ok(ModuleDescriptor::new(&self.name, path)?
            .with_description(self.description.clone())
            .with_runtime(self.runtime)
            .with_command_prefix(self.command_prefix.as_deref().unwrap_or(default_prefix))
            .with_trust(self.trust)
            .with_overrides(self.permissions)
            .with_settings(self.settings.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Capability;
    use std::io::Write;

    const SAMPLE: &str = r##"
[server]
address = "irc.example.net:6667"
password = "hunter2"

[identity]
nick = "slircbot"

[bot]
command_prefix = "."
metrics_port = 9100

[runtime]
fuel = 5000

[restrictions]
"#ops" = "moderator"
"#Admin" = "op"

[[module]]
name = "core"
runtime = "builtin"
trust = "core"
settings = { alt_nick = "slircbot_" }

[[module]]
name = "echo"
path = "echo.wasm"
command_prefix = "!"
permissions = { writer = true, hasServerInfo = true }

[[module]]
name = "disabled"
path = "disabled.wasm"
enabled = false
"##;

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.password.as_deref(), Some("hunter2"));
        assert_eq!(config.identity.ident, "slircbot");
        assert_eq!(config.bot.queue_capacity, 256);
        assert_eq!(config.runtime.limits().fuel, 5000);
        assert_eq!(config.runtime.limits().max_memory_mb, 16);
        assert_eq!(config.restrictions["#ops"], ChannelRole::Moderator);
        assert_eq!(config.restrictions["#Admin"], ChannelRole::Operator);
        assert_eq!(config.modules.len(), 3);
    }

    #[test]
    fn descriptors_skip_disabled_and_inherit_prefix() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let descriptors = config.module_descriptors().unwrap();
        assert_eq!(descriptors.len(), 2);

        let core = &descriptors[0];
        assert_eq!(core.runtime(), RuntimeKind::Builtin);
        assert_eq!(core.source_path(), Path::new("core"));
        assert_eq!(core.command_prefix(), ".");
        assert_eq!(core.trust(), TrustTier::Core);

        let echo = &descriptors[1];
        assert_eq!(echo.command_prefix(), "!");
        assert_eq!(echo.overrides().get(Capability::Writer), Some(true));
        assert_eq!(echo.overrides().get(Capability::ServerInfo), Some(true));
        assert_eq!(echo.overrides().get(Capability::HostRequire), None);
    }

    #[test]
    fn wasm_module_without_path_is_rejected() {
        let module: ModuleConfig = toml::from_str(r#"name = "nopath""#).unwrap();
        assert_eq!(
            module.to_descriptor("!").unwrap_err(),
            InvalidModuleDescriptor::MissingPath("nopath".into())
        );
    }

    #[test]
    fn load_reports_io_and_parse_errors() {
        assert!(matches!(
            Config::load("/nonexistent/slircbot.toml"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server\n").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
