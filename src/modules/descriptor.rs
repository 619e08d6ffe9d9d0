//! Module identity and load-time configuration.

use super::permissions::{PermissionOverrides, TrustTier};
use crate::error::InvalidModuleDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a module's code is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// WebAssembly binary or text, run by wasmtime.
    #[default]
    Wasm,
    /// Compiled into the host; the source path names the builtin.
    Builtin,
}

/// Everything the host needs to know to load one module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    name: String,
    description: String,
    source_path: PathBuf,
    runtime: RuntimeKind,
    command_prefix: String,
    trust: TrustTier,
    overrides: PermissionOverrides,
    settings: toml::Table,
}

impl ModuleDescriptor {
    /// Validate the required fields. Everything else has a default.
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
    ) -> Result<Self, InvalidModuleDescriptor> {
        let name = name.into();
        let source_path = source_path.into();

        if name.is_empty() {
            return Err(InvalidModuleDescriptor::MissingName);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(InvalidModuleDescriptor::InvalidName(name));
        }
        if source_path.as_os_str().is_empty() {
            return Err(InvalidModuleDescriptor::MissingPath(name));
        }

        Ok(Self {
            name,
            description: String::new(),
            source_path,
            runtime: RuntimeKind::default(),
            command_prefix: String::new(),
            trust: TrustTier::default(),
            overrides: PermissionOverrides::default(),
            settings: toml::Table::new(),
        })
    }

    /// Shorthand for a builtin module whose source path is its own name.
    pub fn builtin(name: &str) -> Result<Self, InvalidModuleDescriptor> {
        Ok(Self::new(name, name)?.with_runtime(RuntimeKind::Builtin))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    pub fn with_trust(mut self, trust: TrustTier) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_overrides(mut self, overrides: PermissionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_settings(mut self, settings: toml::Table) -> Self {
        self.settings = settings;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.runtime
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn trust(&self) -> TrustTier {
        self.trust
    }

    pub fn overrides(&self) -> &PermissionOverrides {
        &self.overrides
    }

    pub fn settings(&self) -> &toml::Table {
        &self.settings
    }
}
