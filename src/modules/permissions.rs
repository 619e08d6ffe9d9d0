//! Module capabilities and their resolution from trust tier plus overrides.
//!
//! A [`PermissionSet`] is resolved once when a module is constructed and never
//! changes afterwards. Every capability is an explicit field: `core` modules
//! start with everything granted, `plugin` modules with nothing, and an
//! explicit override always wins over the tier default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The six capabilities a module may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read-only snapshot of live server state.
    ServerInfo,
    /// Emit outbound protocol commands.
    Writer,
    /// Introspect the host process.
    HostRequire,
    /// List, load, unload and refresh other modules.
    ModuleRegistry,
    /// Request protocol capabilities (`CAP REQ`).
    CapabilityNegotiation,
    /// Access to persistent logs.
    LogAccess,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Self::ServerInfo,
        Self::Writer,
        Self::HostRequire,
        Self::ModuleRegistry,
        Self::CapabilityNegotiation,
        Self::LogAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerInfo => "server_info",
            Self::Writer => "writer",
            Self::HostRequire => "host_require",
            Self::ModuleRegistry => "module_registry",
            Self::CapabilityNegotiation => "capability_negotiation",
            Self::LogAccess => "log_access",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown capability name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    /// Accepts the snake_case names and the older `hasServerInfo` style.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server_info" | "hasServerInfo" => Ok(Self::ServerInfo),
            "writer" | "hasIRCWriter" | "hasWriter" => Ok(Self::Writer),
            "host_require" | "hasHostRequire" => Ok(Self::HostRequire),
            "module_registry" | "hasModuleRegistry" => Ok(Self::ModuleRegistry),
            "capability_negotiation" | "hasCapabilityNegotiation" | "hasCapNegotiation" => {
                Ok(Self::CapabilityNegotiation)
            }
            "log_access" | "hasLogAccess" => Ok(Self::LogAccess),
            other => Err(UnknownCapability(other.to_owned())),
        }
    }
}

/// How far a module is trusted by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    /// Shipped with the host; every capability granted unless revoked.
    Core,
    /// Third-party; nothing granted unless listed.
    #[default]
    Plugin,
}

/// Explicit per-capability grants or revocations from configuration.
///
/// Unset fields fall back to the trust tier. Unknown keys are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionOverrides {
    #[serde(alias = "hasServerInfo")]
    pub server_info: Option<bool>,
    #[serde(alias = "hasIRCWriter", alias = "hasWriter")]
    pub writer: Option<bool>,
    #[serde(alias = "hasHostRequire")]
    pub host_require: Option<bool>,
    #[serde(alias = "hasModuleRegistry")]
    pub module_registry: Option<bool>,
    #[serde(alias = "hasCapabilityNegotiation", alias = "hasCapNegotiation")]
    pub capability_negotiation: Option<bool>,
    #[serde(alias = "hasLogAccess")]
    pub log_access: Option<bool>,
}

impl PermissionOverrides {
    pub fn get(&self, capability: Capability) -> Option<bool> {
        match capability {
            Capability::ServerInfo => self.server_info,
            Capability::Writer => self.writer,
            Capability::HostRequire => self.host_require,
            Capability::ModuleRegistry => self.module_registry,
            Capability::CapabilityNegotiation => self.capability_negotiation,
            Capability::LogAccess => self.log_access,
        }
    }

    pub fn set(&mut self, capability: Capability, granted: bool) -> &mut Self {
        let slot = match capability {
            Capability::ServerInfo => &mut self.server_info,
            Capability::Writer => &mut self.writer,
            Capability::HostRequire => &mut self.host_require,
            Capability::ModuleRegistry => &mut self.module_registry,
            Capability::CapabilityNegotiation => &mut self.capability_negotiation,
            Capability::LogAccess => &mut self.log_access,
        };
        *slot = Some(granted);
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, capability: Capability, granted: bool) -> Self {
        self.set(capability, granted);
        self
    }

    /// Build from `name = bool` pairs; unrecognized names are skipped.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        let mut overrides = Self::default();
        for (name, granted) in pairs {
            if let Ok(capability) = name.parse() {
                overrides.set(capability, granted);
            }
        }
        overrides
    }
}

/// Resolved, immutable capability flags for one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    server_info: bool,
    writer: bool,
    host_require: bool,
    module_registry: bool,
    capability_negotiation: bool,
    log_access: bool,
}

impl PermissionSet {
    /// Resolve flags: an explicit override wins, otherwise the tier default.
    pub fn resolve(tier: TrustTier, overrides: &PermissionOverrides) -> Self {
        let default = tier == TrustTier::Core;
        let flag = |capability| overrides.get(capability).unwrap_or(default);
        Self {
            server_info: flag(Capability::ServerInfo),
            writer: flag(Capability::Writer),
            host_require: flag(Capability::HostRequire),
            module_registry: flag(Capability::ModuleRegistry),
            capability_negotiation: flag(Capability::CapabilityNegotiation),
            log_access: flag(Capability::LogAccess),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::ServerInfo => self.server_info,
            Capability::Writer => self.writer,
            Capability::HostRequire => self.host_require,
            Capability::ModuleRegistry => self.module_registry,
            Capability::CapabilityNegotiation => self.capability_negotiation,
            Capability::LogAccess => self.log_access,
        }
    }

    /// Granted capabilities, in declaration order.
    pub fn granted(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.has(*c))
    }
}
