//! Unified error handling for slircbot.
//!
//! Every fault a module can cause is caught at the sandbox boundary and
//! turned into one of the types below. `error_code()` gives each variant a
//! static label for metrics.

use crate::modules::{Capability, SandboxState};
use thiserror::Error;

// ============================================================================
// Descriptor validation
// ============================================================================

/// A module descriptor was rejected before any sandbox was built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidModuleDescriptor {
    #[error("module name is required")]
    MissingName,

    #[error("module name may not contain whitespace: {0:?}")]
    InvalidName(String),

    #[error("module {0}: source path is required")]
    MissingPath(String),
}

impl InvalidModuleDescriptor {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingName => "missing_name",
            Self::InvalidName(_) => "invalid_name",
            Self::MissingPath(_) => "missing_path",
        }
    }
}

// ============================================================================
// Runtime faults (anything the module's own code did wrong)
// ============================================================================

#[derive(Debug, Error)]
pub enum RuntimeFault {
    #[error("failed to compile module: {0}")]
    Compile(String),

    #[error("failed to instantiate module: {0}")]
    Instantiate(String),

    #[error("module trapped: {0}")]
    Trap(String),

    #[error("no callable export named {0:?}")]
    MissingExport(String),

    #[error("callback returned error code {0}")]
    ErrorCode(i32),

    #[error("module panicked: {0}")]
    Panic(String),

    #[error("module error: {0}")]
    Module(String),

    #[error("no builtin module named {0:?}")]
    UnknownBuiltin(String),

    #[error("module has not been loaded")]
    NotLoaded,
}

impl RuntimeFault {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Compile(_) => "compile",
            Self::Instantiate(_) => "instantiate",
            Self::Trap(_) => "trap",
            Self::MissingExport(_) => "missing_export",
            Self::ErrorCode(_) => "error_code",
            Self::Panic(_) => "panic",
            Self::Module(_) => "module_error",
            Self::UnknownBuiltin(_) => "unknown_builtin",
            Self::NotLoaded => "not_loaded",
        }
    }
}

/// Executing a module's top-level code failed. The sandbox does not advance.
#[derive(Debug, Error)]
pub enum LoadFault {
    #[error("module {module}: cannot read source: {source}")]
    Source {
        module: String,
        #[source]
        source: std::io::Error,
    },

    #[error("module {module}: {fault}")]
    Runtime {
        module: String,
        #[source]
        fault: RuntimeFault,
    },
}

impl LoadFault {
    pub fn module(&self) -> &str {
        match self {
            Self::Source { module, .. } | Self::Runtime { module, .. } => module,
        }
    }

    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Runtime { fault, .. } => fault.error_code(),
        }
    }
}

/// One callback failed. Siblings in the same run are unaffected.
#[derive(Debug, Error)]
#[error("module {module}: {kind} callback {callback:?} failed: {fault}")]
pub struct CallbackFault {
    pub module: String,
    pub kind: &'static str,
    pub callback: String,
    #[source]
    pub fault: RuntimeFault,
}

impl CallbackFault {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        self.fault.error_code()
    }
}

// ============================================================================
// Sandbox and registry
// ============================================================================

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("module {module}: cannot {operation} while {state}")]
    InvalidTransition {
        module: String,
        operation: &'static str,
        state: SandboxState,
    },

    #[error(transparent)]
    Load(#[from] LoadFault),
}

impl SandboxError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Load(e) => e.error_code(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("module {0} is already loaded")]
    Duplicate(String),

    #[error("no module named {0}")]
    NotFound(String),

    #[error("cannot load module {0}: the registry has already closed")]
    Closed(String),

    #[error(transparent)]
    Descriptor(#[from] InvalidModuleDescriptor),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Load(#[from] LoadFault),
}

impl RegistryError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Duplicate(_) => "duplicate",
            Self::NotFound(_) => "not_found",
            Self::Closed(_) => "registry_closed",
            Self::Descriptor(e) => e.error_code(),
            Self::Sandbox(e) => e.error_code(),
            Self::Load(e) => e.error_code(),
        }
    }
}

// ============================================================================
// Capability access and registration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability {0} not granted")]
    Denied(Capability),

    #[error("outbound queue is full")]
    QueueFull,

    #[error("outbound queue is closed")]
    Closed,
}

impl CapabilityError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Denied(_) => "denied",
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid match pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl DispatchError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPattern { .. } => "invalid_pattern",
        }
    }
}

// ============================================================================
// Client (transport) errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection error: {0}")]
    Line(#[from] slircbot_proto::LineError),

    #[error("module runtime unavailable: {0}")]
    Runtime(#[from] RuntimeFault),

    #[error(transparent)]
    Descriptor(#[from] InvalidModuleDescriptor),
}

impl ClientError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Line(_) => "line",
            Self::Runtime(e) => e.error_code(),
            Self::Descriptor(e) => e.error_code(),
        }
    }
}
