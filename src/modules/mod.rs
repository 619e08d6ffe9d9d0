//! Sandboxed bot modules.
//!
//! Each module runs inside a [`ModuleSandbox`] that owns its code, its
//! [`CapabilityContext`] and its dispatch tables. The [`ModuleRegistry`]
//! owns every sandbox and fans events out to them.

pub mod builtin;
mod context;
mod descriptor;
mod directory;
mod dispatch;
mod loader;
mod permissions;
mod registry;
pub mod runtime;
mod sandbox;
mod sink;

pub use context::{CapabilityContext, ContextParams, HostInfo};
pub use descriptor::{ModuleDescriptor, RuntimeKind};
pub use directory::{DirectoryRequest, ModuleDirectory, ModuleSummary};
pub use dispatch::{
    CallbackHandle, CallbackKind, CallbackOutcome, DispatchTables, Phase, Target, run_targets,
};
pub use loader::{FsLoader, SourceLoader};
pub use permissions::{
    Capability, PermissionOverrides, PermissionSet, TrustTier, UnknownCapability,
};
pub use registry::{ModuleRegistry, RegistryParams};
pub use runtime::{ModuleRuntime, NativeModule, NativeResult, Runtimes, WasmLimits};
pub use sandbox::{Authorization, HandleOutcome, ModuleSandbox, SandboxState, authorize};
pub use sink::{CommandParams, CommandSink, OutboundCommand};
