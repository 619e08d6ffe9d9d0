//! Capability context: the only surface a module's code can reach.
//!
//! A context is bound to exactly one module. Gated bindings (server state,
//! the writer, host information, the module directory, capability
//! negotiation) are only present when the module's [`PermissionSet`] grants
//! them; asking for a missing one returns [`CapabilityError::Denied`] and has
//! no other effect. The registration surface is always present.

use super::directory::ModuleDirectory;
use super::dispatch::{CallbackHandle, DispatchTables, Phase};
use super::permissions::{Capability, PermissionSet};
use super::sink::{CommandParams, CommandSink};
use crate::error::{CapabilityError, DispatchError};
use crate::state::ServerState;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::sync::Arc;

/// What a module with `host_require` may learn about the host process.
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub name: String,
    pub version: String,
    pub started_at: String,
    pub runtimes: Vec<String>,
    pub builtins: Vec<String>,
}

impl HostInfo {
    pub fn current(builtins: Vec<String>) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            started_at: chrono::Utc::now().to_rfc3339(),
            runtimes: vec!["wasm".to_owned(), "builtin".to_owned()],
            builtins,
        }
    }
}

/// Inputs for [`CapabilityContext::build`].
pub struct ContextParams<'a> {
    pub module: &'a str,
    pub permissions: PermissionSet,
    pub command_prefix: &'a str,
    pub settings: &'a toml::Table,
    pub server: &'a Arc<ServerState>,
    pub sink: &'a CommandSink,
    pub host: &'a HostInfo,
    pub directory: &'a ModuleDirectory,
}

struct ContextInner {
    module: String,
    permissions: PermissionSet,
    command_prefix: String,
    settings: toml::Table,
    server: Option<RwLock<Arc<ServerState>>>,
    writer: Option<CommandSink>,
    negotiator: Option<CommandSink>,
    host: Option<HostInfo>,
    directory: Option<ModuleDirectory>,
    tables: Mutex<DispatchTables>,
}

/// Cheap-to-clone handle onto one module's bindings.
#[derive(Clone)]
pub struct CapabilityContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("module", &self.inner.module)
            .field("permissions", &self.inner.permissions)
            .finish_non_exhaustive()
    }
}

impl CapabilityContext {
    /// Wire up the bindings `permissions` allows. Executes no module code.
    pub fn build(params: ContextParams<'_>) -> Self {
        let ContextParams {
            module,
            permissions,
            command_prefix,
            settings,
            server,
            sink,
            host,
            directory,
        } = params;
        let grant = |capability| permissions.has(capability);

        Self {
            inner: Arc::new(ContextInner {
                module: module.to_owned(),
                permissions,
                command_prefix: command_prefix.to_owned(),
                settings: settings.clone(),
                server: grant(Capability::ServerInfo).then(|| RwLock::new(Arc::clone(server))),
                writer: grant(Capability::Writer).then(|| sink.clone()),
                negotiator: grant(Capability::CapabilityNegotiation).then(|| sink.clone()),
                host: grant(Capability::HostRequire).then(|| host.clone()),
                directory: grant(Capability::ModuleRegistry).then(|| directory.clone()),
                tables: Mutex::new(DispatchTables::new()),
            }),
        }
    }

    pub fn module_name(&self) -> &str {
        &self.inner.module
    }

    pub fn permissions(&self) -> PermissionSet {
        self.inner.permissions
    }

    pub fn command_prefix(&self) -> &str {
        &self.inner.command_prefix
    }

    pub fn settings(&self) -> &toml::Table {
        &self.inner.settings
    }

    pub fn setting(&self, key: &str) -> Option<&toml::Value> {
        self.inner.settings.get(key)
    }

    // ------------------------------------------------------------------
    // Gated bindings
    // ------------------------------------------------------------------

    /// Latest server state snapshot.
    pub fn server_info(&self) -> Result<Arc<ServerState>, CapabilityError> {
        self.inner
            .server
            .as_ref()
            .map(|server| Arc::clone(&*server.read()))
            .ok_or(CapabilityError::Denied(Capability::ServerInfo))
    }

    pub fn send_command(
        &self,
        command: &str,
        params: impl Into<CommandParams>,
    ) -> Result<(), CapabilityError> {
        self.inner
            .writer
            .as_ref()
            .ok_or(CapabilityError::Denied(Capability::Writer))?
            .send(command, params)
    }

    pub fn host_info(&self) -> Result<&HostInfo, CapabilityError> {
        self.inner
            .host
            .as_ref()
            .ok_or(CapabilityError::Denied(Capability::HostRequire))
    }

    pub fn modules(&self) -> Result<&ModuleDirectory, CapabilityError> {
        self.inner
            .directory
            .as_ref()
            .ok_or(CapabilityError::Denied(Capability::ModuleRegistry))
    }

    /// Ask the server to enable a protocol capability (`CAP REQ`).
    pub fn request_capability(&self, name: &str) -> Result<(), CapabilityError> {
        self.inner
            .negotiator
            .as_ref()
            .ok_or(CapabilityError::Denied(Capability::CapabilityNegotiation))?
            .send("CAP", ["REQ", name])
    }

    pub fn has_log_access(&self) -> bool {
        self.inner.permissions.has(Capability::LogAccess)
    }

    /// Replace the server snapshot seen by the module. No-op without
    /// `server_info`.
    pub(crate) fn update_server(&self, state: &Arc<ServerState>) {
        if let Some(server) = &self.inner.server {
            *server.write() = Arc::clone(state);
        }
    }

    // ------------------------------------------------------------------
    // Registration surface
    // ------------------------------------------------------------------

    pub fn add_hook(&self, command: &str, callback: &str) -> CallbackHandle {
        self.inner.tables.lock().add_hook(command, callback)
    }

    pub fn del_hook(&self, handle: CallbackHandle) -> bool {
        self.inner.tables.lock().del_hook(handle)
    }

    pub fn add_command(&self, name: &str, callback: &str) -> CallbackHandle {
        self.inner.tables.lock().add_command(name, callback)
    }

    pub fn del_command(&self, handle: CallbackHandle) -> bool {
        self.inner.tables.lock().del_command(handle)
    }

    pub fn add_match(&self, pattern: &str, callback: &str) -> Result<CallbackHandle, DispatchError> {
        self.inner.tables.lock().add_match(pattern, callback)
    }

    pub fn del_match(&self, handle: CallbackHandle) -> bool {
        self.inner.tables.lock().del_match(handle)
    }

    pub fn add_pre_init(&self, callback: &str) -> CallbackHandle {
        self.inner.tables.lock().add_lifecycle(Phase::PreInit, callback)
    }

    pub fn add_post_init(&self, callback: &str) -> CallbackHandle {
        self.inner.tables.lock().add_lifecycle(Phase::PostInit, callback)
    }

    pub fn add_closing(&self, callback: &str) -> CallbackHandle {
        self.inner.tables.lock().add_lifecycle(Phase::Closing, callback)
    }

    /// Lock the module's tables. Never hold the guard while module code runs.
    pub(crate) fn tables(&self) -> MutexGuard<'_, DispatchTables> {
        self.inner.tables.lock()
    }
}
