//! Owns every module sandbox and drives them through their lifecycle.
//!
//! Events fan out sequentially in load order. Modules loaded after the
//! registry has already run a lifecycle phase are brought up to that phase
//! immediately, so a module loaded at runtime still becomes `Active`.

use super::context::{CapabilityContext, ContextParams, HostInfo};
use super::descriptor::{ModuleDescriptor, RuntimeKind};
use super::directory::{DirectoryRequest, ModuleDirectory, ModuleSummary};
use super::dispatch::CallbackOutcome;
use super::loader::SourceLoader;
use super::permissions::PermissionSet;
use super::runtime::Runtimes;
use super::sandbox::{HandleOutcome, ModuleSandbox, SandboxState};
use super::sink::CommandSink;
use crate::error::{LoadFault, RegistryError, SandboxError};
use crate::state::ServerState;
use crate::telemetry::spans;
use slircbot_proto::MessageEvent;
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

pub struct RegistryParams {
    pub runtimes: Runtimes,
    pub loader: Arc<dyn SourceLoader>,
    pub sink: CommandSink,
}

/// How far the registry has driven the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Loading,
    PreInitialized,
    Active,
    Closed,
}

pub struct ModuleRegistry {
    runtimes: Runtimes,
    loader: Arc<dyn SourceLoader>,
    sink: CommandSink,
    host: HostInfo,
    directory: ModuleDirectory,
    modules: Vec<ModuleSandbox>,
    stage: Stage,
    server: Arc<ServerState>,
}

impl ModuleRegistry {
    pub fn new(params: RegistryParams, server: Arc<ServerState>) -> Self {
        let host = HostInfo::current(params.runtimes.builtin_names());
        Self {
            runtimes: params.runtimes,
            loader: params.loader,
            sink: params.sink,
            host,
            directory: ModuleDirectory::new(),
            modules: Vec::new(),
            stage: Stage::Loading,
            server,
        }
    }

    pub fn directory(&self) -> &ModuleDirectory {
        &self.directory
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSandbox> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(ModuleSandbox::name).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Replace the snapshot handed to modules on their next execution.
    pub fn update_server(&mut self, server: &Arc<ServerState>) {
        self.server = Arc::clone(server);
    }

    /// Build, load and catch up one module.
    ///
    /// A load fault is logged and returned; it is never retried.
    pub async fn load(&mut self, descriptor: ModuleDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.name().to_owned();
        let result = self
            .try_load(descriptor)
            .instrument(spans::module(&name))
            .await;

        match &result {
            Ok(()) => {
                info!(module = %name, "Module loaded");
                self.publish();
            }
            Err(e) => {
                warn!(module = %name, error = %e, "Module failed to load");
                crate::metrics::record_load_fault(&name, e.error_code());
            }
        }
        result
    }

    /// Load descriptors in order. Failures don't stop the rest.
    pub async fn load_all(
        &mut self,
        descriptors: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> Vec<RegistryError> {
        let mut errors = Vec::new();
        for descriptor in descriptors {
            if let Err(e) = self.load(descriptor).await {
                errors.push(e);
            }
        }
        errors
    }

    async fn try_load(&mut self, descriptor: ModuleDescriptor) -> Result<(), RegistryError> {
        if self.stage == Stage::Closed {
            return Err(RegistryError::Closed(descriptor.name().to_owned()));
        }
        if self.get(descriptor.name()).is_some() {
            return Err(RegistryError::Duplicate(descriptor.name().to_owned()));
        }

        let source = self.read_source(&descriptor).await?;
        let permissions = PermissionSet::resolve(descriptor.trust(), descriptor.overrides());
        debug!(
            module = %descriptor.name(),
            granted = ?permissions.granted().collect::<Vec<_>>(),
            "Resolved module permissions"
        );

        let context = CapabilityContext::build(ContextParams {
            module: descriptor.name(),
            permissions,
            command_prefix: descriptor.command_prefix(),
            settings: descriptor.settings(),
            server: &self.server,
            sink: &self.sink,
            host: &self.host,
            directory: &self.directory,
        });
        let runtime = self
            .runtimes
            .instantiate(&descriptor, context.clone())
            .map_err(|fault| LoadFault::Runtime {
                module: descriptor.name().to_owned(),
                fault,
            })?;

        let mut sandbox = ModuleSandbox::new(descriptor, context, runtime);
        sandbox.load(&source, &self.server)?;
        self.catch_up(&mut sandbox)?;
        self.modules.push(sandbox);
        Ok(())
    }

    async fn read_source(&self, descriptor: &ModuleDescriptor) -> Result<Vec<u8>, LoadFault> {
        match descriptor.runtime() {
            RuntimeKind::Builtin => Ok(Vec::new()),
            RuntimeKind::Wasm => self
                .loader
                .read(descriptor.source_path())
                .await
                .map_err(|source| LoadFault::Source {
                    module: descriptor.name().to_owned(),
                    source,
                }),
        }
    }

    fn catch_up(&self, sandbox: &mut ModuleSandbox) -> Result<(), SandboxError> {
        if self.stage >= Stage::PreInitialized {
            sandbox.run_pre_init(&self.server)?;
        }
        if self.stage >= Stage::Active {
            sandbox.run_post_init(&self.server)?;
        }
        Ok(())
    }

    /// Run the module's closing callbacks and drop it.
    pub fn unload(&mut self, name: &str) -> Result<Vec<CallbackOutcome>, RegistryError> {
        let index = self
            .modules
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;
        let mut sandbox = self.modules.remove(index);

        let outcomes = match sandbox.state() {
            SandboxState::Closing | SandboxState::Closed => Vec::new(),
            _ => sandbox.run_closing(&self.server)?,
        };
        info!(module = %name, "Module unloaded");
        self.publish();
        Ok(outcomes)
    }

    /// Re-read the module's source and execute it against its existing
    /// context.
    pub async fn refresh(&mut self, name: &str) -> Result<(), RegistryError> {
        let descriptor = self
            .get(name)
            .map(|m| m.descriptor().clone())
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;
        let source = self.read_source(&descriptor).await?;

        let server = Arc::clone(&self.server);
        let sandbox = self
            .modules
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;
        match sandbox.refresh(&source, &server) {
            Ok(()) => {
                info!(module = %name, "Module refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(module = %name, error = %e, "Module refresh failed");
                crate::metrics::record_load_fault(name, e.error_code());
                Err(e.into())
            }
        }
    }

    pub fn run_pre_init(&mut self) -> Vec<CallbackOutcome> {
        self.stage = self.stage.max(Stage::PreInitialized);
        self.run_phase(SandboxState::Loaded, ModuleSandbox::run_pre_init)
    }

    pub fn run_post_init(&mut self) -> Vec<CallbackOutcome> {
        self.stage = self.stage.max(Stage::Active);
        self.run_phase(SandboxState::PreInitialized, ModuleSandbox::run_post_init)
    }

    pub fn run_closing(&mut self) -> Vec<CallbackOutcome> {
        self.stage = Stage::Closed;
        let mut outcomes = Vec::new();
        for sandbox in &mut self.modules {
            if matches!(sandbox.state(), SandboxState::Closing | SandboxState::Closed) {
                continue;
            }
            match sandbox.run_closing(&self.server) {
                Ok(mut ran) => outcomes.append(&mut ran),
                Err(e) => warn!(module = %sandbox.name(), error = %e, "Closing skipped"),
            }
        }
        self.publish();
        outcomes
    }

    fn run_phase(
        &mut self,
        from: SandboxState,
        phase: fn(&mut ModuleSandbox, &Arc<ServerState>) -> Result<Vec<CallbackOutcome>, SandboxError>,
    ) -> Vec<CallbackOutcome> {
        let mut outcomes = Vec::new();
        for sandbox in self.modules.iter_mut().filter(|m| m.state() == from) {
            match phase(sandbox, &self.server) {
                Ok(mut ran) => outcomes.append(&mut ran),
                Err(e) => warn!(module = %sandbox.name(), error = %e, "Lifecycle phase skipped"),
            }
        }
        self.publish();
        outcomes
    }

    /// Fan one event out to every active module, in load order.
    pub fn dispatch(
        &mut self,
        event: &Arc<MessageEvent>,
        server: &Arc<ServerState>,
    ) -> Vec<(String, HandleOutcome)> {
        self.update_server(server);
        let _span = spans::dispatch(event.command()).entered();
        crate::metrics::record_event_dispatched(event.command());

        let mut outcomes = Vec::new();
        for sandbox in &mut self.modules {
            if sandbox.state() != SandboxState::Active {
                continue;
            }
            let _module_span = spans::module(sandbox.name()).entered();
            match sandbox.handle(event, &self.server) {
                Ok(outcome) => outcomes.push((sandbox.name().to_owned(), outcome)),
                Err(e) => warn!(module = %sandbox.name(), error = %e, "Event not handled"),
            }
        }
        outcomes
    }

    /// Carry out load, unload and refresh requests queued by modules.
    /// Returns how many requests were processed.
    pub async fn service_directory(&mut self) -> usize {
        let requests = self.directory.take_requests();
        let count = requests.len();
        for request in requests {
            let result = match request {
                DirectoryRequest::Load(descriptor) => self.load(descriptor).await,
                DirectoryRequest::Unload(name) => self.unload(&name).map(drop),
                DirectoryRequest::Refresh(name) => self.refresh(&name).await,
            };
            if let Err(e) = result {
                debug!(error = %e, "Directory request failed");
            }
        }
        count
    }

    fn publish(&self) {
        let listing: Vec<ModuleSummary> = self
            .modules
            .iter()
            .map(|m| ModuleSummary {
                name: m.name().to_owned(),
                description: m.descriptor().description().to_owned(),
                state: m.state(),
            })
            .collect();
        let active = listing
            .iter()
            .filter(|s| s.state == SandboxState::Active)
            .count();
        crate::metrics::set_modules_loaded(active);
        self.directory.publish(listing);
    }
}
