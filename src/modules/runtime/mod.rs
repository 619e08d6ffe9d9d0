//! Execution engines for module code.
//!
//! A runtime owns one module's code and executes it against the module's
//! [`CapabilityContext`]. The sandbox above it handles state transitions and
//! fault reporting; a runtime only runs code and reports what went wrong.

mod native;
mod wasm;

pub use native::{NativeModule, NativeResult, NativeRuntime};
pub use wasm::{HostState, WasmEngine, WasmLimits, WasmRuntime, HOST_MODULE};

use super::context::CapabilityContext;
use super::descriptor::{ModuleDescriptor, RuntimeKind};
use crate::error::RuntimeFault;
use slircbot_proto::MessageEvent;
use std::collections::HashMap;
use std::sync::Arc;

/// One module's executable code.
pub trait ModuleRuntime: Send + Sync {
    /// Execute the module's top-level code for the first time.
    fn load(&mut self, source: &[u8]) -> Result<(), RuntimeFault>;

    /// Execute new top-level code against the existing context.
    fn refresh(&mut self, source: &[u8]) -> Result<(), RuntimeFault>;

    /// Run a registered callback, optionally with the event that triggered it.
    fn invoke(
        &mut self,
        callback: &str,
        event: Option<&Arc<MessageEvent>>,
    ) -> Result<(), RuntimeFault>;
}

type NativeFactory = Arc<dyn Fn(&ModuleDescriptor) -> Box<dyn NativeModule> + Send + Sync>;

/// Builds runtimes for descriptors: WASM modules through the shared engine,
/// builtins through the registered factories.
#[derive(Clone)]
pub struct Runtimes {
    wasm: WasmEngine,
    builtins: HashMap<String, NativeFactory>,
}

impl Runtimes {
    /// Engine with the standard builtins (`core`) registered.
    pub fn new(limits: WasmLimits) -> Result<Self, RuntimeFault> {
        let mut runtimes = Self {
            wasm: WasmEngine::new(limits)?,
            builtins: HashMap::new(),
        };
        crate::modules::builtin::register_all(&mut runtimes);
        Ok(runtimes)
    }

    pub fn register_builtin<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ModuleDescriptor) -> Box<dyn NativeModule> + Send + Sync + 'static,
    {
        self.builtins.insert(name.to_owned(), Arc::new(factory));
    }

    pub fn builtin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builtins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn wasm(&self) -> &WasmEngine {
        &self.wasm
    }

    pub fn instantiate(
        &self,
        descriptor: &ModuleDescriptor,
        context: CapabilityContext,
    ) -> Result<Box<dyn ModuleRuntime>, RuntimeFault> {
        match descriptor.runtime() {
            RuntimeKind::Wasm => Ok(Box::new(self.wasm.runtime(context)?)),
            RuntimeKind::Builtin => {
                let name = descriptor.source_path().to_string_lossy();
                let factory = self
                    .builtins
                    .get(name.as_ref())
                    .ok_or_else(|| RuntimeFault::UnknownBuiltin(name.to_string()))?;
                Ok(Box::new(NativeRuntime::new(factory(descriptor), context)))
            }
        }
    }
}
