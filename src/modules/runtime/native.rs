//! Host-compiled modules.

use super::ModuleRuntime;
use crate::error::RuntimeFault;
use crate::modules::context::CapabilityContext;
use slircbot_proto::MessageEvent;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub type NativeResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A module compiled into the host. It sees the same context as a WASM
/// module and nothing else.
pub trait NativeModule: Send + Sync {
    /// Top-level code: register callbacks. Runs on load and on every refresh.
    fn init(&mut self, ctx: &CapabilityContext) -> NativeResult;

    /// Run the callback registered under `callback`.
    fn call(
        &mut self,
        callback: &str,
        event: Option<&MessageEvent>,
        ctx: &CapabilityContext,
    ) -> NativeResult;
}

pub struct NativeRuntime {
    module: Box<dyn NativeModule>,
    ctx: CapabilityContext,
    loaded: bool,
}

impl NativeRuntime {
    pub fn new(module: Box<dyn NativeModule>, ctx: CapabilityContext) -> Self {
        Self {
            module,
            ctx,
            loaded: false,
        }
    }
}

impl ModuleRuntime for NativeRuntime {
    fn load(&mut self, _source: &[u8]) -> Result<(), RuntimeFault> {
        guarded(|| self.module.init(&self.ctx))?;
        self.loaded = true;
        Ok(())
    }

    fn refresh(&mut self, source: &[u8]) -> Result<(), RuntimeFault> {
        self.load(source)
    }

    fn invoke(
        &mut self,
        callback: &str,
        event: Option<&Arc<MessageEvent>>,
    ) -> Result<(), RuntimeFault> {
        if !self.loaded {
            return Err(RuntimeFault::NotLoaded);
        }
        guarded(|| self.module.call(callback, event.map(|e| &**e), &self.ctx))
    }
}

/// Run module code, turning errors and panics into faults.
fn guarded(f: impl FnOnce() -> NativeResult) -> Result<(), RuntimeFault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RuntimeFault::Module(e.to_string())),
        Err(payload) => Err(RuntimeFault::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
