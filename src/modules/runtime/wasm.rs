//! WebAssembly modules, run by wasmtime with fuel metering and memory limits.
//!
//! Every load or refresh instantiates into a fresh [`Store`] holding the
//! module's [`CapabilityContext`], so guest memory does not outlive the code
//! that owns it while registrations persist in the context. The only way out
//! of the guest is the host functions linked under the `slirc` import module.
//! Gated imports are always linked so any guest instantiates,
//! but they return `-1` and do nothing when the capability is missing.
//!
//! # Guest ABI
//!
//! Strings are passed as `(ptr, len)` pairs into the guest's exported
//! `memory`. Functions that return data take an output buffer
//! `(buf_ptr, buf_cap)` and return the data's length; when the length exceeds
//! `buf_cap` nothing is written and the guest may retry with a larger buffer.
//!
//! | import | signature | result |
//! |---|---|---|
//! | `add_hook`, `add_command`, `add_match` | `(key, callback) -> i32` | handle, `-1` on error |
//! | `del_hook`, `del_command`, `del_match` | `(handle) -> i32` | `1` removed, `0` not found |
//! | `add_pre_init`, `add_post_init`, `add_closing` | `(callback) -> i32` | handle |
//! | `send_command` | `(command, params_json) -> i32` | `0`, `-1` denied, `-2` queue, `-3` bad params |
//! | `request_capability` | `(name) -> i32` | as `send_command` |
//! | `event_field` | `(field, index, buf) -> i32` | length, `-1` if absent |
//! | `event_json`, `server_info`, `host_info`, `module_list`, `command_prefix` | `(buf) -> i32` | length, `-1` if denied |
//! | `setting` | `(key, buf) -> i32` | JSON length, `-1` if unset |
//! | `module_request` | `(op, name) -> i32` | `0`, `-1` denied |
//! | `log` | `(level, message)` | |
//!
//! The guest exports `memory`, an optional `init` (its top-level code) and
//! one function per callback, typed `() -> ()` or `() -> i32` where a
//! non-zero result reports a callback error.

use super::ModuleRuntime;
use crate::error::{CapabilityError, RuntimeFault};
use crate::modules::context::CapabilityContext;
use crate::modules::dispatch::CallbackHandle;
use crate::modules::sink::CommandParams;
use slircbot_proto::MessageEvent;
use std::sync::Arc;
use wasmtime::{
    Caller, Engine, Extern, Instance, Linker, Memory, Module, Store, StoreLimits,
    StoreLimitsBuilder,
};

/// Import module name for every host function.
pub const HOST_MODULE: &str = "slirc";

/// Export run as the module's top-level code.
const INIT_EXPORT: &str = "init";

/// Fields readable through `event_field`.
const FIELD_COMMAND: i32 = 0;
const FIELD_PREFIX: i32 = 1;
const FIELD_PARAM: i32 = 2;
const FIELD_TRAILING: i32 = 3;
const FIELD_NICK: i32 = 4;
const FIELD_RAW: i32 = 5;
const FIELD_TAG: i32 = 6;

/// Operations for `module_request`.
const OP_UNLOAD: i32 = 1;
const OP_REFRESH: i32 = 2;

/// Resource limits applied to every module store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WasmLimits {
    /// Fuel granted before each execution (top-level code or callback).
    pub fuel: u64,
    /// Maximum size of each linear memory, in MiB.
    pub max_memory_mb: usize,
}

impl Default for WasmLimits {
    fn default() -> Self {
        Self {
            fuel: 10_000_000,
            max_memory_mb: 16,
        }
    }
}

/// Host state stored in each module's store.
pub struct HostState {
    ctx: CapabilityContext,
    /// Event being dispatched, if any.
    event: Option<Arc<MessageEvent>>,
    limits: StoreLimits,
}

/// Shared wasmtime engine (compiled code cache) for all modules.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Engine,
    limits: WasmLimits,
}

impl WasmEngine {
    pub fn new(limits: WasmLimits) -> Result<Self, RuntimeFault> {
        let mut config = wasmtime::Config::new();
        config.consume_fuel(true);
        let engine = Engine::new(&config)
            .map_err(|e| RuntimeFault::Instantiate(format!("wasmtime engine init: {e}")))?;
        Ok(Self { engine, limits })
    }

    pub fn limits(&self) -> WasmLimits {
        self.limits
    }

    /// Create the linker for one module. No guest code runs yet.
    pub fn runtime(&self, ctx: CapabilityContext) -> Result<WasmRuntime, RuntimeFault> {
        Ok(WasmRuntime {
            engine: self.engine.clone(),
            limits: self.limits,
            ctx,
            linker: create_linker(&self.engine)?,
            current: None,
        })
    }
}

/// The live instance and the store that owns it.
struct Loaded {
    store: Store<HostState>,
    instance: Instance,
}

pub struct WasmRuntime {
    engine: Engine,
    limits: WasmLimits,
    ctx: CapabilityContext,
    linker: Linker<HostState>,
    current: Option<Loaded>,
}

impl WasmRuntime {
    fn new_store(&self) -> Result<Store<HostState>, RuntimeFault> {
        let limits = StoreLimitsBuilder::new()
            .memory_size(self.limits.max_memory_mb.saturating_mul(1024 * 1024))
            .instances(1)
            .build();
        let mut store = Store::new(
            &self.engine,
            HostState {
                ctx: self.ctx.clone(),
                event: None,
                limits,
            },
        );
        store.limiter(|state| &mut state.limits);
        refuel(&mut store, self.limits.fuel)?;
        Ok(store)
    }

    /// Compile and instantiate `source` (binary or text format) in a fresh
    /// store, then run its `init` export. The previous store and instance
    /// are released only once this succeeds; on failure they stay current.
    fn instantiate(&mut self, source: &[u8]) -> Result<(), RuntimeFault> {
        let module =
            Module::new(&self.engine, source).map_err(|e| RuntimeFault::Compile(format!("{e:#}")))?;
        let mut store = self.new_store()?;
        let instance = self
            .linker
            .instantiate(&mut store, &module)
            .map_err(|e| RuntimeFault::Instantiate(format!("{e:#}")))?;

        if instance.get_export(&mut store, INIT_EXPORT).is_some() {
            call_export(&mut store, instance, INIT_EXPORT)?;
        }
        self.current = Some(Loaded { store, instance });
        Ok(())
    }

    /// Fuel left after the last execution.
    pub fn remaining_fuel(&self) -> u64 {
        self.current
            .as_ref()
            .and_then(|loaded| loaded.store.get_fuel().ok())
            .unwrap_or(0)
    }
}

fn refuel(store: &mut Store<HostState>, fuel: u64) -> Result<(), RuntimeFault> {
    store
        .set_fuel(fuel)
        .map_err(|e| RuntimeFault::Trap(format!("set fuel: {e}")))
}

impl ModuleRuntime for WasmRuntime {
    fn load(&mut self, source: &[u8]) -> Result<(), RuntimeFault> {
        self.instantiate(source)
    }

    fn refresh(&mut self, source: &[u8]) -> Result<(), RuntimeFault> {
        self.instantiate(source)
    }

    fn invoke(
        &mut self,
        callback: &str,
        event: Option<&Arc<MessageEvent>>,
    ) -> Result<(), RuntimeFault> {
        let fuel = self.limits.fuel;
        let Loaded { store, instance } = self.current.as_mut().ok_or(RuntimeFault::NotLoaded)?;
        refuel(store, fuel)?;
        store.data_mut().event = event.cloned();
        let result = call_export(store, *instance, callback);
        store.data_mut().event = None;
        result
    }
}

/// Call an export typed `() -> i32` or `() -> ()`.
fn call_export(
    store: &mut Store<HostState>,
    instance: Instance,
    name: &str,
) -> Result<(), RuntimeFault> {
    if let Ok(func) = instance.get_typed_func::<(), i32>(&mut *store, name) {
        let code = func.call(&mut *store, ()).map_err(trap)?;
        return match code {
            0 => Ok(()),
            code => Err(RuntimeFault::ErrorCode(code)),
        };
    }
    let func = instance
        .get_typed_func::<(), ()>(&mut *store, name)
        .map_err(|_| RuntimeFault::MissingExport(name.to_owned()))?;
    func.call(&mut *store, ()).map_err(trap)
}

fn trap(e: wasmtime::Error) -> RuntimeFault {
    RuntimeFault::Trap(format!("{e:#}"))
}

// ---------------------------------------------------------------------------
// Guest memory helpers
// ---------------------------------------------------------------------------

fn guest_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(m)) => Some(m),
        _ => None,
    }
}

/// Read a string from guest memory; `None` if out of bounds.
fn read_str(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> Option<String> {
    let memory = guest_memory(caller)?;
    let start = usize::try_from(ptr).ok()?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    let data = memory.data(&*caller);
    data.get(start..end)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

/// Copy `bytes` into the guest buffer if it fits; returns the full length.
fn write_out(caller: &mut Caller<'_, HostState>, ptr: i32, cap: i32, bytes: &[u8]) -> i32 {
    let Ok(len) = i32::try_from(bytes.len()) else {
        return -1;
    };
    if len > cap {
        return len;
    }
    let (Some(memory), Ok(offset)) = (guest_memory(caller), usize::try_from(ptr)) else {
        return -1;
    };
    match memory.write(&mut *caller, offset, bytes) {
        Ok(()) => len,
        Err(_) => -1,
    }
}

fn handle_to_guest(handle: CallbackHandle) -> i32 {
    i32::try_from(handle.0).unwrap_or(-1)
}

fn handle_from_guest(handle: i32) -> Option<CallbackHandle> {
    u64::try_from(handle).ok().map(CallbackHandle)
}

fn send_status(result: Result<(), CapabilityError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(CapabilityError::Denied(_)) => -1,
        Err(CapabilityError::QueueFull | CapabilityError::Closed) => -2,
    }
}

// ---------------------------------------------------------------------------
// Host functions
// ---------------------------------------------------------------------------

type KeyedRegistration = fn(&CapabilityContext, &str, &str) -> Option<CallbackHandle>;
type Unregistration = fn(&CapabilityContext, CallbackHandle) -> bool;
type LifecycleRegistration = fn(&CapabilityContext, &str) -> CallbackHandle;

fn link_err(name: &str) -> impl FnOnce(wasmtime::Error) -> RuntimeFault + '_ {
    move |e| RuntimeFault::Instantiate(format!("link {name}: {e}"))
}

fn link_keyed(linker: &mut Linker<HostState>, name: &str, add: KeyedRegistration) -> Result<(), RuntimeFault> {
    linker
        .func_wrap(
            HOST_MODULE,
            name,
            move |mut caller: Caller<'_, HostState>,
                  key_ptr: i32,
                  key_len: i32,
                  cb_ptr: i32,
                  cb_len: i32|
                  -> i32 {
                let (Some(key), Some(callback)) = (
                    read_str(&mut caller, key_ptr, key_len),
                    read_str(&mut caller, cb_ptr, cb_len),
                ) else {
                    return -1;
                };
                add(&caller.data().ctx, &key, &callback).map_or(-1, handle_to_guest)
            },
        )
        .map_err(link_err(name))?;
    Ok(())
}

fn link_unregister(linker: &mut Linker<HostState>, name: &str, del: Unregistration) -> Result<(), RuntimeFault> {
    linker
        .func_wrap(
            HOST_MODULE,
            name,
            move |caller: Caller<'_, HostState>, handle: i32| -> i32 {
                handle_from_guest(handle).is_some_and(|h| del(&caller.data().ctx, h)) as i32
            },
        )
        .map_err(link_err(name))?;
    Ok(())
}

fn link_lifecycle(linker: &mut Linker<HostState>, name: &str, add: LifecycleRegistration) -> Result<(), RuntimeFault> {
    linker
        .func_wrap(
            HOST_MODULE,
            name,
            move |mut caller: Caller<'_, HostState>, cb_ptr: i32, cb_len: i32| -> i32 {
                match read_str(&mut caller, cb_ptr, cb_len) {
                    Some(callback) => handle_to_guest(add(&caller.data().ctx, &callback)),
                    None => -1,
                }
            },
        )
        .map_err(link_err(name))?;
    Ok(())
}

/// Link a `(buf_ptr, buf_cap) -> i32` export producing bytes from the host
/// state, or `None` when denied.
fn link_output(
    linker: &mut Linker<HostState>,
    name: &str,
    produce: fn(&HostState) -> Option<Vec<u8>>,
) -> Result<(), RuntimeFault> {
    linker
        .func_wrap(
            HOST_MODULE,
            name,
            move |mut caller: Caller<'_, HostState>, buf_ptr: i32, buf_cap: i32| -> i32 {
                match produce(caller.data()) {
                    Some(bytes) => write_out(&mut caller, buf_ptr, buf_cap, &bytes),
                    None => -1,
                }
            },
        )
        .map_err(link_err(name))?;
    Ok(())
}

fn create_linker(engine: &Engine) -> Result<Linker<HostState>, RuntimeFault> {
    let mut linker = Linker::new(engine);

    link_keyed(&mut linker, "add_hook", |ctx, key, cb| Some(ctx.add_hook(key, cb)))?;
    link_keyed(&mut linker, "add_command", |ctx, key, cb| Some(ctx.add_command(key, cb)))?;
    link_keyed(&mut linker, "add_match", |ctx, pattern, cb| {
        ctx.add_match(pattern, cb)
            .inspect_err(|e| tracing::warn!(module = %ctx.module_name(), error = %e, "Rejected match registration"))
            .ok()
    })?;
    link_unregister(&mut linker, "del_hook", |ctx, h| ctx.del_hook(h))?;
    link_unregister(&mut linker, "del_command", |ctx, h| ctx.del_command(h))?;
    link_unregister(&mut linker, "del_match", |ctx, h| ctx.del_match(h))?;
    link_lifecycle(&mut linker, "add_pre_init", |ctx, cb| ctx.add_pre_init(cb))?;
    link_lifecycle(&mut linker, "add_post_init", |ctx, cb| ctx.add_post_init(cb))?;
    link_lifecycle(&mut linker, "add_closing", |ctx, cb| ctx.add_closing(cb))?;

    link_output(&mut linker, "event_json", |state| {
        state.event.as_ref().and_then(|e| serde_json::to_vec(&**e).ok())
    })?;
    link_output(&mut linker, "server_info", |state| {
        let server = state.ctx.server_info().ok()?;
        serde_json::to_vec(&*server).ok()
    })?;
    link_output(&mut linker, "host_info", |state| {
        serde_json::to_vec(state.ctx.host_info().ok()?).ok()
    })?;
    link_output(&mut linker, "module_list", |state| {
        serde_json::to_vec(&state.ctx.modules().ok()?.list()).ok()
    })?;
    link_output(&mut linker, "command_prefix", |state| {
        Some(state.ctx.command_prefix().as_bytes().to_vec())
    })?;

    // send_command(command, params_json) -> i32
    linker
        .func_wrap(
            HOST_MODULE,
            "send_command",
            |mut caller: Caller<'_, HostState>,
             cmd_ptr: i32,
             cmd_len: i32,
             params_ptr: i32,
             params_len: i32|
             -> i32 {
                let Some(command) = read_str(&mut caller, cmd_ptr, cmd_len) else {
                    return -1;
                };
                let params = if params_len > 0 {
                    let Some(json) = read_str(&mut caller, params_ptr, params_len) else {
                        return -1;
                    };
                    match serde_json::from_str::<CommandParams>(&json) {
                        Ok(params) => params,
                        Err(_) => return -3,
                    }
                } else {
                    CommandParams::Many(Vec::new())
                };
                send_status(caller.data().ctx.send_command(&command, params))
            },
        )
        .map_err(link_err("send_command"))?;

    // request_capability(name) -> i32
    linker
        .func_wrap(
            HOST_MODULE,
            "request_capability",
            |mut caller: Caller<'_, HostState>, name_ptr: i32, name_len: i32| -> i32 {
                match read_str(&mut caller, name_ptr, name_len) {
                    Some(name) => send_status(caller.data().ctx.request_capability(&name)),
                    None => -1,
                }
            },
        )
        .map_err(link_err("request_capability"))?;

    // event_field(field, index, buf_ptr, buf_cap) -> i32
    linker
        .func_wrap(
            HOST_MODULE,
            "event_field",
            |mut caller: Caller<'_, HostState>,
             field: i32,
             index: i32,
             buf_ptr: i32,
             buf_cap: i32|
             -> i32 {
                let value = caller
                    .data()
                    .event
                    .as_ref()
                    .and_then(|event| event_field(event, field, index));
                match value {
                    Some(value) => write_out(&mut caller, buf_ptr, buf_cap, value.as_bytes()),
                    None => -1,
                }
            },
        )
        .map_err(link_err("event_field"))?;

    // setting(key, buf_ptr, buf_cap) -> i32
    linker
        .func_wrap(
            HOST_MODULE,
            "setting",
            |mut caller: Caller<'_, HostState>,
             key_ptr: i32,
             key_len: i32,
             buf_ptr: i32,
             buf_cap: i32|
             -> i32 {
                let Some(key) = read_str(&mut caller, key_ptr, key_len) else {
                    return -1;
                };
                let json = caller
                    .data()
                    .ctx
                    .setting(&key)
                    .and_then(|value| serde_json::to_vec(value).ok());
                match json {
                    Some(bytes) => write_out(&mut caller, buf_ptr, buf_cap, &bytes),
                    None => -1,
                }
            },
        )
        .map_err(link_err("setting"))?;

    // module_request(op, name) -> i32
    linker
        .func_wrap(
            HOST_MODULE,
            "module_request",
            |mut caller: Caller<'_, HostState>, op: i32, name_ptr: i32, name_len: i32| -> i32 {
                let Some(name) = read_str(&mut caller, name_ptr, name_len) else {
                    return -1;
                };
                let Ok(directory) = caller.data().ctx.modules() else {
                    return -1;
                };
                match op {
                    OP_UNLOAD => directory.request_unload(&name),
                    OP_REFRESH => directory.request_refresh(&name),
                    _ => return -1,
                }
                0
            },
        )
        .map_err(link_err("module_request"))?;

    // log(level, message)
    linker
        .func_wrap(
            HOST_MODULE,
            "log",
            |mut caller: Caller<'_, HostState>, level: i32, msg_ptr: i32, msg_len: i32| {
                let Some(message) = read_str(&mut caller, msg_ptr, msg_len) else {
                    return;
                };
                let module = caller.data().ctx.module_name();
                match level {
                    0 => tracing::error!(module = %module, "{message}"),
                    1 => tracing::warn!(module = %module, "{message}"),
                    2 => tracing::info!(module = %module, "{message}"),
                    3 => tracing::debug!(module = %module, "{message}"),
                    _ => tracing::trace!(module = %module, "{message}"),
                }
            },
        )
        .map_err(link_err("log"))?;

    Ok(linker)
}

fn event_field(event: &MessageEvent, field: i32, index: i32) -> Option<String> {
    let value = match field {
        FIELD_COMMAND => event.command(),
        FIELD_PREFIX => event.prefix(),
        FIELD_PARAM => event.param(usize::try_from(index).ok()?)?,
        FIELD_TRAILING => event.trailing(),
        FIELD_NICK => event.nick()?,
        FIELD_RAW => event.raw(),
        FIELD_TAG => {
            let mut tags: Vec<_> = event.tags().values().collect();
            tags.sort_by(|a, b| a.raw_tag().cmp(b.raw_tag()));
            let tag = tags.get(usize::try_from(index).ok()?)?;
            return Some(match tag.value() {
                Some(value) => format!("{}={}", tag.raw_tag(), value),
                None => tag.raw_tag().to_owned(),
            });
        }
        _ => return None,
    };
    Some(value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::context::{ContextParams, HostInfo};
    use crate::modules::directory::ModuleDirectory;
    use crate::modules::permissions::{Capability, PermissionOverrides, PermissionSet, TrustTier};
    use crate::modules::sink::{CommandSink, OutboundCommand};
    use crate::modules::CallbackKind;
    use crate::state::ServerState;
    use tokio::sync::mpsc;

    fn setup(permissions: PermissionSet) -> (WasmRuntime, CapabilityContext, mpsc::Receiver<OutboundCommand>) {
        let (sink, rx) = CommandSink::channel(16);
        let ctx = CapabilityContext::build(ContextParams {
            module: "wasm-test",
            permissions,
            command_prefix: "!",
            settings: &toml::Table::new(),
            server: &Arc::new(ServerState::default()),
            sink: &sink,
            host: &HostInfo::current(Vec::new()),
            directory: &ModuleDirectory::new(),
        });
        let engine = WasmEngine::new(WasmLimits {
            fuel: 100_000,
            max_memory_mb: 1,
        })
        .unwrap();
        (engine.runtime(ctx.clone()).unwrap(), ctx, rx)
    }

    fn writer() -> PermissionSet {
        PermissionSet::resolve(
            TrustTier::Plugin,
            &PermissionOverrides::default().with(Capability::Writer, true),
        )
    }

    const PONG: &str = r#"
        (module
          (import "slirc" "add_hook" (func $add_hook (param i32 i32 i32 i32) (result i32)))
          (import "slirc" "send_command" (func $send (param i32 i32 i32 i32) (result i32)))
          (import "slirc" "event_field" (func $field (param i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (data (i32.const 0) "PING")
          (data (i32.const 16) "on_ping")
          (data (i32.const 32) "PONG")
          (global $sent (mut i32) (i32.const 0))
          (func (export "init")
            (drop (call $add_hook (i32.const 0) (i32.const 4) (i32.const 16) (i32.const 7))))
          (func (export "on_ping") (result i32)
            (local $len i32)
            ;; write "\"<param0>\"" at 256 as a JSON string
            (i32.store8 (i32.const 256) (i32.const 34))
            (local.set $len (call $field (i32.const 2) (i32.const 0) (i32.const 257) (i32.const 200)))
            (if (i32.lt_s (local.get $len) (i32.const 0)) (then (return (i32.const 1))))
            (i32.store8 (i32.add (i32.const 257) (local.get $len)) (i32.const 34))
            (call $send (i32.const 32) (i32.const 4) (i32.const 256) (i32.add (local.get $len) (i32.const 2)))))
    "#;

    #[test]
    fn init_registers_and_callback_sends() {
        let (mut rt, ctx, mut rx) = setup(writer());
        ctx.tables().begin_generation();
        rt.load(PONG.as_bytes()).unwrap();
        assert_eq!(ctx.tables().len(CallbackKind::Hook), 1);

        let event = Arc::new(MessageEvent::parse("PING :server1"));
        rt.invoke("on_ping", Some(&event)).unwrap();
        let cmd = rx.try_recv().unwrap();
        assert_eq!(cmd.command, "PONG");
        assert_eq!(cmd.params, ["server1"]);
    }

    #[test]
    fn denied_writer_has_no_effect() {
        let (mut rt, _ctx, mut rx) = setup(PermissionSet::default());
        rt.load(PONG.as_bytes()).unwrap();
        let event = Arc::new(MessageEvent::parse("PING :server1"));
        // send_command returns -1, which the callback passes through
        assert!(matches!(
            rt.invoke("on_ping", Some(&event)),
            Err(RuntimeFault::ErrorCode(-1))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn fuel_is_refilled_per_call() {
        let wat = r#"
            (module
              (memory (export "memory") 1)
              (func (export "spin") (local $i i32)
                (loop $l
                  (local.set $i (i32.add (local.get $i) (i32.const 1)))
                  (br_if $l (i32.lt_u (local.get $i) (i32.const 1000)))))
              (func (export "forever") (loop $l (br $l))))
        "#;
        let (mut rt, _ctx, _rx) = setup(PermissionSet::default());
        rt.load(wat.as_bytes()).unwrap();
        for _ in 0..50 {
            rt.invoke("spin", None).unwrap();
        }
        assert!(matches!(rt.invoke("forever", None), Err(RuntimeFault::Trap(_))));
        rt.invoke("spin", None).unwrap();
    }

    #[test]
    fn missing_export_and_bad_source() {
        let (mut rt, _ctx, _rx) = setup(PermissionSet::default());
        assert!(matches!(rt.invoke("x", None), Err(RuntimeFault::NotLoaded)));
        assert!(matches!(rt.load(b"not wasm"), Err(RuntimeFault::Compile(_))));
        rt.load(br#"(module (memory (export "memory") 1))"#).unwrap();
        assert!(matches!(
            rt.invoke("nope", None),
            Err(RuntimeFault::MissingExport(_))
        ));
    }

    #[test]
    fn event_fields() {
        let event = MessageEvent::parse("@+draft/reply=abc :nick!u@h PRIVMSG #room :hi all");
        assert_eq!(event_field(&event, FIELD_COMMAND, 0).as_deref(), Some("PRIVMSG"));
        assert_eq!(event_field(&event, FIELD_PARAM, 0).as_deref(), Some("#room"));
        assert_eq!(event_field(&event, FIELD_PARAM, 9), None);
        assert_eq!(event_field(&event, FIELD_NICK, 0).as_deref(), Some("nick"));
        assert_eq!(event_field(&event, FIELD_TRAILING, 0).as_deref(), Some("hi all"));
        assert_eq!(event_field(&event, FIELD_TAG, 0).as_deref(), Some("+draft/reply=abc"));
        assert_eq!(event_field(&event, 99, 0), None);
    }

    const COUNTER: &str = r#"
        (module
          (memory (export "memory") 1)
          (global $n (mut i32) (i32.const 0))
          (func (export "count") (result i32)
            (global.set $n (i32.add (global.get $n) (i32.const 1)))
            (global.get $n)))
    "#;

    #[test]
    fn refresh_replaces_the_store() {
        let (mut rt, _ctx, _rx) = setup(PermissionSet::default());
        rt.load(COUNTER.as_bytes()).unwrap();
        assert!(matches!(rt.invoke("count", None), Err(RuntimeFault::ErrorCode(1))));
        assert!(matches!(rt.invoke("count", None), Err(RuntimeFault::ErrorCode(2))));

        // Each store admits a single instance, so reloads only succeed when
        // the previous store is dropped.
        for _ in 0..20 {
            rt.refresh(COUNTER.as_bytes()).unwrap();
            assert!(matches!(rt.invoke("count", None), Err(RuntimeFault::ErrorCode(1))));
        }
    }

    #[test]
    fn failed_refresh_keeps_previous_instance() {
        let (mut rt, _ctx, _rx) = setup(PermissionSet::default());
        rt.load(COUNTER.as_bytes()).unwrap();
        assert!(matches!(rt.invoke("count", None), Err(RuntimeFault::ErrorCode(1))));

        assert!(matches!(rt.refresh(b"not wasm"), Err(RuntimeFault::Compile(_))));
        let trapping = r#"(module (memory (export "memory") 1) (func (export "init") unreachable))"#;
        assert!(matches!(rt.refresh(trapping.as_bytes()), Err(RuntimeFault::Trap(_))));

        assert!(matches!(rt.invoke("count", None), Err(RuntimeFault::ErrorCode(2))));
    }
}
