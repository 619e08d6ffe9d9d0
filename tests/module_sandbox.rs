//! Module isolation and dispatch through the public registry API, with WASM
//! modules loaded from disk and native modules registered as builtins.

mod common;

use common::write_module;
use parking_lot::Mutex;
use slircbot::error::{LoadFault, RegistryError, RuntimeFault, SandboxError};
use slircbot::modules::{
    Capability, CapabilityContext, CommandSink, FsLoader, ModuleDescriptor, ModuleRegistry,
    NativeModule, NativeResult, OutboundCommand, PermissionOverrides, RegistryParams, Runtimes,
    SandboxState, TrustTier, WasmLimits,
};
use slircbot::{MessageEvent, ServerState};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Answers PING with PONG <param0> when it holds `writer`.
const PING_WAT: &str = r#"
(module
  (import "slirc" "add_hook" (func $add_hook (param i32 i32 i32 i32) (result i32)))
  (import "slirc" "send_command" (func $send (param i32 i32 i32 i32) (result i32)))
  (import "slirc" "event_field" (func $field (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "PING")
  (data (i32.const 16) "on_ping")
  (data (i32.const 32) "PONG")
  (func (export "init")
    (drop (call $add_hook (i32.const 0) (i32.const 4) (i32.const 16) (i32.const 7))))
  (func (export "on_ping") (result i32)
    (local $len i32)
    (i32.store8 (i32.const 256) (i32.const 34))
    (local.set $len (call $field (i32.const 2) (i32.const 0) (i32.const 257) (i32.const 200)))
    (if (i32.lt_s (local.get $len) (i32.const 0)) (then (return (i32.const 1))))
    (i32.store8 (i32.add (i32.const 257) (local.get $len)) (i32.const 34))
    (call $send (i32.const 32) (i32.const 4) (i32.const 256) (i32.add (local.get $len) (i32.const 2)))))
"#;

/// Two PING hooks: the first traps, the second succeeds.
const FAULTY_WAT: &str = r#"
(module
  (import "slirc" "add_hook" (func $add_hook (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "PING")
  (data (i32.const 16) "boom")
  (data (i32.const 32) "fine")
  (func (export "init")
    (drop (call $add_hook (i32.const 0) (i32.const 4) (i32.const 16) (i32.const 4)))
    (drop (call $add_hook (i32.const 0) (i32.const 4) (i32.const 32) (i32.const 4))))
  (func (export "boom") unreachable)
  (func (export "fine")))
"#;

/// Registers a replacement PING hook, then traps before finishing.
const HALF_WAT: &str = r#"
(module
  (import "slirc" "add_hook" (func $add_hook (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "PING")
  (data (i32.const 16) "new_ping")
  (func (export "init")
    (drop (call $add_hook (i32.const 0) (i32.const 4) (i32.const 16) (i32.const 8)))
    unreachable)
  (func (export "new_ping")))
"#;

/// Top-level code that never finishes.
const SPIN_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "init") (loop $l (br $l))))
"#;

struct Harness {
    registry: ModuleRegistry,
    outbound: mpsc::Receiver<OutboundCommand>,
    server: Arc<ServerState>,
}

impl Harness {
    fn new(dir: &Path, setup: impl FnOnce(&mut Runtimes)) -> Self {
        let mut runtimes = Runtimes::new(WasmLimits {
            fuel: 1_000_000,
            max_memory_mb: 4,
        })
        .unwrap();
        setup(&mut runtimes);
        let (sink, outbound) = CommandSink::channel(64);
        let server = Arc::new(ServerState::default());
        let registry = ModuleRegistry::new(
            RegistryParams {
                runtimes,
                loader: Arc::new(FsLoader::new(dir)),
                sink,
            },
            Arc::clone(&server),
        );
        Self {
            registry,
            outbound,
            server,
        }
    }

    fn activate(&mut self) {
        self.registry.run_pre_init();
        self.registry.run_post_init();
    }

    fn dispatch(&mut self, line: &str) -> Vec<(String, slircbot::modules::HandleOutcome)> {
        let event = Arc::new(MessageEvent::parse(line));
        self.registry.dispatch(&event, &self.server)
    }

    fn sent(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(cmd) = self.outbound.try_recv() {
            lines.push(format!("{} {}", cmd.command, cmd.params.join(" ")));
        }
        lines
    }
}

fn wasm(name: &str, path: &str, writer: bool) -> ModuleDescriptor {
    ModuleDescriptor::new(name, path)
        .unwrap()
        .with_overrides(PermissionOverrides::default().with(Capability::Writer, writer))
}

/// Appends `<module>:<callback>` to a shared log for every call.
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl NativeModule for Recorder {
    fn init(&mut self, ctx: &CapabilityContext) -> NativeResult {
        ctx.add_hook("ping", "a");
        ctx.add_hook("PING", "b");
        ctx.add_match(r"(?i)\bhello\b", "greet")?;
        Ok(())
    }

    fn call(&mut self, callback: &str, _: Option<&MessageEvent>, _: &CapabilityContext) -> NativeResult {
        self.log.lock().push(format!("{}:{callback}", self.name));
        Ok(())
    }
}

#[tokio::test]
async fn test_hook_fires_once_and_refresh_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "ping.wat", PING_WAT);
    let mut h = Harness::new(dir.path(), |_| {});

    h.registry.load(wasm("ping", "ping.wat", true)).await.unwrap();
    h.activate();

    let outcomes = h.dispatch("PING :server1");
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1.hooks.len(), 1);
    assert_eq!(h.sent(), ["PONG server1"]);

    for _ in 0..3 {
        h.registry.refresh("ping").await.unwrap();
    }
    assert_eq!(h.registry.get("ping").unwrap().state(), SandboxState::Active);

    let outcomes = h.dispatch("PING :server2");
    assert_eq!(outcomes[0].1.hooks.len(), 1);
    assert_eq!(h.sent(), ["PONG server2"]);
}

#[tokio::test]
async fn test_failed_refresh_keeps_running_code() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "ping.wat", PING_WAT);
    let mut h = Harness::new(dir.path(), |_| {});

    h.registry.load(wasm("ping", "ping.wat", true)).await.unwrap();
    h.activate();

    write_module(dir.path(), "ping.wat", HALF_WAT);
    let err = h.registry.refresh("ping").await.unwrap_err();
    assert_eq!(err.error_code(), "trap");
    assert_eq!(h.registry.get("ping").unwrap().state(), SandboxState::Active);

    let outcomes = h.dispatch("PING :still-old");
    assert_eq!(outcomes[0].1.hooks.len(), 1);
    assert_eq!(outcomes[0].1.hooks[0].callback, "on_ping");
    assert_eq!(h.sent(), ["PONG still-old"]);

    // Good code afterwards still replaces the old registrations.
    write_module(dir.path(), "ping.wat", PING_WAT);
    h.registry.refresh("ping").await.unwrap();
    assert_eq!(h.dispatch("PING :again")[0].1.hooks.len(), 1);
    assert_eq!(h.sent(), ["PONG again"]);
}

#[tokio::test]
async fn test_writer_is_withheld_without_capability() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "ping.wat", PING_WAT);
    let mut h = Harness::new(dir.path(), |_| {});

    h.registry.load(wasm("ping", "ping.wat", false)).await.unwrap();
    h.activate();

    let outcomes = h.dispatch("PING :server1");
    let hook = &outcomes[0].1.hooks[0];
    let fault = hook.result.as_ref().unwrap_err();
    assert!(matches!(fault.fault, RuntimeFault::ErrorCode(-1)));
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn test_faulting_callback_does_not_stop_siblings() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "faulty.wat", FAULTY_WAT);
    write_module(dir.path(), "ping.wat", PING_WAT);
    let mut h = Harness::new(dir.path(), |_| {});

    h.registry.load(wasm("faulty", "faulty.wat", false)).await.unwrap();
    h.registry.load(wasm("ping", "ping.wat", true)).await.unwrap();
    h.activate();

    for round in 0..2 {
        let outcomes = h.dispatch(&format!("PING :r{round}"));
        let (name, faulty) = &outcomes[0];
        assert_eq!(name, "faulty");
        assert_eq!(faulty.hooks[0].callback, "boom");
        assert!(matches!(
            faulty.hooks[0].result.as_ref().unwrap_err().fault,
            RuntimeFault::Trap(_)
        ));
        assert_eq!(faulty.hooks[1].callback, "fine");
        assert!(faulty.hooks[1].is_ok());
        assert_eq!(faulty.faults().count(), 1);

        assert_eq!(outcomes[1].0, "ping");
        assert_eq!(h.sent(), [format!("PONG r{round}")]);
    }
}

#[tokio::test]
async fn test_runaway_top_level_code_is_a_load_fault() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "spin.wat", SPIN_WAT);
    let mut h = Harness::new(dir.path(), |_| {});

    let err = h
        .registry
        .load(wasm("spin", "spin.wat", false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Sandbox(SandboxError::Load(LoadFault::Runtime {
            fault: RuntimeFault::Trap(_),
            ..
        }))
    ));
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_dispatch_order_across_and_within_modules() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (first_log, second_log) = (Arc::clone(&log), Arc::clone(&log));
    let mut h = Harness::new(dir.path(), move |runtimes| {
        runtimes.register_builtin("first", move |_| {
            Box::new(Recorder {
                name: "first",
                log: Arc::clone(&first_log),
            })
        });
        runtimes.register_builtin("second", move |_| {
            Box::new(Recorder {
                name: "second",
                log: Arc::clone(&second_log),
            })
        });
    });

    for name in ["first", "second"] {
        h.registry
            .load(ModuleDescriptor::builtin(name).unwrap())
            .await
            .unwrap();
    }
    h.activate();

    for _ in 0..3 {
        h.dispatch("PING :x");
    }
    let expected: Vec<String> = ["first:a", "first:b", "second:a", "second:b"]
        .repeat(3)
        .into_iter()
        .map(str::to_owned)
        .collect();
    assert_eq!(*log.lock(), expected);

    log.lock().clear();
    h.dispatch(":alice!a@h PRIVMSG #room :Hello there");
    h.dispatch(":alice!a@h PRIVMSG #room :othello is a play");
    assert_eq!(*log.lock(), ["first:greet", "second:greet"]);
}

/// Refreshes or unloads other modules on request.
struct Manager;

impl NativeModule for Manager {
    fn init(&mut self, ctx: &CapabilityContext) -> NativeResult {
        ctx.add_command("refresh", "refresh");
        ctx.add_command("unload", "unload");
        ctx.add_command("modules", "list");
        Ok(())
    }

    fn call(&mut self, callback: &str, event: Option<&MessageEvent>, ctx: &CapabilityContext) -> NativeResult {
        let directory = ctx.modules()?;
        let target = event
            .and_then(|e| e.trailing().split_whitespace().nth(1))
            .unwrap_or_default();
        match callback {
            "refresh" => directory.request_refresh(target),
            "unload" => directory.request_unload(target),
            "list" => {
                let names: Vec<String> = directory
                    .list()
                    .into_iter()
                    .map(|m| format!("{}={}", m.name, m.state))
                    .collect();
                ctx.send_command("PRIVMSG", ["#room".to_owned(), names.join(",")])?;
            }
            _ => return Err("unknown callback".into()),
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_directory_requests_run_between_events() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "ping.wat", PING_WAT);
    let mut h = Harness::new(dir.path(), |runtimes| {
        runtimes.register_builtin("manager", |_| Box::new(Manager));
    });

    h.registry
        .load(
            ModuleDescriptor::builtin("manager")
                .unwrap()
                .with_command_prefix("!")
                .with_trust(TrustTier::Core),
        )
        .await
        .unwrap();
    h.registry.load(wasm("ping", "ping.wat", true)).await.unwrap();
    h.activate();

    h.dispatch(":admin!a@h PRIVMSG #room :!modules");
    assert_eq!(h.sent(), ["PRIVMSG #room manager=active,ping=active"]);

    h.dispatch(":admin!a@h PRIVMSG #room :!refresh ping");
    assert_eq!(h.registry.service_directory().await, 1);
    h.dispatch("PING :after-refresh");
    assert_eq!(h.sent(), ["PONG after-refresh"]);

    h.dispatch(":admin!a@h PRIVMSG #room :!unload ping");
    assert_eq!(h.registry.get("ping").map(|m| m.state()), Some(SandboxState::Active));
    h.registry.service_directory().await;
    assert!(h.registry.get("ping").is_none());
    assert!(h.dispatch("PING :gone").iter().all(|(name, _)| name != "ping"));
}

#[tokio::test]
async fn test_plugin_without_registry_capability_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::new(dir.path(), |runtimes| {
        runtimes.register_builtin("manager", |_| Box::new(Manager));
    });
    h.registry
        .load(ModuleDescriptor::builtin("manager").unwrap().with_command_prefix("!"))
        .await
        .unwrap();
    h.activate();

    let outcomes = h.dispatch(":admin!a@h PRIVMSG #room :!modules");
    let command = &outcomes[0].1.commands[0];
    assert!(matches!(
        &command.result.as_ref().unwrap_err().fault,
        RuntimeFault::Module(msg) if msg.contains("module_registry")
    ));
    assert!(h.sent().is_empty());
}
