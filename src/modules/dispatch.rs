//! Per-module dispatch tables and lifecycle lists.
//!
//! A callback is the name the module's runtime knows it by (an export for
//! WASM modules, a method name for native ones). Every registration returns a
//! [`CallbackHandle`] unique within the module.
//!
//! Registrations carry the generation they were made in. Each execution of a
//! module's top-level code starts a new generation; the first registration
//! under a key in a newer generation drops that key's older entries, so
//! repeated refreshes never duplicate callbacks.

use crate::error::{CallbackFault, DispatchError};
use regex::Regex;
use slircbot_proto::MessageEvent;
use std::fmt;

/// Opaque registration handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(pub u64);

/// Which table or lifecycle list a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Hook,
    Command,
    Match,
    PreInit,
    PostInit,
    Closing,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hook => "hook",
            Self::Command => "command",
            Self::Match => "match",
            Self::PreInit => "pre_init",
            Self::PostInit => "post_init",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phases with their own callback lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreInit,
    PostInit,
    Closing,
}

impl Phase {
    pub fn kind(self) -> CallbackKind {
        match self {
            Self::PreInit => CallbackKind::PreInit,
            Self::PostInit => CallbackKind::PostInit,
            Self::Closing => CallbackKind::Closing,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::PreInit => 0,
            Self::PostInit => 1,
            Self::Closing => 2,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    handle: CallbackHandle,
    key: String,
    callback: String,
    generation: u64,
    pattern: Option<Regex>,
}

/// A callback selected to run for one event or phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: CallbackKind,
    pub handle: CallbackHandle,
    pub key: String,
    pub callback: String,
}

/// Result of running one callback.
#[derive(Debug)]
pub struct CallbackOutcome {
    pub kind: CallbackKind,
    pub handle: CallbackHandle,
    pub key: String,
    pub callback: String,
    pub result: Result<(), CallbackFault>,
}

impl CallbackOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Hooks, commands and matches for one module, plus its lifecycle lists.
#[derive(Debug, Clone, Default)]
pub struct DispatchTables {
    next_handle: u64,
    generation: u64,
    hooks: Vec<Entry>,
    commands: Vec<Entry>,
    matches: Vec<Entry>,
    lifecycle: [Vec<Entry>; 3],
}

impl DispatchTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new registration generation. Call before each execution of
    /// the module's top-level code.
    pub fn begin_generation(&mut self) {
        self.generation += 1;
    }

    /// Register `callback` for inbound events whose command is `command`
    /// (ASCII case-insensitive).
    pub fn add_hook(&mut self, command: &str, callback: &str) -> CallbackHandle {
        let entry = self.entry(command, callback, None);
        insert_keyed(&mut self.hooks, entry, |a, b| a.eq_ignore_ascii_case(b))
    }

    /// Register `callback` for chat messages whose first word is the module's
    /// command prefix followed by `name`.
    pub fn add_command(&mut self, name: &str, callback: &str) -> CallbackHandle {
        let entry = self.entry(name, callback, None);
        insert_keyed(&mut self.commands, entry, |a, b| a == b)
    }

    /// Register `callback` for chat messages whose text matches `pattern`.
    pub fn add_match(&mut self, pattern: &str, callback: &str) -> Result<CallbackHandle, DispatchError> {
        let regex = Regex::new(pattern).map_err(|source| DispatchError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        let entry = self.entry(pattern, callback, Some(regex));
        Ok(insert_keyed(&mut self.matches, entry, |a, b| a == b))
    }

    /// Append `callback` to a lifecycle list.
    pub fn add_lifecycle(&mut self, phase: Phase, callback: &str) -> CallbackHandle {
        let generation = self.generation;
        let list = &mut self.lifecycle[phase.index()];
        if list.iter().any(|e| e.generation < generation) {
            list.clear();
        }
        let entry = self.entry(phase.kind().as_str(), callback, None);
        let handle = entry.handle;
        self.lifecycle[phase.index()].push(entry);
        handle
    }

    pub fn del_hook(&mut self, handle: CallbackHandle) -> bool {
        remove_handle(&mut self.hooks, handle)
    }

    pub fn del_command(&mut self, handle: CallbackHandle) -> bool {
        remove_handle(&mut self.commands, handle)
    }

    pub fn del_match(&mut self, handle: CallbackHandle) -> bool {
        remove_handle(&mut self.matches, handle)
    }

    /// Remove a registration from whichever table or list holds it.
    pub fn remove(&mut self, handle: CallbackHandle) -> bool {
        self.del_hook(handle)
            || self.del_command(handle)
            || self.del_match(handle)
            || self.lifecycle.iter_mut().any(|list| remove_handle(list, handle))
    }

    pub fn len(&self, kind: CallbackKind) -> usize {
        match kind {
            CallbackKind::Hook => self.hooks.len(),
            CallbackKind::Command => self.commands.len(),
            CallbackKind::Match => self.matches.len(),
            CallbackKind::PreInit => self.lifecycle[Phase::PreInit.index()].len(),
            CallbackKind::PostInit => self.lifecycle[Phase::PostInit.index()].len(),
            CallbackKind::Closing => self.lifecycle[Phase::Closing.index()].len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
            && self.commands.is_empty()
            && self.matches.is_empty()
            && self.lifecycle.iter().all(Vec::is_empty)
    }

    /// Hooks registered for the event's command, in registration order.
    pub fn hook_targets(&self, event: &MessageEvent) -> Vec<Target> {
        let command = event.command();
        if command.is_empty() {
            return Vec::new();
        }
        targets(CallbackKind::Hook, &self.hooks, |e| e.key.eq_ignore_ascii_case(command))
    }

    /// Commands named by the first word of the trailing text, which must
    /// start with `prefix`.
    pub fn command_targets(&self, event: &MessageEvent, prefix: &str) -> Vec<Target> {
        let Some(word) = event.trailing().split_whitespace().next() else {
            return Vec::new();
        };
        let Some(name) = word.strip_prefix(prefix) else {
            return Vec::new();
        };
        if name.is_empty() {
            return Vec::new();
        }
        targets(CallbackKind::Command, &self.commands, |e| e.key == name)
    }

    /// Matches whose pattern matches the trailing text.
    pub fn match_targets(&self, event: &MessageEvent) -> Vec<Target> {
        let text = event.trailing();
        targets(CallbackKind::Match, &self.matches, |e| {
            e.pattern.as_ref().is_some_and(|re| re.is_match(text))
        })
    }

    /// Lifecycle callbacks for `phase`, in registration order.
    pub fn lifecycle_targets(&self, phase: Phase) -> Vec<Target> {
        targets(phase.kind(), &self.lifecycle[phase.index()], |_| true)
    }

    /// Run every callback in `table` that applies to `event`.
    pub fn run<F>(&self, kind: CallbackKind, event: &MessageEvent, prefix: &str, invoke: F) -> Vec<CallbackOutcome>
    where
        F: FnMut(&Target) -> Result<(), CallbackFault>,
    {
        let selected = match kind {
            CallbackKind::Hook => self.hook_targets(event),
            CallbackKind::Command => self.command_targets(event, prefix),
            CallbackKind::Match => self.match_targets(event),
            CallbackKind::PreInit => self.lifecycle_targets(Phase::PreInit),
            CallbackKind::PostInit => self.lifecycle_targets(Phase::PostInit),
            CallbackKind::Closing => self.lifecycle_targets(Phase::Closing),
        };
        run_targets(selected, invoke)
    }

    fn entry(&mut self, key: &str, callback: &str, pattern: Option<Regex>) -> Entry {
        self.next_handle += 1;
        Entry {
            handle: CallbackHandle(self.next_handle),
            key: key.to_owned(),
            callback: callback.to_owned(),
            generation: self.generation,
            pattern,
        }
    }
}

/// Invoke each target in order. A failure never stops the next target.
pub fn run_targets<F>(targets: Vec<Target>, mut invoke: F) -> Vec<CallbackOutcome>
where
    F: FnMut(&Target) -> Result<(), CallbackFault>,
{
    targets
        .into_iter()
        .map(|target| {
            let result = invoke(&target);
            CallbackOutcome {
                kind: target.kind,
                handle: target.handle,
                key: target.key,
                callback: target.callback,
                result,
            }
        })
        .collect()
}

fn insert_keyed(table: &mut Vec<Entry>, entry: Entry, same_key: impl Fn(&str, &str) -> bool) -> CallbackHandle {
    let handle = entry.handle;
    table.retain(|e| !(same_key(&e.key, &entry.key) && e.generation < entry.generation));
    table.push(entry);
    handle
}

fn remove_handle(table: &mut Vec<Entry>, handle: CallbackHandle) -> bool {
    let before = table.len();
    table.retain(|e| e.handle != handle);
    table.len() != before
}

fn targets(kind: CallbackKind, table: &[Entry], filter: impl Fn(&Entry) -> bool) -> Vec<Target> {
    table
        .iter()
        .filter(|e| filter(e))
        .map(|e| Target {
            kind,
            handle: e.handle,
            key: e.key.clone(),
            callback: e.callback.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeFault;

    fn ev(line: &str) -> MessageEvent {
        MessageEvent::parse(line)
    }

    fn names(targets: &[Target]) -> Vec<&str> {
        targets.iter().map(|t| t.callback.as_str()).collect()
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let mut tables = DispatchTables::new();
        tables.begin_generation();
        tables.add_hook("PING", "a");
        tables.add_hook("PRIVMSG", "x");
        tables.add_hook("ping", "b");

        for _ in 0..3 {
            let mut seen = Vec::new();
            let outcomes = tables.run(CallbackKind::Hook, &ev("PING :server1"), "", |t| {
                seen.push(t.callback.clone());
                Ok(())
            });
            assert_eq!(seen, ["a", "b"]);
            assert!(outcomes.iter().all(CallbackOutcome::is_ok));
        }
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let mut tables = DispatchTables::new();
        tables.begin_generation();
        tables.add_hook("PING", "bad");
        tables.add_hook("PING", "good");

        let outcomes = tables.run(CallbackKind::Hook, &ev("PING :x"), "", |t| {
            if t.callback == "bad" {
                Err(CallbackFault {
                    module: "m".into(),
                    kind: "hook",
                    callback: t.callback.clone(),
                    fault: RuntimeFault::ErrorCode(1),
                })
            } else {
                Ok(())
            }
        });
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_ok());
        assert!(outcomes[1].is_ok());
    }

    #[test]
    fn commands_require_prefix() {
        let mut tables = DispatchTables::new();
        tables.begin_generation();
        tables.add_command("hello", "on_hello");

        let hit = ev(":a!b@c PRIVMSG #room :!hello there");
        assert_eq!(names(&tables.command_targets(&hit, "!")), ["on_hello"]);

        let no_prefix = ev(":a!b@c PRIVMSG #room :hello there");
        assert!(tables.command_targets(&no_prefix, "!").is_empty());
        assert_eq!(names(&tables.command_targets(&no_prefix, "")), ["on_hello"]);

        let other = ev(":a!b@c PRIVMSG #room :!helloooo");
        assert!(tables.command_targets(&other, "!").is_empty());

        let bare = ev(":a!b@c PRIVMSG #room :!");
        assert!(tables.command_targets(&bare, "!").is_empty());
    }

    #[test]
    fn matches_use_regex() {
        let mut tables = DispatchTables::new();
        tables.begin_generation();
        tables.add_match(r"https?://\S+", "on_url").unwrap();

        let hit = ev(":a!b@c PRIVMSG #room :see https://example.net now");
        assert_eq!(names(&tables.match_targets(&hit)), ["on_url"]);
        assert!(tables.match_targets(&ev(":a!b@c PRIVMSG #room :nothing")).is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut tables = DispatchTables::new();
        let err = tables.add_match("(unclosed", "cb").unwrap_err();
        assert_eq!(err.error_code(), "invalid_pattern");
        assert_eq!(tables.len(CallbackKind::Match), 0);
    }

    #[test]
    fn newer_generation_replaces_key() {
        let mut tables = DispatchTables::new();
        tables.begin_generation();
        tables.add_hook("PING", "pong");
        tables.add_hook("PING", "log_ping");
        tables.add_lifecycle(Phase::PreInit, "register");

        tables.begin_generation();
        tables.add_hook("PING", "pong");
        tables.add_lifecycle(Phase::PreInit, "register");

        assert_eq!(tables.len(CallbackKind::Hook), 1);
        assert_eq!(tables.len(CallbackKind::PreInit), 1);
        assert_eq!(names(&tables.hook_targets(&ev("PING :x"))), ["pong"]);
    }

    #[test]
    fn untouched_keys_survive_new_generation() {
        let mut tables = DispatchTables::new();
        tables.begin_generation();
        tables.add_hook("PING", "pong");
        tables.add_command("hello", "on_hello");

        tables.begin_generation();
        tables.add_hook("PING", "pong");

        assert_eq!(tables.len(CallbackKind::Command), 1);
    }

    #[test]
    fn handles_are_unique_and_removable() {
        let mut tables = DispatchTables::new();
        let a = tables.add_hook("PING", "a");
        let b = tables.add_command("hello", "b");
        let c = tables.add_lifecycle(Phase::Closing, "c");
        assert!(a != b && b != c && a != c);

        assert!(!tables.del_hook(b));
        assert!(tables.del_command(b));
        assert!(tables.remove(c));
        assert!(tables.remove(a));
        assert!(!tables.remove(a));
        assert!(tables.is_empty());
    }
}
