//! One module's isolated execution environment and lifecycle.
//!
//! ```text
//! Constructed -> Loaded -> PreInitialized -> Active -> Closing -> Closed
//! ```
//!
//! Transitions only move forward. Only `Active` accepts events. A failed
//! load leaves the sandbox `Constructed`.

use super::context::CapabilityContext;
use super::descriptor::ModuleDescriptor;
use super::dispatch::{CallbackOutcome, Phase, Target, run_targets};
use super::permissions::PermissionSet;
use super::runtime::ModuleRuntime;
use crate::error::{CallbackFault, LoadFault, SandboxError};
use crate::state::ServerState;
use crate::telemetry::CallbackTimer;
use serde::Serialize;
use slircbot_proto::{ChannelExt, MessageEvent};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Constructed,
    Loaded,
    PreInitialized,
    Active,
    Closing,
    Closed,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Loaded => "loaded",
            Self::PreInitialized => "pre_initialized",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the channel-role gate on a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Authorization {
    /// Not a chat message, not addressed to a channel, or the channel has no
    /// minimum role.
    #[default]
    NotApplicable,
    Granted,
    /// Commands and matches were suppressed. Not an error.
    Denied,
}

/// Everything that ran for one event in one module.
#[derive(Debug, Default)]
pub struct HandleOutcome {
    pub hooks: Vec<CallbackOutcome>,
    pub commands: Vec<CallbackOutcome>,
    pub matches: Vec<CallbackOutcome>,
    pub authorization: Authorization,
}

impl HandleOutcome {
    pub fn faults(&self) -> impl Iterator<Item = &CallbackFault> {
        self.hooks
            .iter()
            .chain(&self.commands)
            .chain(&self.matches)
            .filter_map(|o| o.result.as_ref().err())
    }
}

/// Gate chat messages on the channel's configured minimum role.
///
/// Users the state knows nothing about are denied in restricted channels.
pub fn authorize(event: &MessageEvent, server: &ServerState) -> Authorization {
    let Some(channel) = event.param(0) else {
        return Authorization::NotApplicable;
    };
    if !channel.is_channel_name() {
        return Authorization::NotApplicable;
    }
    let Some(required) = server.restriction(channel) else {
        return Authorization::NotApplicable;
    };
    match event.nick().and_then(|nick| server.role_in(nick, channel)) {
        Some(role) if role >= required => Authorization::Granted,
        _ => Authorization::Denied,
    }
}

pub struct ModuleSandbox {
    descriptor: ModuleDescriptor,
    context: CapabilityContext,
    runtime: Box<dyn ModuleRuntime>,
    state: SandboxState,
}

impl ModuleSandbox {
    pub fn new(
        descriptor: ModuleDescriptor,
        context: CapabilityContext,
        runtime: Box<dyn ModuleRuntime>,
    ) -> Self {
        Self {
            descriptor,
            context,
            runtime,
            state: SandboxState::Constructed,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn permissions(&self) -> PermissionSet {
        self.context.permissions()
    }

    pub fn context(&self) -> &CapabilityContext {
        &self.context
    }

    /// Execute the module's top-level code for the first time.
    pub fn load(&mut self, source: &[u8], server: &Arc<ServerState>) -> Result<(), SandboxError> {
        self.require("load", &[SandboxState::Constructed])?;
        self.execute_top_level(source, server, false)?;
        self.state = SandboxState::Loaded;
        Ok(())
    }

    /// Execute new top-level code against the existing context. Registrations
    /// made now replace earlier ones under the same key.
    pub fn refresh(&mut self, source: &[u8], server: &Arc<ServerState>) -> Result<(), SandboxError> {
        self.require(
            "refresh",
            &[
                SandboxState::Loaded,
                SandboxState::PreInitialized,
                SandboxState::Active,
            ],
        )?;
        self.execute_top_level(source, server, true)?;
        Ok(())
    }

    pub fn run_pre_init(&mut self, server: &Arc<ServerState>) -> Result<Vec<CallbackOutcome>, SandboxError> {
        self.require("run pre-init", &[SandboxState::Loaded])?;
        let outcomes = self.run_phase(Phase::PreInit, server);
        self.state = SandboxState::PreInitialized;
        Ok(outcomes)
    }

    pub fn run_post_init(&mut self, server: &Arc<ServerState>) -> Result<Vec<CallbackOutcome>, SandboxError> {
        self.require("run post-init", &[SandboxState::PreInitialized])?;
        let outcomes = self.run_phase(Phase::PostInit, server);
        self.state = SandboxState::Active;
        Ok(outcomes)
    }

    pub fn run_closing(&mut self, server: &Arc<ServerState>) -> Result<Vec<CallbackOutcome>, SandboxError> {
        self.require(
            "close",
            &[
                SandboxState::Loaded,
                SandboxState::PreInitialized,
                SandboxState::Active,
            ],
        )?;
        self.state = SandboxState::Closing;
        let outcomes = self.run_phase(Phase::Closing, server);
        self.state = SandboxState::Closed;
        Ok(outcomes)
    }

    /// Dispatch one event: hooks always, then commands and matches for
    /// authorized chat messages.
    pub fn handle(
        &mut self,
        event: &Arc<MessageEvent>,
        server: &Arc<ServerState>,
    ) -> Result<HandleOutcome, SandboxError> {
        self.require("handle events", &[SandboxState::Active])?;
        self.context.update_server(server);

        let mut outcome = HandleOutcome::default();
        let targets = self.context.tables().hook_targets(event);
        outcome.hooks = self.execute(targets, Some(event));

        if event.command() != "PRIVMSG" {
            return Ok(outcome);
        }

        outcome.authorization = authorize(event, server);
        if outcome.authorization == Authorization::Denied {
            debug!(
                module = %self.name(),
                channel = event.param(0).unwrap_or_default(),
                nick = event.nick().unwrap_or_default(),
                "Chat triggers suppressed by channel restriction"
            );
            crate::metrics::record_authorization_denied(self.name());
            return Ok(outcome);
        }

        let targets = self
            .context
            .tables()
            .command_targets(event, self.context.command_prefix());
        outcome.commands = self.execute(targets, Some(event));

        let targets = self.context.tables().match_targets(event);
        outcome.matches = self.execute(targets, Some(event));

        Ok(outcome)
    }

    fn require(&self, operation: &'static str, allowed: &[SandboxState]) -> Result<(), SandboxError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SandboxError::InvalidTransition {
                module: self.name().to_owned(),
                operation,
                state: self.state,
            })
        }
    }

    fn execute_top_level(
        &mut self,
        source: &[u8],
        server: &Arc<ServerState>,
        refresh: bool,
    ) -> Result<(), LoadFault> {
        self.context.update_server(server);
        let committed = {
            let mut tables = self.context.tables();
            let snapshot = tables.clone();
            tables.begin_generation();
            snapshot
        };

        let result = if refresh {
            self.runtime.refresh(source)
        } else {
            self.runtime.load(source)
        };
        // Partial registrations from failed code never become visible.
        if result.is_err() {
            *self.context.tables() = committed;
        }
        result.map_err(|fault| LoadFault::Runtime {
            module: self.name().to_owned(),
            fault,
        })
    }

    fn run_phase(&mut self, phase: Phase, server: &Arc<ServerState>) -> Vec<CallbackOutcome> {
        self.context.update_server(server);
        let targets = self.context.tables().lifecycle_targets(phase);
        self.execute(targets, None)
    }

    /// Run callbacks in order, isolating and reporting each failure.
    fn execute(&mut self, targets: Vec<Target>, event: Option<&Arc<MessageEvent>>) -> Vec<CallbackOutcome> {
        let module = self.descriptor.name();
        let runtime = &mut self.runtime;

        run_targets(targets, |target| {
            let _timer = CallbackTimer::new(target.kind);
            let result = runtime
                .invoke(&target.callback, event)
                .map_err(|fault| CallbackFault {
                    module: module.to_owned(),
                    kind: target.kind.as_str(),
                    callback: target.callback.clone(),
                    fault,
                });

            match &result {
                Ok(()) => crate::metrics::record_callback(module, target.kind.as_str()),
                Err(e) => {
                    warn!(
                        module = %module,
                        kind = %target.kind,
                        callback = %target.callback,
                        error = %e.fault,
                        "Module callback failed"
                    );
                    crate::metrics::record_callback_fault(module, target.kind.as_str(), e.error_code());
                }
            }
            result
        })
    }
}
