//! The `core` builtin: client registration and connection upkeep.
//!
//! Settings (all optional):
//!
//! ```toml
//! alt_nick = "slircbot_"
//! capabilities = ["multi-prefix", "away-notify"]
//! quit_message = "Shutting down"
//! ```

use crate::modules::context::CapabilityContext;
use crate::modules::runtime::{NativeModule, NativeResult};
use slircbot_proto::MessageEvent;

const DEFAULT_QUIT_MESSAGE: &str = "Shutting down";

#[derive(Debug, Clone, Default)]
pub struct CoreModule {
    alt_nick: Option<String>,
    capabilities: Vec<String>,
    quit_message: Option<String>,
}

impl CoreModule {
    pub fn from_settings(settings: &toml::Table) -> Self {
        let text = |key: &str| settings.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        Self {
            alt_nick: text("alt_nick"),
            capabilities: settings
                .get("capabilities")
                .and_then(|v| v.as_array())
                .map(|caps| {
                    caps.iter()
                        .filter_map(|c| c.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default(),
            quit_message: text("quit_message"),
        }
    }

    /// Send CAP REQ (if configured), PASS, NICK and USER.
    fn register_client(&self, ctx: &CapabilityContext) -> NativeResult {
        let server = ctx.server_info()?;
        let identity = &server.identity;

        if !self.capabilities.is_empty() {
            ctx.request_capability(&self.capabilities.join(" "))?;
        }
        if let Some(pass) = &server.pass {
            ctx.send_command("PASS", pass.as_str())?;
        }
        ctx.send_command("NICK", identity.nick.as_str())?;
        ctx.send_command(
            "USER",
            [identity.ident.as_str(), "*", "*", identity.realname.as_str()],
        )?;
        Ok(())
    }

    fn pong(&self, event: &MessageEvent, ctx: &CapabilityContext) -> NativeResult {
        if let Some(token) = event.param(0) {
            ctx.send_command("PONG", token)?;
        }
        Ok(())
    }

    /// ERR_NICKNAMEINUSE during registration: try the alternate nick, then
    /// keep appending `_`.
    fn next_nick(&self, event: &MessageEvent, ctx: &CapabilityContext) -> NativeResult {
        if ctx.server_info()?.registered {
            return Ok(());
        }
        let Some(attempted) = event.param(1) else {
            return Ok(());
        };
        let next = match &self.alt_nick {
            Some(alt) if alt != attempted => alt.clone(),
            _ => format!("{attempted}_"),
        };
        ctx.send_command("NICK", next)?;
        Ok(())
    }

    /// Close negotiation once the registration-time request is answered.
    /// Later ACK/NAKs answer requests made by other modules.
    fn end_negotiation(&self, event: &MessageEvent, ctx: &CapabilityContext) -> NativeResult {
        if ctx.server_info()?.registered {
            return Ok(());
        }
        if matches!(event.param(1), Some("ACK" | "NAK")) {
            ctx.send_command("CAP", "END")?;
        }
        Ok(())
    }
}

impl NativeModule for CoreModule {
    fn init(&mut self, ctx: &CapabilityContext) -> NativeResult {
        ctx.add_pre_init("register_client");
        ctx.add_hook("PING", "pong");
        ctx.add_hook("433", "next_nick");
        if !self.capabilities.is_empty() {
            ctx.add_hook("CAP", "end_negotiation");
        }
        ctx.add_closing("quit");
        Ok(())
    }

    fn call(
        &mut self,
        callback: &str,
        event: Option<&MessageEvent>,
        ctx: &CapabilityContext,
    ) -> NativeResult {
        match (callback, event) {
            ("register_client", _) => self.register_client(ctx),
            ("quit", _) => {
                let message = self.quit_message.as_deref().unwrap_or(DEFAULT_QUIT_MESSAGE);
                ctx.send_command("QUIT", message)?;
                Ok(())
            }
            ("pong", Some(event)) => self.pong(event, ctx),
            ("next_nick", Some(event)) => self.next_nick(event, ctx),
            ("end_negotiation", Some(event)) => self.end_negotiation(event, ctx),
            (other, _) => Err(format!("unknown callback {other:?}").into()),
        }
    }
}
