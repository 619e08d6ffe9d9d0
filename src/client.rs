//! The bot's event loop.
//!
//! ```text
//! pre-init (queues registration) -> connect -> post-init -> flush
//!    ↓
//! tokio::select! { server line | queued command | shutdown }
//!    line: parse -> track state -> dispatch to modules
//!          -> service directory requests -> flush
//!    shutdown: closing -> flush
//! ```
//!
//! Module code runs synchronously on this task. Whatever it queues on the
//! command sink is written to the server before the next line is read.

use crate::config::Config;
use crate::error::ClientError;
use crate::modules::{
    CommandSink, FsLoader, ModuleRegistry, OutboundCommand, RegistryParams, Runtimes,
};
use crate::network::Connection;
use crate::state::{ServerState, StateTracker};
use crate::telemetry::spans;
use slircbot_proto::{LineError, MessageEvent};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, trace, warn};

/// Where to connect and how.
#[derive(Debug, Clone)]
pub struct ClientParams {
    pub address: String,
    pub max_line_length: usize,
}

/// How the event loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The shutdown future completed; closing callbacks ran.
    Shutdown,
    /// The server closed the connection.
    Disconnected,
}

enum SelectResult {
    Line(String),
    Outgoing(OutboundCommand),
    ReadFailed(LineError),
    Disconnected,
    Shutdown,
}

pub struct Client {
    params: ClientParams,
    registry: ModuleRegistry,
    tracker: StateTracker,
    outbound: mpsc::Receiver<OutboundCommand>,
}

impl Client {
    pub fn new(
        params: ClientParams,
        registry: ModuleRegistry,
        tracker: StateTracker,
        outbound: mpsc::Receiver<OutboundCommand>,
    ) -> Self {
        Self {
            params,
            registry,
            tracker,
            outbound,
        }
    }

    /// Build the runtimes, state and registry described by `config`, and
    /// load every enabled module. Module load faults are logged, not fatal.
    pub async fn from_config(config: &Config) -> Result<Self, ClientError> {
        let runtimes = Runtimes::new(config.runtime.limits())?;
        let (sink, outbound) = CommandSink::channel(config.bot.queue_capacity);
        let server = ServerState::new(
            config.identity.to_identity(),
            config.server.password.clone(),
            config.restrictions.clone(),
        );
        let tracker = StateTracker::new(server);

        let mut registry = ModuleRegistry::new(
            RegistryParams {
                runtimes,
                loader: Arc::new(FsLoader::new(&config.bot.module_dir)),
                sink,
            },
            tracker.snapshot(),
        );
        let failed = registry.load_all(config.module_descriptors()?).await;
        info!(
            loaded = registry.len(),
            failed = failed.len(),
            "Modules loaded"
        );

        Ok(Self::new(
            ClientParams {
                address: config.server.address.clone(),
                max_line_length: config.server.max_line_length,
            },
            registry,
            tracker,
            outbound,
        ))
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    /// Connect and run until `shutdown` completes or the server hangs up.
    pub async fn run<F>(mut self, shutdown: F) -> Result<Exit, ClientError>
    where
        F: Future<Output = ()>,
    {
        let span = spans::connection(&self.params.address, &self.tracker.snapshot().identity.nick);
        async move {
            self.registry.update_server(&self.tracker.snapshot());
            self.registry.run_pre_init();

            let mut conn = Connection::connect(&self.params.address, self.params.max_line_length).await?;
            info!(addr = %conn.addr(), "Connected");

            self.registry.run_post_init();
            self.flush(&mut conn).await?;

            tokio::pin!(shutdown);
            loop {
                let select_result = tokio::select! {
                    line = conn.next_line() => match line {
                        Some(Ok(line)) => SelectResult::Line(line),
                        Some(Err(e)) => SelectResult::ReadFailed(e),
                        None => SelectResult::Disconnected,
                    },
                    Some(cmd) = self.outbound.recv() => SelectResult::Outgoing(cmd),
                    () = &mut shutdown => SelectResult::Shutdown,
                };

                match select_result {
                    SelectResult::Line(line) => {
                        self.handle_line(&line).await;
                        self.flush(&mut conn).await?;
                    }
                    SelectResult::Outgoing(cmd) => conn.send(&cmd).await?,
                    SelectResult::ReadFailed(e) => {
                        warn!(error = %e, "Connection read failed");
                        self.close(None).await;
                        return Err(e.into());
                    }
                    SelectResult::Disconnected => {
                        info!("Server closed the connection");
                        self.close(None).await;
                        return Ok(Exit::Disconnected);
                    }
                    SelectResult::Shutdown => {
                        info!("Shutdown signal received - closing modules");
                        self.close(Some(&mut conn)).await;
                        return Ok(Exit::Shutdown);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_line(&mut self, line: &str) {
        trace!(line = %line, "<- server");
        let event = Arc::new(MessageEvent::parse(line));
        crate::metrics::record_line_received(event.is_valid());
        if !event.is_valid() {
            debug!(line = %line, "Unparseable line");
        }

        self.tracker.observe(&event);
        let server = self.tracker.snapshot();
        self.registry.dispatch(&event, &server);

        let serviced = self.registry.service_directory().await;
        if serviced > 0 {
            debug!(requests = serviced, "Serviced module directory requests");
        }
    }

    /// Run closing callbacks and, if the connection is still usable, send
    /// whatever they queued.
    async fn close(&mut self, conn: Option<&mut Connection>) {
        self.registry.update_server(&self.tracker.snapshot());
        self.registry.run_closing();
        match conn {
            Some(conn) => {
                if let Err(e) = self.flush(conn).await {
                    debug!(error = %e, "Failed to flush closing commands");
                }
            }
            None => while self.outbound.try_recv().is_ok() {},
        }
    }

    async fn flush(&mut self, conn: &mut Connection) -> Result<(), ClientError> {
        while let Ok(cmd) = self.outbound.try_recv() {
            conn.send(&cmd).await?;
        }
        Ok(())
    }
}
