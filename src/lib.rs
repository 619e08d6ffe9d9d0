//! slircbot - sandboxed module host for IRC bots.
//!
//! Lines from the server are parsed into [`MessageEvent`]s, folded into a
//! live [`ServerState`], and fanned out to modules. Each module runs in its
//! own [`ModuleSandbox`](modules::ModuleSandbox) and sees only the
//! capabilities its configuration grants.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod modules;
pub mod network;
pub mod state;
pub mod telemetry;

pub use client::{Client, ClientParams, Exit};
pub use config::Config;
pub use slircbot_proto::MessageEvent;
pub use state::{ServerState, StateTracker};
