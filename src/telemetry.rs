//! Telemetry utilities for callback timing and span construction.

use crate::modules::CallbackKind;
use std::time::Instant;

/// Guard for timing one module callback.
///
/// Records latency when dropped.
pub struct CallbackTimer {
    kind: CallbackKind,
    start: Instant,
}

impl CallbackTimer {
    pub fn new(kind: CallbackKind) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }
}

impl Drop for CallbackTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_callback_latency(self.kind.as_str(), duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for the server connection.
    pub fn connection(addr: &str, nick: &str) -> Span {
        info_span!("connection", addr = %addr, nick = %nick)
    }

    /// Span for one event's fan-out.
    pub fn dispatch(command: &str) -> Span {
        info_span!("dispatch", command = %command)
    }

    /// Span for work inside one module.
    pub fn module(name: &str) -> Span {
        info_span!("module", name = %name)
    }
}
