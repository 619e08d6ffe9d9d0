//! Prometheus metrics collection for slircbot.
//!
//! - `slircbot_events_dispatched_total{command}` - Events fanned out to modules
//! - `slircbot_callback_runs_total{module, kind}` - Callbacks that completed
//! - `slircbot_callback_faults_total{module, kind, error}` - Callbacks that failed
//! - `slircbot_callback_duration_seconds{kind}` - Callback latency histogram
//! - `slircbot_authorization_denied_total{module}` - Chat triggers suppressed by
//!   channel restrictions (not errors)
//! - `slircbot_load_faults_total{module, error}` - Module loads and refreshes
//!   that failed
//! - `slircbot_modules_active` - Modules currently accepting events

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Transport
// ========================================================================

/// Lines read from the server.
pub static LINES_RECEIVED: OnceLock<IntCounter> = OnceLock::new();

/// Lines that did not parse into a valid message.
pub static INVALID_LINES: OnceLock<IntCounter> = OnceLock::new();

/// Commands written to the server.
pub static COMMANDS_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Commands never written, by reason: `queue_full` when a module's send hit
/// a full outbound queue, `unencodable` when the command could not be put on
/// the wire.
pub static COMMANDS_DROPPED: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Modules
// ========================================================================

pub static EVENTS_DISPATCHED: OnceLock<IntCounterVec> = OnceLock::new();

pub static CALLBACK_RUNS: OnceLock<IntCounterVec> = OnceLock::new();

pub static CALLBACK_FAULTS: OnceLock<IntCounterVec> = OnceLock::new();

pub static CALLBACK_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

pub static AUTHORIZATION_DENIED: OnceLock<IntCounterVec> = OnceLock::new();

pub static LOAD_FAULTS: OnceLock<IntCounterVec> = OnceLock::new();

pub static MODULES_ACTIVE: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called once at startup. Recording before `init` is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(LINES_RECEIVED, IntCounter::new("slircbot_lines_received_total", "Lines read from the server"));
    register!(INVALID_LINES, IntCounter::new("slircbot_invalid_lines_total", "Lines that did not parse"));
    register!(COMMANDS_SENT, IntCounter::new("slircbot_commands_sent_total", "Commands written to the server"));
    register!(COMMANDS_DROPPED, IntCounterVec::new(Opts::new("slircbot_commands_dropped_total", "Commands never written to the server"), &["reason"]));

    register!(EVENTS_DISPATCHED, IntCounterVec::new(Opts::new("slircbot_events_dispatched_total", "Events fanned out to modules"), &["command"]));
    register!(CALLBACK_RUNS, IntCounterVec::new(Opts::new("slircbot_callback_runs_total", "Module callbacks that completed"), &["module", "kind"]));
    register!(CALLBACK_FAULTS, IntCounterVec::new(Opts::new("slircbot_callback_faults_total", "Module callbacks that failed"), &["module", "kind", "error"]));
    register!(CALLBACK_LATENCY, HistogramVec::new(
        HistogramOpts::new("slircbot_callback_duration_seconds", "Module callback latency by kind")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["kind"]));
    register!(AUTHORIZATION_DENIED, IntCounterVec::new(Opts::new("slircbot_authorization_denied_total", "Chat triggers suppressed by channel restrictions"), &["module"]));
    register!(LOAD_FAULTS, IntCounterVec::new(Opts::new("slircbot_load_faults_total", "Module loads and refreshes that failed"), &["module", "error"]));
    register!(MODULES_ACTIVE, IntGauge::new("slircbot_modules_active", "Modules currently accepting events"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn get_counter(metric: &OnceLock<IntCounter>) -> Option<&IntCounter> {
    metric.get()
}

fn get_counter_vec(metric: &OnceLock<IntCounterVec>) -> Option<&IntCounterVec> {
    metric.get()
}

fn get_histogram_vec(metric: &OnceLock<HistogramVec>) -> Option<&HistogramVec> {
    metric.get()
}

#[inline]
pub fn record_line_received(valid: bool) {
    if let Some(c) = get_counter(&LINES_RECEIVED) {
        c.inc();
    }
    if !valid && let Some(c) = get_counter(&INVALID_LINES) {
        c.inc();
    }
}

#[inline]
pub fn record_command_sent() {
    if let Some(c) = get_counter(&COMMANDS_SENT) {
        c.inc();
    }
}

#[inline]
pub fn record_command_dropped(reason: &str) {
    if let Some(c) = get_counter_vec(&COMMANDS_DROPPED) {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_event_dispatched(command: &str) {
    if let Some(c) = get_counter_vec(&EVENTS_DISPATCHED) {
        c.with_label_values(&[command]).inc();
    }
}

#[inline]
pub fn record_callback(module: &str, kind: &str) {
    if let Some(c) = get_counter_vec(&CALLBACK_RUNS) {
        c.with_label_values(&[module, kind]).inc();
    }
}

#[inline]
pub fn record_callback_fault(module: &str, kind: &str, error: &str) {
    if let Some(c) = get_counter_vec(&CALLBACK_FAULTS) {
        c.with_label_values(&[module, kind, error]).inc();
    }
}

/// Record callback latency.
#[inline]
pub fn record_callback_latency(kind: &str, duration_secs: f64) {
    if let Some(h) = get_histogram_vec(&CALLBACK_LATENCY) {
        h.with_label_values(&[kind]).observe(duration_secs);
    }
}

#[inline]
pub fn record_authorization_denied(module: &str) {
    if let Some(c) = get_counter_vec(&AUTHORIZATION_DENIED) {
        c.with_label_values(&[module]).inc();
    }
}

#[inline]
pub fn record_load_fault(module: &str, error: &str) {
    if let Some(c) = get_counter_vec(&LOAD_FAULTS) {
        c.with_label_values(&[module, error]).inc();
    }
}

#[inline]
pub fn set_modules_loaded(count: usize) {
    if let Some(g) = MODULES_ACTIVE.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}
