//! Default value functions for configuration.

use std::net::{IpAddr, Ipv4Addr};

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Identity Defaults
// =============================================================================

pub fn default_ident() -> String {
    "slircbot".to_string()
}

pub fn default_realname() -> String {
    "slircbot".to_string()
}

// =============================================================================
// Bot Defaults
// =============================================================================

pub fn default_command_prefix() -> String {
    "!".to_string()
}

pub fn default_module_dir() -> String {
    "modules".to_string()
}

/// Outbound commands buffered before modules see `QueueFull`.
pub fn default_queue_capacity() -> usize {
    256
}

pub fn default_metrics_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

// =============================================================================
// Runtime Defaults
// =============================================================================

/// Fuel granted to a WASM module per execution.
pub fn default_fuel() -> u64 {
    10_000_000
}

pub fn default_max_memory_mb() -> usize {
    16
}

/// Longest line accepted from the server: 8191 bytes of tags plus 512 of
/// message.
pub fn default_max_line_length() -> usize {
    8191 + 512
}
