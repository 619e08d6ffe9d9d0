//! Integration test common infrastructure.
//!
//! Provides a scripted fake IRC server, sample modules, and helpers for
//! building bot configurations on disk.

pub mod server;

#[allow(unused_imports)]
pub use server::{FakePeer, FakeServer};

use std::path::Path;

/// `!echo` answers "heard you" in the channel. Needs `writer`.
#[allow(dead_code)]
pub const ECHO_WAT: &str = include_str!("../../demos/echo.wat");

/// Write `source` into `dir/name`.
#[allow(dead_code)]
pub fn write_module(dir: &Path, name: &str, source: &str) {
    std::fs::write(dir.join(name), source).expect("write module source");
}
