//! Modules compiled into the host.

mod client;

pub use client::CoreModule;

use super::runtime::Runtimes;

/// Register every builtin under its catalog name.
pub(crate) fn register_all(runtimes: &mut Runtimes) {
    runtimes.register_builtin("core", |descriptor| {
        Box::new(CoreModule::from_settings(descriptor.settings()))
    });
}
