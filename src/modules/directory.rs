//! Module directory: lets a module with the `module_registry` capability see
//! and manage other modules.
//!
//! Requests are queued and carried out by the registry between events, never
//! while a module is executing.

use super::descriptor::ModuleDescriptor;
use super::sandbox::SandboxState;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Public view of one loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub description: String,
    pub state: SandboxState,
}

#[derive(Debug, Clone)]
pub enum DirectoryRequest {
    Load(ModuleDescriptor),
    Unload(String),
    Refresh(String),
}

/// Shared between the registry and every context that holds the capability.
#[derive(Debug, Clone, Default)]
pub struct ModuleDirectory {
    listing: Arc<RwLock<Vec<ModuleSummary>>>,
    requests: Arc<Mutex<VecDeque<DirectoryRequest>>>,
}

impl ModuleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<ModuleSummary> {
        self.listing.read().clone()
    }

    pub fn request_load(&self, descriptor: ModuleDescriptor) {
        self.requests.lock().push_back(DirectoryRequest::Load(descriptor));
    }

    pub fn request_unload(&self, name: &str) {
        self.requests
            .lock()
            .push_back(DirectoryRequest::Unload(name.to_owned()));
    }

    pub fn request_refresh(&self, name: &str) {
        self.requests
            .lock()
            .push_back(DirectoryRequest::Refresh(name.to_owned()));
    }

    pub(crate) fn publish(&self, listing: Vec<ModuleSummary>) {
        *self.listing.write() = listing;
    }

    pub(crate) fn take_requests(&self) -> Vec<DirectoryRequest> {
        self.requests.lock().drain(..).collect()
    }
}
