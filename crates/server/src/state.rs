//! Application state

use std::sync::Arc;

use crate::email_store::EmailStore;
use crate::presence_registry::PresenceRegistry;

/// Shared handles injected into every request handler
#[derive(Clone)]
pub struct AppState {
    registry: Arc<PresenceRegistry>,
    emails: EmailStore,
    dev_mode: bool,
}

impl AppState {
    pub fn new(registry: Arc<PresenceRegistry>, emails: EmailStore, dev_mode: bool) -> Self {
        Self {
            registry,
            emails,
            dev_mode,
        }
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn emails(&self) -> &EmailStore {
        &self.emails
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }
}
