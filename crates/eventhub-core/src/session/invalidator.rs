//! The single path into the cleared session state
//!
//! Explicit logout and the global 401 interceptor both go through
//! [`SessionInvalidator::invalidate`], so their effects cannot drift apart.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::{SessionStore, Ticket};
use crate::http::{ApiClient, ResponseInterceptor, UNAUTHORIZED};
use crate::storage::{DurableStore, TOKEN_KEY, USER_KEY};

/// Where the user is sent when the backend rejects their credential
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Navigator that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNavigator;

impl Navigator for SilentNavigator {
    fn redirect_to_login(&self) {}
}

/// Clears durable storage, the default header and the in-memory identity
#[derive(Clone)]
pub struct SessionInvalidator {
    storage: Arc<dyn DurableStore>,
    store: SessionStore,
}

impl SessionInvalidator {
    pub fn new(storage: Arc<dyn DurableStore>, store: SessionStore) -> Self {
        Self { storage, store }
    }

    /// Never fails; storage errors are logged.
    pub fn invalidate(&self, client: &ApiClient) {
        self.store.clear(|| self.wipe(client));
        info!("Session cleared");
    }

    /// Invalidate only if no session write newer than `ticket` has landed.
    /// Returns whether the session was cleared.
    pub(crate) fn invalidate_if_current(&self, client: &ApiClient, ticket: Ticket) -> bool {
        let cleared = self
            .store
            .clear_if_current(ticket, || self.wipe(client));
        if cleared {
            info!("Session cleared");
        }
        cleared
    }

    fn wipe(&self, client: &ApiClient) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove session entry");
            }
        }
        client.set_credential(None);
    }
}

/// Response interceptor that ends the session on a 401 for the current credential
pub struct SessionInterceptor {
    invalidator: SessionInvalidator,
    navigator: Arc<dyn Navigator>,
}

impl SessionInterceptor {
    pub fn new(invalidator: SessionInvalidator, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            invalidator,
            navigator,
        }
    }
}

impl ResponseInterceptor for SessionInterceptor {
    fn on_response(&self, client: &ApiClient, status: u16, sent: Option<&str>) {
        if status != UNAUTHORIZED {
            return;
        }

        // A credential replaced while the request was in flight says nothing
        // about the current session
        if client.authorization().as_deref() != sent {
            debug!("Superseded credential rejected, keeping session");
            return;
        }

        warn!("Credential rejected by server, ending session");
        self.invalidator.invalidate(client);
        self.navigator.redirect_to_login();
    }
}
