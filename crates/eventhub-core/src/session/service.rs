//! Session lifecycle controller
//!
//! Orchestrates login, logout, registration, profile refresh/update and
//! startup revalidation. Every request failure is turned into a displayable
//! [`Error::Session`] using the server's `error` field when present.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::identity::{
    Identity, LoginRequest, LoginResponse, PasswordChange, ProfilePatch, ProfileUpdate,
    Registration,
};
use super::invalidator::{Navigator, SessionInterceptor, SessionInvalidator, SilentNavigator};
use super::store::{SessionSnapshot, SessionStore, Ticket};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::ApiClient;
use crate::storage::{self, DurableStore, TOKEN_KEY, USER_KEY};

const LOGIN_PATH: &str = "/login";
const REGISTER_PATH: &str = "/register";
const PROFILE_PATH: &str = "/profile";
const CHANGE_PASSWORD_PATH: &str = "/change-password";

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const UPDATE_FAILED: &str = "Failed to update profile";
const REFRESH_FAILED: &str = "Failed to refresh user data";
const CHANGE_PASSWORD_FAILED: &str = "Failed to change password";

/// Session service: owns the credential and drives the session store
///
/// Cheap to clone; clones share the client, storage and store.
#[derive(Clone)]
pub struct SessionService {
    client: ApiClient,
    storage: Arc<dyn DurableStore>,
    store: SessionStore,
    invalidator: SessionInvalidator,
    started: Arc<AtomicBool>,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("client", &self.client)
            .field("store", &self.store)
            .finish()
    }
}

/// Builder wiring storage, store, interceptor and client together
#[derive(Default)]
pub struct SessionServiceBuilder {
    config: Option<Config>,
    base_url: Option<String>,
    storage: Option<Arc<dyn DurableStore>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl SessionServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Override `api.base_url`
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Durable storage (defaults to the backend named in the config)
    pub fn storage(mut self, storage: Arc<dyn DurableStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Navigator invoked after a 401 (defaults to [`SilentNavigator`])
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn build(self) -> Result<SessionService> {
        let mut config = self.config.unwrap_or_default();
        if let Some(url) = self.base_url {
            config.api.base_url = url;
        }

        let storage = match self.storage {
            Some(storage) => storage,
            None => storage::open(&config.storage)?,
        };
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(SilentNavigator));

        let store = SessionStore::new();
        let invalidator = SessionInvalidator::new(storage.clone(), store.clone());
        let interceptor = SessionInterceptor::new(invalidator.clone(), navigator);

        let client = ApiClient::builder()
            .config(&config.api)
            .interceptor(Arc::new(interceptor))
            .build()?;

        Ok(SessionService {
            client,
            storage,
            store,
            invalidator,
            started: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl SessionService {
    pub fn builder() -> SessionServiceBuilder {
        SessionServiceBuilder::new()
    }

    /// Shared client for resource calls; carries the session credential
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.store.identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    // ========== Lifecycle ==========

    /// Startup revalidation. Runs once until [`SessionService::shutdown`].
    ///
    /// A stored credential is checked against `GET /profile`. Any failure
    /// logs out silently; the caller only sees the resulting snapshot. A
    /// failure never clears a session established while the check was in
    /// flight.
    ///
    /// Concurrent callers wait for the first one to finish and get the same
    /// ready snapshot. After a shutdown they wait for the next start.
    pub async fn start(&self) -> SessionSnapshot {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Session already starting, waiting for revalidation");
            let mut rx = self.store.subscribe();
            if rx.wait_for(|snapshot| snapshot.ready).await.is_err() {
                warn!("Session store closed while waiting for revalidation");
            }
            return self.store.snapshot();
        }

        let (ticket, armed) = self.store.begin(|current| {
            if current.identity.is_some() {
                return false;
            }
            match self.stored_credential() {
                Some(token) => {
                    self.client.set_credential(Some(&token));
                    true
                }
                None => false,
            }
        });

        if armed {
            match self.client.get::<Identity>(PROFILE_PATH).await {
                Ok(identity) => {
                    let user_id = identity.id;
                    if self.commit_identity(ticket, identity) {
                        info!(user_id, "Stored session revalidated");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stored session failed revalidation, logging out");
                    if !self.invalidator.invalidate_if_current(&self.client, ticket) {
                        debug!("Session changed during revalidation, leaving it as is");
                    }
                }
            }
        } else {
            debug!("No stored session to revalidate");
        }

        self.store.mark_ready();
        self.store.snapshot()
    }

    /// Drop in-memory state and return to `Initializing`.
    ///
    /// Durable storage is kept so the next [`SessionService::start`] can
    /// pick the session up again.
    pub fn shutdown(&self) {
        self.store.reset(|| self.client.set_credential(None));
        self.started.store(false, Ordering::SeqCst);
        debug!("Session service shut down");
    }

    // ========== Session Operations ==========

    /// Authenticate and establish a session
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        let request = LoginRequest { email, password };

        let response: LoginResponse = self
            .client
            .post(LOGIN_PATH, &request)
            .await
            .map_err(|e| {
                debug!(error = %e, "Login request failed");
                e.into_session(LOGIN_FAILED)
            })?;

        let LoginResponse { token, user } = response;
        let serialized = serde_json::to_string(&user)?;

        let established = self.store.apply_latest(|current| {
            self.storage.set(TOKEN_KEY, token.as_str())?;
            self.storage.set(USER_KEY, &serialized)?;
            self.client.set_credential(Some(token.as_str()));
            Ok(SessionSnapshot {
                identity: Some(user.clone()),
                ready: current.ready,
            })
        });

        if let Err(e) = established {
            warn!(error = %e, "Failed to persist session, rolling back");
            self.invalidator.invalidate(&self.client);
            return Err(e);
        }

        info!(user_id = user.id, "Logged in");
        Ok(user)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, registration: &Registration) -> Result<Identity> {
        let user: Identity = self
            .client
            .post(REGISTER_PATH, registration)
            .await
            .map_err(|e| e.into_session(REGISTRATION_FAILED))?;

        info!(user_id = user.id, "Registered new account");
        Ok(user)
    }

    /// End the session. Safe to call when already logged out.
    pub fn logout(&self) {
        self.invalidator.invalidate(&self.client);
    }

    /// Update profile fields and merge the server's answer into the identity.
    ///
    /// Returns the fields the server sent back.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<ProfilePatch> {
        let ticket = self.store.ticket();

        let patch: ProfilePatch = self
            .client
            .put(PROFILE_PATH, update)
            .await
            .map_err(|e| e.into_session(UPDATE_FAILED))?;

        let merged = self.store.apply(ticket, |current| {
            let Some(identity) = current.identity.as_ref() else {
                return Ok(current.clone());
            };
            let merged = identity.merge(&patch)?;
            self.persist_identity(&merged);
            Ok(SessionSnapshot {
                identity: Some(merged),
                ready: current.ready,
            })
        });

        if let Err(e) = merged {
            warn!(error = %e, "Profile update response could not be merged, refreshing");
            self.refresh_user().await?;
        }

        Ok(patch)
    }

    /// Re-fetch the profile and replace the identity wholesale
    pub async fn refresh_user(&self) -> Result<Identity> {
        let ticket = self.store.ticket();

        let identity: Identity = self
            .client
            .get(PROFILE_PATH)
            .await
            .map_err(|e| e.into_session(REFRESH_FAILED))?;

        self.commit_identity(ticket, identity.clone());
        Ok(identity)
    }

    /// Change the password of the logged-in user. Returns the server's message.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<String> {
        if new.is_empty() {
            return Err(Error::InvalidInput("New password cannot be empty".to_string()));
        }

        let request = PasswordChange {
            current_password: current,
            new_password: new,
        };

        let response: Value = self
            .client
            .post(CHANGE_PASSWORD_PATH, &request)
            .await
            .map_err(|e| e.into_session(CHANGE_PASSWORD_FAILED))?;

        Ok(response
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Password updated")
            .to_string())
    }

    // ========== Persistence ==========

    /// Token from storage, only when a user entry sits next to it
    fn stored_credential(&self) -> Option<String> {
        let read = |key: &str| match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read session entry");
                None
            }
        };

        let token = read(TOKEN_KEY)?;
        read(USER_KEY)?;
        Some(token)
    }

    /// Replace the identity and persist it, unless a newer write landed
    fn commit_identity(&self, ticket: Ticket, identity: Identity) -> bool {
        let stored = identity.clone();
        self.store
            .replace_identity(ticket, identity, || self.persist_identity(&stored))
    }

    fn persist_identity(&self, identity: &Identity) {
        let result = serde_json::to_string(identity)
            .map_err(Error::from)
            .and_then(|json| self.storage.set(USER_KEY, &json));

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist identity");
        }
    }
}
