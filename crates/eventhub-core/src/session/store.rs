//! In-memory session state shared by every consumer
//!
//! Identity writes are ordered by [`Ticket`]s. A write carrying a ticket older
//! than the last applied one is dropped, so a slow profile response can never
//! overwrite a newer login, update or logout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::debug;

use super::identity::Identity;
use crate::error::Result;

/// Readiness state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Startup revalidation has not finished
    Initializing,
    Authenticated,
    Unauthenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    /// False until startup revalidation completes
    pub ready: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.identity.is_some() {
            SessionState::Authenticated
        } else if self.ready {
            SessionState::Unauthenticated
        } else {
            SessionState::Initializing
        }
    }
}

fn cleared(current: &SessionSnapshot) -> SessionSnapshot {
    SessionSnapshot {
        identity: None,
        ready: current.ready,
    }
}

/// Ordering token for identity writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Canonical session holder. Clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    tx: watch::Sender<SessionSnapshot>,
    issued: AtomicU64,
    /// Ticket of the last write that was applied
    applied: Mutex<u64>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("SessionStore")
            .field("state", &snapshot.state())
            .field("user_id", &snapshot.identity.as_ref().map(|i| i.id))
            .finish()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(StoreInner {
                tx,
                issued: AtomicU64::new(0),
                applied: Mutex::new(0),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.tx.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.tx.borrow().identity.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.tx.borrow().ready
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tx.borrow().is_authenticated()
    }

    pub fn state(&self) -> SessionState {
        self.inner.tx.borrow().state()
    }

    /// Receive every change to the session
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.tx.subscribe()
    }

    /// Issue the next ticket
    pub(crate) fn ticket(&self) -> Ticket {
        Ticket(self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Issue a ticket as an ordered step. `f` runs with no write interleaving
    /// and sees the current snapshot.
    pub(crate) fn begin<F, T>(&self, f: F) -> (Ticket, T)
    where
        F: FnOnce(&SessionSnapshot) -> T,
    {
        let _applied = self.lock_applied();
        let current = self.inner.tx.borrow().clone();
        let value = f(&current);
        (self.ticket(), value)
    }

    fn lock_applied(&self) -> MutexGuard<'_, u64> {
        match self.inner.applied.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `step` as one ordered write unless a newer write already landed.
    ///
    /// `step` sees the current snapshot, may perform side effects (storage,
    /// default header) and returns the next snapshot. No other write can
    /// interleave with it. When `step` fails nothing is published and the
    /// ticket stays unused. Returns whether the step ran.
    pub(crate) fn apply<F>(&self, ticket: Ticket, step: F) -> Result<bool>
    where
        F: FnOnce(&SessionSnapshot) -> Result<SessionSnapshot>,
    {
        let mut applied = self.lock_applied();

        if ticket.0 <= *applied {
            debug!(
                ticket = ticket.0,
                applied = *applied,
                "Discarding stale session update"
            );
            return Ok(false);
        }

        let current = self.inner.tx.borrow().clone();
        let next = step(&current)?;

        *applied = ticket.0;
        self.publish(next);
        Ok(true)
    }

    /// Like [`SessionStore::apply`], with a ticket issued once every earlier
    /// write has finished, so it always lands.
    pub(crate) fn apply_latest<F>(&self, step: F) -> Result<()>
    where
        F: FnOnce(&SessionSnapshot) -> Result<SessionSnapshot>,
    {
        let mut applied = self.lock_applied();
        let ticket = self.ticket();

        let current = self.inner.tx.borrow().clone();
        let next = step(&current)?;

        *applied = ticket.0;
        self.publish(next);
        Ok(())
    }

    fn publish(&self, next: SessionSnapshot) {
        self.inner.tx.send_if_modified(|snapshot| {
            if *snapshot == next {
                return false;
            }
            *snapshot = next;
            true
        });
    }

    /// Run `effects` and replace the identity as one write, unless a newer
    /// write already landed. Returns whether it ran.
    pub(crate) fn replace_identity<E: FnOnce()>(
        &self,
        ticket: Ticket,
        identity: Identity,
        effects: E,
    ) -> bool {
        let step = |current: &SessionSnapshot| -> Result<SessionSnapshot> {
            effects();
            Ok(SessionSnapshot {
                identity: Some(identity),
                ready: current.ready,
            })
        };
        matches!(self.apply(ticket, step), Ok(true))
    }

    /// Run `effects` and drop the identity as one write. Always wins over
    /// writes already in flight.
    pub(crate) fn clear<E: FnOnce()>(&self, effects: E) {
        let step = |current: &SessionSnapshot| -> Result<SessionSnapshot> {
            effects();
            Ok(cleared(current))
        };
        if let Err(e) = self.apply_latest(step) {
            debug!(error = %e, "Failed to clear session");
        }
    }

    /// Same as [`SessionStore::clear`], but only if nothing newer than
    /// `ticket` has been applied. Returns whether it ran.
    pub(crate) fn clear_if_current<E: FnOnce()>(&self, ticket: Ticket, effects: E) -> bool {
        let step = |current: &SessionSnapshot| -> Result<SessionSnapshot> {
            effects();
            Ok(cleared(current))
        };
        matches!(self.apply(ticket, step), Ok(true))
    }

    pub(crate) fn mark_ready(&self) {
        let _applied = self.lock_applied();
        self.inner.tx.send_if_modified(|snapshot| {
            let changed = !snapshot.ready;
            snapshot.ready = true;
            changed
        });
    }

    /// Run `effects` and go back to `Initializing` with no identity
    pub(crate) fn reset<E: FnOnce()>(&self, effects: E) {
        let step = |_: &SessionSnapshot| -> Result<SessionSnapshot> {
            effects();
            Ok(SessionSnapshot::default())
        };
        if let Err(e) = self.apply_latest(step) {
            debug!(error = %e, "Failed to reset session");
        }
    }
}
