//! Session domain module
//!
//! Authentication session lifecycle and its interaction with the HTTP layer.
//!
//! # Architecture
//!
//! - **Entities**: `Identity`, `Credential`, `SessionSnapshot`
//! - **Store**: `SessionStore`, the in-memory source of truth with subscriptions
//! - **Invalidator**: `SessionInvalidator`, shared by logout and the 401 interceptor
//! - **Service**: `SessionService`, orchestrating login, logout, registration,
//!   profile refresh/update and startup revalidation
//!
//! # Example
//!
//! ```ignore
//! use eventhub_core::session::SessionService;
//!
//! let service = SessionService::builder().config(config).build()?;
//!
//! // Revalidate whatever was stored by the last run
//! let snapshot = service.start().await;
//!
//! if !snapshot.is_authenticated() {
//!     service.login("ann@example.com", "secret").await?;
//! }
//!
//! // Resource calls share the credential and the 401 handling
//! let events: serde_json::Value = service.client().get("/events").await?;
//!
//! service.logout();
//! ```

pub mod identity;
pub mod invalidator;
pub mod service;
pub mod store;

pub use identity::{Credential, Identity, ProfilePatch, ProfileUpdate, Registration};
pub use invalidator::{Navigator, SessionInterceptor, SessionInvalidator, SilentNavigator};
pub use service::{SessionService, SessionServiceBuilder};
pub use store::{SessionSnapshot, SessionState, SessionStore, Ticket};
