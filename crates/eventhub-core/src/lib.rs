//! Eventhub Core Library
//!
//! This crate provides the client side of the Eventhub ticketing API:
//! - HTTP client with bearer credential injection and a global 401 interceptor
//! - Durable session storage (file, OS keyring, memory)
//! - Session store with subscriptions
//! - Session lifecycle (login, logout, registration, profile, startup revalidation)
//! - Configuration with file persistence

pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::http::ApiClient;
    pub use crate::session::{Identity, SessionService, SessionState};
}

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod session_tests;
