//! HTTP integration - Eventhub REST API
//!
//! This module provides:
//! - The shared API client with bearer credential injection
//! - The response interceptor seam used for global 401 handling

mod client;
mod interceptor;

pub use client::{ApiClient, ApiClientBuilder};
pub use interceptor::{ResponseInterceptor, UNAUTHORIZED};
pub use reqwest::Method;
