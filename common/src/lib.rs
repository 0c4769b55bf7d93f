//! Shared building blocks for the weather service: the error type, the
//! outbound HTTP client, wire models and tracing setup.

pub mod errors;
pub mod http_client;
pub mod models;
pub mod tracing;
