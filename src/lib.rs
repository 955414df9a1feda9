//! Library crate for sse-hub: a Server-Sent Events connection registry and broadcast engine,
//! plus the HTTP layer serving it. Exposed for binaries and integration tests.

pub mod config;
/// Request and response payloads of the HTTP API.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Operations behind the HTTP routes.
pub mod services;
pub mod sse;
/// Shared application state.
pub mod state;
