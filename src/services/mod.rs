/// Control API operations over the connection registry.
pub mod control_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Event stream handshake and response streaming.
pub mod stream_service;
