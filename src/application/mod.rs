//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the codec and the resilience machinery around the
//! durable store:
//! - Admission gate (bulkhead bounding concurrent store access)
//! - Fixed-window rate limiter (create-path budget)
//! - Click tracker (batched, best-effort hit counting)
//! - The service facade the transport layer calls into
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod gate;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod tracker;
