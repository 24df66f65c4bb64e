//! lodestar-core
//!
//! Core types, contracts, and utilities shared across the lodestar gateway.
//!
//! - `backend`: the `Backend` capability trait and variant tags.
//! - `breaker`: the per-backend circuit breaker.
//! - `model`: the wire model for find responses and NDJSON records.
//! - `transport`: the transport-metadata codec.
//! - `dedup`: cross-backend dedup and per-transport accounting.
#![warn(missing_docs)]

/// Backend capability trait and variant tags.
pub mod backend;
/// Per-backend circuit breaker.
pub mod breaker;
/// Gateway configuration types.
pub mod config;
/// Result dedup filter and per-transport stats.
pub mod dedup;
/// Core error type shared by the gateway and its backends.
pub mod error;
/// Wire model shared by both HTTP surfaces.
pub mod model;
/// Transport-metadata codec.
pub mod transport;

pub use backend::{Backend, BackendVariant};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::GatewayConfig;
pub use dedup::{ResultSet, ResultStats, fingerprint};
pub use error::LodestarError;
pub use model::{
    Base64Bytes, EncryptedMultihashResult, FindResponse, FoundResult, MultihashResult,
    ProviderInfo, ProviderResult,
};
pub use transport::{MetadataError, TransportEntry, TransportMetadata, TransportProtocol};
