//! lodestar aggregates content-addressed provider lookups across many
//! indexer backends.
//!
//! Overview
//! - Fans each lookup out to every eligible backend in parallel and streams
//!   the merged, deduplicated answers back as NDJSON or one buffered
//!   document.
//! - Routes by backend variant: encrypted (double-hashed) lookups reach only
//!   double-hashed backends, regular lookups only regular ones, and
//!   provider-info backends never join the multihash fan-out.
//! - Tolerates partial failure: a backend erroring, timing out, or answering
//!   garbage costs that backend's results only, with circuit breakers fed
//!   accordingly.
//! - Bounds every fan-out by a per-mode deadline, so the response stream
//!   always terminates regardless of backend liveness.
//! - Exposes a second, Delegated Routing shaped surface over the same pool.
//!
//! Key behaviors and trade-offs
//! - Streaming mode commits the status line at the first unique result, so
//!   the 404-on-empty contract holds without buffering the whole fan-out.
//! - Dedup uses CRC32 fingerprints: cheap and small, with a tolerated,
//!   negligible collision rate at per-request cardinalities.
//! - A breaker only trips on genuine health signals (transport failures,
//!   5xx); malformed data and 4xx are the wire's problem and recorded as
//!   successes.
//!
//! Serving the assembled [`axum::Router`] (bind address, TLS, shutdown) is
//! left to the embedding process; see `examples/gateway.rs`.
#![warn(missing_docs)]

mod backend;
pub(crate) mod core;
mod find;
/// Metric names emitted through the `metrics` facade.
pub mod metrics;
mod routes;
mod scatter;
mod translator;

pub use backend::HttpBackend;
pub use core::{Gateway, GatewayBuilder};
pub use find::{MEDIA_TYPE_JSON, MEDIA_TYPE_NDJSON};
pub use routes::find_router;
pub use scatter::ScatterGather;
pub use translator::{DrProvider, DrResponse, FindBackend, PEER_SCHEMA, delegated_router};

// Re-export core types for convenience
pub use lodestar_core::{
    Backend,
    BackendVariant,
    Base64Bytes,
    CircuitBreaker,
    CircuitBreakerConfig,
    CircuitState,
    EncryptedMultihashResult,
    FindResponse,
    FoundResult,
    GatewayConfig,
    LodestarError,
    MultihashResult,
    ProviderInfo,
    ProviderResult,
    ResultSet,
    ResultStats,
    TransportMetadata,
    TransportProtocol,
};
