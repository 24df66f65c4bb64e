use std::sync::Arc;

use url::Url;

use crate::breaker::CircuitBreaker;

/// Deployment tier of a backend, driving routing and metrics attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendVariant {
    /// Handles unencrypted find-by-multihash lookups.
    Plain,
    /// Handles encrypted (double-hashed) lookups.
    DoubleHashed,
    /// An alternative plain-style tier, tracked separately in metrics.
    Caskade,
    /// Serves provider-info endpoints only; excluded from multihash fan-out.
    Providers,
}

impl BackendVariant {
    /// Whether this variant answers encrypted (double-hashed) requests.
    #[must_use]
    pub const fn is_double_hashed(self) -> bool {
        matches!(self, Self::DoubleHashed)
    }

    /// Whether this variant serves provider-info endpoints only.
    #[must_use]
    pub const fn is_providers(self) -> bool {
        matches!(self, Self::Providers)
    }

    /// Whether this variant belongs to the caskade tier.
    #[must_use]
    pub const fn is_caskade(self) -> bool {
        matches!(self, Self::Caskade)
    }
}

/// Capability contract for a routable lookup backend.
///
/// Backends are registered once at startup and never mutated afterwards;
/// the orchestrator holds them as `Arc<dyn Backend>` for the process
/// lifetime.
pub trait Backend: Send + Sync {
    /// Base URL of the backend; only scheme, host, and port are used when
    /// rewriting inbound request URLs.
    fn url(&self) -> &Url;

    /// Deployment tier of this backend.
    fn variant(&self) -> BackendVariant;

    /// The circuit breaker guarding this backend, if any.
    fn breaker(&self) -> Option<&CircuitBreaker> {
        None
    }

    /// Whether this backend should be queried for the given rewritten
    /// endpoint. Defaults to accepting everything.
    fn accepts(&self, endpoint: &Url) -> bool {
        let _ = endpoint;
        true
    }
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn url(&self) -> &Url {
        (**self).url()
    }

    fn variant(&self) -> BackendVariant {
        (**self).variant()
    }

    fn breaker(&self) -> Option<&CircuitBreaker> {
        (**self).breaker()
    }

    fn accepts(&self, endpoint: &Url) -> bool {
        (**self).accepts(endpoint)
    }
}
