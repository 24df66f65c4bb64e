//! Plain HTTP backend registration.

use url::Url;

use lodestar_core::{Backend, BackendVariant, CircuitBreaker};

/// A routable indexer backend reached over HTTP.
///
/// How the set of backends is assembled (flags, config files, discovery) is
/// the embedding process's concern; this is only the registered shape the
/// gateway fans out over.
#[derive(Debug)]
pub struct HttpBackend {
    url: Url,
    variant: BackendVariant,
    breaker: Option<CircuitBreaker>,
}

impl HttpBackend {
    /// Register a backend at `url` with the given deployment tier.
    #[must_use]
    pub const fn new(url: Url, variant: BackendVariant) -> Self {
        Self {
            url,
            variant,
            breaker: None,
        }
    }

    /// Attach a circuit breaker guarding this backend.
    #[must_use]
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }
}

impl Backend for HttpBackend {
    fn url(&self) -> &Url {
        &self.url
    }

    fn variant(&self) -> BackendVariant {
        self.variant
    }

    fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }
}
