//! Deterministic mock backends for gateway tests and examples.
#![warn(missing_docs)]

use std::sync::Arc;

use url::Url;

use lodestar_core::{Backend, BackendVariant, CircuitBreaker};

type AcceptsFn = dyn Fn(&Url) -> bool + Send + Sync;

/// Configurable in-memory backend used by scatter and routing tests.
///
/// Defaults to a plain-variant backend at `http://mock.invalid` that accepts
/// every request and carries no circuit breaker; tailor behavior through the
/// builder.
pub struct MockBackend {
    url: Url,
    variant: BackendVariant,
    breaker: Option<CircuitBreaker>,
    accepts: Option<Arc<AcceptsFn>>,
}

impl MockBackend {
    /// Start building a mock backend.
    #[must_use]
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder::default()
    }

    /// A plain backend with default settings.
    #[must_use]
    pub fn plain() -> Self {
        Self::builder().build()
    }
}

impl Backend for MockBackend {
    fn url(&self) -> &Url {
        &self.url
    }

    fn variant(&self) -> BackendVariant {
        self.variant
    }

    fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    fn accepts(&self, endpoint: &Url) -> bool {
        self.accepts.as_ref().is_none_or(|f| f(endpoint))
    }
}

/// Builder for [`MockBackend`].
pub struct MockBackendBuilder {
    url: Url,
    variant: BackendVariant,
    breaker: Option<CircuitBreaker>,
    accepts: Option<Arc<AcceptsFn>>,
}

impl Default for MockBackendBuilder {
    fn default() -> Self {
        Self {
            url: Url::parse("http://mock.invalid").expect("static url"),
            variant: BackendVariant::Plain,
            breaker: None,
            accepts: None,
        }
    }
}

impl MockBackendBuilder {
    /// Set the base URL.
    #[must_use]
    pub fn url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Set the deployment tier.
    #[must_use]
    pub const fn variant(mut self, variant: BackendVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Attach a circuit breaker.
    #[must_use]
    pub fn breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Override the request-match predicate.
    #[must_use]
    pub fn accepts(mut self, f: impl Fn(&Url) -> bool + Send + Sync + 'static) -> Self {
        self.accepts = Some(Arc::new(f));
        self
    }

    /// Finish the backend.
    #[must_use]
    pub fn build(self) -> MockBackend {
        MockBackend {
            url: self.url,
            variant: self.variant,
            breaker: self.breaker,
            accepts: self.accepts,
        }
    }
}
