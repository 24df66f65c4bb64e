use std::sync::Arc;
use std::time::Duration;

use lodestar_core::{Backend, GatewayConfig, LodestarError};

/// Orchestrator that fans lookup requests out across registered backends.
pub struct Gateway {
    pub(crate) backends: Vec<Arc<dyn Backend>>,
    pub(crate) client: reqwest::Client,
    pub(crate) cfg: GatewayConfig,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("backends", &self.backends.len())
            .field("cfg", &self.cfg)
            .finish()
    }
}

/// Builder for constructing a [`Gateway`] with custom configuration.
pub struct GatewayBuilder {
    backends: Vec<Arc<dyn Backend>>,
    cfg: GatewayConfig,
    client: Option<reqwest::Client>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    /// Create a new builder with default deadlines and no backends.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: vec![],
            cfg: GatewayConfig::default(),
            client: None,
        }
    }

    /// Register a lookup backend.
    ///
    /// Registration order carries no meaning: every eligible backend is
    /// queried concurrently. Duplicates are not deduplicated; avoid
    /// registering the same backend twice.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Replace the whole deadline configuration.
    #[must_use]
    pub const fn config(mut self, cfg: GatewayConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Set the deadline for buffered (single-document) finds.
    #[must_use]
    pub const fn result_max_wait(mut self, max_wait: Duration) -> Self {
        self.cfg.result_max_wait = max_wait;
        self
    }

    /// Set the deadline for streaming finds.
    #[must_use]
    pub const fn result_stream_max_wait(mut self, max_wait: Duration) -> Self {
        self.cfg.result_stream_max_wait = max_wait;
        self
    }

    /// Use a caller-supplied HTTP client instead of the default pooled one.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the `Gateway`.
    ///
    /// # Errors
    /// - `InvalidArg` if no backends have been registered.
    /// - `Other` if the default HTTP client cannot be constructed.
    pub fn build(self) -> Result<Gateway, LodestarError> {
        if self.backends.is_empty() {
            return Err(LodestarError::InvalidArg(
                "no backends registered; add at least one via with_backend(...)".to_string(),
            ));
        }
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .pool_max_idle_per_host(32)
                .build()
                .map_err(|e| LodestarError::other(e.to_string()))?,
        };
        Ok(Gateway {
            backends: self.backends,
            client,
            cfg: self.cfg,
        })
    }
}

impl Gateway {
    /// Start building a new `Gateway`.
    ///
    /// Typical usage registers backends and tunes deadlines:
    ///
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// use lodestar::{Gateway, HttpBackend};
    /// use lodestar_core::{BackendVariant, CircuitBreaker};
    ///
    /// # fn main() -> Result<(), lodestar_core::LodestarError> {
    /// let indexer = HttpBackend::new(
    ///     "http://indexer-1.internal:3000".parse().unwrap(),
    ///     BackendVariant::Plain,
    /// )
    /// .with_breaker(CircuitBreaker::default());
    ///
    /// let gateway = Gateway::builder()
    ///     .with_backend(Arc::new(indexer))
    ///     .result_max_wait(Duration::from_secs(5))
    ///     .build()?;
    /// # let _ = gateway;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// The registered backends, read-only for the gateway's lifetime.
    #[must_use]
    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// The active deadline configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.cfg
    }
}
