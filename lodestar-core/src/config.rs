//! Configuration consumed by the gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadlines the gateway applies to a single lookup fan-out.
///
/// Loading (files, flags, environment) is the embedding process's concern;
/// this is only the typed shape the gateway consumes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upper bound on a buffered (single-document) find.
    pub result_max_wait: Duration,
    /// Upper bound on a streaming find. Streaming clients tolerate a longer
    /// tail since results arrive incrementally.
    pub result_stream_max_wait: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            result_max_wait: Duration::from_secs(5),
            result_stream_max_wait: Duration::from_secs(10),
        }
    }
}
