//! Metric names and emission helpers.
//!
//! Emission goes through the `metrics` facade; installing a recorder (or
//! not) is the embedding process's choice.

use std::time::Duration;

use metrics::{counter, histogram};

use lodestar_core::ResultStats;

/// Find latency in milliseconds, labeled by method and found flags.
pub const FIND_LATENCY: &str = "lodestar_find_latency_ms";
/// Find requests served, labeled by source surface.
pub const FIND_LOAD: &str = "lodestar_find_load_total";
/// Distinct backend responses contributing to one find.
pub const FIND_BACKENDS: &str = "lodestar_find_backends";
/// Results forwarded downstream, labeled by transport.
pub const FIND_RESPONSE: &str = "lodestar_find_response_total";
/// Delegated Routing requests observed, labeled by HTTP method.
pub const DELEGATED_ROUTING_METHOD: &str = "lodestar_delegated_routing_method_total";

const fn yesno(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}

pub(crate) fn record_find_latency(elapsed: Duration, found: bool, caskade: bool, regular: bool) {
    histogram!(
        FIND_LATENCY,
        "method" => "GET",
        "found" => yesno(found),
        "found_caskade" => yesno(caskade),
        "found_regular" => yesno(regular),
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}

pub(crate) fn record_find_load(source: &'static str) {
    counter!(FIND_LOAD, "source" => source).increment(1);
}

pub(crate) fn record_find_backends(contacted: i64) {
    #[allow(clippy::cast_precision_loss)]
    histogram!(FIND_BACKENDS).record(contacted as f64);
}

pub(crate) fn record_transport_counts(source: &'static str, stats: &ResultStats) {
    let counts = [
        ("transport-bitswap", stats.bitswap()),
        ("transport-graphsync-filecoinv1", stats.graphsync()),
        ("unknown", stats.unknown()),
        ("encrypted", stats.encrypted()),
    ];
    for (transport, n) in counts {
        if n > 0 {
            counter!(FIND_RESPONSE, "method" => source, "transport" => transport).increment(n);
        }
    }
}

pub(crate) fn record_delegated_method(method: &axum::http::Method) {
    counter!(DELEGATED_ROUTING_METHOD, "method" => method.to_string()).increment(1);
}
