//! The find-NDJSON pipeline: wires the scatter-gather engine to the backend
//! pool over HTTP.
//!
//! Each eligible backend is queried with the inbound URL repointed at it and
//! its NDJSON response is decoded line by line. A single consumer per
//! request deduplicates across backends and either streams each unique
//! record immediately or folds everything into one unified document.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use lodestar_core::{
    Backend, BackendVariant, EncryptedMultihashResult, FindResponse, FoundResult, LodestarError,
    MultihashResult, ResultSet, ResultStats,
};

use crate::core::Gateway;
use crate::metrics;
use crate::scatter::ScatterGather;

/// Media type of line-delimited streaming responses.
pub const MEDIA_TYPE_NDJSON: &str = "application/x-ndjson";
/// Media type of buffered responses.
pub const MEDIA_TYPE_JSON: &str = "application/json";

const X_FORWARDED_HOST: &str = "X-Forwarded-Host";

/// The parts of the inbound request the fan-out needs: the URL to repoint at
/// each backend and the host the client originally addressed.
#[derive(Debug, Clone)]
pub(crate) struct InboundFind {
    pub path: String,
    pub query: Option<String>,
    pub host: String,
}

impl Gateway {
    /// Run a streaming find and return the stream of unique results.
    ///
    /// The receiver closes once every backend has answered or the streaming
    /// deadline has passed; metric emission happens when it does. Dropping
    /// the receiver cancels the fan-out.
    pub(crate) fn stream_find(
        &self,
        source: &'static str,
        inbound: InboundFind,
        encrypted: bool,
    ) -> mpsc::Receiver<FoundResult> {
        let cancel = CancellationToken::new();
        let (mut results, contacted) =
            self.scatter_find(&inbound, encrypted, self.cfg.result_stream_max_wait, &cancel);
        let (out_tx, out_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut collector = Collector::new(source);
            while let Some((result, variant)) = results.recv().await {
                if !collector.admit(&result, variant) {
                    continue;
                }
                if out_tx.send(result).await.is_err() {
                    // Downstream hung up; unwind the fan-out.
                    cancel.cancel();
                    break;
                }
            }
            collector.finish(contacted.load(Ordering::Relaxed));
        });
        out_rx
    }

    /// Run a buffered find to completion.
    ///
    /// Returns `None` when no backend produced a unique result (the caller
    /// answers 404), otherwise the unified document keyed to `multihash`.
    pub(crate) async fn buffered_find(
        &self,
        source: &'static str,
        inbound: InboundFind,
        multihash: &str,
        encrypted: bool,
    ) -> Option<FindResponse> {
        let cancel = CancellationToken::new();
        let (mut results, contacted) =
            self.scatter_find(&inbound, encrypted, self.cfg.result_max_wait, &cancel);
        let mut collector = Collector::new(source);
        let mut provider_results = Vec::new();
        let mut encrypted_keys = Vec::new();
        while let Some((result, variant)) = results.recv().await {
            if !collector.admit(&result, variant) {
                continue;
            }
            match result.encrypted_value_key {
                Some(key) if !key.is_empty() => encrypted_keys.push(key.into()),
                _ => provider_results.push(result.result),
            }
        }
        let found = collector.finish(contacted.load(Ordering::Relaxed));
        if !found {
            return None;
        }

        let mut resp = FindResponse::default();
        if !provider_results.is_empty() {
            resp.multihash_results = vec![MultihashResult {
                multihash: multihash.to_string(),
                provider_results,
            }];
        }
        if !encrypted_keys.is_empty() {
            resp.encrypted_multihash_results = vec![EncryptedMultihashResult {
                multihash: multihash.to_string(),
                encrypted_value_keys: encrypted_keys,
            }];
        }
        Some(resp)
    }

    /// Fan the query out and hand back the per-record channel plus the
    /// backend-contact counter.
    fn scatter_find(
        &self,
        inbound: &InboundFind,
        encrypted: bool,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> (
        mpsc::Receiver<(FoundResult, BackendVariant)>,
        Arc<AtomicI64>,
    ) {
        let (tx, rx) = mpsc::channel(1);
        let contacted = Arc::new(AtomicI64::new(0));

        let mut sg: ScatterGather<Arc<dyn Backend>, ()> =
            ScatterGather::new(self.backends.iter().cloned(), max_wait);
        let client = self.client.clone();
        let inbound = inbound.clone();
        let counter = Arc::clone(&contacted);
        let worker = move |cctx: CancellationToken, backend: Arc<dyn Backend>| {
            find_worker(
                client.clone(),
                backend,
                cctx,
                inbound.clone(),
                encrypted,
                tx.clone(),
                Arc::clone(&counter),
            )
        };
        if let Err(e) = sg.scatter(cancel, worker) {
            error!(err = %e, "failed to scatter find request");
        }
        (rx, contacted)
    }
}

/// One backend's worker: request, stream, decode, forward.
async fn find_worker(
    client: reqwest::Client,
    backend: Arc<dyn Backend>,
    cctx: CancellationToken,
    inbound: InboundFind,
    encrypted: bool,
    tx: mpsc::Sender<(FoundResult, BackendVariant)>,
    contacted: Arc<AtomicI64>,
) -> Result<Option<()>, LodestarError> {
    let variant = backend.variant();
    // Double-hashed requests go to double-hashed backends only and regular
    // requests to regular backends; provider-info backends never join the
    // multihash fan-out.
    if encrypted != variant.is_double_hashed() || variant.is_providers() {
        return Ok(None);
    }

    // Copy the inbound URL and point it at this backend.
    let mut endpoint = backend.url().clone();
    endpoint.set_path(&inbound.path);
    endpoint.set_query(inbound.query.as_deref());
    let host = endpoint.host_str().unwrap_or_default().to_string();

    if !backend.accepts(&endpoint) {
        return Ok(None);
    }

    // Send-phase failures, timeouts included, are health signals and feed
    // the breaker; only body-read and decode errors below are success-marked.
    let resp = client
        .get(endpoint)
        .header(ACCEPT, MEDIA_TYPE_NDJSON)
        .header(X_FORWARDED_HOST, &inbound.host)
        .send()
        .await
        .map_err(|e| LodestarError::backend(&host, e.to_string()))?;

    match resp.status() {
        reqwest::StatusCode::OK => {}
        reqwest::StatusCode::NOT_FOUND => {
            contacted.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        status => {
            let body = resp.text().await.unwrap_or_default();
            debug!(backend = %host, status = %status, body = %body, "request processing was not successful");
            return Err(LodestarError::backend_status(host, status.as_u16()));
        }
    }

    let mut stream = resp.bytes_stream();
    let mut buf = BytesMut::new();
    loop {
        let chunk = tokio::select! {
            biased;
            () = cctx.cancelled() => return Ok(None),
            chunk = stream.next() => chunk,
        };
        match chunk {
            None => {
                // A final record is valid without a trailing newline.
                if let Some(result) = parse_line(&buf, &contacted)? {
                    forward(&cctx, &tx, result, variant).await;
                }
                return Ok(None);
            }
            Some(Err(e)) => {
                if e.is_timeout() {
                    return Err(LodestarError::canceled(host));
                }
                return Err(LodestarError::backend_read(host, e.to_string()));
            }
            Some(Ok(bytes)) => {
                buf.extend_from_slice(&bytes);
                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line = buf.split_to(pos + 1);
                    if let Some(result) = parse_line(&line[..pos], &contacted)?
                        && !forward(&cctx, &tx, result, variant).await
                    {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

/// Decode one NDJSON line, counting the contact and applying the sanity
/// filter.
fn parse_line(
    line: &[u8],
    contacted: &AtomicI64,
) -> Result<Option<FoundResult>, LodestarError> {
    let line = match line {
        [rest @ .., b'\r'] => rest,
        line => line,
    };
    if line.is_empty() {
        return Ok(None);
    }
    contacted.fetch_add(1, Ordering::Relaxed);
    let result: FoundResult = serde_json::from_slice(line)?;
    // Backends that ignore the Accept header can answer with anything; drop
    // plain records carrying no provider identity at all.
    if !result.is_encrypted()
        && (result.result.provider.id.is_empty() || result.result.provider.addrs.is_empty())
    {
        return Ok(None);
    }
    Ok(Some(result))
}

async fn forward(
    cctx: &CancellationToken,
    tx: &mpsc::Sender<(FoundResult, BackendVariant)>,
    result: FoundResult,
    variant: BackendVariant,
) -> bool {
    tokio::select! {
        biased;
        () = cctx.cancelled() => false,
        sent = tx.send((result, variant)) => sent.is_ok(),
    }
}

/// Per-request dedup, accounting, and end-of-request metric emission.
struct Collector {
    source: &'static str,
    start: Instant,
    set: ResultSet,
    stats: ResultStats,
    found_caskade: bool,
    found_regular: bool,
}

impl Collector {
    fn new(source: &'static str) -> Self {
        Self {
            source,
            start: Instant::now(),
            set: ResultSet::new(),
            stats: ResultStats::default(),
            found_caskade: false,
            found_regular: false,
        }
    }

    /// First sighting of this record? Duplicates are discarded by the
    /// caller.
    fn admit(&mut self, result: &FoundResult, variant: BackendVariant) -> bool {
        if !self.set.put_if_absent(result) {
            return false;
        }
        self.stats.observe(result);
        if variant.is_caskade() {
            self.found_caskade = true;
        } else {
            self.found_regular = true;
        }
        true
    }

    /// Emit the request's metrics; returns whether anything was found.
    fn finish(self, contacted: i64) -> bool {
        metrics::record_find_backends(contacted);
        let found = !self.set.is_empty();
        if found {
            metrics::record_transport_counts(self.source, &self.stats);
        }
        metrics::record_find_latency(
            self.start.elapsed(),
            found,
            self.found_caskade,
            self.found_regular,
        );
        metrics::record_find_load(self.source);
        found
    }
}
