//! Generic parallel fan-out over a backend set.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lodestar_core::{Backend, LodestarError};

/// A short-lived scatter-gather orchestration over a set of backends.
///
/// [`scatter`](Self::scatter) runs one worker per backend concurrently;
/// [`gather`](Self::gather) hands back the stream of results. The stream
/// closes once every worker has terminated, and every worker is bounded by
/// `max_wait`, so gathering never outlives the deadline regardless of
/// backend liveness.
///
/// Workers are partial-failure tolerant: an error from one backend is
/// logged, fed to that backend's circuit breaker (unless the error is
/// success-marked), and contributes no result, leaving siblings unaffected.
///
/// Lifecycle: build one per request, scatter once, gather once.
pub struct ScatterGather<B, R> {
    backends: Vec<B>,
    max_wait: Duration,
    tx: Option<mpsc::Sender<R>>,
    rx: Option<mpsc::Receiver<R>>,
}

impl<B, R> ScatterGather<B, R>
where
    B: Backend + Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    /// Create a scatter-gather over `backends` with a total wall-clock bound
    /// of `max_wait`.
    ///
    /// The internal results channel is bounded at one entry: the gather side
    /// is expected to drain promptly, and backpressure keeps producer tasks
    /// from buffering unbounded work.
    #[must_use]
    pub fn new(backends: impl IntoIterator<Item = B>, max_wait: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            backends: backends.into_iter().collect(),
            max_wait,
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    /// Launch one worker task per backend and return without waiting for any
    /// of them.
    ///
    /// Each worker runs under a child of `cancel` bounded by `max_wait`; it
    /// observes the child token between suspension points and its future is
    /// dropped outright at the deadline, closing any inflight I/O. A worker
    /// returning `Ok(Some(r))` forwards `r` into the result stream; `Ok(None)`
    /// and errors forward nothing. Backends whose circuit breaker is open are
    /// skipped.
    ///
    /// # Errors
    /// Fails only on structural misuse: scattering the same value twice.
    pub fn scatter<W, Fut>(
        &mut self,
        cancel: &CancellationToken,
        worker: W,
    ) -> Result<(), LodestarError>
    where
        W: Fn(CancellationToken, B) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<R>, LodestarError>> + Send + 'static,
    {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| LodestarError::InvalidArg("scatter may only be called once".into()))?;

        for backend in self.backends.iter().cloned() {
            let tx = tx.clone();
            let child = cancel.child_token();
            let worker = worker.clone();
            let max_wait = self.max_wait;
            tokio::spawn(async move {
                if let Some(cb) = backend.breaker()
                    && !cb.ready()
                {
                    debug!(backend = %backend.url(), "circuit open, skipping backend");
                    return;
                }

                let run = async {
                    match worker(child.clone(), backend.clone()).await {
                        Ok(result) => {
                            if let Some(cb) = backend.breaker() {
                                cb.record_success();
                            }
                            if let Some(result) = result {
                                tokio::select! {
                                    biased;
                                    () = child.cancelled() => {}
                                    _ = tx.send(result) => {}
                                }
                            }
                        }
                        Err(e) => {
                            if let Some(cb) = backend.breaker() {
                                if e.trips_breaker() {
                                    cb.record_failure();
                                } else {
                                    cb.record_success();
                                }
                            }
                            match e {
                                LodestarError::Canceled { .. } => {
                                    debug!(backend = %backend.url(), err = %e, "backend query ended");
                                }
                                e => {
                                    warn!(backend = %backend.url(), err = %e, "backend query failed");
                                }
                            }
                        }
                    }
                };

                tokio::select! {
                    biased;
                    () = child.cancelled() => {}
                    res = tokio::time::timeout(max_wait, run) => {
                        if res.is_err() {
                            debug!(backend = %backend.url(), "backend query hit the max-wait deadline");
                        }
                    }
                }
            });
        }
        // Each task owns a sender clone; the channel closes when the last
        // task exits, never twice.
        drop(tx);
        Ok(())
    }

    /// Take the result stream.
    ///
    /// The receiver yields results in arrival order (a race across backends)
    /// and closes when all workers have terminated or the token fires.
    ///
    /// # Panics
    /// Panics if called more than once.
    pub fn gather(&mut self) -> mpsc::Receiver<R> {
        self.rx.take().expect("gather may only be called once")
    }
}
