//! Serve the gateway in front of a pair of indexer backends.
//!
//! Run with `RUST_LOG=lodestar=debug cargo run --example gateway`.

use std::sync::Arc;
use std::time::Duration;

use lodestar::{Gateway, HttpBackend};
use lodestar_core::{BackendVariant, CircuitBreaker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let gateway = Gateway::builder()
        .with_backend(Arc::new(
            HttpBackend::new("http://127.0.0.1:3001".parse()?, BackendVariant::Plain)
                .with_breaker(CircuitBreaker::default()),
        ))
        .with_backend(Arc::new(HttpBackend::new(
            "http://127.0.0.1:3002".parse()?,
            BackendVariant::DoubleHashed,
        )))
        .result_max_wait(Duration::from_secs(5))
        .result_stream_max_wait(Duration::from_secs(10))
        .build()?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, Arc::new(gateway).router()).await?;
    Ok(())
}
