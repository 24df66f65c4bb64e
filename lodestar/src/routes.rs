//! The HTTP find surface: multihash and CID lookups, plain and encrypted.
//!
//! `Accept: application/x-ndjson` selects streaming output; anything else
//! buffers into a single unified document. The response media type mirrors
//! the requested one. Serving the routers (bind, TLS, shutdown) is the
//! embedding process's concern.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::StreamExt;
use tracing::error;

use lodestar_core::FoundResult;

use crate::core::Gateway;
use crate::find::{InboundFind, MEDIA_TYPE_JSON, MEDIA_TYPE_NDJSON};
use crate::translator;

pub(crate) const SOURCE_MULTIHASH: &str = "multihash";
pub(crate) const SOURCE_CID: &str = "cid";

impl Gateway {
    /// Assemble the full HTTP surface: the find routes plus the Delegated
    /// Routing translator, ready to be served by the embedding process.
    #[must_use]
    pub fn router(self: Arc<Self>) -> Router {
        find_router(Arc::clone(&self)).merge(translator::delegated_router(self))
    }
}

/// The find surface on its own.
#[must_use]
pub fn find_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/multihash/:mh", get(find_multihash))
        .route("/encrypted/multihash/:mh", get(find_multihash_encrypted))
        .route("/cid/:cid", get(find_cid))
        .route("/encrypted/cid/:cid", get(find_cid_encrypted))
        .with_state(gateway)
}

async fn find_multihash(
    State(gateway): State<Arc<Gateway>>,
    Path(mh): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    handle_find(&gateway, &uri, &headers, mh, SOURCE_MULTIHASH, false).await
}

async fn find_multihash_encrypted(
    State(gateway): State<Arc<Gateway>>,
    Path(mh): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    handle_find(&gateway, &uri, &headers, mh, SOURCE_MULTIHASH, true).await
}

async fn find_cid(
    State(gateway): State<Arc<Gateway>>,
    Path(cid): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    handle_find(&gateway, &uri, &headers, cid, SOURCE_CID, false).await
}

async fn find_cid_encrypted(
    State(gateway): State<Arc<Gateway>>,
    Path(cid): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    handle_find(&gateway, &uri, &headers, cid, SOURCE_CID, true).await
}

async fn handle_find(
    gateway: &Gateway,
    uri: &Uri,
    headers: &HeaderMap,
    multihash: String,
    source: &'static str,
    encrypted: bool,
) -> Response {
    let inbound = InboundFind {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        host: headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };
    if accepts_ndjson(headers) {
        stream_response(gateway, source, inbound, encrypted).await
    } else {
        buffered_response(gateway, source, inbound, &multihash, encrypted).await
    }
}

fn accepts_ndjson(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .any(|v| v.to_str().is_ok_and(|v| v.contains(MEDIA_TYPE_NDJSON)))
}

async fn stream_response(
    gateway: &Gateway,
    source: &'static str,
    inbound: InboundFind,
    encrypted: bool,
) -> Response {
    let mut results = gateway.stream_find(source, inbound, encrypted);
    // The status line is committed by the first unique result; nothing
    // unique across the whole fan-out means 404.
    let Some(first) = results.recv().await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let rest = futures::stream::unfold(results, |mut results| async move {
        results.recv().await.map(|r| (encode_line(&r), results))
    });
    let lines = futures::stream::iter([encode_line(&first)])
        .chain(rest)
        .filter_map(|line| async move { line.map(Ok::<_, std::convert::Infallible>) });
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, MEDIA_TYPE_NDJSON),
            (header::CONNECTION, "Keep-Alive"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

/// Encode one streaming line. Each line travels as its own body chunk, so
/// clients see results as they arrive.
fn encode_line(result: &FoundResult) -> Option<Bytes> {
    match serde_json::to_vec(result) {
        Ok(mut line) => {
            line.push(b'\n');
            Some(line.into())
        }
        Err(e) => {
            error!(err = %e, "failed to encode streaming result");
            None
        }
    }
}

async fn buffered_response(
    gateway: &Gateway,
    source: &'static str,
    inbound: InboundFind,
    multihash: &str,
    encrypted: bool,
) -> Response {
    match gateway.buffered_find(source, inbound, multihash, encrypted).await {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(doc) => match serde_json::to_vec(&doc) {
            Ok(body) => {
                (StatusCode::OK, [(header::CONTENT_TYPE, MEDIA_TYPE_JSON)], body).into_response()
            }
            Err(e) => {
                error!(err = %e, "failed to encode find response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}
