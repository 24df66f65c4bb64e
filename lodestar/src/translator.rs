//! Delegated Routing translator: a second request surface that reshapes
//! `/providers/{CID}` lookups onto the same backend pool.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use lodestar_core::{Base64Bytes, FindResponse, TransportMetadata};

use crate::core::Gateway;
use crate::find::{InboundFind, MEDIA_TYPE_JSON};
use crate::metrics;

/// Schema tag carried by every Delegated Routing provider record.
pub const PEER_SCHEMA: &str = "peer";

pub(crate) const SOURCE_DELEGATED: &str = "delegated";

/// The find capability the translator runs against: a buffered lookup for a
/// rewritten URL, answered as a status to mirror plus the unified response
/// body.
#[async_trait]
pub trait FindBackend: Send + Sync {
    /// Run a buffered find for `path`/`query` with the given encrypted flag.
    async fn find(
        &self,
        source: &'static str,
        path: &str,
        query: Option<&str>,
        host: &str,
        encrypted: bool,
    ) -> (StatusCode, Bytes);
}

#[async_trait]
impl FindBackend for Gateway {
    async fn find(
        &self,
        source: &'static str,
        path: &str,
        query: Option<&str>,
        host: &str,
        encrypted: bool,
    ) -> (StatusCode, Bytes) {
        let multihash = path.rsplit('/').next().unwrap_or_default().to_string();
        let inbound = InboundFind {
            path: path.to_string(),
            query: query.map(str::to_string),
            host: host.to_string(),
        };
        match self.buffered_find(source, inbound, &multihash, encrypted).await {
            None => (StatusCode::NOT_FOUND, Bytes::new()),
            Some(doc) => match serde_json::to_vec(&doc) {
                Ok(body) => (StatusCode::OK, body.into()),
                Err(e) => {
                    error!(err = %e, "failed to encode find response");
                    (StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
                }
            },
        }
    }
}

/// One provider record in the Delegated Routing response shape.
///
/// Per-protocol metadata entries are flattened into the top-level object
/// (protocol name -> marshalled bytes); that flattening is wire-observable
/// and clients depend on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrProvider {
    /// Schema tag; always [`PEER_SCHEMA`].
    #[serde(rename = "Schema")]
    pub schema: String,
    /// Opaque peer ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// Provider multiaddresses; omitted when empty.
    #[serde(rename = "Addrs", default, skip_serializing_if = "Vec::is_empty")]
    pub addrs: Vec<String>,
    /// Transport names the provider serves over; omitted when empty.
    #[serde(rename = "Protocols", default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    /// Per-protocol marshalled metadata, keyed by transport name.
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Base64Bytes>,
}

/// The Delegated Routing find response document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrResponse {
    /// Deduplicated provider records.
    #[serde(rename = "Providers", default)]
    pub providers: Vec<DrProvider>,
}

/// Assemble the Delegated Routing surface over a find backend.
#[must_use]
pub fn delegated_router(find: Arc<dyn FindBackend>) -> Router {
    Router::new()
        .route("/providers", any(provide))
        .route("/encrypted/providers", any(provide))
        .route("/providers/:cid", any(find_providers))
        .route("/encrypted/providers/:cid", any(find_providers_encrypted))
        .with_state(find)
}

/// The provide surface is reserved but intentionally not implemented.
async fn provide(method: Method) -> Response {
    metrics::record_delegated_method(&method);
    if method == Method::OPTIONS {
        (StatusCode::OK, cors_headers()).into_response()
    } else if method == Method::PUT {
        (StatusCode::NOT_IMPLEMENTED, cors_headers()).into_response()
    } else {
        method_not_allowed(&["GET", "OPTIONS"])
    }
}

async fn find_providers(
    State(find): State<Arc<dyn FindBackend>>,
    Path(cid): Path<String>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
) -> Response {
    dr_find(find.as_ref(), &cid, &uri, &method, &headers, false).await
}

async fn find_providers_encrypted(
    State(find): State<Arc<dyn FindBackend>>,
    Path(cid): Path<String>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
) -> Response {
    dr_find(find.as_ref(), &cid, &uri, &method, &headers, true).await
}

async fn dr_find(
    find: &dyn FindBackend,
    cid: &str,
    uri: &Uri,
    method: &Method,
    headers: &HeaderMap,
    encrypted: bool,
) -> Response {
    metrics::record_delegated_method(method);
    if *method == Method::OPTIONS {
        return (StatusCode::OK, cors_headers()).into_response();
    }
    if *method != Method::GET {
        return method_not_allowed(&["GET"]);
    }

    // Map the trailing `providers/{CID}` onto the sibling `cid/{CID}` path,
    // keeping any prefix (the encrypted surface rewrites to
    // `/encrypted/cid/{CID}`).
    let path = rewrite_find_path(uri.path(), cid);
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let (status, body) = find
        .find(SOURCE_DELEGATED, &path, uri.query(), host, encrypted)
        .await;
    if status != StatusCode::OK {
        return (status, cors_headers()).into_response();
    }

    let parsed: FindResponse = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(err = %e, "failed to parse backend response");
            return (StatusCode::INTERNAL_SERVER_ERROR, cors_headers()).into_response();
        }
    };
    if parsed.multihash_results.len() != 1 {
        warn!(
            number_multihash = parsed.multihash_results.len(),
            "failed to parse backend response"
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, cors_headers()).into_response();
    }
    let result = &parsed.multihash_results[0];

    // Context IDs do not survive into this shape, so distinct index entries
    // can collapse into identical records here; keep the first of each.
    let mut out = DrResponse::default();
    let mut unique: HashSet<u32> = HashSet::new();
    for p in &result.provider_results {
        let provider = match TransportMetadata::decode(&p.metadata) {
            Ok(md) => {
                let mut entries = md.entries().to_vec();
                entries.sort_by_key(|e| e.protocol);
                let mut protocols = Vec::with_capacity(entries.len());
                let mut metadata = BTreeMap::new();
                for entry in &entries {
                    protocols.push(entry.protocol.name().to_string());
                    metadata.insert(
                        entry.protocol.name().to_string(),
                        Base64Bytes(entry.marshal()),
                    );
                }
                DrProvider {
                    schema: PEER_SCHEMA.to_string(),
                    id: p.provider.id.clone(),
                    addrs: p.provider.addrs.clone(),
                    protocols,
                    metadata,
                }
            }
            Err(_) => DrProvider {
                schema: PEER_SCHEMA.to_string(),
                id: p.provider.id.clone(),
                addrs: p.provider.addrs.clone(),
                ..DrProvider::default()
            },
        };
        if unique.insert(dr_fingerprint(&provider)) {
            out.providers.push(provider);
        }
    }

    match serde_json::to_vec(&out) {
        Ok(body) => (
            StatusCode::OK,
            cors_headers(),
            [(header::CONTENT_TYPE, MEDIA_TYPE_JSON)],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(err = %e, "failed to serialize response");
            (StatusCode::INTERNAL_SERVER_ERROR, cors_headers()).into_response()
        }
    }
}

/// Replace the trailing `providers/{cid}` segments with `cid/{cid}`.
fn rewrite_find_path(path: &str, cid: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let parent = trimmed.rfind('/').map_or("", |i| &trimmed[..i]);
    let grandparent = parent.rfind('/').map_or("", |i| &parent[..i]);
    format!("{grandparent}/cid/{cid}")
}

/// CRC32 of (ID, protocol names, schema, metadata values), names and values
/// in sorted protocol order so dedup is deterministic.
fn dr_fingerprint(provider: &DrProvider) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(provider.id.as_bytes());
    for protocol in &provider.protocols {
        hasher.update(protocol.as_bytes());
    }
    hasher.update(provider.schema.as_bytes());
    for value in provider.metadata.values() {
        hasher.update(value.as_ref());
    }
    hasher.finalize()
}

fn cors_headers() -> [(HeaderName, HeaderValue); 2] {
    [
        (
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        ),
    ]
}

fn method_not_allowed(allow: &[&'static str]) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in cors_headers() {
        headers.insert(name, value);
    }
    for method in allow {
        headers.append(header::ALLOW, HeaderValue::from_static(method));
    }
    (StatusCode::METHOD_NOT_ALLOWED, headers).into_response()
}
