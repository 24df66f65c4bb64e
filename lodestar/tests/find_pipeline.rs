use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use tower::ServiceExt;

use lodestar::{Gateway, HttpBackend, MEDIA_TYPE_JSON, MEDIA_TYPE_NDJSON};
use lodestar_core::{
    Backend as _, BackendVariant, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    FindResponse, FoundResult, ProviderInfo, ProviderResult,
};
use lodestar_mock::MockBackend;

fn record(id: &str, context_id: &[u8], metadata: &[u8]) -> FoundResult {
    FoundResult {
        result: ProviderResult {
            context_id: context_id.to_vec(),
            metadata: metadata.to_vec(),
            provider: ProviderInfo {
                id: id.to_string(),
                addrs: vec!["/dns4/fish.example/tcp/1234".to_string()],
            },
        },
        encrypted_value_key: None,
    }
}

fn encrypted_record(key: &[u8]) -> FoundResult {
    FoundResult {
        result: ProviderResult::default(),
        encrypted_value_key: Some(key.to_vec()),
    }
}

fn ndjson(records: &[FoundResult]) -> String {
    records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap() + "\n")
        .collect()
}

fn backend(server: &MockServer, variant: BackendVariant) -> Arc<HttpBackend> {
    Arc::new(HttpBackend::new(server.base_url().parse().unwrap(), variant))
}

fn gateway(backends: Vec<Arc<HttpBackend>>) -> Arc<Gateway> {
    let mut builder = Gateway::builder()
        .result_max_wait(Duration::from_secs(2))
        .result_stream_max_wait(Duration::from_secs(2));
    for b in backends {
        builder = builder.with_backend(b);
    }
    Arc::new(builder.build().unwrap())
}

async fn get(
    gateway: Arc<Gateway>,
    path: &str,
    accept: &str,
) -> (StatusCode, HeaderMap, bytes::Bytes) {
    let response = gateway
        .router()
        .oneshot(
            Request::builder()
                .uri(path)
                .header(header::ACCEPT, accept)
                .header(header::HOST, "find.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn parse_lines(body: &[u8]) -> Vec<FoundResult> {
    body.split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_dedups_identical_records_across_backends() {
    let a = MockServer::start_async().await;
    let b = MockServer::start_async().await;
    let shared = record("p1", b"ctx-1", &[]);
    let body = ndjson(&[shared.clone()]);

    let mock_a = a
        .mock_async(|when, then| {
            when.method(GET)
                .path("/multihash/QmFish")
                .header("accept", MEDIA_TYPE_NDJSON)
                .header("x-forwarded-host", "find.example.com");
            then.status(200)
                .header("content-type", MEDIA_TYPE_NDJSON)
                .body(&body);
        })
        .await;
    let mock_b = b
        .mock_async(|when, then| {
            when.method(GET).path("/multihash/QmFish");
            then.status(200)
                .header("content-type", MEDIA_TYPE_NDJSON)
                .body(&body);
        })
        .await;

    let gw = gateway(vec![
        backend(&a, BackendVariant::Plain),
        backend(&b, BackendVariant::Plain),
    ]);
    let (status, headers, body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        MEDIA_TYPE_NDJSON
    );
    assert_eq!(
        headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
    let lines = parse_lines(&body);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0], shared);
    assert_eq!(mock_a.hits_async().await, 1);
    assert_eq!(mock_b.hits_async().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_merges_distinct_records() {
    let a = MockServer::start_async().await;
    let b = MockServer::start_async().await;
    let one = record("p1", b"ctx-1", &[]);
    let two = record("p2", b"ctx-2", &[]);
    let body_a = ndjson(&[one.clone()]);
    let body_b = ndjson(&[two.clone()]);

    a.mock_async(|when, then| {
        when.method(GET).path("/multihash/QmFish");
        then.status(200).body(&body_a);
    })
    .await;
    b.mock_async(|when, then| {
        when.method(GET).path("/multihash/QmFish");
        then.status(200).body(&body_b);
    })
    .await;

    let gw = gateway(vec![
        backend(&a, BackendVariant::Plain),
        backend(&b, BackendVariant::Plain),
    ]);
    let (status, _headers, body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::OK);
    let lines = parse_lines(&body);
    assert_eq!(lines.len(), 2);
    assert!(lines.contains(&one));
    assert!(lines.contains(&two));
}

#[tokio::test(flavor = "multi_thread")]
async fn not_found_when_all_backends_are_empty() {
    let a = MockServer::start_async().await;
    let b = MockServer::start_async().await;
    let mock_a = a
        .mock_async(|when, then| {
            when.method(GET);
            then.status(404);
        })
        .await;
    let mock_b = b
        .mock_async(|when, then| {
            when.method(GET);
            then.status(404);
        })
        .await;

    let gw = gateway(vec![
        backend(&a, BackendVariant::Plain),
        backend(&b, BackendVariant::Plain),
    ]);
    let (status, _headers, _body) = get(gw, "/multihash/QmGone", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(mock_a.hits_async().await, 1);
    assert_eq!(mock_b.hits_async().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_mode_builds_a_single_document() {
    let server = MockServer::start_async().await;
    let plain = record("p1", b"ctx-1", &[]);
    let enc = encrypted_record(b"secret-key");
    let body = ndjson(&[plain.clone(), enc.clone()]);

    server
        .mock_async(|when, then| {
            when.method(GET).path("/multihash/QmDoc");
            then.status(200).body(&body);
        })
        .await;

    let gw = gateway(vec![backend(&server, BackendVariant::Plain)]);
    let (status, headers, body) = get(gw, "/multihash/QmDoc", MEDIA_TYPE_JSON).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), MEDIA_TYPE_JSON);
    let doc: FindResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc.multihash_results.len(), 1);
    assert_eq!(doc.multihash_results[0].multihash, "QmDoc");
    assert_eq!(doc.multihash_results[0].provider_results, vec![plain.result]);
    assert_eq!(doc.encrypted_multihash_results.len(), 1);
    assert_eq!(doc.encrypted_multihash_results[0].multihash, "QmDoc");
    assert_eq!(
        doc.encrypted_multihash_results[0].encrypted_value_keys,
        vec![lodestar_core::Base64Bytes(b"secret-key".to_vec())]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn encrypted_lookups_reach_only_double_hashed_backends() {
    let plain = MockServer::start_async().await;
    let dh = MockServer::start_async().await;
    let key = encrypted_record(b"value-key");
    let body = ndjson(&[key.clone()]);

    let plain_mock = plain
        .mock_async(|when, then| {
            when.method(GET);
            then.status(404);
        })
        .await;
    dh.mock_async(|when, then| {
        when.method(GET).path("/encrypted/multihash/QmSecret");
        then.status(200).body(&body);
    })
    .await;

    let gw = gateway(vec![
        backend(&plain, BackendVariant::Plain),
        backend(&dh, BackendVariant::DoubleHashed),
    ]);
    let (status, _headers, body) =
        get(gw, "/encrypted/multihash/QmSecret", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_lines(&body), vec![key]);
    assert_eq!(plain_mock.hits_async().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn regular_lookups_skip_double_hashed_backends() {
    let plain = MockServer::start_async().await;
    let dh = MockServer::start_async().await;
    let body = ndjson(&[record("p1", b"ctx-1", &[])]);

    plain
        .mock_async(|when, then| {
            when.method(GET).path("/multihash/QmFish");
            then.status(200).body(&body);
        })
        .await;
    let dh_mock = dh
        .mock_async(|when, then| {
            when.method(GET);
            then.status(404);
        })
        .await;

    let gw = gateway(vec![
        backend(&plain, BackendVariant::Plain),
        backend(&dh, BackendVariant::DoubleHashed),
    ]);
    let (status, _headers, _body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(dh_mock.hits_async().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn providers_backends_never_join_the_fanout() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200);
        })
        .await;

    let gw = gateway(vec![backend(&server, BackendVariant::Providers)]);
    let (status, _headers, _body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_JSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn drops_plain_records_without_provider_identity() {
    let server = MockServer::start_async().await;
    // A backend ignoring the Accept header can hand back junk that still
    // parses; the sanity filter keeps it out of the response.
    let hollow = FoundResult {
        result: ProviderResult {
            context_id: b"ctx".to_vec(),
            ..ProviderResult::default()
        },
        encrypted_value_key: None,
    };
    let body = ndjson(&[hollow]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/multihash/QmJunk");
            then.status(200).body(&body);
        })
        .await;

    let gw = gateway(vec![backend(&server, BackendVariant::Plain)]);
    let (status, _headers, _body) = get(gw, "/multihash/QmJunk", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_lines_cost_only_that_backend() {
    let bad = MockServer::start_async().await;
    let good = MockServer::start_async().await;
    let one = record("p1", b"ctx-1", &[]);
    let body = ndjson(&[one.clone()]);

    bad.mock_async(|when, then| {
        when.method(GET);
        then.status(200).body("this is not json\n");
    })
    .await;
    good.mock_async(|when, then| {
        when.method(GET).path("/multihash/QmFish");
        then.status(200).body(&body);
    })
    .await;

    let gw = gateway(vec![
        backend(&bad, BackendVariant::Plain),
        backend(&good, BackendVariant::Plain),
    ]);
    let (status, _headers, body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_lines(&body), vec![one]);
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_5xx_trips_its_breaker() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(500).body("boom");
        })
        .await;

    let guarded = Arc::new(
        HttpBackend::new(
            server.base_url().parse().unwrap(),
            BackendVariant::Plain,
        )
        .with_breaker(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        })),
    );
    let gw = gateway(vec![Arc::clone(&guarded)]);
    let (status, _headers, _body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_JSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(guarded.breaker().unwrap().state(), CircuitState::Open);
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_4xx_is_success_marked_for_the_breaker() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(400).body("bad request");
        })
        .await;

    let guarded = Arc::new(
        HttpBackend::new(
            server.base_url().parse().unwrap(),
            BackendVariant::Plain,
        )
        .with_breaker(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        })),
    );
    let gw = gateway(vec![Arc::clone(&guarded)]);
    let (status, _headers, _body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_JSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(guarded.breaker().unwrap().state(), CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_failure_trips_the_breaker() {
    // Grab a port with nothing listening behind it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let guarded = Arc::new(
        HttpBackend::new(
            format!("http://127.0.0.1:{port}").parse().unwrap(),
            BackendVariant::Plain,
        )
        .with_breaker(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        })),
    );
    let gw = gateway(vec![Arc::clone(&guarded)]);
    let (status, _headers, _body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_JSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(guarded.breaker().unwrap().state(), CircuitState::Open);
}

#[tokio::test(flavor = "multi_thread")]
async fn send_timeout_trips_the_breaker() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).delay(Duration::from_secs(2));
        })
        .await;

    let guarded = Arc::new(
        HttpBackend::new(
            server.base_url().parse().unwrap(),
            BackendVariant::Plain,
        )
        .with_breaker(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        })),
    );
    // The client gives up well before the scatter deadline, so the worker
    // sees the timeout as a send error rather than being dropped.
    let gw = Arc::new(
        Gateway::builder()
            .with_backend(Arc::clone(&guarded) as Arc<dyn lodestar_core::Backend>)
            .http_client(
                reqwest::Client::builder()
                    .timeout(Duration::from_millis(100))
                    .build()
                    .unwrap(),
            )
            .result_max_wait(Duration::from_secs(2))
            .build()
            .unwrap(),
    );
    let (status, _headers, _body) = get(gw, "/multihash/QmSlow", MEDIA_TYPE_JSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(guarded.breaker().unwrap().state(), CircuitState::Open);
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_terminates_within_the_deadline() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).delay(Duration::from_secs(2));
        })
        .await;

    let gw = Arc::new(
        Gateway::builder()
            .with_backend(backend(&server, BackendVariant::Plain))
            .result_stream_max_wait(Duration::from_millis(150))
            .build()
            .unwrap(),
    );
    let started = Instant::now();
    let (status, _headers, _body) = get(gw, "/multihash/QmSlow", MEDIA_TYPE_NDJSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_by_match_predicate_is_never_queried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200);
        })
        .await;

    let choosy = Arc::new(
        MockBackend::builder()
            .url(server.base_url().parse().unwrap())
            .accepts(|_| false)
            .build(),
    );
    let gw = Arc::new(
        Gateway::builder()
            .with_backend(choosy)
            .build()
            .unwrap(),
    );
    let (status, _headers, _body) = get(gw, "/multihash/QmFish", MEDIA_TYPE_JSON).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn building_without_backends_is_rejected() {
    let err = Gateway::builder().build().unwrap_err();
    assert!(matches!(err, lodestar_core::LodestarError::InvalidArg(_)));
}
