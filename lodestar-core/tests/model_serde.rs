use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use lodestar_core::{
    Base64Bytes, EncryptedMultihashResult, FindResponse, FoundResult, MultihashResult,
    ProviderInfo, ProviderResult,
};

fn record() -> FoundResult {
    FoundResult {
        result: ProviderResult {
            context_id: b"ctx-1".to_vec(),
            metadata: b"md-1".to_vec(),
            provider: ProviderInfo {
                id: "12D3KooWFish".to_string(),
                addrs: vec!["/dns4/fish.example/tcp/1234".to_string()],
            },
        },
        encrypted_value_key: None,
    }
}

#[test]
fn plain_record_serializes_like_the_upstream_schema() {
    let value = serde_json::to_value(record()).unwrap();
    assert_eq!(
        value,
        json!({
            "ContextID": STANDARD.encode(b"ctx-1"),
            "Metadata": STANDARD.encode(b"md-1"),
            "Provider": {
                "ID": "12D3KooWFish",
                "Addrs": ["/dns4/fish.example/tcp/1234"],
            },
        })
    );
}

#[test]
fn encrypted_record_carries_the_key() {
    let mut rec = record();
    rec.encrypted_value_key = Some(b"value-key".to_vec());
    assert!(rec.is_encrypted());

    let value = serde_json::to_value(&rec).unwrap();
    assert_eq!(value["EncryptedValueKey"], STANDARD.encode(b"value-key"));

    let roundtrip: FoundResult = serde_json::from_value(value).unwrap();
    assert_eq!(roundtrip, rec);
}

#[test]
fn empty_byte_fields_are_omitted() {
    let rec = FoundResult {
        result: ProviderResult {
            context_id: Vec::new(),
            metadata: Vec::new(),
            provider: ProviderInfo {
                id: "p1".to_string(),
                addrs: vec!["/dns4/fish.example/tcp/1234".to_string()],
            },
        },
        encrypted_value_key: None,
    };
    let value = serde_json::to_value(&rec).unwrap();
    assert_eq!(
        value,
        json!({
            "Provider": {
                "ID": "p1",
                "Addrs": ["/dns4/fish.example/tcp/1234"],
            },
        })
    );
}

#[test]
fn a_record_without_a_key_is_not_encrypted() {
    assert!(!record().is_encrypted());
    let mut rec = record();
    rec.encrypted_value_key = Some(Vec::new());
    assert!(!rec.is_encrypted());
}

#[test]
fn missing_fields_default_on_deserialize() {
    let rec: FoundResult = serde_json::from_value(json!({
        "Provider": {"ID": "p1", "Addrs": ["/ip4/127.0.0.1/tcp/1"]},
    }))
    .unwrap();
    assert!(rec.result.context_id.is_empty());
    assert!(rec.result.metadata.is_empty());
    assert!(rec.encrypted_value_key.is_none());
}

#[test]
fn find_response_omits_empty_arrays() {
    let value = serde_json::to_value(FindResponse::default()).unwrap();
    assert_eq!(value, json!({}));
}

#[test]
fn find_response_round_trips() {
    let doc = FindResponse {
        multihash_results: vec![MultihashResult {
            multihash: "QmFish".to_string(),
            provider_results: vec![record().result],
        }],
        encrypted_multihash_results: vec![EncryptedMultihashResult {
            multihash: "QmFish".to_string(),
            encrypted_value_keys: vec![Base64Bytes(b"value-key".to_vec())],
        }],
    };
    let bytes = serde_json::to_vec(&doc).unwrap();
    let parsed: FindResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed, doc);
}
