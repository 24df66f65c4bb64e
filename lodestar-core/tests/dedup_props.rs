use proptest::prelude::*;

use lodestar_core::{
    FoundResult, ProviderInfo, ProviderResult, ResultSet, ResultStats, TransportEntry,
    TransportMetadata, TransportProtocol, fingerprint,
};

fn plain(id: &str, context_id: &[u8], metadata: &[u8]) -> FoundResult {
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

fn encrypted(key: &[u8]) -> FoundResult {
    FoundResult {
        result: ProviderResult::default(),
        encrypted_value_key: Some(key.to_vec()),
    }
}

#[test]
fn first_insertion_wins() {
    let mut set = ResultSet::new();
    let record = plain("p1", b"ctx", b"md");
    assert!(set.put_if_absent(&record));
    assert!(!set.put_if_absent(&record));
    assert_eq!(set.len(), 1);
}

#[test]
fn encrypted_records_dedup_by_key_alone() {
    let mut set = ResultSet::new();
    let mut a = encrypted(b"same-key");
    a.result.provider.id = "p1".to_string();
    let mut b = encrypted(b"same-key");
    b.result.provider.id = "p2".to_string();
    assert!(set.put_if_absent(&a));
    // Same key, different provider shell: still a duplicate.
    assert!(!set.put_if_absent(&b));
}

#[test]
fn plain_records_distinguish_metadata() {
    let mut set = ResultSet::new();
    assert!(set.put_if_absent(&plain("p1", b"ctx", b"md-a")));
    assert!(set.put_if_absent(&plain("p1", b"ctx", b"md-b")));
    assert_eq!(set.len(), 2);
}

#[test]
fn empty_and_missing_key_fingerprint_alike() {
    let mut with_empty = plain("p1", b"ctx", b"md");
    with_empty.encrypted_value_key = Some(Vec::new());
    let without = plain("p1", b"ctx", b"md");
    assert_eq!(fingerprint(&with_empty), fingerprint(&without));
}

#[test]
fn stats_count_encrypted_records() {
    let mut stats = ResultStats::default();
    stats.observe(&encrypted(b"key-1"));
    stats.observe(&encrypted(b"key-2"));
    assert_eq!(stats.encrypted(), 2);
    assert_eq!(stats.bitswap(), 0);
}

#[test]
fn stats_classify_decoded_transports() {
    let metadata = TransportMetadata::new(vec![
        TransportEntry {
            protocol: TransportProtocol::Bitswap,
            payload: Vec::new(),
        },
        TransportEntry {
            protocol: TransportProtocol::GraphsyncFilecoinV1,
            payload: vec![0x01, 0x02],
        },
    ])
    .encode();
    let mut stats = ResultStats::default();
    stats.observe(&plain("p1", b"ctx", &metadata));
    assert_eq!(stats.bitswap(), 1);
    assert_eq!(stats.graphsync(), 1);
    assert_eq!(stats.unknown(), 0);
}

#[test]
fn stats_count_unknown_transport_and_keep_decoded_prefix() {
    // One good bitswap entry followed by an unrecognized code (0x4d2).
    let mut metadata = TransportMetadata::new(vec![TransportEntry {
        protocol: TransportProtocol::Bitswap,
        payload: Vec::new(),
    }])
    .encode();
    metadata.extend_from_slice(&[0xd2, 0x09]);

    let mut stats = ResultStats::default();
    stats.observe(&plain("p1", b"ctx", &metadata));
    assert_eq!(stats.bitswap(), 1);
    assert_eq!(stats.unknown(), 1);
}

#[test]
fn stats_count_transports_outside_the_known_pair_as_unknown() {
    let metadata = TransportMetadata::new(vec![TransportEntry {
        protocol: TransportProtocol::Http,
        payload: Vec::new(),
    }])
    .encode();
    let mut stats = ResultStats::default();
    stats.observe(&plain("p1", b"ctx", &metadata));
    assert_eq!(stats.unknown(), 1);
}

#[test]
fn stats_ignore_empty_metadata() {
    let mut stats = ResultStats::default();
    stats.observe(&plain("p1", b"ctx", &[]));
    assert_eq!(stats.bitswap(), 0);
    assert_eq!(stats.graphsync(), 0);
    assert_eq!(stats.unknown(), 0);
    assert_eq!(stats.encrypted(), 0);
}

proptest! {
    #[test]
    fn reinsertion_is_always_a_duplicate(
        id in "[a-z0-9]{1,16}",
        context_id in proptest::collection::vec(any::<u8>(), 0..24),
        metadata in proptest::collection::vec(any::<u8>(), 0..24),
    ) {
        let record = plain(&id, &context_id, &metadata);
        let mut set = ResultSet::new();
        prop_assert!(set.put_if_absent(&record));
        prop_assert!(!set.put_if_absent(&record));
    }

    #[test]
    fn fingerprint_is_stable(
        id in "[a-z0-9]{1,16}",
        context_id in proptest::collection::vec(any::<u8>(), 0..24),
    ) {
        let record = plain(&id, &context_id, b"md");
        prop_assert_eq!(fingerprint(&record), fingerprint(&record.clone()));
    }
}
