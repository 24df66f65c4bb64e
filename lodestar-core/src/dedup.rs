//! Cross-backend result deduplication and per-transport accounting.

use std::collections::HashSet;

use crate::model::{FoundResult, ProviderResult};
use crate::transport::{MetadataError, TransportMetadata, TransportProtocol};

/// CRC32 fingerprint of a result's identity.
///
/// Encrypted records hash the encrypted value key; plain records hash
/// provider ID, context ID, and metadata. CRC32 is fast and small, and good
/// enough for uniqueness within a single lookup request; the occasional
/// collision costs one dropped duplicate-looking record, which the system
/// tolerates. Do not swap in a cryptographic hash here.
#[must_use]
pub fn fingerprint(result: &FoundResult) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    match result.encrypted_value_key.as_ref().filter(|k| !k.is_empty()) {
        Some(key) => hasher.update(key),
        None => {
            hasher.update(result.result.provider.id.as_bytes());
            hasher.update(&result.result.context_id);
            hasher.update(&result.result.metadata);
        }
    }
    hasher.finalize()
}

/// First-seen-wins dedup filter for one lookup request.
///
/// Memory is proportional to the number of unique results and lives only as
/// long as the request.
#[derive(Debug, Default)]
pub struct ResultSet {
    seen: HashSet<u32>,
}

impl ResultSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result; returns `true` on first insertion, `false` on a
    /// duplicate.
    pub fn put_if_absent(&mut self, result: &FoundResult) -> bool {
        self.seen.insert(fingerprint(result))
    }

    /// Number of unique results recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no unique result has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Per-request counters over the results forwarded downstream.
#[derive(Debug, Default)]
pub struct ResultStats {
    encrypted: u64,
    bitswap: u64,
    graphsync: u64,
    unknown: u64,
}

impl ResultStats {
    /// Observe one forwarded record.
    pub fn observe(&mut self, result: &FoundResult) {
        if result.is_encrypted() {
            self.encrypted += 1;
        } else {
            self.observe_provider(&result.result);
        }
    }

    /// Observe one plain provider record by decoding its metadata.
    ///
    /// An `unknown transport id` decode failure bumps the unknown counter;
    /// transports decoded before any failure are still classified. Known
    /// transports outside the bitswap/graphsync pair also count as unknown.
    pub fn observe_provider(&mut self, result: &ProviderResult) {
        let md = match TransportMetadata::decode(&result.metadata) {
            Ok(md) => md,
            Err(e) => {
                if matches!(e, MetadataError::UnknownTransportId { .. }) {
                    self.unknown += 1;
                }
                e.partial().clone()
            }
        };
        for protocol in md.protocols() {
            match protocol {
                TransportProtocol::Bitswap => self.bitswap += 1,
                TransportProtocol::GraphsyncFilecoinV1 => self.graphsync += 1,
                TransportProtocol::Http => self.unknown += 1,
            }
        }
    }

    /// Encrypted results observed.
    #[must_use]
    pub const fn encrypted(&self) -> u64 {
        self.encrypted
    }

    /// Bitswap transport entries observed.
    #[must_use]
    pub const fn bitswap(&self) -> u64 {
        self.bitswap
    }

    /// Graphsync transport entries observed.
    #[must_use]
    pub const fn graphsync(&self) -> u64 {
        self.graphsync
    }

    /// Unknown transport entries observed.
    #[must_use]
    pub const fn unknown(&self) -> u64 {
        self.unknown
    }
}
