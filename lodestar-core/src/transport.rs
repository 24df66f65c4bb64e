//! Transport-metadata codec.
//!
//! Provider records carry an opaque metadata blob describing the transport
//! protocols the provider serves content over. The binary form is a sequence
//! of entries, each an unsigned-varint multicodec transport code followed by
//! a varint payload length and the payload bytes. Decoding stops at the
//! first unknown code; entries decoded up to that point are retained so
//! callers can still account for them.

use thiserror::Error;

/// Multicodec code for the bitswap transport.
const TRANSPORT_BITSWAP: u64 = 0x0900;
/// Multicodec code for the graphsync-filecoin-v1 transport.
const TRANSPORT_GRAPHSYNC_FILECOINV1: u64 = 0x0910;
/// Multicodec code for the IPFS gateway HTTP transport.
const TRANSPORT_IPFS_GATEWAY_HTTP: u64 = 0x0920;

/// A transport protocol this gateway knows how to account for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportProtocol {
    /// Content served over bitswap.
    Bitswap,
    /// Content served over graphsync (filecoin v1 flavor).
    GraphsyncFilecoinV1,
    /// Content served over plain HTTP gateway retrieval.
    Http,
}

impl TransportProtocol {
    /// The multicodec code of this transport.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Bitswap => TRANSPORT_BITSWAP,
            Self::GraphsyncFilecoinV1 => TRANSPORT_GRAPHSYNC_FILECOINV1,
            Self::Http => TRANSPORT_IPFS_GATEWAY_HTTP,
        }
    }

    /// The canonical multicodec name of this transport.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bitswap => "transport-bitswap",
            Self::GraphsyncFilecoinV1 => "transport-graphsync-filecoinv1",
            Self::Http => "transport-ipfs-gateway-http",
        }
    }

    /// Look a transport up by multicodec code.
    #[must_use]
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            TRANSPORT_BITSWAP => Some(Self::Bitswap),
            TRANSPORT_GRAPHSYNC_FILECOINV1 => Some(Self::GraphsyncFilecoinV1),
            TRANSPORT_IPFS_GATEWAY_HTTP => Some(Self::Http),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded metadata entry: a transport and its protocol-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEntry {
    /// The transport the payload belongs to.
    pub protocol: TransportProtocol,
    /// Protocol-specific payload bytes; empty for payload-free transports.
    pub payload: Vec<u8>,
}

impl TransportEntry {
    /// Marshal this entry alone (code, payload length, payload).
    #[must_use]
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len());
        put_uvarint(&mut out, self.protocol.code());
        put_uvarint(&mut out, self.payload.len() as u64);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Decoded transport metadata: the set of transports a provider serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMetadata {
    entries: Vec<TransportEntry>,
}

/// Failure to decode a metadata blob.
///
/// Both variants retain the entries decoded before the failure.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// A multicodec code this gateway does not recognize. Unknown entries
    /// have unknowable framing, so decoding cannot continue past them.
    #[error("unknown transport id {id:#x}")]
    UnknownTransportId {
        /// The unrecognized multicodec code.
        id: u64,
        /// Entries decoded before the unknown code.
        partial: TransportMetadata,
    },

    /// The blob ended mid-entry.
    #[error("transport metadata truncated")]
    Truncated {
        /// Entries decoded before the truncation.
        partial: TransportMetadata,
    },
}

impl MetadataError {
    /// Entries that decoded cleanly before the failure.
    #[must_use]
    pub const fn partial(&self) -> &TransportMetadata {
        match self {
            Self::UnknownTransportId { partial, .. } | Self::Truncated { partial } => partial,
        }
    }
}

impl TransportMetadata {
    /// Build metadata from entries.
    #[must_use]
    pub fn new(entries: Vec<TransportEntry>) -> Self {
        Self { entries }
    }

    /// Decode a metadata blob.
    ///
    /// # Errors
    /// `UnknownTransportId` on an unrecognized code, `Truncated` on a short
    /// read; both carry the entries decoded so far.
    pub fn decode(mut input: &[u8]) -> Result<Self, MetadataError> {
        let mut entries = Vec::new();
        while !input.is_empty() {
            let Some((code, rest)) = take_uvarint(input) else {
                return Err(MetadataError::Truncated {
                    partial: Self::new(entries),
                });
            };
            let Some(protocol) = TransportProtocol::from_code(code) else {
                return Err(MetadataError::UnknownTransportId {
                    id: code,
                    partial: Self::new(entries),
                });
            };
            let Some((len, rest)) = take_uvarint(rest) else {
                return Err(MetadataError::Truncated {
                    partial: Self::new(entries),
                });
            };
            let len = len as usize;
            if rest.len() < len {
                return Err(MetadataError::Truncated {
                    partial: Self::new(entries),
                });
            }
            entries.push(TransportEntry {
                protocol,
                payload: rest[..len].to_vec(),
            });
            input = &rest[len..];
        }
        Ok(Self::new(entries))
    }

    /// Encode all entries back into a single blob.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(&entry.marshal());
        }
        out
    }

    /// The decoded entries, in wire order.
    #[must_use]
    pub fn entries(&self) -> &[TransportEntry] {
        &self.entries
    }

    /// The transports present, in wire order.
    pub fn protocols(&self) -> impl Iterator<Item = TransportProtocol> + '_ {
        self.entries.iter().map(|e| e.protocol)
    }

    /// Whether no entries decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn put_uvarint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn take_uvarint(input: &[u8]) -> Option<(u64, &[u8])> {
    let mut v: u64 = 0;
    for (i, &b) in input.iter().enumerate() {
        // 10 bytes is the longest encoding of a u64.
        if i >= 10 {
            return None;
        }
        v |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Some((v, &input[i + 1..]));
        }
    }
    None
}
