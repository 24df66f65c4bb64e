//! Wire model shared by the find pipeline and the Delegated Routing
//! translator.
//!
//! Field names mirror the upstream indexer NDJSON schema (`ContextID`,
//! `Metadata`, `Provider`, `EncryptedValueKey`, `MultihashResults`, ...).
//! Opaque byte fields travel as base64 strings; peer IDs, multiaddresses,
//! and multihashes are carried as opaque strings and never interpreted.

use serde::{Deserialize, Serialize};

/// Serde adapter: `Vec<u8>` as a standard-alphabet base64 string.
pub mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as base64.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize base64 into bytes.
    ///
    /// # Errors
    /// Fails on non-string input or invalid base64.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter: `Option<Vec<u8>>` as an optional base64 string.
pub mod base64_bytes_opt {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize optional bytes as base64.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional base64 string into bytes.
    ///
    /// # Errors
    /// Fails on invalid base64.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Owned opaque bytes that serialize as a base64 string.
///
/// Used where byte payloads appear as standalone JSON values (encrypted
/// value keys, per-protocol metadata map entries).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Base64Bytes(pub Vec<u8>);

impl Serialize for Base64Bytes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        base64_bytes::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        base64_bytes::deserialize(deserializer).map(Self)
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identity of a provider: opaque peer ID plus its multiaddresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Opaque peer ID.
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Ordered multiaddresses the provider is reachable at.
    #[serde(rename = "Addrs", default)]
    pub addrs: Vec<String>,
}

/// One backend's plain answer about one multihash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Opaque bytes grouping a batch of advertisements; may be empty.
    #[serde(
        rename = "ContextID",
        with = "base64_bytes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub context_id: Vec<u8>,
    /// Opaque binary decoding to a set of transport-protocol entries.
    #[serde(
        rename = "Metadata",
        with = "base64_bytes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub metadata: Vec<u8>,
    /// The provider this record advertises.
    #[serde(rename = "Provider", default)]
    pub provider: ProviderInfo,
}

/// One NDJSON record from a backend: a plain provider record, an encrypted
/// value key, or (on the wire) both.
///
/// A record counts as encrypted iff `EncryptedValueKey` is present and
/// non-empty; the encrypted arm then wins for fingerprinting and stats. The
/// full record is re-emitted exactly as received when streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundResult {
    /// The plain provider record.
    #[serde(flatten)]
    pub result: ProviderResult,
    /// Encrypted value key for double-hashed lookups.
    #[serde(
        rename = "EncryptedValueKey",
        with = "base64_bytes_opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_value_key: Option<Vec<u8>>,
}

impl FoundResult {
    /// Whether this record carries an encrypted value key.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encrypted_value_key
            .as_ref()
            .is_some_and(|k| !k.is_empty())
    }
}

/// Plain results for one multihash in the buffered unified response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultihashResult {
    /// The multihash the results are keyed to, as received on the URL path.
    #[serde(rename = "Multihash")]
    pub multihash: String,
    /// Unique provider records, in arrival order of their first occurrence.
    #[serde(rename = "ProviderResults", default)]
    pub provider_results: Vec<ProviderResult>,
}

/// Encrypted results for one multihash in the buffered unified response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMultihashResult {
    /// The multihash the keys are keyed to, as received on the URL path.
    #[serde(rename = "Multihash")]
    pub multihash: String,
    /// Unique encrypted value keys, in arrival order.
    #[serde(rename = "EncryptedValueKeys", default)]
    pub encrypted_value_keys: Vec<Base64Bytes>,
}

/// Aggregate across backends for one lookup; either array is absent when
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindResponse {
    /// Plain results, at most one entry per requested multihash.
    #[serde(
        rename = "MultihashResults",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub multihash_results: Vec<MultihashResult>,
    /// Encrypted results, at most one entry per requested multihash.
    #[serde(
        rename = "EncryptedMultihashResults",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub encrypted_multihash_results: Vec<EncryptedMultihashResult>,
}
