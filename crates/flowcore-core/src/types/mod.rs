//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the flowcore substrate:
//! - Identifiers (`ParticleId`, `EventId`) and time (`Timestamp`)
//! - Chain digests (`ChainHash`)
//! - Request-scoped metadata (`Context`)
//! - Opaque structured event data (`Payload`)
//! - Particle lifecycle status (`ParticleStatus`)
//! - Error types (`FlowError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Use `BTreeMap` wherever keys are involved, so iteration order is fixed
//! - Implement `Ord` where they act as map keys

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier of a logical particle.
///
/// Allocated sequentially by the owning `ParticleStore`, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticleId(pub u64);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "particle-{}", self.0)
    }
}

/// Unique identifier of a dispatched event.
///
/// Equal to the 1-based position of the event's link in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Get the raw millisecond value.
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }

    /// Advance by `step` milliseconds using saturating arithmetic.
    #[must_use]
    pub const fn advance(self, step: u64) -> Self {
        Self(self.0.saturating_add(step))
    }
}

// =============================================================================
// CHAIN HASH
// =============================================================================

/// A 32-byte BLAKE3 digest identifying one chain link.
///
/// Serialized as a 64-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// The sentinel parent of the first link, and the digest of an empty chain.
    pub const GENESIS: Self = Self([0u8; 32]);

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check whether this is the genesis sentinel.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }

    /// Lowercase hex rendering (64 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(hex: &str) -> Result<Self, FlowError> {
        blake3::Hash::from_hex(hex)
            .map(|hash| Self(*hash.as_bytes()))
            .map_err(|e| FlowError::SerializationError(format!("Invalid digest: {}", e)))
    }
}

impl From<blake3::Hash> for ChainHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({})", self.to_hex())
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(D::Error::custom)
    }
}

// =============================================================================
// PARTICLE STATUS
// =============================================================================

/// Lifecycle status of one particle version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticleStatus {
    /// Freshly created, still open for work.
    Draft,
    /// Settled into a final form.
    Collapsed,
    /// End of life. Particles are never deleted.
    Archived,
}

impl ParticleStatus {
    /// Stable lowercase name, used in event payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Collapsed => "collapsed",
            Self::Archived => "archived",
        }
    }

    /// Parse the lowercase name produced by [`ParticleStatus::as_str`].
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "draft" => Some(Self::Draft),
            "collapsed" => Some(Self::Collapsed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for ParticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Immutable request-scoped metadata threaded through every operation.
///
/// Built once per external operation with the consuming `with_*` methods;
/// there are no setters, so a constructed context never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seed: Option<String>,
    created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, String>>,
}

impl Context {
    /// Create a context with only the mandatory fields.
    #[must_use]
    pub fn new(id: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            project: None,
            persona: None,
            seed: None,
            created_at,
            metadata: None,
        }
    }

    /// Attach a project reference.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Attach a persona reference.
    #[must_use]
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Attach a seed reference.
    #[must_use]
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Add one metadata entry. Creates the metadata map on first use.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.as_ref()
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// Opaque structured event data.
///
/// Integer-only and keyed by `BTreeMap`, so two payloads with the same
/// content always encode to the same bytes regardless of how they were built.
/// Serialized untagged, which makes the JSON form the natural one
/// (`{"k": [1, "two", null]}`). JSON floats are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Payload {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Payload>),
    Map(BTreeMap<String, Payload>),
}

impl Payload {
    /// Build a map payload from key/value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Payload)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a key in a map payload.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the flowcore substrate.
///
/// Rule violations are NOT errors; they are reported as data by the Flow Law.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The referenced particle does not exist in the store.
    #[error("Particle not found: {0}")]
    NotFound(ParticleId),

    /// A strict transition policy rejected the requested status change.
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: ParticleId,
        from: ParticleStatus,
        to: ParticleStatus,
    },

    /// A collaborator dispatched an event type reserved for particle events.
    #[error("Reserved event type: {0}")]
    ReservedEventType(String),

    /// Recomputed link hashes diverge from the stored ones.
    #[error("Chain integrity violation at link {index}: expected {expected}, found {found}")]
    ChainIntegrityViolation {
        index: usize,
        expected: ChainHash,
        found: ChainHash,
    },

    /// A recorded particle event could not be replayed.
    #[error("Malformed event {event}: {reason}")]
    MalformedEvent { event: EventId, reason: String },

    /// Canonical encoding or decoding failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_builder_sets_optional_references() {
        let ctx = Context::new("ctx-1", Timestamp(5))
            .with_project("atlas")
            .with_persona("navigator")
            .with_seed("seed-7");

        assert_eq!(ctx.id(), "ctx-1");
        assert_eq!(ctx.project(), Some("atlas"));
        assert_eq!(ctx.persona(), Some("navigator"));
        assert_eq!(ctx.seed(), Some("seed-7"));
        assert_eq!(ctx.created_at(), Timestamp(5));
        assert!(ctx.metadata().is_none());
    }

    #[test]
    fn context_metadata_absent_differs_from_empty_map() {
        let bare = Context::new("ctx", Timestamp(0));
        let tagged = Context::new("ctx", Timestamp(0)).with_metadata("lang", "en");

        assert_ne!(bare, tagged);
        assert_eq!(
            tagged.metadata().and_then(|m| m.get("lang")).map(String::as_str),
            Some("en")
        );
    }

    #[test]
    fn context_json_omits_absent_fields() {
        let ctx = Context::new("ctx", Timestamp(9));
        let json = serde_json::to_string(&ctx).expect("serialize");
        assert_eq!(json, r#"{"id":"ctx","created_at":9}"#);

        let parsed: Context = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, ctx);
    }

    #[test]
    fn chain_hash_hex_roundtrip() {
        let hash = ChainHash::from(blake3::hash(b"flow"));
        let parsed = ChainHash::from_hex(&hash.to_hex()).expect("parse");
        assert_eq!(parsed, hash);
        assert_eq!(hash.to_hex().len(), 64);
    }

    #[test]
    fn chain_hash_rejects_bad_hex() {
        assert!(matches!(
            ChainHash::from_hex("not-a-digest"),
            Err(FlowError::SerializationError(_))
        ));
    }

    #[test]
    fn genesis_is_all_zero() {
        assert!(ChainHash::GENESIS.is_genesis());
        assert_eq!(ChainHash::GENESIS.to_hex(), "0".repeat(64));
    }

    #[test]
    fn payload_json_is_untagged() {
        let payload = Payload::map([
            ("count", Payload::Int(3)),
            ("name", Payload::from("seed")),
            ("missing", Payload::Null),
        ]);
        let json = serde_json::to_string(&payload).expect("serialize");
        assert_eq!(json, r#"{"count":3,"missing":null,"name":"seed"}"#);

        let parsed: Payload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, payload);
    }

    #[test]
    fn payload_rejects_floats() {
        let parsed: Result<Payload, _> = serde_json::from_str("1.5");
        assert!(parsed.is_err());
    }

    #[test]
    fn status_names_roundtrip() {
        for status in [
            ParticleStatus::Draft,
            ParticleStatus::Collapsed,
            ParticleStatus::Archived,
        ] {
            assert_eq!(ParticleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ParticleStatus::parse("deleted"), None);
    }

    #[test]
    fn timestamp_advance_saturates() {
        assert_eq!(Timestamp(u64::MAX).advance(1), Timestamp(u64::MAX));
        assert_eq!(Timestamp(10).advance(5), Timestamp(15));
    }
}
