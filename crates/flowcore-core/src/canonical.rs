//! # Canonical Encoding
//!
//! Byte-stable encoding of an `(event, context)` pair, the input of every
//! chain link hash.
//!
//! The public types serialize for humans (untagged payloads, omitted absent
//! fields). Hashing must not depend on any of that, so this module mirrors
//! them into private, fully tagged records and serializes those with
//! `postcard`:
//! - Field order is fixed by the struct definitions below
//! - Map entries are emitted in `BTreeMap` key order
//! - Every optional field carries an explicit presence tag, so an absent
//!   value never encodes like an empty or null one
//! - Every payload value carries its variant tag, so `"1"` and `1` differ
//!
//! Layout: `[magic: 4 bytes] [version: u8] [context] [event]`, prefixed at
//! hash time by the 32-byte parent hash.

use crate::chain::Event;
use crate::primitives::{CANONICAL_MAGIC, CANONICAL_VERSION};
use crate::{ChainHash, Context, FlowError, Payload};
use serde::Serialize;

// =============================================================================
// CANONICAL RECORDS
// =============================================================================

#[derive(Serialize)]
struct CanonicalRecord<'a> {
    magic: [u8; 4],
    version: u8,
    context: CanonicalContext<'a>,
    event: CanonicalEvent<'a>,
}

#[derive(Serialize)]
struct CanonicalContext<'a> {
    id: &'a str,
    project: Option<&'a str>,
    persona: Option<&'a str>,
    seed: Option<&'a str>,
    created_at: u64,
    metadata: Option<Vec<(&'a str, &'a str)>>,
}

impl<'a> From<&'a Context> for CanonicalContext<'a> {
    fn from(ctx: &'a Context) -> Self {
        Self {
            id: ctx.id(),
            project: ctx.project(),
            persona: ctx.persona(),
            seed: ctx.seed(),
            created_at: ctx.created_at().millis(),
            metadata: ctx
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()),
        }
    }
}

#[derive(Serialize)]
struct CanonicalEvent<'a> {
    id: u64,
    event_type: &'a str,
    payload: CanonicalValue<'a>,
    created_at: u64,
}

impl<'a> From<&'a Event> for CanonicalEvent<'a> {
    fn from(event: &'a Event) -> Self {
        Self {
            id: event.id.0,
            event_type: &event.event_type,
            payload: CanonicalValue::from(&event.payload),
            created_at: event.created_at.millis(),
        }
    }
}

/// Externally tagged twin of `Payload`.
#[derive(Serialize)]
enum CanonicalValue<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Text(&'a str),
    List(Vec<CanonicalValue<'a>>),
    Map(Vec<(&'a str, CanonicalValue<'a>)>),
}

impl<'a> From<&'a Payload> for CanonicalValue<'a> {
    fn from(payload: &'a Payload) -> Self {
        match payload {
            Payload::Null => Self::Null,
            Payload::Bool(b) => Self::Bool(*b),
            Payload::Int(n) => Self::Int(*n),
            Payload::Text(s) => Self::Text(s),
            Payload::List(items) => Self::List(items.iter().map(Self::from).collect()),
            Payload::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.as_str(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

// =============================================================================
// ENCODING & HASHING
// =============================================================================

/// Encode an `(event, context)` pair canonically.
///
/// # Errors
///
/// Returns `FlowError::SerializationError` if postcard rejects the record.
pub fn encode(event: &Event, context: &Context) -> Result<Vec<u8>, FlowError> {
    let record = CanonicalRecord {
        magic: CANONICAL_MAGIC,
        version: CANONICAL_VERSION,
        context: CanonicalContext::from(context),
        event: CanonicalEvent::from(event),
    };

    postcard::to_allocvec(&record)
        .map_err(|e| FlowError::SerializationError(format!("Canonical record: {}", e)))
}

/// Compute the hash of a link: `BLAKE3(parent ∥ encode(event, context))`.
pub fn link_hash(
    parent: &ChainHash,
    event: &Event,
    context: &Context,
) -> Result<ChainHash, FlowError> {
    let bytes = encode(event, context)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(parent.as_bytes());
    hasher.update(&bytes);
    Ok(hasher.finalize().into())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventId, Timestamp};
    use std::collections::BTreeMap;

    fn event(payload: Payload) -> Event {
        Event::new(EventId(1), "note.added", payload, Timestamp(10))
    }

    fn ctx() -> Context {
        Context::new("ctx", Timestamp(1))
    }

    #[test]
    fn encoding_starts_with_magic_and_version() {
        let bytes = encode(&event(Payload::Null), &ctx()).expect("encode");
        assert_eq!(&bytes[..4], &CANONICAL_MAGIC);
        assert_eq!(bytes[4], CANONICAL_VERSION);
    }

    #[test]
    fn encoding_is_stable_across_calls() {
        let a = encode(&event(Payload::from("x")), &ctx()).expect("encode");
        let b = encode(&event(Payload::from("x")), &ctx()).expect("encode");
        assert_eq!(a, b);
    }

    #[test]
    fn map_construction_order_does_not_matter() {
        let mut forward = BTreeMap::new();
        forward.insert("a".to_string(), Payload::Int(1));
        forward.insert("b".to_string(), Payload::Int(2));

        let mut reverse = BTreeMap::new();
        reverse.insert("b".to_string(), Payload::Int(2));
        reverse.insert("a".to_string(), Payload::Int(1));

        let a = encode(&event(Payload::Map(forward)), &ctx()).expect("encode");
        let b = encode(&event(Payload::Map(reverse)), &ctx()).expect("encode");
        assert_eq!(a, b);
    }

    #[test]
    fn value_types_are_distinguished() {
        let text = encode(&event(Payload::from("1")), &ctx()).expect("encode");
        let int = encode(&event(Payload::Int(1)), &ctx()).expect("encode");
        let null = encode(&event(Payload::Null), &ctx()).expect("encode");
        let empty = encode(&event(Payload::from("")), &ctx()).expect("encode");

        assert_ne!(text, int);
        assert_ne!(null, empty);
    }

    #[test]
    fn absent_persona_differs_from_empty_persona() {
        let absent = encode(&event(Payload::Null), &ctx()).expect("encode");
        let empty = encode(&event(Payload::Null), &ctx().with_persona("")).expect("encode");
        assert_ne!(absent, empty);
    }

    #[test]
    fn absent_metadata_differs_from_populated() {
        let absent = encode(&event(Payload::Null), &ctx()).expect("encode");
        let present =
            encode(&event(Payload::Null), &ctx().with_metadata("k", "v")).expect("encode");
        assert_ne!(absent, present);
    }

    #[test]
    fn link_hash_depends_on_parent() {
        let e = event(Payload::Null);
        let first = link_hash(&ChainHash::GENESIS, &e, &ctx()).expect("hash");
        let second = link_hash(&first, &e, &ctx()).expect("hash");
        assert_ne!(first, second);
    }
}
