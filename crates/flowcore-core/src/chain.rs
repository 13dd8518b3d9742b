//! # Event Chain
//!
//! Append-only sequence of hash-linked records. Each link binds one event to
//! the context it occurred in:
//!
//! ```text
//! hash[0] = BLAKE3(GENESIS   ∥ canonical(event[0], context[0]))
//! hash[n] = BLAKE3(hash[n-1] ∥ canonical(event[n], context[n]))
//! ```
//!
//! The chain is the single source of truth for "what happened and in what
//! order". Links are never removed, reordered or mutated; the only way to
//! grow the chain is `append`.
//!
//! ## Tamper Evidence
//!
//! `digest()` is a checkpoint: anyone holding a prior digest can detect
//! inserted, removed or reordered links by recomputing forward. `audit()`
//! recomputes with a running hash rather than trusting stored parents, so a
//! tampered link also invalidates every link after it.

use crate::canonical;
use crate::clock::{Clock, SystemClock};
use crate::{ChainHash, Context, EventId, FlowError, Payload, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// EVENT
// =============================================================================

/// One recorded intent. Opaque to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Payload,
    pub created_at: Timestamp,
}

impl Event {
    #[must_use]
    pub fn new(
        id: EventId,
        event_type: impl Into<String>,
        payload: Payload,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            payload,
            created_at,
        }
    }
}

// =============================================================================
// CHAIN LINK
// =============================================================================

/// One append-only, hash-linked record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// `BLAKE3(parent ∥ canonical(event, context))`.
    pub hash: ChainHash,
    /// Hash of the previous link; `None` for the first link.
    pub parent_hash: Option<ChainHash>,
    pub context: Context,
    pub event: Event,
    /// When the link was appended. Not part of the hash.
    pub created_at: Timestamp,
}

/// A link whose stored hash does not match the recomputed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkFault {
    /// 0-based position of the link.
    pub index: usize,
    /// Hash recomputed from genesis.
    pub expected: ChainHash,
    /// Hash stored on the link.
    pub found: ChainHash,
}

impl From<LinkFault> for FlowError {
    fn from(fault: LinkFault) -> Self {
        FlowError::ChainIntegrityViolation {
            index: fault.index,
            expected: fault.expected,
            found: fault.found,
        }
    }
}

/// A named record of the chain head at some point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub head: ChainHash,
    pub length: usize,
    pub created_at: Timestamp,
}

/// Lock-step comparison of a chain against another copy of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ChainComparison {
    /// Same links, same head.
    Identical,
    /// First position where the link hashes differ.
    Diverged { index: usize },
    /// The other chain has `missing` links this one lacks.
    Behind { missing: usize },
    /// This chain has `extra` links the other one lacks.
    Ahead { extra: usize },
}

// =============================================================================
// EVENT CHAIN
// =============================================================================

/// The append-only hash chain.
#[derive(Debug, Clone)]
pub struct EventChain {
    links: Vec<ChainLink>,
    clock: Arc<dyn Clock>,
}

impl Default for EventChain {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChain {
    /// Create an empty chain reading wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty chain with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            links: Vec::new(),
            clock,
        }
    }

    /// Adopt an externally held sequence of links.
    ///
    /// Nothing is validated here; call `verify()` before trusting the result.
    #[must_use]
    pub fn from_links(links: Vec<ChainLink>, clock: Arc<dyn Clock>) -> Self {
        Self { links, clock }
    }

    /// Compute the link `append` would add, without adding it.
    pub fn seal(&self, event: Event, context: &Context) -> Result<ChainLink, FlowError> {
        let parent_hash = self.links.last().map(|link| link.hash);
        let parent = parent_hash.unwrap_or(ChainHash::GENESIS);
        let hash = canonical::link_hash(&parent, &event, context)?;

        Ok(ChainLink {
            hash,
            parent_hash,
            context: context.clone(),
            event,
            created_at: self.clock.now(),
        })
    }

    /// Append an event and return the new link.
    ///
    /// No validation of event or context contents is performed. The only
    /// failure is the canonical encoder rejecting the record.
    pub fn append(&mut self, event: Event, context: &Context) -> Result<ChainLink, FlowError> {
        let link = self.seal(event, context)?;
        self.push(link.clone());
        Ok(link)
    }

    /// Push a link produced by `seal` against the current head.
    pub(crate) fn push(&mut self, link: ChainLink) {
        debug_assert_eq!(link.parent_hash, self.links.last().map(|l| l.hash));
        self.links.push(link);
    }

    /// Identifier the next appended event should carry.
    #[must_use]
    pub fn next_event_id(&self) -> EventId {
        EventId(self.links.len() as u64 + 1)
    }

    /// Hash of the last link, or the genesis sentinel when empty.
    #[must_use]
    pub fn digest(&self) -> ChainHash {
        self.links
            .last()
            .map(|link| link.hash)
            .unwrap_or(ChainHash::GENESIS)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// All links in append order.
    #[must_use]
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ChainLink> {
        self.links.get(index)
    }

    /// The last `n` links in append order. `n == 0` returns every link.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[ChainLink] {
        if n == 0 || n >= self.links.len() {
            return &self.links;
        }
        &self.links[self.links.len() - n..]
    }

    // =========================================================================
    // VERIFICATION
    // =========================================================================

    /// Walk the chain from genesis and report every link that fails.
    ///
    /// A link fails when its stored parent is not the previous stored hash,
    /// or when its stored hash differs from the hash recomputed over the
    /// running (recomputed) parent.
    pub fn audit(&self) -> Result<Vec<LinkFault>, FlowError> {
        let mut faults = Vec::new();
        let mut running = ChainHash::GENESIS;
        let mut previous_stored: Option<ChainHash> = None;

        for (index, link) in self.links.iter().enumerate() {
            let expected = canonical::link_hash(&running, &link.event, &link.context)?;

            if link.parent_hash != previous_stored || link.hash != expected {
                faults.push(LinkFault {
                    index,
                    expected,
                    found: link.hash,
                });
            }

            running = expected;
            previous_stored = Some(link.hash);
        }

        Ok(faults)
    }

    /// Verify the whole chain.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::ChainIntegrityViolation` for the first failing link.
    pub fn verify(&self) -> Result<(), FlowError> {
        match self.audit()?.into_iter().next() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    /// Boolean form of `verify()`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    // =========================================================================
    // CHECKPOINTS & COMPARISON
    // =========================================================================

    /// Record the current head under a name.
    #[must_use]
    pub fn checkpoint(&self, name: impl Into<String>) -> Checkpoint {
        Checkpoint {
            name: name.into(),
            head: self.digest(),
            length: self.links.len(),
            created_at: self.clock.now(),
        }
    }

    /// Check that a prior checkpoint is still part of this chain.
    ///
    /// The chain must verify, and the link at the checkpoint's position must
    /// still carry the checkpoint's head. Any insertion, removal or
    /// reordering before that position changes the head.
    pub fn verify_checkpoint(&self, checkpoint: &Checkpoint) -> Result<bool, FlowError> {
        self.verify()?;

        if checkpoint.length == 0 {
            return Ok(checkpoint.head.is_genesis());
        }
        Ok(self
            .links
            .get(checkpoint.length - 1)
            .is_some_and(|link| link.hash == checkpoint.head))
    }

    /// Compare this chain with another copy, link by link.
    #[must_use]
    pub fn compare(&self, other: &EventChain) -> ChainComparison {
        let diverged = self
            .links
            .iter()
            .zip(other.links.iter())
            .position(|(mine, theirs)| mine.hash != theirs.hash);

        if let Some(index) = diverged {
            return ChainComparison::Diverged { index };
        }

        let (mine, theirs) = (self.links.len(), other.links.len());
        if mine < theirs {
            ChainComparison::Behind {
                missing: theirs - mine,
            }
        } else if mine > theirs {
            ChainComparison::Ahead {
                extra: mine - theirs,
            }
        } else {
            ChainComparison::Identical
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn chain() -> EventChain {
        EventChain::with_clock(Arc::new(ManualClock::frozen(Timestamp(1_000))))
    }

    fn ctx() -> Context {
        Context::new("ctx", Timestamp(1)).with_persona("scribe")
    }

    fn push(chain: &mut EventChain, ty: &str, payload: Payload) -> ChainLink {
        let event = Event::new(chain.next_event_id(), ty, payload, Timestamp(5));
        chain.append(event, &ctx()).expect("append")
    }

    #[test]
    fn empty_chain_digest_is_genesis() {
        let chain = chain();
        assert!(chain.is_empty());
        assert_eq!(chain.digest(), ChainHash::GENESIS);
        assert!(chain.is_valid());
    }

    #[test]
    fn first_link_has_no_parent() {
        let mut chain = chain();
        let link = push(&mut chain, "a", Payload::Null);

        assert_eq!(link.parent_hash, None);
        assert_eq!(
            link.hash,
            canonical::link_hash(&ChainHash::GENESIS, &link.event, &link.context).expect("hash")
        );
        assert_eq!(chain.digest(), link.hash);
    }

    #[test]
    fn links_are_parent_linked() {
        let mut chain = chain();
        let first = push(&mut chain, "a", Payload::Null);
        let second = push(&mut chain, "b", Payload::Null);

        assert_eq!(second.parent_hash, Some(first.hash));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.digest(), second.hash);
    }

    #[test]
    fn event_ids_follow_chain_position() {
        let mut chain = chain();
        assert_eq!(chain.next_event_id(), EventId(1));
        push(&mut chain, "a", Payload::Null);
        assert_eq!(chain.next_event_id(), EventId(2));
    }

    #[test]
    fn seal_does_not_append() {
        let chain = chain();
        let event = Event::new(EventId(1), "a", Payload::Null, Timestamp(0));
        let sealed = chain.seal(event, &ctx()).expect("seal");

        assert!(chain.is_empty());
        assert_ne!(sealed.hash, ChainHash::GENESIS);
    }

    #[test]
    fn link_created_at_comes_from_clock() {
        let mut chain = chain();
        let link = push(&mut chain, "a", Payload::Null);
        assert_eq!(link.created_at, Timestamp(1_000));
    }

    #[test]
    fn tail_returns_most_recent_links() {
        let mut chain = chain();
        for ty in ["a", "b", "c"] {
            push(&mut chain, ty, Payload::Null);
        }

        let tail: Vec<_> = chain.tail(2).iter().map(|l| l.event.event_type.as_str()).collect();
        assert_eq!(tail, vec!["b", "c"]);
        assert_eq!(chain.tail(0).len(), 3);
        assert_eq!(chain.tail(10).len(), 3);
    }

    #[test]
    fn tampered_payload_fails_from_that_link_on() {
        let mut chain = chain();
        for n in 0..4 {
            push(&mut chain, "tick", Payload::Int(n));
        }

        let mut links = chain.links().to_vec();
        links[1].event.payload = Payload::Int(99);
        let tampered = EventChain::from_links(links, Arc::new(SystemClock));

        let indices: Vec<usize> = tampered
            .audit()
            .expect("audit")
            .iter()
            .map(|f| f.index)
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(matches!(
            tampered.verify(),
            Err(FlowError::ChainIntegrityViolation { index: 1, .. })
        ));
    }

    #[test]
    fn removed_link_is_detected() {
        let mut chain = chain();
        for n in 0..3 {
            push(&mut chain, "tick", Payload::Int(n));
        }

        let mut links = chain.links().to_vec();
        links.remove(1);
        let shortened = EventChain::from_links(links, Arc::new(SystemClock));

        assert!(!shortened.is_valid());
    }

    #[test]
    fn checkpoint_survives_further_appends() {
        let mut chain = chain();
        push(&mut chain, "a", Payload::Null);
        let checkpoint = chain.checkpoint("after-a");
        push(&mut chain, "b", Payload::Null);

        assert_eq!(checkpoint.length, 1);
        assert!(chain.verify_checkpoint(&checkpoint).expect("verify"));
    }

    #[test]
    fn checkpoint_from_other_history_is_rejected() {
        let mut primary = chain();
        push(&mut primary, "a", Payload::Null);
        let checkpoint = primary.checkpoint("primary");

        let mut other = chain();
        push(&mut other, "z", Payload::Null);

        assert!(!other.verify_checkpoint(&checkpoint).expect("verify"));
    }

    #[test]
    fn empty_checkpoint_matches_genesis() {
        let mut chain = chain();
        let checkpoint = chain.checkpoint("genesis");
        push(&mut chain, "a", Payload::Null);
        assert!(chain.verify_checkpoint(&checkpoint).expect("verify"));
    }

    #[test]
    fn compare_reports_lock_step_state() {
        let mut primary = chain();
        let mut sandbox = chain();
        push(&mut primary, "a", Payload::Null);
        push(&mut sandbox, "a", Payload::Null);
        assert_eq!(primary.compare(&sandbox), ChainComparison::Identical);

        push(&mut primary, "b", Payload::Null);
        assert_eq!(primary.compare(&sandbox), ChainComparison::Ahead { extra: 1 });
        assert_eq!(sandbox.compare(&primary), ChainComparison::Behind { missing: 1 });

        push(&mut sandbox, "c", Payload::Null);
        assert_eq!(primary.compare(&sandbox), ChainComparison::Diverged { index: 1 });
    }
}
