//! # Particle Store
//!
//! Owns the mapping from particle identifier to its full version history
//! and enforces the particle state machine:
//!
//! ```text
//! draft ──collapse──▶ collapsed ──archive──▶ archived
//! ```
//!
//! ## Invariants
//!
//! - `latest` always equals the state of the last history entry
//! - History is append-only; entries are never removed or rewritten
//! - A particle's id is stable and equals `history[0].state.id`
//! - Particles are never deleted; end of life is `archived`
//!
//! ## Transitions
//!
//! Under `TransitionPolicy::Permissive` (the default) `collapse` and
//! `archive` overwrite whatever the current status is, including repeating
//! it. `TransitionPolicy::Strict` only admits `draft → collapsed` and
//! `collapsed → archived`.
//!
//! ## Two-Phase Mutation
//!
//! `stage_*` computes the next snapshot without touching the store and
//! `commit` applies it. The facade seals the matching chain link between the
//! two, so a failed append never leaves a half-recorded mutation behind.

use crate::chain::{ChainLink, Event};
use crate::clock::{Clock, SystemClock};
use crate::primitives::{
    CREATED_NOTE, EVENT_PARTICLE_ARCHIVED, EVENT_PARTICLE_COLLAPSED, EVENT_PARTICLE_CREATED,
    SYSTEM_ACTOR,
};
use crate::{Context, FlowError, ParticleId, ParticleStatus, Payload, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// STATE, HISTORY, SNAPSHOT
// =============================================================================

/// One point-in-time version of a logical particle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticleState {
    pub id: ParticleId,
    pub status: ParticleStatus,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub context: Context,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An attributed history entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: ParticleState,
    pub by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A particle's full history plus its current state.
///
/// Only the store builds snapshots, which keeps `latest` and `history` in
/// agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticleSnapshot {
    id: ParticleId,
    history: Vec<HistoryEntry>,
    latest: ParticleState,
}

impl ParticleSnapshot {
    fn first(entry: HistoryEntry) -> Self {
        Self {
            id: entry.state.id,
            latest: entry.state.clone(),
            history: vec![entry],
        }
    }

    /// A copy of this snapshot with one more history entry on top.
    fn advanced(
        &self,
        status: ParticleStatus,
        by: &str,
        note: Option<&str>,
        at: Timestamp,
    ) -> Self {
        let state = ParticleState {
            status,
            updated_at: at,
            ..self.latest.clone()
        };

        let mut next = self.clone();
        next.history.push(HistoryEntry {
            state: state.clone(),
            by: by.to_string(),
            note: note.map(str::to_string),
        });
        next.latest = state;
        next
    }

    pub fn id(&self) -> ParticleId {
        self.id
    }

    /// Every version in insertion order.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn latest(&self) -> &ParticleState {
        &self.latest
    }

    pub fn status(&self) -> ParticleStatus {
        self.latest.status
    }
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// How strictly the store validates status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any status may follow any status.
    #[default]
    Permissive,
    /// Only `draft → collapsed` and `collapsed → archived`.
    Strict,
}

impl TransitionPolicy {
    #[must_use]
    pub fn allows(self, from: ParticleStatus, to: ParticleStatus) -> bool {
        match self {
            Self::Permissive => true,
            Self::Strict => matches!(
                (from, to),
                (ParticleStatus::Draft, ParticleStatus::Collapsed)
                    | (ParticleStatus::Collapsed, ParticleStatus::Archived)
            ),
        }
    }
}

/// The two explicit lifecycle moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Collapse,
    Archive,
}

impl Transition {
    #[must_use]
    pub const fn target(self) -> ParticleStatus {
        match self {
            Self::Collapse => ParticleStatus::Collapsed,
            Self::Archive => ParticleStatus::Archived,
        }
    }

    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Collapse => EVENT_PARTICLE_COLLAPSED,
            Self::Archive => EVENT_PARTICLE_ARCHIVED,
        }
    }

    fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            EVENT_PARTICLE_COLLAPSED => Some(Self::Collapse),
            EVENT_PARTICLE_ARCHIVED => Some(Self::Archive),
            _ => None,
        }
    }
}

// =============================================================================
// PARTICLE EVENTS
// =============================================================================

/// The chain-recorded form of a particle mutation.
///
/// Carries exactly what replay needs; the particle's context is the context
/// of the link that records its creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticleEvent {
    Created {
        id: ParticleId,
        content: String,
        summary: Option<String>,
        created_at: Timestamp,
    },
    Transitioned {
        id: ParticleId,
        transition: Transition,
        by: String,
        note: Option<String>,
        updated_at: Timestamp,
    },
}

impl ParticleEvent {
    /// Describe the newest history entry of a snapshot.
    #[must_use]
    pub fn describe(snapshot: &ParticleSnapshot) -> Self {
        let latest = snapshot.latest();
        let newest = snapshot.history().last();

        if snapshot.history().len() == 1 {
            return Self::Created {
                id: latest.id,
                content: latest.content.clone(),
                summary: latest.summary.clone(),
                created_at: latest.created_at,
            };
        }

        let transition = match latest.status {
            ParticleStatus::Archived => Transition::Archive,
            ParticleStatus::Draft | ParticleStatus::Collapsed => Transition::Collapse,
        };
        Self::Transitioned {
            id: latest.id,
            transition,
            by: newest.map(|e| e.by.clone()).unwrap_or_default(),
            note: newest.and_then(|e| e.note.clone()),
            updated_at: latest.updated_at,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => EVENT_PARTICLE_CREATED,
            Self::Transitioned { transition, .. } => transition.event_type(),
        }
    }

    /// Encode as an event payload.
    ///
    /// # Errors
    ///
    /// `FlowError::SerializationError` if an id or timestamp does not fit a
    /// payload integer.
    pub fn to_payload(&self) -> Result<Payload, FlowError> {
        Ok(match self {
            Self::Created {
                id,
                content,
                summary,
                created_at,
            } => Payload::map([
                ("particle", int("particle", id.0)?),
                ("content", Payload::from(content.as_str())),
                ("summary", Payload::from(summary.clone())),
                ("created_at", int("created_at", created_at.millis())?),
            ]),
            Self::Transitioned {
                id,
                by,
                note,
                updated_at,
                ..
            } => Payload::map([
                ("particle", int("particle", id.0)?),
                ("by", Payload::from(by.as_str())),
                ("note", Payload::from(note.clone())),
                ("updated_at", int("updated_at", updated_at.millis())?),
            ]),
        })
    }

    /// Decode a recorded event.
    ///
    /// Returns `Ok(None)` for events that are not particle events.
    pub fn from_event(event: &Event) -> Result<Option<Self>, FlowError> {
        let malformed = |reason: &str| FlowError::MalformedEvent {
            event: event.id,
            reason: reason.to_string(),
        };
        let created = event.event_type == EVENT_PARTICLE_CREATED;
        let transition = Transition::from_event_type(&event.event_type);
        if !created && transition.is_none() {
            return Ok(None);
        }

        let payload = &event.payload;
        let id = ParticleId(field_u64(payload, "particle").ok_or_else(|| malformed("particle"))?);

        let decoded = match transition {
            None => Self::Created {
                id,
                content: field_text(payload, "content")
                    .ok_or_else(|| malformed("content"))?
                    .to_string(),
                summary: optional_text(payload, "summary").ok_or_else(|| malformed("summary"))?,
                created_at: Timestamp(
                    field_u64(payload, "created_at").ok_or_else(|| malformed("created_at"))?,
                ),
            },
            Some(transition) => Self::Transitioned {
                id,
                transition,
                by: field_text(payload, "by")
                    .ok_or_else(|| malformed("by"))?
                    .to_string(),
                note: optional_text(payload, "note").ok_or_else(|| malformed("note"))?,
                updated_at: Timestamp(
                    field_u64(payload, "updated_at").ok_or_else(|| malformed("updated_at"))?,
                ),
            },
        };

        Ok(Some(decoded))
    }
}

fn int(key: &str, value: u64) -> Result<Payload, FlowError> {
    i64::try_from(value)
        .map(Payload::Int)
        .map_err(|_| FlowError::SerializationError(format!("{key} out of range: {value}")))
}

fn field_u64(payload: &Payload, key: &str) -> Option<u64> {
    payload
        .get(key)
        .and_then(Payload::as_int)
        .and_then(|n| u64::try_from(n).ok())
}

fn field_text<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Payload::as_text)
}

/// `Some(None)` for an absent or null field, `None` for a non-text value.
fn optional_text(payload: &Payload, key: &str) -> Option<Option<String>> {
    match payload.get(key) {
        None | Some(Payload::Null) => Some(None),
        Some(Payload::Text(s)) => Some(Some(s.clone())),
        Some(_) => None,
    }
}

// =============================================================================
// PARTICLE STORE
// =============================================================================

/// A computed, not yet applied, store mutation.
#[derive(Debug, Clone)]
pub(crate) struct Staged {
    snapshot: ParticleSnapshot,
}

impl Staged {
    pub(crate) fn snapshot(&self) -> &ParticleSnapshot {
        &self.snapshot
    }
}

/// The particle store.
///
/// Explicitly constructed and owned; there is no global instance.
#[derive(Debug, Clone)]
pub struct ParticleStore {
    /// Snapshots keyed by id. Ids are sequential, so key order is creation order.
    particles: BTreeMap<ParticleId, ParticleSnapshot>,
    /// Last allocated id.
    last_id: u64,
    policy: TransitionPolicy,
    clock: Arc<dyn Clock>,
}

impl Default for ParticleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleStore {
    /// Create an empty permissive store reading wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty permissive store with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            particles: BTreeMap::new(),
            last_id: 0,
            policy: TransitionPolicy::default(),
            clock,
        }
    }

    /// Set the transition policy.
    #[must_use]
    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Create a draft particle. Always succeeds.
    pub fn create(
        &mut self,
        content: impl Into<String>,
        context: &Context,
        summary: Option<String>,
    ) -> ParticleSnapshot {
        let staged = self.stage_create(content.into(), context, summary);
        self.commit(staged)
    }

    /// Move a particle to `collapsed`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is absent; `InvalidTransition` under a strict policy.
    pub fn collapse(
        &mut self,
        id: ParticleId,
        by: &str,
        note: Option<&str>,
    ) -> Result<ParticleSnapshot, FlowError> {
        self.transition(id, Transition::Collapse, by, note)
    }

    /// Move a particle to `archived`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is absent; `InvalidTransition` under a strict policy.
    pub fn archive(
        &mut self,
        id: ParticleId,
        by: &str,
        note: Option<&str>,
    ) -> Result<ParticleSnapshot, FlowError> {
        self.transition(id, Transition::Archive, by, note)
    }

    fn transition(
        &mut self,
        id: ParticleId,
        transition: Transition,
        by: &str,
        note: Option<&str>,
    ) -> Result<ParticleSnapshot, FlowError> {
        let staged = self.stage_transition(id, transition, by, note)?;
        Ok(self.commit(staged))
    }

    pub(crate) fn stage_create(
        &self,
        content: String,
        context: &Context,
        summary: Option<String>,
    ) -> Staged {
        let now = self.clock.now();
        let state = ParticleState {
            id: ParticleId(self.last_id.saturating_add(1)),
            status: ParticleStatus::Draft,
            content,
            summary,
            context: context.clone(),
            created_at: now,
            updated_at: now,
        };

        Staged {
            snapshot: ParticleSnapshot::first(HistoryEntry {
                state,
                by: SYSTEM_ACTOR.to_string(),
                note: Some(CREATED_NOTE.to_string()),
            }),
        }
    }

    pub(crate) fn stage_transition(
        &self,
        id: ParticleId,
        transition: Transition,
        by: &str,
        note: Option<&str>,
    ) -> Result<Staged, FlowError> {
        let current = self.particles.get(&id).ok_or(FlowError::NotFound(id))?;
        let (from, to) = (current.status(), transition.target());

        if !self.policy.allows(from, to) {
            return Err(FlowError::InvalidTransition { id, from, to });
        }

        Ok(Staged {
            snapshot: current.advanced(to, by, note, self.clock.now()),
        })
    }

    /// Apply a staged mutation and return the resulting snapshot.
    pub(crate) fn commit(&mut self, staged: Staged) -> ParticleSnapshot {
        let snapshot = staged.snapshot;
        self.last_id = self.last_id.max(snapshot.id.0);
        self.particles.insert(snapshot.id, snapshot.clone());
        snapshot
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn get(&self, id: ParticleId) -> Option<&ParticleSnapshot> {
        self.particles.get(&id)
    }

    /// All snapshots in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ParticleSnapshot> {
        self.particles.values()
    }

    /// Owned copy of every snapshot in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<ParticleSnapshot> {
        self.particles.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of particles whose latest status is `status`.
    #[must_use]
    pub fn count_by_status(&self, status: ParticleStatus) -> usize {
        self.particles
            .values()
            .filter(|p| p.status() == status)
            .count()
    }

    // =========================================================================
    // REPLAY
    // =========================================================================

    /// Rebuild a store from the particle events recorded on a chain.
    ///
    /// Non-particle events are skipped. Transitions are applied as recorded,
    /// regardless of policy. The replayed store uses `clock` for any further
    /// mutation.
    ///
    /// # Errors
    ///
    /// `MalformedEvent` if a particle event cannot be decoded, creates an id
    /// twice, or transitions an unknown id.
    pub fn replay<'a>(
        links: impl IntoIterator<Item = &'a ChainLink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FlowError> {
        let mut store = Self::with_clock(clock);

        for link in links {
            let Some(particle_event) = ParticleEvent::from_event(&link.event)? else {
                continue;
            };
            let malformed = |reason: String| FlowError::MalformedEvent {
                event: link.event.id,
                reason,
            };

            let snapshot = match particle_event {
                ParticleEvent::Created {
                    id,
                    content,
                    summary,
                    created_at,
                } => {
                    if store.particles.contains_key(&id) {
                        return Err(malformed(format!("{} created twice", id)));
                    }
                    ParticleSnapshot::first(HistoryEntry {
                        state: ParticleState {
                            id,
                            status: ParticleStatus::Draft,
                            content,
                            summary,
                            context: link.context.clone(),
                            created_at,
                            updated_at: created_at,
                        },
                        by: SYSTEM_ACTOR.to_string(),
                        note: Some(CREATED_NOTE.to_string()),
                    })
                }
                ParticleEvent::Transitioned {
                    id,
                    transition,
                    by,
                    note,
                    updated_at,
                } => store
                    .particles
                    .get(&id)
                    .ok_or_else(|| malformed(format!("{} is unknown", id)))?
                    .advanced(transition.target(), &by, note.as_deref(), updated_at),
            };

            store.commit(Staged { snapshot });
        }

        Ok(store)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventId;
    use crate::clock::ManualClock;

    fn store() -> ParticleStore {
        ParticleStore::with_clock(Arc::new(ManualClock::ticking(Timestamp(100), 1)))
    }

    fn ctx() -> Context {
        Context::new("ctx", Timestamp(0)).with_persona("scribe")
    }

    #[test]
    fn create_writes_single_system_entry() {
        let mut store = store();
        let snapshot = store.create("hello", &ctx(), None);

        assert_eq!(snapshot.id(), ParticleId(1));
        assert_eq!(snapshot.status(), ParticleStatus::Draft);
        assert_eq!(snapshot.history().len(), 1);
        assert_eq!(snapshot.history()[0].by, SYSTEM_ACTOR);
        assert_eq!(snapshot.history()[0].note.as_deref(), Some(CREATED_NOTE));
        assert_eq!(snapshot.latest().created_at, snapshot.latest().updated_at);
        assert_eq!(snapshot.latest(), &snapshot.history()[0].state);
    }

    #[test]
    fn ids_are_sequential() {
        let mut store = store();
        let a = store.create("a", &ctx(), None);
        let b = store.create("b", &ctx(), Some("second".to_string()));

        assert_eq!(a.id(), ParticleId(1));
        assert_eq!(b.id(), ParticleId(2));
        assert_eq!(b.latest().summary.as_deref(), Some("second"));
    }

    #[test]
    fn collapse_appends_entry_and_keeps_prior_state() {
        let mut store = store();
        let id = store.create("hello", &ctx(), None).id();

        let collapsed = store.collapse(id, "user", Some("done")).expect("collapse");

        assert_eq!(collapsed.history().len(), 2);
        assert_eq!(collapsed.status(), ParticleStatus::Collapsed);
        assert_eq!(collapsed.history()[0].state.status, ParticleStatus::Draft);
        assert_eq!(collapsed.history()[1].by, "user");
        assert_eq!(collapsed.history()[1].note.as_deref(), Some("done"));
        assert!(collapsed.latest().updated_at > collapsed.latest().created_at);
    }

    #[test]
    fn archive_keeps_content_and_context() {
        let mut store = store();
        let id = store.create("hello", &ctx(), None).id();
        let archived = store.archive(id, "user", None).expect("archive");

        assert_eq!(archived.status(), ParticleStatus::Archived);
        assert_eq!(archived.latest().content, "hello");
        assert_eq!(archived.latest().context, ctx());
    }

    #[test]
    fn permissive_policy_allows_any_order() {
        let mut store = store();
        let id = store.create("x", &ctx(), None).id();

        store.archive(id, "user", None).expect("draft -> archived");
        store.collapse(id, "user", None).expect("archived -> collapsed");
        let again = store.collapse(id, "user", None).expect("collapsed -> collapsed");

        assert_eq!(again.history().len(), 4);
    }

    #[test]
    fn strict_policy_rejects_skips() {
        let mut store = store().with_policy(TransitionPolicy::Strict);
        let id = store.create("x", &ctx(), None).id();

        let result = store.archive(id, "user", None);
        assert!(matches!(
            result,
            Err(FlowError::InvalidTransition {
                from: ParticleStatus::Draft,
                to: ParticleStatus::Archived,
                ..
            })
        ));
        assert_eq!(store.get(id).expect("get").history().len(), 1);

        store.collapse(id, "user", None).expect("collapse");
        store.archive(id, "user", None).expect("archive");
    }

    #[test]
    fn missing_particle_is_not_found() {
        let mut store = store();
        store.create("x", &ctx(), None);
        let before = store.list();

        let result = store.collapse(ParticleId(404), "user", None);

        assert!(matches!(result, Err(FlowError::NotFound(ParticleId(404)))));
        assert_eq!(store.list(), before);
    }

    #[test]
    fn staging_does_not_mutate() {
        let store = store();
        let staged = store.stage_create("x".to_string(), &ctx(), None);

        assert_eq!(staged.snapshot().id(), ParticleId(1));
        assert!(store.is_empty());
    }

    #[test]
    fn count_by_status() {
        let mut store = store();
        let a = store.create("a", &ctx(), None).id();
        store.create("b", &ctx(), None);
        store.collapse(a, "user", None).expect("collapse");

        assert_eq!(store.count_by_status(ParticleStatus::Draft), 1);
        assert_eq!(store.count_by_status(ParticleStatus::Collapsed), 1);
        assert_eq!(store.count_by_status(ParticleStatus::Archived), 0);
    }

    #[test]
    fn particle_event_payload_roundtrip() {
        let mut store = store();
        let id = store.create("body", &ctx(), Some("sum".to_string())).id();
        let collapsed = store.collapse(id, "user", None).expect("collapse");

        let described = ParticleEvent::describe(&collapsed);
        assert_eq!(described.event_type(), EVENT_PARTICLE_COLLAPSED);

        let event = Event::new(
            EventId(2),
            described.event_type(),
            described.to_payload().expect("payload"),
            Timestamp(0),
        );
        let decoded = ParticleEvent::from_event(&event).expect("decode");
        assert_eq!(decoded, Some(described));
    }

    #[test]
    fn out_of_range_timestamp_is_not_encoded() {
        let clock = Arc::new(ManualClock::frozen(Timestamp(u64::MAX)));
        let mut store = ParticleStore::with_clock(clock);
        let created = store.create("late", &ctx(), None);

        assert!(matches!(
            ParticleEvent::describe(&created).to_payload(),
            Err(FlowError::SerializationError(_))
        ));
    }

    #[test]
    fn foreign_events_are_ignored() {
        let event = Event::new(EventId(1), "conversation.opened", Payload::Null, Timestamp(0));
        assert_eq!(ParticleEvent::from_event(&event).expect("decode"), None);
    }

    #[test]
    fn malformed_particle_event_is_rejected() {
        let event = Event::new(
            EventId(7),
            EVENT_PARTICLE_CREATED,
            Payload::map([("particle", Payload::from("one"))]),
            Timestamp(0),
        );
        assert!(matches!(
            ParticleEvent::from_event(&event),
            Err(FlowError::MalformedEvent {
                event: EventId(7),
                ..
            })
        ));
    }
}
