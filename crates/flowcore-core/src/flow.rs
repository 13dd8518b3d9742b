//! # Flow Facade
//!
//! Composes the particle store, the event chain and the Flow Law behind the
//! entry points external collaborators call.
//!
//! ## Ordering
//!
//! Every state-changing call takes the chain lock first and the store lock
//! second, seals the chain link for the staged store mutation, and only then
//! commits both. The order of links on the chain is therefore the order in
//! which store mutations were applied, and replaying the chain reconstructs
//! the store.
//!
//! ## Locking
//!
//! Both resources sit behind a `RwLock`. Reads share the lock; writes are
//! exclusive. Mutations are staged before anything is committed, so a
//! poisoned lock never guards a half-applied change and is recovered rather
//! than propagated.

use crate::chain::{ChainLink, Checkpoint, Event, EventChain, LinkFault};
use crate::clock::{Clock, SystemClock};
use crate::law::{FlowLaw, LawReport};
use crate::primitives::PARTICLE_EVENT_PREFIX;
use crate::particle::{
    ParticleEvent, ParticleSnapshot, ParticleStore, Transition, TransitionPolicy,
};
use crate::{ChainHash, Context, FlowError, ParticleId, Payload};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

// =============================================================================
// SNAPSHOT READ MODEL
// =============================================================================

/// Aggregate read model for external observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub particles: Vec<ParticleSnapshot>,
    pub chain_length: usize,
    pub digest: ChainHash,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for [`Flow`].
#[derive(Debug, Default)]
pub struct FlowBuilder {
    clock: Option<Arc<dyn Clock>>,
    law: Option<FlowLaw>,
    policy: TransitionPolicy,
}

impl FlowBuilder {
    /// Clock shared by the store, the chain and the facade.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn law(mut self, law: FlowLaw) -> Self {
        self.law = Some(law);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn build(self) -> Flow {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Flow {
            chain: RwLock::new(EventChain::with_clock(Arc::clone(&clock))),
            store: RwLock::new(ParticleStore::with_clock(Arc::clone(&clock)).with_policy(self.policy)),
            law: self.law.unwrap_or_default(),
            clock,
        }
    }
}

// =============================================================================
// FLOW
// =============================================================================

/// The facade. Explicitly constructed; each instance is fully isolated.
#[derive(Debug)]
pub struct Flow {
    chain: RwLock<EventChain>,
    store: RwLock<ParticleStore>,
    law: FlowLaw,
    clock: Arc<dyn Clock>,
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

impl Flow {
    /// A permissive flow with the standard Flow Law and wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> FlowBuilder {
        FlowBuilder::default()
    }

    pub fn law(&self) -> &FlowLaw {
        &self.law
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Record an event on the chain.
    ///
    /// # Errors
    ///
    /// `FlowError::ReservedEventType` if `event_type` starts with `particle.`;
    /// those are recorded only by the lifecycle calls.
    pub fn dispatch(
        &self,
        event_type: impl Into<String>,
        payload: Payload,
        context: &Context,
    ) -> Result<Event, FlowError> {
        let event_type = event_type.into();
        if event_type.starts_with(PARTICLE_EVENT_PREFIX) {
            warn!(event_type = %event_type, "reserved event type rejected");
            return Err(FlowError::ReservedEventType(event_type));
        }

        let mut chain = write(&self.chain);
        let event = Event::new(chain.next_event_id(), event_type, payload, self.clock.now());
        let link = chain.append(event, context)?;

        debug!(
            event = %link.event.id,
            event_type = %link.event.event_type,
            context = context.id(),
            hash = %link.hash,
            "event dispatched"
        );
        Ok(link.event)
    }

    fn seal(
        &self,
        chain: &EventChain,
        particle_event: &ParticleEvent,
        context: &Context,
    ) -> Result<ChainLink, FlowError> {
        let event = Event::new(
            chain.next_event_id(),
            particle_event.event_type(),
            particle_event.to_payload()?,
            self.clock.now(),
        );
        chain.seal(event, context)
    }

    // =========================================================================
    // PARTICLE LIFECYCLE
    // =========================================================================

    /// Create a draft particle and record `particle.created`.
    pub fn create(
        &self,
        content: impl Into<String>,
        context: &Context,
        summary: Option<String>,
    ) -> Result<ParticleSnapshot, FlowError> {
        let mut chain = write(&self.chain);
        let mut store = write(&self.store);

        let staged = store.stage_create(content.into(), context, summary);
        let link = self.seal(&chain, &ParticleEvent::describe(staged.snapshot()), context)?;

        chain.push(link);
        let snapshot = store.commit(staged);

        debug!(particle = %snapshot.id(), context = context.id(), "particle created");
        Ok(snapshot)
    }

    /// Collapse a particle and record `particle.collapsed`.
    pub fn collapse(
        &self,
        id: ParticleId,
        by: &str,
        note: Option<&str>,
        context: &Context,
    ) -> Result<ParticleSnapshot, FlowError> {
        self.transition(id, Transition::Collapse, by, note, context)
    }

    /// Archive a particle and record `particle.archived`.
    pub fn archive(
        &self,
        id: ParticleId,
        by: &str,
        note: Option<&str>,
        context: &Context,
    ) -> Result<ParticleSnapshot, FlowError> {
        self.transition(id, Transition::Archive, by, note, context)
    }

    fn transition(
        &self,
        id: ParticleId,
        transition: Transition,
        by: &str,
        note: Option<&str>,
        context: &Context,
    ) -> Result<ParticleSnapshot, FlowError> {
        let mut chain = write(&self.chain);
        let mut store = write(&self.store);

        let staged = store.stage_transition(id, transition, by, note)?;
        let link = self.seal(&chain, &ParticleEvent::describe(staged.snapshot()), context)?;

        chain.push(link);
        let snapshot = store.commit(staged);

        debug!(
            particle = %id,
            status = %snapshot.status(),
            by,
            versions = snapshot.history().len(),
            "particle transitioned"
        );
        Ok(snapshot)
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn particle(&self, id: ParticleId) -> Option<ParticleSnapshot> {
        read(&self.store).get(id).cloned()
    }

    pub fn particles(&self) -> Vec<ParticleSnapshot> {
        read(&self.store).list()
    }

    /// Consistent view of particles and chain head.
    pub fn snapshot(&self) -> FlowSnapshot {
        let chain = read(&self.chain);
        let store = read(&self.store);
        FlowSnapshot {
            particles: store.list(),
            chain_length: chain.len(),
            digest: chain.digest(),
        }
    }

    /// Run the Flow Law over the current listing.
    ///
    /// The listing is taken and evaluated under the store's read lock.
    pub fn enforce(&self, context: Option<&Context>) -> LawReport {
        let store = read(&self.store);
        let report = self.law.evaluate(&store.list(), context);

        debug!(
            passed = report.passed,
            violations = report.violations.len(),
            particles = store.len(),
            "flow law evaluated"
        );
        report
    }

    // =========================================================================
    // CHAIN
    // =========================================================================

    pub fn digest(&self) -> ChainHash {
        read(&self.chain).digest()
    }

    pub fn chain_len(&self) -> usize {
        read(&self.chain).len()
    }

    /// Owned copy of the chain, e.g. to compare against a sandbox.
    pub fn chain(&self) -> EventChain {
        read(&self.chain).clone()
    }

    /// The last `n` links (all when `n == 0`).
    pub fn recent_links(&self, n: usize) -> Vec<ChainLink> {
        read(&self.chain).tail(n).to_vec()
    }

    /// Verify the chain from genesis.
    pub fn verify(&self) -> Result<(), FlowError> {
        let result = read(&self.chain).verify();
        if let Err(e) = &result {
            warn!(error = %e, "chain verification failed");
        }
        result
    }

    /// Every failing link.
    pub fn audit(&self) -> Result<Vec<LinkFault>, FlowError> {
        read(&self.chain).audit()
    }

    pub fn checkpoint(&self, name: impl Into<String>) -> Checkpoint {
        read(&self.chain).checkpoint(name)
    }

    pub fn verify_checkpoint(&self, checkpoint: &Checkpoint) -> Result<bool, FlowError> {
        read(&self.chain).verify_checkpoint(checkpoint)
    }

    /// Rebuild a store from the chain's particle events.
    pub fn replay(&self) -> Result<ParticleStore, FlowError> {
        let chain = read(&self.chain);
        let policy = read(&self.store).policy();
        Ok(ParticleStore::replay(chain.links(), Arc::clone(&self.clock))?.with_policy(policy))
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// TESTS
// =============================================================================
