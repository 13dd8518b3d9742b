//! # flowcore-core
//!
//! The deterministic lifecycle substrate for Flowcore - THE LOGIC.
//!
//! This crate records ideas ("particles") through an explicit lifecycle,
//! journals every intent on an append-only, hash-linked event chain, and
//! checks the particle population against a small set of consistency rules
//! (the Flow Law).
//!
//! ## Layout
//!
//! - `particle` → the particle store and its state machine
//! - `chain` → the event chain, checkpoints and verification
//! - `canonical` → the byte encoding every link hash is computed over
//! - `law` → the rule engine and the reference rules
//! - `flow` → the facade that keeps store and chain in step
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Owns no global state: every store, chain and facade is constructed
//! - Never reads the clock ambiently: time comes from an injected `Clock`
//! - Is append-only: links are never rewritten, particles never deleted
//! - Has NO async, NO network, NO file I/O (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod canonical;
pub mod chain;
pub mod clock;
pub mod flow;
pub mod law;
pub mod particle;
pub mod primitives;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ChainHash, Context, EventId, FlowError, ParticleId, ParticleStatus, Payload, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Store, Chain, Law
// =============================================================================

pub use chain::{ChainComparison, ChainLink, Checkpoint, Event, EventChain, LinkFault};
pub use clock::{Clock, ManualClock, SystemClock};
pub use law::{FlowLaw, LawConfig, LawReport, OrphanRule, OverflowRule, Rule, Violation};
pub use particle::{
    HistoryEntry, ParticleEvent, ParticleSnapshot, ParticleState, ParticleStore, Transition,
    TransitionPolicy,
};

// =============================================================================
// RE-EXPORTS: Facade
// =============================================================================

pub use flow::{Flow, FlowBuilder, FlowSnapshot};
