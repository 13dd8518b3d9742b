//! # Fixed Primitives
//!
//! Hardcoded runtime constants for the flowcore substrate.
//!
//! These are compiled into the binary and immutable at runtime. Anything a
//! deployment may tune (the overflow threshold, the transition policy) has a
//! default here and an override in the app configuration.

/// Actor recorded on the first history entry of every particle.
pub const SYSTEM_ACTOR: &str = "system";

/// Note recorded on the first history entry of every particle.
pub const CREATED_NOTE: &str = "created";

// =============================================================================
// EVENT TYPES
// =============================================================================

/// Prefix reserved for event types recorded by the facade itself.
///
/// `Flow::dispatch` rejects event types carrying it.
pub const PARTICLE_EVENT_PREFIX: &str = "particle.";

/// Event type recorded by the facade when a particle is created.
pub const EVENT_PARTICLE_CREATED: &str = "particle.created";

/// Event type recorded by the facade when a particle is collapsed.
pub const EVENT_PARTICLE_COLLAPSED: &str = "particle.collapsed";

/// Event type recorded by the facade when a particle is archived.
pub const EVENT_PARTICLE_ARCHIVED: &str = "particle.archived";

// =============================================================================
// CANONICAL ENCODING
// =============================================================================

/// Magic bytes prefixed to every canonical record before hashing.
pub const CANONICAL_MAGIC: [u8; 4] = *b"FLCH"; // Flow Chain

/// Current canonical record version.
///
/// Bump this on any change to the encoded layout: digests computed under
/// different versions are never comparable.
pub const CANONICAL_VERSION: u8 = 1;

// =============================================================================
// FLOW LAW
// =============================================================================

/// Reference number of draft particles tolerated before `PARTICLE_OVERFLOW`.
///
/// The rule fires when the draft count is strictly greater than this value.
pub const DEFAULT_OVERFLOW_THRESHOLD: usize = 10;

/// Violation code: too many particles are still in draft.
pub const PARTICLE_OVERFLOW: &str = "PARTICLE_OVERFLOW";

/// Violation code: particles whose context carries no persona reference.
pub const ORPHANED_PARTICLE: &str = "ORPHANED_PARTICLE";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_threshold_reference_value() {
        assert_eq!(DEFAULT_OVERFLOW_THRESHOLD, 10);
    }

    #[test]
    fn event_types_share_prefix() {
        for ty in [
            EVENT_PARTICLE_CREATED,
            EVENT_PARTICLE_COLLAPSED,
            EVENT_PARTICLE_ARCHIVED,
        ] {
            assert!(ty.starts_with(PARTICLE_EVENT_PREFIX));
        }
    }
}
