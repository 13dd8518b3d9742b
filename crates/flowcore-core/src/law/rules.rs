//! Reference rules.

use super::{Rule, Violation};
use crate::primitives::{ORPHANED_PARTICLE, PARTICLE_OVERFLOW};
use crate::{Context, ParticleId, ParticleSnapshot, ParticleStatus};

/// Too many particles left in draft.
///
/// Emits a single violation covering every draft when the draft count is
/// strictly greater than the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowRule {
    threshold: usize,
}

impl OverflowRule {
    #[must_use]
    pub const fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Rule for OverflowRule {
    fn code(&self) -> &'static str {
        PARTICLE_OVERFLOW
    }

    fn inspect(
        &self,
        particles: &[ParticleSnapshot],
        context: Option<&Context>,
    ) -> Vec<Violation> {
        let drafts: Vec<ParticleId> = particles
            .iter()
            .filter(|p| p.status() == ParticleStatus::Draft)
            .map(ParticleSnapshot::id)
            .collect();

        if drafts.len() <= self.threshold {
            return Vec::new();
        }

        let message = format!(
            "{} particles in draft exceeds the limit of {}",
            drafts.len(),
            self.threshold
        );
        vec![
            Violation::new(self.code(), message)
                .covering(drafts)
                .within(context),
        ]
    }
}

/// Particles whose latest context carries no persona reference.
///
/// Emits a single violation covering every orphan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanRule;

impl Rule for OrphanRule {
    fn code(&self) -> &'static str {
        ORPHANED_PARTICLE
    }

    fn inspect(
        &self,
        particles: &[ParticleSnapshot],
        context: Option<&Context>,
    ) -> Vec<Violation> {
        let orphans: Vec<ParticleId> = particles
            .iter()
            .filter(|p| p.latest().context.persona().is_none())
            .map(ParticleSnapshot::id)
            .collect();

        if orphans.is_empty() {
            return Vec::new();
        }

        let message = format!("{} particles have no persona", orphans.len());
        vec![
            Violation::new(self.code(), message)
                .covering(orphans)
                .within(context),
        ]
    }
}
