//! # Flow Law
//!
//! Stateless consistency evaluation over a particle listing.
//!
//! The engine is an ordered list of independent [`Rule`]s. Each rule inspects
//! the listing and reports zero or more [`Violation`]s; the engine
//! concatenates them in rule order. Adding a rule never touches existing
//! ones.
//!
//! Violations are data, not errors: `evaluate` never fails and never
//! mutates. Whether a failing report is advisory or blocking is the caller's
//! decision.

mod rules;

pub use rules::{OrphanRule, OverflowRule};

use crate::primitives::DEFAULT_OVERFLOW_THRESHOLD;
use crate::{Context, ParticleId, ParticleSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// VIOLATION & REPORT
// =============================================================================

/// A non-fatal consistency finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub message: String,
    /// The context the evaluation ran under, if one was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    /// Particles the finding covers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub particles: Vec<ParticleId>,
}

impl Violation {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: None,
            particles: Vec::new(),
        }
    }

    #[must_use]
    pub fn covering(mut self, particles: Vec<ParticleId>) -> Self {
        self.particles = particles;
        self
    }

    #[must_use]
    pub fn within(mut self, context: Option<&Context>) -> Self {
        self.context = context.cloned();
        self
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawReport {
    /// `true` iff `violations` is empty.
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl LawReport {
    #[must_use]
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Check whether a violation with the given code was reported.
    #[must_use]
    pub fn has(&self, code: &str) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }
}

// =============================================================================
// RULE TRAIT
// =============================================================================

/// One independent consistency check.
///
/// Rules must be pure: same listing and context, same violations.
pub trait Rule: Send + Sync + fmt::Debug {
    /// Code carried by this rule's violations.
    fn code(&self) -> &'static str;

    /// Inspect the listing and report findings.
    fn inspect(&self, particles: &[ParticleSnapshot], context: Option<&Context>)
    -> Vec<Violation>;
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Tunables of the standard rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LawConfig {
    /// Draft count above which `PARTICLE_OVERFLOW` fires.
    pub overflow_threshold: usize,
}

impl Default for LawConfig {
    fn default() -> Self {
        Self {
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The ordered rule list.
#[derive(Debug)]
pub struct FlowLaw {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for FlowLaw {
    fn default() -> Self {
        Self::standard()
    }
}

impl FlowLaw {
    /// The reference rule set: overflow, then orphan.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_config(LawConfig::default())
    }

    /// The reference rule set with tuned thresholds.
    #[must_use]
    pub fn from_config(config: LawConfig) -> Self {
        Self::empty()
            .with_rule(OverflowRule::new(config.overflow_threshold))
            .with_rule(OrphanRule)
    }

    /// An engine with no rules; every evaluation passes.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule to the end of the list.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Codes of the registered rules, in evaluation order.
    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|rule| rule.code())
    }

    /// Run every rule against the listing.
    #[must_use]
    pub fn evaluate(&self, particles: &[ParticleSnapshot], context: Option<&Context>) -> LawReport {
        let violations = self
            .rules
            .iter()
            .flat_map(|rule| rule.inspect(particles, context))
            .collect();
        LawReport::from_violations(violations)
    }
}

// =============================================================================
// TESTS
// =============================================================================
