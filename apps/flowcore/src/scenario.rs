//! # Scenarios
//!
//! A scenario is a JSON script of lifecycle operations played against a fresh
//! flow. Contexts are declared once under an alias; particles are bound to an
//! alias when created and referenced by it afterwards.
//!
//! ```json
//! {
//!   "contexts": {
//!     "main": { "id": "session-1", "persona": "scribe", "created_at": 0 }
//!   },
//!   "steps": [
//!     { "op": "create", "as": "idea", "content": "hello", "context": "main" },
//!     { "op": "collapse", "particle": "idea", "by": "user", "context": "main" },
//!     { "op": "dispatch", "type": "note.added", "payload": { "n": 1 }, "context": "main" },
//!     { "op": "checkpoint", "name": "after-collapse" },
//!     { "op": "archive", "particle": "idea", "by": "user", "context": "main" }
//!   ]
//! }
//! ```

use crate::error::CliError;
use flowcore_core::{Checkpoint, Context, Flow, FlowSnapshot, LawReport, ParticleId, Payload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Scenario played by the `demo` command.
pub const DEMO_SCENARIO: &str = r#"{
  "contexts": {
    "studio": { "id": "demo-session", "project": "atlas", "persona": "scribe", "created_at": 0 },
    "drifter": { "id": "demo-drifter", "created_at": 0 }
  },
  "steps": [
    { "op": "create", "as": "idea", "content": "hello", "summary": "first thought", "context": "studio" },
    { "op": "create", "as": "stray", "content": "unowned note", "context": "drifter" },
    { "op": "dispatch", "type": "conversation.turn", "payload": { "speaker": "user", "turn": 1 }, "context": "studio" },
    { "op": "collapse", "particle": "idea", "by": "user", "note": "settled", "context": "studio" },
    { "op": "checkpoint", "name": "after-collapse" },
    { "op": "archive", "particle": "idea", "by": "user", "context": "studio" }
  ]
}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
    pub steps: Vec<Step>,
}

/// One scripted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Create {
        #[serde(rename = "as")]
        alias: String,
        content: String,
        #[serde(default)]
        summary: Option<String>,
        context: String,
    },
    Collapse {
        particle: String,
        by: String,
        #[serde(default)]
        note: Option<String>,
        context: String,
    },
    Archive {
        particle: String,
        by: String,
        #[serde(default)]
        note: Option<String>,
        context: String,
    },
    Dispatch {
        #[serde(rename = "type")]
        event_type: String,
        #[serde(default)]
        payload: Payload,
        context: String,
    },
    Checkpoint {
        name: String,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Collapse { .. } => "collapse",
            Self::Archive { .. } => "archive",
            Self::Dispatch { .. } => "dispatch",
            Self::Checkpoint { .. } => "checkpoint",
        }
    }
}

/// What a played scenario leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub snapshot: FlowSnapshot,
    /// Particle alias → assigned id.
    pub particles: BTreeMap<String, ParticleId>,
    pub checkpoints: Vec<Checkpoint>,
    pub report: LawReport,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn demo() -> Result<Self, CliError> {
        Self::from_json(DEMO_SCENARIO)
    }

    /// Play every step against `flow`, stopping at the first failure.
    pub fn run(&self, flow: &Flow) -> Result<ScenarioOutcome, CliError> {
        let mut particles: BTreeMap<String, ParticleId> = BTreeMap::new();
        let mut checkpoints = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            let number = index + 1;
            debug!(step = number, op = step.op(), "scenario step");

            match step {
                Step::Create {
                    alias,
                    content,
                    summary,
                    context,
                } => {
                    if particles.contains_key(alias) {
                        return Err(CliError::DuplicateAlias {
                            step: number,
                            name: alias.clone(),
                        });
                    }
                    let ctx = self.context(number, context)?;
                    let snapshot = flow.create(content.as_str(), ctx, summary.clone())?;
                    particles.insert(alias.clone(), snapshot.id());
                }
                Step::Collapse {
                    particle,
                    by,
                    note,
                    context,
                } => {
                    let id = particle_id(&particles, number, particle)?;
                    let ctx = self.context(number, context)?;
                    flow.collapse(id, by, note.as_deref(), ctx)?;
                }
                Step::Archive {
                    particle,
                    by,
                    note,
                    context,
                } => {
                    let id = particle_id(&particles, number, particle)?;
                    let ctx = self.context(number, context)?;
                    flow.archive(id, by, note.as_deref(), ctx)?;
                }
                Step::Dispatch {
                    event_type,
                    payload,
                    context,
                } => {
                    let ctx = self.context(number, context)?;
                    flow.dispatch(event_type.as_str(), payload.clone(), ctx)?;
                }
                Step::Checkpoint { name } => {
                    checkpoints.push(flow.checkpoint(name.as_str()));
                }
            }
        }

        let snapshot = flow.snapshot();
        info!(
            steps = self.steps.len(),
            particles = snapshot.particles.len(),
            chain_length = snapshot.chain_length,
            digest = %snapshot.digest,
            "scenario complete"
        );

        Ok(ScenarioOutcome {
            snapshot,
            particles,
            checkpoints,
            report: flow.enforce(None),
        })
    }

    fn context(&self, step: usize, alias: &str) -> Result<&Context, CliError> {
        self.contexts
            .get(alias)
            .ok_or_else(|| CliError::UnknownAlias {
                step,
                kind: "context",
                name: alias.to_string(),
            })
    }
}

fn particle_id(
    particles: &BTreeMap<String, ParticleId>,
    step: usize,
    alias: &str,
) -> Result<ParticleId, CliError> {
    particles
        .get(alias)
        .copied()
        .ok_or_else(|| CliError::UnknownAlias {
            step,
            kind: "particle",
            name: alias.to_string(),
        })
}
