//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::Config;
use crate::error::CliError;
use crate::scenario::{Scenario, ScenarioOutcome};
use flowcore_core::{
    ChainHash, ChainLink, EventChain, Flow, FlowLaw, LawReport, LinkFault, ParticleSnapshot,
    ParticleStatus, ParticleStore,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a scenario file (10 MB).
const MAX_SCENARIO_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum size of an exported chain (200 MB).
const MAX_CHAIN_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// Characters of particle content shown in listings.
const CONTENT_PREVIEW: usize = 40;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Validate file size before reading.
fn validate_file_size(path: &Path, limit: u64) -> Result<(), CliError> {
    let metadata = std::fs::metadata(path).map_err(io_error(path))?;

    if metadata.len() > limit {
        return Err(CliError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit,
        });
    }
    Ok(())
}

/// Load an exported chain. The links are adopted as-is; nothing is verified.
pub fn read_chain(path: &Path, config: &Config) -> Result<EventChain, CliError> {
    validate_file_size(path, MAX_CHAIN_FILE_SIZE)?;
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    let links: Vec<ChainLink> = serde_json::from_slice(&bytes)?;

    tracing::debug!(path = %path.display(), links = links.len(), "chain loaded");
    Ok(EventChain::from_links(links, config.clock()))
}

/// Export a chain's links as JSON.
pub fn write_chain(path: &Path, chain: &EventChain) -> Result<(), CliError> {
    let json = serde_json::to_vec_pretty(chain.links())?;
    std::fs::write(path, json).map_err(io_error(path))?;

    tracing::info!(path = %path.display(), links = chain.len(), "chain exported");
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// RUN & DEMO COMMANDS
// =============================================================================

#[derive(Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    outcome: &'a ScenarioOutcome,
    recent_links: Vec<ChainLink>,
}

/// Play a scenario file.
pub fn cmd_run(
    config: &Config,
    json_mode: bool,
    scenario: &Path,
    emit_chain: Option<&Path>,
    tail: usize,
) -> Result<(), CliError> {
    tracing::info!("Playing scenario {}", scenario.display());

    validate_file_size(scenario, MAX_SCENARIO_FILE_SIZE)?;
    let scenario = Scenario::load(scenario)?;
    let flow = config.flow();

    play(&flow, &scenario, json_mode, tail)?;

    if let Some(target) = emit_chain {
        let path = chain_output_path(target);
        write_chain(&path, &flow.chain())?;
        if !json_mode {
            println!();
            println!("Chain written to {}", path.display());
        }
    }

    Ok(())
}

/// Play the built-in demo scenario.
pub fn cmd_demo(config: &Config, json_mode: bool, tail: usize) -> Result<(), CliError> {
    let scenario = Scenario::demo()?;
    play(&config.flow(), &scenario, json_mode, tail)
}

fn play(flow: &Flow, scenario: &Scenario, json_mode: bool, tail: usize) -> Result<(), CliError> {
    let outcome = scenario.run(flow)?;
    let recent_links = flow.recent_links(tail);

    for violation in &outcome.report.violations {
        tracing::warn!(code = %violation.code, "{}", violation.message);
    }

    if json_mode {
        return print_json(&RunOutput {
            outcome: &outcome,
            recent_links,
        });
    }

    println!("Flowcore Scenario");
    println!("=================");
    println!("Steps:        {}", scenario.steps.len());
    println!("Chain Length: {}", outcome.snapshot.chain_length);
    println!("Digest:       {}", outcome.snapshot.digest);
    println!();

    print_particles(&outcome.snapshot.particles);

    if !outcome.particles.is_empty() {
        println!();
        println!("Aliases:");
        for (alias, id) in &outcome.particles {
            println!("  {:<16} {}", alias, id);
        }
    }

    println!();
    print_links(&recent_links);

    if !outcome.checkpoints.is_empty() {
        println!();
        println!("Checkpoints:");
        for checkpoint in &outcome.checkpoints {
            println!(
                "  {:<16} length {:<5} {}",
                checkpoint.name, checkpoint.length, checkpoint.head
            );
        }
    }

    println!();
    print_report(&outcome.report);

    Ok(())
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

#[derive(Serialize)]
struct VerifyOutput {
    links: usize,
    digest: ChainHash,
    valid: bool,
    faults: Vec<LinkFault>,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest_matches: Option<bool>,
}

/// Audit an exported chain.
pub fn cmd_verify(
    config: &Config,
    json_mode: bool,
    chain_path: &Path,
    expected_digest: Option<&str>,
) -> Result<(), CliError> {
    let chain = read_chain(chain_path, config)?;
    let faults = chain.audit()?;
    let digest_matches = expected_digest
        .map(|hex| ChainHash::from_hex(hex).map(|expected| expected == chain.digest()))
        .transpose()?;

    let output = VerifyOutput {
        links: chain.len(),
        digest: chain.digest(),
        valid: faults.is_empty(),
        faults,
        digest_matches,
    };

    if json_mode {
        print_json(&output)?;
    } else {
        println!("Flowcore Chain Verification");
        println!("===========================");
        println!("Chain:  {}", chain_path.display());
        println!("Links:  {}", output.links);
        println!("Digest: {}", output.digest);
        println!();

        if output.valid {
            println!("All links verify from genesis");
        } else {
            println!("Failing links:");
            for fault in &output.faults {
                println!("  #{:<5} expected {}", fault.index, fault.expected);
                println!("         found    {}", fault.found);
            }
        }

        match output.digest_matches {
            Some(true) => println!("Head matches the expected digest"),
            Some(false) => println!("Head does NOT match the expected digest"),
            None => {}
        }
    }

    if !output.valid {
        return Err(CliError::Rejected(format!(
            "{} of {} links failed verification (first at #{})",
            output.faults.len(),
            output.links,
            output.faults.first().map_or(0, |f| f.index)
        )));
    }
    if output.digest_matches == Some(false) {
        return Err(CliError::Rejected(
            "chain head does not match the expected digest".to_string(),
        ));
    }

    Ok(())
}

// =============================================================================
// REPLAY & LAW COMMANDS
// =============================================================================

/// Verify an exported chain and rebuild its particle store.
fn replay_chain(config: &Config, chain_path: &Path) -> Result<ParticleStore, CliError> {
    let chain = read_chain(chain_path, config)?;
    chain.verify()?;
    let store =
        ParticleStore::replay(chain.links(), config.clock())?.with_policy(config.store.transitions);

    tracing::debug!(particles = store.len(), "store replayed");
    Ok(store)
}

#[derive(Serialize)]
struct ReplayOutput {
    draft: usize,
    collapsed: usize,
    archived: usize,
    particles: Vec<ParticleSnapshot>,
}

/// Rebuild and print the particle store recorded on a chain.
pub fn cmd_replay(config: &Config, json_mode: bool, chain_path: &Path) -> Result<(), CliError> {
    let store = replay_chain(config, chain_path)?;

    if json_mode {
        return print_json(&ReplayOutput {
            draft: store.count_by_status(ParticleStatus::Draft),
            collapsed: store.count_by_status(ParticleStatus::Collapsed),
            archived: store.count_by_status(ParticleStatus::Archived),
            particles: store.list(),
        });
    }

    println!("Flowcore Replay");
    println!("===============");
    println!("Chain:     {}", chain_path.display());
    println!("Draft:     {}", store.count_by_status(ParticleStatus::Draft));
    println!("Collapsed: {}", store.count_by_status(ParticleStatus::Collapsed));
    println!("Archived:  {}", store.count_by_status(ParticleStatus::Archived));
    println!();
    print_particles(&store.list());

    Ok(())
}

/// Evaluate the configured Flow Law over a replayed chain.
pub fn cmd_law(
    config: &Config,
    json_mode: bool,
    chain_path: &Path,
    strict: bool,
) -> Result<(), CliError> {
    let store = replay_chain(config, chain_path)?;
    let report = FlowLaw::from_config(config.law).evaluate(&store.list(), None);

    for violation in &report.violations {
        tracing::warn!(code = %violation.code, "{}", violation.message);
    }

    if json_mode {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if strict && !report.passed {
        return Err(CliError::Rejected(format!(
            "Flow Law reported {} violation(s)",
            report.violations.len()
        )));
    }
    Ok(())
}

// =============================================================================
// CONFIG COMMAND
// =============================================================================

/// Print the effective configuration.
pub fn cmd_config(config: &Config, json_mode: bool) -> Result<(), CliError> {
    if json_mode {
        return print_json(config);
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_particles(particles: &[ParticleSnapshot]) {
    if particles.is_empty() {
        println!("No particles");
        return;
    }

    println!("Particles:");
    for particle in particles {
        let latest = particle.latest();
        let preview: String = latest.content.chars().take(CONTENT_PREVIEW).collect();
        println!(
            "  {:<12} {:<9} v{:<3} {}",
            particle.id().to_string(),
            particle.status().as_str(),
            particle.history().len(),
            preview
        );
    }
}

fn print_links(links: &[ChainLink]) {
    if links.is_empty() {
        println!("Chain is empty");
        return;
    }

    println!("Recent Links:");
    for link in links {
        let hex = link.hash.to_hex();
        println!(
            "  {:<10} {:<24} {}",
            link.event.id.to_string(),
            link.event.event_type,
            &hex[..16]
        );
    }
}

fn print_report(report: &LawReport) {
    if report.passed {
        println!("Flow Law: passed");
        return;
    }

    println!("Flow Law: {} violation(s)", report.violations.len());
    for violation in &report.violations {
        println!("  [{}] {}", violation.code, violation.message);
        if !violation.particles.is_empty() {
            let ids: Vec<String> = violation.particles.iter().map(ToString::to_string).collect();
            println!("    particles: {}", ids.join(", "));
        }
    }
}

/// `run --emit-chain` into a directory writes `chain.json` there.
fn chain_output_path(target: &Path) -> PathBuf {
    if target.is_dir() {
        target.join("chain.json")
    } else {
        target.to_path_buf()
    }
}
