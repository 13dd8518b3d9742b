//! # Scenario & Chain File Tests
//!
//! End-to-end checks of the CLI commands against files on disk.

use flowcore::cli::{cmd_law, cmd_replay, cmd_run, cmd_verify, read_chain};
use flowcore::{CliError, Config, Scenario};
use flowcore_core::{ChainLink, FlowError, Payload};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCENARIO: &str = r#"{
  "contexts": {
    "main": { "id": "session-1", "persona": "scribe", "created_at": 0 }
  },
  "steps": [
    { "op": "create", "as": "idea", "content": "hello", "context": "main" },
    { "op": "collapse", "particle": "idea", "by": "user", "context": "main" },
    { "op": "dispatch", "type": "note.added", "payload": { "n": 1 }, "context": "main" },
    { "op": "archive", "particle": "idea", "by": "user", "note": "done", "context": "main" }
  ]
}"#;

fn manual_config(dir: &Path) -> Config {
    let path = dir.join("flowcore.toml");
    std::fs::write(&path, "[clock]\nmode = \"manual\"\nstart = 1000\nstep = 1\n")
        .expect("write config");
    Config::load(&path).expect("load config")
}

/// Play `scenario` and export the chain, returning its path.
fn exported_chain(dir: &Path, config: &Config, scenario: &str) -> PathBuf {
    let scenario_path = dir.join("scenario.json");
    std::fs::write(&scenario_path, scenario).expect("write scenario");

    let chain_path = dir.join("chain.json");
    cmd_run(config, true, &scenario_path, Some(chain_path.as_path()), 0).expect("run");
    chain_path
}

#[test]
fn run_exports_a_verifiable_chain() {
    let dir = TempDir::new().expect("tempdir");
    let config = manual_config(dir.path());
    let chain_path = exported_chain(dir.path(), &config, SCENARIO);

    let chain = read_chain(&chain_path, &config).expect("read chain");
    assert_eq!(chain.len(), 4);
    assert!(chain.is_valid());

    cmd_verify(&config, true, &chain_path, Some(chain.digest().to_hex().as_str())).expect("verify");
}

#[test]
fn identical_runs_export_identical_digests() {
    let first = TempDir::new().expect("tempdir");
    let second = TempDir::new().expect("tempdir");
    let config = manual_config(first.path());

    let a = exported_chain(first.path(), &config, SCENARIO);
    let b = exported_chain(second.path(), &config, SCENARIO);

    assert_eq!(
        read_chain(&a, &config).expect("a").digest(),
        read_chain(&b, &config).expect("b").digest()
    );
}

#[test]
fn emit_chain_into_directory_writes_chain_json() {
    let dir = TempDir::new().expect("tempdir");
    let config = manual_config(dir.path());
    let scenario_path = dir.path().join("scenario.json");
    std::fs::write(&scenario_path, SCENARIO).expect("write scenario");

    cmd_run(&config, true, &scenario_path, Some(dir.path()), 0).expect("run");

    assert!(dir.path().join("chain.json").is_file());
}

#[test]
fn tampered_chain_file_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let config = manual_config(dir.path());
    let chain_path = exported_chain(dir.path(), &config, SCENARIO);

    let mut links: Vec<ChainLink> =
        serde_json::from_slice(&std::fs::read(&chain_path).expect("read")).expect("parse");
    links[2].event.payload = Payload::map([("n", Payload::Int(2))]);
    std::fs::write(&chain_path, serde_json::to_vec(&links).expect("encode")).expect("write");

    let result = cmd_verify(&config, true, &chain_path, None);
    assert!(matches!(result, Err(CliError::Rejected(_))));

    let replay = cmd_replay(&config, true, &chain_path);
    assert!(matches!(
        replay,
        Err(CliError::Flow(FlowError::ChainIntegrityViolation { index: 2, .. }))
    ));
}

#[test]
fn wrong_expected_digest_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let config = manual_config(dir.path());
    let chain_path = exported_chain(dir.path(), &config, SCENARIO);

    let result = cmd_verify(&config, true, &chain_path, Some("ab".repeat(32).as_str()));
    assert!(matches!(result, Err(CliError::Rejected(_))));
}

#[test]
fn strict_law_fails_on_orphans() {
    let dir = TempDir::new().expect("tempdir");
    let config = manual_config(dir.path());
    let orphan = r#"{
      "contexts": { "bare": { "id": "anon", "created_at": 0 } },
      "steps": [ { "op": "create", "as": "a", "content": "x", "context": "bare" } ]
    }"#;
    let chain_path = exported_chain(dir.path(), &config, orphan);

    cmd_law(&config, true, &chain_path, false).expect("advisory law");
    assert!(matches!(
        cmd_law(&config, true, &chain_path, true),
        Err(CliError::Rejected(_))
    ));
}

#[test]
fn strict_transitions_from_config_reject_skips() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("flowcore.toml");
    std::fs::write(&path, "[store]\ntransitions = \"strict\"\n").expect("write config");
    let config = Config::load(&path).expect("load config");

    let scenario = Scenario::from_json(
        r#"{
          "contexts": { "c": { "id": "c", "persona": "p", "created_at": 0 } },
          "steps": [
            { "op": "create", "as": "a", "content": "x", "context": "c" },
            { "op": "archive", "particle": "a", "by": "u", "context": "c" }
          ]
        }"#,
    )
    .expect("parse");

    let flow = config.flow();
    let result = scenario.run(&flow);

    assert!(matches!(
        result,
        Err(CliError::Flow(FlowError::InvalidTransition { .. }))
    ));
    assert_eq!(flow.chain_len(), 1);
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("flowcore.toml");
    std::fs::write(&path, "[store]\ntransitions = \"sideways\"\n").expect("write config");

    assert!(matches!(Config::load(&path), Err(CliError::Config { .. })));
}
