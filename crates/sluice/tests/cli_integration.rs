//! CLI integration tests for the Sluice command-line interface.
//!
//! Every test runs in its own temporary directory with an empty user config
//! directory, so no real configuration is picked up.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PIPELINE: &str = r#"
name: release
spec:
  params:
    - name: greeting
      type: string
      default: hi
  tasks:
    - name: build
      taskRef:
        name: kaniko
      params:
        - name: message
          value: "$(params.greeting), world"
        - name: run
          value: "$(context.pipelineRun.name)"
    - name: publish
      taskRef:
        name: publish
      params:
        - name: digest
          value: "$(tasks.build.results.digest)"
  results:
    - name: image-digest
      value: "$(tasks.publish.results.digest)"
    - name: missing
      value: "$(tasks.publish.results.nope)"
"#;

const RUN: &str = r#"{
    "metadata": {"name": "release-7", "namespace": "ci", "uid": "f00"},
    "spec": {"params": [{"name": "greeting", "value": "hello"}]}
}"#;

const STATE: &str = r#"[
    {
        "pipelineTask": {"name": "build"},
        "taskRuns": [
            {
                "name": "build-0",
                "status": "Succeeded",
                "results": [{"name": "digest", "value": "sha256:abc"}]
            }
        ]
    },
    {"pipelineTask": {"name": "publish"}}
]"#;

/// Test workspace: fixtures plus an isolated config dir.
struct Workspace {
    dir: TempDir,
    config_dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        };
        ws.write("pipeline.yaml", PIPELINE);
        ws.write("run.json", RUN);
        ws.write("state.json", STATE);
        ws
    }

    fn write(&self, name: &str, contents: &str) {
        fs::write(self.dir.path().join(name), contents).unwrap();
    }

    /// A `sluice` command rooted in this workspace.
    fn sluice(&self) -> Command {
        let mut cmd = Command::cargo_bin("sluice").unwrap();
        cmd.current_dir(self.dir.path())
            .env_remove("SLUICE_CONFIG_DIR")
            .env_remove("RUST_LOG")
            .arg("--config-dir")
            .arg(self.config_dir.path());
        cmd
    }
}

/// Get a command for the sluice binary.
fn sluice() -> Command {
    Command::cargo_bin("sluice").unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    sluice()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sluice"));
}

#[test]
fn test_version_displays() {
    sluice()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sluice"));
}

#[test]
fn test_help_lists_subcommands() {
    sluice()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("results"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_resolve_requires_pipeline_and_run() {
    sluice()
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--pipeline"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolve Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_resolve_substitutes_params_and_context() {
    let ws = Workspace::new();
    ws.sluice()
        .args(["--json", "resolve", "-p", "pipeline.yaml", "-r", "run.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello, world"))
        .stdout(predicate::str::contains("\"release-7\""))
        .stdout(predicate::str::contains("$(params.greeting)").not())
        // Results of tasks that have not run stay templated.
        .stdout(predicate::str::contains("$(tasks.build.results.digest)"));
}

#[test]
fn test_resolve_generates_missing_uid() {
    let ws = Workspace::new();
    ws.write("run.json", r#"{"metadata": {"name": "r1"}}"#);
    ws.sluice()
        .args(["--json", "resolve", "-p", "pipeline.yaml", "-r", "run.json"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r#""uid": "[0-9a-f-]{36}""#).unwrap());
}

#[test]
fn test_resolve_with_state_propagates_results() {
    let ws = Workspace::new();
    ws.sluice()
        .args([
            "--json",
            "resolve",
            "-p",
            "pipeline.yaml",
            "-r",
            "run.json",
            "-s",
            "state.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("$(tasks.build.results.digest)").not())
        .stdout(predicate::str::contains("sha256:abc"));
}

#[test]
fn test_resolve_toml_output() {
    let ws = Workspace::new();
    ws.sluice()
        .args([
            "resolve", "-p", "pipeline.yaml", "-r", "run.json", "-f", "toml",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("name = \"release\""));
}

#[test]
fn test_resolve_missing_pipeline_fails() {
    let ws = Workspace::new();
    ws.sluice()
        .args(["resolve", "-p", "nope.yaml", "-r", "run.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading pipeline"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Results Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_results_reports_invalid() {
    let ws = Workspace::new();
    ws.write(
        "outcome.json",
        r#"{
            "taskResults": {"publish": [{"name": "digest", "value": "sha256:abc"}]},
            "statuses": {"tasks.publish.status": "Succeeded"}
        }"#,
    );
    ws.sluice()
        .args(["--json", "results", "-p", "pipeline.yaml", "-o", "outcome.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("sha256:abc"))
        .stdout(predicate::str::contains("\"missing\""))
        .stderr(predicate::str::contains("invalid pipeline results"));
}

#[test]
fn test_results_all_valid() {
    let ws = Workspace::new();
    ws.write(
        "pipeline.yaml",
        &PIPELINE.replace("$(tasks.publish.results.nope)", "$(tasks.publish.results.size)"),
    );
    ws.write(
        "outcome.json",
        r#"{
            "taskResults": {"publish": [
                {"name": "digest", "value": "sha256:abc"},
                {"name": "size", "value": "42"}
            ]},
            "statuses": {"tasks.publish.status": "Succeeded"}
        }"#,
    );
    ws.sluice()
        .args(["--json", "results", "-p", "pipeline.yaml", "-o", "outcome.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"42\""))
        .stdout(predicate::str::contains("invalid").not());
}

#[test]
fn test_results_emits_literal_results_in_order() {
    let ws = Workspace::new();
    ws.write(
        "pipeline.yaml",
        r#"
name: release
spec:
  tasks:
    - name: build
      taskRef:
        name: kaniko
  results:
    - name: version
      value: "1.2.3"
    - name: digest
      value: "$(tasks.build.results.digest)"
"#,
    );
    ws.write(
        "outcome.json",
        r#"{
            "taskResults": {"build": [{"name": "digest", "value": "sha256:abc"}]},
            "statuses": {"tasks.build.status": "Succeeded"}
        }"#,
    );
    let output = ws
        .sluice()
        .args(["--json", "results", "-p", "pipeline.yaml", "-o", "outcome.json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let document: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let results = document["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["name"], "version");
    assert_eq!(results[0]["value"], "1.2.3");
    assert_eq!(results[1]["name"], "digest");
    assert_eq!(results[1]["value"], "sha256:abc");
}

#[test]
fn test_results_uses_configured_status_convention() {
    let ws = Workspace::new();
    ws.write(
        "sluice.toml",
        "[resolver]\nstatus_prefix = \"status/\"\nstatus_suffix = \"\"\n",
    );
    // `publish` failed under the configured key, so its results are dropped
    // silently and nothing is reported invalid.
    ws.write(
        "outcome.json",
        r#"{"statuses": {"status/publish": "Failed"}}"#,
    );
    ws.sluice()
        .args(["--json", "results", "-p", "pipeline.yaml", "-o", "outcome.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"results\": []"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_uses_config_dir() {
    let ws = Workspace::new();
    ws.sluice()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_json_defaults() {
    let ws = Workspace::new();
    ws.sluice()
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Succeeded"))
        .stdout(predicate::str::contains("tasks."));
}

#[test]
fn test_config_which_lists_project_file() {
    let ws = Workspace::new();
    ws.write("sluice.toml", "[output]\nformat = \"json\"\n");
    ws.sluice()
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sluice.toml"))
        .stdout(predicate::str::contains("1 config file(s) loaded."));
}
