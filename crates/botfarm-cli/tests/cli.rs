use std::io::Write;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::NamedTempFile;

const INPUT: &str = r#"{"agentType":"default","stepId":"s1","agentId":"farmer-1","simulationId":"sim-1","simulationTime":10.0,"selfInfo":{"entityInfo":{"observedAtSimulationTime":10.0,"entityId":"farmer-1","location":{"x":0.0,"y":0.0},"characterInfo":{"name":"Ada"}},"corePersonality":"Patient.","observationDistance":500.0},"newObservations":{"entitiesById":{"bob":{"observedAtSimulationTime":10.0,"entityId":"bob","location":{"x":50.0,"y":0.0},"characterInfo":{"name":"Bob"}}}}}"#;

const RESPONSE: &str = r#"{"iWantToSay": "Hello Bob!", "newThoughts": ["Bob is nearby"]}"#;

fn file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn botfarm(config: &NamedTempFile) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botfarm"));
    cmd.arg("--config")
        .arg(config.path())
        .env_remove("BOTFARM_MODEL")
        .env_remove("BOTFARM_OPENAI_API_KEY")
        .env_remove("OPENAI_API_KEY");
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botfarm"));
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("Botfarm"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botfarm"));
    cmd.arg("--version").assert().success();
}

#[test]
fn test_models_lists_known_models() {
    let config = file("");
    botfarm(&config)
        .arg("models")
        .assert()
        .success()
        .stdout(contains("gpt-4"));
}

#[test]
fn test_replay_with_mock_response() {
    let config = file("[runner]\nstep_delay_ms = 10\n");
    let inputs = file(INPUT);
    let response = file(RESPONSE);

    botfarm(&config)
        .arg("replay")
        .arg(inputs.path())
        .arg("--mock-response")
        .arg(response.path())
        .args(["--settle-ms", "200"])
        .assert()
        .success()
        .stdout(contains("prompt-finished"))
        .stdout(contains("Hello Bob!"));
}

#[test]
fn test_replay_without_key_fails() {
    let config = file("");
    let inputs = file(INPUT);

    botfarm(&config)
        .arg("replay")
        .arg(inputs.path())
        .assert()
        .failure()
        .stderr(contains("No API key"));
}

#[test]
fn test_budget_reports_sections() {
    let config = file("[model]\nid = \"gpt-4\"\n");
    let inputs = file(INPUT);

    botfarm(&config)
        .arg("budget")
        .arg(inputs.path())
        .assert()
        .success()
        .stdout(contains("observedEntities"))
        .stdout(contains("gpt-4"));
}

#[test]
fn test_budget_rejects_unknown_agent_type() {
    let config = file("");
    let inputs = file(INPUT);

    botfarm(&config)
        .arg("budget")
        .arg(inputs.path())
        .args(["--agent-type", "telepathic"])
        .assert()
        .failure();
}

#[test]
fn test_missing_config_file_is_error() {
    let inputs = file(INPUT);
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botfarm"));
    cmd.args(["--config", "/nonexistent/botfarm.toml", "budget"])
        .arg(inputs.path())
        .assert()
        .failure()
        .stderr(contains("Failed to read config file"));
}
