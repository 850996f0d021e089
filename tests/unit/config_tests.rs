//! Unit tests for configuration parsing, validation and overrides.
//!
//! Tests that parse configuration read `AGENT_CONDUIT_BINARY`, so they run
//! serially with the test that sets it.

use std::time::Duration;

use serial_test::serial;

use agent_conduit::config::{ClientConfig, BINARY_ENV_VAR, DEFAULT_INHERITED_ENV};
use agent_conduit::rpc::codec::DEFAULT_MAX_LINE_BYTES;
use agent_conduit::ClientError;

const FULL_TOML: &str = r#"
[launch]
binary = "/opt/agent/bin/server"
args = ["app-server", "--listen", "stdio"]
cwd = "/srv/work"
inherit_env = ["PATH", "OPENAI_API_KEY"]

[launch.env]
RUST_LOG = "warn"

[client]
name = "review-bot"
title = "Review Bot"
version = "2.1.0"

[timeouts]
request_seconds = 10
long_running_seconds = 900
shutdown_grace_seconds = 2

[framing]
max_line_bytes = 65536
"#;

fn expect_config_error(raw: &str) -> String {
    match ClientConfig::from_toml_str(raw) {
        Err(ClientError::Config(msg)) => msg,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
#[serial]
fn empty_document_uses_defaults() {
    let config = ClientConfig::from_toml_str("").expect("defaults parse");

    assert_eq!(config, ClientConfig::default());
    assert_eq!(config.launch.binary, "codex");
    assert_eq!(config.launch.args, ["app-server"]);
    assert_eq!(config.launch.inherit_env.len(), DEFAULT_INHERITED_ENV.len());
    assert_eq!(config.client.name, "agent-conduit");
    assert_eq!(config.timeouts.request_seconds, 30);
    assert_eq!(config.timeouts.long_running_seconds, 300);
    assert_eq!(config.timeouts.shutdown_grace_seconds, 5);
    assert_eq!(config.framing.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
}

#[test]
#[serial]
fn full_document_parses_every_section() {
    let config = ClientConfig::from_toml_str(FULL_TOML).expect("config parses");

    assert_eq!(config.launch.binary, "/opt/agent/bin/server");
    assert_eq!(config.launch.args, ["app-server", "--listen", "stdio"]);
    assert_eq!(config.launch.cwd.as_deref(), Some(std::path::Path::new("/srv/work")));
    assert_eq!(config.launch.inherit_env, ["PATH", "OPENAI_API_KEY"]);
    assert_eq!(config.launch.env.get("RUST_LOG").map(String::as_str), Some("warn"));
    assert_eq!(config.client.name, "review-bot");
    assert_eq!(config.client.title.as_deref(), Some("Review Bot"));
    assert_eq!(config.framing.max_line_bytes, 65536);
}

#[test]
#[serial]
fn partial_sections_keep_field_defaults() {
    let config = ClientConfig::from_toml_str("[timeouts]\nrequest_seconds = 3\n").expect("parses");
    assert_eq!(config.timeouts.request_seconds, 3);
    assert_eq!(config.timeouts.long_running_seconds, 300);
}

#[test]
#[serial]
fn transport_options_follow_config() {
    let options = ClientConfig::from_toml_str(FULL_TOML)
        .expect("config parses")
        .transport_options();

    assert_eq!(options.request_timeout, Duration::from_secs(10));
    assert_eq!(options.long_running_timeout, Duration::from_secs(900));
    assert_eq!(options.shutdown_grace, Duration::from_secs(2));
    assert_eq!(options.max_line_bytes, 65536);
    assert_eq!(options.timeout_for("review/start"), Duration::from_secs(900));
    assert_eq!(options.timeout_for("thread/start"), Duration::from_secs(10));
}

#[test]
#[serial]
fn empty_binary_is_rejected() {
    let msg = expect_config_error("[launch]\nbinary = \"  \"\n");
    assert_eq!(msg, "launch.binary must not be empty");
}

#[test]
#[serial]
fn empty_client_name_is_rejected() {
    let msg = expect_config_error("[client]\nname = \"\"\n");
    assert_eq!(msg, "client.name must not be empty");
}

#[test]
#[serial]
fn zero_timeouts_are_rejected() {
    let msg = expect_config_error("[timeouts]\nrequest_seconds = 0\n");
    assert_eq!(msg, "timeouts.request_seconds must be greater than 0");

    let msg = expect_config_error("[timeouts]\nlong_running_seconds = 0\n");
    assert_eq!(msg, "timeouts.long_running_seconds must be greater than 0");
}

#[test]
#[serial]
fn zero_shutdown_grace_is_allowed() {
    let config = ClientConfig::from_toml_str("[timeouts]\nshutdown_grace_seconds = 0\n")
        .expect("zero grace kills immediately");
    assert_eq!(config.transport_options().shutdown_grace, Duration::ZERO);
}

#[test]
#[serial]
fn tiny_line_limit_is_rejected() {
    let msg = expect_config_error("[framing]\nmax_line_bytes = 512\n");
    assert_eq!(msg, "framing.max_line_bytes must be at least 1024");
}

#[test]
#[serial]
fn malformed_toml_is_a_config_error() {
    let msg = expect_config_error("[launch\nbinary = 1");
    assert!(msg.starts_with("invalid config:"), "got {msg}");

    let msg = expect_config_error("[timeouts]\nrequest_seconds = \"ten\"\n");
    assert!(msg.starts_with("invalid config:"), "got {msg}");
}

#[test]
#[serial]
fn env_var_overrides_binary() {
    std::env::set_var(BINARY_ENV_VAR, "/custom/server");
    let overridden = ClientConfig::from_toml_str(FULL_TOML);
    std::env::set_var(BINARY_ENV_VAR, "   ");
    let blank = ClientConfig::from_toml_str(FULL_TOML);
    std::env::remove_var(BINARY_ENV_VAR);

    assert_eq!(overridden.expect("parses").launch.binary, "/custom/server");
    assert_eq!(blank.expect("parses").launch.binary, "/opt/agent/bin/server");
}

#[test]
#[serial]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("agent-conduit.toml");
    std::fs::write(&path, FULL_TOML).expect("write config");

    let config = ClientConfig::load_from_path(&path).expect("loads");
    assert_eq!(config.client.name, "review-bot");
}

#[test]
fn missing_file_names_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.toml");

    let err = ClientConfig::load_from_path(&path).expect_err("must fail");
    let ClientError::Config(msg) = err else {
        panic!("expected a config error");
    };
    assert!(msg.starts_with("failed to read"));
    assert!(msg.contains("absent.toml"));
}
