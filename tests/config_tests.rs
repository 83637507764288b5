//! Tests for turning command-line flags into a session configuration

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use vmpilot::cli::Cli;
use vmpilot::config::{ConfigError, ContextMode, Engine, SessionConfig};
use vmpilot::console::ConnectPolicy;
use vmpilot::session::PromptSettings;

fn key_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sk-from-file").unwrap();
    file
}

/// Flags left out take their documented defaults
#[test]
fn test_config_defaults() {
    let key = key_file();
    let cli = Cli::try_parse_from([
        "vmpilot",
        "-q",
        "guest.qcow2",
        "-k",
        key.path().to_str().unwrap(),
    ])
    .unwrap();

    let config = cli.into_config().unwrap();

    assert_eq!(config.engine, Engine::CodeDavinci001);
    assert_eq!(config.prompt_budget(), 3968);
    assert_eq!(config.sampling.temperature, 0.8);
    assert_eq!(config.sampling.frequency_penalty, 1.0);
    assert_eq!(config.context_mode, ContextMode::LastChunk);
    assert_eq!(config.idle_timeout, Duration::from_secs(1));
    assert_eq!(
        config.connect_policy,
        ConnectPolicy::RetryIndefinitely {
            delay: Duration::from_secs(1)
        }
    );
    assert_eq!(config.api_base, "https://api.openai.com/v1");
    assert_eq!(config.api_key, "sk-from-file");
    assert_eq!(config.vm.image, PathBuf::from("guest.qcow2"));
    assert_eq!(config.vm.snapshot, "bootroot");
    assert_eq!(config.vm.port, 3456);
}

#[test]
fn test_config_custom() {
    let key = key_file();
    let cli = Cli::try_parse_from([
        "vmpilot",
        "-q",
        "img.qcow2",
        "-k",
        key.path().to_str().unwrap(),
        "-e",
        "code-cushman-001",
        "-w",
        "-p",
        "5555",
        "--idle-timeout",
        "2.5",
        "--memory",
        "2G",
        "--api-base",
        "http://127.0.0.1:8080/v1",
    ])
    .unwrap();

    let config = cli.into_config().unwrap();

    assert_eq!(config.prompt_budget(), 1920);
    assert_eq!(config.context_mode, ContextMode::WholeTranscript);
    assert_eq!(config.idle_timeout, Duration::from_millis(2500));
    assert_eq!(config.api_base, "http://127.0.0.1:8080/v1");
    assert!(config
        .vm
        .args()
        .contains(&"telnet:localhost:5555,server,nowait".to_string()));
    assert_eq!(config.vm.memory, "2G");

    let settings = PromptSettings::from(&config);
    assert_eq!(settings.max_tokens, 1920);
    assert_eq!(settings.context_mode, ContextMode::WholeTranscript);
}

#[test]
fn test_missing_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("openai.key");
    let cli = Cli::try_parse_from([
        "vmpilot",
        "-q",
        "guest.qcow2",
        "-k",
        missing.to_str().unwrap(),
    ])
    .unwrap();

    assert!(matches!(cli.into_config(), Err(ConfigError::KeyRead { .. })));
}

#[test]
fn test_session_config_new() {
    let config = SessionConfig::new("guest.qcow2", "sk-inline");
    assert_eq!(config.api_key, "sk-inline");
    assert_eq!(config.vm.image, PathBuf::from("guest.qcow2"));
    assert_eq!(config.prompt_budget(), 4096 - 128);
}
