//! Config defaults and TOML parsing.

use voco_domain::config::{Config, ConfigSeverity};

#[test]
fn empty_toml_yields_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8001);
    assert_eq!(config.audio.speech_threshold, 0.5);
    assert_eq!(config.audio.barge_in_frames, 2);
    assert_eq!(config.audio.silence_frames_for_turn_end, 40);
    assert_eq!(config.audio.min_buffer_bytes, 6400);
    assert_eq!(config.llm.max_context_tokens, 160_000);
    assert_eq!(config.turn.hitl_timeout_secs, 120);
    assert_eq!(config.turn.rpc_timeout_secs, 30);
    assert_eq!(config.turn.future_ttl_secs, 300);
    assert_eq!(config.turn.max_checkpoints, 50);
    assert!(config.tool_servers.servers.is_empty());
}

#[test]
fn partial_toml_overrides_only_named_fields() {
    let raw = r#"
        [server]
        port = 9005

        [audio]
        silence_frames_for_turn_end = 25

        [[tool_servers.servers]]
        id = "notes"
        command = "notes-server"
        args = ["--stdio"]
    "#;
    let config: Config = toml::from_str(raw).unwrap();
    assert_eq!(config.server.port, 9005);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.audio.silence_frames_for_turn_end, 25);
    assert_eq!(config.audio.barge_in_frames, 2);
    assert_eq!(config.tool_servers.servers.len(), 1);
    assert_eq!(config.tool_servers.servers[0].id, "notes");
}

#[test]
fn validate_flags_bad_threshold() {
    let mut config = Config::default();
    config.audio.speech_threshold = 1.5;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "audio.speech_threshold"));
}

#[test]
fn validate_flags_zero_checkpoints() {
    let mut config = Config::default();
    config.turn.max_checkpoints = 0;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "turn.max_checkpoints"));
}

#[test]
fn allowed_env_keys_reject_unknown() {
    use voco_domain::config::env_key_allowed;
    assert!(env_key_allowed("GITHUB_TOKEN"));
    assert!(env_key_allowed("TTS_VOICE"));
    assert!(!env_key_allowed("PATH"));
    assert!(!env_key_allowed("LD_PRELOAD"));
}

#[test]
fn sandbox_url_uses_configured_port() {
    let mut config = Config::default();
    config.server.port = 8001;
    assert_eq!(config.server.sandbox_url(), "http://127.0.0.1:8001/sandbox");
}
