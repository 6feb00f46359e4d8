use std::env;
use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::Settings;
use super::{load_config, load_config_from};
use crate::broker::RetentionPolicy;

/// Run `f` with a fresh temporary directory as the working directory.
fn in_temp_dir<F: FnOnce(&TempDir)>(f: F) {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");
    f(&tmp);
    env::set_current_dir(orig).expect("restore cwd");
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.max_connections, 1000);
    assert!(settings.relay.echo_to_sender);
    assert_eq!(settings.relay.send_timeout(), Duration::from_secs(5));
    assert_eq!(settings.relay.queue_capacity, 256);
    assert!(!settings.relay.dynamic_topics);
    assert_eq!(settings.relay.retention(), RetentionPolicy::Retain);
    assert!(settings.relay.topics.is_empty());
}

#[test]
#[serial]
fn test_load_config_without_sources_uses_defaults() {
    in_temp_dir(|_| {
        let cfg = load_config().expect("load_config failed");
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.relay.policy().echo_to_sender);
    });
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    in_temp_dir(|_| {
        fs::create_dir_all("config").expect("create config dir");
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [relay]
            echo_to_sender = false
            reap_empty_topics = true
            topics = ["/chat", "/news"]
        "#;
        fs::write("config/default.toml", toml).expect("write config file");

        let cfg = load_config().expect("load_config failed");
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.max_connections, 1000);
        assert!(!cfg.relay.echo_to_sender);
        assert_eq!(cfg.relay.retention(), RetentionPolicy::ReapEmpty);
        assert_eq!(cfg.relay.topics, vec!["/chat", "/news"]);
    });
}

#[test]
#[serial]
fn test_explicit_file_layers_over_default_file() {
    in_temp_dir(|tmp| {
        fs::create_dir_all("config").expect("create config dir");
        fs::write("config/default.toml", "[server]\nport = 9000\nhost = \"0.0.0.0\"\n")
            .expect("write default");
        let extra = tmp.path().join("relay.toml");
        fs::write(&extra, "[server]\nport = 9100\n").expect("write extra");

        let cfg = load_config_from(Some(&extra)).expect("load_config_from failed");
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "0.0.0.0");
    });
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    in_temp_dir(|tmp| {
        let missing = tmp.path().join("nope.toml");
        assert!(load_config_from(Some(&missing)).is_err());
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    in_temp_dir(|_| {
        fs::create_dir_all("config").expect("create config dir");
        fs::write("config/default.toml", "[server]\nport = 9000\n").expect("write config file");

        temp_env::with_vars(
            [
                ("RELAY__SERVER__PORT", Some("9200")),
                ("RELAY__RELAY__SEND_TIMEOUT_MS", Some("250")),
                ("RELAY__RELAY__TOPICS", Some("/a,/b")),
            ],
            || {
                let cfg = load_config().expect("load_config failed");
                assert_eq!(cfg.server.port, 9200);
                assert_eq!(cfg.relay.send_timeout(), Duration::from_millis(250));
                assert_eq!(cfg.relay.topics, vec!["/a", "/b"]);
            },
        );
    });
}
