use super::settings::Settings;
use super::{ENV_PREFIX, load_config};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.addr(), "0.0.0.0:8090");
    assert_eq!(settings.server.ws_path, "/ws");
    assert_eq!(settings.server.health_path, "/healthz");
    assert_eq!(settings.server.handshake_timeout().as_secs(), 5);
    assert_eq!(settings.broker.queue, "empresas_log");
    assert_eq!(settings.broker.prefetch, 50);
    assert_eq!(settings.broker.connect_max_wait().as_secs(), 60);
    assert_eq!(settings.session.outbox_capacity, 256);
    assert_eq!(settings.session.write_timeout().as_secs(), 10);
    assert!(settings.session.ping_interval() < settings.session.read_timeout());
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // load_config reads config/default.* relative to the working directory.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 9000

        [broker]
        queue = "companies"
        prefetch = 10

        [session]
        outbox_capacity = 16
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.broker.queue, "companies");
    assert_eq!(cfg.broker.prefetch, 10);
    assert_eq!(cfg.session.outbox_capacity, 16);
    // untouched values keep their defaults
    assert_eq!(cfg.server.ws_path, "/ws");
    assert_eq!(cfg.session.read_timeout_secs, 60);
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    let uri_key = format!("{ENV_PREFIX}_BROKER__URI");
    let cap_key = format!("{ENV_PREFIX}_SESSION__OUTBOX_CAPACITY");
    temp_env::with_vars(
        [
            (uri_key.as_str(), Some("amqp://user:pw@rabbit:5672/%2f")),
            (cap_key.as_str(), Some("1024")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.uri, "amqp://user:pw@rabbit:5672/%2f");
            assert_eq!(cfg.session.outbox_capacity, 1024);
            assert_eq!(cfg.broker.queue, "empresas_log");
        },
    );
}

#[test]
fn validate_rejects_unusable_values() {
    let mut settings = Settings::default();
    assert!(settings.validate().is_ok());

    settings.session.outbox_capacity = 0;
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.session.ping_interval_secs = settings.session.read_timeout_secs;
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.server.handshake_timeout_secs = 0;
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.server.health_path = settings.server.ws_path.clone();
    assert!(settings.validate().is_err());
}
