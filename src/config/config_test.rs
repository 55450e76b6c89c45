use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_controller_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("CONTROLLER__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = ControllerConfig::default();

    assert_eq!(config.controller.name, "kcp-workspace-mounts");
    assert_eq!(config.controller.workers, 2);
    assert_eq!(config.controller.resync_period(), None);
    assert_eq!(config.queue.base_delay_ms, 5);
    assert_eq!(config.queue.max_delay_ms, 1_000_000);
    assert_eq!(config.queue.burst, 100);
    assert!(config.watch.watch_builtin_kinds);
    assert!(!config.monitoring.prometheus_enabled);
    assert!(!config.builtin.is_empty());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_controller_env_vars();
    with_vars(
        vec![
            ("CONTROLLER__CONTROLLER__WORKERS", Some("8")),
            ("CONTROLLER__QUEUE__QPS", Some("25.5")),
        ],
        || {
            let config = ControllerConfig::new().unwrap();

            assert_eq!(config.controller.workers, 8);
            assert_eq!(config.queue.qps, 25.5);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_controller_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [controller]
        name = "mounts-under-test"
        resync_period_ms = 30000

        [queue]
        base_delay_ms = 10
        max_delay_ms = 60000
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = ControllerConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.controller.name, "mounts-under-test");
        assert_eq!(
            config.controller.resync_period(),
            Some(std::time::Duration::from_secs(30))
        );
        assert_eq!(config.queue.base_delay_ms, 10);
        assert_eq!(config.queue.max_delay_ms, 60000);
        // untouched sections keep their defaults
        assert_eq!(config.queue.burst, 100);
        assert!(!config.builtin.is_empty());
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_controller_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [controller]
        workers = 4
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("CONTROLLER__CONTROLLER__WORKERS", Some("6")),
        ],
        || {
            let config = ControllerConfig::new().unwrap();
            assert_eq!(config.controller.workers, 6);
        },
    );
}

#[test]
#[serial]
fn missing_config_path_file_is_an_error() {
    cleanup_all_controller_env_vars();
    with_vars(
        vec![("CONFIG_PATH", Some("/definitely/not/here/controller.toml"))],
        || {
            assert!(ControllerConfig::new().is_err());
        },
    );
}

#[test]
fn validation_should_fail_with_zero_workers() {
    let mut config = ControllerConfig::default();
    config.controller.workers = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_fail_when_max_delay_below_base() {
    let mut config = ControllerConfig::default();
    config.queue.base_delay_ms = 100;
    config.queue.max_delay_ms = 10;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_fail_with_non_positive_qps() {
    let mut config = ControllerConfig::default();
    config.queue.qps = 0.0;
    assert!(config.clone().validate().is_err());

    config.queue.qps = f64::NAN;
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_detect_privileged_metrics_port() {
    let mut config = ControllerConfig::default();
    config.monitoring.prometheus_enabled = true;
    config.monitoring.prometheus_port = 80;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_inverted_relist_backoff() {
    let mut config = ControllerConfig::default();
    config.watch.relist_base_delay_ms = 5000;
    config.watch.relist_max_delay_ms = 100;

    assert!(config.validate().is_err());
}

#[test]
fn default_config_is_valid() {
    assert!(ControllerConfig::default().validate().is_ok());
}
