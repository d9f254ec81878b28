use acap_config::consumption::{report_unused_keys, ConfigMode};
use acap_config::{load_layered_yaml_from_strings, UnusedKeyPolicy};

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
orchestrator:
  max_concurrent_builds: 5

unused_section:
  foo: 123
  bar: 456
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report = report_unused_keys(ConfigMode::Orchestrator, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(!report.is_clean());
    assert!(report
        .unused_leaf_pointers
        .contains(&"/unused_section/foo".to_string()));
    assert!(report
        .unused_leaf_pointers
        .contains(&"/unused_section/bar".to_string()));
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
orchestrator:
  max_concurrent_builds: 5

unused_section:
  foo: 1
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let result = report_unused_keys(ConfigMode::Orchestrator, &loaded.config_json, UnusedKeyPolicy::Fail);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn only_consumed_keys_are_clean() {
    let yaml = r#"
orchestrator:
  max_concurrent_builds: 5
  build_poll_interval_seconds: 5
  build_stale_timeout_minutes: 15
  metrics_interval_seconds: 30
  shutdown_timeout_seconds: 60
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report = report_unused_keys(ConfigMode::Orchestrator, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");
    assert!(report.is_clean());
}

#[test]
fn exact_leaf_consumption_does_not_consume_sibling_keys() {
    let yaml = r#"
queue_worker:
  concurrency: 3
  concurrency_extra: 999
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report = report_unused_keys(ConfigMode::QueueWorker, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");
    assert!(report
        .unused_leaf_pointers
        .contains(&"/queue_worker/concurrency_extra".to_string()));
}

#[test]
fn deterministic_unused_pointer_ordering() {
    let yaml = r#"
unused:
  b: 2
  a: 1
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report = report_unused_keys(ConfigMode::Orchestrator, &loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/unused/a".to_string(), "/unused/b".to_string()]
    );
}
