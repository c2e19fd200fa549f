use super::*;
use std::collections::HashMap;

#[test]
fn test_empty_file_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.broker.kind, BrokerKind::Memory);
    assert_eq!(config.broker.servers, "localhost:9092");
    assert_eq!(config.model.input_dim, 10);
    assert_eq!(config.model.weights_path, PathBuf::from("./weights/"));
    assert_eq!(config.server.bind, "0.0.0.0:5000");
    assert_eq!(config.server.experiment_capacity, 10_000);
}

#[test]
fn test_default_retry_matches_policy_default() {
    let config = Config::default();
    assert_eq!(config.broker.retry_policy(), RetryPolicy::default());
    assert_eq!(config.worker_config().poll_timeout, Duration::from_secs(1));
}

#[test]
fn test_partial_sections() {
    let config = Config::from_toml(
        r#"
        [broker]
        kind = "kafka"
        connect_attempts = 3

        [model]
        cache_size = 0
        learning_rate = 0.05

        [server]
        experiment_capacity = 250
        "#,
    )
    .unwrap();
    assert_eq!(config.broker.kind, BrokerKind::Kafka);
    assert_eq!(config.broker.connect_attempts, 3);
    assert_eq!(config.broker.backoff_secs, 5);
    assert_eq!(config.model.cache_size, 0);
    assert_eq!(config.worker_config().learning_rate, 0.05);
    assert!(config.model.create_base_if_missing);
    assert_eq!(config.server.experiment_capacity, 250);
    assert_eq!(config.server.bind, "0.0.0.0:5000");
}

#[test]
fn test_unknown_broker_kind_rejected() {
    assert!(Config::from_toml("[broker]\nkind = \"rabbit\"").is_err());
}

#[test]
fn test_env_overrides() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("KAFKA_SERVER", "kafka:29092"),
        ("KAFKA_GROUP_ID", "ml-a"),
        ("MODEL_WEIGHTS_PATH", "/data/weights"),
        ("LIGANDML_BIND", "127.0.0.1:8080"),
    ]);
    let mut config = Config::default();
    config.apply_env(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.broker.kind, BrokerKind::Kafka);
    assert_eq!(config.broker.servers, "kafka:29092");
    assert_eq!(config.broker.group_id, "ml-a");
    assert_eq!(config.model.weights_path, PathBuf::from("/data/weights"));
    assert_eq!(config.server.bind, "127.0.0.1:8080");
}

#[test]
fn test_no_env_leaves_config_untouched() {
    let mut config = Config::default();
    config.apply_env(|_| None);
    assert_eq!(config.broker.kind, BrokerKind::Memory);
    assert_eq!(config.broker.group_id, "ligandml-ml-server");
}
