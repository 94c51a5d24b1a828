use std::sync::Arc;

use weld::{InjectError, Testing};
use weld_base::{BASE_MODULE, CONFIG, Config, TRACING, Tracing, TracingConfig, base_module};

#[tokio::test]
async fn test_base_module_exports() {
    let container = Testing::create()
        .import(base_module(Config::new().with("name", "weld")))
        .compile()
        .await
        .unwrap();
    let config = container.get(&*CONFIG).await.unwrap();
    let name: String = config.get("name").unwrap();
    assert_eq!(name, "weld");
    assert!(container.get(&*TRACING).await.unwrap().is_none());
    let base = container.select(BASE_MODULE).unwrap();
    let same = base.get(&*CONFIG).await.unwrap();
    assert!(Arc::ptr_eq(&config, &same));
}

#[tokio::test]
async fn test_base_module_tracing() {
    let config = Config::parse(r#"{"tracing": {"level": "info", "directives": ["weld=debug"]}}"#)
        .unwrap();
    let container = Testing::create()
        .import(base_module(config))
        .compile()
        .await
        .unwrap();
    let installed = container.get(&*TRACING).await.unwrap().unwrap();
    assert_eq!(installed.default_level(), tracing::Level::INFO);
    installed.set_level(Some(tracing::Level::WARN)).unwrap();
    installed.set_level_str(Some("trace")).unwrap();
    assert!(installed.set_level_str(Some("loud")).is_err());
    installed.set_level(None).unwrap();
    // The global subscriber is already set, so a second install fails.
    assert!(Tracing::install(&TracingConfig::default()).is_err());
}

#[tokio::test]
async fn test_base_module_invalid_tracing() {
    let config = Config::parse(r#"{"tracing": {"level": "loud"}}"#).unwrap();
    let result = Testing::create().import(base_module(config)).compile().await;
    assert!(matches!(result, Err(InjectError::ProviderError { .. })));
}

#[tokio::test]
async fn test_tracing_config_defaults() {
    let config: TracingConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.level, tracing::Level::DEBUG);
    assert!(config.directives.is_empty());
    let serialized = serde_json::to_value(&config).unwrap();
    assert_eq!(serialized["level"], "DEBUG");
}
