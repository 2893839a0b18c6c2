use liman_core::domain::spec::NodeKind;
use liman_core::utils::validation::Validate;
use liman_core::{Executor, InMemoryStateStorage, NodeActor, Registry, Settings};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

// Only this test binary touches LIMAN_* variables, and only in this test.
#[test]
fn test_file_substitution_and_env_overrides() {
    std::env::set_var("LIMAN_TEST_SPECS_DIR", "/opt/liman/specs");
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[runtime]
default_lang = "en"
max_iterations = 20

[specs]
paths = ["${LIMAN_TEST_SPECS_DIR}"]
"#,
    )
    .unwrap();

    let mut settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.specs.paths[0].to_str(), Some("/opt/liman/specs"));
    assert_eq!(settings.runtime.max_iterations, 20);

    std::env::set_var("LIMAN_MAX_ITERATIONS", "7");
    std::env::set_var("LIMAN_DEFAULT_LANG", "ru");
    std::env::set_var("LIMAN_DEBUG", "true");
    settings.apply_env_overrides().unwrap();
    assert_eq!(settings.runtime.max_iterations, 7);
    assert_eq!(settings.runtime.default_lang, "ru");
    assert!(settings.runtime.debug);
    assert!(settings.validate().is_ok());

    std::env::set_var("LIMAN_MAX_ITERATIONS", "many");
    let error = settings.apply_env_overrides().unwrap_err();
    assert_eq!(error.code(), "config_error");

    for var in [
        "LIMAN_TEST_SPECS_DIR",
        "LIMAN_MAX_ITERATIONS",
        "LIMAN_DEFAULT_LANG",
        "LIMAN_DEBUG",
    ] {
        std::env::remove_var(var);
    }
}

#[test]
fn test_missing_file() {
    let error = Settings::from_file("/nonexistent/liman.toml").unwrap_err();
    assert_eq!(error.code(), "io_error");
}

#[tokio::test]
async fn test_max_iterations_setting_limits_executor() {
    let settings: Settings = "[runtime]\nmax_iterations = 2\n".parse().unwrap();

    let mut registry = Registry::new();
    registry
        .load_value(
            json!({
                "kind": "FunctionNode",
                "name": "looping",
                "func": "lib.flow.identity",
                "nodes": [{"target": "looping"}]
            }),
            settings.node_options().unwrap(),
        )
        .unwrap();
    registry
        .functions_mut()
        .register("lib.flow.identity", |input: Value, _ctx| async move { Ok(input) })
        .unwrap();
    let registry = Arc::new(registry);

    let node = registry.lookup(NodeKind::FunctionNode, "looping").unwrap();
    let actor = NodeActor::create(node, Arc::clone(&registry), None).unwrap();
    let mut executor = Executor::new(
        Arc::clone(&registry),
        Arc::new(InMemoryStateStorage::new()),
        actor,
        None,
    )
    .with_max_iterations(settings.runtime.max_iterations);

    let input = executor.input(json!({}));
    let error = executor.run(input).await.unwrap_err();
    assert_eq!(error.code(), "executor_error");
    assert_eq!(executor.state().iteration_count, 2);
}
