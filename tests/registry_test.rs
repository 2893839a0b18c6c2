use liman_core::domain::spec::NodeKind;
use liman_core::{Node, NodeOptions, Registry};
use std::fs;
use tempfile::TempDir;

const TOOL_YAML: &str = r#"
kind: ToolNode
name: get_weather
description:
  en: Returns the current weather for a city
  ru: Возвращает текущую погоду в городе
func: lib.tools.get_weather
arguments:
  - name: city
    type: string
    description: City name
triggers:
  - What is the weather in Paris?
"#;

const LLM_YAML: &str = r#"
kind: LLMNode
name: assistant
prompts:
  system:
    en: You are a weather assistant.
    ru: Вы помощник по погоде.
tools:
  - get_weather
"#;

fn write_specs() -> TempDir {
    let dir = TempDir::new().unwrap();
    // loaded in file name order, so the tool is registered before the LLM node
    fs::write(dir.path().join("01_tool.yaml"), TOOL_YAML).unwrap();
    fs::write(dir.path().join("02_llm.yml"), LLM_YAML).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a manifest").unwrap();
    dir
}

#[test]
fn test_load_dir_and_compile() {
    let dir = write_specs();
    let mut registry = Registry::new();
    let nodes = registry
        .load_dir(dir.path(), &NodeOptions::default().strict(true))
        .unwrap();

    assert_eq!(nodes.len(), 2);
    assert_eq!(registry.len(), 2);
    registry.compile_all().unwrap();

    let llm = registry.lookup(NodeKind::LlmNode, "assistant").unwrap();
    assert!(llm.is_compiled());
    assert!(llm.is_llm_node());

    let tool = registry.lookup_tool("get_weather").unwrap();
    let schema = tool.json_schema(None).unwrap();
    assert_eq!(schema["name"], "get_weather");
    assert_eq!(schema["args"][0]["name"], "city");
}

#[test]
fn test_duplicate_file_is_rejected() {
    let dir = write_specs();
    let mut registry = Registry::new();
    registry
        .load_yaml_path(dir.path().join("01_tool.yaml"))
        .unwrap();
    let error = registry
        .load_yaml_path(dir.path().join("01_tool.yaml"))
        .unwrap_err();
    assert_eq!(error.code(), "component_already_exists");
}

#[test]
fn test_strict_loading_rejects_unknown_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tool.yaml");
    fs::write(&path, format!("{}\nretries: 3\n", TOOL_YAML)).unwrap();

    let mut registry = Registry::new();
    let error = registry.load_yaml_path(&path).unwrap_err();
    assert_eq!(error.code(), "invalid_spec");
    assert!(registry.is_empty());
}

#[test]
fn test_default_language_option() {
    let registry = Registry::new();
    let options = NodeOptions::with_languages("ru", "en").unwrap();
    let node = Node::from_value(
        serde_json::json!({
            "kind": "ToolNode",
            "name": "ping",
            "description": "Проверка связи"
        }),
        options,
        &registry,
    )
    .unwrap();

    let printed = node.print_spec(false).unwrap();
    assert!(printed.contains("ru: Проверка связи"));
}

#[test]
fn test_print_specs_initial() {
    let dir = write_specs();
    let mut registry = Registry::new();
    registry
        .load_dir(dir.path(), &NodeOptions::default())
        .unwrap();

    let printed = registry.print_specs(true).unwrap();
    assert!(printed.contains("kind: ToolNode"));
    assert!(printed.contains("kind: LLMNode"));
    assert!(printed.contains("---"));
}
