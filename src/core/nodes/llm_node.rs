use super::NodeBase;
use crate::core::registry::Registry;
use crate::domain::languages::LanguageCode;
use crate::domain::model::Message;
use crate::domain::ports::ChatModel;
use crate::domain::spec::{LlmNodeSpec, NodeKind};
use crate::utils::error::{LimanError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Node backed by a chat model.
///
/// ```yaml
/// kind: LLMNode
/// name: StartNode
/// prompts:
///   system:
///     en: You are a helpful assistant.
///     ru: Вы помощник.
/// tools:
///   - get_weather
/// ```
///
/// Compiling resolves the tools and appends their descriptions to the system
/// prompt of every language the prompts are given in.
#[derive(Debug)]
pub struct LlmNode {
    pub base: NodeBase,
    pub spec: LlmNodeSpec,
    system_prompts: OnceLock<BTreeMap<LanguageCode, String>>,
}

impl LlmNode {
    pub(super) fn new(spec: LlmNodeSpec, base: NodeBase) -> Self {
        Self {
            base,
            spec,
            system_prompts: OnceLock::new(),
        }
    }

    pub fn compile(&self, registry: &Registry) -> Result<()> {
        self.base.ensure_not_compiled(NodeKind::LlmNode)?;

        let languages: Vec<LanguageCode> = self.spec.prompts.languages().collect();
        let mut prompts: BTreeMap<LanguageCode, String> = languages
            .iter()
            .map(|lang| (*lang, self.system_prompt_source(*lang)))
            .collect();

        let mut tool_descriptions: BTreeMap<LanguageCode, Vec<String>> = BTreeMap::new();
        for tool_name in &self.spec.tools {
            let tool = registry.lookup_tool(tool_name.trim())?;
            for lang in &languages {
                tool_descriptions
                    .entry(*lang)
                    .or_default()
                    .push(tool.tool_description(*lang)?);
            }
        }

        for (lang, descriptions) in tool_descriptions {
            if descriptions.is_empty() {
                continue;
            }
            let prompt = prompts.entry(lang).or_default();
            prompt.push('\n');
            prompt.push_str(&descriptions.join("\n"));
        }

        // prompts are in place before the node reports itself compiled
        self.system_prompts
            .set(prompts)
            .map_err(|_| LimanError::generic(format!("{} is already compiled", NodeKind::LlmNode)))?;
        self.base.mark_compiled(NodeKind::LlmNode)?;
        debug!("Compiled LLMNode '{}' with {} tool(s)", self.spec.name, self.spec.tools.len());
        Ok(())
    }

    /// System prompt as written in the manifest, before tools are appended.
    fn system_prompt_source(&self, lang: LanguageCode) -> String {
        match self.spec.prompts.get(lang) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Object(map)) => map
                .get("system")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }

    fn compiled_prompts(&self) -> Result<&BTreeMap<LanguageCode, String>> {
        self.system_prompts.get().ok_or_else(|| {
            LimanError::generic("LLMNode must be compiled before invoking. Use `compile()` method.")
        })
    }

    pub fn system_message(&self, lang: LanguageCode) -> Result<Message> {
        let prompts = self.compiled_prompts()?;
        let fallback = self.base.options.fallback_lang;
        prompts
            .get(&lang)
            .or_else(|| prompts.get(&fallback))
            .map(|text| Message::system(text.clone()))
            .ok_or_else(|| {
                LimanError::localization(format!(
                    "No system prompt for language '{}' or fallback language '{}'",
                    lang, fallback
                ))
            })
    }

    pub async fn invoke(
        &self,
        registry: &Registry,
        llm: &dyn ChatModel,
        inputs: &[Message],
        lang: Option<LanguageCode>,
    ) -> Result<Message> {
        let lang = lang.unwrap_or(self.base.options.default_lang);
        let system_message = self.system_message(lang)?;

        let mut tools = Vec::with_capacity(self.spec.tools.len());
        for tool_name in &self.spec.tools {
            let tool = registry.lookup_tool(tool_name.trim())?;
            tools.push(tool.json_schema(Some(lang))?);
        }

        let mut messages = Vec::with_capacity(inputs.len() + 1);
        messages.push(system_message);
        messages.extend_from_slice(inputs);

        llm.invoke(&messages, &tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nodes::{Node, NodeOptions};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        calls: Mutex<Vec<(Vec<Message>, Vec<Value>)>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn invoke(&self, messages: &[Message], tools: &[Value]) -> Result<Message> {
            self.calls
                .lock()
                .unwrap()
                .push((messages.to_vec(), tools.to_vec()));
            Ok(Message::ai("done"))
        }
    }

    fn registry_with_tool() -> Registry {
        let mut registry = Registry::new();
        registry
            .load_value(
                json!({
                    "kind": "ToolNode",
                    "name": "get_weather",
                    "description": {"en": "Weather lookup", "ru": "Погода"},
                    "arguments": [{"name": "city", "type": "string", "description": "city"}]
                }),
                NodeOptions::default(),
            )
            .unwrap();
        registry
    }

    fn llm_node(registry: &mut Registry) -> Arc<Node> {
        registry
            .load_value(
                json!({
                    "kind": "LLMNode",
                    "name": "chat",
                    "prompts": {"system": {"en": "You are helpful.", "ru": "Вы помощник."}},
                    "tools": ["get_weather"]
                }),
                NodeOptions::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_compile_appends_tool_descriptions() {
        let mut registry = registry_with_tool();
        let node = llm_node(&mut registry);
        node.compile(&registry).unwrap();

        let Node::Llm(llm) = node.as_ref() else {
            panic!("expected LLM node");
        };
        assert_eq!(
            llm.system_message(LanguageCode::En).unwrap(),
            Message::system("You are helpful.\nget_weather - Weather lookup")
        );
        assert_eq!(
            llm.system_message(LanguageCode::Ru).unwrap(),
            Message::system("Вы помощник.\nget_weather - Погода")
        );
        // falls back to English
        assert_eq!(
            llm.system_message(LanguageCode::De).unwrap().content(),
            "You are helpful.\nget_weather - Weather lookup"
        );
    }

    #[test]
    fn test_compile_requires_tools() {
        let mut registry = Registry::new();
        let node = llm_node(&mut registry);
        let error = node.compile(&registry).unwrap_err();
        assert_eq!(error.code(), "component_not_found");
        assert!(!node.is_compiled());
    }

    #[test]
    fn test_compiled_node_always_has_prompts() {
        let mut registry = registry_with_tool();
        let node = llm_node(&mut registry);
        let Node::Llm(llm) = node.as_ref() else {
            panic!("expected LLM node");
        };

        let compiled = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let result = llm.compile(&registry);
                        if llm.base.is_compiled() {
                            assert!(llm.system_message(LanguageCode::En).is_ok());
                        }
                        result.is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(compiled, 1);
        assert!(node.is_compiled());
        let error = node.compile(&registry).unwrap_err();
        assert_eq!(error.to_string(), "LLMNode is already compiled");
    }

    #[test]
    fn test_system_message_requires_compile() {
        let mut registry = registry_with_tool();
        let node = llm_node(&mut registry);
        let Node::Llm(llm) = node.as_ref() else {
            panic!("expected LLM node");
        };
        assert!(llm.system_message(LanguageCode::En).is_err());
    }

    #[tokio::test]
    async fn test_invoke_passes_system_prompt_and_tools() {
        let mut registry = registry_with_tool();
        let node = llm_node(&mut registry);
        node.compile(&registry).unwrap();
        let Node::Llm(llm) = node.as_ref() else {
            panic!("expected LLM node");
        };

        let model = RecordingModel::default();
        let response = llm
            .invoke(&registry, &model, &[Message::human("Weather in Paris?")], None)
            .await
            .unwrap();
        assert_eq!(response, Message::ai("done"));

        let calls = model.calls.lock().unwrap();
        let (messages, tools) = &calls[0];
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], Message::System { .. }));
        assert_eq!(messages[1], Message::human("Weather in Paris?"));
        assert_eq!(tools[0]["name"], "get_weather");
    }
}
