use super::NodeBase;
use crate::core::functions::{FunctionRegistry, NodeFunction};
use crate::domain::languages::LanguageCode;
use crate::domain::model::{ExecutionContext, Message, ToolCall};
use crate::domain::spec::{NodeKind, ToolNodeSpec};
use crate::utils::error::{LimanError, Result};
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::warn;

pub const DEFAULT_TOOL_PROMPT_TEMPLATE: &str = "{name} - {description}\n{triggers}";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(name|description|triggers)\}").expect("valid placeholder regex"))
}

/// Tool exposed to LLM nodes. Invoking it calls the function named by `func`.
pub struct ToolNode {
    pub base: NodeBase,
    pub spec: ToolNodeSpec,
    func: Option<NodeFunction>,
}

impl fmt::Debug for ToolNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolNode")
            .field("base", &self.base)
            .field("spec", &self.spec)
            .field("func_set", &self.func.is_some())
            .finish()
    }
}

impl ToolNode {
    pub(super) fn new(spec: ToolNodeSpec, base: NodeBase) -> Self {
        Self {
            base,
            spec,
            func: None,
        }
    }

    /// Binds a function directly, bypassing the registry lookup of `func`.
    pub fn set_func<F, Fut>(&mut self, func: F)
    where
        F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.func = Some(Arc::new(move |args, ctx| Box::pin(func(args, ctx))));
    }

    pub fn compile(&self) -> Result<()> {
        self.base.mark_compiled(NodeKind::ToolNode)
    }

    fn fallback_lang(&self) -> LanguageCode {
        self.base.options.fallback_lang
    }

    fn prompt_template(&self, lang: LanguageCode) -> Result<String> {
        let Some(template) = &self.spec.tool_prompt_template else {
            return Ok(DEFAULT_TOOL_PROMPT_TEMPLATE.to_string());
        };

        for (code, label) in [(lang, "language"), (self.fallback_lang(), "fallback language")] {
            if let Some(value) = template.get(code) {
                return value.as_str().map(str::to_string).ok_or_else(|| {
                    LimanError::invalid_spec(format!(
                        "Tool prompt template for {} '{}' must be a string",
                        label, code
                    ))
                });
            }
        }
        Ok(DEFAULT_TOOL_PROMPT_TEMPLATE.to_string())
    }

    /// Description of the tool appended to the system prompt of LLM nodes.
    pub fn tool_description(&self, lang: LanguageCode) -> Result<String> {
        let template = self.prompt_template(lang)?;
        let fallback = self.fallback_lang();

        let description = self
            .spec
            .description
            .get_str_with_fallback(lang, fallback)
            .unwrap_or_default();

        let triggers = self
            .spec
            .triggers
            .iter()
            .flatten()
            .filter_map(|trigger| trigger.get_str_with_fallback(lang, fallback))
            .filter(|trigger| !trigger.trim().is_empty())
            .map(|trigger| format!("- {}", trigger))
            .collect::<Vec<_>>()
            .join("\n");

        // one pass, so placeholders inside substituted values stay literal
        let rendered = placeholder_re().replace_all(&template, |caps: &Captures| match &caps[1] {
            "name" => self.spec.name.clone(),
            "description" => description.to_string(),
            _ => triggers.clone(),
        });
        Ok(rendered.trim().to_string())
    }

    /// Function-calling schema of the tool. Uses the node's default language
    /// when `lang` is `None`.
    pub fn json_schema(&self, lang: Option<LanguageCode>) -> Result<Value> {
        let lang = lang.unwrap_or(self.base.options.default_lang);
        let fallback = self.fallback_lang();

        let description = self
            .spec
            .description
            .get_str_with_fallback(lang, fallback)
            .ok_or_else(|| {
                LimanError::invalid_spec(format!(
                    "Tool '{}' doesn't have a description",
                    self.spec.name
                ))
            })?;

        let mut args = Vec::new();
        for argument in self.spec.arguments.iter().flatten() {
            let arg_description = argument
                .description
                .get_str_with_fallback(lang, fallback)
                .ok_or_else(|| {
                    LimanError::invalid_spec(format!(
                        "Invalid description in tool specification: no value for argument '{}'",
                        argument.name
                    ))
                })?;

            match argument.arg_type.as_str() {
                "string" | "number" | "boolean" => {}
                "object" => {
                    return Err(LimanError::invalid_spec(
                        "Object type is not supported yet.",
                    ))
                }
                "array" => {
                    return Err(LimanError::invalid_spec("Array type is not supported yet."))
                }
                other => {
                    return Err(LimanError::invalid_spec(format!(
                        "Unsupported type in tool specification: {}",
                        other
                    )))
                }
            }

            args.push(json!({
                "name": argument.name,
                "description": arg_description,
                "optional": argument.optional,
                "type": argument.arg_type,
            }));
        }

        Ok(json!({
            "name": self.spec.name,
            "description": description,
            "args": args,
        }))
    }

    /// Only declared arguments are passed through. Without declared
    /// arguments the call arguments are passed as they are.
    fn call_args(&self, tool_call: &ToolCall) -> Result<Value> {
        let Some(arguments) = &self.spec.arguments else {
            return Ok(Value::Object(tool_call.args.clone()));
        };

        let mut args = Map::new();
        for argument in arguments {
            match tool_call.args.get(&argument.name) {
                Some(value) => {
                    args.insert(argument.name.clone(), value.clone());
                }
                None if argument.optional => {}
                None => {
                    return Err(LimanError::generic(format!(
                        "Required parameter is missing: '{}'",
                        argument.name
                    )))
                }
            }
        }
        Ok(Value::Object(args))
    }

    /// Runs the tool. Failures of the function itself are reported back to
    /// the model inside the tool message.
    pub async fn invoke(
        &self,
        functions: &FunctionRegistry,
        tool_call: &ToolCall,
        ctx: ExecutionContext,
    ) -> Result<Message> {
        let args = self.call_args(tool_call)?;
        let func = match (&self.func, &self.spec.func) {
            (Some(func), _) => func.clone(),
            (None, Some(name)) => functions.resolve(name)?,
            (None, None) => {
                return Err(LimanError::generic(format!(
                    "func is not set for the ToolNode '{}'",
                    self.spec.name
                )))
            }
        };

        let content = match func(args, ctx).await {
            Ok(Value::String(text)) => text,
            Ok(value) => value.to_string(),
            Err(e) => {
                warn!("Tool '{}' failed: {}", self.spec.name, e);
                e.to_string()
            }
        };

        Ok(Message::Tool {
            content,
            name: self.spec.name.clone(),
            tool_call_id: tool_call.id.clone(),
        })
    }
}
