use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LimanError {
    #[error("{message}")]
    Generic { message: String },

    #[error("{message}")]
    InvalidSpec { message: String },

    #[error("Component with key '{key}' not found in the registry")]
    ComponentNotFound { key: String },

    #[error("Component with key '{key}' already exists in the registry")]
    ComponentAlreadyExists { key: String },

    #[error("Field '{field}' already exists in {kind} spec")]
    PluginFieldConflict { field: String, kind: String },

    #[error("Kind is already registered: {kind}")]
    PluginKindConflict { kind: String },

    #[error("Localization error: {message}")]
    Localization { message: String },

    #[error("Parse error for input \"{input}\": {message}")]
    Parse { input: String, message: String },

    #[error("{message}")]
    Evaluation { message: String },

    #[error("Variable '{name}' not found in {scope}")]
    VariableNotFound { name: String, scope: String },

    #[error("{message}")]
    NodeActor {
        message: String,
        actor_id: Uuid,
        composite_id: String,
        node_kind: String,
        node_name: String,
        execution_id: Option<Uuid>,
    },

    #[error("Execution failed: {message}")]
    Executor { message: String },

    #[error("State storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error in '{field}': {message}")]
    Config { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl LimanError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    pub fn localization(message: impl Into<String>) -> Self {
        Self::Localization {
            message: message.into(),
        }
    }

    /// Stable machine-readable code of the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Generic { .. } => "liman_error",
            Self::InvalidSpec { .. } => "invalid_spec",
            Self::ComponentNotFound { .. } => "component_not_found",
            Self::ComponentAlreadyExists { .. } => "component_already_exists",
            Self::PluginFieldConflict { .. } => "plugin_field_conflict",
            Self::PluginKindConflict { .. } => "plugin_kind_conflict",
            Self::Localization { .. } => "localization_error",
            Self::Parse { .. } => "parse_error",
            Self::Evaluation { .. } => "evaluation_error",
            Self::VariableNotFound { .. } => "variable_not_found",
            Self::NodeActor { .. } => "node_actor_error",
            Self::Executor { .. } => "executor_error",
            Self::Storage { .. } => "storage_error",
            Self::Config { .. } => "config_error",
            Self::Io(_) => "io_error",
            Self::Yaml(_) => "yaml_error",
            Self::Json(_) => "json_error",
            Self::Toml(_) => "toml_error",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::VariableNotFound { .. } | Self::Evaluation { .. } => ErrorSeverity::Low,
            Self::NodeActor { .. } | Self::Executor { .. } => ErrorSeverity::Medium,
            Self::Io(_) | Self::Storage { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InvalidSpec { .. } | Self::Yaml(_) | Self::Json(_) => {
                "Check the component manifest against the expected kind schema"
            }
            Self::ComponentNotFound { .. } => {
                "Make sure the referenced component is loaded into the registry before use"
            }
            Self::ComponentAlreadyExists { .. } => "Give every component a unique kind/name pair",
            Self::PluginFieldConflict { .. } | Self::PluginKindConflict { .. } => {
                "Rename the plugin field or kind so it does not clash with core kinds"
            }
            Self::Localization { .. } => {
                "Provide the value for the requested language or for the fallback language"
            }
            Self::Parse { .. } => "Fix the `when` expression syntax of the edge",
            Self::Evaluation { .. } | Self::VariableNotFound { .. } => {
                "Make sure every variable used by the condition is present in the node state"
            }
            Self::NodeActor { .. } | Self::Executor { .. } => {
                "Inspect the node actor logs for the failing execution"
            }
            Self::Config { .. } | Self::Toml(_) => "Check the settings file and LIMAN_* variables",
            Self::Io(_) | Self::Storage { .. } => "Check file paths and permissions",
            Self::Generic { .. } => "See the error message for details",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }
}

pub type Result<T> = std::result::Result<T, LimanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LimanError::invalid_spec("bad").code(), "invalid_spec");
        assert_eq!(
            LimanError::ComponentNotFound {
                key: "ToolNode:x".to_string()
            }
            .code(),
            "component_not_found"
        );
        assert_eq!(LimanError::generic("oops").code(), "liman_error");
    }

    #[test]
    fn test_error_messages() {
        let error = LimanError::invalid_spec("Invalid specification");
        assert_eq!(error.to_string(), "Invalid specification");

        let error = LimanError::ComponentNotFound {
            key: "LLMNode:chat".to_string(),
        };
        assert!(error.to_string().contains("not found in the registry"));
        assert!(error
            .user_friendly_message()
            .starts_with("[component_not_found]"));
    }

    #[test]
    fn test_severity() {
        assert_eq!(
            LimanError::evaluation("x").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            LimanError::invalid_spec("x").severity(),
            ErrorSeverity::High
        );
    }
}
