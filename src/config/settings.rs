use crate::core::nodes::NodeOptions;
use crate::core::executor::DEFAULT_MAX_ITERATIONS;
use crate::domain::languages::is_valid_language_code;
use crate::utils::error::{LimanError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_positive_number, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Runtime settings loaded from a TOML file.
///
/// ```toml
/// [runtime]
/// debug = false
/// default_lang = "en"
/// fallback_lang = "en"
/// max_iterations = 50
///
/// [logging]
/// level = "info"
/// json = false
///
/// [specs]
/// paths = ["./specs"]
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub specs: SpecsSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub debug: bool,
    pub default_lang: String,
    pub fallback_lang: String,
    pub max_iterations: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            debug: false,
            default_lang: "en".to_string(),
            fallback_lang: "en".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecsSettings {
    pub paths: Vec<PathBuf>,
}

impl Default for SpecsSettings {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("./specs")],
        }
    }
}

fn env_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"))
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parses settings after replacing `${VAR}` with the environment value.
    /// Unknown variables are kept as written.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    fn substitute_env_vars(content: &str) -> String {
        env_var_re()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Applies `LIMAN_DEBUG`, `LIMAN_DEFAULT_LANG`, `LIMAN_FALLBACK_LANG`
    /// and `LIMAN_MAX_ITERATIONS`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("LIMAN_DEBUG") {
            self.runtime.debug = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var("LIMAN_DEFAULT_LANG") {
            self.runtime.default_lang = value;
        }
        if let Ok(value) = std::env::var("LIMAN_FALLBACK_LANG") {
            self.runtime.fallback_lang = value;
        }
        if let Ok(value) = std::env::var("LIMAN_MAX_ITERATIONS") {
            self.runtime.max_iterations = value.parse().map_err(|_| LimanError::Config {
                field: "runtime.max_iterations".to_string(),
                message: format!("LIMAN_MAX_ITERATIONS must be a number, got '{}'", value),
            })?;
        }
        Ok(())
    }

    /// Options for nodes built under these settings.
    pub fn node_options(&self) -> Result<NodeOptions> {
        NodeOptions::with_languages(&self.runtime.default_lang, &self.runtime.fallback_lang)
    }
}

impl FromStr for Settings {
    type Err = LimanError;

    fn from_str(content: &str) -> Result<Self> {
        Self::from_toml_str(content)
    }
}

fn validate_language(field_name: &str, value: &str) -> Result<()> {
    if !is_valid_language_code(value) {
        return Err(LimanError::Config {
            field: field_name.to_string(),
            message: format!("Unsupported language code '{}'", value),
        });
    }
    Ok(())
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_language("runtime.default_lang", &self.runtime.default_lang)?;
        validate_language("runtime.fallback_lang", &self.runtime.fallback_lang)?;
        validate_positive_number("runtime.max_iterations", self.runtime.max_iterations, 1)?;
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(LimanError::Config {
                field: "logging.level".to_string(),
                message: format!("Unknown log level '{}'", self.logging.level),
            });
        }

        if self.specs.paths.is_empty() {
            return Err(LimanError::Config {
                field: "specs.paths".to_string(),
                message: "At least one spec path is required".to_string(),
            });
        }
        for path in &self.specs.paths {
            validate_non_empty_string("specs.paths", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::languages::LanguageCode;

    #[test]
    fn test_defaults_for_missing_sections() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.runtime.max_iterations, 50);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_full_settings() {
        let settings: Settings = r#"
[runtime]
debug = true
default_lang = "ru"
fallback_lang = "en"
max_iterations = 10

[logging]
level = "debug"
json = true

[specs]
paths = ["./specs", "./more"]
"#
        .parse()
        .unwrap();

        assert!(settings.runtime.debug);
        assert_eq!(settings.runtime.max_iterations, 10);
        assert!(settings.logging.json);
        assert_eq!(settings.specs.paths.len(), 2);

        let options = settings.node_options().unwrap();
        assert_eq!(options.default_lang, LanguageCode::Ru);
        assert_eq!(options.fallback_lang, LanguageCode::En);
    }

    #[test]
    fn test_unknown_env_var_is_kept() {
        let settings = Settings::from_toml_str(
            r#"
[specs]
paths = ["${LIMAN_SETTINGS_TEST_UNSET_VAR}/specs"]
"#,
        )
        .unwrap();
        assert_eq!(
            settings.specs.paths[0],
            PathBuf::from("${LIMAN_SETTINGS_TEST_UNSET_VAR}/specs")
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut settings = Settings::default();
        settings.runtime.default_lang = "xx".to_string();
        let error = settings.validate().unwrap_err();
        assert_eq!(error.code(), "config_error");
        assert!(error.to_string().contains("runtime.default_lang"));

        let mut settings = Settings::default();
        settings.runtime.max_iterations = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.specs.paths.clear();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.logging.level = "loud".to_string();
        let error = settings.validate().unwrap_err();
        assert!(error.to_string().contains("logging.level"));
    }

    #[test]
    fn test_invalid_toml() {
        let error = Settings::from_toml_str("[runtime\n").unwrap_err();
        assert_eq!(error.code(), "toml_error");
    }
}
