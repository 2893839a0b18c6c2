use crate::utils::error::{LimanError, Result};
use regex::Regex;
use std::sync::OnceLock;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("valid identifier regex"))
}

fn dotted_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$")
            .expect("valid dotted name regex")
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LimanError::Config {
            field: field_name.to_string(),
            message: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(LimanError::Config {
            field: field_name.to_string(),
            message: format!("Value must be at least {}, got {}", min_value, value),
        });
    }
    Ok(())
}

/// Component names: letters, digits, `_` and `-`, not starting with a digit.
pub fn validate_identifier(field_name: &str, value: &str) -> Result<()> {
    if !identifier_re().is_match(value) {
        return Err(LimanError::invalid_spec(format!(
            "Invalid {}: '{}' is not a valid identifier",
            field_name, value
        )));
    }
    Ok(())
}

/// Function references such as `lib.tools.get_weather`.
pub fn validate_dotted_name(field_name: &str, value: &str) -> Result<()> {
    if !dotted_name_re().is_match(value) {
        return Err(LimanError::invalid_spec(format!(
            "Invalid {}: '{}' is not a dotted function reference",
            field_name, value
        )));
    }
    Ok(())
}
