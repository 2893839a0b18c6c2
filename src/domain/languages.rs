//! Language codes and localized values.
//!
//! Every user-facing text in a manifest (descriptions, prompts, triggers)
//! may be given either as a plain string or as a mapping keyed by language.
//! Language keys may appear at any depth of the mapping:
//!
//! ```yaml
//! prompts:
//!   system:
//!     en: You are a helpful assistant.
//!     ru: Вы полезный ассистент.
//! ```
//!
//! is normalized to `{en: {system: ...}, ru: {system: ...}}`.

use crate::utils::error::{LimanError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    #[default]
    En,
    Ru,
    Zh,
    Fr,
    De,
    Es,
    It,
    Pt,
    Ja,
    Ko,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 10] = [
        LanguageCode::En,
        LanguageCode::Ru,
        LanguageCode::Zh,
        LanguageCode::Fr,
        LanguageCode::De,
        LanguageCode::Es,
        LanguageCode::It,
        LanguageCode::Pt,
        LanguageCode::Ja,
        LanguageCode::Ko,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageCode::En => "en",
            LanguageCode::Ru => "ru",
            LanguageCode::Zh => "zh",
            LanguageCode::Fr => "fr",
            LanguageCode::De => "de",
            LanguageCode::Es => "es",
            LanguageCode::It => "it",
            LanguageCode::Pt => "pt",
            LanguageCode::Ja => "ja",
            LanguageCode::Ko => "ko",
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageCode {
    type Err = LimanError;

    fn from_str(s: &str) -> Result<Self> {
        LanguageCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| LimanError::localization(format!("Invalid language code: {}", s)))
    }
}

pub fn is_valid_language_code(code: &str) -> bool {
    code.parse::<LanguageCode>().is_ok()
}

/// Normalizes a nested mapping so that language codes become the top-level keys.
///
/// Keys without a language ancestor belong to `default_lang`.
pub fn normalize_localized(
    data: &Map<String, Value>,
    default_lang: LanguageCode,
) -> Result<BTreeMap<LanguageCode, Value>> {
    let mut result: BTreeMap<LanguageCode, Value> = BTreeMap::new();

    let mut stack: Vec<(Option<LanguageCode>, String, Value, Vec<String>)> = data
        .iter()
        .map(|(k, v)| (None, k.clone(), v.clone(), Vec::new()))
        .collect();

    while let Some((current_lang, key, value, path)) = stack.pop() {
        let (current_lang, sub_path) = match key.parse::<LanguageCode>() {
            Ok(code) => (Some(code), path),
            Err(_) => {
                let mut sub_path = path;
                sub_path.push(key);
                (current_lang, sub_path)
            }
        };
        let lang = current_lang.unwrap_or(default_lang);

        if sub_path.is_empty() && !value.is_object() {
            result.insert(lang, value);
            continue;
        }

        let entry = result
            .entry(lang)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(target) = entry else {
            return Err(LimanError::localization(format!(
                "Expected a dict for language '{}' but got a string instead.",
                lang
            )));
        };

        if let Value::Object(children) = value {
            for (sub_key, sub_value) in children {
                stack.push((Some(lang), sub_key, sub_value, sub_path.clone()));
            }
            continue;
        }

        let Some((last, parents)) = sub_path.split_last() else {
            continue;
        };

        let mut cursor = target;
        for segment in parents {
            cursor = match cursor
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()))
            {
                Value::Object(map) => map,
                _ => {
                    return Err(LimanError::localization(format!(
                        "Expected a dict at path {} but got a scalar",
                        sub_path.join(".")
                    )))
                }
            };
        }
        cursor.insert(last.clone(), value);
    }

    Ok(result)
}

/// A value given per language.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedValue {
    entries: BTreeMap<LanguageCode, Value>,
    source: Value,
}

impl LocalizedValue {
    pub fn from_value(source: Value, default_lang: LanguageCode) -> Result<Self> {
        let entries = match &source {
            Value::String(_) => BTreeMap::from([(default_lang, source.clone())]),
            Value::Object(map) => normalize_localized(map, default_lang)?,
            other => {
                return Err(LimanError::localization(format!(
                    "Localized value must be a string or a mapping, got {}",
                    other
                )))
            }
        };
        Ok(Self { entries, source })
    }

    /// Re-normalizes the original input with another default language.
    pub fn rebase(&mut self, default_lang: LanguageCode) -> Result<()> {
        *self = Self::from_value(std::mem::take(&mut self.source), default_lang)?;
        Ok(())
    }

    pub fn get(&self, lang: LanguageCode) -> Option<&Value> {
        self.entries.get(&lang)
    }

    pub fn get_with_fallback(&self, lang: LanguageCode, fallback: LanguageCode) -> Result<&Value> {
        self.get(lang).or_else(|| self.get(fallback)).ok_or_else(|| {
            LimanError::localization(format!(
                "No value for language '{}' or fallback language '{}'",
                lang, fallback
            ))
        })
    }

    /// Text for `lang`, falling back to `fallback`. Non-string entries are skipped.
    pub fn get_str_with_fallback(&self, lang: LanguageCode, fallback: LanguageCode) -> Option<&str> {
        self.get(lang)
            .and_then(Value::as_str)
            .or_else(|| self.get(fallback).and_then(Value::as_str))
    }

    pub fn languages(&self) -> impl Iterator<Item = LanguageCode> + '_ {
        self.entries.keys().copied()
    }
}

impl Serialize for LocalizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LocalizedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = Value::deserialize(deserializer)?;
        LocalizedValue::from_value(source, LanguageCode::default()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_language_codes() {
        assert!(is_valid_language_code("en"));
        assert!(is_valid_language_code("ko"));
        assert!(!is_valid_language_code("xx"));
        assert!(!is_valid_language_code("EN"));
        assert_eq!("ru".parse::<LanguageCode>().unwrap(), LanguageCode::Ru);
        assert_eq!(LanguageCode::Ja.to_string(), "ja");
    }

    #[test]
    fn test_normalize_top_level_languages() {
        let data = as_map(json!({"en": "Hello", "ru": "Привет"}));
        let result = normalize_localized(&data, LanguageCode::En).unwrap();
        assert_eq!(result[&LanguageCode::En], json!("Hello"));
        assert_eq!(result[&LanguageCode::Ru], json!("Привет"));
    }

    #[test]
    fn test_normalize_nested_languages() {
        let data = as_map(json!({
            "system": {"en": "You are helpful", "ru": "Вы полезны"},
            "greeting": "Hi"
        }));
        let result = normalize_localized(&data, LanguageCode::En).unwrap();
        assert_eq!(
            result[&LanguageCode::En],
            json!({"system": "You are helpful", "greeting": "Hi"})
        );
        assert_eq!(result[&LanguageCode::Ru], json!({"system": "Вы полезны"}));
    }

    #[test]
    fn test_normalize_uses_default_language() {
        let data = as_map(json!({"system": "Bonjour"}));
        let result = normalize_localized(&data, LanguageCode::Fr).unwrap();
        assert_eq!(result[&LanguageCode::Fr], json!({"system": "Bonjour"}));
        assert!(!result.contains_key(&LanguageCode::En));
    }

    #[test]
    fn test_normalize_conflict_is_error() {
        // "en" is visited first and holds a string, the nested key then conflicts
        let data = as_map(json!({"a_section": {"en": "nested"}, "en": "plain"}));
        let error = normalize_localized(&data, LanguageCode::En).unwrap_err();
        assert_eq!(error.code(), "localization_error");
    }

    #[test]
    fn test_localized_value_from_string() {
        let value: LocalizedValue = serde_json::from_value(json!("Get weather")).unwrap();
        assert_eq!(value.get(LanguageCode::En), Some(&json!("Get weather")));
        assert_eq!(value.get_str_with_fallback(LanguageCode::Ru, LanguageCode::En), Some("Get weather"));
    }

    #[test]
    fn test_localized_value_rebase() {
        let mut value: LocalizedValue = serde_json::from_value(json!("Получить погоду")).unwrap();
        value.rebase(LanguageCode::Ru).unwrap();
        assert!(value.get(LanguageCode::En).is_none());
        assert_eq!(value.get_str_with_fallback(LanguageCode::Ru, LanguageCode::En), Some("Получить погоду"));
    }

    #[test]
    fn test_localized_value_fallback() {
        let value: LocalizedValue =
            serde_json::from_value(json!({"en": "Weather", "de": "Wetter"})).unwrap();
        assert_eq!(
            value
                .get_with_fallback(LanguageCode::Ja, LanguageCode::De)
                .unwrap(),
            &json!("Wetter")
        );
        assert!(value
            .get_with_fallback(LanguageCode::Ja, LanguageCode::Ko)
            .is_err());
    }

    #[test]
    fn test_localized_value_rejects_numbers() {
        let result: std::result::Result<LocalizedValue, _> = serde_json::from_value(json!(42));
        assert!(result.is_err());
    }
}
