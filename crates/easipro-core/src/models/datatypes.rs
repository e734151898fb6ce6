//! General-purpose FHIR datatypes.
//!
//! Unknown members are kept in `extra` so a resource fetched from the
//! scoring engine serializes back with everything it arrived with.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fhir_urls;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Coding {
    pub fn new(system: Option<&str>, code: &str, display: Option<&str>) -> Self {
        Self {
            system: system.map(str::to_string),
            code: Some(code.to_string()),
            display: display.map(str::to_string),
            ..Default::default()
        }
    }

    /// Human-readable label: display, falling back to the code.
    pub fn label(&self) -> &str {
        self.display
            .as_deref()
            .or(self.code.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A FHIR extension. The `value[x]` member is kept as raw JSON under its
/// FHIR name (`valueDecimal`, `valueDateTime`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl Extension {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, field: &str, value: Value) -> Self {
        self.value.insert(field.to_string(), value);
        self
    }

    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extension.push(extension);
        self
    }

    /// The `value[x]` member, if any, as `(field name, value)`.
    pub fn raw_value(&self) -> Option<(&str, &Value)> {
        self.value
            .iter()
            .find(|(k, _)| k.starts_with("value"))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric value, accepting decimal, integer, and numeric-string forms.
    pub fn value_decimal(&self) -> Option<f64> {
        let (_, value) = self.raw_value()?;
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn value_string(&self) -> Option<&str> {
        self.raw_value().and_then(|(_, v)| v.as_str())
    }

    pub fn matches(&self, url: &str) -> bool {
        fhir_urls::url_matches(&self.url, url)
    }

    pub fn sub_extension(&self, url: &str) -> Option<&Extension> {
        find_extension(&self.extension, url)
    }
}

pub fn find_extension<'a>(extensions: &'a [Extension], url: &str) -> Option<&'a Extension> {
    extensions.iter().find(|e| e.matches(url))
}
