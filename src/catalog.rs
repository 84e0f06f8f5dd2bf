//! Command template catalog
//!
//! A read-only map from command name to its template string, declared
//! parameters and kind. The catalog arrives pre-validated as JSON:
//!
//! ```text
//! { "commands": [
//!     { "name": "CH<x>:SCAle", "template": "CH<x>:SCAle <NR3>", "kind": "both",
//!       "params": [ { "name": "channel", "options": ["CH1", "CH2"] },
//!                   { "name": "value", "type": "number" } ] }
//! ] }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::model::binding::{normalize_key, ParameterBinding};

/// Errors that can occur when loading a catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Duplicate catalog command '{0}'")]
    Duplicate(String),
}

/// Generic-number markers: any numeric literal is acceptable
pub const NUMBER_MARKERS: &[&str] = &["<NR1>", "<NR2>", "<NR3>", "<NRF>", "<NRX>", "<NUMBER>"];

/// Generic-string markers: any quoted string is acceptable
pub const STRING_MARKERS: &[&str] = &["<QSTRING>", "<STRING>"];

pub fn is_number_marker(option: &str) -> bool {
    NUMBER_MARKERS.contains(&option.trim().to_ascii_uppercase().as_str())
}

pub fn is_string_marker(option: &str) -> bool {
    STRING_MARKERS.contains(&option.trim().to_ascii_uppercase().as_str())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Number,
    #[serde(alias = "enum")]
    Enumeration,
    #[default]
    #[serde(alias = "string")]
    Text,
}

/// One declared parameter of a catalog command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandParam {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default, deserialize_with = "literal_opt", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "literal_list", skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Name of the parameter whose bound value selects `conditional_values`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub conditional_values: IndexMap<String, Vec<String>>,
}

impl CommandParam {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            ..Self::default()
        }
    }

    pub fn with_options<S: Into<String>>(mut self, options: impl IntoIterator<Item = S>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    /// Parameter declared implicitly by a step binding with no catalog entry
    ///
    /// Numeric values become numbers; anything else is passed through
    /// unquoted as an enumeration word.
    pub fn from_binding(key: &str, value: &str) -> Self {
        let param_type = if value.trim().parse::<f64>().is_ok() {
            ParamType::Number
        } else {
            ParamType::Enumeration
        };
        Self::new(key, param_type)
    }

    /// Normalized parameter name
    pub fn key(&self) -> String {
        normalize_key(&self.name)
    }

    /// Options in effect under the given bindings
    ///
    /// When `depends_on` names a bound parameter whose value has an entry in
    /// `conditional_values`, that entry replaces the static option list.
    pub fn options_for<'a>(&'a self, bindings: &ParameterBinding) -> &'a [String] {
        let Some(controller) = &self.depends_on else {
            return &self.options;
        };
        let Some(selected) = bindings.get(controller) else {
            return &self.options;
        };
        self.conditional_values
            .iter()
            .find(|(value, _)| value.eq_ignore_ascii_case(selected.trim()))
            .map(|(_, options)| options.as_slice())
            .unwrap_or(&self.options)
    }

    /// Named generically `value`
    pub fn is_generic_value(&self) -> bool {
        self.key() == "value"
    }

    /// No options, or only generic-number markers
    pub fn is_unconstrained(&self) -> bool {
        self.options.iter().all(|o| is_number_marker(o))
    }
}

/// Whether a catalog command may be written, queried, or both
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    #[serde(alias = "set_only", alias = "write")]
    Set,
    #[serde(alias = "query_only")]
    Query,
    #[default]
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub kind: CommandKind,
    #[serde(default)]
    pub params: Vec<CommandParam>,
}

#[derive(Deserialize)]
struct CatalogFile {
    commands: Vec<CatalogEntry>,
}

/// Lookup table of catalog commands keyed by normalized name
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: IndexMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load a catalog from JSON text
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(content)?;
        let mut catalog = Catalog::new();
        for entry in file.commands {
            catalog.insert(entry)?;
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, entry: CatalogEntry) -> Result<(), CatalogError> {
        let key = catalog_key(&entry.name);
        if self.entries.contains_key(&key) {
            return Err(CatalogError::Duplicate(entry.name));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Find the entry for a step's command text
    ///
    /// Matches the command name or the template header, case-insensitively,
    /// ignoring a trailing query marker.
    pub fn lookup(&self, command: &str) -> Option<&CatalogEntry> {
        let key = catalog_key(command);
        self.entries.get(&key).or_else(|| {
            self.entries.values().find(|entry| {
                let (header, _) = crate::template::grammar::split_template(&entry.template);
                catalog_key(header) == key
            })
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }
}

fn catalog_key(command: &str) -> String {
    let (header, _) = crate::template::grammar::split_template(command);
    header.trim_end_matches('?').to_ascii_uppercase()
}

fn stringify(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Bool(true) => Some("ON".to_string()),
        serde_json::Value::Bool(false) => Some("OFF".to_string()),
        other => Some(other.to_string()),
    }
}

fn literal_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(stringify(value))
}

fn literal_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(values.into_iter().filter_map(stringify).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "commands": [
            {
                "name": "CH<x>:SCAle",
                "template": "CH<x>:SCAle <NR3>",
                "kind": "both",
                "params": [
                    { "name": "channel", "options": ["CH1", "CH2"] },
                    { "name": "value", "type": "number", "default": 1.0 }
                ]
            },
            { "name": "*IDN", "template": "*IDN?", "kind": "query" }
        ]
    }"#;

    #[test]
    fn test_load_catalog() {
        let catalog = Catalog::from_json(CATALOG).expect("Should parse");
        assert_eq!(catalog.len(), 2);
        let entry = catalog.lookup("ch<x>:scale").expect("Should find entry");
        assert_eq!(entry.kind, CommandKind::Both);
        assert_eq!(entry.params[1].default.as_deref(), Some("1.0"));
        assert_eq!(entry.params[0].param_type, ParamType::Text);
    }

    #[test]
    fn test_lookup_ignores_query_marker() {
        let catalog = Catalog::from_json(CATALOG).expect("Should parse");
        assert!(catalog.lookup("CH<x>:SCAle?").is_some());
        assert!(catalog.lookup("*IDN?").is_some());
        assert!(catalog.lookup("HORizontal:SCAle").is_none());
    }

    #[test]
    fn test_duplicate_command_is_rejected() {
        let json = r#"{"commands": [
            {"name": "A", "template": "A"},
            {"name": "a", "template": "A"}
        ]}"#;
        assert!(matches!(
            Catalog::from_json(json),
            Err(CatalogError::Duplicate(_))
        ));
    }

    #[test]
    fn test_markers() {
        assert!(is_number_marker("<NR1>"));
        assert!(is_number_marker("<NRf>"));
        assert!(is_string_marker("<QString>"));
        assert!(!is_number_marker("CH1"));
    }

    #[test]
    fn test_conditional_options() {
        let mut param = CommandParam::new("level", ParamType::Enumeration)
            .with_options(["LOW", "HIGH"]);
        param.depends_on = Some("mode".to_string());
        param
            .conditional_values
            .insert("ttl".to_string(), vec!["1.4".to_string()]);

        let ttl = ParameterBinding::new().with("mode", "TTL");
        let other = ParameterBinding::new().with("mode", "ECL");
        assert_eq!(param.options_for(&ttl), ["1.4".to_string()]);
        assert_eq!(param.options_for(&other), ["LOW".to_string(), "HIGH".to_string()]);
    }
}
