//! Parameter bindings: normalized, insertion-ordered name → literal maps

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Normalize a parameter or binding name
///
/// Lower-cased, trimmed, with `-` and spaces turned into `_`.
pub fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Which companion binding supplies the concrete value behind a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Companion {
    /// `<name>_number` or `number`, for generic-number markers
    Number,
    /// `<name>_custom` or `custom`, for generic-string markers and `CUSTOM`
    Custom,
}

impl Companion {
    fn suffix(self) -> &'static str {
        match self {
            Companion::Number => "number",
            Companion::Custom => "custom",
        }
    }
}

/// Bound parameter values for one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, BindingValue>", into = "IndexMap<String, String>")]
pub struct ParameterBinding {
    values: IndexMap<String, String>,
}

/// Loose JSON literal accepted as a bound value
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    Text(String),
    Bool(bool),
    Number(serde_json::Number),
}

impl From<BindingValue> for String {
    fn from(value: BindingValue) -> Self {
        match value {
            BindingValue::Text(s) => s,
            BindingValue::Bool(true) => "ON".to_string(),
            BindingValue::Bool(false) => "OFF".to_string(),
            BindingValue::Number(n) => n.to_string(),
        }
    }
}

impl From<IndexMap<String, BindingValue>> for ParameterBinding {
    fn from(raw: IndexMap<String, BindingValue>) -> Self {
        raw.into_iter().collect()
    }
}

impl From<ParameterBinding> for IndexMap<String, String> {
    fn from(binding: ParameterBinding) -> Self {
        binding.values
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterBinding
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut binding = ParameterBinding::new();
        for (key, value) in iter {
            binding.insert(key.as_ref(), value);
        }
        binding
    }
}

impl ParameterBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value; a later value for the same normalized key replaces the earlier one
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(|s| s.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&normalize_key(key))
    }

    /// The companion value for a parameter, preferring `<name>_<kind>` over the bare kind
    pub fn companion(&self, param: &str, kind: Companion) -> Option<&str> {
        let specific = format!("{}_{}", normalize_key(param), kind.suffix());
        self.get(&specific)
            .or_else(|| self.get(kind.suffix()))
            .filter(|v| !v.trim().is_empty())
    }

    /// Whether a key only exists to supply a companion value
    ///
    /// The bare kind always does; `<name>_<kind>` only when `<name>` is bound too.
    pub fn is_companion(&self, key: &str) -> bool {
        let key = normalize_key(key);
        [Companion::Number, Companion::Custom].iter().any(|kind| {
            let suffix = kind.suffix();
            key == suffix
                || key
                    .strip_suffix(suffix)
                    .and_then(|rest| rest.strip_suffix('_'))
                    .is_some_and(|name| !name.is_empty() && self.contains(name))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
