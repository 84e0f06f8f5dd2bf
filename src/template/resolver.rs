//! Template resolution: template + canonical params + bindings → command text

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::catalog::{is_number_marker, is_string_marker, CommandParam, ParamType};
use crate::error::TemplateError;
use crate::model::binding::{normalize_key, Companion, ParameterBinding};
use crate::template::ast::{option_truth, scpi_eq, short_form, ChoiceGroup, Header, Mnemonic, Part};
use crate::template::grammar::{parse_header, split_template};
use crate::template::roles::{role_for_key, role_for_word, GENERIC_INDEX_KEYS};

static NAMED_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*([A-Za-z_][A-Za-z0-9_\- ]*?)\s*\}").expect("valid regex"));

static FLOAT_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.\d*|\.\d+|\d+(\.\d*)?[eE][+-]?\d+)$").expect("valid regex")
});

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

static ARGUMENT_CHOICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{([^{}]*\|[^{}]*)\}$").expect("valid regex"));

static ALPHA_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_]+").expect("valid regex"));

const CUSTOM_SENTINEL: &str = "CUSTOM";
const CUSTOM_SEGMENT: &str = ":CUSTom";

/// A fully resolved command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Concrete header, including a trailing `?` for query templates
    pub header: String,
    pub arguments: Vec<String>,
    /// Separator used between arguments (`,` when the template declares it)
    pub separator: String,
}

impl ResolvedCommand {
    pub fn is_query(&self) -> bool {
        self.header.ends_with('?')
    }

    fn bare_header(&self) -> &str {
        self.header.trim_end_matches('?')
    }

    /// Value-bearing form; never ends in `?`
    pub fn write_form(&self) -> String {
        if self.arguments.is_empty() {
            self.bare_header().to_string()
        } else {
            format!(
                "{} {}",
                self.bare_header(),
                self.arguments.join(&self.separator)
            )
        }
    }

    /// Header-only query form
    pub fn query_form(&self) -> String {
        format!("{}?", self.bare_header())
    }
}

impl fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_query() {
            write!(f, "{}", self.header)
        } else {
            write!(f, "{}", self.write_form())
        }
    }
}

/// Resolve a template against canonical parameters and bindings
pub fn resolve(
    template: &str,
    params: &[CommandParam],
    bindings: &ParameterBinding,
) -> Result<String, TemplateError> {
    Resolver::new(params, bindings)
        .resolve_command(template)
        .map(|c| c.to_string())
}

/// Resolution context for one command
pub struct Resolver<'a> {
    params: &'a [CommandParam],
    bindings: &'a ParameterBinding,
}

impl<'a> Resolver<'a> {
    pub fn new(params: &'a [CommandParam], bindings: &'a ParameterBinding) -> Self {
        Self { params, bindings }
    }

    /// Resolve into a structured command
    ///
    /// Missing bindings never fail: defaults apply and indices fall back to 1.
    pub fn resolve_command(&self, template: &str) -> Result<ResolvedCommand, TemplateError> {
        let mut consumed = HashSet::new();
        let substituted = self.substitute_named(template, &mut consumed);
        let (header_src, args_src) = split_template(&substituted);
        let header = parse_header(header_src)?;

        let mut text = String::new();
        for part in &header.parts {
            match part {
                Part::Separator => text.push(':'),
                Part::Mnemonic(m) => self.render_mnemonic(m, None, &mut text, &mut consumed),
                Part::Choice(group) => self.render_choice(group, &mut text, &mut consumed),
            }
        }

        let (arguments, separator) = if args_src.is_empty() {
            // Header-only templates take their arguments from the params,
            // minus values the resolved header already spells out
            let mut args = self.trailing_arguments(&header, &consumed, &mut text);
            args.retain(|arg| !spells_out(&text, arg));
            (args, " ".to_string())
        } else if is_literal_arguments(args_src) {
            (vec![args_src.to_string()], " ".to_string())
        } else {
            let separator = if args_src.contains(',') { "," } else { " " };
            let mut args = self.trailing_arguments(&header, &consumed, &mut text);
            self.fill_argument_choices(args_src, &mut args);
            (args, separator.to_string())
        };

        if header.query {
            text.push('?');
        }

        if let Some(marker) = text.chars().find(|c| matches!(c, '<' | '>' | '{' | '}' | '|')) {
            return Err(TemplateError::Unresolved {
                marker: marker.to_string(),
                command: text,
            });
        }

        Ok(ResolvedCommand {
            header: text,
            arguments,
            separator,
        })
    }

    /// Replace `{name}` placeholders that name a declared parameter or a bound key
    fn substitute_named(&self, template: &str, consumed: &mut HashSet<String>) -> String {
        NAMED_PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let key = normalize_key(&caps[1]);
                let known = self.bindings.contains(&key) || self.param(&key).is_some();
                match self.value_of(&key).filter(|_| known) {
                    Some(value) => {
                        consumed.insert(key);
                        value.into_owned()
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn render_mnemonic(
        &self,
        m: &Mnemonic,
        forced_index: Option<u32>,
        out: &mut String,
        consumed: &mut HashSet<String>,
    ) {
        out.push_str(&m.word);
        if m.indexed {
            let index = forced_index.unwrap_or_else(|| self.mnemonic_index(&m.word, consumed));
            out.push_str(&index.to_string());
        }
        if let Some(suffix) = &m.suffix {
            out.push_str(&suffix.word);
            if suffix.indexed {
                out.push_str(&self.suffix_index(consumed).to_string());
            }
        }
    }

    /// Binding names that may supply the index of `WORD<x>`, in priority order
    fn index_keys(word: &str) -> Vec<String> {
        let mut keys = vec![normalize_key(word)];
        if let Some(role) = role_for_word(word) {
            keys.extend(role.keys().map(str::to_string));
        }
        keys.extend(GENERIC_INDEX_KEYS.iter().map(|k| k.to_string()));
        keys
    }

    fn mnemonic_index(&self, word: &str, consumed: &mut HashSet<String>) -> u32 {
        let keys = Self::index_keys(word);
        consumed.extend(keys.iter().cloned());
        keys.iter()
            .filter_map(|key| self.value_of(key))
            .find_map(|value| extract_index(&value, 1))
            .unwrap_or(1)
    }

    fn suffix_index(&self, consumed: &mut HashSet<String>) -> u32 {
        let Some(role) = role_for_key("digital_bit") else {
            return 0;
        };
        consumed.extend(role.keys().map(str::to_string));
        role.keys()
            .filter_map(|key| self.value_of(key))
            .find_map(|value| extract_index(&value, 0))
            .unwrap_or(0)
    }

    fn render_choice(&self, group: &ChoiceGroup, out: &mut String, consumed: &mut HashSet<String>) {
        let values: Vec<(String, Cow<'_, str>)> = self.effective_values().collect();

        // Equality on long or short form
        for (key, value) in &values {
            if let Some(option) = group
                .options
                .iter()
                .find(|o| o.is_literal() && scpi_eq(&o.word, value))
            {
                consumed.insert(key.clone());
                out.push_str(&option.word);
                return;
            }
        }

        // Boolean words for ON|OFF and 1|0 groups
        if group.is_boolean_like() {
            for (key, value) in &values {
                let Some(truth) = boolean_word(key, value) else {
                    continue;
                };
                if let Some(option) = group
                    .options
                    .iter()
                    .find(|o| option_truth(&o.word) == Some(truth))
                {
                    consumed.insert(key.clone());
                    out.push_str(&option.word);
                    return;
                }
            }
        }

        // Indexed option whose word prefixes a bound role value (CH<x> vs "CH3")
        for (key, value) in &values {
            if role_for_key(key).is_none() {
                continue;
            }
            let Some(prefix) = ALPHA_PREFIX.find(value.trim()) else {
                continue;
            };
            let prefix = prefix.as_str();
            if let Some(option) = group.options.iter().find(|o| {
                o.indexed
                    && (o.word.eq_ignore_ascii_case(prefix)
                        || short_form(&o.word).eq_ignore_ascii_case(prefix))
            }) {
                consumed.insert(key.clone());
                let index = extract_index(value, 1);
                self.render_mnemonic(option, index, out, consumed);
                return;
            }
        }

        if let Some(first) = group.options.first() {
            self.render_mnemonic(first, None, out, consumed);
        }
    }

    fn trailing_arguments(
        &self,
        header: &Header,
        consumed: &HashSet<String>,
        text: &mut String,
    ) -> Vec<String> {
        // Role bindings for words that appear indexed count as placeholders
        let indexed_roles: HashSet<&str> = header
            .indexed_words()
            .filter_map(role_for_word)
            .flat_map(|role| role.keys())
            .collect();

        let mut ordered: Vec<&CommandParam> = self
            .params
            .iter()
            .filter(|p| {
                let key = p.key();
                !consumed.contains(&key) && !indexed_roles.contains(key.as_str())
            })
            .collect();
        ordered.sort_by_key(|p| p.position.unwrap_or(u32::MAX));

        let mut arguments: Vec<String> = Vec::new();
        let mut custom_segment = false;
        for param in ordered {
            let key = param.key();
            let Some(raw) = self.value_of(&key) else {
                continue;
            };
            let raw = raw.trim();
            let options = param.options_for(self.bindings);

            let value = if is_number_marker(raw) {
                match self.bindings.companion(&key, Companion::Number) {
                    Some(number) => number.trim().to_string(),
                    None => continue,
                }
            } else if is_string_marker(raw) {
                match self.bindings.companion(&key, Companion::Custom) {
                    Some(custom) => quote(custom.trim()),
                    None => continue,
                }
            } else if raw.eq_ignore_ascii_case(CUSTOM_SENTINEL) {
                match self.bindings.companion(&key, Companion::Custom) {
                    Some(custom) => {
                        if !custom_segment && !text.ends_with(CUSTOM_SEGMENT) {
                            text.push_str(CUSTOM_SEGMENT);
                            custom_segment = true;
                        }
                        custom.trim().to_string()
                    }
                    None => raw.to_string(),
                }
            } else {
                raw.to_string()
            };

            let value = if param.param_type == ParamType::Text
                && !is_quoted(&value)
                && !options.iter().any(|o| scpi_eq(o, &value))
            {
                quote(&value)
            } else {
                value
            };

            if arguments.iter().any(|a| a.eq_ignore_ascii_case(&value)) {
                continue;
            }
            arguments.push(value);
        }
        arguments
    }

    /// Argument-section choice groups no param answered get a bound or first option
    fn fill_argument_choices(&self, args_src: &str, arguments: &mut Vec<String>) {
        let slots: Vec<&str> = args_src.split(',').map(str::trim).collect();
        for (slot, segment) in slots.iter().enumerate() {
            if arguments.len() >= slots.len() {
                return;
            }
            let Some(caps) = ARGUMENT_CHOICE.captures(segment) else {
                continue;
            };
            let options: Vec<&str> = caps[1]
                .split('|')
                .map(str::trim)
                .filter(|o| !o.is_empty() && !o.starts_with('<'))
                .collect();
            if arguments
                .iter()
                .any(|a| options.iter().any(|o| scpi_eq(o, a)))
            {
                continue;
            }
            let bound = self
                .effective_values()
                .find_map(|(_, value)| options.iter().find(|o| scpi_eq(o, &value)).copied());
            if let Some(option) = bound.or_else(|| options.first().copied()) {
                arguments.insert(slot.min(arguments.len()), option.to_string());
            }
        }
    }

    fn param(&self, key: &str) -> Option<&CommandParam> {
        self.params.iter().find(|p| p.key() == key)
    }

    /// Bound value, else the declared default
    fn value_of(&self, key: &str) -> Option<Cow<'_, str>> {
        self.bindings
            .get(key)
            .map(Cow::Borrowed)
            .or_else(|| {
                self.param(key)
                    .and_then(|p| p.default.as_deref())
                    .map(Cow::Borrowed)
            })
            .filter(|v| !v.trim().is_empty())
    }

    /// Bindings followed by defaults of unbound parameters, companions excluded
    fn effective_values(&self) -> impl Iterator<Item = (String, Cow<'_, str>)> + '_ {
        let bound = self
            .bindings
            .iter()
            .filter(|(k, _)| !self.bindings.is_companion(k))
            .map(|(k, v)| (k.to_string(), Cow::Borrowed(v)));
        let defaults = self.params.iter().filter_map(|p| {
            let key = p.key();
            if self.bindings.contains(&key) {
                return None;
            }
            p.default
                .as_deref()
                .map(|d| (key, Cow::Borrowed(d)))
        });
        bound.chain(defaults)
    }
}

/// First embedded integer of a bound value, if it is a plausible index
fn extract_index(value: &str, min: u32) -> Option<u32> {
    let value = value.trim();
    if FLOAT_LITERAL.is_match(value) {
        return None;
    }
    FIRST_INTEGER
        .find(value)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| (min..=99).contains(n))
}

fn boolean_word(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" => Some(true),
        "off" | "false" => Some(false),
        "1" if key == "state" => Some(true),
        "0" if key == "state" => Some(false),
        _ => None,
    }
}

/// Argument section needs no rebuilding: it has no markers or choices
fn is_literal_arguments(args: &str) -> bool {
    !args.is_empty() && !args.contains(['<', '{', '|'])
}

/// `value` already appears as one of the header's mnemonics
fn spells_out(header: &str, value: &str) -> bool {
    let value = value.trim();
    header
        .trim_end_matches('?')
        .split(':')
        .any(|word| word.eq_ignore_ascii_case(value) || scpi_eq(word, value))
}

fn is_quoted(value: &str) -> bool {
    value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
}

fn quote(value: &str) -> String {
    if is_quoted(value) {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}
