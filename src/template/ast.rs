//! Syntax tree for parsed command headers

pub use crate::error::Span;

/// A parsed command header such as `TRIGger:{A|B}:EDGE:SOUrce` or `*IDN?`
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub parts: Vec<Part>,
    /// Header ends in the query marker `?`
    pub query: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Mnemonic(Mnemonic),
    Choice(ChoiceGroup),
    Separator,
}

/// One mnemonic node, optionally carrying an index placeholder and a suffix
#[derive(Debug, Clone, PartialEq)]
pub struct Mnemonic {
    pub word: String,
    pub indexed: bool,
    pub suffix: Option<Suffix>,
    pub span: Span,
}

/// Trailing suffix of an indexed mnemonic, e.g. the `_D<x>` in `CH<x>_D<x>`
#[derive(Debug, Clone, PartialEq)]
pub struct Suffix {
    pub word: String,
    pub indexed: bool,
}

/// `{opt1|opt2|...}`: exactly one option is selected during resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceGroup {
    pub options: Vec<Mnemonic>,
    pub span: Span,
}

impl Mnemonic {
    /// A plain literal word: no index placeholder and no suffix
    pub fn is_literal(&self) -> bool {
        !self.indexed && self.suffix.is_none()
    }
}

impl ChoiceGroup {
    /// Two-element groups such as `{ON|OFF}` or `{1|0}`
    pub fn is_boolean_like(&self) -> bool {
        self.options.len() == 2
            && self
                .options
                .iter()
                .all(|o| o.is_literal() && option_truth(&o.word).is_some())
    }
}

impl Header {
    /// All literal mnemonic words in the header, including choice options
    pub fn words(&self) -> impl Iterator<Item = &Mnemonic> {
        self.parts.iter().flat_map(|part| match part {
            Part::Mnemonic(m) => std::slice::from_ref(m).iter(),
            Part::Choice(group) => group.options.iter(),
            Part::Separator => [].iter(),
        })
    }

    /// Words that carry an index placeholder anywhere in the header
    pub fn indexed_words(&self) -> impl Iterator<Item = &str> {
        self.words().filter(|m| m.indexed).map(|m| m.word.as_str())
    }

    /// Whether any mnemonic carries an indexed suffix (`_D<x>`)
    pub fn has_suffix_index(&self) -> bool {
        self.words()
            .any(|m| m.suffix.as_ref().is_some_and(|s| s.indexed))
    }
}

/// SCPI short form of a mnemonic: its upper-case prefix (`SCAle` -> `SCA`)
///
/// Words without any upper-case prefix are their own short form.
pub fn short_form(word: &str) -> &str {
    let end = word
        .char_indices()
        .find(|(_, c)| c.is_ascii_lowercase())
        .map(|(i, _)| i)
        .unwrap_or(word.len());
    if end == 0 {
        word
    } else {
        &word[..end]
    }
}

/// SCPI-aware equality: long or short form, case-insensitively
pub fn scpi_eq(option: &str, value: &str) -> bool {
    let value = value.trim().trim_matches('"');
    value.eq_ignore_ascii_case(option) || value.eq_ignore_ascii_case(short_form(option))
}

/// Truth value of a boolean-like option literal
pub fn option_truth(word: &str) -> Option<bool> {
    match word.to_ascii_uppercase().as_str() {
        "ON" | "1" => Some(true),
        "OFF" | "0" => Some(false),
        _ => None,
    }
}
