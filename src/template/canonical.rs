//! Parameter canonicalization
//!
//! Catalog parameter lists are often redundant: the same argument is declared
//! twice under different names, or a generic `value` shadows a specifically
//! named numeric parameter. Canonicalization reduces a list to one parameter
//! per argument before resolution.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;

use crate::catalog::{is_number_marker, is_string_marker, CommandParam, ParamType};
use crate::template::ast::short_form;
use crate::template::grammar::split_template;
use crate::template::lexer::{lex_lenient, Token};
use crate::template::roles::is_structural_name;

/// Canonicalize the declared parameters of one command
///
/// Never fails. A malformed template contributes no path words.
pub fn canonicalize(raw: &[CommandParam], template: &str) -> Vec<CommandParam> {
    let mut seen = HashSet::new();
    let unique: Vec<&CommandParam> = raw.iter().filter(|p| seen.insert(p.key())).collect();

    let mut groups: IndexMap<Vec<String>, Vec<usize>> = IndexMap::new();
    for (i, param) in unique.iter().enumerate() {
        if !param.options.is_empty() {
            groups.entry(option_signature(&param.options)).or_default().push(i);
        }
    }

    let mut dropped = HashSet::new();
    for members in groups.values().filter(|m| m.len() > 1) {
        let keep = members
            .iter()
            .copied()
            .find(|&i| unique[i].position.is_some())
            .or_else(|| members.iter().copied().find(|&i| !unique[i].is_generic_value()))
            .unwrap_or(members[0]);
        dropped.extend(members.iter().copied().filter(|&i| i != keep));
    }

    let survivors: Vec<&CommandParam> = unique
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, p)| p)
        .collect();

    let words = path_words(template);
    let shadowed = survivors.iter().any(|p| {
        p.param_type == ParamType::Number
            && !p.is_generic_value()
            && !is_structural_name(&p.key())
            && words.contains(&p.key())
    });

    survivors
        .into_iter()
        .filter(|p| {
            !(shadowed
                && p.is_generic_value()
                && p.param_type == ParamType::Number
                && p.is_unconstrained())
        })
        .cloned()
        .collect()
}

/// Normalized option-set signature
///
/// Generic markers collapse to one token each so `<NR1>` and `<NR3>` lists
/// describe the same argument.
fn option_signature(options: &[String]) -> Vec<String> {
    let set: BTreeSet<String> = options
        .iter()
        .map(|o| {
            if is_number_marker(o) {
                "#number".to_string()
            } else if is_string_marker(o) {
                "#string".to_string()
            } else {
                o.trim().to_lowercase()
            }
        })
        .collect();
    set.into_iter().collect()
}

/// Lower-cased literal words of the header, in long and short form
fn path_words(template: &str) -> HashSet<String> {
    let (header, _) = split_template(template);
    let mut words = HashSet::new();
    for (tok, _) in lex_lenient(header) {
        if let Token::Word(word) = tok {
            words.insert(word.to_lowercase());
            words.insert(short_form(&word).to_lowercase());
        }
    }
    words
}
