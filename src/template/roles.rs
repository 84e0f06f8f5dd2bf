//! Mnemonic roles: which binding supplies the index of an indexed mnemonic

/// A family of indexed mnemonics that share one binding name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MnemonicRole {
    /// Canonical binding name (`channel`, `source`, ...)
    pub name: &'static str,
    /// Additional binding names accepted for this role
    pub aliases: &'static [&'static str],
    /// Upper-case mnemonic words that belong to this role
    pub words: &'static [&'static str],
    /// Never treated as a textual match by the canonicalizer
    pub structural: bool,
}

pub const ROLES: &[MnemonicRole] = &[
    MnemonicRole { name: "channel", aliases: &["ch"], words: &["CH", "CHANNEL"], structural: true },
    MnemonicRole { name: "source", aliases: &[], words: &["SOURCE", "SOU", "SOUR"], structural: true },
    MnemonicRole { name: "math", aliases: &[], words: &["MATH"], structural: true },
    MnemonicRole { name: "bus", aliases: &[], words: &["B", "BUS"], structural: true },
    MnemonicRole { name: "reference", aliases: &["ref"], words: &["REF", "REFERENCE"], structural: true },
    MnemonicRole { name: "measurement", aliases: &["meas"], words: &["MEAS", "MEASUREMENT"], structural: true },
    MnemonicRole { name: "cursor", aliases: &[], words: &["CURSOR", "CURS"], structural: true },
    MnemonicRole { name: "search", aliases: &[], words: &["SEARCH"], structural: true },
    MnemonicRole { name: "zoom", aliases: &[], words: &["ZOOM"], structural: false },
    MnemonicRole { name: "view", aliases: &[], words: &["WAVEVIEW", "PLOTVIEW", "VIEW"], structural: false },
    MnemonicRole { name: "power", aliases: &[], words: &["POWER", "PWR"], structural: false },
    MnemonicRole { name: "histogram", aliases: &[], words: &["HISTOGRAM", "HIS"], structural: false },
    MnemonicRole { name: "callout", aliases: &[], words: &["CALLOUT"], structural: false },
    MnemonicRole { name: "mask", aliases: &[], words: &["MASK"], structural: false },
    MnemonicRole { name: "digital_bit", aliases: &["bit", "digital"], words: &["D", "_D"], structural: false },
    MnemonicRole { name: "area", aliases: &[], words: &["AREA"], structural: false },
];

/// Binding names that stand for "the" index of any placeholder
pub const GENERIC_INDEX_KEYS: &[&str] = &["x", "n", "index"];

/// The role an indexed mnemonic word belongs to
pub fn role_for_word(word: &str) -> Option<&'static MnemonicRole> {
    let upper = word.to_ascii_uppercase();
    ROLES.iter().find(|role| role.words.contains(&upper.as_str()))
}

/// The role a binding name refers to
pub fn role_for_key(key: &str) -> Option<&'static MnemonicRole> {
    ROLES
        .iter()
        .find(|role| role.name == key || role.aliases.contains(&key))
}

/// Parameter names the canonicalizer must not treat as path-word matches
pub fn is_structural_name(name: &str) -> bool {
    role_for_key(name).is_some_and(|role| role.structural)
}

impl MnemonicRole {
    /// All binding names that can supply this role's index, canonical first
    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_lookup_is_case_insensitive() {
        assert_eq!(role_for_word("ch").map(|r| r.name), Some("channel"));
        assert_eq!(role_for_word("PlotView").map(|r| r.name), Some("view"));
        assert_eq!(role_for_word("_D").map(|r| r.name), Some("digital_bit"));
        assert!(role_for_word("SCALE").is_none());
    }

    #[test]
    fn test_structural_names() {
        assert!(is_structural_name("channel"));
        assert!(is_structural_name("meas"));
        assert!(!is_structural_name("zoom"));
        assert!(!is_structural_name("scale"));
    }

    #[test]
    fn test_keys_lists_canonical_name_first() {
        let role = role_for_key("bit").expect("digital bit role");
        let keys: Vec<_> = role.keys().collect();
        assert_eq!(keys, vec!["digital_bit", "bit", "digital"]);
    }
}
