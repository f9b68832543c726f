//! Component filename codec.
//!
//! A component file is named `<stable name>_<version><extension>`, e.g.
//! `F_GETAN_RES_911010.acd`:
//!
//! | part        | value          |
//! |-------------|----------------|
//! | stable name | `F_GETAN_RES_` |
//! | version     | `911010`       |
//! | extension   | `.acd`         |
//!
//! The stable name keeps its trailing underscore so that [`format`] is plain
//! concatenation. The extension is an optional dot followed by word
//! characters and must not be empty: `A_123` is not a component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version placeholder used to make names version-agnostic.
pub const ZERO_VERSION: &str = "00000";

/// The three parts of a component filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentIdentity {
    /// Everything up to and including the separating underscore.
    pub stable_name: String,
    /// ASCII digit run following the underscore.
    pub version: String,
    /// Remainder of the filename, usually `.ext`.
    pub extension: String,
}

impl ComponentIdentity {
    pub fn new(
        stable_name: impl Into<String>,
        version: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            stable_name: stable_name.into(),
            version: version.into(),
            extension: extension.into(),
        }
    }

    /// `true` if both identities name the same component, whatever their
    /// versions.
    pub fn same_component(&self, other: &ComponentIdentity) -> bool {
        self.stable_name == other.stable_name && self.extension == other.extension
    }

    /// The filename this identity was parsed from.
    pub fn file_name(&self) -> String {
        format(self)
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.stable_name, self.version, self.extension)
    }
}

/// Split a filename into its component identity.
///
/// Candidate underscores are tried from the rightmost one leftwards. The
/// first whose remainder is `digits [.] word-chars` up to the end of the
/// name decides the result: if its extension is empty the name is not a
/// component, and earlier underscores are not considered.
pub fn parse(filename: &str) -> Option<ComponentIdentity> {
    let (tail_start, digits) = filename
        .char_indices()
        .rev()
        .filter(|&(_, c)| c == '_')
        .find_map(|(idx, _)| {
            let tail_start = idx + 1;
            match_tail(&filename[tail_start..]).map(|digits| (tail_start, digits))
        })?;

    let tail = &filename[tail_start..];
    let extension = &tail[digits..];
    if extension.is_empty() {
        return None;
    }

    Some(ComponentIdentity::new(
        &filename[..tail_start],
        &tail[..digits],
        extension,
    ))
}

/// Length of the leading digit run if `tail` is `digits [.] word-chars`.
fn match_tail(tail: &str) -> Option<usize> {
    let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }

    let rest = &tail[digits..];
    let word = rest.strip_prefix('.').unwrap_or(rest);
    word.chars().all(is_word_char).then_some(digits)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Concatenate an identity back into a filename.
pub fn format(identity: &ComponentIdentity) -> String {
    identity.to_string()
}

/// Replace the version of a component filename with [`ZERO_VERSION`].
///
/// Filenames that are not components are returned unchanged.
pub fn normalize_version(filename: &str) -> String {
    match parse(filename) {
        Some(id) => format!("{}{}{}", id.stable_name, ZERO_VERSION, id.extension),
        None => filename.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str, version: &str, ext: &str) -> ComponentIdentity {
        ComponentIdentity::new(name, version, ext)
    }

    #[test]
    fn test_parse_typical_component() {
        assert_eq!(
            parse("F_GETAN_RES_911010.acd"),
            Some(id("F_GETAN_RES_", "911010", ".acd"))
        );
        assert_eq!(parse("A_00001.ext"), Some(id("A_", "00001", ".ext")));
    }

    #[test]
    fn test_parse_rejects_non_components() {
        assert_eq!(parse("README.txt"), None);
        assert_eq!(parse("UPDATES.sfv"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("_"), None);
        // No extension after the version: a partial match.
        assert_eq!(parse("A_123"), None);
        // The rightmost matching underscore has no extension; earlier
        // underscores are not tried.
        assert_eq!(parse("A_1_23"), None);
        assert_eq!(parse("LIB_2_17"), None);
        // Trailing dots in the extension are not word characters.
        assert_eq!(parse("A_1.2.3"), None);
        assert_eq!(parse("A_.acd"), None);
        assert_eq!(parse("A_12 .acd"), None);
    }

    #[test]
    fn test_parse_extension_without_dot() {
        assert_eq!(parse("A_12abc"), Some(id("A_", "12", "abc")));
        assert_eq!(parse("A_1."), Some(id("A_", "1", ".")));
    }

    #[test]
    fn test_parse_prefers_rightmost_matching_underscore() {
        assert_eq!(parse("LIB_CORE_2_17.dll"), Some(id("LIB_CORE_2_", "17", ".dll")));
        // The last underscore is not followed by digits, so an earlier one is
        // used and the underscore ends up in the extension.
        assert_eq!(parse("A_1_x"), Some(id("A_", "1", "_x")));
        assert_eq!(parse("A_1_x.y"), None);
    }

    #[test]
    fn test_parse_non_ascii_name() {
        assert_eq!(
            parse("КОМПОНЕНТ_910.пак"),
            Some(id("КОМПОНЕНТ_", "910", ".пак"))
        );
    }

    #[test]
    fn test_format_round_trip() {
        for name in ["F_GETAN_RES_911010.acd", "A_1_x", "X__07.a_b", "A_1."] {
            let identity = parse(name).expect(name);
            assert_eq!(format(&identity), name);
            assert_eq!(parse(&format(&identity)), Some(identity));
        }
    }

    #[test]
    fn test_same_component_ignores_version() {
        let a = id("A_", "00001", ".ext");
        assert!(a.same_component(&id("A_", "99", ".ext")));
        assert!(!a.same_component(&id("A_", "00001", ".dat")));
        assert!(!a.same_component(&id("B_", "00001", ".ext")));
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("F_GETAN_RES_911010.acd"), "F_GETAN_RES_00000.acd");
        assert_eq!(normalize_version("A_1_23"), "A_1_23");
        assert_eq!(normalize_version("F_GETAN_RES_7.acd"), "F_GETAN_RES_00000.acd");
        assert_eq!(normalize_version("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_normalize_version_is_idempotent() {
        for name in ["F_GETAN_RES_911010.acd", "notes.txt", "A_123", "A_1_x", ""] {
            let once = normalize_version(name);
            assert_eq!(normalize_version(&once), once, "input {:?}", name);
        }
    }
}
