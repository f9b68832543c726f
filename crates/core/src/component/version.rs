//! Version ordering for component identities.
//!
//! Versions are digit strings of varying width. The shorter one is padded on
//! the right with zeros before comparing, so `2` against `10` reads as `20`
//! and is the newer of the two. Once both strings have the same length and
//! consist of ASCII digits, byte order is numeric order, which keeps
//! arbitrarily long versions from overflowing an integer type.

use std::cmp::Ordering;

use super::name::ComponentIdentity;

/// Compare two version strings after right-padding the shorter with `'0'`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let width = a.len().max(b.len());
    let padded_a = pad_right(a, width);
    let padded_b = pad_right(b, width);
    padded_a.as_bytes().cmp(padded_b.as_bytes())
}

fn pad_right(version: &str, width: usize) -> String {
    let mut padded = String::with_capacity(width);
    padded.push_str(version);
    padded.extend(std::iter::repeat('0').take(width - version.len()));
    padded
}

/// Return whichever of `a` and `b` carries the older version.
///
/// Both identities are expected to name the same component; the result for
/// unrelated identities is arbitrary but never panics. Equal padded versions
/// resolve to `b`.
pub fn older_of<'a>(a: &'a ComponentIdentity, b: &'a ComponentIdentity) -> &'a ComponentIdentity {
    match compare_versions(&a.version, &b.version) {
        Ordering::Less => a,
        Ordering::Equal | Ordering::Greater => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acd(version: &str) -> ComponentIdentity {
        ComponentIdentity::new("A_", version, ".acd")
    }

    #[test]
    fn test_right_padding_not_lexical() {
        let newer = acd("911010");
        let older = acd("91101");
        // 91101 pads to 911010: a tie, which resolves to the second operand.
        assert_eq!(compare_versions("91101", "911010"), Ordering::Equal);
        assert_eq!(older_of(&newer, &older).version, "91101");
    }

    #[test]
    fn test_unequal_width_ordering() {
        // 91101 -> 911010 < 911011
        assert_eq!(compare_versions("91101", "911011"), Ordering::Less);
        // 9 -> 90 > 89; 1 -> 10 < 19.
        assert_eq!(compare_versions("9", "89"), Ordering::Greater);
        assert_eq!(compare_versions("1", "19"), Ordering::Less);
        // Left-padding would make 2 -> 02 < 10; right-padding makes 20 > 10.
        assert_eq!(compare_versions("2", "10"), Ordering::Greater);
    }

    #[test]
    fn test_older_of_picks_smaller() {
        let v1 = acd("00001");
        let v2 = acd("00002");
        assert_eq!(older_of(&v1, &v2), &v1);
        assert_eq!(older_of(&v2, &v1), &v1);
    }

    #[test]
    fn test_older_of_tie_resolves_to_second() {
        let a = acd("10");
        let b = acd("1");
        assert_eq!(compare_versions("10", "1"), Ordering::Equal);
        assert!(std::ptr::eq(older_of(&a, &b), &b));
        assert!(std::ptr::eq(older_of(&b, &a), &a));
    }

    #[test]
    fn test_long_versions_do_not_overflow() {
        let a = "9".repeat(60);
        let b = format!("{}8", "9".repeat(59));
        assert_eq!(compare_versions(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_mismatched_identities_do_not_panic() {
        let a = ComponentIdentity::new("A_", "5", ".x");
        let b = ComponentIdentity::new("B_", "", ".y");
        let _ = older_of(&a, &b);
    }
}
