//! Post-run comparison of remote and local file sizes.

use serde::Serialize;
use tracing::{info, warn};

use crate::inventory::SizeMap;

/// A file present on both sides with different sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeMismatch {
    pub name: String,
    pub remote: u64,
    pub local: u64,
}

/// Differences between the remote listing and the local root directory.
///
/// A mismatch is a finding for the operator, not an error of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Listed remotely, absent locally.
    pub missing_locally: Vec<String>,
    /// Present locally, not listed remotely.
    pub extra_locally: Vec<String>,
    pub size_mismatches: Vec<SizeMismatch>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.missing_locally.is_empty()
            && self.extra_locally.is_empty()
            && self.size_mismatches.is_empty()
    }
}

/// Compare `remote` with `local` and log every difference.
pub fn compare(remote: &SizeMap, local: &SizeMap) -> VerificationReport {
    let mut report = VerificationReport::default();

    for (name, &remote_size) in remote {
        match local.get(name) {
            None => {
                warn!(file = %name, size = remote_size, "file not present locally");
                report.missing_locally.push(name.clone());
            }
            Some(&local_size) if local_size != remote_size => {
                warn!(
                    file = %name,
                    remote = remote_size,
                    local = local_size,
                    "file size differs from remote"
                );
                report.size_mismatches.push(SizeMismatch {
                    name: name.clone(),
                    remote: remote_size,
                    local: local_size,
                });
            }
            Some(_) => {}
        }
    }

    for name in local.keys().filter(|name| !remote.contains_key(*name)) {
        warn!(file = %name, "file not present on remote");
        report.extra_locally.push(name.clone());
    }

    if report.passed() {
        info!(files = remote.len(), "verification passed");
    } else {
        warn!(
            missing = report.missing_locally.len(),
            extra = report.extra_locally.len(),
            mismatched = report.size_mismatches.len(),
            "verification found differences"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(entries: &[(&str, u64)]) -> SizeMap {
        entries.iter().map(|(n, s)| (n.to_string(), *s)).collect()
    }

    #[test]
    fn test_identical_maps_pass() {
        let map = sizes(&[("A_1.acd", 10), ("B_2.acd", 20)]);
        let report = compare(&map, &map.clone());
        assert!(report.passed());
    }

    #[test]
    fn test_size_mismatch_fails() {
        let report = compare(&sizes(&[("x", 100)]), &sizes(&[("x", 99)]));
        assert!(!report.passed());
        assert_eq!(
            report.size_mismatches,
            vec![SizeMismatch {
                name: "x".into(),
                remote: 100,
                local: 99
            }]
        );
    }

    #[test]
    fn test_one_sided_files_reported() {
        let remote = sizes(&[("A_1.acd", 10), ("B_1.acd", 5)]);
        let local = sizes(&[("A_1.acd", 10), ("stale.txt", 1)]);
        let report = compare(&remote, &local);
        assert_eq!(report.missing_locally, vec!["B_1.acd"]);
        assert_eq!(report.extra_locally, vec!["stale.txt"]);
        assert!(report.size_mismatches.is_empty());
        assert!(!report.passed());
    }

    #[test]
    fn test_empty_sides_pass() {
        assert!(compare(&SizeMap::new(), &SizeMap::new()).passed());
    }
}
