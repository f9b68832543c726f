//! Local side of a sync run: directory listings, the staging cache and the
//! deny-list.
//!
//! Only regular files count. Subdirectories of the root (staging, archive)
//! never appear in a listing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::component::normalize_version;
use crate::errors::SyncError;

/// Filename → byte size.
pub type SizeMap = BTreeMap<String, u64>;

/// Names of the regular files directly inside `dir`, sorted.
pub fn file_names(dir: &Path) -> Result<BTreeSet<String>, SyncError> {
    Ok(file_sizes(dir)?.into_keys().collect())
}

/// Sizes of the regular files directly inside `dir`.
pub fn file_sizes(dir: &Path) -> Result<SizeMap, SyncError> {
    let to_error = |source: std::io::Error| SyncError::DirectoryInaccessible {
        path: dir.to_path_buf(),
        source,
    };

    let mut sizes = SizeMap::new();
    for entry in fs::read_dir(dir).map_err(to_error)? {
        let entry = entry.map_err(to_error)?;
        let metadata = fs::metadata(entry.path()).map_err(to_error)?;
        if !metadata.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                sizes.insert(name, metadata.len());
            }
            Err(raw) => debug!(name = ?raw, "skipping non UTF-8 filename"),
        }
    }
    Ok(sizes)
}

/// Files already downloaded into the staging directory by an earlier run.
///
/// Rebuilt from disk on every call.
pub fn staging_cache(staging_dir: &Path) -> Result<BTreeSet<String>, SyncError> {
    let cache = file_names(staging_dir)?;
    info!(
        dir = %staging_dir.display(),
        count = cache.len(),
        "staging cache loaded"
    );
    Ok(cache)
}

/// Ensure the subdirectory `name` of `root` exists and is a directory.
pub fn ensure_subdir(root: &Path, name: &str) -> Result<PathBuf, SyncError> {
    let dir = root.join(name);
    if dir.exists() {
        if !dir.is_dir() {
            return Err(SyncError::NotADirectory(dir));
        }
        return Ok(dir);
    }

    fs::create_dir(&dir).map_err(|source| SyncError::CreateDirectory {
        path: dir.clone(),
        source,
    })?;
    info!(dir = %dir.display(), "created directory");
    Ok(dir)
}

/// Component names excluded from transfer, compared version-agnostically.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    entries: HashSet<String>,
}

impl DenyList {
    /// Build from raw lines; entries are normalized to [`crate::component::ZERO_VERSION`].
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = lines
            .into_iter()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(normalize_version)
            .collect();
        Self { entries }
    }

    /// Read a deny-list file, one filename per line.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let contents = fs::read_to_string(path).map_err(|source| SyncError::DenyList {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::from_lines(contents.lines());
        info!(path = %path.display(), entries = list.len(), "deny-list loaded");
        Ok(list)
    }

    /// `true` if any version of `filename`'s component is denied.
    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains(&normalize_version(filename))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sizes_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A_1.acd"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("readme"), "hi").unwrap();
        fs::create_dir(dir.path().join("NEW")).unwrap();
        fs::write(dir.path().join("NEW/B_2.acd"), "x").unwrap();

        let sizes = file_sizes(dir.path()).unwrap();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes["A_1.acd"], 10);
        assert_eq!(sizes["readme"], 2);

        let names: Vec<_> = file_names(dir.path()).unwrap().into_iter().collect();
        assert_eq!(names, vec!["A_1.acd".to_string(), "readme".to_string()]);
    }

    #[test]
    fn test_file_sizes_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = file_sizes(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, SyncError::DirectoryInaccessible { .. }));
    }

    #[test]
    fn test_ensure_subdir_creates_and_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let created = ensure_subdir(dir.path(), "NEW").unwrap();
        assert!(created.is_dir());
        let again = ensure_subdir(dir.path(), "NEW").unwrap();
        assert_eq!(created, again);
    }

    #[test]
    fn test_ensure_subdir_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("NEW"), "not a dir").unwrap();
        let err = ensure_subdir(dir.path(), "NEW").unwrap_err();
        assert!(matches!(err, SyncError::NotADirectory(_)));
    }

    #[test]
    fn test_deny_list_matches_any_version() {
        let list = DenyList::from_lines(["F_GETAN_RES_911010.acd\r", "", "plain.txt  "]);
        assert_eq!(list.len(), 2);
        assert!(list.contains("F_GETAN_RES_911010.acd"));
        assert!(list.contains("F_GETAN_RES_912000.acd"));
        assert!(!list.contains("F_GETAN_RES_912000.dat"));
        assert!(list.contains("plain.txt"));
        assert!(!list.contains("other.txt"));
    }

    #[test]
    fn test_deny_list_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop_list.txt");
        fs::write(&path, "A_00001.acd\nB_7.dll\n").unwrap();
        let list = DenyList::load(&path).unwrap();
        assert!(list.contains("A_12345.acd"));
        assert!(list.contains("B_8.dll"));

        let err = DenyList::load(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, SyncError::DenyList { .. }));
    }
}
