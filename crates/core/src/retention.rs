//! Version retention: keep the newest file of every component, archive the
//! rest.
//!
//! The component directory is listed and sorted by filename. Because the
//! stable name is a filename prefix, all versions of one component end up
//! next to each other, so a single pass comparing each entry with the
//! surviving previous one is enough.
//!
//! The archive subdirectory must start empty, otherwise files from two runs
//! would mix; a non-empty archive goes through the [`ConfirmationGate`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::component::{older_of, parse, ComponentIdentity};
use crate::errors::SyncError;
use crate::gate::{ConfirmationGate, GateChoice, Prompter, ARCHIVE_CHOICES};
use crate::inventory;
use crate::reconciler::PostPromotionHook;
use crate::remote::CancelFlag;

/// Result of a retention pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    /// Archived filenames, in the order they were moved.
    pub archived: Vec<String>,
}

impl RetentionReport {
    pub fn archived_count(&self) -> usize {
        self.archived.len()
    }
}

/// Moves outdated component versions into an archive subdirectory.
pub struct RetentionResolver<'a> {
    archive_dir_name: String,
    prompter: &'a dyn Prompter,
    cancel: Option<CancelFlag>,
}

impl<'a> RetentionResolver<'a> {
    pub fn new(archive_dir_name: impl Into<String>, prompter: &'a dyn Prompter) -> Self {
        Self {
            archive_dir_name: archive_dir_name.into(),
            prompter,
            cancel: None,
        }
    }

    /// Stop the pass between moves, or at the archive prompt, once `cancel`
    /// is raised.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run one retention pass over `component_dir`.
    ///
    /// A failed move aborts the pass; files archived before it stay in the
    /// archive.
    #[instrument(skip(self), fields(dir = %component_dir.display()))]
    pub fn resolve(&self, component_dir: &Path) -> Result<RetentionReport, SyncError> {
        let archive_dir = self.prepare_archive(component_dir)?;

        let entries = inventory::file_names(component_dir)?;
        debug!(count = entries.len(), "scanning component directory");

        let mut report = RetentionReport::default();
        let mut survivor: Option<ComponentIdentity> = None;

        for name in &entries {
            if self.is_cancelled() {
                info!(archived = report.archived_count(), "retention interrupted");
                return Err(SyncError::Cancelled);
            }
            let current = parse(name);

            survivor = match (current, survivor.take()) {
                (Some(current), Some(previous)) if current.same_component(&previous) => {
                    let previous_is_older = std::ptr::eq(older_of(&current, &previous), &previous);
                    let (outdated, kept) = if previous_is_older {
                        (previous, current)
                    } else {
                        (current, previous)
                    };
                    archive_file(component_dir, &archive_dir, &outdated)?;
                    report.archived.push(outdated.file_name());
                    Some(kept)
                }
                (current, _) => current,
            };
        }

        info!(
            archive = %archive_dir.display(),
            archived = report.archived_count(),
            "outdated components moved to archive"
        );
        Ok(report)
    }

    fn prepare_archive(&self, component_dir: &Path) -> Result<PathBuf, SyncError> {
        if !component_dir.is_dir() {
            return Err(SyncError::DirectoryInaccessible {
                path: component_dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let archive_dir = inventory::ensure_subdir(component_dir, &self.archive_dir_name)?;
        let mut gate = ConfirmationGate::new(self.prompter);
        if let Some(cancel) = &self.cancel {
            gate = gate.with_cancel(cancel);
        }
        if gate.check(&archive_dir, ARCHIVE_CHOICES)? == Some(GateChoice::Abort) {
            return Err(SyncError::DirectoryNotEmpty(archive_dir));
        }
        Ok(archive_dir)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

impl PostPromotionHook for RetentionResolver<'_> {
    fn after_promotion(&self, root: &Path) -> Result<(), SyncError> {
        self.resolve(root).map(|_| ())
    }
}

fn archive_file(
    component_dir: &Path,
    archive_dir: &Path,
    outdated: &ComponentIdentity,
) -> Result<(), SyncError> {
    let file_name = outdated.file_name();
    let from = component_dir.join(&file_name);
    let to = archive_dir.join(&file_name);
    fs::rename(&from, &to).map_err(|source| SyncError::MoveFailed {
        from: from.clone(),
        to: to.clone(),
        source,
    })?;
    debug!(file = %file_name, "archived outdated component");
    Ok(())
}
