//! The sync run: bring a local component directory up to date with one
//! remote directory.
//!
//! A run moves through [`SyncState`]s:
//!
//! ```text
//! Init -> Connected -> Reconciling -> Verifying -> Done | PartialFailure
//! ```
//!
//! New remote files are downloaded into the staging subdirectory first. Only
//! when every selected file arrived are the staged files copied into the
//! root, after which the [`PostPromotionHook`] (retention, in the CLI) runs.
//! A run always ends with a size comparison between the remote listing and
//! the root directory.
//!
//! Per-file download failures are counted, not propagated. Structural
//! problems and operator cancellation end the run with a [`SyncError`]. The
//! remote session is closed on every exit path by [`SessionGuard`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{LayoutConfig, PolicyConfig};
use crate::errors::{SyncError, TransferError};
use crate::gate::{ConfirmationGate, GateChoice, Prompter, STAGING_CHOICES};
use crate::inventory::{self, DenyList};
use crate::remote::{
    fetch_file, terminal_segment, CancelFlag, FetchContext, NoProgress, ProgressReporter,
    RemoteConnector, RemoteSession, SessionGuard,
};
use crate::verify::{self, VerificationReport};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Init,
    Connected,
    Reconciling,
    Verifying,
    Done,
    PartialFailure,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Connected => write!(f, "connected"),
            Self::Reconciling => write!(f, "reconciling"),
            Self::Verifying => write!(f, "verifying"),
            Self::Done => write!(f, "done"),
            Self::PartialFailure => write!(f, "partial_failure"),
        }
    }
}

/// Called on the root directory after staged files were promoted into it.
pub trait PostPromotionHook {
    fn after_promotion(&self, root: &Path) -> Result<(), SyncError>;
}

/// What to synchronize.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Local component directory.
    pub local_root: PathBuf,
    /// Directory on the remote server.
    pub remote_dir: String,
    /// Filter transfers through the deny-list.
    pub deny_list_active: bool,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub state: SyncState,
    pub remote_dir: String,
    pub copied: usize,
    /// Selected files that did not arrive, deny-listed ones included.
    pub not_copied: usize,
    pub denied: usize,
    /// Staged files copied into the root. Zero when promotion was skipped.
    pub promoted: usize,
    /// `None` when the remote size listing could not be obtained.
    pub verification: Option<VerificationReport>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.state == SyncState::Done
    }
}

#[derive(Debug, Default)]
struct Tally {
    copied: usize,
    not_copied: usize,
    denied: usize,
    fetched: BTreeSet<String>,
}

struct Preflight {
    staging_dir: PathBuf,
    staged: BTreeSet<String>,
    local: BTreeSet<String>,
    deny_list: Option<DenyList>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Runs sync requests against one remote server.
pub struct SyncReconciler<'a> {
    connector: &'a dyn RemoteConnector,
    prompter: &'a dyn Prompter,
    layout: &'a LayoutConfig,
    policy: &'a PolicyConfig,
    cancel: CancelFlag,
    reporter: &'a dyn ProgressReporter,
    hook: Option<&'a dyn PostPromotionHook>,
    state: SyncState,
}

impl<'a> SyncReconciler<'a> {
    pub fn new(
        connector: &'a dyn RemoteConnector,
        prompter: &'a dyn Prompter,
        layout: &'a LayoutConfig,
        policy: &'a PolicyConfig,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            connector,
            prompter,
            layout,
            policy,
            cancel,
            reporter: &NoProgress,
            hook: None,
            state: SyncState::Init,
        }
    }

    pub fn with_progress(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_hook(mut self, hook: &'a dyn PostPromotionHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Execute one sync run.
    pub fn run(&mut self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let started_at = Utc::now();
        self.state = SyncState::Init;
        info!(
            root = %request.local_root.display(),
            remote = %request.remote_dir,
            deny_list = request.deny_list_active,
            "sync run started"
        );

        let preflight = self.preflight(request)?;

        let session = self
            .connector
            .connect(&request.remote_dir)
            .map_err(SyncError::Connect)?;
        let mut guard = SessionGuard::new(session);
        self.set_state(SyncState::Connected);

        let remote_names = guard
            .session()
            .list_filenames()
            .map_err(SyncError::Listing)?;
        self.set_state(SyncState::Reconciling);

        let tally = self.reconcile(guard.session(), request, &preflight, &remote_names)?;
        self.check_cancelled()?;

        let promoted = if tally.not_copied == 0 && tally.copied > 0 {
            self.promote(&preflight.staging_dir, &request.local_root)?
        } else {
            if tally.copied > 0 {
                info!(
                    not_copied = tally.not_copied,
                    "not all files arrived, staged files left in place"
                );
            }
            0
        };

        self.check_cancelled()?;
        self.set_state(SyncState::Verifying);
        let verification = self.verify(guard.session(), &request.local_root)?;
        let verified = verification.as_ref().is_some_and(VerificationReport::passed);

        let final_state = if tally.not_copied == 0 && verified {
            SyncState::Done
        } else {
            SyncState::PartialFailure
        };
        self.set_state(final_state);
        drop(guard);

        let outcome = SyncOutcome {
            state: final_state,
            remote_dir: request.remote_dir.clone(),
            copied: tally.copied,
            not_copied: tally.not_copied,
            denied: tally.denied,
            promoted,
            verification,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            state = %outcome.state,
            copied = outcome.copied,
            not_copied = outcome.not_copied,
            promoted = outcome.promoted,
            "sync run finished"
        );
        Ok(outcome)
    }

    fn set_state(&mut self, next: SyncState) {
        info!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            warn!(state = %self.state, "run cancelled");
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    fn preflight(&self, request: &SyncRequest) -> Result<Preflight, SyncError> {
        let root = &request.local_root;
        let metadata = fs::metadata(root).map_err(|source| SyncError::DirectoryInaccessible {
            path: root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(SyncError::NotADirectory(root.clone()));
        }

        let staging_dir = inventory::ensure_subdir(root, &self.layout.staging_dir)?;
        let gate = ConfirmationGate::new(self.prompter).with_cancel(&self.cancel);
        if gate.check(&staging_dir, STAGING_CHOICES)? == Some(GateChoice::Abort) {
            return Err(SyncError::DirectoryNotEmpty(staging_dir));
        }
        let staged = inventory::staging_cache(&staging_dir)?;

        let deny_list = if request.deny_list_active {
            Some(DenyList::load(&self.policy.deny_list_file)?)
        } else {
            None
        };

        let local = inventory::file_names(root)?;
        debug!(local = local.len(), staged = staged.len(), "preflight complete");

        Ok(Preflight {
            staging_dir,
            staged,
            local,
            deny_list,
        })
    }

    fn reconcile(
        &self,
        session: &mut dyn RemoteSession,
        request: &SyncRequest,
        preflight: &Preflight,
        remote_names: &[String],
    ) -> Result<Tally, SyncError> {
        let plan = plan_transfers(remote_names, &preflight.local, &preflight.staged);
        info!(
            remote = remote_names.len(),
            to_fetch = plan.len(),
            "transfer plan ready"
        );

        let mut tally = Tally::default();
        for name in plan {
            if self.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if preflight
                .deny_list
                .as_ref()
                .is_some_and(|list| list.contains(name))
            {
                warn!(file = %name, "file is deny-listed, not copied");
                tally.denied += 1;
                tally.not_copied += 1;
                continue;
            }
            self.transfer(session, name, &preflight.staging_dir, &mut tally)?;
        }

        let manifest = self.policy.manifest_file.as_str();
        if tally.copied > 0
            && terminal_segment(&request.remote_dir) == self.policy.release_marker
            && !tally.fetched.contains(manifest)
        {
            if self.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            info!(file = %manifest, "release batch downloaded, fetching manifest");
            self.transfer(session, manifest, &preflight.staging_dir, &mut tally)?;
        }

        info!(
            copied = tally.copied,
            not_copied = tally.not_copied,
            "transfers complete"
        );
        Ok(tally)
    }

    fn transfer(
        &self,
        session: &mut dyn RemoteSession,
        name: &str,
        staging_dir: &Path,
        tally: &mut Tally,
    ) -> Result<(), SyncError> {
        if !is_plain_file_name(name) {
            warn!(file = %name, "remote name is not a plain file name, not copied");
            tally.not_copied += 1;
            return Ok(());
        }
        let destination = staging_dir.join(name);
        let mut ctx = FetchContext::new(name, &self.cancel, self.reporter);

        match fetch_file(session, name, &destination, &mut ctx) {
            Ok(()) => {
                info!(file = %name, bytes = ctx.progress().bytes_written, "copied");
                tally.copied += 1;
                tally.fetched.insert(name.to_string());
                Ok(())
            }
            Err(TransferError::Cancelled) => {
                warn!(file = %name, "transfer interrupted");
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                warn!(file = %name, error = %e, "download failed");
                tally.not_copied += 1;
                Ok(())
            }
        }
    }

    fn promote(&self, staging_dir: &Path, root: &Path) -> Result<usize, SyncError> {
        let staged = inventory::file_names(staging_dir)?;
        for name in &staged {
            let from = staging_dir.join(name);
            let to = root.join(name);
            fs::copy(&from, &to).map_err(|source| SyncError::CopyFailed {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
        }
        info!(files = staged.len(), root = %root.display(), "staged files promoted");

        if let Some(hook) = self.hook {
            self.check_cancelled()?;
            hook.after_promotion(root)?;
        }
        Ok(staged.len())
    }

    fn verify(
        &self,
        session: &mut dyn RemoteSession,
        root: &Path,
    ) -> Result<Option<VerificationReport>, SyncError> {
        let remote = match session.list_remote_sizes() {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "remote size listing failed, verification skipped");
                return Ok(None);
            }
        };
        let local = inventory::file_sizes(root)?;
        Ok(Some(verify::compare(&remote, &local)))
    }
}

/// Remote names missing both from the root and from the staging cache, in
/// remote order.
pub fn plan_transfers<'n>(
    remote: &'n [String],
    local: &BTreeSet<String>,
    staged: &BTreeSet<String>,
) -> Vec<&'n str> {
    let mut seen = BTreeSet::new();
    remote
        .iter()
        .map(String::as_str)
        .filter(|name| !local.contains(*name) && !staged.contains(*name))
        .filter(|name| seen.insert(*name))
        .collect()
}

/// `true` if `name` can only refer to an entry directly inside a directory.
fn is_plain_file_name(name: &str) -> bool {
    if name.contains(|c: char| c == '/' || c == '\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_plan_keeps_remote_order() {
        let remote: Vec<String> = ["C_1.x", "A_1.x", "B_1.x", "D_1.x"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let plan = plan_transfers(&remote, &set(&["A_1.x"]), &set(&["D_1.x"]));
        assert_eq!(plan, vec!["C_1.x", "B_1.x"]);
    }

    #[test]
    fn test_plan_ignores_duplicates() {
        let remote: Vec<String> = vec!["A_1.x".into(), "A_1.x".into()];
        let plan = plan_transfers(&remote, &set(&[]), &set(&[]));
        assert_eq!(plan, vec!["A_1.x"]);
    }

    #[test]
    fn test_plan_empty_when_everything_present() {
        let remote: Vec<String> = vec!["A_1.x".into(), "B_1.x".into()];
        assert!(plan_transfers(&remote, &set(&["A_1.x"]), &set(&["B_1.x"])).is_empty());
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("A_00001.acd"));
        assert!(is_plain_file_name("..A_1.acd"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("../A_1.acd"));
        assert!(!is_plain_file_name("/etc/A_1.acd"));
        assert!(!is_plain_file_name("sub/A_1.acd"));
        assert!(!is_plain_file_name("..\\A_1.acd"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SyncState::Init.to_string(), "init");
        assert_eq!(SyncState::PartialFailure.to_string(), "partial_failure");
        assert_eq!(
            serde_json::to_string(&SyncState::PartialFailure).unwrap(),
            "\"partial_failure\""
        );
    }
}
