//! Remote inventory: listing and fetching files from the FTP mirror.
//!
//! The reconciler only sees the [`RemoteConnector`] and [`RemoteSession`]
//! traits. The production implementation drives `curl` (see [`curl`]); the
//! integration tests use an in-memory fake.

pub mod curl;
pub mod listing;

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{RemoteError, TransferError};
use crate::inventory::SizeMap;

pub use curl::{CurlConnector, CurlSession};
pub use listing::parse_size_listing;

/// Shared interrupt flag, raised by the CLI signal handler.
pub type CancelFlag = Arc<AtomicBool>;

/// A fresh, lowered cancel flag.
pub fn cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

/// Opens sessions against one remote server.
pub trait RemoteConnector {
    /// Open a session rooted at `remote_dir`. One attempt, no retries.
    fn connect(&self, remote_dir: &str) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// An open session on one remote directory.
pub trait RemoteSession {
    /// Filenames in the directory, in the server's order.
    fn list_filenames(&mut self) -> Result<Vec<String>, RemoteError>;

    /// Download `filename` into `destination`.
    ///
    /// Implementations report progress through `ctx` and stop with
    /// [`TransferError::Cancelled`] once `ctx` is cancelled. Cleaning up a
    /// partial `destination` is left to [`fetch_file`].
    fn fetch(
        &mut self,
        filename: &str,
        destination: &Path,
        ctx: &mut FetchContext<'_>,
    ) -> Result<(), TransferError>;

    /// Byte sizes of the non-empty files in the directory.
    fn list_remote_sizes(&mut self) -> Result<SizeMap, RemoteError>;

    /// Release the session. Best effort.
    fn close(&mut self) -> Result<(), RemoteError>;
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Byte progress of a single transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub filename: String,
    pub bytes_written: u64,
    /// Number of progress updates received so far.
    pub ticks: u64,
}

/// Receives transfer progress. The CLI renders it as a spinner.
pub trait ProgressReporter {
    fn on_progress(&self, progress: &TransferProgress);

    fn on_finish(&self, _progress: &TransferProgress, _success: bool) {}
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn on_progress(&self, _progress: &TransferProgress) {}
}

/// Per-transfer state handed to [`RemoteSession::fetch`].
pub struct FetchContext<'a> {
    cancel: &'a CancelFlag,
    reporter: &'a dyn ProgressReporter,
    progress: TransferProgress,
}

impl<'a> FetchContext<'a> {
    pub fn new(filename: &str, cancel: &'a CancelFlag, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            cancel,
            reporter,
            progress: TransferProgress {
                filename: filename.to_string(),
                ..TransferProgress::default()
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Record that `bytes_written` bytes are now on disk.
    pub fn record(&mut self, bytes_written: u64) {
        self.progress.bytes_written = bytes_written;
        self.progress.ticks += 1;
        self.reporter.on_progress(&self.progress);
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }
}

// ---------------------------------------------------------------------------
// Fetch contract
// ---------------------------------------------------------------------------

/// Fetch one file, deleting the partial destination if the transfer fails
/// or is cancelled.
pub fn fetch_file(
    session: &mut dyn RemoteSession,
    filename: &str,
    destination: &Path,
    ctx: &mut FetchContext<'_>,
) -> Result<(), TransferError> {
    let result = if ctx.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        session.fetch(filename, destination, ctx)
    };

    match result {
        Ok(()) => {
            ctx.reporter.on_finish(&ctx.progress, true);
            Ok(())
        }
        Err(err) => {
            ctx.reporter.on_finish(&ctx.progress, false);
            remove_partial(destination);
            Err(err)
        }
    }
}

fn remove_partial(destination: &Path) {
    match fs::remove_file(destination) {
        Ok(()) => debug!(path = %destination.display(), "removed partial download"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %destination.display(), error = %e, "could not remove partial download"),
    }
}

// ---------------------------------------------------------------------------
// Session lifetime
// ---------------------------------------------------------------------------

/// Owns a session and closes it when dropped.
pub struct SessionGuard {
    session: Box<dyn RemoteSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn RemoteSession>) -> Self {
        Self { session }
    }

    pub fn session(&mut self) -> &mut dyn RemoteSession {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        match self.session.close() {
            Ok(()) => debug!("remote session closed"),
            Err(e) => debug!(error = %e, "ignoring error while closing remote session"),
        }
    }
}

/// Last path segment of a remote directory, ignoring a trailing `/`.
pub fn terminal_segment(remote_dir: &str) -> &str {
    let trimmed = remote_dir.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::io::Write;

    use super::*;

    struct FailingSession {
        fail_with_cancel: bool,
        closed: std::rc::Rc<Cell<bool>>,
    }

    impl RemoteSession for FailingSession {
        fn list_filenames(&mut self) -> Result<Vec<String>, RemoteError> {
            Ok(vec![])
        }

        fn fetch(
            &mut self,
            _filename: &str,
            destination: &Path,
            ctx: &mut FetchContext<'_>,
        ) -> Result<(), TransferError> {
            let mut file = fs::File::create(destination)?;
            file.write_all(b"partial")?;
            ctx.record(7);
            if self.fail_with_cancel {
                Err(TransferError::Cancelled)
            } else {
                Err(RemoteError::CommandFailed {
                    exit_code: 18,
                    stderr: "partial file".into(),
                }
                .into())
            }
        }

        fn list_remote_sizes(&mut self) -> Result<SizeMap, RemoteError> {
            Ok(SizeMap::new())
        }

        fn close(&mut self) -> Result<(), RemoteError> {
            self.closed.set(true);
            Err(RemoteError::CommandFailed {
                exit_code: 1,
                stderr: "already gone".into(),
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        updates: RefCell<Vec<u64>>,
        finished: RefCell<Vec<bool>>,
    }

    impl ProgressReporter for Recorder {
        fn on_progress(&self, progress: &TransferProgress) {
            self.updates.borrow_mut().push(progress.bytes_written);
        }

        fn on_finish(&self, _progress: &TransferProgress, success: bool) {
            self.finished.borrow_mut().push(success);
        }
    }

    fn session(fail_with_cancel: bool) -> FailingSession {
        FailingSession {
            fail_with_cancel,
            closed: Default::default(),
        }
    }

    #[test]
    fn test_failed_fetch_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("A_1.acd");
        let cancel = cancel_flag();
        let recorder = Recorder::default();
        let mut ctx = FetchContext::new("A_1.acd", &cancel, &recorder);

        let err = fetch_file(&mut session(false), "A_1.acd", &dest, &mut ctx).unwrap_err();
        assert!(matches!(err, TransferError::Remote(_)));
        assert!(!dest.exists());
        assert_eq!(*recorder.updates.borrow(), vec![7]);
        assert_eq!(*recorder.finished.borrow(), vec![false]);
        assert_eq!(ctx.progress().ticks, 1);
    }

    #[test]
    fn test_cancelled_fetch_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("A_1.acd");
        let cancel = cancel_flag();
        let mut ctx = FetchContext::new("A_1.acd", &cancel, &NoProgress);

        let err = fetch_file(&mut session(true), "A_1.acd", &dest, &mut ctx).unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(!dest.exists());
    }

    #[test]
    fn test_raised_flag_skips_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("A_1.acd");
        let cancel = cancel_flag();
        cancel.store(true, Ordering::SeqCst);
        let mut ctx = FetchContext::new("A_1.acd", &cancel, &NoProgress);

        let err = fetch_file(&mut session(false), "A_1.acd", &dest, &mut ctx).unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert_eq!(ctx.progress().ticks, 0);
    }

    #[test]
    fn test_guard_closes_on_drop_and_swallows_errors() {
        let closed = std::rc::Rc::new(Cell::new(false));
        let session = FailingSession {
            fail_with_cancel: false,
            closed: closed.clone(),
        };
        {
            let mut guard = SessionGuard::new(Box::new(session));
            assert!(guard.session().list_filenames().unwrap().is_empty());
        }
        assert!(closed.get());
    }

    #[test]
    fn test_terminal_segment() {
        assert_eq!(terminal_segment("/pub/UPDATES"), "UPDATES");
        assert_eq!(terminal_segment("/pub/UPDATES/"), "UPDATES");
        assert_eq!(terminal_segment("UPDATES"), "UPDATES");
        assert_eq!(terminal_segment("/pub/UPDATES_OLD"), "UPDATES_OLD");
        assert_eq!(terminal_segment("/"), "");
    }
}
