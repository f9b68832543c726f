//! Error types for the compsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. A run of
//! the reconciler or the retention resolver fails with a [`SyncError`], whose
//! [`ErrorClass`] tells the caller whether the run was aborted structurally or
//! cancelled by the operator. Per-file transfer failures ([`TransferError`])
//! are recovered inside the reconciler and only surface in the logs and the
//! run counters.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Coarse classification of a fatal run error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad arguments, inaccessible directories, remote setup failure, etc.
    Structural,
    /// The operator interrupted the run.
    Cancelled,
}

/// Fatal errors that terminate a sync or retention run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required directory could not be read.
    #[error("no access to directory '{path}': {source}")]
    DirectoryInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path that must be a directory exists but is something else.
    #[error("'{0}' exists but is not a directory")]
    NotADirectory(PathBuf),

    /// A required directory could not be created.
    #[error("cannot create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Clearing a directory through the confirmation gate failed.
    #[error("failed to delete the contents of directory '{path}': {source}")]
    ClearDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operator refused to continue with a non-empty directory.
    #[error("directory '{0}' is not empty; run aborted by operator")]
    DirectoryNotEmpty(PathBuf),

    /// The prompter could not obtain an answer from the operator.
    #[error("failed to read operator answer: {0}")]
    Prompt(#[source] std::io::Error),

    /// Moving an outdated component into the archive failed.
    #[error("cannot move '{from}' to '{to}': {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Promoting a staged file into the root directory failed.
    #[error("cannot copy '{from}' to '{to}': {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The deny-list file could not be read.
    #[error("cannot read deny-list file '{path}': {source}")]
    DenyList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote session could not be established.
    #[error("error accessing the remote server: {0}")]
    Connect(#[source] RemoteError),

    /// A remote directory listing failed.
    #[error("remote listing failed: {0}")]
    Listing(#[source] RemoteError),

    /// The operator interrupted the run.
    #[error("run interrupted by operator")]
    Cancelled,
}

impl SyncError {
    /// Classify the error for exit-code selection.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Cancelled => ErrorClass::Cancelled,
            _ => ErrorClass::Structural,
        }
    }

    /// `true` if the operator interrupted the run.
    pub fn is_cancelled(&self) -> bool {
        self.class() == ErrorClass::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Remote errors
// ---------------------------------------------------------------------------

/// Errors from invoking the transfer tool against the remote server.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The transfer binary was not found on `$PATH`.
    #[error("transfer binary not found: {0}")]
    BinaryNotFound(String),

    /// The transfer command exited with a non-zero status.
    #[error("transfer command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// Generic I/O wrapper.
    #[error("remote I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Transfer errors
// ---------------------------------------------------------------------------

/// Failure to fetch a single file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transport reported an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Writing or inspecting the destination file failed.
    #[error("local I/O error during transfer: {0}")]
    Io(#[from] std::io::Error),

    /// The operator interrupted the transfer.
    #[error("transfer interrupted by operator")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
