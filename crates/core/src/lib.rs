//! compsync core library.
//!
//! This crate provides the building blocks for keeping a local directory of
//! versioned component files in step with an FTP mirror: the component
//! filename codec and version ordering, the confirmation gate for
//! destructive directory operations, the remote inventory client, the sync
//! reconciler and the version retention pass.

pub mod component;
pub mod config;
pub mod errors;
pub mod gate;
pub mod inventory;
pub mod reconciler;
pub mod remote;
pub mod retention;
pub mod verify;

// Re-exports for convenience.
pub use component::ComponentIdentity;
pub use config::{CompsyncConfig, DenyListPolicy};
pub use errors::{ErrorClass, SyncError};
pub use gate::{ConfirmationGate, Prompter};
pub use reconciler::{SyncOutcome, SyncReconciler, SyncRequest, SyncState};
pub use remote::{CancelFlag, CurlConnector};
pub use retention::{RetentionReport, RetentionResolver};
