//! Component identity: parsing names out of filenames and ordering versions.

pub mod name;
pub mod version;

pub use name::{format, normalize_version, parse, ComponentIdentity, ZERO_VERSION};
pub use version::{compare_versions, older_of};
