//! Plumbing shared by the exposure calculator front ends.

pub mod recompute;
pub mod update_check;

pub use recompute::{Debouncer, PendingRecompute, DEFAULT_QUIET_PERIOD};
pub use update_check::{
    HttpVersionSource, UpdateCheckError, UpdateChecker, UpdateHandle, UpdateStatus, VersionSource,
};
