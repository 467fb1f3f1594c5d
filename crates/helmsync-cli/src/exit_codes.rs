//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions where applicable; clap's own
//! usage errors exit with 2.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Plan error - sync plan or config file could not be parsed
pub const PLAN_ERROR: i32 = 2;

/// Connection error - backend process or server unreachable
pub const CONNECTION_ERROR: i32 = 3;

/// Sync error - a plan action failed
pub const SYNC_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Unsupported - the selected backend does not implement the operation
pub const UNSUPPORTED: i32 = 6;
