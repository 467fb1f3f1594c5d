//! CLI error types with exit code handling
//!
//! Backend errors are folded into a small set of diagnostics, each mapped
//! to its own exit code.

use miette::Diagnostic;
use thiserror::Error;

use helmsync_core::{CoreError, ResourceId, SyncKind};
use helmsync_kube::BackendError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Sync plan or config file is malformed
    #[error("Invalid {what}: {message}")]
    #[diagnostic(code(helmsync::cli::plan))]
    Plan {
        what: &'static str,
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Backend unreachable
    #[error("Connection failed: {message}")]
    #[diagnostic(code(helmsync::cli::connection))]
    Connection {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A plan action failed; earlier actions stay applied
    #[error("Sync stopped at action {index} ({kind} {resource_id}) after {applied} applied: {message}")]
    #[diagnostic(
        code(helmsync::cli::sync),
        help("actions before the failing one were applied and are not rolled back")
    )]
    SyncFailed {
        index: usize,
        kind: SyncKind,
        resource_id: ResourceId,
        applied: usize,
        message: String,
    },

    /// Operation not available on the selected backend
    #[error("{message}")]
    #[diagnostic(code(helmsync::cli::unsupported), help("select another backend with --backend"))]
    Unsupported { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(helmsync::cli::io))]
    Io { message: String },

    /// Backend failure with no dedicated diagnostic
    #[error("{message}")]
    #[diagnostic(code(helmsync::cli::backend))]
    Backend { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Plan { .. } => exit_codes::PLAN_ERROR,
            CliError::Connection { .. } => exit_codes::CONNECTION_ERROR,
            CliError::SyncFailed { .. } => exit_codes::SYNC_ERROR,
            CliError::Unsupported { .. } => exit_codes::UNSUPPORTED,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Backend { .. } => exit_codes::ERROR,
        }
    }

    /// Create a plan error
    pub fn plan(message: impl Into<String>) -> Self {
        Self::Plan {
            what: "sync plan",
            message: message.into(),
            help: Some("a plan is `actions:` followed by {kind, resource, payload} entries".to_string()),
        }
    }

    /// Create a config file error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Plan {
            what: "config file",
            message: message.into(),
            help: None,
        }
    }

    /// Create an IO error naming the file involved
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", path.display(), err),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::plan(err.to_string())
    }
}

impl From<BackendError> for CliError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Sync(failure) => CliError::SyncFailed {
                index: failure.index,
                kind: failure.kind,
                resource_id: failure.resource_id,
                applied: failure.applied,
                message: failure.source.to_string(),
            },
            BackendError::Unsupported { .. } => CliError::Unsupported {
                message: err.to_string(),
            },
            BackendError::Connection(_) | BackendError::Timeout { .. } => CliError::Connection {
                message: err.to_string(),
                help: Some("check that helm is installed, or that TILLER_HOST points at a reachable Tiller".to_string()),
            },
            BackendError::Io(e) => CliError::from(e),
            other => CliError::Backend {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use helmsync_kube::SyncFailure;
    use std::time::Duration;

    #[test]
    fn test_sync_failure_keeps_index_and_resource() {
        let err = BackendError::Sync(SyncFailure {
            index: 1,
            kind: SyncKind::Apply,
            resource_id: ResourceId::new("default", "web"),
            applied: 1,
            source: Box::new(BackendError::Connection("refused".to_string())),
        });

        let cli: CliError = err.into();
        assert_eq!(cli.exit_code(), exit_codes::SYNC_ERROR);
        let message = cli.to_string();
        assert!(message.contains("action 1"));
        assert!(message.contains("default/web"));
        assert!(message.contains("refused"));
    }

    #[test]
    fn test_backend_error_exit_codes() {
        let unsupported: CliError = BackendError::Unsupported {
            operation: "export",
            backend: "cli",
        }
        .into();
        assert_eq!(unsupported.exit_code(), exit_codes::UNSUPPORTED);

        let timeout: CliError = BackendError::Timeout {
            operation: "helm list".to_string(),
            after: Duration::from_secs(5),
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_codes::CONNECTION_ERROR);

        let command: CliError = BackendError::Command {
            command: "list".to_string(),
            code: Some(1),
            stderr: "boom".to_string(),
        }
        .into();
        assert_eq!(command.exit_code(), exit_codes::ERROR);
    }
}
