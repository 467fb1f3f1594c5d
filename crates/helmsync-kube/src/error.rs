//! Error types for helmsync-kube

use std::time::Duration;
use thiserror::Error;

use helmsync_core::{CoreError, DocumentError, ResourceId, SyncKind};

/// Result type for helmsync-kube operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors raised by release backends
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Backend process or server cannot be reached
    #[error("cannot reach backend: {0}")]
    Connection(String),

    /// Backend command ran but exited unsuccessfully
    #[error("helm {command} failed (exit code {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// RPC status returned by the server
    #[error("rpc error ({code}): {message}")]
    Rpc { code: tonic::Code, message: String },

    /// Operation exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Server version missing from the version response
    #[error("Server version not found in response text << {response} >>")]
    VersionNotFound { response: String },

    /// Manifest or values document failed to decode
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Sync action payload could not be read
    #[error("invalid payload for {resource_id}: {message}")]
    Payload {
        resource_id: ResourceId,
        message: String,
    },

    /// Release name is taken by a release in another namespace
    #[error("release {name} belongs to namespace {held_by}, not {namespace}")]
    NamespaceConflict {
        name: String,
        namespace: String,
        held_by: String,
    },

    /// Operation not implemented by this backend
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// A sync plan stopped at a failing action
    #[error(transparent)]
    Sync(#[from] SyncFailure),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Core parsing error
    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for BackendError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Document(doc) => BackendError::Document(doc),
            other => BackendError::Core(other),
        }
    }
}

impl From<tonic::Status> for BackendError {
    fn from(status: tonic::Status) -> Self {
        BackendError::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<tonic::transport::Error> for BackendError {
    fn from(e: tonic::transport::Error) -> Self {
        BackendError::Connection(e.to_string())
    }
}

impl BackendError {
    /// This backend variant does not implement the operation
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BackendError::Unsupported { .. })
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Connection(_) | BackendError::Timeout { .. } => true,
            BackendError::Rpc { code, .. } => matches!(
                code,
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Aborted
            ),
            BackendError::Kube(kube::Error::Api(resp)) => resp.code >= 500,
            _ => false,
        }
    }

    /// The backend reported release `name` itself as missing.
    ///
    /// Only helm's `release: "<name>" not found` form and a `NotFound` RPC
    /// status count. Other "not found" failures (contexts, plugins, config
    /// maps) are real errors.
    pub fn is_release_not_found(&self, name: &str) -> bool {
        let marker = format!("release: \"{}\" not found", name);
        match self {
            BackendError::Command { stderr, .. } => stderr.contains(&marker),
            BackendError::Rpc { code, message } => {
                *code == tonic::Code::NotFound || message.contains(&marker)
            }
            _ => false,
        }
    }
}

/// The first failing action of a sync plan
#[derive(Debug, Error)]
#[error("sync action {index} ({kind} {resource_id}) failed after {applied} applied: {source}")]
pub struct SyncFailure {
    /// Zero-based position of the failing action
    pub index: usize,
    pub kind: SyncKind,
    pub resource_id: ResourceId,
    /// Number of actions that completed before the failure
    pub applied: usize,
    #[source]
    pub source: Box<BackendError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_never_retryable() {
        let err = BackendError::Unsupported {
            operation: "export",
            backend: "cli",
        };
        assert!(err.is_unsupported());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "export is not supported by the cli backend");
    }

    #[test]
    fn test_transient_errors_retryable() {
        assert!(BackendError::Connection("refused".into()).is_retryable());
        assert!(
            BackendError::Timeout {
                operation: "helm list".into(),
                after: Duration::from_secs(30),
            }
            .is_retryable()
        );
        assert!(BackendError::from(tonic::Status::unavailable("down")).is_retryable());
        assert!(!BackendError::from(tonic::Status::invalid_argument("bad")).is_retryable());
    }

    #[test]
    fn test_timeout_display() {
        let err = BackendError::Timeout {
            operation: "helm version".into(),
            after: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "helm version timed out after 90s");
    }

    #[test]
    fn test_document_error_unwrapped_from_core() {
        let doc = helmsync_core::extract_containers("a: [").unwrap_err();
        let err = BackendError::from(CoreError::from(doc));
        assert!(matches!(err, BackendError::Document(_)));
    }

    #[test]
    fn test_release_not_found_detection() {
        let cli = BackendError::Command {
            command: "delete".into(),
            code: Some(1),
            stderr: "Error: release: \"web\" not found".into(),
        };
        assert!(cli.is_release_not_found("web"));
        assert!(!cli.is_release_not_found("api"));
        assert!(
            BackendError::from(tonic::Status::unknown("release: \"web\" not found"))
                .is_release_not_found("web")
        );
        assert!(BackendError::from(tonic::Status::not_found("gone")).is_release_not_found("web"));
        assert!(!BackendError::Connection("refused".into()).is_release_not_found("web"));
    }

    #[test]
    fn test_unrelated_not_found_is_an_error() {
        for stderr in [
            "Error: context \"prod\" not found in kubeconfig",
            "Error: plugin \"diff\" not found",
            "Error: configmaps \"web.v1\" not found",
        ] {
            let err = BackendError::Command {
                command: "delete".into(),
                code: Some(1),
                stderr: stderr.into(),
            };
            assert!(!err.is_release_not_found("web"), "{stderr}");
        }
        assert!(
            !BackendError::from(tonic::Status::unknown("context \"prod\" not found"))
                .is_release_not_found("web")
        );
    }

    #[test]
    fn test_sync_failure_display() {
        let failure = SyncFailure {
            index: 1,
            kind: SyncKind::Apply,
            resource_id: ResourceId::new("default", "web"),
            applied: 1,
            source: Box::new(BackendError::Connection("refused".into())),
        };
        assert_eq!(
            failure.to_string(),
            "sync action 1 (apply default/web) failed after 1 applied: cannot reach backend: refused"
        );
    }
}
