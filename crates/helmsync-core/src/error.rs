//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unparseable release line ({tokens} tokens, expected 10): << {line} >>")]
    UnparseableLine { line: String, tokens: usize },

    #[error("Invalid resource id '{id}': expected <namespace>/<name>")]
    InvalidResourceId { id: String },

    #[error("Failed to parse sync plan: {0}")]
    SyncPlan(#[from] serde_yaml::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Failure to decode a values or manifest document.
///
/// Extraction over documents is all-or-nothing: any of these aborts the call.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to decode document {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Document {index} is a {found}, expected a mapping")]
    NotAMapping { index: usize, found: &'static str },
}

pub type Result<T> = std::result::Result<T, CoreError>;
