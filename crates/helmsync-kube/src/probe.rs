//! Server version probing

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BackendError, Result};

/// Matches the server line of `helm version`, e.g.
/// `Server: &version.Version{SemVer:"v2.5.0", GitCommit:"..."}`
static SERVER_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Server: &version\.Version\{SemVer:"(v[.0-9]+)"#).expect("valid regex")
});

/// Extract the server semantic version from `helm version` output.
///
/// The whole response is carried in the error when no server line matches.
pub fn parse_server_version(response: &str) -> Result<String> {
    SERVER_VERSION
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| BackendError::VersionNotFound {
            response: response.to_string(),
        })
}
