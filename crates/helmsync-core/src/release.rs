//! Release listing as reported by the helm command line
//!
//! `helm list` prints a header line followed by one release per line:
//!
//! ```text
//! NAME    REVISION  UPDATED                   STATUS    CHART                      NAMESPACE
//! promop  1         Tue Jul 11 23:05:37 2017  DEPLOYED  prometheus-operator-0.0.6  monitoring
//! ```
//!
//! Parsing is lenient: a malformed line is skipped, an unparseable revision
//! becomes 0 and an unparseable date becomes `None`. None of these fail the
//! listing as a whole.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Number of whitespace-separated tokens in a release line
pub const RELEASE_LINE_TOKENS: usize = 10;

/// Layout of the UPDATED column, e.g. `Tue Jul 11 23:05:37 2017`
pub const DEPLOY_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// One release as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    /// Release name, unique within a namespace
    pub name: String,

    /// Revision number (0 when the backend value did not parse)
    pub revision: u32,

    /// Last deploy time (`None` when the backend value did not parse)
    pub deploy_time: Option<NaiveDateTime>,

    /// Raw backend status, e.g. `DEPLOYED`
    pub status: String,

    /// Chart name, split from the compound `<chart>-<version>` token
    pub chart_name: String,

    /// Chart version, split from the compound `<chart>-<version>` token
    pub chart_version: String,

    /// Kubernetes namespace
    pub namespace: String,
}

impl ReleaseSummary {
    /// Classified form of the raw status
    pub fn status_kind(&self) -> ReleaseStatus {
        ReleaseStatus::classify(&self.status)
    }
}

/// Coarse classification of a backend release status
///
/// Note: This enum is non-exhaustive - new variants may be added in future versions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Failed,
    Pending,
    Deleted,
    Superseded,
}

impl ReleaseStatus {
    /// Classify a free-text backend status (case-insensitive)
    pub fn classify(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "DEPLOYED" => Self::Deployed,
            "FAILED" => Self::Failed,
            "DELETED" | "DELETING" => Self::Deleted,
            "SUPERSEDED" => Self::Superseded,
            s if s.starts_with("PENDING") => Self::Pending,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Deleted => "deleted",
            Self::Superseded => "superseded",
        };
        write!(f, "{}", s)
    }
}

/// Parse one release line.
///
/// Rejects any line that does not have exactly ten tokens.
pub fn parse_release_line(line: &str) -> Result<ReleaseSummary> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() != RELEASE_LINE_TOKENS {
        return Err(CoreError::UnparseableLine {
            line: line.to_string(),
            tokens: words.len(),
        });
    }

    let revision = words[1].parse::<u32>().unwrap_or_else(|e| {
        tracing::debug!(revision = words[1], error = %e, "unparseable revision, using 0");
        0
    });

    let stamp = words[2..7].join(" ");
    let deploy_time = match NaiveDateTime::parse_from_str(&stamp, DEPLOY_TIME_FORMAT) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::debug!(deploy_time = %stamp, error = %e, "unparseable deploy time");
            None
        }
    };

    let (chart_name, chart_version) = split_chart_token(words[8]);

    Ok(ReleaseSummary {
        name: words[0].to_string(),
        revision,
        deploy_time,
        status: words[7].to_string(),
        chart_name,
        chart_version,
        namespace: words[9].to_string(),
    })
}

/// Parse a whole `helm list` response.
///
/// The first line is a header and is always discarded. Blank lines are
/// ignored; malformed lines are logged and skipped.
pub fn parse_release_list(output: &str) -> Vec<ReleaseSummary> {
    output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_release_line(line) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("skipping release line: {}", e);
                None
            }
        })
        .collect()
}

/// Split `<chart>-<version>` on its last `-`.
///
/// A token without any `-` is taken to be a bare chart name with no version.
fn split_chart_token(token: &str) -> (String, String) {
    match token.rsplit_once('-') {
        Some((chart, version)) => (chart.to_string(), version.to_string()),
        None => (token.to_string(), String::new()),
    }
}
