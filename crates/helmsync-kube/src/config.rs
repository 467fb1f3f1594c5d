//! Backend configuration
//!
//! Plain values only. Nothing in this crate reads the process environment;
//! discovery of paths and endpoints happens in the binary, which fills in a
//! [`BackendConfig`] and hands it to [`crate::connect`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default Tiller endpoint inside a cluster
pub const DEFAULT_TILLER_HOST: &str = "tiller-deploy:44134";

/// Client version announced to Tiller
pub const DEFAULT_API_CLIENT_VERSION: &str = "v2.5.0";

/// Which backend transport to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The `helm` executable
    #[default]
    Cli,
    /// The Tiller ReleaseService over gRPC
    Rpc,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Rpc => "rpc",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cli" => Ok(Self::Cli),
            "rpc" | "grpc" | "tiller" => Ok(Self::Rpc),
            other => Err(format!("unknown backend '{}', expected cli or rpc", other)),
        }
    }
}

/// Settings for the `helm` executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CliSettings {
    /// Path to the `helm` binary
    pub executable: PathBuf,

    /// Passed to helm as `HELM_HOME`
    pub helm_home: Option<PathBuf>,

    /// Passed to helm as `KUBECONFIG`
    pub kubeconfig: Option<PathBuf>,

    /// Deadline for each helm invocation
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("helm"),
            helm_home: None,
            kubeconfig: None,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Settings for the Tiller connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RpcSettings {
    /// `host:port` of the Tiller service
    pub tiller_host: String,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for each RPC, including draining streamed responses
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,

    /// Value of the `x-helm-api-client` request header
    pub api_client_version: String,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            tiller_host: DEFAULT_TILLER_HOST.to_string(),
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(300),
            api_client_version: DEFAULT_API_CLIENT_VERSION.to_string(),
        }
    }
}

/// Full backend configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub cli: CliSettings,
    pub rpc: RpcSettings,

    /// Report `ready`/`updating` from the cluster workload instead of the
    /// raw release status, where the backend supports it
    pub cluster_readiness: bool,
}

impl BackendConfig {
    /// Cluster readiness is only queried for backends that enumerate full
    /// release records
    pub fn effective_cluster_readiness(&self) -> bool {
        self.cluster_readiness && self.kind == BackendKind::Rpc
    }
}
