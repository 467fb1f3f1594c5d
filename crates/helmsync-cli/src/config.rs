//! Backend settings discovery
//!
//! Precedence, highest first: flags (and their environment variables), the
//! config file, then defaults discovered from the home directory and `PATH`.

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use helmsync_kube::{
    BackendConfig, BackendError, BackendKind, CliSettings, KubeServiceLookup, ReleaseBackend,
    ServiceEndpoint, ServiceLookup,
};

use crate::error::{CliError, Result};

/// File name under `<config_dir>/helmsync/`
pub const CONFIG_FILE: &str = "config.yaml";

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<BackendKind>,
    pub tiller_host: Option<String>,
    pub helm: Option<PathBuf>,
    pub helm_home: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub cluster_readiness: bool,
}

/// Resolved settings, ready to build a backend from
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendConfig,
}

impl Settings {
    /// Load the config file and merge overrides into it
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = load_file(config_file)?;
        let home = dirs::home_dir();
        let helm = which::which("helm").ok();
        Ok(Self {
            backend: resolve(file, overrides, home.as_deref(), helm),
        })
    }

    /// Build the selected backend. Called once per invocation.
    pub async fn connect(&self) -> Result<Box<dyn ReleaseBackend>> {
        let lookup = service_lookup(
            self.backend.cli.kubeconfig.as_deref(),
            self.backend.effective_cluster_readiness(),
        )
        .await;
        Ok(helmsync_kube::connect(&self.backend, lookup).await?)
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("helmsync").join(CONFIG_FILE))
}

/// Read a config file.
///
/// A missing default file yields `None`; a missing explicit file is an error.
pub fn load_file(explicit: Option<&Path>) -> Result<Option<BackendConfig>> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(None),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let config = serde_yaml::from_str(&text)
                .map_err(|e| CliError::config(format!("{}: {}", path.display(), e)))?;
            tracing::debug!(path = %path.display(), "loaded config file");
            Ok(Some(config))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Ok(None),
        Err(e) => Err(CliError::io(&path, e)),
    }
}

/// Merge file settings, overrides and discovered defaults
pub fn resolve(
    file: Option<BackendConfig>,
    overrides: &Overrides,
    home: Option<&Path>,
    discovered_helm: Option<PathBuf>,
) -> BackendConfig {
    let mut config = file.unwrap_or_default();

    if let Some(kind) = overrides.backend {
        config.kind = kind;
    }
    if let Some(host) = &overrides.tiller_host {
        config.rpc.tiller_host = host.clone();
    }
    if overrides.cluster_readiness {
        config.cluster_readiness = true;
    }

    if let Some(helm) = &overrides.helm {
        config.cli.executable = helm.clone();
    } else if config.cli.executable == CliSettings::default().executable {
        if let Some(found) = discovered_helm {
            config.cli.executable = found;
        }
    }

    config.cli.helm_home = overrides
        .helm_home
        .clone()
        .or(config.cli.helm_home.take())
        .or_else(|| home.map(|h| h.join(".helm")));
    config.cli.kubeconfig = overrides
        .kubeconfig
        .clone()
        .or(config.cli.kubeconfig.take())
        .or_else(|| home.map(|h| h.join(".kube").join("config")));

    config
}

/// Cluster lookup from the kubeconfig, or a detached one when no cluster
/// is reachable
async fn service_lookup(kubeconfig: Option<&Path>, readiness: bool) -> Arc<dyn ServiceLookup> {
    match kube_client(kubeconfig).await {
        Ok(client) => Arc::new(KubeServiceLookup::new(client).with_readiness(readiness)),
        Err(reason) => {
            tracing::warn!(%reason, "no cluster access, service addresses will be empty");
            Arc::new(DetachedLookup { reason })
        }
    }
}

async fn kube_client(kubeconfig: Option<&Path>) -> std::result::Result<kube::Client, String> {
    let config = match kubeconfig.filter(|path| path.exists()) {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| e.to_string())?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| e.to_string())?
        }
        None => kube::Config::infer().await.map_err(|e| e.to_string())?,
    };
    kube::Client::try_from(config).map_err(|e| e.to_string())
}

/// Lookup used without cluster credentials. Every call misses.
struct DetachedLookup {
    reason: String,
}

#[async_trait]
impl ServiceLookup for DetachedLookup {
    async fn lookup(&self, _namespace: &str, _name: &str) -> helmsync_kube::Result<ServiceEndpoint> {
        Err(BackendError::Connection(self.reason.clone()))
    }
}
