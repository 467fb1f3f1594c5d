//! Release backend abstraction
//!
//! One capability set, two transports. The variant is chosen once by
//! [`connect`] and everything downstream goes through the trait.

use async_trait::async_trait;
use std::sync::Arc;

use helmsync_core::{ResourceId, Service, SyncDef};

use crate::cli::{CliBackend, ProcessRunner};
use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;
use crate::lookup::ServiceLookup;
use crate::reconcile::filter_services;
use crate::rpc::{RpcBackend, TillerClient};
use crate::sync::SyncReport;

/// Operations every release backend exposes to the controller
#[async_trait]
pub trait ReleaseBackend: Send + Sync {
    /// Short backend name, used in errors and logs
    fn name(&self) -> &'static str;

    /// Enumerate services, optionally restricted to one namespace
    async fn services(&self, namespace: Option<&str>) -> Result<Vec<Service>>;

    /// Enumerate everything once, then keep the requested IDs
    async fn some_services(&self, ids: &[ResourceId]) -> Result<Vec<Service>> {
        let all = self.services(None).await?;
        Ok(filter_services(all, ids))
    }

    /// Check the backend is reachable, returning its version
    async fn ping(&self) -> Result<String>;

    /// Apply a plan in order, stopping at the first failure
    async fn sync(&self, def: &SyncDef) -> Result<SyncReport>;

    /// Export the deployed configuration
    async fn export(&self) -> Result<Vec<u8>>;
}

/// Build the backend selected by `config`.
///
/// The RPC variant dials Tiller here and fails if it cannot connect.
pub async fn connect(
    config: &BackendConfig,
    lookup: Arc<dyn ServiceLookup>,
) -> Result<Box<dyn ReleaseBackend>> {
    tracing::debug!(backend = %config.kind, "connecting release backend");

    match config.kind {
        BackendKind::Cli => {
            let runner = ProcessRunner::new(&config.cli);
            Ok(Box::new(CliBackend::new(Arc::new(runner), lookup)))
        }
        BackendKind::Rpc => {
            let client = TillerClient::connect(&config.rpc).await?;
            Ok(Box::new(RpcBackend::new(Arc::new(client), lookup)))
        }
    }
}
