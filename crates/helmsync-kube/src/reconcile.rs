//! Service reconciliation
//!
//! Turns enumerated releases into canonical [`Service`] records. Each release
//! is associated with the cluster service named `<release>-<chart>`, which is
//! what charts built on the usual `fullname` template helper produce. There is
//! no other association strategy.
//!
//! The release list and each service lookup are read at different instants.
//! A pass mixes states observed at different times and is not a consistent
//! snapshot of the cluster.

use std::collections::HashSet;

use helmsync_core::{
    Containers, ResourceId, Service, ServiceStatus, extract_containers, extract_image_refs,
};

use crate::error::Result;
use crate::lookup::{ServiceEndpoint, ServiceLookup};

/// Excuse used when a backend does not report rendered manifests
pub const NO_MANIFEST_EXCUSE: &str = "rendered manifest not reported by this backend";

/// One release as enumerated by a backend, before reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredRelease {
    pub name: String,
    pub namespace: String,
    /// Chart metadata name, without version
    pub chart_name: String,
    /// Raw backend release status
    pub status: String,
    /// Rendered manifest stream, when the backend reports it
    pub manifest: Option<String>,
    /// Chart values document, when the backend reports it
    pub values: Option<String>,
}

impl DiscoveredRelease {
    /// Name of the cluster service this release is expected to create
    pub fn service_name(&self) -> String {
        format!("{}-{}", self.name, self.chart_name)
    }

    pub fn service_id(&self) -> ResourceId {
        ResourceId::new(self.namespace.clone(), self.service_name())
    }
}

/// Build canonical services from enumerated releases.
///
/// Manifest and values extraction are strict: one malformed document fails
/// the whole pass. A failed address lookup only degrades that service to an
/// empty address with the release status. When two releases derive the same
/// ID the first one wins.
pub async fn reconcile(
    releases: Vec<DiscoveredRelease>,
    lookup: &dyn ServiceLookup,
) -> Result<Vec<Service>> {
    let mut seen = HashSet::new();
    let mut services = Vec::with_capacity(releases.len());

    for release in releases {
        let id = release.service_id();
        if !seen.insert(id.clone()) {
            tracing::warn!(release = %release.name, service = %id, "duplicate service id, skipping release");
            continue;
        }

        let containers = match release.manifest.as_deref() {
            Some(manifest) => Containers::known(extract_containers(manifest)?),
            None => Containers::unknown(NO_MANIFEST_EXCUSE),
        };

        let declared_images = match release.values.as_deref() {
            Some(values) => extract_image_refs(values)?,
            None => Vec::new(),
        };

        let endpoint = match lookup.lookup(&id.namespace, &id.name).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(service = %id, error = %e, "service lookup failed");
                ServiceEndpoint::default()
            }
        };

        let status = match endpoint.readiness {
            Some(readiness) => ServiceStatus::Cluster(readiness),
            None => ServiceStatus::Release(release.status),
        };

        tracing::debug!(service = %id, status = %status, "reconciled service");

        services.push(Service {
            id,
            address: endpoint.address,
            status,
            containers,
            declared_images,
        });
    }

    Ok(services)
}

/// Keep only services with a requested ID.
///
/// Requested IDs that are absent are ignored.
pub fn filter_services(services: Vec<Service>, ids: &[ResourceId]) -> Vec<Service> {
    let wanted: HashSet<&ResourceId> = ids.iter().collect();
    services
        .into_iter()
        .filter(|service| wanted.contains(&service.id))
        .collect()
}
