//! Per-service address and readiness lookup
//!
//! The reconciler asks this collaborator for the cluster address of each
//! derived service name. A lookup that fails is not fatal to enumeration;
//! see [`crate::reconcile`].

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service as K8sService;
use kube::Api;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{BackendError, Result};

/// Cluster readiness value for a fully rolled-out workload
pub const STATUS_READY: &str = "ready";

/// Cluster readiness value for a workload still rolling out
pub const STATUS_UPDATING: &str = "updating";

/// What the cluster knows about one service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Cluster-assigned address, empty when none is assigned
    pub address: String,

    /// Cluster readiness, when the lookup can supply it
    pub readiness: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            readiness: None,
        }
    }

    pub fn with_readiness(mut self, readiness: impl Into<String>) -> Self {
        self.readiness = Some(readiness.into());
        self
    }
}

/// Look up a cluster service by namespace and name
#[async_trait]
pub trait ServiceLookup: Send + Sync {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<ServiceEndpoint>;
}

/// Kubernetes-backed lookup
///
/// Address comes from the Service's `spec.clusterIP`. With readiness
/// enabled, the Deployment of the same name is read and reported as
/// `ready` once every replica is updated, ready and available.
#[derive(Clone)]
pub struct KubeServiceLookup {
    client: kube::Client,
    readiness: bool,
}

impl KubeServiceLookup {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            readiness: false,
        }
    }

    pub fn with_readiness(mut self, readiness: bool) -> Self {
        self.readiness = readiness;
        self
    }

    async fn deployment_readiness(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);

        let deployment = match api.get(name).await {
            Ok(d) => d,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(None),
            Err(e) => return Err(BackendError::Kube(e)),
        };

        let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let status = deployment.status.as_ref();
        let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
        let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
        let available = status.and_then(|s| s.available_replicas).unwrap_or(0);

        Ok(Some(readiness_label(desired, ready, updated, available).to_string()))
    }
}

/// Map replica counts to a readiness value
pub fn readiness_label(desired: i32, ready: i32, updated: i32, available: i32) -> &'static str {
    if ready == desired && updated == desired && available == desired {
        STATUS_READY
    } else {
        STATUS_UPDATING
    }
}

#[async_trait]
impl ServiceLookup for KubeServiceLookup {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<ServiceEndpoint> {
        let api: Api<K8sService> = Api::namespaced(self.client.clone(), namespace);
        let service = api.get(name).await?;

        let address = service
            .spec
            .and_then(|spec| spec.cluster_ip)
            .unwrap_or_default();

        // A failed readiness read only loses readiness, never the address
        let readiness = if self.readiness {
            match self.deployment_readiness(namespace, name).await {
                Ok(readiness) => readiness,
                Err(e) => {
                    tracing::warn!(namespace, name, error = %e, "deployment readiness unavailable");
                    None
                }
            }
        } else {
            None
        };

        Ok(ServiceEndpoint { address, readiness })
    }
}

/// In-memory lookup for testing
#[derive(Clone, Default)]
pub struct MockServiceLookup {
    endpoints: Arc<RwLock<HashMap<(String, String), ServiceEndpoint>>>,
    calls: Arc<RwLock<Vec<(String, String)>>>,
}

impl MockServiceLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint; every other name fails to resolve
    pub fn with_endpoint(self, namespace: &str, name: &str, endpoint: ServiceEndpoint) -> Self {
        if let Ok(mut endpoints) = self.endpoints.write() {
            endpoints.insert((namespace.to_string(), name.to_string()), endpoint);
        }
        self
    }

    /// Every `(namespace, name)` looked up so far, in order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ServiceLookup for MockServiceLookup {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<ServiceEndpoint> {
        if let Ok(mut calls) = self.calls.write() {
            calls.push((namespace.to_string(), name.to_string()));
        }

        let endpoints = self
            .endpoints
            .read()
            .map_err(|e| BackendError::Connection(format!("lock poisoned: {}", e)))?;

        endpoints
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                BackendError::Connection(format!("services \"{}\" not found in {}", name, namespace))
            })
    }
}
