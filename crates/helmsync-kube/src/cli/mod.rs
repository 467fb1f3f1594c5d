//! Backend driving the `helm` command line
//!
//! Releases come from `helm list`, which reports neither rendered manifests
//! nor values, so services from this backend always carry unknown
//! containers and no declared images.

mod runner;

pub use runner::{CommandOutput, HelmRunner, MockHelmRunner, ProcessRunner};

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::io::Write;
use std::sync::Arc;

use helmsync_core::{ReleaseSummary, ResourceId, Service, SyncAction, SyncDef, parse_release_list};

use crate::backend::ReleaseBackend;
use crate::error::{BackendError, Result};
use crate::lookup::ServiceLookup;
use crate::probe::parse_server_version;
use crate::reconcile::{DiscoveredRelease, reconcile};
use crate::rpc::namespace_conflict;
use crate::sync::{ActionOutcome, SyncReport, SyncTarget, execute_sync};

const BACKEND_NAME: &str = "cli";

/// Printed by `helm upgrade --install` when it falls back to an install
const INSTALL_MARKER: &str = "does not exist. Installing it now";

/// Apply payload for this backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliPayload {
    /// Chart reference, e.g. `stable/nginx` or a local path
    pub chart: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Values mapping, or a values document as a string
    #[serde(default)]
    pub values: Option<YamlValue>,
    #[serde(default)]
    pub wait: bool,
}

impl CliPayload {
    pub fn parse(action: &SyncAction) -> Result<Self> {
        let text = action.payload_str().ok_or_else(|| BackendError::Payload {
            resource_id: action.resource_id.clone(),
            message: "payload is not UTF-8".to_string(),
        })?;
        serde_yaml::from_str(text).map_err(|e| BackendError::Payload {
            resource_id: action.resource_id.clone(),
            message: e.to_string(),
        })
    }

    fn values_document(&self, resource_id: &ResourceId) -> Result<Option<String>> {
        match &self.values {
            None | Some(YamlValue::Null) => Ok(None),
            Some(YamlValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => serde_yaml::to_string(other)
                .map(Some)
                .map_err(|e| BackendError::Payload {
                    resource_id: resource_id.clone(),
                    message: e.to_string(),
                }),
        }
    }
}

/// [`ReleaseBackend`] over the helm executable
pub struct CliBackend {
    runner: Arc<dyn HelmRunner>,
    lookup: Arc<dyn ServiceLookup>,
}

impl CliBackend {
    pub fn new(runner: Arc<dyn HelmRunner>, lookup: Arc<dyn ServiceLookup>) -> Self {
        Self { runner, lookup }
    }

    /// Run helm and return stdout, failing on a non-zero exit
    async fn helm(&self, args: Vec<String>) -> Result<String> {
        let output = self.runner.run(&args).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(BackendError::Command {
                command: args.first().cloned().unwrap_or_default(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// `helm list`, parsed leniently
    pub async fn list_releases(&self, namespace: Option<&str>) -> Result<Vec<ReleaseSummary>> {
        let mut args = vec!["list".to_string()];
        if let Some(namespace) = namespace {
            args.push("--namespace".to_string());
            args.push(namespace.to_string());
        }
        let stdout = self.helm(args).await?;
        Ok(parse_release_list(&stdout))
    }
}

impl From<ReleaseSummary> for DiscoveredRelease {
    fn from(summary: ReleaseSummary) -> Self {
        DiscoveredRelease {
            name: summary.name,
            namespace: summary.namespace,
            chart_name: summary.chart_name,
            status: summary.status,
            manifest: None,
            values: None,
        }
    }
}

#[async_trait]
impl ReleaseBackend for CliBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn services(&self, namespace: Option<&str>) -> Result<Vec<Service>> {
        let releases = self.list_releases(namespace).await?;
        tracing::debug!(count = releases.len(), "listed releases");
        reconcile(releases.into_iter().map(Into::into).collect(), self.lookup.as_ref()).await
    }

    async fn ping(&self) -> Result<String> {
        let stdout = self.helm(vec!["version".to_string()]).await?;
        let version = parse_server_version(&stdout)?;
        tracing::debug!(version = %version, "helm server version");
        Ok(version)
    }

    async fn sync(&self, def: &SyncDef) -> Result<SyncReport> {
        execute_sync(self, def).await
    }

    async fn export(&self) -> Result<Vec<u8>> {
        Err(BackendError::Unsupported {
            operation: "export",
            backend: BACKEND_NAME,
        })
    }
}

#[async_trait]
impl SyncTarget for CliBackend {
    async fn apply(&self, action: &SyncAction) -> Result<ActionOutcome> {
        let payload = CliPayload::parse(action)?;
        let ResourceId { namespace, name } = &action.resource_id;

        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            name.clone(),
            payload.chart.clone(),
            "--namespace".to_string(),
            namespace.clone(),
        ];
        if let Some(version) = &payload.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }

        // Kept alive until helm has read it
        let values_file = match payload.values_document(&action.resource_id)? {
            Some(document) => {
                let mut file = tempfile::Builder::new()
                    .prefix("helmsync-values-")
                    .suffix(".yaml")
                    .tempfile()?;
                file.write_all(document.as_bytes())?;
                file.flush()?;
                args.push("--values".to_string());
                args.push(file.path().display().to_string());
                Some(file)
            }
            None => None,
        };

        if payload.wait {
            args.push("--wait".to_string());
        }

        let stdout = self.helm(args).await?;
        drop(values_file);

        if stdout.contains(INSTALL_MARKER) {
            Ok(ActionOutcome::Created)
        } else {
            Ok(ActionOutcome::Updated)
        }
    }

    async fn delete(&self, action: &SyncAction) -> Result<ActionOutcome> {
        let id = &action.resource_id;
        let filter = format!("^{}$", regex::escape(&id.name));
        let stdout = self
            .helm(vec!["list".to_string(), "--all".to_string(), filter])
            .await?;
        match parse_release_list(&stdout).into_iter().find(|r| r.name == id.name) {
            None => {
                tracing::debug!(resource = %id, "release already absent");
                return Ok(ActionOutcome::Absent);
            }
            Some(existing) if existing.namespace != id.namespace => {
                return Err(namespace_conflict(id, &existing.namespace));
            }
            Some(_) => {}
        }

        let args = vec!["delete".to_string(), "--purge".to_string(), id.name.clone()];
        match self.helm(args).await {
            Ok(_) => Ok(ActionOutcome::Deleted),
            Err(e) if e.is_release_not_found(&id.name) => {
                tracing::debug!(resource = %id, "release removed concurrently");
                Ok(ActionOutcome::Absent)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{MockServiceLookup, ServiceEndpoint};
    use helmsync_core::{StatusSource, SyncKind};

    const LIST_OUTPUT: &str = "NAME  \tREVISION\tUPDATED                 \tSTATUS  \tCHART                    \tNAMESPACE\n\
promop\t1       \tTue Jul 11 23:05:37 2017\tDEPLOYED\tprometheus-operator-0.0.6\tmonitoring\n\
pk8s  \t1       \tWed Jul 12 12:39:42 2017\tDEPLOYED\tprometheus-0.1.3         \tmonitoring\n";

    const VERSION_OUTPUT: &str = "Client: &version.Version{SemVer:\"v2.5.0\", GitCommit:\"012cb0a\", GitTreeState:\"clean\"}\n\
Server: &version.Version{SemVer:\"v2.5.0\", GitCommit:\"012cb0a\", GitTreeState:\"clean\"}\n";

    fn backend(runner: MockHelmRunner, lookup: MockServiceLookup) -> CliBackend {
        CliBackend::new(Arc::new(runner), Arc::new(lookup))
    }

    #[tokio::test]
    async fn test_services_from_helm_list() {
        let runner = MockHelmRunner::new().with_response(&["list"], CommandOutput::ok(LIST_OUTPUT));
        let lookup = MockServiceLookup::new().with_endpoint(
            "monitoring",
            "pk8s-prometheus",
            ServiceEndpoint::new("10.0.0.9"),
        );
        let backend = backend(runner.clone(), lookup);

        let services = backend.services(None).await.unwrap();
        let ids: Vec<String> = services.iter().map(|s| s.id.to_string()).collect();

        assert_eq!(
            ids,
            vec!["monitoring/promop-prometheus-operator", "monitoring/pk8s-prometheus"]
        );
        assert_eq!(services[0].address, "");
        assert_eq!(services[1].address, "10.0.0.9");
        assert!(services.iter().all(|s| s.status.source() == StatusSource::Release));
        assert!(services.iter().all(|s| s.containers.as_known().is_none()));
        assert_eq!(runner.calls(), vec![vec!["list".to_string()]]);
    }

    #[tokio::test]
    async fn test_services_namespace_filter_passed() {
        let runner = MockHelmRunner::new().with_response(&["list"], CommandOutput::ok(LIST_OUTPUT));
        let backend = backend(runner.clone(), MockServiceLookup::new());

        backend.services(Some("monitoring")).await.unwrap();
        assert_eq!(runner.calls()[0], vec!["list", "--namespace", "monitoring"]);
    }

    #[tokio::test]
    async fn test_some_services_filters() {
        let runner = MockHelmRunner::new().with_response(&["list"], CommandOutput::ok(LIST_OUTPUT));
        let backend = backend(runner, MockServiceLookup::new());

        let wanted = vec![
            ResourceId::new("monitoring", "pk8s-prometheus"),
            ResourceId::new("default", "absent"),
        ];
        let services = backend.some_services(&wanted).await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, wanted[0]);
    }

    #[tokio::test]
    async fn test_list_failure_is_command_error() {
        let runner = MockHelmRunner::new()
            .with_response(&["list"], CommandOutput::failed(1, "Error: could not find tiller\n"));
        let err = backend(runner, MockServiceLookup::new()).services(None).await.unwrap_err();

        match err {
            BackendError::Command { command, stderr, .. } => {
                assert_eq!(command, "list");
                assert_eq!(stderr, "Error: could not find tiller");
            }
            other => panic!("expected command error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let runner = MockHelmRunner::new().with_response(&["version"], CommandOutput::ok(VERSION_OUTPUT));
        assert_eq!(backend(runner, MockServiceLookup::new()).ping().await.unwrap(), "v2.5.0");
    }

    #[tokio::test]
    async fn test_ping_without_server_line() {
        let runner = MockHelmRunner::new()
            .with_response(&["version"], CommandOutput::ok("Client: &version.Version{SemVer:\"v2.5.0\"}\n"));
        let err = backend(runner, MockServiceLookup::new()).ping().await.unwrap_err();
        assert!(matches!(err, BackendError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_export_unsupported() {
        let err = backend(MockHelmRunner::new(), MockServiceLookup::new())
            .export()
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_sync_apply_and_delete() {
        let runner = MockHelmRunner::new()
            .with_response(
                &["upgrade"],
                CommandOutput::ok("Release \"web\" does not exist. Installing it now.\n"),
            )
            .with_response(&["list"], CommandOutput::ok(""));
        let backend = backend(runner.clone(), MockServiceLookup::new());

        let def = SyncDef::from_yaml(
            r#"
actions:
  - kind: apply
    resource: default/web
    payload:
      chart: stable/nginx
      version: 1.2.3
      wait: true
      values:
        image:
          repository: nginx
          tag: "1.14"
  - kind: delete
    resource: default/old
"#,
        )
        .unwrap();

        let report = backend.sync(&def).await.unwrap();
        assert_eq!(report.actions[0].outcome, ActionOutcome::Created);
        assert_eq!(report.actions[1].outcome, ActionOutcome::Absent);
        assert_eq!(report.actions[1].kind, SyncKind::Delete);

        let calls = runner.calls();
        let upgrade = &calls[0];
        assert_eq!(
            &upgrade[..6],
            &["upgrade", "--install", "web", "stable/nginx", "--namespace", "default"]
        );
        assert!(upgrade.windows(2).any(|w| w == ["--version", "1.2.3"]));
        assert_eq!(upgrade.last().map(String::as_str), Some("--wait"));
        assert_eq!(calls[1], vec!["list", "--all", "^old$"]);
        assert_eq!(calls.len(), 2);

        let values: YamlValue = serde_yaml::from_str(&runner.values_files()[0]).unwrap();
        assert_eq!(values["image"]["tag"], YamlValue::from("1.14"));
    }

    #[tokio::test]
    async fn test_sync_upgrade_existing_is_update() {
        let runner = MockHelmRunner::new().with_response(
            &["upgrade"],
            CommandOutput::ok("Release \"web\" has been upgraded. Happy Helming!\n"),
        );
        let backend = backend(runner, MockServiceLookup::new());
        let def = SyncDef::new(vec![SyncAction::apply(
            ResourceId::new("default", "web"),
            "chart: stable/nginx\n",
        )]);

        let report = backend.sync(&def).await.unwrap();
        assert_eq!(report.actions[0].outcome, ActionOutcome::Updated);
    }

    #[tokio::test]
    async fn test_sync_bad_payload_stops_plan() {
        let runner = MockHelmRunner::new().with_response(&["upgrade"], CommandOutput::ok(""));
        let backend = backend(runner.clone(), MockServiceLookup::new());
        let def = SyncDef::new(vec![
            SyncAction::apply(ResourceId::new("default", "a"), "chart: stable/a\n"),
            SyncAction::apply(ResourceId::new("default", "b"), "unknown: field\n"),
            SyncAction::apply(ResourceId::new("default", "c"), "chart: stable/c\n"),
        ]);

        let err = backend.sync(&def).await.unwrap_err();
        match err {
            BackendError::Sync(failure) => {
                assert_eq!(failure.index, 1);
                assert!(matches!(*failure.source, BackendError::Payload { .. }));
            }
            other => panic!("expected sync failure, got {:?}", other),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    fn list_with(name: &str, namespace: &str) -> CommandOutput {
        CommandOutput::ok(format!(
            "NAME\tREVISION\tUPDATED\tSTATUS\tCHART\tNAMESPACE\n\
{name}\t3\tTue Jul 11 23:05:37 2017\tDEPLOYED\tnginx-1.0.0\t{namespace}\n"
        ))
    }

    fn delete_plan(resource: &str) -> SyncDef {
        SyncDef::new(vec![SyncAction::delete(resource.parse().unwrap())])
    }

    #[tokio::test]
    async fn test_delete_existing_release() {
        let runner = MockHelmRunner::new()
            .with_response(&["list"], list_with("web", "default"))
            .with_response(&["delete"], CommandOutput::ok("release \"web\" deleted\n"));
        let backend = backend(runner.clone(), MockServiceLookup::new());

        let report = backend.sync(&delete_plan("default/web")).await.unwrap();
        assert_eq!(report.actions[0].outcome, ActionOutcome::Deleted);
        assert_eq!(runner.calls()[1], vec!["delete", "--purge", "web"]);
    }

    #[tokio::test]
    async fn test_delete_leaves_same_name_in_other_namespace() {
        let runner = MockHelmRunner::new()
            .with_response(&["list"], list_with("web", "staging"))
            .with_response(&["delete"], CommandOutput::ok(""));
        let backend = backend(runner.clone(), MockServiceLookup::new());

        match backend.sync(&delete_plan("default/web")).await.unwrap_err() {
            BackendError::Sync(failure) => {
                assert!(matches!(*failure.source, BackendError::NamespaceConflict { .. }))
            }
            other => panic!("expected sync failure, got {:?}", other),
        }
        assert!(runner.calls().iter().all(|c| c[0] != "delete"));
    }

    #[tokio::test]
    async fn test_delete_unrelated_not_found_halts_plan() {
        let runner = MockHelmRunner::new()
            .with_response(&["list"], list_with("web", "default"))
            .with_response(
                &["delete"],
                CommandOutput::failed(1, "Error: context \"prod\" not found in kubeconfig"),
            );
        let backend = backend(runner.clone(), MockServiceLookup::new());
        let def = SyncDef::new(vec![
            SyncAction::delete(ResourceId::new("default", "web")),
            SyncAction::delete(ResourceId::new("default", "api")),
        ]);

        match backend.sync(&def).await.unwrap_err() {
            BackendError::Sync(failure) => {
                assert_eq!(failure.index, 0);
                assert!(matches!(*failure.source, BackendError::Command { .. }));
            }
            other => panic!("expected sync failure, got {:?}", other),
        }
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_release_gone_between_list_and_delete() {
        let runner = MockHelmRunner::new()
            .with_response(&["list"], list_with("web", "default"))
            .with_response(&["delete"], CommandOutput::failed(1, "Error: release: \"web\" not found"));
        let backend = backend(runner, MockServiceLookup::new());

        let report = backend.sync(&delete_plan("default/web")).await.unwrap();
        assert_eq!(report.actions[0].outcome, ActionOutcome::Absent);
    }
}
