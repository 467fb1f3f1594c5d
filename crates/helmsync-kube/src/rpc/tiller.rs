//! Tiller ReleaseService client using `tonic`
//!
//! Only the messages and fields this crate reads or routes are declared.
//! Tag numbers follow the `hapi` protobuf definitions shipped with Helm 2 and
//! must stay exact for wire compatibility. Unknown fields sent by the server
//! are skipped by the decoder.
//!
//! Chart archives are routed as raw bytes: the `chart` field of install and
//! update requests is declared as `bytes`, which encodes identically to an
//! embedded message on the wire.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tonic::Request;

use super::ReleaseRpc;
use crate::config::RpcSettings;
use crate::error::{BackendError, Result};

// Method paths

const LIST_RELEASES: &str = "/hapi.services.tiller.ReleaseService/ListReleases";
const GET_VERSION: &str = "/hapi.services.tiller.ReleaseService/GetVersion";
const INSTALL_RELEASE: &str = "/hapi.services.tiller.ReleaseService/InstallRelease";
const UPDATE_RELEASE: &str = "/hapi.services.tiller.ReleaseService/UpdateRelease";
const UNINSTALL_RELEASE: &str = "/hapi.services.tiller.ReleaseService/UninstallRelease";

/// Request header carrying the client version
pub const API_CLIENT_HEADER: &str = "x-helm-api-client";

// hapi.release

/// Release status code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Unknown = 0,
    Deployed = 1,
    Deleted = 2,
    Superseded = 3,
    Failed = 4,
    Deleting = 5,
    PendingInstall = 6,
    PendingUpgrade = 7,
    PendingRollback = 8,
}

impl StatusCode {
    /// Name as printed by `helm list`
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Deployed => "DEPLOYED",
            Self::Deleted => "DELETED",
            Self::Superseded => "SUPERSEDED",
            Self::Failed => "FAILED",
            Self::Deleting => "DELETING",
            Self::PendingInstall => "PENDING_INSTALL",
            Self::PendingUpgrade => "PENDING_UPGRADE",
            Self::PendingRollback => "PENDING_ROLLBACK",
        }
    }

    /// Codes of releases that still occupy their name
    pub fn live() -> Vec<i32> {
        [
            Self::Deployed,
            Self::Failed,
            Self::Deleting,
            Self::PendingInstall,
            Self::PendingUpgrade,
            Self::PendingRollback,
        ]
        .into_iter()
        .map(|code| code as i32)
        .collect()
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Status {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub code: i32,
}

impl Status {
    pub fn code_name(&self) -> &'static str {
        StatusCode::try_from(self.code)
            .unwrap_or(StatusCode::Unknown)
            .name()
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Info {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Release {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub info: Option<Info>,
    #[prost(message, optional, tag = "3")]
    pub chart: Option<Chart>,
    /// User-supplied values
    #[prost(message, optional, tag = "4")]
    pub config: Option<Config>,
    #[prost(string, tag = "5")]
    pub manifest: String,
    #[prost(int32, tag = "7")]
    pub version: i32,
    #[prost(string, tag = "8")]
    pub namespace: String,
}

impl Release {
    pub fn status_name(&self) -> &'static str {
        self.info
            .as_ref()
            .and_then(|info| info.status.as_ref())
            .map(Status::code_name)
            .unwrap_or("UNKNOWN")
    }

    pub fn chart_name(&self) -> &str {
        self.chart
            .as_ref()
            .and_then(|chart| chart.metadata.as_ref())
            .map(|metadata| metadata.name.as_str())
            .unwrap_or_default()
    }

    /// Default values shipped with the chart
    pub fn chart_values(&self) -> Option<&str> {
        self.chart
            .as_ref()
            .and_then(|chart| chart.values.as_ref())
            .map(|values| values.raw.as_str())
    }
}

// hapi.chart

#[derive(Clone, PartialEq, prost::Message)]
pub struct Chart {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
    #[prost(message, optional, tag = "4")]
    pub values: Option<Config>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Metadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub version: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Config {
    #[prost(string, tag = "1")]
    pub raw: String,
}

// hapi.version

#[derive(Clone, PartialEq, prost::Message)]
pub struct Version {
    #[prost(string, tag = "1")]
    pub sem_ver: String,
    #[prost(string, tag = "2")]
    pub git_commit: String,
    #[prost(string, tag = "3")]
    pub git_tree_state: String,
}

// hapi.services.tiller

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListReleasesRequest {
    #[prost(int64, tag = "1")]
    pub limit: i64,
    #[prost(string, tag = "2")]
    pub offset: String,
    #[prost(int32, tag = "3")]
    pub sort_by: i32,
    /// Regular expression matched against release names
    #[prost(string, tag = "4")]
    pub filter: String,
    #[prost(int32, tag = "5")]
    pub sort_order: i32,
    /// Empty means deployed releases only
    #[prost(enumeration = "StatusCode", repeated, tag = "6")]
    pub status_codes: Vec<i32>,
    #[prost(string, tag = "7")]
    pub namespace: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListReleasesResponse {
    #[prost(int64, tag = "1")]
    pub count: i64,
    /// Offset of the next page, empty on the last page
    #[prost(string, tag = "2")]
    pub next: String,
    #[prost(int64, tag = "3")]
    pub total: i64,
    #[prost(message, repeated, tag = "4")]
    pub releases: Vec<Release>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetVersionRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetVersionResponse {
    #[prost(message, optional, tag = "1")]
    pub version: Option<Version>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InstallReleaseRequest {
    /// Encoded `hapi.chart.Chart`
    #[prost(bytes = "vec", tag = "1")]
    pub chart: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub values: Option<Config>,
    #[prost(bool, tag = "3")]
    pub dry_run: bool,
    #[prost(string, tag = "4")]
    pub name: String,
    #[prost(bool, tag = "5")]
    pub disable_hooks: bool,
    #[prost(bool, tag = "6")]
    pub reuse_name: bool,
    /// Seconds
    #[prost(int64, tag = "7")]
    pub timeout: i64,
    #[prost(string, tag = "8")]
    pub namespace: String,
    #[prost(bool, tag = "9")]
    pub wait: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InstallReleaseResponse {
    #[prost(message, optional, tag = "1")]
    pub release: Option<Release>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateReleaseRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    /// Encoded `hapi.chart.Chart`
    #[prost(bytes = "vec", tag = "2")]
    pub chart: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub values: Option<Config>,
    #[prost(bool, tag = "4")]
    pub dry_run: bool,
    #[prost(bool, tag = "5")]
    pub disable_hooks: bool,
    #[prost(bool, tag = "6")]
    pub recreate: bool,
    /// Seconds
    #[prost(int64, tag = "7")]
    pub timeout: i64,
    #[prost(bool, tag = "8")]
    pub reset_values: bool,
    #[prost(bool, tag = "9")]
    pub wait: bool,
    #[prost(bool, tag = "10")]
    pub reuse_values: bool,
    #[prost(bool, tag = "11")]
    pub force: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateReleaseResponse {
    #[prost(message, optional, tag = "1")]
    pub release: Option<Release>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UninstallReleaseRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bool, tag = "2")]
    pub disable_hooks: bool,
    #[prost(bool, tag = "3")]
    pub purge: bool,
    /// Seconds
    #[prost(int64, tag = "4")]
    pub timeout: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UninstallReleaseResponse {
    #[prost(message, optional, tag = "1")]
    pub release: Option<Release>,
    #[prost(string, tag = "2")]
    pub info: String,
}

// Client

/// Adds the `x-helm-api-client` header Tiller uses for version checks
#[derive(Clone)]
struct ApiClientInterceptor {
    version: AsciiMetadataValue,
}

impl Interceptor for ApiClientInterceptor {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, tonic::Status> {
        request
            .metadata_mut()
            .insert(API_CLIENT_HEADER, self.version.clone());
        Ok(request)
    }
}

type InnerGrpc = tonic::client::Grpc<InterceptedService<Channel, ApiClientInterceptor>>;

/// Connected Tiller client.
///
/// One channel per client; clones share it.
#[derive(Clone)]
pub struct TillerClient {
    inner: InnerGrpc,
    host: String,
    call_timeout: Duration,
}

impl std::fmt::Debug for TillerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TillerClient")
            .field("host", &self.host)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl TillerClient {
    /// Dial Tiller, failing if the connection cannot be made within the
    /// connect timeout
    pub async fn connect(settings: &RpcSettings) -> Result<Self> {
        let host = settings.tiller_host.trim_end_matches('/');
        let url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };

        let version: AsciiMetadataValue = settings.api_client_version.parse().map_err(|_| {
            BackendError::Connection(format!(
                "invalid api client version '{}'",
                settings.api_client_version
            ))
        })?;

        let channel = Channel::from_shared(url.clone())
            .map_err(|e| BackendError::Connection(format!("invalid tiller host '{}': {}", url, e)))?
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.call_timeout)
            .connect()
            .await
            .map_err(|e| BackendError::Connection(format!("cannot connect to tiller at {}: {}", url, e)))?;

        tracing::debug!(host = %url, "connected to tiller");

        let intercepted = InterceptedService::new(channel, ApiClientInterceptor { version });

        Ok(Self {
            inner: tonic::client::Grpc::new(intercepted),
            host: url,
            call_timeout: settings.call_timeout,
        })
    }

    async fn ready(&self) -> Result<InnerGrpc> {
        let mut client = self.inner.clone();
        client
            .ready()
            .await
            .map_err(|e| BackendError::Connection(format!("tiller channel not ready: {}", e)))?;
        Ok(client)
    }

    /// Bound a call by the configured deadline
    async fn bounded<T, F>(&self, path: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| BackendError::Timeout {
                operation: path.to_string(),
                after: self.call_timeout,
            })?
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.bounded(path, async {
            let mut client = self.ready().await?;
            let codec = ProstCodec::<Req, Resp>::default();
            let response = client
                .unary(Request::new(request), PathAndQuery::from_static(path), codec)
                .await?;
            Ok(response.into_inner())
        })
        .await
    }

    async fn list_page(&self, request: ListReleasesRequest) -> Result<(Vec<Release>, String)> {
        let mut client = self.ready().await?;
        let codec = ProstCodec::<ListReleasesRequest, ListReleasesResponse>::default();
        let mut stream = client
            .server_streaming(
                Request::new(request),
                PathAndQuery::from_static(LIST_RELEASES),
                codec,
            )
            .await?
            .into_inner();

        let mut releases = Vec::new();
        let mut next = String::new();
        while let Some(batch) = stream.message().await? {
            releases.extend(batch.releases);
            if !batch.next.is_empty() {
                next = batch.next;
            }
        }
        Ok((releases, next))
    }
}

#[async_trait]
impl ReleaseRpc for TillerClient {
    async fn list_releases(&self, request: ListReleasesRequest) -> Result<Vec<Release>> {
        self.bounded(LIST_RELEASES, async {
            let mut releases = Vec::new();
            let mut page = request;
            loop {
                let (batch, next) = self.list_page(page.clone()).await?;
                releases.extend(batch);
                if next.is_empty() || next == page.offset {
                    break;
                }
                page.offset = next;
            }
            Ok(releases)
        })
        .await
    }

    async fn get_version(&self) -> Result<Option<Version>> {
        let response: GetVersionResponse = self.unary(GET_VERSION, GetVersionRequest {}).await?;
        Ok(response.version)
    }

    async fn install_release(&self, request: InstallReleaseRequest) -> Result<Option<Release>> {
        let response: InstallReleaseResponse = self.unary(INSTALL_RELEASE, request).await?;
        Ok(response.release)
    }

    async fn update_release(&self, request: UpdateReleaseRequest) -> Result<Option<Release>> {
        let response: UpdateReleaseResponse = self.unary(UPDATE_RELEASE, request).await?;
        Ok(response.release)
    }

    async fn uninstall_release(&self, request: UninstallReleaseRequest) -> Result<Option<Release>> {
        let response: UninstallReleaseResponse = self.unary(UNINSTALL_RELEASE, request).await?;
        Ok(response.release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_release_decodes_from_hapi_fields() {
        let release = Release {
            name: "promop".to_string(),
            info: Some(Info {
                status: Some(Status {
                    code: StatusCode::Deployed as i32,
                }),
            }),
            chart: Some(Chart {
                metadata: Some(Metadata {
                    name: "prometheus-operator".to_string(),
                    version: "0.0.6".to_string(),
                }),
                values: Some(Config {
                    raw: "image:\n  repository: quay.io/coreos/prometheus-operator\n  tag: v0.10.1\n"
                        .to_string(),
                }),
            }),
            config: None,
            manifest: "kind: Service\n".to_string(),
            version: 1,
            namespace: "monitoring".to_string(),
        };

        let decoded = Release::decode(release.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, release);
        assert_eq!(decoded.status_name(), "DEPLOYED");
        assert_eq!(decoded.chart_name(), "prometheus-operator");
        assert!(decoded.chart_values().unwrap().contains("tag: v0.10.1"));
    }

    #[test]
    fn test_unknown_fields_skipped() {
        // Field 6 (hooks) is not declared; a decoder must tolerate it
        let mut bytes = Release {
            name: "web".to_string(),
            ..Default::default()
        }
        .encode_to_vec();
        bytes.extend_from_slice(&[0x32, 0x02, 0x0a, 0x00]);

        let decoded = Release::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.name, "web");
    }

    #[test]
    fn test_chart_bytes_encode_as_embedded_message() {
        let chart = Chart {
            metadata: Some(Metadata {
                name: "nginx".to_string(),
                version: "1.0.0".to_string(),
            }),
            values: None,
        };
        let request = InstallReleaseRequest {
            chart: chart.encode_to_vec(),
            name: "web".to_string(),
            ..Default::default()
        };

        #[derive(Clone, PartialEq, prost::Message)]
        struct TypedInstall {
            #[prost(message, optional, tag = "1")]
            chart: Option<Chart>,
            #[prost(string, tag = "4")]
            name: String,
        }

        let typed = TypedInstall::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(typed.chart, Some(chart));
        assert_eq!(typed.name, "web");
    }

    #[test]
    fn test_status_names() {
        assert_eq!(Status { code: 7 }.code_name(), "PENDING_UPGRADE");
        assert_eq!(Status { code: 99 }.code_name(), "UNKNOWN");
        assert!(!StatusCode::live().contains(&(StatusCode::Deleted as i32)));
    }

    #[test]
    fn test_release_without_chart() {
        let release = Release::default();
        assert_eq!(release.chart_name(), "");
        assert!(release.chart_values().is_none());
        assert_eq!(release.status_name(), "UNKNOWN");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let settings = RpcSettings {
            tiller_host: "127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let err = TillerClient::connect(&settings).await.unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)));
        assert!(err.is_retryable());
    }
}
