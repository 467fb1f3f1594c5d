//! Helmsync Kube - Release backends for helmsync
//!
//! This crate provides:
//! - **Backends**: One [`ReleaseBackend`] capability set over two transports,
//!   the `helm` executable ([`CliBackend`]) and Tiller's gRPC
//!   ReleaseService ([`RpcBackend`]), selected once by [`connect`]
//! - **Reconciliation**: Releases become canonical services, associated with
//!   the cluster service named `<release>-<chart>`
//! - **Service Lookup**: Cluster address and readiness per service
//! - **Sync Execution**: Ordered, halt-on-first-failure plan application
//! - **Probing**: Backend reachability and server version
//!
//! Every operation completes before it returns; nothing runs in the
//! background. A backend owns one process context or one channel for its
//! lifetime. Callers wanting parallel work use separate backends.
//!
//! Enumeration is not a snapshot: the release list is read first and each
//! service lookup afterwards, so one result can mix states from different
//! instants.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod lookup;
pub mod probe;
pub mod reconcile;
pub mod rpc;
pub mod sync;

pub use backend::{ReleaseBackend, connect};
pub use cli::{CliBackend, CliPayload, CommandOutput, HelmRunner, MockHelmRunner, ProcessRunner};
pub use config::{BackendConfig, BackendKind, CliSettings, RpcSettings};
pub use error::{BackendError, Result, SyncFailure};
pub use lookup::{KubeServiceLookup, MockServiceLookup, ServiceEndpoint, ServiceLookup};
pub use probe::parse_server_version;
pub use reconcile::{DiscoveredRelease, filter_services, reconcile};
pub use rpc::{MockReleaseRpc, ReleaseRpc, RpcBackend, RpcPayload, TillerClient};
pub use sync::{ActionOutcome, ActionReport, SyncReport, SyncTarget, execute_sync};
