//! In-memory ReleaseService for testing
//!
//! Honors the namespace, name filter and status code fields of list
//! requests the way Tiller does, and records every request for assertions.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, RwLock};

use super::ReleaseRpc;
use super::tiller::{
    Info, InstallReleaseRequest, ListReleasesRequest, Release, Status, StatusCode,
    UninstallReleaseRequest, UpdateReleaseRequest, Version,
};
use crate::error::{BackendError, Result};

#[derive(Default)]
struct State {
    releases: Vec<Release>,
    version: Option<Version>,
    failure: Option<tonic::Code>,
    lists: Vec<ListReleasesRequest>,
    installs: Vec<InstallReleaseRequest>,
    updates: Vec<UpdateReleaseRequest>,
    uninstalls: Vec<UninstallReleaseRequest>,
}

/// In-memory [`ReleaseRpc`]
#[derive(Clone, Default)]
pub struct MockReleaseRpc {
    state: Arc<RwLock<State>>,
}

impl MockReleaseRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_releases(self, releases: Vec<Release>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.releases = releases;
        }
        self
    }

    pub fn with_version(self, sem_ver: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.version = Some(Version {
                sem_ver: sem_ver.to_string(),
                ..Default::default()
            });
        }
        self
    }

    /// Fail every call with the given status code
    pub fn failing_with(self, code: tonic::Code) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.failure = Some(code);
        }
        self
    }

    pub fn list_requests(&self) -> Vec<ListReleasesRequest> {
        self.read(|s| s.lists.clone())
    }

    pub fn install_requests(&self) -> Vec<InstallReleaseRequest> {
        self.read(|s| s.installs.clone())
    }

    pub fn update_requests(&self) -> Vec<UpdateReleaseRequest> {
        self.read(|s| s.updates.clone())
    }

    pub fn uninstall_requests(&self) -> Vec<UninstallReleaseRequest> {
        self.read(|s| s.uninstalls.clone())
    }

    fn read<T: Default>(&self, f: impl FnOnce(&State) -> T) -> T {
        self.state.read().map(|s| f(&s)).unwrap_or_default()
    }

    /// Run `f` with the state locked, unless a failure is injected
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self
            .state
            .write()
            .map_err(|e| BackendError::Connection(format!("lock poisoned: {}", e)))?;
        if let Some(code) = state.failure {
            return Err(BackendError::Rpc {
                code,
                message: "injected failure".to_string(),
            });
        }
        f(&mut state)
    }
}

fn deployed(name: &str, namespace: &str) -> Release {
    Release {
        name: name.to_string(),
        namespace: namespace.to_string(),
        info: Some(Info {
            status: Some(Status {
                code: StatusCode::Deployed as i32,
            }),
        }),
        version: 1,
        ..Default::default()
    }
}

fn status_code(release: &Release) -> i32 {
    release
        .info
        .as_ref()
        .and_then(|info| info.status.as_ref())
        .map(|status| status.code)
        .unwrap_or_default()
}

#[async_trait]
impl ReleaseRpc for MockReleaseRpc {
    async fn list_releases(&self, request: ListReleasesRequest) -> Result<Vec<Release>> {
        self.with_state(|state| {
            let filter = if request.filter.is_empty() {
                None
            } else {
                Some(Regex::new(&request.filter).map_err(|e| BackendError::Rpc {
                    code: tonic::Code::InvalidArgument,
                    message: e.to_string(),
                })?)
            };
            let codes = if request.status_codes.is_empty() {
                vec![StatusCode::Deployed as i32]
            } else {
                request.status_codes.clone()
            };

            let releases = state
                .releases
                .iter()
                .filter(|r| request.namespace.is_empty() || r.namespace == request.namespace)
                .filter(|r| filter.as_ref().is_none_or(|re| re.is_match(&r.name)))
                .filter(|r| codes.contains(&status_code(r)))
                .cloned()
                .collect();

            state.lists.push(request);
            Ok(releases)
        })
    }

    async fn get_version(&self) -> Result<Option<Version>> {
        self.with_state(|state| Ok(state.version.clone()))
    }

    async fn install_release(&self, request: InstallReleaseRequest) -> Result<Option<Release>> {
        self.with_state(|state| {
            if state.releases.iter().any(|r| r.name == request.name) {
                return Err(BackendError::Rpc {
                    code: tonic::Code::Unknown,
                    message: format!("a release named {} already exists", request.name),
                });
            }
            let release = deployed(&request.name, &request.namespace);
            state.releases.push(release.clone());
            state.installs.push(request);
            Ok(Some(release))
        })
    }

    async fn update_release(&self, request: UpdateReleaseRequest) -> Result<Option<Release>> {
        self.with_state(|state| {
            let release = state
                .releases
                .iter_mut()
                .find(|r| r.name == request.name)
                .ok_or_else(|| BackendError::Rpc {
                    code: tonic::Code::Unknown,
                    message: format!("\"{}\" has no deployed releases", request.name),
                })?;
            release.version += 1;
            let updated = release.clone();
            state.updates.push(request);
            Ok(Some(updated))
        })
    }

    async fn uninstall_release(&self, request: UninstallReleaseRequest) -> Result<Option<Release>> {
        self.with_state(|state| {
            let position = state.releases.iter().position(|r| r.name == request.name);
            let name = request.name.clone();
            state.uninstalls.push(request);
            match position {
                Some(index) => Ok(Some(state.releases.remove(index))),
                None => Err(BackendError::Rpc {
                    code: tonic::Code::Unknown,
                    message: format!("release: \"{}\" not found", name),
                }),
            }
        })
    }
}
