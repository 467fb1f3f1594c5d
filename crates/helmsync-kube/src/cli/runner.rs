//! Running the helm executable

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::CliSettings;
use crate::error::{BackendError, Result};

/// Captured result of one helm invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    /// Failed run with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs helm with a list of arguments
#[async_trait]
pub trait HelmRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<CommandOutput>;
}

/// Runs the real helm binary as a child process.
///
/// Each run is bounded by the configured timeout. The child is killed when
/// the timeout fires.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable: PathBuf,
    helm_home: Option<PathBuf>,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(settings: &CliSettings) -> Self {
        Self {
            executable: settings.executable.clone(),
            helm_home: settings.helm_home.clone(),
            kubeconfig: settings.kubeconfig.clone(),
            timeout: settings.timeout,
        }
    }
}

#[async_trait]
impl HelmRunner for ProcessRunner {
    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        let mut command = tokio::process::Command::new(&self.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(home) = &self.helm_home {
            command.env("HELM_HOME", home);
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            command.env("KUBECONFIG", kubeconfig);
        }

        tracing::debug!(executable = %self.executable.display(), args = ?args, "running helm");

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::Connection(format!(
                    "helm not available at {}: {}",
                    self.executable.display(),
                    e
                )));
            }
            Ok(Err(e)) => return Err(BackendError::Io(e)),
            Err(_) => {
                return Err(BackendError::Timeout {
                    operation: format!("helm {}", args.join(" ")),
                    after: self.timeout,
                });
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }
}

/// Scripted runner for testing
///
/// Responses are matched by argument prefix, first match wins. Unscripted
/// invocations fail as if helm were missing.
#[derive(Clone, Default)]
pub struct MockHelmRunner {
    script: Arc<RwLock<Vec<(Vec<String>, CommandOutput)>>>,
    calls: Arc<RwLock<Vec<Vec<String>>>>,
    values: Arc<RwLock<Vec<String>>>,
}

impl MockHelmRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, prefix: &[&str], output: CommandOutput) -> Self {
        if let Ok(mut script) = self.script.write() {
            script.push((prefix.iter().map(|s| s.to_string()).collect(), output));
        }
        self
    }

    /// Argument lists of every invocation, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Contents of every `--values` file passed, read at invocation time
    pub fn values_files(&self) -> Vec<String> {
        self.values.read().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HelmRunner for MockHelmRunner {
    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(args.to_vec());
        }

        if let Some(pos) = args.iter().position(|a| a == "--values") {
            if let Some(path) = args.get(pos + 1) {
                let contents = std::fs::read_to_string(path)?;
                if let Ok(mut values) = self.values.write() {
                    values.push(contents);
                }
            }
        }

        let script = self
            .script
            .read()
            .map_err(|e| BackendError::Connection(format!("lock poisoned: {}", e)))?;

        script
            .iter()
            .find(|(prefix, _)| args.starts_with(prefix))
            .map(|(_, output)| output.clone())
            .ok_or_else(|| BackendError::Connection(format!("no scripted response for helm {}", args.join(" "))))
    }
}
