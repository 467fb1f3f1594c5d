//! Integration tests for CLI commands
//!
//! None of these reach a cluster: each one fails or finishes before a
//! backend is contacted, or uses an operation the selected backend rejects
//! locally.

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to run helmsync with an isolated environment
fn helmsync(args: &[&str]) -> Output {
    let home = TempDir::new().expect("temp home");
    Command::new(env!("CARGO_BIN_EXE_helmsync"))
        .args(args)
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("KUBECONFIG", home.path().join("missing-kubeconfig"))
        .env_remove("HELMSYNC_BACKEND")
        .env_remove("HELMSYNC_CONFIG")
        .env_remove("HELMSYNC_HELM")
        .env_remove("TILLER_HOST")
        .env_remove("KUBERNETES_SERVICE_HOST")
        .output()
        .expect("Failed to execute helmsync")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod general {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = helmsync(&["--help"]);
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        for command in ["services", "ping", "sync", "export"] {
            assert!(stdout.contains(command), "help should mention {command}");
        }
    }

    #[test]
    fn test_version() {
        let output = helmsync(&["--version"]);
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let output = helmsync(&["--backend", "docker", "ping"]);
        assert!(!output.status.success());
        assert!(stderr(&output).contains("unknown backend"));
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let output = helmsync(&["--config", "/nonexistent/helmsync.yaml", "ping"]);
        assert_eq!(output.status.code(), Some(5));
    }
}

mod sync_command {
    use super::*;

    #[test]
    fn test_missing_plan_file() {
        let output = helmsync(&["sync", "/nonexistent/plan.yaml"]);
        assert_eq!(output.status.code(), Some(5));
        assert!(stderr(&output).contains("/nonexistent/plan.yaml"));
    }

    #[test]
    fn test_malformed_plan_file() {
        let dir = TempDir::new().unwrap();
        let plan = dir.path().join("plan.yaml");
        fs::write(&plan, "actions:\n  - kind: explode\n    resource: default/web\n").unwrap();

        let output = helmsync(&["sync", plan.to_str().unwrap()]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_empty_plan_needs_no_backend() {
        let dir = TempDir::new().unwrap();
        let plan = dir.path().join("plan.yaml");
        fs::write(&plan, "actions: []\n").unwrap();

        let output = helmsync(&["--helm", "/nonexistent/helm", "sync", plan.to_str().unwrap()]);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert!(String::from_utf8_lossy(&output.stdout).contains("no actions"));
    }

    #[test]
    fn test_failing_action_reports_index_and_resource() {
        let dir = TempDir::new().unwrap();
        let plan = dir.path().join("plan.yaml");
        fs::write(
            &plan,
            "actions:\n  - kind: delete\n    resource: default/old-web\n",
        )
        .unwrap();

        let output = helmsync(&["--helm", "/nonexistent/helm", "sync", plan.to_str().unwrap()]);
        assert_eq!(output.status.code(), Some(4));

        let err = stderr(&output);
        assert!(err.contains("Sync stopped"));
        assert!(err.contains("default/old-web"));
    }
}

mod backend_commands {
    use super::*;

    #[test]
    fn test_ping_without_helm() {
        let output = helmsync(&["--helm", "/nonexistent/helm", "ping"]);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_export_unsupported_on_cli_backend() {
        let output = helmsync(&["--backend", "cli", "export"]);
        assert_eq!(output.status.code(), Some(6));
        assert!(stderr(&output).contains("supported"));
    }

    #[test]
    fn test_services_rejects_malformed_id() {
        let output = helmsync(&["services", "--id", "no-namespace"]);
        assert!(!output.status.success());
        assert!(stderr(&output).contains("no-namespace"));
    }

    #[test]
    fn test_services_namespace_conflicts_with_id() {
        let output = helmsync(&["services", "-n", "default", "--id", "default/web"]);
        assert!(!output.status.success());
    }
}
