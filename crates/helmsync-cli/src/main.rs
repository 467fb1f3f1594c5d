//! Helmsync CLI - Inspect and synchronize Helm releases

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use helmsync_core::ResourceId;
use helmsync_kube::BackendKind;

mod commands;
mod config;
mod display;
mod error;
mod exit_codes;

use config::{Overrides, Settings};
use error::Result;

#[derive(Parser)]
#[command(name = "helmsync")]
#[command(author = "Helmsync Contributors")]
#[command(version)]
#[command(about = "Inspect and synchronize Helm releases", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Release backend (cli or rpc)
    #[arg(long, global = true, env = "HELMSYNC_BACKEND")]
    backend: Option<BackendKind>,

    /// Config file (default: <config dir>/helmsync/config.yaml)
    #[arg(long, global = true, env = "HELMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Tiller address for the rpc backend
    #[arg(long, global = true, env = "TILLER_HOST")]
    tiller_host: Option<String>,

    /// Path to the helm executable
    #[arg(long, global = true, env = "HELMSYNC_HELM")]
    helm: Option<PathBuf>,

    /// Helm home directory
    #[arg(long, global = true, env = "HELM_HOME")]
    helm_home: Option<PathBuf>,

    /// Kubeconfig used for service lookups
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Report readiness from cluster workloads (rpc backend only)
    #[arg(long, global = true)]
    cluster_readiness: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List services derived from releases
    Services {
        /// Only this namespace
        #[arg(short, long, conflicts_with = "ids")]
        namespace: Option<String>,

        /// Only these services (namespace/name), repeatable
        #[arg(long = "id", value_name = "NS/NAME")]
        ids: Vec<ResourceId>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the backend is reachable and print its server version
    Ping,

    /// Apply a sync plan, stopping at the first failing action
    Sync {
        /// Plan file
        plan: PathBuf,
    },

    /// Export the deployed configuration
    Export {
        /// Output file (if not set, outputs to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            backend: self.backend,
            tiller_host: self.tiller_host.clone(),
            helm: self.helm.clone(),
            helm_home: self.helm_home.clone(),
            kubeconfig: self.kubeconfig.clone(),
            cluster_readiness: self.cluster_readiness,
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())?;
    tracing::debug!(backend = %settings.backend.kind, "resolved settings");

    match cli.command {
        Commands::Services {
            namespace,
            ids,
            json,
        } => commands::services::run(&settings, namespace.as_deref(), &ids, json).await,

        Commands::Ping => commands::ping::run(&settings).await,

        Commands::Sync { plan } => commands::sync::run(&settings, &plan).await,

        Commands::Export { output } => commands::export::run(&settings, output.as_deref()).await,
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
