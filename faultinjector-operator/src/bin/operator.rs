//! FaultInjector Kubernetes Operator binary.
//!
//! This binary runs the operator, which materializes FaultInjector custom
//! resources as fault-injection Deployments.

use clap::Parser;
use faultinjector_operator::controller::{ControllerContext, runner};
use faultinjector_operator::crd::FaultInjector;
use faultinjector_operator::{KubeWorkloadClient, OperatorConfig, version};
use futures::StreamExt;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, CustomResourceExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "faultinjector-operator")]
#[command(version = version::VERSION, about, long_about = None)]
struct Args {
    /// Print the CustomResourceDefinition YAML and exit
    #[arg(long)]
    generate_crds: bool,

    /// YAML configuration file
    #[arg(short, long, env = "FAULTINJECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Repository of the fault images
    #[arg(long, env = "FAULTINJECTOR_IMAGE_REPO")]
    image_repository: Option<String>,

    /// Tag of the fault images
    #[arg(long, env = "FAULTINJECTOR_IMAGE_TAG")]
    image_tag: Option<String>,

    /// Seconds between full resyncs of every FaultInjector
    #[arg(long, env = "FAULTINJECTOR_RESYNC_SECONDS")]
    resync_seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("faultinjector_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.generate_crds {
        generate_crds()?;
        return Ok(());
    }

    tracing::info!(version = version::VERSION, "Starting FaultInjector operator");

    let config = load_config(&args)?;
    tracing::info!(
        repository = %config.images.repository,
        tag = %config.images.tag,
        "Using fault images"
    );

    // Connect to Kubernetes
    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(ControllerContext::new(
        Arc::new(KubeWorkloadClient::new(client.clone())),
        config,
    ));

    let injectors: Api<FaultInjector> = Api::all(client);
    let events = watcher(injectors, watcher::Config::default())
        .default_backoff()
        .boxed();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    runner::run(ctx, &FaultInjector::crd(), events, shutdown_rx).await?;

    tracing::info!("FaultInjector operator stopped");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<OperatorConfig> {
    let mut config = match &args.config {
        Some(path) => OperatorConfig::from_file(path)?,
        None => OperatorConfig::default(),
    };

    if let Some(repository) = &args.image_repository {
        config.images.repository = repository.clone();
    }
    if let Some(tag) = &args.image_tag {
        config.images.tag = tag.clone();
    }
    if let Some(seconds) = args.resync_seconds {
        config.resync_interval_secs = seconds;
    }

    if config.resync_interval_secs == 0 {
        anyhow::bail!("resync interval must be at least one second");
    }

    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Generate CRD YAML.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&FaultInjector::crd())?);
    Ok(())
}
