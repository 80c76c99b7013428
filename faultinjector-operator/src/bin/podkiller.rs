//! PodKiller fault binary.
//!
//! Deletes a random pod of its namespace on every interval. Deployed by the
//! operator for FaultInjectors of type `PodKiller`, which pass
//! `--namespace-file` pointing at the downward-API volume.

use clap::Parser;
use faultinjector_operator::config::ImageSettings;
use faultinjector_operator::crd::FaultType;
use faultinjector_operator::podkiller::{self, KubePodClient, PodKiller};
use faultinjector_operator::version;
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "faultinjector-podkiller", about, long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
    /// The namespace to work in
    #[arg(long, conflicts_with = "namespace_file")]
    namespace: Option<String>,

    /// A file containing the namespace to work in
    #[arg(long)]
    namespace_file: Option<PathBuf>,

    /// Seconds between two kills
    #[arg(long, default_value_t = podkiller::DEFAULT_INTERVAL.as_secs())]
    interval: u64,

    /// Show version and quit
    #[arg(long)]
    version: bool,

    /// Show the image name for the application and quit
    #[arg(long)]
    image: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.version {
        println!("{}", version::VERSION);
        return Ok(());
    }
    if args.image {
        println!("{}", ImageSettings::default().image_for(FaultType::PodKiller));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("faultinjector_operator=info".parse()?)
                .add_directive("kube=warn".parse()?),
        )
        .init();

    let namespace =
        podkiller::resolve_namespace(args.namespace.as_deref(), args.namespace_file.as_deref())?;
    if args.interval == 0 {
        anyhow::bail!("interval must be at least one second");
    }

    tracing::info!(version = version::VERSION, namespace = %namespace, "FaultInjector PodKiller starting");

    let client = Client::try_default().await?;
    let killer = PodKiller::new(Arc::new(KubePodClient::new(client, &namespace)), namespace);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        let _ = shutdown_tx.send(true);
    });

    killer
        .run(std::time::Duration::from_secs(args.interval), shutdown_rx)
        .await;
    Ok(())
}
