use clap::Parser;
use kube_broadcast::broadcast::BroadcastEngine;
use kube_broadcast::cli::Cli;
use kube_broadcast::directory::InstanceDirectory;
use kube_broadcast::k8s::K8sClient;
use kube_broadcast::server::{AppState, Server};
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG, when set, takes precedence over the verbose toggle
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Starting kube-broadcast v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let source = K8sClient::from_cli(&cli)?;
    let directory = InstanceDirectory::new(Arc::new(source), cli.cache_ttl());

    info!(
        "Discovering pods in namespace {} with selector {} (cache {:?})",
        cli.namespace,
        cli.label_selector,
        directory.ttl()
    );

    let engine = BroadcastEngine::new(cli.request_timeout())?;
    let state = AppState::new(Arc::new(directory), engine);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));

    Server::new(state).run(addr, shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
