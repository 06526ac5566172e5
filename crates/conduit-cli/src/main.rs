use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conduit_channels::{RoutePattern, Router, event_handler};
use conduit_core::Event;
use conduit_gateway::{GatewayServer, Message};
use std::future::Future;
use std::path::PathBuf;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::ConduitConfig;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(version)]
#[command(about = "conduit - routes chat channels and UI clients to one backend")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the router and gateway
    Start,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins over --debug
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Start => cmd_start(&cli.config).await,
    }
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ConduitConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_start(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ConduitConfig::load(config_path)?;
    info!("Starting conduit...");

    let router = Router::with_config(cfg.router_settings());
    // One token stops both the router's processor calls and the gateway
    let cancel = router.shutdown_token();

    router
        .on_message(RoutePattern::all(), router.process_with_agent())
        .await;

    let gateway = GatewayServer::new(cfg.gateway_settings()?);
    let gateway_handle = gateway.handle();

    // Channel events are pushed to every gateway client
    router
        .on_event(event_handler(move |event: Event| {
            let gateway = gateway_handle.clone();
            async move {
                let data = event.data.into_iter().collect();
                gateway
                    .broadcast(Message::event(
                        event.event_type.to_string(),
                        event.channel_name,
                        data,
                    ))
                    .await;
                Ok(())
            }
        }))
        .await;

    router
        .connect_all()
        .await
        .context("Failed to connect channels")?;
    info!(
        "Router ready with {} channel(s)",
        router.list_channels().await.len()
    );

    let gateway_task = tokio::spawn(gateway.run(cancel));
    serve_until_shutdown(signal::ctrl_c(), &router, gateway_task).await
}

/// Waits for the shutdown signal or a gateway exit, then tears everything
/// down. Teardown runs even when the signal listener itself fails.
async fn serve_until_shutdown<S>(
    shutdown_signal: S,
    router: &Router,
    mut gateway_task: JoinHandle<Result<()>>,
) -> Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    let outcome = tokio::select! {
        res = shutdown_signal => match res {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down...");
                Ok(())
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                Err(anyhow::Error::new(e).context("Failed to listen for Ctrl-C"))
            }
        },
        res = &mut gateway_task => {
            let res = res.context("Gateway task panicked").and_then(|r| r);
            if let Err(e) = &res {
                error!("Gateway exited: {:#}", e);
            }
            res
        }
    };

    router.shutdown_token().cancel();

    if let Err(e) = router.disconnect_all().await {
        warn!("Some channels failed to disconnect: {}", e);
    }

    if !gateway_task.is_finished() {
        match gateway_task.await {
            Ok(Err(e)) => warn!("Gateway shutdown error: {:#}", e),
            Err(e) => warn!("Gateway task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    info!("conduit stopped");
    outcome
}
