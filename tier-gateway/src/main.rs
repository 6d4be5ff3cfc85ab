use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tier_gateway::Config;
use tier_gateway::Validate;
use tier_gateway::build_gate;
use tier_gateway::create_app;
use tier_gateway::init_tracing;
use tier_gateway::spawn_sweeper;
use tokio::net::TcpListener;
use tokio::signal;
use tower::BoxError;

#[derive(Debug, Parser)]
#[command(name = "tier-gateway", version, about = "Tier admitted chat gateway")]
struct Cli {
    /// Directory holding `default`, `$ENV` and `local` config files
    #[arg(long, default_value = "config")]
    config: PathBuf,

    /// Listen on this port instead of `server.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let mut config = Config::load_from(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
        config.server.validate()?;
    }

    init_tracing(&config.logging)?;

    let gate = build_gate(&config)?;
    tracing::info!(
        tiers = ?config.limits.tiers,
        window = ?config.limits.window(),
        store = ?config.limits.store,
        "admission gate ready"
    );

    let sweeper = config.eviction.enabled.then(|| {
        spawn_sweeper(
            gate.clone(),
            config.eviction.interval(),
            config.eviction.idle(config.limits.window()),
        )
    });

    let app = create_app(gate, &config);
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
