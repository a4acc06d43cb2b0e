use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_proxy::config::ProxyConfig;
use switchboard_proxy::proxy::Proxy;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchboard-proxy", about = "Local failover proxy pool for LLM provider credentials")]
struct Cli {
    /// Path to the pool config file (TOML or JSON)
    #[arg(short, long, default_value = "switchboard.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    init_tracing();

    let config = ProxyConfig::load(&cli.config)?;
    let provider: Arc<dyn switchboard_proxy::pool::ConfigProvider> = Arc::new(config);
    let proxy = Proxy::new(provider)?;

    proxy.start().await?;
    tracing::info!("proxy: started, awaiting shutdown signal");

    wait_for_shutdown().await;

    proxy.stop().await;
    tracing::info!("proxy: shutdown complete");
    Ok(())
}

fn init_tracing() {
    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("SWITCHBOARD_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    std::mem::forget(guard);
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("proxy: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("proxy: received SIGTERM, shutting down"),
    }
}
