use gamemaster_pipeline::{config::Config, shutdown::install_signal_handler, PipelineHost};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration first so logging can honour it
    let config = Config::load()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "gamemaster_pipeline={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting game master pipeline v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Messaging backend: {:?}", config.messaging.backend);
    tracing::info!("Vector store backend: {:?}", config.vector_store.backend);

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        gamemaster_pipeline::init_metrics();
        tracing::info!("✅ Prometheus metrics initialized");
    } else {
        tracing::info!("⚠️  Prometheus metrics disabled in configuration");
    }

    let host = PipelineHost::build(config).await?;
    let shutdown = install_signal_handler();
    let running = host.start(&shutdown).await?;

    tracing::info!("✅ Pipeline workers started");
    tracing::info!("Press Ctrl+C to shutdown");

    if let Err(e) = running.wait().await {
        tracing::error!(error = %e, error_code = e.error_code(), "Pipeline host stopped on a worker fault");
        std::process::exit(1);
    }

    tracing::info!("Shut down gracefully");
    Ok(())
}
