use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yoink_core::{
    load_config, validate_config, Extractor, FfmpegTranscoder, HistoryStore, JobService,
    LedgerStore, Presets, ServiceDeps, SettingsStore, SqliteHistoryStore, SqliteLedgerStore,
    SqliteSettingsStore, Transcoder, YtDlpExtractor,
};
use yoink_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("YOINK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Downloads directory: {:?}", config.extractor.downloads_dir);

    std::fs::create_dir_all(&config.extractor.downloads_dir).with_context(|| {
        format!(
            "Failed to create downloads directory {:?}",
            config.extractor.downloads_dir
        )
    })?;

    // SQLite stores share one database file
    let ledger: Arc<dyn LedgerStore> = Arc::new(
        SqliteLedgerStore::new(&config.database.path).context("Failed to create ledger store")?,
    );
    info!("Ledger store initialized");

    let history: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::new(&config.database.path)
            .context("Failed to create history store")?,
    );
    let settings: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettingsStore::new(&config.database.path)
            .context("Failed to create settings store")?,
    );
    info!("History and settings stores initialized");

    // External tools
    let extractor = YtDlpExtractor::new(config.extractor.clone());
    match extractor.version().await {
        Ok(version) => info!("Using yt-dlp {}", version),
        Err(e) => error!("yt-dlp is not usable, downloads will fail: {}", e),
    }
    let transcoder = FfmpegTranscoder::new(config.transcoder.clone());
    if let Err(e) = transcoder.validate().await {
        error!("ffmpeg is not usable, transcoding will fail: {}", e);
    }

    let extractor: Arc<dyn Extractor> = Arc::new(extractor);
    let transcoder: Arc<dyn Transcoder> = Arc::new(transcoder);

    // Job service: registry, hub, retry pipeline and worker pool
    let service = Arc::new(JobService::new(
        &config,
        ServiceDeps {
            ledger,
            history: Arc::clone(&history),
            extractor,
            transcoder,
        },
    ));
    service.start();
    info!(
        "Worker pool started with {} workers",
        config.workers.max_concurrent
    );

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&service),
        history,
        Presets::new(settings),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    service.shutdown().await;
    info!("Worker pool stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
