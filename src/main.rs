use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use visiride::common::logging;
use visiride::core::classifier::{CommandClassifier, CommandFaceDetector};
use visiride::{AppState, Config, DataLayout, DevMode, FileStore, MemoryStore, Store};

#[derive(Parser, Debug)]
#[command(name = "visiride-server")]
#[command(about = "Proximity-gated face unlock server for shared scooters")]
struct Args {
    /// Run in development mode (data under ./dev_data, debug logging)
    #[arg(long)]
    dev: bool,

    /// Config file (default: configs/visiride.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<String>,

    /// Keep all documents in memory
    #[arg(long)]
    ephemeral: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return Config::load_from_path(path).context("Failed to load config");
    }
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!("{}; using defaults", e);
            Ok(Config::default())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let dev_mode = DevMode::new(args.dev);

    logging::init(dev_mode.default_log_filter());
    tracing::info!("Starting VisiRide server (dev_mode: {})", dev_mode.is_enabled());

    let mut config = load_config(args.config.as_ref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let root = dev_mode.data_root(config.storage.data_dir.as_ref())?;
    let layout = DataLayout::new(root);
    layout.ensure().context("Failed to create data directories")?;
    tracing::info!("Data root: {}", layout.root().display());

    let store: Arc<dyn Store> = if args.ephemeral {
        tracing::warn!("ephemeral mode: documents are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::new_with_paths(layout.users_dir(), layout.scooters_dir())?)
    };

    let classifier = Arc::new(CommandClassifier::new(
        config.classifier.recognition_program.clone(),
        config.classifier.recognition_args.clone(),
        config.classifier.timeout(),
    ));
    let detector = Arc::new(CommandFaceDetector::new(
        config.classifier.detection_program.clone(),
        config.classifier.detection_args.clone(),
        config.classifier.timeout(),
    ));

    let bind = config.server.bind.clone();
    let state = AppState::new(config, layout, store, classifier, detector);
    state.seed_proximity().await.context("Failed to seed proximity sets")?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Listening on {}", bind);

    visiride::service::serve(listener, state, shutdown_signal()).await?;
    tracing::info!("Server stopped");
    Ok(())
}
