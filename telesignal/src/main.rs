mod server;

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use telesignal_api::http::HeaderIdentityResolver;
use telesignal_core::{
    logging,
    service::{PresenceBroadcaster, RoomStore, RoomTimeouts, SessionManager, SignalingRelay},
    timer::TokioScheduler,
    Config,
};

use server::{Services, TelesignalServer};

/// WebRTC signaling broker for one-to-one video visits
#[derive(Debug, Parser)]
#[command(name = "telesignal", version, about)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "TELESIGNAL_CONFIG_PATH")]
    config: Option<PathBuf>,
}

/// Resolve the config file: `--config` / env var > CWD > /config/ mount
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config_path = explicit
        .filter(|p| p.exists())
        .map(Path::to_path_buf)
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
        });

    if let Some(path) = explicit.filter(|p| !p.exists()) {
        eprintln!("Config file {} not found, searching defaults", path.display());
    }

    let config = match config_path {
        Some(path) => {
            let path = path.to_string_lossy().into_owned();
            eprintln!("Loading config from {path}");
            Config::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?
        }
    };

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = load_config(cli.config.as_deref())?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Telesignal server starting...");
    info!("HTTP address: {}", config.http_address());
    info!(
        expire_after_first_leave_secs = config.signaling.expire_after_first_leave_secs,
        expire_after_empty_secs = config.signaling.expire_after_empty_secs,
        idle_room_ttl_secs = config.signaling.idle_room_ttl_secs,
        "Room expiry configured"
    );

    // 4. Wire services around one shared room store
    let store = Arc::new(RoomStore::new());
    let presence = Arc::new(PresenceBroadcaster::new(store.clone()));
    let sessions = SessionManager::new(
        store.clone(),
        presence.clone(),
        Arc::new(TokioScheduler),
        RoomTimeouts::from(&config.signaling),
    );
    let relay = SignalingRelay::new(store.clone(), &config.signaling);

    let services = Services {
        store,
        presence,
        sessions,
        relay,
        identity: Arc::new(HeaderIdentityResolver),
    };

    // 5. Serve until shutdown
    TelesignalServer::new(config, services).start().await
}
