// Gavel auction server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database, seed the admin account and player library
// 4. Build the auction service
// 5. Serve WebSocket clients until Ctrl+C

use std::path::Path;
use std::sync::Arc;

use gavel_core::catalog::PlayerDefaults;
use gavel_core::identity::{self, TokenSigner};
use gavel_core::{library, AuctionService, Database, ServiceSettings};
use gavel_server::app::App;
use gavel_server::config;
use gavel_server::ws_server;

use anyhow::Context;
use tracing::{error, info, warn};

const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Gavel starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {}:{}, database {}",
        config.server.host, config.server.port, config.database.path
    );

    // 3. Open database and seed
    let db = Database::open(&config.database.path).context("failed to open database")?;
    info!("Database opened at {}", config.database.path);

    let admin_password = config
        .credentials
        .bootstrap_admin_password
        .as_deref()
        .unwrap_or(DEFAULT_ADMIN_PASSWORD);
    let seeded =
        identity::seed_default_admin(&db, admin_password).context("failed to seed admin user")?;
    if seeded && config.credentials.bootstrap_admin_password.is_none() {
        warn!("Default admin created with the built-in password; change it before going live");
    }

    if let Some(seed) = &config.library.seed_csv {
        match library::seed_from_csv(&db, Path::new(seed)) {
            Ok(0) => {}
            Ok(n) => info!("Player library seeded with {} entries from {}", n, seed),
            Err(e) => warn!("Skipping library seed: {:#}", e),
        }
    }

    // 4. Build the auction service
    let secret = match &config.credentials.token_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("No token_secret configured; tokens will not survive a restart");
            identity::random_token(48)
        }
    };
    let signer = TokenSigner::new(
        secret,
        chrono::Duration::hours(config.auction.token_ttl_hours),
    );
    let settings = ServiceSettings {
        code_length: config.auction.code_length,
        player_defaults: PlayerDefaults {
            base_price: config.auction.default_base_price,
            country: config.auction.default_country.clone(),
        },
    };
    let app = Arc::new(App::new(AuctionService::new(db, signer, settings)));

    // 5. Serve until Ctrl+C
    let listener = ws_server::bind(&config.server.host, config.server.port).await?;
    tokio::select! {
        result = ws_server::run(listener, app) => {
            if let Err(e) = result {
                error!("WebSocket server error: {:#}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    info!("Gavel shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/gavel.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("gavel.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gavel_server=info,gavel_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
