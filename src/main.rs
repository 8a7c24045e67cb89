mod console;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use shuttle_tracker::config::AppConfig;
use shuttle_tracker::db;
use shuttle_tracker::store::{PgStore, TrackerStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "shuttle-tracker",
    author,
    version,
    about = "Campus shuttle tracking: driver console and rider feed"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register (or re-register) the shuttle owned by a driver account
    Register {
        /// Driver account id; also the shuttle's id
        #[arg(long)]
        driver: String,
        /// Code painted on the vehicle
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        capacity: i32,
        #[arg(long)]
        driver_name: String,
    },

    /// Interactive driver dashboard (start, end, +, -, alert <text>, status, quit)
    Drive {
        #[arg(long)]
        driver: String,
        /// Read positions from this GPS unit on the telemetry topic
        #[arg(long, conflicts_with_all = ["lat", "lon"])]
        device: Option<String>,
        /// Report a fixed position instead of live GPS
        #[arg(long, allow_hyphen_values = true, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,
    },

    /// Follow active shuttles and their alerts
    Watch,

    /// Show a shuttle's most recent recorded positions
    History {
        #[arg(long)]
        shuttle: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Current weather at a position
    Weather {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Shuttle Tracker...");

    match args.command {
        Command::Register {
            driver,
            code,
            name,
            capacity,
            driver_name,
        } => {
            let store = connect(&config).await?;
            console::register(store, driver, code, name, capacity, driver_name).await?
        }
        Command::Drive {
            driver,
            device,
            lat,
            lon,
        } => {
            let store = connect(&config).await?;
            console::drive(&config, store, driver, device, lat.zip(lon)).await?
        }
        Command::Watch => {
            let store = connect(&config).await?;
            console::watch(&config, store).await?
        }
        Command::History { shuttle, limit } => {
            let store = connect(&config).await?;
            console::history(store, &shuttle, limit).await?
        }
        Command::Weather { lat, lon } => console::weather(&config, lat, lon).await,
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<Arc<dyn TrackerStore>> {
    let pool = db::init_pool(&config.database_url).await?;
    db::ensure_schema(&pool).await?;
    info!("Connected to database");
    Ok(Arc::new(PgStore::new(pool)))
}
