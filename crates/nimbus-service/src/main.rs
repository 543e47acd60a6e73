//! Nimbus Service - headless weather refresher.
//!
//! Run with: `cargo run -p nimbus-service`

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nimbus_core::{WeatherEvent, with_cancellation};
use nimbus_service::{AppContext, Config};
use nimbus_types::{SavedLocation, WeatherSnapshot};

/// Nimbus Service - offline-first weather with background refresh.
#[derive(Parser, Debug)]
#[command(name = "nimbus-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// API key (overrides config and NIMBUS_API_KEY).
    #[arg(long, global = true)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh in the background until interrupted (default behavior).
    Run,

    /// Show current weather.
    Current {
        /// Saved location id (defaults to the selected location).
        #[arg(short, long)]
        location: Option<String>,
    },

    /// Show recent historical weather for the selected location.
    History {
        /// Number of past days (1-30).
        #[arg(long)]
        days: Option<u32>,
    },

    /// Manage saved locations.
    Locations {
        #[command(subcommand)]
        action: LocationAction,
    },
}

#[derive(Subcommand, Debug)]
enum LocationAction {
    /// List saved locations.
    List,

    /// Save a new location.
    Add {
        /// Display name.
        name: String,
        /// Place name or "lat,lon" sent to the weather service.
        query: String,
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
    },

    /// Remove a saved location and its cached weather.
    Remove { id: String },

    /// Select the location used by default.
    Select { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nimbus_service=info".parse()?)
                .add_directive("nimbus_core=info".parse()?),
        )
        .init();

    let config = load_config(&args)?;
    let ctx = AppContext::from_config(config).await?;

    let result = match args.command {
        Some(Command::Run) | None => run(&ctx).await,
        Some(Command::Current { location }) => current(&ctx, location.as_deref()).await,
        Some(Command::History { days }) => history(&ctx, days).await,
        Some(Command::Locations { action }) => locations(&ctx, action).await,
    };

    ctx.shutdown();
    result
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if let Some(key) = &args.api_key {
        config.api.api_key = key.clone();
    }
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Cancel on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

async fn run(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    let mut events = ctx.subscribe();
    let interval = ctx.refresh.schedule_periodic_refresh().await;
    info!("Refreshing every {:?}; press Ctrl-C to stop", interval);

    let token = interrupt_token();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Ok(WeatherEvent::BackgroundRefresh { at }) => info!("Background refresh at {}", at),
                Ok(WeatherEvent::RefreshFailed { error, will_retry }) => {
                    warn!("Refresh failed (retry: {}): {}", will_retry, error)
                }
                Ok(other) => info!("{:?}", other),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} events", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn current(ctx: &AppContext, location_id: Option<&str>) -> anyhow::Result<()> {
    let location = match location_id {
        Some(id) => Some(
            ctx.registry
                .get(id)
                .ok_or_else(|| nimbus_core::Error::LocationNotFound(id.to_string()))?,
        ),
        None => Some(ctx.registry.selected()),
    };

    let token = interrupt_token();
    let result = with_cancellation(&token, ctx.engine.get_current_weather(location.as_ref())).await;
    let snapshot = result.map_err(|e| anyhow::anyhow!(e.user_message()))?;

    print_current(&snapshot);
    if let Some(info) = ctx.engine.offline_info().borrow().as_ref() {
        println!(
            "(offline: showing data for {} from {})",
            info.location_name, info.timestamp
        );
    }
    Ok(())
}

async fn history(ctx: &AppContext, days: Option<u32>) -> anyhow::Result<()> {
    let days = days.unwrap_or(ctx.config.history.days);
    let token = interrupt_token();
    let snapshots = with_cancellation(&token, ctx.engine.get_historical_weather(days)).await?;

    if snapshots.is_empty() {
        println!("No historical weather available.");
        return Ok(());
    }
    for snapshot in &snapshots {
        if let Some(day) = snapshot.days().first() {
            println!(
                "{}  {:>5.1}°C / {:>5.1}°C  {:>5.1} mm  {}",
                day.date,
                day.day.min_temp_c,
                day.day.max_temp_c,
                day.day.total_precip_mm,
                day.day.condition.text
            );
        }
    }
    if snapshots.len() < days as usize {
        println!("({} of {} days available)", snapshots.len(), days);
    }
    Ok(())
}

async fn locations(ctx: &AppContext, action: LocationAction) -> anyhow::Result<()> {
    match action {
        LocationAction::List => {
            let selected = ctx.registry.selected_id();
            for loc in ctx.registry.locations() {
                let marker = if loc.id == selected { "*" } else { " " };
                println!("{} {:<36}  {:<20}  {}", marker, loc.id, loc.name, loc.query);
            }
        }
        LocationAction::Add {
            name,
            query,
            latitude,
            longitude,
        } => {
            let mut location = SavedLocation::new(name, query);
            if let (Some(lat), Some(lon)) = (latitude, longitude) {
                location = location.with_coordinates(lat, lon);
            }
            let added = ctx.registry.add(location).await?;
            println!("Added {} ({})", added.name, added.id);
        }
        LocationAction::Remove { id } => {
            ctx.registry.remove(&id).await?;
            println!("Removed {}", id);
        }
        LocationAction::Select { id } => {
            ctx.registry.set_selected(&id).await?;
            println!("Selected {}", id);
        }
    }
    Ok(())
}

fn print_current(snapshot: &WeatherSnapshot) {
    let location = snapshot.location();
    println!("{}, {}, {}", location.name, location.region, location.country);
    if let Some(current) = snapshot.current() {
        println!(
            "  {:.1}°C (feels {:.1}°C), {}, humidity {}%, wind {:.0} kph {}",
            current.temp_c,
            current.feels_like_c,
            current.condition.text,
            current.humidity,
            current.wind_kph,
            current.wind_dir
        );
    }
    for day in snapshot.days() {
        println!(
            "  {}  {:>5.1}°C / {:>5.1}°C  rain {:>3}%  {}",
            day.date,
            day.day.min_temp_c,
            day.day.max_temp_c,
            day.day.daily_chance_of_rain,
            day.day.condition.text
        );
    }
}
