//! safepath - route safety assessment and position replay from the terminal

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use safepath_core::{Coordinate, RouteProfile};

use crate::commands::{parse_coordinate, parse_profile, RouteArgs, TrackArgs};
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a route and score it against nearby incidents
    Route {
        /// Start as lat,lng
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        from: Coordinate,

        /// Destination as lat,lng
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        to: Coordinate,

        #[arg(long, value_parser = parse_profile, default_value = "walking")]
        profile: RouteProfile,

        /// Treat the trip as a night trip regardless of the clock
        #[arg(long)]
        night: bool,

        /// JSON array of zones used to flag endpoints
        #[arg(long)]
        zones: Option<PathBuf>,
    },

    /// Build the community rating heatmap around a point
    Heatmap {
        /// Viewport center as lat,lng
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        center: Coordinate,
    },

    /// Replay recorded position samples through the safety engine
    Track {
        /// JSON array of position samples
        #[arg(long)]
        samples: PathBuf,

        /// JSON array of safe/danger zones
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Route polyline JSON to check for deviations
        #[arg(long)]
        route: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("safepath=info"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let config = Config::from_env();
    tracing::debug!("Configuration: {:?}", config);

    match cli.command {
        Command::Route {
            from,
            to,
            profile,
            night,
            zones,
        } => {
            commands::route(
                &config,
                RouteArgs {
                    from,
                    to,
                    profile,
                    night,
                    zones: zones.as_deref(),
                },
            )
            .await
        }
        Command::Heatmap { center } => commands::heatmap(&config, center).await,
        Command::Track {
            samples,
            zones,
            route,
        } => {
            let summary = commands::track(
                &config,
                TrackArgs {
                    samples: &samples,
                    zones: zones.as_deref(),
                    route: route.as_deref(),
                },
            )
            .await?;
            if summary.blocked {
                tracing::warn!("Location access was lost during replay");
            }
            Ok(())
        }
    }
}
