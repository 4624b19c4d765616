use clap::{Parser, Subcommand};
use gpxgauge::MAX_PLAUSIBLE_SPEED_KMH;
use std::error::Error;

mod commands;
mod gpxxml;

#[derive(Parser)]
#[command(name = "gpxgauge", about = "A CLI tool for summarizing GPX track files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Compute distance, elevation and speed metrics for a track")]
    Analyze {
        #[arg(
            long,
            default_value_t = MAX_PLAUSIBLE_SPEED_KMH,
            help = "Discard pair speeds at or above this many km/h"
        )]
        speed_limit: f64,
    },
    #[command(about = "Emit the track route and metrics as a GeoJSON feature collection")]
    Route,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Analyze { speed_limit } => commands::analyze::analyze_command(speed_limit),
        Commands::Route => commands::route::route_command(),
    }
}
