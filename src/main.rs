use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use hexapod_runtime::config::{ConfigError, GaitPattern, HexapodConfig, STANCE_CENTER, STEP_LENGTH};
use hexapod_runtime::monitor::DEFAULT_REFRESH_HZ;
use hexapod_runtime::runtime;

#[derive(Parser)]
#[command(name = "hexapod-runtime", about = "Tripod gait and servo link for an 18-servo hexapod")]
struct Cli {
    /// JSON configuration file (missing fields keep their defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port of the servo board
    #[arg(long, global = true)]
    port: Option<String>,

    #[arg(long, global = true)]
    baud: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tripod gait and drive the servos
    Walk {
        /// Also publish every snapshot on zenoh
        #[arg(long)]
        publish: bool,

        /// Replace the configured strides with a built-in preset
        #[arg(long, value_enum)]
        pattern: Option<GaitPattern>,
    },
    /// Forward snapshots received over zenoh to the servos
    Bridge,
    /// Show received snapshots in a live table
    Monitor {
        #[arg(long, default_value_t = DEFAULT_REFRESH_HZ)]
        refresh_hz: f64,
    },
}

fn load_config(cli: &Cli) -> Result<HexapodConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => HexapodConfig::load(path)?,
        None => HexapodConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }
    if let Command::Walk { pattern: Some(pattern), .. } = cli.command {
        config.gait.legs = pattern.legs(STANCE_CENTER, STEP_LENGTH);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug for more)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Walk { publish, .. } => runtime::walk(config, publish).await,
        Command::Bridge => runtime::bridge(config).await,
        Command::Monitor { refresh_hz } => runtime::monitor(config, refresh_hz).await,
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
