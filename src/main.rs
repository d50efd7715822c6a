mod commands;
mod config;
mod context;
mod files;
mod graph;
mod layouts;
mod metrics;
mod simulation;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{batch, generate, run};
use tracing_subscriber::EnvFilter;

use config::Parameters;
use context::Context;
use layouts::Layout;
use simulation::PhonePosition;

/// Collaborative contact tracing simulator.
#[derive(Debug, Parser)]
#[command(name = "cocot")]
#[command(about = "Simulate BLE distance estimation refined by collaborative graph layouts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ParameterArgs {
    /// TOML file with simulation parameters.
    #[arg(short, long = "config")]
    config_path: Option<PathBuf>,

    /// Parameter overrides, e.g. `population=200 distanceMeasure=Rand`.
    #[arg(value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

impl ParameterArgs {
    fn load(&self) -> Result<Parameters> {
        let mut parameters = match &self.config_path {
            Some(path) => Parameters::from_toml_file(path)?,
            None => Parameters::default(),
        };

        parameters.apply_overrides(self.overrides.as_slice())?;
        parameters.validate()?;
        Ok(parameters)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one simulation and append its results.
    #[command()]
    Run {
        #[command(flatten)]
        parameters: ParameterArgs,
    },

    /// Run one simulation per scene file in a folder.
    #[command()]
    Batch {
        #[arg(short, long)]
        scenes: PathBuf,

        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        #[command(flatten)]
        parameters: ParameterArgs,
    },

    /// Write scene files for seating layouts.
    #[command()]
    Generate {
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        #[arg(short, long, default_value_t = 16.0)]
        range: f64,

        #[arg(short, long, default_value = "INHAND")]
        phone: PhonePosition,

        /// Layouts to write, all of them if none is given.
        #[arg(short, long, value_enum)]
        layout: Vec<Layout>,

        /// Replace existing scene files.
        #[arg(short, long)]
        force: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();

    match args.command {
        Commands::Run { parameters } => {
            let context = Context::new(parameters.load()?);
            run(context)?;
        }
        Commands::Batch {
            scenes,
            jobs,
            parameters,
        } => {
            let context = Context::new(parameters.load()?);
            batch(context, &scenes, jobs).await?;
        }
        Commands::Generate {
            out,
            range,
            phone,
            layout,
            force,
        } => generate(&out, range, phone, &layout, force)?,
    };

    Ok(())
}
