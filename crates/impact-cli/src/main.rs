//! impact CLI: explicit impact simulations from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "impact")]
#[command(version, about = "Explicit finite-element impact solver with rigid-wall contact")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a config file.
    Run {
        /// Path to simulation config (TOML).
        #[arg(short, long, default_value = "simulation.toml")]
        config: PathBuf,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print mesh statistics and the critical time step.
    Inspect {
        /// Path to an input deck (.inp).
        mesh: PathBuf,

        /// Take the material from this config instead of the default steel.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check a config file and the mesh it points to.
    Validate {
        /// Path to simulation config (TOML).
        config: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, json } => commands::run(&config, json),
        Commands::Inspect { mesh, config } => commands::inspect(&mesh, config.as_deref()),
        Commands::Validate { config } => commands::validate(&config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}
