use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::*;

#[derive(Parser)]
#[command(name = "islet")]
#[command(about = "Compile inline page scripts into WebAssembly islands", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to islet.toml (default: nearest one above the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline steps to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the program generated for a script
    Prepare {
        /// Script file
        script: PathBuf,
        /// Page the script belongs to; its file name keys hot-reload state
        #[arg(long, default_value = "index.page")]
        page: PathBuf,
    },

    /// Compile one script and print its cache entry
    Compile {
        /// Script file
        script: PathBuf,
        /// Page the script belongs to
        #[arg(long, default_value = "index.page")]
        page: PathBuf,
    },

    /// Build a single page as static HTML
    Page {
        /// Page file
        page: PathBuf,
        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Build every page under the pages directory
    Build {
        /// Output mode, overriding the config file
        #[arg(long, value_enum)]
        output: Option<Mode>,
        /// Inject the hot-reload client
        #[arg(long)]
        dev: bool,
    },

    /// List the pages and assets recorded in a manifest
    Manifest {
        /// Manifest file (default: the configured server manifest)
        path: Option<PathBuf>,
    },

    /// Check which compilers and runtime glue are installed
    Doctor {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every cached artifact
    Clean,

    /// Rebuild changed pages and print hot-reload messages as JSON lines
    Watch,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("ISLET_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "islet=debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Prepare { script, page } => {
            prepare_script(config, &script, &page)?;
        }
        Commands::Compile { script, page } => {
            compile_script(config, &script, &page).await?;
        }
        Commands::Page { page, out } => {
            build_page(config, &page, out).await?;
        }
        Commands::Build { output, dev } => {
            build_site(config, output, dev).await?;
        }
        Commands::Manifest { path } => {
            show_manifest(config, path)?;
        }
        Commands::Doctor { json } => {
            doctor_check(config, json).await?;
        }
        Commands::Clean => {
            clean_cache(config)?;
        }
        Commands::Watch => {
            watch_pages(config).await?;
        }
    }

    Ok(())
}
