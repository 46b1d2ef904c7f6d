//! Band Manager - command-line client for the music-band catalog.
//!
//! Signs in against the catalog backend and browses or deletes bands. The
//! session survives between runs; expired access tokens are renewed
//! transparently.

mod app;

use std::io;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Band Manager - music-band catalog client
#[derive(Parser)]
#[command(name = "bandmanager")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Backend URL (overrides the config file)
    #[arg(long, global = true, env = "BANDMANAGER_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Username (defaults to the last one used)
        username: Option<String>,
    },

    /// Create an account and sign in
    Register { username: String },

    /// End the session
    Logout,

    /// Check whether the stored session is still valid
    Status,

    /// Show the signed-in user and their permissions
    Whoami,

    /// Browse and manage music bands
    Bands(BandsArgs),
}

#[derive(Args)]
pub struct BandsArgs {
    #[command(subcommand)]
    pub command: BandsCommand,
}

#[derive(Subcommand)]
pub enum BandsCommand {
    /// List bands, one page at a time
    List(ListArgs),

    /// Show a single band
    Get { id: i64 },

    /// Delete a band
    Delete { id: i64 },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Zero-based page number
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    #[arg(long, default_value_t = 10)]
    pub size: u32,

    /// Sort field, may be repeated
    #[arg(long)]
    pub sort: Vec<String>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Filter by name substring
    #[arg(long)]
    pub name: Option<String>,

    /// Filter by genre, e.g. punk-rock
    #[arg(long)]
    pub genre: Option<String>,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: bool) {
    // RUST_LOG wins; otherwise warn, or debug with --verbose
    let default = if verbose { "bandmanager=debug,bandmanager_core=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    info!("Band Manager starting");

    let mut app = App::new(cli.api_url, cli.json)?;

    let result = match cli.command {
        Commands::Login { username } => app.login(username).await,
        Commands::Register { username } => app.register(username).await,
        Commands::Logout => app.logout().await,
        Commands::Status => app.status().await,
        Commands::Whoami => app.whoami().await,
        Commands::Bands(args) => match args.command {
            BandsCommand::List(list) => app.list_bands(list).await,
            BandsCommand::Get { id } => app.show_band(id).await,
            BandsCommand::Delete { id } => app.delete_band(id).await,
        },
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    info!("Band Manager shutting down");
    Ok(())
}
