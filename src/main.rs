//! music-extended - command-line client for the Spotify Web API
//!
//! Authorization-code + PKCE login, encrypted token storage, and an
//! authenticated request pipeline with transparent refresh.

mod api;
mod auth;
mod config;
mod models;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{SpotifyClient, TimeRange};
use config::Config;

#[derive(Parser)]
#[command(name = "music-extended")]
#[command(about = "CLI client for the Spotify Web API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with the streaming service
    Login {
        /// Force interactive login even if a valid token exists
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Show current user profile (verify auth works)
    Whoami,

    /// List your playlists
    Playlists {
        #[arg(short, long, default_value = "20")]
        limit: u32,
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// List your saved tracks
    Saved {
        #[arg(short, long, default_value = "20")]
        limit: u32,
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// List your top artists
    TopArtists {
        /// Affinity window
        #[arg(short, long, value_enum, default_value_t = TimeRange::Medium)]
        range: TimeRange,
        #[arg(short, long, default_value = "20")]
        limit: u32,
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// List your top tracks
    TopTracks {
        /// Affinity window
        #[arg(short, long, value_enum, default_value_t = TimeRange::Medium)]
        range: TimeRange,
        #[arg(short, long, default_value = "20")]
        limit: u32,
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// Search for tracks
    Search {
        /// Free-text query (e.g. "artist:abba dancing")
        query: String,
        #[arg(short, long, default_value = "5")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load()?;

    match cli.command {
        Commands::Logout => {
            tracing::info!("Logging out...");
            let tokens = auth::local_session(&config)?;
            auth::logout(&tokens).await?;
        }
        Commands::Status => {
            let tokens = auth::local_session(&config)?;
            auth::status(&tokens).await?;
        }
        Commands::Login { force } => {
            tracing::info!("Starting authentication flow...");
            let (tokens, endpoint) = auth::session(&config)?;
            auth::login(&tokens, &endpoint, force).await?;
        }
        command => {
            let (tokens, _) = auth::session(&config)?;
            let client = SpotifyClient::new(&config, tokens)?;
            run_api_command(&client, command).await?;
        }
    }

    Ok(())
}

async fn run_api_command(client: &SpotifyClient, command: Commands) -> Result<()> {
    match command {
        Commands::Whoami => api::whoami(client).await,
        Commands::Playlists { limit, offset } => api::list_playlists(client, limit, offset).await,
        Commands::Saved { limit, offset } => api::saved_tracks(client, limit, offset).await,
        Commands::TopArtists {
            range,
            limit,
            offset,
        } => api::top_artists(client, range, limit, offset).await,
        Commands::TopTracks {
            range,
            limit,
            offset,
        } => api::top_tracks(client, range, limit, offset).await,
        Commands::Search { query, limit } => {
            tracing::info!("Searching...");
            api::search_tracks(client, &query, limit).await
        }
        Commands::Login { .. } | Commands::Logout | Commands::Status => Ok(()),
    }
}
