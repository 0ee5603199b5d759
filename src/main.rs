mod config;
mod database;
mod entities;
mod http_server;
mod logging;
mod ports;
mod provider_rs;
mod services;
mod sync;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    database::Database,
    http_server::{app::HttpServerConfig, state::AppState},
    logging::{SERVICE_NAME, init_tracing},
    ports::provider::ProviderCredential,
    services::{local_store::SeaOrmLocalStore, provider::ProviderHttpAdapter, sync_service::SyncService},
    sync::{SyncEngine, SyncOptions, SyncRequest, lock::PlaylistLocks, rate_limit::ProviderRateLimiter},
};

/// How often idle rate limiter buckets are dropped.
const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "PLAYLIST_SYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Tracing filter, overrides `telemetry.filter` (e.g. `info,playlist_sync=debug`)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP sync trigger
    Serve {
        /// The port to run the server on, overrides `server.port`
        #[arg(short, long, env = "PLAYLIST_SYNC_PORT")]
        port: Option<u16>,
    },
    /// Run one sync pass and print the result as JSON
    Sync {
        /// Local playlist id
        playlist_id: i64,

        /// Local user requesting the sync; must own the playlist
        #[arg(long, env = "PLAYLIST_SYNC_CALLER")]
        caller: String,

        /// Account id at the provider, defaults to the caller
        #[arg(long)]
        provider_user: Option<String>,

        /// Provider access token
        #[arg(long, env = "PLAYLIST_SYNC_TOKEN", hide_env_values = true)]
        token: String,

        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        create_if_not_exists: bool,

        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        update_existing: bool,

        /// Skip songs without a match instead of aborting
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        handle_conflicts: bool,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

struct Components {
    sync: Arc<SyncService>,
    limiter: Arc<ProviderRateLimiter>,
}

async fn build_components(config: &Config) -> Result<Components> {
    tracing::debug!(path = %config.database_path().display(), "Opening database");
    let database = Arc::new(Database::open(&config.database_path()).await?);
    let store = Arc::new(SeaOrmLocalStore::new(database));

    let provider = Arc::new(ProviderHttpAdapter::new(
        config.api_base_url()?,
        config.request_timeout()?,
    ));
    let limiter = Arc::new(config.rate_limiter()?);

    let engine = SyncEngine::new(
        store.clone(),
        provider,
        config.provider.name.clone(),
        limiter.clone(),
        Arc::new(PlaylistLocks::new()),
        config.engine_settings()?,
    );

    Ok(Components {
        sync: Arc::new(SyncService::new(Arc::new(engine), store)),
        limiter,
    })
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing the current batch");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let config = {
        if let Some(config) = &args.config {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .wrap_err("Failed to load playlist-sync config")?;

    let filter = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.telemetry.filter.clone());
    let tracer_provider = init_tracing(SERVICE_NAME, config.telemetry.otlp_endpoint.as_deref(), &filter)?;

    tracing::debug!("Playlist sync starting");

    match args.command {
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                tracing::info!(path = %path.display(), "Default config ready");
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
        Commands::Serve { port } => {
            let components = build_components(&config).await?;
            let shutdown = CancellationToken::new();

            {
                let limiter = components.limiter.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(LIMITER_CLEANUP_INTERVAL);
                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = interval.tick() => limiter.retain_recent(),
                        }
                    }
                });
            }

            let port = port.unwrap_or(config.server.port);
            tracing::info!(port, provider = %config.provider.name, "Starting HTTP server");
            http_server::app::start(HttpServerConfig {
                port,
                state: Arc::new(AppState {
                    sync: components.sync,
                    shutdown,
                }),
            })
            .await?;
        }
        Commands::Sync {
            playlist_id,
            caller,
            provider_user,
            token,
            create_if_not_exists,
            update_existing,
            handle_conflicts,
        } => {
            let components = build_components(&config).await?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let request = SyncRequest {
                playlist_id,
                credential: ProviderCredential::new(provider_user.unwrap_or_else(|| caller.clone()), token),
                caller_user_id: caller,
                options: SyncOptions {
                    create_if_not_exists,
                    update_existing,
                    handle_conflicts,
                },
            };

            let result = components
                .sync
                .sync_playlist(request, cancel)
                .await
                .wrap_err_with(|| format!("Sync of playlist {} failed", playlist_id))?;

            let output = serde_json::to_string_pretty(&result).wrap_err("Failed to serialize sync result")?;
            println!("{}", output);
        }
    }

    if let Some(tracer_provider) = tracer_provider {
        if let Err(e) = tracer_provider.shutdown() {
            eprintln!("Failed to flush traces: {}", e);
        }
    }

    Ok(())
}
