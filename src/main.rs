use anyhow::{Context, Result};
use catalog_migrator::backfill::BackfillResolver;
use catalog_migrator::config::{AppConfig, CliConfig, FileConfig};
use catalog_migrator::importer;
use catalog_migrator::library_store::{LibraryStore, SqliteLibraryStore};
use catalog_migrator::matcher::Matcher;
use catalog_migrator::pipeline::Pipeline;
use catalog_migrator::replicator::PlaylistReplicator;
use catalog_migrator::source_catalog::SpotifyClient;
use catalog_migrator::target_catalog::AppleMusicClient;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Absolute, canonical form of a command line path. Paths that don't exist
/// yet (a new database file) are only made absolute.
fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => path_buf,
        Err(e) => return Err(e).with_context(|| format!("Error resolving path: {}", s)),
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version, about = "Migrate playlists from Spotify exports to Apple Music")]
struct CliArgs {
    /// Path to a TOML config file. Its values override command line values.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite migration database file.
    #[clap(long, global = true, default_value = "library.db", value_parser = parse_path)]
    pub db: PathBuf,

    /// Target catalog storefront.
    #[clap(long, global = true, default_value = "us")]
    pub storefront: String,

    /// Locale used when creating playlists.
    #[clap(long, global = true, default_value = "en-US")]
    pub locale: String,

    /// Timeout in seconds for catalog requests.
    #[clap(long, global = true, default_value_t = 30)]
    pub request_timeout_sec: u64,

    #[clap(long, global = true, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    pub spotify_client_id: Option<String>,

    #[clap(long, global = true, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,

    #[clap(long, global = true, env = "APPLE_DEVELOPER_TOKEN", hide_env_values = true)]
    pub apple_developer_token: Option<String>,

    #[clap(long, global = true, env = "APPLE_MUSIC_USER_TOKEN", hide_env_values = true)]
    pub apple_music_user_token: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Imports playlist export files, or every `.csv` file of a directory.
    Import {
        #[clap(required = true, value_parser = parse_path)]
        paths: Vec<PathBuf>,
    },

    /// Fills missing artist names and album UPCs from Spotify.
    Backfill,

    /// Links songs and albums to Apple Music by ISRC and UPC.
    Match,

    /// Creates the imported playlists in Apple Music.
    Replicate,

    /// Runs every stage in order, importing the exports directory first if given.
    Run {
        #[clap(long, value_parser = parse_path)]
        exports: Option<PathBuf>,
    },

    /// Shows what the database holds and what each stage still has to do.
    Status,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db.clone(),
            storefront: self.storefront.clone(),
            locale: self.locale.clone(),
            request_timeout_sec: self.request_timeout_sec,
            spotify_client_id: self.spotify_client_id.clone(),
            spotify_client_secret: self.spotify_client_secret.clone(),
            apple_developer_token: self.apple_developer_token.clone(),
            apple_music_user_token: self.apple_music_user_token.clone(),
        }
    }
}

fn spotify_client(config: &AppConfig) -> Result<SpotifyClient> {
    let credentials = config.require_spotify()?.clone();
    SpotifyClient::new(credentials, config.request_timeout)
        .context("Failed to create Spotify client")
}

fn apple_music_client(config: &AppConfig) -> Result<AppleMusicClient> {
    let credentials = config.require_apple_music()?.clone();
    AppleMusicClient::new(
        credentials,
        &config.storefront,
        &config.locale,
        config.request_timeout,
    )
    .context("Failed to create Apple Music client")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // A missing .env file is fine; credentials may come from the environment.
    let dotenv = dotenvy::dotenv();

    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    if let Ok(path) = dotenv {
        info!("Loaded environment from {:?}", path);
    }

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening migration database at {:?}", config.db_path);
    let store = SqliteLibraryStore::new(&config.db_path)?;

    match cli_args.command {
        Command::Import { paths } => {
            let report = importer::import_paths(&store, &paths)?;
            info!(
                "Imported {} files: {} rows, {} skipped, {} songs created, {} updated",
                report.files,
                report.rows_read,
                report.rows_skipped,
                report.songs.created,
                report.songs.updated
            );
            print_json(&report)?;
        }
        Command::Backfill => {
            let spotify = spotify_client(&config)?;
            let summary = BackfillResolver::new(&store, &spotify, config.backfill.clone()).run()?;
            print_json(&summary)?;
        }
        Command::Match => {
            let apple_music = apple_music_client(&config)?;
            let summary = Matcher::new(&store, &apple_music, config.matching.clone()).run()?;
            print_json(&summary)?;
        }
        Command::Replicate => {
            let apple_music = apple_music_client(&config)?;
            let report =
                PlaylistReplicator::new(&store, &apple_music, config.replication.clone()).run()?;
            if !report.failed.is_empty() {
                warn!("{} playlists could not be created", report.failed.len());
            }
            print_json(&report)?;
        }
        Command::Run { exports } => {
            let spotify = spotify_client(&config)?;
            let apple_music = apple_music_client(&config)?;
            let pipeline = Pipeline::new(
                &store,
                &spotify,
                &apple_music,
                config.pipeline_settings(),
            );
            let exports: Vec<PathBuf> = exports.into_iter().collect();
            let report = pipeline.run(&exports)?;
            print_json(&report)?;
        }
        Command::Status => {
            print_json(&serde_json::json!({
                "counts": store.counts()?,
                "pending": store.pending_work()?,
                "config": store.get_or_create_config()?,
            }))?;
        }
    }

    Ok(())
}
