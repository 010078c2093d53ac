use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use social_analytics::cache::Caches;
use social_analytics::catalog::client::SpotifyClient;
use social_analytics::config::Config;
use social_analytics::pipeline::run::{run, RunSources};
use social_analytics::report::sink::ReportStore;
use social_analytics::report::{build_documents, summary, ReportOptions, Section, DEFAULT_SECTIONS};
use social_analytics::source::ids::{CohortType, CustomerIdClient};
use social_analytics::source::store::RecordStoreClient;

/// Social analytics: likes and music-streaming reports for a customer cohort.
///
/// Fetches every customer of an event or brand, aggregates their likes and
/// streamed tracks, resolves tracks to artists on Spotify, and writes the
/// resulting report documents.
#[derive(Parser)]
#[command(name = "social-analytics", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a cohort and upload its reports
    Run {
        /// Event or brand ID
        #[arg(long)]
        id: String,

        /// Cohort type
        #[arg(long = "type", value_enum, default_value = "event")]
        kind: CohortType,

        /// Sections to write (comma-separated)
        #[arg(long, value_enum, value_delimiter = ',')]
        section: Vec<Section>,

        /// Embed the customer ID list in every document
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        include_ids: bool,

        /// Skip the resolution cache entirely (no reads, no writes)
        #[arg(long)]
        no_cache: bool,

        /// Build the reports but don't upload them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show entry counts in the resolution cache
    CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("social_analytics=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            id,
            kind,
            section,
            include_ids,
            no_cache,
            dry_run,
        } => {
            let config = Config::load()?;
            config.require_sources()?;
            config.require_spotify()?;
            if !dry_run {
                config.require_reports()?;
            }
            let settings = &config.settings;

            let customer_ids = CustomerIdClient::new(&config.customer_ids_url, settings.timeout)?
                .fetch(&id, kind)
                .await?;
            info!(count = customer_ids.len(), id = %id, kind = kind.as_str(), "Customer IDs loaded");

            let catalog = SpotifyClient::authenticate(
                &config.spotify_api_url,
                &config.spotify_token_url,
                &config.spotify_client_id,
                &config.spotify_client_secret,
                settings.timeout,
            )
            .await
            .context("Spotify authentication failed")?;

            let records = RecordStoreClient::new(
                &config.records_url,
                &config.records_username,
                &config.records_password,
                settings.timeout,
                settings.batch_retry(),
            )?;

            let caches = if no_cache {
                info!("Resolution cache disabled");
                None
            } else {
                Some(open_caches(&config)?)
            };

            let report = run(
                customer_ids,
                RunSources {
                    records: &records,
                    catalog: &catalog,
                    caches: caches.as_ref(),
                },
                settings,
                true,
            )
            .await?;

            summary::display_run_summary(&report);

            let options = ReportOptions {
                kind,
                id,
                sections: if section.is_empty() {
                    DEFAULT_SECTIONS.to_vec()
                } else {
                    section
                },
                include_ids,
            };
            let docs = build_documents(&report, &options, chrono::Utc::now());

            if dry_run {
                let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
                summary::display_dry_run(&ids);
                return Ok(());
            }

            let store = ReportStore::new(
                &config.reports_url,
                &config.records_username,
                &config.records_password,
                settings.timeout,
            )?;
            let uploaded = store.upload_all(docs, settings.max_connections).await;
            summary::display_upload(&uploaded);
        }

        Commands::CacheStats => {
            let config = Config::load()?;
            let caches = open_caches(&config)?;
            let tracks = caches.tracks.len().await?;
            let artists = caches.artists.len().await?;
            caches.close().await?;
            summary::display_cache_stats(&[("tracks", tracks), ("artists", artists)]);
        }
    }

    Ok(())
}

/// Open the on-disk cache pair under `cache_dir`.
fn open_caches(config: &Config) -> Result<Caches> {
    #[cfg(feature = "sqlite")]
    {
        use social_analytics::cache::sqlite::SqliteCache;
        use std::sync::Arc;

        let tracks = SqliteCache::open(&config.cache_dir.join("tracks.db"))?;
        let artists = SqliteCache::open(&config.cache_dir.join("artists.db"))?;
        info!(dir = %config.cache_dir.display(), "Resolution cache opened");
        return Ok(Caches {
            tracks: Arc::new(tracks),
            artists: Arc::new(artists),
        });
    }
    #[cfg(not(feature = "sqlite"))]
    {
        tracing::warn!(
            dir = %config.cache_dir.display(),
            "Built without the 'sqlite' feature; resolution cache is in-memory only"
        );
        Ok(Caches::in_memory())
    }
}
