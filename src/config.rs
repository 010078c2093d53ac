use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::catalog::client::{DEFAULT_API_URL, DEFAULT_TOKEN_URL};
use crate::catalog::resolver::ResolveSettings;
use crate::catalog::rounds::BunchPlan;
use crate::pipeline::fetch::FetchSettings;
use crate::retry::RetryPolicy;
use crate::source::store::BatchRetry;

/// Tunables for a run. Defaults match the production job.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Customer IDs per record-store request.
    pub batch_size: usize,
    /// Record-store batches in flight.
    pub max_connections: usize,
    /// Catalog IDs per request.
    pub bunch_count: usize,
    /// Catalog bunches per retry round.
    pub api_limit: usize,
    pub retry_max_level: u32,
    /// Base retry delay; also the fixed delay between batch attempts.
    pub retry_after: Duration,
    /// Per-request timeout for every HTTP call.
    pub timeout: Duration,
    /// Per-artist listen count that makes a customer a fan.
    pub artist_threshold: u32,
    /// Minimum count kept in compact results.
    pub compact_threshold: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_connections: 50,
            bunch_count: 50,
            api_limit: 20,
            retry_max_level: 5,
            retry_after: Duration::from_millis(5000),
            timeout: Duration::from_millis(10000),
            artist_threshold: 2,
            compact_threshold: 40,
        }
    }
}

impl PipelineSettings {
    /// Defaults overridden by any `SOCIAL_*` environment variables that are set.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            batch_size: env_or("SOCIAL_BATCH_SIZE", d.batch_size)?,
            max_connections: env_or("SOCIAL_MAX_CONNECTIONS", d.max_connections)?,
            bunch_count: env_or("SOCIAL_BUNCH_COUNT", d.bunch_count)?,
            api_limit: env_or("SOCIAL_API_LIMIT", d.api_limit)?,
            retry_max_level: env_or("SOCIAL_RETRY_MAX_LEVEL", d.retry_max_level)?,
            retry_after: Duration::from_millis(env_or(
                "SOCIAL_RETRY_AFTER_MS",
                d.retry_after.as_millis() as u64,
            )?),
            timeout: Duration::from_millis(env_or("SOCIAL_TIMEOUT_MS", d.timeout.as_millis() as u64)?),
            artist_threshold: env_or("SOCIAL_ARTIST_THRESHOLD", d.artist_threshold)?,
            compact_threshold: env_or("SOCIAL_COMPACT_THRESHOLD", d.compact_threshold)?,
        })
    }

    pub fn fetch(&self, show_progress: bool) -> FetchSettings {
        FetchSettings {
            batch_size: self.batch_size,
            max_connections: self.max_connections,
            show_progress,
        }
    }

    pub fn resolve(&self) -> ResolveSettings {
        ResolveSettings {
            plan: BunchPlan {
                bunch_size: self.bunch_count,
                bunches_per_round: self.api_limit,
            },
            retry: RetryPolicy {
                max_level: self.retry_max_level,
                base_delay: self.retry_after,
            },
            probe_concurrency: self.max_connections,
        }
    }

    /// Record-store batches get `retry_max_level` attempts spaced by `retry_after`.
    pub fn batch_retry(&self) -> BatchRetry {
        BatchRetry {
            attempts: self.retry_max_level,
            delay: self.retry_after,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        _ => Ok(default),
    }
}

/// Central configuration loaded from environment variables.
///
/// Secrets come from env vars only. A .env file is loaded at startup via dotenvy.
pub struct Config {
    /// Customer-ID listing endpoint, e.g. https://host/api/customer-ids
    pub customer_ids_url: String,
    /// Customer record database (CouchDB-style).
    pub records_url: String,
    pub records_username: String,
    pub records_password: String,
    /// Report database; shares the record store credentials.
    pub reports_url: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_api_url: String,
    pub spotify_token_url: String,
    /// Directory holding tracks.db and artists.db.
    pub cache_dir: PathBuf,
    pub settings: PipelineSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            customer_ids_url: env::var("CUSTOMER_IDS_URL").unwrap_or_default(),
            records_url: env::var("RECORDS_URL").unwrap_or_default(),
            records_username: env::var("RECORDS_USERNAME").unwrap_or_default(),
            records_password: env::var("RECORDS_PASSWORD").unwrap_or_default(),
            reports_url: env::var("REPORTS_URL").unwrap_or_default(),
            spotify_client_id: env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
            spotify_client_secret: env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
            spotify_api_url: env::var("SPOTIFY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            spotify_token_url: env::var("SPOTIFY_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            cache_dir: env::var("SOCIAL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./cache")),
            settings: PipelineSettings::from_env()?,
        })
    }

    /// Check that the customer sources are configured.
    pub fn require_sources(&self) -> Result<()> {
        if self.customer_ids_url.is_empty() || self.records_url.is_empty() {
            anyhow::bail!(
                "CUSTOMER_IDS_URL and RECORDS_URL must be set. Add them to your .env file."
            );
        }
        if self.records_username.is_empty() {
            anyhow::bail!("RECORDS_USERNAME not set. Add it to your .env file.");
        }
        Ok(())
    }

    /// Check that Spotify client credentials are configured.
    pub fn require_spotify(&self) -> Result<()> {
        if self.spotify_client_id.is_empty() || self.spotify_client_secret.is_empty() {
            anyhow::bail!(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set. Add them to your .env file."
            );
        }
        Ok(())
    }

    /// Check that the report database is configured (skipped on dry runs).
    pub fn require_reports(&self) -> Result<()> {
        if self.reports_url.is_empty() {
            anyhow::bail!("REPORTS_URL not set. Add it to your .env file, or pass --dry-run.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_production() {
        let s = PipelineSettings::default();
        assert_eq!(s.batch_size, 50);
        assert_eq!(s.bunch_count, 50);
        assert_eq!(s.api_limit, 20);
        assert_eq!(s.retry_max_level, 5);
        assert_eq!(s.artist_threshold, 2);
        assert_eq!(s.compact_threshold, 40);
    }

    #[test]
    fn test_resolve_settings_derived() {
        let s = PipelineSettings::default();
        let r = s.resolve();
        assert_eq!(r.plan.outer_batch_size(), 1000);
        assert_eq!(r.retry.delay_for(2), Duration::from_millis(10000));
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let value: usize = env_or("SOCIAL_TEST_UNSET_KEY_FOR_CONFIG", 7).unwrap();
        assert_eq!(value, 7);
    }
}
