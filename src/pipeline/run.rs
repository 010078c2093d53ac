// One full aggregation run, stage by stage.
//
// fetch customers -> resolve tracks to artists -> tally listeners ->
// resolve images for artists with fans -> materialize fan counts.
// Stages hand the same AggregationContext along; only the empty-cohort
// check can fail the run from here.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{info, warn};

use super::fetch::fetch_customers;
use crate::aggregate::compact::compact;
use crate::aggregate::fans::{fan_artist_ids, fan_counts, tally_listeners};
use crate::aggregate::models::{FanCountEntity, LikeEntity};
use crate::aggregate::AggregationContext;
use crate::cache::Caches;
use crate::catalog::client::CatalogApi;
use crate::catalog::resolver::{resolve_artist_images, resolve_tracks, ResolutionStats};
use crate::config::PipelineSettings;
use crate::source::RecordSource;

/// Wall-clock time per stage.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    pub fetch_customers: Duration,
    pub resolve_tracks: Duration,
    pub fan_counts: Duration,
    pub resolve_images: Duration,
    pub close_cache: Duration,
}

/// The external collaborators a run talks to.
pub struct RunSources<'a> {
    pub records: &'a dyn RecordSource,
    pub catalog: &'a dyn CatalogApi,
    /// `None` disables cache reads and writes.
    pub caches: Option<&'a Caches>,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub customer_ids: Vec<String>,
    pub context: AggregationContext,
    pub fan_counts: Vec<FanCountEntity>,
    pub track_resolution: ResolutionStats,
    pub image_resolution: ResolutionStats,
    pub timings: StageTimings,
    pub compact_threshold: u64,
}

impl RunReport {
    pub fn likes(&self) -> &[LikeEntity] {
        self.context.likes.as_slice()
    }

    pub fn compact_likes(&self) -> Vec<&LikeEntity> {
        compact(self.likes(), self.compact_threshold)
    }

    pub fn compact_fan_counts(&self) -> Vec<&FanCountEntity> {
        compact(&self.fan_counts, self.compact_threshold)
    }
}

fn log_stage(stage: &str, elapsed: Duration) {
    info!(stage, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
}

/// Run the pipeline for an already-loaded cohort.
pub async fn run(
    customer_ids: Vec<String>,
    sources: RunSources<'_>,
    settings: &PipelineSettings,
    show_progress: bool,
) -> Result<RunReport> {
    if customer_ids.is_empty() {
        anyhow::bail!("No customer IDs to process");
    }

    let mut ctx = AggregationContext::new();
    let mut timings = StageTimings::default();
    let resolve = settings.resolve();

    let t = Instant::now();
    fetch_customers(
        &mut ctx,
        sources.records,
        &customer_ids,
        &settings.fetch(show_progress),
    )
    .await;
    timings.fetch_customers = t.elapsed();
    log_stage("fetch customers", timings.fetch_customers);

    let t = Instant::now();
    let track_cache = sources.caches.map(|c| c.tracks.as_ref());
    let track_resolution = resolve_tracks(&mut ctx, sources.catalog, track_cache, &resolve).await;
    timings.resolve_tracks = t.elapsed();
    log_stage("resolve tracks", timings.resolve_tracks);

    let t = Instant::now();
    tally_listeners(&mut ctx.artists, &ctx.tracks);
    let fan_ids = fan_artist_ids(&ctx.artists, settings.artist_threshold);
    timings.fan_counts = t.elapsed();
    info!(
        artists = ctx.artists.len(),
        with_fans = fan_ids.len(),
        threshold = settings.artist_threshold,
        "Artist fan counts computed"
    );

    let t = Instant::now();
    let artist_cache = sources.caches.map(|c| c.artists.as_ref());
    let image_resolution =
        resolve_artist_images(&mut ctx, sources.catalog, artist_cache, fan_ids, &resolve).await;
    timings.resolve_images = t.elapsed();
    log_stage("resolve images", timings.resolve_images);

    let fans = fan_counts(&ctx.artists, settings.artist_threshold);

    let t = Instant::now();
    if let Some(caches) = sources.caches {
        if let Err(e) = caches.close().await {
            warn!(error = %e, "Failed to close resolution cache");
        }
    }
    timings.close_cache = t.elapsed();
    log_stage("close cache", timings.close_cache);

    Ok(RunReport {
        customer_ids,
        context: ctx,
        fan_counts: fans,
        track_resolution,
        image_resolution,
        timings,
        compact_threshold: settings.compact_threshold,
    })
}
