// Batch fetch orchestrator: customer IDs -> records -> likes and track indexes.
//
// IDs are cut into fixed-size batches and fetched with at most
// `max_connections` batches in flight. Each completed batch is folded into
// the aggregation context on this task as it arrives. A batch that fails
// after its own retries is skipped; the run carries on with partial data.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::aggregate::AggregationContext;
use crate::source::{BatchRow, RecordSource};

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub batch_size: usize,
    pub max_connections: usize,
    pub show_progress: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_connections: 50,
            show_progress: false,
        }
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("  Customers [{bar:30}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

/// Fetch every customer and fold the records into `ctx`.
pub async fn fetch_customers(
    ctx: &mut AggregationContext,
    source: &dyn RecordSource,
    customer_ids: &[String],
    settings: &FetchSettings,
) {
    let started = Instant::now();
    let batches: Vec<&[String]> = customer_ids.chunks(settings.batch_size.max(1)).collect();

    info!(
        customers = customer_ids.len(),
        batches = batches.len(),
        concurrency = settings.max_connections,
        "Fetching customer records"
    );

    let pb = progress_bar(customer_ids.len(), settings.show_progress);

    let mut results = stream::iter(batches.into_iter().map(|batch| async move {
        let result = source.fetch_batch(batch).await;
        (batch, result)
    }))
    .buffer_unordered(settings.max_connections.max(1));

    while let Some((batch, result)) = results.next().await {
        match result {
            Ok(rows) => {
                for row in rows {
                    match row {
                        BatchRow::Found { id, record } => ctx.absorb_customer(&id, &record),
                        BatchRow::NotFound { id, reason } => {
                            info!(customer_id = %id, reason = %reason, "Customer not found");
                            ctx.fetch.not_found.push(id);
                        }
                        BatchRow::Malformed { id, reason } => {
                            warn!(customer_id = %id, reason = %reason, "Malformed customer document");
                            ctx.fetch.malformed.push(id);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    batch_size = batch.len(),
                    first_id = batch.first().map(String::as_str).unwrap_or(""),
                    error = %e,
                    "Skipping customer batch"
                );
                ctx.fetch.failed.extend(batch.iter().cloned());
            }
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    info!(
        succeeded = ctx.fetch.succeeded.len(),
        not_found = ctx.fetch.not_found.len(),
        malformed = ctx.fetch.malformed.len(),
        failed = ctx.fetch.failed.len(),
        unique_likes = ctx.likes.len(),
        unique_tracks = ctx.tracks.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Customer fetch complete"
    );
}
