// Customer data sources: the ID listing and the customer record store.
//
// The record store sits behind the RecordSource trait so the batch fetch
// orchestrator can be driven by an in-memory fake in tests.

pub mod ids;
pub mod models;
pub mod store;

use anyhow::Result;
use async_trait::async_trait;

use models::CustomerRecord;

/// Outcome for a single requested customer ID within a batch.
#[derive(Debug, Clone)]
pub enum BatchRow {
    Found { id: String, record: CustomerRecord },
    NotFound { id: String, reason: String },
    /// The store returned a document that is not a customer record.
    Malformed { id: String, reason: String },
}

/// Fetches customer records in batches.
///
/// Implementations own their retry policy: an `Err` means the whole batch
/// is lost after retries are exhausted.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<BatchRow>>;
}
