// Record store client: batched customer document lookups.
//
// The store is a CouchDB-style database: `_all_docs?include_docs=true&keys=[...]`
// returns one row per requested key, either with the document or with an
// error marker (usually "not_found").

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::models::{id_from_value, CustomerRecord};
use super::{BatchRow, RecordSource};
use crate::retry::{is_transient, with_fixed_retry, HttpStatusError};

/// Response body of an `_all_docs` keys lookup.
#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    #[serde(default)]
    pub rows: Option<Vec<AllDocsRow>>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub doc: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Convert raw rows into batch outcomes for the `requested` IDs.
///
/// A row with an error or without a document is reported as not found; a
/// document that isn't a customer record is reported as malformed. Rows
/// whose key is missing or not a scalar can't be attributed and are logged.
/// Requested IDs that got no row at all are reported as not found, so every
/// requested ID gets exactly one outcome.
pub fn rows_to_batch(requested: &[String], rows: Vec<AllDocsRow>) -> Vec<BatchRow> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut outcomes = Vec::with_capacity(requested.len());

    for row in rows {
        let Some(id) = id_from_value(&row.key) else {
            warn!(key = %row.key, error = ?row.error, "Dropping record store row without a usable key");
            continue;
        };
        if !seen.insert(id.clone()) {
            warn!(customer_id = %id, "Duplicate record store row, keeping the first");
            continue;
        }
        let outcome = match (row.error, row.doc) {
            (Some(reason), _) => BatchRow::NotFound { id, reason },
            (None, None) | (None, Some(Value::Null)) => BatchRow::NotFound {
                id,
                reason: "missing document".to_string(),
            },
            (None, Some(doc)) => match serde_json::from_value::<CustomerRecord>(doc) {
                Ok(record) => BatchRow::Found { id, record },
                Err(e) => BatchRow::Malformed {
                    id,
                    reason: e.to_string(),
                },
            },
        };
        outcomes.push(outcome);
    }

    for id in requested {
        if !seen.contains(id) {
            outcomes.push(BatchRow::NotFound {
                id: id.clone(),
                reason: "no row returned".to_string(),
            });
        }
    }

    outcomes
}

/// Retry settings for a single batch request.
#[derive(Debug, Clone, Copy)]
pub struct BatchRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for BatchRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(5000),
        }
    }
}

/// HTTP client for the customer record store.
pub struct RecordStoreClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    retry: BatchRetry,
}

impl RecordStoreClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
        retry: BatchRetry,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("social-analytics/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            retry,
        })
    }

    async fn fetch_once(&self, url: &str, keys: &str) -> Result<Vec<AllDocsRow>> {
        let response = self
            .client
            .get(url)
            .query(&[("include_docs", "true"), ("keys", keys)])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .context("Record store request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HttpStatusError {
                service: "Record store",
                status,
                body,
            }
            .into());
        }

        let body: AllDocsResponse = response
            .json()
            .await
            .context("Failed to parse record store response")?;

        body.rows
            .ok_or_else(|| anyhow::anyhow!("Record store response has no rows"))
    }
}

#[async_trait]
impl RecordSource for RecordStoreClient {
    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<BatchRow>> {
        let url = format!("{}/_all_docs", self.base_url);
        let keys = serde_json::to_string(ids)?;

        debug!(batch_size = ids.len(), "Fetching customer batch");

        let rows = with_fixed_retry(
            self.retry.attempts,
            self.retry.delay,
            "Customer batch",
            is_transient,
            || self.fetch_once(&url, &keys),
        )
        .await
        .with_context(|| format!("Customer batch of {} failed", ids.len()))?;

        Ok(rows_to_batch(ids, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rows_mixed_outcomes() {
        let json = r#"{"rows": [
            {"key": "1", "doc": {"profile": {"gender": "male"}}},
            {"key": "2", "error": "not_found"},
            {"key": 3, "doc": null},
            {"key": "4", "doc": {"likes": "not-a-list"}},
            {"key": "5", "doc": "not a record"}
        ]}"#;
        let resp: AllDocsResponse = serde_json::from_str(json).unwrap();
        let rows = rows_to_batch(&requested(&["1", "2", "3", "4", "5"]), resp.rows.unwrap());

        assert_eq!(rows.len(), 5);
        assert!(matches!(&rows[0], BatchRow::Found { id, record } if id == "1" && record.is_male()));
        assert!(matches!(&rows[1], BatchRow::NotFound { id, reason } if id == "2" && reason == "not_found"));
        assert!(matches!(&rows[2], BatchRow::NotFound { id, .. } if id == "3"));
        assert!(matches!(&rows[3], BatchRow::Found { id, record } if id == "4" && record.likes().is_empty()));
        assert!(matches!(&rows[4], BatchRow::Malformed { id, .. } if id == "5"));
    }

    #[test]
    fn test_mistyped_like_keeps_the_customer() {
        let json = r#"{"rows": [{"key": "c1", "doc": {
            "profile": {"gender": "male"},
            "likes": [{"id": "L1", "name": "Good"}, {"id": "L2", "name": {"en": "x"}}],
            "music_listens": [{"application": {"name": "Spotify"}, "data": {"song": {"url": "https://open.spotify.com/track/t1"}}}]
        }}]}"#;
        let resp: AllDocsResponse = serde_json::from_str(json).unwrap();
        let rows = rows_to_batch(&requested(&["c1"]), resp.rows.unwrap());

        let BatchRow::Found { record, .. } = &rows[0] else {
            panic!("expected a found row, got {:?}", rows[0]);
        };
        assert!(record.is_male());
        assert_eq!(record.likes().len(), 2);
        assert_eq!(record.listens().count(), 1);
    }

    #[test]
    fn test_keyless_rows_leave_requested_ids_accounted() {
        let json = r#"{"rows": [
            {"key": "a", "doc": {}},
            {"key": null, "doc": {}},
            {"key": {"nested": true}, "error": "not_found"},
            {"doc": {}}
        ]}"#;
        let resp: AllDocsResponse = serde_json::from_str(json).unwrap();
        let rows = rows_to_batch(&requested(&["a", "b", "c"]), resp.rows.unwrap());

        assert_eq!(rows.len(), 3);
        assert!(matches!(&rows[0], BatchRow::Found { id, .. } if id == "a"));
        assert!(matches!(&rows[1], BatchRow::NotFound { id, reason } if id == "b" && reason == "no row returned"));
        assert!(matches!(&rows[2], BatchRow::NotFound { id, .. } if id == "c"));
    }

    #[test]
    fn test_response_without_rows() {
        let resp: AllDocsResponse = serde_json::from_str(r#"{"error": "unauthorized"}"#).unwrap();
        assert!(resp.rows.is_none());
    }
}
