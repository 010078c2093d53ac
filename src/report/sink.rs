// Report store client: upsert gzipped report documents.
//
// Upsert is check-then-overwrite: look up the document's current revision,
// attach it as `_rev` if there is one, then POST the gzipped body. Two
// concurrent writers can still race; that is acceptable for a batch job.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::ReportDocument;

#[derive(Debug, Deserialize)]
struct RevLookupResponse {
    #[serde(default)]
    rows: Vec<RevLookupRow>,
}

#[derive(Debug, Deserialize)]
struct RevLookupRow {
    #[serde(default)]
    value: Option<RevValue>,
}

#[derive(Debug, Deserialize)]
struct RevValue {
    rev: String,
}

/// Gzip a document's JSON encoding.
pub fn gzip_document(doc: &ReportDocument) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(doc).context("Failed to encode report document")?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    encoder.finish().context("Failed to gzip report document")
}

/// Upload outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub written: Vec<String>,
    pub failed: Vec<String>,
}

pub struct ReportStore {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ReportStore {
    pub fn new(base_url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self> {
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
        })
    }

    /// Current revision of a document, if it exists.
    async fn current_rev(&self, id: &str) -> Result<Option<String>> {
        let url = format!("{}/_all_docs", self.base_url);
        let keys = serde_json::to_string(&[id])?;

        let response = self
            .client
            .get(&url)
            .query(&[("keys", keys.as_str())])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .context("Revision lookup failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Revision lookup returned {}", response.status());
        }

        let body: RevLookupResponse = response
            .json()
            .await
            .context("Failed to parse revision lookup")?;

        Ok(body
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.value)
            .map(|v| v.rev))
    }

    /// Write one document, overwriting any existing revision.
    pub async fn upsert(&self, mut doc: ReportDocument) -> Result<()> {
        match self.current_rev(&doc.id).await {
            Ok(Some(rev)) => {
                debug!(id = %doc.id, rev = %rev, "Overwriting existing report");
                doc.rev = Some(rev);
            }
            Ok(None) => debug!(id = %doc.id, "Creating new report"),
            Err(e) => warn!(id = %doc.id, error = %e, "Revision lookup failed, creating new"),
        }

        let body = gzip_document(&doc)?;
        let response = self
            .client
            .post(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to post report {}", doc.id))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Report store returned {status} for {}: {text}", doc.id);
        }
        Ok(())
    }

    /// Upload every document with bounded concurrency. Failures are logged
    /// and counted; they never stop the other uploads.
    pub async fn upload_all(&self, docs: Vec<ReportDocument>, concurrency: usize) -> UploadStats {
        let mut stats = UploadStats::default();
        let mut uploads = stream::iter(docs.into_iter().map(|doc| async move {
            let id = doc.id.clone();
            (id, self.upsert(doc).await)
        }))
        .buffer_unordered(concurrency.max(1));

        while let Some((id, result)) = uploads.next().await {
            match result {
                Ok(()) => {
                    info!(id = %id, "Report written");
                    stats.written.push(id);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Report upload failed");
                    stats.failed.push(id);
                }
            }
        }
        stats
    }
}
