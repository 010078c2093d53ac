// Customer ID listing for an event or a brand.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::models::id_from_value;

/// Whether the cohort is keyed by an event or a brand ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CohortType {
    Event,
    Brand,
}

impl CohortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CohortType::Event => "event",
            CohortType::Brand => "brand",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomerIdsResponse {
    #[serde(default)]
    pub data: Option<CustomerIdsData>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerIdsData {
    #[serde(default, rename = "customerIds")]
    pub customer_ids: Vec<Value>,
}

impl CustomerIdsResponse {
    /// Customer IDs normalised to strings; entries that are neither string
    /// nor number are dropped.
    pub fn into_ids(self) -> Vec<String> {
        self.data
            .map(|d| d.customer_ids.iter().filter_map(id_from_value).collect())
            .unwrap_or_default()
    }
}

/// Build the listing URL for a cohort.
pub fn listing_url(base_url: &str, id: &str, kind: CohortType) -> String {
    let base = base_url.trim_end_matches('/');
    match kind {
        CohortType::Event => format!("{base}/{id}"),
        CohortType::Brand => format!("{base}/{id}/?type=brand"),
    }
}

/// Client for the customer-ID listing endpoint.
pub struct CustomerIdClient {
    client: reqwest::Client,
    base_url: String,
}

impl CustomerIdClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("social-analytics/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Load the cohort's customer IDs. A failed request or an empty cohort
    /// is an error: there is nothing to aggregate.
    pub async fn fetch(&self, id: &str, kind: CohortType) -> Result<Vec<String>> {
        let url = listing_url(&self.base_url, id, kind);
        info!(url = %url, "Loading customer IDs");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Customer ID request failed: {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Customer ID source returned {status} for {url}");
        }

        let ids = response
            .json::<CustomerIdsResponse>()
            .await
            .context("Failed to parse customer ID response")?
            .into_ids();

        if ids.is_empty() {
            anyhow::bail!("No customers found for {} {}", kind.as_str(), id);
        }

        info!(count = ids.len(), "Loaded customer IDs");
        Ok(ids)
    }
}
