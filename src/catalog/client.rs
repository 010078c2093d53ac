// Spotify catalog client: client-credentials auth and bunched lookups.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::models::{ArtistsResponse, CatalogArtist, CatalogTrack, TokenResponse, TracksResponse};

/// Default Web API base.
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Default OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Bunched catalog lookups. `Err` means the whole bunch failed (transport,
/// timeout, non-2xx). Unknown IDs and malformed entities are simply absent
/// from an `Ok` result.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn tracks(&self, ids: &[String]) -> Result<Vec<CatalogTrack>>;
    async fn artists(&self, ids: &[String]) -> Result<Vec<CatalogArtist>>;
}

/// Authenticated Spotify Web API client.
pub struct SpotifyClient {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl SpotifyClient {
    /// Obtain an app token via the client-credentials grant.
    ///
    /// Failure here is fatal to a run: without a token no track can be
    /// resolved.
    pub async fn authenticate(
        api_url: &str,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("social-analytics/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let response = client
            .post(token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Spotify token request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Spotify login failed with {status}: {body}");
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse Spotify token response")?;

        info!(expires_in = ?token.expires_in, "Spotify access token acquired");

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: token.access_token,
        })
    }

    async fn get_ids<T: DeserializeOwned>(&self, path: &str, ids: &[String]) -> Result<T> {
        let url = format!("{}/{}", self.api_url, path);
        let joined = ids.join(",");

        debug!(path = path, count = ids.len(), "Catalog GET request");

        let response = self
            .client
            .get(&url)
            .query(&[("ids", joined.as_str())])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Catalog request failed: {path}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Catalog {path} returned {status}: {}", body.replace('\n', " "));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to deserialize {path} response"))
    }
}

#[async_trait]
impl CatalogApi for SpotifyClient {
    async fn tracks(&self, ids: &[String]) -> Result<Vec<CatalogTrack>> {
        let resp: TracksResponse = self.get_ids("tracks", ids).await?;
        Ok(resp.tracks)
    }

    async fn artists(&self, ids: &[String]) -> Result<Vec<CatalogArtist>> {
        let resp: ArtistsResponse = self.get_ids("artists", ids).await?;
        Ok(resp.artists)
    }
}
