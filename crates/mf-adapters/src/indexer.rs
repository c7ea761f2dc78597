//! A generic Torznab/Prowlarr-style indexer adapter: one HTTP JSON search
//! endpoint returning a list of releases, shaped close enough to the
//! common aggregator APIs that a single client covers most indexers
//! behind a config swap. Grounded on the discovery sources' pattern of
//! one `reqwest` client built once per source and reused across calls.

use std::time::Duration;

use async_trait::async_trait;
use mf_engine::ports::{AdapterError, IndexerAdapter, ReleaseCandidate, ReleaseQuery};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = "mediaforge/1.0";

/// One configured indexer endpoint (e.g. a Prowlarr instance plus API key).
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub name: String,
    pub search_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponseRow {
    title: String,
    #[serde(rename = "infoHash")]
    info_hash: String,
    #[serde(rename = "downloadUrl")]
    download_url: String,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default, rename = "seasonPack")]
    season_pack: bool,
}

pub struct HttpIndexerAdapter {
    client: reqwest::Client,
    config: IndexerConfig,
}

impl HttpIndexerAdapter {
    pub fn new(config: IndexerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    fn build_request(&self, query: &ReleaseQuery) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(&self.config.search_url)
            .query(&[("q", query_string(query))]);
        if let (Some(season), Some(episode)) = (query.season, query.episode) {
            request = request.query(&[("season", season), ("episode", episode)]);
        }
        if let Some(api_key) = &self.config.api_key {
            request = request.query(&[("apikey", api_key.as_str())]);
        }
        request
    }
}

fn query_string(query: &ReleaseQuery) -> String {
    match query.year {
        Some(year) => format!("{} {}", query.title, year),
        None => query.title.clone(),
    }
}

fn map_response_error(indexer: &str, status: reqwest::StatusCode, body: &str) -> AdapterError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AdapterError::RateLimited {
            message: format!("{indexer} returned 429"),
            retry_after_ms: 60_000,
        };
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return AdapterError::NotFound(format!("{indexer}: {body}"));
    }
    if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
        return AdapterError::Forbidden(format!("{indexer}: {body}"));
    }
    if status.is_server_error() {
        return AdapterError::ServiceUnavailable(format!("{indexer} returned {status}"));
    }
    AdapterError::Invalid(format!("{indexer} returned {status}: {body}"))
}

#[async_trait]
impl IndexerAdapter for HttpIndexerAdapter {
    async fn search(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, AdapterError> {
        let response = self
            .build_request(query)
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_response_error(&self.config.name, status, &body));
        }

        let rows: Vec<SearchResponseRow> = response
            .json()
            .await
            .map_err(|e| AdapterError::Invalid(format!("malformed response from {}: {e}", self.config.name)))?;

        debug!(indexer = %self.config.name, results = rows.len(), "indexer search returned results");

        Ok(rows
            .into_iter()
            .map(|row| ReleaseCandidate {
                indexer: self.config.name.clone(),
                release_name: row.title,
                torrent_hash: row.info_hash,
                download_uri: row.download_url,
                season_pack: row.season_pack,
                size: row.size,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_includes_year_when_present() {
        let query = ReleaseQuery {
            title: "Arrival".to_string(),
            year: Some(2016),
            season: None,
            episode: None,
        };
        assert_eq!(query_string(&query), "Arrival 2016");
    }

    #[test]
    fn query_string_omits_year_when_absent() {
        let query = ReleaseQuery {
            title: "Arrival".to_string(),
            year: None,
            season: None,
            episode: None,
        };
        assert_eq!(query_string(&query), "Arrival");
    }

    #[test]
    fn maps_429_to_rate_limited() {
        let err = map_response_error("rarbg", reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, AdapterError::RateLimited { .. }));
    }

    #[test]
    fn maps_404_to_not_found() {
        let err = map_response_error("rarbg", reqwest::StatusCode::NOT_FOUND, "no results");
        assert!(matches!(err, AdapterError::NotFound(_)));
    }

    #[test]
    fn maps_5xx_to_service_unavailable() {
        let err = map_response_error("rarbg", reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, AdapterError::ServiceUnavailable(_)));
    }
}
