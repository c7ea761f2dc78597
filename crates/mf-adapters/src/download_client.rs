//! A generic torrent-client REST adapter (qBittorrent's WebUI API shape:
//! add-by-URL, query by hash) plus the season-pack episode mapping
//! resolved in DESIGN.md's Open Questions: filenames inside a season
//! pack are matched against `S\d{1,2}E\d{1,2}` to recover which episode
//! each file belongs to, with unmatched names surfaced as a warning
//! rather than silently dropped.

use std::time::Duration;

use async_trait::async_trait;
use mf_engine::ports::{AdapterError, DownloadClientAdapter, DownloadStatusInfo, ReleaseCandidate};
use serde::Deserialize;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = "mediaforge/1.0";

#[derive(Debug, Clone)]
pub struct DownloadClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TorrentStatusRow {
    progress: f32,
    state: String,
    #[serde(default)]
    content_path: Option<String>,
    #[serde(default)]
    size: Option<i64>,
}

fn is_completed_state(state: &str) -> bool {
    matches!(state, "uploading" | "stalledUP" | "pausedUP" | "queuedUP" | "completed")
}

pub struct HttpDownloadClientAdapter {
    client: reqwest::Client,
    config: DownloadClientConfig,
}

impl HttpDownloadClientAdapter {
    pub fn new(config: DownloadClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl DownloadClientAdapter for HttpDownloadClientAdapter {
    async fn start(&self, candidate: &ReleaseCandidate, save_path: &str) -> Result<String, AdapterError> {
        let mut form = vec![
            ("urls".to_string(), candidate.download_uri.clone()),
            ("savepath".to_string(), save_path.to_string()),
        ];
        if let Some(api_key) = &self.config.api_key {
            form.push(("apikey".to_string(), api_key.clone()));
        }

        let response = self
            .client
            .post(self.url("/api/v2/torrents/add"))
            .form(&form)
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError::ServiceUnavailable(format!(
                "download client returned {}",
                response.status()
            )));
        }

        Ok(candidate.torrent_hash.clone())
    }

    async fn status(&self, torrent_hash: &str) -> Result<DownloadStatusInfo, AdapterError> {
        let response = self
            .client
            .get(self.url("/api/v2/torrents/info"))
            .query(&[("hashes", torrent_hash)])
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AdapterError::NotFound(format!("no such torrent: {torrent_hash}")));
        }
        if !response.status().is_success() {
            return Err(AdapterError::ServiceUnavailable(format!(
                "download client returned {}",
                response.status()
            )));
        }

        let rows: Vec<TorrentStatusRow> = response
            .json()
            .await
            .map_err(|e| AdapterError::Invalid(format!("malformed torrent status: {e}")))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::NotFound(format!("no such torrent: {torrent_hash}")))?;

        Ok(DownloadStatusInfo {
            progress: row.progress * 100.0,
            completed: is_completed_state(&row.state),
            content_path: row.content_path,
            size: row.size,
        })
    }
}

/// Season-pack content listings map to per-episode files by filename,
/// since one download backs every episode cut from it.
pub mod season_pack {
    use regex::Regex;
    use tracing::warn;

    /// One file inside a season pack, mapped to the episode it belongs to.
    #[derive(Debug, Clone, PartialEq)]
    pub struct EpisodeFile {
        pub season: i32,
        pub episode: i32,
        pub path: String,
    }

    /// Matches the documented `S\d{1,2}E\d{1,2}` pattern (case-insensitive)
    /// against each file in a season pack's content listing. Files whose
    /// name doesn't match are skipped and logged as a warning: season
    /// packs occasionally ship a NFO or sample file alongside the
    /// episodes, and silently dropping those is preferable to silently
    /// misattributing them to an episode, but an operator should still be
    /// told naming looked unusual.
    pub fn map_files(files: &[String]) -> Vec<EpisodeFile> {
        let pattern = Regex::new(r"(?i)S(\d{1,2})E(\d{1,2})").expect("static regex is valid");

        let mut mapped = Vec::new();
        for path in files {
            match pattern.captures(path) {
                Some(caps) => {
                    let season: i32 = caps[1].parse().unwrap_or_default();
                    let episode: i32 = caps[2].parse().unwrap_or_default();
                    mapped.push(EpisodeFile {
                        season,
                        episode,
                        path: path.clone(),
                    });
                }
                None => warn!(file = %path, "season pack file does not match SxxExx naming, skipping"),
            }
        }
        mapped
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn maps_standard_season_episode_naming() {
            let files = vec![
                "Show.Name.S01E01.1080p.mkv".to_string(),
                "Show.Name.S01E02.1080p.mkv".to_string(),
            ];
            let mapped = map_files(&files);
            assert_eq!(mapped.len(), 2);
            assert_eq!(mapped[0], EpisodeFile { season: 1, episode: 1, path: files[0].clone() });
            assert_eq!(mapped[1], EpisodeFile { season: 1, episode: 2, path: files[1].clone() });
        }

        #[test]
        fn matches_case_insensitively() {
            let files = vec!["show.name.s02e10.mkv".to_string()];
            let mapped = map_files(&files);
            assert_eq!(mapped, vec![EpisodeFile { season: 2, episode: 10, path: files[0].clone() }]);
        }

        #[test]
        fn skips_unmatched_filenames() {
            let files = vec![
                "Show.Name.S01E01.mkv".to_string(),
                "Show.Name.nfo".to_string(),
                "sample.mkv".to_string(),
            ];
            let mapped = map_files(&files);
            assert_eq!(mapped.len(), 1);
            assert_eq!(mapped[0].episode, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_states_recognized() {
        assert!(is_completed_state("uploading"));
        assert!(is_completed_state("pausedUP"));
        assert!(!is_completed_state("downloading"));
        assert!(!is_completed_state("stalledDL"));
    }
}
