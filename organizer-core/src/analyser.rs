use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::AnalyserError;
use crate::model::{Guess, MediaType};
use crate::retry::{retry, RetryPolicy};

/// Wraps the remote filename analyser (§4.3).
#[async_trait]
pub trait AnalyserClient: Send + Sync {
    async fn analyse(&self, filename: &str) -> Result<Guess, AnalyserError>;
}

/// Normalises a filename for cache-key and fallback-stem purposes:
/// case-folded, internal whitespace collapsed (§4.3).
fn normalise(filename: &str) -> String {
    filename
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scans raw bytes for the first balanced `{ ... }` JSON object, tolerating
/// leading/trailing wrapping noise (e.g. markdown fences) around it.
fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct RawGuess {
    title: String,
    year: Option<u16>,
    #[serde(rename = "type")]
    media_type: String,
    season: Option<u32>,
    episode: Option<u32>,
}

fn parse_guess(body: &str) -> Result<Guess, AnalyserError> {
    let json = extract_first_json_object(body)
        .ok_or_else(|| AnalyserError::SchemaViolation("no JSON object found in response".into()))?;

    let raw: RawGuess = serde_json::from_str(json)
        .map_err(|e| AnalyserError::SchemaViolation(format!("invalid guess shape: {e}")))?;

    if raw.title.trim().is_empty() {
        return Err(AnalyserError::SchemaViolation("title is empty".into()));
    }

    let media_type = match raw.media_type.as_str() {
        "movie" => MediaType::Movie,
        "tv" => MediaType::Tv,
        other => {
            return Err(AnalyserError::SchemaViolation(format!(
                "unknown media type: {other}"
            )))
        }
    };

    Ok(Guess {
        title: raw.title,
        year: raw.year,
        media_type,
        season: raw.season,
        episode: raw.episode,
    })
}

/// Deterministic supplement for the common case where a filename carries
/// an explicit `SxxEyy` token the analyser didn't surface (§9 open
/// question: permitted, not mandated).
fn extract_season_episode(filename: &str) -> Option<(u32, u32)> {
    static PATTERN: &str = r"(?i)s(\d{1,2})e(\d{1,3})";
    let re = Regex::new(PATTERN).expect("static regex is valid");
    let caps = re.captures(filename)?;
    let season = caps.get(1)?.as_str().parse().ok()?;
    let episode = caps.get(2)?.as_str().parse().ok()?;
    Some((season, episode))
}

/// HTTP-backed analyser client with an LRU cache and exponential-backoff
/// retry, built the way `TmdbProvider` builds its HTTP client: a
/// `reqwest::Client`, typed response structs, status-code branching.
pub struct HttpAnalyserClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    cache: Arc<Mutex<LruCache<String, Guess>>>,
    retry_policy: RetryPolicy,
    enabled: bool,
}

impl HttpAnalyserClient {
    pub fn new(endpoint: String, api_key: Option<String>, cache_capacity: usize, enabled: bool) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).expect("capacity is at least 1");
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds with default TLS backend"),
            endpoint,
            api_key,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            retry_policy: RetryPolicy::default_external_call(),
            enabled,
        }
    }

    fn fallback_guess(filename: &str) -> Guess {
        let stem = std::path::Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename)
            .to_string();
        Guess {
            title: stem,
            year: None,
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        }
    }

    async fn call_remote(&self, filename: &str) -> Result<Guess, AnalyserError> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "filename": filename,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalyserError::Timeout
            } else {
                AnalyserError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AnalyserError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            return Err(AnalyserError::SchemaViolation(format!(
                "unexpected status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalyserError::Network(e.to_string()))?;

        let mut guess = parse_guess(&body)?;
        if guess.media_type == MediaType::Tv && guess.season.is_none() && guess.episode.is_none() {
            if let Some((season, episode)) = extract_season_episode(filename) {
                debug!("supplementing guess with regex-extracted S{season:02}E{episode:02}");
                guess.season = Some(season);
                guess.episode = Some(episode);
            }
        }
        Ok(guess)
    }
}

#[async_trait]
impl AnalyserClient for HttpAnalyserClient {
    async fn analyse(&self, filename: &str) -> Result<Guess, AnalyserError> {
        if !self.enabled {
            return Ok(Self::fallback_guess(filename));
        }

        let key = normalise(filename);
        {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&key) {
                debug!("analyser cache hit for {key}");
                return Ok(cached.clone());
            }
        }

        let guess = retry(&self.retry_policy, AnalyserError::is_retryable, || {
            self.call_remote(filename)
        })
        .await
        .inspect_err(|err| warn!("analyser call for {filename} failed: {err}"))?;

        self.cache.lock().await.put(key, guess.clone());
        Ok(guess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalise_case_folds_and_collapses_whitespace() {
        assert_eq!(normalise("  Some   Movie.MKV "), "some movie.mkv");
    }

    #[test]
    fn extract_json_tolerates_wrapping_noise() {
        let body = "```json\n{\"title\":\"Inception\",\"type\":\"movie\"}\n```";
        let json = extract_first_json_object(body).unwrap();
        assert_eq!(json, "{\"title\":\"Inception\",\"type\":\"movie\"}");
    }

    #[test]
    fn extract_json_handles_nested_braces() {
        let body = "noise {\"a\": {\"b\": 1}} trailing";
        let json = extract_first_json_object(body).unwrap();
        assert_eq!(json, "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn parse_guess_rejects_empty_title() {
        let err = parse_guess("{\"title\":\"\",\"type\":\"movie\"}").unwrap_err();
        assert!(matches!(err, AnalyserError::SchemaViolation(_)));
    }

    #[test]
    fn parse_guess_rejects_unknown_type() {
        let err = parse_guess("{\"title\":\"X\",\"type\":\"short\"}").unwrap_err();
        assert!(matches!(err, AnalyserError::SchemaViolation(_)));
    }

    #[test]
    fn parse_guess_accepts_well_formed_tv_guess() {
        let guess = parse_guess(
            "{\"title\":\"Chernobyl\",\"type\":\"tv\",\"season\":1,\"episode\":2}",
        )
        .unwrap();
        assert_eq!(guess.season, Some(1));
        assert_eq!(guess.episode, Some(2));
    }

    #[test]
    fn season_episode_regex_extracts_common_tokens() {
        assert_eq!(
            extract_season_episode("Chernobyl.S01E02.mkv"),
            Some((1, 2))
        );
        assert_eq!(extract_season_episode("no_markers_here.mkv"), None);
    }

    #[tokio::test]
    async fn disabled_mode_returns_filename_stem_fallback() {
        let client = HttpAnalyserClient::new(
            "http://localhost:0".to_string(),
            None,
            8,
            false,
        );
        let guess = client.analyse("Some.Movie.2020.mkv").await.unwrap();
        assert_eq!(guess.title, "Some.Movie.2020");
        assert_eq!(guess.media_type, MediaType::Movie);
        assert!(guess.year.is_none());
    }
}
