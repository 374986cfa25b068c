use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::blocking::Client as BlockingClient;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::CatalogueError;
use crate::model::{CatalogueMatch, Guess, MediaType};
use crate::retry::{retry, RetryPolicy};

/// Outcome of a catalogue search (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Match(CatalogueMatch),
    NoMatch,
}

/// Wraps the remote movie/TV database.
#[async_trait]
pub trait CatalogueClient: Send + Sync {
    async fn search(&self, guess: &Guess) -> Result<SearchOutcome, CatalogueError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: i64,
    #[serde(alias = "name")]
    title: String,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
}

impl SearchResult {
    fn year(&self) -> Option<u16> {
        self.release_date
            .as_ref()
            .and_then(|d| d.split('-').next())
            .and_then(|y| y.parse().ok())
    }
}

/// TMDB-style catalogue client. The underlying HTTP library is the
/// synchronous `reqwest::blocking::Client` per spec §4.4; every search
/// call is dispatched through `spawn_blocking` so it never runs inline on
/// a cooperative-scheduler task. A `Semaphore` bounds process-wide
/// in-flight calls to the configured concurrency.
pub struct TmdbCatalogueClient {
    client: Arc<BlockingClient>,
    api_key: String,
    language: String,
    semaphore: Arc<Semaphore>,
    retry_policy: RetryPolicy,
    enabled: bool,
}

impl TmdbCatalogueClient {
    pub fn new(api_key: String, language: String, concurrency: usize, enabled: bool) -> Self {
        Self {
            client: Arc::new(
                BlockingClient::builder()
                    .timeout(Duration::from_secs(15))
                    .build()
                    .expect("reqwest blocking client builds with default TLS backend"),
            ),
            api_key,
            language,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            retry_policy: RetryPolicy::default_external_call(),
            enabled,
        }
    }

    fn search_blocking(
        client: &BlockingClient,
        api_key: &str,
        language: &str,
        media_type: MediaType,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<SearchResult>, CatalogueError> {
        let endpoint = match media_type {
            MediaType::Movie => "https://api.themoviedb.org/3/search/movie",
            MediaType::Tv => "https://api.themoviedb.org/3/search/tv",
        };

        let mut request = client
            .get(endpoint)
            .query(&[("api_key", api_key), ("language", language), ("query", title)]);
        if let Some(year) = year {
            let year_field = match media_type {
                MediaType::Movie => "year",
                MediaType::Tv => "first_air_date_year",
            };
            request = request.query(&[(year_field, year.to_string())]);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                CatalogueError::Timeout
            } else {
                CatalogueError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CatalogueError::RateLimited);
        }
        if status.is_server_error() {
            return Err(CatalogueError::ServerError(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(CatalogueError::ClientError(status.as_u16()));
        }

        let body: SearchResponse = response
            .json()
            .map_err(|e| CatalogueError::Network(e.to_string()))?;
        Ok(body.results)
    }

    async fn search_type(&self, guess: &Guess, media_type: MediaType) -> Result<Vec<SearchResult>, CatalogueError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let language = self.language.clone();
        let title = guess.title.clone();
        let year = guess.year;

        let result = retry(&self.retry_policy, CatalogueError::is_retryable, || {
            let client = client.clone();
            let api_key = api_key.clone();
            let language = language.clone();
            let title = title.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    Self::search_blocking(&client, &api_key, &language, media_type, &title, year)
                })
                .await
                .map_err(|e| CatalogueError::Network(format!("search task panicked: {e}")))?
            }
        })
        .await;

        drop(permit);
        result
    }
}

#[async_trait]
impl CatalogueClient for TmdbCatalogueClient {
    async fn search(&self, guess: &Guess) -> Result<SearchOutcome, CatalogueError> {
        if !self.enabled {
            return Ok(SearchOutcome::NoMatch);
        }

        let mut results = self.search_type(guess, guess.media_type).await?;
        let mut matched_type = guess.media_type;

        if results.is_empty() {
            debug!("no results for {:?}, retrying with opposite type", guess.media_type);
            matched_type = guess.media_type.opposite();
            results = self.search_type(guess, matched_type).await?;
        }

        let Some(top) = results.into_iter().next() else {
            warn!("catalogue returned no results for either type: {}", guess.title);
            return Ok(SearchOutcome::NoMatch);
        };

        let (season, episode) = match matched_type {
            MediaType::Tv => (guess.season, guess.episode),
            MediaType::Movie => (None, None),
        };

        Ok(SearchOutcome::Match(CatalogueMatch {
            tmdb_id: top.id,
            year: top.year(),
            title: top.title,
            media_type: matched_type,
            season,
            episode,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_year_is_parsed_from_iso_date() {
        let result = SearchResult {
            id: 1,
            title: "Inception".to_string(),
            release_date: Some("2010-07-16".to_string()),
        };
        assert_eq!(result.year(), Some(2010));
    }

    #[test]
    fn missing_release_date_yields_no_year() {
        let result = SearchResult {
            id: 1,
            title: "Unknown".to_string(),
            release_date: None,
        };
        assert_eq!(result.year(), None);
    }

    #[tokio::test]
    async fn disabled_mode_always_yields_no_match() {
        let client = TmdbCatalogueClient::new("key".to_string(), "en-US".to_string(), 2, false);
        let guess = Guess {
            title: "Anything".to_string(),
            year: None,
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        };
        let outcome = client.search(&guess).await.unwrap();
        assert_eq!(outcome, SearchOutcome::NoMatch);
    }
}
