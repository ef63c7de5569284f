//! API client for the TMDB metadata service.
//!
//! This module wraps the TMDB v3 REST endpoints the application browses:
//! trending and popular lists, title and season details, people, search and
//! recommendations. Results are not cached here.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::{Genre, MediaType, PersonDetails, SeasonDetails, Title, TitleDetails};
use log::{debug, info, warn};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;

/// Maximum number of retry attempts for failed requests.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds (doubles each retry).
const BASE_RETRY_DELAY_MS: u64 = 500;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Extra records appended to title detail responses.
const DETAIL_APPENDS: &str = "credits,videos,images";

/// Window for trending lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Day,
    Week,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            other => Err(AppError::InvalidInput(format!(
                "unknown window '{}', expected day or week",
                other
            ))),
        }
    }
}

/// Which titles a trending list covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingScope {
    All,
    Only(MediaType),
}

impl TrendingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendingScope::All => "all",
            TrendingScope::Only(media_type) => media_type.as_str(),
        }
    }
}

/// Check if an error is retryable (network errors, timeouts, server errors).
fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.is_request()
        || error.status().map(|s| s.is_server_error()).unwrap_or(false)
}

/// Retry an async operation with exponential backoff.
///
/// Retries the operation up to `MAX_RETRIES` times on retryable errors,
/// with exponential backoff starting at `BASE_RETRY_DELAY_MS`.
async fn retry_with_backoff<T, F, Fut>(operation_name: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, reqwest::Error>>,
{
    let mut last_error = None;

    for attempt in 0..=MAX_RETRIES {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        "{} succeeded after {} attempts",
                        operation_name,
                        attempt + 1
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt < MAX_RETRIES && is_retryable_error(&e) {
                    let delay = Duration::from_millis(BASE_RETRY_DELAY_MS * 2_u64.pow(attempt));
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempt + 1,
                        MAX_RETRIES + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    last_error = Some(e);
                } else {
                    return Err(AppError::Network(format!("{} failed: {}", operation_name, e)));
                }
            }
        }
    }

    Err(AppError::Network(format!(
        "{} failed after {} attempts: {}",
        operation_name,
        MAX_RETRIES + 1,
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string())
    )))
}

/// Map a non-success status to an error.
fn check_status(status: StatusCode, path: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    Err(match status {
        StatusCode::UNAUTHORIZED => {
            AppError::Config("TMDB rejected the API key".to_string())
        }
        StatusCode::NOT_FOUND => AppError::NotFound(format!("TMDB resource {}", path)),
        StatusCode::TOO_MANY_REQUESTS => {
            AppError::Network("TMDB rate limit exceeded, try again later".to_string())
        }
        other => AppError::Network(format!("TMDB {} returned {}", path, other)),
    })
}

// List endpoints wrap items in `results`; some omit it entirely when empty.
#[derive(Debug, Deserialize)]
struct Paged<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GenreList {
    #[serde(default)]
    genres: Vec<Genre>,
}

/// Client for the TMDB REST API.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    image_base_url: String,
    api_key: String,
}

impl TmdbClient {
    /// Build a client from configuration.
    ///
    /// Fails if no API key is configured (see [`Config::resolve_api_key`]).
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            AppError::Config(format!(
                "no TMDB API key; set api_key in the config file or {}",
                crate::config::API_KEY_ENV
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            image_base_url: config.image_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Full image address for a relative TMDB path, or `None` if there is no path.
    ///
    /// Common sizes: "w185", "w300", "w500", "original".
    pub fn image_url(&self, path: Option<&str>, size: &str) -> Option<String> {
        image_url(&self.image_base_url, path, size)
    }

    /// Trending titles.
    pub async fn trending(&self, scope: TrendingScope, window: TimeWindow) -> Result<Vec<Title>> {
        let path = format!("/trending/{}/{}", scope.as_str(), window.as_str());
        self.get_list(&path, &[]).await
    }

    /// Full movie record with credits, videos and logos.
    pub async fn movie_details(&self, id: u64) -> Result<TitleDetails> {
        self.get(
            &format!("/movie/{}", id),
            &[("append_to_response", DETAIL_APPENDS)],
        )
        .await
    }

    /// Full show record with credits, videos, logos and its season list.
    pub async fn tv_details(&self, id: u64) -> Result<TitleDetails> {
        self.get(
            &format!("/tv/{}", id),
            &[("append_to_response", DETAIL_APPENDS)],
        )
        .await
    }

    /// Episodes of one season of a show.
    pub async fn season_details(&self, show_id: u64, season_number: u32) -> Result<SeasonDetails> {
        self.get(&format!("/tv/{}/season/{}", show_id, season_number), &[])
            .await
    }

    /// A person with their combined movie and TV credits.
    pub async fn person_details(&self, id: u64) -> Result<PersonDetails> {
        self.get(
            &format!("/person/{}", id),
            &[("append_to_response", "combined_credits")],
        )
        .await
    }

    /// Search movies, shows and people at once.
    pub async fn search_multi(&self, query: &str) -> Result<Vec<Title>> {
        debug!("Searching for '{}'", query);
        self.get_list("/search/multi", &[("query", query)]).await
    }

    pub async fn popular(&self, media_type: MediaType) -> Result<Vec<Title>> {
        self.get_list(&format!("/{}/popular", media_type), &[]).await
    }

    /// Titles in a genre.
    pub async fn by_genre(&self, genre_id: u64, media_type: MediaType) -> Result<Vec<Title>> {
        let genre = genre_id.to_string();
        self.get_list(
            &discover_path(media_type),
            &[("with_genres", genre.as_str())],
        )
        .await
    }

    pub async fn genres(&self, media_type: MediaType) -> Result<Vec<Genre>> {
        let list: GenreList = self.get(&genre_list_path(media_type), &[]).await?;
        Ok(list.genres)
    }

    pub async fn recommendations(&self, id: u64, media_type: MediaType) -> Result<Vec<Title>> {
        self.get_list(&related_path(media_type, id, "recommendations"), &[])
            .await
    }

    pub async fn similar(&self, id: u64, media_type: MediaType) -> Result<Vec<Title>> {
        self.get_list(&related_path(media_type, id, "similar"), &[])
            .await
    }

    /// Address of an endpoint, with the API key and extra parameters.
    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| AppError::Config(format!("bad TMDB address for {}: {}", path, e)))?;
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .extend_pairs(params);
        Ok(url)
    }

    async fn get_list(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<Title>> {
        let page: Paged<Title> = self.get(path, params).await?;
        debug!("{} returned {} results", path, page.results.len());
        Ok(page.results)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = self.endpoint(path, params)?;

        let resp = retry_with_backoff(&format!("GET {}", path), || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                // Only 5xx becomes an error here so it can be retried; 4xx is mapped below.
                client.get(url).send().await.and_then(|resp| {
                    if resp.status().is_server_error() {
                        resp.error_for_status()
                    } else {
                        Ok(resp)
                    }
                })
            }
        })
        .await?;
        check_status(resp.status(), path)?;

        resp.json::<T>()
            .await
            .map_err(|e| AppError::Parse(format!("Failed to parse TMDB response from {}: {}", path, e)))
    }
}

fn discover_path(media_type: MediaType) -> String {
    format!("/discover/{}", media_type)
}

fn genre_list_path(media_type: MediaType) -> String {
    format!("/genre/{}/list", media_type)
}

/// Titles listed against another title, e.g. `similar` or `recommendations`.
fn related_path(media_type: MediaType, id: u64, relation: &str) -> String {
    format!("/{}/{}/{}", media_type, id, relation)
}

/// Full image address for a relative TMDB path.
///
/// # Examples
///
/// ```
/// use cineflow::api::image_url;
///
/// assert_eq!(
///     image_url("https://image.tmdb.org/t/p", Some("/p.jpg"), "w500").as_deref(),
///     Some("https://image.tmdb.org/t/p/w500/p.jpg")
/// );
/// assert_eq!(image_url("https://image.tmdb.org/t/p", None, "w500"), None);
/// ```
pub fn image_url(base: &str, path: Option<&str>, size: &str) -> Option<String> {
    let path = path.filter(|p| !p.is_empty())?;
    Some(format!("{}/{}{}", base.trim_end_matches('/'), size, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TmdbClient {
        let config = Config {
            api_key: Some("test-key".to_string()),
            ..Config::new()
        };
        TmdbClient::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_includes_key_and_params() {
        let url = client()
            .endpoint("/search/multi", &[("query", "fight club")])
            .unwrap();
        assert_eq!(url.path(), "/3/search/multi");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("api_key".to_string(), "test-key".to_string()),
                ("query".to_string(), "fight club".to_string()),
            ]
        );
    }

    #[test]
    fn test_endpoint_encodes_query() {
        let url = client()
            .endpoint("/search/multi", &[("query", "amélie & co")])
            .unwrap();
        assert!(url.as_str().contains("query=am%C3%A9lie+%26+co"));
    }

    #[test]
    fn test_scope_and_window_names() {
        assert_eq!(TrendingScope::All.as_str(), "all");
        assert_eq!(TrendingScope::Only(MediaType::Tv).as_str(), "tv");
        assert_eq!(TimeWindow::Week.as_str(), "week");
    }

    #[test]
    fn test_window_parse() {
        assert_eq!("day".parse::<TimeWindow>().unwrap(), TimeWindow::Day);
        assert_eq!("week".parse::<TimeWindow>().unwrap(), TimeWindow::Week);
        assert!(matches!(
            "month".parse::<TimeWindow>(),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_genre_and_related_paths() {
        assert_eq!(genre_list_path(MediaType::Movie), "/genre/movie/list");
        assert_eq!(discover_path(MediaType::Tv), "/discover/tv");
        assert_eq!(related_path(MediaType::Movie, 550, "similar"), "/movie/550/similar");
        assert_eq!(
            related_path(MediaType::Tv, 1399, "recommendations"),
            "/tv/1399/recommendations"
        );

        let url = client()
            .endpoint(&discover_path(MediaType::Movie), &[("with_genres", "18")])
            .unwrap();
        assert_eq!(url.path(), "/3/discover/movie");
        assert!(url.query_pairs().any(|(k, v)| k == "with_genres" && v == "18"));
    }

    #[test]
    fn test_genre_list_tolerates_missing_genres() {
        let list: GenreList = serde_json::from_str("{}").unwrap();
        assert!(list.genres.is_empty());

        let list: GenreList =
            serde_json::from_str(r#"{"genres": [{"id": 18, "name": "Drama"}]}"#).unwrap();
        assert_eq!(list.genres[0].name, "Drama");
    }

    #[test]
    fn test_check_status_mapping() {
        assert!(check_status(StatusCode::OK, "/movie/1").is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, "/movie/1"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, "/movie/1"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, "/movie/1"),
            Err(AppError::Network(_))
        ));
    }

    #[test]
    fn test_paged_tolerates_missing_results() {
        let page: Paged<Title> = serde_json::from_str(r#"{"page": 1}"#).unwrap();
        assert!(page.results.is_empty());

        let page: Paged<Title> = serde_json::from_str(
            r#"{"page": 1, "results": [{"id": 550, "title": "Fight Club", "media_type": "movie"}]}"#,
        )
        .unwrap();
        assert_eq!(page.results[0].display_title(), "Fight Club");
    }

    #[test]
    fn test_client_requires_api_key() {
        if std::env::var(crate::config::API_KEY_ENV).is_ok() {
            return;
        }
        let err = TmdbClient::new(&Config::new()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_image_url_skips_empty_path() {
        assert_eq!(client().image_url(Some(""), "w500"), None);
        assert_eq!(
            client().image_url(Some("/x.png"), "original").as_deref(),
            Some("https://image.tmdb.org/t/p/original/x.png")
        );
    }
}
