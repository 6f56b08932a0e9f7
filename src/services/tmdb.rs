//! TMDB API client.

use crate::Result;
use serde::Deserialize;
use std::time::Duration;

const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// TMDB client configuration.
#[derive(Debug, Clone)]
pub struct TmdbConfig {
    /// API key or Bearer token (JWT)
    pub api_key: String,
    pub language: String,
    /// Whether to use Bearer token authentication (API v4 style)
    pub use_bearer: bool,
    pub timeout: Duration,
}

impl TmdbConfig {
    pub fn new(api_key: impl Into<String>, language: impl Into<String>) -> Self {
        let api_key = api_key.into();
        // Bearer tokens start with "eyJ" (base64 encoded JWT header)
        let use_bearer = api_key.starts_with("eyJ");

        Self {
            api_key,
            language: language.into(),
            use_bearer,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// TMDB API client.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    config: TmdbConfig,
    client: reqwest::Client,
}

/// A page of search results.
#[derive(Debug, Deserialize)]
pub struct SearchPage<T> {
    pub page: u32,
    pub results: Vec<T>,
    #[serde(default)]
    pub total_results: u32,
    #[serde(default)]
    pub total_pages: u32,
}

/// Movie search item.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct MovieSearchItem {
    pub id: u64,
    pub title: String,
    pub original_title: String,
    #[serde(default)]
    pub original_language: Option<String>,
    pub release_date: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    pub vote_count: Option<u32>,
    pub vote_average: Option<f32>,
    pub popularity: Option<f32>,
}

/// TV show search item.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TvSearchItem {
    pub id: u64,
    pub name: String,
    pub original_name: String,
    #[serde(default)]
    pub original_language: Option<String>,
    pub first_air_date: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    pub vote_count: Option<u32>,
    pub vote_average: Option<f32>,
    pub popularity: Option<f32>,
}

impl TmdbClient {
    /// Create a new TMDB client.
    pub fn new(config: TmdbConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build TMDB HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });
        Self { config, client }
    }

    /// Build a request with proper authentication.
    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        if self.config.use_bearer {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        } else {
            request
        }
    }

    /// Build URL with optional api_key parameter (only for v3 style).
    fn build_url(&self, path: &str, language: &str, extra_params: &str) -> String {
        if self.config.use_bearer {
            format!(
                "{}/{}?language={}{}",
                TMDB_BASE_URL,
                path,
                urlencoding::encode(language),
                extra_params
            )
        } else {
            format!(
                "{}/{}?api_key={}&language={}{}",
                TMDB_BASE_URL,
                path,
                self.config.api_key,
                urlencoding::encode(language),
                extra_params
            )
        }
    }

    /// Verify API key is valid.
    pub async fn verify_api_key(&self) -> Result<bool> {
        let url = if self.config.use_bearer {
            format!("{}/authentication", TMDB_BASE_URL)
        } else {
            format!(
                "{}/authentication?api_key={}",
                TMDB_BASE_URL, self.config.api_key
            )
        };

        let resp = self.build_request(&url).send().await?;
        Ok(resp.status().is_success())
    }

    /// Search for movies.
    pub async fn search_movie(
        &self,
        query: &str,
        year: Option<i32>,
        language: Option<&str>,
        page: u32,
    ) -> Result<SearchPage<MovieSearchItem>> {
        let year_param = year.map(|y| format!("&year={}", y)).unwrap_or_default();
        let url = self.build_url(
            "search/movie",
            language.unwrap_or(self.config.language.as_str()),
            &format!("&query={}&page={}{}", urlencoding::encode(query), page, year_param),
        );

        let resp = self
            .build_request(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    /// Search for TV shows.
    pub async fn search_tv(
        &self,
        query: &str,
        year: Option<i32>,
        language: Option<&str>,
        page: u32,
    ) -> Result<SearchPage<TvSearchItem>> {
        let year_param = year
            .map(|y| format!("&first_air_date_year={}", y))
            .unwrap_or_default();
        let url = self.build_url(
            "search/tv",
            language.unwrap_or(self.config.language.as_str()),
            &format!("&query={}&page={}{}", urlencoding::encode(query), page, year_param),
        );

        let resp = self
            .build_request(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }
}

/// Full image URL for a TMDB image path.
pub fn image_url(path: &str, size: &str) -> String {
    format!("{}/{}{}", TMDB_IMAGE_BASE_URL, size, path)
}

/// English name of a TMDB genre id (movie and TV lists combined).
pub fn genre_name(id: u32) -> Option<&'static str> {
    let name = match id {
        28 => "Action",
        12 => "Adventure",
        16 => "Animation",
        35 => "Comedy",
        80 => "Crime",
        99 => "Documentary",
        18 => "Drama",
        10751 => "Family",
        14 => "Fantasy",
        36 => "History",
        27 => "Horror",
        10402 => "Music",
        9648 => "Mystery",
        10749 => "Romance",
        878 => "Science Fiction",
        10770 => "TV Movie",
        53 => "Thriller",
        10752 => "War",
        37 => "Western",
        10759 => "Action & Adventure",
        10762 => "Kids",
        10763 => "News",
        10764 => "Reality",
        10765 => "Sci-Fi & Fantasy",
        10766 => "Soap",
        10767 => "Talk",
        10768 => "War & Politics",
        _ => return None,
    };
    Some(name)
}
