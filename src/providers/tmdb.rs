//! TMDb metadata provider.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{
    validate_request, ErrorCode, MetadataProvider, MetadataSource, ProviderError, ProviderStatus,
};
use crate::models::media::{MediaType, MetadataItem, SearchRequest, SearchResult};
use crate::services::tmdb::{self, MovieSearchItem, SearchPage, TmdbClient, TvSearchItem};
use crate::utils::chinese;
use crate::Error;

const PROVIDER_NAME: &str = "TMDb";
const POSTER_SIZE: &str = "w500";
const BACKDROP_SIZE: &str = "w1280";

/// How long the provider reports itself rate limited after a 429.
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(10);

/// [`MetadataProvider`] backed by the TMDb search API.
pub struct TmdbProvider {
    client: TmdbClient,
    enabled: AtomicBool,
    rate_limited_until: Mutex<Option<Instant>>,
}

impl TmdbProvider {
    pub fn new(client: TmdbClient) -> Self {
        Self {
            client,
            enabled: AtomicBool::new(true),
            rate_limited_until: Mutex::new(None),
        }
    }

    /// Enable or disable the provider at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn is_rate_limited(&self) -> bool {
        let mut until = self
            .rate_limited_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *until {
            Some(deadline) if Instant::now() < deadline => true,
            Some(_) => {
                *until = None;
                false
            }
            None => false,
        }
    }

    fn mark_rate_limited(&self) {
        tracing::warn!(
            "TMDb rate limit hit, pausing for {}s",
            RATE_LIMIT_COOLDOWN.as_secs()
        );
        let mut until = self
            .rate_limited_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *until = Some(Instant::now() + RATE_LIMIT_COOLDOWN);
    }

    /// Classify a client error.
    fn map_error(&self, err: Error) -> ProviderError {
        let code = match &err {
            Error::Http(e) if e.is_timeout() => ErrorCode::Timeout,
            Error::Http(e) if e.is_connect() => ErrorCode::Unavailable,
            Error::Http(e) => match e.status() {
                Some(reqwest::StatusCode::TOO_MANY_REQUESTS) => {
                    self.mark_rate_limited();
                    ErrorCode::RateLimited
                }
                Some(reqwest::StatusCode::UNAUTHORIZED) => ErrorCode::Unavailable,
                Some(status) if status.is_server_error() => ErrorCode::Unavailable,
                _ => ErrorCode::ApiError,
            },
            _ => ErrorCode::ApiError,
        };

        ProviderError::new(PROVIDER_NAME, MetadataSource::Tmdb, code, err.to_string())
            .with_cause(err)
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn source(&self) -> MetadataSource {
        MetadataSource::Tmdb
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResult, ProviderError> {
        let request = validate_request(self, request)?;

        if !self.is_enabled() {
            return Err(ProviderError::unavailable(PROVIDER_NAME, MetadataSource::Tmdb));
        }
        if self.is_rate_limited() {
            return Err(ProviderError::new(
                PROVIDER_NAME,
                MetadataSource::Tmdb,
                ErrorCode::RateLimited,
                "rate limit cool-down in progress",
            ));
        }

        tracing::debug!(
            "TMDb search: '{}' ({}, year {:?}, page {})",
            request.query,
            request.media_type,
            request.year,
            request.page
        );

        let language = request.language.as_deref();
        match request.media_type {
            MediaType::Movie => {
                let page = self
                    .client
                    .search_movie(&request.query, request.year, language, request.page)
                    .await
                    .map_err(|e| self.map_error(e))?;
                Ok(to_result(page, |item| movie_item(item, &request)))
            }
            MediaType::Tv => {
                let page = self
                    .client
                    .search_tv(&request.query, request.year, language, request.page)
                    .await
                    .map_err(|e| self.map_error(e))?;
                Ok(to_result(page, |item| tv_item(item, &request)))
            }
        }
    }

    fn is_available(&self) -> bool {
        self.is_enabled() && !self.is_rate_limited()
    }

    fn status(&self) -> ProviderStatus {
        if !self.is_enabled() {
            ProviderStatus::Unavailable
        } else if self.is_rate_limited() {
            ProviderStatus::RateLimited
        } else {
            ProviderStatus::Available
        }
    }
}

fn to_result<T, F>(page: SearchPage<T>, convert: F) -> SearchResult
where
    F: Fn(&T) -> MetadataItem,
{
    SearchResult {
        items: page.results.iter().map(convert).collect(),
        source: MetadataSource::Tmdb,
        total_count: page.total_results,
        page: page.page,
        total_pages: page.total_pages,
    }
}

fn movie_item(item: &MovieSearchItem, request: &SearchRequest) -> MetadataItem {
    let year = year_from_date(item.release_date.as_deref());
    MetadataItem {
        id: item.id.to_string(),
        title: item.title.clone(),
        localized_title: None,
        original_title: Some(item.original_title.clone()).filter(|t| *t != item.title),
        year,
        release_date: item.release_date.clone().filter(|d| !d.is_empty()),
        overview: item.overview.clone().filter(|o| !o.trim().is_empty()),
        localized_overview: None,
        poster_url: item.poster_path.as_deref().map(|p| tmdb::image_url(p, POSTER_SIZE)),
        backdrop_url: item.backdrop_path.as_deref().map(|p| tmdb::image_url(p, BACKDROP_SIZE)),
        media_type: MediaType::Movie,
        genres: genre_names(&item.genre_ids),
        rating: item.vote_average,
        vote_count: item.vote_count,
        popularity: item.popularity,
        confidence: confidence(request, &item.title, &item.original_title, year),
        raw_data: serde_json::to_value(item).ok(),
    }
}

fn tv_item(item: &TvSearchItem, request: &SearchRequest) -> MetadataItem {
    let year = year_from_date(item.first_air_date.as_deref());
    MetadataItem {
        id: item.id.to_string(),
        title: item.name.clone(),
        localized_title: None,
        original_title: Some(item.original_name.clone()).filter(|t| *t != item.name),
        year,
        release_date: item.first_air_date.clone().filter(|d| !d.is_empty()),
        overview: item.overview.clone().filter(|o| !o.trim().is_empty()),
        localized_overview: None,
        poster_url: item.poster_path.as_deref().map(|p| tmdb::image_url(p, POSTER_SIZE)),
        backdrop_url: item.backdrop_path.as_deref().map(|p| tmdb::image_url(p, BACKDROP_SIZE)),
        media_type: MediaType::Tv,
        genres: genre_names(&item.genre_ids),
        rating: item.vote_average,
        vote_count: item.vote_count,
        popularity: item.popularity,
        confidence: confidence(request, &item.name, &item.original_name, year),
        raw_data: serde_json::to_value(item).ok(),
    }
}

fn genre_names(ids: &[u32]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| tmdb::genre_name(*id))
        .map(str::to_string)
        .collect()
}

/// Year of a TMDb date string ("YYYY-MM-DD").
fn year_from_date(date: Option<&str>) -> Option<i32> {
    let date = date?.trim();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.year())
}

/// How well a hit matches the request.
///
/// Exact title matches score 1.0, anything else 0.6; a year that disagrees
/// with the requested one costs 0.3.
fn confidence(request: &SearchRequest, title: &str, original_title: &str, year: Option<i32>) -> f32 {
    let mut score: f32 = if chinese::titles_equivalent(&request.query, title)
        || chinese::titles_equivalent(&request.query, original_title)
    {
        1.0
    } else {
        0.6
    };

    if let (Some(wanted), Some(actual)) = (request.year, year) {
        if wanted != actual {
            score -= 0.3;
        }
    }

    score.clamp(0.0, 1.0)
}
