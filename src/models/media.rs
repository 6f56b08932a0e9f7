//! Media-related data models.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::MetadataSource;

/// Media type enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Movie,
    Tv,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Tv => write!(f, "tv"),
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "movie" | "movies" => Ok(MediaType::Movie),
            "tv" | "tvshow" | "tvshows" | "series" => Ok(MediaType::Tv),
            other => Err(RequestError::UnknownMediaType(other.to_string())),
        }
    }
}

/// Reasons a search request is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("year must be positive, got {0}")]
    InvalidYear(i32),

    #[error("unknown media type: {0}")]
    UnknownMediaType(String),
}

/// A metadata search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Search keyword.
    pub query: String,
    /// Movie or TV show.
    #[serde(default)]
    pub media_type: MediaType,
    /// Optional release year filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Preferred response language (e.g. "zh-TW").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Result page, starting at 1.
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            media_type: MediaType::default(),
            year: None,
            language: None,
            page: default_page(),
        }
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Normalize the request in place and reject malformed input.
    ///
    /// The query is trimmed, a zero page becomes 1 and a blank language hint
    /// is dropped.
    pub fn validate(&mut self) -> Result<(), RequestError> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            return Err(RequestError::EmptyQuery);
        }
        if trimmed.len() != self.query.len() {
            self.query = trimmed.to_string();
        }

        if let Some(year) = self.year {
            if year < 1 {
                return Err(RequestError::InvalidYear(year));
            }
        }

        if self.page == 0 {
            self.page = 1;
        }

        if self
            .language
            .as_deref()
            .map(|l| l.trim().is_empty())
            .unwrap_or(false)
        {
            self.language = None;
        }

        Ok(())
    }

    /// Copy of this request searching for a different keyword.
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }
}

/// A single normalized search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataItem {
    /// Provider-scoped identifier.
    pub id: String,
    /// Default display title.
    pub title: String,
    /// Title in the requested language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_title: Option<String>,
    /// Title in the original language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Full release date (YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop_url: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub genres: Vec<String>,
    /// User rating (0-10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f32>,
    /// Match confidence (0.0 - 1.0).
    #[serde(default)]
    pub confidence: f32,
    /// Raw provider payload for debugging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
}

impl MetadataItem {
    /// Best title for display, preferring the localized one.
    pub fn display_title(&self) -> &str {
        self.localized_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.title)
    }
}

/// Results returned by one provider for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub items: Vec<MetadataItem>,
    /// Provider that produced the items.
    pub source: MetadataSource,
    pub total_count: u32,
    pub page: u32,
    pub total_pages: u32,
}

impl SearchResult {
    /// An empty single-page result.
    pub fn empty(source: MetadataSource) -> Self {
        Self {
            items: Vec::new(),
            source,
            total_count: 0,
            page: 1,
            total_pages: 0,
        }
    }

    /// A single-page result holding `items`.
    pub fn from_items(source: MetadataSource, items: Vec<MetadataItem>) -> Self {
        let total_count = items.len() as u32;
        Self {
            items,
            source,
            total_count,
            page: 1,
            total_pages: u32::from(total_count > 0),
        }
    }

    pub fn has_results(&self) -> bool {
        !self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_trims_and_defaults_page() {
        let mut request = SearchRequest::new("  The Matrix ").with_page(0);
        request.validate().unwrap();
        assert_eq!(request.query, "The Matrix");
        assert_eq!(request.page, 1);
        assert_eq!(request.media_type, MediaType::Movie);
    }

    #[test]
    fn test_validate_rejects_empty_query() {
        let mut request = SearchRequest::new("   ");
        assert_eq!(request.validate(), Err(RequestError::EmptyQuery));
    }

    #[test]
    fn test_validate_rejects_non_positive_year() {
        let mut request = SearchRequest::new("Avatar").with_year(0);
        assert_eq!(request.validate(), Err(RequestError::InvalidYear(0)));
    }

    #[test]
    fn test_validate_drops_blank_language() {
        let mut request = SearchRequest::new("Avatar").with_language(" ");
        request.validate().unwrap();
        assert!(request.language.is_none());
    }

    #[test]
    fn test_media_type_parse() {
        assert_eq!("".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert_eq!("TV".parse::<MediaType>().unwrap(), MediaType::Tv);
        assert!("anime".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_has_results() {
        assert!(!SearchResult::empty(MetadataSource::Tmdb).has_results());

        let item = MetadataItem {
            id: "603".to_string(),
            title: "The Matrix".to_string(),
            ..Default::default()
        };
        let result = SearchResult::from_items(MetadataSource::Tmdb, vec![item]);
        assert!(result.has_results());
        assert_eq!(result.total_count, 1);
        assert_eq!(result.total_pages, 1);
    }

    #[test]
    fn test_display_title_prefers_localized() {
        let item = MetadataItem {
            title: "The Matrix".to_string(),
            localized_title: Some("駭客任務".to_string()),
            ..Default::default()
        };
        assert_eq!(item.display_title(), "駭客任務");
    }
}
