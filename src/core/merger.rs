//! Partial-result merging.
//!
//! Combines raw results from several sources into one record. Scalar fields
//! are first-come-first-served in input order; list fields are unioned.
//! Required fields nobody supplied get a fixed placeholder and lower the
//! degradation level.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::models::media::MetadataItem;
use crate::providers::MetadataSource;

/// Placeholder shown when no source has a title.
pub const PLACEHOLDER_TITLE: &str = "未知標題";
/// Placeholder year when no source has one.
pub const PLACEHOLDER_YEAR: i32 = 0;
/// Placeholder shown when no source has an overview.
pub const PLACEHOLDER_OVERVIEW: &str = "暫無簡介";
/// Poster path used when no source has a poster.
pub const PLACEHOLDER_POSTER_URL: &str = "/images/placeholder-poster.png";

/// Default share of missing required fields above which a result is minimal.
pub const DEFAULT_MINIMAL_MISSING_RATIO: f64 = 0.5;

/// Fields a complete result must have.
///
/// Serialized names match the field names of [`MergedMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Title,
    Year,
    Overview,
    PosterUrl,
}

impl RequiredField {
    pub const ALL: [RequiredField; 4] = [
        RequiredField::Title,
        RequiredField::Year,
        RequiredField::Overview,
        RequiredField::PosterUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::Title => "title",
            RequiredField::Year => "year",
            RequiredField::Overview => "overview",
            RequiredField::PosterUrl => "poster_url",
        }
    }

    /// Display name used in the degradation message.
    pub fn label(&self) -> &'static str {
        match self {
            RequiredField::Title => "標題",
            RequiredField::Year => "年份",
            RequiredField::Overview => "簡介",
            RequiredField::PosterUrl => "海報",
        }
    }
}

impl std::fmt::Display for RequiredField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw result from one source, any field possibly absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
}

impl MetadataResult {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Merger input from a provider's search hit.
    pub fn from_item(source: MetadataSource, item: &MetadataItem) -> Self {
        let title = Some(item.display_title().to_string());
        let overview = item
            .localized_overview
            .clone()
            .or_else(|| item.overview.clone());

        Self {
            source: source.as_str().to_string(),
            title,
            year: item.year,
            overview,
            poster_url: item.poster_url.clone(),
            genres: item.genres.clone(),
            cast: Vec::new(),
        }
    }
}

/// How much required metadata is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    /// Every required field came from a source.
    Normal,
    /// Up to the configured share of required fields is missing.
    Partial,
    /// More than the configured share is missing.
    Minimal,
}

/// Field-by-field merge output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedMetadata {
    pub title: String,
    pub year: i32,
    pub overview: String,
    pub poster_url: String,
    pub genres: Vec<String>,
    pub cast: Vec<String>,
    /// Required fields holding a placeholder value.
    pub placeholder_fields: Vec<RequiredField>,
    /// Which source supplied each filled required field.
    pub field_sources: BTreeMap<RequiredField, String>,
}

/// Merged metadata plus degradation details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedResult {
    pub metadata: MergedMetadata,
    pub degradation_level: DegradationLevel,
    pub missing_fields: Vec<RequiredField>,
    /// Sources consulted, in input order.
    pub fallback_used: Vec<String>,
    /// Localized summary of unavailable fields; empty when nothing is missing.
    pub message: String,
}

impl DegradedResult {
    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }
}

/// Merger configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergerConfig {
    /// A result missing more than this share of required fields is minimal.
    pub minimal_missing_ratio: f64,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            minimal_missing_ratio: DEFAULT_MINIMAL_MISSING_RATIO,
        }
    }
}

/// Partial-result merger.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    config: MergerConfig,
}

impl Merger {
    pub fn new(config: MergerConfig) -> Self {
        Self { config }
    }

    /// Merge raw results in priority order.
    pub fn merge(&self, results: &[MetadataResult]) -> DegradedResult {
        let mut title: Option<String> = None;
        let mut year: Option<i32> = None;
        let mut overview: Option<String> = None;
        let mut poster_url: Option<String> = None;
        let mut field_sources = BTreeMap::new();

        let mut genres = UniqueList::default();
        let mut cast = UniqueList::default();
        let mut fallback_used = Vec::with_capacity(results.len());

        for result in results {
            fallback_used.push(result.source.clone());

            fill_text(&mut title, &result.title, RequiredField::Title, result, &mut field_sources);
            fill_text(&mut overview, &result.overview, RequiredField::Overview, result, &mut field_sources);
            fill_text(&mut poster_url, &result.poster_url, RequiredField::PosterUrl, result, &mut field_sources);

            if year.is_none() {
                if let Some(y) = result.year.filter(|y| *y > 0) {
                    year = Some(y);
                    field_sources.insert(RequiredField::Year, result.source.clone());
                }
            }

            genres.extend(&result.genres);
            cast.extend(&result.cast);
        }

        let missing_fields: Vec<RequiredField> = RequiredField::ALL
            .into_iter()
            .filter(|field| !field_sources.contains_key(field))
            .collect();

        let metadata = MergedMetadata {
            title: title.unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            year: year.unwrap_or(PLACEHOLDER_YEAR),
            overview: overview.unwrap_or_else(|| PLACEHOLDER_OVERVIEW.to_string()),
            poster_url: poster_url.unwrap_or_else(|| PLACEHOLDER_POSTER_URL.to_string()),
            genres: genres.into_vec(),
            cast: cast.into_vec(),
            placeholder_fields: missing_fields.clone(),
            field_sources,
        };

        let degradation_level = self.degradation_level(missing_fields.len());
        let message = missing_message(&missing_fields);

        if !missing_fields.is_empty() {
            tracing::debug!(
                level = ?degradation_level,
                "Merged {} sources with placeholders for: {:?}",
                results.len(),
                missing_fields
            );
        }

        DegradedResult {
            metadata,
            degradation_level,
            missing_fields,
            fallback_used,
            message,
        }
    }

    fn degradation_level(&self, missing: usize) -> DegradationLevel {
        let required = RequiredField::ALL.len() as f64;
        if missing == 0 {
            DegradationLevel::Normal
        } else if missing as f64 > required * self.config.minimal_missing_ratio {
            DegradationLevel::Minimal
        } else {
            DegradationLevel::Partial
        }
    }
}

/// Merge with the default configuration.
pub fn merge_partial_results(results: &[MetadataResult]) -> DegradedResult {
    Merger::default().merge(results)
}

fn fill_text(
    slot: &mut Option<String>,
    candidate: &Option<String>,
    field: RequiredField,
    result: &MetadataResult,
    field_sources: &mut BTreeMap<RequiredField, String>,
) {
    if slot.is_some() {
        return;
    }
    if let Some(value) = candidate.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *slot = Some(value.to_string());
        field_sources.insert(field, result.source.clone());
    }
}

fn missing_message(missing: &[RequiredField]) -> String {
    if missing.is_empty() {
        return String::new();
    }

    let labels: Vec<&str> = missing.iter().map(RequiredField::label).collect();
    format!("部分資訊無法取得: {}", labels.join(", "))
}

/// Insertion-ordered list without duplicates.
#[derive(Default)]
struct UniqueList {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl UniqueList {
    fn extend(&mut self, values: &[String]) {
        for value in values {
            let value = value.trim();
            if !value.is_empty() && self.seen.insert(value.to_string()) {
                self.items.push(value.to_string());
            }
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}
