//! Diagnostic trail of one orchestration run.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::ProviderError;
use crate::utils::duration::serialize_millis;

const SUCCESS_MARK: &str = "✓";
const FAILURE_MARK: &str = "❌";
const SKIPPED_MARK: &str = "⏭";
const SEPARATOR: &str = " → ";
const MANUAL_SEARCH: &str = "Manual search";
const CANCELLED: &str = "Cancelled";
const INVALID_REQUEST: &str = "Invalid request";

/// One provider tried during a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceAttempt {
    /// Provider name.
    pub source: String,
    pub success: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip)]
    pub error: Option<Arc<ProviderError>>,
    /// Rendered `error`, for consumers that serialize the trail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl SourceAttempt {
    pub fn succeeded(source: impl Into<String>, duration: Duration) -> Self {
        Self {
            source: source.into(),
            success: true,
            skipped: false,
            skip_reason: None,
            error: None,
            error_message: None,
            duration,
        }
    }

    /// A call that ran but produced an error, or no error and no items.
    pub fn failed(
        source: impl Into<String>,
        error: Option<ProviderError>,
        duration: Duration,
    ) -> Self {
        let error_message = error.as_ref().map(ToString::to_string);
        Self {
            source: source.into(),
            success: false,
            skipped: false,
            skip_reason: None,
            error: error.map(Arc::new),
            error_message,
            duration,
        }
    }

    /// A provider that was never called.
    pub fn skipped(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            success: false,
            skipped: true,
            skip_reason: Some(reason.into()),
            error: None,
            error_message: None,
            duration: Duration::ZERO,
        }
    }

    fn mark(&self) -> &'static str {
        if self.success {
            SUCCESS_MARK
        } else if self.skipped {
            SKIPPED_MARK
        } else {
            FAILURE_MARK
        }
    }
}

/// One alternative keyword retried after the chain was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordAttempt {
    pub keyword: String,
    pub success: bool,
}

/// Everything that happened during one `search` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FallbackStatus {
    pub attempts: Vec<SourceAttempt>,
    #[serde(rename = "total_duration_ms", serialize_with = "serialize_millis")]
    pub total_duration: Duration,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keyword_attempts: Vec<KeywordAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_error: Option<String>,
    /// Set when the request was rejected before any provider ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_error: Option<String>,
}

impl FallbackStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no attempt succeeded, including when nothing was attempted.
    pub fn all_failed(&self) -> bool {
        !self.attempts.iter().any(|a| a.success)
    }

    /// Whether the result came from the keyword retry phase.
    pub fn recovered_by_keyword(&self) -> bool {
        self.successful_keyword.is_some()
    }

    /// The attempt that produced the result, if any.
    pub fn successful_attempt(&self) -> Option<&SourceAttempt> {
        self.attempts.iter().find(|a| a.success)
    }

    /// Render the trail, e.g. `"TMDb ❌ → Douban ✓"`.
    ///
    /// An exhausted chain ends in `"→ Manual search"` and a cancelled one in
    /// `"→ Cancelled"`. A keyword recovery ends in `"→ 🔑 <keyword> ✓"`; a
    /// rejected request renders as `"Invalid request"`.
    pub fn status_string(&self) -> String {
        let mut parts: Vec<String> = self
            .attempts
            .iter()
            .map(|a| format!("{} {}", a.source, a.mark()))
            .collect();

        if self.all_failed() {
            if self.request_error.is_some() {
                parts.push(INVALID_REQUEST.to_string());
            } else if self.cancelled {
                parts.push(CANCELLED.to_string());
            } else if let Some(ref keyword) = self.successful_keyword {
                parts.push(format!("🔑 {} {}", keyword, SUCCESS_MARK));
            } else {
                parts.push(MANUAL_SEARCH.to_string());
            }
        }

        parts.join(SEPARATOR)
    }
}

impl std::fmt::Display for FallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.status_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(name: &str) -> SourceAttempt {
        SourceAttempt::failed(name, None, Duration::from_millis(5))
    }

    #[test]
    fn test_single_success() {
        let status = FallbackStatus {
            attempts: vec![SourceAttempt::succeeded("TMDb", Duration::from_millis(5))],
            ..Default::default()
        };
        assert_eq!(status.status_string(), "TMDb ✓");
        assert!(!status.all_failed());
    }

    #[test]
    fn test_fallback_success() {
        let status = FallbackStatus {
            attempts: vec![
                failed("TMDb"),
                SourceAttempt::succeeded("Douban", Duration::from_millis(5)),
            ],
            ..Default::default()
        };
        assert_eq!(status.status_string(), "TMDb ❌ → Douban ✓");
        assert_eq!(status.successful_attempt().map(|a| a.source.as_str()), Some("Douban"));
    }

    #[test]
    fn test_all_failed_appends_manual_search() {
        let status = FallbackStatus {
            attempts: vec![
                failed("TMDb"),
                SourceAttempt::skipped("Douban", "circuit breaker open"),
                failed("Wikipedia"),
            ],
            ..Default::default()
        };
        assert!(status.all_failed());
        assert_eq!(
            status.status_string(),
            "TMDb ❌ → Douban ⏭ → Wikipedia ❌ → Manual search"
        );
    }

    #[test]
    fn test_cancelled_is_not_manual_search() {
        let status = FallbackStatus {
            attempts: vec![failed("TMDb")],
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(status.status_string(), "TMDb ❌ → Cancelled");
    }

    #[test]
    fn test_keyword_recovery() {
        let status = FallbackStatus {
            attempts: vec![failed("TMDb")],
            successful_keyword: Some("The Matrix".to_string()),
            ..Default::default()
        };
        assert!(status.recovered_by_keyword());
        assert_eq!(status.status_string(), "TMDb ❌ → 🔑 The Matrix ✓");
    }

    #[test]
    fn test_empty_status() {
        let status = FallbackStatus::new();
        assert!(status.all_failed());
        assert_eq!(status.status_string(), "Manual search");
    }

    #[test]
    fn test_rejected_request() {
        let status = FallbackStatus {
            request_error: Some("query must not be empty".to_string()),
            ..Default::default()
        };
        assert_eq!(status.status_string(), "Invalid request");

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["request_error"], "query must not be empty");
    }

    #[test]
    fn test_serialized_trail_omits_error_object() {
        let status = FallbackStatus {
            attempts: vec![failed("TMDb")],
            total_duration: Duration::from_millis(120),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["total_duration_ms"], 120);
        assert_eq!(json["attempts"][0]["duration_ms"], 5);
        assert!(json["attempts"][0].get("error").is_none());
        assert!(json.get("keyword_attempts").is_none());
    }
}
