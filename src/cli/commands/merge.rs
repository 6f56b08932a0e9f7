//! Merge command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::core::merger::{DegradationLevel, DegradedResult, Merger, MetadataResult};
use crate::models::config::Config;

/// Read per-source results from a JSON array.
pub fn load_results(path: &Path) -> Result<Vec<MetadataResult>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let results: Vec<MetadataResult> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of results", path.display()))?;
    Ok(results)
}

/// Execute merge command.
pub fn execute_merge(config: &Config, file: &Path, format: &str) -> Result<()> {
    let results = load_results(file)?;
    tracing::debug!("Merging {} results from {}", results.len(), file.display());

    let merged = Merger::new(config.merger_config()).merge(&results);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&merged)?);
    } else {
        print_merged(&merged);
    }

    Ok(())
}

fn print_merged(result: &DegradedResult) {
    let level = match result.degradation_level {
        DegradationLevel::Normal => "normal".green(),
        DegradationLevel::Partial => "partial".yellow(),
        DegradationLevel::Minimal => "minimal".red(),
    };
    let metadata = &result.metadata;

    println!("{} {}", "Degradation:".bold(), level);
    println!("{}", "-".repeat(60));
    println!("{:<10} {}", "Title", metadata.title);
    println!("{:<10} {}", "Year", metadata.year);
    println!("{:<10} {}", "Overview", metadata.overview);
    println!("{:<10} {}", "Poster", metadata.poster_url);
    if !metadata.genres.is_empty() {
        println!("{:<10} {}", "Genres", metadata.genres.join(", "));
    }
    if !metadata.cast.is_empty() {
        println!("{:<10} {}", "Cast", metadata.cast.join(", "));
    }
    println!("{}", "-".repeat(60));

    for (field, source) in &metadata.field_sources {
        println!("  {} {} {}", field.as_str().dimmed(), "<-".dimmed(), source);
    }
    if !result.fallback_used.is_empty() {
        println!("{} {}", "Sources:".bold(), result.fallback_used.join(" → "));
    }
    if !result.is_complete() {
        println!("{}", result.message.yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_results() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"source": "TMDb", "title": "Inception", "year": 2010}}, {{"source": "Douban", "overview": "盜夢空間"}}]"#
        )
        .unwrap();

        let results = load_results(file.path()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title.as_deref(), Some("Inception"));
        assert!(results[0].genres.is_empty());
        assert_eq!(results[1].overview.as_deref(), Some("盜夢空間"));
    }

    #[test]
    fn test_load_results_rejects_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"source": "TMDb"}}"#).unwrap();
        assert!(load_results(file.path()).is_err());
    }
}
