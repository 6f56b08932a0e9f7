//! Integration tests for partial-result merging.

use metadata_resolver::core::merger::{
    merge_partial_results, DegradationLevel, Merger, MergerConfig, MetadataResult, RequiredField,
    PLACEHOLDER_OVERVIEW, PLACEHOLDER_POSTER_URL, PLACEHOLDER_TITLE, PLACEHOLDER_YEAR,
};

fn result(source: &str) -> MetadataResult {
    MetadataResult::new(source)
}

#[test]
fn test_complementary_sources_make_complete_result() {
    let a = MetadataResult {
        title: Some("The Matrix".to_string()),
        year: Some(1999),
        ..result("A")
    };
    let b = MetadataResult {
        overview: Some("A hacker learns the truth about reality.".to_string()),
        poster_url: Some("https://x/y.jpg".to_string()),
        ..result("B")
    };

    let merged = merge_partial_results(&[a, b]);

    assert_eq!(merged.degradation_level, DegradationLevel::Normal);
    assert!(merged.missing_fields.is_empty());
    assert!(merged.is_complete());
    assert_eq!(merged.fallback_used, vec!["A", "B"]);
    assert_eq!(merged.message, "");

    let metadata = &merged.metadata;
    assert_eq!(metadata.title, "The Matrix");
    assert_eq!(metadata.year, 1999);
    assert_eq!(metadata.poster_url, "https://x/y.jpg");
    assert!(metadata.placeholder_fields.is_empty());
    assert_eq!(metadata.field_sources[&RequiredField::Title], "A");
    assert_eq!(metadata.field_sources[&RequiredField::Overview], "B");
}

#[test]
fn test_single_partial_source() {
    let only = MetadataResult {
        title: Some("駭客任務".to_string()),
        year: Some(1999),
        ..result("TMDb")
    };

    let merged = merge_partial_results(&[only]);

    assert_eq!(merged.degradation_level, DegradationLevel::Partial);
    assert_eq!(
        merged.missing_fields,
        vec![RequiredField::Overview, RequiredField::PosterUrl]
    );
    assert_eq!(merged.metadata.overview, PLACEHOLDER_OVERVIEW);
    assert_eq!(merged.metadata.poster_url, PLACEHOLDER_POSTER_URL);
    assert_eq!(merged.metadata.placeholder_fields, merged.missing_fields);
    assert_eq!(merged.message, "部分資訊無法取得: 簡介, 海報");
}

#[test]
fn test_empty_input_is_minimal() {
    let merged = merge_partial_results(&[]);

    assert_eq!(merged.degradation_level, DegradationLevel::Minimal);
    assert_eq!(merged.missing_fields, RequiredField::ALL.to_vec());
    assert!(merged.fallback_used.is_empty());
    assert_eq!(merged.metadata.title, PLACEHOLDER_TITLE);
    assert_eq!(merged.metadata.year, PLACEHOLDER_YEAR);
    assert!(!merged.message.is_empty());
}

#[test]
fn test_first_source_wins_scalar_fields() {
    let first = MetadataResult {
        title: Some("Parasite".to_string()),
        ..result("TMDb")
    };
    let second = MetadataResult {
        title: Some("寄生蟲".to_string()),
        year: Some(2019),
        ..result("Douban")
    };
    let third = MetadataResult {
        year: Some(2020),
        overview: Some("...".to_string()),
        ..result("Wikipedia")
    };

    let merged = merge_partial_results(&[first, second, third]);

    assert_eq!(merged.metadata.title, "Parasite");
    assert_eq!(merged.metadata.year, 2019);
    assert_eq!(merged.metadata.field_sources[&RequiredField::Year], "Douban");
    assert_eq!(merged.metadata.field_sources[&RequiredField::Overview], "Wikipedia");
    assert_eq!(merged.missing_fields, vec![RequiredField::PosterUrl]);
    assert_eq!(merged.degradation_level, DegradationLevel::Partial);
}

#[test]
fn test_blank_and_zero_values_do_not_fill() {
    let blank = MetadataResult {
        title: Some("   ".to_string()),
        year: Some(0),
        overview: Some(String::new()),
        ..result("TMDb")
    };
    let real = MetadataResult {
        title: Some("Inception".to_string()),
        year: Some(2010),
        ..result("Douban")
    };

    let merged = merge_partial_results(&[blank, real]);

    assert_eq!(merged.metadata.title, "Inception");
    assert_eq!(merged.metadata.year, 2010);
    assert_eq!(merged.metadata.field_sources[&RequiredField::Title], "Douban");
    assert_eq!(merged.fallback_used, vec!["TMDb", "Douban"]);
}

#[test]
fn test_lists_are_unioned_in_first_seen_order() {
    let first = MetadataResult {
        genres: vec!["Drama".to_string(), "Thriller".to_string()],
        cast: vec!["Song Kang-ho".to_string()],
        ..result("TMDb")
    };
    let second = MetadataResult {
        genres: vec!["Thriller".to_string(), "Comedy".to_string(), "Drama".to_string()],
        cast: vec!["Choi Woo-shik".to_string(), "Song Kang-ho".to_string()],
        ..result("Douban")
    };

    let merged = merge_partial_results(&[first, second]);

    assert_eq!(merged.metadata.genres, vec!["Drama", "Thriller", "Comedy"]);
    assert_eq!(merged.metadata.cast, vec!["Song Kang-ho", "Choi Woo-shik"]);
}

#[test]
fn test_three_missing_fields_is_minimal() {
    let only = MetadataResult {
        title: Some("Inception".to_string()),
        ..result("TMDb")
    };

    let merged = merge_partial_results(&[only]);
    assert_eq!(merged.degradation_level, DegradationLevel::Minimal);
    assert_eq!(merged.message, "部分資訊無法取得: 年份, 簡介, 海報");
}

#[test]
fn test_configurable_ratio() {
    let only = MetadataResult {
        title: Some("Inception".to_string()),
        year: Some(2010),
        ..result("TMDb")
    };

    let strict = Merger::new(MergerConfig {
        minimal_missing_ratio: 0.25,
    });
    assert_eq!(
        strict.merge(&[only]).degradation_level,
        DegradationLevel::Minimal
    );
}

#[test]
fn test_serialized_shape() {
    let merged = merge_partial_results(&[MetadataResult {
        title: Some("Inception".to_string()),
        year: Some(2010),
        ..result("TMDb")
    }]);

    let json = serde_json::to_value(&merged).unwrap();
    assert_eq!(json["degradation_level"], "partial");
    assert_eq!(json["missing_fields"], serde_json::json!(["overview", "poster_url"]));
    assert!(json["metadata"]["poster_url"].is_string());
    assert_eq!(json["metadata"]["field_sources"]["year"], "TMDb");
    assert_eq!(json["metadata"]["field_sources"]["title"], "TMDb");
}

#[test]
fn test_results_deserialize_with_missing_fields() {
    let json = r#"[{"source": "TMDb", "title": "Inception"}, {"source": "Douban", "genres": ["科幻"]}]"#;
    let results: Vec<MetadataResult> = serde_json::from_str(json).unwrap();

    let merged = merge_partial_results(&results);
    assert_eq!(merged.metadata.genres, vec!["科幻"]);
    assert_eq!(merged.fallback_used, vec!["TMDb", "Douban"]);
}
