//! Title text utilities.

/// Check if two titles are the same when normalized.
pub fn titles_equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Normalize a title for comparison: lowercase, no whitespace, no
/// punctuation (ASCII or full-width).
pub fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !is_punctuation(*c))
        .collect()
}

/// Check if a string contains Chinese characters.
pub fn contains_chinese(s: &str) -> bool {
    s.chars().any(is_chinese_char)
}

/// Check if a character is a Chinese character.
fn is_chinese_char(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |  // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |  // CJK Unified Ideographs Extension A
        '\u{F900}'..='\u{FAFF}' |  // CJK Compatibility Ideographs
        '\u{20000}'..='\u{2A6DF}'  // CJK Unified Ideographs Extension B
    )
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c, '：' | '，' | '。' | '！' | '？' | '・' | '·' | '「' | '」' | '《' | '》')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_chinese() {
        assert!(contains_chinese("駭客任務"));
        assert!(contains_chinese("Matrix 黑客帝国"));
        assert!(!contains_chinese("The Matrix"));
    }

    #[test]
    fn test_titles_equivalent() {
        assert!(titles_equivalent("The Matrix", "the matrix"));
        assert!(titles_equivalent("Spider-Man: No Way Home", "spiderman no way home"));
        assert!(titles_equivalent("鬼滅之刃：無限列車篇", "鬼滅之刃 無限列車篇"));
        assert!(!titles_equivalent("Avatar", "Titanic"));
    }
}
