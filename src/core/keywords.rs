//! Alternative search keywords.
//!
//! When every provider misses a title, an AI model is asked for other names
//! the same work is known by (English title, simplified/traditional Chinese,
//! romanization, common aliases). The orchestrator retries the provider chain
//! with each of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::services::ollama::OllamaClient;
use crate::utils::chinese;
use crate::{Error, Result};

/// Alternative names for one title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordVariants {
    /// The title the variants were generated for.
    pub original: String,
    #[serde(default)]
    pub english: Option<String>,
    #[serde(default)]
    pub traditional_chinese: Option<String>,
    #[serde(default)]
    pub simplified_chinese: Option<String>,
    /// Romanized form (pinyin, romaji, ...).
    #[serde(default)]
    pub romanized: Option<String>,
    /// Other aliases, most likely first.
    #[serde(default)]
    pub alternatives: Vec<String>,
}

impl KeywordVariants {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            ..Default::default()
        }
    }

    /// Variants in retry order, without blanks, duplicates or the original.
    ///
    /// Order: English, traditional Chinese, simplified Chinese, romanized,
    /// then aliases. Titles are compared normalized, so "Spider-Man" and
    /// "spiderman" count as one.
    pub fn prioritized_list(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        seen.insert(chinese::normalize(&self.original));

        let named = [
            &self.english,
            &self.traditional_chinese,
            &self.simplified_chinese,
            &self.romanized,
        ];

        named
            .into_iter()
            .filter_map(|v| v.as_deref())
            .chain(self.alternatives.iter().map(String::as_str))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .filter(|v| {
                let key = chinese::normalize(v);
                !key.is_empty() && seen.insert(key)
            })
            .map(str::to_string)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.prioritized_list().is_empty()
    }
}

/// Source of alternative search terms.
#[async_trait]
pub trait KeywordGenerator: Send + Sync {
    async fn generate_keywords(&self, title: &str) -> Result<KeywordVariants>;
}

/// AI response structure for keyword generation.
#[derive(Debug, Deserialize)]
struct AiKeywordResponse {
    english: Option<String>,
    traditional_chinese: Option<String>,
    simplified_chinese: Option<String>,
    romanized: Option<String>,
    #[serde(default)]
    alternatives: Vec<String>,
}

/// Keyword generator backed by a local Ollama model.
#[derive(Debug, Clone)]
pub struct AiKeywordGenerator {
    client: OllamaClient,
    /// Upper bound on aliases kept from one response.
    max_alternatives: usize,
}

impl AiKeywordGenerator {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            max_alternatives: 5,
        }
    }

    /// Generate the prompt asking for alternative titles.
    fn generate_prompt(&self, title: &str) -> String {
        let lang_hint = if chinese::contains_chinese(title) {
            "标题是中文，请提供英文原名"
        } else {
            "标题是英文或其他外语，请提供中文译名"
        };

        format!(
            r#"你是一个影视资料专家。用户用下面的标题搜索影视作品，但所有数据源都没有找到结果。
请给出这部作品的其他常用名称，用于重新搜索。

标题: {title}
提示: {lang_hint}

请以JSON格式返回：
1. english: 英文官方名称
2. traditional_chinese: 繁体中文名称（台湾/香港常用译名）
3. simplified_chinese: 简体中文名称（大陆常用译名）
4. romanized: 罗马拼音（如日文罗马字、汉语拼音），没有则返回null
5. alternatives: 其他别名数组，最可能的排在前面

注意事项：
- 只返回真实存在的名称，不要编造
- 去掉分辨率、年份、版本信息（如导演剪辑版）
- 无法确定的字段返回null

只返回JSON对象，不要包含其他文字：
{{"english": "...", "traditional_chinese": "...", "simplified_chinese": "...", "romanized": null, "alternatives": []}}"#
        )
    }

    /// Parse AI response into keyword variants.
    fn parse_ai_response(&self, response: &str, title: &str) -> Result<KeywordVariants> {
        let ai_response: AiKeywordResponse = serde_json::from_str(response.trim()).map_err(|e| {
            tracing::warn!("Failed to parse AI keyword response for '{}': {}", title, e);
            Error::KeywordGeneration(format!("unparseable response: {}", e))
        })?;

        let mut alternatives = ai_response.alternatives;
        alternatives.truncate(self.max_alternatives);

        Ok(KeywordVariants {
            original: title.to_string(),
            english: non_blank(ai_response.english),
            traditional_chinese: non_blank(ai_response.traditional_chinese),
            simplified_chinese: non_blank(ai_response.simplified_chinese),
            romanized: non_blank(ai_response.romanized),
            alternatives,
        })
    }
}

#[async_trait]
impl KeywordGenerator for AiKeywordGenerator {
    async fn generate_keywords(&self, title: &str) -> Result<KeywordVariants> {
        let prompt = self.generate_prompt(title);

        tracing::debug!("Generating keywords for: {}", title);
        let start = std::time::Instant::now();

        let response = self
            .client
            .generate_json(&prompt)
            .await
            .map_err(|e| Error::KeywordGeneration(e.to_string()))?;

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "AI keyword response: {}",
            response
        );

        self.parse_ai_response(&response, title)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && v.trim() != "null")
}
