use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::text::truncate_chars;

use super::backend::LanguageModel;
use super::capability::Capability;

const MAX_TAGS: usize = 5;
const MAX_INPUT_CHARS: usize = 2000;
const DEFAULT_TAG: &str = "General";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts keywords and topics from text. \
Always return responses as valid JSON arrays.";

// Only words longer than three characters survive the length filter, so
// shorter stop words are listed for completeness only.
const STOP_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "i", "it", "for", "not", "on",
    "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we",
    "say", "her", "she", "or", "an", "will", "my", "one", "all", "would", "there", "their",
    "what", "so", "up", "out", "if", "about", "who", "get", "which", "go", "me", "when", "make",
    "can", "like", "time", "no", "just", "him", "know", "take", "people", "into", "year",
    "your", "good", "some", "could", "them", "see", "other", "than", "then", "now", "look",
    "only", "come", "its", "think", "also", "back", "after", "use", "two", "how", "our",
    "work", "first", "well", "way", "even", "new", "want", "because", "any", "these", "give",
    "day", "most", "us", "is", "was", "are", "been", "has", "had", "were", "said", "did",
    "having", "may", "should", "am", "being",
];

static NON_WORD: OnceLock<Regex> = OnceLock::new();
static QUOTED: OnceLock<Regex> = OnceLock::new();

pub struct TagExtractor<M> {
    capability: Arc<Capability<M>>,
    timeout: Duration,
}

impl<M: LanguageModel> TagExtractor<M> {
    pub fn new(capability: Arc<Capability<M>>, timeout: Duration) -> Self {
        Self {
            capability,
            timeout,
        }
    }

    /// Up to five topical labels for `text`. Never fails: anything the model
    /// can't deliver is replaced by word-frequency tags.
    pub async fn extract(&self, text: &str) -> Vec<String> {
        let Some(model) = self.capability.session().await else {
            return fallback_tags(text);
        };

        let prompt = format!(
            "Extract the {} most important keywords or topics from the following text. \
             Return ONLY a JSON array of strings, nothing else. \
             Example: [\"keyword1\", \"keyword2\", \"keyword3\"]\n\nText: {}",
            MAX_TAGS,
            truncate_chars(text, MAX_INPUT_CHARS)
        );

        match tokio::time::timeout(self.timeout, model.prompt(SYSTEM_PROMPT, &prompt)).await {
            Ok(Ok(response)) => parse_tag_response(&response).unwrap_or_else(|| {
                tracing::debug!("No usable tags in model response: {:?}", response);
                fallback_tags(text)
            }),
            Ok(Err(e)) => {
                tracing::warn!("Failed to extract tags: {}", e);
                fallback_tags(text)
            }
            Err(_) => {
                tracing::warn!("Tag extraction timed out after {:?}", self.timeout);
                fallback_tags(text)
            }
        }
    }
}

/// Read tags from a model response: a JSON array of strings, or failing JSON,
/// any double-quoted strings in the text. `None` means nothing usable.
pub fn parse_tag_response(response: &str) -> Option<Vec<String>> {
    let tags: Vec<String> = match serde_json::from_str::<Value>(response.trim()) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(tag) => Some(tag.trim().to_string()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?,
        Ok(_) => return None,
        Err(_) => {
            let quoted = QUOTED.get_or_init(|| Regex::new(r#""([^"]+)""#).expect("valid regex"));
            quoted
                .captures_iter(response)
                .map(|cap| cap[1].trim().to_string())
                .collect()
        }
    };

    let tags: Vec<String> = tags
        .into_iter()
        .filter(|tag| !tag.is_empty())
        .take(MAX_TAGS)
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Deterministic tags from word frequency: the five most frequent words
/// longer than three characters that are not stop words, capitalized.
/// Equal counts keep first-seen order. Returns `["General"]` when no word
/// qualifies.
pub fn fallback_tags(text: &str) -> Vec<String> {
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid regex"));
    let lowered = text.to_lowercase();
    let cleaned = non_word.replace_all(&lowered, " ");

    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for word in cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > 3 && !STOP_WORDS.contains(word))
    {
        match positions.get(word) {
            Some(&position) => counts[position].1 += 1,
            None => {
                positions.insert(word, counts.len());
                counts.push((word, 1));
            }
        }
    }

    // sort_by is stable, so ties stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let tags: Vec<String> = counts
        .into_iter()
        .take(MAX_TAGS)
        .map(|(word, _)| capitalize(word))
        .collect();

    if tags.is_empty() {
        vec![DEFAULT_TAG.to_string()]
    } else {
        tags
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::ai::testing::MockModel;
    use crate::ai::backend::Availability;

    fn extractor(model: Option<MockModel>) -> TagExtractor<MockModel> {
        TagExtractor::new(
            Arc::new(Capability::new(model, Duration::from_secs(5))),
            Duration::from_secs(5),
        )
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn fallback_picks_frequent_words_in_first_seen_order() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(10);
        let tags = fallback_tags(&text);
        assert_eq!(tags, strings(&["Quick", "Brown", "Jumps", "Over", "Lazy"]));
        assert_eq!(fallback_tags(&text), tags);
    }

    #[test]
    fn fallback_ranks_by_count() {
        let text = "alpha beta beta gamma gamma gamma delta epsilon zeta";
        assert_eq!(
            fallback_tags(text),
            strings(&["Gamma", "Beta", "Alpha", "Delta", "Epsilon"])
        );
    }

    #[test]
    fn fallback_strips_punctuation_and_stop_words() {
        let tags = fallback_tags("Rust's ownership... (ownership!) would should about");
        assert_eq!(tags, strings(&["Ownership", "Rust"]));
    }

    #[test]
    fn fallback_defaults_to_general() {
        assert_eq!(fallback_tags("a an the of it is"), strings(&["General"]));
        assert_eq!(fallback_tags(""), strings(&["General"]));
    }

    #[test]
    fn parses_json_array() {
        let tags = parse_tag_response(r#"[" Rust ", "Tokio", "Async", "SQLite", "Search", "Extra"]"#);
        assert_eq!(tags, Some(strings(&["Rust", "Tokio", "Async", "SQLite", "Search"])));
    }

    #[test]
    fn recovers_quoted_strings_from_prose() {
        let response = "Sure! Here you go:\n```json\n[\"Machine Learning\", \"Ethics\"]\n```";
        assert_eq!(
            parse_tag_response(response),
            Some(strings(&["Machine Learning", "Ethics"]))
        );
    }

    #[test]
    fn rejects_unusable_responses() {
        assert_eq!(parse_tag_response(r#"{"tags": ["a"]}"#), None);
        assert_eq!(parse_tag_response("[1, 2, 3]"), None);
        assert_eq!(parse_tag_response("[]"), None);
        assert_eq!(parse_tag_response("no tags here"), None);
    }

    #[tokio::test]
    async fn extract_uses_model_tags() {
        let extractor = extractor(Some(MockModel::replying(r#"["Rust", "Databases"]"#)));
        assert_eq!(
            extractor.extract("some text").await,
            strings(&["Rust", "Databases"])
        );
    }

    #[tokio::test]
    async fn extract_falls_back_on_garbage() {
        let extractor = extractor(Some(MockModel::replying("I cannot help with that")));
        assert_eq!(
            extractor.extract("ownership ownership borrowing").await,
            strings(&["Ownership", "Borrowing"])
        );
    }

    #[tokio::test]
    async fn extract_falls_back_on_error() {
        let extractor = extractor(Some(MockModel::failing()));
        assert_eq!(extractor.extract("borrowing").await, strings(&["Borrowing"]));
    }

    #[tokio::test]
    async fn extract_without_model_never_prompts() {
        let model = MockModel::replying("[]").with_availability(Availability::No);
        let extractor = extractor(Some(model));
        assert_eq!(extractor.extract("lifetimes").await, strings(&["Lifetimes"]));
        assert!(extractor.capability.session().await.is_none());
    }

    #[tokio::test]
    async fn extract_falls_back_when_model_stalls() {
        let model = MockModel::replying(r#"["Late"]"#).with_prompt_delay(Duration::from_secs(30));
        let extractor = TagExtractor::new(
            Arc::new(Capability::new(Some(model), Duration::from_secs(5))),
            Duration::from_millis(20),
        );
        assert_eq!(extractor.extract("traits").await, strings(&["Traits"]));
        let model = extractor.capability.session().await.unwrap();
        assert_eq!(model.prompts.load(Ordering::SeqCst), 1);
    }
}
