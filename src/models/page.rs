use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored page, one per distinct URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub full_text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Caller-supplied fields of a page. `id` and `timestamp` belong to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub favicon: Option<String>,
}

/// What a content extractor hands over for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPage {
    #[serde(flatten)]
    pub page: Page,
    pub match_score: usize,
    pub common_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_pages: usize,
    pub total_tags: usize,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub oldest_entry: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub newest_entry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn page_serializes_in_camel_case_with_millis() {
        let page = Page {
            id: 7,
            url: "https://example.com".into(),
            title: "Example".into(),
            summary: "An example".into(),
            tags: vec!["Web".into()],
            full_text: "body".into(),
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            favicon: None,
        };

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["fullText"], "body");
        assert_eq!(json["timestamp"], 1_700_000_000_123_i64);
        assert!(json.get("favicon").is_none());
    }

    #[test]
    fn empty_stats_serialize_nulls() {
        let json = serde_json::to_value(StoreStats::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "totalPages": 0,
                "totalTags": 0,
                "oldestEntry": null,
                "newestEntry": null
            })
        );
    }

    #[test]
    fn related_page_flattens_page_fields() {
        let related = RelatedPage {
            page: Page {
                id: 1,
                url: "u".into(),
                title: "t".into(),
                summary: String::new(),
                tags: vec!["ai".into()],
                full_text: String::new(),
                timestamp: Utc.timestamp_millis_opt(0).unwrap(),
                favicon: None,
            },
            match_score: 1,
            common_tags: vec!["AI".into()],
        };

        let json = serde_json::to_value(&related).unwrap();
        assert_eq!(json["url"], "u");
        assert_eq!(json["matchScore"], 1);
        assert_eq!(json["commonTags"][0], "AI");
    }
}
