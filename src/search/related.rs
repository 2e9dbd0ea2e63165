use crate::models::{Page, RelatedPage};

/// Rank `pages` by how many of `tags` they carry (case-insensitive).
///
/// Pages sharing no tag are dropped, as is the page stored under
/// `exclude_url`. Common tags keep the query's casing and order. Pages with
/// equal scores keep their relative order from `pages`.
pub fn find_related(pages: &[Page], tags: &[String], exclude_url: Option<&str>) -> Vec<RelatedPage> {
    if tags.is_empty() {
        return Vec::new();
    }

    let mut related: Vec<RelatedPage> = pages
        .iter()
        .filter(|page| Some(page.url.as_str()) != exclude_url)
        .filter_map(|page| {
            let page_tags: Vec<String> = page.tags.iter().map(|t| t.to_lowercase()).collect();
            let common_tags: Vec<String> = tags
                .iter()
                .filter(|tag| {
                    let tag = tag.to_lowercase();
                    page_tags.iter().any(|page_tag| *page_tag == tag)
                })
                .cloned()
                .collect();

            if common_tags.is_empty() {
                None
            } else {
                Some(RelatedPage {
                    page: page.clone(),
                    match_score: common_tags.len(),
                    common_tags,
                })
            }
        })
        .collect();

    // sort_by is stable
    related.sort_by(|a, b| b.match_score.cmp(&a.match_score));
    related
}
