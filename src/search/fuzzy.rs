//! Weighted approximate search over an in-memory snapshot of the page store.
//!
//! Every field is scored by the edit distance between the query and the
//! closest window of the field (so both typos and partial words match),
//! divided by the query length: `0.0` is a perfect hit, `1.0` is no overlap.
//! A field counts as a match when its score is within the threshold. The
//! record score multiplies `score ^ weight` over matched fields, so lower is
//! better and hits on heavier fields pull a record up.

use std::cmp::Ordering;

use strsim::normalized_levenshtein;

use crate::models::Page;

pub const TITLE_WEIGHT: f64 = 0.4;
pub const SUMMARY_WEIGHT: f64 = 0.3;
pub const TAG_WEIGHT: f64 = 0.2;
pub const URL_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyOptions {
    /// Highest field score still counted as a match. Larger is looser.
    pub threshold: f64,
    /// Queries shorter than this (in characters) match nothing.
    pub min_match_len: usize,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            min_match_len: 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub page: &'a Page,
    pub score: f64,
}

struct IndexedPage {
    title: Vec<char>,
    summary: Vec<char>,
    tags: Vec<(String, Vec<char>)>,
    url: Vec<char>,
}

impl IndexedPage {
    fn new(page: &Page) -> Self {
        Self {
            title: lower_chars(&page.title),
            summary: lower_chars(&page.summary),
            tags: page
                .tags
                .iter()
                .map(|tag| {
                    let lower = tag.to_lowercase();
                    let chars = lower.chars().collect();
                    (lower, chars)
                })
                .collect(),
            url: lower_chars(&page.url),
        }
    }
}

/// Search index over a snapshot of pages. Rebuild it whenever the snapshot
/// changes; it never reads the store itself.
pub struct SearchIndex {
    pages: Vec<Page>,
    entries: Vec<IndexedPage>,
    options: FuzzyOptions,
}

impl SearchIndex {
    pub fn build(pages: Vec<Page>, options: FuzzyOptions) -> Self {
        let entries = pages.iter().map(IndexedPage::new).collect();
        Self {
            pages,
            entries,
            options,
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Best match first; equal scores keep snapshot order. A blank query
    /// returns every page in snapshot order with a neutral score of `1.0`.
    pub fn search(&self, query: &str) -> Vec<SearchHit<'_>> {
        let query = query.trim();
        if query.is_empty() {
            return self
                .pages
                .iter()
                .map(|page| SearchHit { page, score: 1.0 })
                .collect();
        }

        let query_lower = query.to_lowercase();
        let pattern: Vec<char> = query_lower.chars().collect();
        if pattern.len() < self.options.min_match_len {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit<'_>> = self
            .pages
            .iter()
            .zip(&self.entries)
            .filter_map(|(page, entry)| {
                self.score_entry(&query_lower, &pattern, entry)
                    .map(|score| SearchHit { page, score })
            })
            .collect();

        hits.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
        hits
    }

    /// The matched pages, newest first. This is the order shown to users.
    pub fn search_by_recency(&self, query: &str) -> Vec<Page> {
        let mut pages: Vec<Page> = self
            .search(query)
            .into_iter()
            .map(|hit| hit.page.clone())
            .collect();
        sort_by_recency(&mut pages);
        pages
    }

    fn score_entry(&self, query: &str, pattern: &[char], entry: &IndexedPage) -> Option<f64> {
        let threshold = self.options.threshold;
        let mut total = 1.0;
        let mut matched = false;

        let mut apply = |score: f64, weight: f64| {
            if score <= threshold {
                matched = true;
                total *= score.max(f64::EPSILON).powf(weight);
            }
        };

        apply(field_score(pattern, &entry.title), TITLE_WEIGHT);
        apply(field_score(pattern, &entry.summary), SUMMARY_WEIGHT);
        for (tag, tag_chars) in &entry.tags {
            let whole = 1.0 - normalized_levenshtein(query, tag);
            apply(field_score(pattern, tag_chars).min(whole), TAG_WEIGHT);
        }
        apply(field_score(pattern, &entry.url), URL_WEIGHT);

        matched.then_some(total)
    }
}

/// Newest first, then highest id first.
pub fn sort_by_recency(pages: &mut [Page]) {
    pages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

fn lower_chars(value: &str) -> Vec<char> {
    value.to_lowercase().chars().collect()
}

fn field_score(pattern: &[char], text: &[char]) -> f64 {
    if pattern.is_empty() {
        return 1.0;
    }
    let errors = window_distance(pattern, text);
    (errors as f64 / pattern.len() as f64).min(1.0)
}

/// Smallest edit distance between `pattern` and any substring of `text`.
fn window_distance(pattern: &[char], text: &[char]) -> usize {
    let m = pattern.len();
    // column[i]: cost of matching pattern[..i] against the best window ending here
    let mut column: Vec<usize> = (0..=m).collect();
    let mut best = m;

    for &c in text {
        let mut diagonal = column[0];
        for i in 1..=m {
            let left = column[i];
            let substitution = diagonal + usize::from(pattern[i - 1] != c);
            column[i] = substitution.min(left + 1).min(column[i - 1] + 1);
            diagonal = left;
        }
        best = best.min(column[m]);
        if best == 0 {
            break;
        }
    }

    best
}
