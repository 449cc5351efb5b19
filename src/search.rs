//! Static search corpus emission for tag and category scopes.
//!
//! Every sufficiently large scope gets a `search_header.json` plus
//! `search_content_<i>.json` shards. Tag names are mapped to scope-local
//! integer ids so the shards stay compact; the header is the only place
//! the names live. The in-ZIM search script consumes exactly this shape.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{StorySummary, TagKind};

/// Indexable fields, in resolution order. Ids are assigned first-seen
/// across records, fields visited in this order within a record.
pub const SEARCH_FIELDS: [&str; 9] = [
    "publisher",
    "language",
    "status",
    "categories",
    "warnings",
    "characters",
    "relationships",
    "tags",
    "rating",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHeader {
    pub num_pages: usize,
    /// field -> tag name -> scope-local id
    pub tag_ids: BTreeMap<&'static str, BTreeMap<String, u32>>,
    /// id -> number of stories in the scope carrying the value explicitly
    pub amounts: BTreeMap<u32, u64>,
}

/// One story in a `search_content_<i>.json` shard.
///
/// `categories` and `series` are carried by name for rendering; `tags` and
/// `implied_tags` are id lists for filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRecord {
    pub publisher: String,
    pub id: i64,
    pub title: String,
    pub author: String,
    pub updated: String,
    pub words: u64,
    pub chapters: u32,
    pub score: i64,
    pub rating: String,
    pub language: String,
    pub status: String,
    pub categories: Vec<String>,
    pub series: Vec<(String, u32)>,
    pub summary: String,
    pub tags: Vec<u32>,
    pub implied_tags: Vec<u32>,
    pub category_count: usize,
}

/// A complete per-scope search corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCorpus {
    pub header: SearchHeader,
    pub shards: Vec<Vec<SearchRecord>>,
}

/// Explicit and implied values of one field on one story.
fn field_values(summary: &StorySummary, field: &str) -> (Vec<String>, Vec<String>) {
    let tag_names = |kind: TagKind, implied: bool| -> Vec<String> {
        summary
            .tags
            .iter()
            .filter(|t| t.kind == kind && t.implied == implied)
            .map(|t| t.name.clone())
            .collect()
    };
    match field {
        "publisher" => (vec![summary.publisher.clone()], Vec::new()),
        "language" => (vec![summary.language.clone()], Vec::new()),
        "status" => (vec![summary.status.as_str().to_string()], Vec::new()),
        "rating" => (vec![summary.rating_title()], Vec::new()),
        "categories" => (
            summary
                .explicit_categories()
                .map(|c| c.name.clone())
                .collect(),
            summary
                .implied_categories()
                .map(|c| c.name.clone())
                .collect(),
        ),
        "warnings" => (
            tag_names(TagKind::Warning, false),
            tag_names(TagKind::Warning, true),
        ),
        "characters" => (
            tag_names(TagKind::Character, false),
            tag_names(TagKind::Character, true),
        ),
        "relationships" => (
            tag_names(TagKind::Relationship, false),
            tag_names(TagKind::Relationship, true),
        ),
        "tags" => (
            tag_names(TagKind::Genre, false),
            tag_names(TagKind::Genre, true),
        ),
        other => unreachable!("unknown search field '{}'", other),
    }
}

/// Builds search corpora for scopes within the configured size window.
#[derive(Debug, Clone, Copy)]
pub struct SearchIndexEmitter {
    pub shard_size: usize,
    pub min_stories: usize,
    pub max_stories: usize,
}

impl SearchIndexEmitter {
    /// Build the corpus for a scope, or `None` when the scope is outside
    /// the size window (the UI then hides the search button).
    pub fn build(&self, stories: &[StorySummary]) -> Option<SearchCorpus> {
        if stories.len() < self.min_stories || stories.len() > self.max_stories {
            return None;
        }

        // First pass: assign ids and count explicit occurrences.
        let mut tag_ids: BTreeMap<&'static str, BTreeMap<String, u32>> =
            SEARCH_FIELDS.iter().map(|&f| (f, BTreeMap::new())).collect();
        let mut amounts: BTreeMap<u32, u64> = BTreeMap::new();
        let mut next_id = 0u32;
        for summary in stories {
            for field in SEARCH_FIELDS {
                let (explicit, implied) = field_values(summary, field);
                let ids = tag_ids.get_mut(field).expect("field preassigned");
                for name in explicit.iter().chain(implied.iter()) {
                    if !ids.contains_key(name) {
                        ids.insert(name.clone(), next_id);
                        amounts.insert(next_id, 0);
                        next_id += 1;
                    }
                }
                // A story counts once per value it carries explicitly.
                let mut seen = Vec::new();
                for name in &explicit {
                    let id = ids[name];
                    if !seen.contains(&id) {
                        seen.push(id);
                        *amounts.entry(id).or_default() += 1;
                    }
                }
            }
        }

        // Second pass: emit fixed-size shards of id-resolved records.
        let mut shards = Vec::new();
        let mut current: Vec<SearchRecord> = Vec::with_capacity(self.shard_size);
        for summary in stories {
            let mut explicit_ids = Vec::new();
            let mut implied_ids = Vec::new();
            for field in SEARCH_FIELDS {
                let (explicit, implied) = field_values(summary, field);
                let ids = &tag_ids[field];
                for name in explicit {
                    let id = ids[&name];
                    if !explicit_ids.contains(&id) {
                        explicit_ids.push(id);
                    }
                }
                for name in implied {
                    let id = ids[&name];
                    if !implied_ids.contains(&id) {
                        implied_ids.push(id);
                    }
                }
            }
            current.push(SearchRecord {
                publisher: summary.publisher.clone(),
                id: summary.id,
                title: summary.title.clone(),
                author: summary.author.clone(),
                updated: summary.updated.format("%Y-%m-%d").to_string(),
                words: summary.total_words,
                chapters: summary.num_chapters,
                score: summary.score,
                rating: summary.rating_title(),
                language: summary.language.clone(),
                status: summary.status.as_str().to_string(),
                categories: summary
                    .explicit_categories()
                    .map(|c| c.name.clone())
                    .collect(),
                series: summary
                    .series
                    .iter()
                    .map(|s| (s.name.clone(), s.index))
                    .collect(),
                summary: summary.summary.clone(),
                tags: explicit_ids,
                implied_tags: implied_ids,
                category_count: summary.explicit_categories().count(),
            });
            if current.len() == self.shard_size {
                shards.push(std::mem::take(&mut current));
                current.reserve(self.shard_size);
            }
        }
        if !current.is_empty() {
            shards.push(current);
        }

        Some(SearchCorpus {
            header: SearchHeader {
                num_pages: shards.len(),
                tag_ids,
                amounts,
            },
            shards,
        })
    }
}
