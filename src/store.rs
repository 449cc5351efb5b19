//! Read-only access to the imported entity store.
//!
//! The build stage never talks to a database engine directly; it consumes
//! the [`EntityStore`] trait, whose methods mirror the queries the old
//! import/implication stages left behind. The shipped backend is
//! [`MemoryStore`], loadable from a JSON-lines dump (one story per line).
//! Connection strings are opaque: `json:<path>` or a bare path.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::models::{
    AuthorKey, CategoryKey, SeriesKey, Story, StoryKey, StorySummary, TagKind,
};

/// A distinct tag with its explicit story count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSummary {
    pub kind: TagKind,
    pub name: String,
    pub story_count: u64,
}

/// Read-only query surface of the relational store.
///
/// All iteration methods return keys, not entities; workers fetch the
/// entities they need through their own handle so no object graph is ever
/// shared between jobs.
pub trait EntityStore: Send + Sync {
    fn story_count(&self) -> Result<u64>;

    /// Keyset pagination over story keys: the page strictly after `after`
    /// in `(publisher, id)` order, at most `limit` entries.
    fn story_keys_page(&self, after: Option<&StoryKey>, limit: usize) -> Result<Vec<StoryKey>>;

    /// Fetch a story with its chapters. `None` if unknown.
    fn get_story(&self, key: &StoryKey) -> Result<Option<Story>>;

    /// Fetch a story without chapter bodies.
    fn get_story_summary(&self, key: &StoryKey) -> Result<Option<StorySummary>>;

    /// All distinct non-category tags with explicit story counts.
    fn tags(&self) -> Result<Vec<TagSummary>>;

    /// Stories explicitly tagged (implied-only associations excluded).
    fn stories_for_tag(&self, kind: TagKind, name: &str) -> Result<Vec<StoryKey>>;

    fn authors(&self) -> Result<Vec<AuthorKey>>;
    fn stories_for_author(&self, key: &AuthorKey) -> Result<Vec<StoryKey>>;
    fn author_url(&self, key: &AuthorKey) -> Result<Option<String>>;

    fn categories(&self) -> Result<Vec<CategoryKey>>;
    fn stories_for_category(&self, key: &CategoryKey) -> Result<Vec<StoryKey>>;

    fn series(&self) -> Result<Vec<SeriesKey>>;
    /// Ordered members of a series as `(story, index)`.
    fn series_members(&self, key: &SeriesKey) -> Result<Vec<(StoryKey, u32)>>;

    fn publishers(&self) -> Result<Vec<String>>;
    fn categories_for_publisher(&self, publisher: &str) -> Result<Vec<CategoryKey>>;
}

pub type StoreHandle = Arc<dyn EntityStore>;

/// In-memory store backing the shipped `json:` connection scheme and the
/// test suite.
#[derive(Default)]
pub struct MemoryStore {
    stories: BTreeMap<StoryKey, Story>,
    author_urls: FxHashMap<AuthorKey, String>,
    by_tag: BTreeMap<(TagKind, String), Vec<StoryKey>>,
    by_author: BTreeMap<AuthorKey, Vec<StoryKey>>,
    by_category: BTreeMap<CategoryKey, Vec<StoryKey>>,
    by_series: BTreeMap<SeriesKey, Vec<(StoryKey, u32)>>,
    publishers: Vec<String>,
}

impl MemoryStore {
    pub fn new(stories: Vec<Story>) -> Self {
        let mut store = MemoryStore::default();
        for story in stories {
            store.insert(story);
        }
        store.finish();
        store
    }

    fn insert(&mut self, story: Story) {
        let key = story.key();
        for tag in story.explicit_tags() {
            self.by_tag
                .entry((tag.kind, tag.name.clone()))
                .or_default()
                .push(key.clone());
        }
        self.by_author
            .entry(story.author_key())
            .or_default()
            .push(key.clone());
        for category in story.explicit_categories() {
            self.by_category
                .entry(CategoryKey {
                    publisher: story.publisher.clone(),
                    name: category.name.clone(),
                })
                .or_default()
                .push(key.clone());
        }
        for series in &story.series {
            self.by_series
                .entry(SeriesKey {
                    publisher: story.publisher.clone(),
                    name: series.name.clone(),
                })
                .or_default()
                .push((key.clone(), series.index));
        }
        if !self.publishers.contains(&story.publisher) {
            self.publishers.push(story.publisher.clone());
        }
        if !story.url.is_empty() {
            // Story URLs double as a fallback author link when the dump
            // carried none.
            self.author_urls
                .entry(story.author_key())
                .or_insert_with(|| story.url.clone());
        }
        self.stories.insert(key, story);
    }

    fn finish(&mut self) {
        self.publishers.sort();
        for members in self.by_series.values_mut() {
            members.sort_by_key(|(_, index)| *index);
        }
    }

    pub fn set_author_url(&mut self, key: AuthorKey, url: String) {
        self.author_urls.insert(key, url);
    }

    /// Load from a JSON-lines dump, one story per line. Unparseable lines
    /// are counted and skipped; the import stage already reported them.
    pub fn load_jsonl(path: &str) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open store dump: {}", path))?;
        let reader = BufReader::new(file);
        let mut stories = Vec::new();
        let mut skipped = 0u64;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("read error in {}", path))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Story>(&line) {
                Ok(story) => stories.push(story),
                Err(err) => {
                    warn!(line = lineno + 1, error = %err, "skipping unparseable story record");
                    skipped += 1;
                }
            }
        }
        info!(
            stories = stories.len(),
            skipped, "loaded story dump into memory store"
        );
        Ok(MemoryStore::new(stories))
    }
}

impl EntityStore for MemoryStore {
    fn story_count(&self) -> Result<u64> {
        Ok(self.stories.len() as u64)
    }

    fn story_keys_page(&self, after: Option<&StoryKey>, limit: usize) -> Result<Vec<StoryKey>> {
        use std::ops::Bound;
        let range = match after {
            Some(key) => self
                .stories
                .range((Bound::Excluded(key.clone()), Bound::Unbounded)),
            None => self.stories.range::<StoryKey, _>(..),
        };
        Ok(range.take(limit).map(|(k, _)| k.clone()).collect())
    }

    fn get_story(&self, key: &StoryKey) -> Result<Option<Story>> {
        Ok(self.stories.get(key).cloned())
    }

    fn get_story_summary(&self, key: &StoryKey) -> Result<Option<StorySummary>> {
        Ok(self.stories.get(key).map(Story::summarize))
    }

    fn tags(&self) -> Result<Vec<TagSummary>> {
        Ok(self
            .by_tag
            .iter()
            .map(|((kind, name), keys)| TagSummary {
                kind: *kind,
                name: name.clone(),
                story_count: keys.len() as u64,
            })
            .collect())
    }

    fn stories_for_tag(&self, kind: TagKind, name: &str) -> Result<Vec<StoryKey>> {
        Ok(self
            .by_tag
            .get(&(kind, name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn authors(&self) -> Result<Vec<AuthorKey>> {
        Ok(self.by_author.keys().cloned().collect())
    }

    fn stories_for_author(&self, key: &AuthorKey) -> Result<Vec<StoryKey>> {
        Ok(self.by_author.get(key).cloned().unwrap_or_default())
    }

    fn author_url(&self, key: &AuthorKey) -> Result<Option<String>> {
        Ok(self.author_urls.get(key).cloned())
    }

    fn categories(&self) -> Result<Vec<CategoryKey>> {
        Ok(self.by_category.keys().cloned().collect())
    }

    fn stories_for_category(&self, key: &CategoryKey) -> Result<Vec<StoryKey>> {
        Ok(self.by_category.get(key).cloned().unwrap_or_default())
    }

    fn series(&self) -> Result<Vec<SeriesKey>> {
        Ok(self.by_series.keys().cloned().collect())
    }

    fn series_members(&self, key: &SeriesKey) -> Result<Vec<(StoryKey, u32)>> {
        Ok(self.by_series.get(key).cloned().unwrap_or_default())
    }

    fn publishers(&self) -> Result<Vec<String>> {
        Ok(self.publishers.clone())
    }

    fn categories_for_publisher(&self, publisher: &str) -> Result<Vec<CategoryKey>> {
        Ok(self
            .by_category
            .keys()
            .filter(|k| k.publisher == publisher)
            .cloned()
            .collect())
    }
}

/// Open a store from an opaque connection string.
pub fn open_store(url: &str) -> Result<StoreHandle> {
    let path = match url.split_once(':') {
        Some(("json", path)) => path,
        Some((scheme, _)) => bail!("unsupported store scheme '{}'", scheme),
        None => url,
    };
    Ok(Arc::new(MemoryStore::load_jsonl(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_story;
    use std::io::Write;

    fn two_story_store() -> MemoryStore {
        let mut second = sample_story();
        second.id = 2;
        second.author = "Bob".to_string();
        second.series.clear();
        MemoryStore::new(vec![sample_story(), second])
    }

    #[test]
    fn counts_and_pagination() {
        let store = two_story_store();
        assert_eq!(store.story_count().unwrap(), 2);

        let first_page = store.story_keys_page(None, 1).unwrap();
        assert_eq!(first_page.len(), 1);
        let second_page = store.story_keys_page(Some(&first_page[0]), 10).unwrap();
        assert_eq!(second_page.len(), 1);
        assert_ne!(first_page[0], second_page[0]);
        let empty = store.story_keys_page(Some(&second_page[0]), 10).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn tag_index_is_explicit_only() {
        let store = two_story_store();
        // "Fluff" is implied on the fixture story
        assert!(store
            .stories_for_tag(TagKind::Genre, "Fluff")
            .unwrap()
            .is_empty());
        assert_eq!(
            store.stories_for_tag(TagKind::Genre, "Romance").unwrap().len(),
            2
        );
    }

    #[test]
    fn author_and_category_lookup() {
        let store = two_story_store();
        let authors = store.authors().unwrap();
        assert_eq!(authors.len(), 2);
        let alice = AuthorKey {
            publisher: "Demo".to_string(),
            name: "Alice".to_string(),
        };
        assert_eq!(store.stories_for_author(&alice).unwrap().len(), 1);
        let cat = CategoryKey {
            publisher: "Demo".to_string(),
            name: "Example Fandom".to_string(),
        };
        assert_eq!(store.stories_for_category(&cat).unwrap().len(), 2);
    }

    #[test]
    fn series_members_are_ordered() {
        let mut one = sample_story();
        one.id = 10;
        one.series[0].index = 2;
        let mut two = sample_story();
        two.id = 11;
        two.series[0].index = 1;
        let store = MemoryStore::new(vec![one, two]);
        let key = SeriesKey {
            publisher: "Demo".to_string(),
            name: "Winter".to_string(),
        };
        let members = store.series_members(&key).unwrap();
        assert_eq!(members[0].1, 1);
        assert_eq!(members[0].0.id, 11);
        assert_eq!(members[1].1, 2);
    }

    #[test]
    fn load_jsonl_skips_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let good = serde_json::to_string(&sample_story()).unwrap();
        writeln!(file, "{}", good).unwrap();
        writeln!(file, "not json at all").unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let store = MemoryStore::load_jsonl(file.path().to_str().unwrap()).unwrap();
        assert_eq!(store.story_count().unwrap(), 1);
    }

    #[test]
    fn open_store_rejects_unknown_scheme() {
        assert!(open_store("postgres://nope").is_err());
    }

    #[test]
    fn summary_has_no_chapter_bodies() {
        let store = two_story_store();
        let key = StoryKey {
            publisher: "Demo".to_string(),
            id: 1,
        };
        let summary = store.get_story_summary(&key).unwrap().unwrap();
        assert_eq!(summary.num_chapters, 2);
        assert!(summary.total_words > 0);
    }
}
