//! Cross-reference aggregation for the build.
//!
//! Phase 1 workers send one [`StoryObservation`] per story into a bounded
//! channel; a single reducer thread folds them into the [`Aggregator`].
//! At the end of the phase the aggregator is sealed into an immutable
//! [`AggregateSnapshot`] that later phases read from.
//!
//! All state is commutative (counters, histograms, sets), so worker
//! ordering never matters. Names are interned to `u32` symbols and all
//! maps are flat symbol-keyed tables; no object graphs are retained.

use chrono::{Datelike, NaiveDate};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::models::{StorySummary, TagKind};

pub type Sym = u32;

/// Interned string table. Symbols are only meaningful together with the
/// interner that produced them.
#[derive(Default)]
pub struct Interner {
    names: Vec<String>,
    lookup: FxHashMap<String, Sym>,
}

impl Interner {
    pub fn intern(&mut self, name: &str) -> Sym {
        if let Some(&sym) = self.lookup.get(name) {
            return sym;
        }
        let sym = self.names.len() as Sym;
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), sym);
        sym
    }

    pub fn get(&self, name: &str) -> Option<Sym> {
        self.lookup.get(name).copied()
    }

    pub fn resolve(&self, sym: Sym) -> &str {
        &self.names[sym as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Identifies one aggregation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Global,
    Publisher(Sym),
    Author { publisher: Sym, name: Sym },
    Tag { kind: TagKind, name: Sym },
    Category { publisher: Sym, name: Sym },
    Series { publisher: Sym, name: Sym },
}

/// Borrowed scope address used for snapshot lookups.
#[derive(Debug, Clone, Copy)]
pub enum ScopeRef<'a> {
    Global,
    Publisher(&'a str),
    Author { publisher: &'a str, name: &'a str },
    Tag { kind: TagKind, name: &'a str },
    Category { publisher: &'a str, name: &'a str },
    Series { publisher: &'a str, name: &'a str },
}

/// Month key: `year * 12 + month0`.
fn month_key(date: NaiveDate) -> u32 {
    date.year() as u32 * 12 + date.month0()
}

fn month_label(key: u32) -> String {
    format!("{:04}-{:02}", key / 12, key % 12 + 1)
}

#[derive(Default)]
struct ScopeAccum {
    stories: u64,
    words: u64,
    chapters: u64,
    /// month -> (published count, updated count)
    months: FxHashMap<u32, (u64, u64)>,
}

impl ScopeAccum {
    fn observe(&mut self, summary: &StorySummary) {
        self.stories += 1;
        self.words += summary.total_words;
        self.chapters += u64::from(summary.num_chapters);
        self.months.entry(month_key(summary.published)).or_default().0 += 1;
        self.months.entry(month_key(summary.updated)).or_default().1 += 1;
    }
}

/// Per-scope counts exposed by the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeCounts {
    pub stories: u64,
    pub words: u64,
    pub chapters: u64,
}

/// Payload of a `storyupdates.json` artifact: zero-filled contiguous month
/// series of published/updated counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartData {
    pub months: Vec<String>,
    pub published: Vec<u64>,
    pub updated: Vec<u64>,
}

impl ChartData {
    fn from_months(months: &FxHashMap<u32, (u64, u64)>) -> ChartData {
        let Some(&first) = months.keys().min() else {
            return ChartData {
                months: Vec::new(),
                published: Vec::new(),
                updated: Vec::new(),
            };
        };
        let last = *months.keys().max().expect("non-empty");
        let mut data = ChartData {
            months: Vec::with_capacity((last - first + 1) as usize),
            published: Vec::with_capacity((last - first + 1) as usize),
            updated: Vec::with_capacity((last - first + 1) as usize),
        };
        for key in first..=last {
            let (published, updated) = months.get(&key).copied().unwrap_or((0, 0));
            data.months.push(month_label(key));
            data.published.push(published);
            data.updated.push(updated);
        }
        data
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

/// Incremental min/max/sum counter over integers.
#[derive(Default, Clone, Copy)]
struct IntCounter {
    count: u64,
    sum: u64,
    min: Option<u64>,
    max: Option<u64>,
}

impl IntCounter {
    fn feed(&mut self, value: u64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// Statistics over a list of stories, as shown on stats pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoryListStats {
    pub story_count: u64,
    pub total_words: u64,
    pub min_story_words: u64,
    pub max_story_words: u64,
    pub average_story_words: f64,
    pub chapter_count: u64,
    pub min_chapter_count: u64,
    pub max_chapter_count: u64,
    pub average_chapter_count: f64,
    pub min_chapter_words: u64,
    pub max_chapter_words: u64,
    pub average_chapter_words: f64,
    pub category_count: u64,
    pub total_category_count: u64,
    pub tag_count: u64,
    pub total_tag_count: u64,
    pub author_count: u64,
    pub total_author_count: u64,
    pub average_stories_per_author: f64,
    pub series_count: u64,
    pub total_series_count: u64,
}

/// Incrementally builds [`StoryListStats`] from story summaries.
#[derive(Default)]
pub struct StoryListStatCreator {
    story_words: IntCounter,
    chapter_counts: IntCounter,
    chapter_words: IntCounter,
    categories: FxHashSet<(String, String)>,
    total_categories: u64,
    tags: FxHashSet<(TagKind, String)>,
    total_tags: u64,
    authors: FxHashSet<(String, String)>,
    total_authors: u64,
    series: FxHashSet<(String, String)>,
    total_series: u64,
}

impl StoryListStatCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one story. `chapter_words` is optional because list scopes
    /// only carry summaries; the per-chapter distribution then stays empty.
    pub fn feed(&mut self, summary: &StorySummary, chapter_words: Option<&[u32]>) {
        self.story_words.feed(summary.total_words);
        self.chapter_counts.feed(u64::from(summary.num_chapters));
        if let Some(words) = chapter_words {
            for &w in words {
                self.chapter_words.feed(u64::from(w));
            }
        }
        for category in summary.explicit_categories() {
            self.categories
                .insert((summary.publisher.clone(), category.name.clone()));
            self.total_categories += 1;
        }
        for tag in summary.explicit_tags() {
            self.tags.insert((tag.kind, tag.name.clone()));
            self.total_tags += 1;
        }
        self.authors
            .insert((summary.publisher.clone(), summary.author.clone()));
        self.total_authors += 1;
        for series in &summary.series {
            self.series
                .insert((summary.publisher.clone(), series.name.clone()));
            self.total_series += 1;
        }
    }

    pub fn from_summaries<'a>(
        summaries: impl IntoIterator<Item = &'a StorySummary>,
    ) -> StoryListStats {
        let mut creator = Self::new();
        for summary in summaries {
            creator.feed(summary, None);
        }
        creator.stats()
    }

    pub fn stats(&self) -> StoryListStats {
        StoryListStats {
            story_count: self.story_words.count,
            total_words: self.story_words.sum,
            min_story_words: self.story_words.min.unwrap_or(0),
            max_story_words: self.story_words.max.unwrap_or(0),
            average_story_words: self.story_words.average(),
            chapter_count: self.chapter_counts.sum,
            min_chapter_count: self.chapter_counts.min.unwrap_or(0),
            max_chapter_count: self.chapter_counts.max.unwrap_or(0),
            average_chapter_count: self.chapter_counts.average(),
            min_chapter_words: self.chapter_words.min.unwrap_or(0),
            max_chapter_words: self.chapter_words.max.unwrap_or(0),
            average_chapter_words: self.chapter_words.average(),
            category_count: self.categories.len() as u64,
            total_category_count: self.total_categories,
            tag_count: self.tags.len() as u64,
            total_tag_count: self.total_tags,
            author_count: self.authors.len() as u64,
            total_author_count: self.total_authors,
            average_stories_per_author: if self.authors.is_empty() {
                0.0
            } else {
                self.story_words.count as f64 / self.authors.len() as f64
            },
            series_count: self.series.len() as u64,
            total_series_count: self.total_series,
        }
    }
}

/// One story as seen by the reducer.
pub struct StoryObservation {
    pub summary: StorySummary,
    pub chapter_words: Vec<u32>,
}

/// Mutable reduction state. Owned by the reducer thread during phase 1.
#[derive(Default)]
pub struct Aggregator {
    interner: Interner,
    scopes: FxHashMap<ScopeKey, ScopeAccum>,
    tag_freq: FxHashMap<(TagKind, Sym), u64>,
    /// author name -> publishers the name writes on
    author_publishers: FxHashMap<Sym, FxHashSet<Sym>>,
    /// publisher -> category -> story count
    publisher_categories: FxHashMap<Sym, FxHashMap<Sym, u64>>,
    global_stats: StoryListStatCreator,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, observation: &StoryObservation) {
        let summary = &observation.summary;
        let publisher = self.interner.intern(&summary.publisher);
        let author = self.interner.intern(&summary.author);

        self.scope_mut(ScopeKey::Global).observe(summary);
        self.scope_mut(ScopeKey::Publisher(publisher)).observe(summary);
        self.scope_mut(ScopeKey::Author {
            publisher,
            name: author,
        })
        .observe(summary);

        self.author_publishers
            .entry(author)
            .or_default()
            .insert(publisher);

        for tag in summary.explicit_tags() {
            let name = self.interner.intern(&tag.name);
            self.scope_mut(ScopeKey::Tag {
                kind: tag.kind,
                name,
            })
            .observe(summary);
            *self.tag_freq.entry((tag.kind, name)).or_default() += 1;
        }
        for category in summary.explicit_categories() {
            let name = self.interner.intern(&category.name);
            self.scope_mut(ScopeKey::Category { publisher, name })
                .observe(summary);
            *self
                .publisher_categories
                .entry(publisher)
                .or_default()
                .entry(name)
                .or_default() += 1;
        }
        for series in &summary.series {
            let name = self.interner.intern(&series.name);
            self.scope_mut(ScopeKey::Series { publisher, name })
                .observe(summary);
        }

        self.global_stats
            .feed(summary, Some(&observation.chapter_words));
    }

    fn scope_mut(&mut self, key: ScopeKey) -> &mut ScopeAccum {
        self.scopes.entry(key).or_default()
    }

    /// Freeze into the snapshot later phases read from.
    pub fn seal(self) -> AggregateSnapshot {
        AggregateSnapshot {
            global_stats: self.global_stats.stats(),
            interner: self.interner,
            scopes: self.scopes,
            tag_freq: self.tag_freq,
            author_publishers: self.author_publishers,
            publisher_categories: self.publisher_categories,
        }
    }
}

/// Immutable aggregation results, shared by reference with every worker in
/// phases 2-6.
pub struct AggregateSnapshot {
    interner: Interner,
    scopes: FxHashMap<ScopeKey, ScopeAccum>,
    tag_freq: FxHashMap<(TagKind, Sym), u64>,
    author_publishers: FxHashMap<Sym, FxHashSet<Sym>>,
    publisher_categories: FxHashMap<Sym, FxHashMap<Sym, u64>>,
    global_stats: StoryListStats,
}

impl AggregateSnapshot {
    /// An empty snapshot, used when story aggregation is skipped.
    pub fn empty() -> Self {
        Aggregator::new().seal()
    }

    fn resolve_scope(&self, scope: ScopeRef<'_>) -> Option<ScopeKey> {
        let get = |name: &str| self.interner.get(name);
        Some(match scope {
            ScopeRef::Global => ScopeKey::Global,
            ScopeRef::Publisher(name) => ScopeKey::Publisher(get(name)?),
            ScopeRef::Author { publisher, name } => ScopeKey::Author {
                publisher: get(publisher)?,
                name: get(name)?,
            },
            ScopeRef::Tag { kind, name } => ScopeKey::Tag {
                kind,
                name: get(name)?,
            },
            ScopeRef::Category { publisher, name } => ScopeKey::Category {
                publisher: get(publisher)?,
                name: get(name)?,
            },
            ScopeRef::Series { publisher, name } => ScopeKey::Series {
                publisher: get(publisher)?,
                name: get(name)?,
            },
        })
    }

    pub fn counts(&self, scope: ScopeRef<'_>) -> Option<ScopeCounts> {
        let key = self.resolve_scope(scope)?;
        self.scopes.get(&key).map(|accum| ScopeCounts {
            stories: accum.stories,
            words: accum.words,
            chapters: accum.chapters,
        })
    }

    /// Chart data for a scope; empty series when the scope was never seen.
    pub fn chart(&self, scope: ScopeRef<'_>) -> ChartData {
        match self
            .resolve_scope(scope)
            .and_then(|key| self.scopes.get(&key))
        {
            Some(accum) => ChartData::from_months(&accum.months),
            None => ChartData::from_months(&FxHashMap::default()),
        }
    }

    /// Other publishers an author name also writes on, sorted.
    pub fn alt_publishers(&self, author_name: &str, own_publisher: &str) -> Vec<String> {
        let Some(name) = self.interner.get(author_name) else {
            return Vec::new();
        };
        let Some(publishers) = self.author_publishers.get(&name) else {
            return Vec::new();
        };
        let mut out: Vec<String> = publishers
            .iter()
            .map(|&sym| self.interner.resolve(sym).to_string())
            .filter(|p| p != own_publisher)
            .collect();
        out.sort();
        out
    }

    /// Categories of a publisher with story counts, most stories first.
    pub fn publisher_categories(&self, publisher: &str) -> Vec<(String, u64)> {
        let Some(publisher) = self.interner.get(publisher) else {
            return Vec::new();
        };
        let Some(rollup) = self.publisher_categories.get(&publisher) else {
            return Vec::new();
        };
        let mut out: Vec<(String, u64)> = rollup
            .iter()
            .map(|(&name, &count)| (self.interner.resolve(name).to_string(), count))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Most-used tags across the whole dump.
    pub fn top_tags(&self, limit: usize) -> Vec<(TagKind, String, u64)> {
        let mut all: Vec<(TagKind, String, u64)> = self
            .tag_freq
            .iter()
            .map(|(&(kind, name), &count)| (kind, self.interner.resolve(name).to_string(), count))
            .collect();
        all.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.1.cmp(&b.1)));
        all.truncate(limit);
        all
    }

    pub fn global_stats(&self) -> &StoryListStats {
        &self.global_stats
    }

    /// Size profile of the aggregation tables, for the memory profile
    /// dump requested with `--memprofile-directory`.
    pub fn profile(&self) -> SnapshotProfile {
        SnapshotProfile {
            interned_names: self.interner.len(),
            interned_bytes: self.interner.names.iter().map(String::len).sum(),
            scopes: self.scopes.len(),
            month_buckets: self.scopes.values().map(|s| s.months.len()).sum(),
            tag_entries: self.tag_freq.len(),
            author_names: self.author_publishers.len(),
        }
    }
}

/// Rough memory footprint of a sealed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotProfile {
    pub interned_names: usize,
    pub interned_bytes: usize,
    pub scopes: usize,
    pub month_buckets: usize,
    pub tag_entries: usize,
    pub author_names: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{date, sample_story};

    fn observe_sample(aggregator: &mut Aggregator) {
        let story = sample_story();
        aggregator.observe(&StoryObservation {
            chapter_words: story.chapters.iter().map(|c| c.num_words).collect(),
            summary: story.summarize(),
        });
    }

    #[test]
    fn interner_round_trips() {
        let mut interner = Interner::default();
        let a = interner.intern("alpha");
        let b = interner.intern("beta");
        assert_ne!(a, b);
        assert_eq!(interner.intern("alpha"), a);
        assert_eq!(interner.resolve(b), "beta");
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn month_labels() {
        assert_eq!(month_label(month_key(date(2019, 1, 5))), "2019-01");
        assert_eq!(month_label(month_key(date(2019, 12, 31))), "2019-12");
    }

    #[test]
    fn chart_is_contiguous_and_zero_filled() {
        let mut aggregator = Aggregator::new();
        observe_sample(&mut aggregator);
        let snapshot = aggregator.seal();
        let chart = snapshot.chart(ScopeRef::Publisher("Demo"));
        // published 2019-01, updated 2019-03: three months, middle zero
        assert_eq!(chart.months, vec!["2019-01", "2019-02", "2019-03"]);
        assert_eq!(chart.published, vec![1, 0, 0]);
        assert_eq!(chart.updated, vec![0, 0, 1]);
        assert_eq!(chart.months.len(), chart.published.len());
        assert_eq!(chart.months.len(), chart.updated.len());
    }

    #[test]
    fn unknown_scope_has_empty_chart_and_no_counts() {
        let snapshot = AggregateSnapshot::empty();
        assert!(snapshot.chart(ScopeRef::Publisher("nope")).is_empty());
        assert!(snapshot.counts(ScopeRef::Publisher("nope")).is_none());
    }

    #[test]
    fn scope_counts_accumulate() {
        let mut aggregator = Aggregator::new();
        observe_sample(&mut aggregator);
        observe_sample(&mut aggregator);
        let snapshot = aggregator.seal();
        let counts = snapshot.counts(ScopeRef::Global).unwrap();
        assert_eq!(counts.stories, 2);
        assert_eq!(counts.chapters, 4);
        let tag_counts = snapshot
            .counts(ScopeRef::Tag {
                kind: TagKind::Genre,
                name: "Romance",
            })
            .unwrap();
        assert_eq!(tag_counts.stories, 2);
        // implied tags do not create scopes
        assert!(snapshot
            .counts(ScopeRef::Tag {
                kind: TagKind::Genre,
                name: "Fluff",
            })
            .is_none());
    }

    #[test]
    fn alt_publishers_cross_reference() {
        let mut aggregator = Aggregator::new();
        observe_sample(&mut aggregator);
        let mut other = sample_story();
        other.publisher = "OtherSite".to_string();
        let words: Vec<u32> = other.chapters.iter().map(|c| c.num_words).collect();
        aggregator.observe(&StoryObservation {
            summary: other.summarize(),
            chapter_words: words,
        });
        let snapshot = aggregator.seal();
        assert_eq!(
            snapshot.alt_publishers("Alice", "Demo"),
            vec!["OtherSite".to_string()]
        );
        assert!(snapshot.alt_publishers("Alice", "OtherSite").contains(&"Demo".to_string()));
        assert!(snapshot.alt_publishers("Nobody", "Demo").is_empty());
    }

    #[test]
    fn publisher_category_rollup() {
        let mut aggregator = Aggregator::new();
        observe_sample(&mut aggregator);
        observe_sample(&mut aggregator);
        let snapshot = aggregator.seal();
        assert_eq!(
            snapshot.publisher_categories("Demo"),
            vec![("Example Fandom".to_string(), 2)]
        );
    }

    #[test]
    fn global_stats_from_observations() {
        let mut aggregator = Aggregator::new();
        observe_sample(&mut aggregator);
        let snapshot = aggregator.seal();
        let stats = snapshot.global_stats();
        assert_eq!(stats.story_count, 1);
        assert_eq!(stats.chapter_count, 2);
        assert_eq!(stats.author_count, 1);
        assert_eq!(stats.series_count, 1);
        assert!(stats.min_chapter_words > 0);
        assert!(stats.max_story_words >= stats.min_story_words);
    }

    #[test]
    fn stat_creator_from_summaries() {
        let story = sample_story();
        let mut second = sample_story();
        second.id = 2;
        second.author = "Bob".to_string();
        let summaries = vec![story.summarize(), second.summarize()];
        let stats = StoryListStatCreator::from_summaries(summaries.iter());
        assert_eq!(stats.story_count, 2);
        assert_eq!(stats.author_count, 2);
        assert_eq!(stats.average_stories_per_author, 1.0);
        // summaries carry no chapter word distribution
        assert_eq!(stats.min_chapter_words, 0);
    }

    #[test]
    fn top_tags_ordered_by_count() {
        let mut aggregator = Aggregator::new();
        observe_sample(&mut aggregator);
        let mut other = sample_story();
        other.id = 5;
        other.tags.retain(|t| t.name == "Romance");
        let words: Vec<u32> = other.chapters.iter().map(|c| c.num_words).collect();
        aggregator.observe(&StoryObservation {
            summary: other.summarize(),
            chapter_words: words,
        });
        let snapshot = aggregator.seal();
        let top = snapshot.top_tags(2);
        assert_eq!(top[0].1, "Romance");
        assert_eq!(top[0].2, 2);
    }
}
