use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};
use crate::util::count_words;

/// Kind of a tag attached to a story.
///
/// Category is modeled as a tag kind too, but category pages are scoped by
/// publisher and rendered under `category/` instead of `tag/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Category,
    Warning,
    Relationship,
    Character,
    Genre,
    Rating,
    Language,
    Status,
    Publisher,
    Series,
    Special,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Category => "category",
            TagKind::Warning => "warning",
            TagKind::Relationship => "relationship",
            TagKind::Character => "character",
            TagKind::Genre => "genre",
            TagKind::Rating => "rating",
            TagKind::Language => "language",
            TagKind::Status => "status",
            TagKind::Publisher => "publisher",
            TagKind::Series => "series",
            TagKind::Special => "special",
        }
    }

    /// Kinds surfaced in a story card's tag row. The others duplicate
    /// first-class story fields (rating, language, status, ...) and are
    /// only browsable through their own tag pages.
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            TagKind::Warning | TagKind::Relationship | TagKind::Character | TagKind::Genre
        )
    }
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TagKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" => Ok(TagKind::Category),
            "warning" => Ok(TagKind::Warning),
            "relationship" => Ok(TagKind::Relationship),
            "character" => Ok(TagKind::Character),
            "genre" => Ok(TagKind::Genre),
            "rating" => Ok(TagKind::Rating),
            "language" => Ok(TagKind::Language),
            "status" => Ok(TagKind::Status),
            "publisher" => Ok(TagKind::Publisher),
            "series" => Ok(TagKind::Series),
            "special" => Ok(TagKind::Special),
            other => Err(format!("unknown tag kind '{}'", other)),
        }
    }
}

/// Completion status of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Ongoing,
    Completed,
    Abandoned,
    Unknown,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Ongoing => "Ongoing",
            StoryStatus::Completed => "Completed",
            StoryStatus::Abandoned => "Abandoned",
            StoryStatus::Unknown => "Unknown",
        }
    }
}

/// A tag attached to one story. The same tag name may be attached both
/// explicitly and implied; the store collapses that to explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub kind: TagKind,
    pub name: String,
    #[serde(default)]
    pub implied: bool,
}

/// A category attached to one story. The category's publisher is the
/// story's publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
    #[serde(default)]
    pub implied: bool,
}

/// Membership of a story in a series, with its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRef {
    pub name: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoryKey {
    pub publisher: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorKey {
    pub publisher: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryKey {
    pub publisher: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub publisher: String,
    pub name: String,
}

/// One chapter of a story, ordered by `index` starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    pub text: String,
    /// Word count as determined at import time.
    pub num_words: u32,
}

impl Chapter {
    pub fn new(index: u32, title: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let num_words = count_words(&text);
        Chapter {
            index,
            title: title.into(),
            text,
            num_words,
        }
    }
}

/// A story with full chapter bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub publisher: String,
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub url: String,
    pub summary: String,
    pub language: String,
    pub status: StoryStatus,
    #[serde(default)]
    pub rating: Option<String>,
    pub published: NaiveDate,
    pub updated: NaiveDate,
    pub packaged: NaiveDate,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub source_group: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub series: Vec<SeriesRef>,
}

impl Story {
    pub fn key(&self) -> StoryKey {
        StoryKey {
            publisher: self.publisher.clone(),
            id: self.id,
        }
    }

    pub fn author_key(&self) -> AuthorKey {
        AuthorKey {
            publisher: self.publisher.clone(),
            name: self.author.clone(),
        }
    }

    pub fn total_words(&self) -> u64 {
        self.chapters.iter().map(|c| u64::from(c.num_words)).sum()
    }

    /// Title-cased rating, or "Unknown" when the archive did not record one.
    pub fn rating_title(&self) -> String {
        rating_title(self.rating.as_deref())
    }

    pub fn explicit_tags(&self) -> impl Iterator<Item = &TagRef> {
        self.tags.iter().filter(|t| !t.implied)
    }

    pub fn implied_tags(&self) -> impl Iterator<Item = &TagRef> {
        self.tags.iter().filter(|t| t.implied)
    }

    pub fn explicit_categories(&self) -> impl Iterator<Item = &CategoryRef> {
        self.categories.iter().filter(|c| !c.implied)
    }

    pub fn implied_categories(&self) -> impl Iterator<Item = &CategoryRef> {
        self.categories.iter().filter(|c| c.implied)
    }

    /// Explicit visible tags in display order.
    pub fn ordered_visible_tags(&self) -> Vec<&TagRef> {
        ordered_visible(self.explicit_tags())
    }

    /// Check the structural invariants the renderer relies on. Violations
    /// are input corruption: the story is dropped and counted, never fixed
    /// up silently.
    pub fn validate(&self) -> BuildResult<()> {
        let corrupt = |reason: &str| BuildError::InputCorruption {
            publisher: self.publisher.clone(),
            id: self.id,
            reason: reason.to_string(),
        };
        if self.title.is_empty() {
            return Err(corrupt("empty title"));
        }
        if self.author.is_empty() {
            return Err(corrupt("empty author name"));
        }
        if self.chapters.is_empty() {
            return Err(corrupt("story has no chapters"));
        }
        for (i, chapter) in self.chapters.iter().enumerate() {
            if chapter.index != (i + 1) as u32 {
                return Err(corrupt("chapter indices are not contiguous from 1"));
            }
        }
        Ok(())
    }

    /// Project to the chapterless summary used by list pages and search.
    pub fn summarize(&self) -> StorySummary {
        StorySummary {
            publisher: self.publisher.clone(),
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
            summary: self.summary.clone(),
            language: self.language.clone(),
            status: self.status,
            rating: self.rating.clone(),
            published: self.published,
            updated: self.updated,
            score: self.score,
            total_words: self.total_words(),
            num_chapters: self.chapters.len() as u32,
            tags: self.tags.clone(),
            categories: self.categories.clone(),
            series: self.series.clone(),
        }
    }
}

/// A story without chapter bodies, with cached totals. Everything list
/// pages, story cards and the search emitter need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySummary {
    pub publisher: String,
    pub id: i64,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub language: String,
    pub status: StoryStatus,
    pub rating: Option<String>,
    pub published: NaiveDate,
    pub updated: NaiveDate,
    pub score: i64,
    pub total_words: u64,
    pub num_chapters: u32,
    pub tags: Vec<TagRef>,
    pub categories: Vec<CategoryRef>,
    pub series: Vec<SeriesRef>,
}

impl StorySummary {
    pub fn key(&self) -> StoryKey {
        StoryKey {
            publisher: self.publisher.clone(),
            id: self.id,
        }
    }

    pub fn rating_title(&self) -> String {
        rating_title(self.rating.as_deref())
    }

    pub fn explicit_tags(&self) -> impl Iterator<Item = &TagRef> {
        self.tags.iter().filter(|t| !t.implied)
    }

    pub fn implied_tags(&self) -> impl Iterator<Item = &TagRef> {
        self.tags.iter().filter(|t| t.implied)
    }

    pub fn explicit_categories(&self) -> impl Iterator<Item = &CategoryRef> {
        self.categories.iter().filter(|c| !c.implied)
    }

    pub fn implied_categories(&self) -> impl Iterator<Item = &CategoryRef> {
        self.categories.iter().filter(|c| c.implied)
    }

    pub fn ordered_visible_tags(&self) -> Vec<&TagRef> {
        ordered_visible(self.explicit_tags())
    }
}

/// Warnings, then relationships, then characters, then genres (the AO3
/// ordering), names sorted within a kind.
fn ordered_visible<'a>(tags: impl Iterator<Item = &'a TagRef>) -> Vec<&'a TagRef> {
    let mut visible: Vec<&TagRef> = tags.filter(|t| t.kind.is_visible()).collect();
    visible.sort_by(|a, b| {
        visible_rank(a.kind)
            .cmp(&visible_rank(b.kind))
            .then_with(|| a.name.cmp(&b.name))
    });
    visible
}

fn visible_rank(kind: TagKind) -> u8 {
    match kind {
        TagKind::Warning => 0,
        TagKind::Relationship => 1,
        TagKind::Character => 2,
        TagKind::Genre => 3,
        _ => 4,
    }
}

fn rating_title(rating: Option<&str>) -> String {
    match rating {
        None => "Unknown".to_string(),
        Some(r) => {
            let mut out = String::with_capacity(r.len());
            let mut at_word_start = true;
            for c in r.chars() {
                if c.is_whitespace() {
                    at_word_start = true;
                    out.push(c);
                } else if at_word_start {
                    out.extend(c.to_uppercase());
                    at_word_start = false;
                } else {
                    out.extend(c.to_lowercase());
                }
            }
            out
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn sample_story() -> Story {
        Story {
            publisher: "Demo".to_string(),
            id: 1,
            title: "A Winter Tale".to_string(),
            author: "Alice".to_string(),
            url: "https://demo.example/s/1".to_string(),
            summary: "<p>Snow falls.</p>".to_string(),
            language: "English".to_string(),
            status: StoryStatus::Completed,
            rating: Some("teen and up".to_string()),
            published: date(2019, 1, 5),
            updated: date(2019, 3, 2),
            packaged: date(2020, 6, 1),
            score: 42,
            source_group: None,
            source_name: None,
            chapters: vec![
                Chapter::new(1, "One", "<p>Hello world, again and again.</p>"),
                Chapter::new(2, "Two", "<p>More words here.</p>"),
            ],
            tags: vec![
                TagRef {
                    kind: TagKind::Genre,
                    name: "Romance".to_string(),
                    implied: false,
                },
                TagRef {
                    kind: TagKind::Character,
                    name: "Alice".to_string(),
                    implied: false,
                },
                TagRef {
                    kind: TagKind::Warning,
                    name: "None".to_string(),
                    implied: false,
                },
                TagRef {
                    kind: TagKind::Genre,
                    name: "Fluff".to_string(),
                    implied: true,
                },
            ],
            categories: vec![CategoryRef {
                name: "Example Fandom".to_string(),
                implied: false,
            }],
            series: vec![SeriesRef {
                name: "Winter".to_string(),
                index: 1,
            }],
        }
    }
}
