//! Job planning: enumerating the work set phase by phase.
//!
//! Jobs within a phase touch disjoint output paths and share no mutable
//! state; anything cross-cutting comes out of the phase-1 aggregation
//! snapshot. The planner streams jobs into a bounded channel instead of
//! materializing the whole list; a full dump has millions of story keys.

use rustc_hash::FxHashMap;

use crate::config::STORIES_PER_TASK;
use crate::error::{BuildError, BuildResult};
use crate::models::{AuthorKey, CategoryKey, SeriesKey, StoryKey, TagKind};
use crate::slug;
use crate::store::StoreHandle;

/// Build phases, in execution order. Later phases read aggregates the
/// story phase produced, so phases run to completion one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stories,
    Authors,
    Series,
    TagsAndCategories,
    Publishers,
    Global,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Stories,
        Phase::Authors,
        Phase::Series,
        Phase::TagsAndCategories,
        Phase::Publishers,
        Phase::Global,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Stories => "stories",
            Phase::Authors => "authors",
            Phase::Series => "series",
            Phase::TagsAndCategories => "tags",
            Phase::Publishers => "publishers",
            Phase::Global => "global",
        }
    }
}

/// One unit of work for a render worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    StoryBatch(Vec<StoryKey>),
    Author(AuthorKey),
    Series(SeriesKey),
    Tag { kind: TagKind, name: String },
    Category(CategoryKey),
    Publisher(String),
    /// Root redirect, landing, statistics, info pages and fixed assets.
    Global,
}

pub struct JobPlanner {
    store: StoreHandle,
}

impl JobPlanner {
    pub fn new(store: StoreHandle) -> Self {
        JobPlanner { store }
    }

    /// Number of jobs a phase will produce, for progress reporting.
    pub fn job_count(&self, phase: Phase) -> BuildResult<u64> {
        let count = match phase {
            Phase::Stories => {
                let stories = self.store.story_count().map_err(store_err)?;
                stories.div_ceil(STORIES_PER_TASK as u64)
            }
            Phase::Authors => self.store.authors().map_err(store_err)?.len() as u64,
            Phase::Series => self.store.series().map_err(store_err)?.len() as u64,
            Phase::TagsAndCategories => {
                let tags = self
                    .store
                    .tags()
                    .map_err(store_err)?
                    .iter()
                    .filter(|t| t.kind != TagKind::Category)
                    .count() as u64;
                tags + self.store.categories().map_err(store_err)?.len() as u64
            }
            Phase::Publishers => self.store.publishers().map_err(store_err)?.len() as u64,
            Phase::Global => 1,
        };
        Ok(count)
    }

    /// Stream the jobs of one phase into `sink`. The sink blocks when the
    /// job queue is full, which is the planner's backpressure.
    pub fn stream_phase(
        &self,
        phase: Phase,
        sink: &mut dyn FnMut(Job) -> BuildResult<()>,
    ) -> BuildResult<()> {
        match phase {
            Phase::Stories => {
                let mut after: Option<StoryKey> = None;
                loop {
                    let page = self
                        .store
                        .story_keys_page(after.as_ref(), STORIES_PER_TASK)
                        .map_err(store_err)?;
                    if page.is_empty() {
                        break;
                    }
                    after = page.last().cloned();
                    sink(Job::StoryBatch(page))?;
                }
            }
            Phase::Authors => {
                for author in self.store.authors().map_err(store_err)? {
                    sink(Job::Author(author))?;
                }
            }
            Phase::Series => {
                for series in self.store.series().map_err(store_err)? {
                    sink(Job::Series(series))?;
                }
            }
            Phase::TagsAndCategories => {
                for tag in self.store.tags().map_err(store_err)? {
                    if tag.kind == TagKind::Category {
                        continue;
                    }
                    sink(Job::Tag {
                        kind: tag.kind,
                        name: tag.name,
                    })?;
                }
                for category in self.store.categories().map_err(store_err)? {
                    sink(Job::Category(category))?;
                }
            }
            Phase::Publishers => {
                for publisher in self.store.publishers().map_err(store_err)? {
                    sink(Job::Publisher(publisher))?;
                }
            }
            Phase::Global => {
                sink(Job::Global)?;
            }
        }
        Ok(())
    }

    /// Detect slug collisions: two distinct names in the same scope class
    /// mapping to the same URL slug would silently overwrite each other's
    /// pages, so this is a fatal plan error.
    pub fn check_slugs(&self) -> BuildResult<()> {
        let mut seen: FxHashMap<String, String> = FxHashMap::default();
        let mut check = |scope: String, name: &str| -> BuildResult<()> {
            let key = format!("{}/{}", scope, slug::normalize(name));
            match seen.get(&key) {
                Some(existing) if existing != name => Err(BuildError::Plan(format!(
                    "slug collision in {}: '{}' and '{}' both normalize to '{}'",
                    scope,
                    existing,
                    name,
                    slug::normalize(name),
                ))),
                Some(_) => Ok(()),
                None => {
                    seen.insert(key, name.to_string());
                    Ok(())
                }
            }
        };

        for tag in self.store.tags().map_err(store_err)? {
            check(format!("tag/{}", tag.kind.as_str()), &tag.name)?;
        }
        for category in self.store.categories().map_err(store_err)? {
            check(format!("category/{}", category.publisher), &category.name)?;
        }
        for author in self.store.authors().map_err(store_err)? {
            check(format!("author/{}", author.publisher), &author.name)?;
        }
        for series in self.store.series().map_err(store_err)? {
            check(format!("series/{}", series.publisher), &series.name)?;
        }
        Ok(())
    }
}

fn store_err(err: anyhow::Error) -> BuildError {
    BuildError::Store(err.to_string())
}
