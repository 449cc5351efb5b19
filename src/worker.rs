//! Render worker loop.
//!
//! Workers pull jobs from a shared bounded channel, load what they need
//! through their own store handle, render, and push artifacts into the
//! writer queue. A recoverable failure drops the affected story/artifact
//! and bumps a counter; anything else flips the cancel token and takes
//! the build down.

use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use indicatif::ProgressBar;
use tracing::{debug, warn};

use crate::aggregate::{AggregateSnapshot, ScopeRef, StoryListStatCreator, StoryObservation};
use crate::builder::{BuildOptions, CancelToken};
use crate::error::{BuildError, BuildResult};
use crate::models::{AuthorKey, CategoryKey, SeriesKey, StoryKey, StorySummary, TagKind};
use crate::pages;
use crate::plan::Job;
use crate::queue::{Artifact, ArtifactSender};
use crate::stats::BuildStats;
use crate::store::StoreHandle;

/// Everything a worker needs; cloned per worker thread.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: StoreHandle,
    pub artifacts: ArtifactSender,
    pub stats: Arc<BuildStats>,
    pub snapshot: Arc<AggregateSnapshot>,
    pub options: Arc<BuildOptions>,
    /// Present only during the story phase.
    pub contributions: Option<SyncSender<StoryObservation>>,
    pub cancel: CancelToken,
    pub progress: Option<ProgressBar>,
}

/// Run one worker until the job channel closes or the build is cancelled.
pub fn run_worker(ctx: WorkerContext, jobs: Arc<Mutex<Receiver<Job>>>) -> BuildResult<()> {
    loop {
        if ctx.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let job = {
            let guard = jobs
                .lock()
                .map_err(|_| BuildError::Write("job queue lock poisoned".to_string()))?;
            guard.recv()
        };
        let Ok(job) = job else {
            return Ok(()); // channel closed: phase complete
        };
        match process_job(&ctx, &job) {
            Ok(()) => {
                ctx.stats.inc_jobs_completed();
                if let Some(progress) = &ctx.progress {
                    progress.inc(1);
                }
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "dropping failed job output");
                ctx.stats.inc_artifacts_failed();
                ctx.stats.inc_jobs_completed();
                if let Some(progress) = &ctx.progress {
                    progress.inc(1);
                }
            }
            Err(err) => {
                ctx.cancel.cancel();
                return Err(err);
            }
        }
    }
}

fn push_all(ctx: &WorkerContext, artifacts: Vec<Artifact>) -> BuildResult<()> {
    for artifact in artifacts {
        ctx.artifacts.push(artifact)?;
    }
    Ok(())
}

fn store_err(err: anyhow::Error) -> BuildError {
    BuildError::Store(err.to_string())
}

fn process_job(ctx: &WorkerContext, job: &Job) -> BuildResult<()> {
    match job {
        Job::StoryBatch(keys) => process_story_batch(ctx, keys),
        Job::Author(key) => process_author(ctx, key),
        Job::Series(key) => process_series(ctx, key),
        Job::Tag { kind, name } => process_tag(ctx, *kind, name),
        Job::Category(key) => process_category(ctx, key),
        Job::Publisher(name) => process_publisher(ctx, name),
        Job::Global => process_global(ctx),
    }
}

fn process_story_batch(ctx: &WorkerContext, keys: &[StoryKey]) -> BuildResult<()> {
    for key in keys {
        let story = match ctx.store.get_story(key).map_err(store_err)? {
            Some(story) => story,
            None => {
                warn!(publisher = %key.publisher, id = key.id, "story vanished from store");
                ctx.stats.inc_stories_skipped();
                continue;
            }
        };
        if let Err(err) = story.validate() {
            warn!(error = %err, "skipping corrupt story");
            ctx.stats.inc_stories_skipped();
            continue;
        }
        // Aggregate even when story pages are skipped; later phases need
        // the charts and counts either way.
        if let Some(contributions) = &ctx.contributions {
            let observation = StoryObservation {
                chapter_words: story.chapters.iter().map(|c| c.num_words).collect(),
                summary: story.summarize(),
            };
            contributions
                .send(observation)
                .map_err(|_| BuildError::Write("aggregator channel closed".to_string()))?;
        }
        if ctx.options.skip_stories {
            continue;
        }
        match pages::render_story(&story, &ctx.options.render) {
            Ok(artifacts) => {
                push_all(ctx, artifacts)?;
                ctx.stats.inc_stories_rendered();
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "skipping story that failed to render");
                ctx.stats.inc_stories_skipped();
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn fetch_summaries(ctx: &WorkerContext, keys: &[StoryKey]) -> BuildResult<Vec<StorySummary>> {
    let mut summaries = Vec::with_capacity(keys.len());
    for key in keys {
        match ctx.store.get_story_summary(key).map_err(store_err)? {
            Some(summary) => summaries.push(summary),
            None => debug!(publisher = %key.publisher, id = key.id, "dangling story reference"),
        }
    }
    Ok(summaries)
}

fn process_author(ctx: &WorkerContext, key: &AuthorKey) -> BuildResult<()> {
    let keys = ctx.store.stories_for_author(key).map_err(store_err)?;
    let mut summaries = fetch_summaries(ctx, &keys)?;
    summaries.sort_by(|a, b| b.published.cmp(&a.published).then_with(|| a.key().cmp(&b.key())));
    let chart = ctx.snapshot.chart(ScopeRef::Author {
        publisher: &key.publisher,
        name: &key.name,
    });
    let alt_publishers = ctx.snapshot.alt_publishers(&key.name, &key.publisher);
    let url = ctx.store.author_url(key).map_err(store_err)?;
    let artifacts = pages::render_author(
        &key.publisher,
        &key.name,
        url.as_deref(),
        &alt_publishers,
        &summaries,
        &chart,
        &ctx.options.render,
    )?;
    push_all(ctx, artifacts)
}

fn process_series(ctx: &WorkerContext, key: &SeriesKey) -> BuildResult<()> {
    let members = ctx.store.series_members(key).map_err(store_err)?;
    let mut entries = Vec::with_capacity(members.len());
    for (story_key, index) in &members {
        if let Some(summary) = ctx.store.get_story_summary(story_key).map_err(store_err)? {
            entries.push((*index, summary));
        }
    }
    let chart = ctx.snapshot.chart(ScopeRef::Series {
        publisher: &key.publisher,
        name: &key.name,
    });
    let artifacts = pages::render_series(&key.publisher, &key.name, &entries, &chart)?;
    push_all(ctx, artifacts)
}

fn process_tag(ctx: &WorkerContext, kind: TagKind, name: &str) -> BuildResult<()> {
    let keys = ctx.store.stories_for_tag(kind, name).map_err(store_err)?;
    let mut summaries = fetch_summaries(ctx, &keys)?;
    summaries.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.key().cmp(&b.key())));
    let stats = StoryListStatCreator::from_summaries(summaries.iter());
    let chart = ctx.snapshot.chart(ScopeRef::Tag { kind, name });
    let corpus = ctx.options.search_emitter().build(&summaries);
    let artifacts = pages::render_tag(kind, name, &summaries, &stats, &chart, corpus.as_ref())?;
    push_all(ctx, artifacts)
}

fn process_category(ctx: &WorkerContext, key: &CategoryKey) -> BuildResult<()> {
    let keys = ctx.store.stories_for_category(key).map_err(store_err)?;
    let mut summaries = fetch_summaries(ctx, &keys)?;
    // best stories first: score, then length as tiebreaker
    summaries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.total_words.cmp(&a.total_words))
            .then_with(|| a.key().cmp(&b.key()))
    });
    let stats = StoryListStatCreator::from_summaries(summaries.iter());
    let chart = ctx.snapshot.chart(ScopeRef::Category {
        publisher: &key.publisher,
        name: &key.name,
    });
    let corpus = ctx.options.search_emitter().build(&summaries);
    let artifacts = pages::render_category(
        &key.publisher,
        &key.name,
        &summaries,
        &stats,
        &chart,
        corpus.as_ref(),
    )?;
    push_all(ctx, artifacts)
}

fn process_publisher(ctx: &WorkerContext, name: &str) -> BuildResult<()> {
    let counts = ctx.snapshot.counts(ScopeRef::Publisher(name));
    let categories = ctx.snapshot.publisher_categories(name);
    let chart = ctx.snapshot.chart(ScopeRef::Publisher(name));
    let artifacts = pages::render_publisher(
        name,
        counts.map(|c| c.stories).unwrap_or(0),
        counts.map(|c| c.words).unwrap_or(0),
        &categories,
        &chart,
    )?;
    push_all(ctx, artifacts)
}

fn process_global(ctx: &WorkerContext) -> BuildResult<()> {
    let mut publishers = Vec::new();
    for publisher in ctx.store.publishers().map_err(store_err)? {
        let stories = ctx
            .snapshot
            .counts(ScopeRef::Publisher(&publisher))
            .map(|c| c.stories)
            .unwrap_or(0);
        publishers.push((publisher, stories));
    }
    let chart = ctx.snapshot.chart(ScopeRef::Global);
    let mut artifacts = pages::render_global(&publishers, ctx.snapshot.global_stats(), &chart)?;
    artifacts.extend(crate::assets::asset_artifacts()?);
    push_all(ctx, artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_story;
    use crate::queue::artifact_queue;
    use crate::store::MemoryStore;
    use std::sync::mpsc::sync_channel;

    fn test_context(
        stories: Vec<crate::models::Story>,
    ) -> (WorkerContext, std::sync::mpsc::Receiver<Artifact>) {
        let (tx, rx) = artifact_queue(64);
        let ctx = WorkerContext {
            store: Arc::new(MemoryStore::new(stories)),
            artifacts: tx,
            stats: Arc::new(BuildStats::new()),
            snapshot: Arc::new(AggregateSnapshot::empty()),
            options: Arc::new(BuildOptions::default()),
            contributions: None,
            cancel: CancelToken::new(),
            progress: None,
        };
        (ctx, rx)
    }

    #[test]
    fn story_batch_renders_and_counts() {
        let (ctx, rx) = test_context(vec![sample_story()]);
        let key = StoryKey {
            publisher: "Demo".to_string(),
            id: 1,
        };
        process_story_batch(&ctx, &[key]).unwrap();
        drop(ctx.artifacts);
        let artifacts: Vec<_> = rx.iter().collect();
        assert_eq!(artifacts.len(), 5); // 2 chapters + index + preview + redirect
        assert_eq!(ctx.stats.report().stories_rendered, 1);
    }

    #[test]
    fn corrupt_story_is_skipped_not_fatal() {
        let mut story = sample_story();
        story.chapters.clear();
        // MemoryStore::new indexes it anyway; the worker must skip it
        let (ctx, rx) = test_context(vec![story]);
        let key = StoryKey {
            publisher: "Demo".to_string(),
            id: 1,
        };
        process_story_batch(&ctx, &[key]).unwrap();
        drop(ctx.artifacts);
        assert_eq!(rx.iter().count(), 0);
        assert_eq!(ctx.stats.report().stories_skipped, 1);
    }

    #[test]
    fn missing_story_is_skipped() {
        let (ctx, _rx) = test_context(vec![sample_story()]);
        let key = StoryKey {
            publisher: "Demo".to_string(),
            id: 999,
        };
        process_story_batch(&ctx, &[key]).unwrap();
        assert_eq!(ctx.stats.report().stories_skipped, 1);
    }

    #[test]
    fn skip_stories_still_contributes_observations() {
        let (mut ctx, rx) = test_context(vec![sample_story()]);
        let (contrib_tx, contrib_rx) = sync_channel(8);
        ctx.contributions = Some(contrib_tx);
        ctx.options = Arc::new(BuildOptions {
            skip_stories: true,
            ..BuildOptions::default()
        });
        let key = StoryKey {
            publisher: "Demo".to_string(),
            id: 1,
        };
        process_story_batch(&ctx, &[key]).unwrap();
        drop(ctx);
        assert_eq!(contrib_rx.iter().count(), 1);
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn worker_stops_on_cancel() {
        let (ctx, _rx) = test_context(vec![]);
        ctx.cancel.cancel();
        let (_job_tx, job_rx) = sync_channel::<Job>(1);
        let err = run_worker(ctx, Arc::new(Mutex::new(job_rx))).unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
    }

    #[test]
    fn worker_drains_queue_then_exits() {
        let (ctx, rx) = test_context(vec![sample_story()]);
        let (job_tx, job_rx) = sync_channel::<Job>(8);
        job_tx
            .send(Job::Tag {
                kind: TagKind::Genre,
                name: "Romance".to_string(),
            })
            .unwrap();
        drop(job_tx);
        run_worker(ctx.clone(), Arc::new(Mutex::new(job_rx))).unwrap();
        drop(ctx);
        let paths: Vec<String> = rx.iter().map(|a| a.path).collect();
        assert!(paths.contains(&"tag/genre/Romance/1".to_string()));
        assert!(paths.contains(&"tag/genre/Romance/stats".to_string()));
    }

    #[test]
    fn global_job_emits_fixed_layout() {
        let (ctx, rx) = test_context(vec![sample_story()]);
        process_global(&ctx).unwrap();
        drop(ctx);
        let paths: Vec<String> = rx.iter().map(|a| a.path).collect();
        for path in [
            "index.html",
            "statistics.html",
            "favicon.png",
            "style_light.css",
            "scripts/search.js",
        ] {
            assert!(paths.contains(&path.to_string()), "missing {}", path);
        }
    }
}
