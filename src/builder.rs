//! Build orchestration: phases, worker pools, the writer thread and the
//! aggregation reducer.
//!
//! The builder owns the lifecycle: it streams jobs phase by phase into a
//! bounded channel, fans them out to render workers, funnels artifacts
//! through the bounded writer queue into the ZIM writer thread, and seals
//! the phase-1 aggregation into the snapshot every later phase reads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::aggregate::{AggregateSnapshot, Aggregator, StoryObservation};
use crate::config::{MAX_CONTRIBUTION_BACKLOG, MAX_OUTSTANDING_JOBS};
use crate::config::{SEARCH_MAX_STORIES, SEARCH_MIN_STORIES, SEARCH_SHARD_SIZE};
use crate::error::{BuildError, BuildResult};
use crate::plan::{JobPlanner, Phase};
use crate::queue::{artifact_queue, Payload};
use crate::search::SearchIndexEmitter;
use crate::stats::{BuildStats, BuildStatsReport};
use crate::store::StoreHandle;
use crate::templates::RenderOptions;
use crate::util::{format_size, format_timedelta};
use crate::worker::{run_worker, WorkerContext};
use crate::zim::{ZimMetadata, ZimWriter, ZimWriterReport};

/// Cooperative cancellation flag, flipped by the SIGINT handler or by the
/// first fatal error. Workers poll it between jobs; in-flight jobs run to
/// completion.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options of one build run.
#[derive(Clone)]
pub struct BuildOptions {
    /// Number of render workers. The writer thread is separate.
    pub workers: usize,
    /// Accepted for CLI compatibility; workers are always OS threads here.
    pub use_threads: bool,
    pub skip_stories: bool,
    pub render: RenderOptions,
    pub search_shard_size: usize,
    pub search_min_stories: usize,
    pub search_max_stories: usize,
    pub metadata: ZimMetadata,
    pub log_directory: Option<PathBuf>,
    pub memprofile_directory: Option<PathBuf>,
    /// Hide progress bars (tests, non-tty logs).
    pub quiet: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            workers: default_workers(),
            use_threads: false,
            skip_stories: false,
            render: RenderOptions::default(),
            search_shard_size: SEARCH_SHARD_SIZE,
            search_min_stories: SEARCH_MIN_STORIES,
            search_max_stories: SEARCH_MAX_STORIES,
            metadata: ZimMetadata::default(),
            log_directory: None,
            memprofile_directory: None,
            quiet: false,
        }
    }
}

impl BuildOptions {
    pub fn search_emitter(&self) -> SearchIndexEmitter {
        SearchIndexEmitter {
            shard_size: self.search_shard_size,
            min_stories: self.search_min_stories,
            max_stories: self.search_max_stories,
        }
    }
}

/// One core is left for the writer thread.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Final outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub stats: BuildStatsReport,
    pub zim: ZimWriterReport,
    pub elapsed_secs: u64,
}

/// Build a ZIM at `outpath` from the given store.
pub fn build(
    store: StoreHandle,
    outpath: &Path,
    options: BuildOptions,
    cancel: CancelToken,
) -> BuildResult<BuildReport> {
    let start = Instant::now();
    let options = Arc::new(options);
    let stats = Arc::new(BuildStats::new());
    let planner = JobPlanner::new(Arc::clone(&store));

    info!(
        out = %outpath.display(),
        workers = options.workers,
        "starting ZIM build"
    );
    if options.use_threads {
        info!("--threaded requested; workers always run as threads in this build");
    }
    planner.check_slugs()?;

    // Writer thread: single consumer of the artifact queue.
    let mut writer = ZimWriter::create(outpath, &options.metadata)?;
    writer.set_main_path("");
    let (artifact_tx, artifact_rx) = artifact_queue(options.workers);
    let writer_stats = Arc::clone(&stats);
    let writer_cancel = cancel.clone();
    let writer_handle = thread::Builder::new()
        .name("zim-writer".to_string())
        .spawn(move || -> BuildResult<ZimWriter> {
            for artifact in artifact_rx {
                if writer_cancel.is_cancelled() {
                    // keep draining so blocked producers can exit
                    continue;
                }
                let bytes = artifact.content_len() as u64;
                let redirect = matches!(&artifact.payload, Payload::Redirect { .. });
                match writer.add(&artifact) {
                    Ok(()) => writer_stats.add_artifact_written(bytes, redirect),
                    Err(err) => {
                        writer_cancel.cancel();
                        return Err(err);
                    }
                }
            }
            if writer_cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            Ok(writer)
        })
        .map_err(|e| BuildError::Write(format!("cannot spawn writer thread: {}", e)))?;

    // Phase 1 aggregation reducer.
    let (contrib_tx, contrib_rx) = sync_channel::<StoryObservation>(MAX_CONTRIBUTION_BACKLOG);
    let reducer_handle = thread::Builder::new()
        .name("aggregator".to_string())
        .spawn(move || {
            let mut aggregator = Aggregator::new();
            for observation in contrib_rx {
                aggregator.observe(&observation);
            }
            aggregator
        })
        .map_err(|e| BuildError::Write(format!("cannot spawn reducer thread: {}", e)))?;
    let mut reducer_handle = Some(reducer_handle);
    let mut contrib_tx = Some(contrib_tx);

    let mut snapshot = Arc::new(AggregateSnapshot::empty());
    let mut phase_error: Option<BuildError> = None;

    for phase in Phase::ALL {
        if cancel.is_cancelled() {
            phase_error.get_or_insert(BuildError::Cancelled);
            break;
        }
        let result = run_phase(
            &planner,
            phase,
            &store,
            &artifact_tx,
            &stats,
            &snapshot,
            &options,
            contrib_tx.clone(),
            &cancel,
        );
        if phase == Phase::Stories {
            // Seal the aggregation: drop our sender (worker clones are
            // gone after the join inside run_phase) and collect.
            contrib_tx = None;
            if let Some(handle) = reducer_handle.take() {
                let aggregator = handle
                    .join()
                    .map_err(|_| BuildError::Write("aggregator thread panicked".to_string()))?;
                snapshot = Arc::new(aggregator.seal());
                info!(profile = ?snapshot.profile(), "sealed aggregation snapshot");
            }
        }
        if let Err(err) = result {
            cancel.cancel();
            phase_error.get_or_insert(err);
            break;
        }
    }

    // Close the artifact queue and collect the writer.
    drop(artifact_tx);
    drop(contrib_tx);
    if let Some(handle) = reducer_handle.take() {
        let _ = handle.join();
    }
    let writer_result = writer_handle
        .join()
        .map_err(|_| BuildError::Write("writer thread panicked".to_string()))?;

    if let Some(err) = phase_error {
        // writer (if it survived) is dropped here, removing the partial file
        return Err(err);
    }
    let writer = writer_result?;
    let zim = writer.finish()?;

    let elapsed_secs = start.elapsed().as_secs();
    let report = BuildReport {
        stats: stats.report(),
        zim,
        elapsed_secs,
    };
    write_reports(options.as_ref(), &snapshot, &report);
    info!(
        elapsed = %format_timedelta(elapsed_secs),
        size = %format_size(zim.file_bytes),
        artifacts = report.stats.artifacts_written,
        skipped = report.stats.stories_skipped,
        failed = report.stats.artifacts_failed,
        "build finished"
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn run_phase(
    planner: &JobPlanner,
    phase: Phase,
    store: &StoreHandle,
    artifact_tx: &crate::queue::ArtifactSender,
    stats: &Arc<BuildStats>,
    snapshot: &Arc<AggregateSnapshot>,
    options: &Arc<BuildOptions>,
    contributions: Option<std::sync::mpsc::SyncSender<StoryObservation>>,
    cancel: &CancelToken,
) -> BuildResult<()> {
    let n_jobs = planner.job_count(phase)?;
    info!(phase = phase.name(), jobs = n_jobs, "starting phase");
    let progress = if options.quiet {
        None
    } else {
        let bar = ProgressBar::new(n_jobs);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:>12} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(phase.name());
        Some(bar)
    };

    let (job_tx, job_rx) = sync_channel(MAX_OUTSTANDING_JOBS);
    let job_rx = Arc::new(Mutex::new(job_rx));

    let contributions = if phase == Phase::Stories {
        contributions
    } else {
        None
    };
    let mut handles = Vec::with_capacity(options.workers);
    for i in 0..options.workers {
        let ctx = WorkerContext {
            store: Arc::clone(store),
            artifacts: artifact_tx.clone(),
            stats: Arc::clone(stats),
            snapshot: Arc::clone(snapshot),
            options: Arc::clone(options),
            contributions: contributions.clone(),
            cancel: cancel.clone(),
            progress: progress.clone(),
        };
        let jobs = Arc::clone(&job_rx);
        let handle = thread::Builder::new()
            .name(format!("render-{}", i))
            .spawn(move || run_worker(ctx, jobs))
            .map_err(|e| BuildError::Write(format!("cannot spawn worker: {}", e)))?;
        handles.push(handle);
    }
    // workers own the only receiver clones from here on, so a dead pool
    // unblocks the planner's send
    drop(job_rx);
    drop(contributions);

    let send_result = planner.stream_phase(phase, &mut |job| {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        job_tx
            .send(job)
            .map_err(|_| BuildError::Write("job queue closed".to_string()))
    });
    drop(job_tx);

    let mut worker_error = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                worker_error.get_or_insert(err);
            }
            Err(_) => {
                worker_error.get_or_insert(BuildError::Write("worker panicked".to_string()));
            }
        }
    }
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    // a worker failure explains a failed send; report the root cause
    if let Some(err) = worker_error {
        return Err(err);
    }
    send_result?;
    info!(phase = phase.name(), "phase complete");
    Ok(())
}

fn write_reports(options: &BuildOptions, snapshot: &AggregateSnapshot, report: &BuildReport) {
    if let Some(dir) = &options.log_directory {
        let path = dir.join("build_report.json");
        let payload = serde_json::json!({
            "stats": report.stats,
            "zim": {
                "entries": report.zim.entries,
                "redirects": report.zim.redirects,
                "clusters": report.zim.clusters,
                "content_bytes": report.zim.content_bytes,
                "file_bytes": report.zim.file_bytes,
            },
            "elapsed_secs": report.elapsed_secs,
        });
        if let Err(err) = std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(&path, serde_json::to_vec_pretty(&payload).unwrap_or_default()))
        {
            warn!(error = %err, path = %path.display(), "could not write build report");
        }
    }
    if let Some(dir) = &options.memprofile_directory {
        let path = dir.join("aggregate_profile.json");
        if let Err(err) = std::fs::create_dir_all(dir).and_then(|_| {
            std::fs::write(
                &path,
                serde_json::to_vec_pretty(&snapshot.profile()).unwrap_or_default(),
            )
        }) {
            warn!(error = %err, path = %path.display(), "could not write memory profile");
        }
    }
}
