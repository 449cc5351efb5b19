/// Number of stories shown on one list page (authors, tags, categories).
/// The client search script paginates results with the same constant.
pub const STORIES_PER_PAGE: usize = 20;

/// Number of categories shown on one publisher category listing page.
pub const CATEGORIES_PER_PAGE: usize = 50;

/// Number of story keys bundled into a single render job.
pub const STORIES_PER_TASK: usize = 64;

/// Max number of outstanding jobs in a phase's job queue.
pub const MAX_OUTSTANDING_JOBS: usize = 1024;

/// Artifact queue capacity per render worker (backpressure bound).
pub const ARTIFACTS_PER_WORKER: usize = 4;

/// Aggregator contribution channel capacity.
pub const MAX_CONTRIBUTION_BACKLOG: usize = 512;

/// Default number of records per search_content_<i>.json shard.
/// Keeps a shard around 200-500 KiB uncompressed.
pub const SEARCH_SHARD_SIZE: usize = 500;

/// Scopes with fewer stories get no search index (the UI hides the button).
pub const SEARCH_MIN_STORIES: usize = 5;

/// Scopes with more stories than this get no search index.
pub const SEARCH_MAX_STORIES: usize = 50_000;

/// Uncompressed size at which a ZIM cluster is flushed.
pub const CLUSTER_SIZE: usize = 2 * 1024 * 1024;

/// zstd level used for ZIM cluster compression.
pub const CLUSTER_ZSTD_LEVEL: i32 = 3;
