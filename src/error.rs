use thiserror::Error;

/// Error taxonomy of the build stage.
///
/// The worker loop dispatches on this: [`BuildError::InputCorruption`] and
/// [`BuildError::Render`] drop the affected story/artifact, bump a counter
/// and continue; everything else aborts the build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A story cannot be projected into a renderable view (missing
    /// mandatory fields, gap in chapter indices, ...).
    #[error("corrupt story {publisher}/{id}: {reason}")]
    InputCorruption {
        publisher: String,
        id: i64,
        reason: String,
    },

    /// Template expansion failed for one artifact.
    #[error("render failed for '{path}': {reason}")]
    Render { path: String, reason: String },

    /// I/O or ZIM serialization failure. Always fatal.
    #[error("write error: {0}")]
    Write(String),

    /// The planner detected an invariant violation (slug collision,
    /// count overflow). Always fatal.
    #[error("plan error: {0}")]
    Plan(String),

    /// The build was interrupted (SIGINT). Partial output is removed.
    #[error("build cancelled")]
    Cancelled,

    /// Store query failure. Fatal: the store is expected to be consistent
    /// and read-only for the whole build.
    #[error("store error: {0}")]
    Store(String),
}

impl BuildError {
    /// Whether the worker may drop the current work item and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BuildError::InputCorruption { .. } | BuildError::Render { .. }
        )
    }
}

pub type BuildResult<T> = Result<T, BuildError>;

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        BuildError::Write(err.to_string())
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        BuildError::Render {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}
