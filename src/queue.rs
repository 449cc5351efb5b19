//! Rendered artifacts and the bounded queue between render workers and the
//! ZIM writer thread.
//!
//! The queue is the build's backpressure point: when the writer cannot
//! keep up, `push` blocks the producing worker instead of buffering
//! unboundedly. Capacity is a small multiple of the worker count.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use serde::Serialize;

use crate::error::{BuildError, BuildResult};

/// Fixed MIME registry of everything the build ever emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mime {
    Html,
    Css,
    Js,
    Json,
    Png,
    Ico,
}

impl Mime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mime::Html => "text/html",
            Mime::Css => "text/css",
            Mime::Js => "application/javascript",
            Mime::Json => "application/json",
            Mime::Png => "image/png",
            Mime::Ico => "image/x-icon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Content(Vec<u8>),
    Redirect { target: String },
}

/// One output record destined for the ZIM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: String,
    pub title: String,
    pub mime: Mime,
    pub payload: Payload,
    /// Front articles are offered by reader UIs for random access/suggest.
    pub is_front: bool,
    /// Safe to share a blob with byte-identical content (stylesheets,
    /// scripts). Page bodies keep distinct blobs even when equal.
    pub dedup: bool,
}

impl Artifact {
    pub fn html(path: impl Into<String>, title: impl Into<String>, content: String, is_front: bool) -> Self {
        Artifact {
            path: path.into(),
            title: title.into(),
            mime: Mime::Html,
            payload: Payload::Content(content.into_bytes()),
            is_front,
            dedup: false,
        }
    }

    pub fn json<T: Serialize>(
        path: impl Into<String>,
        title: impl Into<String>,
        value: &T,
    ) -> BuildResult<Self> {
        let path = path.into();
        let bytes = serde_json::to_vec(value).map_err(|err| BuildError::Render {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        Ok(Artifact {
            path,
            title: title.into(),
            mime: Mime::Json,
            payload: Payload::Content(bytes),
            is_front: false,
            dedup: false,
        })
    }

    pub fn redirect(
        path: impl Into<String>,
        title: impl Into<String>,
        target: impl Into<String>,
        is_front: bool,
    ) -> Self {
        Artifact {
            path: path.into(),
            title: title.into(),
            mime: Mime::Html,
            payload: Payload::Redirect {
                target: target.into(),
            },
            is_front,
            dedup: false,
        }
    }

    pub fn script(path: impl Into<String>, title: impl Into<String>, content: &str) -> Self {
        Artifact {
            path: path.into(),
            title: title.into(),
            mime: Mime::Js,
            payload: Payload::Content(content.as_bytes().to_vec()),
            is_front: false,
            dedup: true,
        }
    }

    pub fn stylesheet(path: impl Into<String>, title: impl Into<String>, content: &str) -> Self {
        Artifact {
            path: path.into(),
            title: title.into(),
            mime: Mime::Css,
            payload: Payload::Content(content.as_bytes().to_vec()),
            is_front: false,
            dedup: true,
        }
    }

    pub fn png(path: impl Into<String>, title: impl Into<String>, bytes: &[u8]) -> Self {
        Artifact {
            path: path.into(),
            title: title.into(),
            mime: Mime::Png,
            payload: Payload::Content(bytes.to_vec()),
            is_front: false,
            dedup: true,
        }
    }

    pub fn content_len(&self) -> usize {
        match &self.payload {
            Payload::Content(bytes) => bytes.len(),
            Payload::Redirect { .. } => 0,
        }
    }
}

/// Producer half of the artifact queue, cloned into every render worker.
#[derive(Clone)]
pub struct ArtifactSender {
    tx: SyncSender<Artifact>,
}

impl ArtifactSender {
    /// Blocking push. Fails only when the writer has gone away, which
    /// means the build is already aborting.
    pub fn push(&self, artifact: Artifact) -> BuildResult<()> {
        self.tx
            .send(artifact)
            .map_err(|_| BuildError::Write("artifact queue closed".to_string()))
    }
}

/// Create the bounded artifact channel for `workers` render workers.
pub fn artifact_queue(workers: usize) -> (ArtifactSender, Receiver<Artifact>) {
    let capacity = crate::config::ARTIFACTS_PER_WORKER * workers.max(1);
    let (tx, rx) = sync_channel(capacity);
    (ArtifactSender { tx }, rx)
}
