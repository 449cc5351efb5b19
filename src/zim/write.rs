//! Sequential ZIM writer.
//!
//! Artifacts arrive in any order; content bytes go straight into the
//! current cluster, which is compressed and spilled to an anonymous temp
//! file once it reaches the configured size. Only entry metadata (paths,
//! titles, cluster/blob coordinates) stays in memory. `finish()` sorts the
//! directory, lays the file out, streams the clusters back from the spill
//! file and appends the checksum; the output becomes visible under its
//! final name only after everything succeeded.

use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use tracing::{debug, info};

use crate::config::{CLUSTER_SIZE, CLUSTER_ZSTD_LEVEL};
use crate::error::{BuildError, BuildResult};
use crate::queue::{Artifact, Mime, Payload};

use super::{
    CLUSTER_ZSTD, MAGIC, MAJOR_VERSION, MINOR_VERSION, NO_PAGE, NS_CONTENT, NS_METADATA,
    REDIRECT_MIME,
};

/// The fixed MIME registry, in index order.
pub const MIME_TYPES: [Mime; 6] = [
    Mime::Html,
    Mime::Css,
    Mime::Js,
    Mime::Json,
    Mime::Png,
    Mime::Ico,
];

fn mime_index(mime: Mime) -> u16 {
    MIME_TYPES
        .iter()
        .position(|&m| m == mime)
        .expect("registry covers all MIME variants") as u16
}

/// ZIM-level metadata, stored under the `M` namespace.
#[derive(Debug, Clone)]
pub struct ZimMetadata {
    pub name: String,
    pub title: String,
    pub creator: String,
    pub publisher: String,
    pub description: String,
    pub language: String,
    pub date: String,
    pub tags: Vec<String>,
    pub scraper: String,
}

impl Default for ZimMetadata {
    fn default() -> Self {
        ZimMetadata {
            name: "zimfiction_eng".to_string(),
            title: "ZimFiction".to_string(),
            creator: "Various fanfiction communities".to_string(),
            publisher: "ZimFiction".to_string(),
            description: "Dumps of various fanfiction sites".to_string(),
            language: "eng".to_string(),
            date: String::new(),
            tags: vec![
                "_sw:no".to_string(),
                "_ftindex:yes".to_string(),
                "_pictures:no".to_string(),
                "_videos:no".to_string(),
                "_category:fanfiction".to_string(),
            ],
            scraper: "zimfiction".to_string(),
        }
    }
}

impl ZimMetadata {
    fn pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Name".to_string(), self.name.clone()),
            ("Title".to_string(), self.title.clone()),
            ("Creator".to_string(), self.creator.clone()),
            ("Publisher".to_string(), self.publisher.clone()),
            ("Description".to_string(), self.description.clone()),
            ("Language".to_string(), self.language.clone()),
            ("Date".to_string(), self.date.clone()),
            ("Tags".to_string(), self.tags.join(";")),
            ("Scraper".to_string(), self.scraper.clone()),
        ]
    }
}

enum EntryKind {
    Content { mime: u16, cluster: u32, blob: u32 },
    Redirect { target: String },
}

struct Entry {
    namespace: u8,
    url: String,
    title: String,
    kind: EntryKind,
}

/// Counters reported after a successful `finish()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZimWriterReport {
    pub entries: u64,
    pub redirects: u64,
    pub clusters: u64,
    pub content_bytes: u64,
    pub file_bytes: u64,
}

pub struct ZimWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    spill: File,
    entries: Vec<Entry>,
    seen_paths: FxHashSet<(u8, String)>,
    /// content hash -> (cluster, blob) for dedup-hinted artifacts
    dedup: FxHashMap<u64, (u32, u32)>,
    current_blobs: Vec<u8>,
    current_offsets: Vec<u32>,
    cluster_sizes: Vec<u64>,
    main_path: Option<String>,
    content_bytes: u64,
    finished: bool,
}

impl ZimWriter {
    /// Open a writer targeting `path`. The file is created as
    /// `<path>.tmp` and renamed into place by [`ZimWriter::finish`].
    pub fn create(path: &Path, metadata: &ZimMetadata) -> BuildResult<ZimWriter> {
        let tmp_path = tmp_path_for(path);
        // fail early if the target directory is not writable
        File::create(&tmp_path)
            .map_err(|e| BuildError::Write(format!("cannot create {}: {}", tmp_path.display(), e)))?;
        let spill = tempfile::tempfile()
            .map_err(|e| BuildError::Write(format!("cannot create spill file: {}", e)))?;
        let mut writer = ZimWriter {
            final_path: path.to_path_buf(),
            tmp_path,
            spill,
            entries: Vec::new(),
            seen_paths: FxHashSet::default(),
            dedup: FxHashMap::default(),
            current_blobs: Vec::with_capacity(CLUSTER_SIZE),
            current_offsets: Vec::new(),
            cluster_sizes: Vec::new(),
            main_path: None,
            content_bytes: 0,
            finished: false,
        };
        for (key, value) in metadata.pairs() {
            writer.add_raw_content(NS_METADATA, key.clone(), key, Mime::Html, value.into_bytes(), false)?;
        }
        Ok(writer)
    }

    /// Path the main page entry will be looked up under at finish time.
    pub fn set_main_path(&mut self, path: &str) {
        self.main_path = Some(path.to_string());
    }

    /// Add one artifact. Content goes into the current cluster; redirects
    /// are resolved against the final entry table during `finish()`.
    pub fn add(&mut self, artifact: &Artifact) -> BuildResult<()> {
        match &artifact.payload {
            Payload::Content(bytes) => self.add_raw_content(
                NS_CONTENT,
                artifact.path.clone(),
                artifact.title.clone(),
                artifact.mime,
                bytes.clone(),
                artifact.dedup,
            ),
            Payload::Redirect { target } => {
                self.check_unique(NS_CONTENT, &artifact.path)?;
                self.entries.push(Entry {
                    namespace: NS_CONTENT,
                    url: artifact.path.clone(),
                    title: artifact.title.clone(),
                    kind: EntryKind::Redirect {
                        target: target.clone(),
                    },
                });
                Ok(())
            }
        }
    }

    fn check_unique(&mut self, namespace: u8, path: &str) -> BuildResult<()> {
        if !self.seen_paths.insert((namespace, path.to_string())) {
            return Err(BuildError::Write(format!(
                "duplicate path in ZIM: '{}'",
                path
            )));
        }
        Ok(())
    }

    fn add_raw_content(
        &mut self,
        namespace: u8,
        url: String,
        title: String,
        mime: Mime,
        bytes: Vec<u8>,
        dedup: bool,
    ) -> BuildResult<()> {
        self.check_unique(namespace, &url)?;
        let mime = mime_index(mime);

        if dedup {
            let mut hasher = FxHasher::default();
            bytes.hash(&mut hasher);
            mime.hash(&mut hasher);
            let digest = hasher.finish();
            if let Some(&(cluster, blob)) = self.dedup.get(&digest) {
                self.entries.push(Entry {
                    namespace,
                    url,
                    title,
                    kind: EntryKind::Content {
                        mime,
                        cluster,
                        blob,
                    },
                });
                return Ok(());
            }
            let coords = self.append_blob(&bytes)?;
            self.dedup.insert(digest, coords);
            self.entries.push(Entry {
                namespace,
                url,
                title,
                kind: EntryKind::Content {
                    mime,
                    cluster: coords.0,
                    blob: coords.1,
                },
            });
            return Ok(());
        }

        let (cluster, blob) = self.append_blob(&bytes)?;
        self.entries.push(Entry {
            namespace,
            url,
            title,
            kind: EntryKind::Content {
                mime,
                cluster,
                blob,
            },
        });
        Ok(())
    }

    fn append_blob(&mut self, bytes: &[u8]) -> BuildResult<(u32, u32)> {
        let cluster = self.cluster_sizes.len() as u32;
        let blob = self.current_offsets.len() as u32;
        self.current_offsets.push(self.current_blobs.len() as u32);
        self.current_blobs.extend_from_slice(bytes);
        self.content_bytes += bytes.len() as u64;
        if self.current_blobs.len() >= CLUSTER_SIZE {
            self.flush_cluster()?;
        }
        Ok((cluster, blob))
    }

    /// Compress the current cluster and spill it.
    fn flush_cluster(&mut self) -> BuildResult<()> {
        if self.current_offsets.is_empty() {
            return Ok(());
        }
        let n = self.current_offsets.len();
        let header_len = ((n + 1) * 4) as u32;
        let mut raw = Vec::with_capacity(self.current_blobs.len() + (n + 1) * 4);
        for &offset in &self.current_offsets {
            raw.extend_from_slice(&(header_len + offset).to_le_bytes());
        }
        raw.extend_from_slice(&(header_len + self.current_blobs.len() as u32).to_le_bytes());
        raw.extend_from_slice(&self.current_blobs);

        let compressed = zstd::encode_all(raw.as_slice(), CLUSTER_ZSTD_LEVEL)
            .map_err(|e| BuildError::Write(format!("cluster compression failed: {}", e)))?;
        self.spill.write_all(&[CLUSTER_ZSTD])?;
        self.spill.write_all(&compressed)?;
        self.cluster_sizes.push(1 + compressed.len() as u64);

        debug!(
            cluster = self.cluster_sizes.len() - 1,
            blobs = n,
            raw = raw.len(),
            compressed = compressed.len(),
            "flushed cluster"
        );
        self.current_blobs.clear();
        self.current_offsets.clear();
        Ok(())
    }

    /// Lay out and write the final file, then atomically rename it.
    pub fn finish(mut self) -> BuildResult<ZimWriterReport> {
        self.flush_cluster()?;

        // URL-sorted entry order defines entry indices.
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| {
            let ea = &self.entries[a];
            let eb = &self.entries[b];
            (ea.namespace, ea.url.as_str()).cmp(&(eb.namespace, eb.url.as_str()))
        });
        let mut index_of: FxHashMap<(u8, &str), u32> = FxHashMap::default();
        for (position, &entry) in order.iter().enumerate() {
            index_of.insert(
                (self.entries[entry].namespace, self.entries[entry].url.as_str()),
                position as u32,
            );
        }

        // Title order references URL-order indices.
        let mut title_order: Vec<u32> = (0..order.len() as u32).collect();
        title_order.sort_by(|&a, &b| {
            let ea = &self.entries[order[a as usize]];
            let eb = &self.entries[order[b as usize]];
            let ta = if ea.title.is_empty() { &ea.url } else { &ea.title };
            let tb = if eb.title.is_empty() { &eb.url } else { &eb.title };
            (ea.namespace, ta).cmp(&(eb.namespace, tb))
        });

        // Serialize directory entries and record their offsets.
        let mut mime_list = Vec::new();
        for mime in MIME_TYPES {
            mime_list.extend_from_slice(mime.as_str().as_bytes());
            mime_list.push(0);
        }
        mime_list.push(0);

        let mut redirects = 0u64;
        let dir_start = 80 + mime_list.len() as u64;
        let mut dir_bytes = Vec::new();
        let mut url_ptrs: Vec<u64> = Vec::with_capacity(order.len());
        for &entry_index in &order {
            let entry = &self.entries[entry_index];
            url_ptrs.push(dir_start + dir_bytes.len() as u64);
            match &entry.kind {
                EntryKind::Content {
                    mime,
                    cluster,
                    blob,
                } => {
                    dir_bytes.extend_from_slice(&mime.to_le_bytes());
                    dir_bytes.push(0); // parameter length
                    dir_bytes.push(entry.namespace);
                    dir_bytes.extend_from_slice(&0u32.to_le_bytes()); // revision
                    dir_bytes.extend_from_slice(&cluster.to_le_bytes());
                    dir_bytes.extend_from_slice(&blob.to_le_bytes());
                }
                EntryKind::Redirect { target } => {
                    redirects += 1;
                    let target_index = index_of
                        .get(&(entry.namespace, target.as_str()))
                        .copied()
                        .ok_or_else(|| {
                            BuildError::Write(format!(
                                "redirect '{}' points to missing path '{}'",
                                entry.url, target
                            ))
                        })?;
                    dir_bytes.extend_from_slice(&REDIRECT_MIME.to_le_bytes());
                    dir_bytes.push(0);
                    dir_bytes.push(entry.namespace);
                    dir_bytes.extend_from_slice(&0u32.to_le_bytes());
                    dir_bytes.extend_from_slice(&target_index.to_le_bytes());
                }
            }
            dir_bytes.extend_from_slice(entry.url.as_bytes());
            dir_bytes.push(0);
            dir_bytes.extend_from_slice(entry.title.as_bytes());
            dir_bytes.push(0);
        }

        let entry_count = order.len() as u32;
        let cluster_count = self.cluster_sizes.len() as u32;
        let url_ptr_pos = dir_start + dir_bytes.len() as u64;
        let title_ptr_pos = url_ptr_pos + 8 * entry_count as u64;
        let cluster_ptr_pos = title_ptr_pos + 4 * entry_count as u64;
        let cluster_start = cluster_ptr_pos + 8 * cluster_count as u64;
        let clusters_len: u64 = self.cluster_sizes.iter().sum();
        let checksum_pos = cluster_start + clusters_len;

        let main_page = match &self.main_path {
            Some(path) => index_of
                .get(&(NS_CONTENT, path.as_str()))
                .copied()
                .ok_or_else(|| {
                    BuildError::Write(format!("main page path '{}' not in ZIM", path))
                })?,
            None => NO_PAGE,
        };

        // Write everything to the temp file.
        let file = File::create(&self.tmp_path)
            .map_err(|e| BuildError::Write(format!("cannot open {}: {}", self.tmp_path.display(), e)))?;
        let mut out = BufWriter::new(file);

        out.write_all(&MAGIC.to_le_bytes())?;
        out.write_all(&MAJOR_VERSION.to_le_bytes())?;
        out.write_all(&MINOR_VERSION.to_le_bytes())?;
        out.write_all(&uuid_bytes(&self.final_path, entry_count, checksum_pos))?;
        out.write_all(&entry_count.to_le_bytes())?;
        out.write_all(&cluster_count.to_le_bytes())?;
        out.write_all(&url_ptr_pos.to_le_bytes())?;
        out.write_all(&title_ptr_pos.to_le_bytes())?;
        out.write_all(&cluster_ptr_pos.to_le_bytes())?;
        out.write_all(&80u64.to_le_bytes())?; // mime list follows the header
        out.write_all(&main_page.to_le_bytes())?;
        out.write_all(&NO_PAGE.to_le_bytes())?; // layout page
        out.write_all(&checksum_pos.to_le_bytes())?;

        out.write_all(&mime_list)?;
        out.write_all(&dir_bytes)?;
        for ptr in &url_ptrs {
            out.write_all(&ptr.to_le_bytes())?;
        }
        for index in &title_order {
            out.write_all(&index.to_le_bytes())?;
        }
        let mut cluster_offset = cluster_start;
        for size in &self.cluster_sizes {
            out.write_all(&cluster_offset.to_le_bytes())?;
            cluster_offset += size;
        }

        // Stream the spilled clusters back.
        self.spill.seek(SeekFrom::Start(0))?;
        let mut spill = BufReader::new(&self.spill);
        std::io::copy(&mut spill, &mut out)
            .map_err(|e| BuildError::Write(format!("cluster copy failed: {}", e)))?;
        out.flush()?;
        drop(out);

        // Trailing MD5 over everything written so far.
        let mut hasher = Md5::new();
        let mut reread = BufReader::new(File::open(&self.tmp_path)?);
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = reread.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        let digest = hasher.finalize();
        let mut file = fs::OpenOptions::new().append(true).open(&self.tmp_path)?;
        file.write_all(&digest)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.final_path).map_err(|e| {
            BuildError::Write(format!(
                "cannot rename {} into place: {}",
                self.tmp_path.display(),
                e
            ))
        })?;
        self.finished = true;

        let file_bytes = checksum_pos + 16;
        info!(
            entries = entry_count,
            clusters = cluster_count,
            size = file_bytes,
            "finalized ZIM"
        );
        Ok(ZimWriterReport {
            entries: entry_count as u64,
            redirects,
            clusters: cluster_count as u64,
            content_bytes: self.content_bytes,
            file_bytes,
        })
    }
}

impl Drop for ZimWriter {
    fn drop(&mut self) {
        if !self.finished {
            // aborted build: never leave a partial output file behind
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Deterministic uuid derived from output name and layout; not a real
/// RFC 4122 uuid, but stable and unique enough to identify a build.
fn uuid_bytes(path: &Path, entries: u32, checksum_pos: u64) -> [u8; 16] {
    let mut hasher = FxHasher::default();
    path.hash(&mut hasher);
    entries.hash(&mut hasher);
    let a = hasher.finish();
    checksum_pos.hash(&mut hasher);
    let b = hasher.finish();
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&a.to_le_bytes());
    out[8..].copy_from_slice(&b.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(path: &str, content: &str) -> Artifact {
        Artifact::html(path, format!("title of {}", path), content.to_string(), false)
    }

    #[test]
    fn duplicate_paths_are_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.zim");
        let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
        writer.add(&artifact("a", "one")).unwrap();
        let err = writer.add(&artifact("a", "two")).unwrap_err();
        assert!(matches!(err, BuildError::Write(_)));
    }

    #[test]
    fn unresolved_redirect_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.zim");
        let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
        writer
            .add(&Artifact::redirect("r", "r", "missing-target", false))
            .unwrap();
        assert!(writer.finish().is_err());
        assert!(!out.exists());
    }

    #[test]
    fn drop_without_finish_removes_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.zim");
        let tmp = dir.path().join("out.zim.tmp");
        {
            let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
            writer.add(&artifact("a", "one")).unwrap();
            assert!(tmp.exists());
        }
        assert!(!tmp.exists());
        assert!(!out.exists());
    }

    #[test]
    fn finish_renames_atomically() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.zim");
        let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
        writer.add(&artifact("index.html", "<p>hi</p>")).unwrap();
        writer.set_main_path("index.html");
        let report = writer.finish().unwrap();
        assert!(out.exists());
        assert!(!dir.path().join("out.zim.tmp").exists());
        assert!(report.entries > 0);
        assert_eq!(report.clusters, 1);
        assert_eq!(
            report.file_bytes,
            std::fs::metadata(&out).unwrap().len()
        );
    }

    #[test]
    fn dedup_hint_shares_blobs() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.zim");
        let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
        writer
            .add(&Artifact::stylesheet("a.css", "a", "body{}"))
            .unwrap();
        writer
            .add(&Artifact::stylesheet("b.css", "b", "body{}"))
            .unwrap();
        // shared blob: only one copy in the cluster
        assert_eq!(writer.dedup.len(), 1);
        let report = writer.finish().unwrap();
        assert_eq!(report.entries, 2 + 9); // two css + nine metadata entries
    }

    #[test]
    fn equal_pages_keep_distinct_blobs() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.zim");
        let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
        let before = writer.content_bytes;
        writer.add(&artifact("a", "same")).unwrap();
        writer.add(&artifact("b", "same")).unwrap();
        assert_eq!(writer.content_bytes - before, 2 * "same".len() as u64);
    }

    #[test]
    fn large_content_spills_multiple_clusters() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.zim");
        let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
        let big = "x".repeat(CLUSTER_SIZE);
        writer.add(&artifact("big1", &big)).unwrap();
        writer.add(&artifact("big2", &big)).unwrap();
        writer.add(&artifact("small", "tail")).unwrap();
        let report = writer.finish().unwrap();
        assert!(report.clusters >= 3, "got {} clusters", report.clusters);
    }
}
