//! Minimal ZIM reader.
//!
//! Parses the structures [`super::write::ZimWriter`] emits: header, MIME
//! list, directory entries, pointer lists, clusters (plain or zstd) and
//! the trailing MD5 checksum. Loads the whole file into memory; intended
//! for verification and tests, not for serving multi-gigabyte archives.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use md5::{Digest, Md5};

use super::{CLUSTER_UNCOMPRESSED, CLUSTER_ZSTD, MAGIC, NO_PAGE, REDIRECT_MIME};

/// What a path resolves to inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZimRecord {
    Content { mime: String, bytes: Vec<u8> },
    Redirect { target: String },
}

#[derive(Debug, Clone)]
struct RawEntry {
    namespace: u8,
    url: String,
    title: String,
    kind: RawKind,
}

#[derive(Debug, Clone)]
enum RawKind {
    Content { mime: u16, cluster: u32, blob: u32 },
    Redirect { target_index: u32 },
}

pub struct ZimArchive {
    mime_types: Vec<String>,
    entries: Vec<RawEntry>,
    clusters: Vec<Vec<Vec<u8>>>,
    main_page: Option<u32>,
    checksum_ok: bool,
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(
        data.get(pos..pos + 2).context("truncated u16")?.try_into()?,
    ))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(
        data.get(pos..pos + 4).context("truncated u32")?.try_into()?,
    ))
}

fn read_u64(data: &[u8], pos: usize) -> Result<u64> {
    Ok(u64::from_le_bytes(
        data.get(pos..pos + 8).context("truncated u64")?.try_into()?,
    ))
}

fn read_cstr(data: &[u8], pos: &mut usize) -> Result<String> {
    let start = *pos;
    let end = data[start..]
        .iter()
        .position(|&b| b == 0)
        .context("unterminated string")?
        + start;
    *pos = end + 1;
    Ok(String::from_utf8_lossy(&data[start..end]).into_owned())
}

impl ZimArchive {
    pub fn open(path: &Path) -> Result<ZimArchive> {
        let data = std::fs::read(path)
            .with_context(|| format!("cannot read ZIM file: {}", path.display()))?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<ZimArchive> {
        if data.len() < 80 {
            bail!("file too small for a ZIM header");
        }
        if read_u32(data, 0)? != MAGIC {
            bail!("bad magic number");
        }
        let entry_count = read_u32(data, 24)? as usize;
        let cluster_count = read_u32(data, 28)? as usize;
        let url_ptr_pos = read_u64(data, 32)? as usize;
        let cluster_ptr_pos = read_u64(data, 48)? as usize;
        let mime_list_pos = read_u64(data, 56)? as usize;
        let main_page = read_u32(data, 64)?;
        let checksum_pos = read_u64(data, 72)? as usize;

        // checksum covers everything before the trailing 16 bytes
        if checksum_pos + 16 != data.len() {
            bail!("checksum position does not match file size");
        }
        let mut hasher = Md5::new();
        hasher.update(&data[..checksum_pos]);
        let checksum_ok = hasher.finalize().as_slice() == &data[checksum_pos..];

        // MIME list: zero-terminated strings, empty string terminates
        let mut mime_types = Vec::new();
        let mut pos = mime_list_pos;
        loop {
            let s = read_cstr(data, &mut pos)?;
            if s.is_empty() {
                break;
            }
            mime_types.push(s);
        }

        // directory entries through the URL pointer list
        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let mut pos = read_u64(data, url_ptr_pos + i * 8)? as usize;
            let mime = read_u16(data, pos)?;
            pos += 2;
            let _param_len = data[pos];
            pos += 1;
            let namespace = data[pos];
            pos += 1;
            pos += 4; // revision
            let kind = if mime == REDIRECT_MIME {
                let target_index = read_u32(data, pos)?;
                pos += 4;
                RawKind::Redirect { target_index }
            } else {
                let cluster = read_u32(data, pos)?;
                let blob = read_u32(data, pos + 4)?;
                pos += 8;
                RawKind::Content {
                    mime,
                    cluster,
                    blob,
                }
            };
            let url = read_cstr(data, &mut pos)?;
            let title = read_cstr(data, &mut pos)?;
            entries.push(RawEntry {
                namespace,
                url,
                title,
                kind,
            });
        }

        // clusters: decompress and split into blobs
        let mut clusters = Vec::with_capacity(cluster_count);
        for i in 0..cluster_count {
            let start = read_u64(data, cluster_ptr_pos + i * 8)? as usize;
            let end = if i + 1 < cluster_count {
                read_u64(data, cluster_ptr_pos + (i + 1) * 8)? as usize
            } else {
                checksum_pos
            };
            let info = data[start];
            let body = &data[start + 1..end];
            let raw = match info {
                CLUSTER_UNCOMPRESSED => body.to_vec(),
                CLUSTER_ZSTD => zstd::decode_all(body).context("zstd cluster")?,
                other => bail!("unsupported cluster info byte {:#x}", other),
            };
            let first_offset = read_u32(&raw, 0)? as usize;
            let n_blobs = first_offset / 4 - 1;
            let mut offsets = Vec::with_capacity(n_blobs + 1);
            for j in 0..=n_blobs {
                offsets.push(read_u32(&raw, j * 4)? as usize);
            }
            let mut blobs = Vec::with_capacity(n_blobs);
            for j in 0..n_blobs {
                blobs.push(raw[offsets[j]..offsets[j + 1]].to_vec());
            }
            clusters.push(blobs);
        }

        Ok(ZimArchive {
            mime_types,
            entries,
            clusters,
            main_page: (main_page != NO_PAGE).then_some(main_page),
            checksum_ok,
        })
    }

    pub fn checksum_ok(&self) -> bool {
        self.checksum_ok
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// All content/redirect paths in the `C` namespace, sorted.
    pub fn paths(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.namespace == super::NS_CONTENT)
            .map(|e| e.url.as_str())
            .collect()
    }

    fn record(&self, entry: &RawEntry) -> Option<ZimRecord> {
        match &entry.kind {
            RawKind::Content {
                mime,
                cluster,
                blob,
            } => Some(ZimRecord::Content {
                mime: self.mime_types.get(*mime as usize)?.clone(),
                bytes: self
                    .clusters
                    .get(*cluster as usize)?
                    .get(*blob as usize)?
                    .clone(),
            }),
            RawKind::Redirect { target_index } => Some(ZimRecord::Redirect {
                target: self.entries.get(*target_index as usize)?.url.clone(),
            }),
        }
    }

    /// Look up a content path.
    pub fn get(&self, path: &str) -> Option<ZimRecord> {
        self.entries
            .iter()
            .find(|e| e.namespace == super::NS_CONTENT && e.url == path)
            .and_then(|e| self.record(e))
    }

    /// Follow redirects until content is reached (or depth runs out).
    pub fn resolve(&self, path: &str) -> Option<ZimRecord> {
        let mut current = path.to_string();
        for _ in 0..8 {
            match self.get(&current)? {
                ZimRecord::Redirect { target } => current = target,
                content => return Some(content),
            }
        }
        None
    }

    /// ZIM metadata entries (`M` namespace).
    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter(|e| e.namespace == super::NS_METADATA)
            .filter_map(|e| match self.record(e)? {
                ZimRecord::Content { bytes, .. } => {
                    Some((e.url.clone(), String::from_utf8_lossy(&bytes).into_owned()))
                }
                ZimRecord::Redirect { .. } => None,
            })
            .collect()
    }

    /// URL of the main page entry, if one is set.
    pub fn main_path(&self) -> Option<&str> {
        let index = self.main_page? as usize;
        self.entries.get(index).map(|e| e.url.as_str())
    }

    /// The full `C`-namespace path -> record mapping.
    pub fn content_map(&self) -> BTreeMap<String, ZimRecord> {
        self.entries
            .iter()
            .filter(|e| e.namespace == super::NS_CONTENT)
            .filter_map(|e| Some((e.url.clone(), self.record(e)?)))
            .collect()
    }

    pub fn title_of(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.namespace == super::NS_CONTENT && e.url == path)
            .map(|e| e.title.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::super::write::{ZimMetadata, ZimWriter};
    use super::*;
    use crate::queue::Artifact;

    fn build_sample(dir: &Path) -> std::path::PathBuf {
        let out = dir.join("sample.zim");
        let mut writer = ZimWriter::create(&out, &ZimMetadata::default()).unwrap();
        writer
            .add(&Artifact::html(
                "index.html",
                "Welcome",
                "<p>hello</p>".to_string(),
                true,
            ))
            .unwrap();
        writer
            .add(&Artifact::json("data.json", "data", &serde_json::json!({"k": 1})).unwrap())
            .unwrap();
        writer
            .add(&Artifact::redirect("", "root", "index.html", true))
            .unwrap();
        writer.set_main_path("");
        writer.finish().unwrap();
        out
    }

    #[test]
    fn round_trip_content_and_redirects() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = build_sample(dir.path());
        let archive = ZimArchive::open(&out).unwrap();

        assert!(archive.checksum_ok());
        match archive.get("index.html").unwrap() {
            ZimRecord::Content { mime, bytes } => {
                assert_eq!(mime, "text/html");
                assert_eq!(bytes, b"<p>hello</p>");
            }
            _ => panic!("expected content"),
        }
        match archive.get("").unwrap() {
            ZimRecord::Redirect { target } => assert_eq!(target, "index.html"),
            _ => panic!("expected redirect"),
        }
        // resolve follows the redirect to content
        match archive.resolve("").unwrap() {
            ZimRecord::Content { bytes, .. } => assert_eq!(bytes, b"<p>hello</p>"),
            _ => panic!("expected resolved content"),
        }
    }

    #[test]
    fn metadata_is_readable() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = build_sample(dir.path());
        let archive = ZimArchive::open(&out).unwrap();
        let metadata = archive.metadata();
        assert_eq!(metadata["Title"], "ZimFiction");
        assert_eq!(metadata["Language"], "eng");
        assert_eq!(metadata["Scraper"], "zimfiction");
    }

    #[test]
    fn main_page_points_at_root_redirect() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = build_sample(dir.path());
        let archive = ZimArchive::open(&out).unwrap();
        assert_eq!(archive.main_path(), Some(""));
    }

    #[test]
    fn corrupted_checksum_is_detected() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = build_sample(dir.path());
        let mut bytes = std::fs::read(&out).unwrap();
        let len = bytes.len();
        bytes[len - 1] ^= 0xFF;
        let archive = ZimArchive::parse(&bytes).unwrap();
        assert!(!archive.checksum_ok());
    }

    #[test]
    fn json_mime_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = build_sample(dir.path());
        let archive = ZimArchive::open(&out).unwrap();
        match archive.get("data.json").unwrap() {
            ZimRecord::Content { mime, bytes } => {
                assert_eq!(mime, "application/json");
                let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(value["k"], 1);
            }
            _ => panic!("expected content"),
        }
    }

    #[test]
    fn truncated_file_fails_cleanly() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = build_sample(dir.path());
        let bytes = std::fs::read(&out).unwrap();
        assert!(ZimArchive::parse(&bytes[..40]).is_err());
        assert!(ZimArchive::parse(&bytes[..bytes.len() - 3]).is_err());
    }
}
