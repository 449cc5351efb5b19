//! Native ZIM container support.
//!
//! [`write`] produces a format-valid ZIM file (header, MIME list,
//! URL-sorted directory entries, pointer lists, zstd-compressed clusters,
//! trailing MD5 checksum). [`read`] is the matching reader, used by the
//! integration tests to verify builds round-trip and available to any
//! consumer that wants to inspect an emitted file.

pub mod read;
pub mod write;

/// File magic, little-endian ("ZIM\x04").
pub const MAGIC: u32 = 0x044D_495A;

pub const MAJOR_VERSION: u16 = 6;
pub const MINOR_VERSION: u16 = 1;

/// Namespace for content entries (new namespace scheme).
pub const NS_CONTENT: u8 = b'C';
/// Namespace for ZIM metadata entries.
pub const NS_METADATA: u8 = b'M';

/// Cluster info byte: uncompressed, 4-byte offsets.
pub const CLUSTER_UNCOMPRESSED: u8 = 0x01;
/// Cluster info byte: zstd, 4-byte offsets.
pub const CLUSTER_ZSTD: u8 = 0x05;

/// Sentinel for "no page" in the header.
pub const NO_PAGE: u32 = 0xFFFF_FFFF;

/// MIME value marking a redirect directory entry.
pub const REDIRECT_MIME: u16 = 0xFFFF;

pub use read::ZimArchive;
pub use write::{ZimMetadata, ZimWriter, ZimWriterReport};
