//! ZimFiction: render fanfiction archive dumps into a self-contained,
//! browsable offline ZIM bundle.
//!
//! The build stage is a phased pipeline over a read-only entity store:
//!
//! 1. **Stories** -- one page per chapter, chapter listings, preview JSON,
//!    per-story redirects; in parallel, a single reducer thread folds one
//!    observation per story into the aggregation tables
//! 2. **Authors** -- paginated story lists, alt-identity links, chart data
//! 3. **Series** -- ordered member pages and chart data
//! 4. **Tags & categories** -- paginated lists, statistics pages, and the
//!    sharded static search corpora the in-ZIM search script consumes
//! 5. **Publishers** -- landing pages and category listings
//! 6. **Global** -- landing, statistics, info pages and fixed assets
//!
//! # Architecture
//!
//! - **Streaming planning** -- jobs are streamed into a bounded channel,
//!   never materialized as a full list
//! - **Backpressure** -- render workers block on a bounded artifact queue
//!   when the single ZIM writer thread cannot keep up
//! - **Commutative aggregation** -- all cross-references are reductions
//!   over interned symbols, sealed into an immutable snapshot after the
//!   story phase
//! - **Native container writer** -- clusters are zstd-compressed and
//!   spilled to a temp file; the output appears under its final name only
//!   after the checksum is in place
//!
//! # Key Modules
//!
//! - [`store`] -- read-only entity store contract and the JSON-lines backend
//! - [`plan`] -- phase-ordered job enumeration and slug collision checks
//! - [`worker`] -- render worker loop
//! - [`pages`] / [`templates`] -- page rendering and the closed filter set
//! - [`search`] -- per-scope search header/shard emission
//! - [`aggregate`] -- interner, histograms, statistics, snapshot
//! - [`queue`] -- artifacts and the bounded writer queue
//! - [`zim`] -- ZIM container writer and verification reader
//! - [`builder`] -- orchestration, cancellation and reporting

pub mod aggregate;
pub mod assets;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod html;
pub mod logging;
pub mod models;
pub mod pages;
pub mod pagination;
pub mod plan;
pub mod queue;
pub mod search;
pub mod slug;
pub mod stats;
pub mod store;
pub mod templates;
pub mod util;
pub mod worker;
pub mod zim;
