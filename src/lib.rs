//! # comic-shelf
//!
//! Keeps a personal comic archive directory tree and its catalog in sync.
//! The filesystem is the data source: every cbz/cb7/cbr archive and PDF
//! under the comics and manga roots becomes a catalog record, identified by
//! its path and carrying the ComicInfo metadata embedded in the file.
//!
//! # Architecture: Records Over Containers
//!
//! ```text
//! Container  (7z / rar / pdftoppm / lopdf)   bytes in, bytes out
//!     ▲
//! ComicRecord                                 metadata, repair, thumbnails
//!     ▲
//! Catalog     library.xml                     reconciliation, batches, queries
//!     ▲
//! ScopeNavigator                              Publisher → Series → Volume → Title
//! ```
//!
//! Every layer owns the one below it. The catalog owns its records, a
//! record owns its (lazily opened) container, and a container only talks to
//! the outside world through the [`context::Context`] it was handed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`catalog`] | The record collection: scan, load/persist `library.xml`, batch edits, queries, attribute index |
//! | [`comic`] | One record: population, repair, write-through edits, thumbnails, extraction, managed paths |
//! | [`container`] | Archive and PDF adapters plus the external tool runner |
//! | [`metadata`] | The 28-tag ComicInfo record, its page list and XML codec |
//! | [`scope`] | Drill-down navigation state machine |
//! | [`config`] | `comic-shelf.toml` loading, merging and validation |
//! | [`context`] | Settings plus tool runner, shared by every layer |
//! | [`digest`] | SHA-256 content hashes for change detection |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Path Is Identity, Hash Is Freshness
//!
//! A record is keyed by its path. The content hash only answers "did this
//! file change since we last read it?". Two byte-identical files at
//! different paths are two records; a file rewritten in place keeps its
//! record but gets its metadata re-read.
//!
//! ## Metadata Lives In The File
//!
//! `library.xml` is a cache. Every correction (missing tags, wrong page
//! count, manga flag) and every edit is injected back into the comic file
//! first, so a catalog can always be rebuilt from the files alone.
//!
//! ## External Tools Behind A Trait
//!
//! Archive formats are handled by shelling out to `7z` and `rar`, PDF pages
//! by `pdftoppm`. All of it goes through [`container::ToolRunner`], which
//! captures output and exit status under a timeout. Tests swap in a
//! scripted runner, so the whole stack is exercised without the tools
//! installed.

pub mod catalog;
pub mod comic;
pub mod config;
pub mod container;
pub mod context;
pub mod digest;
pub mod metadata;
pub mod output;
pub mod scope;

#[cfg(test)]
pub(crate) mod test_helpers;
