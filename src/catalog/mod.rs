//! The in-memory catalog of every comic under the configured roots.
//!
//! Records are keyed by path. The content hash only tells a reconciliation
//! pass whether a cataloged file changed; two identical files at different
//! paths are two records.
//!
//! ## Lifecycle
//!
//! ```text
//! load   library.xml  →  records restored, vanished files dropped
//! scan   roots        →  vanished records removed, new/changed files (re)read
//! edit   set_tag ...  →  container written, catalog re-persisted
//! ```
//!
//! [`Catalog::open`] is `load` followed by `scan`. Both are best effort: one
//! unreadable file is logged and skipped, it does not abort the pass.
//!
//! ## Persistence
//!
//! Every record mutation that changed a container asks the catalog to
//! persist. Inside [`start_batch_editing`](Catalog::start_batch_editing) /
//! [`finish_batch_editing`](Catalog::finish_batch_editing) those requests
//! only mark the catalog dirty, and the batch ends with a single write.

pub mod index;
mod persist;
pub mod worker;

pub use index::AttributeIndex;
pub use persist::{StoredComic, read_library, write_library};

use crate::comic::{ComicError, ComicRecord, Persist, TagChange};
use crate::container::{ContainerError, ContainerKind};
use crate::context::Context;
use crate::digest;
use crate::metadata::xml::XmlError;
use crate::metadata::{PageType, Tag};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Publisher key used when publisher grouping is off.
pub const ALL_PUBLISHERS: &str = "All";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Comic(#[from] ComicError),
    #[error("File error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot create directory {}: {source}", path.display())]
    Dir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot read catalog {}: {source}", path.display())]
    XmlRead {
        path: PathBuf,
        #[source]
        source: XmlError,
    },
    #[error("Cannot write catalog {}: {source}", path.display())]
    XmlWrite {
        path: PathBuf,
        #[source]
        source: XmlError,
    },
    #[error("{} is not in the catalog", .0.display())]
    NotFound(PathBuf),
    #[error("catalog worker exited without reporting back")]
    WorkerLost,
}

impl CatalogError {
    pub(crate) fn file(path: &Path) -> impl FnOnce(io::Error) -> CatalogError + '_ {
        move |source| CatalogError::File {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn dir(path: &Path) -> impl FnOnce(io::Error) -> CatalogError + '_ {
        move |source| CatalogError::Dir {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Records whose file no longer exists.
    pub removed: usize,
    pub added: usize,
    /// Cataloged paths whose content changed.
    pub replaced: usize,
    pub unchanged: usize,
    /// Files of an unsupported type.
    pub skipped: usize,
    pub failed: usize,
}

impl ScanReport {
    /// True if the catalog's membership or content changed.
    pub fn changed(&self) -> bool {
        self.removed + self.added + self.replaced > 0
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = [
            (self.added, "added"),
            (self.replaced, "replaced"),
            (self.removed, "removed"),
            (self.unchanged, "unchanged"),
            (self.skipped, "skipped"),
            (self.failed, "failed"),
        ];
        let parts: Vec<String> = counts
            .iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, label)| format!("{n} {label}"))
            .collect();
        if parts.is_empty() {
            write!(f, "no comics found")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Restricts queries by the `Manga` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LibraryFilter {
    #[default]
    All,
    Comics,
    Manga,
}

impl LibraryFilter {
    pub fn matches(self, record: &ComicRecord) -> bool {
        match self {
            LibraryFilter::All => true,
            LibraryFilter::Comics => !record.is_manga(),
            LibraryFilter::Manga => record.is_manga(),
        }
    }
}

impl FromStr for LibraryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(LibraryFilter::All),
            "comics" => Ok(LibraryFilter::Comics),
            "manga" => Ok(LibraryFilter::Manga),
            other => Err(format!("unknown filter '{other}' (expected all, comics or manga)")),
        }
    }
}

pub struct Catalog {
    records: Vec<ComicRecord>,
    index: AttributeIndex,
    dirty: bool,
    batch_editing: bool,
    persist_count: usize,
    context: Arc<Context>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("records", &self.records.len())
            .field("dirty", &self.dirty)
            .field("batch_editing", &self.batch_editing)
            .field("persist_count", &self.persist_count)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// An empty catalog. Nothing is read or written.
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            records: Vec::new(),
            index: AttributeIndex::new(),
            dirty: false,
            batch_editing: false,
            persist_count: 0,
            context,
        }
    }

    /// Load the catalog file, then reconcile against the roots.
    pub fn open(context: Arc<Context>) -> Result<(Self, ScanReport), CatalogError> {
        let mut catalog = Self::load(context)?;
        let report = catalog.scan()?;
        Ok((catalog, report))
    }

    /// Restore records from `library.xml`. A missing or empty file yields an
    /// empty catalog.
    ///
    /// Vanished files are dropped and stale entries re-read; if anything
    /// changed the catalog is written back once. When some entries could not
    /// be restored at all the write is skipped so their stored metadata
    /// survives until the next successful load.
    pub fn load(context: Arc<Context>) -> Result<Self, CatalogError> {
        let file = context.settings().library_file();
        let mut catalog = Self::new(Arc::clone(&context));
        let has_content = fs::metadata(&file).is_ok_and(|m| m.len() > 0);
        if !has_content {
            debug!(path = %file.display(), "no catalog file yet");
            return Ok(catalog);
        }

        let stored = read_library(&file)?;
        let total = stored.len();
        let mut changed = false;
        let mut failed = 0;
        for entry in stored {
            if !entry.path.is_file() {
                info!(path = %entry.path.display(), "cataloged file vanished, dropping");
                changed = true;
                continue;
            }
            if catalog.position(&entry.path).is_some() {
                warn!(path = %entry.path.display(), "duplicate catalog entry, keeping the first");
                changed = true;
                continue;
            }
            match ComicRecord::restore(&entry.path, Arc::clone(&context), entry.info, &entry.hash) {
                Ok(Some(restored)) => {
                    changed |= restored.refreshed;
                    catalog.push(restored.record);
                }
                Ok(None) => {
                    warn!(path = %entry.path.display(), "unsupported file in catalog, dropping");
                    changed = true;
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "cannot restore comic");
                    failed += 1;
                }
            }
        }

        info!(restored = catalog.len(), total, failed, "loaded catalog");
        if changed && failed == 0 {
            catalog.persist()?;
        } else if changed {
            warn!(failed, "catalog not rewritten while entries fail to restore");
        }
        Ok(catalog)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ComicRecord] {
        &self.records
    }

    pub fn index(&self) -> &AttributeIndex {
        &self.index
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_batch_editing(&self) -> bool {
        self.batch_editing
    }

    /// Number of times `library.xml` was written by this catalog.
    pub fn persist_count(&self) -> usize {
        self.persist_count
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.records.iter().position(|r| r.path() == path)
    }

    fn require(&self, path: &Path) -> Result<usize, CatalogError> {
        self.position(path)
            .ok_or_else(|| CatalogError::NotFound(path.to_path_buf()))
    }

    pub fn get(&self, path: &Path) -> Option<&ComicRecord> {
        self.records.iter().find(|r| r.path() == path)
    }

    /// Mutable access for page extraction and thumbnails. Tag edits made
    /// through the record directly bypass catalog persistence; use
    /// [`set_tag`](Self::set_tag) instead.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut ComicRecord> {
        self.records.iter_mut().find(|r| r.path() == path)
    }

    /// First record whose content hash is `hash`.
    pub fn find_by_hash(&self, hash: &str) -> Option<&ComicRecord> {
        self.records.iter().find(|r| r.hash() == hash)
    }

    fn push(&mut self, record: ComicRecord) {
        self.index.add_record(record.info());
        self.records.push(record);
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconcile the catalog with the files under the configured roots.
    pub fn scan(&mut self) -> Result<ScanReport, CatalogError> {
        let mut report = ScanReport::default();

        let before = self.records.len();
        self.records.retain(|record| {
            let exists = record.path().is_file();
            if !exists {
                info!(path = %record.path().display(), "file vanished, removing from catalog");
            }
            exists
        });
        report.removed = before - self.records.len();

        let context = Arc::clone(&self.context);
        let settings = context.settings();
        let data_dir = settings.data_dir.as_path();
        let mut candidates = Vec::new();
        for root in settings.roots() {
            let walker = WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !e.path().starts_with(data_dir));
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        let path = entry.into_path();
                        if ContainerKind::from_path(&path).is_supported() {
                            candidates.push(path);
                        } else {
                            debug!(path = %path.display(), "skipping unsupported file");
                            report.skipped += 1;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(root = %root.display(), error = %e, "cannot walk directory entry");
                        report.failed += 1;
                    }
                }
            }
        }

        let hashed: Vec<(PathBuf, io::Result<String>)> = candidates
            .into_par_iter()
            .map(|path| {
                let hash = digest::hash_file(&path);
                (path, hash)
            })
            .collect();

        for (path, hash) in hashed {
            let hash = match hash {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot hash file");
                    report.failed += 1;
                    continue;
                }
            };
            let existing = self.position(&path);
            if let Some(i) = existing
                && self.records[i].hash() == hash
            {
                report.unchanged += 1;
                continue;
            }

            let known = existing.map(|i| &self.records[i]);
            match ComicRecord::open_hashed(&path, Arc::clone(&context), hash, known) {
                Ok(record) => {
                    if let Some(i) = existing {
                        info!(path = %path.display(), "file changed, replacing record");
                        self.records.remove(i);
                        report.replaced += 1;
                    } else {
                        info!(path = %path.display(), "new comic");
                        report.added += 1;
                    }
                    self.push(record);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot catalog comic");
                    report.failed += 1;
                }
            }
        }

        info!(%report, "scan finished");
        if report.changed() {
            self.request_persist()?;
        }
        Ok(report)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write `library.xml` now, regardless of batch state.
    pub fn persist(&mut self) -> Result<(), CatalogError> {
        let file = self.context.settings().library_file();
        write_library(&file, &self.records)?;
        self.dirty = false;
        self.persist_count += 1;
        debug!(path = %file.display(), comics = self.records.len(), "persisted catalog");
        Ok(())
    }

    /// Persist, or only mark dirty while a batch edit is open.
    pub fn request_persist(&mut self) -> Result<(), CatalogError> {
        if self.batch_editing {
            self.dirty = true;
            Ok(())
        } else {
            self.persist()
        }
    }

    pub fn start_batch_editing(&mut self) {
        self.batch_editing = true;
    }

    /// Close the batch, persisting once if anything asked for it. Returns
    /// true if the catalog was written.
    pub fn finish_batch_editing(&mut self) -> Result<bool, CatalogError> {
        self.batch_editing = false;
        if !self.dirty {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    // =========================================================================
    // Record mutations
    // =========================================================================

    fn edit(
        &mut self,
        path: &Path,
        change: impl FnOnce(&mut ComicRecord) -> Result<Persist, ComicError>,
    ) -> Result<Persist, CatalogError> {
        let i = self.require(path)?;
        let persist = change(&mut self.records[i])?;
        self.index.add_record(self.records[i].info());
        if persist == Persist::NotNeeded {
            return Ok(persist);
        }

        if self.context.settings().manage_files
            && let Err(e) = self.records[i].relocate()
        {
            warn!(path = %path.display(), error = %e, "cannot move comic to its managed location");
        }
        self.request_persist()?;
        Ok(persist)
    }

    /// Register a tag-change observer on one record.
    pub fn subscribe(
        &mut self,
        path: &Path,
        observer: impl Fn(&TagChange<'_>) + Send + 'static,
    ) -> Result<(), CatalogError> {
        let i = self.require(path)?;
        self.records[i].subscribe(observer);
        Ok(())
    }

    pub fn set_tag(
        &mut self,
        path: &Path,
        tag: Tag,
        value: impl Into<String>,
    ) -> Result<Persist, CatalogError> {
        self.edit(path, |record| record.set_tag(tag, value))
    }

    pub fn set_page_type(
        &mut self,
        path: &Path,
        index: usize,
        page_type: PageType,
    ) -> Result<Persist, CatalogError> {
        self.edit(path, |record| record.set_page_type(index, page_type))
    }

    /// Open an edit transaction on one record.
    pub fn start_editing(&mut self, path: &Path) -> Result<(), CatalogError> {
        let i = self.require(path)?;
        self.records[i].start_editing();
        Ok(())
    }

    pub fn finish_editing(&mut self, path: &Path) -> Result<Persist, CatalogError> {
        self.edit(path, ComicRecord::finish_editing)
    }

    /// Catalog a file from outside the library: its metadata is completed,
    /// the file is moved to its managed destination and the catalog is
    /// persisted. Returns the new path.
    pub fn import(&mut self, source: &Path) -> Result<PathBuf, CatalogError> {
        let mut record = ComicRecord::open(source, Arc::clone(&self.context), None)?.ok_or_else(
            || {
                ComicError::Container(ContainerError::Logic(format!(
                    "{} is an unsupported type",
                    source.display()
                )))
            },
        )?;
        record.relocate()?;

        let path = record.path().to_path_buf();
        if let Some(i) = self.position(&path) {
            self.records.remove(i);
        }
        info!(from = %source.display(), to = %path.display(), "imported comic");
        self.push(record);
        self.request_persist()?;
        Ok(path)
    }

    /// Drop a record without touching the file.
    pub fn remove(&mut self, path: &Path) -> Result<ComicRecord, CatalogError> {
        let i = self.require(path)?;
        let record = self.records.remove(i);
        info!(path = %path.display(), "removed from catalog");
        self.request_persist()?;
        Ok(record)
    }

    /// Drop a record, delete its file and any directories left empty below
    /// its root. The thumbnail goes too unless another record shares it.
    pub fn delete(&mut self, path: &Path) -> Result<(), CatalogError> {
        let record = self.remove(path)?;
        fs::remove_file(path).map_err(CatalogError::file(path))?;
        info!(path = %path.display(), "deleted comic");

        let thumbnail = record.thumbnail_path();
        let shared = self.records.iter().any(|r| r.thumbnail_path() == thumbnail);
        if !shared
            && thumbnail.is_file()
            && let Err(e) = fs::remove_file(&thumbnail)
        {
            warn!(path = %thumbnail.display(), error = %e, "cannot remove thumbnail");
        }

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent);
        }
        Ok(())
    }

    fn prune_empty_dirs(&self, start: &Path) {
        let settings = self.context.settings();
        let Some(root) = settings.roots().into_iter().find(|r| start.starts_with(r)) else {
            return;
        };
        let mut dir = start;
        while dir != root && dir.starts_with(root) {
            // Fails on a non-empty directory, which ends the walk.
            if fs::remove_dir(dir).is_err() {
                break;
            }
            debug!(path = %dir.display(), "removed empty directory");
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    /// Render every missing thumbnail. Returns how many were created.
    pub fn verify_thumbnails(&mut self) -> usize {
        let mut rendered = 0;
        for record in &mut self.records {
            let existed = record.thumbnail_path().is_file();
            record.verify_thumbnail(None);
            if !existed && record.thumbnail_path().is_file() {
                rendered += 1;
            }
        }
        rendered
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn publisher_matches(&self, record: &ComicRecord, publisher: &str) -> bool {
        !self.context.settings().group_by_publisher || record.info().get(Tag::Publisher) == publisher
    }

    fn distinct<'a>(records: impl Iterator<Item = &'a ComicRecord>, tag: Tag) -> Vec<String> {
        records
            .map(|r| r.info().get(tag).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn comics(&self, filter: LibraryFilter) -> impl Iterator<Item = &ComicRecord> {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    /// Distinct publishers, sorted.
    pub fn publishers(&self, filter: LibraryFilter) -> Vec<String> {
        Self::distinct(self.comics(filter), Tag::Publisher)
    }

    /// Distinct series of `publisher`, sorted.
    pub fn series(&self, publisher: &str, filter: LibraryFilter) -> Vec<String> {
        Self::distinct(self.comics_from_publisher(publisher, filter).into_iter(), Tag::Series)
    }

    /// Distinct volumes of a series, sorted.
    pub fn volumes(&self, publisher: &str, series: &str, filter: LibraryFilter) -> Vec<String> {
        Self::distinct(
            self.comics_from_series(publisher, series, filter).into_iter(),
            Tag::Volume,
        )
    }

    pub fn comics_from_publisher(&self, publisher: &str, filter: LibraryFilter) -> Vec<&ComicRecord> {
        self.comics(filter)
            .filter(|r| self.publisher_matches(r, publisher))
            .collect()
    }

    pub fn comics_from_series(
        &self,
        publisher: &str,
        series: &str,
        filter: LibraryFilter,
    ) -> Vec<&ComicRecord> {
        self.comics(filter)
            .filter(|r| self.publisher_matches(r, publisher) && r.info().get(Tag::Series) == series)
            .collect()
    }

    /// Issues of one volume, ordered by issue number.
    pub fn comics_from_volume(
        &self,
        publisher: &str,
        series: &str,
        volume: &str,
        filter: LibraryFilter,
    ) -> Vec<&ComicRecord> {
        let mut comics: Vec<&ComicRecord> = self
            .comics_from_series(publisher, series, filter)
            .into_iter()
            .filter(|r| r.info().get(Tag::Volume) == volume)
            .collect();
        comics.sort_by(|a, b| issue_order(a).total_cmp(&issue_order(b)));
        comics
    }
}

/// Sort key for issue numbers; non-numeric numbers sort last.
fn issue_order(record: &ComicRecord) -> f64 {
    record
        .info()
        .get(Tag::Number)
        .trim()
        .parse()
        .unwrap_or(f64::INFINITY)
}
