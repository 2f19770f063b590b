//! One cataloged comic file.
//!
//! A [`ComicRecord`] ties a path to its content hash, its container kind and
//! its [`ComicInfo`]. Records are built three ways:
//!
//! - [`ComicRecord::open`]: a file found on disk or being imported. Metadata
//!   comes from the catalog's existing record when the hash still matches,
//!   else from the embedded document, else from the file name.
//! - [`ComicRecord::restore`]: an entry read back from `library.xml`. The
//!   stored metadata is trusted only while the stored hash matches.
//! - Both then run the repair pass (page list, required tags, manga flag)
//!   and write any correction straight back into the container. If that
//!   write fails, so does construction.
//!
//! ## Writes
//!
//! Outside an edit transaction every tag change is written through: the
//! metadata is injected, the hash is recomputed, the thumbnail is brought
//! in line, and the setter returns [`Persist::Requested`] so the owner
//! (normally the catalog) re-persists. A failed injection reverts the
//! change, so the in-memory metadata never runs ahead of the file. Inside
//! `start_editing` / `finish_editing` setters only mark the record dirty;
//! the write happens once at the end, and the record stays dirty if it
//! fails.

pub mod filename;
pub mod thumbnail;

use crate::container::{self, Container, ContainerError, ContainerKind};
use crate::context::Context;
use crate::digest;
use crate::metadata::{self, ComicInfo, PageList, PageType, Tag};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ComicError {
    #[error(transparent)]
    Container(#[from] ContainerError),
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
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Metadata(#[from] metadata::XmlError),
}

impl ComicError {
    pub(crate) fn file(path: &Path) -> impl FnOnce(io::Error) -> ComicError + '_ {
        move |source| ComicError::File {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn dir(path: &Path) -> impl FnOnce(io::Error) -> ComicError + '_ {
        move |source| ComicError::Dir {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Tag values filled in when a record has none.
const REQUIRED_TAGS: [(Tag, &str); 4] = [
    (Tag::Publisher, "Unknown Publisher"),
    (Tag::Series, "Unknown Series"),
    (Tag::Volume, UNKNOWN_VOLUME),
    (Tag::Title, "Untitled"),
];

/// Volume placeholder written by the repair pass.
pub const UNKNOWN_VOLUME: &str = "?";

/// A changed tag, delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagChange<'a> {
    pub tag: Tag,
    pub previous: &'a str,
    pub current: &'a str,
}

pub type Observer = Box<dyn Fn(&TagChange<'_>) + Send>;

/// Whether a record mutation needs the catalog to be written again.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    Requested,
    NotNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Completed(Vec<PathBuf>),
    Cancelled,
}

/// A record rebuilt from the catalog file.
#[derive(Debug)]
pub struct Restored {
    pub record: ComicRecord,
    /// The file changed since the catalog was written, or the repair pass
    /// corrected something; the catalog must be persisted again.
    pub refreshed: bool,
}

pub struct ComicRecord {
    path: PathBuf,
    hash: String,
    kind: ContainerKind,
    info: ComicInfo,
    dirty: bool,
    editing: bool,
    snapshot: Option<ComicInfo>,
    observers: Vec<Observer>,
    context: Arc<Context>,
    container: Option<Box<dyn Container>>,
}

impl fmt::Debug for ComicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComicRecord")
            .field("path", &self.path)
            .field("hash", &self.hash)
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("editing", &self.editing)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl ComicRecord {
    fn blank(path: &Path, context: Arc<Context>, hash: String, kind: ContainerKind) -> Self {
        Self {
            path: path.to_path_buf(),
            hash,
            kind,
            info: ComicInfo::new(),
            dirty: false,
            editing: false,
            snapshot: None,
            observers: Vec::new(),
            context,
            container: None,
        }
    }

    /// Build a record for a file on disk. Unsupported file types yield
    /// `Ok(None)`. `known` is the catalog's current record for the same
    /// path, if any.
    pub fn open(
        path: &Path,
        context: Arc<Context>,
        known: Option<&ComicRecord>,
    ) -> Result<Option<Self>, ComicError> {
        if !ContainerKind::from_path(path).is_supported() {
            return Ok(None);
        }
        let hash = digest::hash_file(path).map_err(ComicError::file(path))?;
        Self::open_hashed(path, context, hash, known).map(Some)
    }

    /// [`open`](Self::open) with the content hash already computed.
    pub fn open_hashed(
        path: &Path,
        context: Arc<Context>,
        hash: String,
        known: Option<&ComicRecord>,
    ) -> Result<Self, ComicError> {
        let kind = ContainerKind::from_path(path);
        if !kind.is_supported() {
            return Err(ContainerError::Logic(format!(
                "{} is an unsupported type",
                path.display()
            ))
            .into());
        }
        let mut record = Self::blank(path, context, hash, kind);
        match known.filter(|k| k.hash == record.hash) {
            Some(known) => {
                debug!(path = %path.display(), "hash unchanged, reusing catalog metadata");
                record.info = known.info.clone();
            }
            None => record.populate()?,
        }
        record.repair()?;
        record.verify_thumbnail(None);
        Ok(record)
    }

    /// Rebuild a record from catalog data. Unsupported file types yield
    /// `Ok(None)`.
    pub fn restore(
        path: &Path,
        context: Arc<Context>,
        info: ComicInfo,
        stored_hash: &str,
    ) -> Result<Option<Restored>, ComicError> {
        let kind = ContainerKind::from_path(path);
        if !kind.is_supported() {
            return Ok(None);
        }
        let hash = digest::hash_file(path).map_err(ComicError::file(path))?;
        let mut record = Self::blank(path, context, hash, kind);

        let stale = record.hash != stored_hash;
        if stale {
            info!(path = %path.display(), "file changed since last catalog write, re-reading");
            record.populate()?;
        } else {
            record.info = info;
        }
        let repaired = record.repair()?;
        record.verify_thumbnail(None);
        Ok(Some(Restored {
            record,
            refreshed: stale || repaired,
        }))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name including the extension.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn info(&self) -> &ComicInfo {
        &self.info
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_manga(&self) -> bool {
        self.info.get(Tag::Manga) == "Yes"
    }

    pub fn page_count(&self) -> usize {
        self.info.pages.len()
    }

    /// On-disk size in bytes, if the file is readable.
    pub fn file_size(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        thumbnail::thumbnail_path(&self.context.settings().thumb_dir(), &self.info)
    }

    /// The container, opened on first use.
    fn container(&mut self) -> Result<&mut Box<dyn Container>, ComicError> {
        let opened = match self.container.take() {
            Some(container) => container,
            None => container::open(&self.path, &self.context)?,
        };
        Ok(self.container.insert(opened))
    }

    // =========================================================================
    // Population and repair
    // =========================================================================

    /// Fill `info` from the embedded document, falling back to the file name.
    fn populate(&mut self) -> Result<(), ComicError> {
        self.info = ComicInfo::new();
        let container = self.container()?;
        let embedded = container
            .has_embedded_metadata()
            .then(|| container.read_metadata_bytes());

        match embedded {
            Some(Ok(bytes)) if !bytes.is_empty() => match metadata::decode(&bytes) {
                Ok(decoded) => {
                    self.info = decoded.info;
                    if decoded.pages_repaired {
                        debug!(path = %self.path.display(), "corrected page images");
                        self.dirty = true;
                    }
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "unreadable ComicInfo, parsing file name instead");
                    self.info = ComicInfo::new();
                    self.fill_from_file_name();
                }
            },
            Some(Err(e)) => {
                warn!(path = %self.path.display(), error = %e, "cannot read ComicInfo, parsing file name instead");
                self.fill_from_file_name();
            }
            _ => self.fill_from_file_name(),
        }
        Ok(())
    }

    fn fill_from_file_name(&mut self) {
        filename::parse_file_name(&self.file_name()).apply(&mut self.info);
        self.dirty = true;
    }

    /// Bring the record in line with its container and the settings, writing
    /// any correction back. Returns true if something was corrected.
    fn repair(&mut self) -> Result<bool, ComicError> {
        let mut repaired = false;

        let pages = self.container()?.page_count();
        if self.info.pages.len() != pages {
            debug!(path = %self.path.display(), stored = self.info.pages.len(), pages, "corrected page list");
            self.info.pages = PageList::sequential(pages);
            repaired = true;
        }

        for (tag, fallback) in REQUIRED_TAGS {
            if self.info.get(tag).is_empty() {
                self.info.set(tag, fallback);
                repaired = true;
            }
        }

        let settings = self.context.settings();
        if settings.manga_root().is_some() {
            let flag = if settings.is_manga_path(&self.path) {
                "Yes"
            } else {
                "No"
            };
            if self.info.set(Tag::Manga, flag).is_some() {
                debug!(path = %self.path.display(), flag, "corrected Manga tag");
                repaired = true;
            }
        }

        self.dirty |= repaired;
        if !self.dirty {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Register a callback for every tag change, in subscription order.
    pub fn subscribe(&mut self, observer: impl Fn(&TagChange<'_>) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&self, tag: Tag, previous: &str) {
        let change = TagChange {
            tag,
            previous,
            current: self.info.get(tag),
        };
        for observer in &self.observers {
            observer(&change);
        }
    }

    /// Change one tag. Setting the current value is a no-op.
    ///
    /// Outside a transaction a failed write restores the previous value,
    /// and observers see the change undone.
    pub fn set_tag(&mut self, tag: Tag, value: impl Into<String>) -> Result<Persist, ComicError> {
        let value = value.into();
        let Some(previous) = self.info.set(tag, value.as_str()) else {
            return Ok(Persist::NotNeeded);
        };
        self.notify(tag, &previous);

        if self.editing {
            self.dirty = true;
            return Ok(Persist::NotNeeded);
        }
        let mut before = self.info.clone();
        before.set(tag, previous);
        self.write_through(before).inspect_err(|_| self.notify(tag, &value))
    }

    /// Change the `Type` attribute of one page.
    pub fn set_page_type(&mut self, index: usize, page_type: PageType) -> Result<Persist, ComicError> {
        let before = (!self.editing).then(|| self.info.clone());
        let count = self.info.pages.len();
        let page = self.info.pages.get_mut(index).ok_or_else(|| {
            ContainerError::Logic(format!("page {index} out of range ({count} pages)"))
        })?;
        if page.kind == page_type.as_str() {
            return Ok(Persist::NotNeeded);
        }
        page.kind = page_type.as_str().to_string();

        match before {
            Some(before) => self.write_through(before),
            None => {
                self.dirty = true;
                Ok(Persist::NotNeeded)
            }
        }
    }

    /// Write the metadata into the container, then bring the thumbnail in
    /// line. If the write fails, `info` goes back to `before`.
    fn write_through(&mut self, before: ComicInfo) -> Result<Persist, ComicError> {
        if let Err(e) = self.save() {
            warn!(path = %self.path.display(), error = %e, "metadata not written, reverting");
            self.info = before;
            return Err(e);
        }
        self.verify_thumbnail(Some(&before));
        Ok(Persist::Requested)
    }

    /// Start an edit transaction; setters stop writing through. The
    /// snapshot of an earlier transaction that failed to save is kept.
    pub fn start_editing(&mut self) {
        self.editing = true;
        self.snapshot.get_or_insert_with(|| self.info.clone());
    }

    /// End the transaction, writing everything changed since
    /// [`start_editing`](Self::start_editing) in one go.
    pub fn finish_editing(&mut self) -> Result<Persist, ComicError> {
        let snapshot = self.snapshot.take();
        self.editing = false;
        if !self.dirty {
            return Ok(Persist::NotNeeded);
        }
        if let Err(e) = self.save() {
            self.snapshot = snapshot;
            return Err(e);
        }
        self.verify_thumbnail(snapshot.as_ref());
        Ok(Persist::Requested)
    }

    /// Inject the metadata into the container and refresh the hash. `dirty`
    /// is only cleared once both succeeded.
    pub fn save(&mut self) -> Result<(), ComicError> {
        let bytes = match self.kind {
            ContainerKind::Pdf => metadata::encode_namespaced(&self.info)?,
            _ => metadata::encode(&self.info)?,
        };
        self.container()?.inject_metadata_bytes(&bytes)?;
        self.hash = digest::hash_file(&self.path).map_err(ComicError::file(&self.path))?;
        self.dirty = false;
        info!(path = %self.path.display(), "saved metadata");
        Ok(())
    }

    // =========================================================================
    // Thumbnails
    // =========================================================================

    /// Rename the thumbnail after an identity change and render it if it is
    /// missing. `previous` is the metadata the current thumbnail was named
    /// from. Failures are logged.
    pub fn verify_thumbnail(&mut self, previous: Option<&ComicInfo>) {
        if let Err(e) = self.try_verify_thumbnail(previous) {
            warn!(path = %self.path.display(), error = %e, "thumbnail not updated");
        }
    }

    fn try_verify_thumbnail(&mut self, previous: Option<&ComicInfo>) -> Result<(), ComicError> {
        let context = Arc::clone(&self.context);
        let settings = context.settings();
        let dir = settings.thumb_dir();
        let current = thumbnail::thumbnail_path(&dir, &self.info);

        if let Some(previous) = previous {
            let old = thumbnail::thumbnail_path(&dir, previous);
            if old != current && old.is_file() {
                fs::rename(&old, &current).map_err(ComicError::file(&old))?;
                debug!(from = %old.display(), to = %current.display(), "renamed thumbnail");
            }
            if previous.pages.front_cover() != self.info.pages.front_cover() && current.is_file() {
                fs::remove_file(&current).map_err(ComicError::file(&current))?;
            }
        }

        if current.is_file() {
            return Ok(());
        }
        fs::create_dir_all(&dir).map_err(ComicError::dir(&dir))?;
        let cover = self.info.pages.front_cover();
        let scratch = self.container()?.extract_page(cover)?;
        let rendered = thumbnail::save_scaled(
            &scratch,
            &current,
            Some(settings.thumbnails.size),
            settings.thumbnails.quality,
        );
        fs::remove_file(&scratch).map_err(ComicError::file(&scratch))?;
        rendered?;
        debug!(path = %current.display(), "rendered thumbnail");
        Ok(())
    }

    // =========================================================================
    // Page extraction
    // =========================================================================

    /// Extract page `index` to `dest_dir/file_name`, optionally scaled to fit
    /// a `bound`×`bound` square.
    pub fn extract_page(
        &mut self,
        index: usize,
        dest_dir: &Path,
        file_name: &str,
        bound: Option<u32>,
    ) -> Result<PathBuf, ComicError> {
        let scratch = self.container()?.extract_page(index)?;
        let dest = dest_dir.join(file_name);
        let quality = self.context.settings().thumbnails.quality;
        let saved = thumbnail::save_scaled(&scratch, &dest, bound, quality);
        fs::remove_file(&scratch).map_err(ComicError::file(&scratch))?;
        saved?;
        Ok(dest)
    }

    /// Extract several pages as `page-NNN.jpg` (one-based). `cancel` is
    /// checked before each page; on cancellation every file written by this
    /// call is removed.
    pub fn extract_pages(
        &mut self,
        indices: &[usize],
        dest_dir: &Path,
        bound: Option<u32>,
        cancel: &AtomicBool,
    ) -> Result<Extraction, ComicError> {
        fs::create_dir_all(dest_dir).map_err(ComicError::dir(dest_dir))?;
        let mut written: Vec<PathBuf> = Vec::with_capacity(indices.len());
        for &index in indices {
            if cancel.load(Ordering::Relaxed) {
                for path in &written {
                    if let Err(e) = fs::remove_file(path) {
                        warn!(path = %path.display(), error = %e, "cannot remove partial extraction");
                    }
                }
                info!(path = %self.path.display(), removed = written.len(), "extraction cancelled");
                return Ok(Extraction::Cancelled);
            }
            let name = format!("page-{:03}.jpg", index + 1);
            written.push(self.extract_page(index, dest_dir, &name, bound)?);
        }
        Ok(Extraction::Completed(written))
    }

    // =========================================================================
    // Managed location
    // =========================================================================

    /// Where the file belongs under the configured roots, or `None` when no
    /// root is enabled.
    ///
    /// With file management on:
    /// `<root>/<Publisher>/<Series>/<Volume>/<Series> Vol. V No. N - <Title>.<ext>`,
    /// where an unknown volume (empty or `?`) becomes the `Unknown Volume`
    /// directory and drops out of the file name. Otherwise the file keeps its
    /// name directly under the root.
    pub fn managed_destination(&self) -> Option<PathBuf> {
        let settings = self.context.settings();
        let root = settings
            .manga_root()
            .filter(|_| self.is_manga())
            .or(settings.comics_root())
            .or(settings.manga_root())?;

        if !settings.manage_files {
            return Some(root.join(self.file_name()));
        }

        let series = self.info.get(Tag::Series);
        let volume = match self.info.get(Tag::Volume) {
            "" | UNKNOWN_VOLUME => None,
            v => Some(v),
        };
        let number = self.info.get(Tag::Number);

        let mut name = series.to_string();
        if let Some(volume) = volume {
            name.push_str(&format!(" Vol. {volume}"));
        }
        if !number.is_empty() {
            name.push_str(&format!(" No. {number}"));
        }
        name.push_str(" - ");
        name.push_str(self.info.get(Tag::Title));
        if let Some(ext) = self.path.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }

        Some(
            root.join(path_component(self.info.get(Tag::Publisher)))
                .join(path_component(series))
                .join(path_component(volume.unwrap_or("Unknown Volume")))
                .join(path_component(&name)),
        )
    }

    /// Move the file to [`managed_destination`](Self::managed_destination).
    /// Returns true if it moved.
    pub fn relocate(&mut self) -> Result<bool, ComicError> {
        let Some(dest) = self.managed_destination() else {
            return Ok(false);
        };
        if dest == self.path {
            return Ok(false);
        }
        if dest.exists() {
            return Err(ComicError::File {
                path: dest,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
            });
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(ComicError::dir(parent))?;
        }
        fs::rename(&self.path, &dest).map_err(ComicError::file(&self.path))?;
        info!(from = %self.path.display(), to = %dest.display(), "moved comic");
        self.path = dest;
        self.container = None;
        Ok(true)
    }
}

/// Make a metadata value safe as a single path component.
fn path_component(value: &str) -> String {
    match value {
        "." | ".." => "_".to_string(),
        v => v.replace(['/', '\\'], "-"),
    }
}
