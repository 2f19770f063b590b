//! Shared test utilities for the comic-shelf test suite.
//!
//! Tests never shell out to real archive tools. [`FakeTools`] implements the
//! `7z` / `rar` / `pdftoppm` command contract over a plain-text stand-in
//! archive format, so records and the catalog exercise the real container
//! code paths (listing parser, injection, extraction) against files in a
//! temp directory.
//!
//! A fake archive is a text file:
//!
//! ```text
//! #fake-archive
//! 001.jpg
//! 002.jpg
//! #comicinfo
//! <?xml version="1.0"?><ComicInfo>...</ComicInfo>
//! ```
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let shelf = Shelf::new(tmp.path());
//! let path = shelf.add_comic("Batman 001.cbz", 3, None);
//! let record = ComicRecord::open(&path, shelf.context.clone(), None).unwrap().unwrap();
//! assert_eq!(read_fake_archive(&path).entries.len(), 4);
//! ```

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lopdf::{Document, Object, dictionary};

use crate::config::{RootConfig, Settings};
use crate::container::archive::{LISTING_HEADER, LISTING_SEPARATOR};
use crate::container::{ContainerError, ToolOutput, ToolRunner};
use crate::context::Context;
use crate::metadata::{self, ComicInfo, Tag};

const ARCHIVE_MAGIC: &str = "#fake-archive";
const METADATA_MARKER: &str = "#comicinfo";

// =========================================================================
// Fake archive files
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FakeArchive {
    pub entries: Vec<String>,
    pub xml: Option<Vec<u8>>,
}

/// Entry names for `count` page images: `001.jpg`, `002.jpg`, ...
pub fn page_entries(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{i:03}.jpg")).collect()
}

pub fn write_fake_archive(path: &Path, entries: &[String], xml: Option<&[u8]>) {
    let mut bytes = format!("{ARCHIVE_MAGIC}\n").into_bytes();
    for entry in entries {
        bytes.extend_from_slice(entry.as_bytes());
        bytes.push(b'\n');
    }
    if let Some(xml) = xml {
        bytes.extend_from_slice(METADATA_MARKER.as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(xml);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

pub fn read_fake_archive(path: &Path) -> FakeArchive {
    let bytes = fs::read(path).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    let (listing, xml) = match text.split_once(&format!("{METADATA_MARKER}\n")) {
        Some((listing, xml)) => (listing.to_string(), Some(xml.as_bytes().to_vec())),
        None => (text.to_string(), None),
    };
    let mut lines = listing.lines();
    assert_eq!(lines.next(), Some(ARCHIVE_MAGIC), "{} is not a fake archive", path.display());
    FakeArchive {
        entries: lines.filter(|l| !l.is_empty()).map(str::to_string).collect(),
        xml,
    }
}

/// Write a small solid-colour image; the format follows the extension.
pub fn write_image(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    image::RgbImage::from_pixel(width, height, image::Rgb([180, 40, 40]))
        .save(path)
        .unwrap();
}

/// Write a minimal valid PDF with `pages` empty letter-size pages.
pub fn write_pdf(path: &Path, pages: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    doc.save(path).unwrap();
}

/// Metadata with the identifying fields and a publisher filled in.
pub fn sample_info(series: &str, volume: &str, number: &str, title: &str) -> ComicInfo {
    let mut info = ComicInfo::new();
    info.set(Tag::Publisher, "DC");
    info.set(Tag::Series, series);
    info.set(Tag::Volume, volume);
    info.set(Tag::Number, number);
    info.set(Tag::Title, title);
    info
}

// =========================================================================
// Fake tool runner
// =========================================================================

/// Scripted stand-in for `7z`, `rar` and `pdftoppm`.
#[derive(Default)]
pub struct FakeTools {
    calls: Mutex<Vec<Vec<String>>>,
    broken: Mutex<Vec<String>>,
}

fn failure(message: &str) -> ToolOutput {
    ToolOutput {
        code: Some(2),
        stdout: Vec::new(),
        stderr: message.as_bytes().to_vec(),
    }
}

fn success(stdout: Vec<u8>) -> ToolOutput {
    ToolOutput {
        code: Some(0),
        stdout,
        stderr: Vec::new(),
    }
}

impl FakeTools {
    pub fn get_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls to `program` whose first argument is `verb`.
    pub fn count(&self, program: &str, verb: &str) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| c[0] == program && c.get(1).is_some_and(|a| a == verb))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every later call to `program` exit non-zero.
    pub fn break_tool(&self, program: &str) {
        self.broken.lock().unwrap().push(program.to_string());
    }

    pub fn fix_tool(&self, program: &str) {
        self.broken.lock().unwrap().retain(|p| p != program);
    }

    fn list(&self, path: &str) -> ToolOutput {
        if !Path::new(path).is_file() {
            return failure("Can not open the file as archive");
        }
        let archive = read_fake_archive(Path::new(path));
        let mut out = format!("\n7-Zip (fake)\n\nListing archive: {path}\n\n{LISTING_HEADER}\n{LISTING_SEPARATOR}\n");
        let names = archive
            .entries
            .iter()
            .map(String::as_str)
            .chain(archive.xml.as_ref().map(|_| "ComicInfo.xml"));
        for name in names {
            out.push_str(&format!("2020-01-01 00:00:00 ....A         1000          900  {name}\n"));
        }
        out.push_str(LISTING_SEPARATOR);
        out.push('\n');
        success(out.into_bytes())
    }

    fn read_metadata(&self, path: &str) -> ToolOutput {
        match read_fake_archive(Path::new(path)).xml {
            Some(xml) => success(xml),
            None => failure("No files to process"),
        }
    }

    fn extract(&self, path: &str, entry: &str, out_flag: &str) -> ToolOutput {
        let archive = read_fake_archive(Path::new(path));
        if !archive.entries.iter().any(|e| e == entry) {
            return failure("No files to process");
        }
        let Some(dir) = out_flag.strip_prefix("-o") else {
            return failure("missing -o switch");
        };
        let Some(base) = Path::new(entry).file_name() else {
            return failure("bad entry");
        };
        write_image(&Path::new(dir).join(base), 60, 90);
        success(b"Everything is Ok".to_vec())
    }

    fn update(&self, path: &str, scratch: &str) -> ToolOutput {
        let archive = read_fake_archive(Path::new(path));
        let Ok(xml) = fs::read(scratch) else {
            return failure("cannot find scratch file");
        };
        write_fake_archive(Path::new(path), &archive.entries, Some(&xml));
        success(b"Everything is Ok".to_vec())
    }

    fn render(&self, prefix: &str) -> ToolOutput {
        write_image(&PathBuf::from(format!("{prefix}.jpg")), 85, 110);
        success(Vec::new())
    }
}

impl ToolRunner for FakeTools {
    fn run(&self, program: &str, args: &[&OsStr]) -> Result<ToolOutput, ContainerError> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);

        if self.broken.lock().unwrap().iter().any(|p| p == program) {
            return Ok(failure("tool is broken"));
        }

        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        let output = match (program, arg(0)) {
            ("7z", "l") => self.list(arg(1)),
            ("7z", "e") if arg(1) == "-so" => self.read_metadata(arg(2)),
            ("7z", "e") => self.extract(arg(1), arg(2), arg(4)),
            ("7z", "u") | ("rar", "u") => self.update(arg(2), arg(3)),
            ("pdftoppm", _) => self.render(args.last().map(String::as_str).unwrap_or_default()),
            _ => failure("unexpected invocation"),
        };
        Ok(output)
    }
}

// =========================================================================
// Shelf: settings + context + fixture builders in one temp dir
// =========================================================================

pub struct Shelf {
    pub base: PathBuf,
    pub tools: Arc<FakeTools>,
    pub context: Arc<Context>,
}

impl Shelf {
    pub fn new(base: &Path) -> Self {
        Self::with(base, |_| {})
    }

    /// Shelf with settings adjusted by `configure` before the context is built.
    pub fn with(base: &Path, configure: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings {
            data_dir: base.join("data"),
            comics: RootConfig {
                enabled: true,
                dir: base.join("Comics"),
            },
            manga: RootConfig {
                enabled: false,
                dir: base.join("Manga"),
            },
            ..Settings::default()
        };
        configure(&mut settings);
        settings.prepare_dirs().unwrap();
        let tools = Arc::new(FakeTools::default());
        let context = Context::with_runner(settings, tools.clone());
        Self {
            base: base.to_path_buf(),
            tools,
            context,
        }
    }

    /// Shelf with the manga root enabled.
    pub fn with_manga(base: &Path) -> Self {
        Self::with(base, |s| s.manga.enabled = true)
    }

    pub fn settings(&self) -> &Settings {
        self.context.settings()
    }

    pub fn comics_root(&self) -> PathBuf {
        self.settings().comics.dir.clone()
    }

    pub fn manga_root(&self) -> PathBuf {
        self.settings().manga.dir.clone()
    }

    /// Fake archive under the comics root with `pages` images and optional
    /// embedded metadata.
    pub fn add_comic(&self, rel: &str, pages: usize, info: Option<&ComicInfo>) -> PathBuf {
        let path = self.comics_root().join(rel);
        let xml = info.map(|i| metadata::encode(i).unwrap());
        write_fake_archive(&path, &page_entries(pages), xml.as_deref());
        path
    }

    pub fn add_manga(&self, rel: &str, pages: usize, info: Option<&ComicInfo>) -> PathBuf {
        let path = self.manga_root().join(rel);
        let xml = info.map(|i| metadata::encode(i).unwrap());
        write_fake_archive(&path, &page_entries(pages), xml.as_deref());
        path
    }

    pub fn add_pdf(&self, rel: &str, pages: usize) -> PathBuf {
        let path = self.comics_root().join(rel);
        write_pdf(&path, pages);
        path
    }

    /// Embedded metadata of a fake archive, decoded.
    pub fn embedded(&self, path: &Path) -> Option<ComicInfo> {
        read_fake_archive(path)
            .xml
            .map(|xml| metadata::decode(&xml).unwrap().info)
    }
}
