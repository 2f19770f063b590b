//! CLI output formatting.
//!
//! # Information-First Display
//!
//! A comic is shown by its identity (series, volume, number, title) with the
//! file path as an indented `Source:` line beneath it, so listings read as an
//! inventory of issues rather than of files.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Scanned 42 comics: 2 added, 1 replaced, 39 unchanged
//! ```
//!
//! ## List
//!
//! ```text
//! 001 Batman Vol. 2 No. 5 - Night of the Owls
//!     Source: /comics/DC/Batman/2/Batman Vol. 2 No. 5 - Night of the Owls.cbz
//! ```
//!
//! ## Show
//!
//! ```text
//! Batman Vol. 2 No. 5 - Night of the Owls
//!     Source: /comics/owls.cbz
//!     Type: Comic Book Archive (ZIP/cbz)
//!     Pages: 24
//!     Series: Batman
//!     Writer: Scott Snyder
//! ```
//!
//! ## Browse
//!
//! ```text
//! Series (DC)
//! 001 Batman
//! 002 Superman
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::catalog::ScanReport;
use crate::comic::ComicRecord;
use crate::container::ContainerKind;
use crate::metadata::Tag;
use crate::scope::{Row, ScopeNavigator};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Display name of a comic: `Series Vol. V No. N - Title`, leaving out
/// the parts that are empty.
///
/// ```text
/// Batman Vol. 2 No. 5 - Night of the Owls
/// Saga No. 54
/// (scan0001.cbz)         // nothing identifying at all
/// ```
pub fn display_name(record: &ComicRecord) -> String {
    let info = record.info();
    let mut name = info.get(Tag::Series).to_string();
    for (label, tag) in [("Vol.", Tag::Volume), ("No.", Tag::Number)] {
        let value = info.get(tag);
        if !value.is_empty() && value != crate::comic::UNKNOWN_VOLUME {
            name.push_str(&format!(" {label} {value}"));
        }
    }
    let title = info.get(Tag::Title);
    if !title.is_empty() {
        if !name.is_empty() {
            name.push_str(" - ");
        }
        name.push_str(title);
    }
    if name.trim().is_empty() {
        format!("({})", record.file_name())
    } else {
        name.trim().to_string()
    }
}

/// Human-readable byte count.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ============================================================================
// Scan
// ============================================================================

pub fn format_scan_output(report: &ScanReport, total: usize) -> Vec<String> {
    vec![format!("Scanned {total} comics: {report}")]
}

pub fn print_scan_output(report: &ScanReport, total: usize) {
    for line in format_scan_output(report, total) {
        println!("{}", line);
    }
}

// ============================================================================
// List
// ============================================================================

pub fn format_comic_list(records: &[&ComicRecord]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, record) in records.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), display_name(record)));
        lines.push(format!("{}Source: {}", indent(1), record.path().display()));
    }
    if lines.is_empty() {
        lines.push("No comics".to_string());
    }
    lines
}

pub fn print_comic_list(records: &[&ComicRecord]) {
    for line in format_comic_list(records) {
        println!("{}", line);
    }
}

// ============================================================================
// Show
// ============================================================================

pub fn format_comic_detail(record: &ComicRecord) -> Vec<String> {
    let mut lines = vec![
        display_name(record),
        format!("{}Source: {}", indent(1), record.path().display()),
        format!("{}Type: {}", indent(1), record.kind().describe()),
        format!("{}Pages: {}", indent(1), record.page_count()),
    ];
    if let Some(size) = record.file_size() {
        lines.push(format!("{}Size: {}", indent(1), format_size(size)));
    }
    for tag in record.info().tags().filter(|t| !t.value().is_empty()) {
        lines.push(format!("{}{}: {}", indent(1), tag.name(), tag.value()));
    }
    lines
}

pub fn print_comic_detail(record: &ComicRecord) {
    for line in format_comic_detail(record) {
        println!("{}", line);
    }
}

/// Machine-readable form of a record for `show --json`.
#[derive(Debug, Serialize)]
pub struct ComicView<'a> {
    pub path: &'a Path,
    pub hash: &'a str,
    pub kind: ContainerKind,
    pub manga: bool,
    pub size: Option<u64>,
    pub thumbnail: PathBuf,
    /// Non-empty tags by element name.
    pub tags: BTreeMap<&'static str, &'a str>,
    /// Non-empty page attributes, one map per page.
    pub pages: Vec<BTreeMap<&'static str, &'a str>>,
}

impl<'a> ComicView<'a> {
    pub fn new(record: &'a ComicRecord) -> Self {
        let info = record.info();
        Self {
            path: record.path(),
            hash: record.hash(),
            kind: record.kind(),
            manga: record.is_manga(),
            size: record.file_size(),
            thumbnail: record.thumbnail_path(),
            tags: info
                .tags()
                .filter(|t| !t.value().is_empty())
                .map(|t| (t.name(), t.value()))
                .collect(),
            pages: info
                .pages
                .iter()
                .map(|page| {
                    page.attributes()
                        .into_iter()
                        .filter(|(_, value)| !value.is_empty())
                        .collect()
                })
                .collect(),
        }
    }
}

pub fn print_comic_json(record: &ComicRecord) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(&ComicView::new(record))?);
    Ok(())
}

// ============================================================================
// Browse
// ============================================================================

pub fn format_scope_rows(nav: &ScopeNavigator, rows: &[Row<'_>]) -> Vec<String> {
    let crumb = nav.breadcrumb();
    let mut lines = vec![if crumb.is_empty() {
        nav.level().to_string()
    } else {
        format!("{} ({})", nav.level(), crumb)
    }];
    for (i, row) in rows.iter().enumerate() {
        match row {
            Row::Aggregate(name) => lines.push(format!("{} {}", format_index(i + 1), name)),
            Row::Comic(record) => {
                lines.push(format!("{} {}", format_index(i + 1), display_name(record)));
                lines.push(format!("{}Source: {}", indent(1), record.path().display()));
            }
        }
    }
    lines
}

pub fn print_scope_rows(nav: &ScopeNavigator, rows: &[Row<'_>]) {
    for line in format_scope_rows(nav, rows) {
        println!("{}", line);
    }
}

// ============================================================================
// Extract and thumbnails
// ============================================================================

pub fn format_extracted(paths: &[PathBuf]) -> Vec<String> {
    let mut lines: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    lines.push(format!("Extracted {} pages", paths.len()));
    lines
}

pub fn print_extracted(paths: &[PathBuf]) {
    for line in format_extracted(paths) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::metadata::{ComicInfo, PageList};
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn record(shelf: &Shelf, name: &str, info: Option<&ComicInfo>) -> ComicRecord {
        let path = shelf.add_comic(name, 2, info);
        ComicRecord::open(&path, shelf.context.clone(), None)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn display_name_full_identity() {
        let tmp = TempDir::new().unwrap();
        let shelf = Shelf::new(tmp.path());
        let info = sample_info("Batman", "2", "5", "Night of the Owls");
        let r = record(&shelf, "owls.cbz", Some(&info));
        assert_eq!(display_name(&r), "Batman Vol. 2 No. 5 - Night of the Owls");
    }

    #[test]
    fn display_name_skips_unknown_volume() {
        let tmp = TempDir::new().unwrap();
        let shelf = Shelf::new(tmp.path());
        let r = record(&shelf, "Saga #54.cbz", None);
        assert_eq!(display_name(&r), "Saga No. 54 - Untitled");
    }

    #[test]
    fn size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }

    #[test]
    fn scan_line() {
        let report = ScanReport {
            added: 2,
            replaced: 1,
            unchanged: 39,
            ..Default::default()
        };
        assert_eq!(
            format_scan_output(&report, 42),
            vec!["Scanned 42 comics: 2 added, 1 replaced, 39 unchanged"]
        );
    }

    #[test]
    fn list_with_sources() {
        let tmp = TempDir::new().unwrap();
        let shelf = Shelf::new(tmp.path());
        let r = record(&shelf, "owls.cbz", Some(&sample_info("Batman", "2", "5", "Owls")));
        let lines = format_comic_list(&[&r]);
        assert_eq!(lines[0], "001 Batman Vol. 2 No. 5 - Owls");
        assert_eq!(lines[1], format!("    Source: {}", r.path().display()));
        assert_eq!(format_comic_list(&[]), vec!["No comics"]);
    }

    #[test]
    fn detail_lists_non_empty_tags_in_schema_order() {
        let tmp = TempDir::new().unwrap();
        let shelf = Shelf::new(tmp.path());
        let r = record(&shelf, "owls.cbz", Some(&sample_info("Batman", "2", "5", "Owls")));
        let lines = format_comic_detail(&r);
        assert_eq!(lines[2], "    Type: Comic Book Archive (ZIP/cbz)");
        assert_eq!(lines[3], "    Pages: 2");
        let title = lines.iter().position(|l| l == "    Title: Owls").unwrap();
        let series = lines.iter().position(|l| l == "    Series: Batman").unwrap();
        assert!(title < series);
        assert!(!lines.iter().any(|l| l.starts_with("    Writer:")));
    }

    #[test]
    fn json_view() {
        let tmp = TempDir::new().unwrap();
        let shelf = Shelf::new(tmp.path());
        let mut info = sample_info("Batman", "2", "5", "Owls");
        info.pages = PageList::sequential(2);
        let r = record(&shelf, "owls.cbz", Some(&info));

        let json = serde_json::to_value(ComicView::new(&r)).unwrap();
        assert_eq!(json["tags"]["Series"], "Batman");
        assert!(json["tags"].get("Writer").is_none());
        assert_eq!(json["pages"].as_array().unwrap().len(), 2);
        assert_eq!(json["pages"][1]["Image"], "1");
        assert_eq!(json["hash"], r.hash());
        assert_eq!(json["manga"], false);
    }

    #[test]
    fn scope_rows_with_breadcrumb() {
        let tmp = TempDir::new().unwrap();
        let shelf = Shelf::new(tmp.path());
        shelf.add_comic("a.cbz", 1, Some(&sample_info("Batman", "1", "1", "A")));
        let mut catalog = Catalog::new(shelf.context.clone());
        catalog.scan().unwrap();

        let mut nav = ScopeNavigator::new(true);
        assert_eq!(format_scope_rows(&nav, &nav.rows(&catalog)), vec!["Publisher", "001 DC"]);
        nav.drill_in("DC").unwrap();
        assert_eq!(
            format_scope_rows(&nav, &nav.rows(&catalog)),
            vec!["Series (DC)", "001 Batman"]
        );
    }

    #[test]
    fn extracted_summary() {
        let lines = format_extracted(&[PathBuf::from("/out/page-001.jpg")]);
        assert_eq!(lines, vec!["/out/page-001.jpg", "Extracted 1 pages"]);
    }
}
