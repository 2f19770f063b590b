//! Archive containers (7z, zip and rar families) driven through 7-Zip.
//!
//! ## Listing contract
//!
//! `7z l <archive>` prints a fixed-width table. The column header line fixes
//! where the `Name` column starts; dashed separator lines open and close the
//! block of entries:
//!
//! ```text
//!    Date      Time    Attr         Size   Compressed  Name
//! ------------------- ----- ------------ ------------  ------------------------
//! 2014-03-02 10:11:12 ....A       482113       470001  Batman 001/01.jpg
//! 2014-03-02 10:11:12 ....A          911          402  ComicInfo.xml
//! ------------------- ----- ------------ ------------  ------------------------
//! 2014-03-02 10:11:12             483024       470403  2 files
//! ```
//!
//! Entries are the text from the `Name` offset on every line between a
//! pair of separators. Anything else in the output is ignored.
//!
//! ## Commands
//!
//! | Operation | Command |
//! |---|---|
//! | list | `7z l <archive>` |
//! | read metadata | `7z e -so <archive> ComicInfo.xml` |
//! | inject (7z, zip) | `7z u -t<type> <archive> <tmp>/ComicInfo.xml` |
//! | inject (rar) | `rar u -ep <archive> <tmp>/ComicInfo.xml` |
//! | extract page | `7z e <archive> <entry> -aoa -o<tmp>` |

use super::{
    ArchiveFormat, Container, ContainerError, ContainerKind, METADATA_ENTRY, is_page_image,
};
use crate::context::Context;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Column header line of `7z l` output.
pub const LISTING_HEADER: &str = "   Date      Time    Attr         Size   Compressed  Name";

/// Separator line bracketing the entry block of `7z l` output.
pub const LISTING_SEPARATOR: &str =
    "------------------- ----- ------------ ------------  ------------------------";

/// Parse entry names out of `7z l` output.
pub fn parse_listing(text: &str) -> Vec<String> {
    let mut name_offset = None;
    let mut in_content = false;
    let mut entries = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim_end() == LISTING_HEADER {
            name_offset = line.find("Name");
        } else if line.trim_end() == LISTING_SEPARATOR {
            in_content = !in_content;
        } else if in_content
            && let Some(name) = name_offset.and_then(|offset| line.get(offset..))
            && !name.is_empty()
        {
            entries.push(name.to_string());
        }
    }
    entries
}

pub struct ArchiveContainer {
    path: PathBuf,
    format: ArchiveFormat,
    entries: Vec<String>,
    context: Arc<Context>,
}

impl ArchiveContainer {
    /// List the archive once; the entry list is cached for the container's
    /// lifetime and updated locally after an injection.
    pub fn open(
        path: &Path,
        format: ArchiveFormat,
        context: Arc<Context>,
    ) -> Result<Self, ContainerError> {
        let seven_zip = &context.settings().tools.seven_zip;
        let output = context.run_tool(seven_zip, &[OsStr::new("l"), path.as_os_str()])?;
        let entries = parse_listing(&output.stdout_text());
        debug!(path = %path.display(), entries = entries.len(), "listed archive");
        Ok(Self {
            path: path.to_path_buf(),
            format,
            entries,
            context,
        })
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Page image entries in listing order.
    pub fn image_entries(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(String::as_str)
            .filter(|e| is_page_image(e))
    }

    fn metadata_entry(&self) -> Option<&str> {
        self.entries
            .iter()
            .map(String::as_str)
            .find(|e| e.eq_ignore_ascii_case(METADATA_ENTRY))
    }

    fn scratch_dir(&self) -> Result<PathBuf, ContainerError> {
        let dir = self.context.settings().temp_dir();
        fs::create_dir_all(&dir).map_err(ContainerError::file(&dir))?;
        Ok(dir)
    }
}

impl Container for ArchiveContainer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Archive(self.format)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn list_entries(&self) -> Vec<String> {
        self.entries.clone()
    }

    fn page_count(&self) -> usize {
        self.image_entries().count()
    }

    fn has_embedded_metadata(&self) -> bool {
        self.metadata_entry().is_some()
    }

    fn read_metadata_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        let entry = self.metadata_entry().ok_or_else(|| {
            ContainerError::Logic(format!(
                "{} has no {METADATA_ENTRY}",
                self.path.display()
            ))
        })?;
        let seven_zip = &self.context.settings().tools.seven_zip;
        let output = self.context.run_tool(
            seven_zip,
            &[
                OsStr::new("e"),
                OsStr::new("-so"),
                self.path.as_os_str(),
                OsStr::new(entry),
            ],
        )?;
        Ok(output.stdout)
    }

    fn inject_metadata_bytes(&mut self, bytes: &[u8]) -> Result<(), ContainerError> {
        let scratch = self.scratch_dir()?.join(METADATA_ENTRY);
        fs::write(&scratch, bytes).map_err(ContainerError::file(&scratch))?;

        let tools = &self.context.settings().tools;
        match self.format {
            ArchiveFormat::Rar => self.context.run_tool(
                &tools.rar,
                &[
                    OsStr::new("u"),
                    OsStr::new("-ep"),
                    self.path.as_os_str(),
                    scratch.as_os_str(),
                ],
            )?,
            format => {
                let type_flag = format!("-t{}", format.type_flag());
                self.context.run_tool(
                    &tools.seven_zip,
                    &[
                        OsStr::new("u"),
                        OsStr::new(&type_flag),
                        self.path.as_os_str(),
                        scratch.as_os_str(),
                    ],
                )?
            }
        };
        fs::remove_file(&scratch).map_err(ContainerError::file(&scratch))?;

        if self.metadata_entry().is_none() {
            self.entries.push(METADATA_ENTRY.to_string());
        }
        info!(path = %self.path.display(), bytes = bytes.len(), "injected metadata");
        Ok(())
    }

    fn extract_page(&self, index: usize) -> Result<PathBuf, ContainerError> {
        let count = self.page_count();
        let entry = self.image_entries().nth(index).ok_or_else(|| {
            ContainerError::Logic(format!(
                "page {index} out of range for {} ({count} pages)",
                self.path.display()
            ))
        })?;

        let dir = self.scratch_dir()?;
        let mut out_flag = OsString::from("-o");
        out_flag.push(&dir);
        let seven_zip = &self.context.settings().tools.seven_zip;
        self.context.run_tool(
            seven_zip,
            &[
                OsStr::new("e"),
                self.path.as_os_str(),
                OsStr::new(entry),
                OsStr::new("-aoa"),
                &out_flag,
            ],
        )?;

        // `7z e` flattens directories, so the page lands under its base name.
        let base = Path::new(entry)
            .file_name()
            .ok_or_else(|| ContainerError::Logic(format!("entry '{entry}' has no file name")))?;
        let extracted = dir.join(base);
        if !extracted.is_file() {
            return Err(ContainerError::Process(format!(
                "{seven_zip} reported success but {} is missing",
                extracted.display()
            )));
        }
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::container::process::tests::{RecordingRunner, ok_output};
    use crate::container::ToolOutput;
    use tempfile::TempDir;

    fn listing(names: &[&str]) -> String {
        let mut out = String::from(
            "\n7-Zip [64] 16.02 : Copyright (c) 1999-2016 Igor Pavlov : 2016-05-21\n\n\
             Scanning the drive for archives:\n1 file, 483024 bytes (472 KiB)\n\n\
             Listing archive: issue.cbz\n\n--\nPath = issue.cbz\nType = zip\n\n",
        );
        out.push_str(LISTING_HEADER);
        out.push('\n');
        out.push_str(LISTING_SEPARATOR);
        out.push('\n');
        for name in names {
            out.push_str("2014-03-02 10:11:12 ....A       482113       470001  ");
            out.push_str(name);
            out.push('\n');
        }
        out.push_str(LISTING_SEPARATOR);
        out.push('\n');
        out.push_str("2014-03-02 10:11:12             483024       470403  2 files\n");
        out
    }

    fn setup(tmp: &TempDir, outputs: Vec<ToolOutput>) -> (Arc<RecordingRunner>, Arc<Context>) {
        let settings = Settings {
            data_dir: tmp.path().join("data"),
            ..Settings::default()
        };
        let runner = Arc::new(RecordingRunner::with_outputs(outputs));
        let context = Context::with_runner(settings, runner.clone());
        (runner, context)
    }

    // =========================================================================
    // parse_listing
    // =========================================================================

    #[test]
    fn parse_listing_reads_names_between_separators() {
        let text = listing(&["01.jpg", "sub dir/02.png", "ComicInfo.xml"]);
        assert_eq!(
            parse_listing(&text),
            vec!["01.jpg", "sub dir/02.png", "ComicInfo.xml"]
        );
    }

    #[test]
    fn parse_listing_ignores_summary_after_closing_separator() {
        let entries = parse_listing(&listing(&["01.jpg"]));
        assert!(!entries.iter().any(|e| e.contains("files")));
    }

    #[test]
    fn parse_listing_handles_crlf() {
        let text = listing(&["01.jpg"]).replace('\n', "\r\n");
        assert_eq!(parse_listing(&text), vec!["01.jpg"]);
    }

    #[test]
    fn parse_listing_without_header_is_empty() {
        let text = format!("{LISTING_SEPARATOR}\nfoo\n{LISTING_SEPARATOR}\n");
        assert!(parse_listing(&text).is_empty());
        assert!(parse_listing("").is_empty());
    }

    // =========================================================================
    // ArchiveContainer
    // =========================================================================

    #[test]
    fn open_lists_and_counts_images() {
        let tmp = TempDir::new().unwrap();
        let listing = listing(&["scans/", "scans/01.jpg", "scans/02.JPG", "notes.txt"]);
        let (runner, context) = setup(&tmp, vec![ok_output(&listing)]);
        let path = tmp.path().join("issue.cbz");

        let archive = ArchiveContainer::open(&path, ArchiveFormat::Zip, context).unwrap();
        assert_eq!(archive.page_count(), 2);
        assert_eq!(archive.list_entries().len(), 4);
        assert!(!archive.has_embedded_metadata());
        assert_eq!(
            runner.get_calls(),
            vec![vec!["7z".to_string(), "l".into(), path.display().to_string()]]
        );
    }

    #[test]
    fn metadata_entry_matches_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let (runner, context) = setup(
            &tmp,
            vec![
                ok_output(&listing(&["01.jpg", "comicinfo.XML"])),
                ok_output("<ComicInfo/>"),
            ],
        );
        let path = tmp.path().join("issue.cb7");
        let archive = ArchiveContainer::open(&path, ArchiveFormat::SevenZip, context).unwrap();
        assert!(archive.has_embedded_metadata());

        assert_eq!(archive.read_metadata_bytes().unwrap(), b"<ComicInfo/>");
        let calls = runner.get_calls();
        assert_eq!(calls[1][1..3], ["e".to_string(), "-so".to_string()]);
        assert_eq!(calls[1][4], "comicinfo.XML");
    }

    #[test]
    fn read_metadata_without_entry_is_logic_error() {
        let tmp = TempDir::new().unwrap();
        let (_, context) = setup(&tmp, vec![ok_output(&listing(&["01.jpg"]))]);
        let archive =
            ArchiveContainer::open(&tmp.path().join("a.cbz"), ArchiveFormat::Zip, context).unwrap();
        assert!(matches!(
            archive.read_metadata_bytes(),
            Err(ContainerError::Logic(_))
        ));
    }

    #[test]
    fn inject_uses_typed_update_for_zip() {
        let tmp = TempDir::new().unwrap();
        let (runner, context) = setup(
            &tmp,
            vec![ok_output(&listing(&["01.jpg"])), ok_output("Everything is Ok")],
        );
        let path = tmp.path().join("a.cbz");
        let mut archive = ArchiveContainer::open(&path, ArchiveFormat::Zip, context).unwrap();

        archive.inject_metadata_bytes(b"<ComicInfo/>").unwrap();

        let scratch = tmp.path().join("data/tmp/ComicInfo.xml");
        let calls = runner.get_calls();
        assert_eq!(
            calls[1],
            vec![
                "7z".to_string(),
                "u".into(),
                "-tzip".into(),
                path.display().to_string(),
                scratch.display().to_string(),
            ]
        );
        assert!(!scratch.exists());
        assert!(archive.has_embedded_metadata());
        assert_eq!(archive.page_count(), 1);
    }

    #[test]
    fn inject_uses_rar_with_path_flag() {
        let tmp = TempDir::new().unwrap();
        let (runner, context) = setup(
            &tmp,
            vec![ok_output(&listing(&["01.jpg"])), ok_output("Done")],
        );
        let path = tmp.path().join("a.cbr");
        let mut archive = ArchiveContainer::open(&path, ArchiveFormat::Rar, context).unwrap();
        archive.inject_metadata_bytes(b"<ComicInfo/>").unwrap();

        let calls = runner.get_calls();
        assert_eq!(calls[1][..3], ["rar".to_string(), "u".into(), "-ep".into()]);
    }

    #[test]
    fn failed_inject_leaves_scratch_file() {
        let tmp = TempDir::new().unwrap();
        let failure = ToolOutput {
            code: Some(2),
            stdout: Vec::new(),
            stderr: b"E_FAIL".to_vec(),
        };
        let (_, context) = setup(&tmp, vec![ok_output(&listing(&["01.jpg"])), failure]);
        let mut archive =
            ArchiveContainer::open(&tmp.path().join("a.cbz"), ArchiveFormat::Zip, context).unwrap();

        let err = archive.inject_metadata_bytes(b"<ComicInfo/>").unwrap_err();
        assert!(matches!(err, ContainerError::Process(_)));
        assert!(tmp.path().join("data/tmp/ComicInfo.xml").exists());
        assert!(!archive.has_embedded_metadata());
    }

    #[test]
    fn extract_page_pulls_nth_image() {
        let tmp = TempDir::new().unwrap();
        let (runner, context) = setup(
            &tmp,
            vec![
                ok_output(&listing(&["ComicInfo.xml", "x/01.jpg", "x/02.jpg"])),
                ok_output("Everything is Ok"),
            ],
        );
        let path = tmp.path().join("a.cbz");
        let archive = ArchiveContainer::open(&path, ArchiveFormat::Zip, context).unwrap();

        // Stand in for 7z writing the file.
        let scratch = tmp.path().join("data/tmp");
        fs::create_dir_all(&scratch).unwrap();
        fs::write(scratch.join("02.jpg"), b"jpeg").unwrap();

        let extracted = archive.extract_page(1).unwrap();
        assert_eq!(extracted, scratch.join("02.jpg"));
        let calls = runner.get_calls();
        assert_eq!(calls[1][3], "x/02.jpg");
        assert_eq!(calls[1][4], "-aoa");
        assert_eq!(calls[1][5], format!("-o{}", scratch.display()));
    }

    #[test]
    fn extract_page_out_of_range_is_logic_error() {
        let tmp = TempDir::new().unwrap();
        let (runner, context) = setup(&tmp, vec![ok_output(&listing(&["01.jpg"]))]);
        let archive =
            ArchiveContainer::open(&tmp.path().join("a.cbz"), ArchiveFormat::Zip, context).unwrap();
        assert!(matches!(
            archive.extract_page(1),
            Err(ContainerError::Logic(_))
        ));
        assert_eq!(runner.get_calls().len(), 1);
    }

    #[test]
    fn extract_page_missing_output_is_process_error() {
        let tmp = TempDir::new().unwrap();
        let (_, context) = setup(
            &tmp,
            vec![ok_output(&listing(&["01.jpg"])), ok_output("Everything is Ok")],
        );
        let archive =
            ArchiveContainer::open(&tmp.path().join("a.cbz"), ArchiveFormat::Zip, context).unwrap();
        assert!(matches!(
            archive.extract_page(0),
            Err(ContainerError::Process(_))
        ));
    }

    #[test]
    fn listing_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let failure = ToolOutput {
            code: Some(2),
            stdout: Vec::new(),
            stderr: b"Can not open the file as archive".to_vec(),
        };
        let (_, context) = setup(&tmp, vec![failure]);
        let result = ArchiveContainer::open(&tmp.path().join("a.cbz"), ArchiveFormat::Zip, context);
        assert!(matches!(result, Err(ContainerError::Process(_))));
    }
}
