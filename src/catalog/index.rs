//! Distinct tag values across the catalog, for completion.
//!
//! Values are added as records enter the catalog and whenever a tag changes.
//! Nothing is ever removed during a session, so a completion list may still
//! offer a value no record carries any more.

use crate::metadata::{ComicInfo, Tag};
use std::collections::{BTreeMap, BTreeSet};

/// Tags with a completion index.
pub const INDEXED_TAGS: [Tag; 14] = [
    Tag::Series,
    Tag::AlternateSeries,
    Tag::Writer,
    Tag::Penciller,
    Tag::Inker,
    Tag::Colorist,
    Tag::Letterer,
    Tag::CoverArtist,
    Tag::Editor,
    Tag::Publisher,
    Tag::Imprint,
    Tag::Genre,
    Tag::LanguageISO,
    Tag::Format,
];

#[derive(Debug, Default, Clone)]
pub struct AttributeIndex {
    values: BTreeMap<Tag, BTreeSet<String>>,
}

impl AttributeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_indexed(tag: Tag) -> bool {
        INDEXED_TAGS.contains(&tag)
    }

    /// Index every indexed tag of `info`.
    pub fn add_record(&mut self, info: &ComicInfo) {
        for tag in INDEXED_TAGS {
            self.add_value(tag, info.get(tag));
        }
    }

    /// Index one value. Genre lists are split on commas.
    pub fn add_value(&mut self, tag: Tag, value: &str) {
        if !Self::is_indexed(tag) {
            return;
        }
        let set = self.values.entry(tag).or_default();
        let parts: Vec<&str> = if tag == Tag::Genre {
            value.split(',').map(str::trim).collect()
        } else {
            vec![value.trim()]
        };
        for part in parts.into_iter().filter(|p| !p.is_empty()) {
            if !set.contains(part) {
                set.insert(part.to_string());
            }
        }
    }

    /// Sorted values seen for `tag`.
    pub fn values(&self, tag: Tag) -> Vec<&str> {
        self.values
            .get(&tag)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Sorted values of `tag` starting with `prefix`, ignoring ASCII case.
    pub fn complete(&self, tag: Tag, prefix: &str) -> Vec<&str> {
        let prefix = prefix.to_ascii_lowercase();
        self.values(tag)
            .into_iter()
            .filter(|v| v.to_ascii_lowercase().starts_with(&prefix))
            .collect()
    }
}
