//! Drill-down navigation over the catalog.
//!
//! ```text
//! Publisher ──drill──▶ Series ──drill──▶ Volume ──drill──▶ Title
//!     ▲                  │                 │                 │
//!     └──────back────────┴──────back───────┴──────back───────┘
//!
//! UserList ──back──▶ root
//! ```
//!
//! With publisher grouping off there is no Publisher level: Series is the
//! root and the publisher key is fixed to [`ALL_PUBLISHERS`]. Title and
//! UserList list comics; activating a row there opens the comic.

use crate::catalog::{ALL_PUBLISHERS, Catalog, LibraryFilter};
use crate::comic::ComicRecord;
use crate::config::Settings;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Publisher,
    Series,
    Volume,
    Title,
    UserList,
}

impl Level {
    /// Levels whose rows are comics rather than aggregate values.
    pub fn is_terminal(self) -> bool {
        matches!(self, Level::Title | Level::UserList)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Publisher => "Publisher",
            Level::Series => "Series",
            Level::Volume => "Volume",
            Level::Title => "Title",
            Level::UserList => "List",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScopeError {
    #[error("{0} rows are comics; there is nothing to drill into")]
    Terminal(Level),
}

/// One row of the current level.
#[derive(Debug, Clone)]
pub enum Row<'a> {
    /// A publisher, series or volume name.
    Aggregate(String),
    Comic(&'a ComicRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Drilled(Level),
    Open(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UserList {
    name: String,
    members: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeNavigator {
    level: Level,
    group_by_publisher: bool,
    publisher: Option<String>,
    series: Option<String>,
    volume: Option<String>,
    user_list: Option<UserList>,
    filter: LibraryFilter,
}

impl ScopeNavigator {
    pub fn new(group_by_publisher: bool) -> Self {
        let mut nav = Self {
            level: Level::Publisher,
            group_by_publisher,
            publisher: None,
            series: None,
            volume: None,
            user_list: None,
            filter: LibraryFilter::All,
        };
        nav.reset();
        nav
    }

    pub fn for_settings(settings: &Settings) -> Self {
        Self::new(settings.group_by_publisher)
    }

    /// The level `reset` returns to.
    pub fn root(&self) -> Level {
        if self.group_by_publisher {
            Level::Publisher
        } else {
            Level::Series
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    pub fn series(&self) -> Option<&str> {
        self.series.as_deref()
    }

    pub fn volume(&self) -> Option<&str> {
        self.volume.as_deref()
    }

    pub fn user_list(&self) -> Option<&str> {
        self.user_list.as_ref().map(|l| l.name.as_str())
    }

    pub fn filter(&self) -> LibraryFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: LibraryFilter) {
        self.filter = filter;
    }

    /// Toggle the Publisher level. Navigation restarts at the new root.
    pub fn set_group_by_publisher(&mut self, group: bool) {
        self.group_by_publisher = group;
        self.reset();
    }

    /// Back to the root with every key cleared.
    pub fn reset(&mut self) {
        self.level = self.root();
        self.publisher = (!self.group_by_publisher).then(|| ALL_PUBLISHERS.to_string());
        self.series = None;
        self.volume = None;
        self.user_list = None;
    }

    /// Descend into the aggregate `key` of the current level.
    pub fn drill_in(&mut self, key: impl Into<String>) -> Result<Level, ScopeError> {
        let key = key.into();
        self.level = match self.level {
            Level::Publisher => {
                self.publisher = Some(key);
                Level::Series
            }
            Level::Series => {
                self.series = Some(key);
                Level::Volume
            }
            Level::Volume => {
                self.volume = Some(key);
                Level::Title
            }
            terminal => return Err(ScopeError::Terminal(terminal)),
        };
        Ok(self.level)
    }

    /// Move one level up, clearing the key that no longer applies. Returns
    /// false at the root.
    pub fn back(&mut self) -> bool {
        match self.level {
            Level::Title => {
                self.volume = None;
                self.level = Level::Volume;
            }
            Level::Volume => {
                self.series = None;
                self.level = Level::Series;
            }
            Level::Series if self.group_by_publisher => {
                self.publisher = None;
                self.level = Level::Publisher;
            }
            Level::UserList => self.reset(),
            Level::Series | Level::Publisher => return false,
        }
        true
    }

    /// Show a user-defined list of comics.
    pub fn select_user_list(&mut self, name: impl Into<String>, members: Vec<PathBuf>) {
        self.user_list = Some(UserList {
            name: name.into(),
            members,
        });
        self.level = Level::UserList;
    }

    /// Drill into an aggregate row, or open a comic row.
    pub fn activate(&mut self, row: &Row<'_>) -> Result<Activation, ScopeError> {
        match row {
            Row::Comic(record) => Ok(Activation::Open(record.path().to_path_buf())),
            Row::Aggregate(key) => self.drill_in(key.as_str()).map(Activation::Drilled),
        }
    }

    /// Rows of the current level.
    pub fn rows<'a>(&self, catalog: &'a Catalog) -> Vec<Row<'a>> {
        let publisher = self.publisher.as_deref().unwrap_or_default();
        let series = self.series.as_deref().unwrap_or_default();
        let names = match self.level {
            Level::Publisher => catalog.publishers(self.filter),
            Level::Series => catalog.series(publisher, self.filter),
            Level::Volume => catalog.volumes(publisher, series, self.filter),
            Level::Title => {
                let volume = self.volume.as_deref().unwrap_or_default();
                return catalog
                    .comics_from_volume(publisher, series, volume, self.filter)
                    .into_iter()
                    .map(Row::Comic)
                    .collect();
            }
            Level::UserList => {
                let members = self.user_list.iter().flat_map(|l| &l.members);
                return members
                    .filter_map(|path| catalog.get(path))
                    .filter(|record| self.filter.matches(record))
                    .map(Row::Comic)
                    .collect();
            }
        };
        names.into_iter().map(Row::Aggregate).collect()
    }

    /// Breadcrumb of the selected keys, e.g. `DC › Batman › 2`.
    pub fn breadcrumb(&self) -> String {
        if let Some(list) = &self.user_list {
            return list.name.clone();
        }
        let publisher = self.publisher.as_deref().filter(|_| self.group_by_publisher);
        publisher
            .into_iter()
            .chain(self.series.as_deref())
            .chain(self.volume.as_deref())
            .collect::<Vec<_>>()
            .join(" › ")
    }
}
