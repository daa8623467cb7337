//! Common types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of a shared world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub Uuid);

impl WorldId {
    /// Deterministic id, handy for fixtures and logs
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for WorldId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Category bitmask used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genres(u32);

impl Genres {
    pub const NONE: Genres = Genres(0);
    pub const MY_WORLDS: Genres = Genres(1 << 0);
    pub const DOWNLOADS: Genres = Genres(1 << 1);
    pub const BUILT_IN: Genres = Genres(1 << 2);
    pub const SHARED: Genres = Genres(1 << 3);
    pub const STARTER: Genres = Genres(1 << 4);
    pub const FAVORITES: Genres = Genres(1 << 5);
    pub const ALL: Genres = Genres(0x3f);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Genres) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Genres) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn without(self, other: Genres) -> Genres {
        Genres(self.0 & !other.0)
    }
}

impl BitOr for Genres {
    type Output = Genres;

    fn bitor(self, rhs: Genres) -> Genres {
        Genres(self.0 | rhs.0)
    }
}

impl BitOrAssign for Genres {
    fn bitor_assign(&mut self, rhs: Genres) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Genres {
    type Output = Genres;

    fn bitand(self, rhs: Genres) -> Genres {
        Genres(self.0 & rhs.0)
    }
}

/// Download status of a world's full content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadState {
    #[default]
    NotDownloaded,
    InProgress,
    Complete,
    Failed,
}

/// Decoded thumbnail pixels (straight RGBA8)
#[derive(Clone, PartialEq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ThumbnailState {
    #[default]
    NotLoaded,
    Loading,
    Loaded(Thumbnail),
    /// Fetch or decode failed; the UI shows its placeholder
    Missing,
}

impl ThumbnailState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ThumbnailState::Loaded(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ThumbnailState::Loading)
    }
}

/// One catalog entry as seen by the browser
#[derive(Debug, Clone, PartialEq)]
pub struct LevelMetadata {
    pub world_id: WorldId,
    pub name: String,
    pub description: String,
    pub creator: String,
    pub checksum: String,
    pub downloads: i32,
    /// Server "modified" time. The service orders pages by it, so local
    /// sorting must use it too or pages interleave wrongly.
    pub sort_time: DateTime<Utc>,
    /// Real last write time of the world, only used to decide whether a
    /// local copy is current.
    pub last_write_time: DateTime<Utc>,
    pub genres: Genres,
    pub download_state: DownloadState,
    pub thumbnail: ThumbnailState,
}

impl LevelMetadata {
    pub fn new(world_id: WorldId, name: impl Into<String>) -> Self {
        Self {
            world_id,
            name: name.into(),
            description: String::new(),
            creator: String::new(),
            checksum: String::new(),
            downloads: 0,
            sort_time: DateTime::<Utc>::UNIX_EPOCH,
            last_write_time: DateTime::<Utc>::UNIX_EPOCH,
            genres: Genres::NONE,
            download_state: DownloadState::NotDownloaded,
            thumbnail: ThumbnailState::NotLoaded,
        }
    }
}

/// Sort key understood by both the local sorter and the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortBy {
    Date,
    Name,
    Creator,
    Rank,
}

/// Sort direction for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Handle to an open cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub(crate) u64);

/// Handle to a live query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub(crate) u64);

/// Notifications delivered to the consumer of a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorEvent {
    /// A page fetch started on behalf of this cursor's query
    Fetching,
    /// The page fetch finished (successfully or not)
    FetchComplete,
    /// The window scrolled by `delta` rows
    Shifted { delta: isize },
    /// The window was repositioned wholesale; re-read it
    Jumped { first: usize },
    /// An item was inserted at `index` of the query sequence
    Addition {
        index: usize,
        window_index: Option<usize>,
    },
    /// The item at `index` of the query sequence went away
    Removal {
        index: usize,
        window_index: Option<usize>,
    },
}

/// Result handed to world download callbacks
#[derive(Debug, Clone)]
pub struct WorldDownload {
    pub world_id: WorldId,
    /// `None` when the download failed
    pub content: Option<Vec<u8>>,
    pub thumbnail: Option<Vec<u8>>,
}

impl WorldDownload {
    pub fn failed(world_id: WorldId) -> Self {
        Self {
            world_id,
            content: None,
            thumbnail: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.content.is_some()
    }
}

/// World download completion for a cached item
pub type WorldCallback = Box<dyn FnOnce(&WorldDownload, Option<&LevelMetadata>) + Send>;
/// World download completion for an id that may not be cached
pub type OffPageCallback = Box<dyn FnOnce(&WorldDownload) + Send>;
/// Thumbnail load completion
pub type ThumbnailCallback = Box<dyn FnOnce(&LevelMetadata) + Send>;
/// Delete completion; always receives `None`
pub type DeleteCallback = Box<dyn FnOnce(Option<WorldId>) + Send>;
