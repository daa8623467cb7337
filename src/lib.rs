//! Community level browser
//!
//! Pages through the community catalog of shared worlds, keeps every fetched
//! record in a deduplicated cache and serves sorted, filtered cursors over it.
//! Full worlds and thumbnails are downloaded on demand.

pub mod browser;
pub mod cache;
pub mod constants;
pub mod cursor;
pub mod db;
pub mod query;
pub mod service;
pub mod settings;
pub mod types;
pub mod utils;

pub use browser::{Browser, PagerState};
pub use cache::MetadataCache;
pub use db::LocalLibrary;
pub use query::{LevelFilter, LevelSorter, Query};
pub use service::{CatalogService, HttpCatalogService, ServiceError, WorldData, WorldsRequest};
pub use settings::Settings;
pub use types::*;
