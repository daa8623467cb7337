//! Application constants and configuration

pub const DEFAULT_SERVICE_URL: &str = "https://community.kodugamelab.com/api";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DIR_NAME: &str = "Community Browser";

/// Number of worlds requested per page
pub const PAGE_SIZE: usize = 30;

/// Pending thumbnail requests kept before the oldest are discarded
pub const THUMBNAIL_QUEUE_CAP: usize = 20;

/// Thumbnail fetches allowed in flight at once
pub const MAX_THUMBNAIL_LOADS: usize = 1;

/// A cursor within this many rows of the end of its query asks for another page
pub const PREFETCH_MARGIN: usize = 10;

/// Date range sent with every page request
pub const DATE_RANGE_ALL: &str = "all";

/// Creator filtering on the service side. The service ignores it today, so the
/// "my worlds" genre never narrows the remote query.
pub const CREATOR_FILTER_ENABLED: bool = false;
