use std::time::Duration;

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://api.rawg.io/api";
pub const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CATALOG_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CATALOG_REQUESTS_PER_SECOND: usize = 5;
pub const DEFAULT_CATALOG_MAX_PAGES: usize = 100;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_SERVER_PORT: u16 = 8080;

pub const DEFAULT_SERVICE_NAME: &str = "trophy-tracker-api";
pub const DEFAULT_TRACER_NAME: &str = "trophy-tracker";

pub const SEARCH_PAGE_SIZE: u32 = 50;
pub const API_KEY_PARAM: &str = "key";

// retry/backoff for catalog GETs
pub const BACKOFF_BASE: Duration = Duration::from_millis(250);
pub const BACKOFF_CAP: Duration = Duration::from_secs(4);
pub const BACKOFF_MAX_JITTER_MS: u64 = 250;

/// Attempts for a unit of work that keeps failing with a serialization conflict
pub const SERIALIZABLE_TX_ATTEMPTS: u32 = 3;

pub const API_PREFIX: &str = "/api/v1";
