use directories::ProjectDirs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Directory the card collection is persisted in unless overridden.
pub const DEFAULT_PERSIST_DIR: &str = "./CardDataTrimmed";
/// Collection holding the cards.
pub const DEFAULT_COLLECTION_NAME: &str = "cards_collection";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";

/// Bounds and starting value of a result-count slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliderRange {
    pub min: usize,
    pub max: usize,
    pub default: usize,
}

impl SliderRange {
    /// Falls back to the default when unset and clamps into `[min, max]`.
    pub fn resolve(&self, value: Option<usize>) -> usize {
        value.unwrap_or(self.default).clamp(self.min, self.max)
    }
}

/// Number of smart-search results.
pub const SMART_RESULTS: SliderRange = SliderRange {
    min: 1,
    max: 30,
    default: 10,
};

/// Number of cards shown by a filter-only search.
pub const DUMB_RESULTS: SliderRange = SliderRange {
    min: 10,
    max: 500,
    default: 50,
};

/// Capacity and expiry of the facet and filtered-result caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: usize,
    /// `None` keeps entries until evicted or invalidated.
    pub ttl: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl: Some(Duration::from_secs(600)),
        }
    }
}

/// Runtime settings for the search service.
#[derive(Debug, Clone)]
pub struct Settings {
    pub persist_dir: PathBuf,
    pub collection_name: String,
    pub cache: CacheSettings,
    pub bind: SocketAddr,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            cache: CacheSettings::default(),
            bind: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8501))),
        }
    }
}

/// Configuration for cardsearch project directories
pub struct CardSearchDirs {
    project_dirs: Option<ProjectDirs>,
}

impl CardSearchDirs {
    pub fn new() -> Self {
        let project_dirs = ProjectDirs::from("com", "cardsearch", "cardsearch");
        Self { project_dirs }
    }

    /// Get the default cache directory for embedding model files
    pub fn default_cache_dir(&self) -> PathBuf {
        match &self.project_dirs {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => {
                // Fallback to current directory if ProjectDirs fails
                std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(".cache")
            }
        }
    }

    /// Ensure the cache directory exists
    pub fn ensure_cache_dir(&self) -> std::io::Result<PathBuf> {
        let cache_dir = self.default_cache_dir();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(cache_dir)
    }
}

impl Default for CardSearchDirs {
    fn default() -> Self {
        Self::new()
    }
}
