//! Runtime configuration. Filled by the CLI (flags and environment); library
//! users build it directly.

use crate::location::cache::CACHE_TTL_DAYS;
use crate::location::distance::MAX_DESTINATIONS_PER_CALL;
use crate::location::places::{Category, DEFAULT_RADIUS_M, MAX_PLACES};
use crate::location::providers::nominatim::{NOMINATIM_URL, USER_AGENT};
use crate::location::rate_limit::NOMINATIM_MIN_INTERVAL;
use crate::location::{CacheError, CacheStore, ConfigError, TravelMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LANGUAGE: &str = "de";
/// Upper bound the nearby-search API accepts for a circle radius.
pub const MAX_RADIUS_M: u32 = 50_000;
/// Places per category such that every category fits one distance-matrix request.
pub const MAX_PLACES_PER_CATEGORY: usize = MAX_DESTINATIONS_PER_CALL / Category::ALL.len();

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    /// `None` means `~/.mikrolage/cache.db`.
    pub cache_path: Option<PathBuf>,
    pub cache_ttl: chrono::Duration,
    pub request_timeout: Duration,
    pub search_radius_m: u32,
    pub max_places: usize,
    pub travel_modes: Vec<TravelMode>,
    pub language: String,
    pub nominatim_url: String,
    pub nominatim_user_agent: String,
    pub nominatim_min_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            cache_path: None,
            cache_ttl: chrono::Duration::days(CACHE_TTL_DAYS),
            request_timeout: DEFAULT_TIMEOUT,
            search_radius_m: DEFAULT_RADIUS_M,
            max_places: MAX_PLACES,
            travel_modes: TravelMode::ALL.to_vec(),
            language: DEFAULT_LANGUAGE.to_string(),
            nominatim_url: NOMINATIM_URL.to_string(),
            nominatim_user_agent: USER_AGENT.to_string(),
            nominatim_min_interval: NOMINATIM_MIN_INTERVAL,
        }
    }
}

impl Config {
    /// The metered API key, trimmed. Blank counts as missing.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request timeout must be positive".into()));
        }
        if self.cache_ttl <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid("cache TTL must be positive".into()));
        }
        if self.search_radius_m == 0 || self.search_radius_m > MAX_RADIUS_M {
            return Err(ConfigError::Invalid(format!(
                "search radius must be between 1 and {} m, got {}",
                MAX_RADIUS_M, self.search_radius_m
            )));
        }
        if !(1..=MAX_PLACES_PER_CATEGORY).contains(&self.max_places) {
            return Err(ConfigError::Invalid(format!(
                "max places per category must be between 1 and {}, got {}",
                MAX_PLACES_PER_CATEGORY, self.max_places
            )));
        }
        if self.travel_modes.is_empty() {
            return Err(ConfigError::Invalid("at least one travel mode is required".into()));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigError::Invalid("language must not be empty".into()));
        }
        Ok(())
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(CacheStore::default_path)
    }

    /// Open the configured cache. If the file cannot be opened the process
    /// continues with an in-memory cache that lives as long as it does.
    pub fn open_cache(&self) -> Result<Arc<CacheStore>, CacheError> {
        let path = self.cache_path();
        let store = match CacheStore::open_at(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache unavailable, using in-memory cache");
                CacheStore::in_memory()?
            }
        };
        Ok(Arc::new(store.with_ttl(self.cache_ttl)))
    }
}
