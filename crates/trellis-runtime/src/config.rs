#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! ```
//! use std::time::Duration;
//! use trellis_runtime::config::{CacheSize, RuntimeConfig};
//!
//! let config = RuntimeConfig::default()
//!     .with_dirty_check_interval(Duration::from_millis(50))
//!     .with_default_view_cache(CacheSize::Bounded(8));
//! assert_eq!(config.dirty_check.interval, Duration::from_millis(50));
//! ```
//!
//! [`RuntimeConfig::from_env`] reads overrides from the environment:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `TRELLIS_DIRTY_CHECK_MS` | sweep interval in milliseconds |
//! | `TRELLIS_DIRTY_CHECK_DISABLED` | `1`/`true` disables sweeping |
//! | `TRELLIS_PARSE_CACHE` | parse cache capacity (`0` = unbounded) |

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

/// Default dirty-check sweep interval.
pub const DEFAULT_DIRTY_CHECK_INTERVAL: Duration = Duration::from_millis(120);

// ---------------------------------------------------------------------------
// CacheSize
// ---------------------------------------------------------------------------

/// Capacity of a view factory's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheSize {
    /// No pooling.
    #[default]
    None,
    Bounded(usize),
    /// `"*"`: keep every released view.
    Unbounded,
}

impl CacheSize {
    /// Whether a pool currently holding `len` views accepts one more.
    #[must_use]
    pub fn admits(self, len: usize) -> bool {
        match self {
            Self::None => false,
            Self::Bounded(max) => len < max,
            Self::Unbounded => true,
        }
    }
}

impl FromStr for CacheSize {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "*" => Ok(Self::Unbounded),
            n => n.parse::<usize>().map(|n| {
                if n == 0 {
                    Self::None
                } else {
                    Self::Bounded(n)
                }
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// DirtyCheckSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirtyCheckSettings {
    /// Delay between sweeps.
    pub interval: Duration,
    /// Never schedule sweeps; `check_now` still works.
    pub disabled: bool,
    /// Refuse to create dirty-checked observers.
    pub throw_on_use: bool,
}

impl Default for DirtyCheckSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DIRTY_CHECK_INTERVAL,
            disabled: false,
            throw_on_use: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuntimeConfig {
    pub dirty_check: DirtyCheckSettings,
    /// Pool size for factories that do not set their own.
    pub default_view_cache: CacheSize,
    /// `None` keeps every parsed expression.
    pub parse_cache_capacity: Option<NonZeroUsize>,
    /// Whether collection observers start index-map tracking.
    pub collection_observation: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dirty_check: DirtyCheckSettings::default(),
            default_view_cache: CacheSize::None,
            parse_cache_capacity: None,
            collection_observation: true,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `TRELLIS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `TRELLIS_*` environment variables on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_u64("TRELLIS_DIRTY_CHECK_MS") {
            self.dirty_check.interval = Duration::from_millis(ms);
        }
        if env_flag("TRELLIS_DIRTY_CHECK_DISABLED") {
            self.dirty_check.disabled = true;
        }
        if let Some(cap) = env_u64("TRELLIS_PARSE_CACHE") {
            self.parse_cache_capacity = usize::try_from(cap).ok().and_then(NonZeroUsize::new);
        }
        self
    }

    #[must_use]
    pub fn with_dirty_check_interval(mut self, interval: Duration) -> Self {
        self.dirty_check.interval = interval;
        self
    }

    #[must_use]
    pub fn with_dirty_check_disabled(mut self, disabled: bool) -> Self {
        self.dirty_check.disabled = disabled;
        self
    }

    #[must_use]
    pub fn with_dirty_check_throw_on_use(mut self, throw_on_use: bool) -> Self {
        self.dirty_check.throw_on_use = throw_on_use;
        self
    }

    #[must_use]
    pub fn with_default_view_cache(mut self, size: CacheSize) -> Self {
        self.default_view_cache = size;
        self
    }

    #[must_use]
    pub fn with_parse_cache_capacity(mut self, capacity: Option<NonZeroUsize>) -> Self {
        self.parse_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_collection_observation(mut self, enabled: bool) -> Self {
        self.collection_observation = enabled;
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.dirty_check.interval, Duration::from_millis(120));
        assert!(!config.dirty_check.disabled);
        assert!(config.collection_observation);
        assert_eq!(config.parse_cache_capacity, None);
    }

    #[test]
    fn cache_size_parsing() {
        assert_eq!("*".parse::<CacheSize>(), Ok(CacheSize::Unbounded));
        assert_eq!("4".parse::<CacheSize>(), Ok(CacheSize::Bounded(4)));
        assert_eq!("0".parse::<CacheSize>(), Ok(CacheSize::None));
        assert!("many".parse::<CacheSize>().is_err());
    }

    #[test]
    fn cache_size_admits() {
        assert!(!CacheSize::None.admits(0));
        assert!(CacheSize::Bounded(2).admits(1));
        assert!(!CacheSize::Bounded(2).admits(2));
        assert!(CacheSize::Unbounded.admits(usize::MAX - 1));
    }

    #[test]
    fn builders_chain() {
        let config = RuntimeConfig::new()
            .with_dirty_check_disabled(true)
            .with_dirty_check_throw_on_use(true)
            .with_collection_observation(false)
            .with_parse_cache_capacity(NonZeroUsize::new(64));
        assert!(config.dirty_check.disabled);
        assert!(config.dirty_check.throw_on_use);
        assert!(!config.collection_observation);
        assert_eq!(config.parse_cache_capacity.map(NonZeroUsize::get), Some(64));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_json() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"collection_observation": false}"#).expect("json");
        assert!(!config.collection_observation);
        assert_eq!(config.dirty_check, DirtyCheckSettings::default());
    }
}
