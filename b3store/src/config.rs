//! Store configuration.
//!
//! A store has two kinds of settings:
//!
//! - Geometry (`num_keys`, `key_size`, `value_size`): fixed when the file is
//!   created and persisted in the tree header. Ignored when opening an
//!   existing file, which always uses the geometry it was created with.
//! - Runtime tuning (`cache_capacity`, `shrink_threshold`, `verify_on_open`):
//!   applies to the current process only.
//!
//! # Environment Variables
//!
//! `StoreConfig::from_env()` overlays these on the defaults:
//!
//! - `B3_CACHE_CAPACITY`: node cache capacity in nodes (default: `32`)
//! - `B3_SHRINK_THRESHOLD`: free-page ratio above which the file is shrunk
//!   (default: `0.10`)

use crate::storage::Geometry;

/// Configuration for creating or opening a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Maximum number of keys per node (the tree order).
    pub num_keys: usize,
    /// Maximum key length in bytes.
    pub key_size: usize,
    /// Maximum serialized value length in bytes.
    pub value_size: usize,
    /// Maximum number of decoded nodes kept in memory.
    pub cache_capacity: usize,
    /// Free-page ratio above which trailing free pages are truncated.
    pub shrink_threshold: f64,
    /// Run the consistency checker when opening an existing file.
    pub verify_on_open: bool,
}

/// Error returned when loading or validating configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl StoreConfig {
    /// Default order.
    pub const DEFAULT_NUM_KEYS: usize = 512;
    /// Default key slot size.
    pub const DEFAULT_KEY_SIZE: usize = 64;
    /// Default value slot size.
    pub const DEFAULT_VALUE_SIZE: usize = 256;
    /// Default node cache capacity.
    pub const DEFAULT_CACHE_CAPACITY: usize = 32;
    /// Default shrink threshold.
    pub const DEFAULT_SHRINK_THRESHOLD: f64 = 0.10;

    /// Environment variable overriding the cache capacity.
    pub const CACHE_CAPACITY_VAR: &'static str = "B3_CACHE_CAPACITY";
    /// Environment variable overriding the shrink threshold.
    pub const SHRINK_THRESHOLD_VAR: &'static str = "B3_SHRINK_THRESHOLD";

    /// Create a configuration with the given geometry and default tuning.
    #[must_use]
    pub const fn new(num_keys: usize, key_size: usize, value_size: usize) -> Self {
        Self {
            num_keys,
            key_size,
            value_size,
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            shrink_threshold: Self::DEFAULT_SHRINK_THRESHOLD,
            verify_on_open: true,
        }
    }

    /// Set the node cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the shrink threshold.
    #[must_use]
    pub const fn with_shrink_threshold(mut self, threshold: f64) -> Self {
        self.shrink_threshold = threshold;
        self
    }

    /// Enable or disable the consistency check on open.
    #[must_use]
    pub const fn with_verify_on_open(mut self, verify: bool) -> Self {
        self.verify_on_open = verify;
        self
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(Self::CACHE_CAPACITY_VAR) {
            config.cache_capacity =
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: Self::CACHE_CAPACITY_VAR.to_string(),
                        message: format!("'{value}' is not a valid node count"),
                    })?;
        }

        if let Some(value) = lookup(Self::SHRINK_THRESHOLD_VAR) {
            config.shrink_threshold =
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: Self::SHRINK_THRESHOLD_VAR.to_string(),
                        message: format!("'{value}' is not a valid ratio"),
                    })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every setting against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry()?;
        self.validate_runtime()
    }

    /// Check only the settings that apply to an open store. The geometry of
    /// an existing store comes from its header, not from here.
    pub fn validate_runtime(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "cache_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if !(self.shrink_threshold > 0.0 && self.shrink_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                name: "shrink_threshold".to_string(),
                message: format!("{} is outside (0, 1]", self.shrink_threshold),
            });
        }

        Ok(())
    }

    /// The persisted geometry described by this configuration.
    pub fn geometry(&self) -> Result<Geometry, ConfigError> {
        Geometry::new(self.num_keys, self.key_size, self.value_size)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_NUM_KEYS,
            Self::DEFAULT_KEY_SIZE,
            Self::DEFAULT_VALUE_SIZE,
        )
    }
}
