//! Configuration Module - Collector Tuning Parameters
//!
//! Manages all configuration parameters affecting collection cadence.
//! Proper configuration balances pause length against floating garbage.

/// Main configuration for the incremental generational collector
///
/// Stores all parameters affecting collector behavior.
/// All parameters have sensible defaults.
///
/// # Examples
///
/// ```rust
/// use igc::GcConfig;
///
/// // Use default configuration
/// let config = GcConfig::default();
///
/// // Custom configuration for a small, frequently collected heap
/// let config = GcConfig {
///     new_gen_obj_cnt_to_gc: 512,
///     scan_count_to_old_gen: 3,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Young-generation survivals before promotion
    ///
    /// A header that stays reachable through this many young cycles is
    /// moved to the old generation.
    ///
    /// Default: 2
    pub scan_count_to_old_gen: u8,

    /// Allocations between automatic young cycles
    ///
    /// Every time this many objects have been allocated since the last
    /// automatic collection, the next allocation entry point runs a young
    /// cycle before installing its header.
    ///
    /// Default: 10240
    pub new_gen_obj_cnt_to_gc: usize,

    /// Old-generation population that forces a full cycle
    ///
    /// When the old generation grows past this many headers, the next
    /// `collect()` is followed by a full cycle.
    ///
    /// Default: 102400
    pub old_gen_obj_cnt_to_full_gc: usize,

    /// Enable cycle logging through the `log` facade
    ///
    /// Logs cycle start/end, promotion, and sweep accounting.
    /// Default: false
    pub trace: bool,

    /// Enable statistics collection
    ///
    /// Default: true
    pub stats_enabled: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            scan_count_to_old_gen: 2,
            new_gen_obj_cnt_to_gc: 10 * 1024,
            old_gen_obj_cnt_to_full_gc: 10 * 10 * 1024,
            trace: false,
            stats_enabled: true,
        }
    }
}

impl GcConfig {
    /// Validate configuration
    ///
    /// Checks that all values are in valid ranges.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use igc::GcConfig;
    ///
    /// let config = GcConfig {
    ///     new_gen_obj_cnt_to_gc: 0, // Invalid!
    ///     ..Default::default()
    /// };
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_count_to_old_gen == 0 {
            return Err(ConfigError::InvalidScanCount(
                "scan_count_to_old_gen must be > 0".to_string(),
            ));
        }

        // The header field is a u8; leave headroom for the increment.
        if self.scan_count_to_old_gen == u8::MAX {
            return Err(ConfigError::InvalidScanCount(
                "scan_count_to_old_gen must be < 255".to_string(),
            ));
        }

        if self.new_gen_obj_cnt_to_gc == 0 {
            return Err(ConfigError::InvalidThreshold(
                "new_gen_obj_cnt_to_gc must be > 0".to_string(),
            ));
        }

        if self.old_gen_obj_cnt_to_full_gc == 0 {
            return Err(ConfigError::InvalidThreshold(
                "old_gen_obj_cnt_to_full_gc must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - IGC_SCAN_COUNT_TO_OLD_GEN
    /// - IGC_NEW_GEN_OBJ_CNT_TO_GC
    /// - IGC_OLD_GEN_OBJ_CNT_TO_FULL_GC
    /// - IGC_TRACE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("IGC_SCAN_COUNT_TO_OLD_GEN") {
            if let Ok(n) = val.parse::<u8>() {
                config.scan_count_to_old_gen = n;
            }
        }

        if let Ok(val) = std::env::var("IGC_NEW_GEN_OBJ_CNT_TO_GC") {
            if let Ok(n) = val.parse::<usize>() {
                config.new_gen_obj_cnt_to_gc = n;
            }
        }

        if let Ok(val) = std::env::var("IGC_OLD_GEN_OBJ_CNT_TO_FULL_GC") {
            if let Ok(n) = val.parse::<usize>() {
                config.old_gen_obj_cnt_to_full_gc = n;
            }
        }

        if let Ok(val) = std::env::var("IGC_TRACE") {
            config.trace = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid scan count: {0}")]
    InvalidScanCount(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan_count_to_old_gen, 2);
        assert_eq!(config.old_gen_obj_cnt_to_full_gc, config.new_gen_obj_cnt_to_gc * 10);
    }

    #[test]
    fn test_invalid_scan_count() {
        let config = GcConfig {
            scan_count_to_old_gen: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_threshold() {
        let config = GcConfig {
            old_gen_obj_cnt_to_full_gc: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
