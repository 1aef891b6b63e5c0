//! Builder parameters.

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// Parameters of the binned SAH builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SahSettings {
    /// Ranges of at most this many primitives always become leaves.
    pub min_leaf_size: usize,
    /// Largest leaf the cost model may choose.
    pub max_leaf_size: usize,
    /// Depth at which a leaf is forced regardless of size.
    pub max_depth: usize,
    /// Number of centroid bins per axis.
    pub bin_count: usize,
    /// Ranges larger than this are binned and recursed in parallel.
    pub parallel_threshold: usize,
    /// Relative cost of visiting an interior node.
    pub traversal_cost: f64,
    /// Relative cost of intersecting one leaf block.
    pub intersection_cost: f64,
}

impl Default for SahSettings {
    fn default() -> Self {
        Self {
            min_leaf_size: 4,
            max_leaf_size: 32,
            max_depth: 40,
            bin_count: 16,
            parallel_threshold: 1024,
            traversal_cost: 1.0,
            intersection_cost: 1.0,
        }
    }
}

impl SahSettings {
    /// Check that the settings can drive a build.
    pub fn validate(&self) -> Result<()> {
        if self.min_leaf_size == 0 {
            return Err(BuildError::InvalidSettings(
                "min_leaf_size must be at least 1".into(),
            ));
        }
        if self.max_leaf_size < self.min_leaf_size {
            return Err(BuildError::InvalidSettings(
                "max_leaf_size must not be smaller than min_leaf_size".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(BuildError::InvalidSettings(
                "max_depth must be positive".into(),
            ));
        }
        if self.bin_count < 2 {
            return Err(BuildError::InvalidSettings(
                "bin_count must be at least 2".into(),
            ));
        }
        if !(self.traversal_cost >= 0.0 && self.intersection_cost > 0.0) {
            return Err(BuildError::InvalidSettings(
                "traversal_cost must be non-negative and intersection_cost positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the Morton-curve builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MortonSettings {
    /// Ranges of at most this many primitives become leaves.
    pub leaf_size: usize,
    /// Depth at which the builder stops following the curve and splits
    /// ranges at their index midpoint.
    pub max_depth: usize,
    /// Ranges of at most this many primitives are built as independent
    /// subtree tasks. `None` derives it from the primitive and worker count.
    pub top_level_threshold: Option<usize>,
    /// How often a range whose codes are all identical is re-encoded against
    /// its own centroid bounds before falling back to a midpoint split.
    pub max_recode_attempts: usize,
    /// Below this many primitives the codes are sorted on the calling thread.
    pub parallel_sort_threshold: usize,
}

impl Default for MortonSettings {
    fn default() -> Self {
        Self {
            leaf_size: 4,
            max_depth: 40,
            top_level_threshold: None,
            max_recode_attempts: 1,
            parallel_sort_threshold: 4096,
        }
    }
}

impl MortonSettings {
    /// Check that the settings can drive a build.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_size == 0 {
            return Err(BuildError::InvalidSettings(
                "leaf_size must be at least 1".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(BuildError::InvalidSettings(
                "max_depth must be positive".into(),
            ));
        }
        if self.top_level_threshold == Some(0) {
            return Err(BuildError::InvalidSettings(
                "top_level_threshold must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Subtree task size for `count` primitives on `workers` threads.
    ///
    /// Aims for about two tasks per worker.
    pub fn top_level_threshold_for(&self, count: usize, workers: usize) -> usize {
        self.top_level_threshold
            .unwrap_or_else(|| count.div_ceil(2 * workers.max(1)))
            .max(self.leaf_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SahSettings::default().validate().is_ok());
        assert!(MortonSettings::default().validate().is_ok());
    }

    #[test]
    fn test_sah_rejects_inverted_leaf_sizes() {
        let settings = SahSettings {
            min_leaf_size: 8,
            max_leaf_size: 4,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(BuildError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_sah_rejects_single_bin() {
        let settings = SahSettings {
            bin_count: 1,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_morton_threshold() {
        let settings = MortonSettings::default();
        assert_eq!(settings.top_level_threshold_for(1000, 4), 125);
        assert_eq!(settings.top_level_threshold_for(3, 4), 4);
        let fixed = MortonSettings {
            top_level_threshold: Some(64),
            ..Default::default()
        };
        assert_eq!(fixed.top_level_threshold_for(1000, 4), 64);
    }

    #[test]
    fn test_partial_deserialize() {
        let settings: SahSettings = serde_json::from_str(r#"{"bin_count": 8}"#).unwrap();
        assert_eq!(settings.bin_count, 8);
        assert_eq!(settings.max_depth, SahSettings::default().max_depth);
    }
}
