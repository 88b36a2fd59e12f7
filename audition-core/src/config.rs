//! Configuration for the audition map

use crate::error::{AuditionError, Result};
use crate::pool::DEFAULT_SORT_INTERVAL;
use crate::scene::DEFAULT_SURFACE_OBSTRUCTION;

/// Configuration descriptor for an [`AuditionMap`](crate::AuditionMap)
#[derive(Debug, Clone)]
pub struct AuditionMapDesc {
    /// Releases between two index-list sorts of the pending-state pools
    pub pool_sort_interval: u32,
    /// Padding added to listener bounding spheres so that floating point
    /// error never prunes a listener whose ear is exactly at the range limit
    pub bounding_sphere_noise_buffer: f32,
    /// Obstruction of surfaces without an entry in the obstruction table
    pub default_surface_obstruction: f32,
    /// Maximum number of ray completions dispatched per `update`. Remaining
    /// completions are kept for the next update.
    pub max_completions_per_update: usize,
}

impl Default for AuditionMapDesc {
    fn default() -> Self {
        Self {
            pool_sort_interval: DEFAULT_SORT_INTERVAL,
            bounding_sphere_noise_buffer: 0.05,
            default_surface_obstruction: DEFAULT_SURFACE_OBSTRUCTION,
            max_completions_per_update: usize::MAX,
        }
    }
}

impl AuditionMapDesc {
    /// Create a descriptor with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of releases between pool index sorts.
    pub fn pool_sort_interval(mut self, interval: u32) -> Self {
        self.pool_sort_interval = interval;
        self
    }

    /// Set the padding added to listener bounding spheres.
    pub fn bounding_sphere_noise_buffer(mut self, buffer: f32) -> Self {
        self.bounding_sphere_noise_buffer = buffer;
        self
    }

    /// Set the obstruction of surfaces missing from the table.
    pub fn default_surface_obstruction(mut self, obstruction: f32) -> Self {
        self.default_surface_obstruction = obstruction;
        self
    }

    /// Set the number of ray completions dispatched per update.
    pub fn max_completions_per_update(mut self, max: usize) -> Self {
        self.max_completions_per_update = max;
        self
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AuditionError::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.pool_sort_interval == 0 {
            return Err(AuditionError::Configuration(
                "pool_sort_interval must be at least 1".into(),
            ));
        }
        if !self.bounding_sphere_noise_buffer.is_finite() || self.bounding_sphere_noise_buffer < 0.0
        {
            return Err(AuditionError::Configuration(format!(
                "bounding_sphere_noise_buffer must be a non-negative finite value, got {}",
                self.bounding_sphere_noise_buffer
            )));
        }
        if !(0.0..=1.0).contains(&self.default_surface_obstruction) {
            return Err(AuditionError::Configuration(format!(
                "default_surface_obstruction must be between 0.0 and 1.0, got {}",
                self.default_surface_obstruction
            )));
        }
        if self.max_completions_per_update == 0 {
            return Err(AuditionError::Configuration(
                "max_completions_per_update must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AuditionMapDesc::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(AuditionMapDesc::new().pool_sort_interval(0).validate().is_err());
        assert!(
            AuditionMapDesc::new()
                .bounding_sphere_noise_buffer(f32::NAN)
                .validate()
                .is_err()
        );
        assert!(
            AuditionMapDesc::new()
                .default_surface_obstruction(1.5)
                .validate()
                .is_err()
        );
        assert!(
            AuditionMapDesc::new()
                .max_completions_per_update(0)
                .validate()
                .is_err()
        );
    }
}
