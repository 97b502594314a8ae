//! Spatial index configuration.

/// Tuning knobs for the spatial index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    /// Side length of a chunk in world units.
    pub chunk_size: f32,
    /// Candidate-set size above which a query logs a warning.
    pub query_warn_threshold: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16.0,
            query_warn_threshold: 4096,
        }
    }
}

impl GridConfig {
    /// Creates a config with smaller chunks, handy in tests.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            chunk_size: 16.0,
            query_warn_threshold: 64,
        }
    }

    /// Returns `true` if the chunk size is usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.chunk_size.is_finite() && self.chunk_size > 0.0
    }
}
