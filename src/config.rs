use crate::error::{KMeansError, Result};

/// Largest cluster count representable in a `Byte` output band next to the no-data sentinel.
pub const MAX_CLUSTERS: usize = 255;

/// Centroid seeding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMethod {
    /// Pick k distinct feature vectors from a seeded permutation
    #[default]
    Random,
    /// D²-weighted seeding
    KMeansPlusPlus,
}

/// Configuration for the clustering engine
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of clusters
    pub k: usize,

    /// Maximum number of assign/update iterations per initialization
    pub max_iterations: usize,

    /// Stop when the summed centroid movement of one update falls below this value
    pub tolerance: f64,

    /// Random seed for centroid initialization
    pub seed: u64,

    /// Number of independent initializations; the run with the lowest inertia wins
    pub n_init: usize,

    /// Centroid seeding strategy
    pub init: InitMethod,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            k: 6,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 0,
            n_init: 1,
            init: InitMethod::Random,
        }
    }
}

impl ClusterConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn with_init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }

    /// Check the parameters that do not depend on the data
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 || self.k > MAX_CLUSTERS {
            return Err(KMeansError::InvalidClusterCount(self.k));
        }
        if self.max_iterations == 0 {
            return Err(KMeansError::InvalidMaxIterations(self.max_iterations));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(KMeansError::InvalidTolerance(self.tolerance));
        }
        if self.n_init == 0 {
            return Err(KMeansError::InvalidInitCount(self.n_init));
        }
        Ok(())
    }
}
