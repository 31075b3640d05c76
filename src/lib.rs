// Library exports for testing and reuse

pub mod cli;
pub mod cog;
pub mod config;
pub mod crs;
pub mod distance;
pub mod error;
pub mod features;
pub mod io;
pub mod kmeans;
pub mod pipeline;
pub mod raster;
pub mod sieve;

// Re-export commonly used types
pub use config::{ClusterConfig, InitMethod};
pub use error::{ErrorKind, KMeansError, Result};
pub use features::{build_features, FeatureMatrix, PixelLayout};
pub use io::{read_dataset, read_input_raster, write_label_raster, LABEL_NODATA};
pub use kmeans::{fit, ClusterResult, Termination};
pub use pipeline::{classify_raster, run_clustering, PipelineConfig, RunSummary};
pub use raster::{Raster, RasterMetadata};
