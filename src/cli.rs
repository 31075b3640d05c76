use crate::cog::WriteOptions;
use crate::config::{ClusterConfig, InitMethod};
use crate::pipeline::{default_output_path, PipelineConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitArg {
    /// k distinct pixels drawn from a seeded permutation
    Random,
    /// D²-weighted seeding
    #[value(name = "kmeans++")]
    KMeansPlusPlus,
}

impl From<InitArg> for InitMethod {
    fn from(arg: InitArg) -> Self {
        match arg {
            InitArg::Random => InitMethod::Random,
            InitArg::KMeansPlusPlus => InitMethod::KMeansPlusPlus,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "kmeans-clustering")]
#[command(about = "Unsupervised K-means classification of a multi-band GeoTIFF")]
#[command(version)]
pub struct Args {
    /// Input raster path (multi-band, georeferenced)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output GeoTIFF path (default: <input stem>_kmeans.tif next to the input)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of clusters
    #[arg(short = 'k', long, env = "N_CLUSTERS", default_value_t = 6)]
    pub n_clusters: usize,

    /// Maximum assign/update iterations per initialization
    #[arg(long, env = "MAX_ITERATIONS", default_value_t = 300)]
    pub max_iterations: usize,

    /// Number of seeded initializations; the lowest-inertia run is kept
    #[arg(long, env = "N_INIT", default_value_t = 10)]
    pub n_init: usize,

    /// Stop when the summed centroid movement falls below this value
    #[arg(long, env = "TOLERANCE", default_value_t = 1e-4)]
    pub tolerance: f64,

    /// Random seed for centroid initialization
    #[arg(long, env = "SEED", default_value_t = 0)]
    pub seed: u64,

    /// Centroid initialization method
    #[arg(long, value_enum, default_value_t = InitArg::KMeansPlusPlus)]
    pub init: InitArg,

    /// Merge label patches smaller than this many pixels into their largest neighbour (0 disables)
    #[arg(long, env = "N_SIEVE_PIXELS", default_value_t = 0)]
    pub sieve_pixels: usize,

    /// Output compression (DEFLATE, LZW, ZSTD, NONE)
    #[arg(long, default_value = "DEFLATE")]
    pub compression: String,

    /// Write a tiled GeoTIFF with this block size (multiple of 16)
    #[arg(long, value_name = "PIXELS")]
    pub tile_size: Option<usize>,

    /// Build internal overviews
    #[arg(long)]
    pub overviews: bool,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            cluster: ClusterConfig::new(self.n_clusters)
                .with_max_iterations(self.max_iterations)
                .with_n_init(self.n_init)
                .with_tolerance(self.tolerance)
                .with_seed(self.seed)
                .with_init(self.init.into()),
            sieve_pixels: self.sieve_pixels,
            write: WriteOptions {
                compression: self.compression.to_uppercase(),
                tile_size: self.tile_size,
                overviews: self.overviews,
            },
        }
    }
}
