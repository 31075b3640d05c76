use clap::Parser;
use env_logger::Env;
use log::{error, info};

use geotiff_kmeans::cli::Args;
use geotiff_kmeans::error::Result;
use geotiff_kmeans::pipeline;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== GeoTIFF K-means Clustering ===");

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
        {
            Ok(()) => info!("Using {} threads", n_threads),
            Err(e) => error!("Failed to configure thread pool, using defaults: {}", e),
        }
    } else {
        info!("Using all available threads");
    }

    let config = args.pipeline_config();
    let output = args.output_path();

    info!("Input: {}", args.input.display());
    info!("Output: {}", output.display());
    info!(
        "Clusters: {}, max iterations: {}, initializations: {}, tolerance: {}, seed: {}",
        config.cluster.k,
        config.cluster.max_iterations,
        config.cluster.n_init,
        config.cluster.tolerance,
        config.cluster.seed
    );

    let summary = match pipeline::run_clustering(&args.input, &output, &config) {
        Ok(summary) => summary,
        Err(e) => {
            error!("{:?} error: {}", e.kind(), e);
            return Err(e);
        }
    };

    info!(
        "Finished after {} iterations ({:?}), inertia {:.4}",
        summary.iterations, summary.termination, summary.inertia
    );
    info!("=== Done! ===");
    Ok(())
}
