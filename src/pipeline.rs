use crate::cog::WriteOptions;
use crate::config::ClusterConfig;
use crate::crs::describe_crs;
use crate::error::Result;
use crate::features::build_features;
use crate::io::{read_input_raster, write_label_raster, LABEL_NODATA};
use crate::kmeans::{self, ClusterResult, Termination};
use crate::raster::Raster;
use crate::sieve::sieve;
use log::{info, warn};
use ndarray::{Array2, Axis};
use std::path::{Path, PathBuf};

/// Everything a run needs besides the input and output locations
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub cluster: ClusterConfig,
    /// Minimum patch size kept by the sieve filter; 0 disables it
    pub sieve_pixels: usize,
    pub write: WriteOptions,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        self.write.validate()
    }
}

/// Label grid of a classified raster plus the clustering outcome
#[derive(Debug, Clone)]
pub struct Classification {
    /// Cluster label per pixel, `LABEL_NODATA` where the input had no data
    pub labels: Array2<u8>,
    pub clusters: ClusterResult,
    pub valid_pixels: usize,
    pub nodata_pixels: usize,
}

/// Outcome of one run, reported to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub k: usize,
    pub iterations: usize,
    pub termination: Termination,
    pub inertia: f64,
    pub valid_pixels: usize,
    pub nodata_pixels: usize,
    /// Pixel count per cluster label in the written raster
    pub cluster_pixels: Vec<usize>,
}

impl RunSummary {
    fn new(classification: &Classification, k: usize) -> Self {
        let mut cluster_pixels = vec![0usize; k];
        for &label in classification.labels.iter() {
            if label != LABEL_NODATA {
                cluster_pixels[label as usize] += 1;
            }
        }

        Self {
            k,
            iterations: classification.clusters.iterations,
            termination: classification.clusters.termination,
            inertia: classification.clusters.inertia,
            valid_pixels: classification.valid_pixels,
            nodata_pixels: classification.nodata_pixels,
            cluster_pixels,
        }
    }
}

/// Feature extraction, clustering and reshaping of an in-memory raster
pub fn classify_raster(
    raster: &Raster,
    config: &ClusterConfig,
    sieve_pixels: usize,
) -> Result<Classification> {
    config.validate()?;

    let features = build_features(raster)?;
    let clusters = kmeans::fit(&features.data().view(), config)?;

    let layout = features.layout();
    let labels: Vec<u8> = clusters.labels.iter().map(|&l| l as u8).collect();
    let mut grid = layout.scatter(&labels, LABEL_NODATA)?;

    if sieve_pixels > 1 {
        info!("Sieving patches smaller than {} pixels", sieve_pixels);
        grid = sieve(&grid, sieve_pixels, LABEL_NODATA);
    }

    Ok(Classification {
        labels: grid,
        valid_pixels: layout.valid_count(),
        nodata_pixels: layout.invalid_count(),
        clusters,
    })
}

/// `<input stem>_kmeans.tif` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_kmeans.tif", stem))
}

fn log_raster_metadata(raster: &Raster) {
    let metadata = raster.metadata();
    info!(
        "Input: {}x{} pixels, {} band(s), pixel size {:.6} x {:.6}",
        metadata.width,
        metadata.height,
        metadata.band_count,
        metadata.pixel_width(),
        metadata.pixel_height()
    );
    info!("Input CRS: {}", describe_crs(&metadata.projection));
    info!("Input nodata: {:?}", metadata.nodata);
}

/// Read `input`, cluster its pixels and write the label raster to `output`
pub fn run_clustering(input: &Path, output: &Path, config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;

    let raster = read_input_raster(input)?;
    log_raster_metadata(&raster);

    let classification = classify_raster(&raster, &config.cluster, config.sieve_pixels)?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_label_raster(output, &classification.labels, raster.metadata(), &config.write)?;

    let summary = RunSummary::new(&classification, config.cluster.k);
    if !summary.termination.is_converged() {
        warn!(
            "Clustering did not converge within {} iterations; labels are from the last iteration",
            summary.iterations
        );
    }
    info!(
        "Cluster sizes: {:?} ({} no-data pixels)",
        summary.cluster_pixels, summary.nodata_pixels
    );
    for (label, centroid) in classification.clusters.centroids.axis_iter(Axis(0)).enumerate() {
        info!("Centroid {}: {:?}", label, centroid.to_vec());
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::test_metadata;
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    /// 4 bands, left half one spectrum and right half another
    fn two_region_raster() -> Raster {
        let mut data = Array3::zeros((4, 10, 10));
        for b in 0..4 {
            for r in 0..10 {
                for c in 0..10 {
                    data[[b, r, c]] = if c < 5 {
                        10.0 + b as f64
                    } else {
                        200.0 - 5.0 * b as f64
                    };
                }
            }
        }
        Raster::new(data, test_metadata(10, 10, 4)).unwrap()
    }

    #[test]
    fn test_two_region_scenario() {
        let raster = two_region_raster();
        let result = classify_raster(&raster, &ClusterConfig::new(2).with_seed(1), 0).unwrap();

        let left = result.labels[[0, 0]];
        let right = result.labels[[0, 9]];
        assert_ne!(left, right);
        for ((_, c), &label) in result.labels.indexed_iter() {
            assert_eq!(label, if c < 5 { left } else { right });
        }

        let centroids = &result.clusters.centroids;
        for b in 0..4 {
            assert_relative_eq!(centroids[[left as usize, b]], 10.0 + b as f64);
            assert_relative_eq!(centroids[[right as usize, b]], 200.0 - 5.0 * b as f64);
        }
        assert!(result.clusters.termination.is_converged());
    }

    #[test]
    fn test_nodata_preserved_and_ignored() {
        let mut data = Array3::from_elem((2, 4, 4), 1.0);
        data[[0, 0, 0]] = -9999.0;
        data[[0, 3, 3]] = -9999.0;
        // Extreme values under no-data must not pull the centroid
        data[[1, 0, 0]] = 1e9;
        data[[1, 3, 3]] = 1e9;
        let mut metadata = test_metadata(4, 4, 2);
        metadata.nodata = vec![Some(-9999.0), None];
        let raster = Raster::new(data, metadata).unwrap();

        let result = classify_raster(&raster, &ClusterConfig::new(1), 0).unwrap();

        assert_eq!(result.labels[[0, 0]], LABEL_NODATA);
        assert_eq!(result.labels[[3, 3]], LABEL_NODATA);
        assert_eq!(result.nodata_pixels, 2);
        assert_eq!(result.valid_pixels, 14);
        assert_relative_eq!(result.clusters.centroids[[0, 1]], 1.0);
    }

    #[test]
    fn test_random_raster_uses_all_clusters() {
        let data = Array3::random((3, 100, 100), Uniform::new(0.0, 255.0));
        let raster = Raster::new(data, test_metadata(100, 100, 3)).unwrap();

        let result = classify_raster(&raster, &ClusterConfig::new(5).with_n_init(2), 0).unwrap();

        let summary = RunSummary::new(&result, 5);
        assert_eq!(summary.cluster_pixels.iter().sum::<usize>(), 10_000);
        assert!(summary.cluster_pixels.iter().all(|&n| n > 0));
        assert_eq!(result.labels.iter().copied().max(), Some(4));
    }

    #[test]
    fn test_sieve_applied() {
        let mut data = Array3::from_elem((1, 6, 6), 0.0);
        for r in 0..6 {
            for c in 3..6 {
                data[[0, r, c]] = 100.0;
            }
        }
        // One odd pixel inside the left region
        data[[0, 2, 1]] = 100.0;
        let raster = Raster::new(data, test_metadata(6, 6, 1)).unwrap();

        let plain = classify_raster(&raster, &ClusterConfig::new(2), 0).unwrap();
        assert_eq!(plain.labels[[2, 1]], plain.labels[[0, 5]]);

        let sieved = classify_raster(&raster, &ClusterConfig::new(2), 4).unwrap();
        assert_eq!(sieved.labels[[2, 1]], sieved.labels[[0, 0]]);
    }

    #[test]
    fn test_config_error_before_work() {
        let raster = two_region_raster();
        let result = classify_raster(&raster, &ClusterConfig::new(101).with_seed(1), 0);
        assert!(matches!(
            result,
            Err(crate::error::KMeansError::TooFewSamples { k: 101, samples: 100 })
        ));
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("/tmp/input/scene.tif"));
        assert_eq!(path, PathBuf::from("/tmp/input/scene_kmeans.tif"));
    }
}
