use crate::cog::{self, WriteOptions};
use crate::error::{KMeansError, Result};
use crate::raster::{Raster, RasterMetadata, DEFAULT_GEOTRANSFORM};
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, RasterBand};
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info, warn};
use ndarray::Array2;
use std::path::Path;

/// No-data value of the label raster; cluster labels stay below it
pub const LABEL_NODATA: u8 = 255;

/// Description set on the output band
pub const LABEL_BAND_DESCRIPTION: &str = "kmeans_clusters";

/// Read every band of a raster file and its georeferencing
pub fn read_input_raster<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    info!("Opening input raster: {}", path.display());
    let dataset = Dataset::open(path).map_err(KMeansError::GdalRead)?;
    read_dataset(&dataset)
}

/// Read every band of an open dataset and its georeferencing
pub fn read_dataset(dataset: &Dataset) -> Result<Raster> {
    let band_count = dataset.raster_count() as usize;
    if band_count == 0 {
        return Err(KMeansError::NoBands);
    }

    let (width, height) = dataset.raster_size();
    if width == 0 || height == 0 {
        return Err(KMeansError::InvalidDimensions(width, height));
    }

    let geotransform = match dataset.geo_transform() {
        Ok(gt) => gt,
        Err(e) => {
            warn!("Input has no geotransform ({}), using pixel coordinates", e);
            DEFAULT_GEOTRANSFORM
        }
    };
    let projection = dataset.projection();
    if projection.is_empty() {
        warn!("Input has no coordinate reference system");
    }

    let mut bands = Vec::with_capacity(band_count);
    let mut nodata = Vec::with_capacity(band_count);
    for band_index in 1..=band_count {
        let rasterband: RasterBand = dataset
            .rasterband(band_index)
            .map_err(KMeansError::GdalRead)?;

        let band_width = rasterband.x_size() as usize;
        let band_height = rasterband.y_size() as usize;
        if band_width != width || band_height != height {
            return Err(KMeansError::BandSizeMismatch {
                band: band_index,
                width: band_width,
                height: band_height,
                expected_width: width,
                expected_height: height,
            });
        }

        let band_nodata = rasterband.no_data_value();
        debug!("Band {}: nodata = {:?}", band_index, band_nodata);

        let buffer = rasterband
            .read_as::<f64>((0, 0), (width, height), (width, height), None)
            .map_err(KMeansError::GdalRead)?;
        let data = Array2::from_shape_vec((height, width), buffer.data().to_vec())?;

        bands.push(data);
        nodata.push(band_nodata);
    }

    let metadata = RasterMetadata {
        width,
        height,
        band_count,
        geotransform,
        projection,
        nodata,
    };

    info!(
        "Read {} band(s) of {}x{} pixels, geotransform {:?}",
        band_count, width, height, metadata.geotransform
    );

    Raster::from_bands(bands, metadata)
}

/// Copy the label grid and georeferencing into a one-band dataset
pub fn write_labels_to_dataset(
    dataset: &mut Dataset,
    labels: &Array2<u8>,
    metadata: &RasterMetadata,
) -> Result<()> {
    let (height, width) = labels.dim();
    if width != metadata.width || height != metadata.height {
        return Err(KMeansError::LabelCountMismatch {
            expected: metadata.width * metadata.height,
            actual: width * height,
        });
    }

    dataset
        .set_geo_transform(&metadata.geotransform)
        .map_err(KMeansError::GdalWrite)?;
    if !metadata.projection.is_empty() {
        dataset
            .set_projection(&metadata.projection)
            .map_err(KMeansError::GdalWrite)?;
    }

    let mut raster_band = dataset.rasterband(1).map_err(KMeansError::GdalWrite)?;

    // GDAL expects row-major data, which is how the label grid is laid out
    let data: Vec<u8> = labels.iter().copied().collect();
    let mut buffer = Buffer::new((width, height), data);
    raster_band
        .write((0, 0), (width, height), &mut buffer)
        .map_err(KMeansError::GdalWrite)?;

    raster_band
        .set_no_data_value(Some(LABEL_NODATA as f64))
        .map_err(KMeansError::GdalWrite)?;
    raster_band
        .set_description(LABEL_BAND_DESCRIPTION)
        .map_err(KMeansError::GdalWrite)?;

    Ok(())
}

/// Create the output GeoTIFF dataset with the requested creation options
pub fn create_output_dataset<P: AsRef<Path>>(
    path: P,
    metadata: &RasterMetadata,
    options: &WriteOptions,
) -> Result<Dataset> {
    let path = path.as_ref();
    info!("Creating output dataset: {}", path.display());

    let driver = DriverManager::get_driver_by_name("GTiff").map_err(KMeansError::GdalWrite)?;

    let mut gdal_options = CslStringList::new();
    for opt in cog::create_dataset_options(options) {
        gdal_options
            .add_string(&opt)
            .map_err(KMeansError::GdalWrite)?;
    }

    let dataset = driver
        .create_with_band_type_with_options::<u8, _>(
            path,
            metadata.width,
            metadata.height,
            1,
            &gdal_options,
        )
        .map_err(KMeansError::GdalWrite)?;

    Ok(dataset)
}

/// Write the single-band label GeoTIFF.
///
/// A file that fails part way through is removed, so `path` either holds a
/// complete label raster or nothing.
pub fn write_label_raster<P: AsRef<Path>>(
    path: P,
    labels: &Array2<u8>,
    metadata: &RasterMetadata,
    options: &WriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    options.validate()?;

    let mut dataset = create_output_dataset(path, metadata, options)?;
    let written = write_labels_to_dataset(&mut dataset, labels, metadata).and_then(|()| {
        if options.overviews {
            cog::build_overviews(&mut dataset)
        } else {
            Ok(())
        }
    });

    if let Err(e) = written {
        drop(dataset);
        discard_partial_output(path);
        return Err(e);
    }

    info!("Successfully wrote label raster to {}", path.display());
    Ok(())
}

fn discard_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed incomplete output {}", path.display()),
        Err(e) => warn!("Failed to remove incomplete output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::test_metadata;
    use ndarray::arr2;

    fn mem_dataset<T: gdal::raster::GdalType + Copy>(
        width: usize,
        height: usize,
        bands: usize,
    ) -> Dataset {
        let driver = DriverManager::get_driver_by_name("MEM").unwrap();
        driver
            .create_with_band_type::<T, _>("", width, height, bands)
            .unwrap()
    }

    #[test]
    fn test_read_dataset() {
        let mut dataset = mem_dataset::<f32>(3, 2, 2);
        let gt = [100.0, 2.0, 0.0, 50.0, 0.0, -2.0];
        dataset.set_geo_transform(&gt).unwrap();

        for band_index in 1..=2 {
            let mut band = dataset.rasterband(band_index).unwrap();
            let values: Vec<f32> = (0..6).map(|v| (v * band_index) as f32).collect();
            let mut buffer = Buffer::new((3, 2), values);
            band.write((0, 0), (3, 2), &mut buffer).unwrap();
        }
        dataset
            .rasterband(2)
            .unwrap()
            .set_no_data_value(Some(-1.0))
            .unwrap();

        let raster = read_dataset(&dataset).unwrap();

        assert_eq!(raster.shape(), (2, 3));
        assert_eq!(raster.band_count(), 2);
        assert_eq!(raster.metadata().geotransform, gt);
        assert_eq!(raster.metadata().nodata, vec![None, Some(-1.0)]);
        assert_eq!(raster.data()[[1, 1, 2]], 10.0);
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_input_raster("/nonexistent/input.tif");
        assert!(matches!(result, Err(KMeansError::GdalRead(_))));
    }

    #[test]
    fn test_write_labels_to_dataset() {
        let metadata = test_metadata(3, 2, 4);
        let labels = arr2(&[[0u8, 1, 2], [LABEL_NODATA, 1, 0]]);
        let mut dataset = mem_dataset::<u8>(3, 2, 1);

        write_labels_to_dataset(&mut dataset, &labels, &metadata).unwrap();

        let band = dataset.rasterband(1).unwrap();
        assert_eq!(band.no_data_value(), Some(255.0));
        let buffer = band.read_as::<u8>((0, 0), (3, 2), (3, 2), None).unwrap();
        assert_eq!(buffer.data().to_vec(), vec![0, 1, 2, 255, 1, 0]);
        assert_eq!(dataset.geo_transform().unwrap(), metadata.geotransform);
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.tif");
        let metadata = test_metadata(4, 2, 1);
        let labels = arr2(&[[0u8, 1, 2], [0, 1, 0]]);

        let result = write_label_raster(&path, &labels, &metadata, &WriteOptions::default());

        assert!(matches!(
            result,
            Err(KMeansError::LabelCountMismatch { expected: 8, actual: 6 })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_label_raster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.tif");
        let metadata = test_metadata(3, 2, 1);
        let labels = arr2(&[[0u8, 1, 2], [LABEL_NODATA, 1, 0]]);

        write_label_raster(&path, &labels, &metadata, &WriteOptions::default()).unwrap();

        let dataset = Dataset::open(&path).unwrap();
        let band = dataset.rasterband(1).unwrap();
        assert_eq!(band.description().unwrap(), LABEL_BAND_DESCRIPTION);
        let buffer = band.read_as::<u8>((0, 0), (3, 2), (3, 2), None).unwrap();
        assert_eq!(buffer.data().to_vec(), vec![0, 1, 2, 255, 1, 0]);
    }

    #[test]
    fn test_write_labels_shape_mismatch() {
        let metadata = test_metadata(4, 2, 1);
        let labels = arr2(&[[0u8, 1, 2], [0, 1, 0]]);
        let mut dataset = mem_dataset::<u8>(3, 2, 1);

        let result = write_labels_to_dataset(&mut dataset, &labels, &metadata);
        assert!(matches!(
            result,
            Err(KMeansError::LabelCountMismatch { expected: 8, actual: 6 })
        ));
    }
}
