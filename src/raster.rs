use crate::error::{KMeansError, Result};
use ndarray::{Array2, Array3, ArrayView2};

/// GDAL geotransform used when a source carries none (pixel coordinates are world coordinates)
pub const DEFAULT_GEOTRANSFORM: [f64; 6] = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    /// No-data value per band, in band order
    pub nodata: Vec<Option<f64>>,
}

impl RasterMetadata {
    pub fn pixel_width(&self) -> f64 {
        self.geotransform[1].abs()
    }

    pub fn pixel_height(&self) -> f64 {
        self.geotransform[5].abs()
    }
}

/// Multi-band raster held entirely in memory.
///
/// Band values are stored as `(band, row, col)`. An optional validity mask
/// (`true` = valid) can mark pixels as no-data on top of the per-band
/// no-data values.
#[derive(Debug, Clone)]
pub struct Raster {
    data: Array3<f64>,
    metadata: RasterMetadata,
    mask: Option<Array2<bool>>,
}

impl Raster {
    pub fn new(data: Array3<f64>, metadata: RasterMetadata) -> Result<Self> {
        let (bands, height, width) = data.dim();

        if bands == 0 {
            return Err(KMeansError::NoBands);
        }
        if width == 0 || height == 0 {
            return Err(KMeansError::InvalidDimensions(width, height));
        }
        if metadata.width != width || metadata.height != height {
            return Err(KMeansError::MetadataSizeMismatch {
                width,
                height,
                expected_width: metadata.width,
                expected_height: metadata.height,
            });
        }
        if metadata.band_count != bands || metadata.nodata.len() != bands {
            return Err(KMeansError::BandCountMismatch {
                expected: metadata.band_count,
                actual: bands,
            });
        }

        Ok(Self {
            data,
            metadata,
            mask: None,
        })
    }

    /// Build a raster from separately read bands, checking they share one size
    pub fn from_bands(bands: Vec<Array2<f64>>, metadata: RasterMetadata) -> Result<Self> {
        let first = bands.first().ok_or(KMeansError::NoBands)?;
        let (height, width) = first.dim();

        for (i, band) in bands.iter().enumerate() {
            let (h, w) = band.dim();
            if h != height || w != width {
                return Err(KMeansError::BandSizeMismatch {
                    band: i + 1,
                    width: w,
                    height: h,
                    expected_width: width,
                    expected_height: height,
                });
            }
        }

        let views: Vec<ArrayView2<f64>> = bands.iter().map(|b| b.view()).collect();
        let data = ndarray::stack(ndarray::Axis(0), &views)?;
        Self::new(data, metadata)
    }

    /// Attach an explicit validity mask (`true` = valid pixel)
    pub fn with_mask(mut self, mask: Array2<bool>) -> Result<Self> {
        let (h, w) = mask.dim();
        if h != self.metadata.height || w != self.metadata.width {
            return Err(KMeansError::MaskSizeMismatch(
                w,
                h,
                self.metadata.width,
                self.metadata.height,
            ));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    pub fn mask(&self) -> Option<&Array2<bool>> {
        self.mask.as_ref()
    }

    pub fn band_count(&self) -> usize {
        self.metadata.band_count
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.metadata.height, self.metadata.width)
    }
}

#[cfg(test)]
pub(crate) fn test_metadata(width: usize, height: usize, band_count: usize) -> RasterMetadata {
    RasterMetadata {
        width,
        height,
        band_count,
        geotransform: [500_000.0, 10.0, 0.0, 4_600_000.0, 0.0, -10.0],
        projection: String::new(),
        nodata: vec![None; band_count],
    }
}
