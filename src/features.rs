use crate::error::{KMeansError, Result};
use crate::raster::Raster;
use log::{debug, info};
use ndarray::{Array2, ArrayView1};

/// Mapping between feature rows and raster pixels.
///
/// Feature row `i` originates from the pixel at flat row-major index
/// `pixel_index[i]`; pixels absent from `pixel_index` are no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelLayout {
    rows: usize,
    cols: usize,
    valid: Array2<bool>,
    pixel_index: Vec<usize>,
}

impl PixelLayout {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn valid_mask(&self) -> &Array2<bool> {
        &self.valid
    }

    pub fn valid_count(&self) -> usize {
        self.pixel_index.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.rows * self.cols - self.pixel_index.len()
    }

    /// (row, col) of the pixel behind feature row `i`
    pub fn coordinates(&self, i: usize) -> (usize, usize) {
        let flat = self.pixel_index[i];
        (flat / self.cols, flat % self.cols)
    }

    /// Place one value per feature row back onto the raster grid, filling
    /// no-data pixels with `fill`.
    pub fn scatter<T: Copy>(&self, values: &[T], fill: T) -> Result<Array2<T>> {
        if values.len() != self.pixel_index.len() {
            return Err(KMeansError::LabelCountMismatch {
                expected: self.pixel_index.len(),
                actual: values.len(),
            });
        }

        let mut grid = vec![fill; self.rows * self.cols];
        for (&flat, &value) in self.pixel_index.iter().zip(values) {
            grid[flat] = value;
        }

        Ok(Array2::from_shape_vec((self.rows, self.cols), grid)?)
    }
}

/// Per-pixel feature vectors of the valid pixels, one row per pixel in
/// row-major order, one column per band.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    data: Array2<f64>,
    layout: PixelLayout,
}

impl FeatureMatrix {
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn layout(&self) -> &PixelLayout {
        &self.layout
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn into_parts(self) -> (Array2<f64>, PixelLayout) {
        (self.data, self.layout)
    }
}

fn is_valid_pixel(values: ArrayView1<f64>, nodata: &[Option<f64>]) -> bool {
    values.iter().zip(nodata).all(|(&v, nd)| {
        if !v.is_finite() {
            return false;
        }
        match nd {
            Some(nd) => v != *nd,
            None => true,
        }
    })
}

/// Flatten a raster into a feature matrix, excluding no-data pixels
pub fn build_features(raster: &Raster) -> Result<FeatureMatrix> {
    let (rows, cols) = raster.shape();
    let n_bands = raster.band_count();
    let data = raster.data();
    let nodata = &raster.metadata().nodata;

    let mut valid = Array2::from_elem((rows, cols), false);
    let mut pixel_index = Vec::with_capacity(rows * cols);
    let mut flat = Vec::with_capacity(rows * cols * n_bands);

    for r in 0..rows {
        for c in 0..cols {
            if let Some(mask) = raster.mask() {
                if !mask[[r, c]] {
                    continue;
                }
            }

            let values = data.slice(ndarray::s![.., r, c]);
            if !is_valid_pixel(values, nodata) {
                continue;
            }

            valid[[r, c]] = true;
            pixel_index.push(r * cols + c);
            flat.extend(values.iter().copied());
        }
    }

    if pixel_index.is_empty() {
        return Err(KMeansError::NoValidPixels);
    }

    let n_valid = pixel_index.len();
    info!(
        "Built {} feature vectors of {} bands ({} no-data pixels excluded)",
        n_valid,
        n_bands,
        rows * cols - n_valid
    );
    debug!("Feature buffer holds {} values", flat.len());

    let data = Array2::from_shape_vec((n_valid, n_bands), flat)?;

    Ok(FeatureMatrix {
        data,
        layout: PixelLayout {
            rows,
            cols,
            valid,
            pixel_index,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::test_metadata;
    use ndarray::{arr2, Array3};

    fn two_band_raster() -> Raster {
        // band 0 and band 1 over a 2x3 grid
        let data = Array3::from_shape_vec(
            (2, 2, 3),
            vec![
                1.0, 2.0, 3.0, //
                4.0, 5.0, 6.0, //
                10.0, 20.0, 30.0, //
                40.0, 50.0, 60.0,
            ],
        )
        .unwrap();
        Raster::new(data, test_metadata(3, 2, 2)).unwrap()
    }

    #[test]
    fn test_row_major_order() {
        let features = build_features(&two_band_raster()).unwrap();

        assert_eq!(features.n_samples(), 6);
        assert_eq!(features.n_features(), 2);
        assert_eq!(features.data().row(0).to_vec(), vec![1.0, 10.0]);
        assert_eq!(features.data().row(4).to_vec(), vec![5.0, 50.0]);
        assert_eq!(features.layout().coordinates(4), (1, 1));
    }

    #[test]
    fn test_nodata_value_excluded() {
        let mut metadata = test_metadata(3, 1, 2);
        metadata.nodata = vec![None, Some(-9999.0)];
        let data = Array3::from_shape_vec(
            (2, 1, 3),
            vec![1.0, 2.0, 3.0, 10.0, -9999.0, 30.0],
        )
        .unwrap();
        let raster = Raster::new(data, metadata).unwrap();

        let features = build_features(&raster).unwrap();

        assert_eq!(features.n_samples(), 2);
        assert_eq!(features.layout().coordinates(1), (0, 2));
        assert_eq!(features.layout().invalid_count(), 1);
        assert!(!features.layout().valid_mask()[[0, 1]]);
    }

    #[test]
    fn test_nan_excluded() {
        let data =
            Array3::from_shape_vec((1, 2, 2), vec![1.0, f64::NAN, f64::INFINITY, 4.0]).unwrap();
        let raster = Raster::new(data, test_metadata(2, 2, 1)).unwrap();

        let features = build_features(&raster).unwrap();
        assert_eq!(features.n_samples(), 2);
        assert_eq!(features.data().column(0).to_vec(), vec![1.0, 4.0]);
    }

    #[test]
    fn test_explicit_mask() {
        let raster = two_band_raster()
            .with_mask(arr2(&[[true, false, true], [false, true, true]]))
            .unwrap();

        let features = build_features(&raster).unwrap();
        assert_eq!(features.n_samples(), 4);
        assert_eq!(features.layout().coordinates(1), (0, 2));
        assert_eq!(features.layout().coordinates(2), (1, 1));
    }

    #[test]
    fn test_all_nodata_is_error() {
        let mut metadata = test_metadata(2, 2, 1);
        metadata.nodata = vec![Some(0.0)];
        let raster = Raster::new(Array3::zeros((1, 2, 2)), metadata).unwrap();

        let result = build_features(&raster);
        assert!(matches!(result, Err(KMeansError::NoValidPixels)));
    }

    #[test]
    fn test_scatter_round_trip() {
        let raster = two_band_raster()
            .with_mask(arr2(&[[true, true, false], [true, false, true]]))
            .unwrap();
        let features = build_features(&raster).unwrap();
        let layout = features.layout();

        // Identity labels: every feature row maps back to its own flat pixel index
        let identity: Vec<i64> = (0..layout.valid_count())
            .map(|i| {
                let (r, c) = layout.coordinates(i);
                (r * 3 + c) as i64
            })
            .collect();
        let grid = layout.scatter(&identity, -1).unwrap();

        assert_eq!(grid, arr2(&[[0, 1, -1], [3, -1, 5]]));
    }

    #[test]
    fn test_scatter_length_mismatch() {
        let features = build_features(&two_band_raster()).unwrap();
        let result = features.layout().scatter(&[0u8; 5], 255);
        assert!(matches!(
            result,
            Err(KMeansError::LabelCountMismatch { expected: 6, actual: 5 })
        ));
    }
}
