use thiserror::Error;

/// Coarse classification of failures, used by callers to decide how to report a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable, empty, inconsistent or fully no-data input raster
    Input,
    /// Invalid clustering or output parameters
    Config,
    /// Destination could not be written
    Output,
}

#[derive(Error, Debug)]
pub enum KMeansError {
    #[error("GDAL error while reading input: {0}")]
    GdalRead(#[source] gdal::errors::GdalError),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Input raster has no bands")]
    NoBands,

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Band {band} is {width}x{height}, expected {expected_width}x{expected_height}")]
    BandSizeMismatch {
        band: usize,
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    #[error("Metadata describes {expected_width}x{expected_height} pixels but the bands are {width}x{height}")]
    MetadataSizeMismatch {
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    #[error("Metadata describes {expected} bands but {actual} were read")]
    BandCountMismatch { expected: usize, actual: usize },

    #[error("Validity mask is {0}x{1}, expected {2}x{3}")]
    MaskSizeMismatch(usize, usize, usize, usize),

    #[error("No valid pixels found in input raster")]
    NoValidPixels,

    #[error("Invalid number of clusters: {0} (must be between 1 and 255)")]
    InvalidClusterCount(usize),

    #[error("Not enough valid pixels ({samples}) for {k} clusters")]
    TooFewSamples { k: usize, samples: usize },

    #[error("Invalid maximum iterations: {0} (must be positive)")]
    InvalidMaxIterations(usize),

    #[error("Invalid tolerance: {0} (must be finite and non-negative)")]
    InvalidTolerance(f64),

    #[error("Invalid number of initializations: {0} (must be positive)")]
    InvalidInitCount(usize),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),

    #[error("GDAL error while writing output: {0}")]
    GdalWrite(#[source] gdal::errors::GdalError),

    #[error("Got {actual} labels for {expected} valid pixels")]
    LabelCountMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KMeansError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KMeansError::GdalRead(_)
            | KMeansError::ShapeError(_)
            | KMeansError::NoBands
            | KMeansError::InvalidDimensions(..)
            | KMeansError::BandSizeMismatch { .. }
            | KMeansError::MetadataSizeMismatch { .. }
            | KMeansError::BandCountMismatch { .. }
            | KMeansError::MaskSizeMismatch(..)
            | KMeansError::NoValidPixels => ErrorKind::Input,

            KMeansError::InvalidClusterCount(_)
            | KMeansError::TooFewSamples { .. }
            | KMeansError::InvalidMaxIterations(_)
            | KMeansError::InvalidTolerance(_)
            | KMeansError::InvalidInitCount(_)
            | KMeansError::InvalidCompression(_)
            | KMeansError::InvalidTileSize(_) => ErrorKind::Config,

            KMeansError::GdalWrite(_)
            | KMeansError::LabelCountMismatch { .. }
            | KMeansError::Io(_) => ErrorKind::Output,
        }
    }
}

pub type Result<T> = std::result::Result<T, KMeansError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(KMeansError::NoValidPixels.kind(), ErrorKind::Input);
        assert_eq!(KMeansError::InvalidClusterCount(0).kind(), ErrorKind::Config);
        assert_eq!(
            KMeansError::TooFewSamples { k: 4, samples: 2 }.kind(),
            ErrorKind::Config
        );
        assert_eq!(
            KMeansError::MetadataSizeMismatch {
                width: 3,
                height: 2,
                expected_width: 4,
                expected_height: 2,
            }
            .kind(),
            ErrorKind::Input
        );
        assert_eq!(
            KMeansError::LabelCountMismatch { expected: 3, actual: 2 }.kind(),
            ErrorKind::Output
        );
    }

    #[test]
    fn test_error_messages() {
        let err = KMeansError::TooFewSamples { k: 5, samples: 3 };
        assert_eq!(err.to_string(), "Not enough valid pixels (3) for 5 clusters");
    }
}
