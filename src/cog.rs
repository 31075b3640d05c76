use crate::error::{KMeansError, Result};
use gdal::Dataset;
use log::{debug, info};

/// GeoTIFF creation settings for the label raster
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    /// Compression type: "DEFLATE", "LZW", "ZSTD", "NONE"
    pub compression: String,
    /// Tile size for tiled output, `None` for strips
    pub tile_size: Option<usize>,
    /// Build internal overviews after writing
    pub overviews: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            tile_size: None,
            overviews: false,
        }
    }
}

impl WriteOptions {
    pub fn validate(&self) -> Result<()> {
        validate_compression(&self.compression)?;
        if let Some(tile_size) = self.tile_size {
            validate_tile_size(tile_size)?;
        }
        Ok(())
    }
}

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(KMeansError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate tile size (must be multiple of 16)
pub fn validate_tile_size(tile_size: usize) -> Result<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(KMeansError::InvalidTileSize(tile_size));
    }
    Ok(())
}

/// GTiff creation options for the given settings
pub fn create_dataset_options(options: &WriteOptions) -> Vec<String> {
    let mut opts = vec![format!("COMPRESS={}", options.compression)];
    if let Some(tile_size) = options.tile_size {
        opts.push("TILED=YES".to_string());
        opts.push(format!("BLOCKXSIZE={}", tile_size));
        opts.push(format!("BLOCKYSIZE={}", tile_size));
    }
    opts.push("BIGTIFF=IF_SAFER".to_string());
    opts
}

/// Overview factors (powers of 2) until the smaller side drops below 256 pixels
pub fn overview_levels(width: usize, height: usize) -> Vec<i32> {
    let min_dim = width.min(height);

    let mut levels: Vec<i32> = Vec::new();
    let mut level = 2;
    while (min_dim / level) >= 256 {
        levels.push(level as i32);
        level *= 2;
    }
    levels
}

/// Build internal overviews.
///
/// Uses NEAREST resampling so overview pixels are always real cluster labels.
pub fn build_overviews(dataset: &mut Dataset) -> Result<()> {
    let (width, height) = dataset.raster_size();
    let levels = overview_levels(width, height);

    if levels.is_empty() {
        debug!("Raster too small for overviews ({}x{}), skipping", width, height);
        return Ok(());
    }

    info!("Creating {} overview levels: {:?}", levels.len(), levels);
    dataset
        .build_overviews("NEAREST", &levels, &[])
        .map_err(KMeansError::GdalWrite)?;

    Ok(())
}
