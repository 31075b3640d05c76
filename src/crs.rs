use gdal::spatial_ref::SpatialRef;
use log::warn;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrsKind {
    Geographic, // lat/lon in degrees
    Projected,  // planar, with a linear unit
    Other,
}

/// What the run reports about the input coordinate reference system
#[derive(Debug, Clone, PartialEq)]
pub enum CrsSummary {
    /// No projection stored in the source
    Missing,
    /// Projection present but GDAL could not parse it
    Unparsed,
    Known {
        kind: CrsKind,
        epsg: Option<i32>,
        /// Meters per linear unit (projected CRS only)
        linear_units: Option<f64>,
    },
}

impl fmt::Display for CrsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsSummary::Missing => write!(f, "none"),
            CrsSummary::Unparsed => write!(f, "unparsed WKT"),
            CrsSummary::Known {
                kind,
                epsg,
                linear_units,
            } => {
                match epsg {
                    Some(code) => write!(f, "EPSG:{} ", code)?,
                    None => write!(f, "custom ")?,
                }
                write!(f, "({:?}", kind)?;
                if let Some(units) = linear_units {
                    write!(f, ", {:.6} m/unit", units)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Summarize a projection WKT for logging.
///
/// The projection itself is copied to the output untouched; this is informational only.
pub fn describe_crs(projection_wkt: &str) -> CrsSummary {
    if projection_wkt.trim().is_empty() {
        return CrsSummary::Missing;
    }

    let spatial_ref = match SpatialRef::from_wkt(projection_wkt) {
        Ok(sr) => sr,
        Err(e) => {
            warn!("Failed to parse projection WKT: {}", e);
            return CrsSummary::Unparsed;
        }
    };

    let kind = if spatial_ref.is_geographic() {
        CrsKind::Geographic
    } else if spatial_ref.is_projected() {
        CrsKind::Projected
    } else {
        CrsKind::Other
    };

    let linear_units = match kind {
        CrsKind::Projected => Some(spatial_ref.linear_units()),
        _ => None,
    };

    CrsSummary::Known {
        kind,
        epsg: spatial_ref.auth_code().ok(),
        linear_units,
    }
}
