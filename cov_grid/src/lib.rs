//! Detector coverage analysis: DMS log ingestion and occupancy grid computation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod dms;
pub mod grid;
pub mod index;
pub mod ingest;

pub use config::{AnalysisConfig, Config, IngestConfig};
pub use dms::{parse_dms, parse_dms_coordinate, Direction, DmsCoordinate};
pub use grid::{
    analyze_coverage, analyze_coverage_with, BoundingBox, CoverageGrid, Engine, GridGeometry,
    METERS_PER_DEGREE,
};
pub use ingest::{ingest_source, parse_lines, parse_record, parse_source, IngestReport, IngestStats};

#[derive(Error, Debug)]
pub enum CovError {
    #[error("invalid DMS coordinate format: '{0}'")]
    Format(String),
    #[error("DMS value out of range in '{0}'")]
    DmsNumber(String),
    #[error("log source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),
    #[error("degenerate grid: {grid_size_lat} x {grid_size_lon} cells (radius too large for the bounding box)")]
    DegenerateGrid {
        grid_size_lat: i64,
        grid_size_lon: i64,
    },
    #[error("grid of {cells} cells exceeds the limit of {limit}")]
    GridTooLarge { cells: f64, limit: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid configuration: {section}.{key} = '{value}' - {reason}")]
    Config {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
    #[error("failed to read config file {}: {message}", path.display())]
    ConfigRead { path: PathBuf, message: String },
}

/// A latitude/longitude pair in decimal degrees, positive north and east.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecimalCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl DecimalCoordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<(f64, f64)> for DecimalCoordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}
