//! Coverage grid analysis.
//!
//! The bounding box is cut into cells roughly one detection radius on a side.
//! A cell counts as covered when any recorded point lies within the radius of
//! the cell's south-west corner, using a per-axis (rectangular) tolerance:
//! `radius_deg` in latitude and `radius_deg / cos(cell_lat)` in longitude.
//! Cell sizing uses the box's average latitude for the longitude correction
//! while the membership test uses each cell's own latitude; both are kept as
//! is because they define the reported coverage pattern.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::index::PointBuckets;
use crate::{CovError, DecimalCoordinate};

/// Meters per degree of latitude used to turn the detection radius into degrees.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Point count at and above which [`Engine::Auto`] switches to the bucketed index.
const AUTO_BUCKET_MIN_POINTS: usize = 64;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    #[default]
    Auto,
    BruteForce,
    Bucketed,
}

impl Engine {
    fn resolve(self, point_count: usize) -> Engine {
        match self {
            Engine::Auto if point_count >= AUTO_BUCKET_MIN_POINTS => Engine::Bucketed,
            Engine::Auto => Engine::BruteForce,
            other => other,
        }
    }
}

impl FromStr for Engine {
    type Err = CovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Engine::Auto),
            "brute-force" | "brute_force" | "bruteforce" => Ok(Engine::BruteForce),
            "bucketed" | "buckets" => Ok(Engine::Bucketed),
            other => Err(CovError::InvalidParameter(format!("unknown engine '{other}'"))),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::Auto => "auto",
            Engine::BruteForce => "brute-force",
            Engine::Bucketed => "bucketed",
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Check `min < max` on both axes. NaN or infinite bounds are rejected too.
    pub fn validate(&self) -> Result<(), CovError> {
        let bounds = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(CovError::InvalidBoundingBox(format!(
                "bounds must be finite, got {self}"
            )));
        }
        if self.min_lat >= self.max_lat {
            return Err(CovError::InvalidBoundingBox(format!(
                "min_lat {} must be below max_lat {}",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lon >= self.max_lon {
            return Err(CovError::InvalidBoundingBox(format!(
                "min_lon {} must be below max_lon {}",
                self.min_lon, self.max_lon
            )));
        }
        Ok(())
    }

    pub fn lat_extent(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_extent(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat [{}, {}] lon [{}, {}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}

/// Cell sizing derived from a bounding box and a detection radius.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GridGeometry {
    pub bbox: BoundingBox,
    pub radius_m: f64,
    pub radius_deg: f64,
    pub cell_size_lat: f64,
    pub cell_size_lon: f64,
    pub grid_size_lat: usize,
    pub grid_size_lon: usize,
    pub lat_step: f64,
    pub lon_step: f64,
}

impl GridGeometry {
    /// Size the grid with no limit on the cell count.
    pub fn new(bbox: BoundingBox, radius_m: f64) -> Result<Self, CovError> {
        Self::with_limit(bbox, radius_m, usize::MAX)
    }

    pub fn with_limit(bbox: BoundingBox, radius_m: f64, max_cells: usize) -> Result<Self, CovError> {
        bbox.validate()?;
        if !(radius_m > 0.0 && radius_m.is_finite()) {
            return Err(CovError::InvalidParameter(format!(
                "radius must be a positive number of meters, got {radius_m}"
            )));
        }

        let radius_deg = radius_m / METERS_PER_DEGREE;
        let avg_lat = ((bbox.min_lat + bbox.max_lat) / 2.0).to_radians();
        let cell_size_lat = radius_deg;
        let cell_size_lon = radius_deg / avg_lat.cos();

        let rows = (bbox.lat_extent() / cell_size_lat).trunc();
        let cols = (bbox.lon_extent() / cell_size_lon).trunc();
        if !(rows >= 1.0 && cols >= 1.0) {
            return Err(CovError::DegenerateGrid {
                grid_size_lat: saturating_i64(rows),
                grid_size_lon: saturating_i64(cols),
            });
        }
        let cells = rows * cols;
        if cells > max_cells as f64 {
            return Err(CovError::GridTooLarge {
                cells,
                limit: max_cells,
            });
        }

        let grid_size_lat = rows as usize;
        let grid_size_lon = cols as usize;
        Ok(Self {
            bbox,
            radius_m,
            radius_deg,
            cell_size_lat,
            cell_size_lon,
            grid_size_lat,
            grid_size_lon,
            lat_step: bbox.lat_extent() / grid_size_lat as f64,
            lon_step: bbox.lon_extent() / grid_size_lon as f64,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.grid_size_lat * self.grid_size_lon
    }

    /// South-west corner of cell `(row, col)`; the point the membership test measures from.
    pub fn cell_corner(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.bbox.min_lat + row as f64 * self.lat_step,
            self.bbox.min_lon + col as f64 * self.lon_step,
        )
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.bbox.min_lat + (row as f64 + 0.5) * self.lat_step,
            self.bbox.min_lon + (col as f64 + 0.5) * self.lon_step,
        )
    }

    /// `(lat_lo, lat_hi, lon_lo, lon_hi)` of cell `(row, col)`.
    pub fn cell_bounds(&self, row: usize, col: usize) -> (f64, f64, f64, f64) {
        let (lat_lo, lon_lo) = self.cell_corner(row, col);
        let (lat_hi, lon_hi) = self.cell_corner(row + 1, col + 1);
        (lat_lo, lat_hi, lon_lo, lon_hi)
    }

    /// Longitude tolerance at `cell_lat`.
    pub fn lon_tolerance(&self, cell_lat: f64) -> f64 {
        self.radius_deg / cell_lat.to_radians().cos()
    }

    /// The per-axis membership test for one point against one cell corner.
    #[inline]
    pub fn covers(&self, cell_lat: f64, cell_lon: f64, lon_tol: f64, point: &DecimalCoordinate) -> bool {
        (point.lat - cell_lat).abs() <= self.radius_deg && (point.lon - cell_lon).abs() <= lon_tol
    }
}

fn saturating_i64(value: f64) -> i64 {
    if value.is_nan() {
        0
    } else {
        value as i64
    }
}

/// Occupancy grid: `cells[[row, col]]` is `true` when the cell is covered.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageGrid {
    geometry: GridGeometry,
    cells: Array2<bool>,
}

impl CoverageGrid {
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn cells(&self) -> &Array2<bool> {
        &self.cells
    }

    pub fn grid_size_lat(&self) -> usize {
        self.geometry.grid_size_lat
    }

    pub fn grid_size_lon(&self) -> usize {
        self.geometry.grid_size_lon
    }

    /// `(grid_size_lat, grid_size_lon)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.geometry.grid_size_lat, self.geometry.grid_size_lon)
    }

    pub fn is_covered(&self, row: usize, col: usize) -> bool {
        self.cells.get((row, col)).copied().unwrap_or(false)
    }

    pub fn covered_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn coverage_ratio(&self) -> f64 {
        let total = self.cells.len();
        if total == 0 {
            0.0
        } else {
            self.covered_count() as f64 / total as f64
        }
    }

    /// Iterate `(row, col, covered)` in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, bool)> + '_ {
        self.cells
            .indexed_iter()
            .map(|((row, col), &covered)| (row, col, covered))
    }

    pub fn into_cells(self) -> Array2<bool> {
        self.cells
    }
}

/// Analyze coverage with default settings.
pub fn analyze_coverage(
    points: &[DecimalCoordinate],
    bbox: &BoundingBox,
    radius_m: f64,
) -> Result<CoverageGrid, CovError> {
    analyze_coverage_with(points, bbox, radius_m, &AnalysisConfig::default())
}

/// Analyze coverage of `bbox` by `points` within `radius_m` meters.
pub fn analyze_coverage_with(
    points: &[DecimalCoordinate],
    bbox: &BoundingBox,
    radius_m: f64,
    config: &AnalysisConfig,
) -> Result<CoverageGrid, CovError> {
    let geometry = GridGeometry::with_limit(*bbox, radius_m, config.max_cells)?;
    let engine = config.engine.resolve(points.len());
    debug!(
        "grid {}x{} cells, radius {:.7} deg, {} points, engine {}",
        geometry.grid_size_lat,
        geometry.grid_size_lon,
        geometry.radius_deg,
        points.len(),
        engine
    );

    let cells = match engine {
        Engine::Bucketed => fill_bucketed(&geometry, points),
        _ => fill_brute_force(&geometry, points),
    };
    Ok(CoverageGrid { geometry, cells })
}

fn fill_brute_force(geometry: &GridGeometry, points: &[DecimalCoordinate]) -> Array2<bool> {
    let mut cells = Array2::from_elem((geometry.grid_size_lat, geometry.grid_size_lon), false);
    for row in 0..geometry.grid_size_lat {
        for col in 0..geometry.grid_size_lon {
            let (cell_lat, cell_lon) = geometry.cell_corner(row, col);
            let lon_tol = geometry.lon_tolerance(cell_lat);
            cells[[row, col]] = points
                .iter()
                .any(|p| geometry.covers(cell_lat, cell_lon, lon_tol, p));
        }
    }
    cells
}

fn fill_bucketed(geometry: &GridGeometry, points: &[DecimalCoordinate]) -> Array2<bool> {
    let buckets = PointBuckets::build(geometry, points);
    let mut cells = Array2::from_elem((geometry.grid_size_lat, geometry.grid_size_lon), false);
    for row in 0..geometry.grid_size_lat {
        for col in 0..geometry.grid_size_lon {
            let (cell_lat, cell_lon) = geometry.cell_corner(row, col);
            let lon_tol = geometry.lon_tolerance(cell_lat);
            cells[[row, col]] = buckets.any_covering(cell_lat, cell_lon, lon_tol);
        }
    }
    cells
}
