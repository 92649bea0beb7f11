//! Uniform bucket index over points, keyed on the grid's cell lattice.
//!
//! Buckets are `cell_size_lat` by `cell_size_lon` and anchored at the box's
//! south-west corner. A query scans every bucket that can hold a point inside
//! the per-axis tolerance window, padded by one bucket on each side so that
//! rounding in the bucket arithmetic can never hide a qualifying point, and
//! then applies the exact membership test from [`GridGeometry::covers`].

use std::collections::HashMap;

use crate::grid::GridGeometry;
use crate::DecimalCoordinate;

pub struct PointBuckets<'a> {
    geometry: &'a GridGeometry,
    points: &'a [DecimalCoordinate],
    buckets: HashMap<(i64, i64), Vec<usize>>,
}

impl<'a> PointBuckets<'a> {
    pub fn build(geometry: &'a GridGeometry, points: &'a [DecimalCoordinate]) -> Self {
        let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (idx, point) in points.iter().enumerate() {
            let key = (
                bucket_index(point.lat, geometry.bbox.min_lat, geometry.cell_size_lat),
                bucket_index(point.lon, geometry.bbox.min_lon, geometry.cell_size_lon),
            );
            buckets.entry(key).or_default().push(idx);
        }
        Self {
            geometry,
            points,
            buckets,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether any point covers the cell whose corner is `(cell_lat, cell_lon)`.
    pub fn any_covering(&self, cell_lat: f64, cell_lon: f64, lon_tol: f64) -> bool {
        if self.buckets.is_empty() {
            return false;
        }
        let geometry = self.geometry;
        let radius = geometry.radius_deg;

        let lat_lo = bucket_index(cell_lat - radius, geometry.bbox.min_lat, geometry.cell_size_lat) - 1;
        let lat_hi = bucket_index(cell_lat + radius, geometry.bbox.min_lat, geometry.cell_size_lat) + 1;
        let lon_lo = bucket_index(cell_lon - lon_tol, geometry.bbox.min_lon, geometry.cell_size_lon) - 1;
        let lon_hi = bucket_index(cell_lon + lon_tol, geometry.bbox.min_lon, geometry.cell_size_lon) + 1;

        // Near the poles the longitude window can span far more buckets than
        // exist; scanning the points directly is cheaper then.
        let window = (lat_hi.saturating_sub(lat_lo) + 1).saturating_mul(lon_hi.saturating_sub(lon_lo) + 1);
        if window < 0 || window as usize > self.buckets.len() {
            return self.scan_all(cell_lat, cell_lon, lon_tol);
        }

        for lat_key in lat_lo..=lat_hi {
            for lon_key in lon_lo..=lon_hi {
                if let Some(indices) = self.buckets.get(&(lat_key, lon_key)) {
                    if indices
                        .iter()
                        .any(|&i| geometry.covers(cell_lat, cell_lon, lon_tol, &self.points[i]))
                    {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn scan_all(&self, cell_lat: f64, cell_lon: f64, lon_tol: f64) -> bool {
        self.points
            .iter()
            .any(|p| self.geometry.covers(cell_lat, cell_lon, lon_tol, p))
    }
}

/// Bucket coordinate of `value` on a lattice starting at `origin` with spacing `size`.
///
/// Saturates for values far outside the box; NaN lands in bucket 0 and is
/// rejected later by the exact test.
fn bucket_index(value: f64, origin: f64, size: f64) -> i64 {
    let idx = ((value - origin) / size).floor();
    if idx.is_nan() {
        0
    } else {
        idx.clamp(i64::MIN as f64 / 4.0, i64::MAX as f64 / 4.0) as i64
    }
}
