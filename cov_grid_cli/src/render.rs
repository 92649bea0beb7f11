//! Static PNG/SVG rendering of a coverage grid.

use std::panic;
use std::path::Path;

use anyhow::Result;
use cov_grid::CoverageGrid;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

const FIGURE_SIZE: (u32, u32) = (1280, 1024);
const BACKGROUND: RGBColor = RGBColor(240, 240, 240);
const COVERED: RGBColor = RGBColor(0, 255, 0);
const UNCOVERED: RGBColor = RGBColor(255, 0, 0);
/// Above this many cells the white cell borders would swamp the fill.
const MAX_OUTLINED_CELLS: usize = 10_000;

pub enum ChartKind {
    Png,
    Svg,
}

/// Render `grid` to `path`, turning backend panics (missing fonts and the
/// like) into an error the caller can log.
pub fn render_grid_guard(grid: &CoverageGrid, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_grid(grid, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_grid(grid: &CoverageGrid, path: &Path, kind: ChartKind) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
            draw_grid(root, grid)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
            draw_grid(root, grid)
        }
    }
}

fn draw_grid<DB>(area: DrawingArea<DB, Shift>, grid: &CoverageGrid) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let geometry = grid.geometry();
    let bbox = geometry.bbox;

    area.fill(&BACKGROUND)?;
    let mut chart = ChartBuilder::on(&area)
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(bbox.min_lon..bbox.max_lon, bbox.min_lat..bbox.max_lat)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Longitude")
        .y_desc("Latitude")
        .x_label_formatter(&|v| format!("{:.5}", v))
        .y_label_formatter(&|v| format!("{:.5}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    let covered_style = COVERED.mix(0.5).filled();
    let uncovered_style = UNCOVERED.mix(0.5).filled();
    chart.draw_series(grid.iter_cells().map(|(row, col, covered)| {
        let (lat_lo, lat_hi, lon_lo, lon_hi) = geometry.cell_bounds(row, col);
        let style = if covered {
            covered_style
        } else {
            uncovered_style
        };
        Rectangle::new([(lon_lo, lat_lo), (lon_hi, lat_hi)], style)
    }))?;

    if geometry.cell_count() <= MAX_OUTLINED_CELLS {
        let border = WHITE.stroke_width(1);
        chart.draw_series(grid.iter_cells().map(|(row, col, _)| {
            let (lat_lo, lat_hi, lon_lo, lon_hi) = geometry.cell_bounds(row, col);
            Rectangle::new([(lon_lo, lat_lo), (lon_hi, lat_hi)], border)
        }))?;
    }

    area.present()?;
    Ok(())
}
