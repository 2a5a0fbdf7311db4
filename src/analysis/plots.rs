//! PNG rendering of histograms, fitted densities, scatter plots and
//! network graphs.
//!
//! Charts are drawn with the [`plotters`] bitmap backend at 1200x800.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use super::fit::{Family, FitReport};
use super::stats::Histogram;
use crate::topology::{NodePosition, WeightedGraph};

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("Failed to create drawing area: {0}")]
    DrawingArea(String),

    #[error("Failed to configure chart: {0}")]
    ChartConfig(String),

    #[error("Failed to draw chart elements: {0}")]
    Drawing(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

type Result<T> = core::result::Result<T, PlotError>;

const SIZE: (u32, u32) = (1200, 800);
const CURVE_POINTS: usize = 500;
const MAX_EDGE_WIDTH: f64 = 5.0;
const LABEL_CHARS: usize = 12;

pub struct Labels<'a> {
    pub title: &'a str,
    pub x: &'a str,
    pub y: &'a str,
}

/// A named line drawn over a chart
#[derive(Debug, Clone)]
pub struct Curve {
    pub name: String,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

fn family_color(family: Family) -> RGBColor {
    match family {
        Family::Gumbel => RED,
        Family::Frechet => GREEN,
        Family::Normal => MAGENTA,
    }
}

/// Sampled densities of every successful fit over `range`
pub fn fit_curves(report: &FitReport, range: Range<f64>) -> Vec<Curve> {
    let step = (range.end - range.start) / (CURVE_POINTS - 1) as f64;
    report
        .successful()
        .map(|fit| Curve {
            name: format!("fitted {}", fit.family.name()),
            color: family_color(fit.family),
            points: (0..CURVE_POINTS)
                .map(|i| {
                    let x = range.start + step * i as f64;
                    (x, fit.pdf(x))
                })
                .filter(|(_, y)| y.is_finite())
                .collect(),
        })
        .collect()
}

/// `(min, max)` of the finite values, widened when they coincide
pub fn padded_range(values: impl IntoIterator<Item = f64>) -> Option<Range<f64>> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return None;
    }
    if lo == hi {
        return Some(lo - 0.5..hi + 0.5);
    }
    Some(lo..hi)
}

/// Bars for `heights` (one per bin) with optional curves on top
pub fn draw_histogram(
    path: &Path,
    labels: &Labels,
    hist: &Histogram,
    heights: &[f64],
    x_range: Option<Range<f64>>,
    curves: &[Curve],
) -> Result<()> {
    if heights.len() != hist.bins() {
        return Err(PlotError::InvalidData(format!(
            "{} heights for {} bins",
            heights.len(),
            hist.bins()
        )));
    }
    let x_range = match x_range {
        Some(r) => r,
        None => padded_range(hist.edges.iter().copied())
            .ok_or_else(|| PlotError::InvalidData("empty histogram".to_string()))?,
    };
    let y_max = heights
        .iter()
        .copied()
        .chain(curves.iter().flat_map(|c| c.points.iter().map(|p| p.1)))
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(85)
        .build_cartesian_2d(x_range.clone(), 0.0..y_max)
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc(labels.x)
        .y_desc(labels.y)
        .label_style(("sans-serif", 20))
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    chart
        .draw_series(
            hist.edges
                .windows(2)
                .zip(heights)
                .filter(|(w, _)| w[1] > x_range.start && w[0] < x_range.end)
                .map(|(w, h)| Rectangle::new([(w[0], 0.0), (w[1], *h)], BLUE.mix(0.5).filled())),
        )
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    draw_curves(&mut chart, curves)?;

    root.present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;
    log::info!("Plot saved to {}", path.display());
    Ok(())
}

fn draw_curves<'a, DB: DrawingBackend + 'a>(
    chart: &mut ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    curves: &[Curve],
) -> Result<()> {
    if curves.is_empty() {
        return Ok(());
    }
    for curve in curves {
        let color = curve.color;
        chart
            .draw_series(LineSeries::new(curve.points.iter().copied(), color.stroke_width(2)))
            .map_err(|e| PlotError::Drawing(e.to_string()))?
            .label(curve.name.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))
}

/// Histogram with counts on a log axis; counts are shifted by one so empty bins stay drawable
pub fn draw_histogram_log_y(path: &Path, labels: &Labels, hist: &Histogram) -> Result<()> {
    let x_range = padded_range(hist.edges.iter().copied())
        .ok_or_else(|| PlotError::InvalidData("empty histogram".to_string()))?;
    let y_max = hist.counts.iter().map(|c| *c as f64 + 1.0).fold(1.0, f64::max) * 2.0;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(85)
        .build_cartesian_2d(x_range, (1.0..y_max).log_scale())
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc(labels.x)
        .y_desc(labels.y)
        .label_style(("sans-serif", 20))
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    chart
        .draw_series(hist.edges.windows(2).zip(&hist.counts).map(|(w, c)| {
            Rectangle::new([(w[0], 1.0), (w[1], *c as f64 + 1.0)], BLUE.mix(0.5).filled())
        }))
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    root.present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;
    log::info!("Plot saved to {}", path.display());
    Ok(())
}

fn checked_points(points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>> {
    let finite: Vec<(f64, f64)> = points
        .iter()
        .copied()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    if finite.is_empty() {
        return Err(PlotError::InvalidData("no finite points".to_string()));
    }
    Ok(finite)
}

/// Scatter of `(x, y)` points drawn as crosses
pub fn draw_scatter(
    path: &Path,
    labels: &Labels,
    points: &[(f64, f64)],
    x_range: Option<Range<f64>>,
) -> Result<()> {
    let points = checked_points(points)?;
    let x_range = match x_range {
        Some(r) => r,
        None => padded_range(points.iter().map(|p| p.0))
            .ok_or_else(|| PlotError::InvalidData("no x values".to_string()))?,
    };
    let y_range = padded_range(points.iter().map(|p| p.1))
        .ok_or_else(|| PlotError::InvalidData("no y values".to_string()))?;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(85)
        .build_cartesian_2d(x_range.clone(), y_range)
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc(labels.x)
        .y_desc(labels.y)
        .label_style(("sans-serif", 20))
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    chart
        .draw_series(
            points
                .iter()
                .filter(|(x, _)| x_range.contains(x))
                .map(|(x, y)| Cross::new((*x, *y), 4, BLACK.mix(0.7))),
        )
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    root.present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;
    log::info!("Plot saved to {}", path.display());
    Ok(())
}

/// Scatter with a log y axis; y values are plotted as `y + 1`
pub fn draw_scatter_log_y(path: &Path, labels: &Labels, points: &[(f64, f64)]) -> Result<()> {
    let points: Vec<(f64, f64)> = checked_points(points)?
        .into_iter()
        .filter(|(_, y)| *y >= 0.0)
        .map(|(x, y)| (x, y + 1.0))
        .collect();
    let x_range = padded_range(points.iter().map(|p| p.0))
        .ok_or_else(|| PlotError::InvalidData("no non-negative values".to_string()))?;
    let y_max = points.iter().map(|p| p.1).fold(1.0, f64::max) * 2.0;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(85)
        .build_cartesian_2d(x_range, (1.0..y_max).log_scale())
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc(labels.x)
        .y_desc(labels.y)
        .label_style(("sans-serif", 20))
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    chart
        .draw_series(points.iter().map(|(x, y)| Cross::new((*x, *y), 4, BLACK.mix(0.7))))
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    root.present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;
    log::info!("Plot saved to {}", path.display());
    Ok(())
}

/// Pen width of an edge, proportional to its weight, at least one pixel
pub fn edge_width(weight: f64, max_weight: f64) -> u32 {
    if max_weight.is_nan() || max_weight <= 0.0 || !weight.is_finite() {
        return 1;
    }
    (weight / max_weight * MAX_EDGE_WIDTH).round().max(1.0) as u32
}

fn short_label(id: &str) -> String {
    id.chars().take(LABEL_CHARS).collect()
}

/// Nodes at `positions` joined by grey edges whose width follows their weight
pub fn draw_network(
    path: &Path,
    title: &str,
    graph: &WeightedGraph,
    positions: &[NodePosition],
) -> Result<()> {
    if positions.is_empty() {
        return Err(PlotError::InvalidData("graph has no nodes".to_string()));
    }
    let at: HashMap<&str, (f64, f64)> = positions
        .iter()
        .map(|p| (p.node.as_str(), (p.x, p.y)))
        .collect();
    let max_weight = graph.edges().map(|e| e.weight).fold(0.0, f64::max);
    let extent = positions
        .iter()
        .flat_map(|p| [p.x.abs(), p.y.abs()])
        .filter(|v| v.is_finite())
        .fold(1.0, f64::max)
        * 1.2;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 32))
        .margin(20)
        .build_cartesian_2d(-extent..extent, -extent..extent)
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

    chart
        .draw_series(graph.edges().filter_map(|edge| {
            let from = *at.get(edge.source.as_str())?;
            let to = *at.get(edge.target.as_str())?;
            let width = edge_width(edge.weight, max_weight);
            Some(PathElement::new(vec![from, to], RGBColor(128, 128, 128).stroke_width(width)))
        }))
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    chart
        .draw_series(
            positions
                .iter()
                .map(|p| Circle::new((p.x, p.y), 8, BLUE.mix(0.6).filled())),
        )
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    chart
        .draw_series(
            positions
                .iter()
                .map(|p| Text::new(short_label(&p.node), (p.x, p.y), ("sans-serif", 12))),
        )
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    root.present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;
    log::info!("Network graph saved to {}", path.display());
    Ok(())
}
