//! Figures for the lab writeups. Each figure is built as plain data first
//! (panels of labelled series with their axis ranges), then either written
//! to an SVG file or shown in the terminal.

use crate::{
    convert::{ExecSample, RssiRecord},
    gui::{self, GuiError},
    stats::PathLossFit,
};

use log::info;
use plotters::{coord::Shift, prelude::*};
use std::{
    fmt,
    path::{Path, PathBuf},
};

const X_MARGIN: f64 = 0.05;
const Y_MARGIN: f64 = 0.05;
const Y_MARGIN_EXTRA: f64 = 0.05;
const PX_PER_INCH: f64 = 100.0;

/// Where a figure goes and how big it is.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureOptions {
    /// SVG file to write; the figure is shown in the terminal when `None`
    pub path: Option<PathBuf>,
    /// Width and height, in inches
    pub size_in: (f64, f64),
}

impl Default for FigureOptions {
    fn default() -> Self {
        Self {
            path: None,
            size_in: (6.0, 4.0),
        }
    }
}

impl FigureOptions {
    /// Pixel size of the rendered figure.
    pub fn size_px(&self) -> (u32, u32) {
        let (w, h) = self.size_in;
        (
            (w * PX_PER_INCH).round().max(1.0) as u32,
            (h * PX_PER_INCH).round().max(1.0) as u32,
        )
    }
}

/// Errors producing a figure.
#[derive(Debug)]
pub enum FigureError {
    /// Returned when plotters fails to draw or write the file.
    Plot(String),

    /// Returned when the terminal view fails.
    Gui(GuiError),
}

impl fmt::Display for FigureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FigureError::Plot(msg) => write!(f, "failed to draw figure: {}", msg),
            FigureError::Gui(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for FigureError {}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for FigureError {
    fn from(value: DrawingAreaErrorKind<E>) -> Self {
        Self::Plot(value.to_string())
    }
}

impl From<GuiError> for FigureError {
    fn from(value: GuiError) -> Self {
        Self::Gui(value)
    }
}

/// How a series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Line,
    /// A line with a marker at every point
    LineMarkers,
    Scatter,
}

/// One labelled set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: Option<String>,
    pub kind: SeriesKind,
    /// RGB
    pub color: (u8, u8, u8),
    pub points: Vec<(f64, f64)>,
}

/// One set of axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub title: String,
    pub x_label: Option<String>,
    pub y_label: String,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// Spacing of x ticks, when fixed
    pub x_tick: Option<f64>,
    pub grid: bool,
    pub legend: bool,
    pub series: Vec<Series>,
}

/// Panels stacked top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub panels: Vec<Panel>,
}

// A step plot that holds each value until the next sample.
fn step_post(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(points.len() * 2);
    for (i, &(x, y)) in points.iter().enumerate() {
        if i > 0 {
            out.push((x, points[i - 1].1));
        }
        out.push((x, y));
    }
    out
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

// Plotters can't draw an empty range.
fn non_degenerate((lo, hi): (f64, f64)) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = min_max(values).unwrap_or((0.0, 1.0));
    let pad = ((hi - lo) * 0.05).max(0.5);
    (lo - pad, hi + pad)
}

/// Execution timeline: one panel per task, the task's running state over
/// time. With `duration >= 0`, samples after `duration` seconds are left
/// out.
pub fn exec_timeline(traces: &[Vec<ExecSample>], duration: f64) -> Figure {
    let last = traces.len().saturating_sub(1);
    let panels = traces
        .iter()
        .enumerate()
        .map(|(i, trace)| {
            let points: Vec<(f64, f64)> = trace
                .iter()
                .filter(|s| duration < 0.0 || s.time_s <= duration)
                .map(|s| (s.time_s, s.is_running))
                .collect();

            let x_range = min_max(points.iter().map(|p| p.0))
                .map(|(lo, hi)| (lo * (1.0 - X_MARGIN), hi * (1.0 + X_MARGIN)))
                .unwrap_or((0.0, 1.0));
            let y_range = min_max(points.iter().map(|p| p.1))
                .map(|(lo, hi)| (lo * (1.0 - Y_MARGIN) - Y_MARGIN_EXTRA, hi * (1.0 + Y_MARGIN)))
                .unwrap_or((0.0, 1.0));

            Panel {
                title: format!("Execution state of Task {}", i),
                x_label: (i == last).then(|| "Time (s)".to_owned()),
                y_label: "State (1.0 = running)".to_owned(),
                x_range: non_degenerate(x_range),
                y_range: non_degenerate(y_range),
                x_tick: Some(1.0),
                grid: false,
                legend: false,
                series: vec![Series {
                    label: None,
                    kind: SeriesKind::Line,
                    color: (31, 119, 180),
                    points: step_post(&points),
                }],
            }
        })
        .collect();
    Figure { panels }
}

/// RSSI against distance, as measured.
pub fn rssi_vs_distance(data: &[RssiRecord]) -> Figure {
    let points: Vec<(f64, f64)> = data.iter().map(|r| (r.dist_m, r.rssi_db)).collect();
    Figure {
        panels: vec![Panel {
            title: "RSSI as a function of separation distance".to_owned(),
            x_label: Some("Distance (m)".to_owned()),
            y_label: "RSSI (dB)".to_owned(),
            x_range: non_degenerate(padded_range(points.iter().map(|p| p.0))),
            y_range: non_degenerate(padded_range(points.iter().map(|p| p.1))),
            x_tick: None,
            grid: true,
            legend: false,
            series: vec![Series {
                label: None,
                kind: SeriesKind::LineMarkers,
                color: (0, 0, 0),
                points,
            }],
        }],
    }
}

/// The fitted path loss model against the measured loss.
pub fn path_loss(data: &[RssiRecord], fit: &PathLossFit) -> Figure {
    let measured: Vec<(f64, f64)> = data.iter().map(|r| (r.dist_m, -r.rssi_db)).collect();

    let (d_lo, d_hi) = min_max(data.iter().map(|r| r.dist_m).filter(|&d| d > 0.0)).unwrap_or((1.0, 1.0));
    const CURVE_POINTS: usize = 100;
    let model: Vec<(f64, f64)> = (0..CURVE_POINTS)
        .map(|i| d_lo + (d_hi - d_lo) * i as f64 / (CURVE_POINTS - 1) as f64)
        .map(|d| (d, fit.predict(d)))
        .collect();

    let all_y = measured.iter().chain(&model).map(|p| p.1);
    Figure {
        panels: vec![Panel {
            title: "Least-squares residuals for path loss system of equations".to_owned(),
            x_label: Some("Distance (m)".to_owned()),
            y_label: "Path loss (dB)".to_owned(),
            x_range: non_degenerate(padded_range(measured.iter().map(|p| p.0))),
            y_range: non_degenerate(padded_range(all_y)),
            x_tick: None,
            grid: true,
            legend: true,
            series: vec![
                Series {
                    label: Some("least-squares sol.".to_owned()),
                    kind: SeriesKind::Line,
                    color: (0, 0, 255),
                    points: model,
                },
                Series {
                    label: Some("measured L (-RSSI)".to_owned()),
                    kind: SeriesKind::Scatter,
                    color: (255, 0, 0),
                    points: measured,
                },
            ],
        }],
    }
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
) -> Result<(), FigureError> {
    let (x0, x1) = panel.x_range;
    let (y0, y1) = panel.y_range;
    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 16))
        .margin(8)
        .x_label_area_size(if panel.x_label.is_some() { 35 } else { 20 })
        .y_label_area_size(50)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    let mut mesh = chart.configure_mesh();
    mesh.y_desc(panel.y_label.as_str());
    if let Some(label) = &panel.x_label {
        mesh.x_desc(label.as_str());
    }
    if let Some(step) = panel.x_tick {
        mesh.x_labels(((x1 - x0) / step).floor() as usize + 1);
    }
    if !panel.grid {
        mesh.disable_mesh();
    }
    mesh.draw()?;

    for series in &panel.series {
        let (r, g, b) = series.color;
        let color = RGBColor(r, g, b);
        let points = series.points.iter().copied();

        let anno = match series.kind {
            SeriesKind::Line => chart.draw_series(LineSeries::new(points, color))?,
            SeriesKind::LineMarkers => {
                chart.draw_series(LineSeries::new(points.clone(), color))?;
                chart.draw_series(points.map(|p| Circle::new(p, 3, color.filled())))?
            }
            SeriesKind::Scatter => {
                chart.draw_series(points.map(|p| Circle::new(p, 3, color.filled())))?
            }
        };
        if let Some(label) = &series.label {
            anno.label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
    }

    if panel.legend {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

impl Figure {
    /// Write the figure to `path` as SVG.
    pub fn write_svg(&self, path: &Path, size_px: (u32, u32)) -> Result<(), FigureError> {
        let root = SVGBackend::new(path, size_px).into_drawing_area();
        root.fill(&WHITE)?;

        let areas = root.split_evenly((self.panels.len().max(1), 1));
        for (area, panel) in areas.iter().zip(&self.panels) {
            draw_panel(area, panel)?;
        }
        root.present()?;
        info!("wrote {}", path.display());
        Ok(())
    }

    /// Write the figure to the file in `options`, or show it in the terminal
    /// when there is none.
    pub fn render(&self, options: &FigureOptions) -> Result<(), FigureError> {
        match &options.path {
            Some(path) => self.write_svg(path, options.size_px()),
            None => Ok(gui::chart_view(self)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn samples(pts: &[(f64, f64)]) -> Vec<ExecSample> {
        pts.iter()
            .map(|&(time_s, is_running)| ExecSample {
                time_s,
                is_running,
            })
            .collect()
    }

    #[test]
    fn steps_hold_values() {
        assert_eq!(
            step_post(&[(0.0, 1.0), (2.0, 0.0), (3.0, 1.0)]),
            vec![(0.0, 1.0), (2.0, 1.0), (2.0, 0.0), (3.0, 0.0), (3.0, 1.0)]
        );
        assert!(step_post(&[]).is_empty());
    }

    #[test]
    fn exec_panels() {
        let traces = vec![
            samples(&[(1.0, 1.0), (2.0, 0.0), (4.0, 1.0), (10.0, 0.0)]),
            samples(&[(2.0, 0.0), (3.0, 1.0)]),
        ];
        let fig = exec_timeline(&traces, 5.0);
        assert_eq!(fig.panels.len(), 2);

        let p = &fig.panels[0];
        assert_eq!(p.title, "Execution state of Task 0");
        assert_eq!(p.x_label, None);
        assert!(close(p.x_range.0, 0.95) && close(p.x_range.1, 4.2));
        assert!(close(p.y_range.0, -0.05) && close(p.y_range.1, 1.05));
        // 10.0 is past the duration
        assert_eq!(p.series[0].points.last(), Some(&(4.0, 1.0)));

        assert_eq!(fig.panels[1].x_label.as_deref(), Some("Time (s)"));
    }

    #[test]
    fn exec_without_duration() {
        let traces = vec![samples(&[(1.0, 1.0), (10.0, 0.0)]), samples(&[])];
        let fig = exec_timeline(&traces, -1.0);
        assert!(close(fig.panels[0].x_range.1, 10.5));
        assert!(fig.panels[1].series[0].points.is_empty());
    }

    #[test]
    fn path_loss_series() {
        let data = vec![
            RssiRecord {
                dist_m: 1.0,
                rssi_db: -40.0,
            },
            RssiRecord {
                dist_m: 10.0,
                rssi_db: -60.0,
            },
        ];
        let fit = PathLossFit { n: 2.0, c: 40.0 };
        let fig = path_loss(&data, &fit);
        let panel = &fig.panels[0];
        assert!(panel.legend);
        let model = &panel.series[0].points;
        assert_eq!(model.first(), Some(&(1.0, 40.0)));
        assert!(close(model.last().unwrap().1, 60.0));
        assert_eq!(panel.series[1].points, vec![(1.0, 40.0), (10.0, 60.0)]);
    }

    #[test]
    fn writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rssi.svg");
        let data = vec![
            RssiRecord {
                dist_m: 0.3048,
                rssi_db: -35.0,
            },
            RssiRecord {
                dist_m: 0.6096,
                rssi_db: -45.0,
            },
        ];
        let options = FigureOptions {
            path: Some(path.clone()),
            ..Default::default()
        };
        assert_eq!(options.size_px(), (600, 400));
        rssi_vs_distance(&data).render(&options).unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("RSSI as a function of separation distance"));
    }

    #[test]
    fn writes_stacked_panels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exec.svg");
        let traces = vec![
            samples(&[(0.0, 1.0), (1.0, 0.0), (2.0, 1.0)]),
            samples(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]),
        ];
        exec_timeline(&traces, -1.0)
            .write_svg(&path, (600, 400))
            .unwrap();
        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("Execution state of Task 1"));
    }
}
