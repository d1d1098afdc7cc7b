//! Scatter plot rendering.
//!
//! The figure is drawn into an in-memory RGB buffer, encoded as PNG and then
//! moved over the output path, so a failed render never leaves a partial
//! image behind and never clobbers the previous one.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::{Deserialize, Serialize};

use crate::font::{self, FONT_FAMILY};

/// Default plot title.
pub const DEFAULT_TITLE: &str = "Prompt Embeddings Visualization (PCA)";
/// Default maximum length of a point label, in characters.
pub const DEFAULT_LABEL_CHARS: usize = 30;

const POINTS_PER_INCH: f64 = 72.0;
const MARKER_COLOR: RGBColor = RGBColor(0x1f, 0x77, 0xb4);

/// Error type for rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{points} points but {labels} labels")]
    LabelCount { points: usize, labels: usize },
    #[error("Invalid figure size: {width}x{height} px")]
    InvalidSize { width: u32, height: u32 },
    #[error("Drawing failed: {0}")]
    Draw(String),
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Figure geometry and styling.
///
/// Sizes in points follow the 1/72 inch convention and are scaled by `dpi`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FigureStyle {
    /// Plot title.
    pub title: String,
    /// Figure width in inches.
    pub width_in: f64,
    /// Figure height in inches.
    pub height_in: f64,
    /// Output resolution.
    pub dpi: u32,
    /// Marker area in points squared.
    pub marker_size: f64,
    /// Marker opacity, 0 to 1.
    pub marker_alpha: f64,
    /// Labels longer than this many characters are cut.
    pub label_chars: usize,
    /// Label font size in points.
    pub font_size: f64,
    /// Label opacity, 0 to 1.
    pub label_alpha: f64,
    /// Label offset right of and above its point, in points.
    pub label_offset: f64,
    /// Grid line opacity, 0 to 1.
    pub grid_alpha: f64,
    /// TrueType font for text; system fonts are searched when unset.
    pub font: Option<PathBuf>,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            width_in: 12.0,
            height_in: 8.0,
            dpi: 150,
            marker_size: 100.0,
            marker_alpha: 0.7,
            label_chars: DEFAULT_LABEL_CHARS,
            font_size: 9.0,
            label_alpha: 0.8,
            label_offset: 5.0,
            grid_alpha: 0.3,
            font: None,
        }
    }
}

impl FigureStyle {
    /// Output image size in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = f64::from(self.dpi);
        (
            (self.width_in * dpi).round().max(0.0) as u32,
            (self.height_in * dpi).round().max(0.0) as u32,
        )
    }

    fn px(&self, points: f64) -> f64 {
        points * f64::from(self.dpi) / POINTS_PER_INCH
    }

    /// `marker_size` is an area; the circle's diameter is its square root.
    fn marker_radius_px(&self) -> i32 {
        (self.px(self.marker_size.max(0.0).sqrt()) / 2.0).round().max(1.0) as i32
    }
}

/// Cut a title to at most `max_chars` characters.
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    title.chars().take(max_chars).collect()
}

/// Axis caption for a component, e.g. `PC1 (42.3% variance)`.
///
/// `component` is 1-based.
pub fn axis_label(component: usize, ratio: f64) -> String {
    format!("PC{} ({:.1}% variance)", component, ratio * 100.0)
}

/// Draw the labelled scatter plot and write it to `path` as PNG.
///
/// `labels` are drawn as given; callers truncate them first.
pub fn render_scatter(
    points: &[[f64; 2]],
    labels: &[String],
    variance_ratio: [f64; 2],
    style: &FigureStyle,
    path: &Path,
) -> Result<(), RenderError> {
    if points.len() != labels.len() {
        return Err(RenderError::LabelCount {
            points: points.len(),
            labels: labels.len(),
        });
    }

    let (width, height) = style.pixel_size();
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidSize { width, height });
    }

    let with_text = font::ensure_registered(style.font.as_deref()).is_some();
    if !with_text {
        tracing::warn!("No usable font found, rendering without text");
    }

    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        draw(&root, points, labels, variance_ratio, style, with_text)?;
        root.present().map_err(draw_error)?;
    }

    write_png(path, buffer, width, height)?;
    tracing::debug!(path = %path.display(), width, height, "Wrote figure");
    Ok(())
}

fn draw(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    points: &[[f64; 2]],
    labels: &[String],
    variance_ratio: [f64; 2],
    style: &FigureStyle,
    with_text: bool,
) -> Result<(), RenderError> {
    root.fill(&WHITE).map_err(draw_error)?;

    let (x_range, y_range) = axis_ranges(points);

    let mut builder = ChartBuilder::on(root);
    builder.margin(style.px(12.0).round() as u32);
    if with_text {
        builder
            .caption(&style.title, (FONT_FAMILY, style.px(13.0)))
            .x_label_area_size(style.px(34.0).round() as u32)
            .y_label_area_size(style.px(48.0).round() as u32);
    }
    let mut chart = builder
        .build_cartesian_2d(x_range, y_range)
        .map_err(draw_error)?;

    let mut mesh = chart.configure_mesh();
    mesh.light_line_style(WHITE.mix(0.0))
        .bold_line_style(BLACK.mix(style.grid_alpha));
    if with_text {
        mesh.x_desc(axis_label(1, variance_ratio[0]))
            .y_desc(axis_label(2, variance_ratio[1]))
            .label_style((FONT_FAMILY, style.px(9.0)))
            .axis_desc_style((FONT_FAMILY, style.px(10.0)));
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw().map_err(draw_error)?;

    let radius = style.marker_radius_px();
    let marker = MARKER_COLOR.mix(style.marker_alpha).filled();

    if with_text {
        let offset = style.px(style.label_offset).round() as i32;
        let text_style = (FONT_FAMILY, style.px(style.font_size))
            .into_font()
            .color(&BLACK.mix(style.label_alpha))
            .pos(Pos::new(HPos::Left, VPos::Bottom));

        chart
            .draw_series(points.iter().zip(labels).map(|(p, label)| {
                EmptyElement::at((p[0], p[1]))
                    + Circle::new((0, 0), radius, marker)
                    + Text::new(label.clone(), (offset, -offset), text_style.clone())
            }))
            .map_err(draw_error)?;
    } else {
        chart
            .draw_series(
                points
                    .iter()
                    .map(|p| Circle::new((p[0], p[1]), radius, marker)),
            )
            .map_err(draw_error)?;
    }

    Ok(())
}

/// Data bounds padded by 10% on each side; degenerate spans get a unit pad.
fn axis_ranges(points: &[[f64; 2]]) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let bounds = |axis: usize| {
        let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[axis]), hi.max(p[axis]))
        });
        if !lo.is_finite() || !hi.is_finite() {
            return -1.0..1.0;
        }
        let span = hi - lo;
        let pad = if span > f64::EPSILON { span * 0.1 } else { 1.0 };
        (lo - pad)..(hi + pad)
    };
    (bounds(0), bounds(1))
}

fn draw_error<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Draw(e.to_string())
}

fn write_png(path: &Path, buffer: Vec<u8>, width: u32, height: u32) -> Result<(), RenderError> {
    let img = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| RenderError::Draw("pixel buffer does not match figure size".to_string()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".embedscope-")
        .suffix(".png")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        img.write_to(&mut writer, image::ImageFormat::Png)?;
        writer.flush()?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| RenderError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<[f64; 2]>, Vec<String>) {
        let points = vec![[0.0, 0.0], [1.5, -0.5], [-2.0, 1.0]];
        let labels = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        (points, labels)
    }

    fn small_style() -> FigureStyle {
        FigureStyle {
            width_in: 4.0,
            height_in: 3.0,
            dpi: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_truncate_long_title() {
        let title = "An extremely long prompt title that keeps going";
        let cut = truncate_title(title, 30);
        assert_eq!(cut.chars().count(), 30);
        assert_eq!(cut, "An extremely long prompt title");
    }

    #[test]
    fn test_truncate_short_title_unchanged() {
        assert_eq!(truncate_title("Short", 30), "Short");
        let exact = "x".repeat(30);
        assert_eq!(truncate_title(&exact, 30), exact);
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let title = "é".repeat(40);
        let cut = truncate_title(&title, 30);
        assert_eq!(cut.chars().count(), 30);
        assert_eq!(cut.len(), 60);
    }

    #[test]
    fn test_axis_label_format() {
        assert_eq!(axis_label(1, 0.4234), "PC1 (42.3% variance)");
        assert_eq!(axis_label(2, 0.05), "PC2 (5.0% variance)");
    }

    #[test]
    fn test_default_pixel_size() {
        let style = FigureStyle::default();
        assert_eq!(style.pixel_size(), (1800, 1200));
        // sqrt(100) pt diameter at 150 dpi
        assert_eq!(style.marker_radius_px(), 10);
    }

    #[test]
    fn test_axis_ranges_pad() {
        let (x, y) = axis_ranges(&[[0.0, 5.0], [10.0, 5.0]]);
        assert_eq!(x, -1.0..11.0);
        assert_eq!(y, 4.0..6.0);
    }

    #[test]
    fn test_render_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let (points, labels) = sample();

        render_scatter(&points, &labels, [0.6, 0.3], &small_style(), &path).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (200, 150));
    }

    #[test]
    fn test_render_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        std::fs::write(&path, b"stale").unwrap();
        let (points, labels) = sample();

        render_scatter(&points, &labels, [0.6, 0.3], &small_style(), &path).unwrap();
        render_scatter(&points, &labels, [0.6, 0.3], &small_style(), &path).unwrap();

        assert!(image::open(&path).is_ok());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_label_count_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let (points, _) = sample();

        let err = render_scatter(&points, &[], [0.5, 0.5], &small_style(), &path).unwrap_err();
        assert!(matches!(err, RenderError::LabelCount { points: 3, labels: 0 }));
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let style = FigureStyle {
            width_in: 0.0,
            ..Default::default()
        };
        let err = render_scatter(&[], &[], [0.0, 0.0], &style, &path).unwrap_err();
        assert!(matches!(err, RenderError::InvalidSize { .. }));
        assert!(!path.exists());
    }
}
