//! Chart descriptions and their conversion into image buffers.
//!
//! A [`Figure`] is plain data built up by submission code through `plt`.
//! Rendering consumes the figure: [`FigureRenderer::render`] takes it by
//! value, so nothing of it survives the call.

use crate::errors::{Result, SandboxError};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Line,
    Bar,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub kind: PlotKind,
    pub x: Vec<Value>,
    pub y: Vec<Value>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub plots: Vec<Plot>,
}

impl Figure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series. `x` and `y` must have the same length.
    pub fn add_plot(
        &mut self,
        kind: PlotKind,
        x: Vec<Value>,
        y: Vec<Value>,
        label: Option<String>,
    ) -> std::result::Result<(), String> {
        if x.len() != y.len() {
            return Err(format!(
                "x and y must have same first dimension, but have shapes ({},) and ({},)",
                x.len(),
                y.len()
            ));
        }
        self.plots.push(Plot { kind, x, y, label });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Svg,
    Png,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
        })
    }
}

/// Binary image buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub format: ImageFormat,
    #[serde(with = "crate::value::base64_bytes")]
    pub data: Vec<u8>,
}

/// Converts figures into image buffers.
pub trait FigureRenderer: Send + Sync {
    /// Render and release `figure`.
    fn render(&self, figure: Figure) -> Result<Image>;
}

/// Draws line, bar and scatter charts as SVG.
#[derive(Debug, Clone, Copy)]
pub struct SvgRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

const MARGIN: f64 = 60.0;
const PALETTE: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn y_values(plot: &Plot) -> Result<Vec<Option<f64>>> {
    plot.y
        .iter()
        .map(|v| {
            if v.is_missing() {
                Ok(None)
            } else {
                v.as_f64().map(Some).ok_or_else(|| {
                    SandboxError::Render(format!("non-numeric y value {}", v.repr()))
                })
            }
        })
        .collect()
}

impl SvgRenderer {
    fn draw(&self, figure: &Figure) -> Result<String> {
        let (w, h) = (self.width as f64, self.height as f64);
        let (plot_w, plot_h) = (w - 2.0 * MARGIN, h - 2.0 * MARGIN);

        let ys: Vec<Vec<Option<f64>>> = figure.plots.iter().map(y_values).collect::<Result<_>>()?;
        let finite = ys.iter().flatten().flatten().copied().filter(|v| v.is_finite());
        let (mut y_min, mut y_max) = finite.fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if (y_max - y_min).abs() < f64::EPSILON {
            y_max = y_min + 1.0;
        }
        if figure.plots.iter().any(|p| p.kind == PlotKind::Bar) {
            y_min = y_min.min(0.0);
        }

        // Numeric x axis when every x value is a number, categorical otherwise.
        let numeric_x = figure
            .plots
            .iter()
            .all(|p| p.x.iter().all(Value::is_numeric))
            && !figure.plots.iter().any(|p| p.kind == PlotKind::Bar);
        let mut categories: Vec<String> = Vec::new();
        let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for plot in &figure.plots {
            for x in &plot.x {
                if numeric_x {
                    let v = x.as_f64().unwrap_or(0.0);
                    x_min = x_min.min(v);
                    x_max = x_max.max(v);
                } else {
                    let label = x.to_str();
                    if !categories.contains(&label) {
                        categories.push(label);
                    }
                }
            }
        }
        if !x_min.is_finite() || (x_max - x_min).abs() < f64::EPSILON {
            x_min = if x_min.is_finite() { x_min - 0.5 } else { 0.0 };
            x_max = x_min + 1.0;
        }
        let slot = plot_w / categories.len().max(1) as f64;
        let x_pos = |x: &Value| -> f64 {
            if numeric_x {
                MARGIN + (x.as_f64().unwrap_or(0.0) - x_min) / (x_max - x_min) * plot_w
            } else {
                let i = categories.iter().position(|c| *c == x.to_str()).unwrap_or(0);
                MARGIN + slot * (i as f64 + 0.5)
            }
        };
        let y_pos = |y: f64| -> f64 { MARGIN + plot_h - (y - y_min) / (y_max - y_min) * plot_h };

        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
        );
        let _ = write!(svg, r#"<rect width="{w}" height="{h}" fill="white"/>"#);
        if let Some(title) = &figure.title {
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-size="16">{}</text>"#,
                w / 2.0,
                MARGIN / 2.0,
                escape(title)
            );
        }
        let base = y_pos(y_min.max(0.0).min(y_max));
        let _ = write!(
            svg,
            r#"<line x1="{m}" y1="{top}" x2="{m}" y2="{bottom}" stroke="black"/><line x1="{m}" y1="{base}" x2="{right}" y2="{base}" stroke="black"/>"#,
            m = MARGIN,
            top = MARGIN,
            bottom = MARGIN + plot_h,
            right = MARGIN + plot_w,
        );
        for (value, anchor) in [(y_min, "end"), (y_max, "end")] {
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="{}" font-size="10">{}</text>"#,
                MARGIN - 4.0,
                y_pos(value),
                anchor,
                escape(&crate::value::format_float(value))
            );
        }
        for category in &categories {
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-size="10">{}</text>"#,
                x_pos(&Value::Str(category.clone())),
                MARGIN + plot_h + 14.0,
                escape(category)
            );
        }
        if let Some(label) = &figure.xlabel {
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-size="12">{}</text>"#,
                w / 2.0,
                h - 12.0,
                escape(label)
            );
        }
        if let Some(label) = &figure.ylabel {
            let _ = write!(
                svg,
                r#"<text x="14" y="{}" text-anchor="middle" font-size="12" transform="rotate(-90 14 {})">{}</text>"#,
                h / 2.0,
                h / 2.0,
                escape(label)
            );
        }

        let bar_plots = figure.plots.iter().filter(|p| p.kind == PlotKind::Bar).count().max(1);
        let mut bar_no = 0;
        for (n, (plot, ys)) in figure.plots.iter().zip(&ys).enumerate() {
            let color = PALETTE[n % PALETTE.len()];
            match plot.kind {
                PlotKind::Bar => {
                    let width = slot * 0.8 / bar_plots as f64;
                    for (x, y) in plot.x.iter().zip(ys) {
                        let Some(y) = y else { continue };
                        let left = x_pos(x) - slot * 0.4 + width * bar_no as f64;
                        let (top, bottom) = (y_pos(y.max(0.0)), y_pos(y.min(0.0)));
                        let _ = write!(
                            svg,
                            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>"#,
                            left,
                            top,
                            width,
                            (bottom - top).max(0.0),
                            color
                        );
                    }
                    bar_no += 1;
                }
                PlotKind::Line => {
                    let points: Vec<String> = plot
                        .x
                        .iter()
                        .zip(ys)
                        .filter_map(|(x, y)| y.map(|y| format!("{:.2},{:.2}", x_pos(x), y_pos(y))))
                        .collect();
                    let _ = write!(
                        svg,
                        r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
                        points.join(" "),
                        color
                    );
                }
                PlotKind::Scatter => {
                    for (x, y) in plot.x.iter().zip(ys) {
                        if let Some(y) = y {
                            let _ = write!(
                                svg,
                                r#"<circle cx="{:.2}" cy="{:.2}" r="3" fill="{}"/>"#,
                                x_pos(x),
                                y_pos(*y),
                                color
                            );
                        }
                    }
                }
            }
            if let Some(label) = &plot.label {
                let _ = write!(
                    svg,
                    r#"<text x="{}" y="{}" font-size="10" fill="{}">{}</text>"#,
                    MARGIN + plot_w - 80.0,
                    MARGIN + 12.0 * (n as f64 + 1.0),
                    color,
                    escape(label)
                );
            }
        }
        svg.push_str("</svg>");
        Ok(svg)
    }
}

impl FigureRenderer for SvgRenderer {
    fn render(&self, figure: Figure) -> Result<Image> {
        let svg = self.draw(&figure)?;
        drop(figure);
        Ok(Image {
            format: ImageFormat::Svg,
            data: svg.into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_chart() -> Figure {
        let mut fig = Figure::new();
        fig.title = Some("Sales <by> region".to_string());
        fig.add_plot(
            PlotKind::Bar,
            vec!["east".into(), "west".into()],
            vec![Value::Int(10), Value::Int(5)],
            None,
        )
        .unwrap();
        fig
    }

    #[test]
    fn test_add_plot_checks_lengths() {
        let mut fig = Figure::new();
        assert!(fig
            .add_plot(PlotKind::Line, vec![Value::Int(1)], vec![], None)
            .is_err());
    }

    #[test]
    fn test_svg_contains_bars_and_escaped_title() {
        let image = SvgRenderer::default().render(bar_chart()).unwrap();
        assert_eq!(image.format, ImageFormat::Svg);
        let svg = String::from_utf8(image.data).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<rect x=").count(), 2);
        assert!(svg.contains("Sales &lt;by&gt; region"));
        assert!(svg.contains(">east<"));
    }

    #[test]
    fn test_line_and_scatter_on_numeric_axis() {
        let mut fig = Figure::new();
        let xs = vec![Value::Int(0), Value::Int(1), Value::Int(2)];
        fig.add_plot(
            PlotKind::Line,
            xs.clone(),
            vec![Value::Float(1.0), Value::None, Value::Float(3.0)],
            Some("trend".into()),
        )
        .unwrap();
        fig.add_plot(PlotKind::Scatter, xs, vec![Value::Int(1); 3], None)
            .unwrap();
        let svg = String::from_utf8(SvgRenderer::default().render(fig).unwrap().data).unwrap();
        assert!(svg.contains("<polyline"));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains("trend"));
    }

    #[test]
    fn test_non_numeric_y_is_render_error() {
        let mut fig = Figure::new();
        fig.add_plot(PlotKind::Bar, vec!["a".into()], vec!["x".into()], None)
            .unwrap();
        assert!(matches!(
            SvgRenderer::default().render(fig),
            Err(SandboxError::Render(_))
        ));
    }
}
