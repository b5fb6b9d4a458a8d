//! Fixed SVG renderer for [`ChartSpec`]s.
//!
//! The output is a standalone SVG document. Every label that came from data
//! or from the model is XML-escaped before it is written.

use std::fmt::Write as _;

use super::spec::{ChartSpec, ChartType, Series};
use super::ChartError;

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;
const Y_TICKS: usize = 5;
const MAX_LABEL_CHARS: usize = 14;

const PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

pub fn render_svg(
    spec: &ChartSpec,
    series: &Series,
    width: u32,
    height: u32,
) -> Result<String, ChartError> {
    if series.points.is_empty() {
        return Err(ChartError::EmptySeries);
    }

    let (w, h) = (width as f64, height as f64);
    let mut svg = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif" font-size="12">"#
    );
    let _ = write!(
        svg,
        r#"<rect width="{width}" height="{height}" fill="white"/><text x="{}" y="28" text-anchor="middle" font-size="16" font-weight="bold">{}</text>"#,
        fmt(w / 2.0),
        escape(&spec.display_title())
    );

    match spec.chart_type {
        ChartType::Bar => bar(&mut svg, series, w, h),
        ChartType::Line => xy(&mut svg, series, w, h, true),
        ChartType::Scatter => xy(&mut svg, series, w, h, false),
        ChartType::Pie => pie(&mut svg, series, w, h)?,
    }

    svg.push_str("</svg>");
    Ok(svg)
}

struct Plot {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    min: f64,
    max: f64,
}

impl Plot {
    fn new(w: f64, h: f64, values: impl Iterator<Item = f64>) -> Plot {
        let (mut min, mut max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        // Bars grow from zero, so zero is always on the axis.
        min = min.min(0.0);
        max = max.max(0.0);
        if (max - min).abs() < f64::EPSILON {
            max = min + 1.0;
        }
        Plot {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: (w - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
            height: (h - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
            min,
            max,
        }
    }

    fn y(&self, value: f64) -> f64 {
        self.top + self.height - (value - self.min) / (self.max - self.min) * self.height
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn axes(&self, svg: &mut String, series: &Series) {
        let right = self.left + self.width;
        for i in 0..=Y_TICKS {
            let value = self.min + (self.max - self.min) * i as f64 / Y_TICKS as f64;
            let y = self.y(value);
            let _ = write!(
                svg,
                r##"<line x1="{l}" y1="{y}" x2="{r}" y2="{y}" stroke="#e0e0e0"/><text x="{tx}" y="{ty}" text-anchor="end">{label}</text>"##,
                l = fmt(self.left),
                r = fmt(right),
                y = fmt(y),
                tx = fmt(self.left - 6.0),
                ty = fmt(y + 4.0),
                label = format_number(value),
            );
        }
        let _ = write!(
            svg,
            r##"<line x1="{l}" y1="{t}" x2="{l}" y2="{b}" stroke="#333"/><line x1="{l}" y1="{z}" x2="{r}" y2="{z}" stroke="#333"/>"##,
            l = fmt(self.left),
            t = fmt(self.top),
            b = fmt(self.bottom()),
            r = fmt(right),
            z = fmt(self.y(0.0_f64.clamp(self.min, self.max))),
        );
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">{}</text><text x="16" y="{}" text-anchor="middle" transform="rotate(-90 16 {})">{}</text>"#,
            fmt(self.left + self.width / 2.0),
            fmt(self.bottom() + 55.0),
            escape(&series.x_label),
            fmt(self.top + self.height / 2.0),
            fmt(self.top + self.height / 2.0),
            escape(&series.y_label),
        );
    }

    fn category_label(&self, svg: &mut String, x: f64, label: &str) {
        let y = self.bottom() + 16.0;
        let _ = write!(
            svg,
            r#"<text x="{x}" y="{y}" text-anchor="end" transform="rotate(-30 {x} {y})">{}</text>"#,
            escape(&truncate(label)),
            x = fmt(x),
            y = fmt(y),
        );
    }
}

fn bar(svg: &mut String, series: &Series, w: f64, h: f64) {
    let plot = Plot::new(w, h, series.points.iter().map(|p| p.y));
    plot.axes(svg, series);

    let slot = plot.width / series.points.len() as f64;
    let bar_width = (slot * 0.7).max(1.0);
    let zero = plot.y(0.0);
    for (i, point) in series.points.iter().enumerate() {
        let x = plot.left + slot * i as f64 + (slot - bar_width) / 2.0;
        let y = plot.y(point.y);
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"><title>{}: {}</title></rect>"#,
            fmt(x),
            fmt(y.min(zero)),
            fmt(bar_width),
            fmt((zero - y).abs()),
            PALETTE[0],
            escape(&point.label),
            format_number(point.y),
        );
        plot.category_label(svg, x + bar_width / 2.0, &point.label);
    }
}

fn xy(svg: &mut String, series: &Series, w: f64, h: f64, connect: bool) {
    let plot = Plot::new(w, h, series.points.iter().map(|p| p.y));
    plot.axes(svg, series);

    let n = series.points.len();
    let numeric = series.is_numeric_x();
    let (x_min, x_max) = if numeric {
        series
            .points
            .iter()
            .filter_map(|p| p.x)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            })
    } else {
        (0.0, (n.max(2) - 1) as f64)
    };
    let span = if (x_max - x_min).abs() < f64::EPSILON {
        1.0
    } else {
        x_max - x_min
    };

    let coords: Vec<(f64, f64)> = series
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let raw = if numeric { p.x.unwrap_or(0.0) } else { i as f64 };
            (
                plot.left + (raw - x_min) / span * plot.width,
                plot.y(p.y),
            )
        })
        .collect();

    if connect && coords.len() > 1 {
        let path: Vec<String> = coords
            .iter()
            .map(|(x, y)| format!("{},{}", fmt(*x), fmt(*y)))
            .collect();
        let _ = write!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            path.join(" "),
            PALETTE[0]
        );
    }

    let label_every = (n / 12).max(1);
    for (i, ((x, y), point)) in coords.iter().zip(&series.points).enumerate() {
        let _ = write!(
            svg,
            r#"<circle cx="{}" cy="{}" r="{}" fill="{}"><title>{}: {}</title></circle>"#,
            fmt(*x),
            fmt(*y),
            if connect { 3 } else { 4 },
            PALETTE[if connect { 0 } else { 1 }],
            escape(&point.label),
            format_number(point.y),
        );
        if i % label_every == 0 {
            plot.category_label(svg, *x, &point.label);
        }
    }
}

fn pie(svg: &mut String, series: &Series, w: f64, h: f64) -> Result<(), ChartError> {
    let slices: Vec<_> = series.points.iter().filter(|p| p.y > 0.0).collect();
    let total: f64 = slices.iter().map(|p| p.y).sum();
    if slices.is_empty() || total <= 0.0 {
        return Err(ChartError::EmptySeries);
    }

    let legend_width = 180.0;
    let cx = (w - legend_width) / 2.0;
    let cy = MARGIN_TOP + (h - MARGIN_TOP) / 2.0 - 10.0;
    let r = ((w - legend_width).min(h - MARGIN_TOP) / 2.0 - 20.0).max(10.0);

    if slices.len() == 1 {
        let _ = write!(
            svg,
            r#"<circle cx="{}" cy="{}" r="{}" fill="{}"/>"#,
            fmt(cx),
            fmt(cy),
            fmt(r),
            PALETTE[0]
        );
    } else {
        let mut angle = -std::f64::consts::FRAC_PI_2;
        for (i, point) in slices.iter().enumerate() {
            let sweep = point.y / total * std::f64::consts::TAU;
            let (x0, y0) = (cx + r * angle.cos(), cy + r * angle.sin());
            angle += sweep;
            let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
            let large = if sweep > std::f64::consts::PI { 1 } else { 0 };
            let _ = write!(
                svg,
                r#"<path d="M{},{} L{},{} A{},{} 0 {} 1 {},{} Z" fill="{}" stroke="white"><title>{}: {}</title></path>"#,
                fmt(cx),
                fmt(cy),
                fmt(x0),
                fmt(y0),
                fmt(r),
                fmt(r),
                large,
                fmt(x1),
                fmt(y1),
                PALETTE[i % PALETTE.len()],
                escape(&point.label),
                format_number(point.y),
            );
        }
    }

    let legend_x = w - legend_width + 10.0;
    for (i, point) in slices.iter().enumerate() {
        let y = MARGIN_TOP + 20.0 * i as f64;
        if y > h - 20.0 {
            break;
        }
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/><text x="{}" y="{}">{} ({:.1}%)</text>"#,
            fmt(legend_x),
            fmt(y),
            PALETTE[i % PALETTE.len()],
            fmt(legend_x + 18.0),
            fmt(y + 10.0),
            escape(&truncate(&point.label)),
            point.y / total * 100.0,
        );
    }
    Ok(())
}

/// Short axis label: `1.5k`, `2M`, `0.25`.
pub fn format_number(value: f64) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "k")
    } else {
        (value, "")
    };
    let text = format!("{:.2}", scaled);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    let text = if text == "-0" { "0" } else { text };
    format!("{}{}", text, suffix)
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

fn truncate(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_CHARS {
        label.to_string()
    } else {
        let head: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
        format!("{}…", head)
    }
}

fn fmt(v: f64) -> String {
    format!("{:.1}", v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Aggregation, Point};

    fn spec(chart_type: ChartType) -> ChartSpec {
        ChartSpec {
            chart_type,
            table: "sales".to_string(),
            x: "Region".to_string(),
            y: Some("Sale".to_string()),
            aggregation: Aggregation::Sum,
            title: Some("Sales <by> region".to_string()),
        }
    }

    fn series() -> Series {
        Series {
            x_label: "Region".to_string(),
            y_label: "sum(Sale)".to_string(),
            points: vec![
                Point {
                    label: "North".to_string(),
                    x: None,
                    y: 100.0,
                },
                Point {
                    label: "South & East".to_string(),
                    x: None,
                    y: 40.0,
                },
            ],
        }
    }

    #[test]
    fn test_bar_chart_has_one_rect_per_point() {
        let svg = render_svg(&spec(ChartType::Bar), &series(), 800, 500).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<rect x=").count(), 2);
        assert!(svg.contains("Sales &lt;by&gt; region"));
        assert!(svg.contains("South &amp; East"));
    }

    #[test]
    fn test_line_and_scatter() {
        let line = render_svg(&spec(ChartType::Line), &series(), 640, 480).unwrap();
        assert!(line.contains("<polyline"));
        assert_eq!(line.matches("<circle").count(), 2);

        let scatter = render_svg(&spec(ChartType::Scatter), &series(), 640, 480).unwrap();
        assert!(!scatter.contains("<polyline"));
        assert_eq!(scatter.matches("<circle").count(), 2);
    }

    #[test]
    fn test_pie_has_slices_and_legend() {
        let svg = render_svg(&spec(ChartType::Pie), &series(), 800, 500).unwrap();
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains("North (71.4%)"));
    }

    #[test]
    fn test_pie_without_positive_values_fails() {
        let mut s = series();
        for p in &mut s.points {
            p.y = 0.0;
        }
        assert!(matches!(
            render_svg(&spec(ChartType::Pie), &s, 800, 500),
            Err(ChartError::EmptySeries)
        ));
    }

    #[test]
    fn test_empty_series_fails() {
        let s = Series::default();
        assert!(render_svg(&spec(ChartType::Bar), &s, 800, 500).is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(1500.0), "1.5k");
        assert_eq!(format_number(2_000_000.0), "2M");
        assert_eq!(format_number(-3000.0), "-3k");
    }
}
