use crate::chart::{ChartRenderer, PALETTE, START_ANGLE_DEG};
use crate::domain::instruments::InstrumentSet;
use anyhow::Result;
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::io::Write;

// Square canvas, roughly an 8x8 inch figure at 100 dpi.
const SIZE: f64 = 800.0;
const RADIUS: f64 = 280.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct SvgPieChart;

impl ChartRenderer for SvgPieChart {
    fn extension(&self) -> &'static str {
        "svg"
    }

    fn render(
        &self,
        out: &mut dyn Write,
        instruments: &InstrumentSet,
        weights: &[f64],
        title: &str,
    ) -> Result<()> {
        out.write_all(render_svg(instruments, weights, title).as_bytes())?;
        Ok(())
    }
}

fn render_svg(instruments: &InstrumentSet, weights: &[f64], title: &str) -> String {
    let (cx, cy) = (SIZE / 2.0, SIZE / 2.0 + 20.0);
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{s}" height="{s}" viewBox="0 0 {s} {s}"><style>text{{font-family:Arial,sans-serif;font-size:14px;fill:#333}}</style>"#,
        s = SIZE
    );
    svg.push_str(r##"<rect width="100%" height="100%" fill="#ffffff"/>"##);
    let _ = write!(
        svg,
        r#"<text x="{x}" y="40" text-anchor="middle" style="font-size:20px">{t}</text>"#,
        x = cx,
        t = escape(title)
    );

    if total > 0.0 {
        let mut angle = START_ANGLE_DEG.to_radians();
        for (i, (ticker, &weight)) in instruments.iter().zip(weights).enumerate() {
            if weight <= 0.0 {
                continue;
            }
            let share = weight / total;
            let sweep = share * 2.0 * PI;
            let [r, g, b] = PALETTE[i % PALETTE.len()];
            let color = format!("#{r:02x}{g:02x}{b:02x}");

            if share >= 1.0 - 1e-9 {
                let _ = write!(
                    svg,
                    r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{RADIUS}" fill="{color}"/>"#
                );
            } else {
                let (x1, y1) = polar(cx, cy, RADIUS, angle);
                let (x2, y2) = polar(cx, cy, RADIUS, angle + sweep);
                let large = if sweep > PI { 1 } else { 0 };
                let _ = write!(
                    svg,
                    r##"<path d="M{cx:.2},{cy:.2} L{x1:.2},{y1:.2} A{RADIUS},{RADIUS} 0 {large} 0 {x2:.2},{y2:.2} Z" fill="{color}" stroke="#ffffff"/>"##
                );
            }

            let mid = angle + sweep / 2.0;
            let (lx, ly) = polar(cx, cy, RADIUS * 1.1, mid);
            let anchor = if mid.cos() >= 0.0 { "start" } else { "end" };
            let _ = write!(
                svg,
                r#"<text x="{lx:.2}" y="{ly:.2}" text-anchor="{anchor}">{}</text>"#,
                escape(ticker)
            );
            let (px, py) = polar(cx, cy, RADIUS * 0.6, mid);
            let _ = write!(
                svg,
                r#"<text x="{px:.2}" y="{py:.2}" text-anchor="middle">{:.1}%</text>"#,
                share * 100.0
            );

            angle += sweep;
        }
    }

    svg.push_str("</svg>");
    svg
}

fn polar(cx: f64, cy: f64, r: f64, angle: f64) -> (f64, f64) {
    (cx + r * angle.cos(), cy - r * angle.sin())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
