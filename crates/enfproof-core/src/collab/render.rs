//! Trace rendering collaborator

use anyhow::Result;

use crate::enf::EnfSeries;

/// A rendered artifact plus the metadata the blob store needs.
#[derive(Debug, Clone)]
pub struct RenderedTrace {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

/// Turns the frequency series into a visual artifact. The pipeline treats
/// the result as opaque bytes; implementations choose the format.
pub trait TraceRenderer: Send + Sync {
    fn render(&self, series: &EnfSeries) -> Result<RenderedTrace>;
}

const WIDTH: f64 = 700.0;
const HEIGHT: f64 = 220.0;
const MARGIN_LEFT: f64 = 56.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 24.0;
const MARGIN_BOTTOM: f64 = 36.0;

/// Frequency-vs-time polyline as an SVG document.
pub struct SvgTraceRenderer;

impl TraceRenderer for SvgTraceRenderer {
    fn render(&self, series: &EnfSeries) -> Result<RenderedTrace> {
        let mut svg = String::with_capacity(4096);
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
        ));
        svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
        svg.push_str(&format!(
            r#"<text x="{}" y="16" font-family="sans-serif" font-size="12" text-anchor="middle">Estimated ENF (mains frequency track)</text>"#,
            WIDTH / 2.0
        ));

        let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

        if series.frequencies.is_empty() {
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" font-family="sans-serif" font-size="12" text-anchor="middle">no trace</text>"#,
                WIDTH / 2.0,
                HEIGHT / 2.0
            ));
        } else {
            let t_max = series.timestamps.last().copied().unwrap_or(1.0).max(1e-9);
            let f_lo = series.frequencies.iter().cloned().fold(f64::INFINITY, f64::min);
            let f_hi = series
                .frequencies
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            // Flat series still needs a visible band.
            let pad = ((f_hi - f_lo) * 0.1).max(0.01);
            let f_lo = f_lo - pad;
            let f_hi = f_hi + pad;

            let to_x = |t: f64| MARGIN_LEFT + t / t_max * plot_w;
            let to_y = |f: f64| MARGIN_TOP + (1.0 - (f - f_lo) / (f_hi - f_lo)) * plot_h;

            // Dotted grid with axis labels at four horizontal levels.
            for i in 0..=3 {
                let f = f_lo + (f_hi - f_lo) * i as f64 / 3.0;
                let y = to_y(f);
                svg.push_str(&format!(
                    r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#999" stroke-width="0.5" stroke-dasharray="1,3"/>"##,
                    WIDTH - MARGIN_RIGHT
                ));
                svg.push_str(&format!(
                    r#"<text x="{:.1}" y="{:.1}" font-family="sans-serif" font-size="10" text-anchor="end">{f:.3}</text>"#,
                    MARGIN_LEFT - 4.0,
                    y + 3.0
                ));
            }

            let points: Vec<String> = series
                .timestamps
                .iter()
                .zip(&series.frequencies)
                .map(|(&t, &f)| format!("{:.1},{:.1}", to_x(t), to_y(f)))
                .collect();
            svg.push_str(&format!(
                r##"<polyline points="{}" fill="none" stroke="#1f77b4" stroke-width="1.2"/>"##,
                points.join(" ")
            ));

            svg.push_str(&format!(
                r#"<text x="{:.1}" y="{:.1}" font-family="sans-serif" font-size="11" text-anchor="middle">time (s)</text>"#,
                MARGIN_LEFT + plot_w / 2.0,
                HEIGHT - 8.0
            ));
        }

        svg.push_str("</svg>");

        Ok(RenderedTrace {
            bytes: svg.into_bytes(),
            content_type: "image/svg+xml",
            extension: "svg",
        })
    }
}
