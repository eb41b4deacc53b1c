//! Radial (polar) chart layout.
//!
//! Turns an ordered list of non-negative values into one wedge per value
//! plus three labelled reference rings. Angles follow the compass convention:
//! zero at twelve o'clock, increasing clockwise.

use crate::structs::PolarConfig;
use log::{debug, warn};
use std::f64::consts::{PI, TAU};

/// Categorical palette, indexed by sector position.
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Number of reference rings drawn behind the sectors.
pub const RING_COUNT: usize = 3;

/// Linear mapping from a numeric domain to a numeric range.
///
/// A zero-width (or non-finite) domain maps everything to the start of the
/// range instead of dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn is_degenerate(&self) -> bool {
        let span = self.domain.1 - self.domain.0;
        span == 0.0 || !span.is_finite()
    }

    pub fn apply(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return self.range.0;
        }
        let t = (value - self.domain.0) / (self.domain.1 - self.domain.0);
        self.range.0 + t * (self.range.1 - self.range.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sector {
    pub index: usize,
    pub value: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub outer_radius: f64,
    /// SVG path data, relative to the chart center.
    pub path: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    pub radius: f64,
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolarGeometry {
    pub width: f64,
    pub height: f64,
    pub center: (f64, f64),
    pub sectors: Vec<Sector>,
    pub rings: Vec<Ring>,
}

/// Lays out `values` as adjacent wedges covering the full circle.
///
/// Sector `i` spans `[i, i + 1)` of the angular domain `[0, N]`, mapped onto
/// `[0, 2π]`. Radii map `[0, max]` onto `[0, min(width, height) / 2 - margin]`.
/// Negative or non-finite values are drawn as zero.
pub fn render(values: &[f64], config: &PolarConfig) -> PolarGeometry {
    let values: Vec<f64> = values
        .iter()
        .map(|&v| {
            if v.is_finite() && v >= 0.0 {
                v
            } else {
                warn!("Polar chart value {} is not a non-negative number, drawing 0", v);
                0.0
            }
        })
        .collect();

    let max = values.iter().copied().fold(0.0, f64::max);
    let outer = (config.width.min(config.height) / 2.0 - config.margin).max(0.0);
    let angle = LinearScale::new((0.0, values.len() as f64), (0.0, TAU));
    let radius = LinearScale::new((0.0, max), (0.0, outer));
    if radius.is_degenerate() {
        debug!("Polar chart radius domain is empty, all sectors collapse to the center");
    }

    let sectors = values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            let start_angle = angle.apply(index as f64);
            let end_angle = angle.apply(index as f64 + 1.0);
            let outer_radius = radius.apply(value);
            Sector {
                index,
                value,
                start_angle,
                end_angle,
                outer_radius,
                path: wedge_path(outer_radius, start_angle, end_angle),
                color: PALETTE[index % PALETTE.len()],
            }
        })
        .collect();

    let rings = (1..=RING_COUNT)
        .map(|step| {
            let value = max * step as f64 / RING_COUNT as f64;
            Ring {
                radius: radius.apply(value),
                value,
                label: format!("{}", value.round()),
            }
        })
        .collect();

    PolarGeometry {
        width: config.width,
        height: config.height,
        center: (config.width / 2.0, config.height / 2.0),
        sectors,
        rings,
    }
}

fn point(radius: f64, angle: f64) -> (f64, f64) {
    (radius * angle.sin(), -radius * angle.cos())
}

/// Path of a wedge from the center out to `radius`.
fn wedge_path(radius: f64, start: f64, end: f64) -> String {
    if radius <= 0.0 {
        return "M0,0Z".to_string();
    }
    let span = end - start;
    if span >= TAU - 1e-9 {
        // a single arc cannot close on itself, draw two half circles
        return format!(
            "M0,{top}A{r},{r} 0 1,1 0,{bottom}A{r},{r} 0 1,1 0,{top}Z",
            top = num(-radius),
            bottom = num(radius),
            r = num(radius),
        );
    }
    let (x0, y0) = point(radius, start);
    let (x1, y1) = point(radius, end);
    let large_arc = if span > PI { 1 } else { 0 };
    format!(
        "M{},{}A{r},{r} 0 {},1 {},{}L0,0Z",
        num(x0),
        num(y0),
        large_arc,
        num(x1),
        num(y1),
        r = num(radius),
    )
}

/// Fixed-precision coordinate, with negative zero folded into zero.
fn num(v: f64) -> String {
    let s = format!("{:.3}", v);
    if s == "-0.000" { "0.000".to_string() } else { s }
}

fn display_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v)
    } else {
        format!("{:.2}", v)
    }
}

impl PolarGeometry {
    /// Standalone SVG document. `labels[i]` titles sector `i`; sectors
    /// without a label are titled by their index.
    pub fn to_svg(&self, labels: &[&str]) -> String {
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\n",
            self.width, self.height
        );
        svg.push_str(&format!(
            "<g transform=\"translate({},{})\">\n",
            num(self.center.0),
            num(self.center.1)
        ));

        svg.push_str("<g class=\"sectors\">\n");
        for sector in &self.sectors {
            let label = labels
                .get(sector.index)
                .map(|l| l.to_string())
                .unwrap_or_else(|| sector.index.to_string());
            svg.push_str(&format!(
                "<path class=\"sector\" data-index=\"{}\" d=\"{}\" fill=\"{}\"><title>{}: {}</title></path>\n",
                sector.index,
                sector.path,
                sector.color,
                label,
                display_value(sector.value)
            ));
        }
        svg.push_str("</g>\n<g class=\"rings\">\n");
        for ring in &self.rings {
            svg.push_str(&format!(
                "<circle class=\"ring\" r=\"{}\" fill=\"none\" stroke=\"#999\" stroke-dasharray=\"2,2\"/>\n",
                num(ring.radius)
            ));
            svg.push_str(&format!(
                "<text class=\"ring-label\" x=\"4\" y=\"{}\" font-size=\"10\">{}</text>\n",
                num(-ring.radius),
                ring.label
            ));
        }
        svg.push_str("</g>\n</g>\n</svg>\n");
        svg
    }
}

/// What a redraw changed, per sector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChartUpdate {
    pub entered: usize,
    pub updated: usize,
    pub exited: usize,
}

/// Polar chart whose geometry is kept across redraws and patched in place,
/// keyed by sector index.
#[derive(Debug, Clone)]
pub struct PolarChart {
    config: PolarConfig,
    geometry: PolarGeometry,
}

impl PolarChart {
    pub fn new(config: PolarConfig) -> Self {
        Self {
            config,
            geometry: PolarGeometry::default(),
        }
    }

    pub fn geometry(&self) -> &PolarGeometry {
        &self.geometry
    }

    /// Redraws with new values. Existing sectors are updated where they
    /// changed, new indices are appended and surplus ones dropped.
    pub fn update(&mut self, values: &[f64]) -> ChartUpdate {
        let next = render(values, &self.config);
        let mut summary = ChartUpdate::default();

        let current = &mut self.geometry.sectors;
        let kept = current.len().min(next.sectors.len());
        summary.exited = current.len() - kept;
        current.truncate(kept);

        let mut incoming = next.sectors.into_iter();
        for (existing, fresh) in current.iter_mut().zip(incoming.by_ref()) {
            if *existing != fresh {
                *existing = fresh;
                summary.updated += 1;
            }
        }
        for fresh in incoming {
            current.push(fresh);
            summary.entered += 1;
        }

        self.geometry.rings = next.rings;
        self.geometry.width = next.width;
        self.geometry.height = next.height;
        self.geometry.center = next.center;
        debug!(
            "Polar chart redraw: {} entered, {} updated, {} exited",
            summary.entered, summary.updated, summary.exited
        );
        summary
    }
}
