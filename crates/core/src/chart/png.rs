use crate::chart::{ChartRenderer, PALETTE, START_ANGLE_DEG};
use crate::domain::instruments::InstrumentSet;
use anyhow::{Context, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use std::f64::consts::TAU;
use std::io::Write;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const LEGEND_SWATCH: u32 = 18;

#[derive(Debug, Clone, Copy)]
pub struct PngPieChart {
    pub size: u32,
}

impl Default for PngPieChart {
    fn default() -> Self {
        Self { size: 800 }
    }
}

impl ChartRenderer for PngPieChart {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn render(
        &self,
        out: &mut dyn Write,
        instruments: &InstrumentSet,
        weights: &[f64],
        _title: &str,
    ) -> Result<()> {
        let img = draw_pie(self.size, instruments.len(), weights);
        PngEncoder::new(out)
            .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
            .context("failed to encode pie chart as png")
    }
}

fn draw_pie(size: u32, slots: usize, weights: &[f64]) -> RgbImage {
    let mut img = RgbImage::from_pixel(size, size, BACKGROUND);
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 || size == 0 {
        return img;
    }

    // Cumulative slice ends, as fractions of a full turn starting at START_ANGLE_DEG.
    let mut ends = Vec::with_capacity(weights.len());
    let mut acc = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            acc += w / total;
            ends.push((acc, i));
        }
    }

    let center = f64::from(size) / 2.0;
    let radius = f64::from(size) * 0.35;
    let start = START_ANGLE_DEG.to_radians();

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = f64::from(x) + 0.5 - center;
        let dy = center - (f64::from(y) + 0.5);
        if dx * dx + dy * dy > radius * radius {
            continue;
        }
        let turn = (dy.atan2(dx) - start).rem_euclid(TAU) / TAU;
        let slot = ends
            .iter()
            .find(|(end, _)| turn < *end)
            .or_else(|| ends.last())
            .map(|(_, i)| *i);
        if let Some(i) = slot {
            *pixel = Rgb(PALETTE[i % PALETTE.len()]);
        }
    }

    let margin = LEGEND_SWATCH;
    for i in 0..slots {
        let top = margin + i as u32 * (LEGEND_SWATCH + 6);
        if top + LEGEND_SWATCH > size {
            break;
        }
        let color = Rgb(PALETTE[i % PALETTE.len()]);
        for y in top..top + LEGEND_SWATCH {
            for x in margin..(margin + LEGEND_SWATCH).min(size) {
                img.put_pixel(x, y, color);
            }
        }
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn encodes_png() {
        let instruments = InstrumentSet::parse_csv("A,B,C").unwrap();
        let mut buf = Vec::new();
        PngPieChart { size: 120 }
            .render(&mut buf, &instruments, &[0.5, 0.3, 0.2], "t")
            .unwrap();
        assert!(buf.starts_with(PNG_MAGIC));
    }

    #[test]
    fn slices_follow_weights_counter_clockwise() {
        let img = draw_pie(200, 2, &[0.5, 0.5]);
        let center = 100;
        // First slice spans 140..320 degrees, so it covers the left of the pie.
        assert_eq!(*img.get_pixel(center - 40, center), Rgb(PALETTE[0]));
        assert_eq!(*img.get_pixel(center + 40, center), Rgb(PALETTE[1]));
        assert_eq!(*img.get_pixel(199, 199), BACKGROUND);
    }

    #[test]
    fn zero_weights_draw_background_only() {
        let img = draw_pie(50, 2, &[0.0, 0.0]);
        assert!(img.pixels().all(|p| *p == BACKGROUND));
    }
}
