use crate::probe::ProbeError;
use crate::storage::models::PaletteColors;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};

const SWATCH: u32 = 10;

/// Palette samples for a video of `duration` seconds.
pub fn sample_count(duration: f64) -> usize {
    if duration <= 60.0 {
        16
    } else if duration <= 300.0 {
        32
    } else if duration <= 1800.0 {
        64
    } else {
        128
    }
}

/// `count` timestamps centred in equal slices of `duration`.
pub fn evenly_spaced(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !(duration > 0.0) {
        return Vec::new();
    }
    (0..count)
        .map(|i| duration * (i as f64 + 0.5) / count as f64)
        .collect()
}

fn hex(pixel: &Rgb<u8>) -> String {
    let [r, g, b] = pixel.0;
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Four corners and the centre of a 10x10 swatch. Larger images are scaled down first.
pub fn sample_palette(encoded: &[u8]) -> Result<PaletteColors, ProbeError> {
    let decoded = image::load_from_memory(encoded)?.to_rgb8();
    let swatch: RgbImage = if decoded.dimensions() == (SWATCH, SWATCH) {
        decoded
    } else {
        image::imageops::resize(&decoded, SWATCH, SWATCH, FilterType::Triangle)
    };

    let last = SWATCH - 1;
    Ok(PaletteColors {
        top_left: hex(swatch.get_pixel(0, 0)),
        top_right: hex(swatch.get_pixel(last, 0)),
        bottom_left: hex(swatch.get_pixel(0, last)),
        bottom_right: hex(swatch.get_pixel(last, last)),
        center: hex(swatch.get_pixel(SWATCH / 2, SWATCH / 2)),
    })
}
