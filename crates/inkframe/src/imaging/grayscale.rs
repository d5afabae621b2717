//! Luminance conversion and bit-depth quantization

use crate::errors::EncodeError;
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bits per pixel supported by e-ink panels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl BitDepth {
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Number of distinct gray levels
    pub fn levels(self) -> usize {
        1 << self.bits()
    }

    pub fn pixels_per_byte(self) -> usize {
        8 / self.bits() as usize
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = EncodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            other => Err(EncodeError::UnsupportedBitDepth(other)),
        }
    }
}

impl TryFrom<i32> for BitDepth {
    type Error = EncodeError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| EncodeError::UnsupportedBitDepth(u8::MAX))
            .and_then(Self::try_from)
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Evenly spaced gray levels for a bit depth, with a lookup from any 8-bit
/// gray value to the nearest level's index.
#[derive(Debug, Clone)]
pub struct Palette {
    depth: BitDepth,
    levels: Vec<u8>,
    nearest: [u8; 256],
}

impl Palette {
    pub fn for_depth(depth: BitDepth) -> Self {
        let count = depth.levels();
        let levels: Vec<u8> = if count == 2 {
            vec![0, 255]
        } else {
            (0..count)
                .map(|i| ((i as f64 * 255.0) / (count - 1) as f64).round() as u8)
                .collect()
        };

        let mut nearest = [0u8; 256];
        for (value, slot) in nearest.iter_mut().enumerate() {
            let (index, _) = levels
                .iter()
                .enumerate()
                .min_by_key(|(_, level)| (**level as i32 - value as i32).abs())
                .unwrap_or((0, &0));
            *slot = index as u8;
        }

        Self {
            depth,
            levels,
            nearest,
        }
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn levels(&self) -> &[u8] {
        &self.levels
    }

    /// Gray value stored at a palette index
    pub fn level(&self, index: u8) -> u8 {
        self.levels[index as usize % self.levels.len()]
    }

    /// Index of the palette level closest to `gray`
    pub fn nearest_index(&self, gray: u8) -> u8 {
        self.nearest[gray as usize]
    }
}

/// ITU-R BT.601 luminance
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        Luma([luminance(r, g, b)])
    })
}

/// Threshold a gray value to the output level for `depth`
pub fn quantize_value(gray: u8, depth: BitDepth) -> u8 {
    match depth {
        BitDepth::One => {
            if gray >= 128 {
                255
            } else {
                0
            }
        }
        BitDepth::Two => (gray / 64).min(3) * 85,
        BitDepth::Four => (gray / 16).min(15) * 17,
        BitDepth::Eight => gray,
    }
}

/// Quantize every pixel and return palette indices in row-major order
pub fn quantize_indices(image: &GrayImage, palette: &Palette) -> Vec<u8> {
    image
        .as_raw()
        .iter()
        .map(|&gray| palette.nearest_index(quantize_value(gray, palette.depth())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_reference_values() {
        assert_eq!(quantize_value(130, BitDepth::Two), 170);
        assert_eq!(quantize_value(10, BitDepth::One), 0);
        assert_eq!(quantize_value(200, BitDepth::Four), 204);
        assert_eq!(quantize_value(128, BitDepth::One), 255);
        assert_eq!(quantize_value(255, BitDepth::Two), 255);
        assert_eq!(quantize_value(77, BitDepth::Eight), 77);
    }

    #[test]
    fn test_palette_levels() {
        assert_eq!(Palette::for_depth(BitDepth::One).levels(), &[0, 255]);
        assert_eq!(Palette::for_depth(BitDepth::Two).levels(), &[0, 85, 170, 255]);

        let four = Palette::for_depth(BitDepth::Four);
        assert_eq!(four.levels().len(), 16);
        assert_eq!(four.level(12), 204);
        assert_eq!(four.level(15), 255);

        let eight = Palette::for_depth(BitDepth::Eight);
        assert_eq!(eight.levels().len(), 256);
        assert_eq!(eight.nearest_index(123), 123);
    }

    #[test]
    fn test_quantized_values_map_to_exact_indices() {
        for depth in [BitDepth::One, BitDepth::Two, BitDepth::Four, BitDepth::Eight] {
            let palette = Palette::for_depth(depth);
            for gray in 0..=255u8 {
                let value = quantize_value(gray, depth);
                let index = palette.nearest_index(value);
                assert_eq!(palette.level(index), value, "{depth} gray={gray}");
            }
        }
    }

    #[test]
    fn test_luminance() {
        assert_eq!(luminance(0, 0, 0), 0);
        assert_eq!(luminance(255, 255, 255), 255);
        assert_eq!(luminance(255, 0, 0), 76);
        assert_eq!(luminance(0, 255, 0), 150);
        assert_eq!(luminance(0, 0, 255), 29);
    }

    #[test]
    fn test_bit_depth_conversion() {
        assert_eq!(BitDepth::try_from(4u8).unwrap(), BitDepth::Four);
        assert!(BitDepth::try_from(3u8).is_err());
        assert!(BitDepth::try_from(-1i32).is_err());
        assert_eq!(BitDepth::Two.pixels_per_byte(), 4);
        assert_eq!(BitDepth::Four.levels(), 16);
    }

    #[test]
    fn test_quantize_indices() {
        let image = GrayImage::from_raw(4, 1, vec![0, 100, 130, 250]).unwrap();
        let palette = Palette::for_depth(BitDepth::Two);
        assert_eq!(quantize_indices(&image, &palette), vec![0, 1, 2, 3]);
    }
}
