//! Encoder entry points used by the render path

use super::dither::floyd_steinberg;
use super::grayscale::{BitDepth, Palette, quantize_indices, to_grayscale};
use super::png::encode_grayscale;
use super::resize::{ResizeMode, resize};
use crate::errors::{EncodeError, EncodeResult};
use image::GrayImage;
use tracing::debug;

/// Target format for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub width: u32,
    pub height: u32,
    pub bit_depth: BitDepth,
    pub resize: ResizeMode,
    pub dither: bool,
}

impl EncodeOptions {
    pub fn new(width: u32, height: u32, bit_depth: BitDepth) -> Self {
        Self {
            width,
            height,
            bit_depth,
            resize: ResizeMode::default(),
            dither: false,
        }
    }

    pub fn with_resize(mut self, resize: ResizeMode) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_dither(mut self, dither: bool) -> Self {
        self.dither = dither;
        self
    }
}

/// A finished PNG ready to be hashed and stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bit_depth: BitDepth,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decodes arbitrary raster bytes and re-encodes them for a panel.
///
/// Encoding is CPU bound; async callers should run it on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageEncoder;

impl ImageEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode `raw` and encode it with the options as given.
    pub fn encode(&self, raw: &[u8], options: &EncodeOptions) -> EncodeResult<EncodedImage> {
        let decoded = image::load_from_memory(raw)?;
        let gray = to_grayscale(&decoded.to_rgb8());
        self.encode_gray(&gray, options)
    }

    /// Same as [`encode`](Self::encode) with Floyd–Steinberg dithering forced on.
    pub fn encode_dithered(
        &self,
        raw: &[u8],
        options: &EncodeOptions,
    ) -> EncodeResult<EncodedImage> {
        self.encode(raw, &options.with_dither(true))
    }

    /// Encode an already grayscale image.
    pub fn encode_gray(
        &self,
        image: &GrayImage,
        options: &EncodeOptions,
    ) -> EncodeResult<EncodedImage> {
        if options.width == 0 || options.height == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: options.width,
                height: options.height,
            });
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: image.width(),
                height: image.height(),
            });
        }

        let sized = resize(image, options.width, options.height, options.resize);
        let palette = Palette::for_depth(options.bit_depth);
        let indices = if options.dither {
            floyd_steinberg(&sized, &palette)
        } else {
            quantize_indices(&sized, &palette)
        };

        let bytes = encode_grayscale(&indices, sized.width(), sized.height(), options.bit_depth)?;
        debug!(
            "Encoded {}x{} {} image ({} bytes, dither: {})",
            sized.width(),
            sized.height(),
            options.bit_depth,
            bytes.len(),
            options.dither
        );

        Ok(EncodedImage {
            bytes,
            width: sized.width(),
            height: sized.height(),
            bit_depth: options.bit_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(image: RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_encode_quantizes_to_device_depth() {
        let raw = png_bytes(RgbImage::from_pixel(4, 4, Rgb([130, 130, 130])));
        let options = EncodeOptions::new(4, 4, BitDepth::Two);

        let encoded = ImageEncoder::new().encode(&raw, &options).unwrap();
        assert_eq!(encoded.bit_depth, BitDepth::Two);
        assert_eq!(encoded.bytes[24], 2);

        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_luma8();
        assert!(decoded.pixels().all(|p| p.0[0] == 170));
    }

    #[test]
    fn test_encode_resizes_to_panel() {
        let raw = png_bytes(RgbImage::from_pixel(40, 20, Rgb([255, 255, 255])));
        let options = EncodeOptions::new(16, 16, BitDepth::One);

        let encoded = ImageEncoder::new().encode(&raw, &options).unwrap();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (16, 16));
        // letterboxed: black bars above and below
        assert_eq!(decoded.get_pixel(8, 0).0[0], 0);
        assert_eq!(decoded.get_pixel(8, 8).0[0], 255);
    }

    #[test]
    fn test_identical_input_gives_identical_bytes() {
        let raw = png_bytes(RgbImage::from_fn(8, 8, |x, y| {
            Rgb([(x * 30) as u8, (y * 30) as u8, 90])
        }));
        let options = EncodeOptions::new(8, 8, BitDepth::Four);
        let encoder = ImageEncoder::new();

        let first = encoder.encode(&raw, &options).unwrap();
        let second = encoder.encode(&raw, &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_dithered_entry_point_differs_on_gradients() {
        let gray = GrayImage::from_fn(32, 1, |x, _| Luma([(x * 8) as u8]));
        let options = EncodeOptions::new(32, 1, BitDepth::One);
        let encoder = ImageEncoder::new();

        let plain = encoder.encode_gray(&gray, &options).unwrap();
        let dithered = encoder
            .encode_gray(&gray, &options.with_dither(true))
            .unwrap();
        assert_ne!(plain.bytes, dithered.bytes);
    }

    #[test]
    fn test_garbage_input_is_decode_error() {
        let options = EncodeOptions::new(8, 8, BitDepth::One);
        let result = ImageEncoder::new().encode(b"not an image", &options);
        assert!(matches!(result, Err(EncodeError::Decode(_))));
    }

    #[test]
    fn test_zero_sized_panel_is_rejected() {
        let gray = GrayImage::new(4, 4);
        let options = EncodeOptions::new(0, 4, BitDepth::Eight);
        assert!(matches!(
            ImageEncoder::new().encode_gray(&gray, &options),
            Err(EncodeError::InvalidDimensions { .. })
        ));
    }
}
