//! Device image encoding
//!
//! Turns arbitrary raster input into the exact grayscale format an e-ink
//! panel expects:
//! - `grayscale`: luminance conversion, palettes and threshold quantization
//! - `dither`: Floyd–Steinberg error diffusion against the same palettes
//! - `resize`: fit (letterbox) and fill (crop) scaling to the panel size
//! - `png`: minimal PNG writer for 1/2/4/8-bit grayscale
//! - `encoder`: the entry points used by the render path

pub mod dither;
pub mod encoder;
pub mod grayscale;
pub mod png;
pub mod resize;

pub use encoder::{EncodeOptions, EncodedImage, ImageEncoder};
pub use grayscale::{BitDepth, Palette};
pub use resize::ResizeMode;
