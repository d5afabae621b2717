//! Scaling raster input to the panel resolution

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// How source images are mapped onto the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Scale to fit inside the panel, centered on a black background
    #[default]
    Fit,
    /// Scale to cover the panel, cropping the overflow around the center
    Fill,
    /// Leave the image untouched
    None,
}

pub fn resize(image: &GrayImage, width: u32, height: u32, mode: ResizeMode) -> GrayImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }

    match mode {
        ResizeMode::Fit => fit(image, width, height),
        ResizeMode::Fill => fill(image, width, height),
        ResizeMode::None => image.clone(),
    }
}

/// Letterbox: bilinear scale by the smaller ratio, center on black
pub fn fit(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let scale = f64::min(
        width as f64 / image.width() as f64,
        height as f64 / image.height() as f64,
    );
    let scaled_w = ((image.width() as f64 * scale).round() as u32).clamp(1, width);
    let scaled_h = ((image.height() as f64 * scale).round() as u32).clamp(1, height);

    let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
    let mut canvas = GrayImage::from_pixel(width, height, Luma([0]));
    let x = ((width - scaled_w) / 2) as i64;
    let y = ((height - scaled_h) / 2) as i64;
    imageops::overlay(&mut canvas, &scaled, x, y);
    canvas
}

/// Cover: bilinear scale by the larger ratio, crop around the center
pub fn fill(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let scale = f64::max(
        width as f64 / image.width() as f64,
        height as f64 / image.height() as f64,
    );
    let scaled_w = ((image.width() as f64 * scale).ceil() as u32).max(width);
    let scaled_h = ((image.height() as f64 * scale).ceil() as u32).max(height);

    let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_letterboxes_wide_image() {
        let source = GrayImage::from_pixel(200, 100, Luma([255]));
        let out = fit(&source, 100, 100);

        assert_eq!(out.dimensions(), (100, 100));
        // top and bottom bands are black, the middle is the scaled image
        assert_eq!(out.get_pixel(50, 5).0[0], 0);
        assert_eq!(out.get_pixel(50, 95).0[0], 0);
        assert_eq!(out.get_pixel(50, 50).0[0], 255);
    }

    #[test]
    fn test_fill_covers_target() {
        let source = GrayImage::from_pixel(200, 100, Luma([200]));
        let out = fill(&source, 100, 100);

        assert_eq!(out.dimensions(), (100, 100));
        assert!(out.pixels().all(|p| p.0[0] == 200));
    }

    #[test]
    fn test_resize_none_and_same_size() {
        let source = GrayImage::from_pixel(10, 20, Luma([7]));
        assert_eq!(resize(&source, 30, 30, ResizeMode::None).dimensions(), (10, 20));
        assert_eq!(resize(&source, 10, 20, ResizeMode::Fill).dimensions(), (10, 20));
    }
}
