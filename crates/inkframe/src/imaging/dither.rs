//! Floyd–Steinberg error diffusion

use super::grayscale::Palette;
use image::GrayImage;

/// Dither `image` against `palette`, returning palette indices in row-major
/// order.
///
/// Error is pushed right (7/16), down-left (3/16), down (5/16) and
/// down-right (1/16), scanning left to right on every row.
pub fn floyd_steinberg(image: &GrayImage, palette: &Palette) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut buffer: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();
    let mut indices = vec![0u8; width * height];

    for y in 0..height {
        for x in 0..width {
            let offset = y * width + x;
            let old = buffer[offset].clamp(0.0, 255.0);
            let index = palette.nearest_index(old.round() as u8);
            let error = old - palette.level(index) as f32;
            indices[offset] = index;

            if x + 1 < width {
                buffer[offset + 1] += error * 7.0 / 16.0;
            }
            if y + 1 < height {
                let below = offset + width;
                if x > 0 {
                    buffer[below - 1] += error * 3.0 / 16.0;
                }
                buffer[below] += error * 5.0 / 16.0;
                if x + 1 < width {
                    buffer[below + 1] += error / 16.0;
                }
            }
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::grayscale::BitDepth;

    #[test]
    fn test_solid_extremes_are_untouched() {
        let palette = Palette::for_depth(BitDepth::One);

        let black = GrayImage::from_pixel(8, 8, image::Luma([0]));
        assert!(floyd_steinberg(&black, &palette).iter().all(|&i| i == 0));

        let white = GrayImage::from_pixel(8, 8, image::Luma([255]));
        assert!(floyd_steinberg(&white, &palette).iter().all(|&i| i == 1));
    }

    #[test]
    fn test_mid_gray_averages_out() {
        let palette = Palette::for_depth(BitDepth::One);
        let gray = GrayImage::from_pixel(16, 16, image::Luma([128]));
        let indices = floyd_steinberg(&gray, &palette);

        let white = indices.iter().filter(|&&i| i == 1).count();
        // roughly half the pixels end up white
        assert!((96..=160).contains(&white), "white pixels: {white}");
    }

    #[test]
    fn test_exact_levels_need_no_diffusion() {
        let palette = Palette::for_depth(BitDepth::Two);
        let image = GrayImage::from_raw(4, 1, vec![0, 85, 170, 255]).unwrap();
        assert_eq!(floyd_steinberg(&image, &palette), vec![0, 1, 2, 3]);
    }

    proptest::proptest! {
        #[test]
        fn prop_indices_stay_within_palette(
            depth in proptest::sample::select(vec![
                BitDepth::One,
                BitDepth::Two,
                BitDepth::Four,
                BitDepth::Eight,
            ]),
            pixels in proptest::collection::vec(proptest::num::u8::ANY, 1..64),
        ) {
            let width = pixels.len() as u32;
            let image = GrayImage::from_raw(width, 1, pixels).unwrap();
            let palette = Palette::for_depth(depth);
            let indices = floyd_steinberg(&image, &palette);

            proptest::prop_assert_eq!(indices.len(), width as usize);
            proptest::prop_assert!(indices.iter().all(|&i| (i as usize) < depth.levels()));
        }
    }
}
