//! Deterministic raster preprocessing applied before every inference call.
//!
//! Contrast/brightness is a linear gain and offset followed by absolute value
//! and saturation to `u8` (the scale-abs transform). Channel order is then
//! converted to what the backend expects.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::backend::ColorOrder;

pub const DEFAULT_GAIN: f32 = 1.3;
pub const DEFAULT_OFFSET: f32 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreprocessParams {
    pub gain: f32,
    pub offset: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            gain: DEFAULT_GAIN,
            offset: DEFAULT_OFFSET,
        }
    }
}

impl PreprocessParams {
    fn lookup_table(&self) -> [u8; 256] {
        std::array::from_fn(|value| scale_abs(value as u8, self.gain, self.offset))
    }
}

fn scale_abs(value: u8, gain: f32, offset: f32) -> u8 {
    (gain * value as f32 + offset)
        .abs()
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Gain/offset enhancement. Returns a new raster; the input is untouched.
pub fn enhance(image: &RgbImage, params: PreprocessParams) -> RgbImage {
    let lut = params.lookup_table();
    let mut out = image.clone();
    for subpixel in out.iter_mut() {
        *subpixel = lut[*subpixel as usize];
    }
    out
}

/// Convert an RGB raster into `order`.
pub fn to_color_order(mut image: RgbImage, order: ColorOrder) -> RgbImage {
    if order == ColorOrder::Bgr {
        swap_red_blue(&mut image);
    }
    image
}

/// Convert a raster in `order` back to RGB for persistence.
pub fn to_rgb(mut image: RgbImage, order: ColorOrder) -> RgbImage {
    if order == ColorOrder::Bgr {
        swap_red_blue(&mut image);
    }
    image
}

fn swap_red_blue(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        pixel.0.swap(0, 2);
    }
}

/// Full preprocessing: enhancement, then channel order conversion.
pub fn preprocess(image: &RgbImage, params: PreprocessParams, order: ColorOrder) -> RgbImage {
    to_color_order(enhance(image, params), order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn scale_abs_saturates() {
        assert_eq!(scale_abs(0, 1.3, 20.0), 20);
        assert_eq!(scale_abs(100, 1.3, 20.0), 150);
        assert_eq!(scale_abs(200, 1.3, 20.0), 255);
        assert_eq!(scale_abs(10, 1.0, -30.0), 20);
    }

    #[test]
    fn enhance_leaves_input_untouched() {
        let image = RgbImage::from_pixel(2, 2, Rgb([10, 100, 200]));
        let out = enhance(&image, PreprocessParams::default());
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 100, 200]));
        assert_eq!(out.get_pixel(1, 1), &Rgb([33, 150, 255]));
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let image = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8 * 30, y as u8 * 30, 7]));
        let params = PreprocessParams::default();
        let a = preprocess(&image, params, ColorOrder::Bgr);
        let b = preprocess(&image, params, ColorOrder::Bgr);
        assert_eq!(a, b);
    }

    #[test]
    fn bgr_round_trips_to_rgb() {
        let image = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        let bgr = to_color_order(image.clone(), ColorOrder::Bgr);
        assert_eq!(bgr.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(to_rgb(bgr, ColorOrder::Bgr), image);
    }
}
