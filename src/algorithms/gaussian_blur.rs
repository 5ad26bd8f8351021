use anyhow::Result;
use image::DynamicImage;
use imageproc::filter::separable_filter;

use crate::pipeline::Algorithm;
use crate::settings::{Setting, Settings};
use crate::types::{Auxiliary, Frame};

/// Separable gaussian blur with independent horizontal and vertical kernel sizes.
pub struct GaussianBlur {
    settings: Settings,
}

impl GaussianBlur {
    pub const NAME: &'static str = "gaussian_blur";

    pub fn new() -> Self {
        Self {
            settings: Settings::new(vec![
                Setting::slider("blur_x", 1, 1, 35),
                Setting::slider("blur_y", 1, 1, 35),
                Setting::checkbox("use_blur", true),
            ]),
        }
    }
}

impl Default for GaussianBlur {
    fn default() -> Self {
        Self::new()
    }
}

impl Algorithm for GaussianBlur {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn process(&self, frame: &Frame, _input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
        let (kx, ky) = if self.settings.checked_or("use_blur", true) {
            (
                make_odd(self.settings.raw_or("blur_x", 1)),
                make_odd(self.settings.raw_or("blur_y", 1)),
            )
        } else {
            (1, 1)
        };

        if kx == 1 && ky == 1 {
            return Ok((frame.clone(), Auxiliary::default()));
        }

        let h_kernel = gaussian_kernel(kx);
        let v_kernel = gaussian_kernel(ky);
        let blurred = match frame {
            DynamicImage::ImageLuma8(img) => {
                DynamicImage::ImageLuma8(separable_filter(img, &h_kernel, &v_kernel))
            }
            DynamicImage::ImageRgb8(img) => {
                DynamicImage::ImageRgb8(separable_filter(img, &h_kernel, &v_kernel))
            }
            other => DynamicImage::ImageRgb8(separable_filter(&other.to_rgb8(), &h_kernel, &v_kernel)),
        };

        Ok((blurred, Auxiliary::default()))
    }
}

fn make_odd(value: i64) -> u32 {
    let value = value.max(1) as u32;
    if value % 2 == 0 {
        value + 1
    } else {
        value
    }
}

/// Normalised 1-D gaussian of odd length `size`; sigma follows the usual
/// "derive from kernel size" rule.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / two_sigma_sq).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}
