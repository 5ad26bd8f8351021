use anyhow::Result;
use image::DynamicImage;

use crate::pipeline::Algorithm;
use crate::settings::Settings;
use crate::types::{Auxiliary, Frame};

/// Collapses the frame to a single luma channel.
pub struct Grayscale {
    settings: Settings,
}

impl Grayscale {
    pub const NAME: &'static str = "grayscale";

    pub fn new() -> Self {
        Self {
            settings: Settings::empty(),
        }
    }
}

impl Default for Grayscale {
    fn default() -> Self {
        Self::new()
    }
}

impl Algorithm for Grayscale {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn process(&self, frame: &Frame, _input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
        let gray = match frame {
            DynamicImage::ImageLuma8(img) => img.clone(),
            other => other.to_luma8(),
        };
        Ok((DynamicImage::ImageLuma8(gray), Auxiliary::default()))
    }
}
