use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::presentation::OverlayStyle;

pub const DEFAULT_PATH: &str = "rusty_nozzle.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Camera index, `/dev/videoN`, image file or directory, or `synthetic`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub refresh_hz: u32,
    pub window_title: String,
    pub show_overlay: bool,
    pub show_hud: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub keypoint_color_hex: String, // e.g. "#00FF00"
    pub crosshair_color_hex: String,
    pub crosshair_arm: i32,
    pub stroke: u32,
    pub default_radius: i32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60,
            window_title: "Rusty Nozzle".to_string(),
            show_overlay: true,
            show_hud: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chain: vec![
                "gaussian_blur".to_string(),
                "grayscale".to_string(),
                "hough_circle_finder".to_string(),
            ],
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            keypoint_color_hex: "#00FF00".to_string(),
            crosshair_color_hex: "#FF0000".to_string(),
            crosshair_arm: 10,
            stroke: 1,
            default_radius: 10,
        }
    }
}

impl AppConfig {
    /// Read `path`. A missing file gives the defaults; so does a file that
    /// does not parse, after a warning. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::parse(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "bad configuration, using defaults");
            Self::default()
        }))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        let fallback = OverlayStyle::default();
        OverlayStyle {
            show_overlay: self.display.show_overlay,
            show_hud: self.display.show_hud,
            keypoint_color: parse_hex(&self.overlay.keypoint_color_hex, fallback.keypoint_color),
            crosshair_color: parse_hex(&self.overlay.crosshair_color_hex, fallback.crosshair_color),
            crosshair_arm: self.overlay.crosshair_arm,
            stroke: self.overlay.stroke,
            default_radius: self.overlay.default_radius,
        }
    }
}

/// `#RRGGBB` to a colour; anything else gives `fallback`.
pub fn parse_hex(hex: &str, fallback: Rgb<u8>) -> Rgb<u8> {
    let Some(digits) = hex.strip_prefix('#') else {
        return fallback;
    };
    if digits.len() != 6 || !digits.is_ascii() {
        return fallback;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
    match (channel(0), channel(2), channel(4)) {
        (Ok(r), Ok(g), Ok(b)) => Rgb([r, g, b]),
        _ => fallback,
    }
}
