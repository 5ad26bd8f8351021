use image::DynamicImage;

/// One decoded image. Sources hand out RGB8; stages may narrow it to a
/// single channel (`ImageLuma8`).
pub type Frame = DynamicImage;

/// A detected feature in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the feature in pixels, 0 when unknown.
    pub size: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self { x, y, size }
    }

    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }
}

/// Side-channel data threaded from one stage to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Auxiliary {
    pub keypoints: Option<Vec<Keypoint>>,
}

impl Auxiliary {
    pub fn with_keypoints(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints: Some(keypoints),
        }
    }

    /// Keypoints of this value, absent treated as none found.
    pub fn into_keypoints(self) -> Vec<Keypoint> {
        self.keypoints.unwrap_or_default()
    }
}

/// The latest result of the pipeline worker.
#[derive(Debug, Clone)]
pub struct Published {
    /// 1-based index of the frame read from the source.
    pub sequence: u64,
    pub frame: Frame,
    pub keypoints: Vec<Keypoint>,
}
