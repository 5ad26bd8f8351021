//! Frame sources: the capture device boundary.
//!
//! Every source hands out RGB8 frames. A failed read is `None` and callers
//! simply try again on the next cycle.

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, info};

use crate::error::VisionError;
use crate::types::Frame;

pub trait FrameSource {
    fn name(&self) -> String;

    fn resolution(&self) -> (u32, u32);

    /// Next frame, or `None` on a transient read failure (not end of stream).
    fn get_frame(&mut self) -> Option<Frame>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// What to open: a camera index, a still/directory of images, or the
/// built-in test pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceId {
    Index(u32),
    Synthetic,
    Path(PathBuf),
}

impl FromStr for DeviceId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<u32>() {
            return Ok(DeviceId::Index(index));
        }
        if let Some(n) = s.strip_prefix("/dev/video") {
            if let Ok(index) = n.parse::<u32>() {
                return Ok(DeviceId::Index(index));
            }
        }
        if s.eq_ignore_ascii_case("synthetic") {
            return Ok(DeviceId::Synthetic);
        }
        Ok(DeviceId::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Index(i) => write!(f, "camera #{i}"),
            DeviceId::Synthetic => f.write_str("synthetic"),
            DeviceId::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Size and rate for sources that do not dictate their own.
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Open the source named by `id`. This is the only place a device failure
/// is reported as an error.
pub fn open(id: &DeviceId, options: &SourceOptions) -> Result<Box<dyn FrameSource>, VisionError> {
    let source: Box<dyn FrameSource> = match id {
        DeviceId::Index(index) => open_camera(*index)?,
        DeviceId::Synthetic => Box::new(SyntheticSource::new(options.width, options.height, options.fps)),
        DeviceId::Path(path) => Box::new(FileSource::open(path, options.fps)?),
    };
    let (w, h) = source.resolution();
    info!(source = %source.name(), width = w, height = h, "video source opened");
    Ok(source)
}

#[cfg(feature = "camera")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>, VisionError> {
    Ok(Box::new(CameraSource::new(index)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>, VisionError> {
    Err(VisionError::device(
        DeviceId::Index(index).to_string(),
        "built without the `camera` feature",
    ))
}

/// Sleeps so that successive reads are at least one frame interval apart.
struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            last: None,
        }
    }

    fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(feature = "camera")]
pub use native::{list_cameras, CameraSource};

#[cfg(feature = "camera")]
mod native {
    use anyhow::{anyhow, Result};
    use image::DynamicImage;
    use nokhwa::{
        pixel_format::RgbFormat,
        utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
        Camera,
    };
    use tracing::{debug, info, warn};

    use super::FrameSource;
    use crate::error::VisionError;
    use crate::types::Frame;

    pub struct CameraSource {
        camera: Camera,
        name: String,
        open: bool,
    }

    impl CameraSource {
        pub fn new(index: u32) -> Result<Self, VisionError> {
            let device = format!("camera #{index}");
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = Camera::new(CameraIndex::Index(index), requested)
                .map_err(|e| VisionError::device(&device, e))?;
            camera
                .open_stream()
                .map_err(|e| VisionError::device(&device, e))?;

            let name = camera.info().human_name();
            info!(camera = %name, format = %camera.camera_format(), "camera stream open");
            Ok(Self {
                camera,
                name,
                open: true,
            })
        }
    }

    impl FrameSource for CameraSource {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn resolution(&self) -> (u32, u32) {
            let r = self.camera.resolution();
            (r.width(), r.height())
        }

        fn get_frame(&mut self) -> Option<Frame> {
            if !self.open {
                return None;
            }
            let decoded = self
                .camera
                .frame()
                .and_then(|buffer| buffer.decode_image::<RgbFormat>());
            match decoded {
                Ok(rgb) => Some(DynamicImage::ImageRgb8(rgb)),
                Err(err) => {
                    debug!(camera = %self.name, "frame read failed: {err}");
                    None
                }
            }
        }

        fn close(&mut self) {
            if !self.open {
                return;
            }
            self.open = false;
            if let Err(err) = self.camera.stop_stream() {
                warn!(camera = %self.name, "failed to stop stream: {err}");
            }
            info!(camera = %self.name, "camera released");
        }

        fn is_closed(&self) -> bool {
            !self.open
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            self.close();
        }
    }

    /// `(index, human name)` of every camera the native backend can see.
    pub fn list_cameras() -> Result<Vec<(String, String)>> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(|e| anyhow!(e))?;
        Ok(cameras
            .into_iter()
            .map(|c| (c.index().to_string(), c.human_name()))
            .collect())
    }
}

/// Replays a still image or a directory of images in a loop.
pub struct FileSource {
    name: String,
    files: Vec<PathBuf>,
    cursor: usize,
    resolution: (u32, u32),
    pacer: Pacer,
    open: bool,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

impl FileSource {
    pub fn open(path: &Path, fps: u32) -> Result<Self, VisionError> {
        let device = path.display().to_string();
        let files = if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| VisionError::device(&device, e))?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                })
                .collect();
            files.sort();
            files
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(VisionError::device(&device, "no such file or directory"));
        };

        let first = files
            .first()
            .ok_or_else(|| VisionError::device(&device, "directory holds no images"))?;
        let resolution = image::image_dimensions(first).map_err(|e| VisionError::device(&device, e))?;

        Ok(Self {
            name: device,
            files,
            cursor: 0,
            resolution,
            pacer: Pacer::new(fps),
            open: true,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for FileSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn get_frame(&mut self) -> Option<Frame> {
        if !self.open {
            return None;
        }
        self.pacer.wait();
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();
        match image::open(path) {
            Ok(img) => Some(DynamicImage::ImageRgb8(img.to_rgb8())),
            Err(err) => {
                debug!(file = %path.display(), "failed to decode frame: {err}");
                None
            }
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            info!(source = %self.name, "file source closed");
        }
    }

    fn is_closed(&self) -> bool {
        !self.open
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Dark frame with one bright disc circling the centre.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_index: u64,
    pacer: Pacer,
    open: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.max(16),
            height: height.max(16),
            frame_index: 0,
            pacer: Pacer::new(fps),
            open: true,
        }
    }

    /// The disc centre and radius drawn into frame `index`.
    pub fn disc_at(&self, index: u64) -> (f32, f32, f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        let radius = w.min(h) / 10.0;
        let orbit = w.min(h) / 6.0;
        let angle = index as f32 * 0.05;
        (w / 2.0 + orbit * angle.cos(), h / 2.0 + orbit * angle.sin(), radius)
    }

    fn render(&self, index: u64) -> RgbImage {
        let (cx, cy, r) = self.disc_at(index);
        let r_sq = r * r;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let d_sq = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            if d_sq <= r_sq {
                Rgb([225, 225, 215])
            } else {
                Rgb([30, 32, 36])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> String {
        "synthetic".to_string()
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn get_frame(&mut self) -> Option<Frame> {
        if !self.open {
            return None;
        }
        self.pacer.wait();
        let frame = self.render(self.frame_index);
        self.frame_index += 1;
        Some(DynamicImage::ImageRgb8(frame))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            debug!("synthetic source closed");
        }
    }

    fn is_closed(&self) -> bool {
        !self.open
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.close();
    }
}
