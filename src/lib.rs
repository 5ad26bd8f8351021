//! Live camera preview with a hot-swappable chain of image-processing units
//! that look for circular features (printer nozzles) and overlay them.

pub mod algorithms;
pub mod args;
pub mod camera;
pub mod config;
pub mod controls;
pub mod error;
pub mod font;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod presentation;
pub mod registry;
pub mod settings;
pub mod types;
pub mod worker;

pub use error::VisionError;
pub use pipeline::{Algorithm, Chain};
pub use registry::AlgorithmRegistry;
pub use types::{Auxiliary, Frame, Keypoint, Published};
pub use worker::PipelineWorker;
