//! Built-in processing units, addressed by name through the registry.

pub mod gaussian_blur;
pub mod grayscale;
pub mod hough_circle_finder;

use std::sync::Arc;

use crate::pipeline::Algorithm;
use crate::registry::AlgorithmRegistry;

pub use gaussian_blur::GaussianBlur;
pub use grayscale::Grayscale;
pub use hough_circle_finder::HoughCircleFinder;

/// Add every built-in unit to the registry's catalog.
pub fn register_builtin(registry: &AlgorithmRegistry) {
    registry.register(GaussianBlur::NAME, || {
        Ok(Arc::new(GaussianBlur::new()) as Arc<dyn Algorithm>)
    });
    registry.register(Grayscale::NAME, || {
        Ok(Arc::new(Grayscale::new()) as Arc<dyn Algorithm>)
    });
    registry.register(HoughCircleFinder::NAME, || {
        Ok(Arc::new(HoughCircleFinder::new()) as Arc<dyn Algorithm>)
    });
}
