//! Standard algorithm library
//!
//! A structured-grid source, a few image filters and a debug sink, plus the
//! [`ImageData`] container they exchange.

mod config;
mod debug;
mod image;
mod shift_scale;
mod smooth;
mod source;
mod sum;

pub use debug::{DebugSink, DEBUG_TYPE};
pub use image::{input_image, requested_extent, store_output, ImageData, IMAGE_DATA_TYPE};
pub use shift_scale::{ShiftScaleFilter, SHIFT_SCALE_TYPE};
pub use smooth::{SmoothFilter, SMOOTH_TYPE};
pub use source::{GridSource, GRID_SOURCE_TYPE};
pub use sum::{SumFilter, SUM_TYPE};

use piperuntime::AlgorithmRegistry;
use std::sync::Arc;

/// Register all standard algorithms with a registry
pub fn register_all(registry: &mut AlgorithmRegistry) {
    registry.register(Arc::new(debug::DebugSinkFactory));
    registry.register(Arc::new(shift_scale::ShiftScaleFilterFactory));
    registry.register(Arc::new(smooth::SmoothFilterFactory));
    registry.register(Arc::new(source::GridSourceFactory));
    registry.register(Arc::new(sum::SumFilterFactory));
}

/// A registry with every standard algorithm registered
pub fn standard_registry() -> AlgorithmRegistry {
    let mut registry = AlgorithmRegistry::new();
    register_all(&mut registry);
    registry
}
