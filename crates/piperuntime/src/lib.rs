//! Demand-driven pipeline runtime
//!
//! This crate owns the algorithm graph, the executives that drive it, and
//! the three-phase update protocol (information, update extent, data). It
//! also provides the algorithm registry and the JSON pipeline loader.

mod connection;
mod executive;
mod graph;
mod loader;
mod registry;
mod runtime;
mod streaming;

pub use connection::{AlgorithmOutput, OutputPort};
pub use executive::ExecutiveKind;
pub use graph::DependencyGraph;
pub use loader::{load_pipeline, AlgorithmSpec, ConnectionSpec, LoadedPipeline, PipelineSpec};
pub use registry::{AlgorithmConfig, AlgorithmFactory, AlgorithmMetadata, AlgorithmRegistry, PortDefinition};
pub use runtime::{ArraySelector, FieldAssociation, Pipeline, RuntimeConfig};
