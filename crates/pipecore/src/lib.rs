//! Core abstractions for the demand-driven pipeline
//!
//! This crate provides the keyed information store, the well-known keys,
//! the algorithm trait and request vocabulary, and the error taxonomy that
//! the runtime and every algorithm library depend on. It has no executive
//! logic of its own.

mod algorithm;
mod data;
mod error;
pub mod events;
pub mod extent;
pub mod info;
pub mod keys;
mod time;

pub use algorithm::{
    forward_information, forward_update_extent, Algorithm, AlgorithmContext, AlgorithmId, AsAny,
    ExecutiveId, Request, RequestKind,
};
pub use data::{downcast_data, DataHandle, DataObject, TypeHierarchy, DATA_OBJECT_TYPE};
pub use error::{AlgorithmError, ConfigurationError, PipelineError};
pub use events::*;
pub use extent::{update_extent_is_empty, Extent, ExtentType, PieceRequest};
pub use info::{InfoValue, Information, InformationVector, Key, KeyKind};
pub use time::TimeStamp;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
