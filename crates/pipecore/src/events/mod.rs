// crates/pipecore/src/events/mod.rs

mod base;

pub use base::{AlgorithmEvent, EventBus, EventEmitter, PipelineEvent, UpdateId};
