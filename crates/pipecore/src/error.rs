use crate::{AlgorithmId, ExecutiveId, RequestKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Algorithm {algorithm} failed during {request} request: {source}")]
    Algorithm {
        algorithm: AlgorithmId,
        request: RequestKind,
        source: AlgorithmError,
    },

    #[error("Cycle detected while visiting algorithm {0}")]
    CycleDetected(AlgorithmId),

    #[error("Algorithm not found: {0}")]
    UnknownAlgorithm(AlgorithmId),

    #[error("Executive not found: {0}")]
    UnknownExecutive(ExecutiveId),

    #[error("Algorithm {0} has no executive")]
    NoExecutive(AlgorithmId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Problems with how the pipeline is wired, detected before any algorithm runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Attempt to {action} {direction} port index {index} for algorithm {algorithm}, which has {count} {direction} ports")]
    PortIndexOutOfRange {
        algorithm: AlgorithmId,
        action: String,
        direction: &'static str,
        index: usize,
        count: usize,
    },

    #[error("Attempt to access connection index {index} on input port {port} of algorithm {algorithm}, which has {count} connections")]
    ConnectionIndexOutOfRange {
        algorithm: AlgorithmId,
        port: usize,
        index: usize,
        count: usize,
    },

    #[error("Input port {port} of algorithm {algorithm} has 0 connections but is not optional")]
    NotOptional { algorithm: AlgorithmId, port: usize },

    #[error("Input port {port} of algorithm {algorithm} has {connections} connections but is not repeatable")]
    NotRepeatable {
        algorithm: AlgorithmId,
        port: usize,
        connections: usize,
    },

    #[error("Input for connection {connection} on input port {port} of algorithm {algorithm} is of type {actual}, but a {required} is required")]
    InputTypeMismatch {
        algorithm: AlgorithmId,
        port: usize,
        connection: usize,
        actual: String,
        required: String,
    },

    #[error("Input for connection {connection} on input port {port} of algorithm {algorithm} declares no data type, but a {required} is required")]
    MissingDataType {
        algorithm: AlgorithmId,
        port: usize,
        connection: usize,
        required: String,
    },

    #[error("Request to update algorithm {algorithm} not managed by executive {executive}")]
    ForeignAlgorithm {
        executive: ExecutiveId,
        algorithm: AlgorithmId,
    },

    #[error("Connecting {producer} to {consumer} would create a cycle")]
    CycleRejected {
        producer: AlgorithmId,
        consumer: AlgorithmId,
    },

    #[error("Unknown algorithm type: {0}")]
    UnknownAlgorithmType(String),

    #[error("Unknown algorithm name: {0}")]
    UnknownName(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures reported by an algorithm from inside one of its request handlers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgorithmError {
    #[error("Missing required input on port {port}, connection {connection}")]
    MissingInput { port: usize, connection: usize },

    #[error("Invalid input type on port {port}: expected {expected}, got {actual}")]
    InvalidInputType {
        port: usize,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Aborted")]
    Aborted,
}
