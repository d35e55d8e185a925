use crate::events::EventEmitter;
use crate::info::{Information, InformationVector, Key};
use crate::keys::{algorithm as port_keys, executive, streaming};
use crate::{AlgorithmError, TimeStamp, DATA_OBJECT_TYPE};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stable handle to an algorithm stored in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlgorithmId(usize);

impl AlgorithmId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "algorithm#{}", self.0)
    }
}

/// Stable handle to an executive stored in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutiveId(usize);

impl ExecutiveId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ExecutiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "executive#{}", self.0)
    }
}

/// Protocol phase a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Information,
    UpdateExtent,
    Data,
    PipelineModifiedTime,
}

impl RequestKind {
    /// Key flagged in the request store for this phase.
    pub fn key(&self) -> Key {
        match self {
            RequestKind::Information => executive::request_information(),
            RequestKind::UpdateExtent => executive::request_update_extent(),
            RequestKind::Data => executive::request_data(),
            RequestKind::PipelineModifiedTime => executive::request_pipeline_modified_time(),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Information => "information",
            RequestKind::UpdateExtent => "update-extent",
            RequestKind::Data => "data",
            RequestKind::PipelineModifiedTime => "pipeline-mtime",
        };
        f.write_str(name)
    }
}

/// A request sent by an executive to its algorithm.
#[derive(Debug, Clone)]
pub struct Request {
    kind: RequestKind,
    info: Information,
}

impl Request {
    pub fn new(kind: RequestKind, from_output_port: Option<usize>) -> Self {
        let mut info = Information::new();
        info.set(kind.key(), 1);
        info.set_option(executive::from_output_port(), from_output_port);
        Self { kind, info }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn info(&self) -> &Information {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut Information {
        &mut self.info
    }

    /// Output port that triggered this request, if any.
    pub fn from_output_port(&self) -> Option<usize> {
        self.info
            .get_integer(executive::from_output_port())
            .and_then(|p| usize::try_from(p).ok())
    }
}

/// What an algorithm can see about itself while handling a request.
pub struct AlgorithmContext<'a> {
    id: AlgorithmId,
    parameters: &'a Information,
    events: &'a EventEmitter,
    abort: &'a AtomicBool,
}

impl<'a> AlgorithmContext<'a> {
    pub fn new(
        id: AlgorithmId,
        parameters: &'a Information,
        events: &'a EventEmitter,
        abort: &'a AtomicBool,
    ) -> Self {
        Self {
            id,
            parameters,
            events,
            abort,
        }
    }

    pub fn id(&self) -> AlgorithmId {
        self.id
    }

    /// Algorithm-level information (parameters, input-array selections).
    pub fn parameters(&self) -> &Information {
        self.parameters
    }

    pub fn events(&self) -> &EventEmitter {
        self.events
    }

    /// Advisory abort flag; long-running algorithms poll it between steps.
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn update_progress(&self, amount: f64) {
        self.events.progress(amount.clamp(0.0, 1.0), None);
    }

    pub fn update_progress_text(&self, amount: f64, text: impl Into<String>) {
        self.events
            .progress(amount.clamp(0.0, 1.0), Some(text.into()));
    }
}

/// Object-safe access to `Any` for typed parameter mutation.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Core trait that every pipeline algorithm implements
///
/// Each protocol phase has its own method with a forwarding or no-op
/// default, so concrete algorithms override only what they care about.
/// Returning an error from any phase aborts the whole update.
pub trait Algorithm: AsAny + Send + Sync {
    /// Unique type identifier (e.g., "source.grid", "filter.smooth")
    fn algorithm_type(&self) -> &str;

    fn number_of_input_ports(&self) -> usize {
        1
    }

    fn number_of_output_ports(&self) -> usize {
        1
    }

    /// Describe what input `port` accepts. Called once per port.
    fn fill_input_port_information(
        &self,
        _port: usize,
        info: &mut Information,
    ) -> Result<(), AlgorithmError> {
        info.set(port_keys::input_required_data_type(), DATA_OBJECT_TYPE);
        Ok(())
    }

    /// Describe what output `port` produces. Called once per port.
    fn fill_output_port_information(
        &self,
        _port: usize,
        info: &mut Information,
    ) -> Result<(), AlgorithmError> {
        info.set(executive::data_type_name(), DATA_OBJECT_TYPE);
        Ok(())
    }

    /// Publish what each output can produce.
    fn request_information(
        &mut self,
        _ctx: &AlgorithmContext<'_>,
        _request: &Request,
        inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        forward_information(inputs, outputs);
        Ok(())
    }

    /// Decide what each input connection must provide for the requested output.
    fn request_update_extent(
        &mut self,
        _ctx: &AlgorithmContext<'_>,
        request: &Request,
        inputs: &mut [InformationVector],
        outputs: &InformationVector,
    ) -> Result<(), AlgorithmError> {
        forward_update_extent(request, inputs, outputs);
        Ok(())
    }

    /// Produce output data from current inputs.
    fn request_data(
        &mut self,
        _ctx: &AlgorithmContext<'_>,
        _request: &Request,
        _inputs: &[InformationVector],
        _outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Aggregate modification time of this algorithm given its upstream.
    fn compute_pipeline_mtime(
        &self,
        _ctx: &AlgorithmContext<'_>,
        _request: &Request,
        own: TimeStamp,
        upstream: TimeStamp,
    ) -> TimeStamp {
        own.max(upstream)
    }

    /// Single dispatch entry point used by the executives.
    ///
    /// Pipeline-mtime requests carry a return value and are answered by
    /// [`Algorithm::compute_pipeline_mtime`]. Dispatching one here is a
    /// caller error.
    fn process_request(
        &mut self,
        ctx: &AlgorithmContext<'_>,
        request: &Request,
        inputs: &mut [InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        match request.kind() {
            RequestKind::Information => self.request_information(ctx, request, inputs, outputs),
            RequestKind::UpdateExtent => self.request_update_extent(ctx, request, inputs, outputs),
            RequestKind::Data => self.request_data(ctx, request, inputs, outputs),
            RequestKind::PipelineModifiedTime => Err(AlgorithmError::Configuration(format!(
                "{} requests are answered by compute_pipeline_mtime",
                request.kind()
            ))),
        }
    }
}

/// Copy the first input's producible domain to every output.
pub fn forward_information(inputs: &[InformationVector], outputs: &mut InformationVector) {
    let Some(first) = inputs.first().and_then(|port| port.first()) else {
        return;
    };
    for output in outputs.iter_mut() {
        output.copy_entry(first, streaming::whole_extent());
        output.copy_entry(first, streaming::maximum_number_of_pieces());
        output.copy_entry(first, streaming::extent_type());
    }
}

/// Ask every input connection for exactly what the triggering output was asked for.
pub fn forward_update_extent(
    request: &Request,
    inputs: &mut [InformationVector],
    outputs: &InformationVector,
) {
    let port = request.from_output_port().unwrap_or(0);
    let Some(output) = outputs.get(port) else {
        return;
    };
    for connection in inputs.iter_mut().flat_map(|port| port.iter_mut()) {
        for key in streaming::request_keys() {
            connection.copy_entry(output, key);
        }
    }
}
