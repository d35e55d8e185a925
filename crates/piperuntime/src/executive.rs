use crate::connection::OutputPort;
use crate::runtime::Pipeline;
use pipecore::keys::{executive as exec_keys, streaming};
use pipecore::{
    AlgorithmContext, AlgorithmId, ConfigurationError, ExecutiveId, Extent, ExtentType,
    Information, InformationVector, PieceRequest, PipelineError, PipelineEvent, Request,
    RequestKind, Result, TimeStamp, UpdateId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::Ordering;
use std::time::Instant;
use uuid::Uuid;

/// Which request protocol an executive speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutiveKind {
    /// Always produces the whole extent; takes no part in extent negotiation.
    DemandDriven,
    /// Negotiates update extents and pieces with its consumers.
    #[default]
    StreamingDemandDriven,
}

impl ExecutiveKind {
    pub fn is_streaming(&self) -> bool {
        matches!(self, ExecutiveKind::StreamingDemandDriven)
    }
}

impl fmt::Display for ExecutiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutiveKind::DemandDriven => f.write_str("demand-driven"),
            ExecutiveKind::StreamingDemandDriven => f.write_str("streaming-demand-driven"),
        }
    }
}

/// The request an output's current data was produced for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProducedRequest {
    pub(crate) extent: Option<Extent>,
    pub(crate) piece: Option<PieceRequest>,
}

impl ProducedRequest {
    fn capture(info: &Information) -> Self {
        Self {
            extent: Extent::from_info(info, streaming::update_extent()),
            piece: PieceRequest::from_info(info),
        }
    }
}

pub(crate) struct ExecutiveState {
    pub(crate) kind: ExecutiveKind,
    pub(crate) algorithm: Option<AlgorithmId>,
    pub(crate) input_information: Vec<InformationVector>,
    pub(crate) output_information: InformationVector,
    pub(crate) pipeline_mtime: TimeStamp,
    pub(crate) information_time: TimeStamp,
    pub(crate) data_time: TimeStamp,
    pub(crate) produced: Vec<Option<ProducedRequest>>,
    pub(crate) execution_count: usize,
}

impl ExecutiveState {
    fn new(kind: ExecutiveKind) -> Self {
        Self {
            kind,
            algorithm: None,
            input_information: Vec::new(),
            output_information: Vec::new(),
            pipeline_mtime: TimeStamp::NEVER,
            information_time: TimeStamp::NEVER,
            data_time: TimeStamp::NEVER,
            produced: Vec::new(),
            execution_count: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.kind);
    }
}

/// Executives currently in progress within one recursive pass.
pub(crate) struct Pass {
    pub(crate) update_id: UpdateId,
    visiting: HashSet<ExecutiveId>,
    requested: HashSet<(ExecutiveId, usize)>,
}

impl Pass {
    pub(crate) fn new(update_id: UpdateId) -> Self {
        Self {
            update_id,
            visiting: HashSet::new(),
            requested: HashSet::new(),
        }
    }

    /// Record a request written to an output; false if one was already written this pass.
    pub(crate) fn first_request(&mut self, executive: ExecutiveId, port: usize) -> bool {
        self.requested.insert((executive, port))
    }

    pub(crate) fn enter(&mut self, executive: ExecutiveId, algorithm: AlgorithmId) -> Result<()> {
        if self.visiting.insert(executive) {
            return Ok(());
        }
        tracing::error!("Cycle detected: {} is already being updated", algorithm);
        Err(PipelineError::CycleDetected(algorithm))
    }

    pub(crate) fn leave(&mut self, executive: ExecutiveId) {
        self.visiting.remove(&executive);
    }
}

impl Pipeline {
    pub fn add_executive(&mut self, kind: ExecutiveKind) -> ExecutiveId {
        let id = ExecutiveId::new(self.executives.len());
        self.executives.push(Some(ExecutiveState::new(kind)));
        id
    }

    /// Put `algorithm` under `executive`, detaching both from any previous partner.
    pub fn set_executive(&mut self, algorithm: AlgorithmId, executive: ExecutiveId) -> Result<()> {
        let old = self.node(algorithm)?.executive;
        let owner = self.state(executive)?.algorithm;
        if old == Some(executive) {
            return Ok(());
        }

        if let Some(old) = old {
            if let Ok(state) = self.state_mut(old) {
                state.reset();
            }
        }
        if let Some(other) = owner {
            if let Ok(node) = self.node_mut(other) {
                node.executive = None;
            }
        }

        let state = self.state_mut(executive)?;
        state.reset();
        state.algorithm = Some(algorithm);
        self.node_mut(algorithm)?.executive = Some(executive);
        tracing::debug!("{} now managed by {}", algorithm, executive);
        Ok(())
    }

    /// Executive of `algorithm`, creating one of the default kind if needed.
    pub fn executive(&mut self, algorithm: AlgorithmId) -> Result<ExecutiveId> {
        if let Some(existing) = self.node(algorithm)?.executive {
            return Ok(existing);
        }
        let created = self.add_executive(self.config.default_executive);
        self.set_executive(algorithm, created)?;
        Ok(created)
    }

    pub fn executive_of(&self, algorithm: AlgorithmId) -> Option<ExecutiveId> {
        self.node(algorithm).ok()?.executive
    }

    pub fn executive_kind(&self, executive: ExecutiveId) -> Result<ExecutiveKind> {
        Ok(self.state(executive)?.kind)
    }

    pub fn executive_algorithm(&self, executive: ExecutiveId) -> Option<AlgorithmId> {
        self.state(executive).ok()?.algorithm
    }

    /// Update `algorithm` through `executive`, which must be the one managing it.
    pub fn executive_update(&mut self, executive: ExecutiveId, algorithm: AlgorithmId) -> Result<()> {
        if self.state(executive)?.algorithm != Some(algorithm) {
            let err = ConfigurationError::ForeignAlgorithm {
                executive,
                algorithm,
            };
            tracing::error!("{}", err);
            return Err(err.into());
        }
        self.update(algorithm)
    }

    /// Bring `algorithm`'s outputs up to date: information, update extent, then data.
    pub fn update(&mut self, algorithm: AlgorithmId) -> Result<()> {
        let update_id = Uuid::new_v4();
        let started = Instant::now();
        self.events.emit(PipelineEvent::UpdateStarted {
            update_id,
            algorithm,
            timestamp: chrono::Utc::now(),
        });

        let result = self.run_update(algorithm, update_id);
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(
                "Update of {} completed in {}ms",
                self.label(algorithm),
                duration_ms
            ),
            Err(e) => tracing::error!("Update of {} failed: {}", self.label(algorithm), e),
        }
        self.events.emit(PipelineEvent::UpdateCompleted {
            update_id,
            algorithm,
            success: result.is_ok(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
        result
    }

    fn run_update(&mut self, algorithm: AlgorithmId, update_id: UpdateId) -> Result<()> {
        self.information_pass(algorithm, &mut Pass::new(update_id))?;
        let port = (!self.node(algorithm)?.outputs.is_empty()).then_some(0);
        self.propagate_pass(algorithm, port, &mut Pass::new(update_id))?;
        self.data_pass(algorithm, port, &mut Pass::new(update_id))
    }

    /// Run the information pass up to and including `algorithm`.
    pub fn update_information(&mut self, algorithm: AlgorithmId) -> Result<()> {
        self.information_pass(algorithm, &mut Pass::new(Uuid::new_v4()))
    }

    /// Run the data pass for output `port` of `algorithm`.
    pub fn update_data(&mut self, algorithm: AlgorithmId, port: usize) -> Result<()> {
        self.check_output_port(algorithm, port, "update data for")?;
        let update_id = Uuid::new_v4();
        self.mtime_pass(algorithm, &mut Pass::new(update_id))?;
        self.data_pass(algorithm, Some(port), &mut Pass::new(update_id))
    }

    /// Aggregate modification time of `algorithm` and everything upstream of it.
    pub fn compute_pipeline_mtime(&mut self, algorithm: AlgorithmId) -> Result<TimeStamp> {
        self.mtime_pass(algorithm, &mut Pass::new(Uuid::new_v4()))
    }

    pub fn pipeline_mtime(&self, algorithm: AlgorithmId) -> Option<TimeStamp> {
        Some(self.state_of(algorithm)?.pipeline_mtime)
    }

    pub fn data_time(&self, algorithm: AlgorithmId) -> Option<TimeStamp> {
        Some(self.state_of(algorithm)?.data_time)
    }

    pub fn information_time(&self, algorithm: AlgorithmId) -> Option<TimeStamp> {
        Some(self.state_of(algorithm)?.information_time)
    }

    /// Executive-side store of output `port`: published information and data.
    pub fn output_information(&self, algorithm: AlgorithmId, port: usize) -> Option<&Information> {
        self.state_of(algorithm)?.output_information.get(port)
    }

    /// Store the algorithm saw for one input connection during its last request.
    pub fn input_information(
        &self,
        algorithm: AlgorithmId,
        port: usize,
        connection: usize,
    ) -> Option<&Information> {
        self.state_of(algorithm)?
            .input_information
            .get(port)?
            .get(connection)
    }

    /// Number of times the algorithm has handled a data request.
    pub fn execution_count(&self, algorithm: AlgorithmId) -> usize {
        self.state_of(algorithm)
            .map(|state| state.execution_count)
            .unwrap_or(0)
    }

    pub(crate) fn information_pass(&mut self, algorithm: AlgorithmId, pass: &mut Pass) -> Result<()> {
        let executive = self.executive(algorithm)?;
        pass.enter(executive, algorithm)?;
        let result = self.information_step(executive, algorithm, pass);
        pass.leave(executive);
        result
    }

    fn information_step(
        &mut self,
        executive: ExecutiveId,
        algorithm: AlgorithmId,
        pass: &mut Pass,
    ) -> Result<()> {
        self.sync_executive(executive, algorithm)?;
        self.validate_inputs(algorithm)?;

        let mut upstream = TimeStamp::NEVER;
        for handle in self.input_handles(algorithm)? {
            self.information_pass(handle.producer(), pass)?;
            if let Some(mtime) = self.pipeline_mtime(handle.producer()) {
                upstream = upstream.max(mtime);
            }
        }

        let pipeline_mtime = self.algorithm_pipeline_mtime(algorithm, upstream, pass.update_id)?;
        let state = self.state_mut(executive)?;
        state.pipeline_mtime = pipeline_mtime;
        if pipeline_mtime <= state.information_time {
            return Ok(());
        }

        for info in state.output_information.iter_mut() {
            info.remove(streaming::whole_extent());
            info.remove(streaming::maximum_number_of_pieces());
            info.remove(streaming::extent_type());
        }
        self.refresh_inputs(executive, algorithm)?;
        self.invoke(
            executive,
            algorithm,
            &Request::new(RequestKind::Information, None),
            pass.update_id,
        )?;
        self.state_mut(executive)?.information_time.modified();
        Ok(())
    }

    pub(crate) fn mtime_pass(&mut self, algorithm: AlgorithmId, pass: &mut Pass) -> Result<TimeStamp> {
        let executive = self.executive(algorithm)?;
        pass.enter(executive, algorithm)?;
        let result = self.mtime_step(executive, algorithm, pass);
        pass.leave(executive);
        result
    }

    fn mtime_step(
        &mut self,
        executive: ExecutiveId,
        algorithm: AlgorithmId,
        pass: &mut Pass,
    ) -> Result<TimeStamp> {
        let mut upstream = TimeStamp::NEVER;
        for handle in self.input_handles(algorithm)? {
            upstream = upstream.max(self.mtime_pass(handle.producer(), pass)?);
        }
        let mtime = self.algorithm_pipeline_mtime(algorithm, upstream, pass.update_id)?;
        self.state_mut(executive)?.pipeline_mtime = mtime;
        Ok(mtime)
    }

    pub(crate) fn data_pass(
        &mut self,
        algorithm: AlgorithmId,
        port: Option<usize>,
        pass: &mut Pass,
    ) -> Result<()> {
        let executive = self.executive(algorithm)?;
        pass.enter(executive, algorithm)?;
        let result = self.data_step(executive, algorithm, port, pass);
        pass.leave(executive);
        result
    }

    fn data_step(
        &mut self,
        executive: ExecutiveId,
        algorithm: AlgorithmId,
        port: Option<usize>,
        pass: &mut Pass,
    ) -> Result<()> {
        self.sync_executive(executive, algorithm)?;
        self.initialize_update_requests(executive)?;
        if !self.need_to_execute_data(executive, algorithm)? {
            return Ok(());
        }
        self.validate_inputs(algorithm)?;

        for handle in self.input_handles(algorithm)? {
            self.data_pass(handle.producer(), Some(handle.index()), pass)?;
        }
        self.refresh_inputs(executive, algorithm)?;

        if self.requests_are_empty(executive)? {
            tracing::debug!(
                "Skipping {}: requested extent is empty",
                self.label(algorithm)
            );
            let state = self.state_mut(executive)?;
            for info in state.output_information.iter_mut() {
                info.remove(exec_keys::data_object());
            }
            Self::mark_produced(state);
            return Ok(());
        }

        self.node(algorithm)?.abort.store(false, Ordering::Relaxed);
        self.invoke(
            executive,
            algorithm,
            &Request::new(RequestKind::Data, port),
            pass.update_id,
        )?;
        let state = self.state_mut(executive)?;
        state.execution_count += 1;
        Self::mark_produced(state);
        self.release_upstream_data(algorithm)
    }

    fn mark_produced(state: &mut ExecutiveState) {
        state.data_time.modified();
        state.produced = state
            .output_information
            .iter()
            .map(|info| Some(ProducedRequest::capture(info)))
            .collect();
    }

    /// Whether the current output data is stale for the current request.
    ///
    /// Streaming requests must match the one the held data was produced for
    /// exactly. A request that shrinks inside the held extent still
    /// re-executes, so an output never carries more than was asked of it.
    pub(crate) fn need_to_execute_data(
        &self,
        executive: ExecutiveId,
        algorithm: AlgorithmId,
    ) -> Result<bool> {
        let state = self.state(executive)?;
        if state.data_time.is_never() || state.pipeline_mtime > state.data_time {
            return Ok(true);
        }

        for handle in self.input_handles(algorithm)? {
            let regenerated = self
                .data_time(handle.producer())
                .is_some_and(|upstream| upstream > state.data_time);
            if regenerated {
                return Ok(true);
            }
        }

        if state.kind.is_streaming() {
            for (port, info) in state.output_information.iter().enumerate() {
                let current = ProducedRequest::capture(info);
                if state.produced.get(port).and_then(Option::as_ref) != Some(&current) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Fill in default requests: whole extent or the single piece.
    ///
    /// Streaming executives keep any request already set and translate a
    /// bare piece request into its slab of the whole extent; demand-driven
    /// executives always ask for everything.
    pub(crate) fn initialize_update_requests(&mut self, executive: ExecutiveId) -> Result<()> {
        let state = self.state_mut(executive)?;
        let force_whole = !state.kind.is_streaming();
        for info in state.output_information.iter_mut() {
            match extent_type_of(info) {
                ExtentType::Piece => {
                    if force_whole || PieceRequest::from_info(info).is_none() {
                        PieceRequest::new(0, 1, 0).store(info);
                    }
                }
                ExtentType::Structured => {
                    let Some(whole) = Extent::from_info(info, streaming::whole_extent()) else {
                        continue;
                    };
                    if force_whole {
                        info.set(streaming::update_extent(), whole);
                    } else if !info.has(streaming::update_extent()) {
                        let requested = PieceRequest::from_info(info)
                            .map(|piece| piece.to_extent(&whole))
                            .unwrap_or(whole);
                        info.set(streaming::update_extent(), requested);
                    }
                }
            }
        }
        Ok(())
    }

    fn requests_are_empty(&self, executive: ExecutiveId) -> Result<bool> {
        let state = self.state(executive)?;
        if !state.kind.is_streaming() || state.output_information.is_empty() {
            return Ok(false);
        }
        Ok(state.output_information.iter().all(|info| {
            let extent_type = extent_type_of(info);
            let requested = match extent_type {
                ExtentType::Structured => info.has(streaming::update_extent()),
                ExtentType::Piece => info.has(streaming::update_number_of_pieces()),
            };
            requested && pipecore::update_extent_is_empty(info, extent_type)
        }))
    }

    /// Size the executive's stores to the algorithm's ports.
    pub(crate) fn sync_executive(&mut self, executive: ExecutiveId, algorithm: AlgorithmId) -> Result<()> {
        self.fill_port_information(algorithm)?;
        let declared: Vec<Option<String>> = self
            .node(algorithm)?
            .outputs
            .iter()
            .map(|port| {
                port.information
                    .as_ref()
                    .and_then(|i| i.get_string(exec_keys::data_type_name()))
                    .map(str::to_string)
            })
            .collect();

        let state = self.state_mut(executive)?;
        state.output_information.resize_with(declared.len(), Information::new);
        state.produced.resize(declared.len(), None);
        for (info, data_type) in state.output_information.iter_mut().zip(declared) {
            info.set_option(exec_keys::data_type_name(), data_type);
        }
        Ok(())
    }

    /// Copy each upstream output store into the matching input connection store.
    pub(crate) fn refresh_inputs(&mut self, executive: ExecutiveId, algorithm: AlgorithmId) -> Result<()> {
        let ports: Vec<Vec<OutputPort>> = self
            .node(algorithm)?
            .inputs
            .iter()
            .map(|port| port.connections.clone())
            .collect();

        let inputs = ports
            .iter()
            .map(|connections| {
                connections
                    .iter()
                    .map(|handle| {
                        self.output_information(handle.producer(), handle.index())
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
        self.state_mut(executive)?.input_information = inputs;
        Ok(())
    }

    /// Release flagged upstream outputs once all their consumers are current.
    fn release_upstream_data(&mut self, algorithm: AlgorithmId) -> Result<()> {
        for handle in self.input_handles(algorithm)? {
            let producer = handle.producer();
            if !self.release_data_flag(producer, handle.index()) {
                continue;
            }
            let Some(produced_at) = self.data_time(producer) else {
                continue;
            };
            let consumed = self
                .consumers(producer, handle.index())
                .iter()
                .all(|(consumer, _)| {
                    self.data_time(*consumer)
                        .is_some_and(|time| time > produced_at)
                });
            if !consumed {
                continue;
            }

            let Some(upstream) = self.executive_of(producer) else {
                continue;
            };
            let state = self.state_mut(upstream)?;
            if let Some(info) = state.output_information.get_mut(handle.index()) {
                info.remove(exec_keys::data_object());
            }
            if let Some(slot) = state.produced.get_mut(handle.index()) {
                *slot = None;
            }
            state.data_time.reset();
            tracing::debug!("Released data of {}", handle);
        }
        Ok(())
    }

    /// Send one request to the algorithm, reporting failures on the event bus.
    pub(crate) fn invoke(
        &mut self,
        executive: ExecutiveId,
        algorithm: AlgorithmId,
        request: &Request,
        update_id: UpdateId,
    ) -> Result<()> {
        let label = self.label(algorithm);
        let Pipeline {
            nodes,
            executives,
            events,
            ..
        } = self;
        let node = nodes
            .get_mut(algorithm.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownAlgorithm(algorithm))?;
        let state = executives
            .get_mut(executive.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownExecutive(executive))?;

        let emitter = events.create_emitter(update_id, algorithm);
        let ctx = AlgorithmContext::new(algorithm, &node.parameters, &emitter, &node.abort);
        let started = Instant::now();
        let result = node.algorithm.process_request(
            &ctx,
            request,
            &mut state.input_information,
            &mut state.output_information,
        );
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                tracing::debug!("{} handled {} request in {}ms", label, request.kind(), duration_ms);
                events.emit(PipelineEvent::AlgorithmExecuted {
                    update_id,
                    algorithm,
                    algorithm_type: node.algorithm.algorithm_type().to_string(),
                    request: request.kind(),
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });
                Ok(())
            }
            Err(source) => {
                tracing::error!("{} failed {} request: {}", label, request.kind(), source);
                events.emit(PipelineEvent::RequestFailed {
                    update_id,
                    algorithm,
                    request: request.kind(),
                    error: source.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                Err(PipelineError::Algorithm {
                    algorithm,
                    request: request.kind(),
                    source,
                })
            }
        }
    }

    fn algorithm_pipeline_mtime(
        &self,
        algorithm: AlgorithmId,
        upstream: TimeStamp,
        update_id: UpdateId,
    ) -> Result<TimeStamp> {
        let node = self.node(algorithm)?;
        let emitter = self.events.create_emitter(update_id, algorithm);
        let ctx = AlgorithmContext::new(algorithm, &node.parameters, &emitter, &node.abort);
        let request = Request::new(RequestKind::PipelineModifiedTime, None);
        Ok(node
            .algorithm
            .compute_pipeline_mtime(&ctx, &request, node.mtime, upstream))
    }

    /// Every input connection of `algorithm`, in port then connection order.
    pub(crate) fn input_handles(&self, algorithm: AlgorithmId) -> Result<Vec<OutputPort>> {
        Ok(self
            .node(algorithm)?
            .inputs
            .iter()
            .flat_map(|port| port.connections.iter().cloned())
            .collect())
    }

    pub(crate) fn state(&self, executive: ExecutiveId) -> Result<&ExecutiveState> {
        self.executives
            .get(executive.index())
            .and_then(Option::as_ref)
            .ok_or(PipelineError::UnknownExecutive(executive))
    }

    pub(crate) fn state_mut(&mut self, executive: ExecutiveId) -> Result<&mut ExecutiveState> {
        self.executives
            .get_mut(executive.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownExecutive(executive))
    }

    pub(crate) fn state_of(&self, algorithm: AlgorithmId) -> Option<&ExecutiveState> {
        let executive = self.executive_of(algorithm)?;
        self.state(executive).ok()
    }
}

pub(crate) fn extent_type_of(info: &Information) -> ExtentType {
    info.get_integer(streaming::extent_type())
        .and_then(ExtentType::from_code)
        .unwrap_or(ExtentType::Structured)
}
