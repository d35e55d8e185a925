use crate::executive::{extent_type_of, Pass};
use crate::runtime::Pipeline;
use pipecore::keys::streaming;
use pipecore::{
    AlgorithmId, ConfigurationError, ExecutiveId, Extent, ExtentType, Information, PieceRequest,
    Request, RequestKind, Result,
};
use uuid::Uuid;

impl Pipeline {
    /// Negotiate update extents upstream from output `port` of `algorithm`.
    ///
    /// Algorithms under a demand-driven executive are left alone; they always
    /// produce their whole extent.
    pub fn propagate_update_extent(&mut self, algorithm: AlgorithmId, port: usize) -> Result<()> {
        self.check_output_port(algorithm, port, "propagate the update extent of")?;
        let update_id = Uuid::new_v4();
        self.mtime_pass(algorithm, &mut Pass::new(update_id))?;
        self.propagate_pass(algorithm, Some(port), &mut Pass::new(update_id))
    }

    pub(crate) fn propagate_pass(
        &mut self,
        algorithm: AlgorithmId,
        port: Option<usize>,
        pass: &mut Pass,
    ) -> Result<()> {
        let executive = self.executive(algorithm)?;
        if !self.executive_kind(executive)?.is_streaming() {
            return Ok(());
        }
        pass.enter(executive, algorithm)?;
        let result = self.propagate_step(executive, algorithm, port, pass);
        pass.leave(executive);
        result
    }

    fn propagate_step(
        &mut self,
        executive: ExecutiveId,
        algorithm: AlgorithmId,
        port: Option<usize>,
        pass: &mut Pass,
    ) -> Result<()> {
        match port {
            Some(port) => tracing::debug!("PropagateUpdateExtent for output {}", port),
            None => tracing::debug!("PropagateUpdateExtent for {} without outputs", algorithm),
        }
        self.sync_executive(executive, algorithm)?;
        self.initialize_update_requests(executive)?;
        self.validate_inputs(algorithm)?;
        if !self.need_to_execute_data(executive, algorithm)? {
            return Ok(());
        }

        self.refresh_inputs(executive, algorithm)?;
        // A failed request stops negotiation here; nothing upstream is asked.
        self.invoke(
            executive,
            algorithm,
            &Request::new(RequestKind::UpdateExtent, port),
            pass.update_id,
        )?;

        let connections: Vec<(usize, usize, crate::OutputPort)> = self
            .node(algorithm)?
            .inputs
            .iter()
            .enumerate()
            .flat_map(|(input_port, state)| {
                state
                    .connections
                    .iter()
                    .enumerate()
                    .map(move |(connection, handle)| (input_port, connection, handle.clone()))
            })
            .collect();

        for (input_port, connection, handle) in connections {
            let producer = handle.producer();
            let upstream = self.executive(producer)?;
            if !self.executive_kind(upstream)?.is_streaming() {
                tracing::debug!(
                    "{} is not streaming; it will produce its whole extent",
                    self.label(producer)
                );
                continue;
            }

            let request = self
                .state(executive)?
                .input_information
                .get(input_port)
                .and_then(|port| port.get(connection))
                .cloned()
                .unwrap_or_default();
            self.sync_executive(upstream, producer)?;
            let shared = !pass.first_request(upstream, handle.index());
            if let Some(output) = self
                .state_mut(upstream)?
                .output_information
                .get_mut(handle.index())
            {
                if shared {
                    merge_request(output, &request);
                } else {
                    copy_request(output, &request);
                }
            }
            self.propagate_pass(producer, Some(handle.index()), pass)?;
        }
        Ok(())
    }

    /// Request a sub-extent of output `port` for the next update.
    pub fn set_update_extent(&mut self, algorithm: AlgorithmId, port: usize, extent: Extent) -> Result<()> {
        let executive = self.streaming_executive(algorithm, port, "set the update extent of")?;
        let info = &mut self.state_mut(executive)?.output_information[port];
        info.set(streaming::update_extent(), extent);
        info.remove(streaming::update_piece_number());
        info.remove(streaming::update_number_of_pieces());
        info.remove(streaming::update_number_of_ghost_levels());
        Ok(())
    }

    /// Request one piece of output `port` for the next update.
    pub fn set_update_piece(
        &mut self,
        algorithm: AlgorithmId,
        port: usize,
        piece: PieceRequest,
    ) -> Result<()> {
        let executive = self.streaming_executive(algorithm, port, "set the update piece of")?;
        let info = &mut self.state_mut(executive)?.output_information[port];
        piece.store(info);
        info.remove(streaming::update_extent());
        Ok(())
    }

    /// Request everything output `port` can produce.
    pub fn set_update_extent_to_whole_extent(&mut self, algorithm: AlgorithmId, port: usize) -> Result<()> {
        self.update_information(algorithm)?;
        let executive = self.streaming_executive(algorithm, port, "set the update extent of")?;
        let info = &mut self.state_mut(executive)?.output_information[port];
        match extent_type_of(info) {
            ExtentType::Piece => PieceRequest::new(0, 1, 0).store(info),
            ExtentType::Structured => {
                let whole = Extent::from_info(info, streaming::whole_extent()).ok_or_else(|| {
                    ConfigurationError::Invalid(format!(
                        "{} publishes no whole extent on output {}",
                        algorithm, port
                    ))
                })?;
                info.set(streaming::update_extent(), whole);
                info.remove(streaming::update_piece_number());
                info.remove(streaming::update_number_of_pieces());
                info.remove(streaming::update_number_of_ghost_levels());
            }
        }
        Ok(())
    }

    /// Update every output of `algorithm` over its whole extent.
    pub fn update_whole_extent(&mut self, algorithm: AlgorithmId) -> Result<()> {
        self.update_information(algorithm)?;
        let executive = self.executive(algorithm)?;
        if self.executive_kind(executive)?.is_streaming() {
            for port in 0..self.number_of_output_ports(algorithm)? {
                self.set_update_extent_to_whole_extent(algorithm, port)?;
            }
        }
        self.update(algorithm)
    }

    pub fn update_extent(&self, algorithm: AlgorithmId, port: usize) -> Option<Extent> {
        Extent::from_info(self.output_information(algorithm, port)?, streaming::update_extent())
    }

    pub fn update_piece(&self, algorithm: AlgorithmId, port: usize) -> Option<PieceRequest> {
        PieceRequest::from_info(self.output_information(algorithm, port)?)
    }

    pub fn whole_extent(&self, algorithm: AlgorithmId, port: usize) -> Option<Extent> {
        Extent::from_info(self.output_information(algorithm, port)?, streaming::whole_extent())
    }

    pub fn maximum_number_of_pieces(&self, algorithm: AlgorithmId, port: usize) -> Option<i64> {
        self.output_information(algorithm, port)?
            .get_integer(streaming::maximum_number_of_pieces())
    }

    /// Extent the data currently held on output `port` was produced for.
    pub fn last_executed_extent(&self, algorithm: AlgorithmId, port: usize) -> Option<Extent> {
        self.state_of(algorithm)?
            .produced
            .get(port)?
            .as_ref()?
            .extent
    }

    fn streaming_executive(
        &mut self,
        algorithm: AlgorithmId,
        port: usize,
        action: &str,
    ) -> Result<ExecutiveId> {
        self.check_output_port(algorithm, port, action)?;
        let executive = self.executive(algorithm)?;
        if !self.executive_kind(executive)?.is_streaming() {
            let err = ConfigurationError::Invalid(format!(
                "cannot {} {}: its executive does not stream",
                action,
                self.label(algorithm)
            ));
            tracing::error!("{}", err);
            return Err(err.into());
        }
        self.sync_executive(executive, algorithm)?;
        Ok(executive)
    }
}

fn copy_request(output: &mut Information, request: &Information) {
    for key in streaming::request_keys() {
        output.copy_entry(request, key);
    }
}

/// Widen the request already written to a shared output so it also covers `request`.
///
/// Structured requests grow to their bounding extent. Piece requests cannot
/// be combined, so the latest one replaces the earlier.
fn merge_request(output: &mut Information, request: &Information) {
    if extent_type_of(output) == ExtentType::Piece {
        if PieceRequest::from_info(output) != PieceRequest::from_info(request) {
            tracing::warn!("Shared output received different piece requests; keeping the latest");
        }
        copy_request(output, request);
        return;
    }

    let whole = Extent::from_info(output, streaming::whole_extent());
    let requested = |info: &Information| match Extent::from_info(info, streaming::update_extent()) {
        Some(extent) => Some(extent),
        None => match PieceRequest::from_info(info) {
            Some(piece) => whole.map(|whole| piece.to_extent(&whole)),
            None => whole,
        },
    };
    match (requested(output), requested(request)) {
        (Some(held), Some(incoming)) => {
            output.set(streaming::update_extent(), held.union(&incoming));
            output.remove(streaming::update_piece_number());
            output.remove(streaming::update_number_of_pieces());
            output.remove(streaming::update_number_of_ghost_levels());
        }
        _ => copy_request(output, request),
    }
}
