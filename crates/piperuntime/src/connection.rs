use crate::runtime::Pipeline;
use pipecore::keys::{algorithm as port_keys, executive};
use pipecore::{
    AlgorithmId, ConfigurationError, DataHandle, Information, PipelineError, RequestKind, Result,
};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one output port of one algorithm.
///
/// Handles are created once per output port and shared by every consumer
/// connected to it, so `Arc::strong_count` reflects how many connections
/// (plus the producer's own cache) hold the port.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AlgorithmOutput {
    pipeline: Uuid,
    producer: AlgorithmId,
    index: usize,
}

impl AlgorithmOutput {
    pub fn pipeline(&self) -> Uuid {
        self.pipeline
    }

    pub fn producer(&self) -> AlgorithmId {
        self.producer
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for AlgorithmOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer, self.index)
    }
}

pub type OutputPort = Arc<AlgorithmOutput>;

#[derive(Default)]
pub(crate) struct InputPortState {
    pub(crate) connections: Vec<OutputPort>,
    pub(crate) information: Option<Information>,
}

#[derive(Default)]
pub(crate) struct OutputPortState {
    pub(crate) handle: Option<OutputPort>,
    pub(crate) information: Option<Information>,
    /// (consumer, input port), one entry per connection.
    pub(crate) consumers: Vec<(AlgorithmId, usize)>,
    pub(crate) release_data: bool,
}

impl Pipeline {
    pub fn number_of_input_ports(&self, id: AlgorithmId) -> Result<usize> {
        Ok(self.node(id)?.inputs.len())
    }

    pub fn number_of_output_ports(&self, id: AlgorithmId) -> Result<usize> {
        Ok(self.node(id)?.outputs.len())
    }

    /// Resize the input ports. Connections on removed ports are released.
    pub fn set_number_of_input_ports(&mut self, id: AlgorithmId, count: usize) -> Result<()> {
        let removed: Vec<(usize, Vec<OutputPort>)> = {
            let node = self.node_mut(id)?;
            if count == node.inputs.len() {
                return Ok(());
            }
            let removed = if count < node.inputs.len() {
                node.inputs
                    .drain(count..)
                    .enumerate()
                    .map(|(offset, port)| (count + offset, port.connections))
                    .collect()
            } else {
                node.inputs.resize_with(count, InputPortState::default);
                Vec::new()
            };
            node.modified();
            removed
        };

        for (port, connections) in removed {
            for handle in connections {
                self.unlink_consumer(&handle, id, port);
            }
        }
        Ok(())
    }

    /// Resize the output ports. Consumers of removed ports are disconnected.
    pub fn set_number_of_output_ports(&mut self, id: AlgorithmId, count: usize) -> Result<()> {
        let current = self.node(id)?.outputs.len();
        if count == current {
            return Ok(());
        }
        for port in count..current {
            self.disconnect_consumers(id, port)?;
        }
        let node = self.node_mut(id)?;
        node.outputs.resize_with(count, OutputPortState::default);
        node.modified();
        Ok(())
    }

    /// Requirements of an input port, filled by the algorithm on first use.
    pub fn input_port_information(&mut self, id: AlgorithmId, port: usize) -> Result<&Information> {
        self.check_input_port(id, port, "get information for")?;
        self.fill_port_information(id)?;
        let node = self.node(id)?;
        node.inputs[port]
            .information
            .as_ref()
            .ok_or(PipelineError::UnknownAlgorithm(id))
    }

    /// Declared products of an output port, filled by the algorithm on first use.
    pub fn output_port_information(
        &mut self,
        id: AlgorithmId,
        port: usize,
    ) -> Result<&Information> {
        self.check_output_port(id, port, "get information for")?;
        self.fill_port_information(id)?;
        let node = self.node(id)?;
        node.outputs[port]
            .information
            .as_ref()
            .ok_or(PipelineError::UnknownAlgorithm(id))
    }

    /// Shared handle for an output port, suitable for connecting consumers.
    pub fn output_port(&mut self, id: AlgorithmId, index: usize) -> Result<OutputPort> {
        self.check_output_port(id, index, "get")?;
        let pipeline = self.id;
        let node = self.node_mut(id)?;
        let handle = node.outputs[index].handle.get_or_insert_with(|| {
            Arc::new(AlgorithmOutput {
                pipeline,
                producer: id,
                index,
            })
        });
        Ok(handle.clone())
    }

    /// Replace every connection on `port` with `input`, or clear it on `None`.
    pub fn set_input_connection(
        &mut self,
        consumer: AlgorithmId,
        port: usize,
        input: Option<&OutputPort>,
    ) -> Result<()> {
        self.check_input_port(consumer, port, "connect")?;
        if let Some(handle) = input {
            self.check_handle(consumer, handle)?;
        }

        let previous = std::mem::take(&mut self.node_mut(consumer)?.inputs[port].connections);
        for handle in &previous {
            self.unlink_consumer(handle, consumer, port);
        }
        drop(previous);

        if let Some(handle) = input {
            self.link(consumer, port, handle)?;
        }
        self.node_mut(consumer)?.modified();
        Ok(())
    }

    /// Append a connection to `port` without disturbing existing ones.
    pub fn add_input_connection(
        &mut self,
        consumer: AlgorithmId,
        port: usize,
        input: &OutputPort,
    ) -> Result<()> {
        self.check_input_port(consumer, port, "add a connection to")?;
        self.check_handle(consumer, input)?;
        self.link(consumer, port, input)?;
        self.node_mut(consumer)?.modified();
        Ok(())
    }

    /// Remove the first connection on `port` that refers to `input`.
    ///
    /// Returns whether a connection was removed.
    pub fn remove_input_connection(
        &mut self,
        consumer: AlgorithmId,
        port: usize,
        input: &OutputPort,
    ) -> Result<bool> {
        self.check_input_port(consumer, port, "remove a connection from")?;
        let node = self.node_mut(consumer)?;
        let connections = &mut node.inputs[port].connections;
        let Some(position) = connections.iter().position(|c| **c == **input) else {
            tracing::debug!("{} is not connected to {} port {}", input, consumer, port);
            return Ok(false);
        };
        let handle = connections.remove(position);
        node.modified();
        self.unlink_consumer(&handle, consumer, port);
        Ok(true)
    }

    /// Replace (or, with `None`, remove) the connection at `index` on `port`.
    pub fn set_nth_input_connection(
        &mut self,
        consumer: AlgorithmId,
        port: usize,
        index: usize,
        input: Option<&OutputPort>,
    ) -> Result<()> {
        self.check_input_port(consumer, port, "replace a connection on")?;
        let count = self.node(consumer)?.inputs[port].connections.len();
        if index >= count {
            let err = ConfigurationError::ConnectionIndexOutOfRange {
                algorithm: consumer,
                port,
                index,
                count,
            };
            tracing::error!("{}", err);
            return Err(err.into());
        }
        if let Some(handle) = input {
            self.check_handle(consumer, handle)?;
        }

        let old = self.node_mut(consumer)?.inputs[port].connections.remove(index);
        self.unlink_consumer(&old, consumer, port);
        if let Some(handle) = input {
            self.node_mut(consumer)?.inputs[port]
                .connections
                .insert(index, handle.clone());
            self.link_producer(handle, consumer, port)?;
        }
        self.node_mut(consumer)?.modified();
        Ok(())
    }

    /// Disconnect every input port of `consumer`.
    pub fn remove_all_inputs(&mut self, consumer: AlgorithmId) -> Result<()> {
        let ports = self.node(consumer)?.inputs.len();
        for port in 0..ports {
            self.set_input_connection(consumer, port, None)?;
        }
        Ok(())
    }

    pub fn input_connection(
        &self,
        id: AlgorithmId,
        port: usize,
        index: usize,
    ) -> Option<OutputPort> {
        self.nodes
            .get(id.index())?
            .as_ref()?
            .inputs
            .get(port)?
            .connections
            .get(index)
            .cloned()
    }

    /// Number of connections on `port`; 0 (and an error log) when out of range.
    pub fn number_of_input_connections(&self, id: AlgorithmId, port: usize) -> usize {
        match self.check_input_port(id, port, "count connections on") {
            Ok(()) => self
                .node(id)
                .map(|node| node.inputs[port].connections.len())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub fn total_number_of_input_connections(&self, id: AlgorithmId) -> usize {
        self.node(id)
            .map(|node| node.inputs.iter().map(|p| p.connections.len()).sum())
            .unwrap_or(0)
    }

    /// Map a linear index over all connections to (port, index within port).
    pub fn convert_total_input_to_port_connection(
        &self,
        id: AlgorithmId,
        total: usize,
    ) -> Option<(usize, usize)> {
        let node = self.node(id).ok()?;
        let mut remaining = total;
        for (port, state) in node.inputs.iter().enumerate() {
            if remaining < state.connections.len() {
                return Some((port, remaining));
            }
            remaining -= state.connections.len();
        }
        None
    }

    /// Consumers of an output port as (algorithm, input port), one per connection.
    pub fn consumers(&self, id: AlgorithmId, port: usize) -> Vec<(AlgorithmId, usize)> {
        self.node(id)
            .ok()
            .and_then(|node| node.outputs.get(port))
            .map(|state| state.consumers.clone())
            .unwrap_or_default()
    }

    /// Release an output's data once all of its consumers have used it.
    pub fn set_release_data_flag(&mut self, id: AlgorithmId, port: usize, release: bool) -> Result<()> {
        self.check_output_port(id, port, "set the release flag on")?;
        self.node_mut(id)?.outputs[port].release_data = release;
        Ok(())
    }

    pub fn release_data_flag(&self, id: AlgorithmId, port: usize) -> bool {
        self.node(id)
            .ok()
            .and_then(|node| node.outputs.get(port))
            .map(|state| state.release_data)
            .unwrap_or(false)
    }

    /// Data object currently held by an output port.
    pub fn output_data_object(&self, id: AlgorithmId, port: usize) -> Option<DataHandle> {
        self.output_information(id, port)?
            .get_data_object(executive::data_object())
            .cloned()
    }

    /// Check connection counts and data types on every input port.
    pub(crate) fn validate_inputs(&mut self, id: AlgorithmId) -> Result<()> {
        self.fill_port_information(id)?;
        self.input_count_is_valid(id)?;
        self.input_type_is_valid(id)
    }

    fn input_count_is_valid(&self, id: AlgorithmId) -> Result<()> {
        let node = self.node(id)?;
        for (port, state) in node.inputs.iter().enumerate() {
            let info = state.information.as_ref();
            let optional = info.is_some_and(|i| i.get_flag(port_keys::input_is_optional()));
            let repeatable = info.is_some_and(|i| i.get_flag(port_keys::input_is_repeatable()));
            let connections = state.connections.len();

            let err = if connections == 0 && !optional {
                Some(ConfigurationError::NotOptional {
                    algorithm: id,
                    port,
                })
            } else if connections > 1 && !repeatable {
                Some(ConfigurationError::NotRepeatable {
                    algorithm: id,
                    port,
                    connections,
                })
            } else {
                None
            };
            if let Some(err) = err {
                tracing::error!("{} ({}): {}", self.label(id), node.algorithm.algorithm_type(), err);
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn input_type_is_valid(&mut self, id: AlgorithmId) -> Result<()> {
        let mut checks = Vec::new();
        {
            let node = self.node(id)?;
            for (port, state) in node.inputs.iter().enumerate() {
                let required = state
                    .information
                    .as_ref()
                    .and_then(|i| i.get_string(port_keys::input_required_data_type()));
                let Some(required) = required else {
                    continue;
                };
                for (connection, handle) in state.connections.iter().enumerate() {
                    checks.push((port, connection, handle.clone(), required.to_string()));
                }
            }
        }

        for (port, connection, handle, required) in checks {
            let actual = self
                .output_port_information(handle.producer, handle.index)?
                .get_string(executive::data_type_name())
                .map(str::to_string);

            let err = match actual {
                None => Some(ConfigurationError::MissingDataType {
                    algorithm: id,
                    port,
                    connection,
                    required,
                }),
                Some(actual) if !self.types.is_type_of(&actual, &required) => {
                    Some(ConfigurationError::InputTypeMismatch {
                        algorithm: id,
                        port,
                        connection,
                        actual,
                        required,
                    })
                }
                Some(_) => None,
            };
            if let Some(err) = err {
                tracing::error!("{}: {}", self.label(id), err);
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Run the algorithm's fill hooks for any port not yet described.
    pub(crate) fn fill_port_information(&mut self, id: AlgorithmId) -> Result<()> {
        let node = self.node_mut(id)?;
        for port in 0..node.inputs.len() {
            if node.inputs[port].information.is_some() {
                continue;
            }
            let mut info = Information::new();
            node.algorithm
                .fill_input_port_information(port, &mut info)
                .map_err(|source| PipelineError::Algorithm {
                    algorithm: id,
                    request: RequestKind::Information,
                    source,
                })?;
            node.inputs[port].information = Some(info);
        }
        for port in 0..node.outputs.len() {
            if node.outputs[port].information.is_some() {
                continue;
            }
            let mut info = Information::new();
            node.algorithm
                .fill_output_port_information(port, &mut info)
                .map_err(|source| PipelineError::Algorithm {
                    algorithm: id,
                    request: RequestKind::Information,
                    source,
                })?;
            node.outputs[port].information = Some(info);
        }
        Ok(())
    }

    /// Drop every connection fed by output `port` of `producer`.
    pub(crate) fn disconnect_consumers(&mut self, producer: AlgorithmId, port: usize) -> Result<()> {
        let consumers = {
            let node = self.node_mut(producer)?;
            let Some(state) = node.outputs.get_mut(port) else {
                return Ok(());
            };
            state.handle = None;
            std::mem::take(&mut state.consumers)
        };
        for (consumer, input_port) in consumers {
            if let Ok(node) = self.node_mut(consumer) {
                if let Some(state) = node.inputs.get_mut(input_port) {
                    state
                        .connections
                        .retain(|c| !(c.producer == producer && c.index == port));
                }
                node.modified();
            }
        }
        Ok(())
    }

    pub(crate) fn check_input_port(&self, id: AlgorithmId, port: usize, action: &str) -> Result<()> {
        let count = self.node(id)?.inputs.len();
        if port < count {
            return Ok(());
        }
        let err = ConfigurationError::PortIndexOutOfRange {
            algorithm: id,
            action: action.to_string(),
            direction: "input",
            index: port,
            count,
        };
        tracing::error!("{}", err);
        Err(err.into())
    }

    pub(crate) fn check_output_port(&self, id: AlgorithmId, port: usize, action: &str) -> Result<()> {
        let count = self.node(id)?.outputs.len();
        if port < count {
            return Ok(());
        }
        let err = ConfigurationError::PortIndexOutOfRange {
            algorithm: id,
            action: action.to_string(),
            direction: "output",
            index: port,
            count,
        };
        tracing::error!("{}", err);
        Err(err.into())
    }

    fn check_handle(&self, consumer: AlgorithmId, handle: &OutputPort) -> Result<()> {
        if handle.pipeline != self.id {
            let err = ConfigurationError::Invalid(format!(
                "output port {} belongs to another pipeline",
                handle
            ));
            tracing::error!("{}", err);
            return Err(err.into());
        }
        self.check_output_port(handle.producer, handle.index, "connect from")?;
        if self.config.reject_cycles_on_connect && self.would_create_cycle(handle.producer, consumer) {
            let err = ConfigurationError::CycleRejected {
                producer: handle.producer,
                consumer,
            };
            tracing::error!("{}", err);
            return Err(err.into());
        }
        Ok(())
    }

    fn link(&mut self, consumer: AlgorithmId, port: usize, handle: &OutputPort) -> Result<()> {
        self.node_mut(consumer)?.inputs[port]
            .connections
            .push(handle.clone());
        self.link_producer(handle, consumer, port)
    }

    fn link_producer(&mut self, handle: &OutputPort, consumer: AlgorithmId, port: usize) -> Result<()> {
        let producer = self.node_mut(handle.producer)?;
        producer.outputs[handle.index].consumers.push((consumer, port));
        Ok(())
    }

    fn unlink_consumer(&mut self, handle: &OutputPort, consumer: AlgorithmId, port: usize) {
        let Ok(producer) = self.node_mut(handle.producer) else {
            return;
        };
        if let Some(state) = producer.outputs.get_mut(handle.index) {
            if let Some(position) = state
                .consumers
                .iter()
                .position(|entry| *entry == (consumer, port))
            {
                state.consumers.remove(position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::test_support::{CountingFilter, CountingSource};
    use crate::{Pipeline, RuntimeConfig};
    use pipecore::{ConfigurationError, PipelineError};
    use std::sync::Arc;

    fn source_and_filter(pipeline: &mut Pipeline) -> (pipecore::AlgorithmId, pipecore::AlgorithmId) {
        let source = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let filter = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        (source, filter)
    }

    #[test]
    fn test_output_port_handle_is_cached() {
        let mut pipeline = Pipeline::new();
        let (source, _) = source_and_filter(&mut pipeline);
        let a = pipeline.output_port(source, 0).unwrap();
        let b = pipeline.output_port(source, 0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_out_of_range_port_is_reported() {
        let mut pipeline = Pipeline::new();
        let (source, filter) = source_and_filter(&mut pipeline);
        let port = pipeline.output_port(source, 0).unwrap();

        let err = pipeline.set_input_connection(filter, 3, Some(&port)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigurationError::PortIndexOutOfRange { index: 3, count: 1, .. })
        ));
        assert_eq!(pipeline.number_of_input_connections(filter, 3), 0);
        assert!(pipeline.output_port(source, 1).is_err());
    }

    #[test]
    fn test_add_and_remove_connections() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let b = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let sum = pipeline.add_algorithm(Box::new(CountingFilter {
            repeatable: true,
            ..Default::default()
        }));
        let pa = pipeline.output_port(a, 0).unwrap();
        let pb = pipeline.output_port(b, 0).unwrap();

        pipeline.add_input_connection(sum, 0, &pa).unwrap();
        pipeline.add_input_connection(sum, 0, &pb).unwrap();
        assert_eq!(pipeline.number_of_input_connections(sum, 0), 2);
        assert_eq!(pipeline.total_number_of_input_connections(sum), 2);
        assert_eq!(pipeline.convert_total_input_to_port_connection(sum, 1), Some((0, 1)));
        assert_eq!(pipeline.convert_total_input_to_port_connection(sum, 2), None);

        assert!(pipeline.remove_input_connection(sum, 0, &pa).unwrap());
        assert!(!pipeline.remove_input_connection(sum, 0, &pa).unwrap());
        let remaining = pipeline.input_connection(sum, 0, 0).unwrap();
        assert!(Arc::ptr_eq(&remaining, &pb));
        assert!(pipeline.consumers(a, 0).is_empty());
        assert_eq!(pipeline.consumers(b, 0), vec![(sum, 0)]);
    }

    #[test]
    fn test_connection_bumps_consumer_mtime() {
        let mut pipeline = Pipeline::new();
        let (source, filter) = source_and_filter(&mut pipeline);
        let before = pipeline.algorithm_mtime(filter).unwrap();
        let port = pipeline.output_port(source, 0).unwrap();
        pipeline.set_input_connection(filter, 0, Some(&port)).unwrap();
        assert!(pipeline.algorithm_mtime(filter).unwrap() > before);
    }

    #[test]
    fn test_shrinking_input_ports_releases_connections() {
        let mut pipeline = Pipeline::new();
        let (source, filter) = source_and_filter(&mut pipeline);
        pipeline.set_number_of_input_ports(filter, 2).unwrap();
        let port = pipeline.output_port(source, 0).unwrap();
        pipeline.set_input_connection(filter, 1, Some(&port)).unwrap();
        assert_eq!(Arc::strong_count(&port), 3);

        pipeline.set_number_of_input_ports(filter, 1).unwrap();
        assert_eq!(Arc::strong_count(&port), 2);
        assert!(pipeline.consumers(source, 0).is_empty());
    }

    #[test]
    fn test_set_nth_connection_replaces_in_place() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let b = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let filter = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let pa = pipeline.output_port(a, 0).unwrap();
        let pb = pipeline.output_port(b, 0).unwrap();
        pipeline.set_input_connection(filter, 0, Some(&pa)).unwrap();

        pipeline.set_nth_input_connection(filter, 0, 0, Some(&pb)).unwrap();
        assert!(Arc::ptr_eq(&pipeline.input_connection(filter, 0, 0).unwrap(), &pb));
        assert!(pipeline.consumers(a, 0).is_empty());

        let err = pipeline.set_nth_input_connection(filter, 0, 4, Some(&pa)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigurationError::ConnectionIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let mut other = Pipeline::new();
        let foreign_source = other.add_algorithm(Box::new(CountingSource::default()));
        let foreign = other.output_port(foreign_source, 0).unwrap();

        let mut pipeline = Pipeline::new();
        let (_, filter) = source_and_filter(&mut pipeline);
        assert!(pipeline.set_input_connection(filter, 0, Some(&foreign)).is_err());
        assert_eq!(pipeline.number_of_input_connections(filter, 0), 0);
    }

    #[test]
    fn test_cycle_rejected_on_connect_when_enabled() {
        let mut pipeline = Pipeline::with_config(RuntimeConfig {
            reject_cycles_on_connect: true,
            ..Default::default()
        });
        let a = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let b = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let pa = pipeline.output_port(a, 0).unwrap();
        let pb = pipeline.output_port(b, 0).unwrap();
        pipeline.set_input_connection(b, 0, Some(&pa)).unwrap();

        let err = pipeline.set_input_connection(a, 0, Some(&pb)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigurationError::CycleRejected { .. })
        ));
        assert_eq!(pipeline.number_of_input_connections(a, 0), 0);
    }

    #[test]
    fn test_port_information_is_filled_lazily() {
        let mut pipeline = Pipeline::new();
        let (_, filter) = source_and_filter(&mut pipeline);
        let info = pipeline.input_port_information(filter, 0).unwrap();
        assert_eq!(
            info.get_string(pipecore::keys::algorithm::input_required_data_type()),
            Some("DataSet")
        );
    }
}
