use crate::connection::{InputPortState, OutputPortState};
use crate::executive::{ExecutiveKind, ExecutiveState};
use pipecore::keys::algorithm as port_keys;
use pipecore::{
    Algorithm, AlgorithmId, ConfigurationError, EventBus, ExecutiveId, InfoValue, Information,
    Key, PipelineError, PipelineEvent, Result, TimeStamp, TypeHierarchy,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use uuid::Uuid;

/// Configuration for a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Executive kind created for algorithms that have none yet.
    pub default_executive: ExecutiveKind,
    pub event_buffer_size: usize,
    /// Refuse connections that would close a cycle.
    pub reject_cycles_on_connect: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_executive: ExecutiveKind::StreamingDemandDriven,
            event_buffer_size: 1000,
            reject_cycles_on_connect: false,
        }
    }
}

/// Field an input array is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAssociation {
    Points,
    Cells,
    None,
    PointsThenCells,
}

impl FieldAssociation {
    pub fn code(&self) -> i64 {
        match self {
            FieldAssociation::Points => 0,
            FieldAssociation::Cells => 1,
            FieldAssociation::None => 2,
            FieldAssociation::PointsThenCells => 3,
        }
    }
}

/// How an input array is selected: by name or by attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArraySelector {
    Name(String),
    Attribute(i64),
}

pub(crate) struct AlgorithmNode {
    pub(crate) algorithm: Box<dyn Algorithm>,
    pub(crate) name: Option<String>,
    pub(crate) parameters: Information,
    pub(crate) mtime: TimeStamp,
    pub(crate) inputs: Vec<InputPortState>,
    pub(crate) outputs: Vec<OutputPortState>,
    pub(crate) executive: Option<ExecutiveId>,
    pub(crate) abort: Arc<AtomicBool>,
}

impl AlgorithmNode {
    pub(crate) fn modified(&mut self) {
        self.mtime.modified();
    }
}

/// Arena of algorithms and executives forming one pipeline graph
///
/// Algorithms and executives are addressed by stable ids; connections refer
/// to producers by id, so the graph holds no ownership cycles.
pub struct Pipeline {
    pub(crate) id: Uuid,
    pub(crate) config: RuntimeConfig,
    pub(crate) nodes: Vec<Option<AlgorithmNode>>,
    pub(crate) executives: Vec<Option<ExecutiveState>>,
    pub(crate) types: TypeHierarchy,
    pub(crate) events: EventBus,
}

impl Pipeline {
    /// Create a new pipeline with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new pipeline with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        pipecore::keys::register_all();
        let events = EventBus::new(config.event_buffer_size);
        Self {
            id: Uuid::new_v4(),
            config,
            nodes: Vec::new(),
            executives: Vec::new(),
            types: TypeHierarchy::new(),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn data_types(&self) -> &TypeHierarchy {
        &self.types
    }

    pub fn data_types_mut(&mut self) -> &mut TypeHierarchy {
        &mut self.types
    }

    /// Subscribe to update events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn add_algorithm(&mut self, algorithm: Box<dyn Algorithm>) -> AlgorithmId {
        let id = AlgorithmId::new(self.nodes.len());
        let inputs = (0..algorithm.number_of_input_ports())
            .map(|_| InputPortState::default())
            .collect();
        let outputs = (0..algorithm.number_of_output_ports())
            .map(|_| OutputPortState::default())
            .collect();
        let mut node = AlgorithmNode {
            algorithm,
            name: None,
            parameters: Information::new(),
            mtime: TimeStamp::NEVER,
            inputs,
            outputs,
            executive: None,
            abort: Arc::new(AtomicBool::new(false)),
        };
        node.modified();
        tracing::debug!(
            "Added {} ({})",
            id,
            node.algorithm.algorithm_type()
        );
        self.nodes.push(Some(node));
        id
    }

    pub fn add_named_algorithm(
        &mut self,
        name: impl Into<String>,
        algorithm: Box<dyn Algorithm>,
    ) -> AlgorithmId {
        let id = self.add_algorithm(algorithm);
        if let Some(node) = self.nodes[id.index()].as_mut() {
            node.name = Some(name.into());
        }
        id
    }

    /// Remove an algorithm, severing every connection to and from it.
    pub fn remove_algorithm(&mut self, id: AlgorithmId) -> Result<Box<dyn Algorithm>> {
        self.node(id)?;
        self.remove_all_inputs(id)?;
        for port in 0..self.node(id)?.outputs.len() {
            self.disconnect_consumers(id, port)?;
        }
        let node = self.nodes[id.index()]
            .take()
            .ok_or(PipelineError::UnknownAlgorithm(id))?;
        if let Some(exec) = node.executive {
            if let Some(slot) = self.executives.get_mut(exec.index()) {
                *slot = None;
            }
        }
        tracing::debug!("Removed {}", id);
        Ok(node.algorithm)
    }

    pub fn contains(&self, id: AlgorithmId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    pub fn algorithm_ids(&self) -> impl Iterator<Item = AlgorithmId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| AlgorithmId::new(index))
    }

    pub fn algorithm(&self, id: AlgorithmId) -> Result<&dyn Algorithm> {
        Ok(self.node(id)?.algorithm.as_ref())
    }

    pub fn algorithm_type(&self, id: AlgorithmId) -> Result<&str> {
        Ok(self.node(id)?.algorithm.algorithm_type())
    }

    pub fn name(&self, id: AlgorithmId) -> Option<&str> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .and_then(|node| node.name.as_deref())
    }

    pub fn find_by_name(&self, name: &str) -> Option<AlgorithmId> {
        self.algorithm_ids()
            .find(|id| self.name(*id) == Some(name))
    }

    /// Display label: the name if one was given, otherwise the id.
    pub fn label(&self, id: AlgorithmId) -> String {
        self.name(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    /// Typed read access to a concrete algorithm.
    pub fn downcast_ref<T: Algorithm>(&self, id: AlgorithmId) -> Option<&T> {
        let node = self.nodes.get(id.index())?.as_ref()?;
        (*node.algorithm).as_any().downcast_ref::<T>()
    }

    /// Mutate a concrete algorithm's parameters, marking it modified.
    pub fn configure<T: Algorithm, R>(
        &mut self,
        id: AlgorithmId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        let node = self.node_mut(id)?;
        let type_name = node.algorithm.algorithm_type().to_string();
        let algorithm = (*node.algorithm)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| {
                ConfigurationError::Invalid(format!(
                    "{} ({}) is not a {}",
                    id,
                    type_name,
                    std::any::type_name::<T>()
                ))
            })?;
        let result = f(algorithm);
        node.modified();
        Ok(result)
    }

    /// Mark an algorithm as modified so its outputs are regenerated.
    pub fn modified(&mut self, id: AlgorithmId) -> Result<()> {
        self.node_mut(id)?.modified();
        Ok(())
    }

    pub fn algorithm_mtime(&self, id: AlgorithmId) -> Result<TimeStamp> {
        Ok(self.node(id)?.mtime)
    }

    /// Algorithm-level information (parameters and input-array selections).
    pub fn parameters(&self, id: AlgorithmId) -> Result<&Information> {
        Ok(&self.node(id)?.parameters)
    }

    pub fn set_parameter(
        &mut self,
        id: AlgorithmId,
        key: Key,
        value: impl Into<InfoValue>,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        node.parameters.set(key, value);
        node.modified();
        Ok(())
    }

    /// Select the array the algorithm processes as its `idx`-th input array.
    pub fn set_input_array_to_process(
        &mut self,
        id: AlgorithmId,
        idx: usize,
        port: usize,
        connection: usize,
        association: FieldAssociation,
        selector: ArraySelector,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        let mut selection = Information::new();
        selection.set(port_keys::input_port(), port);
        selection.set(port_keys::input_connection(), connection);
        selection.set(port_keys::field_association(), association.code());
        match selector {
            ArraySelector::Name(name) => selection.set(port_keys::field_name(), name),
            ArraySelector::Attribute(kind) => {
                selection.set(port_keys::field_attribute_type(), kind)
            }
        }

        if let Some(arrays) = node
            .parameters
            .information_vector_mut(port_keys::input_arrays_to_process())
        {
            if arrays.len() <= idx {
                arrays.resize_with(idx + 1, Information::new);
            }
            arrays[idx] = selection;
        }
        node.modified();
        Ok(())
    }

    pub fn input_array_information(&self, id: AlgorithmId, idx: usize) -> Option<&Information> {
        self.node(id)
            .ok()?
            .parameters
            .get_information_vector(port_keys::input_arrays_to_process())?
            .get(idx)
            .filter(|info| !info.is_empty())
    }

    /// Shared advisory abort flag for an algorithm.
    pub fn abort_handle(&self, id: AlgorithmId) -> Result<Arc<AtomicBool>> {
        Ok(self.node(id)?.abort.clone())
    }

    pub(crate) fn node(&self, id: AlgorithmId) -> Result<&AlgorithmNode> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PipelineError::UnknownAlgorithm(id))
    }

    pub(crate) fn node_mut(&mut self, id: AlgorithmId) -> Result<&mut AlgorithmNode> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownAlgorithm(id))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use pipecore::keys::{executive, streaming};
    use pipecore::{
        Algorithm, AlgorithmContext, AlgorithmError, Extent, Information, InformationVector,
        Request, RequestKind,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Minimal source publishing a whole extent and counting its requests.
    #[derive(Default)]
    pub struct CountingSource {
        pub whole: Option<Extent>,
        pub information_calls: usize,
        pub update_extent_calls: usize,
        pub data_calls: usize,
    }

    impl Algorithm for CountingSource {
        fn algorithm_type(&self) -> &str {
            "test.source"
        }

        fn number_of_input_ports(&self) -> usize {
            0
        }

        fn fill_output_port_information(
            &self,
            _port: usize,
            info: &mut Information,
        ) -> Result<(), AlgorithmError> {
            info.set(executive::data_type_name(), "ImageData");
            Ok(())
        }

        fn request_information(
            &mut self,
            _ctx: &AlgorithmContext<'_>,
            _request: &Request,
            _inputs: &[InformationVector],
            outputs: &mut InformationVector,
        ) -> Result<(), AlgorithmError> {
            self.information_calls += 1;
            if let Some(whole) = self.whole {
                outputs[0].set(streaming::whole_extent(), whole);
            }
            Ok(())
        }

        fn request_update_extent(
            &mut self,
            _ctx: &AlgorithmContext<'_>,
            _request: &Request,
            _inputs: &mut [InformationVector],
            _outputs: &InformationVector,
        ) -> Result<(), AlgorithmError> {
            self.update_extent_calls += 1;
            Ok(())
        }

        fn request_data(
            &mut self,
            _ctx: &AlgorithmContext<'_>,
            _request: &Request,
            _inputs: &[InformationVector],
            _outputs: &mut InformationVector,
        ) -> Result<(), AlgorithmError> {
            self.data_calls += 1;
            Ok(())
        }
    }

    /// Pass-through filter with a configurable input port shape.
    pub struct CountingFilter {
        pub repeatable: bool,
        pub optional: bool,
        pub required_type: &'static str,
        pub information_calls: usize,
        pub data_calls: usize,
    }

    impl Default for CountingFilter {
        fn default() -> Self {
            Self {
                repeatable: false,
                optional: false,
                required_type: "DataSet",
                information_calls: 0,
                data_calls: 0,
            }
        }
    }

    impl Algorithm for CountingFilter {
        fn algorithm_type(&self) -> &str {
            "test.filter"
        }

        fn fill_input_port_information(
            &self,
            _port: usize,
            info: &mut Information,
        ) -> Result<(), AlgorithmError> {
            use pipecore::keys::algorithm as port_keys;
            info.set(port_keys::input_required_data_type(), self.required_type);
            info.set(port_keys::input_is_repeatable(), self.repeatable);
            info.set(port_keys::input_is_optional(), self.optional);
            Ok(())
        }

        fn fill_output_port_information(
            &self,
            _port: usize,
            info: &mut Information,
        ) -> Result<(), AlgorithmError> {
            info.set(executive::data_type_name(), "ImageData");
            Ok(())
        }

        fn request_information(
            &mut self,
            _ctx: &AlgorithmContext<'_>,
            _request: &Request,
            inputs: &[InformationVector],
            outputs: &mut InformationVector,
        ) -> Result<(), AlgorithmError> {
            self.information_calls += 1;
            pipecore::forward_information(inputs, outputs);
            Ok(())
        }

        fn request_data(
            &mut self,
            _ctx: &AlgorithmContext<'_>,
            _request: &Request,
            _inputs: &[InformationVector],
            _outputs: &mut InformationVector,
        ) -> Result<(), AlgorithmError> {
            self.data_calls += 1;
            Ok(())
        }
    }

    /// Source or filter that refuses one kind of request a set number of times.
    #[derive(Default)]
    pub struct FailingAlgorithm {
        pub inputs: usize,
        pub fail_on: Option<RequestKind>,
        pub failures_left: usize,
        /// Raised from inside the data request, as another thread would.
        pub trip_abort: Option<Arc<AtomicBool>>,
        pub calls: Vec<RequestKind>,
    }

    impl FailingAlgorithm {
        pub fn failing(kind: RequestKind, times: usize) -> Self {
            Self {
                fail_on: Some(kind),
                failures_left: times,
                ..Default::default()
            }
        }

        fn answer(&mut self, kind: RequestKind) -> Result<(), AlgorithmError> {
            self.calls.push(kind);
            if self.fail_on == Some(kind) && self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(AlgorithmError::ExecutionFailed(format!("refused {}", kind)));
            }
            Ok(())
        }

        pub fn count(&self, kind: RequestKind) -> usize {
            self.calls.iter().filter(|call| **call == kind).count()
        }
    }

    impl Algorithm for FailingAlgorithm {
        fn algorithm_type(&self) -> &str {
            "test.failing"
        }

        fn number_of_input_ports(&self) -> usize {
            self.inputs
        }

        fn fill_output_port_information(
            &self,
            _port: usize,
            info: &mut Information,
        ) -> Result<(), AlgorithmError> {
            info.set(executive::data_type_name(), "ImageData");
            Ok(())
        }

        fn request_information(
            &mut self,
            _ctx: &AlgorithmContext<'_>,
            _request: &Request,
            _inputs: &[InformationVector],
            outputs: &mut InformationVector,
        ) -> Result<(), AlgorithmError> {
            self.answer(RequestKind::Information)?;
            outputs[0].set(streaming::whole_extent(), Extent::new(0, 9, 0, 9, 0, 0));
            Ok(())
        }

        fn request_update_extent(
            &mut self,
            _ctx: &AlgorithmContext<'_>,
            request: &Request,
            inputs: &mut [InformationVector],
            outputs: &InformationVector,
        ) -> Result<(), AlgorithmError> {
            self.answer(RequestKind::UpdateExtent)?;
            pipecore::forward_update_extent(request, inputs, outputs);
            Ok(())
        }

        fn request_data(
            &mut self,
            ctx: &AlgorithmContext<'_>,
            _request: &Request,
            _inputs: &[InformationVector],
            _outputs: &mut InformationVector,
        ) -> Result<(), AlgorithmError> {
            if let Some(flag) = self.trip_abort.take() {
                flag.store(true, Ordering::Relaxed);
            }
            if ctx.abort_requested() {
                self.calls.push(RequestKind::Data);
                return Err(AlgorithmError::Aborted);
            }
            self.answer(RequestKind::Data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{CountingFilter, CountingSource};
    use super::*;

    #[test]
    fn test_configure_bumps_mtime() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let before = pipeline.algorithm_mtime(source).unwrap();

        pipeline
            .configure::<CountingSource, _>(source, |s| s.whole = None)
            .unwrap();
        assert!(pipeline.algorithm_mtime(source).unwrap() > before);
    }

    #[test]
    fn test_configure_with_wrong_type_fails() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let result = pipeline.configure::<CountingFilter, _>(source, |_| ());
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_named_lookup() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add_named_algorithm("grid", Box::new(CountingSource::default()));
        assert_eq!(pipeline.find_by_name("grid"), Some(source));
        assert_eq!(pipeline.label(source), "grid");
        assert_eq!(pipeline.find_by_name("missing"), None);
    }

    #[test]
    fn test_input_array_selection() {
        let mut pipeline = Pipeline::new();
        let filter = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        pipeline
            .set_input_array_to_process(
                filter,
                1,
                0,
                0,
                FieldAssociation::Points,
                ArraySelector::Name("scalars".to_string()),
            )
            .unwrap();

        assert!(pipeline.input_array_information(filter, 0).is_none());
        let selection = pipeline.input_array_information(filter, 1).unwrap();
        assert_eq!(selection.get_string(port_keys::field_name()), Some("scalars"));
        assert_eq!(selection.get_integer(port_keys::field_association()), Some(0));
    }

    #[test]
    fn test_remove_algorithm_severs_consumers() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add_algorithm(Box::new(CountingSource::default()));
        let filter = pipeline.add_algorithm(Box::new(CountingFilter::default()));
        let port = pipeline.output_port(source, 0).unwrap();
        pipeline.set_input_connection(filter, 0, Some(&port)).unwrap();

        pipeline.remove_algorithm(source).unwrap();
        assert!(!pipeline.contains(source));
        assert_eq!(pipeline.number_of_input_connections(filter, 0), 0);
        assert!(matches!(
            pipeline.algorithm(source),
            Err(PipelineError::UnknownAlgorithm(_))
        ));
    }
}
