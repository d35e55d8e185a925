use crate::image::ImageData;
use pipecore::keys::{algorithm as port_keys, executive};
use pipecore::{
    downcast_data, Algorithm, AlgorithmContext, AlgorithmError, Extent, Information,
    InformationVector, Request,
};
use piperuntime::{AlgorithmConfig, AlgorithmFactory, AlgorithmMetadata, PortDefinition};

pub const DEBUG_TYPE: &str = "debug.inspect";

/// Pass-through sink that logs what reaches it
#[derive(Debug, Clone, Default)]
pub struct DebugSink {
    last_summary: Option<String>,
    last_extent: Option<Extent>,
}

impl DebugSink {
    pub fn last_summary(&self) -> Option<&str> {
        self.last_summary.as_deref()
    }

    pub fn last_extent(&self) -> Option<Extent> {
        self.last_extent
    }
}

impl Algorithm for DebugSink {
    fn algorithm_type(&self) -> &str {
        DEBUG_TYPE
    }

    fn fill_input_port_information(
        &self,
        _port: usize,
        info: &mut Information,
    ) -> Result<(), AlgorithmError> {
        info.set(port_keys::input_required_data_type(), "DataSet");
        Ok(())
    }

    fn fill_output_port_information(
        &self,
        _port: usize,
        info: &mut Information,
    ) -> Result<(), AlgorithmError> {
        info.set(executive::data_type_name(), "DataSet");
        Ok(())
    }

    fn request_data(
        &mut self,
        ctx: &AlgorithmContext<'_>,
        _request: &Request,
        inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        let input = inputs
            .first()
            .and_then(|connections| connections.first())
            .ok_or(AlgorithmError::MissingInput {
                port: 0,
                connection: 0,
            })?;
        let handle = input
            .get_data_object(executive::data_object())
            .ok_or(AlgorithmError::MissingInput {
                port: 0,
                connection: 0,
            })?;

        let summary = match downcast_data::<ImageData>(handle) {
            Some(image) => {
                self.last_extent = Some(image.extent());
                image.summary()
            }
            None => {
                self.last_extent = None;
                format!("{} (not inspectable)", handle.data_type_name())
            }
        };
        tracing::info!("DEBUG: {}", summary);
        ctx.events().info(format!("DEBUG: {}", summary));
        self.last_summary = Some(summary);

        if let Some(output) = outputs.first_mut() {
            output.set(executive::data_object(), handle.clone());
        }
        Ok(())
    }
}

pub struct DebugSinkFactory;

impl AlgorithmFactory for DebugSinkFactory {
    fn create(&self, _config: &AlgorithmConfig) -> Result<Box<dyn Algorithm>, AlgorithmError> {
        Ok(Box::new(DebugSink::default()))
    }

    fn algorithm_type(&self) -> &str {
        DEBUG_TYPE
    }

    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata {
            description: "Logs a summary of its input and passes it through".to_string(),
            category: "debug".to_string(),
            inputs: vec![PortDefinition::new("input", "DataSet")],
            outputs: vec![PortDefinition::new("output", "DataSet")],
        }
    }
}
