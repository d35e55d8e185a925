use crate::config;
use crate::image::{input_image, output_request, store_output, ImageData, IMAGE_DATA_TYPE};
use pipecore::keys::{algorithm as port_keys, executive};
use pipecore::{Algorithm, AlgorithmContext, AlgorithmError, Information, InformationVector, Request};
use piperuntime::{AlgorithmConfig, AlgorithmFactory, AlgorithmMetadata, PortDefinition};

pub const SHIFT_SCALE_TYPE: &str = "filter.shift_scale";

/// Point-wise `(value + shift) * scale`. Needs exactly the extent it produces.
#[derive(Debug, Clone)]
pub struct ShiftScaleFilter {
    shift: f64,
    scale: f64,
}

impl ShiftScaleFilter {
    pub fn new(shift: f64, scale: f64) -> Self {
        Self { shift, scale }
    }

    pub fn set_shift(&mut self, shift: f64) {
        self.shift = shift;
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }
}

impl Default for ShiftScaleFilter {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl Algorithm for ShiftScaleFilter {
    fn algorithm_type(&self) -> &str {
        SHIFT_SCALE_TYPE
    }

    fn fill_input_port_information(
        &self,
        _port: usize,
        info: &mut Information,
    ) -> Result<(), AlgorithmError> {
        info.set(port_keys::input_required_data_type(), IMAGE_DATA_TYPE);
        Ok(())
    }

    fn fill_output_port_information(
        &self,
        _port: usize,
        info: &mut Information,
    ) -> Result<(), AlgorithmError> {
        info.set(executive::data_type_name(), IMAGE_DATA_TYPE);
        Ok(())
    }

    fn request_data(
        &mut self,
        _ctx: &AlgorithmContext<'_>,
        _request: &Request,
        inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        let input = input_image(inputs, 0, 0)?;
        let extent = output_request(outputs, 0)?.intersect(&input.extent());
        let output = ImageData::from_fn(extent, |i, j, k| {
            (input.value_at(i, j, k).unwrap_or(0.0) + self.shift) * self.scale
        });
        store_output(outputs, 0, output)
    }
}

pub struct ShiftScaleFilterFactory;

impl AlgorithmFactory for ShiftScaleFilterFactory {
    fn create(&self, config: &AlgorithmConfig) -> Result<Box<dyn Algorithm>, AlgorithmError> {
        Ok(Box::new(ShiftScaleFilter::new(
            config::f64_or(config, "shift", 0.0)?,
            config::f64_or(config, "scale", 1.0)?,
        )))
    }

    fn algorithm_type(&self) -> &str {
        SHIFT_SCALE_TYPE
    }

    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata {
            description: "Shifts then scales every value".to_string(),
            category: "filter".to_string(),
            inputs: vec![PortDefinition::new("input", IMAGE_DATA_TYPE)],
            outputs: vec![PortDefinition::new("output", IMAGE_DATA_TYPE)],
        }
    }
}
