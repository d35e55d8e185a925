use crate::image::{input_image, output_request, store_output, ImageData, IMAGE_DATA_TYPE};
use pipecore::keys::{algorithm as port_keys, executive, streaming};
use pipecore::{
    Algorithm, AlgorithmContext, AlgorithmError, Extent, Information, InformationVector, Request,
};
use piperuntime::{AlgorithmConfig, AlgorithmFactory, AlgorithmMetadata, PortDefinition};

pub const SUM_TYPE: &str = "filter.sum";

/// Point-wise sum of every image connected to its single repeatable port.
///
/// The output covers only the region every input can provide.
#[derive(Debug, Clone, Default)]
pub struct SumFilter;

impl Algorithm for SumFilter {
    fn algorithm_type(&self) -> &str {
        SUM_TYPE
    }

    fn fill_input_port_information(
        &self,
        _port: usize,
        info: &mut Information,
    ) -> Result<(), AlgorithmError> {
        info.set(port_keys::input_required_data_type(), IMAGE_DATA_TYPE);
        info.set(port_keys::input_is_repeatable(), true);
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

    fn request_information(
        &mut self,
        _ctx: &AlgorithmContext<'_>,
        _request: &Request,
        inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        let connections = inputs.first().map(Vec::as_slice).unwrap_or_default();
        let whole = connections
            .iter()
            .filter_map(|info| Extent::from_info(info, streaming::whole_extent()))
            .reduce(|a, b| a.intersect(&b));
        if let Some(output) = outputs.first_mut() {
            output.set_option(streaming::whole_extent(), whole);
        }
        Ok(())
    }

    fn request_data(
        &mut self,
        _ctx: &AlgorithmContext<'_>,
        _request: &Request,
        inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        let count = inputs.first().map(Vec::len).unwrap_or(0);
        let images = (0..count)
            .map(|connection| input_image(inputs, 0, connection))
            .collect::<Result<Vec<_>, _>>()?;

        let extent = images
            .iter()
            .fold(output_request(outputs, 0)?, |acc, image| acc.intersect(&image.extent()));
        let output = ImageData::from_fn(extent, |i, j, k| {
            images
                .iter()
                .filter_map(|image| image.value_at(i, j, k))
                .sum()
        });
        store_output(outputs, 0, output)
    }
}

pub struct SumFilterFactory;

impl AlgorithmFactory for SumFilterFactory {
    fn create(&self, _config: &AlgorithmConfig) -> Result<Box<dyn Algorithm>, AlgorithmError> {
        Ok(Box::new(SumFilter))
    }

    fn algorithm_type(&self) -> &str {
        SUM_TYPE
    }

    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata {
            description: "Adds any number of images point by point".to_string(),
            category: "filter".to_string(),
            inputs: vec![PortDefinition::new("inputs", IMAGE_DATA_TYPE).repeatable()],
            outputs: vec![PortDefinition::new("output", IMAGE_DATA_TYPE)],
        }
    }
}
