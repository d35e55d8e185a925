use crate::config;
use crate::image::{output_request, store_output, ImageData, IMAGE_DATA_TYPE};
use pipecore::keys::{executive, streaming};
use pipecore::{
    Algorithm, AlgorithmContext, AlgorithmError, Extent, ExtentType, Information,
    InformationVector, Request,
};
use piperuntime::{AlgorithmConfig, AlgorithmFactory, AlgorithmMetadata, PortDefinition};

pub const GRID_SOURCE_TYPE: &str = "source.grid";

/// Structured-grid source producing `scale * (i + 10j + 100k)`.
///
/// Only the requested sub-extent is generated. Every generated extent is
/// recorded so callers can see exactly what was asked of the source.
#[derive(Debug, Clone)]
pub struct GridSource {
    whole_extent: Extent,
    scale: f64,
    maximum_pieces: Option<i64>,
    generated: Vec<Extent>,
}

impl GridSource {
    pub fn new(whole_extent: Extent) -> Self {
        Self {
            whole_extent,
            scale: 1.0,
            maximum_pieces: None,
            generated: Vec::new(),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_maximum_pieces(mut self, pieces: i64) -> Self {
        self.maximum_pieces = Some(pieces);
        self
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub fn set_whole_extent(&mut self, extent: Extent) {
        self.whole_extent = extent;
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Extents generated so far, oldest first.
    pub fn generated(&self) -> &[Extent] {
        &self.generated
    }

    pub fn value(&self, i: i64, j: i64, k: i64) -> f64 {
        self.scale * (i + 10 * j + 100 * k) as f64
    }
}

impl Algorithm for GridSource {
    fn algorithm_type(&self) -> &str {
        GRID_SOURCE_TYPE
    }

    fn number_of_input_ports(&self) -> usize {
        0
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
        _inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        let output = outputs
            .first_mut()
            .ok_or_else(|| AlgorithmError::ExecutionFailed("source has no output".to_string()))?;
        output.set(streaming::whole_extent(), self.whole_extent);
        output.set(streaming::extent_type(), ExtentType::Structured.code());
        output.set_option(streaming::maximum_number_of_pieces(), self.maximum_pieces);
        Ok(())
    }

    fn request_data(
        &mut self,
        ctx: &AlgorithmContext<'_>,
        _request: &Request,
        _inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        let extent = output_request(outputs, 0)?.clamp_to(&self.whole_extent);
        tracing::debug!("Generating {} of {}", extent, self.whole_extent);
        let mut image = ImageData::new(extent);
        for k in extent.min(2)..=extent.max(2) {
            if ctx.abort_requested() {
                return Err(AlgorithmError::Aborted);
            }
            for j in extent.min(1)..=extent.max(1) {
                for i in extent.min(0)..=extent.max(0) {
                    image.set_value(i, j, k, self.value(i, j, k));
                }
            }
        }
        ctx.update_progress(1.0);
        self.generated.push(extent);
        store_output(outputs, 0, image)
    }
}

pub struct GridSourceFactory;

impl AlgorithmFactory for GridSourceFactory {
    fn create(&self, config: &AlgorithmConfig) -> Result<Box<dyn Algorithm>, AlgorithmError> {
        let whole = config::extent(config, "whole_extent")?
            .ok_or_else(|| AlgorithmError::Configuration("'whole_extent' is required".to_string()))?;
        let mut source = GridSource::new(whole).with_scale(config::f64_or(config, "scale", 1.0)?);
        if config.contains_key("maximum_pieces") {
            source = source.with_maximum_pieces(config::i64_or(config, "maximum_pieces", 1)?);
        }
        Ok(Box::new(source))
    }

    fn algorithm_type(&self) -> &str {
        GRID_SOURCE_TYPE
    }

    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata {
            description: "Generates a linear scalar field over a structured extent".to_string(),
            category: "source".to_string(),
            inputs: vec![],
            outputs: vec![PortDefinition::new("output", IMAGE_DATA_TYPE)],
        }
    }
}
