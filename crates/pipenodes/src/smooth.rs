use crate::config;
use crate::image::{input_image, output_request, store_output, ImageData, IMAGE_DATA_TYPE};
use pipecore::keys::{algorithm as port_keys, executive, streaming};
use pipecore::{
    Algorithm, AlgorithmContext, AlgorithmError, Extent, Information, InformationVector,
    PieceRequest, Request,
};
use piperuntime::{AlgorithmConfig, AlgorithmFactory, AlgorithmMetadata, PortDefinition};

pub const SMOOTH_TYPE: &str = "filter.smooth";

/// Box-mean smoothing over a `(2r+1)^d` neighbourhood.
///
/// To produce extent `E` it needs `E` padded by the radius on every side,
/// clamped to what the input can provide.
#[derive(Debug, Clone)]
pub struct SmoothFilter {
    radius: i64,
}

impl SmoothFilter {
    pub fn new(radius: i64) -> Self {
        Self {
            radius: radius.max(0),
        }
    }

    pub fn radius(&self) -> i64 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: i64) {
        self.radius = radius.max(0);
    }
}

impl Default for SmoothFilter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Algorithm for SmoothFilter {
    fn algorithm_type(&self) -> &str {
        SMOOTH_TYPE
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

    fn request_update_extent(
        &mut self,
        _ctx: &AlgorithmContext<'_>,
        request: &Request,
        inputs: &mut [InformationVector],
        outputs: &InformationVector,
    ) -> Result<(), AlgorithmError> {
        let port = request.from_output_port().unwrap_or(0);
        let output = outputs
            .get(port)
            .ok_or_else(|| AlgorithmError::ExecutionFailed(format!("no output port {}", port)))?;
        let input = inputs
            .get_mut(0)
            .and_then(|connections| connections.get_mut(0))
            .ok_or(AlgorithmError::MissingInput {
                port: 0,
                connection: 0,
            })?;

        match Extent::from_info(output, streaming::update_extent()) {
            Some(requested) => {
                let mut needed = requested.pad(self.radius);
                if let Some(whole) = Extent::from_info(input, streaming::whole_extent()) {
                    needed = needed.clamp_to(&whole);
                }
                input.set(streaming::update_extent(), needed);
            }
            None => {
                input.remove(streaming::update_extent());
            }
        }
        match PieceRequest::from_info(output) {
            Some(piece) => PieceRequest::new(
                piece.piece,
                piece.pieces,
                piece.ghost_levels + self.radius,
            )
            .store(input),
            None => {
                input.remove(streaming::update_piece_number());
                input.remove(streaming::update_number_of_pieces());
                input.remove(streaming::update_number_of_ghost_levels());
            }
        }
        Ok(())
    }

    fn request_data(
        &mut self,
        ctx: &AlgorithmContext<'_>,
        _request: &Request,
        inputs: &[InformationVector],
        outputs: &mut InformationVector,
    ) -> Result<(), AlgorithmError> {
        let input = input_image(inputs, 0, 0)?;
        let available = input.extent();
        let extent = output_request(outputs, 0)?.intersect(&available);
        let r = self.radius;

        let mut output = ImageData::new(extent);
        for (i, j, k) in extent.points() {
            if ctx.abort_requested() {
                return Err(AlgorithmError::Aborted);
            }
            let window = Extent::new(i - r, i + r, j - r, j + r, k - r, k + r).intersect(&available);
            let (sum, count) = window
                .points()
                .filter_map(|(a, b, c)| input.value_at(a, b, c))
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count > 0 {
                output.set_value(i, j, k, sum / count as f64);
            }
        }
        store_output(outputs, 0, output)
    }
}

pub struct SmoothFilterFactory;

impl AlgorithmFactory for SmoothFilterFactory {
    fn create(&self, config: &AlgorithmConfig) -> Result<Box<dyn Algorithm>, AlgorithmError> {
        let radius = config::i64_or(config, "radius", 1)?;
        if radius < 0 {
            return Err(AlgorithmError::Configuration(
                "'radius' must not be negative".to_string(),
            ));
        }
        Ok(Box::new(SmoothFilter::new(radius)))
    }

    fn algorithm_type(&self) -> &str {
        SMOOTH_TYPE
    }

    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata {
            description: "Box-mean smoothing; requests a halo of `radius` cells upstream"
                .to_string(),
            category: "filter".to_string(),
            inputs: vec![PortDefinition::new("input", IMAGE_DATA_TYPE)],
            outputs: vec![PortDefinition::new("output", IMAGE_DATA_TYPE)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipecore::{AlgorithmId, EventBus, RequestKind, UpdateId};
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_update_extent_is_padded_and_clamped() {
        let bus = EventBus::new(4);
        let emitter = bus.create_emitter(UpdateId::nil(), AlgorithmId::new(0));
        let parameters = Information::new();
        let abort = AtomicBool::new(false);
        let ctx = AlgorithmContext::new(AlgorithmId::new(0), &parameters, &emitter, &abort);

        let mut output = Information::new();
        output.set(streaming::update_extent(), Extent::new(0, 8, 2, 8, 0, 0));
        let outputs = vec![output];
        let mut input = Information::new();
        input.set(streaming::whole_extent(), Extent::new(0, 9, 0, 9, 0, 0));
        let mut inputs = vec![vec![input]];

        let mut filter = SmoothFilter::new(1);
        filter
            .request_update_extent(
                &ctx,
                &Request::new(RequestKind::UpdateExtent, Some(0)),
                &mut inputs,
                &outputs,
            )
            .unwrap();

        assert_eq!(
            Extent::from_info(&inputs[0][0], streaming::update_extent()),
            Some(Extent::new(0, 9, 1, 9, 0, 0))
        );
    }
}
