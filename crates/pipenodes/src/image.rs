use pipecore::keys::{executive, streaming};
use pipecore::{
    downcast_data, AlgorithmError, DataHandle, DataObject, Extent, Information, InformationVector,
    PieceRequest,
};
use std::any::Any;
use std::sync::Arc;

pub const IMAGE_DATA_TYPE: &str = "ImageData";

/// Scalar values on a regular grid, stored x-fastest over an extent.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    extent: Extent,
    values: Vec<f64>,
}

impl ImageData {
    /// Zero-filled image over `extent`.
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            values: vec![0.0; extent.number_of_points()],
        }
    }

    pub fn from_fn(extent: Extent, f: impl Fn(i64, i64, i64) -> f64) -> Self {
        let values = extent.points().map(|(i, j, k)| f(i, j, k)).collect();
        Self { extent, values }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value_at(&self, i: i64, j: i64, k: i64) -> Option<f64> {
        self.extent
            .offset_of(i, j, k)
            .and_then(|offset| self.values.get(offset))
            .copied()
    }

    pub fn set_value(&mut self, i: i64, j: i64, k: i64, value: f64) -> bool {
        match self.extent.offset_of(i, j, k) {
            Some(offset) if offset < self.values.len() => {
                self.values[offset] = value;
                true
            }
            _ => false,
        }
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        let first = *self.values.first()?;
        Some(
            self.values
                .iter()
                .fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))),
        )
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        match (self.range(), self.mean()) {
            (Some((lo, hi)), Some(mean)) => format!(
                "ImageData extent={} points={} range=[{}, {}] mean={:.3}",
                self.extent,
                self.len(),
                lo,
                hi,
                mean
            ),
            _ => format!("ImageData extent={} (empty)", self.extent),
        }
    }
}

impl DataObject for ImageData {
    fn data_type_name(&self) -> &str {
        IMAGE_DATA_TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Extent an output store asks for: the update extent, the requested piece
/// of the whole extent, or the whole extent.
pub fn requested_extent(info: &Information) -> Option<Extent> {
    if let Some(extent) = Extent::from_info(info, streaming::update_extent()) {
        return Some(extent);
    }
    let whole = Extent::from_info(info, streaming::whole_extent())?;
    match PieceRequest::from_info(info) {
        Some(piece) => Some(piece.to_extent(&whole)),
        None => Some(whole),
    }
}

/// Image data held by input connection `connection` of `port`.
pub fn input_image(
    inputs: &[InformationVector],
    port: usize,
    connection: usize,
) -> Result<&ImageData, AlgorithmError> {
    let handle = inputs
        .get(port)
        .and_then(|p| p.get(connection))
        .and_then(|info| info.get_data_object(executive::data_object()))
        .ok_or(AlgorithmError::MissingInput { port, connection })?;
    downcast_data::<ImageData>(handle).ok_or_else(|| AlgorithmError::InvalidInputType {
        port,
        expected: IMAGE_DATA_TYPE.to_string(),
        actual: handle.data_type_name().to_string(),
    })
}

/// Publish `image` as the data object of output `port`.
pub fn store_output(
    outputs: &mut InformationVector,
    port: usize,
    image: ImageData,
) -> Result<(), AlgorithmError> {
    let output = outputs
        .get_mut(port)
        .ok_or_else(|| AlgorithmError::ExecutionFailed(format!("no output port {}", port)))?;
    let handle: DataHandle = Arc::new(image);
    output.set(executive::data_object(), handle);
    Ok(())
}

/// Extent requested on output `port`, or an error when nothing was requested.
pub fn output_request(outputs: &InformationVector, port: usize) -> Result<Extent, AlgorithmError> {
    outputs
        .get(port)
        .and_then(requested_extent)
        .ok_or_else(|| {
            AlgorithmError::ExecutionFailed(format!("no extent requested on output {}", port))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_is_x_fastest() {
        let image = ImageData::from_fn(Extent::new(0, 2, 0, 1, 0, 0), |i, j, _| (i + 10 * j) as f64);
        assert_eq!(image.values(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(image.value_at(2, 1, 0), Some(12.0));
        assert_eq!(image.value_at(3, 0, 0), None);
    }

    #[test]
    fn test_summary_statistics() {
        let image = ImageData::from_fn(Extent::new(0, 3, 0, 0, 0, 0), |i, _, _| i as f64);
        assert_eq!(image.range(), Some((0.0, 3.0)));
        assert_eq!(image.mean(), Some(1.5));
        assert!(ImageData::new(Extent::empty()).mean().is_none());
    }

    #[test]
    fn test_requested_extent_prefers_update_extent() {
        let mut info = Information::new();
        info.set(streaming::whole_extent(), Extent::new(0, 9, 0, 9, 0, 0));
        assert_eq!(requested_extent(&info), Some(Extent::new(0, 9, 0, 9, 0, 0)));

        PieceRequest::new(0, 2, 0).store(&mut info);
        assert_eq!(requested_extent(&info), Some(Extent::new(0, 4, 0, 9, 0, 0)));

        info.set(streaming::update_extent(), Extent::new(1, 2, 1, 2, 0, 0));
        assert_eq!(requested_extent(&info), Some(Extent::new(1, 2, 1, 2, 0, 0)));
    }

    #[test]
    fn test_input_image_reports_missing_data() {
        let inputs = vec![vec![Information::new()]];
        assert!(matches!(
            input_image(&inputs, 0, 0),
            Err(AlgorithmError::MissingInput { port: 0, connection: 0 })
        ));
    }
}
