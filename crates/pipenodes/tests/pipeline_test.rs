// crates/pipenodes/tests/pipeline_test.rs

use pipecore::{
    downcast_data, AlgorithmEvent, AlgorithmId, ConfigurationError, Extent, PieceRequest,
    PipelineError, PipelineEvent, RequestKind, TimeStamp,
};
use pipenodes::{
    standard_registry, DebugSink, GridSource, ImageData, ShiftScaleFilter, SmoothFilter, SumFilter,
};
use piperuntime::{load_pipeline, ExecutiveKind, Pipeline, PipelineSpec};
use std::sync::Arc;

const WHOLE: Extent = Extent::new(0, 9, 0, 9, 0, 0);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn connect(pipeline: &mut Pipeline, from: AlgorithmId, to: AlgorithmId) {
    let port = pipeline.output_port(from, 0).unwrap();
    pipeline.set_input_connection(to, 0, Some(&port)).unwrap();
}

fn output_image(pipeline: &Pipeline, id: AlgorithmId) -> ImageData {
    let handle = pipeline
        .output_data_object(id, 0)
        .expect("output should hold a data object");
    downcast_data::<ImageData>(&handle)
        .expect("output should be image data")
        .clone()
}

fn generated(pipeline: &Pipeline, source: AlgorithmId) -> Vec<Extent> {
    pipeline
        .downcast_ref::<GridSource>(source)
        .unwrap()
        .generated()
        .to_vec()
}

#[test]
fn test_second_update_executes_nothing() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let shift = pipeline.add_algorithm(Box::new(ShiftScaleFilter::new(1.0, 2.0)));
    let smooth = pipeline.add_algorithm(Box::new(SmoothFilter::new(1)));
    let sink = pipeline.add_algorithm(Box::new(DebugSink::default()));
    connect(&mut pipeline, source, shift);
    connect(&mut pipeline, shift, smooth);
    connect(&mut pipeline, smooth, sink);

    pipeline.update(sink).unwrap();
    let counts: Vec<usize> = [source, shift, smooth, sink]
        .iter()
        .map(|id| pipeline.execution_count(*id))
        .collect();
    assert_eq!(counts, vec![1, 1, 1, 1]);

    let mut events = pipeline.subscribe_events();
    pipeline.update(sink).unwrap();
    let counts: Vec<usize> = [source, shift, smooth, sink]
        .iter()
        .map(|id| pipeline.execution_count(*id))
        .collect();
    assert_eq!(counts, vec![1, 1, 1, 1], "no algorithm should run again");

    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, PipelineEvent::AlgorithmExecuted { .. }),
            "unexpected request on an up-to-date pipeline: {:?}",
            event
        );
    }
}

#[test]
fn test_modified_source_reexecutes_only_its_path() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let changed = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let untouched = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE).with_scale(2.0)));
    let shift = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));
    let sum = pipeline.add_algorithm(Box::new(SumFilter));
    connect(&mut pipeline, changed, shift);
    let shift_port = pipeline.output_port(shift, 0).unwrap();
    let untouched_port = pipeline.output_port(untouched, 0).unwrap();
    pipeline.add_input_connection(sum, 0, &shift_port).unwrap();
    pipeline.add_input_connection(sum, 0, &untouched_port).unwrap();

    pipeline.update(sum).unwrap();
    pipeline
        .configure::<GridSource, _>(changed, |s| s.set_scale(3.0))
        .unwrap();
    pipeline.update(sum).unwrap();

    assert_eq!(pipeline.execution_count(changed), 2);
    assert_eq!(pipeline.execution_count(shift), 2);
    assert_eq!(pipeline.execution_count(sum), 2);
    assert_eq!(pipeline.execution_count(untouched), 1, "off-path source must not rerun");

    let image = output_image(&pipeline, sum);
    assert_eq!(image.value_at(1, 1, 0), Some(3.0 * 11.0 + 2.0 * 11.0));
}

#[test]
fn test_two_connections_on_single_port_fail_validation() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let b = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let filter = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));
    let pa = pipeline.output_port(a, 0).unwrap();
    let pb = pipeline.output_port(b, 0).unwrap();
    pipeline.add_input_connection(filter, 0, &pa).unwrap();
    pipeline.add_input_connection(filter, 0, &pb).unwrap();

    let mut events = pipeline.subscribe_events();
    let err = pipeline.update_information(filter).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigurationError::NotRepeatable { connections: 2, .. })
    ));

    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, PipelineEvent::AlgorithmExecuted { .. }),
            "no algorithm may be invoked when validation fails"
        );
    }
    assert_eq!(pipeline.information_time(filter), Some(TimeStamp::NEVER));
    assert!(pipeline.executive_of(a).is_none());
    assert!(pipeline.update(filter).is_err());
}

#[test]
fn test_halo_is_added_to_upstream_request() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let a = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let b = pipeline.add_algorithm(Box::new(SmoothFilter::new(1)));
    let c = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));
    connect(&mut pipeline, a, b);
    connect(&mut pipeline, b, c);

    pipeline.update_information(c).unwrap();
    pipeline
        .set_update_extent(c, 0, Extent::new(2, 8, 2, 8, 0, 0))
        .unwrap();
    pipeline.propagate_update_extent(c, 0).unwrap();

    assert_eq!(pipeline.update_extent(b, 0), Some(Extent::new(2, 8, 2, 8, 0, 0)));
    assert_eq!(pipeline.update_extent(a, 0), Some(Extent::new(1, 9, 1, 9, 0, 0)));

    pipeline.update(c).unwrap();
    assert_eq!(generated(&pipeline, a), vec![Extent::new(1, 9, 1, 9, 0, 0)]);
    let image = output_image(&pipeline, c);
    assert_eq!(image.extent(), Extent::new(2, 8, 2, 8, 0, 0));
    // Interior of a linear field is unchanged by a symmetric box mean.
    assert_eq!(image.value_at(2, 2, 0), Some(22.0));
}

#[test]
fn test_shared_source_covers_every_consumer_request() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let smooth = pipeline.add_algorithm(Box::new(SmoothFilter::new(1)));
    let shift = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));
    let sum = pipeline.add_algorithm(Box::new(SumFilter));
    connect(&mut pipeline, source, smooth);
    connect(&mut pipeline, source, shift);
    let smooth_port = pipeline.output_port(smooth, 0).unwrap();
    let shift_port = pipeline.output_port(shift, 0).unwrap();
    pipeline.add_input_connection(sum, 0, &smooth_port).unwrap();
    pipeline.add_input_connection(sum, 0, &shift_port).unwrap();

    pipeline.update_information(sum).unwrap();
    pipeline
        .set_update_extent(sum, 0, Extent::new(2, 5, 2, 5, 0, 0))
        .unwrap();
    pipeline.update(sum).unwrap();

    assert_eq!(generated(&pipeline, source), vec![Extent::new(1, 6, 1, 6, 0, 0)]);
    assert_eq!(output_image(&pipeline, smooth).value_at(2, 2, 0), Some(22.0));
    assert_eq!(output_image(&pipeline, shift).extent(), Extent::new(2, 5, 2, 5, 0, 0));
    assert_eq!(output_image(&pipeline, sum).value_at(2, 2, 0), Some(44.0));

    pipeline.update(sum).unwrap();
    assert_eq!(pipeline.execution_count(source), 1);
}

#[test]
fn test_non_streaming_upstream_is_left_alone() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let legacy = pipeline.add_executive(ExecutiveKind::DemandDriven);
    pipeline.set_executive(source, legacy).unwrap();
    let filter = pipeline.add_algorithm(Box::new(SmoothFilter::new(1)));
    connect(&mut pipeline, source, filter);

    pipeline.update_information(filter).unwrap();
    pipeline
        .set_update_extent(filter, 0, Extent::new(2, 5, 2, 5, 0, 0))
        .unwrap();
    pipeline.propagate_update_extent(filter, 0).unwrap();
    assert_eq!(pipeline.update_extent(source, 0), None);

    pipeline.update(filter).unwrap();
    assert_eq!(generated(&pipeline, source), vec![WHOLE]);
    assert_eq!(
        output_image(&pipeline, filter).extent(),
        Extent::new(2, 5, 2, 5, 0, 0)
    );
}

#[test]
fn test_set_input_connection_replaces_and_releases() {
    let mut pipeline = Pipeline::new();
    let x = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let y = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let filter = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));
    let px = pipeline.output_port(x, 0).unwrap();
    let py = pipeline.output_port(y, 0).unwrap();

    pipeline.set_input_connection(filter, 0, Some(&px)).unwrap();
    let connected = Arc::strong_count(&px);
    pipeline.set_input_connection(filter, 0, Some(&py)).unwrap();

    assert_eq!(pipeline.number_of_input_connections(filter, 0), 1);
    let current = pipeline.input_connection(filter, 0, 0).unwrap();
    assert!(Arc::ptr_eq(&current, &py));
    assert_eq!(Arc::strong_count(&px), connected - 1);
    assert!(pipeline.consumers(x, 0).is_empty());
}

#[test]
fn test_sub_extent_request_reaches_source_once() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let filter = pipeline.add_algorithm(Box::new(ShiftScaleFilter::new(0.0, 1.0)));
    connect(&mut pipeline, source, filter);
    let requested = Extent::new(2, 5, 2, 5, 0, 0);

    pipeline.update_information(filter).unwrap();
    pipeline.set_update_extent(filter, 0, requested).unwrap();
    pipeline.propagate_update_extent(filter, 0).unwrap();
    assert_eq!(pipeline.update_extent(source, 0), Some(requested));

    pipeline.update(filter).unwrap();
    pipeline.update(filter).unwrap();
    assert_eq!(generated(&pipeline, source), vec![requested]);
    assert_eq!(pipeline.last_executed_extent(source, 0), Some(requested));
    assert_eq!(output_image(&pipeline, filter).len(), 16);
}

#[test]
fn test_piece_request_is_translated_to_extent() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE).with_maximum_pieces(2)));
    let filter = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));
    connect(&mut pipeline, source, filter);

    pipeline.update_information(filter).unwrap();
    assert_eq!(pipeline.maximum_number_of_pieces(filter, 0), Some(2));
    pipeline
        .set_update_piece(filter, 0, PieceRequest::new(1, 2, 0))
        .unwrap();
    pipeline.update(filter).unwrap();

    assert_eq!(generated(&pipeline, source), vec![Extent::new(5, 9, 0, 9, 0, 0)]);
    assert_eq!(pipeline.update_piece(source, 0), Some(PieceRequest::new(1, 2, 0)));
}

#[test]
fn test_released_data_is_regenerated_on_demand() {
    init_tracing();
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let filter = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));
    let sink = pipeline.add_algorithm(Box::new(DebugSink::default()));
    connect(&mut pipeline, source, filter);
    connect(&mut pipeline, filter, sink);
    pipeline.set_release_data_flag(source, 0, true).unwrap();

    pipeline.update(sink).unwrap();
    assert!(pipeline.output_data_object(source, 0).is_none());
    assert!(pipeline.output_data_object(filter, 0).is_some());
    let summary = pipeline
        .downcast_ref::<DebugSink>(sink)
        .unwrap()
        .last_summary()
        .map(str::to_string);
    assert!(summary.unwrap().contains("points=100"));

    pipeline
        .configure::<ShiftScaleFilter, _>(filter, |f| f.set_shift(1.0))
        .unwrap();
    pipeline.update(sink).unwrap();
    assert_eq!(pipeline.execution_count(source), 2);
}

#[test]
fn test_source_reports_progress() {
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_algorithm(Box::new(GridSource::new(WHOLE)));
    let mut events = pipeline.subscribe_events();

    pipeline.update(source).unwrap();

    let mut progress = Vec::new();
    let mut data_requests = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::AlgorithmEvent {
                event: AlgorithmEvent::Progress { amount, .. },
                ..
            } => progress.push(amount),
            PipelineEvent::AlgorithmExecuted {
                request: RequestKind::Data,
                ..
            } => data_requests += 1,
            _ => {}
        }
    }
    assert_eq!(progress, vec![1.0]);
    assert_eq!(data_requests, 1);
}

#[test]
fn test_pipeline_loaded_from_json_runs() {
    init_tracing();
    let json = r#"{
        "name": "smooth-demo",
        "algorithms": [
            { "name": "grid", "type": "source.grid", "config": { "whole_extent": [0, 9, 0, 9, 0, 0], "scale": 2.0 } },
            { "name": "smooth", "type": "filter.smooth", "config": { "radius": 1 } },
            { "name": "out", "type": "debug.inspect" }
        ],
        "connections": [
            { "from": "grid", "to": "smooth" },
            { "from": "smooth", "to": "out" }
        ]
    }"#;
    let spec = PipelineSpec::from_json(json).unwrap();
    let mut loaded = load_pipeline(&spec, &standard_registry()).unwrap();
    let out = loaded.require("out").unwrap();
    let smooth = loaded.require("smooth").unwrap();

    loaded.pipeline.update(out).unwrap();

    let sink = loaded.pipeline.downcast_ref::<DebugSink>(out).unwrap();
    assert_eq!(sink.last_extent(), Some(WHOLE));
    let image = output_image(&loaded.pipeline, smooth);
    assert_eq!(image.value_at(5, 5, 0), Some(110.0));
    assert_eq!(image.value_at(0, 0, 0), Some(11.0));
    assert_eq!(loaded.pipeline.execution_order().unwrap().len(), 3);
}

#[test]
fn test_unknown_algorithm_type_fails_to_load() {
    let mut spec = PipelineSpec::new("bad");
    spec.add_algorithm(piperuntime::AlgorithmSpec::new("x", "source.nope"));
    let err = load_pipeline(&spec, &standard_registry()).err().unwrap();
    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigurationError::UnknownAlgorithmType(_))
    ));
}
