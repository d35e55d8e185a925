// crates/pipecli/src/main.rs

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use pipecore::{downcast_data, AlgorithmEvent, AlgorithmId, Extent, PieceRequest, PipelineEvent};
use pipenodes::{standard_registry, ImageData};
use piperuntime::{load_pipeline, AlgorithmSpec, LoadedPipeline, Pipeline, PipelineSpec};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipe")]
#[command(about = "Demand-driven pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a pipeline file and update it
    Run {
        /// Path to pipeline JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Algorithm to update; every sink when omitted
        #[arg(short, long)]
        sink: Option<String>,

        /// Update extent to request, as "xmin,xmax,ymin,ymax,zmin,zmax"
        #[arg(short, long, conflicts_with = "piece")]
        extent: Option<Extent>,

        /// Piece to request, as "piece/pieces" or "piece/pieces/ghost"
        #[arg(short, long, value_parser = parse_piece)]
        piece: Option<PieceRequest>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a pipeline file
    Validate {
        /// Path to pipeline JSON file
        file: PathBuf,
    },

    /// List available algorithm types
    Algorithms,

    /// Create an example pipeline file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "pipeline.json")]
        output: PathBuf,
    },
}

fn parse_piece(s: &str) -> Result<PieceRequest, String> {
    let parts = s
        .split('/')
        .map(|part| part.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid piece '{}': {}", s, e))?;
    match parts.as_slice() {
        [piece, pieces] => Ok(PieceRequest::new(*piece, *pieces, 0)),
        [piece, pieces, ghost] => Ok(PieceRequest::new(*piece, *pieces, *ghost)),
        _ => Err(format!("piece must look like p/n or p/n/g, got '{}'", s)),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            sink,
            extent,
            piece,
            verbose,
        } => {
            init_logging(verbose);
            run_pipeline(file, sink, extent, piece).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_pipeline(file)?;
        }

        Commands::Algorithms => {
            list_algorithms();
        }

        Commands::Init { output } => {
            create_example_pipeline(output)?;
        }
    }

    Ok(())
}

fn load(file: &Path) -> Result<(PipelineSpec, LoadedPipeline)> {
    let spec = PipelineSpec::from_file(file)?;
    let loaded = load_pipeline(&spec, &standard_registry())?;
    tracing::info!(
        "Loaded pipeline '{}' with {} algorithms and {} connections",
        spec.name,
        spec.algorithms.len(),
        spec.connections.len()
    );
    Ok((spec, loaded))
}

fn targets(loaded: &LoadedPipeline, sink: Option<&str>) -> Result<Vec<AlgorithmId>> {
    match sink {
        Some(name) => Ok(vec![loaded.require(name)?]),
        None => {
            let sinks = loaded.pipeline.sinks();
            if sinks.is_empty() {
                bail!("pipeline has no algorithms to update");
            }
            Ok(sinks)
        }
    }
}

async fn run_pipeline(
    file: PathBuf,
    sink: Option<String>,
    extent: Option<Extent>,
    piece: Option<PieceRequest>,
) -> Result<()> {
    println!("🚀 Loading pipeline from: {}", file.display());
    let (spec, mut loaded) = load(&file)?;

    println!("📋 Pipeline: {}", spec.name);
    println!("   Algorithms: {}", spec.algorithms.len());
    println!("   Connections: {}", spec.connections.len());
    println!();

    let targets = targets(&loaded, sink.as_deref())?;
    tracing::debug!("Updating {} target(s)", targets.len());
    if (extent.is_some() || piece.is_some()) && targets.len() != 1 {
        bail!("--extent and --piece need a single target; pick one with --sink");
    }

    let labels: std::collections::HashMap<AlgorithmId, String> = loaded
        .pipeline
        .algorithm_ids()
        .map(|id| (id, loaded.pipeline.label(id)))
        .collect();
    let mut events = loaded.pipeline.subscribe_events();

    let event_task = tokio::spawn(async move {
        let label = |id: AlgorithmId| labels.get(&id).cloned().unwrap_or_else(|| id.to_string());
        while let Ok(event) = events.recv().await {
            match event {
                PipelineEvent::UpdateStarted { algorithm, .. } => {
                    println!("▶️  Updating {}", label(algorithm));
                }
                PipelineEvent::AlgorithmExecuted {
                    algorithm,
                    algorithm_type,
                    request,
                    duration_ms,
                    ..
                } => {
                    println!(
                        "  ⚡ {} ({}) answered {} in {}ms",
                        label(algorithm),
                        algorithm_type,
                        request,
                        duration_ms
                    );
                }
                PipelineEvent::RequestFailed {
                    algorithm,
                    request,
                    error,
                    ..
                } => {
                    println!("  ❌ {} failed {}: {}", label(algorithm), request, error);
                }
                PipelineEvent::AlgorithmEvent {
                    algorithm, event, ..
                } => match event {
                    AlgorithmEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", label(algorithm), message);
                    }
                    AlgorithmEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", label(algorithm), message);
                    }
                    AlgorithmEvent::Progress { amount, text } => match text {
                        Some(text) => println!(
                            "     📊 [{}] {:.0}% - {}",
                            label(algorithm),
                            amount * 100.0,
                            text
                        ),
                        None => println!("     📊 [{}] {:.0}%", label(algorithm), amount * 100.0),
                    },
                },
                PipelineEvent::UpdateCompleted {
                    algorithm,
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ {} updated in {}ms", label(algorithm), duration_ms);
                    } else {
                        println!("💥 {} failed after {}ms", label(algorithm), duration_ms);
                    }
                }
            }
        }
    });

    let result = update_targets(&mut loaded.pipeline, &targets, extent, piece);

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();
    result?;

    let pipeline = &loaded.pipeline;
    println!();
    println!("📊 Update Summary:");
    println!("   Pipeline ID: {}", pipeline.id());
    for id in pipeline.execution_order()? {
        let executed = pipeline.execution_count(id);
        let extent = pipeline
            .last_executed_extent(id, 0)
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {} executed {} time(s), last extent {}",
            pipeline.label(id),
            executed,
            extent
        );
    }

    println!();
    println!("📤 Outputs:");
    for &target in &targets {
        let summary = pipeline
            .output_data_object(target, 0)
            .map(|handle| match downcast_data::<ImageData>(&handle) {
                Some(image) => image.summary(),
                None => handle.data_type_name().to_string(),
            })
            .unwrap_or_else(|| "(no data)".to_string());
        println!("   {}: {}", pipeline.label(target), summary);
    }

    Ok(())
}

fn update_targets(
    pipeline: &mut Pipeline,
    targets: &[AlgorithmId],
    extent: Option<Extent>,
    piece: Option<PieceRequest>,
) -> Result<()> {
    for &target in targets {
        if let Err(e) = update_target(pipeline, target, extent, piece) {
            tracing::error!("Updating {} failed: {}", pipeline.label(target), e);
            return Err(e.into());
        }
    }
    Ok(())
}

fn update_target(
    pipeline: &mut Pipeline,
    target: AlgorithmId,
    extent: Option<Extent>,
    piece: Option<PieceRequest>,
) -> pipecore::Result<()> {
    if let Some(extent) = extent {
        tracing::debug!("Requesting extent {} of {}", extent, pipeline.label(target));
        pipeline.update_information(target)?;
        pipeline.set_update_extent(target, 0, extent)?;
    }
    if let Some(piece) = piece {
        pipeline.update_information(target)?;
        pipeline.set_update_piece(target, 0, piece)?;
    }
    pipeline.update(target)
}

fn validate_pipeline(file: PathBuf) -> Result<()> {
    println!("🔍 Validating pipeline: {}", file.display());

    let (spec, mut loaded) = load(&file)?;
    let order = loaded.pipeline.execution_order()?;
    for sink in loaded.pipeline.sinks() {
        loaded
            .pipeline
            .update_information(sink)
            .map_err(|e| anyhow!("{}: {}", loaded.pipeline.label(sink), e))?;
    }

    println!("✅ Pipeline is valid:");
    println!("   Name: {}", spec.name);
    println!("   Algorithms: {}", spec.algorithms.len());
    println!("   Connections: {}", spec.connections.len());
    let order: Vec<String> = order.into_iter().map(|id| loaded.pipeline.label(id)).collect();
    println!("   Order: {}", order.join(" -> "));
    for sink in loaded.pipeline.sinks() {
        if let Some(whole) = loaded.pipeline.whole_extent(sink, 0) {
            println!("   {} whole extent: {}", loaded.pipeline.label(sink), whole);
        }
    }

    Ok(())
}

fn list_algorithms() {
    println!("📦 Available Algorithm Types:");
    println!();

    let registry = standard_registry();
    for algorithm_type in registry.list_algorithm_types() {
        if let Some(metadata) = registry.get_metadata(&algorithm_type) {
            println!("  • {} ({})", algorithm_type, metadata.category);
            println!("    {}", metadata.description);
            for port in &metadata.inputs {
                let arity = match (port.optional, port.repeatable) {
                    (true, true) => "0..n",
                    (true, false) => "0..1",
                    (false, true) => "1..n",
                    (false, false) => "1",
                };
                println!("    in  {} : {} [{}]", port.name, port.data_type, arity);
            }
            for port in &metadata.outputs {
                println!("    out {} : {}", port.name, port.data_type);
            }
        } else {
            println!("  • {}", algorithm_type);
        }
    }
}

fn create_example_pipeline(output: PathBuf) -> Result<()> {
    let mut spec = PipelineSpec::new("Example Smoothing Pipeline");
    spec.description = Some("Generates a ramp, smooths it and logs the result".to_string());

    spec.add_algorithm(
        AlgorithmSpec::new("grid", "source.grid")
            .with_config("whole_extent", serde_json::json!([0, 31, 0, 31, 0, 0]))
            .with_config("maximum_pieces", 4)
            .with_release_data(),
    )
    .add_algorithm(AlgorithmSpec::new("smooth", "filter.smooth").with_config("radius", 2))
    .add_algorithm(
        AlgorithmSpec::new("rescale", "filter.shift_scale")
            .with_config("shift", -10.0)
            .with_config("scale", 0.5),
    )
    .add_algorithm(AlgorithmSpec::new("inspect", "debug.inspect"));

    spec.connect("grid", "smooth")
        .connect("smooth", "rescale")
        .connect("rescale", "inspect");

    std::fs::write(&output, spec.to_json()?)?;

    println!("✨ Created example pipeline: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  pipe run --file {} --sink inspect --extent 4,20,4,20,0,0",
        output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipenodes::{GridSource, ShiftScaleFilter};

    #[test]
    fn test_parse_piece() {
        assert_eq!(parse_piece("1/4").unwrap(), PieceRequest::new(1, 4, 0));
        assert_eq!(parse_piece("0/2/1").unwrap(), PieceRequest::new(0, 2, 1));
        assert!(parse_piece("1").is_err());
        assert!(parse_piece("a/b").is_err());
    }

    #[test]
    fn test_update_targets_reports_unconnected_filter() {
        let mut pipeline = Pipeline::new();
        let extent = Extent::new(0, 3, 0, 3, 0, 0);
        let grid = pipeline.add_algorithm(Box::new(GridSource::new(Extent::new(0, 7, 0, 7, 0, 0))));
        let rescale = pipeline.add_algorithm(Box::new(ShiftScaleFilter::default()));

        assert!(update_targets(&mut pipeline, &[grid, rescale], Some(extent), None).is_err());
        assert_eq!(pipeline.last_executed_extent(grid, 0), Some(extent));
        assert_eq!(pipeline.execution_count(rescale), 0);
    }
}
