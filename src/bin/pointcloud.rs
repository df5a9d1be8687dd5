//! pointcloud - offline point cloud tools.
//!
//! `extract` runs the service pipeline on a local image; `inspect` decodes a
//! buffer produced by the service.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use face_pointcloud::{
    decode_points, encode_points, BackendRegistry, PointSet, ServiceConfig, RECORD_BYTES,
};

#[derive(Parser, Debug)]
#[command(name = "pointcloud", about = "Extract and inspect point cloud buffers")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the face/keypoint pipeline on an image file
    Extract {
        /// Input image
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Write the binary buffer here
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,

        /// Face-mesh ONNX model (overrides POINTCLOUD_LANDMARK_MODEL)
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,
    },
    /// Decode a point cloud buffer
    Inspect {
        /// Buffer written by `extract` or returned by the service
        #[arg(long, value_name = "PATH")]
        buffer: PathBuf,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct Summary<'a> {
    branch: Option<String>,
    count: usize,
    bytes: usize,
    points: &'a PointSet,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match args.command {
        Command::Extract {
            image,
            output,
            json,
            model,
        } => extract(image, output, json, model),
        Command::Inspect { buffer, json } => inspect(buffer, json),
    }
}

fn extract(
    image: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    model: Option<PathBuf>,
) -> Result<()> {
    let mut config = ServiceConfig::load()?;
    if model.is_some() {
        config.detect.landmark_model = model;
    }
    let pipeline = BackendRegistry::from_settings(&config.detect)?.pipeline()?;

    let bytes = std::fs::read(&image)
        .map_err(|e| anyhow!("failed to read image {}: {}", image.display(), e))?;
    let selection = pipeline.process(&bytes)?;
    let encoded = encode_points(&selection.points);

    if let Some(path) = &output {
        std::fs::write(path, &encoded)
            .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
    }
    if json {
        let summary = Summary {
            branch: Some(selection.branch.to_string()),
            count: selection.points.len(),
            bytes: encoded.len(),
            points: &selection.points,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} points via {} branch ({} bytes)",
            image.display(),
            selection.points.len(),
            selection.branch,
            encoded.len()
        );
    }
    Ok(())
}

fn inspect(buffer: PathBuf, json: bool) -> Result<()> {
    let bytes = std::fs::read(&buffer)
        .map_err(|e| anyhow!("failed to read buffer {}: {}", buffer.display(), e))?;
    let points = decode_points(&bytes)?;

    if json {
        let summary = Summary {
            branch: None,
            count: points.len(),
            bytes: bytes.len(),
            points: &points,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{}: {} records ({} bytes, {} bytes/record)",
        buffer.display(),
        points.len(),
        bytes.len(),
        RECORD_BYTES
    );
    for (i, p) in points.iter().enumerate() {
        println!(
            "{:>5}  x={:.4} y={:.4} z={:+.4}  rgb=({:.3}, {:.3}, {:.3})",
            i, p.x, p.y, p.z, p.r, p.g, p.b
        );
    }
    Ok(())
}
