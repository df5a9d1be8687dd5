#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{LandmarkBackend, LandmarkBackendFactory, LandmarkOptions};
use crate::detect::result::FaceLandmarks;

/// Default square input edge of the MediaPipe face-mesh model.
pub const DEFAULT_INPUT_SIZE: u32 = 256;

type FaceMeshPlan = TypedRunnableModel<TypedModel>;

/// Tract-based face-mesh landmark capability.
///
/// The factory owns the optimized plan. Each request gets a backend that
/// runs the plan with fresh per-call state, so nothing carries over between
/// requests. The model takes one NHWC `[1, size, size, 3]` float input in
/// `[0, 1]` and yields the flattened landmark tensor (input pixel units)
/// followed by a face-presence logit.
pub struct TractFaceMeshFactory {
    plan: Arc<FaceMeshPlan>,
    input_size: u32,
    face_threshold: f32,
}

impl TractFaceMeshFactory {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, size, size, 3]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            plan: Arc::new(plan),
            input_size,
            face_threshold: 0.5,
        })
    }

    /// Override the face-presence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.face_threshold = threshold;
        self
    }
}

impl LandmarkBackendFactory for TractFaceMeshFactory {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn create(&self, options: &LandmarkOptions) -> Result<Box<dyn LandmarkBackend>> {
        Ok(Box::new(TractFaceMesh {
            plan: self.plan.clone(),
            outputs: FaceMeshOutputs {
                input_size: self.input_size,
                face_threshold: self.face_threshold,
                max_faces: options.max_faces,
            },
        }))
    }
}

struct TractFaceMesh {
    plan: Arc<FaceMeshPlan>,
    outputs: FaceMeshOutputs,
}

impl TractFaceMesh {
    fn build_input(&self, image: &RgbImage) -> Tensor {
        let size = self.outputs.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, size as usize, size as usize, 3),
            |(_, y, x, channel)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl LandmarkBackend for TractFaceMesh {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceLandmarks>> {
        if self.outputs.max_faces == 0 {
            return Ok(Vec::new());
        }
        let input = self.build_input(image);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.outputs.decode(&outputs)
    }
}

/// Interpretation of the face-mesh output tensors.
#[derive(Clone, Copy, Debug)]
struct FaceMeshOutputs {
    input_size: u32,
    face_threshold: f32,
    max_faces: usize,
}

impl FaceMeshOutputs {
    /// Landmarks in `[0, 1]` image units (z on the same scale), or nothing
    /// when the presence score is under the threshold.
    fn decode(&self, outputs: &TVec<TValue>) -> Result<Vec<FaceLandmarks>> {
        let presence = self.face_presence(outputs)?;
        if presence < self.face_threshold {
            log::debug!("face presence {:.3} below threshold", presence);
            return Ok(Vec::new());
        }
        let faces = vec![self.landmarks(outputs)?];
        Ok(faces.into_iter().take(self.max_faces).collect())
    }

    fn face_presence(&self, outputs: &TVec<TValue>) -> Result<f32> {
        let flag = outputs
            .get(1)
            .ok_or_else(|| anyhow!("model produced no face flag output"))?;
        let logit = flag
            .to_array_view::<f32>()
            .context("face flag tensor was not f32")?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("face flag tensor was empty"))?;
        Ok(sigmoid(logit))
    }

    fn landmarks(&self, outputs: &TVec<TValue>) -> Result<FaceLandmarks> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scale = self.input_size as f32;
        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .context("landmark tensor was not f32")?
            .iter()
            .map(|v| v / scale)
            .collect();
        if values.is_empty() || values.len() % 3 != 0 {
            return Err(anyhow!(
                "landmark tensor has {} values, expected a multiple of 3",
                values.len()
            ));
        }
        Ok(FaceLandmarks::from_flat(&values))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
