use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::DetectSettings;
use crate::pipeline::PointCloudPipeline;

use super::backend::{KeypointBackend, LandmarkBackendFactory};
use super::backends::{FastKeypointBackend, NoFaceBackend};

/// Registry of detector backends, keyed by backend name.
pub struct BackendRegistry {
    landmarks: HashMap<String, Arc<dyn LandmarkBackendFactory>>,
    keypoints: HashMap<String, Arc<dyn KeypointBackend>>,
    default_landmarks: Option<String>,
    default_keypoints: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            landmarks: HashMap::new(),
            keypoints: HashMap::new(),
            default_landmarks: None,
            default_keypoints: None,
        }
    }

    /// Builds the registry described by `settings`.
    ///
    /// The FAST detector and the face-less landmark capability are always
    /// registered. A configured landmark model adds the tract backend and
    /// makes it the default; a configured keypoint backend name must match a
    /// registered one.
    pub fn from_settings(settings: &DetectSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register_keypoints(
            FastKeypointBackend::new().with_threshold(settings.keypoint_threshold),
        );
        registry.register_landmarks(NoFaceBackend::new());

        if let Some(model_path) = &settings.landmark_model {
            registry.register_landmark_model(model_path, settings)?;
            registry.set_default_landmarks("tract")?;
        }
        if let Some(name) = &settings.keypoint_backend {
            registry.set_default_keypoints(name)?;
        }
        Ok(registry)
    }

    #[cfg(feature = "backend-tract")]
    fn register_landmark_model(
        &mut self,
        model_path: &std::path::Path,
        settings: &DetectSettings,
    ) -> Result<()> {
        let factory =
            super::backends::TractFaceMeshFactory::new(model_path, settings.model_input_size)?
                .with_threshold(settings.face_threshold);
        self.register_landmarks(factory);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    fn register_landmark_model(
        &mut self,
        model_path: &std::path::Path,
        _settings: &DetectSettings,
    ) -> Result<()> {
        Err(anyhow!(
            "landmark model {} configured, but this build lacks the backend-tract feature",
            model_path.display()
        ))
    }

    /// Register a landmark factory. The first one registered becomes the default.
    pub fn register_landmarks<F: LandmarkBackendFactory + 'static>(&mut self, factory: F) {
        let name = factory.name().to_string();
        if self.default_landmarks.is_none() {
            self.default_landmarks = Some(name.clone());
        }
        self.landmarks.insert(name, Arc::new(factory));
    }

    /// Register a keypoint backend. The first one registered becomes the default.
    pub fn register_keypoints<K: KeypointBackend + 'static>(&mut self, backend: K) {
        let name = backend.name().to_string();
        if self.default_keypoints.is_none() {
            self.default_keypoints = Some(name.clone());
        }
        self.keypoints.insert(name, Arc::new(backend));
    }

    pub fn set_default_landmarks(&mut self, name: &str) -> Result<()> {
        if !self.landmarks.contains_key(name) {
            return Err(anyhow!("landmark backend '{}' not registered", name));
        }
        self.default_landmarks = Some(name.to_string());
        Ok(())
    }

    pub fn set_default_keypoints(&mut self, name: &str) -> Result<()> {
        if !self.keypoints.contains_key(name) {
            return Err(anyhow!("keypoint backend '{}' not registered", name));
        }
        self.default_keypoints = Some(name.to_string());
        Ok(())
    }

    pub fn landmarks(&self, name: &str) -> Option<Arc<dyn LandmarkBackendFactory>> {
        self.landmarks.get(name).cloned()
    }

    pub fn keypoints(&self, name: &str) -> Option<Arc<dyn KeypointBackend>> {
        self.keypoints.get(name).cloned()
    }

    /// List registered backends as `(landmark names, keypoint names)`, sorted.
    pub fn list(&self) -> (Vec<String>, Vec<String>) {
        let mut landmarks: Vec<String> = self.landmarks.keys().cloned().collect();
        let mut keypoints: Vec<String> = self.keypoints.keys().cloned().collect();
        landmarks.sort();
        keypoints.sort();
        (landmarks, keypoints)
    }

    /// Build a pipeline from the default backends.
    pub fn pipeline(&self) -> Result<PointCloudPipeline> {
        let landmarks = self
            .default_landmarks
            .as_deref()
            .and_then(|name| self.landmarks(name))
            .ok_or_else(|| anyhow!("no landmark backend registered"))?;
        let keypoints = self
            .default_keypoints
            .as_deref()
            .and_then(|name| self.keypoints(name))
            .ok_or_else(|| anyhow!("no keypoint backend registered"))?;
        log::info!(
            "pipeline backends: landmarks={} keypoints={}",
            landmarks.name(),
            keypoints.name()
        );
        Ok(PointCloudPipeline::new(landmarks, keypoints))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::{StubKeypointBackend, StubLandmarkFactory};

    #[test]
    fn first_registered_backend_is_default() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register_landmarks(NoFaceBackend::new());
        registry.register_landmarks(StubLandmarkFactory::new());
        registry.register_keypoints(FastKeypointBackend::new());

        let pipeline = registry.pipeline()?;
        assert_eq!(pipeline.landmark_backend_name(), "none");
        assert_eq!(pipeline.keypoint_backend_name(), "fast");

        registry.set_default_landmarks("stub")?;
        assert_eq!(registry.pipeline()?.landmark_backend_name(), "stub");
        Ok(())
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = BackendRegistry::new();
        registry.register_keypoints(StubKeypointBackend::default());
        assert!(registry.set_default_landmarks("tract").is_err());
        assert!(registry.set_default_keypoints("orb").is_err());
        assert!(registry.pipeline().is_err());
    }

    #[test]
    fn settings_without_model_register_builtin_backends() -> Result<()> {
        let registry = BackendRegistry::from_settings(&DetectSettings::default())?;
        let (landmarks, keypoints) = registry.list();
        assert_eq!(landmarks, vec!["none".to_string()]);
        assert_eq!(keypoints, vec!["fast".to_string()]);
        Ok(())
    }

    #[test]
    fn configured_keypoint_backend_must_be_registered() -> Result<()> {
        let settings = DetectSettings {
            keypoint_backend: Some("fast".to_string()),
            ..DetectSettings::default()
        };
        let pipeline = BackendRegistry::from_settings(&settings)?.pipeline()?;
        assert_eq!(pipeline.keypoint_backend_name(), "fast");

        let settings = DetectSettings {
            keypoint_backend: Some("akaze".to_string()),
            ..DetectSettings::default()
        };
        let err = BackendRegistry::from_settings(&settings).err().expect("unknown backend");
        assert!(err.to_string().contains("akaze"));
        Ok(())
    }
}
