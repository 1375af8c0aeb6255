use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::partition::ManifestFiles;

/// Bounding box struct for detection results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Minimum x coordinate of the bounding box.
    pub xmin: f32,
    /// Minimum y coordinate of the bounding box.
    pub ymin: f32,
    /// Maximum x coordinate of the bounding box.
    pub xmax: f32,
    /// Maximum y coordinate of the bounding box.
    pub ymax: f32,
    /// Confidence score of the bounding box.
    pub confidence: f32,
    /// Class index of the bounding box.
    pub class: u32,
}

/// Detections for one image or video frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Image or video the detections come from.
    pub source: PathBuf,
    /// Detected boxes.
    pub boxes: Vec<BoundingBox>,
}

/// Weights file or hub name of a detection model, e.g. `yolov8n.pt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef(pub String);

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Prediction parameters forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictParams {
    /// The confidence threshold for the model
    pub confidence_threshold: f32,
    /// The non-maximum suppression IoU threshold
    pub nms_threshold: f32,
    /// Inference image size
    pub image_size: u32,
    /// Device, e.g. `cpu` or `0`; `None` lets the model pick
    pub device: Option<String>,
    /// Restrict detection to these classes
    pub classes: Option<Vec<u32>>,
    /// Whether the model saves annotated outputs
    pub save: bool,
}

impl Default for PredictParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            image_size: 640,
            device: None,
            classes: None,
            save: true,
        }
    }
}

/// Training hyperparameters forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    /// Number of epochs.
    pub epochs: u32,
    /// Epochs without improvement before stopping early.
    pub patience: u32,
    /// Batch size.
    pub batch: u32,
    /// Training image size.
    pub image_size: u32,
    /// Data loader workers.
    pub workers: u32,
    /// Device, e.g. `cpu` or `0`.
    pub device: Option<String>,
    /// Initial learning rate.
    pub lr0: f32,
    /// Final learning rate as a fraction of `lr0`.
    pub lrf: f32,
    /// Optimizer momentum.
    pub momentum: f32,
    /// Weight decay.
    pub weight_decay: f32,
    /// Run name used for the output directory.
    pub name: Option<String>,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            epochs: 100,
            patience: 100,
            batch: 8,
            image_size: 640,
            workers: 8,
            device: None,
            lr0: 0.01,
            lrf: 0.01,
            momentum: 0.937,
            weight_decay: 0.0005,
            name: None,
        }
    }
}

/// Weights produced by a training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelArtifact {
    /// Weights after the last epoch.
    pub last: PathBuf,
    /// Best weights by validation metric, when tracked.
    pub best: Option<PathBuf>,
}

/// Object detection model consuming the curated dataset.
///
/// This crate ships no implementation: it only prepares the image/label pairs
/// and split manifests a model backend trains and predicts on.
pub trait DetectionModel {
    /// Backend error type.
    type Error: std::error::Error;

    /// Run detection on an image, a video or a directory of either.
    fn detect(
        &self,
        model: &ModelRef,
        source: &Path,
        params: &PredictParams,
    ) -> Result<Vec<DetectionResult>, Self::Error>;

    /// Train on the split manifests written by the partitioner.
    fn train(
        &self,
        model: &ModelRef,
        data: &ManifestFiles,
        params: &TrainParams,
    ) -> Result<ModelArtifact, Self::Error>;
}
