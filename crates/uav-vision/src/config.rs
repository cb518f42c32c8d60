//! Configuration for the vision module

use serde::{Deserialize, Serialize};

use crate::{VisionError, VisionResult};

/// Vehicle classes of the default detector model, in class-index order
pub const VEHICLE_CLASSES: [&str; 13] = [
    "SUV",
    "Van",
    "BoxTruck",
    "Pickup",
    "Sedan",
    "Trailer",
    "Truck",
    "ForkLift",
    "Jeep",
    "Motor",
    "Bulldozer",
    "Excavator",
    "RoadRoller",
];

/// Configuration for the vision pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Detections scoring below this are discarded
    pub confidence_threshold: f32,
    /// Class names indexed by detector class id
    pub class_names: Vec<String>,
    /// Annotation settings
    pub annotation: AnnotationConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            class_names: VEHICLE_CLASSES.iter().map(|name| name.to_string()).collect(),
            annotation: AnnotationConfig::default(),
        }
    }
}

/// Annotation label settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Append the detector score to labels
    pub show_scores: bool,
    /// Prefix labels with the tracker id when one is known
    pub show_track_ids: bool,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            show_scores: true,
            show_track_ids: true,
        }
    }
}

impl VisionConfig {
    /// Lower threshold for sparse scenes where misses cost more than false hits
    pub fn high_recall() -> Self {
        Self {
            confidence_threshold: 0.25,
            ..Default::default()
        }
    }

    /// Name for a class index; unknown indices render as `class_<n>`
    pub fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    pub fn validate(&self) -> VisionResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(VisionError::invalid_config(format!(
                "confidence threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}
