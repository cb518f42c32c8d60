//! Frame annotations for the visualization collaborator
//!
//! The guidance core decides which role each box plays; drawing is left to
//! whoever consumes the [`AnnotatedFrame`]:
//! - the box currently pursued
//! - boxes matching an already located target
//! - every other box

use serde::{Deserialize, Serialize};
use tracing::trace;
use uav_core::{BoundingBox, Detection, TrackId, TrackedDetection, WorkMode};

use crate::{Frame, VisionConfig};

/// Role a box plays in the current guidance decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxRole {
    /// Target currently being pursued
    Current,
    /// Matches a target that was already located
    Located,
    Other,
}

impl BoxRole {
    /// Suggested drawing color in BGR order
    pub fn color_bgr(&self) -> (u8, u8, u8) {
        match self {
            BoxRole::Current => (0, 0, 255),
            BoxRole::Located => (0, 255, 0),
            BoxRole::Other => (255, 0, 0),
        }
    }
}

/// One labelled box on a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub role: BoxRole,
    pub label: String,
    pub track_id: Option<TrackId>,
}

/// A frame plus the boxes the guidance step classified on it
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub annotations: Vec<Annotation>,
    pub mode: WorkMode,
}

impl AnnotatedFrame {
    /// Frame with no annotations
    pub fn raw(frame: Frame, mode: WorkMode) -> Self {
        Self {
            frame,
            annotations: Vec::new(),
            mode,
        }
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn count(&self, role: BoxRole) -> usize {
        self.annotations.iter().filter(|a| a.role == role).count()
    }

    pub fn is_raw(&self) -> bool {
        self.annotations.is_empty()
    }
}

/// Builds labelled annotations from detector and tracker output
#[derive(Debug, Clone)]
pub struct Annotator {
    config: VisionConfig,
}

impl Annotator {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn class_name(&self, class_id: usize) -> String {
        self.config.class_name(class_id)
    }

    pub fn detection(&self, detection: &Detection, role: BoxRole) -> Annotation {
        Annotation {
            bbox: detection.bbox,
            role,
            label: self.label(detection, None),
            track_id: None,
        }
    }

    pub fn tracked(&self, tracked: &TrackedDetection, role: BoxRole) -> Annotation {
        Annotation {
            bbox: tracked.detection.bbox,
            role,
            label: self.label(&tracked.detection, Some(tracked.track_id)),
            track_id: Some(tracked.track_id),
        }
    }

    fn label(&self, detection: &Detection, track_id: Option<TrackId>) -> String {
        let annotation = &self.config.annotation;
        let mut label = String::new();

        if annotation.show_track_ids {
            if let Some(id) = track_id {
                label.push_str(&format!("{id} "));
            }
        }
        label.push_str(&self.config.class_name(detection.class_id));
        if annotation.show_scores {
            label.push_str(&format!(" {:.2}", detection.score));
        }
        label
    }

    /// Text rendering of a frame's annotations (for logging/debugging)
    pub fn format_overlay_text(&self, annotated: &AnnotatedFrame) -> String {
        let mut output = format!(
            "=== {} | {} boxes ({} current, {} located) ===\n",
            annotated.mode,
            annotated.annotations.len(),
            annotated.count(BoxRole::Current),
            annotated.count(BoxRole::Located),
        );

        for annotation in &annotated.annotations {
            let (cx, cy) = annotation.bbox.center();
            trace!(label = %annotation.label, role = ?annotation.role, cx, cy, "annotation");
            output.push_str(&format!(
                "[{:?}] {} @ ({:.0}, {:.0})\n",
                annotation.role, annotation.label, cx, cy
            ));
        }

        output
    }
}

// ============================================================================
// TESTS
// ============================================================================
