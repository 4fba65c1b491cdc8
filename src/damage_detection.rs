// src/damage_detection.rs

use crate::annotate::{Canvas, RED, WHITE};
use crate::onnx::{nms, YoloSession};
use crate::types::{DetectionBox, Frame};
use anyhow::Result;
use tracing::debug;

// Damage model classes: dent, scratch, crack, glass shatter, lamp broken,
// tire flat.
const DAMAGE_CLASSES: usize = 6;
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// One damage detection with its rendered overlay text.
#[derive(Debug, Clone)]
pub struct DamageRegion {
    pub detection: DetectionBox,
    pub text: String,
}

/// Damage-segmentation capability over a full frame.
pub trait DamageDetector: Send {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<DetectionBox>>;
}

pub struct OnnxDamageDetector {
    session: YoloSession,
}

impl OnnxDamageDetector {
    pub fn new(model_path: &str, num_threads: usize, use_cuda: bool) -> Result<Self> {
        Ok(Self {
            session: YoloSession::new(model_path, DAMAGE_CLASSES, num_threads, use_cuda)?,
        })
    }
}

impl DamageDetector for OnnxDamageDetector {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<DetectionBox>> {
        let detections = self.session.detect(frame, conf_threshold)?;
        Ok(nms(detections, NMS_IOU_THRESHOLD))
    }
}

/// Wraps the damage-detector capability: annotates every damage region on a
/// working copy of the full frame plus a frame-level damage counter.
pub struct DamageSegmentationStage {
    detector: Box<dyn DamageDetector>,
    confidence_threshold: f32,
}

impl DamageSegmentationStage {
    pub fn new(detector: Box<dyn DamageDetector>, confidence_threshold: f32) -> Self {
        Self {
            detector,
            confidence_threshold,
        }
    }

    /// Returns the annotated frame and the damage regions. The caller must
    /// treat the returned frame as the one to pass downstream; the input
    /// frame is left untouched.
    pub fn segment(&mut self, frame: &Frame) -> Result<(Frame, Vec<DamageRegion>)> {
        let detections = self.detector.detect(frame, self.confidence_threshold)?;

        let mut canvas = Canvas::from_frame(frame)?;
        let mut regions = Vec::with_capacity(detections.len());

        for det in &detections {
            let text = format!("Damage: {}, {:.2}%", det.class_id, det.confidence * 100.0);
            canvas.rect(&det.bbox, RED)?;
            canvas.text(&text, det.bbox[0] as i32, det.bbox[1] as i32 - 10, 0.5, WHITE)?;
            regions.push(DamageRegion {
                detection: *det,
                text,
            });
        }

        canvas.banner(&format!("Total Damage Parts: {}", regions.len()))?;

        debug!(frame = frame.index, regions = regions.len(), "damage pass");
        Ok((canvas.into_frame(frame.index)?, regions))
    }
}
