// src/part_detection.rs

use crate::annotate::{Canvas, GREEN};
use crate::error::PipelineError;
use crate::onnx::{nms, YoloSession};
use crate::types::{DetectionBox, Frame};
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

const NMS_IOU_THRESHOLD: f32 = 0.45;

/// The closed part taxonomy, in detector class-id order. A class id outside
/// this range is a defect in the model contract, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PartName {
    Bonnet,
    Bumper,
    Dickey,
    Door,
    Fender,
    Light,
    Windshield,
}

impl PartName {
    pub const COUNT: usize = 7;

    pub fn from_class_id(class_id: u32) -> Result<Self, PipelineError> {
        match class_id {
            0 => Ok(Self::Bonnet),
            1 => Ok(Self::Bumper),
            2 => Ok(Self::Dickey),
            3 => Ok(Self::Door),
            4 => Ok(Self::Fender),
            5 => Ok(Self::Light),
            6 => Ok(Self::Windshield),
            other => Err(PipelineError::detection(
                "parts",
                format!("class id {other} outside part taxonomy"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bonnet => "Bonnet",
            Self::Bumper => "Bumper",
            Self::Dickey => "Dickey",
            Self::Door => "Door",
            Self::Fender => "Fender",
            Self::Light => "Light",
            Self::Windshield => "Windshield",
        }
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected vehicle part with its resolved taxonomy name.
#[derive(Debug, Clone)]
pub struct PartDetection {
    pub part: PartName,
    pub detection: DetectionBox,
}

/// Part-detector capability over an annotated frame.
pub trait PartDetector: Send {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<DetectionBox>>;
}

pub struct OnnxPartDetector {
    session: YoloSession,
}

impl OnnxPartDetector {
    pub fn new(model_path: &str, num_threads: usize, use_cuda: bool) -> Result<Self> {
        Ok(Self {
            session: YoloSession::new(model_path, PartName::COUNT, num_threads, use_cuda)?,
        })
    }
}

impl PartDetector for OnnxPartDetector {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<DetectionBox>> {
        let detections = self.session.detect(frame, conf_threshold)?;
        Ok(nms(detections, NMS_IOU_THRESHOLD))
    }
}

/// `0 <= x1 < x2 <= width` and `0 <= y1 < y2 <= height`.
fn validate_box(bbox: &[f32; 4], width: usize, height: usize) -> Result<(), PipelineError> {
    let [x1, y1, x2, y2] = *bbox;
    let valid =
        x1 >= 0.0 && x1 < x2 && x2 <= width as f32 && y1 >= 0.0 && y1 < y2 && y2 <= height as f32;
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Geometry(format!(
            "box {bbox:?} outside {width}x{height} frame"
        )))
    }
}

/// Wraps the part-detector capability: validates geometry, resolves each box
/// through the part taxonomy, annotates the frame.
pub struct PartDetectionStage {
    detector: Box<dyn PartDetector>,
    confidence_threshold: f32,
}

impl PartDetectionStage {
    pub fn new(detector: Box<dyn PartDetector>, confidence_threshold: f32) -> Self {
        Self {
            detector,
            confidence_threshold,
        }
    }

    /// Returns the annotated frame plus the surviving part detections. A box
    /// with invalid geometry is logged and skipped; the rest are processed.
    /// An empty detection list returns the frame visually unchanged.
    pub fn detect_parts(&mut self, frame: &Frame) -> Result<(Frame, Vec<PartDetection>)> {
        let detections = self.detector.detect(frame, self.confidence_threshold)?;

        if detections.is_empty() {
            return Ok((frame.clone(), Vec::new()));
        }

        let mut canvas = Canvas::from_frame(frame)?;
        let mut parts = Vec::with_capacity(detections.len());

        for det in &detections {
            // Invalid geometry skips this box only, never the rest.
            if let Err(e) = validate_box(&det.bbox, frame.width, frame.height) {
                warn!(frame = frame.index, error = %e, "skipping detection");
                continue;
            }

            let part = PartName::from_class_id(det.class_id)?;
            let label = format!("{} {}%", part, (det.confidence * 100.0) as i32);

            canvas.rect(&det.bbox, GREEN)?;
            canvas.text(&label, det.bbox[0] as i32, det.bbox[1] as i32 - 10, 0.6, GREEN)?;

            parts.push(PartDetection {
                part,
                detection: *det,
            });
        }

        debug!(frame = frame.index, parts = parts.len(), "parts pass");
        Ok((canvas.into_frame(frame.index)?, parts))
    }
}
