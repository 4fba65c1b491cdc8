// src/vehicle_detection.rs

use crate::onnx::YoloSession;
use crate::types::{DetectionBox, Frame};
use anyhow::Result;
use tracing::debug;

// COCO class id for "car". The intake flow assumes at most one vehicle of
// interest per frame.
const CAR_CLASS_ID: u32 = 2;
const COCO_CLASSES: usize = 80;

/// Vehicle-detector capability. Returns every raw detection for the frame,
/// in detector output order; selection policy lives in the stage.
pub trait VehicleDetector: Send {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<DetectionBox>>;
}

pub struct OnnxVehicleDetector {
    session: YoloSession,
}

impl OnnxVehicleDetector {
    pub fn new(model_path: &str, num_threads: usize, use_cuda: bool) -> Result<Self> {
        Ok(Self {
            session: YoloSession::new(model_path, COCO_CLASSES, num_threads, use_cuda)?,
        })
    }
}

impl VehicleDetector for OnnxVehicleDetector {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<DetectionBox>> {
        // No NMS here: the stage keeps the first qualifying detection in
        // output order, so the order must be the model's own.
        self.session.detect(frame, conf_threshold)
    }
}

/// Wraps the vehicle-detector capability: finds the car, crops its region
/// of interest.
pub struct VehiclePresenceStage {
    detector: Box<dyn VehicleDetector>,
    confidence_threshold: f32,
}

impl VehiclePresenceStage {
    pub fn new(detector: Box<dyn VehicleDetector>, confidence_threshold: f32) -> Self {
        Self {
            detector,
            confidence_threshold,
        }
    }

    /// `Ok(None)` means no qualifying vehicle in the frame; the caller
    /// labels the frame "No car detected" and skips the later stages.
    pub fn detect(&mut self, frame: &Frame) -> Result<Option<(Frame, [f32; 4])>> {
        let detections = self.detector.detect(frame, self.confidence_threshold)?;

        // First qualifying detection in detector output order wins.
        let hit = detections
            .iter()
            .find(|det| det.class_id == CAR_CLASS_ID && det.confidence > self.confidence_threshold);

        let Some(det) = hit else {
            debug!(frame = frame.index, "no vehicle detected");
            return Ok(None);
        };

        debug!(
            frame = frame.index,
            confidence = det.confidence,
            "vehicle at [{:.0}, {:.0}, {:.0}, {:.0}]",
            det.bbox[0],
            det.bbox[1],
            det.bbox[2],
            det.bbox[3]
        );

        match frame.crop(&det.bbox) {
            Some(roi) => Ok(Some((roi, det.bbox))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedDetector {
        detections: Vec<DetectionBox>,
    }

    impl VehicleDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame, _conf: f32) -> Result<Vec<DetectionBox>> {
            Ok(self.detections.clone())
        }
    }

    fn frame(width: usize, height: usize) -> Frame {
        Frame {
            index: 0,
            data: vec![0u8; width * height * 3],
            width,
            height,
        }
    }

    fn det(class_id: u32, conf: f32, bbox: [f32; 4]) -> DetectionBox {
        DetectionBox {
            bbox,
            confidence: conf,
            class_id,
        }
    }

    #[test]
    fn test_first_qualifying_detection_wins() {
        let detector = ScriptedDetector {
            detections: vec![
                det(7, 0.9, [0.0, 0.0, 10.0, 10.0]),  // truck, wrong class
                det(CAR_CLASS_ID, 0.6, [10.0, 10.0, 30.0, 30.0]),
                det(CAR_CLASS_ID, 0.95, [40.0, 40.0, 60.0, 60.0]), // higher score, later
            ],
        };
        let mut stage = VehiclePresenceStage::new(Box::new(detector), 0.5);

        let (roi, bbox) = stage.detect(&frame(100, 100)).unwrap().unwrap();
        assert_eq!(bbox, [10.0, 10.0, 30.0, 30.0]);
        assert_eq!(roi.width, 20);
        assert_eq!(roi.height, 20);
    }

    #[test]
    fn test_below_threshold_is_absence() {
        let detector = ScriptedDetector {
            detections: vec![det(CAR_CLASS_ID, 0.4, [0.0, 0.0, 50.0, 50.0])],
        };
        let mut stage = VehiclePresenceStage::new(Box::new(detector), 0.5);
        assert!(stage.detect(&frame(100, 100)).unwrap().is_none());
    }

    #[test]
    fn test_empty_detections_is_absence() {
        let detector = ScriptedDetector { detections: vec![] };
        let mut stage = VehiclePresenceStage::new(Box::new(detector), 0.5);
        assert!(stage.detect(&frame(100, 100)).unwrap().is_none());
    }

    #[test]
    fn test_degenerate_box_is_absence() {
        let detector = ScriptedDetector {
            detections: vec![det(CAR_CLASS_ID, 0.9, [120.0, 120.0, 140.0, 140.0])],
        };
        let mut stage = VehiclePresenceStage::new(Box::new(detector), 0.5);
        // box entirely outside the frame crops to nothing
        assert!(stage.detect(&frame(100, 100)).unwrap().is_none());
    }
}
