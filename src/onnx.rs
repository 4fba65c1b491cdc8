// src/onnx.rs
//
// ONNX Runtime session wrappers for the detector and classifier models.
// A `YoloSession` runs a single-class-head YOLO export ([1, 4+C, N] output)
// and decodes it back to original image coordinates; a `ClassifierSession`
// runs a CNN classifier head and returns the argmax class index.

use crate::preprocessing::{letterbox_chw, normalize_chw};
use crate::types::{DetectionBox, Frame};
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const DETECTOR_INPUT_SIZE: usize = 640;
const CLASSIFIER_INPUT_SIZE: usize = 224;

fn build_session(model_path: &str, num_threads: usize, use_cuda: bool) -> Result<Session> {
    info!("Loading model: {}", model_path);

    let mut session_builder = Session::builder()?;

    if use_cuda {
        info!("Enabling CUDA execution provider");
        session_builder =
            session_builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(0)
                .build()])?;
    }

    let session = session_builder
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(num_threads)?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model {model_path}"))?;

    info!("✓ Model loaded: {}", model_path);
    Ok(session)
}

pub struct YoloSession {
    session: Session,
    num_classes: usize,
}

impl YoloSession {
    pub fn new(model_path: &str, num_classes: usize, num_threads: usize, use_cuda: bool) -> Result<Self> {
        let session = build_session(model_path, num_threads, use_cuda)?;
        Ok(Self {
            session,
            num_classes,
        })
    }

    /// Run the detector over a frame. Detections come back in prediction
    /// order above `conf_threshold`; apply `nms` separately where overlap
    /// suppression is wanted.
    pub fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<DetectionBox>> {
        let (input, scale, pad_x, pad_y) =
            letterbox_chw(&frame.data, frame.width, frame.height, DETECTOR_INPUT_SIZE);

        let output = self.infer(&input)?;
        let detections = self.decode(&output, scale, pad_x, pad_y, conf_threshold);

        debug!(frame = frame.index, count = detections.len(), "detector pass");
        Ok(detections)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, DETECTOR_INPUT_SIZE, DETECTOR_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    fn decode(
        &self,
        output: &[f32],
        scale: f32,
        pad_x: f32,
        pad_y: f32,
        conf_threshold: f32,
    ) -> Vec<DetectionBox> {
        let mut detections = Vec::new();

        // Output layout: [1, 4 + num_classes, N] — per prediction a center
        // box [cx, cy, w, h] followed by one confidence per class.
        let stride = 4 + self.num_classes;
        let num_preds = output.len() / stride;

        for i in 0..num_preds {
            let cx = output[i];
            let cy = output[num_preds + i];
            let w = output[num_preds * 2 + i];
            let h = output[num_preds * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0;

            for c in 0..self.num_classes {
                let conf = output[num_preds * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < conf_threshold {
                continue;
            }

            // Center format to corner format, then reverse the letterbox
            // transform to get original image coordinates.
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(DetectionBox {
                bbox: [x1, y1, x2, y2],
                confidence: max_conf,
                class_id: best_class as u32,
            });
        }

        detections
    }
}

pub struct ClassifierSession {
    session: Session,
    num_classes: usize,
}

impl ClassifierSession {
    pub fn new(model_path: &str, num_classes: usize, num_threads: usize, use_cuda: bool) -> Result<Self> {
        let session = build_session(model_path, num_threads, use_cuda)?;
        Ok(Self {
            session,
            num_classes,
        })
    }

    /// Forward pass over an ROI; returns the argmax class index.
    pub fn classify(&mut self, roi: &Frame) -> Result<u32> {
        let input = normalize_chw(
            &roi.data,
            roi.width,
            roi.height,
            CLASSIFIER_INPUT_SIZE,
            CLASSIFIER_INPUT_SIZE,
        );

        let shape = [1, 3, CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["input" => input_value])?;
        let (_, logits) = outputs[0].try_extract_tensor::<f32>()?;

        let mut best = 0usize;
        for c in 1..self.num_classes.min(logits.len()) {
            if logits[c] > logits[best] {
                best = c;
            }
        }

        debug!(class = best, "classifier pass");
        Ok(best as u32)
    }
}

/// Non-maximum suppression over corner-format boxes.
pub fn nms(mut detections: Vec<DetectionBox>, iou_threshold: f32) -> Vec<DetectionBox> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();

    while !detections.is_empty() {
        let current = detections.remove(0);
        keep.push(current);

        detections.retain(|det| iou(&current.bbox, &det.bbox) < iou_threshold);
    }

    keep
}

fn iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> DetectionBox {
        DetectionBox {
            bbox: [x1, y1, x2, y2],
            confidence: conf,
            class_id: 0,
        }
    }

    #[test]
    fn test_iou_overlap() {
        let score = iou(&[0.0, 0.0, 100.0, 100.0], &[50.0, 50.0, 150.0, 150.0]);
        assert!((score - 2500.0 / 17500.0).abs() < 0.01);
    }

    #[test]
    fn test_iou_no_overlap() {
        assert_eq!(iou(&[0.0, 0.0, 50.0, 50.0], &[100.0, 100.0, 200.0, 200.0]), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(5.0, 5.0, 105.0, 105.0, 0.8),
            det(200.0, 200.0, 300.0, 300.0, 0.7),
        ];
        let kept = nms(dets, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }
}
