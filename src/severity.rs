// src/severity.rs

use crate::onnx::ClassifierSession;
use crate::types::Frame;
use anyhow::Result;

// The damage severity head is a 3-way classifier.
const SEVERITY_CLASSES: usize = 3;

/// Severity-classifier capability: discrete class index for a vehicle ROI.
/// Deterministic for a given ROI and model.
pub trait SeverityClassifier: Send {
    fn classify(&mut self, roi: &Frame) -> Result<u32>;
}

pub struct OnnxSeverityClassifier {
    session: ClassifierSession,
}

impl OnnxSeverityClassifier {
    pub fn new(model_path: &str, num_threads: usize, use_cuda: bool) -> Result<Self> {
        Ok(Self {
            session: ClassifierSession::new(model_path, SEVERITY_CLASSES, num_threads, use_cuda)?,
        })
    }
}

impl SeverityClassifier for OnnxSeverityClassifier {
    fn classify(&mut self, roi: &Frame) -> Result<u32> {
        self.session.classify(roi)
    }
}

/// Wraps the classifier capability; the class index becomes the frame label.
pub struct SeverityClassifierStage {
    classifier: Box<dyn SeverityClassifier>,
}

impl SeverityClassifierStage {
    pub fn new(classifier: Box<dyn SeverityClassifier>) -> Self {
        Self { classifier }
    }

    pub fn classify(&mut self, roi: &Frame) -> Result<String> {
        let class = self.classifier.classify(roi)?;
        Ok(class.to_string())
    }
}
