// src/pipeline.rs
//
// Per-frame state machine. A sampled frame either fails to decode (skipped),
// has no vehicle (terminal, still emitted in all-frames mode), or flows
// vehicle -> severity -> damage -> parts -> pricing. Any stage error drops
// that frame and processing continues with the next sampled index; only a
// failure to open the video is fatal to the request.

use crate::annotate::{self, Canvas, GREEN};
use crate::catalog::PriceCatalog;
use crate::damage_detection::DamageSegmentationStage;
use crate::error::PipelineError;
use crate::part_detection::{PartDetectionStage, PartName};
use crate::pricing::{self, PriceQuote};
use crate::severity::SeverityClassifierStage;
use crate::types::Frame;
use crate::vehicle_detection::VehiclePresenceStage;
use crate::video::{FrameSampler, VideoSource};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub const NO_CAR_LABEL: &str = "No car detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One label and image per successfully processed or no-vehicle frame,
    /// in sampling order.
    AllFrames,
    /// Only the most informative frame, plus aggregate metadata.
    BestFrame,
}

#[derive(Debug, Clone)]
pub struct VehicleIdentity {
    pub brand: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub mode: Mode,
    /// Present in priced (best-frame) requests; without it no catalog
    /// lookups are made and quotes stay empty.
    pub vehicle: Option<VehicleIdentity>,
    /// Sampling stops when the deadline expires; whatever has accumulated
    /// is returned as a partial result.
    pub deadline: Option<Instant>,
}

/// Outcome bundle for one sampled frame.
pub struct FrameResult {
    pub index: u64,
    pub label: String,
    pub annotated: Frame,
    /// Damage-overlay rendition of the frame; absent for no-vehicle frames.
    pub masked: Option<Frame>,
    pub quotes: BTreeMap<PartName, PriceQuote>,
    pub part_count: usize,
}

enum FrameOutcome {
    /// Terminal: no qualifying vehicle. Counted, emitted in all-frames
    /// mode, never competes for best.
    NoVehicle(FrameResult),
    Processed(FrameResult),
}

/// The request's answer, assembled once.
pub enum PipelineResult {
    AllFrames {
        /// Parallel arrays, same length.
        frames: Vec<String>,
        labels: Vec<String>,
    },
    Best(Option<BestFrame>),
}

#[derive(Debug, Serialize)]
pub struct BestFrame {
    /// base64 JPEG of the fully annotated frame
    pub frame: String,
    pub label: String,
    pub part_prices: BTreeMap<PartName, PriceQuote>,
    /// base64 JPEG of the damage-overlay frame
    pub masked_image: String,
    pub total_detected_parts: usize,
}

/// Online, single-pass policy that retains the most informative processed
/// frame. Strict `>` on detected-part count: the first frame reaching a
/// given maximum wins, ties never replace.
pub struct BestFrameSelector {
    best: Option<FrameResult>,
    best_count: usize,
}

impl BestFrameSelector {
    pub fn new() -> Self {
        Self {
            best: None,
            best_count: 0,
        }
    }

    pub fn offer(&mut self, result: FrameResult) {
        if result.label == NO_CAR_LABEL {
            return;
        }
        if result.part_count > self.best_count {
            self.best_count = result.part_count;
            self.best = Some(result);
        }
    }

    pub fn finish(self) -> Option<FrameResult> {
        self.best
    }
}

pub struct Pipeline {
    vehicle: VehiclePresenceStage,
    severity: SeverityClassifierStage,
    damage: DamageSegmentationStage,
    parts: PartDetectionStage,
    catalog: Arc<dyn PriceCatalog>,
    processed_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        vehicle: VehiclePresenceStage,
        severity: SeverityClassifierStage,
        damage: DamageSegmentationStage,
        parts: PartDetectionStage,
        catalog: Arc<dyn PriceCatalog>,
        processed_dir: PathBuf,
    ) -> Self {
        Self {
            vehicle,
            severity,
            damage,
            parts,
            catalog,
            processed_dir,
        }
    }

    pub fn run(
        &mut self,
        video: &mut dyn VideoSource,
        opts: &RequestOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let sampler = FrameSampler::new(video.fps(), video.frame_count());
        info!(
            interval = sampler.interval(),
            frames = video.frame_count(),
            "sampling video"
        );

        let mut collected: Vec<FrameResult> = Vec::new();
        let mut selector = BestFrameSelector::new();

        for index in sampler.indices() {
            if let Some(deadline) = opts.deadline {
                if Instant::now() >= deadline {
                    info!(frame = index, "request deadline reached, returning partial result");
                    break;
                }
            }

            let frame = match video.read_at(index) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    warn!(frame = index, "skipping empty or corrupted frame");
                    continue;
                }
                Err(e) => {
                    let err = PipelineError::FrameDecode {
                        index,
                        reason: e.to_string(),
                    };
                    warn!(frame = index, error = %err, "skipping undecodable frame");
                    continue;
                }
            };

            let outcome = match self.process_frame(frame, opts) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(frame = index, error = %e, "frame failed, dropping");
                    continue;
                }
            };

            match outcome {
                FrameOutcome::NoVehicle(result) => {
                    if opts.mode == Mode::AllFrames {
                        collected.push(result);
                    }
                }
                FrameOutcome::Processed(result) => {
                    if let Err(e) = annotate::write_jpeg(&result.annotated, &self.processed_dir) {
                        warn!(frame = result.index, error = %e, "could not persist annotated frame");
                    }
                    match opts.mode {
                        Mode::AllFrames => collected.push(result),
                        Mode::BestFrame => selector.offer(result),
                    }
                }
            }
        }

        match opts.mode {
            Mode::AllFrames => {
                let mut frames = Vec::with_capacity(collected.len());
                let mut labels = Vec::with_capacity(collected.len());
                for result in collected {
                    // An unencodable frame drops its label too, keeping the
                    // arrays parallel.
                    match annotate::encode_base64_jpeg(&result.annotated) {
                        Ok(b64) => {
                            frames.push(b64);
                            labels.push(result.label);
                        }
                        Err(e) => {
                            warn!(frame = result.index, error = %e, "could not encode frame, skipping")
                        }
                    }
                }
                Ok(PipelineResult::AllFrames { frames, labels })
            }
            Mode::BestFrame => {
                let best = selector.finish().and_then(|result| {
                    let frame = annotate::encode_base64_jpeg(&result.annotated);
                    let masked = result
                        .masked
                        .as_ref()
                        .map(annotate::encode_base64_jpeg)
                        .transpose();
                    match (frame, masked) {
                        (Ok(frame), Ok(masked)) => Some(BestFrame {
                            frame,
                            label: result.label,
                            part_prices: result.quotes,
                            masked_image: masked.unwrap_or_default(),
                            total_detected_parts: result.part_count,
                        }),
                        (Err(e), _) | (_, Err(e)) => {
                            warn!(frame = result.index, error = %e, "could not encode best frame");
                            None
                        }
                    }
                });
                Ok(PipelineResult::Best(best))
            }
        }
    }

    fn process_frame(
        &mut self,
        frame: Frame,
        opts: &RequestOptions,
    ) -> Result<FrameOutcome, PipelineError> {
        let detected = self
            .vehicle
            .detect(&frame)
            .map_err(|e| PipelineError::detection("vehicle", e))?;

        let Some((roi, bbox)) = detected else {
            return Ok(FrameOutcome::NoVehicle(FrameResult {
                index: frame.index,
                label: NO_CAR_LABEL.to_string(),
                annotated: frame,
                masked: None,
                quotes: BTreeMap::new(),
                part_count: 0,
            }));
        };

        let label = self
            .severity
            .classify(&roi)
            .map_err(|e| PipelineError::detection("severity", e))?;

        let base = annotate_vehicle(&frame, &bbox, &label)
            .map_err(|e| PipelineError::detection("vehicle", e))?;

        let (masked, _regions) = self
            .damage
            .segment(&base)
            .map_err(|e| PipelineError::detection("damage", e))?;

        let (final_frame, parts) = self
            .parts
            .detect_parts(&masked)
            .map_err(|e| PipelineError::detection("parts", e))?;

        let quotes = match &opts.vehicle {
            Some(v) => pricing::estimate(self.catalog.as_ref(), &v.brand, &v.model, &parts),
            None => BTreeMap::new(),
        };

        Ok(FrameOutcome::Processed(FrameResult {
            index: frame.index,
            label,
            annotated: final_frame,
            masked: Some(masked),
            quotes,
            part_count: parts.len(),
        }))
    }
}

/// Vehicle box and severity label on a working copy of the frame.
fn annotate_vehicle(frame: &Frame, bbox: &[f32; 4], label: &str) -> anyhow::Result<Frame> {
    let mut canvas = Canvas::from_frame(frame)?;
    canvas.rect(bbox, GREEN)?;
    canvas.text(label, bbox[0] as i32, bbox[1] as i32 - 10, 0.5, GREEN)?;
    canvas.into_frame(frame.index)
}
