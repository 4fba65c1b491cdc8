// src/video.rs

use crate::error::PipelineError;
use crate::types::Frame;
use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::path::Path;
use tracing::info;

/// A decoded video a request can sample frames from. Behind a trait so the
/// orchestrator can be driven by a synthetic source in tests.
pub trait VideoSource {
    fn fps(&self) -> f64;
    fn frame_count(&self) -> u64;
    /// Seek to `index` and decode one frame. `Ok(None)` means the frame was
    /// empty or corrupt; an error means the read itself failed. Either way
    /// the caller skips that index and continues.
    fn read_at(&mut self, index: u64) -> Result<Option<Frame>>;
}

/// OpenCV-backed video. The capture handle is exclusively owned by one
/// request and released on drop.
pub struct VideoAsset {
    cap: VideoCapture,
    fps: f64,
    frame_count: u64,
}

impl VideoAsset {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        info!("Opening video: {}", path.display());

        let path_str = path
            .to_str()
            .ok_or_else(|| PipelineError::VideoOpen("non-UTF8 path".to_string()))?;

        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| PipelineError::VideoOpen(e.to_string()))?;

        if !cap
            .is_opened()
            .map_err(|e| PipelineError::VideoOpen(e.to_string()))?
        {
            return Err(PipelineError::VideoOpen(format!(
                "could not open {}",
                path.display()
            )));
        }

        let fps = cap
            .get(videoio::CAP_PROP_FPS)
            .map_err(|e| PipelineError::VideoOpen(e.to_string()))?;
        let frame_count = cap
            .get(videoio::CAP_PROP_FRAME_COUNT)
            .map_err(|e| PipelineError::VideoOpen(e.to_string()))? as u64;

        info!("Video properties: {:.1} FPS, {} frames", fps, frame_count);

        Ok(Self {
            cap,
            fps,
            frame_count,
        })
    }
}

impl VideoSource for VideoAsset {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn read_at(&mut self, index: u64) -> Result<Option<Frame>> {
        self.cap.set(videoio::CAP_PROP_POS_FRAMES, index as f64)?;

        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let width = rgb_mat.cols() as usize;
        let height = rgb_mat.rows() as usize;
        let data = rgb_mat.data_bytes()?.to_vec();

        Ok(Some(Frame {
            index,
            data,
            width,
            height,
        }))
    }
}

/// Sparse, ordered frame-selection policy: one frame per second of video,
/// indices `0, k, 2k, ...` with `k = max(1, floor(fps))`.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    interval: u64,
    frame_count: u64,
}

impl FrameSampler {
    pub fn new(fps: f64, frame_count: u64) -> Self {
        // floor(fps), clamped to 1 so sub-1fps clips still advance
        let interval = (fps.floor() as i64).max(1) as u64;
        Self {
            interval,
            frame_count,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Lazy, restartable sequence of sampled frame indices.
    pub fn indices(&self) -> impl Iterator<Item = u64> {
        let interval = self.interval;
        (0..self.frame_count).step_by(interval as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_frame_per_second() {
        let sampler = FrameSampler::new(10.0, 30);
        assert_eq!(sampler.indices().collect::<Vec<_>>(), vec![0, 10, 20]);
    }

    #[test]
    fn test_interval_floors_fps() {
        let sampler = FrameSampler::new(29.97, 100);
        assert_eq!(sampler.interval(), 29);
        assert_eq!(sampler.indices().collect::<Vec<_>>(), vec![0, 29, 58, 87]);
    }

    #[test]
    fn test_low_fps_clamps_interval_to_one() {
        let sampler = FrameSampler::new(0.5, 4);
        assert_eq!(sampler.interval(), 1);
        assert_eq!(sampler.indices().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_deterministic_for_same_inputs() {
        let a: Vec<u64> = FrameSampler::new(24.0, 240).indices().collect();
        let b: Vec<u64> = FrameSampler::new(24.0, 240).indices().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_restartable() {
        let sampler = FrameSampler::new(5.0, 12);
        let first: Vec<u64> = sampler.indices().collect();
        let second: Vec<u64> = sampler.indices().collect();
        assert_eq!(first, vec![0, 5, 10]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_video() {
        let sampler = FrameSampler::new(30.0, 0);
        assert_eq!(sampler.indices().count(), 0);
    }
}
