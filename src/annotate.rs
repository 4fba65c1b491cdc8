// src/annotate.rs
//
// Copy-on-annotate drawing over RGB frames, plus JPEG/base64 output
// encoding. A `Canvas` is a private working copy; the source frame is
// never touched.

use crate::error::PipelineError;
use crate::types::Frame;
use anyhow::Result;
use base64::Engine;
use opencv::{
    core::{self, Mat, Scalar},
    imgproc,
    prelude::*,
};
use std::path::Path;

pub const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
pub const RED: (f64, f64, f64) = (255.0, 0.0, 0.0);
pub const WHITE: (f64, f64, f64) = (255.0, 255.0, 255.0);

pub struct Canvas {
    mat: Mat,
    width: i32,
    height: i32,
}

impl Canvas {
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mat = Mat::from_slice(&frame.data)?;
        let mat = mat.reshape(3, frame.height as i32)?;
        let mat = mat.try_clone()?;

        Ok(Self {
            mat,
            width: frame.width as i32,
            height: frame.height as i32,
        })
    }

    /// Draw a corner-format box, clamped to the frame bounds.
    pub fn rect(&mut self, bbox: &[f32; 4], color: (f64, f64, f64)) -> Result<()> {
        let x1 = (bbox[0].max(0.0) as i32).min(self.width);
        let y1 = (bbox[1].max(0.0) as i32).min(self.height);
        let x2 = (bbox[2].max(0.0) as i32).min(self.width);
        let y2 = (bbox[3].max(0.0) as i32).min(self.height);

        if x2 <= x1 || y2 <= y1 {
            return Ok(());
        }

        imgproc::rectangle(
            &mut self.mat,
            core::Rect::new(x1, y1, x2 - x1, y2 - y1),
            Scalar::new(color.0, color.1, color.2, 0.0),
            2,
            imgproc::LINE_8,
            0,
        )?;
        Ok(())
    }

    pub fn text(
        &mut self,
        text: &str,
        x: i32,
        y: i32,
        scale: f64,
        color: (f64, f64, f64),
    ) -> Result<()> {
        imgproc::put_text(
            &mut self.mat,
            text,
            core::Point::new(x.max(0), y.max(10)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            scale,
            Scalar::new(color.0, color.1, color.2, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )?;
        Ok(())
    }

    /// Frame-level counter overlay at the bottom center.
    pub fn banner(&mut self, text: &str) -> Result<()> {
        let x = (self.width / 2 - 120).max(10);
        let y = (self.height - 20).max(10);
        self.text(text, x, y, 0.6, WHITE)
    }

    pub fn into_frame(self, index: u64) -> Result<Frame> {
        let data = self.mat.data_bytes()?.to_vec();
        Ok(Frame {
            index,
            data,
            width: self.width as usize,
            height: self.height as usize,
        })
    }
}

/// Encode an RGB frame as JPEG bytes.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, PipelineError> {
    use image::{ImageBuffer, RgbImage};
    use std::io::Cursor;

    let expected_len = frame.width * frame.height * 3;
    if frame.data.len() < expected_len {
        return Err(PipelineError::Encoding(format!(
            "frame {} buffer too short: {} < {}",
            frame.index,
            frame.data.len(),
            expected_len
        )));
    }

    let img: RgbImage = ImageBuffer::from_raw(
        frame.width as u32,
        frame.height as u32,
        frame.data[..expected_len].to_vec(),
    )
    .ok_or_else(|| PipelineError::Encoding("invalid frame dimensions".to_string()))?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 85);
    img.write_with_encoder(encoder)
        .map_err(|e| PipelineError::Encoding(e.to_string()))?;

    Ok(buf.into_inner())
}

/// Encode an RGB frame as a base64 JPEG string for the JSON payload.
pub fn encode_base64_jpeg(frame: &Frame) -> Result<String, PipelineError> {
    let jpeg = encode_jpeg(frame)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
}

/// Write an annotated frame to the processed-frames directory. Best-effort:
/// the caller logs and moves on when this fails.
pub fn write_jpeg(frame: &Frame, dir: &Path) -> Result<(), PipelineError> {
    let jpeg = encode_jpeg(frame)?;
    let path = dir.join(format!("frame_{}.jpg", frame.index));
    std::fs::write(&path, jpeg).map_err(|e| PipelineError::Encoding(e.to_string()))
}
