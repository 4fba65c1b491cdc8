// src/types.rs

/// One sampled raster image. Pixels are packed RGB24, row-major.
///
/// Stages never mutate a frame they were handed; annotation always produces
/// a new `Frame` (copy-on-annotate), so a buffer read by an earlier stage is
/// never aliased by a later one.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Index of this frame in the source video.
    pub index: u64,
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    /// Crop to a bounding box, clamped to the frame bounds. Returns `None`
    /// when the clamped region is empty.
    pub fn crop(&self, bbox: &[f32; 4]) -> Option<Frame> {
        let x1 = (bbox[0].max(0.0) as usize).min(self.width);
        let y1 = (bbox[1].max(0.0) as usize).min(self.height);
        let x2 = (bbox[2].max(0.0) as usize).min(self.width);
        let y2 = (bbox[3].max(0.0) as usize).min(self.height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let (w, h) = (x2 - x1, y2 - y1);
        let mut data = Vec::with_capacity(w * h * 3);
        for y in y1..y2 {
            let row_start = (y * self.width + x1) * 3;
            data.extend_from_slice(&self.data[row_start..row_start + w * 3]);
        }

        Some(Frame {
            index: self.index,
            data,
            width: w,
            height: h,
        })
    }
}

/// One detected region, as produced by a detector capability.
/// Read-only downstream of the capability that produced it.
#[derive(Debug, Clone, Copy)]
pub struct DetectionBox {
    /// [x1, y1, x2, y2] in original image coordinates
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
}

impl DetectionBox {
    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: usize, height: usize) -> Frame {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        Frame {
            index: 0,
            data,
            width,
            height,
        }
    }

    #[test]
    fn test_crop_clamps_to_bounds() {
        let frame = gradient_frame(10, 10);
        let roi = frame.crop(&[-5.0, -5.0, 20.0, 20.0]).unwrap();
        assert_eq!(roi.width, 10);
        assert_eq!(roi.height, 10);
        assert_eq!(roi.data, frame.data);
    }

    #[test]
    fn test_crop_subregion() {
        let frame = gradient_frame(10, 10);
        let roi = frame.crop(&[2.0, 3.0, 6.0, 8.0]).unwrap();
        assert_eq!(roi.width, 4);
        assert_eq!(roi.height, 5);
        // top-left pixel of the crop is (2, 3) in the source
        assert_eq!(&roi.data[0..3], &[2, 3, 0]);
    }

    #[test]
    fn test_crop_empty_region() {
        let frame = gradient_frame(10, 10);
        assert!(frame.crop(&[6.0, 6.0, 6.0, 8.0]).is_none());
        assert!(frame.crop(&[12.0, 0.0, 20.0, 8.0]).is_none());
    }

    #[test]
    fn test_box_area() {
        let det = DetectionBox {
            bbox: [10.0, 20.0, 40.0, 50.0],
            confidence: 0.9,
            class_id: 0,
        };
        assert_eq!(det.area(), 900.0);
    }
}
