// src/preprocessing.rs

/// Preprocess a raw RGB image for a classifier input: resize to the model
/// resolution, normalize with ImageNet statistics, convert HWC -> CHW.
pub fn normalize_chw(
    src: &[u8],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> Vec<f32> {
    let resized = resize_bilinear(src, src_width, src_height, dst_width, dst_height);

    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    let mut output = vec![0.0f32; 3 * dst_height * dst_width];

    for c in 0..3 {
        for h in 0..dst_height {
            for w in 0..dst_width {
                let hwc_idx = (h * dst_width + w) * 3 + c;
                let chw_idx = c * dst_height * dst_width + h * dst_width + w;

                let pixel = resized[hwc_idx] as f32 / 255.0;
                output[chw_idx] = (pixel - MEAN[c]) / STD[c];
            }
        }
    }

    output
}

/// Letterbox an RGB image into a square detector input: scale to fit while
/// keeping aspect ratio, center on a gray canvas, scale pixels to [0, 1],
/// convert HWC -> CHW. Returns the tensor plus the scale and padding needed
/// to map detections back to original image coordinates.
pub fn letterbox_chw(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    target_size: usize,
) -> (Vec<f32>, f32, f32, f32) {
    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;

    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![114u8; target_size * target_size * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_x = x + pad_x as usize;
            let dst_y = y + pad_y as usize;
            let dst_idx = (dst_y * target_size + dst_x) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    let mut input = vec![0.0f32; 3 * target_size * target_size];
    for c in 0..3 {
        for h in 0..target_size {
            for w in 0..target_size {
                let hwc_idx = (h * target_size + w) * 3 + c;
                let chw_idx = c * target_size * target_size + h * target_size + w;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

/// Bilinear image resize
fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;

            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);

            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }

    dst
}
