//! Uploaded image decoding and RGB frame resampling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("{0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero width or height")]
    Empty,
    #[error("invalid frame data length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A decoded image as packed 8-bit RGB (`width * height * 3` bytes).
#[derive(Clone, Debug)]
pub struct RgbFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbFrame {
    /// Decode an encoded image (JPEG, PNG, WebP, ...) into RGB.
    ///
    /// The format is sniffed from the bytes; alpha is discarded and
    /// grayscale is expanded to three channels.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::from_raw(rgb.into_raw(), width, height)
    }

    /// Wrap already-packed RGB bytes, checking the length matches.
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(ImageError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Sample one channel at (x, y) with bilinear interpolation.
    ///
    /// Coordinates outside the frame read as 0 (black border).
    pub(crate) fn sample_bilinear(&self, sx: f32, sy: f32, channel: usize) -> f32 {
        let w = self.width as i32;
        let h = self.height as i32;

        let x0 = sx.floor() as i32;
        let y0 = sy.floor() as i32;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let at = |x: i32, y: i32| -> f32 {
            if x >= 0 && x < w && y >= 0 && y < h {
                self.data[(y as usize * self.width as usize + x as usize) * 3 + channel] as f32
            } else {
                0.0
            }
        };

        at(x0, y0) * (1.0 - fx) * (1.0 - fy)
            + at(x0 + 1, y0) * fx * (1.0 - fy)
            + at(x0, y0 + 1) * (1.0 - fx) * fy
            + at(x0 + 1, y0 + 1) * fx * fy
    }
}

/// Resize an RGB frame with bilinear interpolation (edge-clamped).
pub fn resize_bilinear(frame: &RgbFrame, new_w: usize, new_h: usize) -> Vec<u8> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    let mut resized = vec![0u8; new_w * new_h * 3];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let tl = frame.data[(y0 * width + x0) * 3 + c] as f32;
                let tr = frame.data[(y0 * width + x1) * 3 + c] as f32;
                let bl = frame.data[(y1 * width + x0) * 3 + c] as f32;
                let br = frame.data[(y1 * width + x1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[(y * new_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    resized
}
