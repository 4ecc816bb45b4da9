//! Frame type and image processing — YUYV conversion, dark detection,
//! JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    /// RGB24 pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Average luma (0.0–255.0), BT.601 integer weights.
    pub fn avg_luma(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let total: u64 = self
            .data
            .chunks_exact(3)
            .map(|px| luma(px[0], px[1], px[2]) as u64)
            .sum();
        total as f32 / (self.data.len() / 3) as f32
    }

    /// Encode as JPEG at the given quality (1–100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// View the frame as an `image` buffer (copies the pixel data).
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert packed YUYV (4:2:2) to RGB24 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; U and V are
/// shared by the pixel pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as i32 - 128;
        let v = quad[3] as i32 - 128;
        for &y in [quad[0], quad[2]].iter() {
            let c = 298 * (y as i32 - 16);
            rgb.push(clamp_u8((c + 409 * v + 128) >> 8));
            rgb.push(clamp_u8((c - 100 * u - 208 * v + 128) >> 8));
            rgb.push(clamp_u8((c + 516 * u + 128) >> 8));
        }
    }
    Ok(rgb)
}

/// Check if an RGB frame is dark: true when more than `threshold_pct`
/// of pixels have luma below 32.
pub fn is_dark_frame(rgb: &[u8], threshold_pct: f32) -> bool {
    if rgb.len() < 3 {
        return true;
    }
    let pixels = rgb.len() / 3;
    let dark_count = rgb
        .chunks_exact(3)
        .filter(|px| luma(px[0], px[1], px[2]) < 32)
        .count();
    (dark_count as f32 / pixels as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_yuyv_neutral_chroma_gives_gray() {
        // U = V = 128 means zero chroma: R, G and B must come out equal.
        let yuyv = vec![128, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
        assert_eq!(rgb[3], rgb[4]);
        assert_eq!(rgb[4], rgb[5]);
        // Brighter Y gives a brighter pixel.
        assert!(rgb[3] > rgb[0]);
    }

    #[test]
    fn test_yuyv_black_and_white_extremes() {
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        assert_eq!(&rgb[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![128, 128];
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_dark_frame_all_black() {
        let rgb = vec![0u8; 3000];
        assert!(is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        let rgb = vec![128u8; 3000];
        assert!(!is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_mostly_dark() {
        // 96% dark, 4% bright: should be dark.
        let mut rgb = vec![10u8; 960 * 3];
        rgb.extend(vec![128u8; 40 * 3]);
        assert!(is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_jpeg_encode_produces_jpeg_magic() {
        let frame = frame_of(vec![90u8; 16 * 16 * 3], 16, 16);
        let jpeg = frame.to_jpeg(90).unwrap();
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_avg_luma_uniform_gray() {
        let frame = frame_of(vec![100u8; 8 * 8 * 3], 8, 8);
        let luma = frame.avg_luma();
        assert!((luma - 100.0).abs() < 1.5, "luma was {luma}");
    }

    #[test]
    fn test_to_rgb_image_dimensions() {
        let frame = frame_of(vec![0u8; 4 * 2 * 3], 4, 2);
        let img = frame.to_rgb_image().unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
    }
}
