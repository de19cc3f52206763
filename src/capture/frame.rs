use anyhow::{ensure, Context, Result};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};

use crate::settings::CaptureSettings;

/// Geometry and encoding applied to every sampled frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub crop_width_ratio: f32,
    pub crop_height_ratio: f32,
    pub output_width: u32,
    pub output_height: u32,
    pub jpeg_quality: u8,
}

impl From<&CaptureSettings> for FrameSpec {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            crop_width_ratio: settings.crop_width_ratio,
            crop_height_ratio: settings.crop_height_ratio,
            output_width: settings.output_width,
            output_height: settings.output_height,
            jpeg_quality: settings.jpeg_quality,
        }
    }
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

/// Centered crop rectangle `(x, y, width, height)`, never empty.
pub fn center_crop(width: u32, height: u32, width_ratio: f32, height_ratio: f32) -> (u32, u32, u32, u32) {
    let crop_w = ((width as f32 * width_ratio.clamp(0.0, 1.0)).round() as u32).clamp(1, width.max(1));
    let crop_h = ((height as f32 * height_ratio.clamp(0.0, 1.0)).round() as u32).clamp(1, height.max(1));
    let x = (width.saturating_sub(crop_w)) / 2;
    let y = (height.saturating_sub(crop_h)) / 2;
    (x, y, crop_w, crop_h)
}

/// Crop the plate zone, stretch it to the output canvas and JPEG-encode it.
pub fn prepare_frame(frame: &DynamicImage, spec: &FrameSpec) -> Result<Vec<u8>> {
    ensure!(
        frame.width() > 0 && frame.height() > 0,
        "cannot sample an empty frame"
    );
    ensure!(
        spec.output_width > 0 && spec.output_height > 0,
        "output canvas must not be empty"
    );

    let (x, y, w, h) = center_crop(
        frame.width(),
        frame.height(),
        spec.crop_width_ratio,
        spec.crop_height_ratio,
    );
    let canvas = frame
        .crop_imm(x, y, w, h)
        .resize_exact(spec.output_width, spec.output_height, FilterType::Triangle)
        .to_rgb8();

    let mut jpeg = Vec::new();
    let quality = spec.jpeg_quality.clamp(1, 100);
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&canvas)
        .context("jpeg encode failed")?;

    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    #[test]
    fn crop_is_centered_sixty_by_forty() {
        assert_eq!(center_crop(1920, 1080, 0.6, 0.4), (384, 324, 1152, 432));
        assert_eq!(center_crop(100, 50, 0.6, 0.4), (20, 15, 60, 20));
    }

    #[test]
    fn crop_never_collapses() {
        assert_eq!(center_crop(1, 1, 0.6, 0.4), (0, 0, 1, 1));
        assert_eq!(center_crop(10, 10, 0.0, 2.0), (4, 0, 1, 10));
    }

    #[test]
    fn produces_jpeg_at_canvas_size() {
        // Red border around a white plate zone.
        let mut img = RgbImage::from_pixel(400, 300, Rgb([200, 0, 0]));
        for x in 80..320 {
            for y in 90..210 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let spec = FrameSpec {
            output_width: 320,
            output_height: 180,
            ..FrameSpec::default()
        };

        let jpeg = prepare_frame(&DynamicImage::ImageRgb8(img), &spec).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (320, 180));
        // The crop sits entirely inside the white zone.
        let center = decoded.to_rgb8().get_pixel(160, 90).0;
        assert!(center.iter().all(|&c| c > 230), "center pixel {center:?}");
    }

    #[test]
    fn rejects_empty_frames() {
        let empty = DynamicImage::new_rgb8(0, 0);
        assert!(prepare_frame(&empty, &FrameSpec::default()).is_err());
    }
}
