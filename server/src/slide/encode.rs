//! Pixel buffer encoding for tile responses

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use super::types::{ImageFormat, SlideError};

/// Encodes decoded regions into response bytes
#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    jpeg_quality: u8,
}

impl TileEncoder {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Encode `rgba` as `format`.
    ///
    /// JPEG drops the alpha channel. RAW is the premultiplied RGBA8 layout
    /// produced by [`to_premultiplied_rgba`].
    pub fn encode(&self, rgba: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>, SlideError> {
        let (width, height) = rgba.dimensions();
        let mut buffer = Vec::new();

        match format {
            ImageFormat::Png => PngEncoder::new(&mut buffer)
                .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| SlideError::EncodeError(format!("PNG encoding failed: {}", e)))?,
            ImageFormat::Jpg => {
                let rgb = image::DynamicImage::ImageRgba8(rgba.clone()).into_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
                    .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| SlideError::EncodeError(format!("JPEG encoding failed: {}", e)))?
            }
            ImageFormat::Bmp => BmpEncoder::new(&mut buffer)
                .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| SlideError::EncodeError(format!("BMP encoding failed: {}", e)))?,
            ImageFormat::Raw => buffer = to_premultiplied_rgba(rgba),
        }

        Ok(buffer)
    }
}

/// Convert straight RGBA to premultiplied RGBA8, row-major, top row first.
///
/// Output is exactly `4 * width * height` bytes with no header.
pub fn to_premultiplied_rgba(rgba: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgba.as_raw().len());
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        out.extend_from_slice(&[premultiply(r, a), premultiply(g, a), premultiply(b, a), a]);
    }
    out
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    ((u16::from(channel) * u16::from(alpha) + 127) / 255) as u8
}

/// Mirror a decoded region left to right
pub fn flip_horizontal(rgba: &RgbaImage) -> RgbaImage {
    image::imageops::flip_horizontal(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 10) as u8, (y * 10) as u8, 128, 255])
        })
    }

    #[test]
    fn test_png_roundtrips_pixels() {
        let img = gradient(8, 4);
        let bytes = TileEncoder::new(90).encode(&img, ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_jpeg_and_bmp_have_expected_magic() {
        let img = gradient(16, 16);
        let encoder = TileEncoder::new(85);

        let jpg = encoder.encode(&img, ImageFormat::Jpg).unwrap();
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);

        let bmp = encoder.encode(&img, ImageFormat::Bmp).unwrap();
        assert_eq!(&bmp[..2], b"BM");
    }

    #[test]
    fn test_raw_is_premultiplied_rgba() {
        let img = RgbaImage::from_vec(2, 1, vec![200, 100, 50, 255, 200, 100, 50, 128]).unwrap();
        let raw = TileEncoder::new(90).encode(&img, ImageFormat::Raw).unwrap();

        assert_eq!(raw.len(), 2 * 4);
        assert_eq!(&raw[..4], &[200, 100, 50, 255]);
        assert_eq!(&raw[4..], &[100, 50, 25, 128]);
    }

    #[test]
    fn test_transparent_pixels_become_zero() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([255, 255, 255, 0]));
        assert!(to_premultiplied_rgba(&img).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flip_horizontal_reverses_rows() {
        let img = gradient(4, 2);
        let flipped = flip_horizontal(&img);
        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(flipped.get_pixel(x, y), img.get_pixel(3 - x, y));
            }
        }
    }
}
