use anyhow::Error;
use base64::prelude::{Engine, BASE64_STANDARD};
use image::{imageops, RgbImage};

use crate::utils::coordinate::FaceBox;

/// decode_image_bytes decodes an encoded raster (PNG, JPEG, ...) into an RGB8 image.
pub fn decode_image_bytes(im_bytes: &[u8]) -> Result<RgbImage, Error> {
    let decoded = image::load_from_memory(im_bytes)?;
    Ok(decoded.to_rgb8())
}

/// decode_selfie_data_url decodes an inline `data:image/...;base64,...` payload.
///
/// The payload must carry an image media type, a comma separator and a
/// base64-encoded body that decodes into a valid raster.
pub fn decode_selfie_data_url(data_url: &str) -> Result<RgbImage, Error> {
    if !data_url.starts_with("data:image/") {
        return Err(Error::msg("selfie payload is not an image data URL"));
    }
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| Error::msg("selfie data URL has no comma separator"))?;
    if !header.contains(";base64") {
        return Err(Error::msg("selfie data URL does not declare base64 encoding"));
    }
    let im_bytes = BASE64_STANDARD.decode(payload)?;
    decode_image_bytes(&im_bytes)
}

/// crop_face cuts the detected face region out of the source image.
///
/// The crop always covers at least one pixel inside the image, so a box
/// degenerated to zero area at an image edge still yields a non-empty raster
/// for the embedder.
pub fn crop_face(img: &RgbImage, bbox: &FaceBox) -> RgbImage {
    let clamped = bbox.clamped(img.width(), img.height());
    let x = (clamped.x1.floor() as u32).min(img.width().saturating_sub(1));
    let y = (clamped.y1.floor() as u32).min(img.height().saturating_sub(1));
    let w = (clamped.width().ceil() as u32)
        .max(1)
        .min(img.width().saturating_sub(x).max(1));
    let h = (clamped.height().ceil() as u32)
        .max(1)
        .min(img.height().saturating_sub(y).max(1));
    imageops::crop_imm(img, x, y, w, h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([64, 128, 192]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn png_data_url(width: u32, height: u32) -> String {
        format!(
            "data:image/png;base64,{}",
            BASE64_STANDARD.encode(png_bytes(width, height))
        )
    }

    #[test]
    fn test_decode_valid_data_url() {
        let img = decode_selfie_data_url(&png_data_url(4, 3)).unwrap();
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 3);
    }

    #[test]
    fn test_decode_rejects_missing_prefix() {
        let payload = format!("text/plain;base64,{}", BASE64_STANDARD.encode(b"hello"));
        assert!(decode_selfie_data_url(&payload).is_err());
    }

    #[test]
    fn test_decode_rejects_missing_comma() {
        assert!(decode_selfie_data_url("data:image/png;base64").is_err());
    }

    #[test]
    fn test_decode_rejects_missing_base64_marker() {
        let payload = format!("data:image/png,{}", BASE64_STANDARD.encode(png_bytes(2, 2)));
        assert!(decode_selfie_data_url(&payload).is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(decode_selfie_data_url("data:image/png;base64,@@not-base64@@").is_err());
    }

    #[test]
    fn test_decode_rejects_non_raster_body() {
        let payload = format!(
            "data:image/png;base64,{}",
            BASE64_STANDARD.encode(b"definitely not a png")
        );
        assert!(decode_selfie_data_url(&payload).is_err());
    }

    #[test]
    fn test_decode_image_bytes_normalizes_to_rgb() {
        let img = decode_image_bytes(&png_bytes(5, 5)).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [64, 128, 192]);
    }

    #[test]
    fn test_crop_face_clamps_out_of_bounds_box() {
        let img = RgbImage::new(20, 20);
        let bbox = FaceBox {
            x1: 10.0,
            y1: 10.0,
            x2: 40.0,
            y2: 40.0,
            score: 0.9,
        };
        let crop = crop_face(&img, &bbox);
        assert_eq!(crop.width(), 10);
        assert_eq!(crop.height(), 10);
    }

    #[test]
    fn test_crop_face_box_past_right_edge_stays_inside_image() {
        let img = RgbImage::new(20, 20);
        let bbox = FaceBox {
            x1: 20.0,
            y1: 5.0,
            x2: 30.0,
            y2: 15.0,
            score: 0.9,
        };
        let crop = crop_face(&img, &bbox);
        assert_eq!(crop.width(), 1);
        assert_eq!(crop.height(), 10);
    }

    #[test]
    fn test_crop_face_zero_area_corner_box_yields_single_pixel() {
        let img = RgbImage::new(20, 20);
        let bbox = FaceBox {
            x1: 25.0,
            y1: 25.0,
            x2: 30.0,
            y2: 30.0,
            score: 0.9,
        };
        let crop = crop_face(&img, &bbox);
        assert_eq!(crop.width(), 1);
        assert_eq!(crop.height(), 1);
    }
}
