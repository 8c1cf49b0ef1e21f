//! Camera buffer conversion and box drawing

use contracts::{BoundingBox2D, ImageData, ImageFormat};
use image::{Rgb, RgbImage};

use crate::error::{DatasetError, Result};

/// Box outline color
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Box outline thickness (pixels)
const BOX_THICKNESS: u32 = 2;

/// Decode a raw camera buffer into an RGB image, dropping alpha
pub fn to_rgb_image(image: &ImageData) -> Result<RgbImage> {
    let bpp = image.format.bytes_per_pixel();
    let expected = image.width as usize * image.height as usize * bpp;
    if image.data.len() != expected {
        return Err(DatasetError::invalid_image(format!(
            "{}x{} {:?} needs {} bytes, got {}",
            image.width,
            image.height,
            image.format,
            expected,
            image.data.len()
        )));
    }

    let rgb: Vec<u8> = match image.format {
        ImageFormat::Rgb8 => image.data.to_vec(),
        ImageFormat::Rgba8 => image
            .data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        ImageFormat::Bgra8 => image
            .data
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
    };

    RgbImage::from_raw(image.width, image.height, rgb)
        .ok_or_else(|| DatasetError::invalid_image("pixel buffer does not fit image size"))
}

/// Draw box outlines in place; boxes are clipped to the image
pub fn draw_boxes(canvas: &mut RgbImage, boxes: &[BoundingBox2D]) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let clamp_u = |u: f64| (u.max(0.0) as u32).min(width - 1);
    let clamp_v = |v: f64| (v.max(0.0) as u32).min(height - 1);

    for bbox in boxes {
        let (u1, u2) = (clamp_u(bbox.u_min), clamp_u(bbox.u_max));
        let (v1, v2) = (clamp_v(bbox.v_min), clamp_v(bbox.v_max));

        for t in 0..BOX_THICKNESS {
            for u in u1..=u2 {
                canvas.put_pixel(u, v1.saturating_add(t).min(v2), BOX_COLOR);
                canvas.put_pixel(u, v2.saturating_sub(t).max(v1), BOX_COLOR);
            }
            for v in v1..=v2 {
                canvas.put_pixel(u1.saturating_add(t).min(u2), v, BOX_COLOR);
                canvas.put_pixel(u2.saturating_sub(t).max(u1), v, BOX_COLOR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn bgra(width: u32, height: u32) -> ImageData {
        let data: Vec<u8> = (0..width * height)
            .flat_map(|_| [10u8, 20, 30, 255])
            .collect();
        ImageData {
            width,
            height,
            fov: 90.0,
            format: ImageFormat::Bgra8,
            data: Bytes::from(data),
        }
    }

    #[test]
    fn test_bgra_is_swapped_to_rgb() {
        let rgb = to_rgb_image(&bgra(4, 3)).unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(2, 1), &Rgb([30, 20, 10]));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let mut image = bgra(4, 3);
        image.data = image.data.slice(..10);
        assert!(matches!(
            to_rgb_image(&image),
            Err(DatasetError::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_draw_boxes_outlines_only() {
        let mut canvas = RgbImage::new(20, 20);
        draw_boxes(
            &mut canvas,
            &[BoundingBox2D {
                u_min: 2.0,
                v_min: 3.0,
                u_max: 12.0,
                v_max: 15.0,
            }],
        );
        assert_eq!(canvas.get_pixel(2, 3), &BOX_COLOR);
        assert_eq!(canvas.get_pixel(12, 10), &BOX_COLOR);
        assert_eq!(canvas.get_pixel(7, 9), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_boxes_clips_to_canvas() {
        let mut canvas = RgbImage::new(10, 10);
        draw_boxes(
            &mut canvas,
            &[BoundingBox2D {
                u_min: -5.0,
                v_min: -5.0,
                u_max: 50.0,
                v_max: 50.0,
            }],
        );
        assert_eq!(canvas.get_pixel(9, 9), &BOX_COLOR);
    }
}
