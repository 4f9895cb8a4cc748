use crate::segment::RoadMask;
use image::{Rgba, RgbImage, RgbaImage};

/// Semi-transparent green painted over road pixels.
pub const ROAD_OVERLAY: Rgba<u8> = Rgba([0, 255, 0, 127]);

/// Alpha-blend [`ROAD_OVERLAY`] onto every road pixel of `image`.
pub fn overlay_mask(image: &RgbImage, mask: &RoadMask) -> RgbaImage {
    let (width, height) = image.dimensions();
    let alpha = ROAD_OVERLAY[3] as u32;
    RgbaImage::from_fn(width, height, |x, y| {
        let src = image.get_pixel(x, y);
        if !mask.is_road(x, y) {
            return Rgba([src[0], src[1], src[2], 255]);
        }
        let blend = |s: u8, o: u8| -> u8 {
            ((s as u32 * (255 - alpha) + o as u32 * alpha + 127) / 255) as u8
        };
        Rgba([
            blend(src[0], ROAD_OVERLAY[0]),
            blend(src[1], ROAD_OVERLAY[1]),
            blend(src[2], ROAD_OVERLAY[2]),
            255,
        ])
    })
}
