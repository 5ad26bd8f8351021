use image::{DynamicImage, GenericImage, Pixel, Rgb};

use crate::types::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrosshairStyle {
    /// Horizontal and vertical arms.
    #[default]
    Plus,
    /// Arms along the diagonals.
    Diagonal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Circle {
        center: (i32, i32),
        radius: i32,
        color: Rgb<u8>,
        stroke: u32,
    },
    Crosshair {
        center: (i32, i32),
        arm: i32,
        color: Rgb<u8>,
        stroke: u32,
        style: CrosshairStyle,
    },
}

impl Annotation {
    fn color(&self) -> Rgb<u8> {
        match self {
            Annotation::Circle { color, .. } | Annotation::Crosshair { color, .. } => *color,
        }
    }
}

/// Annotations painted over a frame, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    annotations: Vec<Annotation>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
    }

    pub fn add_circle(&mut self, center: (i32, i32), radius: i32, color: Rgb<u8>, stroke: u32) {
        self.annotations.push(Annotation::Circle {
            center,
            radius,
            color,
            stroke,
        });
    }

    pub fn add_crosshair(
        &mut self,
        center: (i32, i32),
        arm: i32,
        color: Rgb<u8>,
        stroke: u32,
        style: CrosshairStyle,
    ) {
        self.annotations.push(Annotation::Crosshair {
            center,
            arm,
            color,
            stroke,
            style,
        });
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Composite every annotation onto a copy of `frame`. Later annotations
    /// win where they overlap earlier ones. Single-channel frames stay
    /// single-channel and get the luma of each colour.
    pub fn draw(&self, frame: &Frame) -> Frame {
        if self.annotations.is_empty() {
            return frame.clone();
        }
        match frame {
            DynamicImage::ImageLuma8(gray) => {
                let mut canvas = gray.clone();
                for a in &self.annotations {
                    paint(&mut canvas, a, a.color().to_luma());
                }
                DynamicImage::ImageLuma8(canvas)
            }
            other => {
                let mut canvas = other.to_rgb8();
                for a in &self.annotations {
                    paint(&mut canvas, a, a.color());
                }
                DynamicImage::ImageRgb8(canvas)
            }
        }
    }
}

fn plot<I: GenericImage>(img: &mut I, x: i64, y: i64, pixel: I::Pixel) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, pixel);
    }
}

/// Offsets covering a line `stroke` pixels thick, centred on zero.
fn thickness(stroke: u32) -> std::ops::RangeInclusive<i64> {
    let stroke = i64::from(stroke.max(1));
    let lo = -(stroke - 1) / 2;
    lo..=lo + stroke - 1
}

/// `[lo, hi]` intersected with `[0, len)`, or `None` if they do not meet.
fn clip(lo: i64, hi: i64, len: u32) -> Option<(i64, i64)> {
    let (lo, hi) = (lo.max(0), hi.min(i64::from(len) - 1));
    (lo <= hi).then_some((lo, hi))
}

// Every loop runs over the annotation's extent clipped to the image.
fn paint<I: GenericImage>(img: &mut I, annotation: &Annotation, pixel: I::Pixel) {
    let (width, height) = img.dimensions();
    match *annotation {
        Annotation::Circle {
            center: (cx, cy),
            radius,
            stroke,
            ..
        } => {
            let (cx, cy) = (i64::from(cx), i64::from(cy));
            let half = f64::from(stroke.max(1)) / 2.0;
            let inner = (f64::from(radius) - half).max(0.0);
            let outer = f64::from(radius) + half;
            let reach = outer.ceil() as i64;
            let (Some((x0, x1)), Some((y0, y1))) = (
                clip(cx - reach, cx + reach, width),
                clip(cy - reach, cy + reach, height),
            ) else {
                return;
            };
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let (dx, dy) = ((x - cx) as f64, (y - cy) as f64);
                    let d = (dx * dx + dy * dy).sqrt();
                    if d >= inner && d < outer {
                        plot(img, x, y, pixel);
                    }
                }
            }
        }
        Annotation::Crosshair {
            center: (cx, cy),
            arm,
            stroke,
            style,
            ..
        } => {
            let (cx, cy) = (i64::from(cx), i64::from(cy));
            let arm = i64::from(arm.max(0));
            for t in thickness(stroke) {
                match style {
                    CrosshairStyle::Plus => {
                        if let Some((x0, x1)) = clip(cx - arm, cx + arm, width) {
                            for x in x0..=x1 {
                                plot(img, x, cy + t, pixel);
                            }
                        }
                        if let Some((y0, y1)) = clip(cy - arm, cy + arm, height) {
                            for y in y0..=y1 {
                                plot(img, cx + t, y, pixel);
                            }
                        }
                    }
                    CrosshairStyle::Diagonal => {
                        // x = cx + i + t, so i is bounded by the image width.
                        let Some((x0, x1)) = clip(cx + t - arm, cx + t + arm, width) else {
                            continue;
                        };
                        for x in x0..=x1 {
                            let i = x - cx - t;
                            plot(img, x, cy + i, pixel);
                            plot(img, x, cy - i, pixel);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

    fn blank() -> Frame {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([7, 7, 7])))
    }

    #[test]
    fn no_annotations_is_identity() {
        let frame = blank();
        assert_eq!(Overlay::new().draw(&frame), frame);
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, Luma([3])));
        assert_eq!(Overlay::new().draw(&gray), gray);
    }

    #[test]
    fn draw_leaves_input_and_annotations_untouched() {
        let mut overlay = Overlay::new();
        overlay.add_circle((20, 20), 8, RED, 1);
        overlay.add_crosshair((20, 20), 5, GREEN, 1, CrosshairStyle::Plus);
        let before = overlay.annotations().to_vec();

        let frame = blank();
        let first = overlay.draw(&frame);
        let second = overlay.draw(&frame);

        assert_eq!(frame, blank());
        assert_eq!(first, second);
        assert_eq!(overlay.annotations(), before.as_slice());
    }

    #[test]
    fn circle_covers_rim_only() {
        let mut overlay = Overlay::new();
        overlay.add_circle((20, 20), 8, RED, 1);
        let out = overlay.draw(&blank()).to_rgb8();
        assert_eq!(*out.get_pixel(28, 20), RED);
        assert_eq!(*out.get_pixel(20, 12), RED);
        assert_eq!(*out.get_pixel(20, 20), Rgb([7, 7, 7]));
    }

    #[test]
    fn later_annotations_paint_over_earlier_ones() {
        let mut overlay = Overlay::new();
        overlay.add_circle((20, 20), 8, RED, 1);
        overlay.add_crosshair((20, 20), 10, GREEN, 1, CrosshairStyle::Plus);
        let out = overlay.draw(&blank()).to_rgb8();
        // (28, 20) is on both the rim and the horizontal arm.
        assert_eq!(*out.get_pixel(28, 20), GREEN);

        overlay.clear();
        overlay.add_crosshair((20, 20), 10, GREEN, 1, CrosshairStyle::Plus);
        overlay.add_circle((20, 20), 8, RED, 1);
        let out = overlay.draw(&blank()).to_rgb8();
        assert_eq!(*out.get_pixel(28, 20), RED);
    }

    #[test]
    fn stroke_thickens_crosshair_arms() {
        let mut overlay = Overlay::new();
        overlay.add_crosshair((20, 20), 6, GREEN, 3, CrosshairStyle::Plus);
        let out = overlay.draw(&blank()).to_rgb8();
        assert_eq!(*out.get_pixel(26, 21), GREEN);
        assert_eq!(*out.get_pixel(26, 19), GREEN);
        assert_eq!(*out.get_pixel(26, 22), Rgb([7, 7, 7]));
        assert_eq!(*out.get_pixel(27, 20), Rgb([7, 7, 7]));
    }

    #[test]
    fn diagonal_crosshair_and_clipping() {
        let mut overlay = Overlay::new();
        overlay.add_crosshair((0, 0), 4, RED, 1, CrosshairStyle::Diagonal);
        let out = overlay.draw(&blank()).to_rgb8();
        assert_eq!(*out.get_pixel(3, 3), RED);
        assert_eq!(*out.get_pixel(3, 0), Rgb([7, 7, 7]));
    }

    #[test]
    fn gray_frames_get_luma_colours() {
        let mut overlay = Overlay::new();
        overlay.add_crosshair((2, 2), 1, Rgb([255, 255, 255]), 1, CrosshairStyle::Plus);
        let gray = DynamicImage::ImageLuma8(GrayImage::new(5, 5));
        let out = overlay.draw(&gray);
        assert_eq!(out.color(), image::ColorType::L8);
        assert_eq!(*out.to_luma8().get_pixel(2, 3), Rgb([255, 255, 255]).to_luma());
    }

    #[test]
    fn oversized_annotations_are_clipped_to_the_frame() {
        let mut overlay = Overlay::new();
        overlay.add_circle((20, 20), 3000, RED, 1);
        overlay.add_circle((20, 20), i32::MAX, RED, 5);
        overlay.add_circle((i32::MIN, i32::MAX), 60_000, RED, u32::MAX);
        overlay.add_crosshair((20, 20), i32::MAX, GREEN, 1, CrosshairStyle::Plus);
        overlay.add_crosshair((i32::MAX, 5), i32::MAX, GREEN, 1, CrosshairStyle::Diagonal);

        let out = overlay.draw(&blank()).to_rgb8();
        // Rims far outside the frame leave it untouched; the arms span it.
        assert_eq!(*out.get_pixel(5, 5), Rgb([7, 7, 7]));
        assert_eq!(*out.get_pixel(0, 20), GREEN);
        assert_eq!(*out.get_pixel(39, 20), GREEN);
        assert_eq!(*out.get_pixel(20, 0), GREEN);
        assert_eq!(*out.get_pixel(20, 39), GREEN);
    }
}
