use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
    rect::Rect,
};
use ml_core::{ClassNames, Detection};
use thiserror::Error;
use video_ingest::Frame;

const GLYPH_ADVANCE: i32 = 6;
const LABEL_HEIGHT: i32 = 10;
const LABEL_TEXT: Rgb<u8> = Rgb([0, 0, 0]);

/// Box colours cycled by class id.
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([0, 255, 0]),
    Rgb([255, 64, 64]),
    Rgb([56, 189, 248]),
    Rgb([250, 204, 21]),
    Rgb([232, 121, 249]),
    Rgb([251, 146, 60]),
    Rgb([74, 222, 128]),
    Rgb([248, 250, 252]),
];

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("frame buffer holds {len} bytes but {width}x{height} needs {expected}")]
    FrameLayout {
        len: usize,
        expected: usize,
        width: i32,
        height: i32,
    },
}

/// Draws detection boxes and optional labels over a frame.
#[derive(Clone, Copy, Debug)]
pub struct Annotator {
    thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self { thickness: 1 }
    }
}

impl Annotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            thickness: thickness.max(1),
        }
    }

    /// Render `detections` over a copy of `frame`.
    ///
    /// `labels`, when given, pairs up with `detections` by index; extra entries
    /// on either side are ignored. The output always has the frame's dimensions.
    pub fn annotate(
        &self,
        frame: &Frame,
        detections: &[Detection],
        labels: Option<&[String]>,
    ) -> Result<RgbImage, AnnotationError> {
        let layout_error = || AnnotationError::FrameLayout {
            len: frame.data.len(),
            expected: frame.expected_len(),
            width: frame.width,
            height: frame.height,
        };
        let rgb = frame.to_rgb_bytes().ok_or_else(layout_error)?;
        let mut image = RgbImage::from_raw(frame.width as u32, frame.height as u32, rgb)
            .ok_or_else(layout_error)?;

        for det in detections {
            draw_box(&mut image, det, class_color(det.class_id), self.thickness);
        }

        if let Some(labels) = labels {
            for (det, label) in detections.iter().zip(labels) {
                draw_label_bar(&mut image, det, label, class_color(det.class_id));
            }
        }

        Ok(image)
    }
}

/// Label text shown above a detection.
pub(crate) fn format_label(names: &ClassNames, det: &Detection) -> String {
    format!("{}, confidence={:.2}", names.name(det.class_id), det.score)
}

fn class_color(class_id: i64) -> Rgb<u8> {
    PALETTE[class_id.rem_euclid(PALETTE.len() as i64) as usize]
}

/// Clamp a detection to pixel corners `(left, top, right, bottom)`, inclusive.
fn pixel_bounds(image: &RgbImage, det: &Detection) -> (i32, i32, i32, i32) {
    let max_x = image.width().saturating_sub(1) as f32;
    let max_y = image.height().saturating_sub(1) as f32;
    let x1 = det.bbox[0].clamp(0.0, max_x).round() as i32;
    let y1 = det.bbox[1].clamp(0.0, max_y).round() as i32;
    let x2 = det.bbox[2].clamp(0.0, max_x).round() as i32;
    let y2 = det.bbox[3].clamp(0.0, max_y).round() as i32;
    (x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
}

fn draw_box(image: &mut RgbImage, det: &Detection, color: Rgb<u8>, thickness: u32) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    let (left, top, right, bottom) = pixel_bounds(image, det);
    for inset in 0..thickness as i32 {
        let (l, t, r, b) = (left + inset, top + inset, right - inset, bottom - inset);
        if r < l || b < t {
            break;
        }
        let rect = Rect::at(l, t).of_size((r - l + 1) as u32, (b - t + 1) as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Filled bar with the label text, above the box when there is room.
fn draw_label_bar(image: &mut RgbImage, det: &Detection, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 || text.is_empty() {
        return;
    }
    let (left, top, _, _) = pixel_bounds(image, det);
    let bar_y = if top >= LABEL_HEIGHT { top - LABEL_HEIGHT } else { top };
    let text_width = text.chars().count() as i32 * GLYPH_ADVANCE + 2;
    let bar_width = text_width.min(width - left);
    let bar_height = LABEL_HEIGHT.min(height - bar_y);
    if bar_width <= 0 || bar_height <= 0 {
        return;
    }

    draw_filled_rect_mut(
        image,
        Rect::at(left, bar_y).of_size(bar_width as u32, bar_height as u32),
        color,
    );
    draw_text(image, left + 1, bar_y + 2, text, LABEL_TEXT);
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

/// 5x7 bitmap font, one `u8` per row with the leftmost pixel in bit 4.
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '=' => [0, 0, 0b11111, 0, 0b11111, 0, 0],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use video_ingest::FrameFormat;

    use super::*;

    fn gray_frame(width: i32, height: i32) -> Frame {
        Frame::new(
            vec![40; (width * height * 3) as usize],
            width,
            height,
            FrameFormat::Bgr8,
        )
    }

    fn det(bbox: [f32; 4], class_id: i64) -> Detection {
        Detection {
            bbox,
            score: 0.87,
            class_id,
        }
    }

    #[test]
    fn empty_detections_keep_dimensions_and_pixels() {
        let frame = gray_frame(64, 48);
        let image = Annotator::default().annotate(&frame, &[], None).unwrap();
        assert_eq!(image.dimensions(), (64, 48));
        assert!(image.pixels().all(|p| *p == Rgb([40, 40, 40])));
    }

    #[test]
    fn boxes_are_drawn_in_class_colour() {
        let frame = gray_frame(64, 48);
        let image = Annotator::default()
            .annotate(&frame, &[det([10.0, 20.0, 30.0, 40.0], 0)], None)
            .unwrap();
        assert_eq!(image.dimensions(), (64, 48));
        assert_eq!(*image.get_pixel(10, 20), PALETTE[0]);
        assert_eq!(*image.get_pixel(30, 40), PALETTE[0]);
        assert_eq!(*image.get_pixel(20, 30), Rgb([40, 40, 40]));
    }

    #[test]
    fn thickness_grows_inward() {
        let frame = gray_frame(64, 48);
        let image = Annotator::new(3)
            .annotate(&frame, &[det([10.0, 10.0, 40.0, 40.0], 1)], None)
            .unwrap();
        assert_eq!(*image.get_pixel(12, 20), PALETTE[1]);
        assert_eq!(*image.get_pixel(13, 20), Rgb([40, 40, 40]));
    }

    #[test]
    fn out_of_frame_boxes_are_clamped() {
        let frame = gray_frame(32, 32);
        let detections = [
            det([-50.0, -50.0, 500.0, 500.0], 2),
            det([40.0, 40.0, 10.0, 10.0], 3),
        ];
        let labels = vec!["a".to_string(), "b".to_string()];
        let image = Annotator::default()
            .annotate(&frame, &detections, Some(&labels))
            .unwrap();
        assert_eq!(image.dimensions(), (32, 32));
        assert_eq!(*image.get_pixel(0, 31), PALETTE[2]);
        assert_eq!(*image.get_pixel(31, 31), PALETTE[3]);
    }

    #[test]
    fn labels_fill_a_bar_above_the_box() {
        let frame = gray_frame(200, 100);
        let detections = [det([20.0, 50.0, 120.0, 90.0], 0)];
        let labels = vec![format_label(&ClassNames::coco(), &detections[0])];
        let plain = Annotator::default().annotate(&frame, &detections, None).unwrap();
        let labelled = Annotator::default()
            .annotate(&frame, &detections, Some(&labels))
            .unwrap();
        assert_eq!(*plain.get_pixel(20, 41), Rgb([40, 40, 40]));
        assert_ne!(*labelled.get_pixel(20, 41), Rgb([40, 40, 40]));
    }

    #[test]
    fn label_text_uses_class_name_and_two_decimals() {
        let label = format_label(&ClassNames::coco(), &det([0.0, 0.0, 1.0, 1.0], 0));
        assert_eq!(label, "person, confidence=0.87");
        assert!(
            label
                .chars()
                .flat_map(|c| c.to_uppercase())
                .all(|c| glyph_bits(c).is_some())
        );
    }

    #[test]
    fn mismatched_buffers_are_an_error() {
        let mut frame = gray_frame(8, 8);
        frame.data.truncate(10);
        let err = Annotator::default().annotate(&frame, &[], None).unwrap_err();
        assert!(matches!(err, AnnotationError::FrameLayout { len: 10, .. }));
    }
}
