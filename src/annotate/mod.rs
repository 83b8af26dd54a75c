//! Annotated copies of sampled frames.
//!
//! Boxes and `"<label> (<confidence>)"` captions are drawn onto a copy of the
//! preprocessed working raster. The copy is converted back to RGB and stored
//! under the annotated name; the original frame artifact is never touched.

mod font;

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::{preprocess, ColorOrder, Detection};
use crate::frame::{Frame, FrameNaming};
use crate::storage::ArtifactStore;

use font::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub box_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub text_background: Rgb<u8>,
    pub thickness: u32,
    /// Integer upscaling of the 5x7 glyphs.
    pub text_scale: u32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: Rgb([0, 255, 0]),
            text_color: Rgb([0, 255, 0]),
            text_background: Rgb([0, 0, 0]),
            thickness: 2,
            text_scale: 2,
        }
    }
}

const TEXT_PADDING: u32 = 2;
const GLYPH_SPACING: u32 = 1;

/// Caption drawn above a detection box.
pub fn label_text(detection: &Detection) -> String {
    format!("{} ({:.2})", detection.display_label(), detection.confidence())
}

pub struct Annotator {
    naming: FrameNaming,
    style: AnnotationStyle,
}

impl Annotator {
    pub fn new(naming: FrameNaming) -> Self {
        Self {
            naming,
            style: AnnotationStyle::default(),
        }
    }

    pub fn with_style(mut self, style: AnnotationStyle) -> Self {
        self.style = style;
        self
    }

    pub fn annotated_name(&self, frame: &Frame) -> String {
        self.naming.annotated_name(frame)
    }

    /// Draw `detections` on a copy of `working`. Colors are given in RGB and
    /// converted to `order` before drawing.
    pub fn render(
        &self,
        working: &RgbImage,
        order: ColorOrder,
        detections: &[Detection],
    ) -> RgbImage {
        let mut canvas = working.clone();
        let box_color = in_order(self.style.box_color, order);
        let text_color = in_order(self.style.text_color, order);
        let background = in_order(self.style.text_background, order);

        for detection in detections {
            self.draw_box(&mut canvas, detection, box_color);
            self.draw_caption(&mut canvas, detection, text_color, background);
        }
        canvas
    }

    /// Render and persist the annotated copy of `frame`. Returns its name.
    pub fn annotate(
        &self,
        store: &mut dyn ArtifactStore,
        frame: &Frame,
        working: &RgbImage,
        order: ColorOrder,
        detections: &[Detection],
    ) -> Result<String> {
        let rendered = preprocess::to_rgb(self.render(working, order, detections), order);
        let name = self.annotated_name(frame);
        store.write_image(&name, &rendered)?;
        Ok(name)
    }

    fn draw_box(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let bbox = detection.bbox();
        let x = bbox.x_min.round() as i32;
        let y = bbox.y_min.round() as i32;
        let w = (bbox.x_max.round() as i32 - x).max(1) as u32;
        let h = (bbox.y_max.round() as i32 - y).max(1) as u32;

        // Thickness grows inward so the outline stays within the box.
        for offset in 0..self.style.thickness {
            let inset = 2 * offset;
            if w <= inset || h <= inset {
                break;
            }
            let rect = Rect::at(x + offset as i32, y + offset as i32).of_size(w - inset, h - inset);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    fn draw_caption(
        &self,
        canvas: &mut RgbImage,
        detection: &Detection,
        color: Rgb<u8>,
        background: Rgb<u8>,
    ) {
        let text = label_text(detection);
        let (x, y, w, h) = self.caption_rect(canvas.dimensions(), detection, &text);
        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(w, h), background);

        let scale = self.style.text_scale.max(1);
        let advance = (GLYPH_WIDTH + GLYPH_SPACING) * scale;
        for (i, ch) in text.chars().enumerate() {
            let origin_x = x + (TEXT_PADDING + i as u32 * advance) as i32;
            let origin_y = y + TEXT_PADDING as i32;
            for (row, &bits) in glyph(ch).iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = origin_x + (col * scale) as i32;
                        let py = origin_y + (row as u32 * scale) as i32;
                        draw_filled_rect_mut(canvas, Rect::at(px, py).of_size(scale, scale), color);
                    }
                }
            }
        }
    }

    /// Caption box directly above the detection, pulled inside the frame when
    /// the detection touches the top or right edge.
    fn caption_rect(
        &self,
        (width, height): (u32, u32),
        detection: &Detection,
        text: &str,
    ) -> (i32, i32, u32, u32) {
        let scale = self.style.text_scale.max(1);
        let chars = text.chars().count() as u32;
        let w = chars * (GLYPH_WIDTH + GLYPH_SPACING) * scale + 2 * TEXT_PADDING;
        let h = GLYPH_HEIGHT * scale + 2 * TEXT_PADDING;

        let bbox = detection.bbox();
        let max_x = width.saturating_sub(w) as i32;
        let max_y = height.saturating_sub(h) as i32;
        let x = (bbox.x_min.round() as i32).clamp(0, max_x);
        let y = (bbox.y_min.round() as i32 - h as i32).clamp(0, max_y);
        (x, y, w, h)
    }
}

fn in_order(color: Rgb<u8>, order: ColorOrder) -> Rgb<u8> {
    match order {
        ColorOrder::Rgb => color,
        ColorOrder::Bgr => Rgb([color[2], color[1], color[0]]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::storage::InMemoryArtifactStore;

    fn frame() -> Frame {
        Frame::new(0, 0, 200, 120, "frame_0000.jpg".to_string())
    }

    fn detection(bbox: BoundingBox) -> Detection {
        Detection::new(bbox, 0.873, "scissors")
    }

    #[test]
    fn caption_shows_label_and_two_decimals() {
        let det = detection(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(label_text(&det), "scissors (0.87)");
    }

    #[test]
    fn annotation_is_a_separate_artifact() -> Result<()> {
        let annotator = Annotator::new(FrameNaming::default());
        let mut store = InMemoryArtifactStore::new();
        let original = RgbImage::from_pixel(200, 120, Rgb([50, 50, 50]));
        store.write_image("frame_0000.jpg", &original)?;

        let det = detection(BoundingBox::new(20.0, 60.0, 120.0, 110.0));
        let name = annotator.annotate(&mut store, &frame(), &original, ColorOrder::Rgb, &[det])?;

        assert_eq!(name, "annotated_frame_0000.jpg");
        assert_eq!(store.read_image("frame_0000.jpg")?, original);
        let annotated = store.read_image(&name)?;
        assert_eq!(annotated.get_pixel(20, 80), &Rgb([0, 255, 0]));
        assert_eq!(annotated.get_pixel(70, 85), &Rgb([50, 50, 50]));
        Ok(())
    }

    #[test]
    fn caption_sits_above_the_box() {
        let annotator = Annotator::new(FrameNaming::default());
        let det = detection(BoundingBox::new(30.0, 80.0, 100.0, 110.0));
        let (x, y, _, h) = annotator.caption_rect((400, 120), &det, &label_text(&det));
        assert_eq!(x, 30);
        assert_eq!(y + h as i32, 80);
    }

    #[test]
    fn caption_is_clamped_at_the_top_edge() {
        let annotator = Annotator::new(FrameNaming::default());
        let det = detection(BoundingBox::new(5.0, 0.0, 60.0, 40.0));
        let (_, y, _, _) = annotator.caption_rect((200, 120), &det, &label_text(&det));
        assert_eq!(y, 0);

        let rendered = annotator.render(&RgbImage::new(200, 120), ColorOrder::Rgb, &[det]);
        assert_eq!(rendered.dimensions(), (200, 120));
    }

    #[test]
    fn bgr_working_raster_is_stored_as_rgb() -> Result<()> {
        let annotator = Annotator::new(FrameNaming::default()).with_style(AnnotationStyle {
            box_color: Rgb([255, 0, 0]),
            ..AnnotationStyle::default()
        });
        let mut store = InMemoryArtifactStore::new();
        let working = preprocess::to_color_order(
            RgbImage::from_pixel(200, 120, Rgb([10, 20, 30])),
            ColorOrder::Bgr,
        );
        let det = detection(BoundingBox::new(20.0, 60.0, 120.0, 110.0));
        let name = annotator.annotate(&mut store, &frame(), &working, ColorOrder::Bgr, &[det])?;
        let stored = store.read_image(&name)?;
        assert_eq!(stored.get_pixel(20, 80), &Rgb([255, 0, 0]));
        assert_eq!(stored.get_pixel(70, 85), &Rgb([10, 20, 30]));
        Ok(())
    }

    #[test]
    fn no_detections_still_yields_a_copy() {
        let annotator = Annotator::new(FrameNaming::default());
        let working = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        assert_eq!(annotator.render(&working, ColorOrder::Rgb, &[]), working);
    }
}
