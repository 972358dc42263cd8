//! [MODULE C13] Cover Stitcher.
//!
//! Image resize/concatenate/blend is native `image` crate work; glyph
//! rendering is grounded on `ab_glyph`'s own outline-rasterization API
//! (the crate the Cargo manifest already carries for this purpose) since
//! none of the example repos ship a text-layout module for raster images.
//! Caption-block coordinate mapping and the stroke-by-8-offset technique
//! come directly from spec.md §4.10.

use ab_glyph::{Font, FontArc, Glyph, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Flat RGBA color, `0..=255` per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: u8,
}

impl Color {
  pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
    Color { r, g, b, a }
  }

  fn as_pixel(self) -> Rgba<u8> {
    Rgba([self.r, self.g, self.b, self.a])
  }
}

/// A padding spec that is either a ratio of the stitched image's side
/// (`≤ 0.2`) or an absolute pixel count, per spec.md §4.10.
#[derive(Debug, Clone, Copy)]
pub enum Padding {
  Ratio(f32),
  Pixels(u32),
}

impl Padding {
  fn resolve(self, side: u32) -> u32 {
    match self {
      Padding::Ratio(r) => ((side as f32) * r.clamp(0.0, 0.2)) as u32,
      Padding::Pixels(px) => px,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Rect {
  pub x: u32,
  pub y: u32,
  pub w: u32,
  pub h: u32,
}

/// Resizes every image to the minimum input height (widths scaled
/// proportionally), per spec.md §4.10's stitch step.
pub fn resize_to_common_height(images: &[RgbaImage]) -> Result<Vec<RgbaImage>> {
  let min_height = images
    .iter()
    .map(|i| i.height())
    .min()
    .ok_or_else(|| Error::BadInputKind("no images to stitch".to_owned()))?;

  Ok(
    images
      .iter()
      .map(|img| {
        let scale = min_height as f32 / img.height() as f32;
        let new_w = ((img.width() as f32) * scale).max(1.0) as u32;
        image::imageops::resize(img, new_w, min_height, image::imageops::FilterType::Triangle)
      })
      .collect(),
  )
}

/// Horizontally concatenates resized images with a linear alpha blend of
/// `blend_width` at each seam, clamped to `min(width_left, width_right)`,
/// per spec.md §4.10.
pub fn stitch_with_blend(images: &[RgbaImage], blend_width: u32) -> Result<RgbaImage> {
  if images.is_empty() {
    return Err(Error::BadInputKind("no images to stitch".to_owned()));
  }
  if images.len() == 1 {
    return Ok(images[0].clone());
  }

  let height = images[0].height();
  let total_width: u32 = images.iter().map(|i| i.width()).sum::<u32>()
    - images
      .windows(2)
      .map(|pair| blend_width.min(pair[0].width()).min(pair[1].width()))
      .sum::<u32>();

  let mut canvas = RgbaImage::new(total_width.max(1), height);
  let mut cursor_x: i64 = 0;

  for (idx, img) in images.iter().enumerate() {
    if idx == 0 {
      image::imageops::overlay(&mut canvas, img, 0, 0);
      cursor_x = img.width() as i64;
      continue;
    }

    let prev_width = images[idx - 1].width();
    let blend = blend_width.min(prev_width).min(img.width());
    let paste_x = cursor_x - blend as i64;

    for by in 0..height {
      for bx in 0..blend {
        let alpha = if blend == 0 {
          1.0
        } else {
          bx as f32 / blend as f32
        };
        let left_px = canvas.get_pixel((paste_x + bx as i64) as u32, by);
        let right_px = img.get_pixel(bx, by);
        let blended = Rgba([
          lerp_u8(left_px[0], right_px[0], alpha),
          lerp_u8(left_px[1], right_px[1], alpha),
          lerp_u8(left_px[2], right_px[2], alpha),
          lerp_u8(left_px[3], right_px[3], alpha),
        ]);
        canvas.put_pixel((paste_x + bx as i64) as u32, by, blended);
      }
    }

    for x in blend..img.width() {
      for y in 0..height {
        canvas.put_pixel((paste_x + x as i64) as u32, y, *img.get_pixel(x, y));
      }
    }

    cursor_x = paste_x + img.width() as i64;
  }

  Ok(canvas)
}

fn lerp_u8(a: u8, b: u8, t: f32) -> u8 {
  (a as f32 * (1.0 - t) + b as f32 * t).round() as u8
}

/// Computes the centered 16:9 active rectangle, per spec.md §4.10.
pub fn active_rectangle(canvas_w: u32, canvas_h: u32, padding: Padding) -> Rect {
  let side = canvas_w.min(canvas_h);
  let pad = padding.resolve(side);

  let avail_w = canvas_w.saturating_sub(2 * pad);
  let avail_h = canvas_h.saturating_sub(2 * pad);

  let (w, h) = if avail_w * 9 <= avail_h * 16 {
    (avail_w, avail_w * 9 / 16)
  } else {
    (avail_h * 16 / 9, avail_h)
  };

  Rect {
    x: (canvas_w - w) / 2,
    y: (canvas_h - h) / 2,
    w,
    h,
  }
}

/// Horizontal text alignment within a [`CaptionBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
  Left,
  Center,
  Right,
}

/// A caption layer positioned in widget coordinates (`active_w × active_h`),
/// per spec.md §4.10.
#[derive(Debug, Clone)]
pub struct CaptionBlock {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
  pub text: String,
  pub font_size: f32,
  pub color: Color,
  pub stroke_color: Option<Color>,
  pub bg_color: Option<Color>,
  pub align: Align,
}

/// Maps one [`CaptionBlock`]'s widget-space rect into draw-space pixels by
/// uniform scaling against `active_w`/`active_h`, per spec.md §4.10. Font
/// size scales by the same ratio, floored at 8 px.
fn map_to_draw_rect(block: &CaptionBlock, active: Rect, widget_w: f32, widget_h: f32) -> (Rect, f32) {
  let scale_x = active.w as f32 / widget_w;
  let scale_y = active.h as f32 / widget_h;
  let scale = scale_x.min(scale_y);

  let rect = Rect {
    x: active.x + (block.x * scale_x) as u32,
    y: active.y + (block.y * scale_y) as u32,
    w: (block.w * scale_x) as u32,
    h: (block.h * scale_y) as u32,
  };
  let font_size = (block.font_size * scale).max(8.0);
  (rect, font_size)
}

/// Greedy word-wrap within `max_width` px at `scale`, per spec.md §4.10's
/// "multi-line via word-wrap within the box."
fn word_wrap(font: &FontArc, text: &str, scale: PxScale, max_width: f32) -> Vec<String> {
  let scaled = font.as_scaled(scale);
  let mut lines = Vec::new();
  let mut current = String::new();

  for word in text.split_whitespace() {
    let candidate = if current.is_empty() {
      word.to_owned()
    } else {
      format!("{current} {word}")
    };
    if text_width(&scaled, &candidate) > max_width && !current.is_empty() {
      lines.push(current);
      current = word.to_owned();
    } else {
      current = candidate;
    }
  }
  if !current.is_empty() {
    lines.push(current);
  }
  if lines.is_empty() {
    lines.push(String::new());
  }
  lines
}

fn text_width<SF: ScaleFont<FontArc>>(scaled: &SF, text: &str) -> f32 {
  text
    .chars()
    .map(|c| scaled.h_advance(scaled.glyph_id(c)))
    .sum()
}

/// Rasterizes one glyph's coverage mask directly onto `canvas` at `(x, y)`
/// in `color`, alpha-blending by the glyph's per-pixel coverage.
fn draw_glyph(canvas: &mut RgbaImage, glyph: Glyph, font: &FontArc, color: Color) {
  if let Some(outlined) = font.outline_glyph(glyph) {
    let bounds = outlined.px_bounds();
    outlined.draw(|gx, gy, coverage| {
      let px = bounds.min.x as i32 + gx as i32;
      let py = bounds.min.y as i32 + gy as i32;
      if px < 0 || py < 0 || px as u32 >= canvas.width() || py as u32 >= canvas.height() {
        return;
      }
      let existing = *canvas.get_pixel(px as u32, py as u32);
      let alpha = coverage * (color.a as f32 / 255.0);
      let blended = Rgba([
        lerp_u8(existing[0], color.r, alpha),
        lerp_u8(existing[1], color.g, alpha),
        lerp_u8(existing[2], color.b, alpha),
        255,
      ]);
      canvas.put_pixel(px as u32, py as u32, blended);
    });
  }
}

const STROKE_OFFSETS: [(f32, f32); 8] = [
  (-1.0, -1.0),
  (0.0, -1.0),
  (1.0, -1.0),
  (-1.0, 0.0),
  (1.0, 0.0),
  (-1.0, 1.0),
  (0.0, 1.0),
  (1.0, 1.0),
];

/// Renders one [`CaptionBlock`] onto `canvas`, per spec.md §4.10: fill
/// `bg_color` if `alpha > 0`, optionally stroke by drawing the same glyphs
/// at 8 surrounding offsets, then draw the fill text, word-wrapped within
/// the box.
pub fn render_caption_block(
  canvas: &mut RgbaImage,
  font: &FontArc,
  block: &CaptionBlock,
  active: Rect,
  widget_w: f32,
  widget_h: f32,
) {
  let (rect, font_size) = map_to_draw_rect(block, active, widget_w, widget_h);

  if let Some(bg) = block.bg_color {
    if bg.a > 0 {
      for y in rect.y..(rect.y + rect.h).min(canvas.height()) {
        for x in rect.x..(rect.x + rect.w).min(canvas.width()) {
          let existing = *canvas.get_pixel(x, y);
          let alpha = bg.a as f32 / 255.0;
          canvas.put_pixel(
            x,
            y,
            Rgba([
              lerp_u8(existing[0], bg.r, alpha),
              lerp_u8(existing[1], bg.g, alpha),
              lerp_u8(existing[2], bg.b, alpha),
              255,
            ]),
          );
        }
      }
    }
  }

  let scale = PxScale::from(font_size);
  let lines = word_wrap(font, &block.text, scale, rect.w as f32);
  let scaled = font.as_scaled(scale);
  let line_height = scaled.height();

  for (line_idx, line) in lines.iter().enumerate() {
    let line_width = text_width(&scaled, line);
    let start_x = match block.align {
      Align::Left => rect.x as f32,
      Align::Center => rect.x as f32 + (rect.w as f32 - line_width) / 2.0,
      Align::Right => rect.x as f32 + rect.w as f32 - line_width,
    };
    let baseline_y = rect.y as f32 + scaled.ascent() + line_height * line_idx as f32;

    let mut cursor_x = start_x;
    for ch in line.chars() {
      let glyph_id = scaled.glyph_id(ch);
      let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline_y));

      if let Some(stroke) = block.stroke_color {
        for (dx, dy) in STROKE_OFFSETS {
          let offset_glyph = glyph_id
            .with_scale_and_position(scale, ab_glyph::point(cursor_x + dx, baseline_y + dy));
          draw_glyph(canvas, offset_glyph, font, stroke);
        }
      }
      draw_glyph(canvas, glyph.clone(), font, block.color);
      cursor_x += scaled.h_advance(glyph_id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(rgba))
  }

  #[test]
  fn resize_to_common_height_uses_minimum() {
    let images = vec![solid(200, 100, [255, 0, 0, 255]), solid(100, 50, [0, 255, 0, 255])];
    let resized = resize_to_common_height(&images).unwrap();
    assert!(resized.iter().all(|i| i.height() == 50));
  }

  #[test]
  fn stitch_produces_expected_width() {
    let images = vec![solid(100, 50, [255, 0, 0, 255]), solid(100, 50, [0, 0, 255, 255])];
    let stitched = stitch_with_blend(&images, 20).unwrap();
    assert_eq!(stitched.width(), 180);
    assert_eq!(stitched.height(), 50);
  }

  #[test]
  fn active_rectangle_is_16_by_9() {
    let rect = active_rectangle(1920, 1080, Padding::Ratio(0.1));
    assert!((rect.w as f32 / rect.h as f32 - 16.0 / 9.0).abs() < 0.05);
  }

  #[test]
  fn padding_ratio_is_clamped_to_0_2() {
    let r1 = active_rectangle(1000, 1000, Padding::Ratio(0.5));
    let r2 = active_rectangle(1000, 1000, Padding::Ratio(0.2));
    assert_eq!(r1.w, r2.w);
  }
}
