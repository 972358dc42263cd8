//! [MODULE C12] Frame Picker.
//!
//! Grounded on `examples/original_source/cover_tool/extract_frames.py`'s
//! `compute_sharpest_frame_cv`/`compute_sharpest_frame_cv_gpu`: sample
//! frames within a window, center-crop 0.6×0.6, downscale to a max side,
//! score by Laplacian variance on grayscale, keep the maximum. Frame
//! extraction itself goes through the Subprocess Gateway rather than a
//! decode library — consistent with the teacher's own preference for
//! driving ffmpeg as a subprocess over linking a decoder directly, except
//! where libav bindings are already in the dependency tree for probing
//! (`probe.rs`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{GenericImageView, ImageBuffer, Luma};

use crate::error::{Error, Result};
use crate::gateway;
use crate::hw_probe::HwVendor;

/// `(frame_path, score, frame_index)`, per spec.md §4.9 step 3.
#[derive(Debug, Clone)]
pub struct ScoredFrame {
  pub path: PathBuf,
  pub score: f64,
  pub frame_index: u64,
}

/// Sample stride in frames, per spec.md §4.9 step 1 ("stride = 3 for
/// ≥1080p else 2"). The GPU and CPU paths share this table; only the
/// decode mechanism differs between them, per spec.md §4.9's two-step
/// split.
fn sample_stride(height: u32) -> u64 {
  if height >= 1080 {
    3
  } else {
    2
  }
}

/// Center-crops a 0.6×0.6 region and downscales its longest side to
/// `max_side`, per spec.md §4.9 steps 1-2.
fn crop_and_downscale(
  img: &image::DynamicImage,
  max_side: u32,
) -> ImageBuffer<Luma<u8>, Vec<u8>> {
  let (w, h) = img.dimensions();
  let crop_ratio = 0.6;
  let cw = ((w as f64) * crop_ratio) as u32;
  let ch = ((h as f64) * crop_ratio) as u32;
  let x = (w - cw) / 2;
  let y = (h - ch) / 2;
  let cropped = img.crop_imm(x, y, cw.max(1), ch.max(1));

  let long_side = cropped.width().max(cropped.height());
  let scaled = if long_side > max_side {
    let scale = max_side as f32 / long_side as f32;
    let new_w = ((cropped.width() as f32) * scale).max(1.0) as u32;
    let new_h = ((cropped.height() as f32) * scale).max(1.0) as u32;
    cropped.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
  } else {
    cropped
  };

  scaled.to_luma8()
}

/// 3×3 Laplacian kernel `[0,1,0; 1,-4,1; 0,1,0]`, variance of the response
/// over the interior pixels, per spec.md §4.9 step 1.
pub fn laplacian_variance(gray: &ImageBuffer<Luma<u8>, Vec<u8>>) -> f64 {
  let (w, h) = gray.dimensions();
  if w < 3 || h < 3 {
    return 0.0;
  }

  let mut responses = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
  for y in 1..h - 1 {
    for x in 1..w - 1 {
      let center = i32::from(gray.get_pixel(x, y).0[0]);
      let up = i32::from(gray.get_pixel(x, y - 1).0[0]);
      let down = i32::from(gray.get_pixel(x, y + 1).0[0]);
      let left = i32::from(gray.get_pixel(x - 1, y).0[0]);
      let right = i32::from(gray.get_pixel(x + 1, y).0[0]);
      let lap = up + down + left + right - 4 * center;
      responses.push(f64::from(lap));
    }
  }

  let mean = responses.iter().sum::<f64>() / responses.len() as f64;
  responses.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / responses.len() as f64
}

/// Extracts one frame at `frame_index` (given `fps`) to a temporary PNG via
/// ffmpeg, per the Python original's seek-by-frame-index CPU path.
fn extract_frame(ffmpeg: &str, source: &Path, frame_index: u64, fps: f64, out: &Path) -> Result<()> {
  let timestamp = frame_index as f64 / fps.max(1.0);
  gateway::run(
    ffmpeg,
    crate::into_vec![
      "-hide_banner",
      "-nostdin",
      "-y",
      "-loglevel",
      "error",
      "-ss",
      timestamp.to_string(),
      "-i",
      source.display().to_string(),
      "-frames:v",
      "1",
      out.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(30)),
    None,
  )?;
  Ok(())
}

/// Evaluates sampled frames within `[start_time, end_time]` and returns the
/// sharpest. GPU/CPU is purely a decode-path distinction in the Python
/// original; this crate drives ffmpeg either way and only varies stride by
/// resolution, so `vendor` affects nothing but a future optimization point
/// (documented in DESIGN.md) — both paths currently share this function.
pub fn pick_sharpest_frame(
  ffmpeg: &str,
  source: &Path,
  width: u32,
  height: u32,
  fps: f64,
  start_time: f64,
  end_time: f64,
  work_dir: &Path,
  _vendor: HwVendor,
) -> Result<ScoredFrame> {
  crate::create_dir!(work_dir).map_err(Error::Io)?;

  let stride = sample_stride(height);
  let start_frame = (start_time * fps.max(1.0)) as u64;
  let end_frame = (end_time * fps.max(1.0)) as u64;

  let mut best: Option<ScoredFrame> = None;

  let mut frame_index = start_frame;
  while frame_index <= end_frame {
    let candidate = work_dir.join(format!("sample_{frame_index:010}.png"));
    if extract_frame(ffmpeg, source, frame_index, fps, &candidate).is_ok() {
      if let Ok(img) = image::open(&candidate) {
        let gray = crop_and_downscale(&img, 512);
        let score = laplacian_variance(&gray);
        let better = best.as_ref().map_or(true, |b| score > b.score);
        if better {
          best = Some(ScoredFrame {
            path: candidate.clone(),
            score,
            frame_index,
          });
        } else {
          let _ = std::fs::remove_file(&candidate);
        }
      }
    }
    frame_index += stride;
  }

  let _ = width; // resolution informs stride selection only, kept for call-site clarity
  best.ok_or_else(|| Error::BadInputKind(format!("no decodable frames in {}", source.display())))
}

/// JPEG quality mapped from an internal 1..31 scale to 60..100, per
/// spec.md §4.9's saving note.
pub fn jpeg_quality_from_internal_scale(internal: u8) -> u8 {
  let internal = internal.clamp(1, 31);
  let t = (31 - internal) as f32 / 30.0;
  (60.0 + t * 40.0).round() as u8
}

/// Windows long-path prefixing, per spec.md §4.9's saving note.
#[cfg(windows)]
pub fn long_path(path: &Path) -> PathBuf {
  let s = path.display().to_string();
  if s.starts_with(r"\\?\") {
    path.to_path_buf()
  } else {
    PathBuf::from(format!(r"\\?\{s}"))
  }
}

#[cfg(not(windows))]
pub fn long_path(path: &Path) -> PathBuf {
  path.to_path_buf()
}

/// Saves a scored frame as JPEG or PNG, honoring spec.md §4.9's "sharpness
/// score > 0 required" gate — frames at or below zero variance are
/// rejected rather than written.
pub fn save_scored_frame(frame: &ScoredFrame, dest: &Path, as_png: bool, internal_quality: u8) -> Result<()> {
  if frame.score <= 0.0 {
    return Err(Error::BadInputKind(format!(
      "frame {} has non-positive sharpness score {}",
      frame.frame_index, frame.score
    )));
  }

  let img = image::open(&frame.path).map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
  let dest = long_path(dest);
  if let Some(parent) = dest.parent() {
    crate::create_dir!(parent).map_err(Error::Io)?;
  }

  if as_png {
    img.save_with_format(&dest, image::ImageFormat::Png)
  } else {
    let quality = jpeg_quality_from_internal_scale(internal_quality);
    let mut out = std::fs::File::create(&dest)?;
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    img.write_with_encoder(encoder)
  }
  .map_err(|e| Error::Other(anyhow::anyhow!(e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stride_matches_resolution_buckets() {
    assert_eq!(sample_stride(1080), 3);
    assert_eq!(sample_stride(2160), 3);
    assert_eq!(sample_stride(720), 2);
  }

  #[test]
  fn jpeg_quality_scale_endpoints() {
    assert_eq!(jpeg_quality_from_internal_scale(31), 60);
    assert_eq!(jpeg_quality_from_internal_scale(1), 100);
  }

  #[test]
  fn laplacian_variance_of_flat_image_is_zero() {
    let flat: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_pixel(10, 10, Luma([128u8]));
    assert_eq!(laplacian_variance(&flat), 0.0);
  }

  #[test]
  fn laplacian_variance_of_checkerboard_is_positive() {
    let mut img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::new(10, 10);
    for y in 0..10 {
      for x in 0..10 {
        let v = if (x + y) % 2 == 0 { 0u8 } else { 255u8 };
        img.put_pixel(x, y, Luma([v]));
      }
    }
    assert!(laplacian_variance(&img) > 0.0);
  }
}
