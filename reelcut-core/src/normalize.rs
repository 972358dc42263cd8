//! [MODULE C6] Normalizer.
//!
//! Command construction follows the teacher's `Encoder::compose_*_pass`
//! pattern in `encoder.rs` (a pure function from params to an argument
//! vector, built with `itertools::chain!`), generalized from the AV1/HEVC
//! ladder to the spec's H.264 NVENC/QSV/AMF/videotoolbox/x264 ladder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use itertools::chain;

use crate::config::{bitrate_ceiling, NormalizeMode};
use crate::error::Result;
use crate::gateway;
use crate::hw_probe::HwVendor;
use crate::into_vec;

/// Encoder/preset pair selected from the Hardware Probe's result, per
/// spec.md §4.5 ("nvidia → NVENC, darwin → videotoolbox, intel → qsv, else
/// libx264"). Callers must never assume hardware availability without first
/// calling [`crate::hw_probe::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEncoder {
  Libx264,
  Nvenc,
  Qsv,
  VideoToolbox,
}

pub fn select_encoder(vendor: HwVendor) -> VideoEncoder {
  match vendor {
    HwVendor::Nvidia => VideoEncoder::Nvenc,
    HwVendor::Intel => VideoEncoder::Qsv,
    _ if cfg!(target_os = "macos") => VideoEncoder::VideoToolbox,
    _ => VideoEncoder::Libx264,
  }
}

#[derive(Debug, Clone)]
pub struct NormalizeRequest<'a> {
  pub source: &'a Path,
  pub output_root: &'a Path,
  pub mode: NormalizeMode,
  pub encoder: VideoEncoder,
  pub fps: u32,
  pub audio_sample_rate: u32,
  /// Fast-seek trim before the input (`-ss`).
  pub trim_start: Option<f64>,
  /// Duration to keep after `trim_start` (`-t`, never `-to`, per spec.md
  /// §4.5's ambiguity note).
  pub trim_duration: Option<f64>,
}

/// `O = <root>/normalized/<WxH>/<stem>.mp4`, per spec.md §3/§6.
pub fn output_path(output_root: &Path, width: u32, height: u32, stem: &str) -> PathBuf {
  output_root
    .join("normalized")
    .join(format!("{width}x{height}"))
    .join(format!("{stem}.mp4"))
}

/// Runs the normalizer for one source against one (W,H) target. Idempotent:
/// if the output already exists, the call returns `Ok` without invoking
/// ffmpeg (spec.md §3/§8 property 5, skip-existing idempotence).
pub fn normalize(
  ffmpeg: &str,
  req: &NormalizeRequest<'_>,
  width: u32,
  height: u32,
) -> Result<PathBuf> {
  let stem = req
    .source
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("clip");
  let out = output_path(req.output_root, width, height, stem);

  if out.exists() {
    return Ok(out);
  }

  if let Some(parent) = out.parent() {
    crate::create_dir!(parent).map_err(crate::error::Error::Io)?;
  }

  let args = compose_args(req, width, height, &out);
  gateway::run(
    ffmpeg,
    args,
    None,
    &[],
    Some(Duration::from_secs(2 * 60 * 60)),
    None,
  )?;

  Ok(out)
}

fn compose_args(req: &NormalizeRequest<'_>, width: u32, height: u32, out: &Path) -> Vec<String> {
  let params = req.mode.params();
  let (maxrate, bufsize) = bitrate_ceiling(width, height);

  let mut pre_input: Vec<String> = into_vec!["-hide_banner", "-y", "-nostdin"];
  if let Some(ss) = req.trim_start {
    pre_input.extend(into_vec!["-ss", ss.to_string()]);
  }
  pre_input.extend(into_vec!["-i", req.source.display().to_string()]);

  let mut post_input: Vec<String> = Vec::new();
  if let Some(t) = req.trim_duration {
    post_input.extend(into_vec!["-t", t.to_string()]);
  }

  // scale first so `force_divisible_by=2` governs the actual encoded
  // dimensions; pad runs last as a no-op safety net rather than the
  // dimension that decides evenness, per spec.md §4.5's even-dimensions
  // invariant (a trailing decrease-scale can otherwise round back to odd).
  let filter = format!(
    "fps={},scale={}:{}:force_original_aspect_ratio=decrease:force_divisible_by=2,pad=ceil(iw/2)*2:ceil(ih/2)*2",
    req.fps, width, height
  );

  let video_args: Vec<String> = match req.encoder {
    VideoEncoder::Libx264 => into_vec![
      "-c:v",
      "libx264",
      "-preset",
      params.x264_preset,
      "-crf",
      params.x264_crf.to_string(),
      "-maxrate",
      maxrate,
      "-bufsize",
      bufsize,
    ],
    VideoEncoder::Nvenc => into_vec![
      "-c:v",
      "h264_nvenc",
      "-preset",
      params.nvenc_preset,
      "-cq",
      params.nvenc_cq.to_string(),
      "-maxrate",
      maxrate,
      "-bufsize",
      bufsize,
    ],
    VideoEncoder::Qsv => into_vec![
      "-c:v",
      "h264_qsv",
      "-global_quality",
      params.nvenc_cq.to_string(),
      "-maxrate",
      maxrate,
      "-bufsize",
      bufsize,
    ],
    VideoEncoder::VideoToolbox => into_vec![
      "-c:v",
      "h264_videotoolbox",
      "-q:v",
      params.nvenc_cq.to_string(),
      "-maxrate",
      maxrate,
      "-bufsize",
      bufsize,
    ],
  };

  chain!(
    pre_input,
    post_input,
    into_vec!["-vf", filter, "-vsync", "1", "-pix_fmt", "yuv420p"],
    video_args,
    into_vec![
      "-c:a",
      "aac",
      "-b:a",
      params.audio_bitrate,
      "-ar",
      req.audio_sample_rate.to_string(),
      "-ac",
      "2",
    ],
    into_vec!["-movflags", "+faststart", "-loglevel", "error"],
    into_vec![out.display().to_string()],
  )
  .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_path_matches_layout() {
    let p = output_path(Path::new("/out"), 1920, 1080, "clip");
    assert_eq!(p, Path::new("/out/normalized/1920x1080/clip.mp4"));
  }

  #[test]
  fn select_encoder_prefers_detected_vendor() {
    assert_eq!(select_encoder(HwVendor::Nvidia), VideoEncoder::Nvenc);
    assert_eq!(select_encoder(HwVendor::Intel), VideoEncoder::Qsv);
  }

  #[test]
  fn compose_args_includes_crf_for_libx264() {
    let req = NormalizeRequest {
      source: Path::new("in.mkv"),
      output_root: Path::new("/out"),
      mode: NormalizeMode::Release,
      encoder: VideoEncoder::Libx264,
      fps: 25,
      audio_sample_rate: 48_000,
      trim_start: None,
      trim_duration: None,
    };
    let args = compose_args(&req, 1920, 1080, Path::new("/out/o.mp4"));
    assert!(args.iter().any(|a| a == "libx264"));
    assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "24"));
  }
}
