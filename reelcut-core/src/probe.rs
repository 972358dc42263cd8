//! [MODULE C4] Media Prober.
//!
//! Uses `ffmpeg-next` (the teacher's own media-inspection dependency) for
//! stream inspection instead of shelling out to `ffprobe` text parsing,
//! mirroring `ffmpeg.rs::num_frames`/`has_audio`. A thin ffprobe-CLI
//! fallback covers duration probing when the libav bindings cannot open a
//! container; `ProbeFailure` is soft (§7) — callers degrade gracefully.

use std::path::Path;

use ffmpeg::format::input;
use ffmpeg::media::Type as MediaType;

use crate::error::{Error, Result};
use crate::gateway;

#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
  pub width: u32,
  pub height: u32,
  pub codec_name_id: i32,
  pub pix_fmt_id: i32,
  pub r_frame_rate: (i32, i32),
}

/// `probe_resolution(path) → (W,H) | None`, per spec.md §4.4. Never raises:
/// a failure to open/inspect the container is reported as `None`.
pub fn probe_resolution(path: &Path) -> Option<(u32, u32)> {
  probe_stream_info(path).ok().map(|s| (s.width, s.height))
}

/// `probe_stream_info(path) → {W,H,codec,pix_fmt,r_frame_rate}`, per
/// spec.md §4.4.
pub fn probe_stream_info(path: &Path) -> Result<StreamInfo> {
  let ictx = input(&path).map_err(|e| Error::ProbeFailure {
    path: path.to_owned(),
    reason: e.to_string(),
  })?;

  let stream = ictx
    .streams()
    .best(MediaType::Video)
    .ok_or_else(|| Error::ProbeFailure {
      path: path.to_owned(),
      reason: "no video stream".to_owned(),
    })?;

  let params = stream.parameters();
  let decoder = ffmpeg::codec::context::Context::from_parameters(params)
    .map_err(|e| Error::ProbeFailure {
      path: path.to_owned(),
      reason: e.to_string(),
    })?
    .decoder();
  let video = decoder.video().map_err(|e| Error::ProbeFailure {
    path: path.to_owned(),
    reason: e.to_string(),
  })?;

  let rate = stream.rate();

  Ok(StreamInfo {
    width: video.width(),
    height: video.height(),
    codec_name_id: video.id() as i32,
    pix_fmt_id: video.format() as i32,
    r_frame_rate: (rate.0, rate.1),
  })
}

/// `probe_duration(path) → seconds | 0`, per spec.md §4.4: ffprobe
/// `format.duration` with fallback to a demux-read via `ffmpeg-next`.
pub fn probe_duration(ffprobe: &str, path: &Path) -> f64 {
  if let Ok(secs) = probe_duration_ffprobe(ffprobe, path) {
    return secs;
  }
  probe_duration_demux(path).unwrap_or(0.0)
}

fn probe_duration_ffprobe(ffprobe: &str, path: &Path) -> Result<f64> {
  let output = gateway::run(
    ffprobe,
    [
      "-v",
      "error",
      "-show_entries",
      "format=duration",
      "-of",
      "default=noprint_wrappers=1:nokey=1",
    ]
    .into_iter()
    .map(str::to_owned)
    .chain(std::iter::once(path.display().to_string())),
    None,
    &[],
    Some(std::time::Duration::from_secs(10)),
    None,
  )?;
  output
    .stdout
    .to_string()
    .trim()
    .parse::<f64>()
    .map_err(|e| Error::ProbeFailure {
      path: path.to_owned(),
      reason: format!("could not parse ffprobe duration: {e}"),
    })
}

fn probe_duration_demux(path: &Path) -> Result<f64> {
  let ictx = input(&path).map_err(|e| Error::ProbeFailure {
    path: path.to_owned(),
    reason: e.to_string(),
  })?;
  let duration = ictx.duration();
  if duration <= 0 {
    return Ok(0.0);
  }
  Ok(duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE))
}

/// `probe_image_resolution`, the image-decoder counterpart to
/// `probe_resolution` for still images (spec.md §4.4).
pub fn probe_image_resolution(path: &Path) -> Option<(u32, u32)> {
  image::image_dimensions(path).ok()
}
