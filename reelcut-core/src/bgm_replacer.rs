//! [MODULE C14] BGM Replacer.
//!
//! `AudioSeparator` is an opaque trait (ML-backed source separation is out
//! of scope per spec.md §1); the gain table, mixing, loop-to-duration, and
//! re-mux are native logic grounded on `ffmpeg.rs::encode_audio` (audio-only
//! ffmpeg subprocess construction) and `concat.rs::ffmpeg`'s audio-remap
//! branch (`-map 0 -map 1 -shortest` pattern, reused here for video+new-
//! audio remux).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capability::{AudioSeparator, SeparatedStems, SeparationStrategy};
use crate::config::{gain_for_vocal_rms, GainEntry};
use crate::error::{Error, Result};
use crate::gateway;

/// Demuxes `video`'s audio track to PCM/WAV, per spec.md §4.11 step 1.
pub fn extract_audio_to_wav(ffmpeg: &str, video: &Path, out_wav: &Path) -> Result<()> {
  if let Some(parent) = out_wav.parent() {
    crate::create_dir!(parent).map_err(Error::Io)?;
  }
  gateway::run(
    ffmpeg,
    crate::into_vec![
      "-hide_banner",
      "-nostdin",
      "-y",
      "-loglevel",
      "error",
      "-i",
      video.display().to_string(),
      "-vn",
      "-acodec",
      "pcm_s16le",
      out_wav.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 10)),
    None,
  )?;
  Ok(())
}

/// Reads a 16-bit mono/stereo PCM WAV's samples as `f32` in `[-1, 1]`,
/// just enough decoding to compute the RMS gate in step 3 — this crate does
/// not carry a general audio-codec dependency, matching the teacher's own
/// preference for driving ffmpeg over linking a decoder for one-off scalar
/// metrics (the same trade-off `frame_picker.rs` documents for video).
pub(crate) fn read_wav_samples_f32(path: &Path) -> Result<Vec<f32>> {
  let bytes = std::fs::read(path)?;
  if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
    return Err(Error::BadInputKind(format!(
      "{} is not a RIFF/WAVE file",
      path.display()
    )));
  }

  let mut pos = 12;
  let mut data: Option<&[u8]> = None;
  while pos + 8 <= bytes.len() {
    let chunk_id = &bytes[pos..pos + 4];
    let chunk_len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
    let body_start = pos + 8;
    let body_end = (body_start + chunk_len).min(bytes.len());
    if chunk_id == b"data" {
      data = Some(&bytes[body_start..body_end]);
      break;
    }
    pos = body_end + (chunk_len % 2);
  }

  let data = data.ok_or_else(|| Error::BadInputKind(format!("{} has no data chunk", path.display())))?;
  Ok(
    data
      .chunks_exact(2)
      .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
      .collect(),
  )
}

/// Vocal RMS over a decoded sample buffer, per spec.md §4.11 step 3.
pub fn rms(samples: &[f32]) -> f32 {
  if samples.is_empty() {
    return 0.0;
  }
  let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
  ((sum_sq / samples.len() as f64).sqrt()) as f32
}

pub fn vocal_rms_of_wav(path: &Path) -> Result<f32> {
  Ok(rms(&read_wav_samples_f32(path)?))
}

/// Loops `bgm` to at least `target_duration` seconds and mixes it with
/// `vocals` using the gain table's `(vocal_gain, bgm_gain, total_gain)`,
/// per spec.md §4.11 steps 3-4. Produces an AAC/44.1kHz/stereo track.
pub fn mix_vocals_and_bgm(
  ffmpeg: &str,
  vocals: &Path,
  bgm: &Path,
  target_duration: f64,
  gain: GainEntry,
  out: &Path,
) -> Result<()> {
  if let Some(parent) = out.parent() {
    crate::create_dir!(parent).map_err(Error::Io)?;
  }

  let filter = format!(
    "[0:a]volume={v}[voc];[1:a]volume={b}[bg];[voc][bg]amix=inputs=2:duration=first:dropout_transition=0[mixed];[mixed]volume={t}[out]",
    v = gain.vocal_gain,
    b = gain.bgm_gain,
    t = gain.total_gain,
  );

  gateway::run(
    ffmpeg,
    crate::into_vec![
      "-hide_banner",
      "-nostdin",
      "-y",
      "-loglevel",
      "error",
      "-i",
      vocals.display().to_string(),
      "-stream_loop",
      "-1",
      "-i",
      bgm.display().to_string(),
      "-filter_complex",
      filter,
      "-map",
      "[out]",
      "-t",
      target_duration.to_string(),
      "-c:a",
      "aac",
      "-ar",
      "44100",
      "-ac",
      "2",
      out.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 30)),
    None,
  )?;
  Ok(())
}

/// Re-muxes `video`'s original video stream with `mixed_audio`, codec-copy
/// on video, per spec.md §4.11 step 5.
pub fn remux(ffmpeg: &str, video: &Path, mixed_audio: &Path, out: &Path) -> Result<()> {
  if let Some(parent) = out.parent() {
    crate::create_dir!(parent).map_err(Error::Io)?;
  }
  gateway::run(
    ffmpeg,
    crate::into_vec![
      "-hide_banner",
      "-nostdin",
      "-y",
      "-loglevel",
      "error",
      "-i",
      video.display().to_string(),
      "-i",
      mixed_audio.display().to_string(),
      "-map",
      "0:v:0",
      "-map",
      "1:a:0",
      "-c:v",
      "copy",
      "-c:a",
      "aac",
      "-ar",
      "44100",
      "-ac",
      "2",
      "-movflags",
      "+faststart",
      out.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 30)),
    None,
  )?;
  Ok(())
}

pub struct BgmReplaceRequest<'a> {
  pub video: &'a Path,
  pub new_bgm: &'a Path,
  pub strategy: SeparationStrategy,
  pub work_dir: &'a Path,
  pub video_duration: f64,
  pub output: &'a Path,
}

/// Runs the full BGM Replacer pipeline, per spec.md §4.11 steps 1-5:
/// demux → separate → gate gain by vocal RMS → loop+mix → re-mux.
pub fn replace_bgm(
  ffmpeg: &str,
  separator: &dyn AudioSeparator,
  req: &BgmReplaceRequest<'_>,
) -> Result<PathBuf> {
  crate::create_dir!(req.work_dir).map_err(Error::Io)?;

  let demuxed = req.work_dir.join("demuxed.wav");
  extract_audio_to_wav(ffmpeg, req.video, &demuxed)?;

  let SeparatedStems { vocals_path, .. } =
    separator.separate(&demuxed, req.strategy, req.work_dir)?;

  let vocal_rms = vocal_rms_of_wav(&vocals_path)?;
  let gain = gain_for_vocal_rms(vocal_rms);

  let mixed = req.work_dir.join("mixed.m4a");
  mix_vocals_and_bgm(
    ffmpeg,
    &vocals_path,
    req.new_bgm,
    req.video_duration,
    gain,
    &mixed,
  )?;

  remux(ffmpeg, req.video, &mixed, req.output)?;

  Ok(req.output.to_path_buf())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_wav(path: &Path, samples: &[i16]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    let data_len = samples.len() * 2;
    bytes.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&44100u32.to_le_bytes());
    bytes.extend_from_slice(&(44100u32 * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data_len as u32).to_le_bytes());
    for s in samples {
      bytes.extend_from_slice(&s.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
  }

  #[test]
  fn rms_of_silence_is_zero() {
    assert_eq!(rms(&[0.0, 0.0, 0.0]), 0.0);
  }

  #[test]
  fn rms_of_full_scale_square_wave_is_one() {
    assert!((rms(&[1.0, -1.0, 1.0, -1.0]) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn vocal_rms_reads_wav_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voc.wav");
    write_wav(&path, &[i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    let r = vocal_rms_of_wav(&path).unwrap();
    assert!((r - 1.0).abs() < 0.01);
  }

  #[test]
  fn gain_table_picks_quiet_band_for_low_rms() {
    let gain = gain_for_vocal_rms(0.01);
    assert_eq!(gain.vocal_gain, 1.6);
    assert_eq!(gain.total_gain, 0.85);
  }

  #[test]
  fn non_wave_file_is_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-wav.wav");
    std::fs::write(&path, b"not a riff file at all").unwrap();
    let err = vocal_rms_of_wav(&path).unwrap_err();
    assert!(matches!(err, Error::BadInputKind(_)));
  }
}
