//! [MODULE C8] Concatenator.
//!
//! Directly grounded on `concat.rs::ffmpeg` (concat-list-file construction,
//! `-f concat -safe 0` invocation), generalized to: (a) write absolute
//! forward-slash paths instead of escaped relative ones, (b) support the
//! optional `-stream_loop -1` BGM remap with `-shortest`, (c) select the
//! quality→(CQ,CRF,AAC) table from spec.md §6 instead of the teacher's
//! lossless concat.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::config::{concat_preset, ConcatQuality};
use crate::error::{Error, Result};
use crate::gateway;
use crate::normalize::VideoEncoder;

/// Writes the concat demuxer list file, one `file '<abspath>'` per line
/// with forward-slash normalization, per spec.md §6.
pub fn write_concat_list(list_path: &Path, clips: &[PathBuf]) -> Result<()> {
  let mut contents = String::with_capacity(32 * clips.len());
  for clip in clips {
    let abs = clip.canonicalize().unwrap_or_else(|_| clip.clone());
    let forward = abs.display().to_string().replace('\\', "/");
    contents.push_str(&format!("file '{forward}'\n"));
  }
  let mut file = File::create(list_path)?;
  file.write_all(contents.as_bytes())?;
  Ok(())
}

/// Picks one BGM file at random from `dir` for a job, per spec.md §4.6.
pub fn pick_random_bgm(dir: &Path) -> Option<PathBuf> {
  let entries: Vec<PathBuf> = std::fs::read_dir(dir)
    .ok()?
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| p.is_file())
    .collect();
  entries.choose(&mut rand::thread_rng()).cloned()
}

pub struct ConcatRequest<'a> {
  /// All slices, required to share one `ResolutionGroup` — enforced by
  /// the caller before invoking this module, per spec.md §3's
  /// `ConcatJob` invariant.
  pub slices: &'a [PathBuf],
  pub bgm: Option<&'a Path>,
  pub quality: ConcatQuality,
  pub encoder: VideoEncoder,
  pub output: &'a Path,
  pub work_dir: &'a Path,
}

/// Produces one concatenated video from an ordered list of same-resolution
/// clips, per spec.md §4.6. Fails with [`Error::BadInputKind`] if `slices`
/// is empty (group-membership itself is the caller's responsibility, per
/// the `ConcatJob` invariant in spec.md §3).
pub fn concat(ffmpeg: &str, req: &ConcatRequest<'_>) -> Result<()> {
  if req.slices.is_empty() {
    return Err(Error::BadInputKind("concat job has no slices".to_owned()));
  }

  crate::create_dir!(req.work_dir).map_err(Error::Io)?;
  let list_path = req.work_dir.join("concat_list.txt");
  write_concat_list(&list_path, req.slices)?;

  let (nvenc_cq, x264_crf, aac_bitrate) = concat_preset(req.quality);

  let mut args: Vec<String> = crate::into_vec![
    "-hide_banner",
    "-nostdin",
    "-y",
    "-loglevel",
    "error",
    "-f",
    "concat",
    "-safe",
    "0",
    "-i",
    list_path.display().to_string(),
  ];

  if let Some(bgm) = req.bgm {
    args.extend(crate::into_vec![
      "-stream_loop",
      "-1",
      "-i",
      bgm.display().to_string(),
    ]);
  }

  match req.encoder {
    VideoEncoder::Nvenc => args.extend(crate::into_vec![
      "-c:v",
      "h264_nvenc",
      "-cq",
      nvenc_cq.to_string(),
    ]),
    _ => args.extend(crate::into_vec![
      "-c:v",
      "libx264",
      "-crf",
      x264_crf.to_string(),
    ]),
  }

  args.extend(crate::into_vec!["-c:a", "aac", "-b:a", aac_bitrate]);

  if req.bgm.is_some() {
    args.extend(crate::into_vec![
      "-map", "0:v:0", "-map", "1:a:0", "-shortest",
    ]);
  }

  args.extend(crate::into_vec![
    "-map_metadata",
    "-1",
    "-movflags",
    "+faststart",
    req.output.display().to_string(),
  ]);

  gateway::run(
    ffmpeg,
    args,
    None,
    &[],
    Some(Duration::from_secs(60 * 60)),
    None,
  )?;

  if !req.output.exists() || req.output.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
    return Err(Error::BadInputKind(
      "concat produced an empty or missing output".to_owned(),
    ));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn list_file_uses_forward_slashes() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("a.mp4");
    std::fs::write(&clip, b"x").unwrap();
    let list = dir.path().join("list.txt");
    write_concat_list(&list, &[clip.clone()]).unwrap();
    let contents = std::fs::read_to_string(&list).unwrap();
    assert!(contents.starts_with("file '"));
    assert!(!contents.contains('\\'));
  }

  #[test]
  fn empty_slices_is_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let req = ConcatRequest {
      slices: &[],
      bgm: None,
      quality: ConcatQuality::Balanced,
      encoder: VideoEncoder::Libx264,
      output: &dir.path().join("out.mp4"),
      work_dir: dir.path(),
    };
    let err = concat("ffmpeg", &req).unwrap_err();
    assert!(matches!(err, Error::BadInputKind(_)));
  }
}
