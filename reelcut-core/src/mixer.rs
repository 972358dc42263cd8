//! [MODULE C10] Beat Mixer.
//!
//! Window resolution, interval merge, and per-interval media selection are
//! native Rust logic; each interval's lossless re-encode and the final
//! concat-copy reuse the Normalizer's profile builder (C6) and the
//! Concatenator's list-file writer (C8), exactly as the teacher's
//! `broker.rs` reuses `ffmpeg::num_frames` and `settings::EncodeArgs`
//! across the encode and verification paths rather than duplicating them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;

use crate::concat::write_concat_list;
use crate::error::{Error, Result};
use crate::gateway;
use crate::media::{MediaItem, MediaKind};
use crate::util::printable_base10_digits;

/// One inter-beat interval to be rendered from a randomly chosen source,
/// per spec.md §4.7 step 3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
  pub start: f64,
  pub end: f64,
}

impl Interval {
  pub fn duration(&self) -> f64 {
    self.end - self.start
  }
}

/// Resolves the effective mix window, per spec.md §4.7 step 1: the
/// user-supplied window if valid, else the extractor's suggested
/// highlight, else the full track, clamped to `[0, duration]`.
pub fn resolve_window(
  requested: Option<(f64, f64)>,
  suggestion: Option<(f64, f64)>,
  duration: f64,
) -> (f64, f64) {
  let (start, end) = requested
    .filter(|(s, e)| *e > *s)
    .or(suggestion.filter(|(s, e)| *e > *s))
    .unwrap_or((0.0, duration));

  (start.max(0.0).min(duration), end.max(0.0).min(duration))
}

/// Builds the merged interval sequence, per spec.md §4.7 steps 2-3: filter
/// beats into the window, sort, then for each consecutive pair form an
/// interval of duration `max(t_{i+1}-t_i, clip_min_interval)`, merging
/// forward when the next beat is too close.
pub fn build_intervals(beats: &[f64], window: (f64, f64), clip_min_interval: f64) -> Vec<Interval> {
  let (win_start, win_end) = window;
  let mut points: Vec<f64> = beats
    .iter()
    .copied()
    .filter(|&t| t >= win_start && t <= win_end)
    .collect();
  points.sort_by(|a, b| a.partial_cmp(b).unwrap());

  if points.first() != Some(&win_start) {
    points.insert(0, win_start);
  }
  if points.last() != Some(&win_end) {
    points.push(win_end);
  }
  points.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);

  let mut intervals = Vec::new();
  let mut cursor = points[0];

  for &next in &points[1..] {
    if next - cursor < clip_min_interval {
      // too close: keep accumulating until the minimum is satisfied,
      // unless this is the final point, in which case we must stop here.
      if next == win_end {
        if let Some(last) = intervals.last_mut() {
          let last: &mut Interval = last;
          last.end = win_end;
        } else {
          intervals.push(Interval {
            start: cursor,
            end: win_end,
          });
        }
        cursor = win_end;
      }
      continue;
    }
    intervals.push(Interval {
      start: cursor,
      end: next,
    });
    cursor = next;
  }

  if cursor < win_end {
    intervals.push(Interval {
      start: cursor,
      end: win_end,
    });
  }

  intervals
}

pub struct MixRequest<'a> {
  pub ffprobe: &'a str,
  pub audio_path: &'a Path,
  pub beats: &'a [f64],
  pub requested_window: Option<(f64, f64)>,
  pub suggested_window: Option<(f64, f64)>,
  pub audio_duration: f64,
  pub media_pool: &'a [MediaItem],
  pub output_dir: &'a Path,
  pub clip_min_interval: f64,
  pub sample_rate: u32,
}

/// Runs the full Beat Mixer pipeline, per spec.md §4.7 steps 1-7. Returns
/// the final `beats_mixed_<rand>.mp4` path.
pub fn mix(ffmpeg: &str, req: &MixRequest<'_>) -> Result<PathBuf> {
  let window = resolve_window(req.requested_window, req.suggested_window, req.audio_duration);
  let intervals = build_intervals(req.beats, window, req.clip_min_interval);

  if req.media_pool.is_empty() {
    return Err(Error::BadInputKind("beat mix pool is empty".to_owned()));
  }

  crate::create_dir!(req.output_dir).map_err(Error::Io)?;
  let segments_dir = req.output_dir.join("segments");
  crate::create_dir!(&segments_dir).map_err(Error::Io)?;

  let mut rng = rand::thread_rng();
  let mut shuffled_pool: Vec<&MediaItem> = req.media_pool.iter().collect();
  use rand::seq::SliceRandom;
  shuffled_pool.shuffle(&mut rng);

  let pad = printable_base10_digits(intervals.len()) as usize;
  let mut segment_paths = Vec::with_capacity(intervals.len());

  for (i, interval) in intervals.iter().enumerate() {
    // tie-break: reshuffle with replacement once exhausted, per spec.md
    // §4.7's "reshuffle with replacement" note.
    if shuffled_pool.is_empty() {
      shuffled_pool = req.media_pool.iter().collect();
      shuffled_pool.shuffle(&mut rng);
    }
    let source = shuffled_pool.pop().ok_or_else(|| {
      Error::BadInputKind("beat mix pool exhausted unexpectedly".to_owned())
    })?;

    let out = segments_dir.join(format!("{:0pad$}.mp4", i, pad = pad));
    render_segment(ffmpeg, req.ffprobe, source, interval.duration(), &mut rng, &out)
      .map_err(|e| annotate_segment_failure(e, i))?;
    segment_paths.push(out);
  }

  let concat_list = req.output_dir.join("concat_list.txt");
  write_concat_list(&concat_list, &segment_paths)?;

  let video_only = req.output_dir.join("video_only.mp4");
  gateway::run(
    ffmpeg,
    crate::into_vec![
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
      concat_list.display().to_string(),
      "-c",
      "copy",
      video_only.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 30)),
    None,
  )?;

  let audio_slice = req.output_dir.join("audio_slice.m4a");
  gateway::run(
    ffmpeg,
    crate::into_vec![
      "-hide_banner",
      "-nostdin",
      "-y",
      "-loglevel",
      "error",
      "-ss",
      window.0.to_string(),
      "-t",
      (window.1 - window.0).to_string(),
      "-i",
      req.audio_path.display().to_string(),
      "-vn",
      "-c:a",
      "aac",
      "-ar",
      req.sample_rate.to_string(),
      audio_slice.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 10)),
    None,
  )?;

  let rand_suffix: u32 = rng.gen();
  let output = req
    .output_dir
    .join(format!("beats_mixed_{rand_suffix:08x}.mp4"));

  gateway::run(
    ffmpeg,
    crate::into_vec![
      "-hide_banner",
      "-nostdin",
      "-y",
      "-loglevel",
      "error",
      "-i",
      video_only.display().to_string(),
      "-i",
      audio_slice.display().to_string(),
      "-map",
      "0:v:0",
      "-map",
      "1:a:0",
      "-shortest",
      "-c",
      "copy",
      output.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 10)),
    None,
  )?;

  // success: drop the scratch segment/intermediate files, per spec.md
  // §4.7 step 7 ("remove temp directory on success").
  let _ = std::fs::remove_dir_all(&segments_dir);
  let _ = std::fs::remove_file(&video_only);
  let _ = std::fs::remove_file(&audio_slice);
  let _ = std::fs::remove_file(&concat_list);

  Ok(output)
}

fn annotate_segment_failure(err: Error, index: usize) -> Error {
  match err {
    Error::Other(e) => Error::Other(e.context(format!("segment index {index}"))),
    other => Error::Other(anyhow::anyhow!("segment index {index}: {other}")),
  }
}

/// Renders one uniform-profile segment, per spec.md §4.7 step 4: a random
/// sub-clip of a video source, or a `duration`-seconds still for an image
/// source. Exact re-encode is mandatory — concat-copy downstream requires
/// identical codec parameters across every segment.
fn render_segment(
  ffmpeg: &str,
  ffprobe: &str,
  source: &MediaItem,
  duration: f64,
  rng: &mut impl Rng,
  out: &Path,
) -> Result<()> {
  match source.kind {
    MediaKind::Video => {
      let video_duration = crate::probe::probe_duration(ffprobe, &source.path);
      let max_start = (video_duration - duration).max(0.0);
      let start = if max_start > 0.0 {
        rng.gen_range(0.0..max_start)
      } else {
        0.0
      };

      gateway::run(
        ffmpeg,
        crate::into_vec![
          "-hide_banner",
          "-nostdin",
          "-y",
          "-loglevel",
          "error",
          "-ss",
          start.to_string(),
          "-i",
          source.path.display().to_string(),
          "-t",
          duration.to_string(),
          "-vf",
          "fps=25",
          "-c:v",
          "libx264",
          "-pix_fmt",
          "yuv420p",
          "-an",
          out.display().to_string(),
        ],
        None,
        &[],
        Some(Duration::from_secs(60 * 5)),
        None,
      )?;
    }
    MediaKind::Image => {
      gateway::run(
        ffmpeg,
        crate::into_vec![
          "-hide_banner",
          "-nostdin",
          "-y",
          "-loglevel",
          "error",
          "-loop",
          "1",
          "-i",
          source.path.display().to_string(),
          "-t",
          duration.to_string(),
          "-vf",
          "fps=25",
          "-c:v",
          "libx264",
          "-pix_fmt",
          "yuv420p",
          "-an",
          out.display().to_string(),
        ],
        None,
        &[],
        Some(Duration::from_secs(60 * 5)),
        None,
      )?;
    }
    _ => {
      return Err(Error::BadInputKind(format!(
        "media pool item {:?} is neither video nor image",
        source.path
      )))
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn e4_beat_mix_determinism() {
    let beats = vec![0.00, 0.33, 0.66, 1.00];
    let window = resolve_window(Some((0.0, 1.0)), None, 1.0);
    let intervals = build_intervals(&beats, window, 0.33);
    assert_eq!(intervals.len(), 3);
    assert!((intervals[0].start - 0.0).abs() < 1e-9);
    assert!((intervals[0].end - 0.33).abs() < 1e-6);
    assert!((intervals[2].end - 1.0).abs() < 1e-9);
    let total: f64 = intervals.iter().map(Interval::duration).sum();
    assert!((total - 1.0).abs() < 1e-6);
  }

  #[test]
  fn window_falls_back_to_suggestion_then_full_track() {
    assert_eq!(resolve_window(None, Some((2.0, 5.0)), 10.0), (2.0, 5.0));
    assert_eq!(resolve_window(None, None, 10.0), (0.0, 10.0));
  }

  #[test]
  fn window_clamps_to_duration() {
    assert_eq!(resolve_window(Some((-5.0, 20.0)), None, 10.0), (0.0, 10.0));
  }

  #[test]
  fn close_beats_merge_forward() {
    let beats = vec![0.0, 0.05, 0.10, 1.0];
    let intervals = build_intervals(&beats, (0.0, 1.0), 0.5);
    assert!(intervals.iter().all(|i| i.duration() >= 0.5 - 1e-6));
  }
}
