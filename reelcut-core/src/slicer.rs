//! [MODULE C11] Scene Slicer.
//!
//! Scene profile records are the plain `SceneProfile` struct from
//! [`crate::config`], directly grounded on the teacher's `Scene`/
//! `ZoneOptions` plain-data records in `scenes.rs`. Anchor/window
//! expansion-and-merge logic is grounded on `split.rs::extra_splits` (the
//! teacher's own window-splitting arithmetic over a `Vec<Scene>`).
//! Transcription goes through [`crate::capability::Transcriber`]; vision
//! filtering goes through [`crate::capability::VisionCaptioner`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capability::{TranscribeOptions, TranscriptSegment, Transcriber, VisionCaptioner};
use crate::config::{JumpcutParams, SceneProfile};
use crate::error::{Error, Result};
use crate::gateway;

/// One candidate output window, per spec.md §3's `SliceJob` (`output
/// files[]`).
#[derive(Debug, Clone, PartialEq)]
pub struct SceneWindow {
  pub start: f64,
  pub end: f64,
  pub keyword_hits: u32,
}

impl SceneWindow {
  pub fn duration(&self) -> f64 {
    self.end - self.start
  }
}

/// Finds segment indices whose (lowercased) text contains any `high`
/// keyword, per spec.md §4.8 step 2.
fn high_keyword_anchors(segments: &[TranscriptSegment], profile: &SceneProfile) -> Vec<usize> {
  segments
    .iter()
    .enumerate()
    .filter(|(_, seg)| {
      let text = seg.text.to_ascii_lowercase();
      profile.high_keywords.iter().any(|kw| text.contains(kw))
    })
    .map(|(i, _)| i)
    .collect()
}

/// For `game`, injects anchors at audio-energy peaks (RMS per 500ms >
/// avg × 1.8), mapped to the nearest ASR segment, per spec.md §4.8 step 2.
pub fn energy_peak_anchors(
  rms_per_500ms: &[f32],
  segments: &[TranscriptSegment],
) -> Vec<usize> {
  if rms_per_500ms.is_empty() || segments.is_empty() {
    return Vec::new();
  }
  let avg = rms_per_500ms.iter().sum::<f32>() / rms_per_500ms.len() as f32;
  let threshold = avg * 1.8;

  rms_per_500ms
    .iter()
    .enumerate()
    .filter(|(_, &rms)| rms > threshold)
    .map(|(i, _)| {
      let t = i as f64 * 0.5;
      nearest_segment_index(segments, t)
    })
    .collect()
}

fn nearest_segment_index(segments: &[TranscriptSegment], t: f64) -> usize {
  segments
    .iter()
    .enumerate()
    .min_by(|(_, a), (_, b)| {
      let da = midpoint_distance(a, t);
      let db = midpoint_distance(b, t);
      da.partial_cmp(&db).unwrap()
    })
    .map(|(i, _)| i)
    .unwrap_or(0)
}

fn midpoint_distance(seg: &TranscriptSegment, t: f64) -> f64 {
  ((seg.start + seg.end) / 2.0 - t).abs()
}

/// Extracts a mono PCM WAV at `sample_rate` Hz for RMS energy analysis, per
/// spec.md §4.8 step 2's `game`-profile energy anchors. A fixed `-ar` keeps
/// [`rms_per_500ms`]'s window size (in samples) well-defined regardless of
/// the source's native rate, the same "pin the rate, don't infer it from
/// the container" approach the Normalizer (C6) and Beat Mixer (C10) take.
fn extract_energy_wav(ffmpeg: &str, audio_path: &Path, out_wav: &Path, sample_rate: u32) -> Result<()> {
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
      audio_path.display().to_string(),
      "-vn",
      "-ac",
      "1",
      "-ar",
      sample_rate.to_string(),
      "-acodec",
      "pcm_s16le",
      out_wav.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 5)),
    None,
  )?;
  Ok(())
}

/// Chunks mono `samples` (`sample_rate` Hz) into 500ms windows and computes
/// each window's RMS, the energy curve [`energy_peak_anchors`] scans for
/// peaks, per spec.md §4.8 step 2.
fn rms_per_500ms(samples: &[f32], sample_rate: u32) -> Vec<f32> {
  let window = ((sample_rate as usize) / 2).max(1);
  samples.chunks(window).map(crate::bgm_replacer::rms).collect()
}

/// Expands each anchor segment into `[start − pre_roll, end + post_roll]`
/// and merges overlapping windows, the window arithmetic grounded on
/// `split.rs::extra_splits`'s own start/end bookkeeping over a `Vec<Scene>`.
pub fn expand_and_merge(
  segments: &[TranscriptSegment],
  anchor_indices: &[usize],
  profile: &SceneProfile,
  total_duration: f64,
) -> Vec<SceneWindow> {
  let mut windows: Vec<SceneWindow> = anchor_indices
    .iter()
    .filter_map(|&i| segments.get(i))
    .map(|seg| SceneWindow {
      start: (seg.start - profile.pre_roll).max(0.0),
      end: (seg.end + profile.post_roll).min(total_duration),
      keyword_hits: 1,
    })
    .collect();

  windows.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());

  let mut merged: Vec<SceneWindow> = Vec::with_capacity(windows.len());
  for w in windows {
    match merged.last_mut() {
      Some(prev) if w.start <= prev.end => {
        prev.end = prev.end.max(w.end);
        prev.keyword_hits += w.keyword_hits;
      }
      _ => merged.push(w),
    }
  }

  merged
}

/// Counts `high ∪ mid` keyword hits inside `[window.start, window.end]`,
/// per spec.md §4.8 step 4 ("hits = high+mid matches ∈ window").
pub fn count_keyword_hits(
  segments: &[TranscriptSegment],
  window: &SceneWindow,
  profile: &SceneProfile,
) -> u32 {
  segments
    .iter()
    .filter(|seg| seg.start >= window.start && seg.end <= window.end)
    .map(|seg| {
      let text = seg.text.to_ascii_lowercase();
      let high = profile.high_keywords.iter().filter(|kw| text.contains(*kw)).count();
      let mid = profile.mid_keywords.iter().filter(|kw| text.contains(*kw)).count();
      (high + mid) as u32
    })
    .sum()
}

/// Applies spec.md §4.8 step 4's three enforcement rules:
/// `duration ≤ max_hard`, `duration ≥ min_dur`, `keyword_hits ≥ min_hits`.
pub fn enforce_window_constraints(
  windows: Vec<SceneWindow>,
  segments: &[TranscriptSegment],
  profile: &SceneProfile,
) -> Vec<SceneWindow> {
  windows
    .into_iter()
    .map(|mut w| {
      w.end = (w.start + profile.max_hard).min(w.end);
      w.keyword_hits = count_keyword_hits(segments, &w, profile);
      w
    })
    .filter(|w| w.duration() >= profile.min_dur && w.keyword_hits >= profile.min_hits)
    .collect()
}

/// Runs the full non-`jumpcut` Scene Slicer pipeline, per spec.md §4.8
/// steps 1-6 (steps omit the optional vision filter and subtitle burn-in,
/// handled by the caller via [`filter_by_vision`] and
/// [`crate::subtitle`]).
///
/// For profiles with `uses_energy_anchors` set (`game`), this also demuxes
/// `audio_path` to a mono WAV at `energy_sample_rate` under `work_dir`,
/// computes its per-500ms RMS curve, and merges
/// [`energy_peak_anchors`]' indices into the keyword-anchor set before
/// window expansion, per spec.md §4.8 step 2.
pub fn slice_scenes(
  ffmpeg: &str,
  transcriber: &dyn Transcriber,
  audio_path: &Path,
  total_duration: f64,
  profile: &SceneProfile,
  transcribe_options: &TranscribeOptions,
  energy_sample_rate: u32,
  work_dir: &Path,
) -> Result<Vec<SceneWindow>> {
  let segments = transcriber.transcribe(audio_path, transcribe_options)?;
  let mut anchors = high_keyword_anchors(&segments, profile);

  if profile.uses_energy_anchors {
    crate::create_dir!(work_dir).map_err(Error::Io)?;
    let energy_wav = work_dir.join("energy.wav");
    extract_energy_wav(ffmpeg, audio_path, &energy_wav, energy_sample_rate)?;
    let samples = crate::bgm_replacer::read_wav_samples_f32(&energy_wav)?;
    let curve = rms_per_500ms(&samples, energy_sample_rate);
    anchors.extend(energy_peak_anchors(&curve, &segments));
    anchors.sort_unstable();
    anchors.dedup();
    let _ = std::fs::remove_file(&energy_wav);
  }

  let windows = expand_and_merge(&segments, &anchors, profile, total_duration);
  Ok(enforce_window_constraints(windows, &segments, profile))
}

/// Optional vision filter, per spec.md §4.8 step 5: extract a mid-frame for
/// each surviving window and keep it only if any `visual_keyword`
/// substring appears in the (lowercased) caption.
pub fn filter_by_vision(
  captioner: &dyn VisionCaptioner,
  windows: Vec<SceneWindow>,
  mid_frame_of: impl Fn(&SceneWindow) -> Result<PathBuf>,
  visual_keywords: &[&str],
) -> Result<Vec<SceneWindow>> {
  if visual_keywords.is_empty() {
    return Ok(windows);
  }
  let mut kept = Vec::with_capacity(windows.len());
  for w in windows {
    let frame = mid_frame_of(&w)?;
    let caption = captioner.caption(&frame)?.to_ascii_lowercase();
    if visual_keywords.iter().any(|kw| caption.contains(kw)) {
      kept.push(w);
    }
  }
  Ok(kept)
}

/// Encodes one slice with `-ss <start> -t <dur>`, per spec.md §4.8 step 6.
pub fn encode_slice(ffmpeg: &str, source: &Path, window: &SceneWindow, out: &Path) -> Result<()> {
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
      "-ss",
      window.start.to_string(),
      "-i",
      source.display().to_string(),
      "-t",
      window.duration().to_string(),
      "-c:v",
      "libx264",
      "-crf",
      "23",
      "-pix_fmt",
      "yuv420p",
      "-c:a",
      "aac",
      out.display().to_string(),
    ],
    None,
    &[],
    Some(Duration::from_secs(60 * 30)),
    None,
  )?;
  Ok(())
}

/// `jumpcut` profile, per spec.md §4.8's dedicated paragraph: select ASR
/// segments containing any `high ∪ mid` keyword, include ±1 neighboring
/// segments, cluster by time-gap, cap cluster duration by
/// `max_output_duration`.
///
/// The design note in spec.md §9 flags that `max_output_duration` applies
/// per-cluster while `max_hard_limit` (the non-jumpcut profiles' knob)
/// applies per-window; this function keeps that distinction explicit by
/// capping on `params.max_output_duration` only, never on a `SceneProfile`.
pub fn jumpcut_clusters(
  segments: &[TranscriptSegment],
  high_keywords: &[&str],
  mid_keywords: &[&str],
  params: &JumpcutParams,
) -> Vec<Vec<usize>> {
  let matches: Vec<usize> = segments
    .iter()
    .enumerate()
    .filter(|(_, seg)| {
      let text = seg.text.to_ascii_lowercase();
      high_keywords.iter().chain(mid_keywords).any(|kw| text.contains(kw))
    })
    .map(|(i, _)| i)
    .collect();

  let mut selected: Vec<usize> = matches
    .iter()
    .flat_map(|&i| {
      let lo = i.saturating_sub(1);
      let hi = (i + 1).min(segments.len().saturating_sub(1));
      lo..=hi
    })
    .collect();
  selected.sort_unstable();
  selected.dedup();

  let mut clusters: Vec<Vec<usize>> = Vec::new();
  for idx in selected {
    let seg = &segments[idx];
    match clusters.last_mut() {
      Some(cluster) => {
        let prev_end = segments[*cluster.last().unwrap()].end;
        let cluster_start = segments[cluster[0]].start;
        let gap = seg.start - prev_end;
        let would_be_duration = seg.end - cluster_start;
        if gap < params.max_cluster_gap && would_be_duration <= params.max_output_duration {
          cluster.push(idx);
          continue;
        }
      }
      None => {}
    }
    clusters.push(vec![idx]);
  }

  clusters
}

#[cfg(test)]
mod tests {
  use super::*;

  fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
      start,
      end,
      text: text.to_owned(),
    }
  }

  #[test]
  fn expand_and_merge_overlapping_windows() {
    let segments = vec![seg(10.0, 11.0, "buy now"), seg(11.5, 12.5, "discount")];
    let profile = crate::config::ECOMMERCE_PROFILE;
    let windows = expand_and_merge(&segments, &[0, 1], &profile, 100.0);
    assert_eq!(windows.len(), 1);
    assert!(windows[0].start <= 7.0);
    assert!(windows[0].end >= 17.0);
  }

  #[test]
  fn enforce_constraints_drops_short_windows() {
    let segments = vec![seg(10.0, 10.5, "buy now")];
    let profile = crate::config::ECOMMERCE_PROFILE;
    let windows = vec![SceneWindow {
      start: 9.0,
      end: 11.0,
      keyword_hits: 0,
    }];
    let out = enforce_window_constraints(windows, &segments, &profile);
    assert!(out.is_empty(), "2s window should fail min_dur=5.0");
  }

  #[test]
  fn jumpcut_clusters_merge_within_gap() {
    let segments = vec![
      seg(0.0, 1.0, "ok"),
      seg(1.2, 2.0, "headshot"),
      seg(2.1, 3.0, "ok"),
      seg(20.0, 21.0, "combo"),
    ];
    let params = JumpcutParams {
      max_cluster_gap: 1.5,
      max_output_duration: 45.0,
    };
    let clusters = jumpcut_clusters(&segments, &["headshot"], &["combo"], &params);
    assert_eq!(clusters.len(), 2);
  }

  #[test]
  fn rms_per_500ms_chunks_by_sample_rate() {
    let sample_rate = 1000u32; // 500 samples per window
    let quiet = vec![0.0f32; 500];
    let loud = vec![1.0f32; 500];
    let mut samples = quiet.clone();
    samples.extend(loud);
    let curve = rms_per_500ms(&samples, sample_rate);
    assert_eq!(curve.len(), 2);
    assert!((curve[0] - 0.0).abs() < 1e-6);
    assert!((curve[1] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn energy_peak_anchors_map_to_nearest_segment() {
    let segments = vec![seg(0.0, 1.0, "ok"), seg(10.0, 11.0, "ok")];
    // 500ms windows: a peak at index 0 (t=0.0s, nearest seg0's midpoint
    // 0.5s) and a peak at index 21 (t=10.5s, exactly seg1's midpoint).
    let mut curve = vec![0.0f32; 22];
    curve[0] = 1.0;
    curve[21] = 1.0;
    let anchors = energy_peak_anchors(&curve, &segments);
    assert!(anchors.contains(&0));
    assert!(anchors.contains(&1));
  }
}
