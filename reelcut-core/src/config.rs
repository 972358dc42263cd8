//! Profile and preset tables for the whole pipeline, held as one plain-data
//! module per the design's note that "profile tables live in one
//! configuration module with a fixed schema... as a plain data struct. No
//! inheritance." Shape (a `Configuration` struct with a `Default` impl and a
//! human-readable `Display`) is grounded on the teacher's `config.rs`.

use std::fmt::{self, Display, Formatter};

/// Quality mode understood by the Normalizer (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr)]
pub enum NormalizeMode {
  #[strum(serialize = "lossless")]
  Lossless,
  #[strum(serialize = "release")]
  Release,
  #[strum(serialize = "preview")]
  Preview,
}

impl Display for NormalizeMode {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str(<&'static str>::from(*self))
  }
}

/// Encoder parameters for one [`NormalizeMode`], per spec.md §4.5's table.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeParams {
  pub x264_crf: u8,
  pub x264_preset: &'static str,
  pub nvenc_cq: u8,
  pub nvenc_preset: &'static str,
  pub audio_bitrate: &'static str,
}

impl NormalizeMode {
  pub const fn params(self) -> NormalizeParams {
    match self {
      Self::Lossless => NormalizeParams {
        x264_crf: 20,
        x264_preset: "slow",
        nvenc_cq: 19,
        nvenc_preset: "p7",
        audio_bitrate: "192k",
      },
      Self::Release => NormalizeParams {
        x264_crf: 24,
        x264_preset: "slower",
        nvenc_cq: 27,
        nvenc_preset: "p6",
        audio_bitrate: "128k",
      },
      Self::Preview => NormalizeParams {
        x264_crf: 28,
        x264_preset: "fast",
        nvenc_cq: 30,
        nvenc_preset: "p3",
        audio_bitrate: "96k",
      },
    }
  }
}

/// Max bitrate/bufsize scaling by output resolution, per spec.md §4.5.
pub fn bitrate_ceiling(width: u32, height: u32) -> (&'static str, &'static str) {
  let long_side = width.max(height);
  if long_side >= 3840 {
    ("12M", "24M")
  } else if long_side >= 2560 {
    ("10M", "20M")
  } else if long_side >= 1920 {
    ("8M", "16M")
  } else if long_side >= 1280 {
    ("5M", "10M")
  } else {
    ("3M", "6M")
  }
}

/// Concatenator quality preset, per spec.md §4.6/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr)]
pub enum ConcatQuality {
  #[strum(serialize = "balanced")]
  Balanced,
  #[strum(serialize = "compact")]
  Compact,
  #[strum(serialize = "tiny")]
  Tiny,
}

impl Default for ConcatQuality {
  fn default() -> Self {
    Self::Balanced
  }
}

/// `(nvenc_cq, x264_crf, aac_bitrate)`, per spec.md §6.
pub fn concat_preset(quality: ConcatQuality) -> (u8, u8, &'static str) {
  match quality {
    ConcatQuality::Balanced => (27, 22, "128k"),
    ConcatQuality::Compact => (29, 24, "96k"),
    ConcatQuality::Tiny => (31, 26, "80k"),
  }
}

/// A named bundle of slicing parameters for one business vertical, per
/// spec.md §4.8. Plain data, no inheritance, matching the design note.
#[derive(Debug, Clone)]
pub struct SceneProfile {
  pub name: &'static str,
  pub pre_roll: f64,
  pub post_roll: f64,
  pub min_dur: f64,
  pub max_hard: f64,
  pub min_hits: u32,
  pub high_keywords: &'static [&'static str],
  pub mid_keywords: &'static [&'static str],
  pub uses_energy_anchors: bool,
}

pub const ECOMMERCE_PROFILE: SceneProfile = SceneProfile {
  name: "ecommerce",
  pre_roll: 3.0,
  post_roll: 5.0,
  min_dur: 5.0,
  max_hard: 60.0,
  min_hits: 2,
  high_keywords: &["buy now", "discount", "limited", "free shipping"],
  mid_keywords: &["price", "quality", "review"],
  uses_energy_anchors: false,
};

pub const GAME_PROFILE: SceneProfile = SceneProfile {
  name: "game",
  pre_roll: 8.0,
  post_roll: 5.0,
  min_dur: 5.0,
  max_hard: 60.0,
  min_hits: 1,
  high_keywords: &["victory", "headshot", "clutch", "level up"],
  mid_keywords: &["boss", "loot", "combo"],
  uses_energy_anchors: true,
};

pub const ENTERTAINMENT_PROFILE: SceneProfile = SceneProfile {
  name: "entertainment",
  pre_roll: 5.0,
  post_roll: 10.0,
  min_dur: 10.0,
  max_hard: 60.0,
  min_hits: 1,
  high_keywords: &["funny", "crazy", "unbelievable", "shocking"],
  mid_keywords: &["wow", "laugh", "amazing"],
  uses_energy_anchors: false,
};

/// `jumpcut` is not a `SceneProfile` windowing run; it clusters matching
/// segments directly (spec.md §4.8's dedicated paragraph). Its two knobs are
/// kept alongside the profile table per the design note's "one configuration
/// module" rule.
#[derive(Debug, Clone, Copy)]
pub struct JumpcutParams {
  pub max_cluster_gap: f64,
  pub max_output_duration: f64,
}

pub const JUMPCUT_PARAMS: JumpcutParams = JumpcutParams {
  max_cluster_gap: 1.5,
  max_output_duration: 45.0,
};

/// BGM Replacer gain table, per spec.md §4.11.
#[derive(Debug, Clone, Copy)]
pub struct GainEntry {
  pub vocal_rms_above: f32,
  pub vocal_gain: f32,
  pub bgm_gain: f32,
  pub total_gain: f32,
}

pub const GAIN_TABLE: [GainEntry; 4] = [
  GainEntry {
    vocal_rms_above: 0.15,
    vocal_gain: 1.4,
    bgm_gain: 0.12,
    total_gain: 0.75,
  },
  GainEntry {
    vocal_rms_above: 0.08,
    vocal_gain: 1.3,
    bgm_gain: 0.18,
    total_gain: 0.80,
  },
  GainEntry {
    vocal_rms_above: 0.03,
    vocal_gain: 1.5,
    bgm_gain: 0.25,
    total_gain: 0.80,
  },
  GainEntry {
    vocal_rms_above: -1.0,
    vocal_gain: 1.6,
    bgm_gain: 0.35,
    total_gain: 0.85,
  },
];

pub fn gain_for_vocal_rms(rms: f32) -> GainEntry {
  GAIN_TABLE
    .iter()
    .copied()
    .find(|e| rms > e.vocal_rms_above)
    .unwrap_or(GAIN_TABLE[3])
}

/// Top-level run configuration: worker pool size and the sample-rate
/// decision recorded in DESIGN.md (48 kHz project default, 44.1 kHz kept for
/// the Beat Mixer's final mux per spec.md §4.7 step 6).
#[derive(Debug, Clone)]
pub struct Configuration {
  pub worker_pool_size: usize,
  pub normalize_fps: u32,
  pub normalize_sample_rate: u32,
  pub mixer_sample_rate: u32,
  pub ffprobe_timeout_secs: u64,
}

impl Default for Configuration {
  fn default() -> Self {
    Configuration {
      worker_pool_size: 4,
      normalize_fps: 25,
      normalize_sample_rate: 48_000,
      mixer_sample_rate: 44_100,
      ffprobe_timeout_secs: 10,
    }
  }
}

impl Display for Configuration {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "workers: {}, fps: {}, normalize_sr: {}, mixer_sr: {}, ffprobe_timeout: {}s",
      self.worker_pool_size,
      self.normalize_fps,
      self.normalize_sample_rate,
      self.mixer_sample_rate,
      self.ffprobe_timeout_secs
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bitrate_ceiling_buckets() {
    assert_eq!(bitrate_ceiling(3840, 2160), ("12M", "24M"));
    assert_eq!(bitrate_ceiling(1920, 1080), ("8M", "16M"));
    assert_eq!(bitrate_ceiling(640, 480), ("3M", "6M"));
  }

  #[test]
  fn gain_table_picks_highest_matching_band() {
    let e = gain_for_vocal_rms(0.2);
    assert_eq!(e.vocal_gain, 1.4);
    let e = gain_for_vocal_rms(0.01);
    assert_eq!(e.vocal_gain, 1.6);
  }
}
