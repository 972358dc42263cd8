//! [MODULE C9] Beat Extractor.
//!
//! The extraction algorithm itself is an opaque capability, per spec.md
//! §4.7's intro. Modeled as a `BeatExtractor` trait the same way the
//! teacher treats VapourSynth scripting as an external capability wrapped
//! by a thin Rust interface (`vapoursynth.rs`), and the way
//! `itsmontoya-scribble` wraps Whisper behind its `Backend` trait.
//! `BeatsMeta` is the wire/JSON schema from spec.md §6.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
  pub start_time: f64,
  pub end_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
  pub highlight: Highlight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatsMetaInfo {
  pub duration: f64,
}

/// `{ beats: [t_seconds, …], meta: {duration}, suggestion: {highlight} }`,
/// per spec.md §6. `beats` is non-decreasing; `0 ≤ start < end ≤ duration`
/// is an invariant enforced at construction time by [`BeatsMeta::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatsMeta {
  pub meta: BeatsMetaInfo,
  pub beats: Vec<f64>,
  pub suggestion: Suggestion,
}

impl BeatsMeta {
  pub fn new(duration: f64, mut beats: Vec<f64>, highlight: Option<Highlight>) -> Self {
    beats.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let highlight = highlight.unwrap_or(Highlight {
      start_time: 0.0,
      end_time: duration,
    });
    BeatsMeta {
      meta: BeatsMetaInfo { duration },
      beats,
      suggestion: Suggestion { highlight },
    }
  }
}

/// Opaque beat-extraction capability, per spec.md §4.7. A concrete
/// implementation (e.g. onset-detection over an audio buffer) is a
/// collaborator's responsibility, not specified here.
pub trait BeatExtractor: Send + Sync {
  fn extract(&self, audio_path: &Path) -> Result<BeatsMeta>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn beats_are_sorted_on_construction() {
    let meta = BeatsMeta::new(10.0, vec![3.0, 1.0, 2.0], None);
    assert_eq!(meta.beats, vec![1.0, 2.0, 3.0]);
  }

  #[test]
  fn default_highlight_spans_full_duration() {
    let meta = BeatsMeta::new(12.5, vec![], None);
    assert_eq!(meta.suggestion.highlight.start_time, 0.0);
    assert_eq!(meta.suggestion.highlight.end_time, 12.5);
  }
}
