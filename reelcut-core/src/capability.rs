//! Supplement: `Transcriber` / `VisionCaptioner` / `AudioSeparator` traits.
//!
//! spec.md §1 explicitly scopes ML models out as "opaque capability
//! providers behind small interfaces." `examples/original_source/` (the
//! implementation this spec was distilled from) shows these interfaces
//! concretely: a Whisper-backed transcriber producing per-segment
//! `{start, end, text}` tuples, a vision-captioning call taking one frame
//! and returning a caption, and a source-separation call taking mixed audio
//! and returning `(vocals, other)` stems. These three traits are grounded
//! on `itsmontoya-scribble`'s `Backend`/`BackendStream` traits (a pluggable
//! ASR backend behind a narrow interface) and the teacher's own
//! `vapoursynth.rs` pattern of wrapping an external interpreter behind a
//! small Rust API.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// One transcribed segment of speech, per spec.md §4.8 step 1.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
  pub start: f64,
  pub end: f64,
  pub text: String,
}

#[derive(Debug, Clone)]
pub struct TranscribeOptions {
  pub language: Option<String>,
  pub vad_filter: bool,
}

impl Default for TranscribeOptions {
  fn default() -> Self {
    TranscribeOptions {
      language: None,
      vad_filter: true,
    }
  }
}

/// Opaque speech-recognition capability. Mirrors the shape of
/// `itsmontoya-scribble::backend::Backend::transcribe_full`, but returns a
/// plain `Vec<TranscriptSegment>` instead of writing through a
/// `SegmentEncoder`, since this crate's Subtitle Renderer (C16) owns its
/// own encoder abstraction.
pub trait Transcriber: Send + Sync {
  fn transcribe(
    &self,
    audio_path: &Path,
    options: &TranscribeOptions,
  ) -> Result<Vec<TranscriptSegment>>;
}

/// Opaque vision-captioning capability, per spec.md §4.8 step 5.
pub trait VisionCaptioner: Send + Sync {
  fn caption(&self, frame_path: &Path) -> Result<String>;
}

/// Separation strategy, per spec.md §4.11 step 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationStrategy {
  VocalsOnly,
  VocalsAndOther,
  CustomMix,
  Adaptive,
}

#[derive(Debug, Clone)]
pub struct SeparatedStems {
  pub vocals_path: std::path::PathBuf,
  pub other_path: Option<std::path::PathBuf>,
}

/// Opaque source-separation capability, per spec.md §4.11 step 2.
pub trait AudioSeparator: Send + Sync {
  fn separate(
    &self,
    audio_path: &Path,
    strategy: SeparationStrategy,
    work_dir: &Path,
  ) -> Result<SeparatedStems>;
}

/// Key identifying one loaded model instance, per spec.md §9's design note.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
  pub model_id: String,
  pub device: String,
  pub compute_type: String,
}

/// Recast of the spec's "process-wide model singletons" design note: a
/// registry mapping `(model_id, device, compute_type) → Handle`, serialized
/// by a `parking_lot::Mutex` — the same lock type the teacher already
/// depends on for shared mutable state. Loading happens at most once per
/// key; concurrent callers share one instance. This is the only place
/// global-ish mutable state is allowed to live, per spec.md §9.
pub struct ModelRegistry<H> {
  handles: Mutex<HashMap<ModelKey, Arc<H>>>,
}

impl<H> Default for ModelRegistry<H> {
  fn default() -> Self {
    ModelRegistry {
      handles: Mutex::new(HashMap::new()),
    }
  }
}

impl<H> ModelRegistry<H> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the shared handle for `key`, creating it via `load` on first
  /// request. `load` runs while holding the registry lock, so two
  /// concurrent callers requesting the same key never race to load twice.
  pub fn get_or_load<F>(&self, key: ModelKey, load: F) -> Result<Arc<H>>
  where
    F: FnOnce() -> Result<H>,
  {
    let mut handles = self.handles.lock();
    if let Some(existing) = handles.get(&key) {
      return Ok(existing.clone());
    }
    let handle = Arc::new(load()?);
    handles.insert(key, handle.clone());
    Ok(handle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn get_or_load_creates_once_and_shares() {
    let registry: ModelRegistry<u32> = ModelRegistry::new();
    let loads = Arc::new(Mutex::new(0));

    let key = ModelKey {
      model_id: "whisper-base".into(),
      device: "cpu".into(),
      compute_type: "int8".into(),
    };

    for _ in 0..3 {
      let loads = loads.clone();
      registry
        .get_or_load(key.clone(), || {
          *loads.lock() += 1;
          Ok(42)
        })
        .unwrap();
    }

    assert_eq!(*loads.lock(), 1);
  }
}
