//! [MODULE C5 data model] `MediaItem`, the identified-file-on-disk record
//! from spec.md §3. Kind is decided purely by extension; a probed item
//! caches the prober's output rather than re-running it.

use std::path::{Path, PathBuf};

use crate::probe::StreamInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
  Video,
  Image,
  Audio,
  Unknown,
}

const VIDEO_EXTS: &[&str] = &["mp4", "mkv", "mov", "avi", "flv", "m2ts", "webm", "wmv"];
const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp", "tiff"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "aac", "flac", "m4a", "ogg"];

/// Classifies a path by extension. Generalizes the teacher's
/// `file_validation::match_file_type` (a single video allowlist) into the
/// spec's three-way video/image/audio split.
pub fn classify_kind(path: &Path) -> MediaKind {
  let ext = match path.extension().and_then(|e| e.to_str()) {
    Some(e) => e.to_ascii_lowercase(),
    None => return MediaKind::Unknown,
  };
  if VIDEO_EXTS.contains(&ext.as_str()) {
    MediaKind::Video
  } else if IMAGE_EXTS.contains(&ext.as_str()) {
    MediaKind::Image
  } else if AUDIO_EXTS.contains(&ext.as_str()) {
    MediaKind::Audio
  } else {
    MediaKind::Unknown
  }
}

/// An identified file on disk, per spec.md §3. Immutable except for the
/// cached probe, matching the lifecycle note ("created on discovery;
/// immutable except for cached probes").
#[derive(Debug, Clone)]
pub struct MediaItem {
  pub path: PathBuf,
  pub kind: MediaKind,
  pub size_bytes: u64,
  probed: Option<StreamInfo>,
}

impl MediaItem {
  pub fn discover(path: impl Into<PathBuf>) -> std::io::Result<Self> {
    let path = path.into();
    let size_bytes = std::fs::metadata(&path)?.len();
    let kind = classify_kind(&path);
    Ok(MediaItem {
      path,
      kind,
      size_bytes,
      probed: None,
    })
  }

  pub fn probed(&self) -> Option<&StreamInfo> {
    self.probed.as_ref()
  }

  pub fn cache_probe(&mut self, info: StreamInfo) {
    self.probed = Some(info);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_by_extension() {
    assert_eq!(classify_kind(Path::new("a/b.MP4")), MediaKind::Video);
    assert_eq!(classify_kind(Path::new("cover.png")), MediaKind::Image);
    assert_eq!(classify_kind(Path::new("track.flac")), MediaKind::Audio);
    assert_eq!(classify_kind(Path::new("readme")), MediaKind::Unknown);
  }
}
