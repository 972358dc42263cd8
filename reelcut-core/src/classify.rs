//! [MODULE C5] Media Classifier — directory enumeration.
//!
//! Extension classification itself lives in [`crate::media::classify_kind`];
//! this module is the walk that turns a directory into a `Vec<MediaItem>`,
//! generalized from the teacher's `file_validation::process_inputs`
//! (single-directory, video-only) into non-recursive/recursive modes over
//! all three media kinds.

use std::path::Path;

use crate::media::{MediaItem, MediaKind};

/// Enumerates `dir`, classifying each entry by extension. Unreadable
/// entries are skipped rather than aborting the whole scan.
pub fn enumerate_dir(dir: &Path, recursive: bool) -> std::io::Result<Vec<MediaItem>> {
  let mut out = Vec::new();
  walk(dir, recursive, &mut out)?;
  Ok(out)
}

fn walk(dir: &Path, recursive: bool, out: &mut Vec<MediaItem>) -> std::io::Result<()> {
  for entry in std::fs::read_dir(dir)? {
    let entry = match entry {
      Ok(e) => e,
      Err(_) => continue,
    };
    let path = entry.path();
    let file_type = match entry.file_type() {
      Ok(t) => t,
      Err(_) => continue,
    };

    if file_type.is_dir() {
      if recursive {
        walk(&path, recursive, out)?;
      }
      continue;
    }

    if let Ok(item) = MediaItem::discover(&path) {
      if item.kind != MediaKind::Unknown {
        out.push(item);
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn non_recursive_ignores_subdirs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
    let sub = dir.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    std::fs::write(sub.join("b.mp4"), b"x").unwrap();

    let items = enumerate_dir(dir.path(), false).unwrap();
    assert_eq!(items.len(), 1);

    let items = enumerate_dir(dir.path(), true).unwrap();
    assert_eq!(items.len(), 2);
  }

  #[test]
  fn unknown_extensions_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();
    let items = enumerate_dir(dir.path(), false).unwrap();
    assert!(items.is_empty());
  }
}
