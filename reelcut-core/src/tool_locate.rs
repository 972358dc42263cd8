//! [MODULE C1] Tool Locator.
//!
//! Resolves `ffmpeg`/`ffprobe` the way `xmoezzz-rfvp`'s `rfvp-video` crate
//! resolves its own external tools: through the `which` crate rather than
//! hand-rolled `PATH` scanning. A successful resolution is memoized behind a
//! `once_cell::sync::OnceCell`, mirroring the teacher's
//! `static USE_OLD_SVT_AV1: Lazy<bool>` pattern in `encoder.rs`; failures are
//! not cached since they usually mean the caller hasn't set up its bundled
//! directory yet.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};

/// Env var gating whether `PATH` search is permitted at all, per spec.md §6.
pub const FFMPEG_DEV_FALLBACK: &str = "FFMPEG_DEV_FALLBACK";

#[derive(Debug, Clone)]
pub struct ResolvedTools {
  pub ffmpeg: PathBuf,
  pub ffprobe: PathBuf,
}

static RESOLVED: OnceCell<ResolvedTools> = OnceCell::new();

/// Resolves ffmpeg/ffprobe. Search order, per spec.md §4.1: bundled
/// directory, explicit override, then system `PATH` only if
/// `FFMPEG_DEV_FALLBACK` is set. Fails with [`Error::ToolNotFound`] when a
/// required binary cannot be found anywhere in that order.
pub fn resolve(bundled_dir: Option<&Path>, override_dir: Option<&Path>) -> Result<ResolvedTools> {
  if let Some(tools) = RESOLVED.get() {
    return Ok(tools.clone());
  }

  let tools = resolve_uncached(bundled_dir, override_dir)?;
  Ok(RESOLVED.get_or_init(|| tools).clone())
}

fn resolve_uncached(
  bundled_dir: Option<&Path>,
  override_dir: Option<&Path>,
) -> Result<ResolvedTools> {
  let dev_fallback = std::env::var(FFMPEG_DEV_FALLBACK).is_ok();

  let search_dirs: Vec<&Path> = override_dir.into_iter().chain(bundled_dir).collect();

  let ffmpeg = find_one("ffmpeg", &search_dirs, dev_fallback)?;
  let ffprobe = find_one("ffprobe", &search_dirs, dev_fallback)?;

  if let Some(dir) = ffmpeg.parent() {
    prepend_to_path(dir);
  }

  Ok(ResolvedTools { ffmpeg, ffprobe })
}

fn find_one(name: &str, dirs: &[&Path], dev_fallback: bool) -> Result<PathBuf> {
  for dir in dirs {
    let candidate = dir.join(exe_name(name));
    if candidate.is_file() {
      return Ok(candidate);
    }
  }

  if dev_fallback {
    if let Ok(found) = which::which(name) {
      return Ok(found);
    }
  }

  Err(Error::ToolNotFound(name.to_owned()))
}

#[cfg(windows)]
fn exe_name(name: &str) -> String {
  format!("{}.exe", name)
}

#[cfg(not(windows))]
fn exe_name(name: &str) -> String {
  name.to_owned()
}

fn prepend_to_path(dir: &Path) {
  let existing = std::env::var_os("PATH").unwrap_or_default();
  let mut paths: Vec<PathBuf> = vec![dir.to_path_buf()];
  paths.extend(std::env::split_paths(&existing));
  if let Ok(joined) = std::env::join_paths(paths) {
    std::env::set_var("PATH", joined);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dev_fallback_env_var_name_is_stable() {
    assert_eq!(FFMPEG_DEV_FALLBACK, "FFMPEG_DEV_FALLBACK");
  }

  #[test]
  fn missing_tool_without_fallback_errors() {
    std::env::remove_var(FFMPEG_DEV_FALLBACK);
    let tmp = tempfile::tempdir().unwrap();
    let err = find_one("reelcut-nonexistent-tool", &[tmp.path()], false).unwrap_err();
    assert!(matches!(err, Error::ToolNotFound(_)));
  }
}
