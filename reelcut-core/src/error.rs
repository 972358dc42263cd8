//! Crate-wide error types.
//!
//! Two shapes, mirroring how the rest of this crate separates concerns:
//! [`Error`] is the typed error returned at library boundaries (one variant
//! per abstract error kind from the design), while leaf functions (ffmpeg
//! invocation, file IO, parsing) return `anyhow::Result` and get wrapped into
//! an `Error` variant by the caller that owns the boundary.

use std::fmt::{self, Debug, Display};
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Captured stdout/stderr from a child process, preferring UTF-8 text but
/// falling back to raw bytes when the tool wrote something else.
#[derive(Clone)]
pub enum StringOrBytes {
  String(String),
  Bytes(Vec<u8>),
}

impl Debug for StringOrBytes {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::String(s) => f.write_str(s),
      Self::Bytes(b) => write!(f, "raw bytes: {:?}", b),
    }
  }
}

impl From<Vec<u8>> for StringOrBytes {
  fn from(bytes: Vec<u8>) -> Self {
    if simdutf8::basic::from_utf8(&bytes).is_ok() {
      // SAFETY: the branch above guarantees the input is valid UTF-8
      Self::String(unsafe { String::from_utf8_unchecked(bytes) })
    } else {
      Self::Bytes(bytes)
    }
  }
}

impl Display for StringOrBytes {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::String(s) => f.write_str(s),
      Self::Bytes(b) => write!(f, "<{} bytes, non-utf8>", b.len()),
    }
  }
}

/// Raised when an invoked external tool exits non-zero. Carries just enough
/// to build a one-line user-visible message (file, exit code, stderr tail).
#[derive(Debug)]
pub struct ToolFailure {
  pub tool: String,
  pub exit_status: ExitStatus,
  pub stdout: StringOrBytes,
  pub stderr: StringOrBytes,
}

impl ToolFailure {
  /// Last `max_chars` characters of stderr, the budget the design gives
  /// user-visible failure messages.
  pub fn stderr_tail(&self, max_chars: usize) -> String {
    let s = self.stderr.to_string();
    if s.chars().count() <= max_chars {
      s
    } else {
      s.chars()
        .skip(s.chars().count() - max_chars)
        .collect::<String>()
    }
  }
}

impl Display for ToolFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} failed: {}\nstderr:\n{}",
      self.tool,
      self.exit_status,
      self.stderr_tail(800)
    )
  }
}

impl std::error::Error for ToolFailure {}

/// Crate-wide error type. One variant per abstract error kind from the
/// design's error-handling section; each is deliberately lean since the
/// orchestrator only needs a kind tag and a short message for its `error`
/// events.
#[derive(Error, Debug)]
pub enum Error {
  #[error("tool not found: {0}")]
  ToolNotFound(String),

  #[error("bad input: {0}")]
  BadInputKind(String),

  #[error("encode failed: {0}")]
  EncodeFailure(#[from] ToolFailure),

  #[error("probe failed for {path}: {reason}")]
  ProbeFailure { path: PathBuf, reason: String },

  #[error("model load failed: {0}")]
  ModelLoadFailure(String),

  #[error("out of memory (gpu): {0}")]
  OutOfMemory(String),

  #[error("cancelled")]
  Cancelled,

  #[error(transparent)]
  Other(#[from] anyhow::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
