//! [MODULE C2] Subprocess Gateway.
//!
//! Built directly on `std::process::Command` the way the teacher's
//! `ffmpeg.rs`/`split.rs` spawn `ffmpeg`, rather than introducing async
//! process machinery: every call this system makes is a one-shot, blocking,
//! worker-thread-bound invocation. Timeout is enforced by a watcher thread
//! that kills the child after the deadline, the same "spawn a thread, join
//! it, propagate failure" shape as the teacher's `worker.rs`. Decode
//! fallback reuses [`crate::error::StringOrBytes`] (the teacher's
//! `StringOrBytes` from `broker.rs`) for every invoked tool, not just the
//! encoder.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result, StringOrBytes, ToolFailure};

/// Result of a completed invocation.
pub struct ToolOutput {
  pub stdout: StringOrBytes,
  pub stderr: StringOrBytes,
}

/// Cooperative cancellation flag, shared between the Job Orchestrator (C15)
/// and every gateway call made on its behalf. Checked before a child is
/// spawned and polled by the timeout watcher while it runs.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self(Arc::new(AtomicBool::new(false)))
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Spawns `program` with `args`, always as an argument list (never a shell
/// string) per spec.md §6. Hides the console window on Windows. Captures
/// stdout/stderr, optionally overriding the child's environment (used by the
/// Mixer/Separator to point `TMPDIR`/`TEMP`/`TMP` at a per-job scratch
/// directory, per spec.md §9's design note, without mutating the parent
/// process environment).
pub fn run<I, S>(
  program: &str,
  args: I,
  cwd: Option<&Path>,
  env_overrides: &[(&str, &str)],
  timeout: Option<Duration>,
  cancel: Option<&CancelToken>,
) -> Result<ToolOutput>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  if let Some(cancel) = cancel {
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }
  }

  let mut cmd = Command::new(program);
  cmd.args(args);
  cmd.stdout(Stdio::piped());
  cmd.stderr(Stdio::piped());
  cmd.stdin(Stdio::null());

  if let Some(cwd) = cwd {
    cmd.current_dir(cwd);
  }
  for (k, v) in env_overrides {
    cmd.env(k, v);
  }

  #[cfg(windows)]
  {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
  }

  let mut child = cmd.spawn().map_err(Error::Io)?;

  let killer = cancel.cloned();
  let watcher = timeout.map(|dur| {
    let pid_guard = Arc::new(AtomicBool::new(false));
    let done = pid_guard.clone();
    let child_id = child.id();
    std::thread::spawn(move || {
      let start = std::time::Instant::now();
      loop {
        if done.load(Ordering::SeqCst) {
          return;
        }
        let timed_out = start.elapsed() >= dur;
        let cancelled = killer.as_ref().map_or(false, CancelToken::is_cancelled);
        if timed_out || cancelled {
          // best-effort: the PID may already be gone if the child exited
          // between our check and this kill attempt.
          #[cfg(unix)]
          unsafe {
            libc_kill(child_id as i32);
          }
          #[cfg(not(unix))]
          let _ = child_id;
          return;
        }
        std::thread::sleep(Duration::from_millis(50));
      }
    });
    pid_guard
  });

  let output = child.wait_with_output().map_err(Error::Io)?;
  if let Some(done) = watcher {
    done.store(true, Ordering::SeqCst);
  }

  let stdout = StringOrBytes::from(output.stdout);
  let stderr = StringOrBytes::from(output.stderr);

  if !output.status.success() {
    return Err(Error::EncodeFailure(ToolFailure {
      tool: program.to_owned(),
      exit_status: output.status,
      stdout,
      stderr,
    }));
  }

  Ok(ToolOutput { stdout, stderr })
}

// Minimal best-effort SIGKILL, used only by the timeout watcher above. A
// dependency on a signal-sending crate would be overkill for "kill one
// child on timeout"; std only exposes `Child::kill`, which we cannot reach
// from the watcher thread without moving the `Child` out of `run`, so we
// shell out to the same signal libc already exposes.
#[cfg(unix)]
unsafe fn libc_kill(pid: i32) {
  extern "C" {
    fn kill(pid: i32, sig: i32) -> i32;
  }
  const SIGKILL: i32 = 9;
  kill(pid, SIGKILL);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cancel_token_is_observed() {
    let token = CancelToken::new();
    assert!(!token.is_cancelled());
    token.cancel();
    assert!(token.is_cancelled());
  }

  #[test]
  fn cancelled_before_spawn_short_circuits() {
    let token = CancelToken::new();
    token.cancel();
    let result = run::<_, &str>("ffmpeg", [], None, &[], None, Some(&token));
    assert!(matches!(result, Err(Error::Cancelled)));
  }
}
