//! [MODULE C15] Job Orchestrator.
//!
//! The module with the strongest direct grounding in the teacher:
//! `broker.rs` + `worker.rs` already implement bounded-concurrency chunk
//! dispatch over a `crossbeam_channel::bounded` queue, consumed by
//! `crossbeam_utils::thread::scope`-scoped worker threads, with per-chunk
//! retry and `indicatif`-based progress reporting (`progress_bar.rs`). This
//! module generalizes that from "encode one chunk" to "run one `Task` of
//! any pipeline stage," keeps the FIFO dispatch / unordered completion
//! model, and adds: a cancellation flag checked before each dispatch and
//! propagated to in-flight children via the Subprocess Gateway, a
//! push-based event channel (`phase`, `progress`, `row`, `error`,
//! `finished`) in place of the teacher's direct progress-bar calls, and
//! skip-existing short-circuiting before a task is scheduled.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Instant, SystemTime};

use crossbeam_channel::Sender;

use crate::error::{Error, Result};
use crate::gateway::CancelToken;

/// Per-task lifecycle state, per spec.md §3's `Job`/`Task` data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  Queued,
  Running,
  Succeeded,
  Failed,
  Cancelled,
}

/// Outcome of one successfully run task, reused for both the skip-existing
/// short-circuit and the normal run path's `row` event.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
  pub path: PathBuf,
  pub duration_s: f64,
  pub size_bytes: u64,
}

/// One unit of work submitted to the orchestrator. `canonical_output`
/// names the file whose existence makes this task's work skippable
/// (spec.md §4.12 "skip-existing"); `run` does the actual stage work
/// (probe → normalize → encode → mux, in whatever order the concrete task
/// needs — the orchestrator itself does not interpret stage order, only
/// preserves it within one task per spec.md §4.12's ordering guarantee).
pub trait Task: Send {
  fn canonical_output(&self) -> &Path;
  fn run(&self, worker_id: usize, cancel: &CancelToken) -> Result<TaskOutcome>;
}

/// Record of one task's observed lifecycle, returned to the caller once the
/// Job finishes so terminal states remain available for reporting, per
/// spec.md §3 ("terminal states are persistent for reporting").
#[derive(Debug, Clone)]
pub struct TaskRecord {
  pub index: usize,
  pub state: TaskState,
  pub worker_id: Option<usize>,
  pub started_at: Option<SystemTime>,
  pub ended_at: Option<SystemTime>,
  pub error_kind: Option<&'static str>,
}

/// Push-based progress/error events, per spec.md §4.12 and §9's design note
/// ("the Orchestrator exposes a pure event channel"). The Orchestrator uses
/// only the small phase vocabulary from spec.md §6
/// (`preprocess`/`concat`/`normalize`/`slicing`/`finished`); callers are
/// free to pass other strings for their own stages.
#[derive(Debug, Clone)]
pub enum Event {
  Phase(String),
  Progress { done: usize, total: usize },
  Row { path: PathBuf, duration_s: f64, size_bytes: u64 },
  Error { kind: &'static str, msg: String },
  Finished { n_ok: usize },
}

/// A set of independent [`Task`]s run under one bounded worker pool, per
/// spec.md §4.12/§5. `worker_pool_size` defaults to 4 at the call site that
/// builds this from [`crate::config::Configuration`]; `0` is treated as 1.
pub struct Job {
  pub tasks: Vec<Box<dyn Task>>,
  pub worker_pool_size: usize,
}

/// Error kinds that abort the whole Job rather than being isolated to one
/// task, per spec.md §7 ("Infrastructure errors... abort the Job").
fn is_infrastructure_error(err: &Error) -> bool {
  matches!(err, Error::ToolNotFound(_) | Error::ModelLoadFailure(_))
}

fn error_kind_tag(err: &Error) -> &'static str {
  match err {
    Error::ToolNotFound(_) => "ToolNotFound",
    Error::BadInputKind(_) => "BadInputKind",
    Error::EncodeFailure(_) => "EncodeFailure",
    Error::ProbeFailure { .. } => "ProbeFailure",
    Error::ModelLoadFailure(_) => "ModelLoadFailure",
    Error::OutOfMemory(_) => "OutOfMemory",
    Error::Cancelled => "Cancelled",
    Error::Other(_) => "Other",
    Error::Io(_) => "Io",
  }
}

/// Runs `job` to completion, emitting events on `events` and honoring
/// `cancel`. Returns one [`TaskRecord`] per task in submission order
/// (dispatch order is FIFO; completion order is unspecified, per spec.md
/// §4.12, so records are indexed rather than ordered by completion).
///
/// Partial failures are isolated: a failed task yields one `Error` event
/// and its own `Failed` record, but does not stop the other workers (spec.md
/// §7). An infrastructure error (`ToolNotFound`/`ModelLoadFailure`) sets the
/// cancel flag so no further tasks are dispatched, matching the "abort the
/// Job" policy while still letting in-flight tasks finish naturally (the
/// same soft-stop semantics as an externally requested cancel).
pub fn run_job(job: Job, events: &Sender<Event>, cancel: CancelToken) -> Vec<TaskRecord> {
  let total = job.tasks.len();
  let pool_size = job.worker_pool_size.max(1);

  let _ = events.send(Event::Phase("preprocess".to_owned()));

  if total == 0 {
    let _ = events.send(Event::Finished { n_ok: 0 });
    return Vec::new();
  }

  let records: Vec<parking_lot::Mutex<TaskRecord>> = (0..total)
    .map(|index| {
      parking_lot::Mutex::new(TaskRecord {
        index,
        state: TaskState::Queued,
        worker_id: None,
        started_at: None,
        ended_at: None,
        error_kind: None,
      })
    })
    .collect();

  let (tx, rx) = crossbeam_channel::bounded(total);
  for (index, task) in job.tasks.into_iter().enumerate() {
    tx.send((index, task)).expect("queue sized to task count");
  }
  drop(tx);

  let done = AtomicUsize::new(0);
  let n_ok = AtomicUsize::new(0);
  let abort = AtomicBool::new(false);

  crossbeam_utils::thread::scope(|scope| {
    for worker_id in 0..pool_size {
      let rx = rx.clone();
      let events = events.clone();
      let cancel = cancel.clone();
      let done = &done;
      let n_ok = &n_ok;
      let abort = &abort;
      let records = &records;

      scope.spawn(move |_| {
        while let Ok((index, task)) = rx.recv() {
          if cancel.is_cancelled() || abort.load(Ordering::SeqCst) {
            let mut rec = records[index].lock();
            rec.state = TaskState::Cancelled;
            drop(rec);
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = events.send(Event::Progress {
              done: finished,
              total,
            });
            continue;
          }

          // skip-existing: spec.md §4.12's resumability short-circuit.
          if task.canonical_output().exists() {
            let mut rec = records[index].lock();
            rec.state = TaskState::Succeeded;
            drop(rec);

            let size = std::fs::metadata(task.canonical_output())
              .map(|m| m.len())
              .unwrap_or(0);
            let _ = events.send(Event::Row {
              path: task.canonical_output().to_path_buf(),
              duration_s: 0.0,
              size_bytes: size,
            });
            n_ok.fetch_add(1, Ordering::SeqCst);
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = events.send(Event::Progress {
              done: finished,
              total,
            });
            continue;
          }

          {
            let mut rec = records[index].lock();
            rec.state = TaskState::Running;
            rec.worker_id = Some(worker_id);
            rec.started_at = Some(SystemTime::now());
          }

          let start = Instant::now();
          let result = task.run(worker_id, &cancel);
          let _elapsed = start.elapsed();

          match result {
            Ok(outcome) => {
              let mut rec = records[index].lock();
              rec.state = TaskState::Succeeded;
              rec.ended_at = Some(SystemTime::now());
              drop(rec);

              let _ = events.send(Event::Row {
                path: outcome.path,
                duration_s: outcome.duration_s,
                size_bytes: outcome.size_bytes,
              });
              n_ok.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
              let kind = error_kind_tag(&err);
              let mut rec = records[index].lock();
              rec.state = if matches!(err, Error::Cancelled) {
                TaskState::Cancelled
              } else {
                TaskState::Failed
              };
              rec.ended_at = Some(SystemTime::now());
              rec.error_kind = Some(kind);
              drop(rec);

              let _ = events.send(Event::Error {
                kind,
                msg: err.to_string(),
              });

              if is_infrastructure_error(&err) {
                abort.store(true, Ordering::SeqCst);
              }
            }
          }

          let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
          let _ = events.send(Event::Progress {
            done: finished,
            total,
          });
        }
      });
    }
  })
  .expect("worker threads never panic across the scope boundary");

  let _ = events.send(Event::Phase("finished".to_owned()));
  let ok = n_ok.load(Ordering::SeqCst);
  let _ = events.send(Event::Finished { n_ok: ok });

  records.into_iter().map(|m| m.into_inner()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex as StdMutex;

  struct FakeTask {
    output: PathBuf,
    should_fail: bool,
  }

  impl Task for FakeTask {
    fn canonical_output(&self) -> &Path {
      &self.output
    }

    fn run(&self, _worker_id: usize, _cancel: &CancelToken) -> Result<TaskOutcome> {
      if self.should_fail {
        return Err(Error::BadInputKind("boom".to_owned()));
      }
      std::fs::write(&self.output, b"ok").unwrap();
      Ok(TaskOutcome {
        path: self.output.clone(),
        duration_s: 1.0,
        size_bytes: 2,
      })
    }
  }

  #[test]
  fn partial_failure_does_not_abort_job() {
    let dir = tempfile::tempdir().unwrap();
    let job = Job {
      tasks: vec![
        Box::new(FakeTask {
          output: dir.path().join("ok.mp4"),
          should_fail: false,
        }),
        Box::new(FakeTask {
          output: dir.path().join("bad.mp4"),
          should_fail: true,
        }),
      ],
      worker_pool_size: 2,
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let records = run_job(job, &tx, CancelToken::new());
    drop(tx);

    let events: Vec<Event> = rx.try_iter().collect();
    let n_errors = events
      .iter()
      .filter(|e| matches!(e, Event::Error { .. }))
      .count();
    assert_eq!(n_errors, 1);
    assert!(matches!(
      events.last().unwrap(),
      Event::Finished { n_ok: 1 }
    ));

    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.state == TaskState::Succeeded));
    assert!(records.iter().any(|r| r.state == TaskState::Failed));
  }

  #[test]
  fn skip_existing_emits_ok_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exists.mp4");
    std::fs::write(&out, b"already here").unwrap();

    let ran = std::sync::Arc::new(StdMutex::new(false));
    struct TrackedTask {
      output: PathBuf,
      ran: std::sync::Arc<StdMutex<bool>>,
    }
    impl Task for TrackedTask {
      fn canonical_output(&self) -> &Path {
        &self.output
      }
      fn run(&self, _worker_id: usize, _cancel: &CancelToken) -> Result<TaskOutcome> {
        *self.ran.lock().unwrap() = true;
        Ok(TaskOutcome {
          path: self.output.clone(),
          duration_s: 0.0,
          size_bytes: 0,
        })
      }
    }

    let job = Job {
      tasks: vec![Box::new(TrackedTask {
        output: out,
        ran: ran.clone(),
      })],
      worker_pool_size: 1,
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let records = run_job(job, &tx, CancelToken::new());
    drop(tx);

    assert!(!*ran.lock().unwrap(), "skip-existing must not invoke run()");
    assert_eq!(records[0].state, TaskState::Succeeded);

    let events: Vec<Event> = rx.try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, Event::Row { .. })));
  }

  #[test]
  fn progress_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let tasks: Vec<Box<dyn Task>> = (0..5)
      .map(|i| {
        Box::new(FakeTask {
          output: dir.path().join(format!("{i}.mp4")),
          should_fail: false,
        }) as Box<dyn Task>
      })
      .collect();
    let job = Job {
      tasks,
      worker_pool_size: 3,
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    run_job(job, &tx, CancelToken::new());
    drop(tx);

    let mut last_done = 0usize;
    for event in rx.try_iter() {
      if let Event::Progress { done, total } = event {
        assert!(done >= last_done);
        assert!(done <= total);
        last_done = done;
      }
    }
    assert_eq!(last_done, 5);
  }

  #[test]
  fn infrastructure_error_aborts_remaining_dispatch() {
    struct InfraFailTask {
      output: PathBuf,
    }
    impl Task for InfraFailTask {
      fn canonical_output(&self) -> &Path {
        &self.output
      }
      fn run(&self, _worker_id: usize, _cancel: &CancelToken) -> Result<TaskOutcome> {
        Err(Error::ToolNotFound("ffmpeg".to_owned()))
      }
    }

    let dir = tempfile::tempdir().unwrap();
    let tasks: Vec<Box<dyn Task>> = (0..4)
      .map(|i| Box::new(InfraFailTask {
        output: dir.path().join(format!("{i}.mp4")),
      }) as Box<dyn Task>)
      .collect();
    let job = Job {
      tasks,
      worker_pool_size: 1,
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let records = run_job(job, &tx, CancelToken::new());
    drop(tx);
    let _ = rx.try_iter().count();

    // the single worker serializes dispatch, so after the first
    // ToolNotFound the abort flag must stop every remaining task from
    // actually running (they get recorded as Cancelled, not Failed).
    assert_eq!(
      records.iter().filter(|r| r.state == TaskState::Failed).count(),
      1
    );
    assert!(records.iter().any(|r| r.state == TaskState::Cancelled));
  }
}
