//! Structured logging setup, carried over from the teacher's
//! `av1an_core::logging` almost verbatim: per-module `EnvFilter` directives,
//! a daily-rolling file layer and an ANSI-aware stderr layer, both reachable
//! through `RUST_LOG`.

use std::collections::HashMap;
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static WORKER_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

pub const DEFAULT_CONSOLE_LEVEL: LevelFilter = LevelFilter::INFO;
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::DEBUG;

#[derive(Debug, Clone)]
struct ModuleConfig {
  console_level: LevelFilter,
  file_level: LevelFilter,
}

/// Initializes global logging. Safe to call once per process; a second call
/// will panic the same way the teacher's `init_logging` does, since a global
/// subscriber cannot be replaced.
pub fn init_logging(console_level: LevelFilter, log_path: PathBuf, file_level: LevelFilter) {
  let mut module_configs = HashMap::new();
  for module in [
    "reelcut_core",
    "reelcut_core::orchestrator",
    "reelcut_core::gateway",
    "reelcut_cli",
  ] {
    module_configs.insert(
      module,
      ModuleConfig {
        console_level,
        file_level,
      },
    );
  }

  if let Ok(rust_log) = env::var("RUST_LOG") {
    for directive in rust_log.split(',') {
      if let Some((module, level)) = directive.split_once('=') {
        if let (Some(config), Ok(level)) =
          (module_configs.get_mut(module), level.parse::<LevelFilter>())
        {
          config.console_level = level;
          config.file_level = level;
        }
      }
    }
  }

  let join_directives = |pick: fn(&ModuleConfig) -> LevelFilter| -> String {
    module_configs
      .iter()
      .map(|(module, cfg)| format!("{}={}", module, pick(cfg)))
      .collect::<Vec<_>>()
      .join(",")
  };

  let console_filter = EnvFilter::try_new(join_directives(|c| c.console_level)).unwrap();
  let file_filter = EnvFilter::try_new(join_directives(|c| c.file_level)).unwrap();

  let file_appender = if log_path.parent().unwrap_or_else(|| Path::new("")) == Path::new("")
    && log_path.file_name().map_or(true, |n| n == "reelcut.log")
  {
    RollingFileAppender::new(Rotation::DAILY, "logs", "reelcut.log")
  } else {
    RollingFileAppender::new(
      Rotation::NEVER,
      Path::new("logs").join(log_path.parent().unwrap_or_else(|| Path::new(""))),
      log_path.file_name().unwrap_or_else(|| "reelcut.log".as_ref()),
    )
  };

  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
  let _ = WORKER_GUARD.set(guard);

  let subscriber = tracing_subscriber::registry()
    .with(
      fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(non_blocking)
        .with_filter(file_filter),
    )
    .with(
      fmt::layer()
        .compact()
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .with_file(false)
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(console_filter),
    );

  tracing::subscriber::set_global_default(subscriber)
    .expect("failed to set global default subscriber");

  tracing::debug!("logging initialized");
}
