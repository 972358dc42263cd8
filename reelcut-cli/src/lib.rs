//! Thin CLI front-end, wired end-to-end like the teacher's `av1an-cli`:
//! `clap`'s derive API parses a job description (inputs, output root, mode,
//! worker count) and drives the Job Orchestrator (`reelcut_core::orchestrator`).
//! Argument-surface details are intentionally minimal per spec.md §1's
//! Non-goals (no GUI, no licensing/preflight beyond tool resolution); the
//! subcommands below cover the deterministic pipeline stages (C1-C8, C10,
//! C12-C13) that do not require a pluggable ML capability, the same way the
//! teacher's CLI only ever drives `av1an-core`'s public surface rather than
//! reimplementing it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::filter::LevelFilter;

use reelcut_core::config::{ConcatQuality, Configuration, NormalizeMode};
use reelcut_core::error::Result;
use reelcut_core::gateway::CancelToken;
use reelcut_core::hw_probe;
use reelcut_core::logging;
use reelcut_core::normalize::{self, NormalizeRequest, VideoEncoder};
use reelcut_core::orchestrator::{self, Event, Job, Task, TaskOutcome};
use reelcut_core::{classify, concat, cover, frame_picker, media, mixer, probe, resolution_group, tool_locate};

#[derive(Parser, Debug)]
#[command(name = "reelcut", version, about = "Batch media production pipeline over FFmpeg")]
pub struct Cli {
  /// Directory containing a bundled ffmpeg/ffprobe, if any.
  #[arg(long, global = true)]
  pub bundled_tools_dir: Option<PathBuf>,

  /// Worker pool size, per spec.md §5 (default 4).
  #[arg(long, global = true)]
  pub workers: Option<usize>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Resolves ffmpeg/ffprobe and reports the detected hardware encoder.
  Tools,

  /// Batch-normalizes every media file in a directory to a uniform
  /// profile, per spec.md §4.5. Runs under the Job Orchestrator so
  /// skip-existing and progress reporting apply.
  Normalize {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long, value_enum, default_value = "release")]
    mode: CliNormalizeMode,
    #[arg(long)]
    recursive: bool,
    /// Target resolution all outputs are padded/scaled to.
    #[arg(long, default_value_t = 1920)]
    width: u32,
    #[arg(long, default_value_t = 1080)]
    height: u32,
  },

  /// Lists resolution groups under a directory, top-N by `(count desc,
  /// area desc)`, per spec.md §4.6.
  ResolutionGroups {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value_t = 5)]
    top_n: usize,
  },

  /// Concatenates an ordered list of same-resolution clips, per spec.md
  /// §4.6/§6, with an optional BGM remap.
  Concat {
    #[arg(long, num_args = 1.., required = true)]
    clips: Vec<PathBuf>,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    bgm: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "balanced")]
    quality: CliConcatQuality,
  },

  /// Runs the Beat Mixer over a precomputed `BeatsMeta` JSON document
  /// (the beat-extraction algorithm itself is an opaque capability, per
  /// spec.md §4.7's intro), per spec.md §4.7.
  BeatMix {
    #[arg(long)]
    audio: PathBuf,
    #[arg(long)]
    beats_json: PathBuf,
    #[arg(long)]
    pool: PathBuf,
    #[arg(long)]
    output_dir: PathBuf,
    #[arg(long, default_value_t = 0.3)]
    clip_min_interval: f64,
  },

  /// Picks the sharpest sampled frame of one video, per spec.md §4.9.
  PickFrame {
    #[arg(long)]
    video: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    start: Option<f64>,
    #[arg(long)]
    end: Option<f64>,
  },

  /// Stitches N images into one cover, per spec.md §4.10 (caption
  /// rendering is wired but requires `--font`; without it, the stitched
  /// image is written with no overlay).
  Cover {
    #[arg(long, num_args = 2.., required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    output: PathBuf,
    #[arg(long, default_value_t = 150)]
    blend_width: u32,
  },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum CliNormalizeMode {
  Lossless,
  Release,
  Preview,
}

impl From<CliNormalizeMode> for NormalizeMode {
  fn from(m: CliNormalizeMode) -> Self {
    match m {
      CliNormalizeMode::Lossless => NormalizeMode::Lossless,
      CliNormalizeMode::Release => NormalizeMode::Release,
      CliNormalizeMode::Preview => NormalizeMode::Preview,
    }
  }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum CliConcatQuality {
  Balanced,
  Compact,
  Tiny,
}

impl From<CliConcatQuality> for ConcatQuality {
  fn from(q: CliConcatQuality) -> Self {
    match q {
      CliConcatQuality::Balanced => ConcatQuality::Balanced,
      CliConcatQuality::Compact => ConcatQuality::Compact,
      CliConcatQuality::Tiny => ConcatQuality::Tiny,
    }
  }
}

/// One normalize invocation, boxed as an [`orchestrator::Task`] so a whole
/// directory's worth of sources run under the bounded worker pool with
/// skip-existing, per spec.md §4.12.
struct NormalizeTask {
  ffmpeg: String,
  source: PathBuf,
  output_root: PathBuf,
  mode: NormalizeMode,
  encoder: VideoEncoder,
  fps: u32,
  sample_rate: u32,
  width: u32,
  height: u32,
  canonical_output: PathBuf,
}

impl Task for NormalizeTask {
  fn canonical_output(&self) -> &Path {
    &self.canonical_output
  }

  fn run(&self, _worker_id: usize, _cancel: &CancelToken) -> Result<TaskOutcome> {
    let start = Instant::now();
    let req = NormalizeRequest {
      source: &self.source,
      output_root: &self.output_root,
      mode: self.mode,
      encoder: self.encoder,
      fps: self.fps,
      audio_sample_rate: self.sample_rate,
      trim_start: None,
      trim_duration: None,
    };
    let out = normalize::normalize(&self.ffmpeg, &req, self.width, self.height)?;
    let size = std::fs::metadata(&out).map(|m| m.len()).unwrap_or(0);
    Ok(TaskOutcome {
      path: out,
      duration_s: start.elapsed().as_secs_f64(),
      size_bytes: size,
    })
  }
}

fn progress_bar_for(total: u64) -> ProgressBar {
  let pb = ProgressBar::new(total);
  pb.set_style(
    ProgressStyle::default_bar()
      .template("{spinner} [{elapsed_precise}] [{wide_bar}] {pos}/{len} ({msg})")
      .unwrap()
      .progress_chars("#>-"),
  );
  pb
}

/// Drains orchestrator events onto an indicatif bar, the same shape as the
/// teacher's direct `progress_bar.rs` calls from `broker.rs`, but fed
/// through the push-based event channel instead of called inline.
fn drain_events(rx: crossbeam_channel::Receiver<Event>, pb: &ProgressBar) -> usize {
  let mut n_ok = 0;
  for event in rx {
    match event {
      Event::Phase(phase) => pb.set_message(phase),
      Event::Progress { done, total } => {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
      }
      Event::Row { path, .. } => {
        tracing::info!("ok: {}", path.display());
      }
      Event::Error { kind, msg } => {
        tracing::error!("{kind}: {msg}");
      }
      Event::Finished { n_ok: ok } => {
        n_ok = ok;
      }
    }
  }
  pb.finish_and_clear();
  n_ok
}

pub fn run() -> anyhow::Result<()> {
  logging::init_logging(
    LevelFilter::INFO,
    PathBuf::from("reelcut.log"),
    LevelFilter::DEBUG,
  );

  let cli = Cli::parse();
  let cfg = Configuration::default();
  let worker_pool_size = cli.workers.unwrap_or(cfg.worker_pool_size);

  let cancel = CancelToken::new();
  {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
      tracing::warn!("received interrupt, cancelling in-flight work");
      cancel.cancel();
    })?;
  }

  match cli.command {
    Command::Tools => {
      let tools = tool_locate::resolve(cli.bundled_tools_dir.as_deref(), None)?;
      let vendor = hw_probe::detect(tools.ffmpeg.to_str().unwrap_or("ffmpeg"));
      println!("ffmpeg:  {}", tools.ffmpeg.display());
      println!("ffprobe: {}", tools.ffprobe.display());
      println!("hw encoder vendor: {vendor:?}");
    }

    Command::Normalize {
      input,
      output,
      mode,
      recursive,
      width,
      height,
    } => {
      let tools = tool_locate::resolve(cli.bundled_tools_dir.as_deref(), None)?;
      let ffmpeg = tools.ffmpeg.to_str().unwrap_or("ffmpeg").to_owned();
      let vendor = hw_probe::detect(&ffmpeg);
      let encoder = normalize::select_encoder(vendor);

      let items = classify::enumerate_dir(&input, recursive)?;
      let videos: Vec<_> = items
        .into_iter()
        .filter(|i| i.kind == media::MediaKind::Video)
        .collect();

      let tasks: Vec<Box<dyn Task>> = videos
        .iter()
        .map(|item| {
          let stem = item.path.file_stem().and_then(|s| s.to_str()).unwrap_or("clip");
          let canonical = normalize::output_path(&output, width, height, stem);
          Box::new(NormalizeTask {
            ffmpeg: ffmpeg.clone(),
            source: item.path.clone(),
            output_root: output.clone(),
            mode: mode.into(),
            encoder,
            fps: cfg.normalize_fps,
            sample_rate: cfg.normalize_sample_rate,
            width,
            height,
            canonical_output: canonical,
          }) as Box<dyn Task>
        })
        .collect();

      let total = tasks.len();
      let job = Job {
        tasks,
        worker_pool_size,
      };

      let (tx, rx) = crossbeam_channel::unbounded();
      let pb = progress_bar_for(total as u64);
      let handle = std::thread::spawn(move || orchestrator::run_job(job, &tx, cancel));
      let n_ok = drain_events(rx, &pb);
      let records = handle.join().map_err(|_| anyhow::anyhow!("orchestrator thread panicked"))?;
      println!("normalized {n_ok}/{total} ({} tasks recorded)", records.len());
    }

    Command::ResolutionGroups { input, top_n } => {
      let items = classify::enumerate_dir(&input, false)?;
      let resolved: Vec<(PathBuf, (u32, u32))> = items
        .into_iter()
        .filter_map(|item| match item.kind {
          media::MediaKind::Video => probe::probe_resolution(&item.path).map(|r| (item.path, r)),
          media::MediaKind::Image => {
            probe::probe_image_resolution(&item.path).map(|r| (item.path, r))
          }
          _ => None,
        })
        .collect();

      for group in resolution_group::group_by_resolution(resolved, top_n) {
        println!("{}x{}: {} files", group.width, group.height, group.count());
      }
    }

    Command::Concat {
      clips,
      output,
      bgm,
      quality,
    } => {
      let tools = tool_locate::resolve(cli.bundled_tools_dir.as_deref(), None)?;
      let ffmpeg = tools.ffmpeg.to_str().unwrap_or("ffmpeg").to_owned();
      let vendor = hw_probe::detect(&ffmpeg);
      let encoder = normalize::select_encoder(vendor);

      let bgm_path = match &bgm {
        Some(p) if p.is_dir() => concat::pick_random_bgm(p),
        other => other.clone(),
      };

      let work_dir = output
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(".reelcut-concat-work");

      let req = concat::ConcatRequest {
        slices: &clips,
        bgm: bgm_path.as_deref(),
        quality: quality.into(),
        encoder,
        output: &output,
        work_dir: &work_dir,
      };
      concat::concat(&ffmpeg, &req)?;
      let _ = std::fs::remove_dir_all(&work_dir);
      println!("wrote {}", output.display());
    }

    Command::BeatMix {
      audio,
      beats_json,
      pool,
      output_dir,
      clip_min_interval,
    } => {
      let tools = tool_locate::resolve(cli.bundled_tools_dir.as_deref(), None)?;
      let ffmpeg = tools.ffmpeg.to_str().unwrap_or("ffmpeg").to_owned();
      let ffprobe = tools.ffprobe.to_str().unwrap_or("ffprobe").to_owned();

      let meta: reelcut_core::beats::BeatsMeta =
        serde_json::from_slice(&std::fs::read(&beats_json)?)
          .map_err(|e| anyhow::anyhow!("invalid beats json: {e}"))?;

      let pool_items = classify::enumerate_dir(&pool, false)?;

      let req = mixer::MixRequest {
        ffprobe: &ffprobe,
        audio_path: &audio,
        beats: &meta.beats,
        requested_window: None,
        suggested_window: Some((
          meta.suggestion.highlight.start_time,
          meta.suggestion.highlight.end_time,
        )),
        audio_duration: meta.meta.duration,
        media_pool: &pool_items,
        output_dir: &output_dir,
        clip_min_interval,
        sample_rate: cfg.mixer_sample_rate,
      };
      let out = mixer::mix(&ffmpeg, &req)?;
      println!("wrote {}", out.display());
    }

    Command::PickFrame {
      video,
      output,
      start,
      end,
    } => {
      let tools = tool_locate::resolve(cli.bundled_tools_dir.as_deref(), None)?;
      let ffmpeg = tools.ffmpeg.to_str().unwrap_or("ffmpeg").to_owned();
      let ffprobe = tools.ffprobe.to_str().unwrap_or("ffprobe").to_owned();
      let vendor = hw_probe::detect(&ffmpeg);

      let stream = probe::probe_stream_info(&video)?;
      let duration = probe::probe_duration(&ffprobe, &video);
      let fps = f64::from(stream.r_frame_rate.0) / f64::from(stream.r_frame_rate.1.max(1));

      let work_dir = output
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(".reelcut-frame-work");

      let scored = frame_picker::pick_sharpest_frame(
        &ffmpeg,
        &video,
        stream.width,
        stream.height,
        fps,
        start.unwrap_or(0.0),
        end.unwrap_or(duration),
        &work_dir,
        vendor,
      )?;
      frame_picker::save_scored_frame(&scored, &output, false, 10)?;
      let _ = std::fs::remove_dir_all(&work_dir);
      println!("wrote {} (score {:.2})", output.display(), scored.score);
    }

    Command::Cover {
      images,
      output,
      blend_width,
    } => {
      let decoded: Vec<image::RgbaImage> = images
        .iter()
        .map(|p| image::open(p).map(|i| i.to_rgba8()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("failed to open cover image: {e}"))?;

      let resized = cover::resize_to_common_height(&decoded).map_err(|e| anyhow::anyhow!(e))?;
      let stitched = cover::stitch_with_blend(&resized, blend_width).map_err(|e| anyhow::anyhow!(e))?;
      stitched
        .save(&output)
        .map_err(|e| anyhow::anyhow!("failed to write cover image: {e}"))?;
      println!("wrote {}", output.display());
    }
  }

  Ok(())
}
