//! [MODULE C16] Subtitle Renderer.
//!
//! SRT/ASS cue writing is grounded on `itsmontoya-scribble`'s
//! `vtt_encoder.rs`/`segment_encoder.rs` (`SegmentEncoder` trait, lazy
//! header-on-first-cue, timestamp formatting) — generalized from WebVTT's
//! `HH:MM:SS.mmm` to SRT's `HH:MM:SS,mmm` and extended with an ASS encoder
//! emitting `[Script Info]`/`[V4+ Styles]`/`[Events]`, directly grounded on
//! `examples/original_source/video_tool/ass_builder.py`'s header/style/
//! event layout and `&HBBGGRR&` color conversion. Path escaping for the
//! `subtitles=`/`ass=` filtergraph reuses the teacher's
//! `ffmpeg.rs::escape_path_in_filter` shape.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::capability::TranscriptSegment;
use crate::error::Result;
use crate::gateway;

/// Formats a duration as SRT's `HH:MM:SS,mmm`, per spec.md §6.
pub fn format_srt_time(seconds: f64) -> String {
  let seconds = seconds.max(0.0);
  let total_ms = (seconds * 1000.0).round() as u64;
  let ms = total_ms % 1000;
  let total_s = total_ms / 1000;
  let s = total_s % 60;
  let total_m = total_s / 60;
  let m = total_m % 60;
  let h = total_m / 60;
  format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Formats a duration as ASS's `H:MM:SS.cc` (centiseconds), per
/// `ass_builder.py::_srt_time_to_ass`.
pub fn format_ass_time(seconds: f64) -> String {
  let seconds = seconds.max(0.0);
  let total_cs = (seconds * 100.0).round() as u64;
  let cs = total_cs % 100;
  let total_s = total_cs / 100;
  let s = total_s % 60;
  let total_m = total_s / 60;
  let m = total_m % 60;
  let h = total_m / 60;
  format!("{h}:{m:02}:{s:02}.{cs:02}")
}

/// Renders one SRT file from transcript segments, per spec.md §6 ("times
/// may span multiple lines; two blank lines between cues" — read literally
/// as one blank line after each cue block, the conventional SRT layout the
/// teacher's `SegmentEncoder` implementations also follow).
pub fn write_srt(segments: &[TranscriptSegment]) -> String {
  let mut out = String::new();
  for (i, seg) in segments.iter().enumerate() {
    let _ = writeln!(out, "{}", i + 1);
    let _ = writeln!(
      out,
      "{} --> {}",
      format_srt_time(seg.start),
      format_srt_time(seg.end)
    );
    let _ = writeln!(out, "{}", seg.text);
    out.push('\n');
  }
  out
}

/// `(B,G,R)` in `&HBBGGRR&` per spec.md §6, parsed from a `#RRGGBB` hex
/// string. Grounded on `ass_builder.py::_ass_color`. Unparsable input falls
/// back to opaque white, matching the Python original's `except` fallback.
pub fn ass_color(hex_rgb: &str) -> String {
  let h = hex_rgb.trim().trim_start_matches('#');
  if h.len() != 6 {
    return "&H00FFFFFF&".to_owned();
  }
  let parse = |s: &str| u8::from_str_radix(s, 16).ok();
  match (parse(&h[0..2]), parse(&h[2..4]), parse(&h[4..6])) {
    (Some(r), Some(g), Some(b)) => format!("&H{b:02X}{g:02X}{r:02X}&"),
    _ => "&H00FFFFFF&".to_owned(),
  }
}

/// ASS font size inferred from video width and `max_chars_per_line`,
/// clamped `[18, 96]`, per spec.md §4.13 and `ass_builder.py::_compute_font_size`.
pub fn compute_font_size(width: u32, max_chars_per_line: Option<u32>) -> u32 {
  let n = max_chars_per_line.unwrap_or(14).max(6);
  let reserved_lr_percent = 0.05;
  let char_scale = 0.6;
  let eff_w = width as f64 * (1.0 - 2.0 * reserved_lr_percent);
  let size = (eff_w / n as f64 / char_scale).round() as i64;
  size.clamp(18, 96) as u32
}

#[derive(Debug, Clone)]
pub struct AssStyle {
  pub font_name: String,
  pub primary_color: String,
  pub outline_color: String,
  pub back_color: String,
  pub highlight_color: String,
  pub outline: u32,
  pub shadow: u32,
  pub alignment: u32,
  pub margin_v: u32,
  pub bold: bool,
}

impl Default for AssStyle {
  fn default() -> Self {
    AssStyle {
      font_name: "Microsoft YaHei".to_owned(),
      primary_color: "#FFFFFF".to_owned(),
      outline_color: "#000000".to_owned(),
      back_color: "#000000".to_owned(),
      highlight_color: "#FFE400".to_owned(),
      outline: 2,
      shadow: 0,
      alignment: 2,
      margin_v: 30,
      bold: true,
    }
  }
}

/// Wraps every keyword occurrence in `{\cH…}kw{\c…}`, longest-first so a
/// shorter keyword never clobbers a longer one's prefix, per spec.md §4.13.
///
/// A single left-to-right scan: at each position we try the longest
/// matching keyword first and, once a match is wrapped, resume scanning
/// strictly after it. Running one `String::replace` pass per keyword would
/// let a shorter keyword re-match inside a longer keyword's already-wrapped
/// span (e.g. `"buy"` re-matching inside `"buy now"`'s output); this scan
/// never revisits a byte range it has already emitted.
fn highlight_keywords(text: &str, keywords: &[&str], highlight: &str, primary: &str) -> String {
  let mut sorted: Vec<&str> = keywords.iter().copied().filter(|k| !k.is_empty()).collect();
  sorted.sort_by_key(|k| std::cmp::Reverse(k.len()));

  let mut out = String::with_capacity(text.len());
  let mut i = 0;
  while i < text.len() {
    let rest = &text[i..];
    if let Some(&kw) = sorted.iter().find(|kw| rest.starts_with(*kw)) {
      out.push_str(&format!("{{\\c{highlight}}}{kw}{{\\c{primary}}}"));
      i += kw.len();
    } else {
      let ch_len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
      out.push_str(&rest[..ch_len]);
      i += ch_len;
    }
  }
  out
}

/// Escapes a cue's raw text for ASS: strips `\r`, turns `\n` into `\N`, per
/// `ass_builder.py::_ass_escape`.
fn ass_escape_text(text: &str) -> String {
  text.replace('\r', "").replace('\n', "\\N")
}

/// Converts SRT-equivalent transcript segments directly to one ASS
/// document, sized for `width`×`height` and highlighting `keywords`
/// (longest-first), per spec.md §4.13/§6 and `ass_builder.py`.
pub fn srt_to_ass(
  segments: &[TranscriptSegment],
  width: u32,
  height: u32,
  style: &AssStyle,
  keywords: &[&str],
  max_chars_per_line: Option<u32>,
) -> String {
  let font_size = compute_font_size(width, max_chars_per_line);
  let primary = ass_color(&style.primary_color);
  let outline_c = ass_color(&style.outline_color);
  let back_c = ass_color(&style.back_color);
  let highlight = ass_color(&style.highlight_color);
  let bold_flag = if style.bold { -1 } else { 0 };

  let mut doc = String::new();
  let _ = writeln!(doc, "[Script Info]");
  let _ = writeln!(doc, "Script Type: v4.00+");
  let _ = writeln!(doc, "PlayResX: {width}");
  let _ = writeln!(doc, "PlayResY: {height}");
  let _ = writeln!(doc, "ScaledBorderAndShadow: yes");
  let _ = writeln!(doc);
  let _ = writeln!(doc, "[V4+ Styles]");
  let _ = writeln!(
    doc,
    "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
     BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
     BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
  );
  let _ = writeln!(
    doc,
    "Style: Default,{},{},{},{},{},{},{},0,0,0,100,100,0,0,1,{},{},{},20,20,{},1",
    style.font_name,
    font_size,
    primary,
    primary,
    outline_c,
    back_c,
    bold_flag,
    style.outline,
    style.shadow,
    style.alignment,
    style.margin_v,
  );
  let _ = writeln!(doc);
  let _ = writeln!(doc, "[Events]");
  let _ = writeln!(
    doc,
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
  );

  for seg in segments {
    let escaped = ass_escape_text(&seg.text);
    let highlighted = highlight_keywords(&escaped, keywords, &highlight, &primary);
    let _ = writeln!(
      doc,
      "Dialogue: 0,{},{},Default,,0,0,0,,{}",
      format_ass_time(seg.start),
      format_ass_time(seg.end),
      highlighted
    );
  }

  doc
}

/// Escapes a filesystem path for use inside an ffmpeg filtergraph argument,
/// per spec.md §4.13: `\` → `/`, then escape `'` and `:`.
pub fn escape_path_for_filter(path: &Path) -> String {
  let forward = path.display().to_string().replace('\\', "/");
  forward.replace('\'', "\\'").replace(':', "\\:")
}

/// Burns `subtitle_path` into `source`, per spec.md §4.13's three-attempt
/// fallback ladder: `subtitles=...:original_size=WxH[:fontsdir=...]`, then
/// the same without `original_size`, then `ass=...` as the final fallback.
/// Returns on the first attempt that succeeds.
pub fn burn_in(
  ffmpeg: &str,
  source: &Path,
  subtitle_path: &Path,
  width: Option<(u32, u32)>,
  fontsdir: Option<&Path>,
  out: &Path,
) -> Result<()> {
  let escaped_sub = escape_path_for_filter(subtitle_path);
  let escaped_fontsdir = fontsdir.map(escape_path_for_filter);

  let mut attempts: Vec<String> = Vec::with_capacity(3);
  if let Some((w, h)) = width {
    let mut vf = format!("subtitles=filename='{escaped_sub}':original_size={w}x{h}");
    if let Some(fd) = &escaped_fontsdir {
      let _ = write!(vf, ":fontsdir='{fd}'");
    }
    attempts.push(vf);
  }
  {
    let mut vf = format!("subtitles=filename='{escaped_sub}'");
    if let Some(fd) = &escaped_fontsdir {
      let _ = write!(vf, ":fontsdir='{fd}'");
    }
    attempts.push(vf);
  }
  attempts.push(format!("ass='{escaped_sub}'"));

  let mut last_err = None;
  for filter in attempts {
    if let Some(parent) = out.parent() {
      crate::create_dir!(parent).map_err(crate::error::Error::Io)?;
    }
    let result = gateway::run(
      ffmpeg,
      crate::into_vec![
        "-hide_banner",
        "-nostdin",
        "-y",
        "-loglevel",
        "error",
        "-i",
        source.display().to_string(),
        "-vf",
        filter,
        "-c:a",
        "copy",
        out.display().to_string(),
      ],
      None,
      &[],
      Some(Duration::from_secs(60 * 30)),
      None,
    );
    match result {
      Ok(_) => return Ok(()),
      Err(e) => last_err = Some(e),
    }
  }

  Err(last_err.expect("attempts is non-empty"))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
      start,
      end,
      text: text.to_owned(),
    }
  }

  #[test]
  fn srt_time_formatting() {
    assert_eq!(format_srt_time(0.0), "00:00:00,000");
    assert_eq!(format_srt_time(3661.5), "01:01:01,500");
  }

  #[test]
  fn ass_time_formatting() {
    assert_eq!(format_ass_time(0.0), "0:00:00.00");
    assert_eq!(format_ass_time(61.25), "0:01:01.25");
  }

  #[test]
  fn srt_cues_parse_back_to_nonnegative_intervals() {
    let segments = vec![seg(1.0, 2.5, "hello"), seg(3.0, 4.0, "world")];
    let srt = write_srt(&segments);
    assert!(srt.contains("00:00:01,000 --> 00:00:02,500"));
    assert!(srt.contains("hello"));
  }

  #[test]
  fn ass_color_conversion() {
    assert_eq!(ass_color("#FFFFFF"), "&H00FFFFFF&");
    assert_eq!(ass_color("#112233"), "&H332211&");
  }

  #[test]
  fn font_size_is_clamped() {
    assert_eq!(compute_font_size(3840, Some(6)), 96);
    assert_eq!(compute_font_size(320, Some(40)), 18);
  }

  #[test]
  fn longest_keyword_wins_over_prefix() {
    let highlighted = highlight_keywords("buy now today", &["buy", "buy now"], "&H00FFFF&", "&HFFFFFF&");
    assert!(highlighted.contains("{\\c&H00FFFF&}buy now{\\c&HFFFFFF&}"));
  }

  #[test]
  fn filter_path_escaping_replaces_backslashes_and_escapes_specials() {
    let escaped = escape_path_for_filter(Path::new(r"C:\subs\cap'tion.ass"));
    assert_eq!(escaped, "C\\:/subs/cap\\'tion.ass");
  }

  #[test]
  fn every_dialogue_line_has_end_after_start() {
    let segments = vec![seg(5.0, 6.0, "one"), seg(7.0, 9.5, "two")];
    let ass = srt_to_ass(&segments, 1920, 1080, &AssStyle::default(), &[], None);
    for line in ass.lines().filter(|l| l.starts_with("Dialogue:")) {
      let fields: Vec<&str> = line.splitn(10, ',').collect();
      let start = fields[1];
      let end = fields[2];
      assert_ne!(start, end);
    }
  }
}
