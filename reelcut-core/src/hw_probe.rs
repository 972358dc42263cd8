//! [MODULE C3] Hardware Probe.
//!
//! Memoized with `once_cell::sync::Lazy` exactly as the teacher memoizes
//! `USE_OLD_SVT_AV1`. Grounded on `examples/original_source/utils/gpu_detect.py`:
//! run `ffmpeg -encoders` once, search the text for vendor-specific encoder
//! tokens, never assume a hardware encoder is available without checking.

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::gateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwVendor {
  Nvidia,
  Intel,
  Amd,
  None,
  Unknown,
}

static DETECTED: OnceCell<HwVendor> = OnceCell::new();

/// Detects the available hardware H.264 encoder vendor by parsing
/// `ffmpeg -encoders`, per spec.md §4.3. The result is memoized: callers
/// that need a fresh probe (e.g. tests that swap `PATH`) should call
/// [`detect_uncached`] directly.
pub fn detect(ffmpeg: &str) -> HwVendor {
  *DETECTED.get_or_init(|| detect_uncached(ffmpeg).unwrap_or(HwVendor::Unknown))
}

pub fn detect_uncached(ffmpeg: &str) -> Result<HwVendor> {
  let output = gateway::run(
    ffmpeg,
    ["-hide_banner", "-encoders"],
    None,
    &[],
    Some(std::time::Duration::from_secs(10)),
    None,
  )?;
  Ok(classify(&output.stdout.to_string()))
}

fn classify(encoders_text: &str) -> HwVendor {
  let text = encoders_text.to_ascii_lowercase();
  if text.contains("h264_nvenc") || text.contains("hevc_nvenc") {
    HwVendor::Nvidia
  } else if text.contains("h264_qsv") || text.contains("hevc_qsv") {
    HwVendor::Intel
  } else if text.contains("h264_amf") || text.contains("hevc_amf") {
    HwVendor::Amd
  } else {
    HwVendor::None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_nvidia() {
    assert_eq!(classify("V..... h264_nvenc  NVIDIA NVENC H.264"), HwVendor::Nvidia);
  }

  #[test]
  fn classifies_none_when_absent() {
    assert_eq!(classify("V..... libx264  libx264 H.264"), HwVendor::None);
  }
}
