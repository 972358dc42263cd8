//! Small macros shared across modules. Lifted from the teacher's own
//! `util.rs` grab-bag and trimmed to what this crate actually uses. The
//! teacher's `regex!` macro is not carried over: nothing in this crate's
//! keyword/path handling needs compiled regexes (see DESIGN.md), so keeping
//! it would mean shipping a `regex!`/`regex` dependency with zero call sites.

/// Builds a `Vec<String>` from a mix of `&str`/`String`/`PathBuf` arguments,
/// the way ffmpeg argument vectors are assembled throughout this crate.
#[macro_export]
macro_rules! into_vec {
  ($($x:expr),* $(,)?) => {
    vec![
      $(
        $x.into(),
      )*
    ]
  };
}

/// Creates a directory, treating "already exists" as success.
#[macro_export]
macro_rules! create_dir {
  ($loc:expr) => {
    match std::fs::create_dir_all(&$loc) {
      Ok(_) => Ok(()),
      Err(e) => match e.kind() {
        std::io::ErrorKind::AlreadyExists => Ok(()),
        _ => {
          tracing::error!("failed to create directory {:?}: {}", &$loc, e);
          Err(e)
        }
      },
    }
  };
}

/// Number of base-10 digits needed to print `x`, used to zero-pad sequence
/// indices (concat list ordering, segment file names) without guessing a
/// fixed width.
#[inline]
pub(crate) fn printable_base10_digits(x: usize) -> u32 {
  (((x.max(1) as f64).log10() + 1.0).floor() as u32).max(1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn digit_width() {
    assert_eq!(printable_base10_digits(0), 1);
    assert_eq!(printable_base10_digits(9), 1);
    assert_eq!(printable_base10_digits(10), 2);
    assert_eq!(printable_base10_digits(999), 3);
  }
}
