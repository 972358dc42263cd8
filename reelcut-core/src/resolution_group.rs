//! [MODULE C7] Resolution-Group Index.
//!
//! Grounded on the teacher's general approach to grouping/sorting
//! deterministic collections (stable sort by derived key, as in
//! `concat.rs::sort_files_by_filename`), generalized to group-by-`(W,H)`
//! with `(count desc, area desc)` tie-break per spec.md §5.

use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ResolutionGroup {
  pub width: u32,
  pub height: u32,
  pub files: Vec<PathBuf>,
}

impl ResolutionGroup {
  pub fn count(&self) -> usize {
    self.files.len()
  }

  pub fn area(&self) -> u64 {
    u64::from(self.width) * u64::from(self.height)
  }
}

/// Groups `(path, (w,h))` pairs by resolution and returns the top `top_n`
/// groups ordered `(count desc, area desc)`, per spec.md §4.6/§5. Groups are
/// mutually disjoint and `Σ group.count == files.len()`, the invariant
/// spec.md §3/§8 requires.
pub fn group_by_resolution(
  files: impl IntoIterator<Item = (PathBuf, (u32, u32))>,
  top_n: usize,
) -> Vec<ResolutionGroup> {
  let mut buckets: HashMap<(u32, u32), Vec<PathBuf>> = HashMap::new();
  for (path, key) in files {
    buckets.entry(key).or_default().push(path);
  }

  let mut groups: Vec<ResolutionGroup> = buckets
    .into_iter()
    .map(|((w, h), mut files)| {
      files.sort();
      ResolutionGroup {
        width: w,
        height: h,
        files,
      }
    })
    .collect();

  groups.sort_by(|a, b| {
    b.count()
      .cmp(&a.count())
      .then_with(|| b.area().cmp(&a.area()))
      .then_with(|| a.width.cmp(&b.width))
      .then_with(|| a.height.cmp(&b.height))
  });

  groups.truncate(top_n);
  groups
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn groups_are_disjoint_and_sum_to_total() {
    let files = vec![
      (PathBuf::from("a.mp4"), (1080, 1920)),
      (PathBuf::from("b.mp4"), (1080, 1920)),
      (PathBuf::from("c.mp4"), (1080, 1920)),
      (PathBuf::from("d.mp4"), (1080, 1920)),
      (PathBuf::from("e.mp4"), (1080, 1920)),
      (PathBuf::from("f.mp4"), (1920, 1080)),
      (PathBuf::from("g.mp4"), (1920, 1080)),
      (PathBuf::from("h.mp4"), (1920, 1080)),
      (PathBuf::from("i.mp4"), (720, 1280)),
    ];
    let total = files.len();

    let groups = group_by_resolution(files, 2);
    assert_eq!(groups.len(), 2);
    assert_eq!((groups[0].width, groups[0].height, groups[0].count()), (1080, 1920, 5));
    assert_eq!((groups[1].width, groups[1].height, groups[1].count()), (1920, 1080, 3));
    assert!(groups.iter().map(ResolutionGroup::count).sum::<usize>() < total);
  }

  #[test]
  fn tie_break_by_area_then_total_count_matches() {
    let files = vec![
      (PathBuf::from("a.mp4"), (1920, 1080)),
      (PathBuf::from("b.mp4"), (1920, 1080)),
      (PathBuf::from("c.mp4"), (1280, 720)),
      (PathBuf::from("d.mp4"), (1280, 720)),
    ];
    let total = files.len();
    let groups = group_by_resolution(files, 10);
    let sum: usize = groups.iter().map(ResolutionGroup::count).sum();
    assert_eq!(sum, total);
    assert_eq!((groups[0].width, groups[0].height), (1920, 1080));
  }
}
