/*
  Copyright© 2023 Raúl Wolters(1)

  This file is part of rustronomy-identify.

  rustronomy is free software: you can redistribute it and/or modify it under
  the terms of the European Union Public License version 1.2 or later, as
  published by the European Commission.

  rustronomy is distributed in the hope that it will be useful, but WITHOUT ANY
  WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
  A PARTICULAR PURPOSE. See the European Union Public License for more details.

  You should have received a copy of the EUPL in an/all official language(s) of
  the European Union along with rustronomy.  If not, see
  <https://ec.europa.eu/info/european-union-public-licence_en/>.

  (1) Resident of the Kingdom of the Netherlands; agreement between licensor and
  licensee subject to Dutch law as per article 15 of the EUPL.
*/

//! Discarding objects on the border of the image and objects of the wrong
//! size, and merging small objects into their neighbours.

use std::collections::{BTreeMap, HashMap};

use ndarray as nd;

use crate::{
  error::{IdentifyError, Result},
  labels::{border_contact, equivalent_diameter, LabelImage, BACKGROUND},
  neighbours_8con,
};

/// What happened to an object during filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFate {
  Kept,
  /// Touched the edge of the image or of the image mask
  DiscardedBorder,
  /// Diameter outside of the allowed range
  DiscardedSize,
  /// Too small, merged into the object with the given (unedited) label
  Merged { into: usize },
  /// Too small, without a neighbour to merge into
  DiscardedNoise,
}

/// Output of the object filter. All three label images are compacted.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredObjects {
  /// Objects that survived filtering
  pub edited: LabelImage,
  /// All objects, before filtering
  pub unedited: LabelImage,
  /// All objects except the ones that were too small (and not merged)
  pub small_removed: LabelImage,
  /// Fate of every unedited object, in label order
  pub fates: Vec<ObjectFate>,
}

/// Filters objects by border contact and size.
///
/// Sizes are compared as equivalent diameters: the diameter of a disk with the
/// same area as the object.
///
/// # Merging small objects
/// With merging enabled, every object below the minimum diameter is merged into
/// a neighbouring object that is not too small itself. The neighbour is picked
/// by, in order:
/// 1. the largest number of pixel pairs (one pixel from each object) that lie
/// within `merge_distance` of each other (8-connected for the default distance
/// of 1),
/// 2. the smallest difference in mean intensity,
/// 3. the smallest label.
///
/// A small object that does not touch its neighbour is joined to it by the
/// shortest 8-connected path through the background, so every merged object is
/// still a single connected region. Neighbours that cannot be reached within
/// `merge_distance` are skipped.
///
/// Merges are decided based on the objects as they were before merging, so
/// merges never chain. Small objects without any candidate neighbour are
/// discarded as noise. The size and border tests are
/// applied to the merged objects afterwards.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectFilter {
  size_range: (usize, usize),
  exclude_outside_range: bool,
  exclude_border: bool,
  merge_small: bool,
  merge_distance: usize,
}

impl ObjectFilter {
  /// Creates a new filter for objects with a diameter of `size_range.0` up to
  /// and including `size_range.1` pixels. Objects outside of this range and
  /// objects touching the border are discarded; merging is disabled.
  pub fn new(size_range: (usize, usize)) -> Result<Self> {
    let (min, max) = size_range;
    if min > max {
      return Err(IdentifyError::InvalidSizeRange { min, max });
    }
    if min == 0 {
      return Err(IdentifyError::InvalidConfig("minimum object diameter must be at least 1".into()));
    }
    Ok(ObjectFilter {
      size_range,
      exclude_outside_range: true,
      exclude_border: true,
      merge_small: false,
      merge_distance: 1,
    })
  }

  pub fn with_exclude_outside_range(mut self, exclude: bool) -> Self {
    self.exclude_outside_range = exclude;
    self
  }

  pub fn with_exclude_border(mut self, exclude: bool) -> Self {
    self.exclude_border = exclude;
    self
  }

  pub fn with_merge_small(mut self, merge: bool) -> Self {
    self.merge_small = merge;
    self
  }

  /// Sets the largest (chessboard) distance in pixels between two objects
  /// that may be merged. Must be at least 1. Objects that do not touch are
  /// joined through the background when they are merged.
  pub fn with_merge_distance(mut self, distance: usize) -> Result<Self> {
    if distance == 0 {
      return Err(IdentifyError::InvalidConfig("merge distance must be at least 1".into()));
    }
    self.merge_distance = distance;
    Ok(self)
  }

  pub fn size_range(&self) -> (usize, usize) {
    self.size_range
  }

  /// Filters the objects in `labels`. `image` is the intensity image, used to
  /// pick merge targets; `mask` is its (optional) mask. Objects touching a
  /// masked-out pixel count as touching the border.
  pub fn filter(
    &self,
    labels: &LabelImage,
    image: nd::ArrayView2<f64>,
    mask: Option<nd::ArrayView2<bool>>,
  ) -> Result<FilteredObjects> {
    crate::check_shape(image.dim(), labels.shape())?;
    if let Some(mask) = mask {
      crate::check_shape(image.dim(), mask.dim())?;
    }

    let unedited = labels.relabel();
    let n = unedited.count();
    let raw = unedited.view();
    let areas = unedited.areas();
    let (min_d, max_d) = (self.size_range.0 as f64, self.size_range.1 as f64);
    let is_small: Vec<bool> = (0..=n)
      .map(|label| label != BACKGROUND && equivalent_diameter(areas[label]) < min_d)
      .collect();

    //Final (uncompacted) label of every object, 0 if it is removed
    let mut assignment: Vec<usize> = (0..=n).collect();
    let mut fates = vec![ObjectFate::Kept; n + 1];

    //Working copy of the labels, bridges between merged objects are drawn here
    let mut merged_raw = raw.to_owned();

    //(1) Merge small objects into their neighbours
    if self.merge_small {
      let means = mean_intensities(raw, image, n);
      let contacts = self.contacts(raw, &is_small);
      let mut members = vec![Vec::new(); n + 1];
      for (idx, &label) in raw.indexed_iter() {
        if is_small[label] {
          members[label].push(idx);
        }
      }
      for label in (1..=n).filter(|&label| is_small[label]) {
        let mut candidates: Vec<(usize, usize, f64)> = contacts[label]
          .iter()
          .map(|(&target, &count)| (target, count, (means[target] - means[label]).abs()))
          .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.total_cmp(&b.2)).then(a.0.cmp(&b.0)));

        //Objects further apart than touching are joined through the background
        let chosen = candidates.into_iter().find_map(|(target, _, _)| {
          let reach = self.merge_distance;
          bridge(merged_raw.view(), &members[label], target, reach).map(|path| (target, path))
        });
        match chosen {
          Some((target, path)) => {
            path.into_iter().for_each(|idx| merged_raw[idx] = label);
            assignment[label] = target;
            fates[label] = ObjectFate::Merged { into: target };
          }
          None => {
            assignment[label] = BACKGROUND;
            fates[label] = ObjectFate::DiscardedNoise;
          }
        }
      }
    }
    let merged_raw = merged_raw.mapv(|label| assignment[label]);

    //(2) Size test, on the merged objects
    if self.exclude_outside_range {
      let merged_areas = crate::labels::areas(merged_raw.view(), n);
      for label in 1..=n {
        let diameter = equivalent_diameter(merged_areas[label]);
        if fates[label] == ObjectFate::Kept && (diameter < min_d || diameter > max_d) {
          fates[label] = ObjectFate::DiscardedSize;
        }
      }
    }

    //(3) Border test, on the merged objects
    if self.exclude_border {
      let touches = border_contact(merged_raw.view(), n, mask);
      for label in 1..=n {
        if fates[label] == ObjectFate::Kept && touches[label] {
          fates[label] = ObjectFate::DiscardedBorder;
        }
      }
    }

    //(4) Assemble the output images
    let edited = LabelImage::from_labels(merged_raw.mapv(|target| {
      if target != BACKGROUND && fates[target] == ObjectFate::Kept {
        target
      } else {
        BACKGROUND
      }
    }));
    let small_removed = if self.exclude_outside_range {
      unedited.retain(|label| {
        !is_small[label] || matches!(fates[label], ObjectFate::Merged { .. })
      })
    } else {
      unedited.clone()
    };

    log::debug!(
      "object filter kept {} of {} objects ({} merged)",
      edited.count(),
      n,
      fates.iter().filter(|fate| matches!(fate, ObjectFate::Merged { .. })).count()
    );

    fates.remove(0);
    Ok(FilteredObjects { edited, unedited, small_removed, fates })
  }

  /// Number of pixel pairs within `merge_distance` between every small object
  /// and each of its neighbours that is not small.
  fn contacts(
    &self,
    labels: nd::ArrayView2<usize>,
    is_small: &[bool],
  ) -> Vec<BTreeMap<usize, usize>> {
    let (rows, cols) = labels.dim();
    let reach = self.merge_distance;
    let mut contacts = vec![BTreeMap::new(); is_small.len()];

    for ((row, col), &label) in labels.indexed_iter() {
      if label == BACKGROUND || !is_small[label] {
        continue;
      }
      let row_range = row.saturating_sub(reach)..(row + reach + 1).min(rows);
      let col_range = col.saturating_sub(reach)..(col + reach + 1).min(cols);
      let window = labels.slice(nd::s![row_range, col_range]);
      for &other in window.iter() {
        if other != BACKGROUND && other != label && !is_small[other] {
          *contacts[label].entry(other).or_insert(0) += 1;
        }
      }
    }
    contacts
  }
}

/// Background pixels that join the object made up of `pixels` to object
/// `target` with an 8-connected path of at most `reach - 1` pixels. The path is
/// empty if the objects already touch, and `None` if they cannot be joined.
fn bridge(
  labels: nd::ArrayView2<usize>,
  pixels: &[(usize, usize)],
  target: usize,
  reach: usize,
) -> Option<Vec<(usize, usize)>> {
  let shape = labels.dim();
  let touches_target =
    |idx: (usize, usize)| neighbours_8con(idx, shape).any(|other| labels[other] == target);

  //(1) start from the object itself
  let mut frontier = pixels.to_vec();
  if frontier.iter().any(|&idx| touches_target(idx)) {
    return Some(Vec::new());
  }
  let mut previous: HashMap<(usize, usize), Option<(usize, usize)>> =
    frontier.iter().map(|&idx| (idx, None)).collect();

  //(2) grow through the background one ring at a time
  for _ in 1..reach {
    let mut next = Vec::new();
    for &idx in &frontier {
      for neighbour in neighbours_8con(idx, shape) {
        if labels[neighbour] != BACKGROUND || previous.contains_key(&neighbour) {
          continue;
        }
        previous.insert(neighbour, Some(idx));
        if touches_target(neighbour) {
          //(3) walk back to the object
          let mut path = vec![neighbour];
          let mut current = idx;
          while let Some(&Some(prev)) = previous.get(&current) {
            path.push(current);
            current = prev;
          }
          return Some(path);
        }
        next.push(neighbour);
      }
    }
    frontier = next;
  }
  None
}

/// Filters objects in one go. See [`ObjectFilter`] for details; the merge
/// distance is 1 (touching objects) and the image is assumed to be unmasked.
pub fn filter_objects(
  labels: &LabelImage,
  image: nd::ArrayView2<f64>,
  size_range: (usize, usize),
  exclude_outside_range: bool,
  exclude_border: bool,
  merge_small: bool,
) -> Result<FilteredObjects> {
  ObjectFilter::new(size_range)?
    .with_exclude_outside_range(exclude_outside_range)
    .with_exclude_border(exclude_border)
    .with_merge_small(merge_small)
    .filter(labels, image, None)
}

fn mean_intensities(
  labels: nd::ArrayView2<usize>,
  image: nd::ArrayView2<f64>,
  n: usize,
) -> Vec<f64> {
  let mut sums = vec![(0.0f64, 0usize); n + 1];
  nd::Zip::from(labels).and(image).for_each(|&label, &px| {
    sums[label].0 += px;
    sums[label].1 += 1;
  });
  sums.into_iter().map(|(sum, count)| if count == 0 { 0.0 } else { sum / count as f64 }).collect()
}
