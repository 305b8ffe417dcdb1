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

//! Label images: integer images in which every object has its own label.

use std::collections::{HashMap, VecDeque};

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray as nd;

use crate::neighbours_4con;

/// Label of pixels that do not belong to any object
pub const BACKGROUND: usize = 0;

/// An image of object labels.
///
/// Pixels with label `0` are background; every other value identifies exactly
/// one object. A `LabelImage` is always *compacted*: its labels are the integers
/// `1..=count` without gaps, so that per-object measurements can be stored in
/// plain vectors indexed by `label - 1`. Every constructor compacts its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelImage {
  labels: nd::Array2<usize>,
  count: usize,
}

impl LabelImage {
  /// Label image without any objects
  pub fn empty(shape: (usize, usize)) -> Self {
    LabelImage { labels: nd::Array2::zeros(shape), count: 0 }
  }

  /// Labels the 8-connected components of a binary image. Components are
  /// numbered in the (row-major) order in which their first pixel is found.
  pub fn from_binary(binary: nd::ArrayView2<bool>) -> Self {
    let (rows, cols) = binary.dim();
    if rows == 0 || cols == 0 {
      return LabelImage::empty((rows, cols));
    }

    //(1) Label the components with imageproc
    let gray = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
      Luma([binary[(y as usize, x as usize)] as u8])
    });
    let components = connected_components(&gray, Connectivity::Eight, Luma([0u8]));

    //(2) Renumber them by their first pixel in raster order
    let mut renumber = HashMap::new();
    let mut labels = nd::Array2::<usize>::zeros((rows, cols));
    for (idx, label) in labels.indexed_iter_mut() {
      let component = components.get_pixel(idx.1 as u32, idx.0 as u32).0[0];
      if component == 0 {
        continue;
      }
      let next = renumber.len() + 1;
      *label = *renumber.entry(component).or_insert(next);
    }

    LabelImage { labels, count: renumber.len() }
  }

  /// Compacts an arbitrary label array. The relative order of the labels is
  /// kept, so compacting an already compacted array is a no-op.
  pub fn from_labels(raw: nd::Array2<usize>) -> Self {
    let max = raw.iter().copied().max().unwrap_or(BACKGROUND);
    let mut present = vec![false; max + 1];
    raw.iter().for_each(|&label| present[label] = true);

    //The colour map holds the new label at the index of the old label
    let mut colour_map = vec![BACKGROUND; max + 1];
    let mut count = 0;
    for (label, _) in present.iter().enumerate().skip(1).filter(|(_, &p)| p) {
      count += 1;
      colour_map[label] = count;
    }

    let mut labels = raw;
    labels.par_mapv_inplace(|label| colour_map[label]);
    LabelImage { labels, count }
  }

  /// Returns a freshly compacted copy of this label image
  pub fn relabel(&self) -> Self {
    Self::from_labels(self.labels.clone())
  }

  /// Keeps only the objects for which `keep` returns `true`, then compacts.
  pub fn retain(&self, keep: impl Fn(usize) -> bool) -> Self {
    let raw = self
      .labels
      .mapv(|label| if label != BACKGROUND && keep(label) { label } else { BACKGROUND });
    Self::from_labels(raw)
  }

  pub fn view(&self) -> nd::ArrayView2<usize> {
    self.labels.view()
  }

  pub fn into_inner(self) -> nd::Array2<usize> {
    self.labels
  }

  /// Number of objects, equal to the largest label
  pub fn count(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub fn shape(&self) -> (usize, usize) {
    self.labels.dim()
  }

  /// Foreground mask of all objects
  pub fn binary(&self) -> nd::Array2<bool> {
    self.labels.mapv(|label| label != BACKGROUND)
  }

  /// Pixel areas indexed by label. Index 0 holds the background area.
  pub fn areas(&self) -> Vec<usize> {
    areas(self.labels.view(), self.count)
  }

  /// Equivalent diameters of all objects, in label order
  pub fn equivalent_diameters(&self) -> Vec<f64> {
    self.areas().into_iter().skip(1).map(equivalent_diameter).collect()
  }

  /// Unweighted centres of mass of all objects as `(x, y)` pairs, in label
  /// order. Coordinates follow the array axes: `x` is the mean row and `y` the
  /// mean column of an object.
  pub fn centroids(&self) -> Vec<(f64, f64)> {
    let mut sums = vec![(0.0f64, 0.0f64, 0usize); self.count + 1];
    for ((row, col), &label) in self.labels.indexed_iter() {
      let sum = &mut sums[label];
      sum.0 += row as f64;
      sum.1 += col as f64;
      sum.2 += 1;
    }
    sums
      .into_iter()
      .skip(1)
      .map(|(x, y, n)| if n == 0 { (f64::NAN, f64::NAN) } else { (x / n as f64, y / n as f64) })
      .collect()
  }

  /// Pixels on the edge of an object: labelled pixels with at least one
  /// 4-connected neighbour that has a different label or is background. The
  /// edge of the image itself does not count as background.
  pub fn outlines(&self) -> nd::Array2<bool> {
    let shape = self.shape();
    let labels = &self.labels;
    let mut outlines = nd::Array2::from_elem(shape, false);
    nd::Zip::indexed(&mut outlines).and(labels).par_for_each(|idx, outline, &label| {
      if label != BACKGROUND {
        *outline = neighbours_4con(idx, shape).any(|neighbour| labels[neighbour] != label);
      }
    });
    outlines
  }

  /// Indexed by label: whether the object touches the edge of the image or the
  /// edge of the (optional) image mask.
  pub fn touches_border(&self, mask: Option<nd::ArrayView2<bool>>) -> Vec<bool> {
    border_contact(self.labels.view(), self.count, mask)
  }

  /// Fills holes in objects. A hole is a 4-connected background region that
  /// does not touch the edge of the image and that borders a single object.
  pub fn fill_holes(&self) -> Self {
    let shape = self.shape();
    let mut filled = self.labels.clone();
    let mut visited = nd::Array2::from_elem(shape, false);
    let mut queue = VecDeque::new();

    for (idx, &label) in self.labels.indexed_iter() {
      if label != BACKGROUND || visited[idx] {
        continue;
      }

      //(1) Collect the background region and the objects surrounding it
      let mut region = vec![idx];
      let mut on_edge = false;
      let mut enclosing: Option<usize> = None;
      let mut many_neighbours = false;
      visited[idx] = true;
      queue.push_back(idx);
      while let Some(px) = queue.pop_front() {
        on_edge |= px.0 == 0 || px.1 == 0 || px.0 + 1 == shape.0 || px.1 + 1 == shape.1;
        for neighbour in neighbours_4con(px, shape) {
          match self.labels[neighbour] {
            BACKGROUND if !visited[neighbour] => {
              visited[neighbour] = true;
              region.push(neighbour);
              queue.push_back(neighbour);
            }
            BACKGROUND => {}
            other => match enclosing {
              None => enclosing = Some(other),
              Some(first) if first != other => many_neighbours = true,
              _ => {}
            },
          }
        }
      }

      //(2) Only fill regions that are fully enclosed by one object
      if let (false, false, Some(owner)) = (on_edge, many_neighbours, enclosing) {
        region.into_iter().for_each(|px| filled[px] = owner);
      }
    }

    LabelImage { labels: filled, count: self.count }
  }
}

/// Diameter of a disk with an area of `area` pixels
pub fn equivalent_diameter(area: usize) -> f64 {
  2.0 * (area as f64 / std::f64::consts::PI).sqrt()
}

/// Pixel areas of labels `0..=count`
pub(crate) fn areas(labels: nd::ArrayView2<usize>, count: usize) -> Vec<usize> {
  let mut areas = vec![0usize; count + 1];
  labels.iter().for_each(|&label| areas[label] += 1);
  areas
}

/// Border contact of labels `0..=count` (the entry for the background is
/// meaningless). Works on arrays that are not compacted.
pub(crate) fn border_contact(
  labels: nd::ArrayView2<usize>,
  count: usize,
  mask: Option<nd::ArrayView2<bool>>,
) -> Vec<bool> {
  let shape = labels.dim();
  let mut touches = vec![false; count + 1];
  for (idx, &label) in labels.indexed_iter() {
    if label == BACKGROUND || touches[label] {
      continue;
    }
    let on_edge = idx.0 == 0 || idx.1 == 0 || idx.0 + 1 == shape.0 || idx.1 + 1 == shape.1;
    let on_mask_edge = mask
      .map_or(false, |mask| !mask[idx] || neighbours_4con(idx, shape).any(|px| !mask[px]));
    touches[label] = on_edge || on_mask_edge;
  }
  touches
}
