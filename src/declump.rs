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

//! Splitting clumps of touching objects.
//!
//! Declumping happens in two steps. First, the centre of every object is
//! marked. Markers are the local maxima of either the smoothed intensity image
//! (bright objects are brightest in their centre) or of the distance transform
//! of the foreground (round objects are "fattest" in their centre). Then, a
//! segmenting watershed transform seeded with the markers draws the dividing
//! lines between the objects, either along dim lines in the image or along the
//! narrow necks between round shapes.
//!
//! The two steps are configured independently. If either of them is disabled,
//! the connected components are used as they are.

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use ndarray as nd;

use crate::{
  error::{IdentifyError, Result},
  labels::{LabelImage, BACKGROUND},
  neighbours_8con,
  watershed::{TransformBuilder, WatershedUtils},
};

//Sigma of a gaussian with a full width at half maximum of `size` is size / 2.35
const FWHM_PER_SIGMA: f64 = 2.35;

//Maxima are searched on a low resolution image for objects larger than this
const LOW_RES_DIAMETER: f64 = 10.0;

/// How the centres of clumped objects are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MarkerMethod {
  /// Local maxima of the smoothed intensity image
  Intensity,
  /// Local maxima of the distance to the background
  Shape,
  /// Do not declump
  None,
}

/// Where the dividing lines between clumped objects are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundaryMethod {
  /// Along dim lines in the intensity image
  Intensity,
  /// Along narrow necks in the shape of the clump
  Distance,
  /// Do not declump
  None,
}

/// Splits connected components into separate objects.
///
/// Use [`Declumper::for_diameter`] to get a declumper with the smoothing and
/// maxima suppression sizes derived from the smallest expected object
/// diameter, then override them with the `with_*` methods if needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Declumper {
  marker: MarkerMethod,
  boundary: BoundaryMethod,
  smoothing_size: f64,
  maxima_suppression_distance: f64,
  use_low_res_maxima: bool,
  min_diameter: f64,
}

impl Declumper {
  /// Creates a declumper for objects with a diameter of at least
  /// `min_diameter` pixels. The smoothing filter size defaults to
  /// `2.35 * min_diameter / 3.5` and the maxima suppression distance to
  /// `min_diameter / 2`. Low resolution maxima are enabled.
  pub fn for_diameter(marker: MarkerMethod, boundary: BoundaryMethod, min_diameter: f64) -> Self {
    let min_diameter = min_diameter.max(0.0);
    Declumper {
      marker,
      boundary,
      smoothing_size: FWHM_PER_SIGMA * min_diameter / 3.5,
      maxima_suppression_distance: min_diameter / 2.0,
      use_low_res_maxima: true,
      min_diameter,
    }
  }

  /// Sets the size (full width at half maximum) of the smoothing filter that
  /// is applied before looking for intensity maxima. A size of 0 disables
  /// smoothing.
  pub fn with_smoothing_size(mut self, size: f64) -> Result<Self> {
    self.smoothing_size = non_negative("smoothing filter size", size)?;
    Ok(self)
  }

  /// Sets the maxima suppression distance. Markers of the same object are at
  /// least twice this distance apart.
  pub fn with_maxima_suppression_distance(mut self, distance: f64) -> Result<Self> {
    self.maxima_suppression_distance = non_negative("maxima suppression distance", distance)?;
    Ok(self)
  }

  pub fn with_low_res_maxima(mut self, use_low_res_maxima: bool) -> Self {
    self.use_low_res_maxima = use_low_res_maxima;
    self
  }

  pub fn marker_method(&self) -> MarkerMethod {
    self.marker
  }

  pub fn boundary_method(&self) -> BoundaryMethod {
    self.boundary
  }

  pub fn smoothing_size(&self) -> f64 {
    self.smoothing_size
  }

  pub fn maxima_suppression_distance(&self) -> f64 {
    self.maxima_suppression_distance
  }

  /// Returns `true` if this declumper leaves its input unchanged
  pub fn is_identity(&self) -> bool {
    self.marker == MarkerMethod::None || self.boundary == BoundaryMethod::None
  }

  /// Splits the objects in `labels`. Output labels never span two input
  /// objects. `mask` is the mask of the intensity image; masked-out pixels do
  /// not contribute to the smoothed image.
  pub fn declump(
    &self,
    image: nd::ArrayView2<f64>,
    mask: Option<nd::ArrayView2<bool>>,
    labels: &LabelImage,
  ) -> Result<LabelImage> {
    crate::check_shape(image.dim(), labels.shape())?;
    if let Some(mask) = mask {
      crate::check_shape(image.dim(), mask.dim())?;
    }
    if self.is_identity() || labels.is_empty() {
      return Ok(labels.clone());
    }
    let foreground = labels.binary();

    //(1) Find the centres of the objects
    let needs_distance =
      self.marker == MarkerMethod::Shape || self.boundary == BoundaryMethod::Distance;
    let distance = needs_distance.then(|| distance_transform(foreground.view()));
    let marker_image = match (&distance, self.marker) {
      (Some(distance), MarkerMethod::Shape) => distance.clone(),
      _ => smooth_gaussian(image, mask, self.smoothing_size / FWHM_PER_SIGMA),
    };
    let markers = self.find_markers(marker_image.view(), labels);
    log::trace!("declumping {} objects with {} markers", labels.count(), markers.len());

    //(2) Draw the dividing lines, keeping the water inside the foreground
    let elevation = match (&distance, self.boundary) {
      (Some(distance), BoundaryMethod::Distance) => distance.mapv(|d| -d),
      _ => image.mapv(|px| 1.0 - px),
    };
    let elevation = nd::Zip::from(&elevation)
      .and(&foreground)
      .map_collect(|&height, &fg| if fg { height } else { f64::NAN });

    let watershed = TransformBuilder::new_segmenting().build()?;
    let water_levels = watershed.pre_processor(elevation.view());
    let lakes = watershed.transform(water_levels.view(), &markers);
    Ok(LabelImage::from_labels(lakes))
  }

  /// Finds at least one marker in every object of `labels`, as local maxima of
  /// `marker_image`.
  pub fn find_markers(
    &self,
    marker_image: nd::ArrayView2<f64>,
    labels: &LabelImage,
  ) -> Vec<(usize, usize)> {
    let scale = if self.use_low_res_maxima && self.min_diameter > LOW_RES_DIAMETER {
      LOW_RES_DIAMETER / self.min_diameter
    } else {
      1.0
    };

    let mut markers = if scale < 1.0 {
      low_res_maxima(marker_image, labels.view(), self.maxima_suppression_distance, scale)
    } else {
      suppressed_maxima(marker_image, labels.view(), self.maxima_suppression_distance)
    };

    //Objects without a marker get one at their brightest pixel
    let mut marked = vec![false; labels.count() + 1];
    markers.iter().for_each(|&idx| marked[labels.view()[idx]] = true);
    let mut brightest: Vec<Option<(usize, usize)>> = vec![None; labels.count() + 1];
    for (idx, &label) in labels.view().indexed_iter() {
      if label == BACKGROUND || marked[label] {
        continue;
      }
      match brightest[label] {
        Some(best) if marker_image[best] >= marker_image[idx] => {}
        _ => brightest[label] = Some(idx),
      }
    }
    markers.extend(brightest.into_iter().flatten());
    markers
  }
}

fn non_negative(what: &str, value: f64) -> Result<f64> {
  if value >= 0.0 && value.is_finite() {
    Ok(value)
  } else {
    Err(IdentifyError::InvalidConfig(format!(
      "{what} must be a non-negative number, found {value}"
    )))
  }
}

////////////////////////////////////////////////////////////////////////////////
//                                  MAXIMA                                    //
////////////////////////////////////////////////////////////////////////////////

/// Regional maxima of `values` inside each labelled region, thinned out so
/// that maxima in the same region are at least `2 * distance` apart. Higher
/// maxima are kept first; equal maxima are kept in raster order.
fn suppressed_maxima(
  values: nd::ArrayView2<f64>,
  labels: nd::ArrayView2<usize>,
  distance: f64,
) -> Vec<(usize, usize)> {
  let mut candidates = regional_maxima(values, labels);
  candidates.sort_by(|a, b| values[*b].total_cmp(&values[*a]).then(a.cmp(b)));

  let min_dist_sq = (2.0 * distance).powi(2);
  let max_label = labels.iter().copied().max().unwrap_or(BACKGROUND);
  let mut accepted: Vec<Vec<(usize, usize)>> = vec![Vec::new(); max_label + 1];
  let mut markers = Vec::new();
  for candidate in candidates {
    let region = &mut accepted[labels[candidate]];
    let too_close = region.iter().any(|&marker| dist_sq(marker, candidate) < min_dist_sq);
    if !too_close {
      region.push(candidate);
      markers.push(candidate);
    }
  }
  markers
}

/// Maxima search on an image rescaled by `scale`. Markers are mapped back to
/// full resolution, dropping those that end up outside their object.
fn low_res_maxima(
  values: nd::ArrayView2<f64>,
  labels: nd::ArrayView2<usize>,
  distance: f64,
  scale: f64,
) -> Vec<(usize, usize)> {
  let (rows, cols) = values.dim();
  let shrink = |len: usize| ((len as f64 * scale).ceil() as usize).max(1);
  let small_shape = (shrink(rows), shrink(cols));
  let small_values = resample_bilinear(values, small_shape);
  let small_labels = resample_nearest(labels, small_shape);
  let small_markers = suppressed_maxima(small_values.view(), small_labels.view(), distance * scale);

  let to_full = |small: usize, small_len: usize, len: usize| -> usize {
    let full = (small as f64 + 0.5) * len as f64 / small_len as f64 - 0.5;
    (full.round().max(0.0) as usize).min(len - 1)
  };
  small_markers
    .into_iter()
    .map(|(r, c)| ((r, c), (to_full(r, small_shape.0, rows), to_full(c, small_shape.1, cols))))
    .filter(|&(small, full)| labels[full] != BACKGROUND && labels[full] == small_labels[small])
    .map(|(_small, full)| full)
    .collect()
}

/// Plateaus of equal value without a strictly higher neighbour in the same
/// region. Each plateau is represented by its pixel closest to the plateau's
/// centroid.
fn regional_maxima(
  values: nd::ArrayView2<f64>,
  labels: nd::ArrayView2<usize>,
) -> Vec<(usize, usize)> {
  let shape = values.dim();
  let mut visited = nd::Array2::from_elem(shape, false);
  let mut queue = VecDeque::new();
  let mut maxima = Vec::new();

  for (idx, &label) in labels.indexed_iter() {
    if label == BACKGROUND || visited[idx] {
      continue;
    }

    //(1) Flood the plateau this pixel belongs to
    let height = values[idx];
    let mut plateau = vec![idx];
    let mut is_maximum = true;
    visited[idx] = true;
    queue.push_back(idx);
    while let Some(px) = queue.pop_front() {
      for neighbour in neighbours_8con(px, shape) {
        if labels[neighbour] != label {
          continue;
        }
        let other = values[neighbour];
        if other > height {
          is_maximum = false;
        } else if other == height && !visited[neighbour] {
          visited[neighbour] = true;
          plateau.push(neighbour);
          queue.push_back(neighbour);
        }
      }
    }

    //(2) Represent the plateau by its most central pixel
    if is_maximum {
      let n = plateau.len() as f64;
      let centre = plateau
        .iter()
        .fold((0.0, 0.0), |(r, c), &(pr, pc)| (r + pr as f64 / n, c + pc as f64 / n));
      let central = plateau.iter().copied().min_by(|&a, &b| {
        let da = (a.0 as f64 - centre.0).powi(2) + (a.1 as f64 - centre.1).powi(2);
        let db = (b.0 as f64 - centre.0).powi(2) + (b.1 as f64 - centre.1).powi(2);
        da.total_cmp(&db).then(a.cmp(&b))
      });
      maxima.extend(central);
    }
  }
  maxima
}

#[inline]
fn dist_sq(a: (usize, usize), b: (usize, usize)) -> f64 {
  (a.0 as f64 - b.0 as f64).powi(2) + (a.1 as f64 - b.1 as f64).powi(2)
}

////////////////////////////////////////////////////////////////////////////////
//                                 RESAMPLING                                 //
////////////////////////////////////////////////////////////////////////////////

//Position in the source image of the centre of pixel `idx` of the target image
#[inline]
fn source_position(idx: usize, target_len: usize, source_len: usize) -> f64 {
  ((idx as f64 + 0.5) * source_len as f64 / target_len as f64 - 0.5)
    .clamp(0.0, (source_len - 1) as f64)
}

fn resample_bilinear(image: nd::ArrayView2<f64>, shape: (usize, usize)) -> nd::Array2<f64> {
  let (rows, cols) = image.dim();
  let mut out = nd::Array2::<f64>::zeros(shape);
  nd::Zip::indexed(&mut out).par_for_each(|(r, c), px| {
    let y = source_position(r, shape.0, rows);
    let x = source_position(c, shape.1, cols);
    let (y0, x0) = (y.floor() as usize, x.floor() as usize);
    let (y1, x1) = ((y0 + 1).min(rows - 1), (x0 + 1).min(cols - 1));
    let (fy, fx) = (y - y0 as f64, x - x0 as f64);
    *px = (1.0 - fy) * ((1.0 - fx) * image[(y0, x0)] + fx * image[(y0, x1)])
      + fy * ((1.0 - fx) * image[(y1, x0)] + fx * image[(y1, x1)]);
  });
  out
}

fn resample_nearest(labels: nd::ArrayView2<usize>, shape: (usize, usize)) -> nd::Array2<usize> {
  let (rows, cols) = labels.dim();
  let mut out = nd::Array2::<usize>::zeros(shape);
  nd::Zip::indexed(&mut out).par_for_each(|(r, c), label| {
    let y = source_position(r, shape.0, rows).round() as usize;
    let x = source_position(c, shape.1, cols).round() as usize;
    *label = labels[(y, x)];
  });
  out
}

////////////////////////////////////////////////////////////////////////////////
//                            SMOOTHING & DISTANCES                           //
////////////////////////////////////////////////////////////////////////////////

/// Gaussian smoothing that only takes valid pixels into account.
///
/// Both the masked image and the mask itself are convolved with the same
/// (truncated, separable) gaussian kernel, after which the first is divided by
/// the second. Masked-out pixels therefore do not darken their surroundings,
/// and neither does the edge of the image. A `sigma` of 0 returns the input.
pub fn smooth_gaussian(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  sigma: f64,
) -> nd::Array2<f64> {
  if !(sigma > 0.0) {
    return image.to_owned();
  }
  let radius = (3.0 * sigma).ceil() as isize;
  let kernel: Vec<f64> =
    (-radius..=radius).map(|x| (-(x * x) as f64 / (2.0 * sigma * sigma)).exp()).collect();

  let weights = crate::mask_or_all(mask, image.dim()).mapv(|valid| if valid { 1.0 } else { 0.0 });
  let weighted = &image * &weights;
  let numerator = convolve_separable(weighted.view(), &kernel);
  let denominator = convolve_separable(weights.view(), &kernel);

  nd::Zip::from(&numerator)
    .and(&denominator)
    .par_map_collect(|&num, &den| if den > f64::EPSILON { num / den } else { 0.0 })
}

fn convolve_separable(input: nd::ArrayView2<f64>, kernel: &[f64]) -> nd::Array2<f64> {
  let along_rows = convolve_lanes(input, kernel, nd::Axis(1));
  convolve_lanes(along_rows.view(), kernel, nd::Axis(0))
}

fn convolve_lanes(input: nd::ArrayView2<f64>, kernel: &[f64], axis: nd::Axis) -> nd::Array2<f64> {
  let radius = kernel.len() / 2;
  let mut out = nd::Array2::<f64>::zeros(input.dim());
  nd::Zip::from(out.lanes_mut(axis)).and(input.lanes(axis)).par_for_each(|mut out, input| {
    let n = input.len();
    for i in 0..n {
      let (lo, hi) = (i.saturating_sub(radius), (i + radius).min(n - 1));
      out[i] = (lo..=hi).map(|j| input[j] * kernel[j + radius - i]).sum();
    }
  });
  out
}

/// Exact euclidean distance from every foreground pixel to the nearest
/// background pixel. Background pixels have a distance of 0. If there is no
/// background at all, every pixel gets the sum of the image dimensions, which
/// is larger than any real distance.
pub fn distance_transform(foreground: nd::ArrayView2<bool>) -> nd::Array2<f64> {
  let (rows, cols) = foreground.dim();
  if foreground.iter().all(|&fg| fg) {
    return nd::Array2::from_elem((rows, cols), (rows + cols) as f64);
  }

  //imageproc measures the distance to the nearest non-zero pixel, so the
  //background is the non-zero part here
  let background = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
    Luma([if foreground[(y as usize, x as usize)] { 0 } else { u8::MAX }])
  });
  let sq_dist = euclidean_squared_distance_transform(&background);
  nd::Array2::from_shape_fn((rows, cols), |(row, col)| {
    sq_dist.get_pixel(col as u32, row as u32).0[0].sqrt()
  })
}
