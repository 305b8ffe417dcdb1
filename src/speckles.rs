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

//! Morphological speckle filter.
//!
//! Suppressing speckles removes bright features smaller than the structuring
//! element (a grey opening). Enhancing speckles keeps *only* those features (a
//! white top-hat).

use std::sync::Arc;

use ndarray as nd;

use crate::{
  error::{IdentifyError, Result},
  identify::Workspace,
  image::Image,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpeckleMode {
  /// Keep only bright features smaller than the object size
  Enhance,
  /// Remove bright features smaller than the object size
  Suppress,
}

/// Speckle filter module: reads one image from the workspace and stores the
/// filtered version under a new name.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeckleFilter {
  image_name: String,
  filtered_image_name: String,
  mode: SpeckleMode,
  object_size: usize,
}

impl SpeckleFilter {
  /// Creates a new speckle filter for features of up to `object_size` pixels
  /// in diameter.
  pub fn new(
    image_name: impl Into<String>,
    filtered_image_name: impl Into<String>,
    mode: SpeckleMode,
    object_size: usize,
  ) -> Result<Self> {
    if object_size == 0 {
      return Err(IdentifyError::InvalidConfig(
        "speckle filter object size must be at least one pixel".to_string(),
      ));
    }
    Ok(SpeckleFilter {
      image_name: image_name.into(),
      filtered_image_name: filtered_image_name.into(),
      mode,
      object_size,
    })
  }

  pub fn mode(&self) -> SpeckleMode {
    self.mode
  }

  /// Radius of the disk shaped structuring element
  pub fn radius(&self) -> usize {
    (self.object_size + 1) / 2
  }

  /// Filters `image`. The result keeps the mask of the input and has the input
  /// as its parent.
  pub fn apply(&self, image: &Arc<Image>) -> Image {
    let pixels = image.pixels();
    let mask = image.mask();
    let filtered = match self.mode {
      SpeckleMode::Suppress => opening(pixels, mask, self.radius()),
      SpeckleMode::Enhance => white_tophat(pixels, mask, self.radius()),
    };
    Image::derived(image, filtered)
  }

  pub fn run(&self, workspace: &mut Workspace) -> Result<()> {
    let image = workspace.image_set.get_image(&self.image_name)?;
    let filtered = self.apply(&image);
    log::debug!(
      "{}: {:?} speckles of up to {}px in \"{}\"",
      self.filtered_image_name,
      self.mode,
      self.object_size,
      self.image_name
    );
    workspace.image_set.add(self.filtered_image_name.clone(), filtered);
    Ok(())
  }
}

////////////////////////////////////////////////////////////////////////////////
//                               MORPHOLOGY                                   //
////////////////////////////////////////////////////////////////////////////////

/// Offsets `(drow, dcol)` of a disk with the given radius
fn disk(radius: usize) -> Vec<(isize, isize)> {
  let r = radius as isize;
  let mut offsets = Vec::new();
  for drow in -r..=r {
    for dcol in -r..=r {
      if drow * drow + dcol * dcol <= r * r {
        offsets.push((drow, dcol));
      }
    }
  }
  offsets
}

/// Minimum (`erode`) or maximum (`dilate`) over the footprint of every valid
/// pixel. Masked-out pixels do not contribute and keep their value.
fn rank_filter(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  footprint: &[(isize, isize)],
  pick: fn(f64, f64) -> f64,
) -> nd::Array2<f64> {
  let (rows, cols) = image.dim();
  let valid = |row: isize, col: isize| {
    row >= 0
      && col >= 0
      && (row as usize) < rows
      && (col as usize) < cols
      && mask.map_or(true, |mask| mask[(row as usize, col as usize)])
  };

  nd::Zip::indexed(image).par_map_collect(|(row, col), &px| {
    if !valid(row as isize, col as isize) {
      return px;
    }
    footprint
      .iter()
      .map(|&(drow, dcol)| (row as isize + drow, col as isize + dcol))
      .filter(|&(row, col)| valid(row, col))
      .fold(px, |acc, (row, col)| pick(acc, image[(row as usize, col as usize)]))
  })
}

/// Grey opening (erosion followed by dilation) with a disk of the given radius.
/// Masked-out pixels do not contribute and pass through unchanged.
pub fn opening(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  radius: usize,
) -> nd::Array2<f64> {
  let footprint = disk(radius);
  let eroded = rank_filter(image, mask, &footprint, f64::min);
  rank_filter(eroded.view(), mask, &footprint, f64::max)
}

/// White top-hat: the image minus its opening. Masked-out pixels are set to 0.
pub fn white_tophat(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  radius: usize,
) -> nd::Array2<f64> {
  let mut tophat = opening(image, mask, radius);
  nd::Zip::indexed(&mut tophat).and(image).par_for_each(|idx, opened, &px| {
    let valid = mask.map_or(true, |mask| mask[idx]);
    *opened = if valid { px - *opened } else { 0.0 };
  });
  tophat
}
