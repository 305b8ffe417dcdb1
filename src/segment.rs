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

use ndarray as nd;

use crate::{error::Result, labels::LabelImage, threshold::Threshold};

/// Pixels that pass the threshold (`image >= threshold`) and are valid
/// according to the mask.
pub fn binarize(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  threshold: &Threshold,
) -> Result<nd::Array2<bool>> {
  if let Some(mask) = mask {
    crate::check_shape(image.dim(), mask.dim())?;
  }
  if let Threshold::PerPixel(values) = threshold {
    crate::check_shape(image.dim(), values.dim())?;
  }

  let mut binary = nd::Array2::from_elem(image.dim(), false);
  nd::Zip::indexed(&mut binary).and(&image).par_for_each(|idx, fg, &px| {
    *fg = px >= threshold.at(idx) && mask.map_or(true, |mask| mask[idx]);
  });
  Ok(binary)
}

/// Splits the thresholded image into 8-connected objects.
///
/// Returns the (compacted) label image and the number of objects. Finding no
/// objects at all is not an error.
/// ```
/// use rustronomy_identify::prelude::*;
///
/// let mut pixels = nd::Array2::<f64>::zeros((10, 10));
/// pixels.slice_mut(nd::s![1..4, 1..4]).fill(1.0);
/// pixels.slice_mut(nd::s![6..9, 5..8]).fill(1.0);
///
/// let (labels, count) = segment(pixels.view(), None, &Threshold::Global(0.5)).unwrap();
/// assert_eq!(count, 2);
/// assert_eq!(labels.view()[(2, 2)], 1);
/// assert_eq!(labels.view()[(7, 6)], 2);
/// ```
pub fn segment(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  threshold: &Threshold,
) -> Result<(LabelImage, usize)> {
  let binary = binarize(image, mask, threshold)?;
  let labels = LabelImage::from_binary(binary.view());
  let count = labels.count();
  Ok((labels, count))
}
