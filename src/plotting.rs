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

//! This module contains all the code required to generate images from label
//! images and intensity images, including the included colour maps.
//!
//! The generated plots are png files with no text. Each pixel in the generated
//! images corresponds 1:1 to a pixel in the input array.

use std::{error::Error, path::Path};

use ndarray as nd;
use num_traits::ToPrimitive;
use plotters::prelude::*;

//Colour for background and NaN px
const NAN_COL: RGBColor = BLACK;

//Colour of object outlines
const OUTLINE_COL: RGBColor = RED;

/// Signature of the colour maps in this module
pub type ColourMap<T> = fn(value: T, min: T, max: T) -> Result<RGBColor, Box<dyn Error>>;

pub fn plot_slice<T>(
  slice: nd::ArrayView2<T>,
  file_name: &Path,
  color_map: ColourMap<T>,
) -> Result<(), Box<dyn Error>>
where
  T: std::fmt::Display + std::cmp::PartialOrd + ToPrimitive + Copy,
{
  //Get min and max vals of slice
  let mut values = slice.iter().copied();
  let first = values.next().ok_or("cannot plot an empty array")?;
  let (min, max) = values.fold((first, first), |(min, max), x| {
    (if x < min { x } else { min }, if x > max { x } else { max })
  });

  //Make new fig, one px per array element
  let (rows, cols) = slice.dim();
  let root = BitMapBackend::new(file_name, (cols as u32, rows as u32)).into_drawing_area();
  root.fill(&WHITE)?;

  //fill pixels
  for ((row, col), px) in slice.indexed_iter() {
    root.draw_pixel((col as i32, row as i32), &color_map(*px, min, max)?)?;
  }

  //save file
  root.present()?;
  log::debug!("slice saved as png: {file_name:?}; max:{max:2}, min:{min:2}");
  Ok(())
}

/// Draws `image` in grey scale with the outline pixels on top
pub fn plot_outlines(
  image: nd::ArrayView2<f64>,
  outlines: nd::ArrayView2<bool>,
  file_name: &Path,
) -> Result<(), Box<dyn Error>> {
  let highlighted = nd::Zip::from(image)
    .and(outlines)
    .map_collect(|&px, &outline| if outline { f64::NAN } else { px });
  plot_slice(highlighted.view(), file_name, outlined_grey_scale)
}

#[inline(always)]
pub fn grey_scale<T>(value: T, min: T, max: T) -> Result<RGBColor, Box<dyn Error>>
where
  T: std::fmt::Display + std::cmp::PartialOrd + ToPrimitive,
{
  let to_f64 = |x: T| x.to_f64().ok_or_else(|| format!("{x} cannot be plotted"));
  let (value, min, max) = (to_f64(value)?, to_f64(min)?, to_f64(max)?);
  if !value.is_finite() || max <= min {
    //This is a NAN pixel, fill it with the NaN colour
    Ok(NAN_COL)
  } else {
    let gray = (255.0 * (value - min) / (max - min)) as u8;
    Ok(RGBColor(gray, gray, gray))
  }
}

//Grey scale, with NaN pixels marking outlines
fn outlined_grey_scale(value: f64, min: f64, max: f64) -> Result<RGBColor, Box<dyn Error>> {
  if value.is_nan() {
    Ok(OUTLINE_COL)
  } else {
    grey_scale(value, min, max)
  }
}

/// Gives every label its own colour. Hues are spaced by the golden angle, so
/// that neighbouring labels get clearly different colours.
#[inline(always)]
pub fn label_colours(label: usize, _min: usize, _max: usize) -> Result<RGBColor, Box<dyn Error>> {
  const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_75;
  if label == 0 {
    return Ok(NAN_COL);
  }
  let hue = (label as f64 * GOLDEN_RATIO_CONJUGATE).fract();
  let RGBAColor(r, g, b, _) = HSLColor(hue, 0.8, 0.55).to_rgba();
  Ok(RGBColor(r, g, b))
}
