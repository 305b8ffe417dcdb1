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

//! Per-object intensity measurements.

use ndarray as nd;
use rayon::prelude::*;

use crate::{
  error::Result,
  identify::Workspace,
  labels::{LabelImage, BACKGROUND},
};

/// Names of the measured features, in the order of [`ObjectIntensity::values`]
pub const FEATURES: [&str; 14] = [
  "IntegratedIntensity",
  "MeanIntensity",
  "StdIntensity",
  "MinIntensity",
  "MaxIntensity",
  "IntegratedIntensityEdge",
  "MeanIntensityEdge",
  "StdIntensityEdge",
  "MinIntensityEdge",
  "MaxIntensityEdge",
  "MassDisplacement",
  "LowerQuartileIntensity",
  "MedianIntensity",
  "UpperQuartileIntensity",
];

/// Summary statistics of a set of intensities
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntensityStats {
  pub integrated: f64,
  pub mean: f64,
  pub std: f64,
  pub min: f64,
  pub max: f64,
}

impl IntensityStats {
  /// Statistics of `values`. All statistics are zero for an empty set.
  pub fn of(values: &[f64]) -> Self {
    if values.is_empty() {
      return Self::default();
    }
    let n = values.len() as f64;
    let integrated: f64 = values.iter().sum();
    let mean = integrated / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let (min, max) = values
      .iter()
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| (min.min(v), max.max(v)));
    IntensityStats { integrated, mean, std: variance.sqrt(), min, max }
  }
}

/// All intensity measurements of one object
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObjectIntensity {
  pub whole: IntensityStats,
  pub edge: IntensityStats,
  /// Distance between the centre of the object and its intensity-weighted
  /// centre of mass
  pub mass_displacement: f64,
  pub lower_quartile: f64,
  pub median: f64,
  pub upper_quartile: f64,
}

impl ObjectIntensity {
  /// Feature values in the order of [`FEATURES`]
  pub fn values(&self) -> [f64; 14] {
    let (w, e) = (&self.whole, &self.edge);
    [
      w.integrated,
      w.mean,
      w.std,
      w.min,
      w.max,
      e.integrated,
      e.mean,
      e.std,
      e.min,
      e.max,
      self.mass_displacement,
      self.lower_quartile,
      self.median,
      self.upper_quartile,
    ]
  }
}

//Pixels of a single object
#[derive(Debug, Default)]
struct ObjectPixels {
  positions: Vec<(usize, usize)>,
  values: Vec<f64>,
  edge: Vec<f64>,
}

impl ObjectPixels {
  fn measure(mut self) -> ObjectIntensity {
    if self.values.is_empty() {
      return ObjectIntensity::default();
    }
    let whole = IntensityStats::of(&self.values);
    let edge = IntensityStats::of(&self.edge);

    //(1) mass displacement
    let n = self.values.len() as f64;
    let (mut row, mut col, mut row_w, mut col_w) = (0.0, 0.0, 0.0, 0.0);
    for (&(r, c), &v) in self.positions.iter().zip(self.values.iter()) {
      row += r as f64;
      col += c as f64;
      row_w += r as f64 * v;
      col_w += c as f64 * v;
    }
    let mass_displacement = if whole.integrated > 0.0 {
      let d_row = row / n - row_w / whole.integrated;
      let d_col = col / n - col_w / whole.integrated;
      d_row.hypot(d_col)
    } else {
      0.0
    };

    //(2) quartiles
    self.values.sort_unstable_by(f64::total_cmp);
    let quantile = |q: f64| {
      let idx = (self.values.len() as f64 * q + 0.5).floor() as usize;
      self.values[idx.min(self.values.len() - 1)]
    };

    ObjectIntensity {
      whole,
      edge,
      mass_displacement,
      lower_quartile: quantile(0.25),
      median: quantile(0.5),
      upper_quartile: quantile(0.75),
    }
  }
}

/// Measures the intensity of every object in `labels`. Masked-out pixels are
/// not part of any object. Results are in label order.
pub fn measure_intensity(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  labels: &LabelImage,
) -> Result<Vec<ObjectIntensity>> {
  crate::check_shape(image.dim(), labels.shape())?;
  if let Some(mask) = mask {
    crate::check_shape(image.dim(), mask.dim())?;
  }

  let outlines = labels.outlines();
  let mut objects: Vec<ObjectPixels> =
    (0..labels.count()).map(|_| ObjectPixels::default()).collect();
  let pixels = image.iter().zip(outlines.iter());
  for ((idx, &label), (&px, &edge)) in labels.view().indexed_iter().zip(pixels) {
    if label == BACKGROUND || !mask.map_or(true, |mask| mask[idx]) {
      continue;
    }
    let object = &mut objects[label - 1];
    object.positions.push(idx);
    object.values.push(px);
    if edge {
      object.edge.push(px);
    }
  }

  Ok(objects.into_par_iter().map(ObjectPixels::measure).collect())
}

/// Measure object intensity module. Measures the intensity of one image inside
/// each of a list of named objects.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasureObjectIntensity {
  pub image_name: String,
  pub object_names: Vec<String>,
}

impl MeasureObjectIntensity {
  pub fn new(image_name: impl Into<String>, object_names: Vec<String>) -> Self {
    MeasureObjectIntensity { image_name: image_name.into(), object_names }
  }

  /// Records `Intensity_<feature>_<image>` for every configured object set
  pub fn run(&self, workspace: &mut Workspace) -> Result<()> {
    let image = workspace.image_set.get_image(&self.image_name)?;
    for object_name in &self.object_names {
      let objects = workspace.object_set.get_objects(object_name)?;
      let measured = measure_intensity(image.pixels(), image.mask(), &objects.segmented)?;
      log::debug!(
        "measured intensity of {} {object_name} in \"{}\"",
        measured.len(),
        self.image_name
      );

      let table: Vec<[f64; 14]> = measured.iter().map(ObjectIntensity::values).collect();
      for (column, feature) in FEATURES.iter().enumerate() {
        let values = table.iter().map(|row| row[column]).collect();
        workspace.measurements.add_measurement(
          object_name,
          &format!("Intensity_{feature}_{}", self.image_name),
          values,
        )?;
      }
    }
    Ok(())
  }
}
