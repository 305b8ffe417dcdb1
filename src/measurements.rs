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

//! Append-only measurement tables.
//!
//! Every pipeline cycle writes its measurements to its own
//! [`CycleMeasurements`] sink. Once a cycle is done, its sink is folded into the
//! run-wide [`Measurements`] table. Cycles never write to each other's sinks,
//! so cycles can run in parallel without any locking.

use std::collections::BTreeMap;

use crate::error::{IdentifyError, Result};

/// Object name under which image-level measurements are stored
pub const IMAGE: &str = "Image";

type Key = (String, String);

/// Measurements recorded during a single pipeline cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleMeasurements {
  cycle: usize,
  values: BTreeMap<Key, Vec<f64>>,
}

impl CycleMeasurements {
  pub fn new(cycle: usize) -> Self {
    CycleMeasurements { cycle, values: BTreeMap::new() }
  }

  pub fn cycle(&self) -> usize {
    self.cycle
  }

  /// Records the per-object values of `feature` for the objects called
  /// `object`. Fails if the feature was already recorded in this cycle.
  pub fn add_measurement(
    &mut self,
    object: &str,
    feature: &str,
    values: Vec<f64>,
  ) -> Result<()> {
    let key = (object.to_string(), feature.to_string());
    if self.values.contains_key(&key) {
      return Err(IdentifyError::DuplicateMeasurement {
        object: key.0,
        feature: key.1,
        cycle: self.cycle,
      });
    }
    self.values.insert(key, values);
    Ok(())
  }

  /// Records an image-level measurement
  pub fn add_image_measurement(&mut self, feature: &str, value: f64) -> Result<()> {
    self.add_measurement(IMAGE, feature, vec![value])
  }

  pub fn get(&self, object: &str, feature: &str) -> Option<&[f64]> {
    self.values.get(&(object.to_string(), feature.to_string())).map(Vec::as_slice)
  }

  /// Value of an image-level measurement
  pub fn get_image(&self, feature: &str) -> Option<f64> {
    self.get(IMAGE, feature).and_then(|values| values.first().copied())
  }

  /// All `(object, feature)` pairs recorded in this cycle
  pub fn features(&self) -> impl Iterator<Item = (&str, &str)> {
    self.values.keys().map(|(object, feature)| (object.as_str(), feature.as_str()))
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

/// Measurements of a whole pipeline run, keyed by object, feature and cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements {
  values: BTreeMap<Key, BTreeMap<usize, Vec<f64>>>,
}

impl Measurements {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds all measurements of a finished cycle. Either all of them are added,
  /// or (if any of them was already recorded for that cycle) none are.
  pub fn absorb(&mut self, cycle: CycleMeasurements) -> Result<()> {
    let duplicate = cycle.values.keys().find(|key| {
      self.values.get(*key).map_or(false, |cycles| cycles.contains_key(&cycle.cycle))
    });
    if let Some((object, feature)) = duplicate {
      return Err(IdentifyError::DuplicateMeasurement {
        object: object.clone(),
        feature: feature.clone(),
        cycle: cycle.cycle,
      });
    }

    for (key, values) in cycle.values {
      self.values.entry(key).or_default().insert(cycle.cycle, values);
    }
    Ok(())
  }

  pub fn get(&self, object: &str, feature: &str, cycle: usize) -> Option<&[f64]> {
    self
      .values
      .get(&(object.to_string(), feature.to_string()))
      .and_then(|cycles| cycles.get(&cycle))
      .map(Vec::as_slice)
  }

  /// All recorded cycles of a feature, in cycle order
  pub fn series(&self, object: &str, feature: &str) -> Vec<(usize, &[f64])> {
    self
      .values
      .get(&(object.to_string(), feature.to_string()))
      .map(|cycles| cycles.iter().map(|(&cycle, values)| (cycle, values.as_slice())).collect())
      .unwrap_or_default()
  }
}
