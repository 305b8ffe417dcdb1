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

use std::collections::HashMap;

use crate::{
  error::{IdentifyError, Result},
  labels::LabelImage,
};

/// A named set of objects found in one image.
///
/// Next to the final label image, the record may hold the label image before
/// filtering (`unedited`) and the label image with only the too-small objects
/// removed (`small_removed`).
#[derive(Debug, Clone, PartialEq)]
pub struct Objects {
  pub segmented: LabelImage,
  pub unedited: Option<LabelImage>,
  pub small_removed: Option<LabelImage>,
}

impl Objects {
  pub fn new(segmented: LabelImage) -> Self {
    Objects { segmented, unedited: None, small_removed: None }
  }

  /// Unedited label image, or the final one if there is none
  pub fn unedited(&self) -> &LabelImage {
    self.unedited.as_ref().unwrap_or(&self.segmented)
  }

  /// Label image with the small objects removed, or the final one if there is
  /// none
  pub fn small_removed(&self) -> &LabelImage {
    self.small_removed.as_ref().unwrap_or(&self.segmented)
  }

  /// Number of (final) objects
  pub fn count(&self) -> usize {
    self.segmented.count()
  }

  /// Centres of mass of the final objects as `(x, y)` pairs, in label order
  pub fn centroids(&self) -> Vec<(f64, f64)> {
    self.segmented.centroids()
  }
}

/// The objects available to the modules during one pipeline cycle
#[derive(Debug, Clone, Default)]
pub struct ObjectSet {
  objects: HashMap<String, Objects>,
}

impl ObjectSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds objects under `name`, replacing any objects with the same name.
  pub fn add_objects(&mut self, objects: Objects, name: impl Into<String>) {
    self.objects.insert(name.into(), objects);
  }

  pub fn get_objects(&self, name: &str) -> Result<&Objects> {
    self.objects.get(name).ok_or_else(|| IdentifyError::MissingObjects(name.to_string()))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.objects.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.objects.keys().map(String::as_str)
  }
}
