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

//! Grayscale images and the named image store of a pipeline cycle.

use std::{collections::HashMap, sync::Arc};

use ndarray as nd;

use crate::error::{IdentifyError, Result};

/// A grayscale image with intensities in the `[0, 1]` range.
///
/// An image may carry a boolean mask of the same shape, where `true` marks a
/// valid pixel. Images produced by a filter keep a reference to the image they
/// were computed from. Images are immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
  pixels: nd::Array2<f64>,
  mask: Option<nd::Array2<bool>>,
  parent: Option<Arc<Image>>,
}

impl Image {
  /// Creates a new unmasked image
  pub fn new(pixels: nd::Array2<f64>) -> Self {
    Image { pixels, mask: None, parent: None }
  }

  /// Creates a new image with a mask. Fails if the mask and the pixel data do
  /// not have the same shape.
  pub fn with_mask(pixels: nd::Array2<f64>, mask: nd::Array2<bool>) -> Result<Self> {
    crate::check_shape(pixels.dim(), mask.dim())?;
    Ok(Image { pixels, mask: Some(mask), parent: None })
  }

  /// Converts a colour image of shape `(rows, columns, channels)` to grayscale
  /// by averaging over all channels.
  pub fn from_channels(pixels: nd::ArrayView3<f64>) -> Result<Self> {
    let grey = pixels
      .mean_axis(nd::Axis(2))
      .ok_or_else(|| IdentifyError::InvalidConfig("colour image has no channels".to_string()))?;
    Ok(Image::new(grey))
  }

  /// Sets the image this image was derived from
  pub fn with_parent(mut self, parent: Arc<Image>) -> Self {
    self.parent = Some(parent);
    self
  }

  /// Image computed from `parent` by a filter that keeps the shape. The new
  /// image inherits the mask of its parent.
  pub(crate) fn derived(parent: &Arc<Image>, pixels: nd::Array2<f64>) -> Self {
    Image { pixels, mask: parent.mask.clone(), parent: Some(Arc::clone(parent)) }
  }

  pub fn pixels(&self) -> nd::ArrayView2<f64> {
    self.pixels.view()
  }

  pub fn mask(&self) -> Option<nd::ArrayView2<bool>> {
    self.mask.as_ref().map(|mask| mask.view())
  }

  pub fn has_mask(&self) -> bool {
    self.mask.is_some()
  }

  pub fn parent(&self) -> Option<&Image> {
    self.parent.as_deref()
  }

  /// Shape of the image as `(rows, columns)`
  pub fn shape(&self) -> (usize, usize) {
    self.pixels.dim()
  }

  /// Returns the mask of this image, or an all-`true` mask if the image has none.
  pub fn effective_mask(&self) -> nd::Array2<bool> {
    crate::mask_or_all(self.mask(), self.shape())
  }
}

/// The images available to the modules during one pipeline cycle.
///
/// Images are stored behind an `Arc` so that derived images can reference
/// their parents without copying pixel data.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
  images: HashMap<String, Arc<Image>>,
}

impl ImageSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds an image under `name`, replacing any image with the same name.
  pub fn add(&mut self, name: impl Into<String>, image: Image) {
    self.images.insert(name.into(), Arc::new(image));
  }

  pub fn get_image(&self, name: &str) -> Result<Arc<Image>> {
    self.images.get(name).cloned().ok_or_else(|| IdentifyError::MissingImage(name.to_string()))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.images.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.images.keys().map(String::as_str)
  }
}
