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

//! Errors returned by the identification modules.
//!
//! Errors fall in two families. *Configuration* errors (see
//! [`IdentifyError::is_configuration`]) mean that a module was set up wrongly;
//! they are reported by the builders before any image is processed. A
//! *degenerate image* (see [`IdentifyError::is_degenerate`]) is a property of a
//! single image cycle, such as a mask without any valid pixels. The
//! identification module reports those cycles as having zero objects instead of
//! aborting a batch run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentifyError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentifyError {
  #[error("unrecognized threshold method \"{0}\"")]
  UnknownThresholdMethod(String),

  #[error("invalid threshold bounds: lower bound {lower} is larger than upper bound {upper}")]
  InvalidRange { lower: f64, upper: f64 },

  #[error("invalid diameter range: minimum {min} is larger than maximum {max}")]
  InvalidSizeRange { min: usize, max: usize },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("configuration version {found} cannot be used, expected version {expected}")]
  UnsupportedVersion { found: u32, expected: u32 },

  #[error("degenerate image: {0}")]
  DegenerateImage(&'static str),

  #[error("shape mismatch: expected an array of shape {expected:?}, found {found:?}")]
  ShapeMismatch { expected: (usize, usize), found: (usize, usize) },

  #[error("the image set does not contain an image called \"{0}\"")]
  MissingImage(String),

  #[error("the object set does not contain objects called \"{0}\"")]
  MissingObjects(String),

  #[error("measurement {object}/{feature} was already recorded for cycle {cycle}")]
  DuplicateMeasurement { object: String, feature: String, cycle: usize },
}

impl IdentifyError {
  /// Returns `true` for errors caused by a wrongly configured module. These are
  /// fatal and should be fixed before a pipeline is run.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      Self::UnknownThresholdMethod(_)
        | Self::InvalidRange { .. }
        | Self::InvalidSizeRange { .. }
        | Self::InvalidConfig(_)
        | Self::UnsupportedVersion { .. }
    )
  }

  /// Returns `true` if the error was caused by the contents of a single image,
  /// rather than by the configuration of the module processing it.
  pub fn is_degenerate(&self) -> bool {
    matches!(self, Self::DegenerateImage(_))
  }
}
