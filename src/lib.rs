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

#![doc(
  html_logo_url = "https://raw.githubusercontent.com/smups/rustronomy/main/logos/Rustronomy_ferris.png?raw=true"
)]
//! Rustronomy-identify finds primary objects (typically nuclei) in grayscale
//! microscopy images that show bright objects on a dark background.
//!
//! # Features
//! Identification happens in three steps, each of which can be configured:
//! 1. An automatic (or manual) *threshold* separates foreground from background.
//! Otsu, Mixture of Gaussians, Background, Robust Background, Ridler-Calvard and
//! Kapur thresholds are available, each computed globally, adaptively (per block)
//! or per parent object.
//! 2. The thresholded image is split into 8-connected components, which are then
//! *declumped*: object centres are found as local maxima of either the smoothed
//! intensity image or of the distance transform of the foreground, after which a
//! segmenting watershed transform draws the dividing lines between them.
//! 3. Objects are *filtered*: objects touching the border of the image and
//! objects outside of the expected diameter range can be discarded, and objects
//! that are too small can be merged into their larger neighbours.
//!
//! The crate also contains two modules that usually accompany object
//! identification in a pipeline: a morphological speckle filter (`speckles`) and
//! per-object intensity measurements (`intensity`).
//!
//! In addition, `rustronomy-identify` provides extra functionality which can be
//! accessed via cargo feature gates. A list of all additional features [can be found
//! below](#cargo-feature-gates).
//!
//! # Quickstart
//! To use the latest release of Rustronomy-identify in a cargo project, add
//! the rustronomy-identify crate as a dependency to your `Cargo.toml` file:
//! ```toml
//! [dependencies]
//! rustronomy-identify = "0.1.0"
//! ```
//!
//! ## Short example: identifying two nuclei
//! `rustronomy-identify` uses the "builder pattern" to configure the
//! identification module before running it. The configuration is validated
//! exactly once, when `build()` is called, so a misconfigured module fails before
//! a single image has been processed.
//! ```rust
//! use rustronomy_identify::prelude::*;
//!
//! //Two bright squares on a dark background
//! let mut pixels = nd::Array2::<f64>::zeros((32, 32));
//! pixels.slice_mut(nd::s![4..12, 4..12]).fill(0.9);
//! pixels.slice_mut(nd::s![18..28, 16..26]).fill(0.8);
//!
//! let module = IdentifyBuilder::new("DNA", "Nuclei")
//!   .set_size_range(3, 40)
//!   .build()
//!   .unwrap();
//!
//! let mut workspace = Workspace::new(0);
//! workspace.image_set.add("DNA", Image::new(pixels));
//! module.run(&mut workspace).unwrap();
//!
//! let nuclei = workspace.object_set.get_objects("Nuclei").unwrap();
//! assert_eq!(nuclei.count(), 2);
//! ```
//!
//! # Cargo feature gates
//! *By default, all features behind cargo feature gates are **disabled***
//! - `jemalloc`: this feature enables the [jemalloc allocator](https://jemalloc.net).
//! Enabling this feature can improve run-time performance of large batch runs,
//! especially on machines with many cores. To compile `rustronomy-identify` with
//! the `jemalloc` feature, jemalloc must be installed on the host system.
//! - `plots`: with this feature enabled, `IdentifyBuilder` gains a
//! `set_plot_folder` method. When a folder is set, the label image and the
//! outlined input image of every processed cycle are written to that folder as
//! png files. Plotting support adds the `plotters` crate as a dependency, see
//! [the `plotters` documentation](https://docs.rs/plotters/) for the system
//! packages it requires.
//! - `progress`: this feature enables a progress bar for batch runs
//! (`IdentifyPrimaryObjects::run_batch`). Enabling this feature adds the
//! `indicatif` crate as a dependency.
//! - `serde`: derives `Serialize` and `Deserialize` for the configuration types,
//! so that module settings can be stored alongside a pipeline.
//! - `debug`: this feature records how long each identification stage took and
//! emits the report through the `log` facade at the `debug` level. Enabling this
//! feature does not add additional dependencies.

//Unconditional imports
use ndarray as nd;

//Set Jemalloc as the global allocator for this crate
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

pub mod declump;
pub mod error;
pub mod filter;
pub mod identify;
pub mod image;
pub mod intensity;
pub mod labels;
pub mod measurements;
pub mod objects;
pub mod segment;
pub mod speckles;
pub mod threshold;
pub mod watershed;

#[cfg(feature = "debug")]
mod performance_monitoring;

#[cfg(feature = "plots")]
pub mod plotting;

//Utility prelude for batch import
pub mod prelude {
  pub use crate::declump::{BoundaryMethod, Declumper, MarkerMethod};
  pub use crate::error::{IdentifyError, Result};
  pub use crate::filter::{filter_objects, FilteredObjects, ObjectFate, ObjectFilter};
  pub use crate::identify::{
    IdentifyBuilder, IdentifyConfig, IdentifyPrimaryObjects, Identified, Workspace,
  };
  pub use crate::image::{Image, ImageSet};
  pub use crate::intensity::{measure_intensity, MeasureObjectIntensity};
  pub use crate::labels::LabelImage;
  pub use crate::measurements::{CycleMeasurements, Measurements};
  pub use crate::objects::{ObjectSet, Objects};
  pub use crate::segment::segment;
  pub use crate::speckles::{SpeckleFilter, SpeckleMode};
  pub use crate::threshold::{
    compute_threshold, Threshold, ThresholdAlgorithm, ThresholdMethod, ThresholdScope,
    Thresholder,
  };
  pub use crate::watershed::{SegmentingWatershed, TransformBuilder, Watershed, WatershedUtils};
  pub use ndarray as nd;
}

////////////////////////////////////////////////////////////////////////////////
//                              HELPER FUNCTIONS                              //
////////////////////////////////////////////////////////////////////////////////

#[inline]
pub(crate) fn neighbours_8con(
  index: (usize, usize),
  shape: (usize, usize),
) -> impl Iterator<Item = (usize, usize)> {
  const OFFSETS: [(isize, isize); 8] =
    [(1, 0), (1, 1), (1, -1), (0, 1), (0, -1), (-1, 0), (-1, 1), (-1, -1)];
  offset_neighbours(index, shape, OFFSETS)
}

#[inline]
pub(crate) fn neighbours_4con(
  index: (usize, usize),
  shape: (usize, usize),
) -> impl Iterator<Item = (usize, usize)> {
  const OFFSETS: [(isize, isize); 4] = [(1, 0), (0, 1), (0, -1), (-1, 0)];
  offset_neighbours(index, shape, OFFSETS)
}

#[inline(always)]
fn offset_neighbours<const N: usize>(
  index: (usize, usize),
  shape: (usize, usize),
  offsets: [(isize, isize); N],
) -> impl Iterator<Item = (usize, usize)> {
  let (x, y): (isize, isize) = (index.0 as isize, index.1 as isize);
  let (w, h): (isize, isize) = (shape.0 as isize, shape.1 as isize);
  offsets.into_iter().filter_map(move |(dx, dy)| {
    let (x, y) = (x + dx, y + dy);
    if x < 0 || y < 0 || x >= w || y >= h {
      None
    } else {
      Some((x as usize, y as usize))
    }
  })
}

/// Checks that two arrays have the same shape. Most operations in this crate
/// combine an image with a mask or a label image of the same size.
pub(crate) fn check_shape(expected: (usize, usize), found: (usize, usize)) -> error::Result<()> {
  if expected != found {
    Err(error::IdentifyError::ShapeMismatch { expected, found })
  } else {
    Ok(())
  }
}

/// Owned mask that is `true` everywhere if no mask was given
pub(crate) fn mask_or_all(
  mask: Option<nd::ArrayView2<bool>>,
  shape: (usize, usize),
) -> nd::Array2<bool> {
  match mask {
    Some(mask) => mask.to_owned(),
    None => nd::Array2::from_elem(shape, true),
  }
}
