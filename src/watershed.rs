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

//! Marker-seeded segmenting watershed transform (see Digabel & Lantuéjoul,
//! 1978[^1]).
//!
//! The transform works on images of `u8` *water levels*. Starting at the lowest
//! level present in the image, the water level is raised one step at a time.
//! At every level, each flooded pixel (a pixel with an elevation at or below the
//! water level) that borders a coloured pixel takes over the colour of that
//! neighbour. This is repeated until no more pixels change colour, so plateaus
//! are flooded completely before the water rises further. Lakes never merge:
//! where two colours meet, the boundary simply stays where it is.
//!
//! Pixels at the special `NEVER_FILL` level are walls that are never flooded.
//! The identification modules use them to keep the transform inside the
//! foreground of the segmented image.
//!
//! [^1]: H. Digabel and C. Lantuéjoul. **Iterative algorithms.** *In Actes du Second Symposium Européen d’Analyse Quantitative des Microstructures en Sciences des Matériaux, Biologie et Medécine*, October 1978.

use ndarray as nd;
use num_traits::{Num, ToPrimitive};
use rayon::prelude::*;

use crate::{
  error::{IdentifyError, Result},
  neighbours_8con,
};

//Colour of unreached pixels and the special water levels
pub const UNCOLOURED: usize = 0;
pub const NORMAL_MAX: u8 = u8::MAX - 1;
pub const ALWAYS_FILL: u8 = u8::MIN;
pub const NEVER_FILL: u8 = u8::MAX;

/// Configures a segmenting watershed transform. `build()` hands out a
/// `Box<dyn Watershed + Send + Sync>` that can be shared between the threads of
/// a batch run.
/// ```
/// use rustronomy_identify::prelude::*;
///
/// //A valley with two seeds, one on either side of a ridge
/// let elevation = nd::array![[0u8, 10, 200, 10, 0]];
/// let watershed = TransformBuilder::new_segmenting().build().unwrap();
/// let lakes = watershed.transform(elevation.view(), &[(0, 0), (0, 4)]);
/// assert_eq!(lakes, nd::array![[1usize, 1, 1, 2, 2]]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransformBuilder {
  max_water_level: u8,
}

impl TransformBuilder {
  /// Segmenting transform that floods up to `NORMAL_MAX`
  pub fn new_segmenting() -> Self {
    TransformBuilder { max_water_level: NORMAL_MAX }
  }

  /// Highest water level the transform floods. Levels above `NORMAL_MAX` are
  /// rejected by `build()`.
  pub fn set_max_water_lvl(mut self, level: u8) -> Self {
    self.max_water_level = level;
    self
  }

  /// Fails with `InvalidConfig` if the water level is out of range
  pub fn build(self) -> Result<Box<dyn Watershed + Send + Sync>> {
    let TransformBuilder { max_water_level } = self;
    if max_water_level > NORMAL_MAX {
      return Err(IdentifyError::InvalidConfig(format!(
        "max water level was set at {max_water_level}, which is higher than the allowed \
        maximum ({NORMAL_MAX})"
      )));
    }
    Ok(Box::new(SegmentingWatershed { max_water_level }))
  }
}

/// Conversion of elevation maps into water levels
pub trait WatershedUtils {
  /// Rescales the finite values of `img` linearly onto `0..=NORMAL_MAX`.
  /// `NaN` and `+inf` become `NEVER_FILL` walls, `-inf` becomes `ALWAYS_FILL`.
  /// A flat image is flooded at once.
  fn pre_processor<T, D>(&self, img: nd::ArrayView<T, D>) -> nd::Array<u8, D>
  where
    T: Num + Copy + ToPrimitive + PartialOrd,
    D: nd::Dimension,
  {
    //Calculate max and min values of the finite pixels
    let (min, max) = img
      .iter()
      .filter_map(|x| x.to_f64())
      .filter(|x| x.is_finite())
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), x| (min.min(x), max.max(x)));
    let range = max - min;

    //Rescale, keeping the special values apart
    img.mapv(|x| -> u8 {
      match x.to_f64() {
        Some(float) if float.is_finite() => {
          if range > 0.0 {
            let normal = (float - min) / range;
            (normal * NORMAL_MAX as f64).round().to_u8().unwrap_or(NORMAL_MAX)
          } else {
            ALWAYS_FILL
          }
        }
        //-inf
        Some(float) if float == f64::NEG_INFINITY => ALWAYS_FILL,
        //NaN and +inf
        _ => NEVER_FILL,
      }
    })
  }
}

/// A watershed transform. Object safe, so transforms can be passed around as
/// `Box<dyn Watershed + Send + Sync>`.
pub trait Watershed {
  /// Returns the watershed transform of the input image. The lake started by
  /// `seeds[i]` gets colour `i + 1`; pixels that were never reached keep the
  /// colour `UNCOLOURED` (0).
  fn transform(&self, input: nd::ArrayView2<u8>, seeds: &[(usize, usize)]) -> nd::Array2<usize>;
}

impl WatershedUtils for dyn Watershed {}
impl WatershedUtils for dyn Watershed + Send + Sync {}

/// Segmenting watershed: lakes grow from their seeds and never merge.
///
/// # Ties
/// A pixel that borders more than one lake when it is flooded joins the lake
/// of its lowest neighbour. If several neighbours are equally low, it joins the
/// lake with the smallest colour. The transform is therefore deterministic and
/// independent of the number of threads it runs on.
///
/// # Memory usage
/// Besides the input, the transform holds one `Array2<usize>` of colours and a
/// (usually small) `Vec` of the pixels coloured in the current pass.
#[derive(Debug, Clone)]
pub struct SegmentingWatershed {
  max_water_level: u8,
}

impl Default for SegmentingWatershed {
  fn default() -> Self {
    SegmentingWatershed { max_water_level: NORMAL_MAX }
  }
}

impl WatershedUtils for SegmentingWatershed {}

impl Watershed for SegmentingWatershed {
  fn transform(&self, input: nd::ArrayView2<u8>, seeds: &[(usize, usize)]) -> nd::Array2<usize> {
    //(1) colour map, everything starts out dry
    let mut output = nd::Array2::<usize>::zeros(input.dim());

    //(2) colour the starting pixels, in the order of the seeds
    for (colour, &idx) in seeds.iter().enumerate() {
      output[idx] = colour + 1;
    }

    //(3) only raise the water to levels that actually occur in the image,
    //nothing new is flooded at the others
    let mut present = [false; 256];
    input.iter().for_each(|&lvl| present[lvl as usize] = true);
    let levels = (0..=self.max_water_level).filter(|&lvl| present[lvl as usize]);

    #[cfg(feature = "debug")]
    let mut passes = 0usize;

    for water_level in levels {
      //(i) keep colouring until the lakes stop growing at this level. A
      //plateau can take many passes to fill.
      'colouring_loop: loop {
        #[cfg(feature = "debug")]
        {
          passes += 1;
        }

        //(A) find the shoreline in parallel, then update the colour map
        let shore = shoreline(input, output.view(), water_level);

        //(B) Colour the pixels, or raise the water level if there are none
        if shore.is_empty() {
          break 'colouring_loop;
        }
        shore.into_iter().for_each(|(idx, col)| output[idx] = col);
      }
    }

    #[cfg(feature = "debug")]
    log::debug!("watershed: {} lakes after {passes} colouring passes", seeds.len());

    output
  }
}

fn shoreline(
  img: nd::ArrayView2<u8>,
  cols: nd::ArrayView2<usize>,
  lvl: u8,
) -> Vec<((usize, usize), usize)> {
  let shape = img.dim();

  //A pixel is coloured when it is under water, not coloured yet and touches
  //a lake. It joins the lowest touching lake, smallest colour first.
  nd::Zip::indexed(img)
    .and(cols)
    .into_par_iter()
    //(1) under water
    .filter(|&(_idx, &px, _col)| px <= lvl)
    //(2) not yet part of a lake
    .filter(|&(_idx, _px, &col)| col == UNCOLOURED)
    //(3) pick a lake
    .filter_map(|(idx, _px, _col)| {
      neighbours_8con(idx, shape)
        .filter(|&neighbour| cols[neighbour] != UNCOLOURED)
        .min_by_key(|&neighbour| (img[neighbour], cols[neighbour]))
        .map(|neighbour| (idx, cols[neighbour]))
    })
    .collect()
}
