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

//! Automatic and manual thresholds that separate objects from background.
//!
//! A threshold method consists of an *algorithm* (how a cutoff is computed from
//! a set of pixel intensities) and a *scope* (which set of pixels the algorithm
//! is applied to). Algorithms implement the [`ThresholdStrategy`] trait, which
//! is dyn-safe so that the scope logic can work with any of them.
//!
//! Every automatic threshold is multiplied by a correction factor and then
//! clamped to the `[lower, upper]` bounds of the [`Thresholder`].

use std::{fmt, str::FromStr};

use ndarray as nd;
use rayon::prelude::*;

use crate::{
  error::{IdentifyError, Result},
  labels::{LabelImage, BACKGROUND},
};

//Number of bins used by the histogram-based algorithms
const BINS: usize = 256;

//Default block size of adaptive thresholds, in pixels
pub const DEFAULT_ADAPTIVE_WINDOW: usize = 50;

//Default (expected) fraction of the image covered by objects
pub const DEFAULT_OBJECT_FRACTION: f64 = 0.01;

////////////////////////////////////////////////////////////////////////////////
//                              METHOD SELECTION                              //
////////////////////////////////////////////////////////////////////////////////

/// Algorithm used to compute an automatic threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThresholdAlgorithm {
  Otsu,
  MixtureOfGaussians,
  Background,
  RobustBackground,
  RidlerCalvard,
  Kapur,
}

/// Set of pixels an automatic threshold is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThresholdScope {
  /// One threshold for the whole image
  Global,
  /// One threshold per block of pixels, interpolated between blocks
  Adaptive,
  /// One threshold per parent object
  PerObject,
}

/// How the threshold of an image is chosen.
///
/// `ThresholdMethod` implements `FromStr` and `Display`. Automatic methods are
/// named `"<algorithm> <scope>"`, for instance `"Otsu Global"` or
/// `"MoG Adaptive"`. A number in `[0, 1]` is parsed as a manual threshold, and
/// `"Set interactively"` selects the interactive method.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThresholdMethod {
  Automatic { algorithm: ThresholdAlgorithm, scope: ThresholdScope },
  Manual(f64),
  /// Threshold picked by a user. Not available in headless pipelines.
  Interactive,
}

impl ThresholdAlgorithm {
  pub const ALL: [ThresholdAlgorithm; 6] = [
    Self::Otsu,
    Self::MixtureOfGaussians,
    Self::Background,
    Self::RobustBackground,
    Self::RidlerCalvard,
    Self::Kapur,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Self::Otsu => "Otsu",
      Self::MixtureOfGaussians => "MoG",
      Self::Background => "Background",
      Self::RobustBackground => "RobustBackground",
      Self::RidlerCalvard => "RidlerCalvard",
      Self::Kapur => "Kapur",
    }
  }

  /// Returns the strategy object implementing this algorithm. `object_fraction`
  /// is only used by the mixture of Gaussians algorithm.
  pub fn strategy(self, object_fraction: f64) -> Box<dyn ThresholdStrategy + Send + Sync> {
    match self {
      Self::Otsu => Box::new(Otsu),
      Self::MixtureOfGaussians => Box::new(MixtureOfGaussians { object_fraction }),
      Self::Background => Box::new(Background),
      Self::RobustBackground => Box::new(RobustBackground),
      Self::RidlerCalvard => Box::new(RidlerCalvard),
      Self::Kapur => Box::new(Kapur),
    }
  }
}

impl ThresholdScope {
  pub const ALL: [ThresholdScope; 3] = [Self::Global, Self::Adaptive, Self::PerObject];

  pub fn name(self) -> &'static str {
    match self {
      Self::Global => "Global",
      Self::Adaptive => "Adaptive",
      Self::PerObject => "PerObject",
    }
  }
}

impl ThresholdMethod {
  pub const INTERACTIVE_NAME: &'static str = "Set interactively";

  pub fn automatic(algorithm: ThresholdAlgorithm, scope: ThresholdScope) -> Self {
    Self::Automatic { algorithm, scope }
  }

  pub fn is_automatic(&self) -> bool {
    matches!(self, Self::Automatic { .. })
  }

  /// Scope of an automatic method, `None` for manual and interactive methods
  pub fn scope(&self) -> Option<ThresholdScope> {
    match self {
      Self::Automatic { scope, .. } => Some(*scope),
      _ => None,
    }
  }
}

impl Default for ThresholdMethod {
  fn default() -> Self {
    Self::automatic(ThresholdAlgorithm::Otsu, ThresholdScope::Global)
  }
}

impl fmt::Display for ThresholdMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Automatic { algorithm, scope } => write!(f, "{} {}", algorithm.name(), scope.name()),
      Self::Manual(value) => write!(f, "{value}"),
      Self::Interactive => write!(f, "{}", Self::INTERACTIVE_NAME),
    }
  }
}

impl FromStr for ThresholdMethod {
  type Err = IdentifyError;

  fn from_str(s: &str) -> Result<Self> {
    let name = s.trim();
    if name == Self::INTERACTIVE_NAME {
      return Ok(Self::Interactive);
    }

    //Automatic methods are matched on their full name
    let automatic = ThresholdAlgorithm::ALL
      .into_iter()
      .flat_map(|algorithm| ThresholdScope::ALL.into_iter().map(move |scope| (algorithm, scope)))
      .find(|(algorithm, scope)| name == format!("{} {}", algorithm.name(), scope.name()));
    if let Some((algorithm, scope)) = automatic {
      return Ok(Self::Automatic { algorithm, scope });
    }

    match name.parse::<f64>() {
      Ok(value) if (0.0..=1.0).contains(&value) => Ok(Self::Manual(value)),
      _ => Err(IdentifyError::UnknownThresholdMethod(s.to_string())),
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//                              THRESHOLD RESULT                              //
////////////////////////////////////////////////////////////////////////////////

/// A computed threshold: either one value for the whole image, or one value per
/// pixel (adaptive and per-object scopes).
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
  Global(f64),
  PerPixel(nd::Array2<f64>),
}

impl Threshold {
  /// Threshold that applies to the pixel at `index`
  #[inline]
  pub fn at(&self, index: (usize, usize)) -> f64 {
    match self {
      Self::Global(value) => *value,
      Self::PerPixel(values) => values[index],
    }
  }

  pub fn as_global(&self) -> Option<f64> {
    match self {
      Self::Global(value) => Some(*value),
      Self::PerPixel(_) => None,
    }
  }

  /// Single number summarizing the threshold. This is the threshold itself for
  /// global thresholds and the mean over all valid pixels otherwise.
  pub fn summary(&self, mask: Option<nd::ArrayView2<bool>>) -> f64 {
    match self {
      Self::Global(value) => *value,
      Self::PerPixel(values) => {
        let (sum, count) = match mask {
          Some(mask) => values
            .iter()
            .zip(mask.iter())
            .filter(|(_, &valid)| valid)
            .fold((0.0, 0usize), |(sum, n), (&t, _)| (sum + t, n + 1)),
          None => (values.sum(), values.len()),
        };
        sum / count as f64
      }
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//                               THRESHOLDER                                  //
////////////////////////////////////////////////////////////////////////////////

/// Computes thresholds for images, given a method, a correction factor and
/// bounds.
///
/// The configuration is validated once by [`Thresholder::new`]:
/// ```
/// use rustronomy_identify::prelude::*;
///
/// //Lower bound larger than upper bound
/// let result = Thresholder::new(ThresholdMethod::default(), 1.0, 0.8, 0.2);
/// assert!(matches!(result, Err(IdentifyError::InvalidRange { .. })));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholder {
  method: ThresholdMethod,
  correction_factor: f64,
  lower: f64,
  upper: f64,
  object_fraction: f64,
  adaptive_window: usize,
}

impl Thresholder {
  pub fn new(
    method: ThresholdMethod,
    correction_factor: f64,
    lower: f64,
    upper: f64,
  ) -> Result<Self> {
    //NaN bounds fail this check as well
    if !(lower <= upper) {
      return Err(IdentifyError::InvalidRange { lower, upper });
    }
    if !(correction_factor.is_finite() && correction_factor > 0.0) {
      return Err(IdentifyError::InvalidConfig(format!(
        "threshold correction factor must be a positive number, found {correction_factor}"
      )));
    }
    match method {
      ThresholdMethod::Interactive => Err(IdentifyError::InvalidConfig(
        "interactive thresholds cannot be used without a user interface".to_string(),
      )),
      ThresholdMethod::Manual(value) if !value.is_finite() => {
        Err(IdentifyError::InvalidConfig(format!("manual threshold {value} is not a number")))
      }
      _ => Ok(Thresholder {
        method,
        correction_factor,
        lower,
        upper,
        object_fraction: DEFAULT_OBJECT_FRACTION,
        adaptive_window: DEFAULT_ADAPTIVE_WINDOW,
      }),
    }
  }

  /// Sets the expected fraction of the image covered by objects (used by the
  /// mixture of Gaussians algorithm). Must lie in the open interval `(0, 1)`.
  pub fn with_object_fraction(mut self, object_fraction: f64) -> Result<Self> {
    if !(object_fraction > 0.0 && object_fraction < 1.0) {
      return Err(IdentifyError::InvalidConfig(format!(
        "object fraction must lie between 0 and 1, found {object_fraction}"
      )));
    }
    self.object_fraction = object_fraction;
    Ok(self)
  }

  /// Sets the block size used by adaptive thresholds. Blocks must be at least
  /// 3 pixels wide.
  pub fn with_adaptive_window(mut self, window: usize) -> Result<Self> {
    if window < 3 {
      return Err(IdentifyError::InvalidConfig(format!(
        "adaptive window must be at least 3 pixels, found {window}"
      )));
    }
    self.adaptive_window = window;
    Ok(self)
  }

  pub fn method(&self) -> ThresholdMethod {
    self.method
  }

  pub fn bounds(&self) -> (f64, f64) {
    (self.lower, self.upper)
  }

  /// Applies the correction factor and the bounds to a raw threshold
  #[inline]
  fn correct(&self, raw: f64) -> f64 {
    if raw.is_nan() {
      self.lower
    } else {
      (raw * self.correction_factor).clamp(self.lower, self.upper)
    }
  }

  /// Computes the threshold of `image`. Only pixels for which `mask` is `true`
  /// are taken into account. Per-object thresholds need the label image of the
  /// parent objects.
  ///
  /// Fails with `DegenerateImage` if the mask does not contain any valid
  /// pixels.
  pub fn compute(
    &self,
    image: nd::ArrayView2<f64>,
    mask: Option<nd::ArrayView2<bool>>,
    parents: Option<&LabelImage>,
  ) -> Result<Threshold> {
    if let Some(mask) = mask {
      crate::check_shape(image.dim(), mask.dim())?;
    }
    let mut samples = masked_samples(image, mask);
    if samples.is_empty() {
      return Err(IdentifyError::DegenerateImage(
        "the image mask does not contain any valid pixels",
      ));
    }

    let (algorithm, scope) = match self.method {
      //Manual thresholds are used as given
      ThresholdMethod::Manual(value) => {
        return Ok(Threshold::Global(value.clamp(self.lower, self.upper)))
      }
      ThresholdMethod::Interactive => {
        return Err(IdentifyError::InvalidConfig(
          "interactive thresholds cannot be used without a user interface".to_string(),
        ))
      }
      ThresholdMethod::Automatic { algorithm, scope } => (algorithm, scope),
    };

    //An image without contrast has nothing to separate
    let (min, max) = min_max(&samples);
    if !(max > min) {
      return Err(IdentifyError::DegenerateImage("all valid pixels have the same intensity"));
    }

    let strategy = algorithm.strategy(self.object_fraction);
    match scope {
      ThresholdScope::Global => {
        Ok(Threshold::Global(self.correct(strategy.threshold(&mut samples))))
      }
      ThresholdScope::Adaptive => {
        let global = strategy.threshold(&mut samples);
        Ok(Threshold::PerPixel(self.adaptive(image, mask, strategy.as_ref(), global)))
      }
      ThresholdScope::PerObject => {
        let parents = parents.ok_or_else(|| {
          IdentifyError::InvalidConfig("per-object thresholds need a parent object set".to_string())
        })?;
        crate::check_shape(image.dim(), parents.shape())?;
        Ok(Threshold::PerPixel(self.per_object(image, mask, parents, strategy.as_ref())))
      }
    }
  }

  fn adaptive(
    &self,
    image: nd::ArrayView2<f64>,
    mask: Option<nd::ArrayView2<bool>>,
    strategy: &(dyn ThresholdStrategy + Send + Sync),
    global: f64,
  ) -> nd::Array2<f64> {
    let (rows, cols) = image.dim();
    let window = self.adaptive_window;
    let block_shape = (rows.div_ceil(window).max(1), cols.div_ceil(window).max(1));

    //(1) Threshold every block on its own, limited to a range around the
    //global threshold
    let mut blocks = nd::Array2::<f64>::zeros(block_shape);
    nd::Zip::indexed(&mut blocks).par_for_each(|(br, bc), block_threshold| {
      let row_range = br * window..((br + 1) * window).min(rows);
      let col_range = bc * window..((bc + 1) * window).min(cols);
      let block = image.slice(nd::s![row_range.clone(), col_range.clone()]);
      let block_mask = mask.map(|mask| mask.slice_move(nd::s![row_range, col_range]));
      let mut samples = masked_samples(block, block_mask);
      *block_threshold = if samples.len() < 3 {
        global
      } else {
        strategy.threshold(&mut samples).max(0.7 * global).min(1.5 * global)
      };
    });

    //(2) Interpolate bilinearly between the block centres
    let row_centres = block_centres(rows, window, block_shape.0);
    let col_centres = block_centres(cols, window, block_shape.1);
    let mut thresholds = nd::Array2::<f64>::zeros((rows, cols));
    nd::Zip::indexed(&mut thresholds).par_for_each(|(row, col), threshold| {
      let (r0, r1, fr) = interpolation_weights(&row_centres, row as f64);
      let (c0, c1, fc) = interpolation_weights(&col_centres, col as f64);
      let raw = (1.0 - fr) * (1.0 - fc) * blocks[(r0, c0)]
        + (1.0 - fr) * fc * blocks[(r0, c1)]
        + fr * (1.0 - fc) * blocks[(r1, c0)]
        + fr * fc * blocks[(r1, c1)];
      *threshold = self.correct(raw);
    });
    thresholds
  }

  fn per_object(
    &self,
    image: nd::ArrayView2<f64>,
    mask: Option<nd::ArrayView2<bool>>,
    parents: &LabelImage,
    strategy: &(dyn ThresholdStrategy + Send + Sync),
  ) -> nd::Array2<f64> {
    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); parents.count() + 1];
    for (idx, &label) in parents.view().indexed_iter() {
      if label != BACKGROUND && mask.map_or(true, |mask| mask[idx]) {
        samples[label].push(image[idx]);
      }
    }

    //Pixels outside every parent get the upper bound
    let per_label: Vec<f64> = samples
      .into_par_iter()
      .enumerate()
      .map(|(label, mut samples)| {
        if label == BACKGROUND || samples.is_empty() {
          self.upper
        } else {
          self.correct(strategy.threshold(&mut samples))
        }
      })
      .collect();
    parents.view().mapv(|label| per_label[label])
  }
}

/// Computes the threshold of an image in one go. See [`Thresholder`] for the
/// meaning of the arguments. Per-object thresholds are not available through
/// this function, since they need a set of parent objects.
pub fn compute_threshold(
  image: nd::ArrayView2<f64>,
  mask: Option<nd::ArrayView2<bool>>,
  method: ThresholdMethod,
  correction_factor: f64,
  lower: f64,
  upper: f64,
) -> Result<Threshold> {
  Thresholder::new(method, correction_factor, lower, upper)?.compute(image, mask, None)
}

fn masked_samples(image: nd::ArrayView2<f64>, mask: Option<nd::ArrayView2<bool>>) -> Vec<f64> {
  match mask {
    Some(mask) => {
      image.iter().zip(mask.iter()).filter(|(_, &valid)| valid).map(|(&px, _)| px).collect()
    }
    None => image.iter().copied().collect(),
  }
}

fn block_centres(len: usize, window: usize, blocks: usize) -> Vec<f64> {
  (0..blocks)
    .map(|block| {
      let start = block * window;
      let end = ((block + 1) * window).min(len);
      (start + end - 1) as f64 / 2.0
    })
    .collect()
}

/// Indices of the two centres surrounding `x` and the weight of the second one
fn interpolation_weights(centres: &[f64], x: f64) -> (usize, usize, f64) {
  let last = centres.len() - 1;
  if x <= centres[0] {
    return (0, 0, 0.0);
  }
  if x >= centres[last] {
    return (last, last, 0.0);
  }
  let upper = centres.partition_point(|&centre| centre <= x);
  let lower = upper - 1;
  (lower, upper, (x - centres[lower]) / (centres[upper] - centres[lower]))
}

////////////////////////////////////////////////////////////////////////////////
//                                ALGORITHMS                                  //
////////////////////////////////////////////////////////////////////////////////

/// An algorithm that computes a single threshold from a set of intensities.
/// This trait is dyn-safe.
pub trait ThresholdStrategy {
  /// Computes a threshold from the intensities of the valid pixels. `samples`
  /// is never empty. Implementations are free to reorder it.
  fn threshold(&self, samples: &mut [f64]) -> f64;
}

/// Otsu's method on log-transformed intensities: maximizes the between-class
/// variance of background and foreground.
#[derive(Debug, Clone, Copy, Default)]
pub struct Otsu;

/// Kapur's method on log-transformed intensities: maximizes the sum of the
/// entropies of background and foreground.
#[derive(Debug, Clone, Copy, Default)]
pub struct Kapur;

/// Fits three Gaussians (background, intermediate and objects) to the
/// intensity distribution.
#[derive(Debug, Clone, Copy)]
pub struct MixtureOfGaussians {
  pub object_fraction: f64,
}

/// Twice the mode of the intensity distribution. Suited for images in which
/// most of the pixels are background.
#[derive(Debug, Clone, Copy, Default)]
pub struct Background;

/// Mean plus two standard deviations of the intensities, after discarding the
/// 5% lowest and highest values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RobustBackground;

/// Iterative intermeans: the threshold is moved to the average of the mean
/// background and the mean foreground intensity until it no longer changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RidlerCalvard;

impl ThresholdStrategy for Otsu {
  fn threshold(&self, samples: &mut [f64]) -> f64 {
    match LogHistogram::new(samples) {
      Some(histogram) => histogram.otsu(),
      None => samples[0],
    }
  }
}

impl ThresholdStrategy for Kapur {
  fn threshold(&self, samples: &mut [f64]) -> f64 {
    match LogHistogram::new(samples) {
      Some(histogram) => histogram.kapur(),
      None => samples[0],
    }
  }
}

impl ThresholdStrategy for MixtureOfGaussians {
  fn threshold(&self, samples: &mut [f64]) -> f64 {
    const MAX_SAMPLES: usize = 512 * 512;
    const MAX_ITER: usize = 100;
    const MIN_STD: f64 = 1e-4;
    const GRID: usize = 10_000;

    //(1) Subsample big images, then drop the 1% lowest and highest values
    let step = samples.len().div_ceil(MAX_SAMPLES).max(1);
    let mut data: Vec<f64> = samples.iter().step_by(step).copied().collect();
    data.sort_unstable_by(f64::total_cmp);
    let trim = data.len() / 100;
    let data = &data[trim..data.len() - trim];
    let (min, max) = (data[0], data[data.len() - 1]);
    if !(max > min) {
      return min;
    }

    //(2) Initial guess: background below, objects above the expected fraction
    let f = self.object_fraction;
    let quantile = |q: f64| data[((data.len() - 1) as f64 * q).round() as usize];
    let mut means = [quantile((1.0 - f) / 2.0), 0.0, quantile(1.0 - f / 2.0)];
    means[1] = (means[0] + means[2]) / 2.0;
    let mut stds = [(max - min) / 6.0; 3];
    let mut priors = [0.75 * (1.0 - f), 0.25, 0.75 * f];
    let norm: f64 = priors.iter().sum();
    priors.iter_mut().for_each(|p| *p /= norm);

    //(3) Expectation maximization
    for _ in 0..MAX_ITER {
      let mut weight = [0.0f64; 3];
      let mut first = [0.0f64; 3];
      let mut second = [0.0f64; 3];
      for &x in data {
        let likelihoods = [0, 1, 2].map(|k| priors[k] * gaussian(x, means[k], stds[k]));
        let total: f64 = likelihoods.iter().sum();
        if total <= 0.0 {
          continue;
        }
        for k in 0..3 {
          let responsibility = likelihoods[k] / total;
          weight[k] += responsibility;
          first[k] += responsibility * x;
          second[k] += responsibility * x * x;
        }
      }

      let mut shift = 0.0f64;
      for k in 0..3 {
        if weight[k] <= 0.0 {
          continue;
        }
        let mean = first[k] / weight[k];
        let variance = (second[k] / weight[k] - mean * mean).max(0.0);
        shift = shift.max((mean - means[k]).abs());
        means[k] = mean;
        stds[k] = variance.sqrt().max(MIN_STD);
        priors[k] = weight[k] / data.len() as f64;
      }
      if shift < 1e-6 * (max - min) {
        break;
      }
    }

    //(4) First intensity at which the object class wins
    (0..GRID)
      .map(|step| min + (max - min) * step as f64 / (GRID - 1) as f64)
      .find(|&x| {
        let [bg, mid, obj] = [0, 1, 2].map(|k| priors[k] * gaussian(x, means[k], stds[k]));
        obj > bg + mid
      })
      .unwrap_or(max)
  }
}

impl ThresholdStrategy for Background {
  fn threshold(&self, samples: &mut [f64]) -> f64 {
    //Ignore (nearly) saturated pixels, unless that leaves nothing
    let unsaturated: Vec<f64> = samples.iter().copied().filter(|&x| x < 0.95).collect();
    let data: &[f64] = if unsaturated.is_empty() { samples } else { &unsaturated };

    let (min, max) = min_max(data);
    if !(max > min) {
      return 2.0 * min;
    }
    let width = (max - min) / BINS as f64;
    let mut counts = [0usize; BINS];
    data.iter().for_each(|&x| counts[(((x - min) / width) as usize).min(BINS - 1)] += 1);

    //First bin with the highest count
    let mode_bin = counts
      .iter()
      .enumerate()
      .fold((0, 0), |best, (bin, &count)| if count > best.1 { (bin, count) } else { best })
      .0;
    2.0 * (min + (mode_bin as f64 + 0.5) * width)
  }
}

impl ThresholdStrategy for RobustBackground {
  fn threshold(&self, samples: &mut [f64]) -> f64 {
    samples.sort_unstable_by(f64::total_cmp);
    let trim = samples.len() * 5 / 100;
    let kept = &samples[trim..samples.len() - trim];
    let n = kept.len() as f64;
    let mean = kept.iter().sum::<f64>() / n;
    let variance = kept.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
    mean + 2.0 * variance.sqrt()
  }
}

impl ThresholdStrategy for RidlerCalvard {
  fn threshold(&self, samples: &mut [f64]) -> f64 {
    const MAX_ITER: usize = 100;
    let (min, max) = min_max(samples);
    let tolerance = 1e-6 * (max - min);
    let mut threshold = samples.iter().sum::<f64>() / samples.len() as f64;

    for _ in 0..MAX_ITER {
      let (mut low, mut n_low, mut high, mut n_high) = (0.0, 0usize, 0.0, 0usize);
      for &x in samples.iter() {
        if x <= threshold {
          low += x;
          n_low += 1;
        } else {
          high += x;
          n_high += 1;
        }
      }
      if n_low == 0 || n_high == 0 {
        break;
      }
      let next = (low / n_low as f64 + high / n_high as f64) / 2.0;
      let change = (next - threshold).abs();
      threshold = next;
      if change <= tolerance {
        break;
      }
    }
    threshold
  }
}

#[inline]
fn gaussian(x: f64, mean: f64, std: f64) -> f64 {
  let z = (x - mean) / std;
  (-0.5 * z * z).exp() / (std * (2.0 * std::f64::consts::PI).sqrt())
}

fn min_max(samples: &[f64]) -> (f64, f64) {
  samples
    .iter()
    .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &x| (min.min(x), max.max(x)))
}

/// 256-bin histogram of `log2` intensities. Intensities are first raised to a
/// noise floor just above the minimum, so that (near) zero pixels do not
/// stretch the logarithmic scale.
struct LogHistogram {
  counts: [f64; BINS],
  lo: f64,
  width: f64,
}

impl LogHistogram {
  /// Returns `None` if all samples (nearly) have the same value
  fn new(samples: &[f64]) -> Option<Self> {
    let (min, max) = min_max(samples);
    let noise_min = (min + (max - min) / BINS as f64 + f64::EPSILON).max(f64::MIN_POSITIVE);
    let (lo, hi) = (noise_min.log2(), max.log2());
    if !(hi > lo) {
      return None;
    }

    let width = (hi - lo) / BINS as f64;
    let mut counts = [0.0; BINS];
    for &x in samples {
      let bin = ((x.max(noise_min).log2() - lo) / width) as usize;
      counts[bin.min(BINS - 1)] += 1.0;
    }
    Some(LogHistogram { counts, lo, width })
  }

  /// Intensity at the upper edge of `bin`
  fn upper_edge(&self, bin: usize) -> f64 {
    (self.lo + (bin + 1) as f64 * self.width).exp2()
  }

  fn otsu(&self) -> f64 {
    let total: f64 = self.counts.iter().sum();
    let total_moment: f64 = self.counts.iter().enumerate().map(|(bin, &n)| bin as f64 * n).sum();
    let (mut weight, mut moment) = (0.0, 0.0);
    let mut best = (f64::NEG_INFINITY, 0);

    for bin in 0..BINS - 1 {
      weight += self.counts[bin];
      moment += bin as f64 * self.counts[bin];
      let other = total - weight;
      if weight == 0.0 || other == 0.0 {
        continue;
      }
      let mean_diff = moment / weight - (total_moment - moment) / other;
      let variance = weight * other * mean_diff * mean_diff;
      //First maximum wins
      if variance > best.0 {
        best = (variance, bin);
      }
    }
    self.upper_edge(best.1)
  }

  fn kapur(&self) -> f64 {
    let total: f64 = self.counts.iter().sum();
    let p: Vec<f64> = self.counts.iter().map(|&n| n / total).collect();
    let p_log_p: Vec<f64> = p.iter().map(|&p| if p > 0.0 { p * p.ln() } else { 0.0 }).collect();
    let total_p_log_p: f64 = p_log_p.iter().sum();
    let (mut weight, mut partial) = (0.0, 0.0);
    let mut best = (f64::NEG_INFINITY, 0);

    for bin in 0..BINS - 1 {
      weight += p[bin];
      partial += p_log_p[bin];
      let other = 1.0 - weight;
      if weight <= 0.0 || other <= 1e-12 {
        continue;
      }
      //H = ln(P) - sum(p ln p) / P for both classes
      let entropy =
        weight.ln() - partial / weight + other.ln() - (total_p_log_p - partial) / other;
      if entropy > best.0 {
        best = (entropy, bin);
      }
    }
    self.upper_edge(best.1)
  }
}
