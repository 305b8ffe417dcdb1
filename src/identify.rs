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

//! The primary object identification module.
//!
//! `IdentifyPrimaryObjects` chains the thresholder, the segmenter, hole
//! filling, the declumper and the object filter, and writes the objects it
//! finds and their measurements to the [`Workspace`] of a pipeline cycle.

use ndarray as nd;
use rayon::prelude::*;

use crate::{
  declump::{BoundaryMethod, Declumper, MarkerMethod},
  error::{IdentifyError, Result},
  filter::{ObjectFate, ObjectFilter},
  image::{Image, ImageSet},
  labels::{LabelImage, BACKGROUND},
  measurements::CycleMeasurements,
  objects::{ObjectSet, Objects},
  segment::segment,
  threshold::{
    Threshold, ThresholdMethod, ThresholdScope, Thresholder, DEFAULT_ADAPTIVE_WINDOW,
    DEFAULT_OBJECT_FRACTION,
  },
};

/// Version of the configuration layout
pub const CONFIG_VERSION: u32 = 1;

////////////////////////////////////////////////////////////////////////////////
//                                 WORKSPACE                                  //
////////////////////////////////////////////////////////////////////////////////

/// Everything a module can read from and write to during one pipeline cycle
#[derive(Debug, Clone, Default)]
pub struct Workspace {
  pub image_set: ImageSet,
  pub object_set: ObjectSet,
  pub measurements: CycleMeasurements,
}

impl Workspace {
  pub fn new(cycle: usize) -> Self {
    Workspace {
      image_set: ImageSet::new(),
      object_set: ObjectSet::new(),
      measurements: CycleMeasurements::new(cycle),
    }
  }

  pub fn cycle(&self) -> usize {
    self.measurements.cycle()
  }
}

////////////////////////////////////////////////////////////////////////////////
//                               CONFIGURATION                                //
////////////////////////////////////////////////////////////////////////////////

/// Settings of the identification module.
///
/// Use [`IdentifyBuilder`] to construct a module from these settings; the
/// builder validates them exactly once.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentifyConfig {
  pub version: u32,
  /// Name of the input image
  pub image_name: String,
  /// Name under which the objects are stored
  pub object_name: String,
  /// Smallest and largest allowed equivalent diameter, in pixels
  pub size_range: (usize, usize),
  /// Discard objects outside of the size range
  pub exclude_size: bool,
  /// Merge objects below the size range into their neighbours
  pub merge_objects: bool,
  /// Discard objects touching the border of the image
  pub exclude_border_objects: bool,
  pub threshold_method: ThresholdMethod,
  pub threshold_correction_factor: f64,
  /// Lower and upper bound of the threshold
  pub threshold_range: (f64, f64),
  /// Expected fraction of the image covered by objects (mixture of gaussians)
  pub object_fraction: f64,
  /// Block size of adaptive thresholds, in pixels
  pub adaptive_window: usize,
  /// Objects used by per-object thresholds
  pub parent_objects: Option<String>,
  pub unclump_method: MarkerMethod,
  pub watershed_method: BoundaryMethod,
  /// Smoothing filter size, derived from the minimum diameter if `None`
  pub smoothing_filter_size: Option<f64>,
  /// Maxima suppression distance, derived from the minimum diameter if `None`
  pub maxima_suppression_size: Option<f64>,
  pub low_res_maxima: bool,
  pub fill_holes: bool,
  /// Name of the outline image, no outlines are stored if `None`
  pub outlines_name: Option<String>,
}

impl IdentifyConfig {
  /// Default settings for identifying `object_name` in `image_name`
  pub fn new(image_name: impl Into<String>, object_name: impl Into<String>) -> Self {
    IdentifyConfig {
      version: CONFIG_VERSION,
      image_name: image_name.into(),
      object_name: object_name.into(),
      size_range: (10, 40),
      exclude_size: true,
      merge_objects: false,
      exclude_border_objects: true,
      threshold_method: ThresholdMethod::default(),
      threshold_correction_factor: 1.0,
      threshold_range: (0.0, 1.0),
      object_fraction: DEFAULT_OBJECT_FRACTION,
      adaptive_window: DEFAULT_ADAPTIVE_WINDOW,
      parent_objects: None,
      unclump_method: MarkerMethod::Intensity,
      watershed_method: BoundaryMethod::Intensity,
      smoothing_filter_size: None,
      maxima_suppression_size: None,
      low_res_maxima: true,
      fill_holes: true,
      outlines_name: None,
    }
  }

  /// Checks the settings. Returns the first problem found.
  pub fn validate(&self) -> Result<()> {
    self.components().map(|_| ())
  }

  fn components(&self) -> Result<(Thresholder, Declumper, ObjectFilter)> {
    if self.version != CONFIG_VERSION {
      return Err(IdentifyError::UnsupportedVersion {
        found: self.version,
        expected: CONFIG_VERSION,
      });
    }

    //(1) Thresholder
    let (lower, upper) = self.threshold_range;
    if lower > upper {
      return Err(IdentifyError::InvalidRange { lower, upper });
    }
    if !(lower >= 0.0 && upper <= 1.0) {
      return Err(IdentifyError::InvalidConfig(format!(
        "threshold bounds ({lower}, {upper}) do not lie within [0, 1]"
      )));
    }
    match self.threshold_method {
      ThresholdMethod::Manual(value) if !(0.0..=1.0).contains(&value) => {
        return Err(IdentifyError::InvalidConfig(format!(
          "manual threshold {value} does not lie within [0, 1]"
        )))
      }
      ThresholdMethod::Automatic { scope: ThresholdScope::PerObject, .. }
        if self.parent_objects.is_none() =>
      {
        return Err(IdentifyError::InvalidConfig(
          "per-object thresholds need the name of the parent objects".to_string(),
        ))
      }
      _ => {}
    }
    let thresholder =
      Thresholder::new(self.threshold_method, self.threshold_correction_factor, lower, upper)?
        .with_object_fraction(self.object_fraction)?
        .with_adaptive_window(self.adaptive_window)?;

    //(2) Declumper
    let mut declumper = Declumper::for_diameter(
      self.unclump_method,
      self.watershed_method,
      self.size_range.0 as f64,
    )
    .with_low_res_maxima(self.low_res_maxima);
    if let Some(size) = self.smoothing_filter_size {
      declumper = declumper.with_smoothing_size(size)?;
    }
    if let Some(distance) = self.maxima_suppression_size {
      declumper = declumper.with_maxima_suppression_distance(distance)?;
    }

    //(3) Object filter
    let filter = ObjectFilter::new(self.size_range)?
      .with_exclude_outside_range(self.exclude_size)
      .with_exclude_border(self.exclude_border_objects)
      .with_merge_small(self.merge_objects);

    Ok((thresholder, declumper, filter))
  }
}

#[derive(Debug, Clone)]
/// Builder for configuring the identification module.
///
/// Use the `new()` associated function to start from the default settings,
/// change them with the `set_*` methods, then call `build()` to validate the
/// settings and create the module. Enabling the `plots` feature gate adds a
/// `set_plot_folder` method; if a folder is set, the objects found in every
/// cycle are plotted to that folder.
pub struct IdentifyBuilder {
  config: IdentifyConfig,
  #[cfg(feature = "plots")]
  plot_path: Option<std::path::PathBuf>,
}

impl IdentifyBuilder {
  /// creates a new `IdentifyBuilder` with default settings
  pub fn new(image_name: impl Into<String>, object_name: impl Into<String>) -> Self {
    Self::from_config(IdentifyConfig::new(image_name, object_name))
  }

  /// creates a new `IdentifyBuilder` from (for instance deserialized) settings
  pub fn from_config(config: IdentifyConfig) -> Self {
    IdentifyBuilder {
      config,
      #[cfg(feature = "plots")]
      plot_path: None,
    }
  }

  /// Set the smallest and largest equivalent diameter of an object, in pixels
  pub fn set_size_range(mut self, min: usize, max: usize) -> Self {
    self.config.size_range = (min, max);
    self
  }

  pub fn set_exclude_size(mut self, exclude: bool) -> Self {
    self.config.exclude_size = exclude;
    self
  }

  pub fn set_merge_objects(mut self, merge: bool) -> Self {
    self.config.merge_objects = merge;
    self
  }

  pub fn set_exclude_border_objects(mut self, exclude: bool) -> Self {
    self.config.exclude_border_objects = exclude;
    self
  }

  pub fn set_threshold_method(mut self, method: ThresholdMethod) -> Self {
    self.config.threshold_method = method;
    self
  }

  pub fn set_threshold_correction_factor(mut self, factor: f64) -> Self {
    self.config.threshold_correction_factor = factor;
    self
  }

  pub fn set_threshold_range(mut self, lower: f64, upper: f64) -> Self {
    self.config.threshold_range = (lower, upper);
    self
  }

  pub fn set_object_fraction(mut self, fraction: f64) -> Self {
    self.config.object_fraction = fraction;
    self
  }

  pub fn set_adaptive_window(mut self, window: usize) -> Self {
    self.config.adaptive_window = window;
    self
  }

  /// Set the objects that per-object thresholds are computed for
  pub fn set_parent_objects(mut self, name: impl Into<String>) -> Self {
    self.config.parent_objects = Some(name.into());
    self
  }

  pub fn set_unclump_method(mut self, method: MarkerMethod) -> Self {
    self.config.unclump_method = method;
    self
  }

  pub fn set_watershed_method(mut self, method: BoundaryMethod) -> Self {
    self.config.watershed_method = method;
    self
  }

  /// Override the automatically calculated smoothing filter size
  pub fn set_smoothing_filter_size(mut self, size: f64) -> Self {
    self.config.smoothing_filter_size = Some(size);
    self
  }

  /// Override the automatically calculated maxima suppression distance
  pub fn set_maxima_suppression_size(mut self, size: f64) -> Self {
    self.config.maxima_suppression_size = Some(size);
    self
  }

  pub fn set_low_res_maxima(mut self, low_res: bool) -> Self {
    self.config.low_res_maxima = low_res;
    self
  }

  pub fn set_fill_holes(mut self, fill: bool) -> Self {
    self.config.fill_holes = fill;
    self
  }

  /// Store the outlines of the objects as an image called `name`
  pub fn set_outlines_name(mut self, name: impl Into<String>) -> Self {
    self.config.outlines_name = Some(name.into());
    self
  }

  #[cfg(feature = "plots")]
  /// Set output folder for the images generated for every cycle. If no output
  /// folder is specified, no images will be generated, even with the `plots`
  /// feature gate enabled.
  pub fn set_plot_folder(mut self, path: &std::path::Path) -> Self {
    self.plot_path = Some(path.to_path_buf());
    self
  }

  /// Validate the settings and build the module. This function returns an
  /// `Err` result if the builder was not properly configured.
  pub fn build(self) -> Result<IdentifyPrimaryObjects> {
    let (thresholder, declumper, filter) = self.config.components()?;
    Ok(IdentifyPrimaryObjects {
      config: self.config,
      thresholder,
      declumper,
      filter,
      #[cfg(feature = "plots")]
      plot_path: self.plot_path,
    })
  }
}

////////////////////////////////////////////////////////////////////////////////
//                               IDENTIFICATION                               //
////////////////////////////////////////////////////////////////////////////////

/// Objects identified in a single image
#[derive(Debug, Clone, PartialEq)]
pub struct Identified {
  /// Final objects
  pub labels: LabelImage,
  /// Objects before filtering
  pub unedited: LabelImage,
  /// Objects with only the too-small ones removed
  pub small_removed: LabelImage,
  /// Fate of every unedited object
  pub fates: Vec<ObjectFate>,
  pub threshold: Threshold,
  /// The threshold, or its mean over the valid pixels for per-pixel thresholds
  pub final_threshold: f64,
  /// Centres of mass of the final objects as `(x, y)` pairs
  pub centers: Vec<(f64, f64)>,
  pub outlines: nd::Array2<bool>,
}

impl Identified {
  /// Result without any objects, used for degenerate images
  fn empty(shape: (usize, usize), threshold: f64) -> Self {
    Identified {
      labels: LabelImage::empty(shape),
      unedited: LabelImage::empty(shape),
      small_removed: LabelImage::empty(shape),
      fates: Vec::new(),
      threshold: Threshold::Global(threshold),
      final_threshold: threshold,
      centers: Vec::new(),
      outlines: nd::Array2::from_elem(shape, false),
    }
  }

  pub fn count(&self) -> usize {
    self.labels.count()
  }
}

/// Identifies primary objects (typically nuclei) in an image. Use the
/// [`IdentifyBuilder`] to create one.
///
/// A module holds no state besides its configuration, so a single module can
/// process many images, also from multiple threads at once.
#[derive(Debug, Clone)]
pub struct IdentifyPrimaryObjects {
  config: IdentifyConfig,
  thresholder: Thresholder,
  declumper: Declumper,
  filter: ObjectFilter,
  #[cfg(feature = "plots")]
  plot_path: Option<std::path::PathBuf>,
}

impl IdentifyPrimaryObjects {
  pub fn config(&self) -> &IdentifyConfig {
    &self.config
  }

  /// Finds the objects in `image`. Per-object thresholds need the label image
  /// of the parent objects.
  pub fn identify(&self, image: &Image, parents: Option<&LabelImage>) -> Result<Identified> {
    let pixels = image.pixels();
    let mask = image.mask();

    //(logging) make a new perfreport
    #[cfg(feature = "debug")]
    let mut perf = crate::performance_monitoring::PerfReport::default();
    #[cfg(feature = "debug")]
    let start = std::time::Instant::now();
    #[cfg(feature = "debug")]
    let mut stage = std::time::Instant::now();

    //(1) Threshold the image
    let threshold = self.thresholder.compute(pixels, mask, parents)?;

    #[cfg(feature = "debug")]
    {
      perf.threshold_mus = stage.elapsed().as_micros() as usize;
      stage = std::time::Instant::now();
    }

    //(2) Split the foreground into connected components. With per-object
    //thresholds, pixels outside of every parent are never foreground.
    let parent_mask = match (self.config.threshold_method.scope(), parents) {
      (Some(ThresholdScope::PerObject), Some(parents)) => {
        let mut valid = image.effective_mask();
        nd::Zip::from(&mut valid).and(parents.view()).for_each(|valid, &parent| {
          *valid &= parent != BACKGROUND;
        });
        Some(valid)
      }
      _ => None,
    };
    let segment_mask = parent_mask.as_ref().map(|valid| valid.view()).or(mask);
    let (labels, count) = segment(pixels, segment_mask, &threshold)?;

    #[cfg(feature = "debug")]
    {
      perf.segment_mus = stage.elapsed().as_micros() as usize;
      stage = std::time::Instant::now();
    }

    //(3) Fill holes
    let labels = if self.config.fill_holes { labels.fill_holes() } else { labels };

    #[cfg(feature = "debug")]
    {
      perf.fill_holes_mus = stage.elapsed().as_micros() as usize;
      stage = std::time::Instant::now();
    }

    //(4) Split clumps
    let labels = self.declumper.declump(pixels, mask, &labels)?;

    #[cfg(feature = "debug")]
    {
      perf.declump_mus = stage.elapsed().as_micros() as usize;
      stage = std::time::Instant::now();
    }

    //(5) Filter by border contact and size
    let filtered = self.filter.filter(&labels, pixels, mask)?;

    #[cfg(feature = "debug")]
    {
      perf.filter_mus = stage.elapsed().as_micros() as usize;
      perf.total_mus = start.elapsed().as_micros() as usize;
      log::debug!("{perf}");
    }

    //Pixels outside of every parent only hold the upper bound
    let final_threshold = threshold.summary(segment_mask);
    log::debug!(
      "{}: threshold {final_threshold:.4}, {count} components, {} after declumping, {} kept",
      self.config.object_name,
      labels.count(),
      filtered.edited.count()
    );

    Ok(Identified {
      centers: filtered.edited.centroids(),
      outlines: filtered.edited.outlines(),
      labels: filtered.edited,
      unedited: filtered.unedited,
      small_removed: filtered.small_removed,
      fates: filtered.fates,
      threshold,
      final_threshold,
    })
  }

  /// Like [`identify`](Self::identify), but reports degenerate images (such as
  /// an image without any valid pixels) as having no objects. The lower bound
  /// of the threshold is reported as the threshold of such images.
  pub fn identify_or_empty(
    &self,
    image: &Image,
    parents: Option<&LabelImage>,
  ) -> Result<Identified> {
    match self.identify(image, parents) {
      Err(err) if err.is_degenerate() => {
        let (object, image_name) = (&self.config.object_name, &self.config.image_name);
        log::warn!("{object}: no objects identified in \"{image_name}\": {err}");
        let (lower, _upper) = self.thresholder.bounds();
        Ok(Identified::empty(image.shape(), lower))
      }
      other => other,
    }
  }

  /// Identifies the objects in the configured image of the workspace and
  /// stores them, together with their measurements.
  pub fn run(&self, workspace: &mut Workspace) -> Result<()> {
    let image = workspace.image_set.get_image(&self.config.image_name)?;
    let parents = match &self.config.parent_objects {
      Some(name) => Some(workspace.object_set.get_objects(name)?.segmented.clone()),
      None => None,
    };
    let identified = self.identify_or_empty(&image, parents.as_ref())?;

    #[cfg(feature = "plots")]
    if let Some(ref path) = self.plot_path {
      self.plot(path, workspace.cycle(), &image, &identified);
    }

    //(1) Measurements
    let name = &self.config.object_name;
    let measurements = &mut workspace.measurements;
    measurements.add_image_measurement(&format!("Count_{name}"), identified.count() as f64)?;
    let threshold_feature = format!("Threshold_FinalThreshold_{name}");
    measurements.add_image_measurement(&threshold_feature, identified.final_threshold)?;
    let (xs, ys): (Vec<f64>, Vec<f64>) = identified.centers.iter().copied().unzip();
    measurements.add_measurement(name, "Location_Center_X", xs)?;
    measurements.add_measurement(name, "Location_Center_Y", ys)?;

    //(2) Outlines
    if let Some(outlines_name) = &self.config.outlines_name {
      let outlines = identified.outlines.mapv(|outline| if outline { 1.0 } else { 0.0 });
      workspace.image_set.add(outlines_name.clone(), Image::new(outlines).with_parent(image));
    }

    //(3) Objects
    let objects = Objects {
      segmented: identified.labels,
      unedited: Some(identified.unedited.clone()),
      small_removed: Some(identified.small_removed.clone()),
    };
    let object_set = &mut workspace.object_set;
    object_set.add_objects(objects, name.clone());
    object_set.add_objects(Objects::new(identified.unedited), format!("UneditedSegmented{name}"));
    object_set
      .add_objects(Objects::new(identified.small_removed), format!("SmallRemovedSegmented{name}"));
    Ok(())
  }

  /// Processes every image in its own cycle (numbered by its index), in
  /// parallel. Results are returned in the order of the images. A failing cycle
  /// does not affect the others.
  pub fn run_batch(&self, images: &[Image]) -> Vec<Result<Workspace>> {
    #[cfg(feature = "progress")]
    let bar = set_up_bar(images.len());

    let results = images
      .par_iter()
      .enumerate()
      .map(|(cycle, image)| {
        let mut workspace = Workspace::new(cycle);
        workspace.image_set.add(self.config.image_name.clone(), image.clone());
        let result = self.run(&mut workspace).map(|()| workspace);

        #[cfg(feature = "progress")]
        bar.inc(1);

        result
      })
      .collect();

    #[cfg(feature = "progress")]
    bar.finish();

    results
  }

  #[cfg(feature = "plots")]
  fn plot(&self, path: &std::path::Path, cycle: usize, image: &Image, identified: &Identified) {
    use crate::plotting;
    let name = &self.config.object_name;
    let labels_file = path.join(format!("{name}_cycle{cycle}_labels.png"));
    let outlines_file = path.join(format!("{name}_cycle{cycle}_outlines.png"));
    let labels = identified.labels.view();
    if let Err(err) = plotting::plot_slice(labels, &labels_file, plotting::label_colours) {
      log::warn!("Could not plot label image. Error: {err}");
    }
    if let Err(err) =
      plotting::plot_outlines(image.pixels(), identified.outlines.view(), &outlines_file)
    {
      log::warn!("Could not plot outlines. Error: {err}");
    }
  }
}

#[cfg(feature = "progress")]
fn set_up_bar(cycles: usize) -> indicatif::ProgressBar {
  const TEMPLATE: &str = "{spinner}[{elapsed}/{duration}] cycle {pos}/{len}{bar:60}";
  let bar = indicatif::ProgressBar::new(cycles as u64);
  if let Ok(style) = indicatif::ProgressStyle::with_template(TEMPLATE) {
    bar.set_style(style);
  }
  bar
}
