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

use ndarray as nd;
use rustronomy_identify::prelude::*;

//Sets all pixels within `radius` of `centre` to `value`
fn draw_disk(image: &mut nd::Array2<f64>, centre: (isize, isize), radius: isize, value: f64) {
  for ((row, col), px) in image.indexed_iter_mut() {
    let (dr, dc) = (row as isize - centre.0, col as isize - centre.1);
    if dr * dr + dc * dc <= radius * radius {
      *px = value;
    }
  }
}

fn two_squares() -> nd::Array2<f64> {
  let mut pixels = nd::Array2::<f64>::zeros((32, 32));
  pixels.slice_mut(nd::s![4..12, 4..12]).fill(0.9);
  pixels.slice_mut(nd::s![18..28, 16..26]).fill(0.8);
  pixels
}

//Two disks of radius 5 that only touch in a single dim pixel
fn touching_disks() -> nd::Array2<f64> {
  touching_disks_of(5)
}

//Two disks of the given radius that only touch in a single dim pixel, with a
//margin of three pixels to the edge of the image
fn touching_disks_of(radius: usize) -> nd::Array2<f64> {
  let r = radius as isize;
  let mut pixels = nd::Array2::<f64>::zeros((2 * radius + 11, 4 * radius + 7));
  draw_disk(&mut pixels, (r + 5, r + 3), r, 1.0);
  draw_disk(&mut pixels, (r + 5, 3 * r + 3), r, 1.0);
  pixels[(radius + 5, 2 * radius + 3)] = 0.3;
  pixels
}

////////////////////////////////////////////////////////////////////////////////
//                                 SEGMENTER                                  //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn zero_image_has_no_objects() {
  let pixels = nd::Array2::<f64>::zeros((10, 10));
  let mask = nd::Array2::from_elem((10, 10), true);
  let (labels, count) = segment(pixels.view(), Some(mask.view()), &Threshold::Global(0.5)).unwrap();
  assert_eq!(count, 0);
  assert!(labels.is_empty());
  assert!(labels.view().iter().all(|&label| label == 0));
}

#[test]
fn two_squares_get_distinct_labels() {
  let mut pixels = nd::Array2::<f64>::zeros((10, 10));
  pixels.slice_mut(nd::s![1..4, 1..4]).fill(1.0);
  pixels.slice_mut(nd::s![5..8, 5..8]).fill(1.0);
  let mask = nd::Array2::from_elem((10, 10), true);

  let (labels, count) = segment(pixels.view(), Some(mask.view()), &Threshold::Global(0.5)).unwrap();
  assert_eq!(count, 2);

  let first = labels.view()[(1, 1)];
  let second = labels.view()[(5, 5)];
  assert!(first > 0 && second > 0 && first != second);
  assert!(labels.view().slice(nd::s![1..4, 1..4]).iter().all(|&label| label == first));
  assert!(labels.view().slice(nd::s![5..8, 5..8]).iter().all(|&label| label == second));
  assert_eq!(labels.areas()[1..], [9, 9]);
}

#[test]
fn masked_pixels_are_never_foreground() {
  let pixels = nd::Array2::<f64>::ones((6, 6));
  let mut mask = nd::Array2::from_elem((6, 6), true);
  mask.column_mut(3).fill(false);
  let (_labels, count) =
    segment(pixels.view(), Some(mask.view()), &Threshold::Global(0.5)).unwrap();
  assert_eq!(count, 2);
}

#[test]
fn mismatched_mask_is_rejected() {
  let pixels = nd::Array2::<f64>::ones((6, 6));
  let mask = nd::Array2::from_elem((6, 5), true);
  let result = segment(pixels.view(), Some(mask.view()), &Threshold::Global(0.5));
  assert!(matches!(result, Err(IdentifyError::ShapeMismatch { .. })));
}

////////////////////////////////////////////////////////////////////////////////
//                                 DECLUMPER                                  //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn touching_disks_are_split() {
  let pixels = touching_disks();
  let (labels, count) = segment(pixels.view(), None, &Threshold::Global(0.2)).unwrap();
  assert_eq!(count, 1);

  let declumper = Declumper::for_diameter(MarkerMethod::Intensity, BoundaryMethod::Intensity, 10.0)
    .with_smoothing_size(4.0)
    .unwrap()
    .with_maxima_suppression_distance(3.0)
    .unwrap()
    .with_low_res_maxima(false);
  let split = declumper.declump(pixels.view(), None, &labels).unwrap();

  assert_eq!(split.count(), 2);
  assert_ne!(split.view()[(10, 8)], split.view()[(10, 18)]);
  assert_eq!(split.binary(), labels.binary());
}

#[test]
fn declumper_sizes_follow_the_diameter() {
  let declumper = Declumper::for_diameter(MarkerMethod::Intensity, BoundaryMethod::Intensity, 14.0);
  assert!((declumper.smoothing_size() - 2.35 * 14.0 / 3.5).abs() < 1e-12);
  assert_eq!(declumper.maxima_suppression_distance(), 7.0);

  let declumper = declumper.with_smoothing_size(0.0).unwrap();
  assert_eq!(declumper.smoothing_size(), 0.0);
  assert_eq!(declumper.maxima_suppression_distance(), 7.0);
}

#[test]
fn large_objects_are_split_at_low_resolution() {
  let pixels = touching_disks_of(14);
  let (labels, count) = segment(pixels.view(), None, &Threshold::Global(0.2)).unwrap();
  assert_eq!(count, 1);

  //A minimum diameter above 10 pixels searches for maxima at low resolution
  let declumper = Declumper::for_diameter(MarkerMethod::Intensity, BoundaryMethod::Intensity, 20.0);
  let split = declumper.declump(pixels.view(), None, &labels).unwrap();
  assert_eq!(split.count(), 2);
  assert_ne!(split.view()[(19, 17)], split.view()[(19, 45)]);
  assert_eq!(split.binary(), labels.binary());

  let full_res = declumper.clone().with_low_res_maxima(false);
  assert_eq!(full_res.declump(pixels.view(), None, &labels).unwrap().count(), 2);
}

#[test]
fn every_object_gets_a_marker_at_low_resolution() {
  //The disks, plus a single-pixel speck in the corner
  let mut pixels = touching_disks_of(14);
  pixels[(2, 60)] = 1.0;
  let (labels, count) = segment(pixels.view(), None, &Threshold::Global(0.2)).unwrap();
  assert_eq!(count, 2);

  let declumper = Declumper::for_diameter(MarkerMethod::Intensity, BoundaryMethod::Intensity, 20.0);
  let markers = declumper.find_markers(pixels.view(), &labels);
  let mut marked: Vec<usize> = markers.iter().map(|&idx| labels.view()[idx]).collect();
  marked.sort_unstable();
  marked.dedup();
  assert_eq!(marked, vec![1, 2]);
  assert!(markers.contains(&(2, 60)));
}

#[test]
fn touching_disks_are_split_with_default_settings() {
  let builder =
    IdentifyBuilder::new("DNA", "Nuclei").set_threshold_method(ThresholdMethod::Manual(0.2));
  let module = builder.clone().build().unwrap();
  let identified = module.identify(&Image::new(touching_disks_of(7)), None).unwrap();
  assert_eq!(identified.count(), 2);

  let undivided = builder.set_unclump_method(MarkerMethod::None).build().unwrap();
  assert_eq!(undivided.identify(&Image::new(touching_disks_of(7)), None).unwrap().count(), 1);

  //Disks at the minimum diameter have their centres only one diameter apart,
  //so their maxima suppress each other
  assert_eq!(module.identify(&Image::new(touching_disks()), None).unwrap().count(), 1);
}

#[test]
fn dumbbell_is_split_by_shape() {
  let mut pixels = nd::Array2::<f64>::zeros((21, 27));
  draw_disk(&mut pixels, (10, 8), 6, 1.0);
  draw_disk(&mut pixels, (10, 18), 6, 1.0);
  let (labels, count) = segment(pixels.view(), None, &Threshold::Global(0.5)).unwrap();
  assert_eq!(count, 1);

  let declumper = Declumper::for_diameter(MarkerMethod::Shape, BoundaryMethod::Distance, 10.0)
    .with_maxima_suppression_distance(3.0)
    .unwrap()
    .with_low_res_maxima(false);
  let split = declumper.declump(pixels.view(), None, &labels).unwrap();
  assert_eq!(split.count(), 2);
  assert_ne!(split.view()[(10, 8)], split.view()[(10, 18)]);
}

#[test]
fn single_disk_is_not_split() {
  let mut pixels = nd::Array2::<f64>::zeros((30, 30));
  draw_disk(&mut pixels, (15, 15), 6, 1.0);
  let (labels, _) = segment(pixels.view(), None, &Threshold::Global(0.5)).unwrap();

  let declumper = Declumper::for_diameter(MarkerMethod::Intensity, BoundaryMethod::Intensity, 10.0);
  let split = declumper.declump(pixels.view(), None, &labels).unwrap();
  assert_eq!(split, labels);
}

#[test]
fn distance_transform_of_a_bar() {
  let mut foreground = nd::Array2::from_elem((5, 7), false);
  foreground.slice_mut(nd::s![1..4, 1..6]).fill(true);
  let distance = rustronomy_identify::declump::distance_transform(foreground.view());
  assert_eq!(distance[(0, 0)], 0.0);
  assert_eq!(distance[(1, 1)], 1.0);
  assert_eq!(distance[(2, 3)], 2.0);

  let all = nd::Array2::from_elem((3, 4), true);
  let distance = rustronomy_identify::declump::distance_transform(all.view());
  assert!(distance.iter().all(|&d| d == 7.0));
}

////////////////////////////////////////////////////////////////////////////////
//                               OBJECT FILTER                                //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn border_objects_are_discarded() {
  let mut pixels = nd::Array2::<f64>::zeros((10, 10));
  pixels.slice_mut(nd::s![0..5, 2..7]).fill(1.0);
  let (labels, _) = segment(pixels.view(), None, &Threshold::Global(0.5)).unwrap();

  let filtered = ObjectFilter::new((1, 100)).unwrap().filter(&labels, pixels.view(), None).unwrap();
  assert_eq!(filtered.edited.count(), 0);
  assert_eq!(filtered.unedited.count(), 1);
  assert_eq!(filtered.fates, vec![ObjectFate::DiscardedBorder]);
}

#[test]
fn objects_next_to_the_mask_edge_are_discarded() {
  let mut pixels = nd::Array2::<f64>::zeros((12, 12));
  pixels.slice_mut(nd::s![4..8, 4..8]).fill(1.0);
  let (labels, _) = segment(pixels.view(), None, &Threshold::Global(0.5)).unwrap();
  let filter = ObjectFilter::new((1, 100)).unwrap();

  let kept = filter.filter(&labels, pixels.view(), None).unwrap();
  assert_eq!(kept.edited.count(), 1);

  let mut mask = nd::Array2::from_elem((12, 12), true);
  mask[(3, 5)] = false;
  let discarded = filter.filter(&labels, pixels.view(), Some(mask.view())).unwrap();
  assert_eq!(discarded.edited.count(), 0);
}

//A big 6x6 object with a small 2x1 object attached to its right side
fn big_and_small() -> (LabelImage, nd::Array2<f64>) {
  let mut raw = nd::Array2::<usize>::zeros((12, 12));
  raw.slice_mut(nd::s![2..8, 2..8]).fill(1);
  raw[(4, 8)] = 2;
  raw[(5, 8)] = 2;
  let pixels = raw.mapv(|label| match label {
    1 => 0.8,
    2 => 0.6,
    _ => 0.0,
  });
  (LabelImage::from_labels(raw), pixels)
}

#[test]
fn small_objects_are_merged_into_neighbours() {
  let (labels, pixels) = big_and_small();
  let filtered = filter_objects(&labels, pixels.view(), (3, 20), true, true, true).unwrap();
  assert_eq!(filtered.edited.count(), 1);
  assert_eq!(filtered.edited.areas()[1], 38);
  assert_eq!(filtered.fates, vec![ObjectFate::Kept, ObjectFate::Merged { into: 1 }]);
  assert_eq!(filtered.small_removed.count(), 2);
}

#[test]
fn merged_objects_stay_connected() {
  //A 6x6 object and a single pixel, one empty column apart
  let mut raw = nd::Array2::<usize>::zeros((16, 16));
  raw.slice_mut(nd::s![4..10, 4..10]).fill(1);
  raw[(6, 11)] = 2;
  let labels = LabelImage::from_labels(raw);
  let pixels = labels.binary().mapv(|fg| if fg { 1.0 } else { 0.0 });

  let filter = ObjectFilter::new((3, 20)).unwrap().with_merge_small(true);
  let touching = filter.filter(&labels, pixels.view(), None).unwrap();
  assert_eq!(touching.fates, vec![ObjectFate::Kept, ObjectFate::DiscardedNoise]);

  let filtered =
    filter.with_merge_distance(2).unwrap().filter(&labels, pixels.view(), None).unwrap();
  assert_eq!(filtered.fates, vec![ObjectFate::Kept, ObjectFate::Merged { into: 1 }]);
  assert_eq!(filtered.edited.count(), 1);
  //Both objects plus one pixel of the gap
  assert_eq!(filtered.edited.areas()[1], 38);
  assert_eq!(LabelImage::from_binary(filtered.edited.binary().view()).count(), 1);
}

#[test]
fn small_objects_are_discarded_without_merging() {
  let (labels, pixels) = big_and_small();
  let filtered = filter_objects(&labels, pixels.view(), (3, 20), true, true, false).unwrap();
  assert_eq!(filtered.edited.count(), 1);
  assert_eq!(filtered.edited.areas()[1], 36);
  assert_eq!(filtered.fates, vec![ObjectFate::Kept, ObjectFate::DiscardedSize]);
  assert_eq!(filtered.small_removed.count(), 1);
  assert_eq!(filtered.unedited.count(), 2);
}

#[test]
fn isolated_small_objects_are_noise() {
  let mut raw = nd::Array2::<usize>::zeros((12, 12));
  raw.slice_mut(nd::s![2..8, 2..8]).fill(1);
  raw[(10, 10)] = 2;
  let labels = LabelImage::from_labels(raw);
  let pixels = nd::Array2::<f64>::ones((12, 12));
  let filtered = filter_objects(&labels, pixels.view(), (3, 20), true, true, true).unwrap();
  assert_eq!(filtered.fates, vec![ObjectFate::Kept, ObjectFate::DiscardedNoise]);
  assert_eq!(filtered.edited.count(), 1);
}

#[test]
fn invalid_size_range_is_rejected() {
  assert!(matches!(
    ObjectFilter::new((10, 5)),
    Err(IdentifyError::InvalidSizeRange { min: 10, max: 5 })
  ));
  assert!(ObjectFilter::new((0, 5)).unwrap_err().is_configuration());
}

////////////////////////////////////////////////////////////////////////////////
//                               ORCHESTRATOR                                 //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn identify_two_nuclei() {
  let module = IdentifyBuilder::new("DNA", "Nuclei")
    .set_size_range(3, 40)
    .set_outlines_name("NucleiOutlines")
    .build()
    .unwrap();

  let mut workspace = Workspace::new(0);
  workspace.image_set.add("DNA", Image::new(two_squares()));
  module.run(&mut workspace).unwrap();

  //Objects
  let nuclei = workspace.object_set.get_objects("Nuclei").unwrap();
  assert_eq!(nuclei.count(), 2);
  assert_eq!(nuclei.unedited().count(), 2);
  assert!(workspace.object_set.contains("UneditedSegmentedNuclei"));
  assert!(workspace.object_set.contains("SmallRemovedSegmentedNuclei"));

  //Measurements
  let measurements = &workspace.measurements;
  assert_eq!(measurements.get_image("Count_Nuclei"), Some(2.0));
  let threshold = measurements.get_image("Threshold_FinalThreshold_Nuclei").unwrap();
  assert!(threshold > 0.0 && threshold < 0.8);
  assert_eq!(measurements.get("Nuclei", "Location_Center_X"), Some(&[7.5, 22.5][..]));
  assert_eq!(measurements.get("Nuclei", "Location_Center_Y"), Some(&[7.5, 20.5][..]));

  //Outlines: the perimeters of both squares
  let outlines = workspace.image_set.get_image("NucleiOutlines").unwrap();
  assert_eq!(outlines.pixels().sum(), 28.0 + 36.0);
  assert!(outlines.parent().is_some());
}

#[test]
fn identify_touching_disks() {
  let module = IdentifyBuilder::new("DNA", "Nuclei")
    .set_size_range(5, 40)
    .set_threshold_method(ThresholdMethod::Manual(0.2))
    .set_smoothing_filter_size(4.0)
    .set_maxima_suppression_size(3.0)
    .set_low_res_maxima(false)
    .build()
    .unwrap();

  let identified = module.identify(&Image::new(touching_disks()), None).unwrap();
  assert_eq!(identified.count(), 2);
  assert_eq!(identified.unedited.count(), 2);
  assert_eq!(identified.final_threshold, 0.2);
  assert_eq!(identified.centers.len(), 2);
}

#[test]
fn declumping_can_be_disabled() {
  let module = IdentifyBuilder::new("DNA", "Nuclei")
    .set_size_range(5, 40)
    .set_threshold_method(ThresholdMethod::Manual(0.2))
    .set_unclump_method(MarkerMethod::None)
    .build()
    .unwrap();

  let identified = module.identify(&Image::new(touching_disks()), None).unwrap();
  assert_eq!(identified.count(), 1);
}

#[test]
fn holes_are_filled() {
  let mut pixels = nd::Array2::<f64>::zeros((12, 12));
  pixels.slice_mut(nd::s![2..9, 2..9]).fill(1.0);
  pixels[(5, 5)] = 0.0;
  let image = Image::new(pixels);

  let builder = IdentifyBuilder::new("DNA", "Nuclei")
    .set_size_range(2, 40)
    .set_threshold_method(ThresholdMethod::Manual(0.5))
    .set_unclump_method(MarkerMethod::None);
  let filled = builder.clone().build().unwrap().identify(&image, None).unwrap();
  assert_eq!(filled.labels.areas()[1], 49);

  let unfilled = builder.set_fill_holes(false).build().unwrap().identify(&image, None).unwrap();
  assert_eq!(unfilled.labels.areas()[1], 48);
}

#[test]
fn per_object_thresholds() {
  //Two cells, each with a nucleus that is brighter than the cell around it
  let mut pixels = nd::Array2::<f64>::zeros((30, 40));
  pixels.slice_mut(nd::s![2..28, 2..18]).fill(0.1);
  pixels.slice_mut(nd::s![10..18, 6..14]).fill(0.5);
  pixels.slice_mut(nd::s![2..28, 22..38]).fill(0.3);
  pixels.slice_mut(nd::s![10..18, 26..34]).fill(0.9);
  let mut cells = nd::Array2::<usize>::zeros((30, 40));
  cells.slice_mut(nd::s![2..28, 2..18]).fill(1);
  cells.slice_mut(nd::s![2..28, 22..38]).fill(2);

  let module = IdentifyBuilder::new("DNA", "Nuclei")
    .set_size_range(3, 40)
    .set_threshold_method(ThresholdMethod::automatic(
      ThresholdAlgorithm::Otsu,
      ThresholdScope::PerObject,
    ))
    .set_parent_objects("Cells")
    .build()
    .unwrap();

  let parents = LabelImage::from_labels(cells.clone());
  let mut workspace = Workspace::new(0);
  workspace.image_set.add("DNA", Image::new(pixels.clone()));
  workspace.object_set.add_objects(Objects::new(parents.clone()), "Cells");
  module.run(&mut workspace).unwrap();

  let nuclei = workspace.object_set.get_objects("Nuclei").unwrap();
  assert_eq!(nuclei.count(), 2);
  assert_eq!(nuclei.segmented.areas()[1..], [64, 64]);

  //The reported threshold is the mean over the pixels inside the cells only
  let identified = module.identify(&Image::new(pixels), Some(&parents)).unwrap();
  let Threshold::PerPixel(per_pixel) = &identified.threshold else {
    panic!("per-object thresholds are per pixel");
  };
  let inside: Vec<f64> =
    per_pixel.iter().zip(cells.iter()).filter(|(_, &cell)| cell != 0).map(|(&t, _)| t).collect();
  let expected = inside.iter().sum::<f64>() / inside.len() as f64;
  let reported = workspace.measurements.get_image("Threshold_FinalThreshold_Nuclei").unwrap();
  assert!((reported - expected).abs() < 1e-9);
  assert!(reported <= 0.7 + 1e-9);
}

#[test]
fn missing_parents_are_reported() {
  let module = IdentifyBuilder::new("DNA", "Nuclei")
    .set_threshold_method(ThresholdMethod::automatic(
      ThresholdAlgorithm::Otsu,
      ThresholdScope::PerObject,
    ))
    .set_parent_objects("Cells")
    .build()
    .unwrap();
  let mut workspace = Workspace::new(0);
  workspace.image_set.add("DNA", Image::new(two_squares()));
  let result = module.run(&mut workspace);
  assert_eq!(result, Err(IdentifyError::MissingObjects("Cells".to_string())));
}

#[test]
fn degenerate_images_have_no_objects() {
  let module = IdentifyBuilder::new("DNA", "Nuclei").set_threshold_range(0.1, 0.9).build().unwrap();

  //Fully masked image
  let masked = Image::with_mask(two_squares(), nd::Array2::from_elem((32, 32), false)).unwrap();
  assert!(module.identify(&masked, None).unwrap_err().is_degenerate());

  let mut workspace = Workspace::new(3);
  workspace.image_set.add("DNA", masked);
  module.run(&mut workspace).unwrap();
  assert_eq!(workspace.measurements.get_image("Count_Nuclei"), Some(0.0));
  assert_eq!(workspace.measurements.get_image("Threshold_FinalThreshold_Nuclei"), Some(0.1));
  assert_eq!(workspace.measurements.get("Nuclei", "Location_Center_X"), Some(&[] as &[f64]));

  //Constant image
  let flat = Image::new(nd::Array2::from_elem((16, 16), 0.4));
  let identified = module.identify_or_empty(&flat, None).unwrap();
  assert_eq!(identified.count(), 0);
  assert_eq!(identified.threshold, Threshold::Global(0.1));
}

#[test]
fn missing_image_is_reported() {
  let module = IdentifyBuilder::new("DNA", "Nuclei").build().unwrap();
  let mut workspace = Workspace::new(0);
  assert_eq!(module.run(&mut workspace), Err(IdentifyError::MissingImage("DNA".to_string())));
}

#[test]
fn configuration_is_validated_once() {
  let build = |builder: IdentifyBuilder| builder.build().map(|_| ());
  let new = || IdentifyBuilder::new("DNA", "Nuclei");

  assert!(build(new()).is_ok());
  assert!(matches!(
    build(new().set_threshold_range(0.8, 0.2)),
    Err(IdentifyError::InvalidRange { .. })
  ));
  assert!(matches!(
    build(new().set_size_range(10, 5)),
    Err(IdentifyError::InvalidSizeRange { .. })
  ));
  assert!(matches!(
    build(new().set_threshold_method(ThresholdMethod::automatic(
      ThresholdAlgorithm::Kapur,
      ThresholdScope::PerObject
    ))),
    Err(IdentifyError::InvalidConfig(_))
  ));
  for method in [ThresholdMethod::Interactive, ThresholdMethod::Manual(1.5)] {
    assert!(build(new().set_threshold_method(method)).unwrap_err().is_configuration());
  }
  assert!(build(new().set_threshold_correction_factor(0.0)).unwrap_err().is_configuration());
  assert!(build(new().set_object_fraction(1.0)).unwrap_err().is_configuration());
  assert!(build(new().set_adaptive_window(2)).unwrap_err().is_configuration());
  assert!(build(new().set_smoothing_filter_size(-1.0)).unwrap_err().is_configuration());

  let mut config = IdentifyConfig::new("DNA", "Nuclei");
  config.version = 0;
  assert!(matches!(config.validate(), Err(IdentifyError::UnsupportedVersion { found: 0, .. })));
  assert!(matches!(
    IdentifyBuilder::from_config(config).build(),
    Err(IdentifyError::UnsupportedVersion { .. })
  ));
}

#[test]
fn batch_run_keeps_cycles_apart() {
  let mut one_square = nd::Array2::<f64>::zeros((32, 32));
  one_square.slice_mut(nd::s![10..20, 10..20]).fill(0.7);
  let images = vec![
    Image::new(two_squares()),
    Image::new(nd::Array2::zeros((32, 32))),
    Image::new(one_square),
  ];

  let module = IdentifyBuilder::new("DNA", "Nuclei").set_size_range(3, 40).build().unwrap();
  let results = module.run_batch(&images);
  assert_eq!(results.len(), 3);

  let mut measurements = Measurements::new();
  for result in results {
    let workspace = result.unwrap();
    measurements.absorb(workspace.measurements).unwrap();
  }
  let counts: Vec<(usize, Vec<f64>)> = measurements
    .series("Image", "Count_Nuclei")
    .into_iter()
    .map(|(cycle, values)| (cycle, values.to_vec()))
    .collect();
  assert_eq!(counts, vec![(0, vec![2.0]), (1, vec![0.0]), (2, vec![1.0])]);
}
