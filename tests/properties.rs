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
use ndarray_rand::{rand_distr::Uniform, RandomExt};
use rustronomy_identify::prelude::*;

//This constant determines the randomly generated images' sizes
const RF_SIZE: (usize, usize) = (64, 64);

fn random_field() -> nd::Array2<f64> {
  nd::Array2::<f64>::random(RF_SIZE, Uniform::new(0.0, 1.0))
}

//Speckled label image: the 8-connected components of the brightest pixels
fn random_labels(cutoff: f64) -> (LabelImage, nd::Array2<f64>) {
  let field = random_field();
  let labels = LabelImage::from_binary(field.mapv(|px| px > cutoff).view());
  (labels, field)
}

//Number of 8-connected pieces of every object
fn pieces(labels: &LabelImage) -> Vec<usize> {
  (1..=labels.count())
    .map(|label| LabelImage::from_binary(labels.view().mapv(|px| px == label).view()).count())
    .collect()
}

#[test]
fn relabeling_is_idempotent() {
  for _ in 0..5 {
    let (labels, _) = random_labels(0.6);
    assert_eq!(labels.relabel(), labels);
    assert_eq!(LabelImage::from_labels(labels.clone().into_inner()), labels);
  }
}

#[test]
fn label_count_is_the_largest_label() {
  for cutoff in [0.3, 0.6, 0.9, 1.0] {
    let (labels, _) = random_labels(cutoff);
    let max = labels.view().iter().copied().max().unwrap_or(0);
    assert_eq!(max, labels.count());
    assert!(labels.areas()[1..].iter().all(|&area| area > 0));
  }
}

#[test]
fn measurements_have_one_value_per_object() {
  let module = IdentifyBuilder::new("Noise", "Speckles")
    .set_size_range(1, 100)
    .set_threshold_method(ThresholdMethod::Manual(0.7))
    .set_exclude_border_objects(false)
    .build()
    .unwrap();

  let mut workspace = Workspace::new(0);
  workspace.image_set.add("Noise", Image::new(random_field()));
  module.run(&mut workspace).unwrap();

  let count = workspace.object_set.get_objects("Speckles").unwrap().count();
  let measurements = &workspace.measurements;
  assert_eq!(measurements.get_image("Count_Speckles"), Some(count as f64));
  assert_eq!(measurements.get("Speckles", "Location_Center_X").unwrap().len(), count);
  assert_eq!(measurements.get("Speckles", "Location_Center_Y").unwrap().len(), count);
}

#[test]
fn correction_factor_is_monotonic() {
  let field = random_field();
  for algorithm in ThresholdAlgorithm::ALL {
    let method = ThresholdMethod::automatic(algorithm, ThresholdScope::Global);
    let thresholds: Vec<f64> = [0.25, 0.5, 1.0, 1.5, 2.0, 4.0]
      .into_iter()
      .map(|factor| {
        let threshold = compute_threshold(field.view(), None, method, factor, 0.0, 1.0).unwrap();
        threshold.as_global().unwrap()
      })
      .collect();
    assert!(thresholds.windows(2).all(|pair| pair[0] <= pair[1]), "{method}: {thresholds:?}");
  }
}

#[test]
fn thresholds_respect_their_bounds() {
  let field = random_field();
  let (lower, upper) = (0.3, 0.6);
  for algorithm in ThresholdAlgorithm::ALL {
    for scope in [ThresholdScope::Global, ThresholdScope::Adaptive] {
      let method = ThresholdMethod::automatic(algorithm, scope);
      let thresholder = Thresholder::new(method, 1.0, lower, upper)
        .unwrap()
        .with_adaptive_window(20)
        .unwrap();
      let within = |t: f64| (lower..=upper).contains(&t);
      match thresholder.compute(field.view(), None, None).unwrap() {
        Threshold::Global(t) => assert!(within(t)),
        Threshold::PerPixel(values) => {
          assert_eq!(values.dim(), RF_SIZE);
          assert!(values.iter().all(|&t| within(t)));
        }
      }
    }
  }
}

#[test]
fn declumping_without_a_method_is_the_identity() {
  let (labels, field) = random_labels(0.5);
  for (marker, boundary) in [
    (MarkerMethod::None, BoundaryMethod::None),
    (MarkerMethod::Intensity, BoundaryMethod::None),
    (MarkerMethod::None, BoundaryMethod::Distance),
  ] {
    let declumper = Declumper::for_diameter(marker, boundary, 5.0);
    assert!(declumper.is_identity());
    assert_eq!(declumper.declump(field.view(), None, &labels).unwrap(), labels);
  }
}

#[test]
fn declumping_only_splits_objects() {
  let (labels, field) = random_labels(0.4);
  for (marker, boundary) in [
    (MarkerMethod::Intensity, BoundaryMethod::Intensity),
    (MarkerMethod::Shape, BoundaryMethod::Distance),
    (MarkerMethod::Shape, BoundaryMethod::Intensity),
  ] {
    let declumper = Declumper::for_diameter(marker, boundary, 4.0).with_low_res_maxima(false);
    let split = declumper.declump(field.view(), None, &labels).unwrap();
    assert_eq!(split.binary(), labels.binary());
    assert!(split.count() >= labels.count());

    //Every new object lies within a single old one
    let mut parent = vec![None; split.count() + 1];
    for (&new, &old) in split.view().iter().zip(labels.view().iter()) {
      if new == 0 {
        continue;
      }
      assert_eq!(*parent[new].get_or_insert(old), old);
    }
  }
}

#[test]
fn merging_never_adds_objects() {
  for (exclude_size, size_range) in [(true, (3, 6)), (false, (3, 6)), (true, (2, 40))] {
    let (labels, field) = random_labels(0.55);
    let filter = |merge| {
      filter_objects(&labels, field.view(), size_range, exclude_size, true, merge).unwrap()
    };
    let (merged, plain) = (filter(true), filter(false));
    assert!(merged.edited.count() <= plain.edited.count());
    assert_eq!(merged.unedited, plain.unedited);
  }
}

#[test]
fn fates_cover_every_object() {
  let (labels, field) = random_labels(0.5);
  let filtered = ObjectFilter::new((2, 5))
    .unwrap()
    .with_merge_small(true)
    .with_merge_distance(2)
    .unwrap()
    .filter(&labels, field.view(), None)
    .unwrap();
  assert_eq!(filtered.fates.len(), labels.count());
  assert!(pieces(&filtered.edited).iter().all(|&n| n == 1));
  let kept = filtered.fates.iter().filter(|&&fate| fate == ObjectFate::Kept).count();
  assert_eq!(kept, filtered.edited.count());
}
