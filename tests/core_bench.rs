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

#[test]
fn core_bench() {
  //Create a batch of random uniform fields
  let batch: Vec<Image> = (0..8)
    .map(|_| Image::new(nd::Array2::<f64>::random((128, 128), Uniform::new(0.0, 1.0))))
    .collect();

  //Set-up the identification module
  let module = IdentifyBuilder::new("Noise", "Speckles")
    .set_size_range(2, 30)
    .set_threshold_method(ThresholdMethod::automatic(
      ThresholdAlgorithm::RidlerCalvard,
      ThresholdScope::Adaptive,
    ))
    .build()
    .unwrap();

  println!("Testing 1 to {} threads performance", rayon::current_num_threads());

  //Time with num cores
  let results: Vec<f64> = (1..=rayon::current_num_threads())
    .map(|num_threads| {
      //Set core count
      println!("Running batch with {num_threads} thread(s)");
      let pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build().unwrap();
      //Time batch
      let start = std::time::Instant::now();
      let cycles = pool.install(|| module.run_batch(&batch));
      let elapsed = start.elapsed().as_secs_f64();
      assert!(cycles.iter().all(Result::is_ok));
      elapsed
    })
    .collect();

  //Print per run results
  for (threads, time) in results.iter().enumerate().map(|(i, t)| (i + 1, t)) {
    println!("{threads:02} threads = {time:000.02}s");
  }

  //Print total results
  let average = (1.0 / (results.len() as f64)) * results.iter().sum::<f64>();
  println!("Average time: {average:.02}");
}
