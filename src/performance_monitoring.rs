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

/// Time spent in each stage of a single identification, in µs
#[derive(Clone, Debug, Default)]
pub struct PerfReport {
  pub threshold_mus: usize,
  pub segment_mus: usize,
  pub fill_holes_mus: usize,
  pub declump_mus: usize,
  pub filter_mus: usize,
  pub total_mus: usize,
}

impl PerfReport {
  pub fn stage_total(&self) -> usize {
    self.threshold_mus + self.segment_mus + self.fill_holes_mus + self.declump_mus + self.filter_mus
  }
}

impl std::fmt::Display for PerfReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, ">---------[Performance Summary]---------")?;
    writeln!(f, ">  Thresholding: {}µs", self.threshold_mus)?;
    writeln!(f, ">  Segmenting: {}µs", self.segment_mus)?;
    writeln!(f, ">  Filling holes: {}µs", self.fill_holes_mus)?;
    writeln!(f, ">  Declumping: {}µs", self.declump_mus)?;
    writeln!(f, ">  Filtering: {}µs", self.filter_mus)?;
    writeln!(f, ">--------------------------------+ total")?;
    write!(
      f,
      ">  {}µs with {}µs overhead (Δt)",
      self.total_mus,
      self.total_mus.saturating_sub(self.stage_total())
    )
  }
}
