//! Portfolio totals by stage and by segment.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{EclRecord, Stage};
use crate::math::round2;

/// Exposure and ECL of a group of loans.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bucket {
    pub loans: usize,
    pub exposure: f64,
    pub ecl: f64,
}

impl Bucket {
    fn add(&mut self, record: &EclRecord) {
        self.loans += 1;
        self.exposure += record.exposure;
        self.ecl += record.total_ecl;
    }

    fn rounded(mut self) -> Self {
        self.exposure = round2(self.exposure);
        self.ecl = round2(self.ecl);
        self
    }

    /// ECL / exposure; 0 for an empty exposure.
    pub fn coverage(&self) -> f64 {
        if self.exposure > 0.0 { self.ecl / self.exposure } else { 0.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total: Bucket,
    pub by_stage: BTreeMap<Stage, Bucket>,
    pub by_segment: BTreeMap<String, Bucket>,
}

pub fn summarize<'a>(records: impl IntoIterator<Item = &'a EclRecord>) -> PortfolioSummary {
    let mut total = Bucket::default();
    let mut by_stage: BTreeMap<Stage, Bucket> = BTreeMap::new();
    let mut by_segment: BTreeMap<String, Bucket> = BTreeMap::new();
    for r in records {
        total.add(r);
        by_stage.entry(r.stage).or_default().add(r);
        by_segment.entry(r.segment.clone()).or_default().add(r);
    }
    PortfolioSummary {
        total: total.rounded(),
        by_stage: by_stage.into_iter().map(|(k, b)| (k, b.rounded())).collect(),
        by_segment: by_segment.into_iter().map(|(k, b)| (k, b.rounded())).collect(),
    }
}
