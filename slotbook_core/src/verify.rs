use std::fmt;

use tracing::debug;

use crate::corpus::OutcomeRecord;
use crate::error::{Error, Result};
use crate::lookup::LookupTable;

/// Label reported when no tolerance band matches.
pub const NEEDS_ADJUSTMENT: &str = "needs adjustment";

#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceBand {
    pub label: String,
    pub threshold: f64,
}

/// Tolerance bands ordered tightest-first.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceBands(Vec<ToleranceBand>);

impl ToleranceBands {
    pub fn new<L: Into<String>>(bands: impl IntoIterator<Item = (L, f64)>) -> Self {
        let mut bands: Vec<ToleranceBand> = bands
            .into_iter()
            .map(|(label, threshold)| ToleranceBand {
                label: label.into(),
                threshold,
            })
            .collect();
        // stable: equal thresholds keep their configured order
        bands.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        Self(bands)
    }

    pub fn bands(&self) -> &[ToleranceBand] {
        &self.0
    }

    /// First band with `|delta| <= threshold`; a delta exactly on a threshold falls inside it.
    pub fn classify(&self, delta: f64) -> Classification {
        let distance = delta.abs();
        self.0
            .iter()
            .find(|band| distance <= band.threshold)
            .map(|band| Classification::Within {
                label: band.label.clone(),
                threshold: band.threshold,
            })
            .unwrap_or(Classification::NeedsAdjustment)
    }
}

impl Default for ToleranceBands {
    fn default() -> Self {
        Self::new([("excellent", 0.005), ("good", 0.01)])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Within { label: String, threshold: f64 },
    NeedsAdjustment,
}

impl Classification {
    pub fn label(&self) -> &str {
        match self {
            Classification::Within { label, .. } => label,
            Classification::NeedsAdjustment => NEEDS_ADJUSTMENT,
        }
    }

    pub fn is_within(&self) -> bool {
        matches!(self, Classification::Within { .. })
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RtpReport {
    pub rtp: f64,
    pub target: f64,
    /// `rtp - target`
    pub delta: f64,
    pub classification: Classification,
    pub rows: usize,
    pub total_weight: u128,
    pub weighted_payout: f64,
}

/// Probability-weighted expected payout of `table`, classified against `target`.
pub fn verify(table: &LookupTable, target: f64, bands: &ToleranceBands) -> Result<RtpReport> {
    let total_weight = table.total_weight();
    if table.is_empty() || total_weight == 0 {
        return Err(Error::EmptyTable {
            table_id: table.id().to_string(),
        });
    }
    let weighted_payout: f64 = table
        .rows()
        .iter()
        .map(|row| row.weight as f64 * row.payout)
        .sum();
    let rtp = weighted_payout / total_weight as f64;
    let delta = rtp - target;
    let classification = bands.classify(delta);
    debug!(
        table = %table.id(),
        rows = table.len(),
        rtp,
        delta,
        status = %classification,
        "verified lookup table"
    );
    Ok(RtpReport {
        rtp,
        target,
        delta,
        classification,
        rows: table.len(),
        total_weight,
        weighted_payout,
    })
}

/// Check that a restored archive lines up with a lookup table row for row.
///
/// Returns the number of records compared.
pub fn crosscheck<I>(table: &LookupTable, records: I) -> Result<usize>
where
    I: IntoIterator<Item = Result<OutcomeRecord>>,
{
    let mut rows = table.rows().iter();
    let mut compared = 0usize;
    for record in records {
        let record = record?;
        let position = compared as u64 + 1;
        let row = rows.next().ok_or_else(|| Error::ArchiveMismatch {
            index: position,
            reason: format!("archive has more records than the {} table rows", table.len()),
        })?;
        if row.index != position {
            return Err(Error::ArchiveMismatch {
                index: position,
                reason: format!("table row is numbered {}", row.index),
            });
        }
        if row.payout != record.payout_multiplier() {
            return Err(Error::ArchiveMismatch {
                index: position,
                reason: format!(
                    "table payout {} differs from archived payout {}",
                    row.payout,
                    record.payout_multiplier()
                ),
            });
        }
        compared += 1;
    }
    if compared != table.len() {
        return Err(Error::ArchiveMismatch {
            index: compared as u64 + 1,
            reason: format!(
                "table has {} rows but archive ends after {compared} records",
                table.len()
            ),
        });
    }
    Ok(compared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupRow;

    fn table(rows: &[(u64, f64)]) -> LookupTable {
        LookupTable::from_rows(
            "t",
            rows.iter()
                .zip(1u64..)
                .map(|(&(weight, payout), index)| LookupRow {
                    index,
                    weight,
                    payout,
                })
                .collect(),
        )
    }

    #[test]
    fn weighted_average() {
        let report = verify(
            &table(&[(250, 0.0), (250, 1.0), (250, 2.0), (250, 5.0)]),
            0.962,
            &ToleranceBands::default(),
        )
        .unwrap();
        assert_eq!(report.rtp, 2.0);
        assert_eq!(report.total_weight, 1000);
        assert_eq!(report.weighted_payout, 2000.0);
        assert_eq!(report.rows, 4);
        assert!((report.delta - (2.0 - 0.962)).abs() < 1e-12);
        assert_eq!(report.classification, Classification::NeedsAdjustment);
    }

    #[test]
    fn uneven_weights() {
        let report = verify(
            &table(&[(3, 0.0), (1, 4.0)]),
            1.0,
            &ToleranceBands::default(),
        )
        .unwrap();
        assert_eq!(report.rtp, 1.0);
        assert_eq!(report.delta, 0.0);
        assert_eq!(report.classification.label(), "excellent");
    }

    #[test]
    fn empty_table_is_an_error() {
        let err = verify(&table(&[]), 0.962, &ToleranceBands::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyTable { .. }));
    }

    #[test]
    fn band_boundaries_are_inclusive() {
        let bands = ToleranceBands::default();
        assert_eq!(bands.classify(0.005).label(), "excellent");
        assert_eq!(bands.classify(-0.005).label(), "excellent");
        assert_eq!(bands.classify(0.0051).label(), "good");
        assert_eq!(bands.classify(0.01).label(), "good");
        assert_eq!(bands.classify(-0.0101), Classification::NeedsAdjustment);
    }

    #[test]
    fn bands_are_sorted_tightest_first() {
        let bands = ToleranceBands::new([("loose", 0.05), ("tight", 0.001), ("mid", 0.01)]);
        let labels: Vec<&str> = bands.bands().iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["tight", "mid", "loose"]);
        assert_eq!(bands.classify(0.0).label(), "tight");
        assert_eq!(bands.classify(0.02).label(), "loose");
    }

    #[test]
    fn no_bands_means_needs_adjustment() {
        let bands = ToleranceBands::new(Vec::<(String, f64)>::new());
        assert!(!bands.classify(0.0).is_within());
    }

    fn record(payout: f64) -> Result<OutcomeRecord> {
        Ok(OutcomeRecord::from_value(serde_json::json!({ "payoutMultiplier": payout })).unwrap())
    }

    #[test]
    fn crosscheck_matches() {
        let t = table(&[(5, 0.0), (5, 2.5)]);
        assert_eq!(crosscheck(&t, vec![record(0.0), record(2.5)]).unwrap(), 2);
    }

    #[test]
    fn crosscheck_reports_payout_mismatch() {
        let t = table(&[(5, 0.0), (5, 2.5)]);
        let err = crosscheck(&t, vec![record(0.0), record(3.0)]).unwrap_err();
        assert!(matches!(err, Error::ArchiveMismatch { index: 2, .. }));
    }

    #[test]
    fn crosscheck_reports_length_mismatch() {
        let t = table(&[(5, 0.0), (5, 2.5)]);
        let err = crosscheck(&t, vec![record(0.0)]).unwrap_err();
        assert!(matches!(err, Error::ArchiveMismatch { index: 2, .. }));
        let err = crosscheck(&t, vec![record(0.0), record(2.5), record(1.0)]).unwrap_err();
        assert!(matches!(err, Error::ArchiveMismatch { index: 3, .. }));
    }
}
