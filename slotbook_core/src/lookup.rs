use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::corpus::OutcomeCorpus;
use crate::error::{Error, Result};

/// Probability mass shared out across every row of a lookup table.
pub const DEFAULT_TOTAL_MASS: u64 = 1_000_000_000_000;

/// What to do with `total_mass mod rows` after floor division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Drop the remainder. Weights sum to `rows * (total_mass / rows)`.
    #[default]
    Discard,
    /// Give one extra unit to each of the first `remainder` rows so weights sum to `total_mass`.
    Distribute,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupRow {
    pub index: u64,
    pub weight: u64,
    pub payout: f64,
}

/// Published `index,weight,payout` table for one game mode.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    id: String,
    rows: Vec<LookupRow>,
}

impl LookupTable {
    pub fn from_rows(id: impl Into<String>, rows: Vec<LookupRow>) -> Self {
        Self {
            id: id.into(),
            rows,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rows(&self) -> &[LookupRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_weight(&self) -> u128 {
        self.rows.iter().map(|r| r.weight as u128).sum()
    }

    /// Units of `total_mass` not assigned to any row.
    pub fn truncation_loss(&self, total_mass: u64) -> u128 {
        (total_mass as u128).saturating_sub(self.total_weight())
    }

    /// Write rows as headerless `index,weight,payout` lines.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        for row in &self.rows {
            wtr.write_record(&[
                row.index.to_string(),
                row.weight.to_string(),
                row.payout.to_string(),
            ])?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        self.write_csv(BufWriter::new(file))?;
        info!(table = %path.display(), rows = self.len(), "wrote lookup table");
        Ok(())
    }

    /// Parse a published table. Rows are taken as written; indices are not renumbered.
    pub fn read_csv<R: Read>(table_id: impl Into<String>, reader: R) -> Result<Self> {
        let table_id = table_id.into();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let line = i as u64 + 1;
            let malformed = |reason: String| Error::MalformedTable {
                table_id: table_id.clone(),
                line,
                reason,
            };
            let record = record.map_err(|e| malformed(e.to_string()))?;
            if record.len() != 3 {
                return Err(malformed(format!("expected 3 fields, found {}", record.len())));
            }
            let index: u64 = record[0]
                .trim()
                .parse()
                .map_err(|e| malformed(format!("bad index `{}`: {e}", &record[0])))?;
            let weight: u64 = record[1]
                .trim()
                .parse()
                .map_err(|e| malformed(format!("bad weight `{}`: {e}", &record[1])))?;
            let payout: f64 = record[2]
                .trim()
                .parse()
                .map_err(|e| malformed(format!("bad payout `{}`: {e}", &record[2])))?;
            if weight == 0 {
                return Err(malformed("weight must be positive".into()));
            }
            if !payout.is_finite() || payout < 0.0 {
                return Err(malformed(format!("payout must be non-negative, found {payout}")));
            }
            rows.push(LookupRow {
                index,
                weight,
                payout,
            });
        }
        debug!(table = %table_id, rows = rows.len(), "read lookup table");
        Ok(Self { id: table_id, rows })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::read_csv(path.display().to_string(), BufReader::new(file))
    }
}

/// Turns a corpus into an equal-weight lookup table.
#[derive(Debug, Clone, Copy)]
pub struct LookupTableBuilder {
    total_mass: u64,
    remainder_policy: RemainderPolicy,
}

impl Default for LookupTableBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_MASS)
    }
}

impl LookupTableBuilder {
    pub fn new(total_mass: u64) -> Self {
        Self {
            total_mass,
            remainder_policy: RemainderPolicy::default(),
        }
    }

    pub fn remainder_policy(mut self, policy: RemainderPolicy) -> Self {
        self.remainder_policy = policy;
        self
    }

    pub fn total_mass(&self) -> u64 {
        self.total_mass
    }

    /// Every record gets `total_mass / len` weight; rows are numbered 1..=len in corpus order.
    pub fn build(&self, corpus: &OutcomeCorpus) -> Result<LookupTable> {
        let rows = corpus.len();
        let n = rows as u64;
        if n == 0 || self.total_mass < n {
            return Err(Error::InsufficientMass {
                total_mass: self.total_mass,
                rows,
            });
        }
        let base_weight = self.total_mass / n;
        let remainder = match self.remainder_policy {
            RemainderPolicy::Discard => 0,
            RemainderPolicy::Distribute => self.total_mass % n,
        };

        let table_rows = corpus
            .iter()
            .zip(1u64..)
            .map(|(record, index)| LookupRow {
                index,
                weight: base_weight + u64::from(index <= remainder),
                payout: record.payout_multiplier(),
            })
            .collect();
        let table = LookupTable::from_rows(corpus.source_id(), table_rows);

        let loss = table.truncation_loss(self.total_mass);
        if loss > 0 {
            warn!(
                source = %corpus.source_id(),
                loss = %loss,
                total_mass = self.total_mass,
                "probability mass lost to integer division"
            );
        }
        info!(
            source = %corpus.source_id(),
            rows,
            base_weight,
            "built lookup table"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn corpus(payouts: &[f64]) -> OutcomeCorpus {
        let values = payouts
            .iter()
            .map(|p| json!({ "payoutMultiplier": p }))
            .collect();
        OutcomeCorpus::from_values("mem", values).unwrap()
    }

    #[test]
    fn four_rows_share_mass_evenly() {
        let table = LookupTableBuilder::new(1000)
            .build(&corpus(&[0.0, 1.0, 2.0, 5.0]))
            .unwrap();
        let weights: Vec<u64> = table.rows().iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![250, 250, 250, 250]);
        let payouts: Vec<f64> = table.rows().iter().map(|r| r.payout).collect();
        assert_eq!(payouts, vec![0.0, 1.0, 2.0, 5.0]);
        assert_eq!(table.truncation_loss(1000), 0);
    }

    #[test]
    fn discard_loses_remainder() {
        let table = LookupTableBuilder::new(10)
            .build(&corpus(&[1.0, 1.0, 1.0]))
            .unwrap();
        assert!(table.rows().iter().all(|r| r.weight == 3));
        assert_eq!(table.total_weight(), 9);
        assert_eq!(table.truncation_loss(10), 1);
    }

    #[test]
    fn distribute_assigns_remainder_to_leading_rows() {
        let table = LookupTableBuilder::new(11)
            .remainder_policy(RemainderPolicy::Distribute)
            .build(&corpus(&[1.0, 2.0, 3.0]))
            .unwrap();
        let weights: Vec<u64> = table.rows().iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![4, 4, 3]);
        assert_eq!(table.total_weight(), 11);
        assert_eq!(table.truncation_loss(11), 0);
    }

    #[test]
    fn indices_are_one_based_and_contiguous() {
        let table = LookupTableBuilder::default()
            .build(&corpus(&[3.0, 0.0, 7.5, 1.0, 0.2]))
            .unwrap();
        for (i, row) in table.rows().iter().enumerate() {
            assert_eq!(row.index, i as u64 + 1);
        }
    }

    #[test]
    fn insufficient_mass() {
        let err = LookupTableBuilder::new(2)
            .build(&corpus(&[1.0, 1.0, 1.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientMass {
                total_mass: 2,
                rows: 3
            }
        ));
        assert!(LookupTableBuilder::new(0).build(&corpus(&[1.0])).is_err());
    }

    #[test]
    fn mass_equal_to_rows_gives_unit_weights() {
        let table = LookupTableBuilder::new(3)
            .build(&corpus(&[1.0, 2.0, 3.0]))
            .unwrap();
        assert!(table.rows().iter().all(|r| r.weight == 1));
    }

    #[test]
    fn csv_has_no_header_and_keeps_precision() {
        let table = LookupTable::from_rows(
            "t",
            vec![
                LookupRow { index: 1, weight: 500, payout: 0.0 },
                LookupRow { index: 2, weight: 500, payout: 0.1 + 0.2 },
                LookupRow { index: 3, weight: 500, payout: 1234.5 },
            ],
        );
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "1,500,0\n2,500,0.30000000000000004\n3,500,1234.5\n");

        let back = LookupTable::read_csv("t", text.as_bytes()).unwrap();
        assert_eq!(back.rows(), table.rows());
    }

    #[test]
    fn read_rejects_bad_rows() {
        let err = LookupTable::read_csv("t", "1,10,1.5\n2,0,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { line: 2, .. }));
        let err = LookupTable::read_csv("t", "1,10\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { line: 1, .. }));
        let err = LookupTable::read_csv("t", "1,10,-2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { line: 1, .. }));
        let err = LookupTable::read_csv("t", "x,10,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { line: 1, .. }));
    }

    #[test]
    fn read_accepts_empty_input() {
        let table = LookupTable::read_csv("t", "".as_bytes()).unwrap();
        assert!(table.is_empty());
    }
}
