use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};

/// Field every outcome record must carry.
pub const PAYOUT_FIELD: &str = "payoutMultiplier";

/// One simulated play outcome ("book").
///
/// All source fields are kept in their original order and written back
/// unchanged; only `payoutMultiplier` is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    fields: Map<String, Value>,
    payout_multiplier: f64,
}

impl OutcomeRecord {
    /// Validate a raw JSON value as an outcome record.
    pub fn from_value(value: Value) -> std::result::Result<Self, String> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(format!("expected an object, found {}", kind(&other))),
        };
        let payout_multiplier = match fields.get(PAYOUT_FIELD) {
            None => return Err(format!("missing `{PAYOUT_FIELD}`")),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| format!("`{PAYOUT_FIELD}` is not representable as f64"))?,
            Some(other) => {
                return Err(format!(
                    "`{PAYOUT_FIELD}` must be a number, found {}",
                    kind(other)
                ))
            }
        };
        if !payout_multiplier.is_finite() || payout_multiplier < 0.0 {
            return Err(format!(
                "`{PAYOUT_FIELD}` must be non-negative, found {payout_multiplier}"
            ));
        }
        Ok(Self {
            fields,
            payout_multiplier,
        })
    }

    pub fn payout_multiplier(&self) -> f64 {
        self.payout_multiplier
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl Serialize for OutcomeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Ordered, non-empty sequence of outcome records loaded from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeCorpus {
    source_id: String,
    records: Vec<OutcomeRecord>,
}

impl OutcomeCorpus {
    /// Parse a JSON array of outcome records.
    pub fn from_reader<R: Read>(source_id: impl Into<String>, reader: R) -> Result<Self> {
        let source_id = source_id.into();
        let values: Vec<Value> =
            serde_json::from_reader(reader).map_err(|e| Error::MalformedCorpus {
                source_id: source_id.clone(),
                index: None,
                reason: format!("expected an array of records: {e}"),
            })?;
        Self::from_values(source_id, values)
    }

    /// Load the JSON array at `path`; the path doubles as the source identifier.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let corpus = Self::from_reader(path.display().to_string(), BufReader::new(file))?;
        info!(source = %corpus.source_id, records = corpus.len(), "loaded corpus");
        Ok(corpus)
    }

    /// Build a corpus from values already in memory, with the same validation as loading.
    pub fn from_values(source_id: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        let source_id = source_id.into();
        let records = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                OutcomeRecord::from_value(value).map_err(|reason| Error::MalformedCorpus {
                    source_id: source_id.clone(),
                    index: Some(i),
                    reason,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_records(source_id, records)
    }

    /// Wrap already-validated records. Fails on an empty sequence.
    pub fn from_records(source_id: impl Into<String>, records: Vec<OutcomeRecord>) -> Result<Self> {
        let source_id = source_id.into();
        if records.is_empty() {
            return Err(Error::MalformedCorpus {
                source_id,
                index: None,
                reason: "corpus contains no records".into(),
            });
        }
        Ok(Self { source_id, records })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a constructed corpus.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[OutcomeRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OutcomeRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a OutcomeCorpus {
    type Item = &'a OutcomeRecord;
    type IntoIter = std::slice::Iter<'a, OutcomeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load_str(s: &str) -> Result<OutcomeCorpus> {
        OutcomeCorpus::from_reader("test", s.as_bytes())
    }

    #[test]
    fn keeps_order_and_extra_fields() {
        let corpus = load_str(
            r#"[{"id":1,"payoutMultiplier":0,"events":[]},{"id":2,"payoutMultiplier":12.5}]"#,
        )
        .unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.records()[0].payout_multiplier(), 0.0);
        assert_eq!(corpus.records()[1].payout_multiplier(), 12.5);
        let keys: Vec<_> = corpus.records()[0].fields().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "payoutMultiplier", "events"]);
    }

    #[test]
    fn serializes_fields_unchanged() {
        let corpus = load_str(r#"[{"z":true,"payoutMultiplier":3,"a":"x"}]"#).unwrap();
        let line = serde_json::to_string(&corpus.records()[0]).unwrap();
        assert_eq!(line, r#"{"z":true,"payoutMultiplier":3,"a":"x"}"#);
    }

    #[test]
    fn rejects_non_array() {
        let err = load_str(r#"{"payoutMultiplier":1}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedCorpus { index: None, .. }));
    }

    #[test]
    fn rejects_empty_array() {
        let err = load_str("[]").unwrap_err();
        assert!(matches!(err, Error::MalformedCorpus { index: None, .. }));
    }

    #[test]
    fn rejects_missing_field_with_index() {
        let err = load_str(r#"[{"payoutMultiplier":1},{"payout":2}]"#).unwrap_err();
        match err {
            Error::MalformedCorpus { index, reason, .. } => {
                assert_eq!(index, Some(1));
                assert!(reason.contains("missing"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_and_non_numeric_payouts() {
        let err = load_str(r#"[{"payoutMultiplier":-0.5}]"#).unwrap_err();
        assert!(matches!(err, Error::MalformedCorpus { index: Some(0), .. }));
        let err = load_str(r#"[{"payoutMultiplier":"2.0"}]"#).unwrap_err();
        assert!(matches!(err, Error::MalformedCorpus { index: Some(0), .. }));
        let err = load_str(r#"[{"payoutMultiplier":null}]"#).unwrap_err();
        assert!(matches!(err, Error::MalformedCorpus { index: Some(0), .. }));
    }

    #[test]
    fn rejects_non_object_record() {
        let err = OutcomeCorpus::from_values("mem", vec![json!({"payoutMultiplier": 1}), json!(4)])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedCorpus { index: Some(1), .. }));
    }

    #[test]
    fn load_reports_missing_path() {
        let err = OutcomeCorpus::load("/nonexistent/books_base.json").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
