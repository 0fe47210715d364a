pub mod archive;
pub mod corpus;
pub mod digest;
pub mod error;
pub mod lookup;
pub mod report;
pub mod verify;

pub use crate::archive::{ArchiveReader, ArchiveSummary, CorpusArchiver, DEFAULT_COMPRESSION_LEVEL};
pub use crate::corpus::{OutcomeCorpus, OutcomeRecord, PAYOUT_FIELD};
pub use crate::digest::{sha256_file_hex, sha256_hex};
pub use crate::error::{Error, Result};
pub use crate::lookup::{LookupRow, LookupTable, LookupTableBuilder, RemainderPolicy, DEFAULT_TOTAL_MASS};
pub use crate::report::{render_report, render_summary};
pub use crate::verify::{crosscheck, verify, Classification, RtpReport, ToleranceBand, ToleranceBands, NEEDS_ADJUSTMENT};
