use std::path::PathBuf;

fn at_record(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" (record {i})"),
        None => String::new(),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed corpus `{source_id}`{}: {reason}", at_record(.index))]
    MalformedCorpus {
        source_id: String,
        index: Option<usize>, // 0-based record position
        reason: String,
    },
    #[error("total mass {total_mass} is smaller than the {rows} corpus rows")]
    InsufficientMass { total_mass: u64, rows: usize },
    /// Sink could not be opened or written; the partial output is not a valid archive.
    #[error("archive write failed after {records_written} records: {source}")]
    ArchiveWrite {
        records_written: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("archive `{source_id}` could not be read: {source}")]
    ArchiveRead {
        source_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("lookup table `{table_id}` has no rows")]
    EmptyTable { table_id: String },
    #[error("malformed lookup table `{table_id}` at line {line}: {reason}")]
    MalformedTable {
        table_id: String,
        line: u64,
        reason: String,
    },
    #[error("lookup table write failed: {0}")]
    TableWrite(#[from] csv::Error),
    #[error("archive does not match lookup table at index {index}: {reason}")]
    ArchiveMismatch { index: u64, reason: String },
    #[error("compression level {level} outside supported range {min}..={max}")]
    InvalidCompressionLevel { level: i32, min: i32, max: i32 },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
