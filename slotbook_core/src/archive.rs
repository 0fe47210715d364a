use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Read, Write};
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::corpus::{OutcomeCorpus, OutcomeRecord};
use crate::error::{Error, Result};

/// zstd level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub records: usize,
    pub uncompressed_bytes: u64,
}

/// Writes a corpus as zstd-compressed JSON lines, one record at a time.
#[derive(Debug, Clone, Copy)]
pub struct CorpusArchiver {
    level: i32,
}

impl Default for CorpusArchiver {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl CorpusArchiver {
    pub fn new(level: i32) -> Result<Self> {
        let range = zstd::compression_level_range();
        if !range.contains(&level) {
            return Err(Error::InvalidCompressionLevel {
                level,
                min: *range.start(),
                max: *range.end(),
            });
        }
        Ok(Self { level })
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Stream every record into `sink`. On error the sink holds an incomplete frame.
    pub fn archive<W: Write>(&self, corpus: &OutcomeCorpus, sink: W) -> Result<ArchiveSummary> {
        let write_err = |records_written: usize, source: std::io::Error| Error::ArchiveWrite {
            records_written,
            source,
        };
        let mut encoder =
            zstd::stream::write::Encoder::new(sink, self.level).map_err(|e| write_err(0, e))?;

        let mut line = Vec::new();
        let mut uncompressed_bytes = 0u64;
        for (written, record) in corpus.iter().enumerate() {
            line.clear();
            serde_json::to_writer(&mut line, record).map_err(|e| write_err(written, e.into()))?;
            line.push(b'\n');
            encoder
                .write_all(&line)
                .map_err(|e| write_err(written, e))?;
            uncompressed_bytes += line.len() as u64;
        }

        let records = corpus.len();
        let mut sink = encoder.finish().map_err(|e| write_err(records, e))?;
        sink.flush().map_err(|e| write_err(records, e))?;
        debug!(
            source = %corpus.source_id(),
            records,
            uncompressed_bytes,
            level = self.level,
            "archived corpus"
        );
        Ok(ArchiveSummary {
            records,
            uncompressed_bytes,
        })
    }

    pub fn archive_to_path(
        &self,
        corpus: &OutcomeCorpus,
        path: impl AsRef<Path>,
    ) -> Result<ArchiveSummary> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| Error::ArchiveWrite {
            records_written: 0,
            source,
        })?;
        let summary = self.archive(corpus, BufWriter::new(file))?;
        info!(
            archive = %path.display(),
            records = summary.records,
            "wrote corpus archive"
        );
        Ok(summary)
    }
}

type DecodedLines<R> = Lines<BufReader<zstd::stream::read::Decoder<'static, BufReader<R>>>>;

/// Lazily restores records from an archive written by [`CorpusArchiver`].
pub struct ArchiveReader<R: Read> {
    source_id: String,
    lines: DecodedLines<R>,
    next_index: usize,
    failed: bool,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(source_id: impl Into<String>, reader: R) -> Result<Self> {
        let source_id = source_id.into();
        let decoder =
            zstd::stream::read::Decoder::new(reader).map_err(|source| Error::ArchiveRead {
                source_id: source_id.clone(),
                source,
            })?;
        Ok(Self {
            source_id,
            lines: BufReader::new(decoder).lines(),
            next_index: 0,
            failed: false,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Restore the whole archive into memory.
    pub fn into_corpus(self) -> Result<OutcomeCorpus> {
        let source_id = self.source_id.clone();
        let records = self.collect::<Result<Vec<_>>>()?;
        OutcomeCorpus::from_records(source_id, records)
    }
}

impl ArchiveReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::new(path.display().to_string(), file)
    }
}

impl<R: Read> Iterator for ArchiveReader<R> {
    type Item = Result<OutcomeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(source) => {
                // a broken stream does not recover; stop after reporting it
                self.failed = true;
                return Some(Err(Error::ArchiveRead {
                    source_id: self.source_id.clone(),
                    source,
                }))
            }
        };
        let index = self.next_index;
        self.next_index += 1;
        let malformed = |reason: String| Error::MalformedCorpus {
            source_id: self.source_id.clone(),
            index: Some(index),
            reason,
        };
        let record = serde_json::from_str::<Value>(&line)
            .map_err(|e| malformed(e.to_string()))
            .and_then(|value| OutcomeRecord::from_value(value).map_err(malformed));
        Some(record)
    }
}
