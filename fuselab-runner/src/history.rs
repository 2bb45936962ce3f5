//! Record history: JSONL append-only persistence of output records.
//!
//! One JSON object per line, each carrying the record and its decision
//! fingerprint. Malformed lines are skipped on read.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fuselab_core::{DecisionFingerprint, Evaluation, OutputRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub fingerprint: DecisionFingerprint,
    pub record: OutputRecord,
}

impl From<&Evaluation> for HistoryEntry {
    fn from(eval: &Evaluation) -> Self {
        Self {
            fingerprint: eval.fingerprint.clone(),
            record: eval.record.clone(),
        }
    }
}

pub struct RecordHistory {
    path: PathBuf,
}

impl RecordHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append entries in order. Returns the number written.
    pub fn append_all<'e>(&self, entries: impl IntoIterator<Item = &'e HistoryEntry>) -> io::Result<usize> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0;
        for entry in entries {
            let json = serde_json::to_string(entry)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }

    pub fn append(&self, entry: &HistoryEntry) -> io::Result<()> {
        self.append_all([entry]).map(|_| ())
    }

    pub fn read_all(&self) -> io::Result<Vec<HistoryEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut entries = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<HistoryEntry>(&line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
