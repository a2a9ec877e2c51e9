//! # Log Reader
//!
//! Turns the append-only JSON-lines log into an ordered list of `LogRecord`s.
//! The whole file is re-read on every call; there is no cache.
//!
//! Only a file that cannot be opened fails the operation. Malformed lines are
//! skipped and counted, blank lines are ignored, and a read error part way
//! through keeps the records read so far and reports the error on the page.

use serde::Serialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::logrecord::LogRecord;

#[derive(Debug, Error)]
pub enum LogReadError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// # Log Page
///
/// The result of one read: records in file order plus what went wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogPage {
    pub records: Vec<LogRecord>,
    /// Number of malformed lines that were skipped.
    pub skipped: usize,
    /// Set when reading stopped early or the file could not be read at all.
    pub error: Option<String>,
}

impl LogPage {
    /// An empty page carrying only an error message, for a failed render.
    pub fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Reads every well-formed record of the log at `path`.
pub fn read_all(path: &Path) -> Result<LogPage, LogReadError> {
    read_with_limit(path, None)
}

/// Like `read_all`, but keeps only the last `limit` well-formed records.
pub fn read_tail(path: &Path, limit: usize) -> Result<LogPage, LogReadError> {
    read_with_limit(path, Some(limit))
}

fn read_with_limit(path: &Path, limit: Option<usize>) -> Result<LogPage, LogReadError> {
    let file = File::open(path).map_err(|source| LogReadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut records = VecDeque::new();
    let mut page = LogPage::default();

    for (index, line) in reader.split(b'\n').enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!(param = path.display().to_string(); "Log read stopped at line {}: {}", index + 1, e);
                page.error = Some(format!("read stopped at line {}: {}", index + 1, e));
                break;
            }
        };

        let Ok(text) = std::str::from_utf8(&line) else {
            log::warn!(param = path.display().to_string(); "Skipping non UTF-8 log line {}", index + 1);
            page.skipped += 1;
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match LogRecord::from_json_line(text) {
            Ok(record) => {
                if limit == Some(records.len()) {
                    records.pop_front();
                }
                if limit != Some(0) {
                    records.push_back(record);
                }
            }
            Err(e) => {
                log::warn!(param = path.display().to_string(); "Skipping malformed log line {}: {}", index + 1, e);
                page.skipped += 1;
            }
        }
    }

    page.records = records.into();
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(i: usize) -> LogRecord {
        LogRecord::new(
            format!("2024-01-15T10:00:{:02}+00:00", i),
            if i % 2 == 0 { "info" } else { "warn" },
            "server_nest::nest_logic::downstream",
            format!("message {}", i),
            if i % 3 == 0 { String::new() } else { format!("param-{}", i) },
        )
    }

    fn write_log(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_all_preserves_order_and_fields() {
        let expected: Vec<LogRecord> = (0..7).map(record).collect();
        let lines: Vec<String> = expected.iter().map(|r| r.to_json_line().unwrap()).collect();
        let file = write_log(&lines);

        let page = read_all(file.path()).unwrap();
        assert_eq!(page.records, expected);
        assert_eq!(page.skipped, 0);
        assert_eq!(page.error, None);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let good: Vec<LogRecord> = (0..4).map(record).collect();
        let lines = vec![
            good[0].to_json_line().unwrap(),
            "not json at all".to_string(),
            good[1].to_json_line().unwrap(),
            r#"{"msg": "truncated"#.to_string(),
            String::new(),
            good[2].to_json_line().unwrap(),
            "[1, 2, 3]".to_string(),
            good[3].to_json_line().unwrap(),
        ];
        let file = write_log(&lines);

        let page = read_all(file.path()).unwrap();
        assert_eq!(page.records, good);
        assert_eq!(page.skipped, 3);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", record(1).to_json_line().unwrap()).unwrap();
        file.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        writeln!(file, "{}", record(2).to_json_line().unwrap()).unwrap();
        file.flush().unwrap();

        let page = read_all(file.path()).unwrap();
        assert_eq!(page.records, vec![record(1), record(2)]);
        assert_eq!(page.skipped, 1);
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nest.log");

        match read_all(&missing) {
            Err(LogReadError::Open { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected an open failure, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_yields_empty_page() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(read_all(file.path()).unwrap(), LogPage::default());
    }

    #[test]
    fn test_read_tail_keeps_last_records() {
        let all: Vec<LogRecord> = (0..10).map(record).collect();
        let mut lines: Vec<String> = all.iter().map(|r| r.to_json_line().unwrap()).collect();
        lines.insert(8, "garbage".to_string());
        let file = write_log(&lines);

        let page = read_tail(file.path(), 3).unwrap();
        assert_eq!(page.records, all[7..].to_vec());
        assert_eq!(page.skipped, 1);

        assert!(read_tail(file.path(), 0).unwrap().records.is_empty());
        assert_eq!(read_tail(file.path(), 50).unwrap().records, all);
    }

    #[test]
    fn test_failed_page_carries_message() {
        let page = LogPage::failed("cannot open log file");
        assert!(page.records.is_empty());
        assert_eq!(page.error.as_deref(), Some("cannot open log file"));
    }
}
