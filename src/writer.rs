//! Line-oriented text output.
//!
//! Result tables are materialized one line at a time through a [`RecordWriter`].
//! Each call opens, writes and closes the file, so a crash mid-run leaves every
//! completed line on disk.

use crate::error::ResultsResult;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Format of timestamps appended to result files.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Append-oriented text writer.
pub trait RecordWriter: Send + Sync {
    /// Write `line` plus a newline. `append == false` truncates the file first.
    fn write_line(&self, path: &Path, line: &str, append: bool) -> ResultsResult<()>;

    /// Append `text` as its own line.
    fn append_text(&self, path: &Path, text: &str) -> ResultsResult<()> {
        self.write_line(path, text, true)
    }

    /// Append the current local date and time as its own line.
    fn append_timestamp(&self, path: &Path) -> ResultsResult<()> {
        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.append_text(path, &now)
    }
}

/// [`RecordWriter`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFileWriter;

impl RecordWriter for TextFileWriter {
    fn write_line(&self, path: &Path, line: &str, append: bool) -> ResultsResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}
