//! One-file-per-batch sink.
//!
//! File names are `bulk<unix-seconds>_<worker>.log`, where `<worker>` is the
//! name of the writing thread. Two batches written by the same worker within
//! the same second get a numeric suffix: `bulk<secs>_<worker>_1.log`, ...
//! Files are opened with `create_new`, so an existing file is never
//! overwritten even when two writers race for the same name.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use chrono::Utc;
use tracing::debug;

use bulk_core::{Sink, SinkError, SinkResult};

/// Upper bound on suffix probing for a single timestamp.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Writes every batch to a new file in `dir`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create_unique(&self, stamp: i64, worker: &str) -> Result<(File, PathBuf), SinkError> {
        let mut last_path = self.dir.join(file_name(stamp, worker, 0));

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(file_name(stamp, worker, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    last_path = path;
                }
                Err(source) => return Err(self.io_error(path, source)),
            }
        }

        Err(self.io_error(
            last_path,
            io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
        ))
    }

    fn io_error(&self, path: PathBuf, source: io::Error) -> SinkError {
        SinkError::Io {
            sink: self.name().to_string(),
            path,
            source,
        }
    }
}

impl Sink for FileSink {
    fn accept(&self, batch: &str) -> SinkResult {
        let stamp = Utc::now().timestamp();
        let worker = worker_tag();
        let (mut file, path) = self.create_unique(stamp, &worker)?;

        file.write_all(batch.as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_all())
            .map_err(|source| self.io_error(path.clone(), source))?;

        debug!(path = %path.display(), "Batch written");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

fn file_name(stamp: i64, worker: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("bulk{stamp}_{worker}.log")
    } else {
        format!("bulk{stamp}_{worker}_{attempt}.log")
    }
}

/// Name of the current thread, reduced to file-name-safe characters.
fn worker_tag() -> String {
    let current = thread::current();
    let name = current.name().unwrap_or("main");
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn read_all(dir: &Path) -> Vec<(String, String)> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path();
                let name = path.file_name().unwrap().to_string_lossy().into_owned();
                (name, fs::read_to_string(&path).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_writes_batch_to_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        sink.accept("bulk: a b\n").unwrap();

        let files = read_all(dir.path());
        assert_eq!(files.len(), 1);
        let (name, content) = &files[0];
        assert!(name.starts_with("bulk"));
        assert!(name.ends_with(".log"));
        assert_eq!(content, "bulk: a b\n");
    }

    #[test]
    fn test_same_second_batches_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        for i in 0..5 {
            sink.accept(&format!("bulk: {i}\n")).unwrap();
        }

        let files = read_all(dir.path());
        assert_eq!(files.len(), 5);
        let mut contents: Vec<_> = files.into_iter().map(|(_, c)| c).collect();
        contents.sort();
        assert_eq!(contents[0], "bulk: 0\n");
        assert_eq!(contents[4], "bulk: 4\n");
    }

    #[test]
    fn test_file_name_carries_worker_tag() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        thread::Builder::new()
            .name("file-7".to_string())
            .spawn(move || sink.accept("bulk: x\n").unwrap())
            .unwrap()
            .join()
            .unwrap();

        let files = read_all(dir.path());
        assert!(files[0].0.ends_with("_file-7.log"));
    }

    #[test]
    fn test_missing_directory_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("missing"));

        let err = sink.accept("bulk: a\n").unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
    }

    #[test]
    fn test_file_name_suffix() {
        assert_eq!(file_name(100, "w", 0), "bulk100_w.log");
        assert_eq!(file_name(100, "w", 3), "bulk100_w_3.log");
    }
}
