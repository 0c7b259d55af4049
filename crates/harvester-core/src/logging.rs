use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// A worker's pair of build-log sinks. Opened lazily on the worker's first
/// task and reused for every task that worker picks up afterwards; the files
/// are append-mode so a re-run extends rather than truncates them.
pub struct WorkerLogs {
    out: BufWriter<File>,
    err: BufWriter<File>,
    total: usize,
}

impl WorkerLogs {
    pub fn open(log_dir: &Path, worker: usize, total: usize) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let out = open_append(&log_dir.join(format!("worker-{worker:03}.out.log")))?;
        let err = open_append(&log_dir.join(format!("worker-{worker:03}.err.log")))?;
        Ok(Self {
            out: BufWriter::new(out),
            err: BufWriter::new(err),
            total,
        })
    }

    pub fn info(&mut self, index: usize, message: &str) {
        let total = self.total;
        let _ = writeln!(self.out, "[{index}/{total}] {message}");
    }

    pub fn error(&mut self, index: usize, message: &str) {
        let total = self.total;
        let _ = writeln!(self.err, "[{index}/{total}] {message}");
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
        let _ = self.err.flush();
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_prefixed_lines_to_both_sinks() {
        let dir = TempDir::new().unwrap();
        let mut logs = WorkerLogs::open(dir.path(), 0, 10).unwrap();
        logs.info(3, "configuring");
        logs.error(3, "phase failed");
        logs.flush();

        let out = std::fs::read_to_string(dir.path().join("worker-000.out.log")).unwrap();
        let err = std::fs::read_to_string(dir.path().join("worker-000.err.log")).unwrap();
        assert_eq!(out, "[3/10] configuring\n");
        assert_eq!(err, "[3/10] phase failed\n");
    }

    #[test]
    fn reopening_appends() {
        let dir = TempDir::new().unwrap();
        {
            let mut logs = WorkerLogs::open(dir.path(), 1, 2).unwrap();
            logs.info(0, "first");
            logs.flush();
        }
        {
            let mut logs = WorkerLogs::open(dir.path(), 1, 2).unwrap();
            logs.info(1, "second");
            logs.flush();
        }
        let out = std::fs::read_to_string(dir.path().join("worker-001.out.log")).unwrap();
        assert_eq!(out, "[0/2] first\n[1/2] second\n");
    }
}
