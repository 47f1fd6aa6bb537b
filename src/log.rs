//! Run-scoped append-only log file, plus structured `tracing` diagnostics.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

/// Wraps a run's `output.log`, guaranteeing the file is flushed and closed
/// on every exit path (including early returns from I/O errors further up
/// the call stack) via its `Drop` impl.
pub struct RunLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl RunLog {
    /// Create `runs/<YYYYMMDD-HHMMSS>/output.log`, creating the directory
    /// if needed. Returns the opened log alongside the directory it lives in.
    pub fn create(runs_root: &Path) -> std::io::Result<Self> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let dir = runs_root.join(timestamp);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("output.log");
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line to the run log. Also mirrored through `tracing` so
    /// operators see leveled, timestamped output independent of the file.
    pub fn line(&mut self, message: &str) {
        let _ = writeln!(self.writer, "{message}");
        let _ = self.writer.flush();

        if message.starts_with("[WARN]") {
            warn!("{}", message);
        } else {
            info!("{}", message);
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_writes_under_a_fresh_timestamped_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = RunLog::create(dir.path()).unwrap();
        log.line("[BOOT] Loaded 0 services.");
        drop(log);

        let contents = std::fs::read_to_string(
            std::fs::read_dir(dir.path())
                .unwrap()
                .next()
                .unwrap()
                .unwrap()
                .path()
                .join("output.log"),
        )
        .unwrap();
        assert!(contents.contains("[BOOT] Loaded 0 services."));
    }
}
