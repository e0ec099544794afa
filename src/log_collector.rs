//! Decoupled run log for benchmark sessions.
//!
//! Every `log::*` record is pushed onto an unbounded crossbeam channel and
//! written to disk by a dedicated OS thread, so a kernel's timed region never
//! waits on file IO. Records at or above the console level are echoed to
//! stderr as well.
//!
//! ```text
//! log::info!() ... [LogCollector] --(crossbeam)--> [disk thread] --> <dir>/corebench-<ts>.log
//!                        |
//!                        +--> stderr (console level and above)
//! ```

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Default run log directory: `<data dir>/corebench/logs`, or `./logs`.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("corebench").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// A formatted log line with its capture time.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }
}

/// `log` backend that persists every record of one run to a session file.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    session_path: PathBuf,
    console_level: LevelFilter,
}

impl LogCollector {
    /// Create the log directory and session file, and start the disk thread.
    pub fn new(log_dir: &Path, console_level: LevelFilter) -> Result<Self, String> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create log dir {}: {}", log_dir.display(), e))?;

        let session_path = log_dir.join(format!(
            "corebench-{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&session_path)
            .map_err(|e| format!("Failed to open {}: {}", session_path.display(), e))?;

        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::Builder::new()
            .name("corebench-log".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => write_line(&mut file, &line),
                        LogMessage::Flush(done) => {
                            let _ = file.flush();
                            let _ = file.sync_data();
                            let _ = done.send(());
                        }
                    }
                }
            })
            .map_err(|e| format!("Failed to spawn log thread: {}", e))?;

        Ok(LogCollector {
            tx,
            session_path,
            console_level,
        })
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Queue a line for the disk thread. Never blocks.
    pub fn log_str(&self, message: impl Into<String>) {
        let _ = self.tx.send(LogMessage::Line(LogLine::new(message.into())));
    }

    /// Block until every line queued before this call is on disk.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        done_rx
            .recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }

    /// Register a clone of this collector as the global `log` backend.
    pub fn install(&self, max_level: LevelFilter) -> Result<(), String> {
        log::set_boxed_logger(Box::new(self.clone()))
            .map(|()| log::set_max_level(max_level))
            .map_err(|e| format!("Failed to set global logger: {}", e))
    }
}

fn write_line(file: &mut File, line: &LogLine) {
    let formatted = format!("[{}] {}\n", line.timestamp, line.message);
    let _ = file.write_all(formatted.as_bytes());
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{}] {}", record.level(), record.args());
        if record.level() <= self.console_level {
            eprintln!("{}", message);
        }
        self.log_str(message);
    }

    fn flush(&self) {
        let _ = self.wait_for_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_log_collector_creates_session_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("logs");
        let collector = LogCollector::new(&dir, LevelFilter::Off).unwrap();

        assert!(collector.session_path().exists());
        assert!(collector.session_path().starts_with(&dir));
        let name = collector.session_path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("corebench-") && name.ends_with(".log"));
    }

    #[test]
    fn test_flush_persists_everything_queued() {
        let temp_dir = TempDir::new().unwrap();
        let collector = LogCollector::new(temp_dir.path(), LevelFilter::Off).unwrap();

        for i in 0..1000 {
            collector.log_str(format!("Log message {}", i));
        }
        collector.wait_for_empty().unwrap();

        let content = fs::read_to_string(collector.session_path()).unwrap();
        assert_eq!(content.lines().count(), 1000);
        assert!(content.lines().last().unwrap().ends_with("Log message 999"));
    }

    // The only test in this binary that installs the global logger.
    #[test]
    fn test_installed_collector_receives_log_macros() {
        let temp_dir = TempDir::new().unwrap();
        let collector = LogCollector::new(temp_dir.path(), LevelFilter::Off).unwrap();
        collector.install(LevelFilter::Info).unwrap();

        log::info!("[TEST] routed through the global logger");
        log::debug!("[TEST] below the installed level");
        log::logger().flush();

        let content = fs::read_to_string(collector.session_path()).unwrap();
        assert!(content.contains("[INFO] [TEST] routed through the global logger"));
        assert!(!content.contains("below the installed level"));
    }
}
