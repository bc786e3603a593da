//! Tracing subscriber setup for hosts embedding the client.
//!
//! Logs go to stderr by default, never stdout. With a log directory
//! configured, each start rotates `mcp.log` → `mcp.log.1` → … and writes
//! through a line-flushing writer.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::mcp_client::McpError;

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "mcp_stdio=info,warn";

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for the log file; `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
    /// Rotated files kept besides the live one.
    pub keep: u32,
    pub default_filter: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_name: "mcp.log".to_string(),
            keep: 3,
            default_filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

/// Platform data directory for log files.
///
/// Falls back to `~/.mcp-stdio/` when no data directory can be resolved.
pub fn default_log_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-stdio");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-stdio")
}

/// Install the global tracing subscriber.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), McpError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::EnvFilter;

    let (writer, log_path) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| McpError::ConfigError {
                reason: format!("failed to create log dir {}: {e}", dir.display()),
            })?;

            let log_path = dir.join(&config.file_name);
            rotate_log_file(&log_path, config.keep);

            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .map_err(|e| McpError::ConfigError {
                    reason: format!("failed to open {}: {e}", log_path.display()),
                })?;

            (
                BoxMakeWriter::new(FlushingWriter::new(log_file)),
                Some(log_path),
            )
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| McpError::ConfigError {
        reason: format!("failed to install tracing subscriber: {e}"),
    })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = ?log_path,
        pid = std::process::id(),
        "logging initialized"
    );
    Ok(())
}

/// Rotate log files: `mcp.log` → `mcp.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    // Shift: .{n-1} → .{n}
    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// Log file handed to the subscriber. Each event takes the file lock for its
/// whole write and flushes on release, so lines never interleave and survive
/// a crash of the host.
struct FlushingWriter {
    file: Mutex<File>,
}

impl FlushingWriter {
    fn new(file: File) -> Self {
        Self {
            file: Mutex::new(file),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = EventWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter(self.file.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Exclusive access to the log file for one event.
struct EventWriter<'a>(MutexGuard<'a, File>);

impl Write for EventWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl Drop for EventWriter<'_> {
    fn drop(&mut self) {
        let _ = self.0.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("mcp.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(dir.path().join("mcp.log.1"), "one").unwrap();
        std::fs::write(dir.path().join("mcp.log.2"), "two").unwrap();

        rotate_log_file(&base, 2);

        assert!(!base.exists());
        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("mcp.log.1"), "current");
        assert_eq!(read("mcp.log.2"), "one");
        assert!(!dir.path().join("mcp.log.3").exists());
    }

    #[test]
    fn test_rotate_without_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("mcp.log");
        rotate_log_file(&base, 3);
        assert!(!dir.path().join("mcp.log.1").exists());
    }

    #[test]
    fn test_flushing_writer_writes_each_event_through() {
        use tracing_subscriber::fmt::MakeWriter;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let writer = FlushingWriter::new(File::create(&path).unwrap());

        writer.make_writer().write_all(b"line one\n").unwrap();
        {
            let mut event = writer.make_writer();
            event.write_all(b"line ").unwrap();
            event.write_all(b"two\n").unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_init_tracing_writes_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mcp.log"), "previous run\n").unwrap();
        let config = LogConfig {
            log_dir: Some(dir.path().to_path_buf()),
            ..LogConfig::default()
        };

        init_tracing(&config).unwrap();
        tracing::warn!("written through the subscriber");

        let log = std::fs::read_to_string(dir.path().join("mcp.log")).unwrap();
        assert!(log.contains("written through the subscriber"));
        let rotated = std::fs::read_to_string(dir.path().join("mcp.log.1")).unwrap();
        assert_eq!(rotated, "previous run\n");

        // A second global subscriber is refused.
        assert!(init_tracing(&LogConfig::default()).is_err());
    }

    #[test]
    fn test_default_log_dir_is_named_for_the_crate() {
        let dir = default_log_dir();
        assert!(dir.ends_with("mcp-stdio") || dir.ends_with(".mcp-stdio"));
    }
}
