//! Shared runtime configuration: file roots, audio formats, logging.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Severity passed to the host log reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

pub type LogReporter = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Stream metadata of an opened audio file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFileInfo {
    pub channels: u32,
    pub sample_rate: f64,
}

/// An open audio stream handed to scripts for file reads.
pub trait AudioReader: Send {
    fn info(&self) -> AudioFileInfo;
    /// Samples left to read.
    fn avail(&mut self) -> u64;
    /// Move the read pointer back to the beginning.
    fn rewind(&mut self);
    /// Read the next block; returns the sample count actually read.
    fn read(&mut self, samples: &mut [f64]) -> u64;
}

/// Capability set of one audio file format. Formats are registered once
/// on the configuration; dispatch is dynamic only at that boundary.
pub trait AudioFormat: Send + Sync {
    /// Quick check whether this format would handle the file.
    fn can_handle(&self, path: &Path) -> bool;
    fn open(&self, path: &Path) -> Option<Box<dyn AudioReader>>;
}

/// Process-scoped configuration shared by every effect instance.
///
/// Immutable after publication; share it with `Arc::clone`.
#[derive(Default)]
pub struct Config {
    import_root: Option<PathBuf>,
    data_root: Option<PathBuf>,
    formats: Vec<Arc<dyn AudioFormat>>,
    reporter: Option<LogReporter>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn with_import_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.import_root = Some(root.into());
        self
    }

    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = Some(root.into());
        self
    }

    pub fn with_log_reporter(mut self, reporter: LogReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn register_audio_format(mut self, format: Arc<dyn AudioFormat>) -> Self {
        self.formats.push(format);
        self
    }

    pub fn import_root(&self) -> Option<&Path> {
        self.import_root.as_deref()
    }

    pub fn data_root(&self) -> Option<&Path> {
        self.data_root.as_deref()
    }

    pub fn audio_formats(&self) -> &[Arc<dyn AudioFormat>] {
        &self.formats
    }

    /// Find a registered format willing to open `path`.
    pub fn format_for(&self, path: &Path) -> Option<&Arc<dyn AudioFormat>> {
        self.formats.iter().find(|f| f.can_handle(path))
    }

    /// Fill unset roots from the location of a source file: the import
    /// root is its directory; a sibling `Data` directory becomes the data
    /// root.
    pub fn guess_file_roots(&self, source_path: &Path) -> Config {
        let mut import_root = self.import_root.clone();
        let mut data_root = self.data_root.clone();

        let dir = source_path.parent();
        if import_root.is_none() {
            import_root = dir.map(Path::to_path_buf);
        }
        if data_root.is_none() {
            if let Some(dir) = dir {
                if let Some(candidate) = dir
                    .parent()
                    .map(|p| p.join("Data"))
                    .filter(|p| p.is_dir())
                {
                    data_root = Some(candidate);
                }
            }
        }

        Config {
            import_root,
            data_root,
            formats: self.formats.clone(),
            reporter: self.reporter.clone(),
        }
    }

    /// Report through the host callback when set, the `tracing`
    /// subscriber otherwise.
    pub fn log(&self, level: LogLevel, message: &str) {
        match &self.reporter {
            Some(reporter) => reporter(level, message),
            None => match level {
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warning => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_guess_roots() {
        let dir = tempfile::tempdir().unwrap();
        let effects = dir.path().join("Effects");
        std::fs::create_dir_all(&effects).unwrap();
        std::fs::create_dir_all(dir.path().join("Data")).unwrap();
        let source = effects.join("fx.jsfx");
        std::fs::write(&source, "").unwrap();

        let config = Config::new().guess_file_roots(&source);
        assert_eq!(config.import_root(), Some(effects.as_path()));
        assert_eq!(config.data_root(), Some(dir.path().join("Data").as_path()));
    }

    #[test]
    fn test_explicit_roots_win() {
        let config = Config::new()
            .with_import_root("/explicit")
            .guess_file_roots(Path::new("/somewhere/else/fx.jsfx"));
        assert_eq!(config.import_root(), Some(Path::new("/explicit")));
    }

    #[test]
    fn test_log_reporter_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let config = Config::new().with_log_reporter(Arc::new(move |level, msg| {
            assert_eq!(level, LogLevel::Warning);
            assert_eq!(msg, "careful");
            hits2.fetch_add(1, Ordering::SeqCst);
        }));
        config.log(LogLevel::Warning, "careful");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
