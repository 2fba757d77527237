use std::path::{Path, PathBuf};

/// Scratch directory used when none is configured.
pub const DEFAULT_TEMP_DIR: &str = "/tmp/batspp";

/// External configuration read by semantic analysis.
///
/// Build it by chaining:
///
/// ```
/// use batspp::Settings;
///
/// let settings = Settings::new()
///     .source("helpers.bash")
///     .visible_path("./bin")
///     .temp_dir("/tmp/run");
/// assert_eq!(settings.sources.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directories prepended to `PATH` before the tests run.
    pub visible_paths: Vec<PathBuf>,
    /// Files sourced once before the tests run.
    pub sources: Vec<PathBuf>,
    pub temp_dir: PathBuf,
    /// Directory whose contents are copied into each test's folder.
    pub copy_dir: PathBuf,
    /// Shell redirection used for debug output.
    pub debug_sink: String,
    /// Skip `shopt -s expand_aliases` in the one-time setup.
    pub disable_aliases: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            visible_paths: Vec::new(),
            sources: Vec::new(),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            copy_dir: PathBuf::new(),
            debug_sink: String::new(),
            disable_aliases: false,
        }
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory to `PATH`. Empty paths are ignored.
    #[must_use]
    pub fn visible_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !is_blank(&path) {
            self.visible_paths.push(path);
        }
        self
    }

    #[must_use]
    pub fn visible_paths<P: Into<PathBuf>>(self, paths: impl IntoIterator<Item = P>) -> Self {
        paths
            .into_iter()
            .fold(self, |settings, path| settings.visible_path(path))
    }

    /// Add a file to source. Empty paths are ignored.
    #[must_use]
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !is_blank(&path) {
            self.sources.push(path);
        }
        self
    }

    #[must_use]
    pub fn sources<P: Into<PathBuf>>(self, paths: impl IntoIterator<Item = P>) -> Self {
        paths
            .into_iter()
            .fold(self, |settings, path| settings.source(path))
    }

    #[must_use]
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }

    #[must_use]
    pub fn copy_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.copy_dir = path.into();
        self
    }

    #[must_use]
    pub fn debug_sink(mut self, sink: impl Into<String>) -> Self {
        self.debug_sink = sink.into();
        self
    }

    #[must_use]
    pub const fn disable_aliases(mut self, disable: bool) -> Self {
        self.disable_aliases = disable;
        self
    }
}
