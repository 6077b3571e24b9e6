//! Store configuration.

use crate::error::{Error, Result};
use crate::hash::{Algorithm, DEFAULT_BUFFER_SIZE};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default scratch directory name, created under the root.
pub const SCRATCH_DIR_NAME: &str = "temporary";

/// Configuration for a [`crate::Store`].
///
/// Each store instance owns its own paths, so several stores with distinct
/// roots can live in one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreConfig {
    /// Directory holding the shard subdirectories.
    pub root: PathBuf,
    /// Directory for in-flight uploads.
    pub scratch: PathBuf,
    /// Hash algorithm; also fixes the expected digest length.
    pub algorithm: Algorithm,
    /// Chunk size for streaming uploads.
    pub buffer_size: usize,
}

impl StoreConfig {
    /// Defaults: scratch at `<root>/temporary`, SHA-256, 64 KiB chunks.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            scratch: root.join(SCRATCH_DIR_NAME),
            root,
            algorithm: Algorithm::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_scratch<P: AsRef<Path>>(mut self, scratch: P) -> Self {
        self.scratch = scratch.as_ref().to_path_buf();
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Load a config file.
    ///
    /// Format is one `key=value` per line, `#` starts a comment:
    ///
    /// ```text
    /// version=1
    /// root=/var/lib/hashguard
    /// scratch=/var/lib/hashguard/temporary
    /// algo=sha256
    /// buffer_size=65536
    /// ```
    ///
    /// Relative paths are resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base).map_err(|reason| Error::invalid_config(path, reason))
    }

    /// Parse config file content. Errors are returned as plain reasons.
    fn parse(content: &str, base: &Path) -> std::result::Result<Self, String> {
        let mut version = None;
        let mut root = None;
        let mut scratch = None;
        let mut algo = None;
        let mut buffer_size = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("Expected key=value, got {:?}", line));
            };
            let value = value.trim();
            match key.trim() {
                "version" => version = Some(value),
                "root" => root = Some(base.join(value)),
                "scratch" => scratch = Some(base.join(value)),
                "algo" => algo = Some(value),
                "buffer_size" => {
                    let size = value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid buffer_size: {}", value))?;
                    buffer_size = Some(size);
                }
                other => return Err(format!("Unknown key: {}", other)),
            }
        }

        if let Some(v) = version {
            if v != "1" {
                return Err(format!("Unsupported config version: {}", v));
            }
        }

        let root = root.ok_or("Missing root")?;
        let mut config = StoreConfig::new(root);
        if let Some(scratch) = scratch {
            config.scratch = scratch;
        }
        if let Some(algo) = algo {
            config.algorithm = Algorithm::parse(algo).map_err(|e| e.to_string())?;
        }
        if let Some(size) = buffer_size {
            config.buffer_size = size;
        }
        config.check().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Reject configurations the store cannot operate with.
    pub fn validate(&self) -> Result<()> {
        self.check()
            .map_err(|reason| Error::invalid_config(&self.root, reason))
    }

    fn check(&self) -> std::result::Result<(), &'static str> {
        if self.buffer_size == 0 {
            return Err("buffer_size must be positive");
        }
        if self.scratch == self.root {
            return Err("scratch must differ from root");
        }
        // A two-character directory directly under the root would be read as a shard.
        let scratch_is_shard_like = self.scratch.parent() == Some(self.root.as_path())
            && self
                .scratch
                .file_name()
                .is_some_and(|name| name.len() == 2);
        if scratch_is_shard_like {
            return Err("scratch directory name collides with shard layout");
        }
        Ok(())
    }
}
