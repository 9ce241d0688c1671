//! Tracer configuration.

use crate::error::{LeakTraceError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding [`TracerConfig::directory`].
pub const ENV_DIR: &str = "LEAKTRACE_DIR";
/// Environment variable overriding [`TracerConfig::buffer_size`].
pub const ENV_BUFFER_SIZE: &str = "LEAKTRACE_BUFFER_SIZE";
/// Environment variable overriding [`TracerConfig::access_set_limit`].
pub const ENV_ACCESS_SET_LIMIT: &str = "LEAKTRACE_ACCESS_SET_LIMIT";

/// File extension of the object-event stream.
pub const EVENTS_EXTENSION: &str = "events";
/// File extension of the class/method metadata stream.
pub const METADATA_EXTENSION: &str = "classes";

/// Configuration for tracer creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Directory the two stream files are created in.
    pub directory: PathBuf,
    /// Write buffer size of each stream, in bytes.
    ///
    /// Larger buffers mean fewer write calls on the host's hot paths and more
    /// events lost if the process dies without shutting the tracer down.
    pub buffer_size: usize,
    /// Whether to fsync both streams when the tracer closes.
    pub sync_on_close: bool,
    /// Maximum number of entries in the access-deduplication set.
    ///
    /// The set is cleared at every GC boundary anyway; this bounds it for
    /// hosts that go a long time between collections. Reaching the limit
    /// clears the set, so an object may be reported accessed again within the
    /// same epoch.
    pub access_set_limit: usize,
    /// Dump buffered class/method records once this many are pending.
    ///
    /// `None` keeps them in memory until the tracer closes.
    pub metadata_flush_threshold: Option<usize>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("leaktrace"),
            buffer_size: 64 * 1024, // 64 KB
            sync_on_close: true,
            access_set_limit: 1 << 20,
            metadata_flush_threshold: None,
        }
    }
}

impl TracerConfig {
    /// Create a configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `LEAKTRACE_DIR`: output directory
    /// - `LEAKTRACE_BUFFER_SIZE`: stream buffer size in bytes
    /// - `LEAKTRACE_ACCESS_SET_LIMIT`: access-deduplication set bound
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DIR).filter(|s| !s.is_empty()) {
            config.directory = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_BUFFER_SIZE) {
            config.buffer_size = parse_usize(ENV_BUFFER_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_ACCESS_SET_LIMIT) {
            config.access_set_limit = parse_usize(ENV_ACCESS_SET_LIMIT, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the output directory.
    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = dir.into();
        self
    }

    /// Set the stream buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set whether streams are synced on close.
    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    /// Set the access-deduplication set bound.
    pub fn with_access_set_limit(mut self, limit: usize) -> Self {
        self.access_set_limit = limit;
        self
    }

    /// Dump metadata eagerly once `threshold` records are pending.
    pub fn with_metadata_flush_threshold(mut self, threshold: usize) -> Self {
        self.metadata_flush_threshold = Some(threshold);
        self
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(config_error("buffer_size", "must be greater than zero"));
        }
        if self.access_set_limit == 0 {
            return Err(config_error("access_set_limit", "must be greater than zero"));
        }
        if self.metadata_flush_threshold == Some(0) {
            return Err(config_error(
                "metadata_flush_threshold",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Path of the object-event stream for `process_name`.
    pub fn events_path(&self, process_name: &str) -> Result<PathBuf> {
        self.stream_path(process_name, EVENTS_EXTENSION)
    }

    /// Path of the metadata stream for `process_name`.
    pub fn metadata_path(&self, process_name: &str) -> Result<PathBuf> {
        self.stream_path(process_name, METADATA_EXTENSION)
    }

    fn stream_path(&self, process_name: &str, extension: &str) -> Result<PathBuf> {
        let stem = file_stem(process_name)?;
        Ok(self.directory.join(format!("{}.{}", stem, extension)))
    }
}

/// Turn a process name into a file stem.
///
/// Path separators and NUL are replaced so that names such as
/// `com.example.app:remote` or `/system/bin/app_process` stay inside the
/// output directory.
pub fn file_stem(process_name: &str) -> Result<String> {
    if process_name.is_empty() {
        return Err(LeakTraceError::InvalidProcessName {
            name: String::new(),
            cause: "process name is empty".to_string(),
        });
    }

    let stem: String = process_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    if stem == "." || stem == ".." {
        return Err(LeakTraceError::InvalidProcessName {
            name: process_name.to_string(),
            cause: "process name must not be a relative path component".to_string(),
        });
    }

    Ok(stem)
}

fn parse_usize(field: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|e| LeakTraceError::ConfigValue {
        field: field.to_string(),
        cause: format!("'{}' is not a valid size: {}", value, e),
    })
}

fn config_error(field: &str, cause: &str) -> LeakTraceError {
    LeakTraceError::ConfigValue {
        field: field.to_string(),
        cause: cause.to_string(),
    }
}
