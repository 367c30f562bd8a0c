//! Configuration system for Tandem CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tandem_core::SwapConfig;

/// Largest accepted read or write block (64 MiB)
const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Largest accepted sink queue depth
const MAX_QUEUE_DEPTH: usize = 1024;

/// Accepted `logging.level` values
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Tandem configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// File selection configuration
    #[serde(default)]
    pub files: FilesConfig,
    /// Swap engine configuration
    #[serde(default)]
    pub swap: SwapSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// File selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory scanned for candidate files
    #[serde(default = "default_path_to_files")]
    pub path_to_files: PathBuf,
    /// Accept `-<digits>.log` names
    #[serde(default)]
    pub allow_negative_names: bool,
}

/// Swap engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapSettings {
    /// Bytes per read
    #[serde(default = "default_block_size")]
    pub read_block_size: usize,
    /// Bytes per accumulated write
    #[serde(default = "default_block_size")]
    pub write_block_size: usize,
    /// Capacity of each sink queue, in blocks
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_path_to_files() -> PathBuf {
    PathBuf::from("./data")
}

fn default_block_size() -> usize {
    tandem_core::DEFAULT_BLOCK_SIZE
}

fn default_queue_depth() -> usize {
    tandem_core::DEFAULT_QUEUE_DEPTH
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            path_to_files: default_path_to_files(),
            allow_negative_names: false,
        }
    }
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            read_block_size: default_block_size(),
            write_block_size: default_block_size(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path
            .as_ref()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("configs/config.toml")
    }

    /// Load config from `path`, falling back to defaults only for the
    /// default path
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly requested file is missing or if
    /// reading or parsing fails.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else if path == Self::default_path() {
            Ok(Self::default())
        } else {
            anyhow::bail!("Config file not found: {}", path.display())
        }
    }

    /// Swap engine parameters
    #[must_use]
    pub fn swap_config(&self) -> SwapConfig {
        SwapConfig::new(self.swap.read_block_size, self.swap.write_block_size)
            .with_queue_depth(self.swap.queue_depth)
    }

    /// Configured log level, lowercased, if it is a known level
    #[must_use]
    pub fn log_level(&self) -> Option<&'static str> {
        let level = self.logging.level.to_lowercase();
        VALID_LOG_LEVELS.into_iter().find(|valid| *valid == level)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.files.path_to_files.as_os_str().is_empty() {
            anyhow::bail!("path_to_files must not be empty");
        }

        // Validate block sizes
        for (name, size) in [
            ("Read block size", self.swap.read_block_size),
            ("Write block size", self.swap.write_block_size),
        ] {
            if size == 0 || size > MAX_BLOCK_SIZE {
                anyhow::bail!("{name} must be between 1 byte and 64MB (got {size})");
            }
        }

        if self.swap.queue_depth == 0 || self.swap.queue_depth > MAX_QUEUE_DEPTH {
            anyhow::bail!(
                "Queue depth must be between 1 and {MAX_QUEUE_DEPTH} (got {})",
                self.swap.queue_depth
            );
        }

        // Validate log level
        if self.log_level().is_none() {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }
}
