//! Configuration for nextprof
//!
//! Loaded from a TOML file when one is given, otherwise defaults. Every
//! section and key is optional.
//!
//! ```toml
//! [network]
//! host = "192.168.1.20"
//! port_tcp = 7623
//!
//! [record]
//! file = true
//! tcp = false
//! threaded = true
//!
//! [profile]
//! stack_size = 0x800
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::profiling::sampler::STACK_SCRATCH_SIZE;
use nextprof_common::SAMPLE_FIXED_SIZE;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Socket sink destination
    #[serde(default)]
    pub network: NetworkConfig,

    /// Record sinks and buffering
    #[serde(default)]
    pub record: RecordConfig,

    /// Sampling parameters
    #[serde(default)]
    pub profile: ProfileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Host receiving the record stream; the socket sink is skipped when empty
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port_tcp")]
    pub port_tcp: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port_tcp: default_port_tcp(),
        }
    }
}

fn default_port_tcp() -> u16 {
    7623
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordConfig {
    /// Write records to a timestamped file
    #[serde(default = "default_true")]
    pub file: bool,

    /// Stream records to `network.host`
    #[serde(default = "default_true")]
    pub tcp: bool,

    /// Flush from a background writer thread
    #[serde(default)]
    pub threaded: bool,

    /// Directory for record files
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Total record buffer size in bytes (split in two when threaded)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            file: true,
            tcp: true,
            threaded: false,
            directory: default_directory(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from("nextprof")
}

fn default_buffer_size() -> usize {
    0x10_0000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileConfig {
    /// Core cycles between two samples
    #[serde(default = "default_instruction_interval")]
    pub instruction_interval: u64,

    /// Per-thread cap on captured stack bytes
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,

    /// Capacity of the attached-thread table
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            instruction_interval: default_instruction_interval(),
            stack_size: default_stack_size(),
            max_threads: default_max_threads(),
        }
    }
}

fn default_instruction_interval() -> u64 {
    10_000_000
}

fn default_stack_size() -> usize {
    0x400
}

fn default_max_threads() -> usize {
    32
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The effective settings as TOML, in the layout [`Config::from_file`] reads.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if a value has no TOML representation
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Largest record the sampler can produce with this configuration.
    #[must_use]
    pub fn max_record_size(&self) -> usize {
        SAMPLE_FIXED_SIZE + (self.profile.stack_size.min(STACK_SCRATCH_SIZE) & !3)
    }

    /// Bytes available to the producer between two flushes.
    #[must_use]
    pub fn flush_region_size(&self) -> usize {
        if self.record.threaded {
            self.record.buffer_size / 2
        } else {
            self.record.buffer_size
        }
    }

    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first violated constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.instruction_interval == 0 {
            return Err(ConfigError::Invalid(
                "profile.instruction_interval must be > 0".into(),
            ));
        }
        if self.profile.max_threads == 0 {
            return Err(ConfigError::Invalid(
                "profile.max_threads must be >= 1".into(),
            ));
        }
        let region = self.flush_region_size();
        let needed = self.max_record_size();
        if region < needed {
            return Err(ConfigError::Invalid(format!(
                "record.buffer_size leaves {region} bytes per flush, \
                 but a single record can take {needed}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.port_tcp, 7623);
        assert!(config.record.file);
        assert!(config.record.tcp);
        assert!(!config.record.threaded);
        assert_eq!(config.record.buffer_size, 0x10_0000);
        assert_eq!(config.profile.instruction_interval, 10_000_000);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[record]\nthreaded = true\n\n[profile]\nstack_size = 0x800"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.record.threaded);
        assert!(config.record.file);
        assert_eq!(config.profile.stack_size, 0x800);
        assert_eq!(config.profile.max_threads, 32);
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[record\nfile = yes").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err
            .to_string()
            .contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_buffer_must_hold_largest_record() {
        let mut config = Config::default();
        config.record.buffer_size = 0x400;
        assert!(config.validate().is_err());

        // Stack slices are clamped to the scratch buffer, so huge caps don't matter
        config.record.buffer_size = 0x10_0000;
        config.profile.stack_size = usize::MAX;
        assert_eq!(
            config.max_record_size(),
            SAMPLE_FIXED_SIZE + STACK_SCRATCH_SIZE
        );
        assert!(config.validate().is_ok());

        config.record.threaded = true;
        config.record.buffer_size = 2 * config.max_record_size() - 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_config_reloads() {
        let mut config = Config::default();
        config.network.host = "192.168.1.20".into();
        config.record.threaded = true;

        let text = config.to_toml().unwrap();
        assert!(text.contains("port_tcp = 7623"));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        assert_eq!(Config::from_file(file.path()).unwrap(), config);

        config.profile.stack_size = usize::MAX;
        assert!(matches!(config.to_toml(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.profile.instruction_interval = 0;
        assert!(config.validate().is_err());
    }
}
