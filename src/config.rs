//! Persistent service configuration model and defaults.

use std::path::Path;

use log::warn;

use crate::spectrum::SampleFormat;

/// Root configuration read from `medley.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// PCM format requested from the decoder and opened on the sink.
    #[serde(default)]
    pub output: OutputConfig,
    /// Teardown and activation delays.
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Output PCM format preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_channel_count")]
    pub channel_count: u16,
}

/// Grace delays around provider teardown and activation. Tests shrink
/// these; production keeps the defaults.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TimingConfig {
    /// Wait before releasing an unloading audio provider, letting in-flight
    /// sink callbacks drain.
    #[serde(default = "default_grace_ms")]
    pub unload_grace_ms: u64,
    /// Wait between a decode failure and stopping audio output.
    #[serde(default = "default_grace_ms")]
    pub invalid_media_grace_ms: u64,
    /// Delay between selecting a provider and issuing its first play.
    #[serde(default = "default_activation_ms")]
    pub activation_delay_ms: u64,
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_channel_count() -> u16 {
    2
}

fn default_grace_ms() -> u64 {
    2_000
}

fn default_activation_ms() -> u64 {
    1_000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate(),
            channel_count: default_channel_count(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            unload_grace_ms: default_grace_ms(),
            invalid_media_grace_ms: default_grace_ms(),
            activation_delay_ms: default_activation_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from the given path, falling back to defaults
    /// when the file is missing or malformed.
    pub fn load(path: &Path) -> Config {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse {}: {}; using defaults", path.display(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// The sample format the decoder delivers and the analyzer consumes.
    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat::F32
    }
}
