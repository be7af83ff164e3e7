// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// Physical address of the memory reader register block on the reference board.
pub const DEFAULT_REGISTER_BASE: u64 = 0x44A0_0000;
/// Start of the scratch region handed to the reader.
pub const DEFAULT_WINDOW_BASE: u64 = 0x1000_0000;
pub const DEFAULT_DIVIDE_FACTOR: u32 = 65536;
/// Smallest divide factor for which a nonzero word count can be drawn.
pub const MIN_DIVIDE_FACTOR: u32 = 2;
/// Largest divide factor whose biggest draw still fits `memory_size_lo` in bytes.
pub const MAX_DIVIDE_FACTOR: u32 = u32::MAX / 8 + 1;

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_register_base() -> u64 {
    DEFAULT_REGISTER_BASE
}

fn default_window_base() -> u64 {
    DEFAULT_WINDOW_BASE
}

fn default_divide_factor() -> u32 {
    DEFAULT_DIVIDE_FACTOR
}

fn default_fifo_limit() -> u32 {
    16
}

fn default_drain_per_tick() -> u32 {
    1
}

fn default_freq_hz() -> u32 {
    100_000_000
}

fn default_memory_size() -> String {
    "64MB".to_string()
}

/// How the write cursor is brought back to the window base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicyKind {
    /// Wrap only after `4 x fifo_limit` submissions (hardware-compatible).
    #[default]
    Coupled,
    /// Also wrap when the next buffer would leave `window.size`.
    Bounded,
}

/// Which address the progress line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAddressKind {
    #[default]
    #[serde(alias = "next")]
    Advanced,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    #[default]
    Spin,
    Yield,
    Sleep,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReaderConfig {
    #[serde(default = "default_register_base")]
    pub register_base: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            register_base: DEFAULT_REGISTER_BASE,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    #[serde(default = "default_window_base")]
    pub base: u64,
    #[serde(default)]
    pub size: Option<String>, // e.g. "64MB"
    #[serde(default)]
    pub policy: WindowPolicyKind,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_WINDOW_BASE,
            size: None,
            policy: WindowPolicyKind::default(),
        }
    }
}

/// Initial values of the operator controls. They stay mutable at runtime.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ControlsConfig {
    #[serde(default)]
    pub perform_reading: bool,
    #[serde(default = "default_divide_factor")]
    pub divide_factor: u32,
    #[serde(default)]
    pub dump_statistics: bool,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            perform_reading: false,
            divide_factor: DEFAULT_DIVIDE_FACTOR,
            dump_statistics: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub address: LogAddressKind,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    #[serde(default)]
    pub mode: PollMode,
    #[serde(default)]
    pub interval_us: Option<u64>,
}

/// Parameters of the simulated memory reader used for host runs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_fifo_limit")]
    pub fifo_limit: u32,
    #[serde(default = "default_drain_per_tick")]
    pub drain_per_tick: u32,
    #[serde(default = "default_freq_hz")]
    pub freq_hz: u32,
    #[serde(default = "default_memory_size")]
    pub memory_size: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fifo_limit: default_fifo_limit(),
            drain_per_tick: default_drain_per_tick(),
            freq_hz: default_freq_hz(),
            memory_size: default_memory_size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            reader: ReaderConfig::default(),
            window: WindowConfig::default(),
            controls: ControlsConfig::default(),
            logging: LoggingConfig::default(),
            poll: PollConfig::default(),
            seed: None,
            simulation: SimulationConfig::default(),
        }
    }
}

impl FeedConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read feed config at {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Feed Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        if self.window.base > u32::MAX as u64 {
            anyhow::bail!(
                "Window base {:#x} does not fit the 32-bit address registers",
                self.window.base
            );
        }

        if self.window.base % 8 != 0 {
            anyhow::bail!(
                "Window base {:#x} must be 8-byte aligned",
                self.window.base
            );
        }

        if !(MIN_DIVIDE_FACTOR..=MAX_DIVIDE_FACTOR).contains(&self.controls.divide_factor) {
            anyhow::bail!(
                "Control 'divide_factor' must be in {}..={} (got {})",
                MIN_DIVIDE_FACTOR,
                MAX_DIVIDE_FACTOR,
                self.controls.divide_factor
            );
        }

        match (self.window.policy, self.window_size()?) {
            (WindowPolicyKind::Bounded, None) => {
                anyhow::bail!("Window policy 'bounded' requires 'window.size'");
            }
            (_, Some(0)) => anyhow::bail!("Window 'size' must be greater than zero"),
            (_, Some(size)) if self.window.base.saturating_add(size) > 1u64 << 32 => {
                anyhow::bail!(
                    "Window {:#x}+{:#x} extends past the 32-bit address space",
                    self.window.base,
                    size
                );
            }
            _ => {}
        }

        if self.poll.mode == PollMode::Sleep && self.poll.interval_us.is_none() {
            anyhow::bail!("Poll mode 'sleep' requires 'poll.interval_us'");
        }

        if self.simulation.fifo_limit == 0 {
            anyhow::bail!("Simulation 'fifo_limit' must be greater than zero");
        }

        if self.simulation.drain_per_tick == 0 {
            anyhow::bail!("Simulation 'drain_per_tick' must be greater than zero");
        }

        if self.poll.mode != PollMode::Sleep && self.poll.interval_us.is_some() {
            tracing::warn!(
                "'poll.interval_us' is ignored unless poll mode is 'sleep' (mode: {:?})",
                self.poll.mode
            );
        }

        Ok(())
    }

    /// Window extent in bytes, if one is configured.
    pub fn window_size(&self) -> Result<Option<u64>> {
        self.window
            .size
            .as_deref()
            .map(parse_size)
            .transpose()
            .context("Invalid 'window.size'")
    }

    pub fn simulation_memory_size(&self) -> Result<u64> {
        parse_size(&self.simulation.memory_size).context("Invalid 'simulation.memory_size'")
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_board() {
        let config = FeedConfig::default();
        assert_eq!(config.reader.register_base, 0x44A0_0000);
        assert_eq!(config.window.base, 0x1000_0000);
        assert_eq!(config.controls.divide_factor, 65536);
        assert!(!config.controls.perform_reading);
        assert!(!config.controls.dump_statistics);
        assert_eq!(config.window.policy, WindowPolicyKind::Coupled);
        assert_eq!(config.logging.address, LogAddressKind::Advanced);
        assert_eq!(config.poll.mode, PollMode::Spin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = FeedConfig::from_yaml("{}").unwrap();
        assert_eq!(config, FeedConfig::default());
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
schema_version: "1.0"
reader:
  register_base: 0x43C00000
window:
  base: 0x18000000
  size: "1MB"
  policy: bounded
controls:
  perform_reading: true
  divide_factor: 1024
  dump_statistics: true
logging:
  address: submitted
poll:
  mode: sleep
  interval_us: 250
seed: 7
simulation:
  fifo_limit: 4
  drain_per_tick: 2
"#;
        let config = FeedConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.reader.register_base, 0x43C0_0000);
        assert_eq!(config.window.base, 0x1800_0000);
        assert_eq!(config.window.policy, WindowPolicyKind::Bounded);
        assert_eq!(config.window_size().unwrap(), Some(parse_size("1MB").unwrap()));
        assert!(config.controls.perform_reading);
        assert_eq!(config.controls.divide_factor, 1024);
        assert_eq!(config.logging.address, LogAddressKind::Submitted);
        assert_eq!(config.poll.mode, PollMode::Sleep);
        assert_eq!(config.poll.interval_us, Some(250));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.simulation.fifo_limit, 4);
        assert_eq!(config.simulation.drain_per_tick, 2);
        assert_eq!(config.simulation.freq_hz, 100_000_000);
    }

    #[test]
    fn test_divide_factor_upper_bound() {
        let yaml = format!("controls:\n  divide_factor: {}\n", MAX_DIVIDE_FACTOR);
        let config = FeedConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.controls.divide_factor, 0x2000_0000);

        for factor in [MAX_DIVIDE_FACTOR + 1, u32::MAX] {
            let yaml = format!("controls:\n  divide_factor: {}\n", factor);
            let err = FeedConfig::from_yaml(&yaml).unwrap_err();
            assert!(err.to_string().contains("divide_factor"));
        }
    }

    #[test]
    fn test_invalid_version() {
        let err = FeedConfig::from_yaml("schema_version: \"2.0\"").unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_divide_factor_too_small() {
        for factor in [0, 1] {
            let yaml = format!("controls:\n  divide_factor: {}\n", factor);
            let err = FeedConfig::from_yaml(&yaml).unwrap_err();
            assert!(err.to_string().contains("divide_factor"));
        }
    }

    #[test]
    fn test_bounded_requires_size() {
        let err = FeedConfig::from_yaml("window:\n  policy: bounded\n").unwrap_err();
        assert!(err.to_string().contains("requires 'window.size'"));
    }

    #[test]
    fn test_window_base_must_be_32_bit() {
        let err = FeedConfig::from_yaml("window:\n  base: 0x100000000\n").unwrap_err();
        assert!(err.to_string().contains("32-bit"));
    }

    #[test]
    fn test_window_base_alignment() {
        let err = FeedConfig::from_yaml("window:\n  base: 0x10000004\n").unwrap_err();
        assert!(err.to_string().contains("aligned"));
    }

    #[test]
    fn test_sleep_requires_interval() {
        let err = FeedConfig::from_yaml("poll:\n  mode: sleep\n").unwrap_err();
        assert!(err.to_string().contains("interval_us"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(FeedConfig::from_yaml("controls:\n  turbo: true\n").is_err());
    }

    #[test]
    fn test_zero_fifo_limit_rejected() {
        let err = FeedConfig::from_yaml("simulation:\n  fifo_limit: 0\n").unwrap_err();
        assert!(err.to_string().contains("fifo_limit"));
    }

    #[test]
    fn test_log_address_alias() {
        let config = FeedConfig::from_yaml("logging:\n  address: next\n").unwrap();
        assert_eq!(config.logging.address, LogAddressKind::Advanced);
    }
}
