//! Configuration management for the lumid daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that defines dimming, gamma, and day-event policy parameters.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::app_context::{AcState, DayTime};

/// Smooth-transition parameters for a single backlight direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransitionCfg {
    /// Whether the change is ramped instead of applied at once.
    #[serde(default = "defaults::smooth")]
    pub smooth: bool,

    /// Backlight fraction changed per ramp step.
    #[serde(default = "defaults::dimmer_step")]
    pub step: f64,

    /// Milliseconds between ramp steps.
    #[serde(default = "defaults::dimmer_timeout_ms")]
    pub timeout_ms: u32,
}

impl Default for TransitionCfg {
    fn default() -> Self {
        Self {
            smooth: defaults::smooth(),
            step: defaults::dimmer_step(),
            timeout_ms: defaults::dimmer_timeout_ms(),
        }
    }
}

/// Idle dimming policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimmerConfig {
    /// Disables the dimmer module entirely.
    #[serde(default)]
    pub disabled: bool,

    /// Backlight fraction applied while dimmed.
    #[serde(default = "defaults::dim_pct")]
    pub dim_pct: f64,

    /// Idle seconds before dimming while on AC power.
    #[serde(default = "defaults::timeout_on_ac")]
    pub timeout_on_ac: u32,

    /// Idle seconds before dimming while on battery.
    #[serde(default = "defaults::timeout_on_battery")]
    pub timeout_on_battery: u32,

    /// Transition used when entering the dimmed state.
    #[serde(default)]
    pub enter: TransitionCfg,

    /// Transition used when restoring the pre-dim level.
    #[serde(default)]
    pub exit: TransitionCfg,
}

impl Default for DimmerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            dim_pct: defaults::dim_pct(),
            timeout_on_ac: defaults::timeout_on_ac(),
            timeout_on_battery: defaults::timeout_on_battery(),
            enter: TransitionCfg::default(),
            exit: TransitionCfg::default(),
        }
    }
}

impl DimmerConfig {
    /// Idle timeout for the given power state; unknown falls open to AC.
    pub fn timeout_for(&self, ac: AcState) -> u32 {
        match ac {
            AcState::OnBattery => self.timeout_on_battery,
            AcState::OnAc | AcState::Unknown => self.timeout_on_ac,
        }
    }

    pub fn set_timeout_for(&mut self, ac: AcState, secs: u32) {
        match ac {
            AcState::OnBattery => self.timeout_on_battery = secs,
            AcState::OnAc | AcState::Unknown => self.timeout_on_ac = secs,
        }
    }
}

/// Color-temperature policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaConfig {
    /// Disables the gamma module entirely.
    #[serde(default)]
    pub disabled: bool,

    /// Target temperature during the day, Kelvin.
    #[serde(default = "defaults::day_temp")]
    pub day_temp: i32,

    /// Target temperature during the night, Kelvin.
    #[serde(default = "defaults::night_temp")]
    pub night_temp: i32,

    /// Derive the temperature from ambient brightness instead of the clock.
    #[serde(default)]
    pub ambient: bool,

    /// Spread phase changes over the whole sunrise/sunset window.
    #[serde(default)]
    pub long_transition: bool,

    /// Whether short transitions are ramped.
    #[serde(default = "defaults::smooth")]
    pub smooth: bool,

    /// Kelvin changed per ramp step on short transitions.
    #[serde(default = "defaults::gamma_step")]
    pub step: i32,

    /// Milliseconds between ramp steps on short transitions.
    #[serde(default = "defaults::gamma_timeout_ms")]
    pub timeout_ms: u32,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            day_temp: defaults::day_temp(),
            night_temp: defaults::night_temp(),
            ambient: false,
            long_transition: false,
            smooth: defaults::smooth(),
            step: defaults::gamma_step(),
            timeout_ms: defaults::gamma_timeout_ms(),
        }
    }
}

impl GammaConfig {
    pub fn temp_for(&self, daytime: DayTime) -> i32 {
        match daytime {
            DayTime::Day => self.day_temp,
            DayTime::Night => self.night_temp,
        }
    }

    pub fn set_temp_for(&mut self, daytime: DayTime, temp: i32) {
        match daytime {
            DayTime::Day => self.day_temp = temp,
            DayTime::Night => self.night_temp = temp,
        }
    }
}

/// Sunrise/sunset schedule used by the daytime module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaytimeConfig {
    /// Local wall-clock sunrise, "HH:MM".
    #[serde(default = "defaults::sunrise")]
    pub sunrise: String,

    /// Local wall-clock sunset, "HH:MM".
    #[serde(default = "defaults::sunset")]
    pub sunset: String,

    /// Half-width of each event transition window, seconds.
    #[serde(default = "defaults::event_duration_secs")]
    pub event_duration_secs: u32,

    /// Seconds between day-event bookkeeping refreshes.
    #[serde(default = "defaults::poll_secs")]
    pub poll_secs: u32,
}

impl Default for DaytimeConfig {
    fn default() -> Self {
        Self {
            sunrise: defaults::sunrise(),
            sunset: defaults::sunset(),
            event_duration_secs: defaults::event_duration_secs(),
            poll_secs: defaults::poll_secs(),
        }
    }
}

/// Main configuration structure for the lumid daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
///
/// dimmer:
///   dim_pct: 0.2
///   timeout_on_ac: 45
///   timeout_on_battery: 20
///
/// gamma:
///   day_temp: 6500
///   night_temp: 4000
///   long_transition: true
///
/// daytime:
///   sunrise: "07:00"
///   sunset: "19:00"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    #[serde(default)]
    pub dimmer: DimmerConfig,

    #[serde(default)]
    pub gamma: GammaConfig,

    #[serde(default)]
    pub daytime: DaytimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            dimmer: DimmerConfig::default(),
            gamma: GammaConfig::default(),
            daytime: DaytimeConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.dimmer.dim_pct) {
            anyhow::bail!(
                "dimmer.dim_pct {} outside [0, 1]",
                self.dimmer.dim_pct
            );
        }
        for (name, temp) in [
            ("gamma.day_temp", self.gamma.day_temp),
            ("gamma.night_temp", self.gamma.night_temp),
        ] {
            if !(1000..=10000).contains(&temp) {
                anyhow::bail!("{name} {temp}K outside the displayable 1000-10000K range");
            }
        }
        let sunrise = parse_wall_clock(&self.daytime.sunrise)
            .with_context(|| format!("Invalid daytime.sunrise '{}'", self.daytime.sunrise))?;
        let sunset = parse_wall_clock(&self.daytime.sunset)
            .with_context(|| format!("Invalid daytime.sunset '{}'", self.daytime.sunset))?;
        if sunrise >= sunset {
            anyhow::bail!(
                "daytime.sunrise '{}' must precede daytime.sunset '{}'",
                self.daytime.sunrise,
                self.daytime.sunset
            );
        }
        if self.daytime.poll_secs == 0 {
            anyhow::bail!("daytime.poll_secs must be positive");
        }
        Ok(())
    }
}

/// Parses an "HH:MM" wall-clock string.
pub fn parse_wall_clock(value: &str) -> Result<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| anyhow::anyhow!("expected HH:MM: {e}"))
}

fn locate_config() -> Result<PathBuf> {
    if let Ok(env_path) = env::var("LUMID_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("lumid/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    let etc = Path::new("/etc/lumid/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Loads and validates the daemon configuration.
///
/// Search order: explicit path, `LUMID_CONFIG`, `$XDG_CONFIG_HOME/lumid/`
/// (or `~/.config/lumid/`), then `/etc/lumid/`. A missing file yields the
/// built-in defaults; a present-but-invalid file is an error.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Config,
    path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self { config, path }
    }

    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => match locate_config() {
                Ok(p) => p,
                Err(_) => {
                    info!("No configuration file found, using defaults");
                    return Ok(Self::new(Config::default(), None));
                }
            },
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;
        Ok(Self::new(config, Some(config_path)))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clones the loaded configuration for the coordinator to own.
    pub fn clone_config(&self) -> Config {
        self.config.clone()
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

mod defaults {
    pub fn smooth() -> bool {
        true
    }

    pub fn dim_pct() -> f64 {
        0.2
    }

    pub fn timeout_on_ac() -> u32 {
        45
    }

    pub fn timeout_on_battery() -> u32 {
        20
    }

    pub fn dimmer_step() -> f64 {
        0.05
    }

    pub fn dimmer_timeout_ms() -> u32 {
        30
    }

    pub fn day_temp() -> i32 {
        6500
    }

    pub fn night_temp() -> i32 {
        4000
    }

    pub fn gamma_step() -> i32 {
        50
    }

    pub fn gamma_timeout_ms() -> u32 {
        300
    }

    pub fn sunrise() -> String {
        "07:00".to_string()
    }

    pub fn sunset() -> String {
        "19:00".to_string()
    }

    pub fn event_duration_secs() -> u32 {
        30 * 60
    }

    pub fn poll_secs() -> u32 {
        30
    }
}
