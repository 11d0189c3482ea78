//! Configuration system using Figment
//!
//! Configuration is layered, highest precedence last:
//! 1. Built-in defaults (the values the plugin ships with)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `MONOCHROMATOR_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated with a double underscore:
//!
//! ```text
//! MONOCHROMATOR_APPLICATION__LOG_LEVEL=debug
//! MONOCHROMATOR_AXIS__EPSILON=0.05
//! MONOCHROMATOR_AXIS__BOUNDS__ENABLED=true
//! MONOCHROMATOR_DRIVER__SPEED_NM_PER_S=250
//! ```
//!
//! # Example
//!
//! ```no_run
//! use daq_monochromator::config::MonochromatorConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = MonochromatorConfig::load_from(Some("monochromator.toml"))?;
//!     println!("Axis unit: {}", config.axis.units);
//!     println!("Tau: {} ms", config.settings.tau_ms);
//!     Ok(())
//! }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::units;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "MONOCHROMATOR_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The layered sources could not be merged or deserialized.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// A value parsed but is not acceptable.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonochromatorConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Host-side axis behaviour
    #[serde(default)]
    pub axis: AxisConfig,
    /// Initial values of the plugin settings
    #[serde(default)]
    pub settings: PluginSettingsConfig,
    /// Simulated spectrometer
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "monochromator".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Host-side behaviour of the actuator axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Axis unit, fixed for the lifetime of the actuator
    #[serde(default = "default_units")]
    pub units: String,
    /// Distance to target under which a move counts as done
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Move timeout in seconds
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
    /// Interval between position polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional clamping of targets
    #[serde(default)]
    pub bounds: BoundsConfig,
    /// Optional linear scaling between device and display units
    #[serde(default)]
    pub scaling: ScalingConfig,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            units: default_units(),
            epsilon: default_epsilon(),
            timeout_s: default_timeout_s(),
            poll_interval_ms: default_poll_interval_ms(),
            bounds: BoundsConfig::default(),
            scaling: ScalingConfig::default(),
        }
    }
}

/// Target clamping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsConfig {
    /// Apply the bounds
    #[serde(default)]
    pub enabled: bool,
    /// Lower bound in axis units
    #[serde(default)]
    pub min: f64,
    /// Upper bound in axis units
    #[serde(default = "default_max_bound")]
    pub max: f64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min: 0.0,
            max: default_max_bound(),
        }
    }
}

/// Linear scaling, `displayed = device * scaling + offset`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Apply the scaling
    #[serde(default)]
    pub enabled: bool,
    /// Multiplicative factor
    #[serde(default = "default_scaling")]
    pub scaling: f64,
    /// Additive offset in display units
    #[serde(default)]
    pub offset: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scaling: default_scaling(),
            offset: 0.0,
        }
    }
}

/// Initial plugin settings shown before the driver is read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettingsConfig {
    /// Time constant in milliseconds
    #[serde(default = "default_tau_ms")]
    pub tau_ms: f64,
    /// Initially selected grating
    #[serde(default = "default_grating")]
    pub grating: String,
    /// Grating options before the driver reports its own
    #[serde(default = "default_grating_choices")]
    pub grating_choices: Vec<String>,
}

impl Default for PluginSettingsConfig {
    fn default() -> Self {
        Self {
            tau_ms: default_tau_ms(),
            grating: default_grating(),
            grating_choices: default_grating_choices(),
        }
    }
}

/// Simulated spectrometer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Wavelength at power-up in nm
    #[serde(default = "default_initial_wavelength")]
    pub initial_wavelength_nm: f64,
    /// Wavelength reached by `find_reference` in nm
    #[serde(default = "default_reference_wavelength")]
    pub reference_wavelength_nm: f64,
    /// Slew rate in nm/s (0 = instantaneous)
    #[serde(default = "default_speed")]
    pub speed_nm_per_s: f64,
    /// Time constant at power-up in seconds
    #[serde(default = "default_tau_s")]
    pub tau_s: f64,
    /// Installed gratings
    #[serde(default = "default_gratings")]
    pub gratings: Vec<String>,
    /// Lowest reachable wavelength in nm
    #[serde(default)]
    pub min_wavelength_nm: f64,
    /// Highest reachable wavelength in nm
    #[serde(default = "default_max_wavelength")]
    pub max_wavelength_nm: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            initial_wavelength_nm: default_initial_wavelength(),
            reference_wavelength_nm: default_reference_wavelength(),
            speed_nm_per_s: default_speed(),
            tau_s: default_tau_s(),
            gratings: default_gratings(),
            min_wavelength_nm: 0.0,
            max_wavelength_nm: default_max_wavelength(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_units() -> String {
    "nm".to_string()
}

fn default_epsilon() -> f64 {
    0.1
}

fn default_timeout_s() -> f64 {
    20.0
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_bound() -> f64 {
    1.0
}

fn default_scaling() -> f64 {
    1.0
}

fn default_tau_ms() -> f64 {
    1234.0
}

fn default_grating() -> String {
    "a".to_string()
}

fn default_grating_choices() -> Vec<String> {
    vec!["a".to_string(), "b".to_string()]
}

fn default_initial_wavelength() -> f64 {
    500.0
}

fn default_reference_wavelength() -> f64 {
    600.0
}

fn default_speed() -> f64 {
    100.0
}

fn default_tau_s() -> f64 {
    0.1
}

fn default_gratings() -> Vec<String> {
    vec!["G300".to_string(), "G1200".to_string()]
}

fn default_max_wavelength() -> f64 {
    2000.0
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl MonochromatorConfig {
    /// Build the figment for an optional TOML file plus environment overrides.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from defaults, an optional TOML file, and the environment.
    ///
    /// A missing file is not an error; figment simply skips it.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the sources cannot be merged or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref().map(AsRef::as_ref))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if !units::is_length_unit(&self.axis.units) {
            return Err(ConfigError::ValidationError(format!(
                "Unsupported axis unit '{}'",
                self.axis.units
            )));
        }

        if self.axis.epsilon.is_nan() || self.axis.epsilon <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "epsilon must be positive, got {}",
                self.axis.epsilon
            )));
        }

        if self.axis.timeout_s.is_nan() || self.axis.timeout_s <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "timeout_s must be positive, got {}",
                self.axis.timeout_s
            )));
        }

        if self.axis.bounds.enabled && self.axis.bounds.min > self.axis.bounds.max {
            return Err(ConfigError::ValidationError(format!(
                "bounds.min ({}) is greater than bounds.max ({})",
                self.axis.bounds.min, self.axis.bounds.max
            )));
        }

        if self.axis.scaling.enabled && self.axis.scaling.scaling == 0.0 {
            return Err(ConfigError::ValidationError(
                "scaling factor must not be zero".to_string(),
            ));
        }

        if self.settings.grating_choices.is_empty() || self.driver.gratings.is_empty() {
            return Err(ConfigError::ValidationError(
                "grating lists must not be empty".to_string(),
            ));
        }

        if self.driver.min_wavelength_nm > self.driver.max_wavelength_nm {
            return Err(ConfigError::ValidationError(format!(
                "driver wavelength range is inverted ({} > {})",
                self.driver.min_wavelength_nm, self.driver.max_wavelength_nm
            )));
        }

        if self.driver.speed_nm_per_s < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "speed_nm_per_s must not be negative, got {}",
                self.driver.speed_nm_per_s
            )));
        }

        Ok(())
    }
}
