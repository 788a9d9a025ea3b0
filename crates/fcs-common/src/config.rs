//! Configuration structures for the field control service.
//!
//! Supports TOML deserialization with sensible defaults for development
//! and explicit values for event deployment. `FieldOptions` is the
//! operator-facing knob set; replacing it at runtime triggers a full
//! recompilation of the named packet set.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Operator-configurable field options.
///
/// One logical instance per event. Immutable input to the packet compiler;
/// an empty controller address means the device is intentionally absent and
/// no connection is opened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    /// LED count of a single nexus goal segment.
    pub goal_led_length: u8,

    /// LED count of the center ramp segment.
    pub ramp_led_length: u8,

    /// Hex color shown on all strips when the field is all clear.
    pub all_clear_color: String,

    /// Hex color shown on all strips while the field is being prepared.
    pub prepare_field_color: String,

    /// Hex color shown on all strips during a field fault.
    pub field_fault_color: String,

    /// Hex color for red alliance goals at match end.
    pub match_end_red_nexus_goal_color: String,

    /// Hex color for blue alliance goals at match end.
    pub match_end_blue_nexus_goal_color: String,

    /// Hex color for the ramp at match end.
    pub match_end_ramp_color: String,

    /// Network address of the red alliance LED controller ("" = absent).
    pub red_wled_address: String,

    /// Network address of the blue alliance LED controller ("" = absent).
    pub blue_wled_address: String,

    /// Network address of the center LED controller ("" = absent).
    pub center_wled_address: String,

    /// Motor setpoint used while producing game pieces.
    pub food_production_motor_setpoint: f64,

    /// How long the production setpoint is held.
    #[serde(with = "humantime_serde")]
    pub food_production_motor_duration: Duration,

    /// Motor setpoint used to reset goals between matches.
    pub food_reset_motor_setpoint: f64,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            goal_led_length: 23,
            ramp_led_length: 90,
            all_clear_color: String::from("00ff00"),
            prepare_field_color: String::from("ffff00"),
            field_fault_color: String::from("ff0000"),
            match_end_red_nexus_goal_color: String::from("ff0000"),
            match_end_blue_nexus_goal_color: String::from("0000ff"),
            match_end_ramp_color: String::from("ff00ff"),
            red_wled_address: String::new(),
            blue_wled_address: String::new(),
            center_wled_address: String::new(),
            food_production_motor_setpoint: 1.0,
            food_production_motor_duration: Duration::from_secs(5),
            food_reset_motor_setpoint: -0.5,
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Service tick period for PLC polling and session upkeep.
    ///
    /// Must stay well under the PLC's coil watchdog window.
    #[serde(with = "humantime_serde")]
    pub tick_period: Duration,

    /// PLC network address (Modbus TCP host, port 502).
    pub plc_address: String,

    /// Field hardware options.
    pub field: FieldOptions,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            plc_address: String::from("10.0.100.10"),
            field: FieldOptions::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
