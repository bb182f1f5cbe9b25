//! Tunables shared by the lab tools. The defaults match the firmware used in
//! the course; a [ron] document can override any of them:
//!
//! ```text
//! (
//!     task_periods_s: {1: 1.0, 2: 2.0, 3: 4.0},
//!     rssi_step_db: 5.0,
//!     baud_rate: 115200,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    fs::File,
    io::Read,
    path::Path,
};

/// Settings for trace conversion, unit conversion and the live monitor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LabConfig {
    /// Release period of each task, in seconds, keyed by task index
    pub task_periods_s: BTreeMap<u32, f64>,
    /// Width of one RSSI bin as displayed by the node, in dB
    pub rssi_step_db: f64,
    /// Feet to meters factor applied to measured distances
    pub feet_to_meters: f64,
    /// Prefix marking control lines in the node's UART output
    pub ctrl_prefix: String,
    /// Baud rate used when the monitor opens a serial device
    pub baud_rate: u32,
    /// Redraw period of the terminal views, in milliseconds
    pub tick_ms: u64,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            task_periods_s: BTreeMap::from([(1, 1.0), (2, 2.0)]),
            rssi_step_db: 5.0,
            feet_to_meters: 0.3048,
            ctrl_prefix: "CTRL: ".to_owned(),
            baud_rate: 115200,
            tick_ms: 250,
        }
    }
}

/// Things that can go wrong while loading a [LabConfig].
#[derive(Debug)]
pub enum ConfigError {
    /// Returned when the config file can't be opened or read.
    IoError(std::io::Error),

    /// Returned when the config file is not a valid RON document.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ConfigError::IoError(error) => Cow::from(format!("io error: {}", error)),
            ConfigError::RonSpannedError(error) => {
                Cow::from(format!("config syntax error: {}", error))
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl LabConfig {
    /// Read a [LabConfig] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut handle = File::open(path).map_err(ConfigError::IoError)?;
        Self::from_file(&mut handle)
    }

    /// Read a [LabConfig] from the [Read]able object provided.
    pub fn from_file(file: &mut impl Read) -> Result<Self, ConfigError> {
        let mut raw_text = String::new();
        file.read_to_string(&mut raw_text)
            .map_err(ConfigError::IoError)?;

        ron::de::from_str(&raw_text).map_err(ConfigError::RonSpannedError)
    }

    /// Load from `path` when one is given, falling back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn empty_document_is_default() {
        let mut buf = Cursor::new("()");
        let cfg = LabConfig::from_file(&mut buf).unwrap();
        assert_eq!(cfg, LabConfig::default());
    }

    #[test]
    fn partial_override() {
        let mut buf = Cursor::new("(task_periods_s: {3: 0.5}, baud_rate: 9600)");
        let cfg = LabConfig::from_file(&mut buf).unwrap();
        assert_eq!(cfg.task_periods_s.get(&3), Some(&0.5));
        assert_eq!(cfg.task_periods_s.get(&1), None);
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.ctrl_prefix, "CTRL: ");
    }

    #[test]
    fn load_from_path() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        write!(tempfile, "(rssi_step_db: 2.5)").unwrap();
        let cfg = LabConfig::load(Some(tempfile.path())).unwrap();
        assert_eq!(cfg.rssi_step_db, 2.5);
    }

    #[test]
    fn bad_syntax() {
        let mut buf = Cursor::new("(rssi_step_db: )");
        assert!(matches!(
            LabConfig::from_file(&mut buf),
            Err(ConfigError::RonSpannedError(_))
        ));
    }
}
