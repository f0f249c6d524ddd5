//! `RBV_*` environment variable parsing.
//!
//! Every getter returns `None` when the variable is unset, so callers only
//! override what the environment actually sets. Invalid values are collected
//! so all of them can be reported at once.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Prefix shared by every variable.
pub const ENV_PREFIX: &str = "RBV_";

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },
}

/// Environment parser over a snapshot of prefixed variables.
pub struct EnvParser {
    vars: HashMap<String, String>,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Snapshot the process environment.
    pub fn new() -> Self {
        Self::from_pairs(std::env::vars())
    }

    /// Build from explicit pairs. Unprefixed names are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self {
            vars,
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn lookup(&self, name: &str) -> Option<(String, String)> {
        let var = format!("{ENV_PREFIX}{name}");
        self.vars.get(&var).map(|value| (var, value.clone()))
    }

    /// Non-empty string value.
    pub fn get_string(&mut self, name: &str) -> Option<String> {
        self.lookup(name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn get_path(&mut self, name: &str) -> Option<PathBuf> {
        self.get_string(name).map(PathBuf::from)
    }

    /// Accepts 1/true/yes/on and 0/false/no/off (case-insensitive).
    pub fn get_bool(&mut self, name: &str) -> Option<bool> {
        let (var, value) = self.lookup(name)?;
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    pub fn get_u32_range(&mut self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.get_u64_range(name, u64::from(min), u64::from(max))
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        let (var, value) = self.lookup(name)?;
        match value.trim().parse::<u64>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned integer".to_string(),
                    value,
                });
                None
            }
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
