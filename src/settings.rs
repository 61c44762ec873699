use crate::config::{Config, Mode};
use crate::serial_utils::{parse_handshake, parse_parity, parse_stop_bits};
use anyhow::{Context, Result};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Every setting name accepted on the command line or in the defaults file.
pub const KNOWN_SETTINGS: &[&str] = &[
    "input",
    "mode",
    "buffer_size",
    "delay_time",
    "baud_rate",
    "port_name",
    "parity",
    "data_bits",
    "stop_bits",
    "handshake",
    "read_timeout",
    "write_timeout",
    "final_empty_write",
];

const BUILT_IN_DEFAULTS: &[(&str, &str)] = &[
    ("buffer_size", "1024"),
    ("delay_time", "10"),
    ("data_bits", "8"),
    ("read_timeout", "500"),
    ("write_timeout", "500"),
    ("final_empty_write", "true"),
];

static ARGUMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-([A-Za-z_]+)=(.*)$").expect("argument pattern is valid"));

#[derive(Debug, PartialEq, Eq)]
pub enum UsageError {
    MissingEquals(String),
    TooManyEquals(String),
    Malformed(String),
    UnknownArgument(String),
    MissingRequired(&'static str),
    InvalidValue {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageError::MissingEquals(arg) => {
                write!(f, "argument does not use the format -NAME=VALUE: {}", arg)
            }
            UsageError::TooManyEquals(arg) => write!(f, "argument has too many VALUEs: {}", arg),
            UsageError::Malformed(arg) => {
                write!(f, "argument does not use the format -NAME=VALUE: {}", arg)
            }
            UsageError::UnknownArgument(arg) => write!(f, "argument does not exist: {}", arg),
            UsageError::MissingRequired(name) => write!(f, "missing required argument -{}", name),
            UsageError::InvalidValue {
                name,
                value,
                expected,
            } => write!(f, "invalid value {:?} for -{}, expected {}", value, name, expected),
        }
    }
}

impl std::error::Error for UsageError {}

/// Splits one `-NAME=VALUE` argument. The returned name is lowercased.
pub fn parse_argument(arg: &str) -> Result<(String, String), UsageError> {
    match arg.matches('=').count() {
        0 => return Err(UsageError::MissingEquals(arg.to_string())),
        1 => {}
        _ => return Err(UsageError::TooManyEquals(arg.to_string())),
    }
    let caps = ARGUMENT_RE
        .captures(arg)
        .ok_or_else(|| UsageError::Malformed(arg.to_string()))?;
    let name = caps[1].to_ascii_lowercase();
    if !KNOWN_SETTINGS.contains(&name.as_str()) {
        return Err(UsageError::UnknownArgument(arg.to_string()));
    }
    Ok((name, caps[2].to_string()))
}

/// Defaults stored in a TOML file, layered between the built-in defaults and
/// the command line.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoredDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_bits: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_bits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_empty_write: Option<bool>,
}

impl StoredDefaults {
    /// Loads the file, writing an empty template first if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        confy::load_path(path)
            .with_context(|| format!("failed to load defaults from {}", path.display()))
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        fn put<T: ToString>(out: &mut Vec<(&'static str, String)>, name: &'static str, v: &Option<T>) {
            if let Some(v) = v {
                out.push((name, v.to_string()));
            }
        }
        let mut out = Vec::new();
        put(&mut out, "input", &self.input);
        put(&mut out, "mode", &self.mode);
        put(&mut out, "buffer_size", &self.buffer_size);
        put(&mut out, "delay_time", &self.delay_time);
        put(&mut out, "baud_rate", &self.baud_rate);
        put(&mut out, "port_name", &self.port_name);
        put(&mut out, "parity", &self.parity);
        put(&mut out, "data_bits", &self.data_bits);
        put(&mut out, "stop_bits", &self.stop_bits);
        put(&mut out, "handshake", &self.handshake);
        put(&mut out, "read_timeout", &self.read_timeout);
        put(&mut out, "write_timeout", &self.write_timeout);
        put(&mut out, "final_empty_write", &self.final_empty_write);
        out
    }
}

/// Name to raw value mapping, resolved into a [`Config`] once complete.
#[derive(Clone, Debug)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn with_defaults() -> Self {
        let values = BUILT_IN_DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { values }
    }

    pub fn apply_stored(&mut self, stored: &StoredDefaults) {
        for (name, value) in stored.entries() {
            debug!("stored default {}={}", name, value);
            self.values.insert(name.to_string(), value);
        }
    }

    /// Applies command-line overrides; a repeated name keeps the last value.
    pub fn apply_args<I, S>(&mut self, args: I) -> Result<(), UsageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let (name, value) = parse_argument(arg.as_ref())?;
            self.values.insert(name, value);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn required(&self, name: &'static str) -> Result<&str, UsageError> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(UsageError::MissingRequired(name)),
        }
    }

    fn number<T: FromStr>(&self, name: &'static str, expected: &'static str) -> Result<T, UsageError> {
        let value = self.required(name)?;
        value.parse().map_err(|_| UsageError::InvalidValue {
            name,
            value: value.to_string(),
            expected,
        })
    }

    fn positive<T: FromStr + PartialEq + Default>(&self, name: &'static str) -> Result<T, UsageError> {
        let n: T = self.number(name, "a positive integer")?;
        if n == T::default() {
            return Err(UsageError::InvalidValue {
                name,
                value: self.get(name).unwrap_or_default().to_string(),
                expected: "a positive integer",
            });
        }
        Ok(n)
    }

    fn millis(&self, name: &'static str) -> Result<Duration, UsageError> {
        self.number(name, "a non-negative number of milliseconds")
            .map(Duration::from_millis)
    }

    fn flag(&self, name: &'static str) -> Result<bool, UsageError> {
        let value = self.required(name)?;
        match value.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(UsageError::InvalidValue {
                name,
                value: value.to_string(),
                expected: "true or false",
            }),
        }
    }

    pub fn resolve(&self) -> Result<Config, UsageError> {
        let mode = match self.required("mode")? {
            "single" => Mode::Single,
            "sequence" => Mode::Sequence,
            other => {
                return Err(UsageError::InvalidValue {
                    name: "mode",
                    value: other.to_string(),
                    expected: "single or sequence",
                })
            }
        };
        Ok(Config {
            input: PathBuf::from(self.required("input")?),
            mode,
            buffer_size: self.positive("buffer_size")?,
            delay_time: self.millis("delay_time")?,
            baud_rate: self.positive("baud_rate")?,
            port_name: self.required("port_name")?.to_string(),
            parity: parse_parity(self.required("parity")?),
            data_bits: self.positive("data_bits")?,
            stop_bits: parse_stop_bits(self.get("stop_bits").unwrap_or_default()),
            handshake: parse_handshake(self.get("handshake").unwrap_or_default()),
            read_timeout: self.millis("read_timeout")?,
            write_timeout: self.millis("write_timeout")?,
            final_empty_write: self.flag("final_empty_write")?,
        })
    }
}

/// Built-in defaults, then the optional defaults file, then `args`.
pub fn resolve_config<S: AsRef<str>>(args: &[S], defaults_file: Option<&Path>) -> Result<Config> {
    let mut settings = Settings::with_defaults();
    if let Some(path) = defaults_file {
        info!("Loading defaults from {}", path.display());
        settings.apply_stored(&StoredDefaults::load(path)?);
    }
    settings.apply_args(args)?;
    Ok(settings.resolve()?)
}
