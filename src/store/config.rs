//! Configuration for opening a [DataStore].
//!
//! [DataStore]: crate::store::DataStore

use serde::Deserialize;

use std::{fs, path};

use crate::{Error, Result};

/// Storage layout for a datastore.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    /// Records live contiguously inside fixed-capacity banks; swept
    /// slots are reclaimed through a free list and compaction.
    Bank,
    /// Bank slots carry caller-owned payloads instead of copied bytes.
    BankIndirect,
    /// Every record is its own allocation, removal goes through a
    /// deletion bitmap, no relocation is ever performed.
    List,
    /// List layout with caller-owned payloads.
    ListIndirect,
    /// List layout for variable-length records, sized per add by a
    /// caller-supplied length function.
    ListVariable,
}

impl Default for Mode {
    fn default() -> Mode {
        Mode::Bank
    }
}

impl Mode {
    pub fn is_banked(&self) -> bool {
        matches!(self, Mode::Bank | Mode::BankIndirect)
    }
}

/// Datastore configuration. Fixed-length modes require `datalen`;
/// `cap` is the bank capacity in records for banked modes.
///
/// `max_age` and `sleep_ms` together set up time-based expiry: records
/// older than `max_age` seconds are pruned by the sweep, and a non-zero
/// `sleep_ms` runs that sweep from a background thread.
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub datalen: usize,
    pub cap: usize,
    pub max_records: Option<usize>,
    pub max_age: Option<u64>,
    pub sleep_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            mode: Mode::default(),
            datalen: 0,
            cap: Config::DEF_CAP,
            max_records: None,
            max_age: None,
            sleep_ms: None,
        }
    }
}

impl Config {
    /// Default bank capacity, in records.
    pub const DEF_CAP: usize = 1024;

    pub fn new(mode: Mode, datalen: usize) -> Config {
        Config {
            mode,
            datalen,
            ..Config::default()
        }
    }

    pub fn set_cap(mut self, cap: usize) -> Config {
        self.cap = cap;
        self
    }

    pub fn set_max_records(mut self, n: usize) -> Config {
        self.max_records = Some(n);
        self
    }

    pub fn set_max_age(mut self, secs: u64) -> Config {
        self.max_age = Some(secs);
        self
    }

    pub fn set_sleep_ms(mut self, ms: u64) -> Config {
        self.sleep_ms = Some(ms);
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file(loc: &path::Path) -> Result<Config> {
        let data = err_at!(IOError, fs::read_to_string(loc), "file {:?}", loc)?;
        Config::from_toml_str(&data)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(data: &str) -> Result<Config> {
        let toml_config: TomlConfig = err_at!(InvalidFile, toml::from_str(data))?;
        toml_config.try_into_config()
    }
}

// Shadow type for TOML deserialization, every field optional.
#[derive(Clone, Deserialize)]
struct TomlConfig {
    mode: Option<String>,
    datalen: Option<usize>,
    cap: Option<usize>,
    max_records: Option<usize>,
    max_age: Option<u64>,
    sleep_ms: Option<u64>,
}

impl TomlConfig {
    fn try_into_config(self) -> Result<Config> {
        let mode = match self.mode.as_deref() {
            Some("bank") | None => Mode::Bank,
            Some("bank-indirect") => Mode::BankIndirect,
            Some("list") => Mode::List,
            Some("list-indirect") => Mode::ListIndirect,
            Some("list-variable") => Mode::ListVariable,
            Some(m) => return err_at!(InvalidInput, msg: "invalid mode {:?}", m),
        };

        Ok(Config {
            mode,
            datalen: self.datalen.unwrap_or(0),
            cap: self.cap.unwrap_or(Config::DEF_CAP),
            max_records: self.max_records,
            max_age: self.max_age,
            sleep_ms: self.sleep_ms,
        })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
