//! INI-style configuration loader (§10.3).
//!
//! Re-expressed from `examples/original_source/Conf.cpp`'s own hand-rolled
//! `fopen`/`fgets` parser: `[Section]` headers, `#`-comment lines, quoted
//! values have their surrounding quotes stripped, unquoted values are
//! truncated at a trailing `#` comment and have trailing whitespace
//! trimmed. No ini-parsing crate appears anywhere in the retrieval pack, so
//! this follows the original's own approach instead of inventing a
//! dependency for it.

use std::path::{Path, PathBuf};

use crate::error::GatewayError;

#[derive(Debug, Clone, Default)]
pub struct GeneralConfig {
    pub callsign: String,
    pub white_list: Vec<u32>,
    pub black_list: Vec<u32>,
    pub blacklist_regex_file: Option<PathBuf>,
    pub whitelist_regex_file: Option<PathBuf>,
    pub rpt_address: String,
    pub rpt_port: u16,
    pub local_address: String,
    pub local_port: u16,
    pub daemon: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub file_path: String,
    pub file_root: String,
    pub file_level: u32,
    pub display_level: u32,
    pub file_rotate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DapnetConfig {
    pub address: String,
    pub port: u16,
    pub auth_key: String,
    pub debug: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub general: GeneralConfig,
    pub log: LogConfig,
    pub dapnet: DapnetConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    General,
    Log,
    Dapnet,
}

/// Strip a `key = value` line's value of surrounding quotes, or (if
/// unquoted) truncate at a trailing `#` comment and trim trailing
/// whitespace — matching `Conf.cpp`'s exact quoting rule.
fn clean_value(raw: &str) -> String {
    let raw = raw.trim_start();
    if raw.len() > 1 && raw.starts_with('"') && raw.ends_with('"') {
        return raw[1..raw.len() - 1].to_string();
    }
    let without_comment = match raw.find('#') {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    without_comment.trim_end_matches([' ', '\t']).to_string()
}

fn parse_ric_list(value: &str) -> Vec<u32> {
    value
        .split(',')
        .filter_map(|s| s.trim().parse::<u32>().ok())
        .filter(|&ric| ric > 0)
        .collect()
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, GatewayError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("couldn't open the .ini file - {}: {}", path.display(), e))
        })?;

        let mut config = Config::default();
        let mut section = Section::None;

        for line in text.lines() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') {
                section = if line.starts_with("[General]") {
                    Section::General
                } else if line.starts_with("[Log]") {
                    Section::Log
                } else if line.starts_with("[DAPNET]") {
                    Section::Dapnet
                } else {
                    Section::None
                };
                continue;
            }

            let mut parts = line.splitn(2, ['=', '\t', ' ']);
            let key = match parts.next() {
                Some(k) if !k.is_empty() => k,
                _ => continue,
            };
            let rest = match parts.next() {
                Some(r) => r,
                None => continue,
            };
            // The original's tokenizer treats any of space/tab/'=' as a
            // key/value separator and may leave the '=' at the front of
            // the remainder if the line was `key=value` rather than
            // `key = value`.
            let rest = rest.trim_start_matches(['=', ' ', '\t']);
            if rest.is_empty() {
                continue;
            }
            let value = clean_value(rest);

            match section {
                Section::General => match key {
                    "Callsign" => config.general.callsign = strip_whitespace(&value),
                    "WhiteList" => config.general.white_list = parse_ric_list(&value),
                    "BlackList" => config.general.black_list = parse_ric_list(&value),
                    "BlacklistRegexfile" => config.general.blacklist_regex_file = Some(PathBuf::from(value)),
                    "WhitelistRegexfile" => config.general.whitelist_regex_file = Some(PathBuf::from(value)),
                    "RptAddress" => config.general.rpt_address = value,
                    "RptPort" => config.general.rpt_port = value.parse().unwrap_or(0),
                    "LocalAddress" => config.general.local_address = value,
                    "LocalPort" => config.general.local_port = value.parse().unwrap_or(0),
                    "Daemon" => config.general.daemon = value.trim() == "1",
                    _ => {}
                },
                Section::Log => match key {
                    "FilePath" => config.log.file_path = value,
                    "FileRoot" => config.log.file_root = value,
                    "FileLevel" => config.log.file_level = value.parse().unwrap_or(0),
                    "DisplayLevel" => config.log.display_level = value.parse().unwrap_or(0),
                    "FileRotate" => config.log.file_rotate = value.trim() == "1",
                    _ => {}
                },
                Section::Dapnet => match key {
                    "Address" => config.dapnet.address = value,
                    "Port" => config.dapnet.port = value.parse().unwrap_or(0),
                    "AuthKey" => config.dapnet.auth_key = strip_whitespace(&value),
                    "Debug" => config.dapnet.debug = value.trim() == "1",
                    _ => {}
                },
                Section::None => {}
            }
        }

        Ok(config)
    }

    /// §4.1: an empty or literal `"TOPSECRET"` authkey is a configuration
    /// error; the gateway refuses to start.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.dapnet.auth_key.is_empty() || self.dapnet.auth_key == "TOPSECRET" {
            return Err(GatewayError::AuthKeyInvalid);
        }
        Ok(())
    }
}
