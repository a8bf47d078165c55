//! Declarative configuration for one `scan_and_transport` run, loaded from a
//! JSON file, in the same `read_from`/CLI-override shape used throughout
//! this codebase, and overridable by CLI flags in `main.rs`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{MatchRule, ScanOptions};

/// One (extensions, name-regex) rule as it appears in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub extensions: Vec<String>,
    pub regex: String,
}

impl RuleConfig {
    pub fn compile(&self) -> Result<MatchRule> {
        let re = regex::Regex::new(&self.regex)
            .with_context(|| format!("invalid rule regex: {}", self.regex))?;
        Ok(MatchRule::new(self.extensions.clone(), re))
    }
}

fn default_depth() -> i64 {
    -1
}

fn default_max_nested_level() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_checks_concurrency")]
    pub max_concurrent_file_checks: usize,
    #[serde(default = "default_transfers_concurrency")]
    pub max_concurrent_transfers: usize,
    #[serde(default = "default_stability_retry_delay_ms")]
    pub stability_retry_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_checks_concurrency() -> usize {
    5
}
fn default_transfers_concurrency() -> usize {
    3
}
fn default_stability_retry_delay_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_file_checks: default_checks_concurrency(),
            max_concurrent_transfers: default_transfers_concurrency(),
            stability_retry_delay_ms: default_stability_retry_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagingTrigger {
    pub max_files: Option<usize>,
    pub max_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ftp,
    Ftps,
    Sftp,
}

impl std::fmt::Display for Protocol {
    /// Upper-case form used as the prefix of a `TransportErrorCode`, e.g.
    /// `FTP`, `FTPS`, `SFTP`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Protocol::Ftp => "FTP",
            Protocol::Ftps => "FTPS",
            Protocol::Sftp => "SFTP",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportOptions {
    #[serde(default)]
    pub enabled: bool,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub remote_path: String,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_package_size_mb")]
    pub package_size_mb: u64,
    #[serde(default)]
    pub debug: bool,
    /// Base pause between upload retries (overridable default: 1000ms).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_retry_count() -> u32 {
    3
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_package_size_mb() -> u64 {
    100
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            protocol: Protocol::Sftp,
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            remote_path: String::from("/"),
            retry_count: default_retry_count(),
            timeout_ms: default_timeout_ms(),
            package_size_mb: default_package_size_mb(),
            debug: false,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub root_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default = "default_depth")]
    pub depth: i64,
    #[serde(default)]
    pub skip_dirs: Vec<String>,
    #[serde(default)]
    pub max_file_size: u64,
    #[serde(default = "default_true")]
    pub scan_nested_archives: bool,
    #[serde(default = "default_max_nested_level")]
    pub max_nested_level: u32,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub packaging_trigger: PackagingTrigger,
    pub transport: TransportOptions,
}

impl Config {
    pub fn read_from(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Build the scanner's `ScanOptions`, compiling every rule's regex.
    pub fn scan_options(&self) -> Result<ScanOptions> {
        let rules =
            self.rules.iter().map(RuleConfig::compile).collect::<Result<Vec<_>>>()?;
        Ok(ScanOptions {
            root_dir: self.root_dir.clone(),
            rules,
            depth: self.depth,
            skip_dirs: self.skip_dirs.iter().cloned().collect(),
            max_file_size: self.max_file_size,
            scan_nested_archives: self.scan_nested_archives,
            max_nested_level: self.max_nested_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let json = r#"{
            "root_dir": "/tmp/in",
            "output_dir": "/tmp/out",
            "rules": [{"extensions": ["docx"], "regex": "^MeiTuan.*"}],
            "transport": {"protocol": "ftp", "host": "h", "port": 21, "username": "u", "remote_path": "/up"}
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.depth, -1);
        assert!(cfg.scan_nested_archives);
        assert_eq!(cfg.max_nested_level, 5);
        assert_eq!(cfg.queue.max_concurrent_file_checks, 5);
        assert!(!cfg.transport.enabled);
        let opts = cfg.scan_options().unwrap();
        assert_eq!(opts.rules.len(), 1);
        assert!(opts.rules[0].matches_name("MeiTuan-target.docx"));
    }
}
