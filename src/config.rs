//! Service configuration
//!
//! Sectioned TOML file, loaded once at startup and read-only afterwards:
//!
//! ```toml
//! [main]
//! procs = 4
//! domain = "pkg.re"
//!
//! [http]
//! ip = "127.0.0.1"
//! port = 8080
//! redirect = "https://github.com/essentialkaos/pkgre"
//! reuseport = false
//!
//! [healthcheck]
//! url = "https://pkg.re/"
//!
//! [log]
//! level = "info"
//! dir = "/var/log/morpher"
//! file = "morpher.log"
//! perms = "0644"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const MIN_PROCS: usize = 1;
const MAX_PROCS: usize = 32;
const MIN_PORT: u16 = 1025;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub main: MainConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainConfig {
    /// Worker parallelism (1..32)
    #[serde(default = "default_procs")]
    pub procs: usize,
    /// Public hostname used in go-import meta tags
    #[serde(default = "default_domain")]
    pub domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Redirect target for `GET /`
    #[serde(default = "default_redirect")]
    pub redirect: String,
    /// Bind with SO_REUSEPORT for horizontal scaling across processes
    #[serde(default)]
    pub reuseport: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthcheckConfig {
    /// When set, a background task issues a HEAD request once per minute
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Octal permissions applied to the log file
    #[serde(default = "default_log_perms")]
    pub perms: String,
}

fn default_procs() -> usize {
    4
}

fn default_domain() -> String {
    "pkg.re".to_string()
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_redirect() -> String {
    "https://github.com/essentialkaos/pkgre".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_perms() -> String {
    "0644".to_string()
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            procs: default_procs(),
            domain: default_domain(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            redirect: default_redirect(),
            reuseport: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file: None,
            level: default_log_level(),
            perms: default_log_perms(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Validate config values; any failure aborts startup
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PROCS..=MAX_PROCS).contains(&self.main.procs) {
            bail!(
                "main.procs must be in range {MIN_PROCS}..{MAX_PROCS} (got {})",
                self.main.procs
            );
        }

        if self.http.port < MIN_PORT {
            bail!(
                "http.port must be in range {MIN_PORT}..65535 (got {})",
                self.http.port
            );
        }

        if self.main.domain.is_empty() {
            bail!("main.domain must not be empty");
        }

        if let Some(dir) = &self.log.dir {
            if !dir.is_dir() {
                bail!("log.dir {} is not a directory", dir.display());
            }
        }

        u32::from_str_radix(self.log.perms.trim_start_matches("0o"), 8)
            .with_context(|| format!("log.perms {} is not octal", self.log.perms))?;

        Ok(())
    }

    /// Bind address for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http.ip, self.http.port)
    }
}

impl LogConfig {
    /// Full path of the log file, when file logging is configured
    pub fn path(&self) -> Option<PathBuf> {
        let file = self.file.as_ref()?;

        match &self.dir {
            Some(dir) => Some(dir.join(file)),
            None => Some(file.clone()),
        }
    }

    /// Parsed octal permissions
    pub fn mode(&self) -> u32 {
        u32::from_str_radix(self.perms.trim_start_matches("0o"), 8).unwrap_or(0o644)
    }
}
