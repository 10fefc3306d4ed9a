//! Configuration structures and INI loading.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::{File, FileFormat};
use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Longest username accepted by the wire format.
pub const USERNAME_MAX_LENGTH: usize = 64;
/// Longest password accepted by the wire format.
pub const PASSWORD_MAX_LENGTH: usize = 64;

const DEFAULT_LISTEN_BACKLOG: u32 = 128;
const DEFAULT_STATISTIC_INTERVAL: u64 = 2;
const DEFAULT_MAX_IDLE_TIME: u64 = 120;
const DEFAULT_LOG_MAX_SIZE: u32 = 512;

/// Operating mode of one proxy instance.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Client-facing node: accepts SOCKS5 clients, talks ciphertext upstream
    Encryption,
    /// Peer-facing node: accepts ciphertext, talks plaintext to destinations
    Decryption,
    /// Plain TCP relay, no crypto and no authentication
    Transmission,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Encryption => write!(f, "encryption"),
            Mode::Decryption => write!(f, "decryption"),
            Mode::Transmission => write!(f, "transmission"),
        }
    }
}

/// `[proxy]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    /// Address the listener binds to
    pub local_host: String,
    /// Port the listener binds to
    pub local_port: u16,
    /// Operating mode
    pub mode: Mode,
    /// Peer or relay target host (encryption and transmission modes)
    pub remote_host: Option<String>,
    /// Peer or relay target port (encryption and transmission modes)
    pub remote_port: Option<u16>,
    /// Backlog passed to listen(2)
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,
    /// Cadence of the statistics and GC loops, in seconds
    #[serde(default = "default_statistic_interval")]
    pub statistic_interval: u64,
    /// Seconds without I/O before a tunnel is evicted
    #[serde(default = "default_max_idle_time")]
    pub max_idle_time: u64,
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// Directory holding the PID file
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Advisory size cap, in MiB
    #[serde(default = "default_log_max_size")]
    pub max_size: u32,
    /// Whether to stop on a full log device
    #[serde(default)]
    pub full_stop: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            max_size: DEFAULT_LOG_MAX_SIZE,
            full_stop: false,
        }
    }
}

/// `[auth]` section, required in encryption and decryption modes.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub username: String,
    pub password: String,
}

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub proxy: ProxySettings,
    #[serde(default)]
    pub log: LogSettings,
    pub auth: Option<AuthSettings>,
}

fn default_listen_backlog() -> u32 {
    DEFAULT_LISTEN_BACKLOG
}

fn default_statistic_interval() -> u64 {
    DEFAULT_STATISTIC_INTERVAL
}

fn default_max_idle_time() -> u64 {
    DEFAULT_MAX_IDLE_TIME
}

fn default_log_dir() -> String {
    "./log".to_string()
}

fn default_log_max_size() -> u32 {
    DEFAULT_LOG_MAX_SIZE
}

impl Settings {
    /// Load and validate the configuration from an INI file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(File::new(
                path.as_ref().to_str().unwrap_or_default(),
                FileFormat::Ini,
            ))
            .build()
            .map_err(ConfigError::Parsing)?;
        let settings: Settings = raw.try_deserialize().map_err(ConfigError::Parsing)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate the configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(File::from_str(text, FileFormat::Ini))
            .build()
            .map_err(ConfigError::Parsing)?;
        let settings: Settings = raw.try_deserialize().map_err(ConfigError::Parsing)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Re-read the file and extract only the runtime-adjustable subset.
    /// The caller keeps its previous values when this fails.
    pub fn reload<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Reloadable> {
        let settings = Self::load(path)?;
        if settings.proxy.mode != mode {
            return Err(ConfigError::InvalidValue {
                field: "proxy.mode",
                value: format!("{} (mode cannot change on reload)", settings.proxy.mode),
            }
            .into());
        }
        Ok(settings.reloadable())
    }

    /// The runtime-adjustable subset of this configuration.
    pub fn reloadable(&self) -> Reloadable {
        let (username, password) = match &self.auth {
            Some(auth) => (auth.username.clone(), auth.password.clone()),
            None => (String::new(), String::new()),
        };
        Reloadable {
            statistic_interval: Duration::from_secs(self.proxy.statistic_interval),
            max_idle_time: Duration::from_secs(self.proxy.max_idle_time),
            username,
            password,
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.proxy.statistic_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "proxy.statistic_interval",
                value: "0".to_string(),
            });
        }

        match self.proxy.mode {
            Mode::Encryption | Mode::Transmission => {
                if self.proxy.remote_host.is_none() {
                    return Err(ConfigError::MissingField {
                        field: "proxy.remote_host",
                    });
                }
                if self.proxy.remote_port.is_none() {
                    return Err(ConfigError::MissingField {
                        field: "proxy.remote_port",
                    });
                }
            }
            Mode::Decryption => {}
        }

        if matches!(self.proxy.mode, Mode::Encryption | Mode::Decryption) {
            let auth = self.auth.as_ref().ok_or(ConfigError::MissingField {
                field: "auth.username",
            })?;
            if auth.username.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "auth.username",
                });
            }
            if auth.password.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "auth.password",
                });
            }
            if auth.username.len() > USERNAME_MAX_LENGTH {
                return Err(ConfigError::CredentialTooLong {
                    field: "auth.username",
                    max: USERNAME_MAX_LENGTH,
                });
            }
            if auth.password.len() > PASSWORD_MAX_LENGTH {
                return Err(ConfigError::CredentialTooLong {
                    field: "auth.password",
                    max: PASSWORD_MAX_LENGTH,
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "proxy.mode = {}", self.proxy.mode)?;
        writeln!(
            f,
            "proxy.local = {}:{}",
            self.proxy.local_host, self.proxy.local_port
        )?;
        if let (Some(host), Some(port)) = (&self.proxy.remote_host, self.proxy.remote_port) {
            writeln!(f, "proxy.remote = {}:{}", host, port)?;
        }
        writeln!(f, "proxy.listen_backlog = {}", self.proxy.listen_backlog)?;
        writeln!(
            f,
            "proxy.statistic_interval = {}s",
            self.proxy.statistic_interval
        )?;
        writeln!(f, "proxy.max_idle_time = {}s", self.proxy.max_idle_time)?;
        writeln!(f, "log.dir = {}", self.log.dir)?;
        writeln!(f, "log.max_size = {}", self.log.max_size)?;
        writeln!(f, "log.full_stop = {}", self.log.full_stop)?;
        if let Some(auth) = &self.auth {
            writeln!(f, "auth.username = {}", auth.username)?;
            writeln!(f, "auth.password = ({} bytes)", auth.password.len())?;
        }
        Ok(())
    }
}

/// Fields that SIGHUP re-reads; everything else is fixed for the
/// lifetime of the process.
#[derive(Debug, Clone)]
pub struct Reloadable {
    pub statistic_interval: Duration,
    pub max_idle_time: Duration,
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCRYPTION_INI: &str = "\
[proxy]
local_host = 127.0.0.1
local_port = 1080
mode = encryption
remote_host = 10.0.0.2
remote_port = 9418

[auth]
username = alice
password = sesame
";

    #[test]
    fn parses_encryption_config_with_defaults() {
        let settings = Settings::from_ini_str(ENCRYPTION_INI).unwrap();
        assert_eq!(settings.proxy.mode, Mode::Encryption);
        assert_eq!(settings.proxy.local_port, 1080);
        assert_eq!(settings.proxy.remote_port, Some(9418));
        assert_eq!(settings.proxy.listen_backlog, 128);
        assert_eq!(settings.proxy.statistic_interval, 2);
        assert_eq!(settings.proxy.max_idle_time, 120);
        assert_eq!(settings.log.max_size, 512);
        assert!(!settings.log.full_stop);
        assert_eq!(settings.auth.as_ref().unwrap().username, "alice");
    }

    #[test]
    fn decryption_mode_needs_no_remote() {
        let ini = "\
[proxy]
local_host = 0.0.0.0
local_port = 9418
mode = decryption

[auth]
username = alice
password = sesame
";
        let settings = Settings::from_ini_str(ini).unwrap();
        assert_eq!(settings.proxy.mode, Mode::Decryption);
        assert!(settings.proxy.remote_host.is_none());
    }

    #[test]
    fn encryption_mode_requires_remote() {
        let ini = "\
[proxy]
local_host = 127.0.0.1
local_port = 1080
mode = encryption

[auth]
username = alice
password = sesame
";
        assert!(Settings::from_ini_str(ini).is_err());
    }

    #[test]
    fn crypto_modes_require_credentials() {
        let ini = "\
[proxy]
local_host = 127.0.0.1
local_port = 1080
mode = decryption
";
        assert!(Settings::from_ini_str(ini).is_err());
    }

    #[test]
    fn transmission_mode_skips_credentials() {
        let ini = "\
[proxy]
local_host = 127.0.0.1
local_port = 1080
mode = transmission
remote_host = 10.0.0.2
remote_port = 8080
";
        let settings = Settings::from_ini_str(ini).unwrap();
        assert_eq!(settings.proxy.mode, Mode::Transmission);
        let reloadable = settings.reloadable();
        assert!(reloadable.username.is_empty());
    }

    #[test]
    fn oversized_username_rejected() {
        let ini = format!(
            "\
[proxy]
local_host = 127.0.0.1
local_port = 1080
mode = decryption

[auth]
username = {}
password = sesame
",
            "u".repeat(USERNAME_MAX_LENGTH + 1)
        );
        assert!(Settings::from_ini_str(&ini).is_err());
    }

    #[test]
    fn reloadable_subset_carries_durations() {
        let settings = Settings::from_ini_str(ENCRYPTION_INI).unwrap();
        let reloadable = settings.reloadable();
        assert_eq!(reloadable.statistic_interval, Duration::from_secs(2));
        assert_eq!(reloadable.max_idle_time, Duration::from_secs(120));
        assert_eq!(reloadable.password, "sesame");
    }
}
