use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to write config file {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("Neither XDG_CONFIG_HOME nor HOME is set, cannot locate config")]
    ConfigPathUnavailable,

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub pinger: Pinger,
    pub database: DatabaseSettings,
    pub auth: Auth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
}

/// Probe scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pinger {
    /// Fixed sweep cadence
    pub cycle_interval_ms: u64,
    /// Per-probe deadline, also used to classify timeouts
    pub probe_timeout_ms: u64,
    /// Fan-out ceiling for concurrently executing probes
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
    pub pool_size: usize,
}

/// Basic auth credentials. The gate is only enabled when both are non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Auth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080 }
    }
}

impl Default for Pinger {
    fn default() -> Self {
        Self { cycle_interval_ms: 5000, probe_timeout_ms: 500, max_concurrent_probes: 10 }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: "data.db".into(), pool_size: 8 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: Server::default(),
            pinger: Pinger::default(),
            database: DatabaseSettings::default(),
            auth: Auth::default(),
        }
    }
}

impl Pinger {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Auth {
    /// Returns the credential pair if the gate should be enabled
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pulseboard/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home_dir) = env::var("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("pulseboard/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        write_title_1(f, "Pinger")?;
        write_1(f, "Cycle Interval (ms)", &self.pinger.cycle_interval_ms)?;
        write_1(f, "Probe Timeout (ms)", &self.pinger.probe_timeout_ms)?;
        write_1(f, "Max Concurrent Probes", &self.pinger.max_concurrent_probes)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Pool Size", &self.database.pool_size)?;
        write_title_1(f, "Auth")?;
        write_1(f, "Username", &self.auth.username.as_deref().unwrap_or("<unset>"))?;
        let password = if self.auth.password.as_deref().is_some_and(|p| !p.is_empty()) {
            "********"
        } else {
            "<unset>"
        };
        write_1(f, "Password", &password)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pulseboard/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,no_run
    /// # use pulseboard_service::config::Config;
    /// let cfg = Config::from_config(None::<&std::path::Path>).unwrap();
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply environment overrides on top of the file values
    ///
    /// Recognised: `PULSEBOARD_BIND`, `PULSEBOARD_PORT`, `DATABASE_PATH`,
    /// `ACCESS_USERNAME`, `ACCESS_PASSWORD`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(bind) = env::var("PULSEBOARD_BIND") {
            self.server.bind = bind;
        }
        if let Ok(port) = env::var("PULSEBOARD_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                name: "PULSEBOARD_PORT",
                reason: format!("'{port}' is not a port number"),
            })?;
        }
        if let Ok(path) = env::var("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(username) = env::var("ACCESS_USERNAME") {
            self.auth.username = Some(username);
        }
        if let Ok(password) = env::var("ACCESS_PASSWORD") {
            self.auth.password = Some(password);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pinger = &self.pinger;
        if pinger.cycle_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "pinger.cycle_interval_ms",
                reason: "must be greater than 0".into(),
            });
        }
        if pinger.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "pinger.probe_timeout_ms",
                reason: "must be greater than 0".into(),
            });
        }
        if pinger.probe_timeout_ms >= pinger.cycle_interval_ms {
            return Err(ConfigError::Invalid {
                name: "pinger.probe_timeout_ms",
                reason: format!(
                    "{} must be less than the cycle interval ({})",
                    pinger.probe_timeout_ms, pinger.cycle_interval_ms
                ),
            });
        }
        if pinger.max_concurrent_probes == 0 {
            return Err(ConfigError::Invalid {
                name: "pinger.max_concurrent_probes",
                reason: "must be greater than 0".into(),
            });
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid {
                name: "database.pool_size",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}
