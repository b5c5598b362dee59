//! Configuration vault – reads/writes `~/.hootscape/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hoot_runtime::SchedulerConfig;
use hoot_types::{HootError, MacroDefinition, MovementPayload, MovementStep, SpeechRequest};
use serde::{Deserialize, Serialize};

/// Which device performs the gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    /// Owl controller board on a serial port.
    #[default]
    Serial,
    /// In-process simulation; logs gestures instead of moving.
    Sim,
}

impl std::fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorKind::Serial => write!(f, "serial"),
            ActuatorKind::Sim => write!(f, "sim"),
        }
    }
}

impl std::str::FromStr for ActuatorKind {
    type Err = HootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(ActuatorKind::Serial),
            "sim" => Ok(ActuatorKind::Sim),
            other => Err(HootError::Config(format!("unknown actuator '{other}'"))),
        }
    }
}

/// A macro declared in the config file.
///
/// ```toml
/// [[macros]]
/// name = "nod"
/// speech = "Yes!"
/// steps = [{ type = 1, duration = 500 }, { type = 2, duration = 500 }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroConfig {
    pub name: String,
    pub steps: Vec<MovementPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,
}

impl TryFrom<&MacroConfig> for MacroDefinition {
    type Error = HootError;

    fn try_from(cfg: &MacroConfig) -> Result<Self, Self::Error> {
        let steps = cfg
            .steps
            .iter()
            .cloned()
            .map(MovementStep::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HootError::Config(format!("macro '{}': {e}", cfg.name)))?;
        let def = MacroDefinition::new(cfg.name.clone(), steps);
        Ok(match &cfg.speech {
            Some(text) => def.with_speech(SpeechRequest::new(text.clone())),
            None => def,
        })
    }
}

/// Persisted configuration stored in `~/.hootscape/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the command endpoint binds to.
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Port of the WebSocket event monitor.
    #[serde(default = "default_monitor_port")]
    pub monitor_port: u16,

    #[serde(default = "default_true")]
    pub monitor_enabled: bool,

    #[serde(default)]
    pub actuator: ActuatorKind,

    /// Serial device of the owl controller board.
    #[serde(default = "default_robot_port")]
    pub robot_port: String,

    #[serde(default = "default_robot_baudrate")]
    pub robot_baudrate: u32,

    #[serde(default = "default_robot_timeout_ms")]
    pub robot_timeout_ms: u64,

    /// Servo speed sent when the board starts; its own default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_speed: Option<u16>,

    /// Retries after a failed gesture attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Slack beyond a gesture's duration before it counts as timed out.
    #[serde(default = "default_ack_grace_ms")]
    pub ack_grace_ms: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Run the `welcome` macro once at startup.
    #[serde(default = "default_true")]
    pub greet_on_startup: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub macros: Vec<MacroConfig>,
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    9123
}
fn default_monitor_port() -> u16 {
    9124
}
fn default_true() -> bool {
    true
}
fn default_robot_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_robot_baudrate() -> u32 {
    57_600
}
fn default_robot_timeout_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_ack_grace_ms() -> u64 {
    2000
}
fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            monitor_port: default_monitor_port(),
            monitor_enabled: true,
            actuator: ActuatorKind::default(),
            robot_port: default_robot_port(),
            robot_baudrate: default_robot_baudrate(),
            robot_timeout_ms: default_robot_timeout_ms(),
            robot_speed: None,
            max_retries: default_max_retries(),
            ack_grace_ms: default_ack_grace_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            greet_on_startup: true,
            macros: Vec::new(),
        }
    }
}

impl Config {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_retries: self.max_retries,
            ack_grace: Duration::from_millis(self.ack_grace_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Validated definitions of the `[[macros]]` tables.
    pub fn macro_definitions(&self) -> Result<Vec<MacroDefinition>, HootError> {
        self.macros.iter().map(MacroDefinition::try_from).collect()
    }
}

/// Return the path to `~/.hootscape/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".hootscape").join("config.toml")
}

/// Load the file at `path`, or the defaults when it does not exist, then
/// apply `HOOT_*` overrides.
pub fn load_or_default(path: &Path) -> Result<Config, HootError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config at `path`. Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, HootError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        HootError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| HootError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `HOOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `HOOT_HTTP_HOST` | `http_host` |
/// | `HOOT_HTTP_PORT` | `http_port` |
/// | `HOOT_MONITOR_PORT` | `monitor_port` |
/// | `HOOT_ACTUATOR` | `actuator` |
/// | `HOOT_ROBOT_PORT` | `robot_port` |
/// | `HOOT_ROBOT_BAUDRATE` | `robot_baudrate` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("HOOT_HTTP_HOST") {
        cfg.http_host = v;
    }
    if let Ok(v) = std::env::var("HOOT_HTTP_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.http_port = port;
    }
    if let Ok(v) = std::env::var("HOOT_MONITOR_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.monitor_port = port;
    }
    if let Ok(v) = std::env::var("HOOT_ACTUATOR")
        && let Ok(kind) = v.parse::<ActuatorKind>()
    {
        cfg.actuator = kind;
    }
    if let Ok(v) = std::env::var("HOOT_ROBOT_PORT") {
        cfg.robot_port = v;
    }
    if let Ok(v) = std::env::var("HOOT_ROBOT_BAUDRATE")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.robot_baudrate = baud;
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), HootError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| HootError::Config(format!("failed to create config directory: {e}")))?;
        // rwx------
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                HootError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| HootError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| HootError::Config(format!("failed to write {}: {e}", path.display()));
    // rw-------
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
