use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use toml::{Table, Value};

pub const DEFAULT_CONFIG_FILE: &str = "farmhand.toml";
const EMBEDDED_DEFAULTS: &str = include_str!("../../farmhand.toml");
const EMBEDDED_LABEL: &str = "<embedded farmhand.toml>";

pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
pub const MAX_HEARTBEAT_INTERVAL_MS: u64 = 120_000;
pub const MIN_CHECK_INTERVAL_MS: u64 = 1_000;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub heartbeat: HeartbeatConfig,
    pub wire: WireConfig,
    pub farm: FarmConfig,
    pub friend: FriendConfig,
    pub warehouse: WarehouseConfig,
    pub catalog: CatalogConfig,
    pub status: StatusConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub human_friendly: bool,
    pub recent_lines: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub url: String,
    pub platform: String,
    pub os: String,
    pub client_version: String,
    pub login_code: String,
    pub user_agent: String,
    pub origin: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    pub sys_software: String,
    pub network: String,
    pub memory: String,
    pub device_id: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct WireConfig {
    pub call_timeout_ms: u64,
    pub max_envelope_size_bytes: usize,
}

impl WireConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FarmConfig {
    pub check_interval_ms: u64,
    pub startup_delay_ms: u64,
    pub action_delay_ms: u64,
    pub force_lowest_level_crop: bool,
    pub auto_harvest: bool,
    pub auto_remove: bool,
    pub auto_plant: bool,
    pub auto_fertilize: bool,
    pub auto_water: bool,
    pub auto_weed: bool,
    pub auto_pest: bool,
    pub auto_upgrade: bool,
    pub auto_unlock: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FriendConfig {
    pub check_interval_ms: u64,
    pub startup_delay_ms: u64,
    pub action_delay_ms: u64,
    pub visit_delay_ms: u64,
    pub auto_visit: bool,
    pub auto_help: bool,
    pub auto_steal: bool,
    pub auto_accept_applications: bool,
    pub help_only_with_exp: bool,
    pub enable_nuisance: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub auto_sell: bool,
    pub interval_ms: u64,
    pub startup_delay_ms: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Empty disables the catalog.
    pub plant_table_path: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StatusConfig {
    /// Empty disables the snapshot file.
    pub snapshot_path: String,
    /// Empty disables live settings patches.
    pub settings_path: String,
    pub publish_interval_ms: u64,
}

impl AppConfig {
    /// Resolves `--config <path>` (or `./farmhand.toml` when present), layers it
    /// over the embedded defaults and applies the remaining `--section.key value`
    /// overrides.
    pub fn load_with_discovery(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let (explicit_path, overrides) = split_config_path(args)?;
        let path = explicit_path.or_else(|| {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            candidate.is_file().then_some(candidate)
        });

        Self::load_layered(path.as_deref(), overrides)
    }

    pub fn load_from_toml_with_args(
        path: impl AsRef<Path>,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        Self::load_layered(Some(path.as_ref()), args)
    }

    fn load_layered(
        path: Option<&Path>,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        let mut root_value = Value::Table(parse_table(EMBEDDED_DEFAULTS, EMBEDDED_LABEL)?);

        if let Some(path) = path {
            let toml_content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_string_lossy().to_string(),
                source,
            })?;
            let user_table = parse_table(&toml_content, &path.to_string_lossy())?;
            merge_into(&mut root_value, Value::Table(user_table));
        }

        let overrides = parse_cli_overrides(args)?;
        for (key_path, raw_value) in overrides {
            apply_override(&mut root_value, &key_path, &raw_value)?;
        }

        let config: Self = root_value.try_into().map_err(ConfigError::Deserialize)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_HEARTBEAT_INTERVAL_MS..=MAX_HEARTBEAT_INTERVAL_MS)
            .contains(&self.heartbeat.interval_ms)
        {
            return Err(ConfigError::InvalidValue {
                key: "heartbeat.interval_ms".to_owned(),
                reason: format!(
                    "must be between {MIN_HEARTBEAT_INTERVAL_MS} and {MAX_HEARTBEAT_INTERVAL_MS}"
                ),
            });
        }
        for (key, value) in [
            ("farm.check_interval_ms", self.farm.check_interval_ms),
            ("friend.check_interval_ms", self.friend.check_interval_ms),
        ] {
            if value < MIN_CHECK_INTERVAL_MS {
                return Err(ConfigError::InvalidValue {
                    key: key.to_owned(),
                    reason: format!("must be at least {MIN_CHECK_INTERVAL_MS}"),
                });
            }
        }
        if self.wire.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "wire.call_timeout_ms".to_owned(),
                reason: "must be positive".to_owned(),
            });
        }
        if self.server.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "server.url".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    TomlParse {
        path: String,
        source: toml::de::Error,
    },
    Deserialize(toml::de::Error),
    MissingValueForArg {
        key: String,
    },
    InvalidArgFormat {
        arg: String,
    },
    InvalidPath {
        key: String,
    },
    UnknownPath {
        key: String,
    },
    UnsupportedOverrideType {
        key: String,
    },
    InvalidValueForType {
        key: String,
        expected: &'static str,
        value: String,
    },
    InvalidValue {
        key: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config file '{path}': {source}")
            }
            Self::TomlParse { path, source } => {
                write!(f, "failed to parse TOML config '{path}': {source}")
            }
            Self::Deserialize(source) => write!(f, "failed to deserialize config: {source}"),
            Self::MissingValueForArg { key } => {
                write!(f, "missing value for CLI argument '--{key}'")
            }
            Self::InvalidArgFormat { arg } => write!(
                f,
                "invalid CLI argument format '{arg}', expected '--section.key value'"
            ),
            Self::InvalidPath { key } => write!(f, "invalid override key path '{key}'"),
            Self::UnknownPath { key } => write!(f, "unknown override key path '{key}'"),
            Self::UnsupportedOverrideType { key } => {
                write!(f, "override not supported for complex TOML type at '{key}'")
            }
            Self::InvalidValueForType {
                key,
                expected,
                value,
            } => write!(
                f,
                "invalid value '{value}' for '{key}', expected type {expected}"
            ),
            Self::InvalidValue { key, reason } => write!(f, "invalid '{key}': {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn parse_table(content: &str, label: &str) -> Result<Table, ConfigError> {
    toml::from_str::<Table>(content).map_err(|source| ConfigError::TomlParse {
        path: label.to_owned(),
        source,
    })
}

/// Tables merge key by key; any other value replaces the base.
fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn split_config_path(
    args: impl IntoIterator<Item = String>,
) -> Result<(Option<PathBuf>, Vec<String>), ConfigError> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter.next().ok_or_else(|| ConfigError::MissingValueForArg {
                key: "config".to_owned(),
            })?;
            config_path = Some(PathBuf::from(value));
        } else {
            rest.push(arg);
        }
    }

    Ok((config_path, rest))
}

fn parse_cli_overrides(
    args: impl IntoIterator<Item = String>,
) -> Result<Vec<(String, String)>, ConfigError> {
    let mut parsed = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let Some(stripped) = arg.strip_prefix("--") else {
            return Err(ConfigError::InvalidArgFormat { arg });
        };

        if stripped.is_empty() {
            return Err(ConfigError::InvalidArgFormat { arg });
        }

        let value = iter.next().ok_or_else(|| ConfigError::MissingValueForArg {
            key: stripped.to_owned(),
        })?;

        parsed.push((stripped.to_owned(), value));
    }

    Ok(parsed)
}

fn apply_override(root: &mut Value, key_path: &str, raw_value: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = key_path.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(ConfigError::InvalidPath {
            key: key_path.to_owned(),
        });
    }
    let Some((final_key, sections)) = parts.split_last() else {
        return Err(ConfigError::InvalidPath {
            key: key_path.to_owned(),
        });
    };

    let unknown = || ConfigError::UnknownPath {
        key: key_path.to_owned(),
    };

    let mut current = root;
    for section in sections {
        current = current
            .as_table_mut()
            .ok_or_else(unknown)?
            .get_mut(*section)
            .ok_or_else(unknown)?;
    }

    let current_value = current
        .as_table_mut()
        .ok_or_else(unknown)?
        .get_mut(*final_key)
        .ok_or_else(unknown)?;

    let parsed_value = parse_value_using_current_type(key_path, raw_value, current_value)?;
    *current_value = parsed_value;

    Ok(())
}

fn parse_value_using_current_type(
    key_path: &str,
    raw_value: &str,
    current_value: &Value,
) -> Result<Value, ConfigError> {
    let invalid = |expected: &'static str| ConfigError::InvalidValueForType {
        key: key_path.to_owned(),
        expected,
        value: raw_value.to_owned(),
    };

    match current_value {
        Value::String(_) => Ok(Value::String(raw_value.to_owned())),
        Value::Integer(_) => raw_value
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid("integer")),
        Value::Float(_) => raw_value
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid("float")),
        Value::Boolean(_) => raw_value
            .parse::<bool>()
            .map(Value::Boolean)
            .map_err(|_| invalid("boolean")),
        Value::Datetime(_) | Value::Array(_) | Value::Table(_) => {
            Err(ConfigError::UnsupportedOverrideType {
                key: key_path.to_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::{AppConfig, ConfigError};

    fn write_temp_config(content: &str, suffix: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "farmhand-config-test-{suffix}-{}.toml",
            std::process::id()
        ));
        fs::write(&path, content).expect("failed to write temp config");
        path
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn embedded_defaults_load_and_validate() {
        let config = AppConfig::load_layered(None, Vec::<String>::new())
            .expect("embedded defaults should load");

        assert_eq!(config.heartbeat.interval_ms, 25_000);
        assert_eq!(config.wire.call_timeout_ms, 10_000);
        assert_eq!(config.farm.action_delay_ms, 50);
        assert_eq!(config.friend.visit_delay_ms, 500);
        assert!(!config.friend.enable_nuisance);
        assert!(config.friend.help_only_with_exp);
        assert_eq!(config.server.platform, "qq");
    }

    #[test]
    fn partial_file_is_layered_over_defaults() {
        let path = write_temp_config(
            r#"
[server]
login_code = "abc123"

[farm]
auto_plant = false
"#,
            "partial",
        );

        let config = AppConfig::load_from_toml_with_args(&path, Vec::<String>::new())
            .expect("partial config should load");
        fs::remove_file(path).expect("temp config cleanup should succeed");

        assert_eq!(config.server.login_code, "abc123");
        assert!(!config.farm.auto_plant);
        assert!(config.farm.auto_harvest);
        assert_eq!(config.server.url, "wss://gate-obt.nqf.qq.com/prod/ws");
    }

    #[test]
    fn argv_overrides_matching_toml_paths() {
        let config = AppConfig::load_layered(
            None,
            args(&[
                "--logging.level",
                "debug",
                "--server.platform",
                "wx",
                "--friend.enable_nuisance",
                "true",
                "--heartbeat.interval_ms",
                "30000",
            ]),
        )
        .expect("config with overrides should load");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.platform, "wx");
        assert!(config.friend.enable_nuisance);
        assert_eq!(config.heartbeat.interval_ms, 30_000);
    }

    #[test]
    fn discovery_consumes_config_flag() {
        let path = write_temp_config("[server]\nlogin_code = \"from-file\"\n", "discovery");
        let path_arg = path.to_string_lossy().to_string();

        let config = AppConfig::load_with_discovery(vec![
            "--config".to_owned(),
            path_arg,
            "--farm.auto_weed".to_owned(),
            "false".to_owned(),
        ])
        .expect("discovered config should load");
        fs::remove_file(path).expect("temp config cleanup should succeed");

        assert_eq!(config.server.login_code, "from-file");
        assert!(!config.farm.auto_weed);
    }

    #[test]
    fn rejects_unknown_override_path() {
        let err = AppConfig::load_layered(None, args(&["--farm.nonexistent", "x"]))
            .expect_err("unknown override key should fail");
        assert!(matches!(err, ConfigError::UnknownPath { .. }));
    }

    #[test]
    fn rejects_mistyped_override_value() {
        let err = AppConfig::load_layered(None, args(&["--farm.auto_plant", "maybe"]))
            .expect_err("non-boolean should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValueForType {
                expected: "boolean",
                ..
            }
        ));
    }

    #[test]
    fn rejects_heartbeat_interval_out_of_range() {
        let err = AppConfig::load_layered(None, args(&["--heartbeat.interval_ms", "500"]))
            .expect_err("too short interval should fail");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_config_value_is_reported() {
        let err = AppConfig::load_with_discovery(args(&["--config"]))
            .expect_err("dangling --config should fail");
        assert!(matches!(err, ConfigError::MissingValueForArg { .. }));
    }
}
