use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, MIN_CHECK_INTERVAL_MS};

/// Feature switches the loops re-read on every cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuntimeSettings {
    pub farm_check_interval_ms: u64,
    pub friend_check_interval_ms: u64,
    pub auto_harvest: bool,
    pub auto_remove: bool,
    pub auto_plant: bool,
    pub auto_fertilize: bool,
    pub auto_water: bool,
    pub auto_weed: bool,
    pub auto_pest: bool,
    pub auto_upgrade: bool,
    pub auto_unlock: bool,
    pub force_lowest_level_crop: bool,
    pub auto_visit: bool,
    pub auto_help: bool,
    pub auto_steal: bool,
    pub auto_accept_applications: bool,
    pub help_only_with_exp: bool,
    pub enable_nuisance: bool,
    pub auto_sell: bool,
}

impl RuntimeSettings {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let farm = &config.farm;
        let friend = &config.friend;
        Self {
            farm_check_interval_ms: farm.check_interval_ms,
            friend_check_interval_ms: friend.check_interval_ms,
            auto_harvest: farm.auto_harvest,
            auto_remove: farm.auto_remove,
            auto_plant: farm.auto_plant,
            auto_fertilize: farm.auto_fertilize,
            auto_water: farm.auto_water,
            auto_weed: farm.auto_weed,
            auto_pest: farm.auto_pest,
            auto_upgrade: farm.auto_upgrade,
            auto_unlock: farm.auto_unlock,
            force_lowest_level_crop: farm.force_lowest_level_crop,
            auto_visit: friend.auto_visit,
            auto_help: friend.auto_help,
            auto_steal: friend.auto_steal,
            auto_accept_applications: friend.auto_accept_applications,
            help_only_with_exp: friend.help_only_with_exp,
            enable_nuisance: friend.enable_nuisance,
            auto_sell: config.warehouse.auto_sell,
        }
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    pub farm_check_interval_ms: Option<u64>,
    pub friend_check_interval_ms: Option<u64>,
    pub auto_harvest: Option<bool>,
    pub auto_remove: Option<bool>,
    pub auto_plant: Option<bool>,
    pub auto_fertilize: Option<bool>,
    pub auto_water: Option<bool>,
    pub auto_weed: Option<bool>,
    pub auto_pest: Option<bool>,
    pub auto_upgrade: Option<bool>,
    pub auto_unlock: Option<bool>,
    pub force_lowest_level_crop: Option<bool>,
    pub auto_visit: Option<bool>,
    pub auto_help: Option<bool>,
    pub auto_steal: Option<bool>,
    pub auto_accept_applications: Option<bool>,
    pub help_only_with_exp: Option<bool>,
    pub enable_nuisance: Option<bool>,
    pub auto_sell: Option<bool>,
}

#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, source: io::Error },
    Parse(serde_json::Error),
    InvalidValue { key: &'static str, reason: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read settings '{}': {source}", path.display())
            }
            Self::Parse(source) => write!(f, "invalid settings patch: {source}"),
            Self::InvalidValue { key, reason } => write!(f, "invalid setting '{key}': {reason}"),
        }
    }
}

impl std::error::Error for SettingsError {}

#[derive(Clone, Debug)]
pub struct SettingsHandle {
    inner: Arc<RwLock<RuntimeSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn current(&self) -> RuntimeSettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Validates the whole patch before touching anything; returns the names
    /// of the fields whose value actually changed.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<Vec<&'static str>, SettingsError> {
        for (key, value) in [
            ("farm_check_interval_ms", patch.farm_check_interval_ms),
            ("friend_check_interval_ms", patch.friend_check_interval_ms),
        ] {
            if matches!(value, Some(ms) if ms < MIN_CHECK_INTERVAL_MS) {
                return Err(SettingsError::InvalidValue {
                    key,
                    reason: format!("must be at least {MIN_CHECK_INTERVAL_MS}"),
                });
            }
        }

        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let settings = &mut *guard;
        let mut changed = Vec::new();

        macro_rules! patch_fields {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = patch.$field {
                        if settings.$field != value {
                            settings.$field = value;
                            changed.push(stringify!($field));
                        }
                    }
                )*
            };
        }

        patch_fields!(
            farm_check_interval_ms,
            friend_check_interval_ms,
            auto_harvest,
            auto_remove,
            auto_plant,
            auto_fertilize,
            auto_water,
            auto_weed,
            auto_pest,
            auto_upgrade,
            auto_unlock,
            force_lowest_level_crop,
            auto_visit,
            auto_help,
            auto_steal,
            auto_accept_applications,
            help_only_with_exp,
            enable_nuisance,
            auto_sell,
        );

        Ok(changed)
    }
}

/// Re-reads a JSON patch file whenever its modification time moves.
pub struct SettingsWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    handle: SettingsHandle,
}

impl SettingsWatcher {
    pub fn new(path: PathBuf, handle: SettingsHandle) -> Self {
        Self {
            path,
            last_modified: None,
            handle,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// `Ok(None)` when the file is absent or unchanged since the last poll.
    pub fn poll(&mut self) -> Result<Option<Vec<&'static str>>, SettingsError> {
        let modified = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.modified().ok(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if modified.is_some() && modified == self.last_modified {
            return Ok(None);
        }
        self.last_modified = modified;

        let content = fs::read_to_string(&self.path).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let patch: SettingsPatch = serde_json::from_str(&content).map_err(SettingsError::Parse)?;
        self.handle.apply(&patch).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::config::AppConfig;

    use super::{RuntimeSettings, SettingsError, SettingsHandle, SettingsPatch, SettingsWatcher};

    fn defaults() -> RuntimeSettings {
        let config = AppConfig::load_with_discovery(Vec::<String>::new())
            .expect("default config should load");
        RuntimeSettings::from_app_config(&config)
    }

    #[test]
    fn runtime_settings_mirror_config() {
        let settings = defaults();
        assert!(settings.auto_harvest);
        assert!(!settings.enable_nuisance);
        assert_eq!(settings.farm_check_interval_ms, 1_000);
        assert_eq!(settings.friend_check_interval_ms, 10_000);
    }

    #[test]
    fn patch_reports_only_changed_fields() {
        let handle = SettingsHandle::new(defaults());
        let patch = SettingsPatch {
            auto_plant: Some(false),
            auto_harvest: Some(true),
            friend_check_interval_ms: Some(30_000),
            ..SettingsPatch::default()
        };

        let changed = handle.apply(&patch).expect("patch should apply");

        assert_eq!(changed, vec!["friend_check_interval_ms", "auto_plant"]);
        let current = handle.current();
        assert!(!current.auto_plant);
        assert_eq!(current.friend_check_interval_ms, 30_000);
    }

    #[test]
    fn invalid_interval_rejects_whole_patch() {
        let handle = SettingsHandle::new(defaults());
        let patch = SettingsPatch {
            auto_plant: Some(false),
            farm_check_interval_ms: Some(10),
            ..SettingsPatch::default()
        };

        let err = handle.apply(&patch).expect_err("short interval should fail");
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
        assert!(handle.current().auto_plant);
    }

    #[test]
    fn watcher_applies_file_once_per_modification() {
        let path = std::env::temp_dir().join(format!(
            "farmhand-settings-test-{}.json",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        let handle = SettingsHandle::new(defaults());
        let mut watcher = SettingsWatcher::new(path.clone(), handle.clone());

        assert!(watcher.poll().expect("missing file is fine").is_none());

        fs::write(&path, r#"{"enable_nuisance": true}"#).expect("write settings");
        let changed = watcher.poll().expect("patch should apply");
        assert_eq!(changed, Some(vec!["enable_nuisance"]));
        assert!(handle.current().enable_nuisance);

        assert!(watcher.poll().expect("unchanged file").is_none());
        fs::remove_file(path).expect("cleanup settings file");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<SettingsPatch, _> = serde_json::from_str(r#"{"auto_fly": true}"#);
        assert!(result.is_err());
    }
}
