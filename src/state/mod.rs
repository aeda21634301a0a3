//! Process-wide views: player record, live settings and the status board.

pub mod player;
pub mod settings;
pub mod status;

pub use player::{PlayerSnapshot, PlayerState};
pub use settings::{RuntimeSettings, SettingsHandle, SettingsPatch, SettingsWatcher};
pub use status::{BagEntry, JsonFileSink, LandSummary, SnapshotSink, StatusBoard, StatusSnapshot};
