use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::logging::RecentLinesSink;
use crate::quota::{OperationKind, OperationQuota, QuotaTracker};

use super::player::{PlayerSnapshot, PlayerState};
use super::settings::{RuntimeSettings, SettingsHandle};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LandSummary {
    pub total: usize,
    pub unlocked: usize,
    pub growing: usize,
    pub mature: usize,
    pub empty: usize,
    pub dead: usize,
    pub needs_water: usize,
    pub needs_weed: usize,
    pub needs_pest: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BagEntry {
    pub id: i64,
    pub name: String,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApplicationStatus {
    pub name: &'static str,
    pub version: &'static str,
    pub build_date_utc: &'static str,
    pub git_revision: &'static str,
    pub build_target: &'static str,
    pub started_at: String,
    pub uptime_seconds: i64,
    pub pid: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub available: bool,
    pub vm_rss_kb: Option<i64>,
    pub vm_size_kb: Option<i64>,
    pub vm_peak_kb: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub generated_at: String,
    pub application: ApplicationStatus,
    pub memory: MemoryStats,
    pub connected: bool,
    pub player: PlayerSnapshot,
    pub lands: LandSummary,
    pub backpack: Vec<BagEntry>,
    pub quotas: BTreeMap<OperationKind, OperationQuota>,
    pub settings: RuntimeSettings,
    pub recent_logs: Vec<String>,
}

/// Mutable pieces of the status view that no other component owns.
#[derive(Debug)]
pub struct StatusBoard {
    started_at: DateTime<Utc>,
    connected: AtomicBool,
    lands: Mutex<LandSummary>,
    backpack: Mutex<Vec<BagEntry>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            connected: AtomicBool::new(false),
            lands: Mutex::new(LandSummary::default()),
            backpack: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_lands(&self, summary: LandSummary) {
        *lock(&self.lands) = summary;
    }

    pub fn lands(&self) -> LandSummary {
        lock(&self.lands).clone()
    }

    pub fn set_backpack(&self, entries: Vec<BagEntry>) {
        *lock(&self.backpack) = entries;
    }

    pub fn build_snapshot(
        &self,
        player: &PlayerState,
        quotas: &Mutex<QuotaTracker>,
        settings: &SettingsHandle,
        recent_logs: Option<&RecentLinesSink>,
    ) -> StatusSnapshot {
        let now = Utc::now();
        StatusSnapshot {
            generated_at: now.to_rfc3339(),
            application: application_status(self.started_at, now),
            memory: memory_stats(),
            connected: self.is_connected(),
            player: player.snapshot(),
            lands: self.lands(),
            backpack: lock(&self.backpack).clone(),
            quotas: lock(quotas).snapshot(),
            settings: settings.current(),
            recent_logs: recent_logs.map(RecentLinesSink::snapshot).unwrap_or_default(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn application_status(started_at: DateTime<Utc>, now: DateTime<Utc>) -> ApplicationStatus {
    ApplicationStatus {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        build_date_utc: env!("FARMHAND_BUILD_DATE_UTC"),
        git_revision: env!("FARMHAND_GIT_REVISION"),
        build_target: env!("FARMHAND_BUILD_TARGET"),
        started_at: started_at.to_rfc3339(),
        uptime_seconds: (now - started_at).num_seconds().max(0),
        pid: std::process::id(),
    }
}

pub fn memory_stats() -> MemoryStats {
    let mut stats = MemoryStats::default();

    if let Ok(status) = fs::read_to_string("/proc/self/status") {
        for line in status.lines() {
            if line.starts_with("VmRSS:") {
                stats.vm_rss_kb = parse_kb_field(line);
            } else if line.starts_with("VmSize:") {
                stats.vm_size_kb = parse_kb_field(line);
            } else if line.starts_with("VmPeak:") {
                stats.vm_peak_kb = parse_kb_field(line);
            }
        }
    }

    stats.available =
        stats.vm_rss_kb.is_some() || stats.vm_size_kb.is_some() || stats.vm_peak_kb.is_some();
    stats
}

fn parse_kb_field(line: &str) -> Option<i64> {
    line.split_whitespace().nth(1)?.parse::<i64>().ok()
}

#[derive(Debug)]
pub enum SinkError {
    Serialize(serde_json::Error),
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(source) => write!(f, "failed to serialize status snapshot: {source}"),
            Self::Io { path, source } => {
                write!(f, "failed to write status snapshot '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SinkError {}

pub trait SnapshotSink: Send + Sync {
    fn publish(&self, snapshot: &StatusSnapshot) -> Result<(), SinkError>;
}

/// Writes pretty JSON next to the target and renames it into place.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SnapshotSink for JsonFileSink {
    fn publish(&self, snapshot: &StatusSnapshot) -> Result<(), SinkError> {
        let payload = serde_json::to_vec_pretty(snapshot).map_err(SinkError::Serialize)?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let io_error = |source| SinkError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&staging, payload).map_err(io_error)?;
        fs::rename(&staging, &self.path).map_err(io_error)
    }
}
