use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use prost::Message;
use serde_json::json;

use crate::logging::{LogLevel, Logger};
use crate::wire::codec::{decode_body, CodecError};
use crate::wire::proto::EventMessage;

pub type ListenerResult = Result<(), String>;

type SyncListener = Arc<dyn Fn(&Notification) -> ListenerResult + Send + Sync>;
type AsyncListener = Arc<dyn Fn(Notification) -> ListenerResult + Send + Sync>;

/// Push categories the client reacts to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NotifyKind {
    LandChange,
    ItemChange,
    PlayerBasicChange,
    ForcedLogout,
    FriendApplicationReceived,
    FriendAdded,
    ShopUnlock,
    TaskUpdate,
    Unrecognized,
}

impl NotifyKind {
    /// Exact match on the short type name (last `.` segment).
    pub fn classify(message_type: &str) -> Self {
        let short_name = message_type.rsplit('.').next().unwrap_or(message_type);
        match short_name {
            "LandsNotify" => Self::LandChange,
            "ItemNotify" => Self::ItemChange,
            "BasicNotify" => Self::PlayerBasicChange,
            "KickoutNotify" => Self::ForcedLogout,
            "FriendApplicationReceivedNotify" => Self::FriendApplicationReceived,
            "FriendAddedNotify" => Self::FriendAdded,
            "GoodsUnlockNotify" => Self::ShopUnlock,
            "TaskInfoNotify" => Self::TaskUpdate,
            _ => Self::Unrecognized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LandChange => "land-change",
            Self::ItemChange => "item-change",
            Self::PlayerBasicChange => "player-basic-change",
            Self::ForcedLogout => "forced-logout",
            Self::FriendApplicationReceived => "friend-application-received",
            Self::FriendAdded => "friend-added",
            Self::ShopUnlock => "shop-unlock",
            Self::TaskUpdate => "task-update",
            Self::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub kind: NotifyKind,
    pub type_name: String,
    pub body: Vec<u8>,
}

impl Notification {
    pub fn decode<M: Message + Default>(&self) -> Result<M, CodecError> {
        decode_body(&self.body)
    }
}

pub struct NotificationDispatcher {
    sync_listeners: RwLock<HashMap<NotifyKind, Vec<SyncListener>>>,
    async_listeners: RwLock<HashMap<NotifyKind, Vec<AsyncListener>>>,
    unrecognized_seen: Mutex<HashSet<String>>,
    logger: Arc<Logger>,
}

impl NotificationDispatcher {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            sync_listeners: RwLock::new(HashMap::new()),
            async_listeners: RwLock::new(HashMap::new()),
            unrecognized_seen: Mutex::new(HashSet::new()),
            logger,
        }
    }

    /// Runs on the transport thread. Must not block on session calls.
    pub fn on<F>(&self, kind: NotifyKind, listener: F)
    where
        F: Fn(&Notification) -> ListenerResult + Send + Sync + 'static,
    {
        let mut listeners = match self.sync_listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.entry(kind).or_default().push(Arc::new(listener));
    }

    /// Each delivery runs on its own thread; safe for listeners that call back into the session.
    pub fn on_async<F>(&self, kind: NotifyKind, listener: F)
    where
        F: Fn(Notification) -> ListenerResult + Send + Sync + 'static,
    {
        let mut listeners = match self.async_listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.entry(kind).or_default().push(Arc::new(listener));
    }

    pub fn dispatch(&self, event: EventMessage) {
        if event.message_type.is_empty() {
            return;
        }

        let kind = NotifyKind::classify(&event.message_type);
        if kind == NotifyKind::Unrecognized {
            self.note_unrecognized(&event.message_type);
            return;
        }

        let notification = Notification {
            kind,
            type_name: event.message_type,
            body: event.body,
        };
        self.run_sync(&notification);
        self.dispatch_async(notification);
    }

    fn note_unrecognized(&self, type_name: &str) {
        let mut seen = match self.unrecognized_seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.insert(type_name.to_owned()) {
            self.logger.log(
                LogLevel::Debug,
                Some("events"),
                "Unrecognized push type",
                Some(json!({ "type": type_name })),
            );
        }
    }

    fn run_sync(&self, notification: &Notification) {
        let listeners = match self.sync_listeners.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(handlers) = listeners.get(&notification.kind) else {
            return;
        };

        for (idx, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => {}
                Ok(Err(message)) => self.logger.warn(
                    Some("events"),
                    &format!(
                        "sync listener #{idx} failed for '{}': {message}",
                        notification.kind.as_str()
                    ),
                ),
                Err(_) => self.logger.error(
                    Some("events"),
                    &format!(
                        "sync listener #{idx} panicked for '{}'",
                        notification.kind.as_str()
                    ),
                ),
            }
        }
    }

    fn dispatch_async(&self, notification: Notification) {
        let listeners = match self.async_listeners.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(handlers) = listeners.get(&notification.kind) else {
            return;
        };

        for (idx, handler) in handlers.iter().enumerate() {
            let listener = Arc::clone(handler);
            let delivered = notification.clone();
            let logger = Arc::clone(&self.logger);
            thread::spawn(move || {
                let kind = delivered.kind;
                match catch_unwind(AssertUnwindSafe(|| listener(delivered))) {
                    Ok(Ok(())) => {}
                    Ok(Err(message)) => logger.warn(
                        Some("events"),
                        &format!("async listener #{idx} failed for '{}': {message}", kind.as_str()),
                    ),
                    Err(_) => logger.error(
                        Some("events"),
                        &format!("async listener #{idx} panicked for '{}'", kind.as_str()),
                    ),
                }
            });
        }
    }
}

/// Collapses bursts: at most one firing per `window`, and never while the
/// previously scheduled task is still pending or running.
pub struct Debouncer {
    window: Duration,
    last_fired: Option<Instant>,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
            pending: None,
        }
    }

    pub fn try_fire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_fired {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        if self.pending.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        self.last_fired = Some(now);
        true
    }

    /// Fires `task` after `settle` on a timer thread when the window allows it.
    pub fn schedule<F>(&mut self, now: Instant, settle: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.try_fire(now) {
            return false;
        }

        self.pending = Some(thread::spawn(move || {
            thread::sleep(settle);
            task();
        }));
        true
    }
}
