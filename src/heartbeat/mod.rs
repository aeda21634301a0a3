use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use prost::Message;
use serde_json::{json, Value};

use crate::clock::ServerClock;
use crate::config::{AppConfig, MAX_HEARTBEAT_INTERVAL_MS, MIN_HEARTBEAT_INTERVAL_MS};
use crate::logging::{LogLevel, Logger};
use crate::shutdown::StopToken;
use crate::state::PlayerState;
use crate::wire::codec::decode_body;
use crate::wire::proto::{services, HeartbeatReply, HeartbeatRequest};
use crate::wire::session::Session;

pub const HEARTBEAT_METHOD: &str = "Heartbeat";
/// Silence longer than this many intervals counts as a miss.
pub const MISS_THRESHOLD_FACTOR: f64 = 2.4;
/// Consecutive misses after which pending calls are given up on.
pub const FLUSH_AFTER_MISSES: u32 = 2;

const CONTEXT: &str = "heartbeat";

#[derive(Clone, Copy, Debug)]
pub struct HeartbeatOptions {
    pub interval_ms: u64,
    pub call_timeout: Duration,
}

impl HeartbeatOptions {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            interval_ms: config.heartbeat.interval_ms,
            call_timeout: config.wire.call_timeout(),
        }
    }
}

#[derive(Debug)]
pub enum HeartbeatError {
    InvalidInterval { provided_ms: u64 },
    AlreadyRunning,
    Spawn(std::io::Error),
    JoinFailed,
}

impl fmt::Display for HeartbeatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval { provided_ms } => write!(
                f,
                "heartbeat interval must be between {MIN_HEARTBEAT_INTERVAL_MS}ms and {MAX_HEARTBEAT_INTERVAL_MS}ms, got {provided_ms}ms"
            ),
            Self::AlreadyRunning => write!(f, "heartbeat is already running"),
            Self::Spawn(source) => write!(f, "failed to spawn heartbeat thread: {source}"),
            Self::JoinFailed => write!(f, "heartbeat worker thread join failed"),
        }
    }
}

impl std::error::Error for HeartbeatError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    Missed { count: u32 },
    Flush { count: u32 },
}

/// Tracks how long the server has been silent, in heartbeat intervals.
#[derive(Debug)]
pub struct LivenessMonitor {
    threshold: Duration,
    last_reply: Instant,
    misses: u32,
}

impl LivenessMonitor {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            threshold: interval.mul_f64(MISS_THRESHOLD_FACTOR),
            last_reply: now,
            misses: 0,
        }
    }

    pub fn on_reply(&mut self, now: Instant) {
        self.last_reply = now;
        self.misses = 0;
    }

    pub fn on_tick(&mut self, now: Instant) -> Liveness {
        if now.saturating_duration_since(self.last_reply) <= self.threshold {
            return Liveness::Healthy;
        }
        self.misses += 1;
        if self.misses >= FLUSH_AFTER_MISSES {
            Liveness::Flush { count: self.misses }
        } else {
            Liveness::Missed { count: self.misses }
        }
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }
}

/// Logs a tick outcome and, on `Flush`, rejects every pending call with a
/// timeout. The session itself is left open.
pub fn apply_liveness(outcome: Liveness, session: &Session, logger: &Logger) {
    match outcome {
        Liveness::Healthy => {}
        Liveness::Missed { count } => logger.warn(
            Some(CONTEXT),
            &format!("No heartbeat reply in time (miss #{count})"),
        ),
        Liveness::Flush { count } => {
            logger.warn(
                Some(CONTEXT),
                &format!("No heartbeat reply in time (miss #{count}); rejecting pending calls"),
            );
            session.flush_pending("server unresponsive");
        }
    }
}

/// Shared pieces a beat needs; cloned into the worker and per-beat senders.
#[derive(Clone)]
struct Beat {
    session: Arc<Session>,
    player: Arc<PlayerState>,
    clock: Arc<ServerClock>,
    logger: Arc<Logger>,
    monitor: Arc<Mutex<LivenessMonitor>>,
    in_flight: Arc<AtomicBool>,
    client_version: String,
    call_timeout: Duration,
}

impl Beat {
    fn monitor(&self) -> MutexGuard<'_, LivenessMonitor> {
        match self.monitor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn tick(&self) {
        if !self.session.is_open() {
            return;
        }
        let gid = self.player.gid();
        if gid == 0 {
            return;
        }

        let outcome = self.monitor().on_tick(Instant::now());
        apply_liveness(outcome, &self.session, &self.logger);

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        let beat = self.clone();
        let spawned = thread::Builder::new()
            .name("farmhand-heartbeat-call".to_owned())
            .spawn(move || {
                beat.send(gid);
                beat.in_flight.store(false, Ordering::SeqCst);
            });
        if let Err(error) = spawned {
            self.in_flight.store(false, Ordering::SeqCst);
            self.logger
                .warn(Some(CONTEXT), &format!("failed to spawn heartbeat call: {error}"));
        }
    }

    fn send(&self, gid: i64) {
        let request = HeartbeatRequest {
            gid,
            client_version: self.client_version.clone(),
        };
        let body = match self.session.call(
            services::USER,
            HEARTBEAT_METHOD,
            request.encode_to_vec(),
            self.call_timeout,
        ) {
            Ok(body) => body,
            Err(error) => {
                self.logger
                    .verbose(Some(CONTEXT), &format!("heartbeat call failed: {error}"));
                return;
            }
        };

        self.monitor().on_reply(Instant::now());
        match decode_body::<HeartbeatReply>(&body) {
            Ok(reply) if reply.server_time > 0 => self.clock.sync(reply.server_time),
            Ok(_) => {}
            Err(error) => self
                .logger
                .verbose(Some(CONTEXT), &format!("undecodable heartbeat reply: {error}")),
        }
    }
}

pub struct Heartbeat {
    pub initiated_at: DateTime<Utc>,
    interval_ms: u64,
    beat: Beat,
    stop_signal: StopToken,
    worker: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn new(
        session: Arc<Session>,
        player: Arc<PlayerState>,
        clock: Arc<ServerClock>,
        logger: Arc<Logger>,
        client_version: String,
        config: HeartbeatOptions,
    ) -> Result<Self, HeartbeatError> {
        Self::validate_interval(config.interval_ms)?;
        let interval = Duration::from_millis(config.interval_ms);

        Ok(Self {
            initiated_at: Utc::now(),
            interval_ms: config.interval_ms,
            beat: Beat {
                session,
                player,
                clock,
                logger,
                monitor: Arc::new(Mutex::new(LivenessMonitor::new(interval, Instant::now()))),
                in_flight: Arc::new(AtomicBool::new(false)),
                client_version,
                call_timeout: config.call_timeout,
            },
            stop_signal: StopToken::new(),
            worker: None,
        })
    }

    pub fn start(&mut self) -> Result<(), HeartbeatError> {
        if self.worker.is_some() {
            return Err(HeartbeatError::AlreadyRunning);
        }

        let stop_signal = self.stop_signal.clone();
        let beat = self.beat.clone();
        beat.monitor().on_reply(Instant::now());
        let interval = Duration::from_millis(self.interval_ms);

        let worker = thread::Builder::new()
            .name("farmhand-heartbeat".to_owned())
            .spawn(move || loop {
                beat.tick();
                if stop_signal.sleep(interval) {
                    break;
                }
            })
            .map_err(HeartbeatError::Spawn)?;
        self.worker = Some(worker);

        self.beat.logger.log(
            LogLevel::Debug,
            Some(CONTEXT),
            "heartbeat started",
            Some(self.initial_metadata_payload()),
        );
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), HeartbeatError> {
        self.stop_signal.stop();

        if let Some(handle) = self.worker.take() {
            return handle.join().map_err(|_| HeartbeatError::JoinFailed);
        }

        Ok(())
    }

    pub fn initial_metadata_payload(&self) -> Value {
        json!({
            "initiated_at": self.initiated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "interval_ms": self.interval_ms,
            "miss_threshold_ms": (self.interval_ms as f64 * MISS_THRESHOLD_FACTOR) as u64,
        })
    }

    fn validate_interval(interval_ms: u64) -> Result<(), HeartbeatError> {
        if (MIN_HEARTBEAT_INTERVAL_MS..=MAX_HEARTBEAT_INTERVAL_MS).contains(&interval_ms) {
            Ok(())
        } else {
            Err(HeartbeatError::InvalidInterval {
                provided_ms: interval_ms,
            })
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop_signal.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use prost::Message;

    use crate::clock::ServerClock;
    use crate::state::PlayerState;
    use crate::wire::proto::{services, HeartbeatReply, HeartbeatRequest, PlayerBasic};
    use crate::wire::session::test_support::SessionHarness;
    use crate::wire::session::CallError;

    use super::{
        apply_liveness, Heartbeat, HeartbeatOptions, HeartbeatError, Liveness, LivenessMonitor,
        HEARTBEAT_METHOD,
    };

    const INTERVAL: Duration = Duration::from_secs(25);

    fn config(interval_ms: u64) -> HeartbeatOptions {
        HeartbeatOptions {
            interval_ms,
            call_timeout: Duration::from_secs(2),
        }
    }

    fn logged_in_player() -> Arc<PlayerState> {
        let player = Arc::new(PlayerState::new());
        player.apply_login(&PlayerBasic {
            gid: 321,
            name: "grower".to_owned(),
            level: 5,
            exp: 0,
            gold: 0,
        });
        player
    }

    #[test]
    fn misses_count_only_past_the_threshold() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, start);

        assert_eq!(monitor.on_tick(start + Duration::from_secs(50)), Liveness::Healthy);
        assert_eq!(monitor.on_tick(start + Duration::from_secs(60)), Liveness::Healthy);
        assert_eq!(
            monitor.on_tick(start + Duration::from_secs(61)),
            Liveness::Missed { count: 1 }
        );
        monitor.on_reply(start + Duration::from_secs(62));
        assert_eq!(monitor.misses(), 0);
        assert_eq!(monitor.on_tick(start + Duration::from_secs(100)), Liveness::Healthy);
    }

    #[test]
    fn two_misses_reject_pending_calls_but_keep_session_open() {
        let harness = SessionHarness::open();
        let session = Arc::clone(&harness.session);
        let caller = thread::spawn(move || {
            session.call("svc", "Slow", Vec::new(), Duration::from_secs(30))
        });
        harness.next_request();

        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, start);
        let first = monitor.on_tick(start + Duration::from_secs(61));
        apply_liveness(first, &harness.session, &harness.logger);
        assert_eq!(harness.session.pending_count(), 1);

        let second = monitor.on_tick(start + Duration::from_secs(86));
        assert_eq!(second, Liveness::Flush { count: 2 });
        apply_liveness(second, &harness.session, &harness.logger);

        let result = caller.join().expect("caller should finish");
        assert!(matches!(result, Err(CallError::Timeout { .. })));
        assert!(harness.session.is_open());
        assert_eq!(harness.session.pending_count(), 0);
        assert_eq!(harness.sink.count_containing("rejecting pending calls"), 1);
    }

    #[test]
    fn rejects_intervals_outside_allowed_range() {
        let harness = SessionHarness::open();
        let build = |interval_ms| {
            Heartbeat::new(
                Arc::clone(&harness.session),
                Arc::new(PlayerState::new()),
                Arc::new(ServerClock::new()),
                Arc::clone(&harness.logger),
                "1.0".to_owned(),
                config(interval_ms),
            )
        };

        assert!(matches!(
            build(999),
            Err(HeartbeatError::InvalidInterval { provided_ms: 999 })
        ));
        assert!(matches!(
            build(120_001),
            Err(HeartbeatError::InvalidInterval { provided_ms: 120_001 })
        ));
    }

    #[test]
    fn beats_carry_gid_and_replies_sync_the_clock() {
        let harness = SessionHarness::open();
        let clock = Arc::new(ServerClock::new());
        let mut heartbeat = Heartbeat::new(
            Arc::clone(&harness.session),
            logged_in_player(),
            Arc::clone(&clock),
            Arc::clone(&harness.logger),
            "1.6.0".to_owned(),
            config(1_000),
        )
        .expect("heartbeat should be created");

        heartbeat.start().expect("heartbeat should start");
        assert!(matches!(heartbeat.start(), Err(HeartbeatError::AlreadyRunning)));

        let request = harness.next_request();
        assert_eq!(request.service, services::USER);
        assert_eq!(request.method, HEARTBEAT_METHOD);
        let beat = HeartbeatRequest::decode(request.body.as_slice()).expect("heartbeat body");
        assert_eq!((beat.gid, beat.client_version.as_str()), (321, "1.6.0"));

        let reply = HeartbeatReply {
            server_time: 1_760_000_000_000,
        };
        harness.respond(request.client_seq, 0, reply.encode_to_vec());

        let deadline = Instant::now() + Duration::from_secs(2);
        while !clock.is_synced() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        heartbeat.stop().expect("heartbeat should stop");
        assert!(clock.is_synced());
    }

    #[test]
    fn no_beat_before_login() {
        let harness = SessionHarness::open();
        let mut heartbeat = Heartbeat::new(
            Arc::clone(&harness.session),
            Arc::new(PlayerState::new()),
            Arc::new(ServerClock::new()),
            Arc::clone(&harness.logger),
            "1.0".to_owned(),
            config(1_000),
        )
        .expect("heartbeat should be created");

        heartbeat.start().expect("heartbeat should start");
        thread::sleep(Duration::from_millis(100));
        heartbeat.stop().expect("heartbeat should stop");

        assert!(harness
            .outbound
            .recv_timeout(Duration::from_millis(10))
            .is_err());
    }
}
