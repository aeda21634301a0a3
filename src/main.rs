mod catalog;
mod clock;
mod config;
mod context;
mod events;
mod farm;
mod friend;
mod game;
mod heartbeat;
mod logging;
mod quota;
mod scheduler;
mod shutdown;
mod state;
mod utils;
mod warehouse;
mod wire;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use catalog::{CatalogYieldRecommender, PlantCatalog};
use clock::ServerClock;
use config::AppConfig;
use context::BotContext;
use events::{NotificationDispatcher, NotifyKind};
use farm::FarmOrchestrator;
use friend::analysis::friend_display_name;
use friend::FriendOrchestrator;
use game::SessionGameApi;
use heartbeat::{Heartbeat, HeartbeatOptions};
use logging::{FanoutSink, LogLevel, LogSink, Logger, LoggerConfig, RecentLinesSink, StdoutSink};
use quota::QuotaTracker;
use scheduler::PollingLoop;
use serde_json::json;
use shutdown::{ShutdownHooks, StopToken};
use state::{
    JsonFileSink, PlayerState, RuntimeSettings, SettingsHandle, SettingsWatcher, SnapshotSink,
    StatusBoard,
};
use utils::startup_banner::print_startup_banner;
use warehouse::Warehouse;
use wire::codec::WireCodec;
use wire::handshake::{self, build_login_request};
use wire::proto::{
    BasicNotify, FriendAddedNotify, FriendApplicationReceivedNotify, GoodsUnlockNotify,
    ItemNotify, KickoutNotify, LandsNotify, TaskInfoNotify,
};
use wire::session::transport::{self, TransportHandle};
use wire::session::{Closure, Session};

const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn main() {
    ensure_posix_or_exit();
    print_startup_banner();

    let app_config = load_config_or_exit();
    let log_level =
        LogLevel::from_config_value(&app_config.logging.level).unwrap_or_else(|| {
            eprintln!(
                "invalid logging.level '{}'. Allowed values: error, warn, info, debug, verbose",
                app_config.logging.level
            );
            process::exit(2);
        });

    let recent_lines = Arc::new(RecentLinesSink::new(app_config.logging.recent_lines));
    let sinks: Vec<Arc<dyn LogSink>> = vec![
        Arc::new(StdoutSink) as Arc<dyn LogSink>,
        Arc::clone(&recent_lines) as Arc<dyn LogSink>,
    ];
    let logger = Arc::new(Logger::with_sink(
        LoggerConfig {
            min_level: log_level,
            human_friendly: app_config.logging.human_friendly,
        },
        Arc::new(FanoutSink::new(sinks)),
    ));

    let shutdown_hooks = ShutdownHooks::install().unwrap_or_else(|error| {
        eprintln!("failed to install shutdown hooks: {error}");
        process::exit(2);
    });
    logger.info(
        Some("main::shutdown"),
        "Shutdown hooks installed for SIGINT/SIGTERM",
    );

    let catalog = Arc::new(load_catalog_or_exit(&app_config, &logger));
    let target = handshake::connect_target(&app_config).unwrap_or_else(|error| {
        eprintln!("connection configuration error: {error}");
        process::exit(2);
    });

    let wire_codec = WireCodec::from_app_config(&app_config);
    let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&logger)));
    let session = Arc::new(Session::new(
        wire_codec,
        Arc::clone(&dispatcher),
        Arc::clone(&logger),
        app_config.wire.call_timeout(),
    ));

    let context = BotContext {
        game: Arc::new(SessionGameApi::new(Arc::clone(&session))),
        clock: Arc::new(ServerClock::new()),
        player: Arc::new(PlayerState::new()),
        quotas: Arc::new(Mutex::new(QuotaTracker::new())),
        settings: SettingsHandle::new(RuntimeSettings::from_app_config(&app_config)),
        recommender: Arc::new(CatalogYieldRecommender::new(Arc::clone(&catalog))),
        catalog,
        status: Arc::new(StatusBoard::new()),
        logger: Arc::clone(&logger),
    };
    let farm = Arc::new(FarmOrchestrator::from_app_config(
        context.clone(),
        &app_config,
    ));
    let friend = Arc::new(FriendOrchestrator::from_app_config(
        context.clone(),
        &app_config,
    ));
    let kicked_out = Arc::new(AtomicBool::new(false));
    register_notification_handlers(
        &dispatcher,
        &context,
        &session,
        &farm,
        &friend,
        &kicked_out,
    );

    let transport = transport::open(&target, Arc::clone(&session)).unwrap_or_else(|error| {
        logger.error(Some("main::wire"), &format!("Connecting failed: {error}"));
        process::exit(1);
    });
    logger.log(
        LogLevel::Info,
        Some("main::wire"),
        "Websocket connected",
        Some(json!({
            "platform": app_config.server.platform,
            "client_version": app_config.server.client_version,
            "max_envelope_size_bytes": wire_codec.max_envelope_size_bytes()
        })),
    );

    let transport = login_or_exit(&app_config, &session, &context, transport);

    let mut heartbeat = Heartbeat::new(
        Arc::clone(&session),
        Arc::clone(&context.player),
        Arc::clone(&context.clock),
        Arc::clone(&logger),
        app_config.server.client_version.clone(),
        HeartbeatOptions::from_app_config(&app_config),
    )
    .unwrap_or_else(|error| {
        eprintln!("heartbeat configuration error: {error}");
        process::exit(2);
    });
    logger.log(
        LogLevel::Info,
        Some("main::heartbeat"),
        "Heartbeat initialized",
        Some(heartbeat.initial_metadata_payload()),
    );
    if let Err(error) = heartbeat.start() {
        logger.error(Some("main::heartbeat"), &format!("{error}"));
        process::exit(1);
    }

    let stop = StopToken::new();
    let loops = spawn_loops(&app_config, &context, &farm, &friend, &recent_lines, &stop)
        .unwrap_or_else(|error| {
            logger.error(Some("main::scheduler"), &format!("{error}"));
            process::exit(1);
        });

    let exit_code = loop {
        if shutdown_hooks.is_triggered() {
            logger.info(
                Some("main::shutdown"),
                "Shutdown signal received, starting graceful shutdown",
            );
            break 0;
        }
        match session.wait_closed(CLOSE_POLL_INTERVAL) {
            Some(Closure::Normal) if kicked_out.load(Ordering::SeqCst) => break 1,
            Some(Closure::Normal) => break 0,
            Some(Closure::Abnormal { reason }) => {
                logger.error(
                    Some("main::wire"),
                    &format!("Connection lost ({reason}); exiting"),
                );
                break 1;
            }
            None => {}
        }
    };

    stop.stop();
    if let Err(error) = heartbeat.stop() {
        logger.warn(Some("main::shutdown"), &format!("{error}"));
    }
    for polling in loops {
        let name = polling.name();
        if let Err(error) = polling.join() {
            logger.warn(Some("main::shutdown"), &format!("{name}: {error}"));
        }
    }
    session.flush_pending("shutting down");
    session.close();
    transport.join();
    context.status.set_connected(false);
    logger.info(Some("main::shutdown"), "Shutdown completed");
    process::exit(exit_code);
}

fn load_config_or_exit() -> AppConfig {
    match AppConfig::load_with_discovery(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            process::exit(2);
        }
    }
}

fn ensure_posix_or_exit() {
    if !cfg!(unix) {
        eprintln!("unsupported platform: farmhand is intended for POSIX systems");
        process::exit(2);
    }
}

fn load_catalog_or_exit(app_config: &AppConfig, logger: &Logger) -> PlantCatalog {
    let raw_path = app_config.catalog.plant_table_path.trim();
    if raw_path.is_empty() {
        logger.warn(
            Some("main::catalog"),
            "No plant table configured; grow times and names fall back to ids",
        );
        return PlantCatalog::empty();
    }

    match PlantCatalog::load(Path::new(raw_path)) {
        Ok(catalog) => {
            logger.log(
                LogLevel::Info,
                Some("main::catalog"),
                "Plant table loaded",
                Some(json!({ "path": raw_path, "plants": catalog.len() })),
            );
            catalog
        }
        Err(error) => {
            eprintln!("catalog error: {error}");
            process::exit(2);
        }
    }
}

/// Logs in on the freshly opened session. Any failure closes the
/// connection and exits with status 1.
fn login_or_exit(
    app_config: &AppConfig,
    session: &Session,
    context: &BotContext,
    transport: TransportHandle,
) -> TransportHandle {
    let outcome = match handshake::login(session, &build_login_request(app_config)) {
        Ok(outcome) => outcome,
        Err(error) => {
            context
                .logger
                .error(Some("main::login"), &format!("Login failed: {error}"));
            session.close();
            transport.join();
            process::exit(1);
        }
    };

    context.player.apply_login(&outcome.player);
    context.clock.sync(outcome.server_time_ms);
    context.status.set_connected(true);
    context.logger.log(
        LogLevel::Info,
        Some("main::login"),
        &format!(
            "Logged in as {} (level {})",
            outcome.player.name, outcome.player.level
        ),
        Some(json!({
            "gid": outcome.player.gid,
            "gold": outcome.player.gold,
            "exp": outcome.player.exp,
            "server_time_ms": outcome.server_time_ms
        })),
    );
    transport
}

fn register_notification_handlers(
    dispatcher: &NotificationDispatcher,
    context: &BotContext,
    session: &Arc<Session>,
    farm: &Arc<FarmOrchestrator>,
    friend: &Arc<FriendOrchestrator>,
    kicked_out: &Arc<AtomicBool>,
) {
    let farm = Arc::clone(farm);
    dispatcher.on(NotifyKind::LandChange, move |notification| {
        let notify: LandsNotify = notification.decode().map_err(|error| error.to_string())?;
        farm.on_land_change(notify.host_gid);
        Ok(())
    });

    let player = Arc::clone(&context.player);
    dispatcher.on(NotifyKind::ItemChange, move |notification| {
        let notify: ItemNotify = notification.decode().map_err(|error| error.to_string())?;
        player.apply_item_changes(&notify.items);
        Ok(())
    });

    let player = Arc::clone(&context.player);
    let logger = Arc::clone(&context.logger);
    dispatcher.on(NotifyKind::PlayerBasicChange, move |notification| {
        let notify: BasicNotify = notification.decode().map_err(|error| error.to_string())?;
        let Some(basic) = notify.basic else {
            return Ok(());
        };
        if let Some(level_up) = player.apply_basic(&basic) {
            logger.info(
                Some("player"),
                &format!("Level up: {} -> {}", level_up.from, level_up.to),
            );
        }
        Ok(())
    });

    let logger = Arc::clone(&context.logger);
    let session_for_kickout = Arc::clone(session);
    let kicked_out = Arc::clone(kicked_out);
    dispatcher.on(NotifyKind::ForcedLogout, move |notification| {
        let notify: KickoutNotify = notification.decode().map_err(|error| error.to_string())?;
        logger.warn(
            Some("main::wire"),
            &format!("Kicked out by the server: {}", notify.reason_message),
        );
        kicked_out.store(true, Ordering::SeqCst);
        session_for_kickout.close();
        Ok(())
    });

    let friend = Arc::clone(friend);
    dispatcher.on_async(NotifyKind::FriendApplicationReceived, move |notification| {
        let notify: FriendApplicationReceivedNotify =
            notification.decode().map_err(|error| error.to_string())?;
        friend.on_applications_received(&notify.applications);
        Ok(())
    });

    let logger = Arc::clone(&context.logger);
    dispatcher.on(NotifyKind::FriendAdded, move |notification| {
        let notify: FriendAddedNotify =
            notification.decode().map_err(|error| error.to_string())?;
        if !notify.friends.is_empty() {
            let names: Vec<String> = notify.friends.iter().map(friend_display_name).collect();
            logger.info(Some("friend"), &format!("New friends: {}", names.join(", ")));
        }
        Ok(())
    });

    let logger = Arc::clone(&context.logger);
    dispatcher.on(NotifyKind::ShopUnlock, move |notification| {
        let notify: GoodsUnlockNotify =
            notification.decode().map_err(|error| error.to_string())?;
        let ids: Vec<i64> = notify.goods_list.iter().map(|goods| goods.id).collect();
        logger.log(
            LogLevel::Info,
            Some("shop"),
            &format!("{} shop goods unlocked", ids.len()),
            Some(json!({ "goods_ids": ids })),
        );
        Ok(())
    });

    let logger = Arc::clone(&context.logger);
    dispatcher.on(NotifyKind::TaskUpdate, move |notification| {
        let notify: TaskInfoNotify = notification.decode().map_err(|error| error.to_string())?;
        let tasks = notify.task_info.map(|info| info.tasks).unwrap_or_default();
        logger.debug(Some("task"), &format!("{} tasks updated", tasks.len()));
        Ok(())
    });
}

fn spawn_loops(
    app_config: &AppConfig,
    context: &BotContext,
    farm: &Arc<FarmOrchestrator>,
    friend: &Arc<FriendOrchestrator>,
    recent_lines: &Arc<RecentLinesSink>,
    stop: &StopToken,
) -> Result<Vec<PollingLoop>, scheduler::SchedulerError> {
    let logger = &context.logger;
    let mut loops = Vec::new();

    let settings = context.settings.clone();
    let cycle_farm = Arc::clone(farm);
    loops.push(PollingLoop::spawn(
        "farm",
        Duration::from_millis(app_config.farm.startup_delay_ms),
        move || Duration::from_millis(settings.current().farm_check_interval_ms),
        stop.clone(),
        Arc::clone(logger),
        move || {
            cycle_farm.run_cycle();
        },
    )?);

    let settings = context.settings.clone();
    let patrol = Arc::clone(friend);
    let mut applications_checked = false;
    loops.push(PollingLoop::spawn(
        "friend",
        Duration::from_millis(app_config.friend.startup_delay_ms),
        move || Duration::from_millis(settings.current().friend_check_interval_ms),
        stop.clone(),
        Arc::clone(logger),
        move || {
            if !applications_checked {
                applications_checked = true;
                patrol.accept_pending_applications();
            }
            patrol.run_cycle();
        },
    )?);

    let warehouse = Warehouse::new(context.clone());
    let sell_interval = Duration::from_millis(app_config.warehouse.interval_ms);
    loops.push(PollingLoop::spawn(
        "warehouse",
        Duration::from_millis(app_config.warehouse.startup_delay_ms),
        move || sell_interval,
        stop.clone(),
        Arc::clone(logger),
        move || {
            warehouse.sell_fruits();
        },
    )?);

    let snapshot_path = app_config.status.snapshot_path.trim();
    if !snapshot_path.is_empty() {
        let sink = JsonFileSink::new(PathBuf::from(snapshot_path));
        let publish_interval = Duration::from_millis(app_config.status.publish_interval_ms);
        let context = context.clone();
        let recent_lines = Arc::clone(recent_lines);
        loops.push(PollingLoop::spawn(
            "status",
            Duration::ZERO,
            move || publish_interval,
            stop.clone(),
            Arc::clone(logger),
            move || {
                let snapshot = context.status.build_snapshot(
                    &context.player,
                    &context.quotas,
                    &context.settings,
                    Some(recent_lines.as_ref()),
                );
                if let Err(error) = sink.publish(&snapshot) {
                    context.logger.warn(Some("status"), &format!("{error}"));
                }
            },
        )?);
    }

    let settings_path = app_config.status.settings_path.trim();
    if !settings_path.is_empty() {
        let mut watcher =
            SettingsWatcher::new(PathBuf::from(settings_path), context.settings.clone());
        let watch_logger = Arc::clone(logger);
        loops.push(PollingLoop::spawn(
            "settings",
            Duration::ZERO,
            || SETTINGS_POLL_INTERVAL,
            stop.clone(),
            Arc::clone(logger),
            move || match watcher.poll() {
                Ok(Some(changed)) if !changed.is_empty() => watch_logger.info(
                    Some("settings"),
                    &format!("Settings updated: {}", changed.join(", ")),
                ),
                Ok(_) => {}
                Err(error) => watch_logger.warn(
                    Some("settings"),
                    &format!("{} ignored: {error}", watcher.path().display()),
                ),
            },
        )?);
    }

    Ok(loops)
}
