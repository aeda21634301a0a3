//! Own-farm automation: one guarded cycle of care, harvest, replant and land
//! upgrades, plus the debounced re-check triggered by land pushes.

pub mod analysis;
pub mod seeds;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::config::AppConfig;
use crate::context::BotContext;
use crate::events::Debouncer;
use crate::game::{LandAction, NORMAL_FERTILIZER_ID, SEED_SHOP_ID};
use crate::logging::LogLevel;
use crate::state::player::GOLD_ITEM_IDS;
use crate::state::{BagEntry, RuntimeSettings};
use crate::utils::timing::{format_grow_time, measure_execution};
use crate::wire::session::CallError;

use analysis::{analyze_lands, LandAnalysis};
use seeds::{affordable_count, available_offers, choose_seed, SeedChoice, SeedSource};

pub const LAND_PUSH_WINDOW: Duration = Duration::from_millis(500);
pub const LAND_PUSH_SETTLE: Duration = Duration::from_millis(100);

const CONTEXT: &str = "farm";

/// What a finished cycle saw and did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub status_line: String,
    pub actions: Vec<String>,
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FarmOrchestrator {
    context: BotContext,
    action_delay: Duration,
    running: AtomicBool,
    land_pushes: Mutex<Debouncer>,
}

impl FarmOrchestrator {
    pub fn new(context: BotContext, action_delay: Duration) -> Self {
        Self {
            context,
            action_delay,
            running: AtomicBool::new(false),
            land_pushes: Mutex::new(Debouncer::new(LAND_PUSH_WINDOW)),
        }
    }

    pub fn from_app_config(context: BotContext, config: &AppConfig) -> Self {
        Self::new(context, Duration::from_millis(config.farm.action_delay_ms))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs one cycle unless another one is in flight or the player is not
    /// logged in yet. Never fails; every phase logs its own errors.
    pub fn run_cycle(&self) -> Option<CycleReport> {
        if self.context.player.gid() == 0 {
            return None;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let _guard = CycleGuard(&self.running);

        let logger = Arc::clone(&self.context.logger);
        Some(measure_execution("farm cycle", Some(CONTEXT), &logger, || {
            self.cycle()
        }))
    }

    /// Schedules a re-check for a land push about our own farm. Returns true
    /// when a re-check was actually scheduled.
    pub fn on_land_change(self: &Arc<Self>, host_gid: i64) -> bool {
        if host_gid != 0 && host_gid != self.context.player.gid() {
            return false;
        }
        if self.is_running() {
            return false;
        }

        let this = Arc::clone(self);
        let mut debouncer = match self.land_pushes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let scheduled = debouncer.schedule(Instant::now(), LAND_PUSH_SETTLE, move || {
            if !this.is_running() {
                this.run_cycle();
            }
        });
        if scheduled {
            self.context
                .logger
                .verbose(Some(CONTEXT), "Land push received; re-checking farm");
        }
        scheduled
    }

    fn cycle(&self) -> CycleReport {
        let settings = self.context.settings.current();
        let game = &self.context.game;
        let logger = &self.context.logger;
        let mut report = CycleReport::default();

        self.refresh_backpack();

        let reply = match game.all_lands() {
            Ok(reply) => reply,
            Err(error) => {
                logger.warn(Some(CONTEXT), &format!("Failed to fetch lands: {error}"));
                return report;
            }
        };
        self.context.apply_limits(&reply.operation_limits);
        if reply.lands.is_empty() {
            logger.info(Some(CONTEXT), "No land data returned");
            return report;
        }

        let analysis = analyze_lands(&reply.lands, self.context.clock.now_sec());
        self.context.status.set_lands(analysis.summary());
        report.status_line = analysis.status_line();
        let gid = self.context.player.gid();

        report.actions.extend(self.run_remedial_batches(&settings, &analysis, gid));

        let mut dead = analysis.dead.clone();
        let mut empty = analysis.empty.clone();
        let harvested = self.harvest(&settings, &analysis, gid, &mut report);
        if !harvested.is_empty() {
            self.reclassify_harvested(&harvested, &mut empty, &mut dead);
        }

        if (settings.auto_remove && !dead.is_empty()) || (settings.auto_plant && !empty.is_empty()) {
            self.replant(&settings, dead, empty, analysis.unlocked, &mut report);
        }

        if settings.auto_upgrade && !analysis.upgradable.is_empty() {
            let done = self.sequential(&analysis.upgradable, "upgrade", |land_id| {
                game.upgrade_land(land_id)
            });
            report
                .actions
                .extend(done.into_iter().map(|land_id| format!("upgraded land {land_id}")));
        }
        if settings.auto_unlock && !analysis.unlockable.is_empty() {
            let done = self.sequential(&analysis.unlockable, "unlock", |land_id| {
                game.unlock_land(land_id)
            });
            report
                .actions
                .extend(done.into_iter().map(|land_id| format!("unlocked land {land_id}")));
        }

        if analysis.has_work() {
            let suffix = if report.actions.is_empty() {
                String::new()
            } else {
                format!(" -> {}", report.actions.join("/"))
            };
            logger.info(Some(CONTEXT), &format!("[{}]{suffix}", report.status_line));
        }
        report
    }

    fn refresh_backpack(&self) {
        match self.context.game.bag() {
            Ok(items) => {
                let entries = items
                    .iter()
                    .filter(|item| item.count > 0)
                    .map(|item| BagEntry {
                        id: item.id,
                        name: self.context.catalog.item_name(item.id),
                        count: item.count,
                    })
                    .collect();
                self.context.status.set_backpack(entries);
            }
            Err(error) => self
                .context
                .logger
                .verbose(Some(CONTEXT), &format!("Backpack refresh failed: {error}")),
        }
    }

    /// Weed, pest and water batches run side by side; each failure stays
    /// inside its own batch.
    fn run_remedial_batches(
        &self,
        settings: &RuntimeSettings,
        analysis: &LandAnalysis,
        gid: i64,
    ) -> Vec<String> {
        let batches = [
            (settings.auto_weed, LandAction::WeedOut, &analysis.need_weed, "weeded"),
            (settings.auto_pest, LandAction::Insecticide, &analysis.need_pest, "pest cleared"),
            (settings.auto_water, LandAction::Water, &analysis.need_water, "watered"),
        ];

        thread::scope(|scope| {
            let handles: Vec<_> = batches
                .iter()
                .filter(|(enabled, _, land_ids, _)| *enabled && !land_ids.is_empty())
                .map(|(_, action, land_ids, label)| {
                    scope.spawn(move || {
                        self.remedial(*action, land_ids, gid)
                            .then(|| format!("{label} {}", land_ids.len()))
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok().flatten())
                .collect()
        })
    }

    fn remedial(&self, action: LandAction, land_ids: &[i64], gid: i64) -> bool {
        match self.context.game.land_action(action, land_ids, gid) {
            Ok(reply) => {
                self.context.apply_limits(&reply.operation_limits);
                true
            }
            Err(error) => {
                self.context.logger.warn(
                    Some(CONTEXT),
                    &format!("{} failed: {error}", action.method()),
                );
                false
            }
        }
    }

    fn harvest(
        &self,
        settings: &RuntimeSettings,
        analysis: &LandAnalysis,
        gid: i64,
        report: &mut CycleReport,
    ) -> Vec<i64> {
        let land_ids = analysis.mature_ids();
        if !settings.auto_harvest || land_ids.is_empty() {
            return Vec::new();
        }

        match self.context.game.harvest(&land_ids, gid) {
            Ok(reply) => {
                self.context.apply_limits(&reply.operation_limits);
                let crops: Vec<String> = analysis
                    .mature
                    .iter()
                    .map(|land| self.context.catalog.plant_name(land.plant_id))
                    .collect();
                self.context.logger.log(
                    LogLevel::Info,
                    Some(CONTEXT),
                    &format!("Harvested {} lands", land_ids.len()),
                    Some(json!({ "land_ids": land_ids, "crops": crops })),
                );
                report.actions.push(format!("harvested {}", land_ids.len()));
                land_ids
            }
            Err(error) => {
                self.context
                    .logger
                    .warn(Some(CONTEXT), &format!("Harvest failed: {error}"));
                Vec::new()
            }
        }
    }

    /// Second-season crops keep growing after a harvest; only lands that are
    /// now empty or dead join the replant sets.
    fn reclassify_harvested(&self, harvested: &[i64], empty: &mut Vec<i64>, dead: &mut Vec<i64>) {
        let reply = match self.context.game.lands(harvested) {
            Ok(reply) => reply,
            Err(error) => {
                self.context.logger.warn(
                    Some(CONTEXT),
                    &format!("Refetch after harvest failed; harvested lands wait for the next cycle: {error}"),
                );
                return;
            }
        };

        let refreshed = analyze_lands(&reply.lands, self.context.clock.now_sec());
        for land_id in harvested {
            if refreshed.empty.contains(land_id) {
                empty.push(*land_id);
            } else if refreshed.dead.contains(land_id) {
                dead.push(*land_id);
            }
        }
    }

    fn replant(
        &self,
        settings: &RuntimeSettings,
        dead: Vec<i64>,
        empty: Vec<i64>,
        unlocked: usize,
        report: &mut CycleReport,
    ) {
        let game = &self.context.game;
        let logger = &self.context.logger;
        let mut to_plant = if settings.auto_plant { empty } else { Vec::new() };

        if settings.auto_remove && !dead.is_empty() {
            match game.remove_plants(&dead) {
                Ok(()) => {
                    logger.info(
                        Some(CONTEXT),
                        &format!("Removed {} dead plants {dead:?}", dead.len()),
                    );
                    report.actions.push(format!("removed {}", dead.len()));
                    if settings.auto_plant {
                        to_plant.extend(dead);
                    }
                }
                Err(error) => {
                    logger.warn(Some(CONTEXT), &format!("Removing dead plants failed: {error}"));
                    if settings.auto_plant {
                        to_plant.extend(dead);
                    }
                }
            }
        }
        if !settings.auto_plant || to_plant.is_empty() {
            return;
        }

        let Some(choice) = self.pick_seed(unlocked, settings.force_lowest_level_crop) else {
            return;
        };
        let offer = choice.offer;
        let gold = self.context.player.gold();
        let count = affordable_count(gold, offer.price, to_plant.len());
        if count == 0 {
            logger.warn(
                Some(CONTEXT),
                &format!("Not enough gold for seed {}: price {}, have {gold}", offer.seed_id, offer.price),
            );
            return;
        }
        if (count as usize) < to_plant.len() {
            logger.warn(
                Some(CONTEXT),
                &format!("Gold only covers {count} of {} lands", to_plant.len()),
            );
            to_plant.truncate(count as usize);
        }

        let bought = match game.buy_goods(offer.goods_id, count, offer.price) {
            Ok(reply) => reply,
            Err(error) => {
                logger.warn(Some(CONTEXT), &format!("Buying seeds failed: {error}"));
                return;
            }
        };
        let seed_id = bought
            .get_items
            .first()
            .map(|item| item.id)
            .filter(|id| *id > 0)
            .unwrap_or(offer.seed_id);
        let spent: i64 = bought
            .cost_items
            .iter()
            .filter(|item| GOLD_ITEM_IDS.contains(&item.id))
            .map(|item| item.count)
            .sum();
        self.context.player.spend_gold(spent);
        logger.info(
            Some(CONTEXT),
            &format!(
                "Bought {count} x {} for {spent} gold",
                self.context.catalog.seed_name(seed_id)
            ),
        );

        let planted = self.plant_each(seed_id, &to_plant);
        if !planted.is_empty() {
            report.actions.push(format!("planted {}", planted.len()));
        }
        if settings.auto_fertilize && !planted.is_empty() {
            let fertilized = self.fertilize_each(&planted);
            if fertilized > 0 {
                report.actions.push(format!("fertilized {fertilized}"));
            }
        }
    }

    fn pick_seed(&self, unlocked: usize, force_lowest: bool) -> Option<SeedChoice> {
        let logger = &self.context.logger;
        let shop = match self.context.game.shop_info(SEED_SHOP_ID) {
            Ok(shop) => shop,
            Err(error) => {
                logger.warn(Some(CONTEXT), &format!("Seed shop query failed: {error}"));
                return None;
            }
        };
        if shop.goods_list.is_empty() {
            logger.warn(Some(CONTEXT), "Seed shop has no goods");
            return None;
        }

        let level = self.context.player.level();
        let offers = available_offers(&shop.goods_list, level);
        if offers.is_empty() {
            logger.warn(Some(CONTEXT), "No seed is available to buy");
            return None;
        }

        let choice = choose_seed(
            offers,
            level,
            unlocked,
            force_lowest,
            self.context.recommender.as_ref(),
        )?;
        if let SeedSource::Fallback(Some(error)) = &choice.source {
            logger.warn(Some(CONTEXT), &format!("Seed ranking failed, using fallback: {error}"));
        }

        let catalog = &self.context.catalog;
        let grow_time = catalog
            .plant_by_seed(choice.offer.seed_id)
            .map_or(0, |plant| plant.grow_time_sec());
        let grow_suffix = if grow_time > 0 {
            format!(", grows in {}", format_grow_time(grow_time))
        } else {
            String::new()
        };
        logger.info(
            Some(CONTEXT),
            &format!(
                "Best seed: {} ({}) at {} gold{grow_suffix}",
                catalog.seed_name(choice.offer.seed_id),
                choice.offer.seed_id,
                choice.offer.price
            ),
        );
        Some(choice)
    }

    fn plant_each(&self, seed_id: i64, land_ids: &[i64]) -> Vec<i64> {
        let mut planted = Vec::with_capacity(land_ids.len());
        for (idx, land_id) in land_ids.iter().enumerate() {
            if idx > 0 {
                thread::sleep(self.action_delay);
            }
            match self.context.game.plant(seed_id, *land_id) {
                Ok(()) => planted.push(*land_id),
                Err(error) => self
                    .context
                    .logger
                    .warn(Some(CONTEXT), &format!("Planting land {land_id} failed: {error}")),
            }
        }
        planted
    }

    fn fertilize_each(&self, land_ids: &[i64]) -> usize {
        let mut fertilized = 0;
        for (idx, land_id) in land_ids.iter().enumerate() {
            if idx > 0 {
                thread::sleep(self.action_delay);
            }
            if let Err(error) = self.context.game.fertilize(&[*land_id], NORMAL_FERTILIZER_ID) {
                self.context.logger.verbose(
                    Some(CONTEXT),
                    &format!("Fertilizing stopped at land {land_id}: {error}"),
                );
                break;
            }
            fertilized += 1;
        }
        fertilized
    }

    /// One land at a time; the first failure ends the batch.
    fn sequential<F>(&self, land_ids: &[i64], label: &str, mut op: F) -> Vec<i64>
    where
        F: FnMut(i64) -> Result<(), CallError>,
    {
        let mut done = Vec::new();
        for (idx, land_id) in land_ids.iter().enumerate() {
            if idx > 0 {
                thread::sleep(self.action_delay);
            }
            if let Err(error) = op(*land_id) {
                self.context
                    .logger
                    .warn(Some(CONTEXT), &format!("Land {land_id} {label} failed: {error}"));
                break;
            }
            done.push(*land_id);
        }
        done
    }
}
