//! Friend-farm patrol: visit, help, steal and (optionally) sow nuisance,
//! plus handling of incoming friend applications.

pub mod analysis;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::json;

use crate::config::AppConfig;
use crate::context::BotContext;
use crate::game::LandAction;
use crate::logging::LogLevel;
use crate::quota::OperationKind;
use crate::wire::proto::{FriendApplication, LandsReply};
use crate::wire::session::CallError;

use analysis::{analyze_friend_lands, plan_visits, FriendLandAnalysis, VisitRules, VisitTarget};

const CONTEXT: &str = "friend";

/// Action counts across one patrol.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatrolTotals {
    pub visited: usize,
    pub steal: usize,
    pub weed: usize,
    pub insecticide: usize,
    pub water: usize,
    pub put_insect: usize,
    pub put_weed: usize,
}

impl PatrolTotals {
    fn summary(&self) -> Vec<String> {
        [
            ("stole", self.steal),
            ("weeded", self.weed),
            ("pest cleared", self.insecticide),
            ("watered", self.water),
            ("put insects", self.put_insect),
            ("put weeds", self.put_weed),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| format!("{label} {count}"))
        .collect()
    }
}

struct PatrolGuard<'a>(&'a AtomicBool);

impl Drop for PatrolGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FriendOrchestrator {
    context: BotContext,
    action_delay: Duration,
    visit_delay: Duration,
    running: AtomicBool,
}

impl FriendOrchestrator {
    pub fn new(context: BotContext, action_delay: Duration, visit_delay: Duration) -> Self {
        Self {
            context,
            action_delay,
            visit_delay,
            running: AtomicBool::new(false),
        }
    }

    pub fn from_app_config(context: BotContext, config: &AppConfig) -> Self {
        Self::new(
            context,
            Duration::from_millis(config.friend.action_delay_ms),
            Duration::from_millis(config.friend.visit_delay_ms),
        )
    }

    /// One patrol over the friend list. `None` when skipped because another
    /// patrol is running or the player is not logged in.
    pub fn run_cycle(&self) -> Option<PatrolTotals> {
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
        let _guard = PatrolGuard(&self.running);

        self.context.check_daily_reset();
        Some(self.patrol())
    }

    fn patrol(&self) -> PatrolTotals {
        let mut totals = PatrolTotals::default();
        let settings = self.context.settings.current();
        if !settings.auto_visit {
            return totals;
        }
        let logger = &self.context.logger;

        let friends = match self.context.game.friends() {
            Ok(friends) => friends,
            Err(error) => {
                logger.warn(Some(CONTEXT), &format!("Fetching friends failed: {error}"));
                return totals;
            }
        };
        if friends.is_empty() {
            logger.info(Some(CONTEXT), "No friends to visit");
            return totals;
        }

        let my_gid = self.context.player.gid();
        let rules = VisitRules {
            steal: settings.auto_steal,
            help: settings.auto_help,
            help_only_with_exp: settings.help_only_with_exp,
            nuisance: settings.enable_nuisance,
        };
        let plan = plan_visits(&friends, my_gid, &self.context.quotas(), rules);
        if plan.is_empty() {
            return totals;
        }

        for target in &plan {
            self.visit(target, my_gid, rules, &mut totals);
            totals.visited += 1;
            thread::sleep(self.visit_delay);
        }

        let summary = totals.summary();
        if !summary.is_empty() {
            logger.log(
                LogLevel::Info,
                Some(CONTEXT),
                &format!("Patrolled {} friends -> {}", plan.len(), summary.join("/")),
                Some(json!({ "quotas": self.context.quotas().snapshot() })),
            );
        }
        totals
    }

    fn visit(&self, target: &VisitTarget, my_gid: i64, rules: VisitRules, totals: &mut PatrolTotals) {
        let game = &self.context.game;
        let logger = &self.context.logger;

        let reply = match game.visit_enter(target.gid) {
            Ok(reply) => reply,
            Err(error) => {
                logger.warn(
                    Some(CONTEXT),
                    &format!("Entering {}'s farm failed: {error}", target.name),
                );
                return;
            }
        };

        if !reply.lands.is_empty() {
            let analysis = analyze_friend_lands(
                &reply.lands,
                my_gid,
                self.context.clock.now_sec(),
                &self.context.catalog,
            );
            let actions = self.work_lands(target, &analysis, rules, totals);
            if !actions.is_empty() {
                logger.info(Some(CONTEXT), &format!("{}: {}", target.name, actions.join("/")));
            }
        }

        if let Err(error) = game.visit_leave(target.gid) {
            logger.verbose(
                Some(CONTEXT),
                &format!("Leaving {}'s farm failed: {error}", target.name),
            );
        }
    }

    fn work_lands(
        &self,
        target: &VisitTarget,
        analysis: &FriendLandAnalysis,
        rules: VisitRules,
        totals: &mut PatrolTotals,
    ) -> Vec<String> {
        let host = target.gid;
        let mut actions = Vec::new();

        if rules.help {
            let help_ops = [
                (OperationKind::Weed, LandAction::WeedOut, &analysis.need_weed, "weed"),
                (
                    OperationKind::Insecticide,
                    LandAction::Insecticide,
                    &analysis.need_pest,
                    "pest",
                ),
                (OperationKind::Water, LandAction::Water, &analysis.need_water, "water"),
            ];
            for (kind, action, land_ids, label) in help_ops {
                if land_ids.is_empty() {
                    continue;
                }
                {
                    let mut quotas = self.context.quotas();
                    if rules.help_only_with_exp && !quotas.can_gain_exp(kind) {
                        continue;
                    }
                    quotas.mark_exp_sample(kind);
                }

                let done = self.per_land(land_ids, |land_id| {
                    self.context.game.land_action(action, &[land_id], host)
                });
                if done > 0 {
                    actions.push(format!("{label} {done}"));
                    match kind {
                        OperationKind::Weed => totals.weed += done,
                        OperationKind::Insecticide => totals.insecticide += done,
                        _ => totals.water += done,
                    }
                }
            }
        }

        if rules.steal && !analysis.stealable.is_empty() {
            let mut stolen_names: Vec<&str> = Vec::new();
            let mut stolen = 0;
            for steal in &analysis.stealable {
                if self.act(|| self.context.game.harvest(&[steal.land_id], host)) {
                    stolen += 1;
                    if !stolen_names.contains(&steal.name.as_str()) {
                        stolen_names.push(&steal.name);
                    }
                }
                thread::sleep(self.action_delay);
            }
            if stolen > 0 {
                actions.push(format!("stole {stolen} ({})", stolen_names.join("/")));
                totals.steal += stolen;
            }
        }

        if rules.nuisance {
            let nuisance_ops = [
                (OperationKind::PutInsect, LandAction::PutInsects, &analysis.can_put_insect, "put insects"),
                (OperationKind::PutWeed, LandAction::PutWeeds, &analysis.can_put_weed, "put weeds"),
            ];
            for (kind, action, land_ids, label) in nuisance_ops {
                let cap = {
                    let quotas = self.context.quotas();
                    if land_ids.is_empty() || !quotas.can_operate(kind) {
                        continue;
                    }
                    quotas
                        .remaining(kind)
                        .map_or(land_ids.len(), |left| land_ids.len().min(left as usize))
                };

                let mut done = 0;
                for land_id in &land_ids[..cap] {
                    if !self.context.quotas().can_operate(kind) {
                        break;
                    }
                    if self.act(|| self.context.game.land_action(action, &[*land_id], host)) {
                        done += 1;
                    }
                    thread::sleep(self.action_delay);
                }
                if done > 0 {
                    actions.push(format!("{label} {done}"));
                    match kind {
                        OperationKind::PutInsect => totals.put_insect += done,
                        _ => totals.put_weed += done,
                    }
                }
            }
        }

        actions
    }

    fn per_land<F>(&self, land_ids: &[i64], op: F) -> usize
    where
        F: Fn(i64) -> Result<LandsReply, CallError>,
    {
        let mut done = 0;
        for land_id in land_ids {
            if self.act(|| op(*land_id)) {
                done += 1;
            }
            thread::sleep(self.action_delay);
        }
        done
    }

    /// Runs one per-land call, feeding its limits to the quota tracker.
    /// Failures are logged at verbose only.
    fn act<F>(&self, call: F) -> bool
    where
        F: FnOnce() -> Result<LandsReply, CallError>,
    {
        match call() {
            Ok(reply) => {
                self.context.apply_limits(&reply.operation_limits);
                true
            }
            Err(error) => {
                self.context
                    .logger
                    .verbose(Some(CONTEXT), &format!("Friend land action failed: {error}"));
                false
            }
        }
    }

    /// Accepts whatever applications are waiting. Run once when the patrol
    /// loop starts.
    pub fn accept_pending_applications(&self) {
        if !self.context.settings.current().auto_accept_applications {
            return;
        }
        match self.context.game.applications() {
            Ok(applications) if applications.is_empty() => {}
            Ok(applications) => {
                self.context.logger.info(
                    Some(CONTEXT),
                    &format!(
                        "Found {} pending friend applications: {}",
                        applications.len(),
                        application_names(&applications)
                    ),
                );
                self.accept(&applications);
            }
            Err(error) => self.context.logger.warn(
                Some(CONTEXT),
                &format!("Fetching friend applications failed: {error}"),
            ),
        }
    }

    pub fn on_applications_received(&self, applications: &[FriendApplication]) {
        if applications.is_empty() {
            return;
        }
        self.context.logger.info(
            Some(CONTEXT),
            &format!(
                "Received {} friend applications: {}",
                applications.len(),
                application_names(applications)
            ),
        );
        if self.context.settings.current().auto_accept_applications {
            self.accept(applications);
        }
    }

    fn accept(&self, applications: &[FriendApplication]) {
        let gids: Vec<i64> = applications.iter().map(|application| application.gid).collect();
        match self.context.game.accept_friends(&gids) {
            Ok(friends) if friends.is_empty() => {}
            Ok(friends) => {
                let names: Vec<String> =
                    friends.iter().map(analysis::friend_display_name).collect();
                self.context.logger.info(
                    Some(CONTEXT),
                    &format!("Accepted {} friends: {}", friends.len(), names.join(", ")),
                );
            }
            Err(error) => self
                .context
                .logger
                .warn(Some(CONTEXT), &format!("Accepting friends failed: {error}")),
        }
    }
}

fn application_names(applications: &[FriendApplication]) -> String {
    applications
        .iter()
        .map(|application| {
            if application.name.is_empty() {
                format!("GID:{}", application.gid)
            } else {
                application.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Days;

    use crate::context::test_support::{context_with, PLAYER_GID};
    use crate::farm::analysis::fixtures::{land, plant_in_phase};
    use crate::game::methods;
    use crate::game::test_support::FakeGame;
    use crate::logging::test_support::MemorySink;
    use crate::quota::OperationKind;
    use crate::state::SettingsPatch;
    use crate::wire::proto::{
        FriendApplication, FriendPlantPreview, GameFriend, LandInfo, OperationLimit,
    };

    use super::FriendOrchestrator;

    const HOST: i64 = 42;

    fn patrol(game: &Arc<FakeGame>) -> (FriendOrchestrator, Arc<MemorySink>) {
        let (context, sink) = context_with(Arc::clone(game));
        (
            FriendOrchestrator::new(context, Duration::ZERO, Duration::ZERO),
            sink,
        )
    }

    fn friend_with_help(gid: i64) -> GameFriend {
        GameFriend {
            gid,
            name: format!("friend{gid}"),
            remark: String::new(),
            level: 20,
            plant: Some(FriendPlantPreview {
                steal_plant_num: 0,
                dry_num: 0,
                weed_num: 1,
                insect_num: 1,
            }),
        }
    }

    fn infested_land(now: i64) -> LandInfo {
        let mut plant = plant_in_phase(1_020_011, 3, now);
        plant.weed_owners = vec![7];
        plant.insect_owners = vec![7];
        land(1, Some(plant))
    }

    fn limit(kind: OperationKind, day_times: i64, hard: i64, exp: i64) -> OperationLimit {
        OperationLimit {
            id: kind.id(),
            day_times,
            day_times_lt: hard,
            day_exp_times: exp,
            day_ex_times_lt: 0,
        }
    }

    #[test]
    fn exhausted_help_kind_is_skipped_but_others_run() {
        let game = Arc::new(FakeGame::default());
        let (friends, _sink) = patrol(&game);
        let now = friends.context.clock.now_sec();
        *game.friends.lock().expect("friends") = vec![friend_with_help(HOST)];
        game.visit_lands
            .lock()
            .expect("lands")
            .insert(HOST, vec![infested_land(now)]);

        friends.context.apply_limits(&[limit(OperationKind::Weed, 3, 0, 4)]);
        friends.context.quotas().mark_exp_sample(OperationKind::Weed);
        friends.context.apply_limits(&[limit(OperationKind::Weed, 4, 0, 4)]);
        assert!(!friends.context.quotas().can_gain_exp(OperationKind::Weed));

        let totals = friends.run_cycle().expect("patrol should run");

        assert!(game.calls_named(methods::WEED_OUT).is_empty());
        let pest = game.calls_named(methods::INSECTICIDE);
        assert_eq!(pest.len(), 1);
        assert_eq!((pest[0].land_ids.clone(), pest[0].host_gid), (vec![1], HOST));
        assert_eq!(totals.insecticide, 1);
        assert_eq!(game.calls_named(methods::VISIT_LEAVE).len(), 1);
    }

    #[test]
    fn help_samples_exp_and_detects_exhaustion() {
        let game = Arc::new(FakeGame::default());
        let (friends, sink) = patrol(&game);
        let now = friends.context.clock.now_sec();
        *game.friends.lock().expect("friends") = vec![friend_with_help(HOST)];
        game.visit_lands
            .lock()
            .expect("lands")
            .insert(HOST, vec![infested_land(now)]);
        friends.context.apply_limits(&[limit(OperationKind::Insecticide, 2, 0, 6)]);
        game.limits_for(
            methods::INSECTICIDE,
            vec![limit(OperationKind::Insecticide, 3, 0, 6)],
        );

        friends.run_cycle().expect("patrol should run");

        assert!(!friends.context.quotas().can_gain_exp(OperationKind::Insecticide));
        assert_eq!(sink.count_containing("insecticide no longer yields exp today"), 1);
    }

    #[test]
    fn failed_enter_skips_the_visit() {
        let game = Arc::new(FakeGame::default());
        let (friends, sink) = patrol(&game);
        *game.friends.lock().expect("friends") = vec![friend_with_help(HOST), friend_with_help(43)];
        game.fail(methods::VISIT_ENTER);

        let totals = friends.run_cycle().expect("patrol should run");

        assert_eq!(game.calls_named(methods::VISIT_ENTER).len(), 2);
        assert!(game.calls_named(methods::VISIT_LEAVE).is_empty());
        assert_eq!(totals.visited, 2);
        assert_eq!(sink.count_containing("Entering friend42's farm failed"), 1);
    }

    #[test]
    fn enter_reply_limits_leave_quotas_untouched() {
        let game = Arc::new(FakeGame::default());
        let (friends, _sink) = patrol(&game);
        *game.friends.lock().expect("friends") = vec![friend_with_help(HOST)];
        game.limits_for(
            methods::VISIT_ENTER,
            vec![limit(OperationKind::Steal, 9, 10, 0)],
        );

        friends.run_cycle().expect("patrol should run");

        assert_eq!(game.calls_named(methods::VISIT_ENTER).len(), 1);
        assert!(friends.context.quotas().is_empty());
    }

    #[test]
    fn nuisance_is_capped_by_remaining_allowance() {
        let game = Arc::new(FakeGame::default());
        let (friends, _sink) = patrol(&game);
        let now = friends.context.clock.now_sec();
        friends
            .context
            .settings
            .apply(&SettingsPatch {
                enable_nuisance: Some(true),
                ..SettingsPatch::default()
            })
            .expect("patch should apply");
        let mut quiet = friend_with_help(HOST);
        quiet.plant = None;
        *game.friends.lock().expect("friends") = vec![quiet];
        let lands = (1..=3)
            .map(|id| land(id, Some(plant_in_phase(1_020_011, 3, now))))
            .collect();
        game.visit_lands.lock().expect("lands").insert(HOST, lands);
        friends.context.apply_limits(&[
            limit(OperationKind::PutInsect, 8, 10, 0),
            limit(OperationKind::PutWeed, 10, 10, 0),
        ]);

        let totals = friends.run_cycle().expect("patrol should run");

        assert_eq!(game.calls_named(methods::PUT_INSECTS).len(), 2);
        assert!(game.calls_named(methods::PUT_WEEDS).is_empty());
        assert_eq!(totals.put_insect, 2);
    }

    #[test]
    fn date_rollover_clears_quotas_before_patrol() {
        let game = Arc::new(FakeGame::default());
        let (friends, sink) = patrol(&game);
        let yesterday = friends
            .context
            .clock
            .local_date()
            .checked_sub_days(Days::new(1))
            .expect("valid date");
        friends
            .context
            .quotas()
            .apply_limits(&[limit(OperationKind::Steal, 9, 10, 0)], yesterday);

        friends.run_cycle().expect("patrol should run");

        assert!(friends.context.quotas().is_empty());
        assert_eq!(sink.count_containing("daily quotas cleared"), 1);
    }

    #[test]
    fn applications_are_accepted_from_list_and_push() {
        let game = Arc::new(FakeGame::default());
        let (friends, sink) = patrol(&game);
        *game.applications.lock().expect("applications") = vec![FriendApplication {
            gid: 77,
            name: "newcomer".to_owned(),
        }];

        friends.accept_pending_applications();
        friends.on_applications_received(&[FriendApplication {
            gid: 78,
            name: String::new(),
        }]);

        let accepted: Vec<Vec<i64>> = game
            .calls_named(methods::ACCEPT_FRIENDS)
            .into_iter()
            .map(|call| call.land_ids)
            .collect();
        assert_eq!(accepted, vec![vec![77], vec![78]]);
        assert_eq!(sink.count_containing("Received 1 friend applications: GID:78"), 1);
    }

    #[test]
    fn own_gid_is_never_visited() {
        let game = Arc::new(FakeGame::default());
        let (friends, _sink) = patrol(&game);
        *game.friends.lock().expect("friends") = vec![friend_with_help(PLAYER_GID)];

        let totals = friends.run_cycle().expect("patrol should run");

        assert_eq!(totals.visited, 0);
        assert!(game.calls_named(methods::VISIT_ENTER).is_empty());
    }
}
