use std::collections::HashSet;

use crate::catalog::{PlantCatalog, ALWAYS_STEAL_PLANT_ID};
use crate::farm::analysis::{current_phase, PlantPhase};
use crate::quota::{OperationKind, QuotaTracker};
use crate::wire::proto::{GameFriend, LandInfo};

/// Crops shorter than this are not worth a steal.
pub const STEAL_MIN_GROW_SEC: i64 = 43_200;
/// A land holds at most this many weeds or insects.
const MAX_NUISANCE_OWNERS: usize = 2;

pub const HELP_KINDS: [OperationKind; 3] = [
    OperationKind::Weed,
    OperationKind::Insecticide,
    OperationKind::Water,
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StealTarget {
    pub land_id: i64,
    pub plant_id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FriendLandAnalysis {
    pub stealable: Vec<StealTarget>,
    pub need_water: Vec<i64>,
    pub need_weed: Vec<i64>,
    pub need_pest: Vec<i64>,
    pub can_put_weed: Vec<i64>,
    pub can_put_insect: Vec<i64>,
}

pub fn is_worth_stealing(plant_id: i64, catalog: &PlantCatalog) -> bool {
    plant_id == ALWAYS_STEAL_PLANT_ID || catalog.grow_time_sec(plant_id) >= STEAL_MIN_GROW_SEC
}

/// Classifies a friend's lands. Help needs come from the live counters only;
/// nuisance candidates are growing lands with room left that `my_gid` has
/// not already hit.
pub fn analyze_friend_lands(
    lands: &[LandInfo],
    my_gid: i64,
    now_sec: i64,
    catalog: &PlantCatalog,
) -> FriendLandAnalysis {
    let mut analysis = FriendLandAnalysis::default();

    for land in lands {
        let Some(plant) = land.plant.as_ref().filter(|plant| !plant.phases.is_empty()) else {
            continue;
        };
        let Some(phase) = current_phase(&plant.phases, now_sec) else {
            continue;
        };

        match PlantPhase::from_wire(phase.phase) {
            PlantPhase::Mature => {
                if plant.stealable && is_worth_stealing(plant.id, catalog) {
                    let name = match catalog.plant(plant.id) {
                        Some(record) if !record.name.is_empty() => record.name.clone(),
                        _ if !plant.name.is_empty() => plant.name.clone(),
                        _ => catalog.plant_name(plant.id),
                    };
                    analysis.stealable.push(StealTarget {
                        land_id: land.id,
                        plant_id: plant.id,
                        name,
                    });
                }
            }
            PlantPhase::Dead => {}
            _ => {
                if plant.dry_num > 0 {
                    analysis.need_water.push(land.id);
                }
                if !plant.weed_owners.is_empty() {
                    analysis.need_weed.push(land.id);
                }
                if !plant.insect_owners.is_empty() {
                    analysis.need_pest.push(land.id);
                }
                if plant.weed_owners.len() < MAX_NUISANCE_OWNERS
                    && !plant.weed_owners.contains(&my_gid)
                {
                    analysis.can_put_weed.push(land.id);
                }
                if plant.insect_owners.len() < MAX_NUISANCE_OWNERS
                    && !plant.insect_owners.contains(&my_gid)
                {
                    analysis.can_put_insect.push(land.id);
                }
            }
        }
    }

    analysis
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitTarget {
    pub gid: i64,
    pub name: String,
    pub has_steal: bool,
    pub has_help: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisitRules {
    pub steal: bool,
    pub help: bool,
    pub help_only_with_exp: bool,
    pub nuisance: bool,
}

pub fn friend_display_name(friend: &GameFriend) -> String {
    if !friend.remark.is_empty() {
        friend.remark.clone()
    } else if !friend.name.is_empty() {
        friend.name.clone()
    } else {
        format!("GID:{}", friend.gid)
    }
}

/// Friends worth entering this cycle, best first: anyone with something to
/// steal or to help with, then nuisance-only visits.
pub fn plan_visits(
    friends: &[GameFriend],
    my_gid: i64,
    quotas: &QuotaTracker,
    rules: VisitRules,
) -> Vec<VisitTarget> {
    let help_pays = !rules.help_only_with_exp
        || HELP_KINDS.iter().any(|kind| quotas.can_gain_exp(*kind));
    let nuisance_left = quotas.can_operate(OperationKind::PutInsect)
        || quotas.can_operate(OperationKind::PutWeed);

    let mut seen = HashSet::new();
    let mut priority = Vec::new();
    let mut others = Vec::new();

    for friend in friends {
        if friend.gid == my_gid || seen.contains(&friend.gid) {
            continue;
        }
        let preview = friend.plant.clone().unwrap_or_default();
        let has_steal = rules.steal && preview.steal_plant_num > 0;
        let has_help = rules.help
            && (preview.dry_num > 0 || preview.weed_num > 0 || preview.insect_num > 0);

        let target = VisitTarget {
            gid: friend.gid,
            name: friend_display_name(friend),
            has_steal,
            has_help,
        };
        if has_steal || (has_help && help_pays) {
            priority.push(target);
        } else if rules.nuisance && nuisance_left {
            others.push(target);
        } else {
            continue;
        }
        seen.insert(friend.gid);
    }

    priority.extend(others);
    priority
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::catalog::{PlantCatalog, PlantRecord, ALWAYS_STEAL_PLANT_ID};
    use crate::farm::analysis::fixtures::{land, plant_in_phase};
    use crate::quota::{OperationKind, QuotaTracker};
    use crate::wire::proto::{FriendPlantPreview, GameFriend, OperationLimit};

    use super::{analyze_friend_lands, plan_visits, VisitRules};

    const NOW: i64 = 1_760_000_000;
    const ME: i64 = 500;

    fn catalog() -> PlantCatalog {
        let record = |id: i64, seconds: i64| PlantRecord {
            id,
            name: format!("crop{id}"),
            seed_id: id - 1_000_000,
            exp: 1,
            grow_phases: format!("grow:{seconds};"),
            fruit: None,
        };
        PlantCatalog::from_records(vec![record(1_020_010, 43_200), record(1_020_011, 3_600)])
    }

    fn friend(gid: i64, steal: i64, weeds: i64) -> GameFriend {
        GameFriend {
            gid,
            name: format!("friend{gid}"),
            remark: String::new(),
            level: 12,
            plant: Some(FriendPlantPreview {
                steal_plant_num: steal,
                dry_num: 0,
                weed_num: weeds,
                insect_num: 0,
            }),
        }
    }

    fn rules(nuisance: bool) -> VisitRules {
        VisitRules {
            steal: true,
            help: true,
            help_only_with_exp: true,
            nuisance,
        }
    }

    #[test]
    fn steals_only_long_crops_or_the_special_plant() {
        let stealable = |land_id, plant_id| {
            let mut plant = plant_in_phase(plant_id, 6, NOW);
            plant.stealable = true;
            land(land_id, Some(plant))
        };
        let mut taken = stealable(4, 1_020_010);
        if let Some(plant) = taken.plant.as_mut() {
            plant.stealable = false;
        }
        let lands = vec![
            stealable(1, 1_020_010),
            stealable(2, 1_020_011),
            stealable(3, ALWAYS_STEAL_PLANT_ID),
            taken,
        ];

        let analysis = analyze_friend_lands(&lands, ME, NOW, &catalog());
        let ids: Vec<i64> = analysis.stealable.iter().map(|target| target.land_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(analysis.stealable[0].name, "crop1020010");
    }

    #[test]
    fn nuisance_candidates_respect_owner_lists() {
        let mut full = plant_in_phase(1_020_011, 3, NOW);
        full.weed_owners = vec![1, 2];
        full.insect_owners = vec![ME];
        let mut open = plant_in_phase(1_020_011, 3, NOW);
        open.weed_owners = vec![7];
        open.dry_num = 1;

        let analysis = analyze_friend_lands(
            &[land(1, Some(full)), land(2, Some(open))],
            ME,
            NOW,
            &catalog(),
        );

        assert_eq!(analysis.need_weed, vec![1, 2]);
        assert_eq!(analysis.need_pest, vec![1]);
        assert_eq!(analysis.need_water, vec![2]);
        assert_eq!(analysis.can_put_weed, vec![2]);
        assert_eq!(analysis.can_put_insect, vec![2]);
    }

    #[test]
    fn visit_plan_orders_and_filters_friends() {
        let friends = vec![
            friend(ME, 3, 0),
            friend(1, 0, 2),
            friend(2, 1, 0),
            friend(2, 1, 0),
            friend(3, 0, 0),
        ];

        let plan = plan_visits(&friends, ME, &QuotaTracker::new(), rules(false));
        let gids: Vec<i64> = plan.iter().map(|target| target.gid).collect();
        assert_eq!(gids, vec![1, 2]);

        let plan = plan_visits(&friends, ME, &QuotaTracker::new(), rules(true));
        let gids: Vec<i64> = plan.iter().map(|target| target.gid).collect();
        assert_eq!(gids, vec![1, 2, 3]);
    }

    #[test]
    fn help_only_visits_need_exp_left() {
        let mut quotas = QuotaTracker::new();
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date");
        let capped = |kind: OperationKind| OperationLimit {
            id: kind.id(),
            day_times: 5,
            day_times_lt: 0,
            day_exp_times: 10,
            day_ex_times_lt: 10,
        };
        quotas.apply_limits(
            &[
                capped(OperationKind::Weed),
                capped(OperationKind::Insecticide),
                capped(OperationKind::Water),
            ],
            today,
        );

        let plan = plan_visits(&[friend(1, 0, 2), friend(2, 1, 0)], ME, &quotas, rules(false));
        let gids: Vec<i64> = plan.iter().map(|target| target.gid).collect();
        assert_eq!(gids, vec![2]);
    }
}
