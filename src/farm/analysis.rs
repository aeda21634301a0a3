use serde::Serialize;

use crate::clock::to_time_sec;
use crate::state::LandSummary;
use crate::wire::proto::{LandInfo, PlantInfo, PlantPhaseInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PlantPhase {
    Unknown,
    Seed,
    Germination,
    SmallLeaves,
    LargeLeaves,
    Blooming,
    Mature,
    Dead,
}

impl PlantPhase {
    pub fn from_wire(value: i32) -> Self {
        match value {
            1 => Self::Seed,
            2 => Self::Germination,
            3 => Self::SmallLeaves,
            4 => Self::LargeLeaves,
            5 => Self::Blooming,
            6 => Self::Mature,
            7 => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// The last phase whose begin time has passed; the first one when every
/// phase still lies in the future. `None` only for an empty list.
pub fn current_phase(phases: &[PlantPhaseInfo], now_sec: i64) -> Option<&PlantPhaseInfo> {
    phases
        .iter()
        .rev()
        .find(|phase| {
            let begin = to_time_sec(phase.begin_time);
            begin > 0 && begin <= now_sec
        })
        .or_else(|| phases.first())
}

fn deadline_passed(raw: i64, now_sec: i64) -> bool {
    let at = to_time_sec(raw);
    at > 0 && at <= now_sec
}

/// Remedial needs of a growing plant in its current phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlantNeeds {
    pub water: bool,
    pub weed: bool,
    pub pest: bool,
}

pub fn plant_needs(plant: &PlantInfo, phase: &PlantPhaseInfo, now_sec: i64) -> PlantNeeds {
    PlantNeeds {
        water: plant.dry_num > 0 || deadline_passed(phase.dry_time, now_sec),
        weed: !plant.weed_owners.is_empty() || deadline_passed(phase.weeds_time, now_sec),
        pest: !plant.insect_owners.is_empty() || deadline_passed(phase.insect_time, now_sec),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatureLand {
    pub land_id: i64,
    pub plant_id: i64,
}

/// Own-farm classification of one land snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LandAnalysis {
    pub total: usize,
    pub unlocked: usize,
    pub unlockable: Vec<i64>,
    pub empty: Vec<i64>,
    pub dead: Vec<i64>,
    pub mature: Vec<MatureLand>,
    pub growing: Vec<i64>,
    pub need_water: Vec<i64>,
    pub need_weed: Vec<i64>,
    pub need_pest: Vec<i64>,
    pub upgradable: Vec<i64>,
}

impl LandAnalysis {
    pub fn mature_ids(&self) -> Vec<i64> {
        self.mature.iter().map(|land| land.land_id).collect()
    }

    pub fn has_work(&self) -> bool {
        !(self.mature.is_empty()
            && self.need_water.is_empty()
            && self.need_weed.is_empty()
            && self.need_pest.is_empty()
            && self.dead.is_empty()
            && self.empty.is_empty()
            && self.upgradable.is_empty()
            && self.unlockable.is_empty())
    }

    pub fn summary(&self) -> LandSummary {
        LandSummary {
            total: self.total,
            unlocked: self.unlocked,
            growing: self.growing.len(),
            mature: self.mature.len(),
            empty: self.empty.len(),
            dead: self.dead.len(),
            needs_water: self.need_water.len(),
            needs_weed: self.need_weed.len(),
            needs_pest: self.need_pest.len(),
        }
    }

    /// `harvest:2 weed:1 empty:3 growing:5` style status line.
    pub fn status_line(&self) -> String {
        let mut parts = Vec::new();
        for (label, count) in [
            ("harvest", self.mature.len()),
            ("weed", self.need_weed.len()),
            ("pest", self.need_pest.len()),
            ("water", self.need_water.len()),
            ("dead", self.dead.len()),
            ("empty", self.empty.len()),
            ("upgrade", self.upgradable.len()),
            ("unlock", self.unlockable.len()),
        ] {
            if count > 0 {
                parts.push(format!("{label}:{count}"));
            }
        }
        parts.push(format!("growing:{}", self.growing.len()));
        parts.join(" ")
    }
}

fn phases_of(plant: Option<&PlantInfo>) -> Option<&PlantInfo> {
    plant.filter(|plant| !plant.phases.is_empty())
}

pub fn analyze_lands(lands: &[LandInfo], now_sec: i64) -> LandAnalysis {
    let mut analysis = LandAnalysis {
        total: lands.len(),
        ..LandAnalysis::default()
    };

    for land in lands {
        if !land.unlocked {
            if land.could_unlock {
                analysis.unlockable.push(land.id);
            }
            continue;
        }
        analysis.unlocked += 1;

        let Some(plant) = phases_of(land.plant.as_ref()) else {
            analysis.empty.push(land.id);
            continue;
        };
        let Some(phase) = current_phase(&plant.phases, now_sec) else {
            analysis.empty.push(land.id);
            continue;
        };

        match PlantPhase::from_wire(phase.phase) {
            PlantPhase::Dead => analysis.dead.push(land.id),
            PlantPhase::Mature => analysis.mature.push(MatureLand {
                land_id: land.id,
                plant_id: plant.id,
            }),
            _ => {
                let needs = plant_needs(plant, phase, now_sec);
                if needs.water {
                    analysis.need_water.push(land.id);
                }
                if needs.weed {
                    analysis.need_weed.push(land.id);
                }
                if needs.pest {
                    analysis.need_pest.push(land.id);
                }
                analysis.growing.push(land.id);
                if land.could_upgrade {
                    analysis.upgradable.push(land.id);
                }
            }
        }
    }

    analysis
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::wire::proto::{LandInfo, PlantInfo, PlantPhaseInfo};

    pub fn phase(kind: i32, begin_time: i64) -> PlantPhaseInfo {
        PlantPhaseInfo {
            phase: kind,
            begin_time,
            ..PlantPhaseInfo::default()
        }
    }

    /// A plant whose `current` phase began in the past and whose later
    /// phases lie in the future, relative to `now_sec`.
    pub fn plant_in_phase(plant_id: i64, current: i32, now_sec: i64) -> PlantInfo {
        let phases = (1..=7)
            .map(|kind| {
                let offset = i64::from(kind - current) * 600;
                phase(kind, now_sec + offset - 1)
            })
            .collect();
        PlantInfo {
            id: plant_id,
            name: format!("crop{plant_id}"),
            phases,
            ..PlantInfo::default()
        }
    }

    pub fn land(id: i64, plant: Option<PlantInfo>) -> LandInfo {
        LandInfo {
            id,
            unlocked: true,
            could_unlock: false,
            could_upgrade: false,
            plant,
        }
    }

    pub fn locked_land(id: i64, could_unlock: bool) -> LandInfo {
        LandInfo {
            id,
            unlocked: false,
            could_unlock,
            could_upgrade: false,
            plant: None,
        }
    }
}
