//! Daily per-operation quotas.
//!
//! Hard caps come straight from the server. Exp exhaustion is never reported
//! directly (`day_ex_times_lt` is always zero in practice), so it is inferred
//! from a before/after sample of `day_exp_times` around a help action.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::wire::proto::OperationLimit;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Harvest,
    Remove,
    PutWeed,
    PutInsect,
    Weed,
    Insecticide,
    Water,
    Steal,
}

impl OperationKind {
    pub const ALL: [Self; 8] = [
        Self::Harvest,
        Self::Remove,
        Self::PutWeed,
        Self::PutInsect,
        Self::Weed,
        Self::Insecticide,
        Self::Water,
        Self::Steal,
    ];

    pub fn id(self) -> i64 {
        match self {
            Self::Harvest => 10001,
            Self::Remove => 10002,
            Self::PutWeed => 10003,
            Self::PutInsect => 10004,
            Self::Weed => 10005,
            Self::Insecticide => 10006,
            Self::Water => 10007,
            Self::Steal => 10008,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::Remove => "remove",
            Self::PutWeed => "put_weed",
            Self::PutInsect => "put_insect",
            Self::Weed => "weed",
            Self::Insecticide => "insecticide",
            Self::Water => "water",
            Self::Steal => "steal",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OperationQuota {
    pub day_count: i64,
    /// Zero means uncapped.
    pub day_hard_limit: i64,
    pub day_exp_count: i64,
    pub day_exp_limit: i64,
    pub exp_exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExhausted {
    pub kind: OperationKind,
}

impl fmt::Display for QuotaExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} can no longer gain exp today", self.kind)
    }
}

impl std::error::Error for QuotaExhausted {}

#[derive(Debug, Default)]
pub struct QuotaTracker {
    quotas: HashMap<OperationKind, OperationQuota>,
    exp_samples: HashMap<OperationKind, i64>,
    last_reset_date: Option<NaiveDate>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every count, sample and exhaustion flag when `today` differs
    /// from the last observed date. Returns true on an actual rollover.
    pub fn check_daily_reset(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date == Some(today) {
            return false;
        }
        let rolled_over = self.last_reset_date.is_some();
        self.quotas.clear();
        self.exp_samples.clear();
        self.last_reset_date = Some(today);
        rolled_over
    }

    /// Folds server-reported limits in and resolves pending exp samples.
    /// Returns the kinds that became exp-exhausted by this update.
    pub fn apply_limits(&mut self, limits: &[OperationLimit], today: NaiveDate) -> Vec<OperationKind> {
        if limits.is_empty() {
            return Vec::new();
        }
        self.check_daily_reset(today);

        let mut newly_exhausted = Vec::new();
        for limit in limits {
            let Some(kind) = OperationKind::from_id(limit.id) else {
                continue;
            };
            let quota = self.quotas.entry(kind).or_default();
            quota.day_count = limit.day_times;
            quota.day_hard_limit = limit.day_times_lt;
            quota.day_exp_count = limit.day_exp_times;
            quota.day_exp_limit = limit.day_ex_times_lt;

            if let Some(before) = self.exp_samples.remove(&kind) {
                if limit.day_exp_times <= before && !quota.exp_exhausted {
                    quota.exp_exhausted = true;
                    newly_exhausted.push(kind);
                }
            }
        }
        newly_exhausted
    }

    pub fn can_gain_exp(&self, kind: OperationKind) -> bool {
        let Some(quota) = self.quotas.get(&kind) else {
            return true;
        };
        if quota.exp_exhausted {
            return false;
        }
        if quota.day_exp_limit > 0 {
            return quota.day_exp_count < quota.day_exp_limit;
        }
        true
    }

    pub fn ensure_can_gain_exp(&self, kind: OperationKind) -> Result<(), QuotaExhausted> {
        if self.can_gain_exp(kind) {
            Ok(())
        } else {
            Err(QuotaExhausted { kind })
        }
    }

    pub fn can_operate(&self, kind: OperationKind) -> bool {
        match self.quotas.get(&kind) {
            Some(quota) if quota.day_hard_limit > 0 => quota.day_count < quota.day_hard_limit,
            _ => true,
        }
    }

    /// Records the current exp count right before an action. No-op until the
    /// server has reported a limit for `kind`.
    pub fn mark_exp_sample(&mut self, kind: OperationKind) {
        if let Some(quota) = self.quotas.get(&kind) {
            self.exp_samples.insert(kind, quota.day_exp_count);
        }
    }

    /// `None` when uncapped.
    pub fn remaining(&self, kind: OperationKind) -> Option<u32> {
        let quota = self.quotas.get(&kind)?;
        if quota.day_hard_limit <= 0 {
            return None;
        }
        let left = (quota.day_hard_limit - quota.day_count).max(0);
        Some(u32::try_from(left).unwrap_or(u32::MAX))
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<OperationKind, OperationQuota> {
        self.quotas
            .iter()
            .map(|(kind, quota)| (*kind, quota.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::wire::proto::OperationLimit;

    use super::{OperationKind, QuotaExhausted, QuotaTracker};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
    }

    fn limit(kind: OperationKind, day_times: i64, day_times_lt: i64, exp: i64) -> OperationLimit {
        OperationLimit {
            id: kind.id(),
            day_times,
            day_times_lt,
            day_exp_times: exp,
            day_ex_times_lt: 0,
        }
    }

    #[test]
    fn operation_ids_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(OperationKind::from_id(10009), None);
        assert_eq!(OperationKind::Steal.id(), 10008);
    }

    #[test]
    fn unknown_kinds_are_permissive() {
        let tracker = QuotaTracker::new();
        assert!(tracker.can_gain_exp(OperationKind::Weed));
        assert!(tracker.can_operate(OperationKind::PutWeed));
        assert_eq!(tracker.remaining(OperationKind::PutWeed), None);
    }

    #[test]
    fn one_flat_sample_marks_exp_exhausted() {
        let mut tracker = QuotaTracker::new();
        tracker.apply_limits(&[limit(OperationKind::Weed, 3, 0, 3)], day(1));

        tracker.mark_exp_sample(OperationKind::Weed);
        let exhausted = tracker.apply_limits(&[limit(OperationKind::Weed, 4, 0, 3)], day(1));

        assert_eq!(exhausted, vec![OperationKind::Weed]);
        assert!(!tracker.can_gain_exp(OperationKind::Weed));
        assert_eq!(
            tracker.ensure_can_gain_exp(OperationKind::Weed),
            Err(QuotaExhausted {
                kind: OperationKind::Weed
            })
        );
    }

    #[test]
    fn growing_sample_keeps_exp_available() {
        let mut tracker = QuotaTracker::new();
        tracker.apply_limits(&[limit(OperationKind::Water, 1, 0, 1)], day(1));

        tracker.mark_exp_sample(OperationKind::Water);
        let exhausted = tracker.apply_limits(&[limit(OperationKind::Water, 2, 0, 2)], day(1));

        assert!(exhausted.is_empty());
        assert!(tracker.can_gain_exp(OperationKind::Water));
    }

    #[test]
    fn update_without_sample_never_exhausts() {
        let mut tracker = QuotaTracker::new();
        tracker.apply_limits(&[limit(OperationKind::Weed, 3, 0, 3)], day(1));
        tracker.apply_limits(&[limit(OperationKind::Weed, 3, 0, 3)], day(1));

        assert!(tracker.can_gain_exp(OperationKind::Weed));
    }

    #[test]
    fn sample_before_any_limit_is_ignored() {
        let mut tracker = QuotaTracker::new();
        tracker.mark_exp_sample(OperationKind::Insecticide);
        tracker.apply_limits(&[limit(OperationKind::Insecticide, 1, 0, 0)], day(1));

        assert!(tracker.can_gain_exp(OperationKind::Insecticide));
    }

    #[test]
    fn hard_cap_controls_operate_and_remaining() {
        let mut tracker = QuotaTracker::new();
        tracker.apply_limits(
            &[
                limit(OperationKind::PutWeed, 7, 10, 0),
                limit(OperationKind::PutInsect, 10, 10, 0),
            ],
            day(1),
        );

        assert!(tracker.can_operate(OperationKind::PutWeed));
        assert_eq!(tracker.remaining(OperationKind::PutWeed), Some(3));
        assert!(!tracker.can_operate(OperationKind::PutInsect));
        assert_eq!(tracker.remaining(OperationKind::PutInsect), Some(0));
    }

    #[test]
    fn date_rollover_clears_everything() {
        let mut tracker = QuotaTracker::new();
        assert!(!tracker.check_daily_reset(day(1)));
        tracker.apply_limits(&[limit(OperationKind::Weed, 3, 0, 3)], day(1));
        tracker.mark_exp_sample(OperationKind::Weed);
        tracker.apply_limits(&[limit(OperationKind::Weed, 4, 0, 3)], day(1));
        assert!(!tracker.can_gain_exp(OperationKind::Weed));

        assert!(tracker.check_daily_reset(day(2)));

        assert!(tracker.is_empty());
        assert!(tracker.snapshot().is_empty());
        assert!(tracker.can_gain_exp(OperationKind::Weed));
    }

    #[test]
    fn stale_sample_does_not_survive_rollover() {
        let mut tracker = QuotaTracker::new();
        tracker.apply_limits(&[limit(OperationKind::Steal, 5, 0, 5)], day(1));
        tracker.mark_exp_sample(OperationKind::Steal);

        let exhausted = tracker.apply_limits(&[limit(OperationKind::Steal, 0, 0, 0)], day(2));

        assert!(exhausted.is_empty());
        assert!(tracker.can_gain_exp(OperationKind::Steal));
    }

    #[test]
    fn empty_limit_list_is_a_no_op() {
        let mut tracker = QuotaTracker::new();
        tracker.check_daily_reset(day(1));
        tracker.apply_limits(&[limit(OperationKind::Harvest, 1, 0, 0)], day(1));

        tracker.apply_limits(&[], day(2));

        assert!(!tracker.is_empty());
    }
}
