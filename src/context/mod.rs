//! Shared handles passed explicitly to every loop and handler.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;

use crate::catalog::{PlantCatalog, SeedRecommender};
use crate::clock::ServerClock;
use crate::game::GameApi;
use crate::logging::{LogLevel, Logger};
use crate::quota::{OperationKind, QuotaTracker};
use crate::state::{PlayerState, SettingsHandle, StatusBoard};
use crate::wire::proto::OperationLimit;

#[derive(Clone)]
pub struct BotContext {
    pub game: Arc<dyn GameApi>,
    pub clock: Arc<ServerClock>,
    pub player: Arc<PlayerState>,
    pub quotas: Arc<Mutex<QuotaTracker>>,
    pub settings: SettingsHandle,
    pub catalog: Arc<PlantCatalog>,
    pub recommender: Arc<dyn SeedRecommender>,
    pub status: Arc<StatusBoard>,
    pub logger: Arc<Logger>,
}

impl BotContext {
    pub fn quotas(&self) -> MutexGuard<'_, QuotaTracker> {
        match self.quotas.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Feeds server-reported limits into the tracker and reports any kind
    /// that just ran out of exp.
    pub fn apply_limits(&self, limits: &[OperationLimit]) -> Vec<OperationKind> {
        if limits.is_empty() {
            return Vec::new();
        }
        let today = self.clock.local_date();
        let exhausted = self.quotas().apply_limits(limits, today);
        for kind in &exhausted {
            let gained = limits
                .iter()
                .find(|limit| limit.id == kind.id())
                .map_or(0, |limit| limit.day_exp_times);
            self.logger.log(
                LogLevel::Info,
                Some("quota"),
                &format!("{kind} no longer yields exp today"),
                Some(json!({ "kind": kind.as_str(), "exp_times": gained })),
            );
        }
        exhausted
    }

    /// Returns true when the local date rolled over since the last check.
    pub fn check_daily_reset(&self) -> bool {
        let rolled_over = self.quotas().check_daily_reset(self.clock.local_date());
        if rolled_over {
            self.logger
                .info(Some("quota"), "Local date changed; daily quotas cleared");
        }
        rolled_over
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::game::test_support::FakeGame;
    use crate::quota::OperationKind;
    use crate::wire::proto::OperationLimit;

    use super::test_support::context_with;

    #[test]
    fn exhaustion_is_logged_once() {
        let (context, sink) = context_with(Arc::new(FakeGame::default()));
        let limit = |exp| OperationLimit {
            id: OperationKind::Water.id(),
            day_times: 1,
            day_times_lt: 0,
            day_exp_times: exp,
            day_ex_times_lt: 0,
        };

        context.apply_limits(&[limit(4)]);
        context.quotas().mark_exp_sample(OperationKind::Water);
        let exhausted = context.apply_limits(&[limit(4)]);

        assert_eq!(exhausted, vec![OperationKind::Water]);
        assert_eq!(sink.count_containing("water no longer yields exp today"), 1);
        assert!(!context.quotas().can_gain_exp(OperationKind::Water));
    }
}
