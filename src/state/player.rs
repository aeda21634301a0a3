use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::wire::proto::{ItemChange, PlayerBasic};

pub const GOLD_ITEM_IDS: [i64; 2] = [1, 1001];
pub const EXP_ITEM_IDS: [i64; 2] = [1101, 2];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlayerSnapshot {
    pub gid: i64,
    pub name: String,
    pub level: i64,
    pub gold: i64,
    pub exp: i64,
}

/// Level transition reported by a basic-info push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelUp {
    pub from: i64,
    pub to: i64,
}

/// The logged-in player's record, shared by every loop.
#[derive(Debug, Default)]
pub struct PlayerState {
    inner: RwLock<PlayerSnapshot>,
}

impl PlayerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.read().clone()
    }

    /// Zero until login succeeds.
    pub fn gid(&self) -> i64 {
        self.read().gid
    }

    pub fn level(&self) -> i64 {
        self.read().level
    }

    pub fn gold(&self) -> i64 {
        self.read().gold
    }

    pub fn apply_login(&self, basic: &PlayerBasic) {
        let mut player = self.write();
        player.gid = basic.gid;
        player.name = basic.name.clone();
        player.level = basic.level;
        player.gold = basic.gold;
        player.exp = basic.exp;
    }

    /// Zero fields in a basic push keep the previous value.
    pub fn apply_basic(&self, basic: &PlayerBasic) -> Option<LevelUp> {
        let mut player = self.write();
        let previous_level = player.level;
        if basic.level > 0 {
            player.level = basic.level;
        }
        if basic.gold > 0 {
            player.gold = basic.gold;
        }
        if basic.exp > 0 {
            player.exp = basic.exp;
        }
        if !basic.name.is_empty() {
            player.name = basic.name.clone();
        }

        (player.level != previous_level).then_some(LevelUp {
            from: previous_level,
            to: player.level,
        })
    }

    /// Item pushes carry absolute counts for the gold and exp pseudo-items.
    pub fn apply_item_changes(&self, changes: &[ItemChange]) {
        let mut player = self.write();
        for change in changes {
            let Some(item) = change.item.as_ref() else {
                continue;
            };
            if EXP_ITEM_IDS.contains(&item.id) {
                player.exp = item.count;
            } else if GOLD_ITEM_IDS.contains(&item.id) {
                player.gold = item.count;
            }
        }
    }

    pub fn spend_gold(&self, amount: i64) {
        let mut player = self.write();
        player.gold = (player.gold - amount).max(0);
    }

    pub fn set_gold(&self, gold: i64) {
        self.write().gold = gold;
    }

    fn read(&self) -> RwLockReadGuard<'_, PlayerSnapshot> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, PlayerSnapshot> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::wire::proto::{Item, ItemChange, PlayerBasic};

    use super::{LevelUp, PlayerState};

    fn basic(level: i64, gold: i64, exp: i64) -> PlayerBasic {
        PlayerBasic {
            gid: 0,
            name: String::new(),
            level,
            exp,
            gold,
        }
    }

    fn change(id: i64, count: i64) -> ItemChange {
        ItemChange {
            item: Some(Item { id, count, uid: 0 }),
            delta: 0,
        }
    }

    #[test]
    fn login_populates_snapshot() {
        let state = PlayerState::new();
        assert_eq!(state.gid(), 0);

        state.apply_login(&PlayerBasic {
            gid: 42,
            name: "grower".to_owned(),
            level: 5,
            exp: 80,
            gold: 300,
        });

        let snapshot = state.snapshot();
        assert_eq!(snapshot.gid, 42);
        assert_eq!(snapshot.name, "grower");
        assert_eq!(snapshot.gold, 300);
    }

    #[test]
    fn basic_push_keeps_previous_values_for_zero_fields() {
        let state = PlayerState::new();
        state.apply_login(&PlayerBasic {
            gid: 1,
            name: "a".to_owned(),
            level: 5,
            exp: 80,
            gold: 300,
        });

        assert_eq!(state.apply_basic(&basic(0, 0, 0)), None);
        assert_eq!(state.snapshot().gold, 300);

        assert_eq!(
            state.apply_basic(&basic(6, 0, 10)),
            Some(LevelUp { from: 5, to: 6 })
        );
        let snapshot = state.snapshot();
        assert_eq!(snapshot.level, 6);
        assert_eq!(snapshot.exp, 10);
        assert_eq!(snapshot.gold, 300);
    }

    #[test]
    fn item_push_updates_gold_and_exp_only() {
        let state = PlayerState::new();
        state.apply_item_changes(&[change(1001, 750), change(1101, 99), change(20003, 4)]);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.gold, 750);
        assert_eq!(snapshot.exp, 99);

        state.apply_item_changes(&[change(1, 10), change(2, 100)]);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.gold, 10);
        assert_eq!(snapshot.exp, 100);
    }

    #[test]
    fn spending_never_goes_negative() {
        let state = PlayerState::new();
        state.set_gold(50);
        state.spend_gold(20);
        assert_eq!(state.gold(), 30);
        state.spend_gold(100);
        assert_eq!(state.gold(), 0);
    }
}
