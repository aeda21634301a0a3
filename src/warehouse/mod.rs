//! Periodic sale of harvested fruit.

use crate::context::BotContext;
use crate::wire::proto::{Item, SellReply};

const GOLD_ITEM_ID: i64 = 1001;
const CONTEXT: &str = "warehouse";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleReport {
    pub sold: Vec<Item>,
    pub gold: i64,
}

/// Gold earned by a sale. Newer replies list it as item 1001 in `get_items`;
/// older ones only fill `gold`.
pub fn gold_from_sale(reply: &SellReply) -> i64 {
    if !reply.get_items.is_empty() {
        return reply
            .get_items
            .iter()
            .find(|item| item.id == GOLD_ITEM_ID)
            .map_or(0, |item| item.count);
    }
    reply.gold
}

pub struct Warehouse {
    context: BotContext,
}

impl Warehouse {
    pub fn new(context: BotContext) -> Self {
        Self { context }
    }

    /// Sells every fruit stack in the bag in one call. `None` when disabled,
    /// when there is nothing to sell or when a call fails.
    pub fn sell_fruits(&self) -> Option<SaleReport> {
        if !self.context.settings.current().auto_sell {
            return None;
        }
        let logger = &self.context.logger;
        let catalog = &self.context.catalog;

        let items = match self.context.game.bag() {
            Ok(items) => items,
            Err(error) => {
                logger.warn(Some(CONTEXT), &format!("Fetching bag failed: {error}"));
                return None;
            }
        };

        // slots without a uid cannot be sold
        let to_sell: Vec<Item> = items
            .into_iter()
            .filter(|item| catalog.is_fruit(item.id) && item.count > 0 && item.uid != 0)
            .collect();
        if to_sell.is_empty() {
            return None;
        }
        let names: Vec<String> = to_sell
            .iter()
            .map(|item| format!("{} x{}", catalog.item_name(item.id), item.count))
            .collect();

        match self.context.game.sell(to_sell.clone()) {
            Ok(reply) => {
                let gold = gold_from_sale(&reply);
                logger.info(
                    Some(CONTEXT),
                    &format!("Sold {} for {gold} gold", names.join(", ")),
                );
                Some(SaleReport {
                    sold: to_sell,
                    gold,
                })
            }
            Err(error) => {
                logger.warn(Some(CONTEXT), &format!("Selling fruit failed: {error}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::catalog::{FruitRef, PlantCatalog, PlantRecord};
    use crate::context::test_support::context_with_catalog;
    use crate::game::methods;
    use crate::game::test_support::FakeGame;
    use crate::state::SettingsPatch;
    use crate::wire::proto::{Item, SellReply};

    use super::{gold_from_sale, Warehouse};

    fn catalog() -> PlantCatalog {
        PlantCatalog::from_records(vec![PlantRecord {
            id: 1_020_001,
            name: "turnip".to_owned(),
            seed_id: 20_001,
            exp: 2,
            grow_phases: "seed:60;".to_owned(),
            fruit: Some(FruitRef {
                id: 40_001,
                count: 5,
            }),
        }])
    }

    fn item(id: i64, count: i64, uid: i64) -> Item {
        Item { id, count, uid }
    }

    #[test]
    fn gold_prefers_item_list() {
        let reply = SellReply {
            get_items: vec![item(2, 10, 0), item(1001, 75, 0)],
            gold: 3,
        };
        assert_eq!(gold_from_sale(&reply), 75);

        let reply = SellReply {
            get_items: vec![item(2, 10, 0)],
            gold: 3,
        };
        assert_eq!(gold_from_sale(&reply), 0);

        let legacy = SellReply {
            get_items: Vec::new(),
            gold: 40,
        };
        assert_eq!(gold_from_sale(&legacy), 40);
    }

    #[test]
    fn sells_only_valid_fruit_stacks() {
        let game = Arc::new(FakeGame::default());
        *game.bag.lock().expect("bag") = vec![
            item(40_001, 12, 9),
            item(40_001, 3, 0),
            item(20_001, 4, 8),
            item(40_001, 0, 7),
        ];
        *game.sell_gold.lock().expect("gold") = 120;
        let (context, sink) = context_with_catalog(Arc::clone(&game), catalog());

        let report = Warehouse::new(context).sell_fruits().expect("fruit should sell");

        assert_eq!(report.sold, vec![item(40_001, 12, 9)]);
        assert_eq!(report.gold, 120);
        assert_eq!(game.calls_named(methods::SELL).len(), 1);
        assert_eq!(sink.count_containing("Sold turnip fruit x12 for 120 gold"), 1);
    }

    #[test]
    fn disabled_or_empty_bag_sells_nothing() {
        let game = Arc::new(FakeGame::default());
        let (context, _sink) = context_with_catalog(Arc::clone(&game), catalog());
        let warehouse = Warehouse::new(context.clone());

        assert!(warehouse.sell_fruits().is_none());
        assert!(game.calls_named(methods::SELL).is_empty());

        context
            .settings
            .apply(&SettingsPatch {
                auto_sell: Some(false),
                ..SettingsPatch::default()
            })
            .expect("patch should apply");
        *game.bag.lock().expect("bag") = vec![item(40_001, 12, 9)];
        assert!(warehouse.sell_fruits().is_none());
        assert_eq!(game.calls_named(methods::BAG).len(), 1);
    }
}
