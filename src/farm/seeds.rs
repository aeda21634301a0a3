use crate::catalog::{RecommendError, SeedRecommender};
use crate::wire::proto::GoodsInfo;

const LEVEL_CONDITION: i32 = 1;
/// Up to this level the cheapest crop still out-earns the pricier ones.
const LOW_TIER_LEVEL_CAP: i64 = 28;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedOffer {
    pub goods_id: i64,
    pub seed_id: i64,
    pub price: i64,
    pub required_level: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedSource {
    LowestTier,
    Recommended,
    /// The recommender failed or ranked nothing on sale.
    Fallback(Option<RecommendError>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedChoice {
    pub offer: SeedOffer,
    pub source: SeedSource,
}

/// Offers the player can buy right now: unlocked, level conditions met and
/// purchase allowance left.
pub fn available_offers(goods: &[GoodsInfo], level: i64) -> Vec<SeedOffer> {
    goods
        .iter()
        .filter(|goods| goods.unlocked)
        .filter(|goods| goods.limit_count <= 0 || goods.bought_num < goods.limit_count)
        .filter_map(|goods| {
            let mut required_level = 0;
            for cond in goods.conds.iter().filter(|cond| cond.kind == LEVEL_CONDITION) {
                required_level = cond.param;
                if level < required_level {
                    return None;
                }
            }
            Some(SeedOffer {
                goods_id: goods.id,
                seed_id: goods.item_id,
                price: goods.price,
                required_level,
            })
        })
        .collect()
}

pub fn choose_seed(
    mut offers: Vec<SeedOffer>,
    level: i64,
    land_count: usize,
    force_lowest: bool,
    recommender: &dyn SeedRecommender,
) -> Option<SeedChoice> {
    if offers.is_empty() {
        return None;
    }

    if force_lowest {
        offers.sort_by_key(|offer| (offer.required_level, offer.price));
        return Some(SeedChoice {
            offer: offers.swap_remove(0),
            source: SeedSource::LowestTier,
        });
    }

    let failure = match recommender.rank_seeds(level, land_count) {
        Ok(ranked) => {
            let hit = ranked
                .iter()
                .find_map(|seed_id| offers.iter().find(|offer| offer.seed_id == *seed_id));
            if let Some(offer) = hit {
                return Some(SeedChoice {
                    offer: offer.clone(),
                    source: SeedSource::Recommended,
                });
            }
            None
        }
        Err(error) => Some(error),
    };

    // stable sorts keep shop order among equal levels
    if level > 0 && level <= LOW_TIER_LEVEL_CAP {
        offers.sort_by_key(|offer| offer.required_level);
    } else {
        offers.sort_by_key(|offer| std::cmp::Reverse(offer.required_level));
    }
    Some(SeedChoice {
        offer: offers.swap_remove(0),
        source: SeedSource::Fallback(failure),
    })
}

/// Units affordable with `gold`, capped at `wanted`. Zero when the price is
/// not positive.
pub fn affordable_count(gold: i64, price: i64, wanted: usize) -> i64 {
    if price <= 0 {
        return 0;
    }
    (gold / price).clamp(0, wanted as i64)
}
