//! Typed game RPC surface over a [`Session`].

use std::sync::Arc;

use crate::wire::proto::{
    services, AcceptFriendsReply, AcceptFriendsRequest, AllLandsRequest, BagReply,
    BuyGoodsReply, BuyGoodsRequest, EmptyReply, EmptyRequest, FertilizeRequest,
    FriendApplication, GameFriend, GetAllFriendsReply, GetApplicationsReply, HarvestRequest,
    Item, LandActionRequest, LandsReply, PlantItem, PlantRequest, RemovePlantRequest,
    SellReply, SellRequest, ShopInfoReply, ShopInfoRequest, UnlockLandRequest,
    UpgradeLandRequest, VisitEnterRequest, VisitLeaveRequest,
};
use crate::wire::session::{CallError, Session};

pub const SEED_SHOP_ID: i64 = 2;
pub const NORMAL_FERTILIZER_ID: i64 = 1011;
const ENTER_REASON_FRIEND: i32 = 2;

pub mod methods {
    pub const ALL_LANDS: &str = "AllLands";
    pub const HARVEST: &str = "Harvest";
    pub const WATER_LAND: &str = "WaterLand";
    pub const WEED_OUT: &str = "WeedOut";
    pub const INSECTICIDE: &str = "Insecticide";
    pub const PUT_WEEDS: &str = "PutWeeds";
    pub const PUT_INSECTS: &str = "PutInsects";
    pub const FERTILIZE: &str = "Fertilize";
    pub const REMOVE_PLANT: &str = "RemovePlant";
    pub const PLANT: &str = "Plant";
    pub const UPGRADE_LAND: &str = "UpgradeLand";
    pub const UNLOCK_LAND: &str = "UnlockLand";
    pub const SHOP_INFO: &str = "ShopInfo";
    pub const BUY_GOODS: &str = "BuyGoods";
    pub const BAG: &str = "Bag";
    pub const SELL: &str = "Sell";
    pub const GET_ALL_FRIENDS: &str = "GetAll";
    pub const GET_APPLICATIONS: &str = "GetApplications";
    pub const ACCEPT_FRIENDS: &str = "AcceptFriends";
    pub const VISIT_ENTER: &str = "Enter";
    pub const VISIT_LEAVE: &str = "Leave";
}

/// Per-land actions that share the `{land_ids, host_gid}` request shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandAction {
    Water,
    WeedOut,
    Insecticide,
    PutWeeds,
    PutInsects,
}

impl LandAction {
    pub fn method(self) -> &'static str {
        match self {
            Self::Water => methods::WATER_LAND,
            Self::WeedOut => methods::WEED_OUT,
            Self::Insecticide => methods::INSECTICIDE,
            Self::PutWeeds => methods::PUT_WEEDS,
            Self::PutInsects => methods::PUT_INSECTS,
        }
    }
}

/// Everything the orchestrators ask of the game server.
///
/// Replies that carry operation limits are returned whole so callers can
/// feed the quota tracker; replies nobody reads collapse to `()`.
pub trait GameApi: Send + Sync {
    fn all_lands(&self) -> Result<LandsReply, CallError>;
    fn lands(&self, land_ids: &[i64]) -> Result<LandsReply, CallError>;
    /// `host_gid` 0 harvests the player's own farm.
    fn harvest(&self, land_ids: &[i64], host_gid: i64) -> Result<LandsReply, CallError>;
    fn land_action(
        &self,
        action: LandAction,
        land_ids: &[i64],
        host_gid: i64,
    ) -> Result<LandsReply, CallError>;
    fn fertilize(&self, land_ids: &[i64], fertilizer_id: i64) -> Result<(), CallError>;
    fn remove_plants(&self, land_ids: &[i64]) -> Result<(), CallError>;
    fn plant(&self, seed_id: i64, land_id: i64) -> Result<(), CallError>;
    fn upgrade_land(&self, land_id: i64) -> Result<(), CallError>;
    fn unlock_land(&self, land_id: i64) -> Result<(), CallError>;
    fn shop_info(&self, shop_id: i64) -> Result<ShopInfoReply, CallError>;
    fn buy_goods(&self, goods_id: i64, count: i64, price: i64) -> Result<BuyGoodsReply, CallError>;
    fn bag(&self) -> Result<Vec<Item>, CallError>;
    fn sell(&self, items: Vec<Item>) -> Result<SellReply, CallError>;
    fn friends(&self) -> Result<Vec<GameFriend>, CallError>;
    fn applications(&self) -> Result<Vec<FriendApplication>, CallError>;
    fn accept_friends(&self, gids: &[i64]) -> Result<Vec<GameFriend>, CallError>;
    fn visit_enter(&self, host_gid: i64) -> Result<LandsReply, CallError>;
    fn visit_leave(&self, host_gid: i64) -> Result<(), CallError>;
}

pub struct SessionGameApi {
    session: Arc<Session>,
}

impl SessionGameApi {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

impl GameApi for SessionGameApi {
    fn all_lands(&self) -> Result<LandsReply, CallError> {
        self.lands(&[])
    }

    fn lands(&self, land_ids: &[i64]) -> Result<LandsReply, CallError> {
        let request = AllLandsRequest {
            land_ids: land_ids.to_vec(),
        };
        self.session
            .call_decoded(services::PLANT, methods::ALL_LANDS, &request)
    }

    fn harvest(&self, land_ids: &[i64], host_gid: i64) -> Result<LandsReply, CallError> {
        let request = HarvestRequest {
            land_ids: land_ids.to_vec(),
            host_gid,
            is_all: true,
        };
        self.session
            .call_decoded(services::PLANT, methods::HARVEST, &request)
    }

    fn land_action(
        &self,
        action: LandAction,
        land_ids: &[i64],
        host_gid: i64,
    ) -> Result<LandsReply, CallError> {
        let request = LandActionRequest {
            land_ids: land_ids.to_vec(),
            host_gid,
        };
        self.session
            .call_decoded(services::PLANT, action.method(), &request)
    }

    fn fertilize(&self, land_ids: &[i64], fertilizer_id: i64) -> Result<(), CallError> {
        let request = FertilizeRequest {
            land_ids: land_ids.to_vec(),
            fertilizer_id,
        };
        self.session
            .call_decoded::<_, EmptyReply>(services::PLANT, methods::FERTILIZE, &request)
            .map(drop)
    }

    fn remove_plants(&self, land_ids: &[i64]) -> Result<(), CallError> {
        let request = RemovePlantRequest {
            land_ids: land_ids.to_vec(),
        };
        self.session
            .call_decoded::<_, EmptyReply>(services::PLANT, methods::REMOVE_PLANT, &request)
            .map(drop)
    }

    fn plant(&self, seed_id: i64, land_id: i64) -> Result<(), CallError> {
        let request = PlantRequest {
            items: vec![PlantItem {
                seed_id,
                land_ids: vec![land_id],
            }],
        };
        self.session
            .call_decoded::<_, EmptyReply>(services::PLANT, methods::PLANT, &request)
            .map(drop)
    }

    fn upgrade_land(&self, land_id: i64) -> Result<(), CallError> {
        let request = UpgradeLandRequest { land_id };
        self.session
            .call_decoded::<_, EmptyReply>(services::PLANT, methods::UPGRADE_LAND, &request)
            .map(drop)
    }

    fn unlock_land(&self, land_id: i64) -> Result<(), CallError> {
        let request = UnlockLandRequest {
            land_id,
            do_shared: false,
        };
        self.session
            .call_decoded::<_, EmptyReply>(services::PLANT, methods::UNLOCK_LAND, &request)
            .map(drop)
    }

    fn shop_info(&self, shop_id: i64) -> Result<ShopInfoReply, CallError> {
        self.session.call_decoded(
            services::SHOP,
            methods::SHOP_INFO,
            &ShopInfoRequest { shop_id },
        )
    }

    fn buy_goods(&self, goods_id: i64, count: i64, price: i64) -> Result<BuyGoodsReply, CallError> {
        let request = BuyGoodsRequest {
            goods_id,
            num: count,
            price,
        };
        self.session
            .call_decoded(services::SHOP, methods::BUY_GOODS, &request)
    }

    fn bag(&self) -> Result<Vec<Item>, CallError> {
        self.session
            .call_decoded::<_, BagReply>(services::ITEM, methods::BAG, &EmptyRequest {})
            .map(BagReply::into_items)
    }

    fn sell(&self, items: Vec<Item>) -> Result<SellReply, CallError> {
        self.session
            .call_decoded(services::ITEM, methods::SELL, &SellRequest { items })
    }

    fn friends(&self) -> Result<Vec<GameFriend>, CallError> {
        self.session
            .call_decoded::<_, GetAllFriendsReply>(
                services::FRIEND,
                methods::GET_ALL_FRIENDS,
                &EmptyRequest {},
            )
            .map(|reply| reply.game_friends)
    }

    fn applications(&self) -> Result<Vec<FriendApplication>, CallError> {
        self.session
            .call_decoded::<_, GetApplicationsReply>(
                services::FRIEND,
                methods::GET_APPLICATIONS,
                &EmptyRequest {},
            )
            .map(|reply| reply.applications)
    }

    fn accept_friends(&self, gids: &[i64]) -> Result<Vec<GameFriend>, CallError> {
        let request = AcceptFriendsRequest {
            friend_gids: gids.to_vec(),
        };
        self.session
            .call_decoded::<_, AcceptFriendsReply>(
                services::FRIEND,
                methods::ACCEPT_FRIENDS,
                &request,
            )
            .map(|reply| reply.friends)
    }

    fn visit_enter(&self, host_gid: i64) -> Result<LandsReply, CallError> {
        let request = VisitEnterRequest {
            host_gid,
            reason: ENTER_REASON_FRIEND,
        };
        self.session
            .call_decoded(services::VISIT, methods::VISIT_ENTER, &request)
    }

    fn visit_leave(&self, host_gid: i64) -> Result<(), CallError> {
        self.session
            .call_decoded::<_, EmptyReply>(
                services::VISIT,
                methods::VISIT_LEAVE,
                &VisitLeaveRequest { host_gid },
            )
            .map(drop)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use prost::Message;

    use crate::wire::proto::{
        services, BagReply, Item, ItemBag, LandInfo, LandsReply, PlantRequest,
    };
    use crate::wire::session::test_support::SessionHarness;

    use super::{methods, GameApi, LandAction, SessionGameApi};

    #[test]
    fn land_action_maps_to_plant_service_method() {
        let harness = SessionHarness::open();
        let api = SessionGameApi::new(Arc::clone(&harness.session));
        let caller =
            thread::spawn(move || api.land_action(LandAction::Insecticide, &[3, 4], 77));

        let request = harness.next_request();
        assert_eq!(request.service, services::PLANT);
        assert_eq!(request.method, methods::INSECTICIDE);
        let reply = LandsReply {
            lands: vec![LandInfo {
                id: 3,
                ..LandInfo::default()
            }],
            operation_limits: Vec::new(),
        };
        harness.respond(request.client_seq, 0, reply.encode_to_vec());

        let reply = caller
            .join()
            .expect("caller should finish")
            .expect("call should succeed");
        assert_eq!(reply.lands.len(), 1);
    }

    #[test]
    fn plant_sends_one_land_per_request() {
        let harness = SessionHarness::open();
        let api = SessionGameApi::new(Arc::clone(&harness.session));
        let caller = thread::spawn(move || api.plant(20_003, 9));

        let request = harness.next_request();
        assert_eq!(request.method, methods::PLANT);
        let decoded = PlantRequest::decode(request.body.as_slice()).expect("plant request");
        assert_eq!(decoded.items.len(), 1);
        assert_eq!(decoded.items[0].seed_id, 20_003);
        assert_eq!(decoded.items[0].land_ids, vec![9]);
        harness.respond(request.client_seq, 0, Vec::new());

        caller
            .join()
            .expect("caller should finish")
            .expect("plant should succeed");
    }

    #[test]
    fn bag_prefers_nested_item_bag() {
        let harness = SessionHarness::open();
        let api = SessionGameApi::new(Arc::clone(&harness.session));
        let caller = thread::spawn(move || api.bag());

        let request = harness.next_request();
        assert_eq!(request.service, services::ITEM);
        let reply = BagReply {
            item_bag: Some(ItemBag {
                items: vec![Item {
                    id: 40_001,
                    count: 12,
                    uid: 5,
                }],
            }),
            items: Vec::new(),
        };
        harness.respond(request.client_seq, 0, reply.encode_to_vec());

        let items = caller
            .join()
            .expect("caller should finish")
            .expect("bag should succeed");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].uid, 5);
    }
}
