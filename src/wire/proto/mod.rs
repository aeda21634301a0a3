//! Protobuf schema for the gateway protocol.
//!
//! Field tags live only here. Everything above the codec works with these
//! structs, so a schema revision is a change to this module alone.

use prost::Message;

/// Fully qualified service names addressed by request meta.
pub mod services {
    pub const USER: &str = "gamepb.userpb.UserService";
    pub const PLANT: &str = "gamepb.plantpb.PlantService";
    pub const SHOP: &str = "gamepb.shoppb.ShopService";
    pub const FRIEND: &str = "gamepb.friendpb.FriendService";
    pub const VISIT: &str = "gamepb.visitpb.VisitService";
    pub const ITEM: &str = "gamepb.itempb.ItemService";
}

// =============================================================================
// Gateway framing
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct GateMessage {
    #[prost(message, optional, tag = "1")]
    pub meta: Option<Meta>,
    #[prost(bytes = "vec", tag = "2")]
    pub body: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Meta {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub method_name: String,
    #[prost(int32, tag = "3")]
    pub message_type: i32,
    #[prost(int64, tag = "4")]
    pub client_seq: i64,
    #[prost(int64, tag = "5")]
    pub server_seq: i64,
    #[prost(int64, tag = "6")]
    pub error_code: i64,
    #[prost(string, tag = "7")]
    pub error_message: String,
}

/// Body of every Notify frame.
#[derive(Clone, PartialEq, Message)]
pub struct EventMessage {
    #[prost(string, tag = "1")]
    pub message_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub body: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EmptyRequest {}

/// Accepts any reply body; unknown fields are skipped.
#[derive(Clone, PartialEq, Message)]
pub struct EmptyReply {}

// =============================================================================
// User service
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct DeviceInfo {
    #[prost(string, tag = "1")]
    pub client_version: String,
    #[prost(string, tag = "2")]
    pub sys_software: String,
    #[prost(string, tag = "3")]
    pub network: String,
    #[prost(string, tag = "4")]
    pub memory: String,
    #[prost(string, tag = "5")]
    pub device_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReportData {
    #[prost(string, tag = "1")]
    pub minigame_channel: String,
    #[prost(int32, tag = "2")]
    pub minigame_platid: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginRequest {
    #[prost(int64, tag = "1")]
    pub sharer_id: i64,
    #[prost(string, tag = "2")]
    pub sharer_open_id: String,
    #[prost(message, optional, tag = "3")]
    pub device_info: Option<DeviceInfo>,
    #[prost(int64, tag = "4")]
    pub share_cfg_id: i64,
    #[prost(string, tag = "5")]
    pub scene_id: String,
    #[prost(message, optional, tag = "6")]
    pub report_data: Option<ReportData>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlayerBasic {
    #[prost(int64, tag = "1")]
    pub gid: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int64, tag = "3")]
    pub level: i64,
    #[prost(int64, tag = "4")]
    pub exp: i64,
    #[prost(int64, tag = "5")]
    pub gold: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginReply {
    #[prost(message, optional, tag = "1")]
    pub basic: Option<PlayerBasic>,
    #[prost(int64, tag = "2")]
    pub time_now_millis: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatRequest {
    #[prost(int64, tag = "1")]
    pub gid: i64,
    #[prost(string, tag = "2")]
    pub client_version: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatReply {
    #[prost(int64, tag = "1")]
    pub server_time: i64,
}

// =============================================================================
// Plant service
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct PlantPhaseInfo {
    #[prost(int32, tag = "1")]
    pub phase: i32,
    #[prost(int64, tag = "2")]
    pub begin_time: i64,
    #[prost(int64, tag = "3")]
    pub dry_time: i64,
    #[prost(int64, tag = "4")]
    pub weeds_time: i64,
    #[prost(int64, tag = "5")]
    pub insect_time: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlantInfo {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "3")]
    pub phases: Vec<PlantPhaseInfo>,
    #[prost(int64, tag = "4")]
    pub dry_num: i64,
    #[prost(int64, repeated, tag = "5")]
    pub weed_owners: Vec<i64>,
    #[prost(int64, repeated, tag = "6")]
    pub insect_owners: Vec<i64>,
    #[prost(bool, tag = "7")]
    pub stealable: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct LandInfo {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(bool, tag = "2")]
    pub unlocked: bool,
    #[prost(bool, tag = "3")]
    pub could_unlock: bool,
    #[prost(bool, tag = "4")]
    pub could_upgrade: bool,
    #[prost(message, optional, tag = "5")]
    pub plant: Option<PlantInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperationLimit {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub day_times: i64,
    #[prost(int64, tag = "3")]
    pub day_times_lt: i64,
    #[prost(int64, tag = "4")]
    pub day_exp_times: i64,
    #[prost(int64, tag = "5")]
    pub day_ex_times_lt: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct AllLandsRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
}

/// Reply shape shared by AllLands and every per-land action.
#[derive(Clone, PartialEq, Message)]
pub struct LandsReply {
    #[prost(message, repeated, tag = "1")]
    pub lands: Vec<LandInfo>,
    #[prost(message, repeated, tag = "2")]
    pub operation_limits: Vec<OperationLimit>,
}

#[derive(Clone, PartialEq, Message)]
pub struct HarvestRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
    #[prost(bool, tag = "3")]
    pub is_all: bool,
}

/// Request for WaterLand, WeedOut, Insecticide, PutWeeds and PutInsects.
#[derive(Clone, PartialEq, Message)]
pub struct LandActionRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct FertilizeRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub fertilizer_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RemovePlantRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlantItem {
    #[prost(int64, tag = "1")]
    pub seed_id: i64,
    #[prost(int64, repeated, tag = "2")]
    pub land_ids: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlantRequest {
    #[prost(message, repeated, tag = "2")]
    pub items: Vec<PlantItem>,
}

#[derive(Clone, PartialEq, Message)]
pub struct UpgradeLandRequest {
    #[prost(int64, tag = "1")]
    pub land_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct UnlockLandRequest {
    #[prost(int64, tag = "1")]
    pub land_id: i64,
    #[prost(bool, tag = "2")]
    pub do_shared: bool,
}

// =============================================================================
// Shop service
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct ShopInfoRequest {
    #[prost(int64, tag = "1")]
    pub shop_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Cond {
    #[prost(int32, tag = "1")]
    pub kind: i32,
    #[prost(int64, tag = "2")]
    pub param: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GoodsInfo {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub item_id: i64,
    #[prost(int64, tag = "3")]
    pub price: i64,
    #[prost(bool, tag = "4")]
    pub unlocked: bool,
    #[prost(int64, tag = "5")]
    pub limit_count: i64,
    #[prost(int64, tag = "6")]
    pub bought_num: i64,
    #[prost(message, repeated, tag = "7")]
    pub conds: Vec<Cond>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ShopInfoReply {
    #[prost(message, repeated, tag = "1")]
    pub goods_list: Vec<GoodsInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BuyGoodsRequest {
    #[prost(int64, tag = "1")]
    pub goods_id: i64,
    #[prost(int64, tag = "2")]
    pub num: i64,
    #[prost(int64, tag = "3")]
    pub price: i64,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct Item {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub count: i64,
    #[prost(int64, tag = "3")]
    pub uid: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct BuyGoodsReply {
    #[prost(message, repeated, tag = "1")]
    pub get_items: Vec<Item>,
    #[prost(message, repeated, tag = "2")]
    pub cost_items: Vec<Item>,
}

// =============================================================================
// Friend and visit services
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct FriendPlantPreview {
    #[prost(int64, tag = "1")]
    pub steal_plant_num: i64,
    #[prost(int64, tag = "2")]
    pub dry_num: i64,
    #[prost(int64, tag = "3")]
    pub weed_num: i64,
    #[prost(int64, tag = "4")]
    pub insect_num: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GameFriend {
    #[prost(int64, tag = "1")]
    pub gid: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub remark: String,
    #[prost(int64, tag = "4")]
    pub level: i64,
    #[prost(message, optional, tag = "5")]
    pub plant: Option<FriendPlantPreview>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetAllFriendsReply {
    #[prost(message, repeated, tag = "1")]
    pub game_friends: Vec<GameFriend>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FriendApplication {
    #[prost(int64, tag = "1")]
    pub gid: i64,
    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetApplicationsReply {
    #[prost(message, repeated, tag = "1")]
    pub applications: Vec<FriendApplication>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AcceptFriendsRequest {
    #[prost(int64, repeated, tag = "1")]
    pub friend_gids: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AcceptFriendsReply {
    #[prost(message, repeated, tag = "1")]
    pub friends: Vec<GameFriend>,
}

/// Enter replies reuse the [`LandsReply`] shape.
#[derive(Clone, PartialEq, Message)]
pub struct VisitEnterRequest {
    #[prost(int64, tag = "1")]
    pub host_gid: i64,
    #[prost(int32, tag = "2")]
    pub reason: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VisitLeaveRequest {
    #[prost(int64, tag = "1")]
    pub host_gid: i64,
}

// =============================================================================
// Item service
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct ItemBag {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<Item>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BagReply {
    #[prost(message, optional, tag = "1")]
    pub item_bag: Option<ItemBag>,
    /// Older servers put the bag contents here directly.
    #[prost(message, repeated, tag = "2")]
    pub items: Vec<Item>,
}

impl BagReply {
    pub fn into_items(self) -> Vec<Item> {
        match self.item_bag {
            Some(bag) if !bag.items.is_empty() => bag.items,
            _ => self.items,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct SellRequest {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<Item>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SellReply {
    #[prost(message, repeated, tag = "1")]
    pub get_items: Vec<Item>,
    #[prost(int64, tag = "2")]
    pub gold: i64,
}

// =============================================================================
// Push notifications
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct KickoutNotify {
    #[prost(string, tag = "1")]
    pub reason_message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct LandsNotify {
    #[prost(int64, tag = "1")]
    pub host_gid: i64,
    #[prost(message, repeated, tag = "2")]
    pub lands: Vec<LandInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ItemChange {
    #[prost(message, optional, tag = "1")]
    pub item: Option<Item>,
    #[prost(int64, tag = "2")]
    pub delta: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ItemNotify {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<ItemChange>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BasicNotify {
    #[prost(message, optional, tag = "1")]
    pub basic: Option<PlayerBasic>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FriendApplicationReceivedNotify {
    #[prost(message, repeated, tag = "1")]
    pub applications: Vec<FriendApplication>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FriendAddedNotify {
    #[prost(message, repeated, tag = "1")]
    pub friends: Vec<GameFriend>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GoodsUnlockNotify {
    #[prost(message, repeated, tag = "1")]
    pub goods_list: Vec<GoodsInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TaskEntry {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub progress: i64,
    #[prost(int64, tag = "3")]
    pub total_progress: i64,
    #[prost(bool, tag = "4")]
    pub is_claimed: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct TaskInfo {
    #[prost(message, repeated, tag = "1")]
    pub tasks: Vec<TaskEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TaskInfoNotify {
    #[prost(message, optional, tag = "1")]
    pub task_info: Option<TaskInfo>,
}
