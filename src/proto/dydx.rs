// dydxprotocol.sending / dydxprotocol.clob 消息

/// dydxprotocol.subaccounts.SubaccountId
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct SubaccountId {
    #[prost(string, tag = "1")]
    pub owner: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub number: u32,
}

/// dydxprotocol.sending.MsgWithdrawFromSubaccount（字段从 2 开始）
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgWithdrawFromSubaccount {
    #[prost(message, optional, tag = "2")]
    pub sender: ::core::option::Option<SubaccountId>,
    #[prost(string, tag = "3")]
    pub recipient: ::prost::alloc::string::String,
    #[prost(uint32, tag = "4")]
    pub asset_id: u32,
    #[prost(uint64, tag = "5")]
    pub quantums: u64,
}

/// dydxprotocol.sending.MsgDepositToSubaccount
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgDepositToSubaccount {
    #[prost(string, tag = "1")]
    pub sender: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub recipient: ::core::option::Option<SubaccountId>,
    #[prost(uint32, tag = "3")]
    pub asset_id: u32,
    #[prost(uint64, tag = "4")]
    pub quantums: u64,
}

/// dydxprotocol.sending.Transfer
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transfer {
    #[prost(message, optional, tag = "1")]
    pub sender: ::core::option::Option<SubaccountId>,
    #[prost(message, optional, tag = "2")]
    pub recipient: ::core::option::Option<SubaccountId>,
    #[prost(uint32, tag = "3")]
    pub asset_id: u32,
    #[prost(uint64, tag = "4")]
    pub amount: u64,
}

/// dydxprotocol.sending.MsgCreateTransfer
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgCreateTransfer {
    #[prost(message, optional, tag = "1")]
    pub transfer: ::core::option::Option<Transfer>,
}

/// dydxprotocol.clob.OrderId
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OrderId {
    #[prost(message, optional, tag = "1")]
    pub subaccount_id: ::core::option::Option<SubaccountId>,
    #[prost(fixed32, tag = "2")]
    pub client_id: u32,
    #[prost(uint32, tag = "3")]
    pub order_flags: u32,
    #[prost(uint32, tag = "4")]
    pub clob_pair_id: u32,
}

/// dydxprotocol.clob.Order
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Order {
    #[prost(message, optional, tag = "1")]
    pub order_id: ::core::option::Option<OrderId>,
    #[prost(enumeration = "OrderSide", tag = "2")]
    pub side: i32,
    #[prost(uint64, tag = "3")]
    pub quantums: u64,
    #[prost(uint64, tag = "4")]
    pub subticks: u64,
    #[prost(oneof = "GoodTilOneof", tags = "5, 6")]
    pub good_til_oneof: ::core::option::Option<GoodTilOneof>,
    #[prost(enumeration = "TimeInForce", tag = "7")]
    pub time_in_force: i32,
    #[prost(bool, tag = "8")]
    pub reduce_only: bool,
    #[prost(uint32, tag = "9")]
    pub client_metadata: u32,
    #[prost(enumeration = "ConditionType", tag = "10")]
    pub condition_type: i32,
    #[prost(uint64, tag = "11")]
    pub conditional_order_trigger_subticks: u64,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum GoodTilOneof {
    #[prost(uint32, tag = "5")]
    GoodTilBlock(u32),
    #[prost(fixed32, tag = "6")]
    GoodTilBlockTime(u32),
}

/// MsgCancelOrder 的 good_til 字段编号与 Order 不同
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum CancelGoodTilOneof {
    #[prost(uint32, tag = "2")]
    GoodTilBlock(u32),
    #[prost(fixed32, tag = "3")]
    GoodTilBlockTime(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OrderSide {
    Unspecified = 0,
    Buy = 1,
    Sell = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TimeInForce {
    Unspecified = 0,
    Ioc = 1,
    PostOnly = 2,
    FillOrKill = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ConditionType {
    Unspecified = 0,
    StopLoss = 1,
    TakeProfit = 2,
}

/// dydxprotocol.clob.MsgPlaceOrder
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgPlaceOrder {
    #[prost(message, optional, tag = "1")]
    pub order: ::core::option::Option<Order>,
}

/// dydxprotocol.clob.MsgCancelOrder
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgCancelOrder {
    #[prost(message, optional, tag = "1")]
    pub order_id: ::core::option::Option<OrderId>,
    #[prost(oneof = "CancelGoodTilOneof", tags = "2, 3")]
    pub good_til_oneof: ::core::option::Option<CancelGoodTilOneof>,
}

pub const ORDER_FLAGS_SHORT_TERM: u32 = 0;
pub const ORDER_FLAGS_CONDITIONAL: u32 = 32;
pub const ORDER_FLAGS_LONG_TERM: u32 = 64;

pub const MSG_WITHDRAW_FROM_SUBACCOUNT_TYPE_URL: &str =
    "/dydxprotocol.sending.MsgWithdrawFromSubaccount";
pub const MSG_DEPOSIT_TO_SUBACCOUNT_TYPE_URL: &str = "/dydxprotocol.sending.MsgDepositToSubaccount";
pub const MSG_CREATE_TRANSFER_TYPE_URL: &str = "/dydxprotocol.sending.MsgCreateTransfer";
pub const MSG_PLACE_ORDER_TYPE_URL: &str = "/dydxprotocol.clob.MsgPlaceOrder";
pub const MSG_CANCEL_ORDER_TYPE_URL: &str = "/dydxprotocol.clob.MsgCancelOrder";
