//! 交易意图 → 链上消息
//!
//! 每种意图一个构造函数，构造时校验字段，失败返回 `InvalidIntent`（带字段名）。

use prost::Message as _;

use crate::{
    domain::{Address, SubaccountRef, MAX_SUBACCOUNT_NUMBER},
    error::{ClientError, ClientResult},
    proto::{
        cosmos::{Coin, MsgSend, MSG_SEND_TYPE_URL},
        dydx::{
            CancelGoodTilOneof, ConditionType, GoodTilOneof, MsgCancelOrder, MsgCreateTransfer,
            MsgDepositToSubaccount, MsgPlaceOrder, MsgWithdrawFromSubaccount, Order, OrderId,
            OrderSide, TimeInForce, Transfer, MSG_CANCEL_ORDER_TYPE_URL,
            MSG_CREATE_TRANSFER_TYPE_URL, MSG_DEPOSIT_TO_SUBACCOUNT_TYPE_URL,
            MSG_PLACE_ORDER_TYPE_URL, MSG_WITHDRAW_FROM_SUBACCOUNT_TYPE_URL,
            ORDER_FLAGS_CONDITIONAL, ORDER_FLAGS_LONG_TERM, ORDER_FLAGS_SHORT_TERM,
        },
        Any,
    },
};

/// USDC 资产 ID
pub const USDC_ASSET_ID: u32 = 0;

/// 一条待签名的链上消息
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    WithdrawFromSubaccount(MsgWithdrawFromSubaccount),
    DepositToSubaccount(MsgDepositToSubaccount),
    CreateTransfer(MsgCreateTransfer),
    PlaceOrder(MsgPlaceOrder),
    CancelOrder(MsgCancelOrder),
    BankSend(MsgSend),
}

impl Message {
    pub fn type_url(&self) -> &'static str {
        match self {
            Self::WithdrawFromSubaccount(_) => MSG_WITHDRAW_FROM_SUBACCOUNT_TYPE_URL,
            Self::DepositToSubaccount(_) => MSG_DEPOSIT_TO_SUBACCOUNT_TYPE_URL,
            Self::CreateTransfer(_) => MSG_CREATE_TRANSFER_TYPE_URL,
            Self::PlaceOrder(_) => MSG_PLACE_ORDER_TYPE_URL,
            Self::CancelOrder(_) => MSG_CANCEL_ORDER_TYPE_URL,
            Self::BankSend(_) => MSG_SEND_TYPE_URL,
        }
    }

    /// 消息体的 protobuf 编码
    pub fn encode_value(&self) -> Vec<u8> {
        match self {
            Self::WithdrawFromSubaccount(m) => m.encode_to_vec(),
            Self::DepositToSubaccount(m) => m.encode_to_vec(),
            Self::CreateTransfer(m) => m.encode_to_vec(),
            Self::PlaceOrder(m) => m.encode_to_vec(),
            Self::CancelOrder(m) => m.encode_to_vec(),
            Self::BankSend(m) => m.encode_to_vec(),
        }
    }

    pub fn to_any(&self) -> Any {
        Any {
            type_url: self.type_url().to_string(),
            value: self.encode_value(),
        }
    }

    /// 必须签名该消息的地址
    pub fn signer(&self) -> &str {
        let signer = match self {
            Self::WithdrawFromSubaccount(m) => m.sender.as_ref().map(|s| s.owner.as_str()),
            Self::DepositToSubaccount(m) => Some(m.sender.as_str()),
            Self::CreateTransfer(m) => m
                .transfer
                .as_ref()
                .and_then(|t| t.sender.as_ref())
                .map(|s| s.owner.as_str()),
            Self::PlaceOrder(m) => m
                .order
                .as_ref()
                .and_then(|o| o.order_id.as_ref())
                .and_then(|id| id.subaccount_id.as_ref())
                .map(|s| s.owner.as_str()),
            Self::CancelOrder(m) => m
                .order_id
                .as_ref()
                .and_then(|id| id.subaccount_id.as_ref())
                .map(|s| s.owner.as_str()),
            Self::BankSend(m) => Some(m.from_address.as_str()),
        };
        signer.unwrap_or_default()
    }

    /// 短期订单的下单/撤单不消耗账户序列号
    pub fn is_short_term_order(&self) -> bool {
        let order_id = match self {
            Self::PlaceOrder(m) => m.order.as_ref().and_then(|o| o.order_id.as_ref()),
            Self::CancelOrder(m) => m.order_id.as_ref(),
            _ => return false,
        };
        order_id.is_some_and(|id| id.order_flags == ORDER_FLAGS_SHORT_TERM)
    }
}

/// 订单有效期：短期订单按区块高度，状态订单按区块时间（unix 秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoodTil {
    Block(u32),
    BlockTime(u32),
}

/// 条件单触发设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderCondition {
    pub condition_type: ConditionType,
    pub trigger_subticks: u64,
}

/// 下单参数
#[derive(Debug, Clone, PartialEq)]
pub struct OrderParams {
    pub subaccount: SubaccountRef,
    pub client_id: u32,
    pub clob_pair_id: u32,
    pub side: OrderSide,
    pub quantums: u64,
    pub subticks: u64,
    pub good_til: GoodTil,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    pub client_metadata: u32,
    pub condition: Option<OrderCondition>,
}

impl OrderParams {
    /// 由有效期类型和是否为条件单推导出的 order flags
    pub fn order_flags(&self) -> u32 {
        match (self.good_til, self.condition) {
            (GoodTil::Block(_), _) => ORDER_FLAGS_SHORT_TERM,
            (GoodTil::BlockTime(_), Some(_)) => ORDER_FLAGS_CONDITIONAL,
            (GoodTil::BlockTime(_), None) => ORDER_FLAGS_LONG_TERM,
        }
    }

    /// 用于撤单的订单标识
    pub fn order_ref(&self) -> OrderRef {
        OrderRef {
            subaccount: self.subaccount.clone(),
            client_id: self.client_id,
            clob_pair_id: self.clob_pair_id,
            order_flags: self.order_flags(),
        }
    }
}

/// 订单标识 (subaccount, client id, clob pair, flags)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef {
    pub subaccount: SubaccountRef,
    pub client_id: u32,
    pub clob_pair_id: u32,
    pub order_flags: u32,
}

impl OrderRef {
    fn to_proto(&self) -> OrderId {
        OrderId {
            subaccount_id: Some(self.subaccount.to_proto()),
            client_id: self.client_id,
            order_flags: self.order_flags,
            clob_pair_id: self.clob_pair_id,
        }
    }
}

fn check_subaccount(field: &str, subaccount: &SubaccountRef) -> ClientResult<()> {
    if subaccount.number > MAX_SUBACCOUNT_NUMBER {
        return Err(ClientError::invalid_intent(
            field,
            format!("subaccount number must be <= {}", MAX_SUBACCOUNT_NUMBER),
        ));
    }
    Ok(())
}

fn check_positive(field: &str, value: u64) -> ClientResult<()> {
    if value == 0 {
        return Err(ClientError::invalid_intent(field, "must be greater than zero"));
    }
    Ok(())
}

/// 从子账户提取资产到地址
pub fn withdraw(
    sender: &SubaccountRef,
    recipient: &Address,
    asset_id: u32,
    quantums: u64,
) -> ClientResult<Message> {
    check_subaccount("sender", sender)?;
    check_positive("quantums", quantums)?;

    Ok(Message::WithdrawFromSubaccount(MsgWithdrawFromSubaccount {
        sender: Some(sender.to_proto()),
        recipient: recipient.to_string(),
        asset_id,
        quantums,
    }))
}

/// 从地址存入资产到子账户
pub fn deposit(
    sender: &Address,
    recipient: &SubaccountRef,
    asset_id: u32,
    quantums: u64,
) -> ClientResult<Message> {
    check_subaccount("recipient", recipient)?;
    check_positive("quantums", quantums)?;

    Ok(Message::DepositToSubaccount(MsgDepositToSubaccount {
        sender: sender.to_string(),
        recipient: Some(recipient.to_proto()),
        asset_id,
        quantums,
    }))
}

/// 子账户之间转账
pub fn transfer(
    sender: &SubaccountRef,
    recipient: &SubaccountRef,
    asset_id: u32,
    amount: u64,
) -> ClientResult<Message> {
    check_subaccount("sender", sender)?;
    check_subaccount("recipient", recipient)?;
    check_positive("amount", amount)?;
    if sender == recipient {
        return Err(ClientError::invalid_intent(
            "recipient",
            "must differ from sender",
        ));
    }

    Ok(Message::CreateTransfer(MsgCreateTransfer {
        transfer: Some(Transfer {
            sender: Some(sender.to_proto()),
            recipient: Some(recipient.to_proto()),
            asset_id,
            amount,
        }),
    }))
}

/// 下单
pub fn place_order(params: &OrderParams) -> ClientResult<Message> {
    check_subaccount("subaccount", &params.subaccount)?;
    if params.side == OrderSide::Unspecified {
        return Err(ClientError::invalid_intent("side", "must be buy or sell"));
    }
    check_positive("quantums", params.quantums)?;
    check_positive("subticks", params.subticks)?;

    let good_til = match params.good_til {
        GoodTil::Block(height) => {
            if height == 0 {
                return Err(ClientError::invalid_intent(
                    "good_til_block",
                    "short-term orders need a block height greater than zero",
                ));
            }
            GoodTilOneof::GoodTilBlock(height)
        }
        GoodTil::BlockTime(time) => {
            if time == 0 {
                return Err(ClientError::invalid_intent(
                    "good_til_block_time",
                    "stateful orders need a block time greater than zero",
                ));
            }
            GoodTilOneof::GoodTilBlockTime(time)
        }
    };

    let (condition_type, trigger_subticks) = match params.condition {
        Some(condition) => {
            if matches!(params.good_til, GoodTil::Block(_)) {
                return Err(ClientError::invalid_intent(
                    "good_til_block_time",
                    "conditional orders are stateful and need a block time",
                ));
            }
            if condition.condition_type == ConditionType::Unspecified {
                return Err(ClientError::invalid_intent(
                    "condition_type",
                    "must be stop loss or take profit",
                ));
            }
            check_positive("conditional_order_trigger_subticks", condition.trigger_subticks)?;
            (condition.condition_type, condition.trigger_subticks)
        }
        None => (ConditionType::Unspecified, 0),
    };

    let order = Order {
        order_id: Some(params.order_ref().to_proto()),
        side: params.side as i32,
        quantums: params.quantums,
        subticks: params.subticks,
        good_til_oneof: Some(good_til),
        time_in_force: params.time_in_force as i32,
        reduce_only: params.reduce_only,
        client_metadata: params.client_metadata,
        condition_type: condition_type as i32,
        conditional_order_trigger_subticks: trigger_subticks,
    };

    Ok(Message::PlaceOrder(MsgPlaceOrder { order: Some(order) }))
}

/// 撤单：有效期类型必须与订单类型一致
pub fn cancel_order(order: &OrderRef, good_til: GoodTil) -> ClientResult<Message> {
    check_subaccount("subaccount", &order.subaccount)?;

    let good_til = match (order.order_flags, good_til) {
        (ORDER_FLAGS_SHORT_TERM, GoodTil::Block(height)) => {
            check_positive("good_til_block", u64::from(height))?;
            CancelGoodTilOneof::GoodTilBlock(height)
        }
        (ORDER_FLAGS_SHORT_TERM, GoodTil::BlockTime(_)) => {
            return Err(ClientError::invalid_intent(
                "good_til_block",
                "short-term order cancels need a block height",
            ));
        }
        (ORDER_FLAGS_LONG_TERM | ORDER_FLAGS_CONDITIONAL, GoodTil::BlockTime(time)) => {
            check_positive("good_til_block_time", u64::from(time))?;
            CancelGoodTilOneof::GoodTilBlockTime(time)
        }
        (ORDER_FLAGS_LONG_TERM | ORDER_FLAGS_CONDITIONAL, GoodTil::Block(_)) => {
            return Err(ClientError::invalid_intent(
                "good_til_block_time",
                "stateful order cancels need a block time",
            ));
        }
        (flags, _) => {
            return Err(ClientError::invalid_intent(
                "order_flags",
                format!("unknown order flags {}", flags),
            ));
        }
    };

    Ok(Message::CancelOrder(MsgCancelOrder {
        order_id: Some(order.to_proto()),
        good_til_oneof: Some(good_til),
    }))
}

/// 原生代币转账（bank MsgSend）
pub fn bank_send(
    from: &Address,
    to: &Address,
    denom: &str,
    amount: u128,
) -> ClientResult<Message> {
    if amount == 0 {
        return Err(ClientError::invalid_intent("amount", "must be greater than zero"));
    }
    if denom.trim().is_empty() {
        return Err(ClientError::invalid_intent("denom", "must not be empty"));
    }
    if from == to {
        return Err(ClientError::invalid_intent("to", "must differ from sender"));
    }

    Ok(Message::BankSend(MsgSend {
        from_address: from.to_string(),
        to_address: to.to_string(),
        amount: vec![Coin {
            denom: denom.to_string(),
            amount: amount.to_string(),
        }],
    }))
}
