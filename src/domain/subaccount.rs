//! 子账户引用

use std::fmt;

use crate::{domain::Address, proto::dydx::SubaccountId};

/// 链上允许的最大子账户编号
pub const MAX_SUBACCOUNT_NUMBER: u32 = 128_000;

/// (owner, number)：同一地址下的一个子账本
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubaccountRef {
    pub owner: Address,
    pub number: u32,
}

impl SubaccountRef {
    pub fn new(owner: Address, number: u32) -> Self {
        Self { owner, number }
    }

    pub fn to_proto(&self) -> SubaccountId {
        SubaccountId {
            owner: self.owner.to_string(),
            number: self.number,
        }
    }
}

impl fmt::Display for SubaccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.number)
    }
}
