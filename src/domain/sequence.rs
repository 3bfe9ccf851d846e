//! 账户序列状态与手续费

use serde::{Deserialize, Serialize};

/// (account number, sequence)：每个地址一份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub account_number: u64,
    pub sequence: u64,
}

impl SequenceState {
    pub fn new(account_number: u64, sequence: u64) -> Self {
        Self {
            account_number,
            sequence,
        }
    }

    pub fn next(self) -> Self {
        Self {
            sequence: self.sequence + 1,
            ..self
        }
    }
}

/// 交易手续费：(amount, denom, gas limit)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: u128,
    pub denom: String,
    pub gas_limit: u64,
}

impl Fee {
    pub fn new(amount: u128, denom: impl Into<String>, gas_limit: u64) -> Self {
        Self {
            amount,
            denom: denom.into(),
            gas_limit,
        }
    }
}
