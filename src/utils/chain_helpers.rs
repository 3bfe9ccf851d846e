//! 链上数量换算工具
//!
//! 人类可读的价格/数量 → 链上整数 (quantums / subticks)。

use chrono::Utc;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};

use crate::error::{ClientError, ClientResult};

/// USDC 精度（6 位小数）
pub const USDC_ATOMIC_RESOLUTION: i32 = -6;

/// 10^exp
fn pow10(exp: i32) -> Option<Decimal> {
    if exp >= 0 {
        (0..exp).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
    } else {
        let scale = exp.unsigned_abs();
        (scale <= 28).then(|| Decimal::new(1, scale))
    }
}

fn scale(field: &str, value: Decimal, exp: i32) -> ClientResult<Decimal> {
    if value.is_sign_negative() {
        return Err(ClientError::invalid_intent(field, "must not be negative"));
    }
    pow10(exp)
        .and_then(|factor| value.checked_mul(factor))
        .ok_or_else(|| ClientError::invalid_intent(field, "out of range"))
}

/// 四舍五入到 `step` 的整数倍，且不小于 `step`
fn round_to_step(field: &str, raw: Decimal, step: u64) -> ClientResult<u64> {
    if step == 0 {
        return Err(ClientError::invalid_intent(field, "step must be greater than zero"));
    }
    let step = Decimal::from(step);
    let rounded = raw
        .checked_div(step)
        .map(|n| n.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
        .and_then(|n| n.checked_mul(step))
        .ok_or_else(|| ClientError::invalid_intent(field, "out of range"))?;

    rounded
        .max(step)
        .to_u64()
        .ok_or_else(|| ClientError::invalid_intent(field, "out of range"))
}

/// USDC 金额 → quantums（向下取整）
pub fn usdc_to_quantums(amount: Decimal) -> ClientResult<u64> {
    scale("amount", amount, -USDC_ATOMIC_RESOLUTION)?
        .floor()
        .to_u64()
        .ok_or_else(|| ClientError::invalid_intent("amount", "out of range"))
}

/// 下单数量 → quantums
pub fn calculate_quantums(
    size: Decimal,
    atomic_resolution: i32,
    step_base_quantums: u64,
) -> ClientResult<u64> {
    let raw = scale("size", size, -atomic_resolution)?;
    round_to_step("size", raw, step_base_quantums)
}

/// 价格 → subticks
pub fn calculate_subticks(
    price: Decimal,
    atomic_resolution: i32,
    quantum_conversion_exponent: i32,
    subticks_per_tick: u64,
) -> ClientResult<u64> {
    let exponent = atomic_resolution - quantum_conversion_exponent - USDC_ATOMIC_RESOLUTION;
    let raw = scale("price", price, exponent)?;
    round_to_step("price", raw, subticks_per_tick)
}

/// 当前时间之后 `seconds` 秒的区块时间（用于状态订单的 good_til_block_time）
pub fn good_til_block_time_after(seconds: i64) -> ClientResult<u32> {
    if !(0..=i64::from(u32::MAX)).contains(&seconds) {
        return Err(ClientError::invalid_intent("good_til_block_time", "out of range"));
    }
    u32::try_from(Utc::now().timestamp() + seconds)
        .map_err(|_| ClientError::invalid_intent("good_til_block_time", "out of range"))
}
