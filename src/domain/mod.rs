//! Domain 模块
//!
//! 包含地址、子账户、钱包与序列状态等领域模型

pub mod address;
pub mod sequence;
pub mod subaccount;
pub mod wallet;

// 重新导出常用类型
pub use address::Address;
pub use sequence::{Fee, SequenceState};
pub use subaccount::{SubaccountRef, MAX_SUBACCOUNT_NUMBER};
pub use wallet::{verify_signature, Wallet, DEFAULT_HD_PATH};
