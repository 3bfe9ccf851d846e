//! dYdX v4 验证者客户端
//!
//! 本地签名：助记词派生密钥、组装 Cosmos SDK 交易、签名并广播到验证者节点。
//! 私钥从不离开 `Wallet`。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod proto;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{ClientError, ClientResult, ErrorKind};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{Address, Fee, SequenceState, SubaccountRef, Wallet},
        error::{ClientError, ClientResult, ErrorKind},
        service::{
            BroadcastMode, BroadcastResult, GoodTil, Message, OrderParams, OrderRef,
            ValidatorClient, USDC_ASSET_ID,
        },
    };
}
