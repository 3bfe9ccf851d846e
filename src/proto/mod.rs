//! 链上 Protobuf 消息定义
//!
//! 字段编号与链上 schema 保持一致，编码顺序由 tag 决定而非构造顺序，
//! 因此同一逻辑输入总是得到相同的字节。

pub mod cosmos;
pub mod dydx;

pub use cosmos::Any;
