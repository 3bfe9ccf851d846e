//! 客户端错误分类
//!
//! 每一个失败在跨越组件边界之前都被归入以下唯一一种类型，
//! 调用方可以统一地决定恢复策略，而无需解析节点的原始响应。

use thiserror::Error;

/// 错误类型（用于统一的恢复逻辑）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    KeyDerivation,
    InvalidIntent,
    Assembly,
    Rejected,
    SequenceMismatch,
    Transient,
}

/// 交易构建与提交流程中的错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// 助记词、派生路径或地址前缀无效（致命，不重试）
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// 意图字段不满足约束（调用方需修正输入）
    #[error("invalid intent: {field} {reason}")]
    InvalidIntent { field: String, reason: String },

    /// 交易组装失败：消息为空或手续费估算失败
    #[error("transaction assembly failed: {0}")]
    Assembly(String),

    /// 节点在应用层拒绝了该交易
    #[error("transaction rejected: {reason} (codespace={codespace}, code={code}): {message}")]
    Rejected {
        code: u32,
        codespace: String,
        reason: String,
        message: String,
    },

    /// 账户序列号不匹配，需要刷新缓存后重新构建
    #[error("account sequence mismatch for {address}: used {used}, node expects {expected:?}")]
    SequenceMismatch {
        address: String,
        used: u64,
        expected: Option<u64>,
    },

    /// 网络或节点暂时不可用，重试耗尽后上抛
    #[error("transient failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },
}

impl ClientError {
    pub fn invalid_intent(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIntent {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 按 SDK 错误码构造拒绝错误
    pub fn rejected(code: u32, codespace: impl Into<String>, message: impl Into<String>) -> Self {
        let codespace = codespace.into();
        Self::Rejected {
            code,
            reason: rejection_reason(&codespace, code),
            codespace,
            message: message.into(),
        }
    }

    pub fn transient(attempts: u32, message: impl Into<String>) -> Self {
        Self::Transient {
            attempts,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyDerivation(_) => ErrorKind::KeyDerivation,
            Self::InvalidIntent { .. } => ErrorKind::InvalidIntent,
            Self::Assembly(_) => ErrorKind::Assembly,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::SequenceMismatch { .. } => ErrorKind::SequenceMismatch,
            Self::Transient { .. } => ErrorKind::Transient,
        }
    }

    /// 稳定的错误码字符串（用于日志和上层映射）
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::KeyDerivation => "key_derivation_failed",
            ErrorKind::InvalidIntent => "invalid_intent",
            ErrorKind::Assembly => "assembly_failed",
            ErrorKind::Rejected => "transaction_rejected",
            ErrorKind::SequenceMismatch => "sequence_mismatch",
            ErrorKind::Transient => "transient_failure",
        }
    }

    /// 是否可以通过重建/重试恢复
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SequenceMismatch | ErrorKind::Transient
        )
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// SDK 根错误码
pub const SDK_CODESPACE: &str = "sdk";
pub const CODE_INSUFFICIENT_FUNDS: u32 = 5;
pub const CODE_UNKNOWN_ADDRESS: u32 = 9;
pub const CODE_TX_IN_MEMPOOL_CACHE: u32 = 19;
pub const CODE_MEMPOOL_IS_FULL: u32 = 20;
pub const CODE_WRONG_SEQUENCE: u32 = 32;

/// 将 SDK 错误码转换为可读的拒绝原因
pub fn rejection_reason(codespace: &str, code: u32) -> String {
    if codespace != SDK_CODESPACE {
        return format!("{} error {}", codespace, code);
    }
    let reason = match code {
        2 => "tx parse error",
        3 => "invalid sequence",
        4 => "unauthorized",
        CODE_INSUFFICIENT_FUNDS => "insufficient funds",
        6 => "unknown request",
        7 => "invalid address",
        8 => "invalid pubkey",
        CODE_UNKNOWN_ADDRESS => "unknown address",
        10 => "invalid coins",
        11 => "out of gas",
        12 => "memo too large",
        13 => "insufficient fee",
        14 => "maximum number of signatures exceeded",
        15 => "no signatures supplied",
        18 => "invalid request",
        CODE_TX_IN_MEMPOOL_CACHE => "tx already in mempool",
        CODE_MEMPOOL_IS_FULL => "mempool is full",
        21 => "tx too large",
        22 => "key not found",
        30 => "tx timeout height",
        CODE_WRONG_SEQUENCE => "incorrect account sequence",
        _ => return format!("sdk error {}", code),
    };
    reason.to_string()
}

/// 节点日志是否报告序列号不匹配
pub fn is_sequence_mismatch(codespace: &str, code: u32, log: &str) -> bool {
    (codespace == SDK_CODESPACE && code == CODE_WRONG_SEQUENCE)
        || log.contains("account sequence mismatch")
}

/// 从 "account sequence mismatch, expected 6, got 5" 中解析节点期望的序列号
pub fn parse_expected_sequence(log: &str) -> Option<u64> {
    let rest = &log[log.find("expected ")? + "expected ".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_reason_mapping() {
        assert_eq!(rejection_reason("sdk", 5), "insufficient funds");
        assert_eq!(rejection_reason("sdk", 32), "incorrect account sequence");
        assert_eq!(rejection_reason("sdk", 999), "sdk error 999");
        assert_eq!(rejection_reason("clob", 42), "clob error 42");
    }

    #[test]
    fn test_rejected_constructor_fills_reason() {
        let err = ClientError::rejected(5, "sdk", "spendable balance 0 is smaller than 1");
        match &err {
            ClientError::Rejected { reason, code, .. } => {
                assert_eq!(reason, "insufficient funds");
                assert_eq!(*code, 5);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.code(), "transaction_rejected");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_expected_sequence() {
        let log = "account sequence mismatch, expected 6, got 5: incorrect account sequence";
        assert_eq!(parse_expected_sequence(log), Some(6));
        assert_eq!(parse_expected_sequence("out of gas"), None);
        assert!(is_sequence_mismatch("sdk", 32, ""));
        assert!(is_sequence_mismatch("", 0, log));
        assert!(!is_sequence_mismatch("sdk", 5, "insufficient funds"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ClientError::transient(3, "timeout").is_retryable());
        assert!(ClientError::SequenceMismatch {
            address: "dydx1".into(),
            used: 5,
            expected: Some(6),
        }
        .is_retryable());
        assert!(!ClientError::invalid_intent("quantums", "must be positive").is_retryable());
        assert_eq!(
            ClientError::KeyDerivation("bad".into()).kind(),
            ErrorKind::KeyDerivation
        );
    }
}
