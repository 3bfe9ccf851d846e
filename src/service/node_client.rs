//! 节点客户端
//!
//! 签名流水线只通过 [`NodeClient`] 与链交互：查询账户、模拟交易、广播交易。
//! [`RestNodeClient`] 走 Cosmos SDK 的 REST (gRPC-gateway) 接口。

use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Address, SequenceState};

/// gRPC-gateway 错误使用的 codespace
pub const GRPC_CODESPACE: &str = "grpc";

// gRPC 状态码
const GRPC_DEADLINE_EXCEEDED: u32 = 4;
const GRPC_NOT_FOUND: u32 = 5;
const GRPC_RESOURCE_EXHAUSTED: u32 = 8;
const GRPC_UNAVAILABLE: u32 = 14;

/// 广播模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// 等待 CheckTx 结果（默认）
    Sync,
    /// 立即返回，结果未知
    Async,
    /// 等待区块提交
    Block,
}

impl BroadcastMode {
    pub fn as_rest_mode(&self) -> &'static str {
        match self {
            Self::Sync => "BROADCAST_MODE_SYNC",
            Self::Async => "BROADCAST_MODE_ASYNC",
            Self::Block => "BROADCAST_MODE_BLOCK",
        }
    }
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Block => "block",
        };
        f.write_str(name)
    }
}

impl FromStr for BroadcastMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sync" | "broadcast_mode_sync" => Ok(Self::Sync),
            "async" | "broadcast_mode_async" => Ok(Self::Async),
            "block" | "broadcast_mode_block" => Ok(Self::Block),
            other => Err(format!("unknown broadcast mode: {}", other)),
        }
    }
}

/// 节点对广播请求的应答（`tx_response`）
#[derive(Debug, Clone, PartialEq)]
pub struct TxResponse {
    pub txhash: String,
    pub code: u32,
    pub codespace: String,
    pub height: u64,
    pub raw_log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// 原始 JSON 应答
    pub raw: Value,
}

impl TxResponse {
    /// code 0 的应答
    pub fn accepted(txhash: impl Into<String>) -> Self {
        Self::with_code(txhash, 0, "", "")
    }

    pub fn with_code(
        txhash: impl Into<String>,
        code: u32,
        codespace: impl Into<String>,
        raw_log: impl Into<String>,
    ) -> Self {
        Self {
            txhash: txhash.into(),
            code,
            codespace: codespace.into(),
            height: 0,
            raw_log: raw_log.into(),
            gas_wanted: 0,
            gas_used: 0,
            raw: Value::Null,
        }
    }
}

/// 节点交互错误（尚未分类为 `ClientError`）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// 请求已发出但没有收到应答，结果未知
    #[error("node request timed out: {0}")]
    Timeout(String),

    /// 请求发出后连接中断，结果未知
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("node returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("node error (codespace={codespace}, code={code}): {message}")]
    Abci {
        code: u32,
        codespace: String,
        message: String,
    },

    #[error("account {0} not found")]
    AccountNotFound(String),

    #[error("failed to decode node response: {0}")]
    Decode(String),
}

impl NodeError {
    /// 是否值得重试
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) | Self::ConnectionLost(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Abci {
                code, codespace, ..
            } => {
                codespace == GRPC_CODESPACE
                    && matches!(
                        *code,
                        GRPC_DEADLINE_EXCEEDED | GRPC_RESOURCE_EXHAUSTED | GRPC_UNAVAILABLE
                    )
            }
            Self::AccountNotFound(_) | Self::Decode(_) => false,
        }
    }

    /// 请求是否可能已经被节点处理（广播结果未知）
    pub fn is_ambiguous(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ConnectionLost(_) | Self::Decode(_) => true,
            Self::Abci {
                code, codespace, ..
            } => codespace == GRPC_CODESPACE && *code == GRPC_DEADLINE_EXCEEDED,
            _ => false,
        }
    }
}

/// 链交互边界
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// 查询账户的 (account number, sequence)
    async fn query_account(&self, address: &Address) -> Result<SequenceState, NodeError>;

    /// 模拟交易，返回 gas used
    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, NodeError>;

    /// 广播已签名交易
    async fn broadcast_tx(
        &self,
        tx_bytes: &[u8],
        mode: BroadcastMode,
    ) -> Result<TxResponse, NodeError>;
}

/// Cosmos SDK REST 节点客户端
#[derive(Debug, Clone)]
pub struct RestNodeClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl RestNodeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, NodeError> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(error_from_response(status, body));
        }

        serde_json::from_str(&body).map_err(|e| NodeError::Decode(e.to_string()))
    }

    async fn post_tx(&self, path: &str, payload: Value) -> Result<Value, NodeError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response).await
    }
}

#[async_trait]
impl NodeClient for RestNodeClient {
    async fn query_account(&self, address: &Address) -> Result<SequenceState, NodeError> {
        let url = format!("{}/cosmos/auth/v1beta1/accounts/{}", self.base_url, address);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(NodeError::AccountNotFound(address.to_string()));
        }

        let json = match Self::read_json(response).await {
            Ok(json) => json,
            Err(NodeError::Abci { code, codespace, .. })
                if codespace == GRPC_CODESPACE && code == GRPC_NOT_FOUND =>
            {
                return Err(NodeError::AccountNotFound(address.to_string()));
            }
            Err(e) => return Err(e),
        };

        let state = parse_account(&json).ok_or_else(|| {
            NodeError::Decode(format!("unexpected account response: {}", json))
        })?;

        tracing::debug!(
            address = %address,
            account_number = state.account_number,
            sequence = state.sequence,
            "Account queried"
        );

        Ok(state)
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, NodeError> {
        let payload = serde_json::json!({
            "tx_bytes": base64::engine::general_purpose::STANDARD.encode(tx_bytes),
        });
        let json = self.post_tx("/cosmos/tx/v1beta1/simulate", payload).await?;

        json.get("gas_info")
            .and_then(|info| info.get("gas_used"))
            .and_then(value_as_u64)
            .ok_or_else(|| NodeError::Decode("missing gas_info.gas_used".to_string()))
    }

    async fn broadcast_tx(
        &self,
        tx_bytes: &[u8],
        mode: BroadcastMode,
    ) -> Result<TxResponse, NodeError> {
        let payload = serde_json::json!({
            "tx_bytes": base64::engine::general_purpose::STANDARD.encode(tx_bytes),
            "mode": mode.as_rest_mode(),
        });
        let json = self.post_tx("/cosmos/tx/v1beta1/txs", payload).await?;
        parse_tx_response(json)
    }
}

fn transport_error(e: reqwest::Error) -> NodeError {
    if e.is_timeout() {
        NodeError::Timeout(e.to_string())
    } else if e.is_connect() {
        NodeError::Unreachable(e.to_string())
    } else if e.is_decode() {
        NodeError::Decode(e.to_string())
    } else {
        NodeError::ConnectionLost(e.to_string())
    }
}

/// gRPC-gateway 把 gRPC 错误编码为 `{"code": n, "message": "..."}`
fn error_from_response(status: StatusCode, body: String) -> NodeError {
    if matches!(status.as_u16(), 400 | 404 | 500) {
        if let Ok(json) = serde_json::from_str::<Value>(&body) {
            if let Some(message) = json.get("message").and_then(Value::as_str) {
                let code = json
                    .get("code")
                    .and_then(value_as_u64)
                    .and_then(|c| u32::try_from(c).ok())
                    .unwrap_or(0);
                return NodeError::Abci {
                    code,
                    codespace: GRPC_CODESPACE.to_string(),
                    message: message.to_string(),
                };
            }
        }
    }

    NodeError::Http {
        status: status.as_u16(),
        body,
    }
}

/// 数字字段在 REST 应答中通常是字符串
fn value_as_u64(value: &Value) -> Option<u64> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_u64())
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// 支持 BaseAccount 与 vesting 账户两种结构
fn parse_account(json: &Value) -> Option<SequenceState> {
    let account = json.get("account")?;
    let base = account
        .get("base_account")
        .or_else(|| {
            account
                .get("base_vesting_account")
                .and_then(|v| v.get("base_account"))
        })
        .unwrap_or(account);

    let account_number = value_as_u64(base.get("account_number")?)?;
    // 新账户可能省略 sequence
    let sequence = match base.get("sequence") {
        Some(v) => value_as_u64(v)?,
        None => 0,
    };

    Some(SequenceState::new(account_number, sequence))
}

fn parse_tx_response(json: Value) -> Result<TxResponse, NodeError> {
    let resp = json
        .get("tx_response")
        .ok_or_else(|| NodeError::Decode("missing tx_response".to_string()))?;

    let code = resp
        .get("code")
        .and_then(value_as_u64)
        .unwrap_or(0);

    Ok(TxResponse {
        txhash: str_field(resp, "txhash"),
        code: u32::try_from(code).map_err(|_| NodeError::Decode(format!("code {}", code)))?,
        codespace: str_field(resp, "codespace"),
        height: resp.get("height").and_then(value_as_u64).unwrap_or(0),
        raw_log: str_field(resp, "raw_log"),
        gas_wanted: resp.get("gas_wanted").and_then(value_as_u64).unwrap_or(0),
        gas_used: resp.get("gas_used").and_then(value_as_u64).unwrap_or(0),
        raw: json.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_mode_parsing() {
        assert_eq!("sync".parse::<BroadcastMode>().unwrap(), BroadcastMode::Sync);
        assert_eq!(
            "BROADCAST_MODE_BLOCK".parse::<BroadcastMode>().unwrap(),
            BroadcastMode::Block
        );
        assert!("fast".parse::<BroadcastMode>().is_err());
        assert_eq!(BroadcastMode::Async.as_rest_mode(), "BROADCAST_MODE_ASYNC");
        assert_eq!(BroadcastMode::Async.to_string(), "async");
    }

    #[test]
    fn test_parse_base_account() {
        let json = serde_json::json!({
            "account": {
                "@type": "/cosmos.auth.v1beta1.BaseAccount",
                "address": "dydx1abc",
                "account_number": "42",
                "sequence": "7"
            }
        });
        assert_eq!(parse_account(&json), Some(SequenceState::new(42, 7)));
    }

    #[test]
    fn test_parse_vesting_account() {
        let json = serde_json::json!({
            "account": {
                "@type": "/cosmos.vesting.v1beta1.ContinuousVestingAccount",
                "base_vesting_account": {
                    "base_account": { "account_number": "3", "sequence": "0" }
                }
            }
        });
        assert_eq!(parse_account(&json), Some(SequenceState::new(3, 0)));
    }

    #[test]
    fn test_parse_account_without_sequence() {
        let json = serde_json::json!({ "account": { "account_number": "9" } });
        assert_eq!(parse_account(&json), Some(SequenceState::new(9, 0)));
        assert_eq!(parse_account(&serde_json::json!({})), None);
    }

    #[test]
    fn test_parse_tx_response() {
        let json = serde_json::json!({
            "tx_response": {
                "height": "0",
                "txhash": "ABCD",
                "codespace": "sdk",
                "code": 5,
                "raw_log": "insufficient funds",
                "gas_wanted": "200000",
                "gas_used": "0"
            }
        });
        let resp = parse_tx_response(json).unwrap();
        assert_eq!(resp.txhash, "ABCD");
        assert_eq!(resp.code, 5);
        assert_eq!(resp.codespace, "sdk");
        assert_eq!(resp.gas_wanted, 200_000);

        assert!(matches!(
            parse_tx_response(serde_json::json!({"foo": 1})),
            Err(NodeError::Decode(_))
        ));
    }

    #[test]
    fn test_error_from_gateway_body() {
        let err = error_from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"code":14,"message":"connection refused","details":[]}"#.to_string(),
        );
        assert_eq!(
            err,
            NodeError::Abci {
                code: 14,
                codespace: GRPC_CODESPACE.to_string(),
                message: "connection refused".to_string(),
            }
        );
        assert!(err.is_transient());

        let err = error_from_response(StatusCode::BAD_GATEWAY, "<html>".to_string());
        assert!(matches!(err, NodeError::Http { status: 502, .. }));
        assert!(err.is_transient());
        assert!(!err.is_ambiguous());
    }

    #[test]
    fn test_error_classification() {
        assert!(NodeError::Timeout("t".into()).is_ambiguous());
        assert!(NodeError::Timeout("t".into()).is_transient());
        assert!(!NodeError::Unreachable("u".into()).is_ambiguous());
        assert!(!NodeError::AccountNotFound("a".into()).is_transient());
        assert!(!NodeError::Http {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(NodeError::Http {
            status: 429,
            body: String::new()
        }
        .is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        // 端口 9 (discard) 在测试环境中通常没有监听
        let client = RestNodeClient::new("http://127.0.0.1:9/", Duration::from_millis(500));
        assert_eq!(client.base_url(), "http://127.0.0.1:9");

        let err = client.simulate(&[1, 2, 3]).await.unwrap_err();
        assert!(err.is_transient());
    }
}
