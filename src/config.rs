//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::service::{node_client::BroadcastMode, transaction_retry::RetryConfig};

/// 客户端配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub tx: TxConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 网络配置（链ID、节点地址、手续费币种）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: String,
    pub rest_endpoint: String,
    pub fee_denom: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// 钱包配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub address_prefix: String,
    pub hd_path: String,
}

/// Gas 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// 模拟得到的 gas 乘以该系数作为 gas limit
    pub gas_multiplier: Decimal,
    /// 每单位 gas 的价格（fee_denom 计价）
    pub gas_price: Decimal,
}

/// 交易体配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxConfig {
    #[serde(default)]
    pub memo: String,
    /// 0 表示不设置超时高度
    #[serde(default)]
    pub timeout_height: u64,
}

/// 广播与重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub mode: BroadcastMode,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

/// 序列号缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// 缓存条目过期时间（秒），过期后重新查询节点
    pub cache_ttl_secs: u64,
    /// 序列号不匹配时自动重建交易的次数上限
    pub max_sequence_rebuilds: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl NetworkConfig {
    /// 内置网络预设
    pub fn preset(name: &str) -> Option<Self> {
        let (chain_id, rest_endpoint, fee_denom) = match name.to_lowercase().as_str() {
            "local" => ("localdydxprotocol", "http://localhost:1317", "adv4tnt"),
            "testnet" => (
                "dydx-testnet-4",
                "https://dydx-testnet-api.polkachu.com",
                "adv4tnt",
            ),
            "mainnet" => ("dydx-mainnet-1", "https://dydx-api.polkachu.com", "adydx"),
            _ => return None,
        };

        Some(Self {
            name: name.to_lowercase(),
            chain_id: chain_id.to_string(),
            rest_endpoint: rest_endpoint.to_string(),
            fee_denom: fee_denom.to_string(),
            request_timeout_secs: default_request_timeout_secs(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let name = std::env::var("NETWORK").unwrap_or_else(|_| "testnet".into());
        let preset = Self::preset(&name).unwrap_or_else(|| {
            tracing::warn!(network = %name, "Unknown network preset, falling back to testnet");
            Self::preset("testnet").unwrap_or_else(|| Self {
                name: "testnet".into(),
                chain_id: String::new(),
                rest_endpoint: String::new(),
                fee_denom: String::new(),
                request_timeout_secs: default_request_timeout_secs(),
            })
        });

        Self {
            chain_id: std::env::var("CHAIN_ID").unwrap_or(preset.chain_id),
            rest_endpoint: std::env::var("NODE_REST_URL").unwrap_or(preset.rest_endpoint),
            fee_denom: std::env::var("FEE_DENOM").unwrap_or(preset.fee_denom),
            request_timeout_secs: env_or("NODE_TIMEOUT_SECS", preset.request_timeout_secs),
            name: preset.name,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            address_prefix: std::env::var("ADDRESS_PREFIX").unwrap_or_else(|_| "dydx".into()),
            hd_path: std::env::var("HD_PATH")
                .unwrap_or_else(|_| crate::domain::DEFAULT_HD_PATH.into()),
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_multiplier: env_or("GAS_MULTIPLIER", Decimal::new(14, 1)), // 1.4
            gas_price: env_or("GAS_PRICE", Decimal::from(25_000_000_000u64)),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            mode: env_or("BROADCAST_MODE", BroadcastMode::Sync),
            max_attempts: env_or("BROADCAST_MAX_ATTEMPTS", retry.max_attempts),
            initial_backoff_ms: env_or("BROADCAST_INITIAL_BACKOFF_MS", retry.initial_backoff_ms),
            backoff_multiplier: env_or("BROADCAST_BACKOFF_MULTIPLIER", retry.backoff_multiplier),
            max_backoff_ms: env_or("BROADCAST_MAX_BACKOFF_MS", retry.max_backoff_ms),
        }
    }
}

impl BroadcastConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            backoff_multiplier: self.backoff_multiplier,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: env_or("SEQUENCE_CACHE_TTL_SECS", 300),
            max_sequence_rebuilds: env_or("MAX_SEQUENCE_REBUILDS", 1),
        }
    }
}

impl SequenceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            network: NetworkConfig::default(),
            wallet: WalletConfig::default(),
            gas: GasConfig::default(),
            tx: TxConfig::default(),
            broadcast: BroadcastConfig::default(),
            sequence: SequenceConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.network.chain_id.trim().is_empty() {
            anyhow::bail!("CHAIN_ID must not be empty");
        }

        if !self.network.rest_endpoint.starts_with("http://")
            && !self.network.rest_endpoint.starts_with("https://")
        {
            anyhow::bail!("NODE_REST_URL must start with http:// or https://");
        }

        if self.network.fee_denom.trim().is_empty() {
            anyhow::bail!("FEE_DENOM must not be empty");
        }

        bech32::Hrp::parse(&self.wallet.address_prefix)
            .map_err(|e| anyhow::anyhow!("ADDRESS_PREFIX is not a valid bech32 prefix: {}", e))?;

        // 系数小于 1 会导致交易必然 out of gas
        if self.gas.gas_multiplier < Decimal::ONE || self.gas.gas_multiplier > Decimal::from(3) {
            anyhow::bail!("GAS_MULTIPLIER must be between 1.0 and 3.0");
        }

        if self.gas.gas_price.is_sign_negative() {
            anyhow::bail!("GAS_PRICE must not be negative");
        }

        if self.broadcast.max_attempts == 0 {
            anyhow::bail!("BROADCAST_MAX_ATTEMPTS must be at least 1");
        }

        if self.broadcast.backoff_multiplier < 1.0 {
            anyhow::bail!("BROADCAST_BACKOFF_MULTIPLIER must be >= 1.0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
