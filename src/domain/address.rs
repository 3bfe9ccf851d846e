//! 账户地址
//!
//! 地址 = bech32(prefix, RIPEMD160(SHA256(压缩公钥)))，派生后不可变。

use std::{fmt, str::FromStr};

use bech32::{Bech32, Hrp};
use bitcoin::hashes::{ripemd160, Hash};
use sha2::{Digest, Sha256};

use crate::error::{ClientError, ClientResult};

/// 地址字节长度
pub const ADDRESS_LEN: usize = 20;

/// 链上账户地址（bech32 编码）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    bytes: [u8; ADDRESS_LEN],
    encoded: String,
}

impl Address {
    /// 从压缩 secp256k1 公钥派生地址
    pub fn from_public_key(public_key: &[u8], prefix: &str) -> ClientResult<Self> {
        if public_key.len() != 33 {
            return Err(ClientError::KeyDerivation(format!(
                "expected 33-byte compressed public key, got {} bytes",
                public_key.len()
            )));
        }

        let sha = Sha256::digest(public_key);
        let hash = ripemd160::Hash::hash(&sha).to_byte_array();

        Self::from_bytes(hash, prefix).map_err(|e| ClientError::KeyDerivation(e.to_string()))
    }

    /// 使用指定前缀编码原始地址字节
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN], prefix: &str) -> ClientResult<Self> {
        let hrp = Hrp::parse(prefix).map_err(|e| {
            ClientError::invalid_intent("address prefix", format!("{:?} is invalid: {}", prefix, e))
        })?;
        let encoded = bech32::encode::<Bech32>(hrp, &bytes)
            .map_err(|e| ClientError::invalid_intent("address", format!("encode failed: {}", e)))?;

        Ok(Self { bytes, encoded })
    }

    /// 解析 bech32 地址字符串
    pub fn parse(s: &str) -> ClientResult<Self> {
        let (hrp, data) = bech32::decode(s)
            .map_err(|e| ClientError::invalid_intent("address", format!("{:?}: {}", s, e)))?;

        let bytes: [u8; ADDRESS_LEN] = data.as_slice().try_into().map_err(|_| {
            ClientError::invalid_intent(
                "address",
                format!("expected {} bytes, got {}", ADDRESS_LEN, data.len()),
            )
        })?;

        Self::from_bytes(bytes, hrp.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.bytes
    }

    /// bech32 前缀（如 "dydx"）
    pub fn prefix(&self) -> &str {
        self.encoded
            .rsplit_once('1')
            .map(|(hrp, _)| hrp)
            .unwrap_or_default()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for Address {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
