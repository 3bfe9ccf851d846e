//! 本地签名钱包
//!
//! 私钥只存在于 `Wallet` 内部：不可克隆、不可序列化，`Debug` 输出已脱敏。
//! 对外只暴露 `sign` 与 `address`。

use std::fmt;

use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use k256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use zeroize::Zeroizing;

use crate::{
    domain::Address,
    error::{ClientError, ClientResult},
};

/// Cosmos 标准派生路径（coin type 118）
pub const DEFAULT_HD_PATH: &str = "m/44'/118'/0'/0/0";

/// 签名长度（紧凑格式 r || s）
pub const SIGNATURE_LEN: usize = 64;

pub struct Wallet {
    signing_key: SigningKey,
    public_key: [u8; 33],
    address: Address,
}

impl Wallet {
    /// 从 BIP39 助记词派生钱包（默认路径）
    pub fn from_mnemonic(mnemonic: &str, prefix: &str) -> ClientResult<Self> {
        Self::from_mnemonic_with_path(mnemonic, prefix, DEFAULT_HD_PATH)
    }

    /// 从 BIP39 助记词按指定 BIP32 路径派生钱包
    pub fn from_mnemonic_with_path(mnemonic: &str, prefix: &str, path: &str) -> ClientResult<Self> {
        use coins_bip32::prelude::*;

        let mnemonic = Mnemonic::parse_in(Language::English, mnemonic.trim())
            .map_err(|e| ClientError::KeyDerivation(format!("invalid mnemonic: {}", e)))?;

        let seed = Zeroizing::new(mnemonic.to_seed(""));

        let derivation_path = path
            .parse::<DerivationPath>()
            .map_err(|e| ClientError::KeyDerivation(format!("invalid derivation path: {}", e)))?;

        let master_key = XPriv::root_from_seed(&seed[..], None)
            .map_err(|e| ClientError::KeyDerivation(format!("master key: {}", e)))?;

        let derived_key = master_key
            .derive_path(&derivation_path)
            .map_err(|e| ClientError::KeyDerivation(format!("child key: {}", e)))?;

        // XPriv 实现 AsRef<SigningKey>
        let signing_key: &SigningKey = derived_key.as_ref();
        Self::from_signing_key(signing_key.clone(), prefix)
    }

    fn from_signing_key(signing_key: SigningKey, prefix: &str) -> ClientResult<Self> {
        let encoded = signing_key.verifying_key().to_encoded_point(true); // 压缩格式
        let public_key: [u8; 33] = encoded.as_bytes().try_into().map_err(|_| {
            ClientError::KeyDerivation("unexpected public key encoding".to_string())
        })?;
        let address = Address::from_public_key(&public_key, prefix)?;

        tracing::debug!(address = %address, "Wallet derived");

        Ok(Self {
            signing_key,
            public_key,
            address,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// 压缩公钥（33 字节）
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// 对任意字节签名：ECDSA(SHA256(bytes))，RFC6979 确定性，low-S
    pub fn sign(&self, bytes: &[u8]) -> [u8; SIGNATURE_LEN] {
        let signature: Signature = self.signing_key.sign(bytes);
        let signature = signature.normalize_s().unwrap_or(signature);

        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        out
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

/// 校验紧凑格式签名
pub fn verify_signature(public_key: &[u8], payload: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(payload, &signature).is_ok()
}
