//! 交易签名（SIGN_MODE_DIRECT）
//!
//! 纯本地操作：SignDoc → secp256k1 签名 → `TxRaw`。

use prost::Message as _;
use sha2::{Digest, Sha256};

use crate::{
    domain::{verify_signature, Fee, SequenceState, Wallet},
    error::{ClientError, ClientResult},
    proto::cosmos::TxRaw,
    service::transaction_assembler::UnsignedTransaction,
};

/// 已签名、可广播的交易
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    signature: Vec<u8>,
    tx_bytes: Vec<u8>,
    hash: String,
}

impl SignedTransaction {
    /// `TxRaw` 编码，直接用于广播
    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx_bytes
    }

    /// 交易哈希：SHA-256(tx_bytes) 的大写十六进制
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn sequence(&self) -> SequenceState {
        self.unsigned.sequence()
    }

    pub fn fee(&self) -> &Fee {
        self.unsigned.fee()
    }

    pub fn signer(&self) -> &str {
        self.unsigned.signer()
    }

    pub fn consumes_sequence(&self) -> bool {
        self.unsigned.consumes_sequence()
    }

    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    /// 用交易内的公钥重新校验签名
    pub fn verify(&self) -> bool {
        verify_signature(
            self.unsigned.public_key(),
            &self.unsigned.sign_bytes(),
            &self.signature,
        )
    }
}

pub struct Signer;

impl Signer {
    /// 签名待签名交易
    ///
    /// 交易中的公钥必须属于该钱包。
    pub fn sign(unsigned: UnsignedTransaction, wallet: &Wallet) -> ClientResult<SignedTransaction> {
        if unsigned.public_key() != wallet.public_key() {
            return Err(ClientError::Assembly(format!(
                "transaction public key does not belong to wallet {}",
                wallet.address()
            )));
        }

        let signature = wallet.sign(&unsigned.sign_bytes()).to_vec();

        let tx_bytes = TxRaw {
            body_bytes: unsigned.body_bytes().to_vec(),
            auth_info_bytes: unsigned.auth_info_bytes().to_vec(),
            signatures: vec![signature.clone()],
        }
        .encode_to_vec();

        let hash = tx_hash(&tx_bytes);

        tracing::debug!(
            address = %wallet.address(),
            sequence = unsigned.sequence().sequence,
            tx_hash = %hash,
            "Transaction signed"
        );

        Ok(SignedTransaction {
            unsigned,
            signature,
            tx_bytes,
            hash,
        })
    }
}

/// CometBFT 交易哈希
pub fn tx_hash(tx_bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx_bytes))
}
