//! 验证者节点客户端
//!
//! 把签名流水线串起来：
//! 租约 → 组装（可选模拟）→ 签名 → 广播 → 结算租约。
//! 序列号不匹配时作废缓存并重建交易，次数受 `max_sequence_rebuilds` 限制。

use std::sync::Arc;

use crate::{
    config::Config,
    domain::{Address, Fee, SequenceState, SubaccountRef, Wallet},
    error::{ClientError, ClientResult},
    service::{
        broadcast_client::{BroadcastClient, BroadcastResult},
        message_builder::{self, GoodTil, Message, OrderParams, OrderRef},
        node_client::{NodeClient, RestNodeClient},
        sequence_cache::AccountSequenceCache,
        signer::Signer,
        transaction_assembler::TransactionAssembler,
    },
};

pub struct ValidatorClient {
    sequences: Arc<AccountSequenceCache>,
    assembler: TransactionAssembler,
    broadcaster: BroadcastClient,
    max_sequence_rebuilds: u32,
}

impl ValidatorClient {
    pub fn new(config: &Config, node: Arc<dyn NodeClient>) -> Self {
        Self {
            sequences: Arc::new(
                AccountSequenceCache::new(node.clone(), config.sequence.cache_ttl())
                    .with_retry(config.broadcast.retry_config()),
            ),
            assembler: TransactionAssembler::from_config(config, node.clone()),
            broadcaster: BroadcastClient::new(
                node,
                config.broadcast.mode,
                config.broadcast.retry_config(),
            ),
            max_sequence_rebuilds: config.sequence.max_sequence_rebuilds,
        }
    }

    /// 使用 REST 节点客户端连接配置中的网络
    pub fn connect(config: &Config) -> Self {
        let node = RestNodeClient::new(
            &config.network.rest_endpoint,
            config.network.request_timeout(),
        );

        tracing::info!(
            network = %config.network.name,
            chain_id = %config.network.chain_id,
            endpoint = %node.base_url(),
            "Validator client connected"
        );

        Self::new(config, Arc::new(node))
    }

    pub fn chain_id(&self) -> &str {
        self.assembler.chain_id()
    }

    pub fn sequence_cache(&self) -> &Arc<AccountSequenceCache> {
        &self.sequences
    }

    /// 当前 (account number, sequence)
    pub async fn query_sequence(&self, address: &Address) -> ClientResult<SequenceState> {
        self.sequences.get(address).await
    }

    /// 签名并广播一组消息
    pub async fn send_messages(
        &self,
        wallet: &Wallet,
        messages: Vec<Message>,
        fee: Option<Fee>,
    ) -> ClientResult<BroadcastResult> {
        if messages.is_empty() {
            return Err(ClientError::Assembly(
                "transaction must contain at least one message".to_string(),
            ));
        }

        let address = wallet.address();
        if let Some(message) = messages.iter().find(|m| m.signer() != address.as_str()) {
            return Err(ClientError::invalid_intent(
                "signer",
                format!(
                    "{} must be signed by {}, not {}",
                    message.type_url(),
                    message.signer(),
                    address
                ),
            ));
        }

        let mut rebuilds = 0u32;
        loop {
            match self.submit_once(wallet, &messages, fee.clone()).await {
                Err(ClientError::SequenceMismatch {
                    used, expected, ..
                }) if rebuilds < self.max_sequence_rebuilds => {
                    rebuilds += 1;
                    tracing::info!(
                        address = %address,
                        used,
                        expected = ?expected,
                        rebuild = rebuilds,
                        "Rebuilding transaction after sequence mismatch"
                    );
                }
                result => return result,
            }
        }
    }

    async fn submit_once(
        &self,
        wallet: &Wallet,
        messages: &[Message],
        fee: Option<Fee>,
    ) -> ClientResult<BroadcastResult> {
        let lease = self.sequences.lease(wallet.address()).await?;

        let unsigned = match self
            .assembler
            .assemble(messages, fee, wallet.public_key(), lease.state())
            .await
        {
            Ok(unsigned) => unsigned,
            Err(e) => {
                // 模拟报告序列号不一致时缓存已过时
                if matches!(e, ClientError::SequenceMismatch { .. }) {
                    lease.invalidate();
                } else {
                    lease.release();
                }
                return Err(e);
            }
        };

        let signed = match Signer::sign(unsigned, wallet) {
            Ok(signed) => signed,
            Err(e) => {
                lease.release();
                return Err(e);
            }
        };

        self.broadcaster.broadcast(&signed, lease).await
    }

    /// 从子账户提取到所有者地址
    pub async fn withdraw(
        &self,
        wallet: &Wallet,
        subaccount: &SubaccountRef,
        asset_id: u32,
        quantums: u64,
    ) -> ClientResult<BroadcastResult> {
        self.withdraw_to(wallet, subaccount, &subaccount.owner, asset_id, quantums)
            .await
    }

    pub async fn withdraw_to(
        &self,
        wallet: &Wallet,
        subaccount: &SubaccountRef,
        recipient: &Address,
        asset_id: u32,
        quantums: u64,
    ) -> ClientResult<BroadcastResult> {
        let message = message_builder::withdraw(subaccount, recipient, asset_id, quantums)?;
        self.send_messages(wallet, vec![message], None).await
    }

    /// 从钱包地址存入子账户
    pub async fn deposit(
        &self,
        wallet: &Wallet,
        subaccount: &SubaccountRef,
        asset_id: u32,
        quantums: u64,
    ) -> ClientResult<BroadcastResult> {
        let message = message_builder::deposit(wallet.address(), subaccount, asset_id, quantums)?;
        self.send_messages(wallet, vec![message], None).await
    }

    pub async fn transfer(
        &self,
        wallet: &Wallet,
        sender: &SubaccountRef,
        recipient: &SubaccountRef,
        asset_id: u32,
        amount: u64,
    ) -> ClientResult<BroadcastResult> {
        let message = message_builder::transfer(sender, recipient, asset_id, amount)?;
        self.send_messages(wallet, vec![message], None).await
    }

    pub async fn place_order(
        &self,
        wallet: &Wallet,
        params: &OrderParams,
    ) -> ClientResult<BroadcastResult> {
        let message = message_builder::place_order(params)?;
        self.send_messages(wallet, vec![message], None).await
    }

    pub async fn cancel_order(
        &self,
        wallet: &Wallet,
        order: &OrderRef,
        good_til: GoodTil,
    ) -> ClientResult<BroadcastResult> {
        let message = message_builder::cancel_order(order, good_til)?;
        self.send_messages(wallet, vec![message], None).await
    }

    /// 原生代币转账
    pub async fn send_token(
        &self,
        wallet: &Wallet,
        recipient: &Address,
        denom: &str,
        amount: u128,
    ) -> ClientResult<BroadcastResult> {
        let message = message_builder::bank_send(wallet.address(), recipient, denom, amount)?;
        self.send_messages(wallet, vec![message], None).await
    }
}
