//! 账户序列号缓存
//!
//! 每个地址一个槽位（`Arc<Mutex<SequenceSlot>>`），槽位表本身只在定位槽位时加读写锁，
//! 不同地址之间互不阻塞。同一地址的提交通过 [`SequenceLease`] 串行化：
//! 租约从组装交易一直持有到广播结果返回。
//! 账户查询遇到瞬时错误时按 [`RetryConfig`] 退避重试。

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    domain::{Address, SequenceState},
    error::{ClientError, ClientResult, CODE_UNKNOWN_ADDRESS, SDK_CODESPACE},
    service::{
        node_client::{NodeClient, NodeError},
        transaction_retry::RetryConfig,
    },
};

/// 单个地址的缓存条目
#[derive(Debug, Default)]
pub struct SequenceSlot {
    state: Option<SequenceState>,
    last_updated: Option<DateTime<Utc>>,
}

impl SequenceSlot {
    fn current(&self, ttl: Duration) -> Option<SequenceState> {
        let state = self.state?;
        let last_updated = self.last_updated?;
        let age = Utc::now().signed_duration_since(last_updated);
        // 负数表示时钟回拨，按过期处理
        match age.to_std() {
            Ok(age) if age < ttl => Some(state),
            _ => None,
        }
    }

    fn store(&mut self, state: SequenceState) {
        self.state = Some(state);
        self.last_updated = Some(Utc::now());
    }

    fn clear(&mut self) {
        self.state = None;
        self.last_updated = None;
    }
}

/// 账户序列号缓存
pub struct AccountSequenceCache {
    node: Arc<dyn NodeClient>,
    slots: RwLock<HashMap<Address, Arc<Mutex<SequenceSlot>>>>,
    ttl: Duration,
    retry: RetryConfig,
}

impl AccountSequenceCache {
    pub fn new(node: Arc<dyn NodeClient>, ttl: Duration) -> Self {
        Self {
            node,
            slots: RwLock::new(HashMap::new()),
            ttl,
            retry: RetryConfig::default(),
        }
    }

    /// 账户查询遇到瞬时错误时的重试策略
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn slot(&self, address: &Address) -> Arc<Mutex<SequenceSlot>> {
        if let Some(slot) = self.slots.read().await.get(address) {
            return slot.clone();
        }

        let mut slots = self.slots.write().await;
        slots.entry(address.clone()).or_default().clone()
    }

    /// 获取当前序列状态：缓存未命中或过期时查询节点
    pub async fn get(&self, address: &Address) -> ClientResult<SequenceState> {
        let slot = self.slot(address).await;
        let mut entry = slot.lock().await;
        self.ensure_fresh(address, &mut entry).await
    }

    /// 本地缓存的值（不访问节点）
    pub async fn peek(&self, address: &Address) -> Option<SequenceState> {
        let slot = self.slots.read().await.get(address)?.clone();
        let entry = slot.lock().await;
        entry.current(self.ttl)
    }

    /// 交易被接受后递增序列号；未缓存时不做任何事
    pub async fn advance(&self, address: &Address) -> Option<SequenceState> {
        let slot = self.slot(address).await;
        let mut entry = slot.lock().await;
        let next = entry.state?.next();
        entry.store(next);
        Some(next)
    }

    /// 丢弃缓存，下一次使用时重新查询节点
    pub async fn invalidate(&self, address: &Address) {
        let slot = self.slot(address).await;
        slot.lock().await.clear();
        tracing::debug!(address = %address, "Sequence cache invalidated");
    }

    /// 获取该地址的独占租约
    ///
    /// 同一地址的其它 `lease`/`get`/`advance`/`invalidate` 调用会等待租约结束。
    pub async fn lease(&self, address: &Address) -> ClientResult<SequenceLease> {
        let slot = self.slot(address).await;
        let mut guard = slot.lock_owned().await;
        let state = self.ensure_fresh(address, &mut guard).await?;

        tracing::debug!(
            address = %address,
            account_number = state.account_number,
            sequence = state.sequence,
            "Sequence lease acquired"
        );

        Ok(SequenceLease {
            address: address.clone(),
            state,
            guard: Some(guard),
            sent: false,
        })
    }

    async fn ensure_fresh(
        &self,
        address: &Address,
        entry: &mut SequenceSlot,
    ) -> ClientResult<SequenceState> {
        if let Some(state) = entry.current(self.ttl) {
            return Ok(state);
        }

        let state = self.query_with_retry(address).await?;
        entry.store(state);
        Ok(state)
    }

    async fn query_with_retry(&self, address: &Address) -> ClientResult<SequenceState> {
        let mut backoff = self.retry.backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.node.query_account(address).await {
                Ok(state) => return Ok(state),
                Err(e) if e.is_transient() && self.retry.can_retry(attempt) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        address = %address,
                        attempt,
                        error = %e,
                        next_retry_in_ms = delay.as_millis() as u64,
                        "Account query failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(classify_query_error(address, e, attempt)),
            }
        }
    }
}

fn classify_query_error(address: &Address, error: NodeError, attempts: u32) -> ClientError {
    tracing::warn!(address = %address, error = %error, attempts, "Account query failed");

    if error.is_transient() {
        return ClientError::transient(attempts, error.to_string());
    }

    match error {
        NodeError::AccountNotFound(_) => ClientError::rejected(
            CODE_UNKNOWN_ADDRESS,
            SDK_CODESPACE,
            format!("account {} does not exist on chain", address),
        ),
        NodeError::Abci {
            code,
            codespace,
            message,
        } => ClientError::rejected(code, codespace, message),
        NodeError::Http { status, body } => ClientError::rejected(u32::from(status), "http", body),
        e => ClientError::transient(attempts, e.to_string()),
    }
}

/// 单个地址序列号的独占租约
///
/// 通过 [`advance`](Self::advance)、[`release`](Self::release) 或
/// [`invalidate`](Self::invalidate) 结束。调用 [`mark_sent`](Self::mark_sent)
/// 之后未结束就被丢弃（例如调用方取消了 future）时，缓存条目会被作废。
pub struct SequenceLease {
    address: Address,
    state: SequenceState,
    guard: Option<OwnedMutexGuard<SequenceSlot>>,
    sent: bool,
}

impl SequenceLease {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// 交易已经（可能）到达节点
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// 交易已被接受：序列号 +1
    pub fn advance(mut self) -> SequenceState {
        let next = self.state.next();
        if let Some(mut guard) = self.guard.take() {
            guard.store(next);
        }
        tracing::debug!(address = %self.address, sequence = next.sequence, "Sequence advanced");
        next
    }

    /// 交易未消耗序列号：保持不变
    pub fn release(mut self) {
        self.guard.take();
    }

    /// 结果未知或节点报告不一致：丢弃缓存
    pub fn invalidate(mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.clear();
        }
        tracing::debug!(address = %self.address, "Sequence lease invalidated");
    }
}

impl Drop for SequenceLease {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            if self.sent {
                guard.clear();
                tracing::warn!(
                    address = %self.address,
                    sequence = self.state.sequence,
                    "Sequence lease dropped after send, cache invalidated"
                );
            }
        }
    }
}

impl std::fmt::Debug for SequenceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceLease")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("sent", &self.sent)
            .finish()
    }
}
