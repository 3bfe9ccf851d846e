//! 交易广播
//!
//! 状态机：Built → Sent → Confirmed | Rejected | TransientFailure，
//! TransientFailure 在尝试次数未耗尽时回到 Sent。
//! 广播结束时按结果结算序列号租约：
//! - Confirmed：序列号 +1（不消耗序列号的交易保持不变，async 模式结果未知则作废缓存）
//! - Rejected：保持不变
//! - 结果未知（超时、连接中断）：作废缓存

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::{
        is_sequence_mismatch, parse_expected_sequence, ClientError, ClientResult,
        CODE_MEMPOOL_IS_FULL, CODE_TX_IN_MEMPOOL_CACHE, CODE_UNKNOWN_ADDRESS, SDK_CODESPACE,
    },
    service::{
        node_client::{BroadcastMode, NodeClient, NodeError, TxResponse},
        sequence_cache::SequenceLease,
        signer::SignedTransaction,
        transaction_retry::RetryConfig,
    },
};

/// 单次提交的状态（记录在 debug 日志中）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionState {
    Built,
    Sent,
    Confirmed,
    Rejected,
    TransientFailure,
}

/// 广播结果
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastResult {
    pub submission_id: Uuid,
    pub tx_hash: String,
    pub code: u32,
    pub codespace: String,
    pub height: u64,
    pub raw_log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// 交易使用的序列号
    pub sequence: u64,
    pub mode: BroadcastMode,
    pub attempts: u32,
    /// 节点原始应答
    pub raw: serde_json::Value,
}

impl BroadcastResult {
    /// 节点已经持有该交易（code 0 或已在 mempool 中）
    pub fn is_success(&self) -> bool {
        is_accepted(self.code, &self.codespace)
    }
}

fn is_sdk(codespace: &str) -> bool {
    codespace == SDK_CODESPACE || codespace.is_empty()
}

/// code 0，或 sdk/19（已在 mempool 中）
fn is_accepted(code: u32, codespace: &str) -> bool {
    code == 0 || (is_sdk(codespace) && code == CODE_TX_IN_MEMPOOL_CACHE)
}

enum Verdict {
    Confirmed(TxResponse),
    SequenceMismatch { expected: Option<u64> },
    Retry(String),
    Rejected(ClientError),
}

fn classify_response(resp: TxResponse) -> Verdict {
    if is_accepted(resp.code, &resp.codespace) {
        return Verdict::Confirmed(resp);
    }

    if is_sequence_mismatch(&resp.codespace, resp.code, &resp.raw_log) {
        return Verdict::SequenceMismatch {
            expected: parse_expected_sequence(&resp.raw_log),
        };
    }

    if is_sdk(&resp.codespace) && resp.code == CODE_MEMPOOL_IS_FULL {
        return Verdict::Retry(format!("mempool is full: {}", resp.raw_log));
    }

    let codespace = if resp.codespace.is_empty() {
        SDK_CODESPACE
    } else {
        resp.codespace.as_str()
    };
    Verdict::Rejected(ClientError::rejected(resp.code, codespace, resp.raw_log))
}

/// 节点在 HTTP 层返回的非瞬时错误
fn classify_node_error(error: NodeError) -> Verdict {
    if error.is_transient() {
        return Verdict::Retry(error.to_string());
    }

    match error {
        NodeError::Abci {
            code,
            codespace,
            message,
        } => {
            if is_sequence_mismatch(&codespace, code, &message) {
                Verdict::SequenceMismatch {
                    expected: parse_expected_sequence(&message),
                }
            } else {
                Verdict::Rejected(ClientError::rejected(code, codespace, message))
            }
        }
        NodeError::Http { status, body } => {
            Verdict::Rejected(ClientError::rejected(u32::from(status), "http", body))
        }
        NodeError::AccountNotFound(address) => Verdict::Rejected(ClientError::rejected(
            CODE_UNKNOWN_ADDRESS,
            SDK_CODESPACE,
            format!("account {} does not exist on chain", address),
        )),
        other => Verdict::Retry(other.to_string()),
    }
}

/// 广播客户端
pub struct BroadcastClient {
    node: Arc<dyn NodeClient>,
    mode: BroadcastMode,
    retry: RetryConfig,
}

impl BroadcastClient {
    pub fn new(node: Arc<dyn NodeClient>, mode: BroadcastMode, retry: RetryConfig) -> Self {
        Self { node, mode, retry }
    }

    pub fn mode(&self) -> BroadcastMode {
        self.mode
    }

    /// 广播已签名交易并结算序列号租约
    pub async fn broadcast(
        &self,
        tx: &SignedTransaction,
        mut lease: SequenceLease,
    ) -> ClientResult<BroadcastResult> {
        let sequence = tx.sequence();
        if lease.state() != sequence {
            let leased = lease.state().sequence;
            lease.release();
            return Err(ClientError::Assembly(format!(
                "transaction was built for sequence {} but the lease holds {}",
                sequence.sequence, leased
            )));
        }

        let submission_id = Uuid::new_v4();
        let mut backoff = self.retry.backoff();
        let mut attempt = 0u32;
        // 之前的某次尝试可能已经到达节点
        let mut ambiguous = false;
        let mut state = SubmissionState::Built;

        loop {
            attempt += 1;
            lease.mark_sent();
            state = advance_state(submission_id, state, SubmissionState::Sent);

            tracing::info!(
                submission_id = %submission_id,
                address = %lease.address(),
                sequence = sequence.sequence,
                tx_hash = %tx.hash(),
                attempt,
                max_attempts = self.retry.max_attempts,
                mode = %self.mode,
                "Broadcasting transaction"
            );

            let verdict = match self.node.broadcast_tx(tx.tx_bytes(), self.mode).await {
                Ok(resp) => classify_response(resp),
                Err(e) => {
                    if e.is_ambiguous() {
                        ambiguous = true;
                    }
                    classify_node_error(e)
                }
            };

            match verdict {
                Verdict::Confirmed(resp) => {
                    advance_state(submission_id, state, SubmissionState::Confirmed);
                    return Ok(self.confirm(tx, lease, resp, attempt, submission_id));
                }
                Verdict::SequenceMismatch { expected } => {
                    lease.invalidate();
                    if ambiguous {
                        advance_state(submission_id, state, SubmissionState::TransientFailure);
                        return Err(ClientError::transient(
                            attempt,
                            "sequence mismatch after an attempt with unknown outcome; \
                             the transaction may already be on chain",
                        ));
                    }
                    advance_state(submission_id, state, SubmissionState::Rejected);
                    tracing::warn!(
                        submission_id = %submission_id,
                        used = sequence.sequence,
                        expected = ?expected,
                        "Account sequence mismatch, cache invalidated"
                    );
                    return Err(ClientError::SequenceMismatch {
                        address: tx.signer().to_string(),
                        used: sequence.sequence,
                        expected,
                    });
                }
                Verdict::Rejected(error) => {
                    advance_state(submission_id, state, SubmissionState::Rejected);
                    if ambiguous {
                        lease.invalidate();
                    } else {
                        lease.release();
                    }
                    tracing::warn!(
                        submission_id = %submission_id,
                        tx_hash = %tx.hash(),
                        error = %error,
                        "Transaction rejected"
                    );
                    return Err(error);
                }
                Verdict::Retry(message) => {
                    state = advance_state(submission_id, state, SubmissionState::TransientFailure);

                    if !self.retry.can_retry(attempt) {
                        if ambiguous {
                            lease.invalidate();
                        } else {
                            lease.release();
                        }
                        tracing::error!(
                            submission_id = %submission_id,
                            tx_hash = %tx.hash(),
                            attempts = attempt,
                            error = %message,
                            "Transaction broadcast failed after all retries"
                        );
                        return Err(ClientError::transient(attempt, message));
                    }

                    let delay = backoff.next_delay();
                    tracing::warn!(
                        submission_id = %submission_id,
                        attempt,
                        error = %message,
                        next_retry_in_ms = delay.as_millis() as u64,
                        "Transaction broadcast failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn confirm(
        &self,
        tx: &SignedTransaction,
        lease: SequenceLease,
        resp: TxResponse,
        attempts: u32,
        submission_id: Uuid,
    ) -> BroadcastResult {
        let sequence = lease.state().sequence;

        if self.mode == BroadcastMode::Async {
            lease.invalidate();
        } else if tx.consumes_sequence() {
            lease.advance();
        } else {
            lease.release();
        }

        let tx_hash = if resp.txhash.is_empty() {
            tx.hash().to_string()
        } else {
            resp.txhash
        };

        tracing::info!(
            submission_id = %submission_id,
            tx_hash = %tx_hash,
            code = resp.code,
            height = resp.height,
            attempts,
            "Transaction accepted"
        );

        BroadcastResult {
            submission_id,
            tx_hash,
            code: resp.code,
            codespace: resp.codespace,
            height: resp.height,
            raw_log: resp.raw_log,
            gas_wanted: resp.gas_wanted,
            gas_used: resp.gas_used,
            sequence,
            mode: self.mode,
            attempts,
            raw: resp.raw,
        }
    }
}

fn advance_state(
    submission_id: Uuid,
    from: SubmissionState,
    to: SubmissionState,
) -> SubmissionState {
    tracing::debug!(submission_id = %submission_id, from = ?from, to = ?to, "Submission state");
    to
}
