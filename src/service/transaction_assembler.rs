//! 交易组装
//!
//! 消息 + 手续费 + 序列状态 → 规范 protobuf 编码的 `TxBody` / `AuthInfo`。
//! 未指定手续费时通过一次模拟估算 gas。

use std::sync::Arc;

use prost::Message as _;
use rust_decimal::{prelude::ToPrimitive, Decimal};

use crate::{
    config::{Config, GasConfig, TxConfig},
    domain::{Fee, SequenceState},
    error::{is_sequence_mismatch, parse_expected_sequence, ClientError, ClientResult},
    proto::{
        cosmos::{
            mode_info, AuthInfo, Coin, Fee as ProtoFee, ModeInfo, PubKey, SignDoc, SignMode,
            SignerInfo, TxBody, TxRaw, SECP256K1_PUBKEY_TYPE_URL,
        },
        Any,
    },
    service::{
        message_builder::Message,
        node_client::{NodeClient, NodeError},
    },
};

/// 待签名交易
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    body_bytes: Vec<u8>,
    auth_info_bytes: Vec<u8>,
    chain_id: String,
    sequence: SequenceState,
    fee: Fee,
    public_key: Vec<u8>,
    signer: String,
    message_types: Vec<&'static str>,
    consumes_sequence: bool,
}

impl UnsignedTransaction {
    pub fn body_bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    pub fn auth_info_bytes(&self) -> &[u8] {
        &self.auth_info_bytes
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn sequence(&self) -> SequenceState {
        self.sequence
    }

    pub fn fee(&self) -> &Fee {
        &self.fee
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// 签名者地址（bech32）
    pub fn signer(&self) -> &str {
        &self.signer
    }

    pub fn message_types(&self) -> &[&'static str] {
        &self.message_types
    }

    /// 被接受后是否消耗账户序列号（仅含短期订单的交易不消耗）
    pub fn consumes_sequence(&self) -> bool {
        self.consumes_sequence
    }

    pub fn sign_doc(&self) -> SignDoc {
        SignDoc {
            body_bytes: self.body_bytes.clone(),
            auth_info_bytes: self.auth_info_bytes.clone(),
            chain_id: self.chain_id.clone(),
            account_number: self.sequence.account_number,
        }
    }

    /// SIGN_MODE_DIRECT 签名字节
    pub fn sign_bytes(&self) -> Vec<u8> {
        self.sign_doc().encode_to_vec()
    }
}

/// 交易组装器
pub struct TransactionAssembler {
    node: Arc<dyn NodeClient>,
    chain_id: String,
    fee_denom: String,
    gas: GasConfig,
    tx: TxConfig,
}

impl TransactionAssembler {
    pub fn new(
        node: Arc<dyn NodeClient>,
        chain_id: impl Into<String>,
        fee_denom: impl Into<String>,
        gas: GasConfig,
        tx: TxConfig,
    ) -> Self {
        Self {
            node,
            chain_id: chain_id.into(),
            fee_denom: fee_denom.into(),
            gas,
            tx,
        }
    }

    pub fn from_config(config: &Config, node: Arc<dyn NodeClient>) -> Self {
        Self::new(
            node,
            config.network.chain_id.clone(),
            config.network.fee_denom.clone(),
            config.gas.clone(),
            config.tx.clone(),
        )
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// 组装待签名交易
    ///
    /// `fee` 为 `None` 时恰好调用一次节点模拟。
    pub async fn assemble(
        &self,
        messages: &[Message],
        fee: Option<Fee>,
        public_key: &[u8],
        sequence: SequenceState,
    ) -> ClientResult<UnsignedTransaction> {
        if messages.is_empty() {
            return Err(ClientError::Assembly(
                "transaction must contain at least one message".to_string(),
            ));
        }

        let signer = messages[0].signer().to_string();
        let body_bytes = self.encode_body(messages);

        let fee = match fee {
            Some(fee) => fee,
            None => {
                self.estimate_fee(&body_bytes, public_key, sequence, &signer)
                    .await?
            }
        };

        let auth_info_bytes = encode_auth_info(public_key, sequence.sequence, &fee);

        tracing::debug!(
            signer = %signer,
            sequence = sequence.sequence,
            gas_limit = fee.gas_limit,
            fee_amount = %fee.amount,
            messages = messages.len(),
            "Transaction assembled"
        );

        Ok(UnsignedTransaction {
            body_bytes,
            auth_info_bytes,
            chain_id: self.chain_id.clone(),
            sequence,
            fee,
            public_key: public_key.to_vec(),
            signer,
            message_types: messages.iter().map(Message::type_url).collect(),
            consumes_sequence: !messages.iter().all(Message::is_short_term_order),
        })
    }

    fn encode_body(&self, messages: &[Message]) -> Vec<u8> {
        TxBody {
            messages: messages.iter().map(Message::to_any).collect(),
            memo: self.tx.memo.clone(),
            timeout_height: self.tx.timeout_height,
        }
        .encode_to_vec()
    }

    async fn estimate_fee(
        &self,
        body_bytes: &[u8],
        public_key: &[u8],
        sequence: SequenceState,
        signer: &str,
    ) -> ClientResult<Fee> {
        // 模拟时签名为空，节点不校验签名
        let placeholder_fee = Fee::new(0, self.fee_denom.clone(), 0);
        let tx_bytes = TxRaw {
            body_bytes: body_bytes.to_vec(),
            auth_info_bytes: encode_auth_info(public_key, sequence.sequence, &placeholder_fee),
            signatures: vec![Vec::new()],
        }
        .encode_to_vec();

        let gas_used = self
            .node
            .simulate(&tx_bytes)
            .await
            .map_err(|e| classify_simulation_error(e, signer, sequence.sequence))?;

        let fee = self.fee_for_gas(gas_used)?;
        tracing::debug!(
            gas_used,
            gas_limit = fee.gas_limit,
            fee_amount = %fee.amount,
            denom = %fee.denom,
            "Fee estimated from simulation"
        );
        Ok(fee)
    }

    /// gas_limit = ceil(gas_used × multiplier)，amount = ceil(gas_limit × gas_price)
    pub fn fee_for_gas(&self, gas_used: u64) -> ClientResult<Fee> {
        let overflow = || ClientError::Assembly(format!("fee overflow for gas {}", gas_used));

        let gas_limit = Decimal::from(gas_used)
            .checked_mul(self.gas.gas_multiplier)
            .ok_or_else(overflow)?
            .ceil()
            .to_u64()
            .ok_or_else(overflow)?;

        let amount = Decimal::from(gas_limit)
            .checked_mul(self.gas.gas_price)
            .ok_or_else(overflow)?
            .ceil()
            .to_u128()
            .ok_or_else(overflow)?;

        Ok(Fee::new(amount, self.fee_denom.clone(), gas_limit))
    }
}

fn classify_simulation_error(error: NodeError, signer: &str, used: u64) -> ClientError {
    let message = match &error {
        NodeError::Abci { message, .. } => message.clone(),
        NodeError::Http { body, .. } => body.clone(),
        other => other.to_string(),
    };

    let (codespace, code) = match &error {
        NodeError::Abci {
            codespace, code, ..
        } => (codespace.as_str(), *code),
        _ => ("", 0),
    };

    if is_sequence_mismatch(codespace, code, &message) {
        return ClientError::SequenceMismatch {
            address: signer.to_string(),
            used,
            expected: parse_expected_sequence(&message),
        };
    }

    tracing::warn!(signer = %signer, error = %error, "Transaction simulation failed");
    ClientError::Assembly(format!("fee estimation failed: {}", error))
}

/// 单签名者 `AuthInfo` 编码（SIGN_MODE_DIRECT）
fn encode_auth_info(public_key: &[u8], sequence: u64, fee: &Fee) -> Vec<u8> {
    let public_key = Any {
        type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
        value: PubKey {
            key: public_key.to_vec(),
        }
        .encode_to_vec(),
    };

    // 金额为 0 时不写入 coin
    let amount = if fee.amount == 0 {
        Vec::new()
    } else {
        vec![Coin {
            denom: fee.denom.clone(),
            amount: fee.amount.to_string(),
        }]
    };

    AuthInfo {
        signer_infos: vec![SignerInfo {
            public_key: Some(public_key),
            mode_info: Some(ModeInfo {
                sum: Some(mode_info::Sum::Single(mode_info::Single {
                    mode: SignMode::Direct as i32,
                })),
            }),
            sequence,
        }],
        fee: Some(ProtoFee {
            amount,
            gas_limit: fee.gas_limit,
            payer: String::new(),
            granter: String::new(),
        }),
    }
    .encode_to_vec()
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        domain::{Address, SubaccountRef},
        service::{
            message_builder,
            node_client::{BroadcastMode, TxResponse},
        },
    };

    struct SimulationNode {
        result: Mutex<Result<u64, NodeError>>,
        calls: AtomicU32,
    }

    impl SimulationNode {
        fn new(result: Result<u64, NodeError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(result),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl NodeClient for SimulationNode {
        async fn query_account(&self, _address: &Address) -> Result<SequenceState, NodeError> {
            unreachable!("assembler never queries accounts")
        }

        async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, NodeError> {
            let tx = TxRaw::decode(tx_bytes).expect("simulation gets a TxRaw");
            assert_eq!(tx.signatures, vec![Vec::<u8>::new()]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.lock().unwrap().clone()
        }

        async fn broadcast_tx(
            &self,
            _tx_bytes: &[u8],
            _mode: BroadcastMode,
        ) -> Result<TxResponse, NodeError> {
            unreachable!("assembler never broadcasts")
        }
    }

    fn gas(multiplier: Decimal, price: Decimal) -> GasConfig {
        GasConfig {
            gas_multiplier: multiplier,
            gas_price: price,
        }
    }

    fn make_assembler(node: Arc<SimulationNode>, gas: GasConfig) -> TransactionAssembler {
        TransactionAssembler::new(node, "dydx-testnet-4", "adv4tnt", gas, TxConfig::default())
    }

    fn withdraw_message() -> Message {
        let owner = Address::from_bytes([3u8; 20], "dydx").unwrap();
        message_builder::withdraw(&SubaccountRef::new(owner.clone(), 0), &owner, 0, 10_000_000)
            .unwrap()
    }

    const PUBLIC_KEY: [u8; 33] = [2u8; 33];

    #[tokio::test]
    async fn test_empty_messages_rejected() {
        let node = SimulationNode::new(Ok(1));
        let assembler = make_assembler(node.clone(), gas(Decimal::ONE, Decimal::ONE));

        let err = assembler
            .assemble(&[], None, &PUBLIC_KEY, SequenceState::new(1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Assembly(_)));
        assert_eq!(node.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_fee_skips_simulation() {
        let node = SimulationNode::new(Ok(1));
        let assembler = make_assembler(node.clone(), gas(Decimal::ONE, Decimal::ONE));
        let fee = Fee::new(5_000, "adv4tnt", 200_000);

        let tx = assembler
            .assemble(
                &[withdraw_message()],
                Some(fee.clone()),
                &PUBLIC_KEY,
                SequenceState::new(7, 5),
            )
            .await
            .unwrap();

        assert_eq!(node.calls.load(Ordering::SeqCst), 0);
        assert_eq!(tx.fee(), &fee);
        assert!(tx.consumes_sequence());

        let auth_info = AuthInfo::decode(tx.auth_info_bytes()).unwrap();
        assert_eq!(auth_info.signer_infos[0].sequence, 5);
        let proto_fee = auth_info.fee.unwrap();
        assert_eq!(proto_fee.gas_limit, 200_000);
        assert_eq!(proto_fee.amount[0].amount, "5000");

        let body = TxBody::decode(tx.body_bytes()).unwrap();
        assert_eq!(body.messages.len(), 1);
        assert_eq!(
            body.messages[0].type_url,
            "/dydxprotocol.sending.MsgWithdrawFromSubaccount"
        );

        let sign_doc = SignDoc::decode(tx.sign_bytes().as_slice()).unwrap();
        assert_eq!(sign_doc.account_number, 7);
        assert_eq!(sign_doc.chain_id, "dydx-testnet-4");
    }

    #[tokio::test]
    async fn test_fee_estimated_with_one_simulation() {
        let node = SimulationNode::new(Ok(100_000));
        let assembler = make_assembler(node.clone(), gas(Decimal::new(15, 1), Decimal::from(25)));

        let tx = assembler
            .assemble(&[withdraw_message()], None, &PUBLIC_KEY, SequenceState::new(7, 5))
            .await
            .unwrap();

        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tx.fee().gas_limit, 150_000);
        assert_eq!(tx.fee().amount, 3_750_000);
        assert_eq!(tx.fee().denom, "adv4tnt");
    }

    #[test]
    fn test_fee_rounds_up() {
        let node = SimulationNode::new(Ok(0));
        let assembler = make_assembler(node, gas(Decimal::new(14, 1), Decimal::new(25, 1)));

        // 333 × 1.4 = 466.2 → 467；467 × 2.5 = 1167.5 → 1168
        let fee = assembler.fee_for_gas(333).unwrap();
        assert_eq!(fee.gas_limit, 467);
        assert_eq!(fee.amount, 1168);
    }

    #[test]
    fn test_zero_fee_has_no_coins() {
        let auth_info = AuthInfo::decode(
            encode_auth_info(&PUBLIC_KEY, 0, &Fee::new(0, "adv4tnt", 100)).as_slice(),
        )
        .unwrap();
        let fee = auth_info.fee.unwrap();
        assert!(fee.amount.is_empty());
        assert_eq!(fee.gas_limit, 100);
    }

    #[tokio::test]
    async fn test_simulation_errors_are_classified() {
        let node = SimulationNode::new(Err(NodeError::Abci {
            code: 2,
            codespace: "grpc".into(),
            message: "account sequence mismatch, expected 6, got 5: incorrect account sequence"
                .into(),
        }));
        let assembler = make_assembler(node, gas(Decimal::ONE, Decimal::ONE));
        let err = assembler
            .assemble(&[withdraw_message()], None, &PUBLIC_KEY, SequenceState::new(7, 5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::SequenceMismatch {
                address: withdraw_message().signer().to_string(),
                used: 5,
                expected: Some(6),
            }
        );

        let node = SimulationNode::new(Err(NodeError::Unreachable("refused".into())));
        let assembler = make_assembler(node, gas(Decimal::ONE, Decimal::ONE));
        let err = assembler
            .assemble(&[withdraw_message()], None, &PUBLIC_KEY, SequenceState::new(7, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Assembly(_)));
    }

    #[tokio::test]
    async fn test_encoding_is_deterministic() {
        let node = SimulationNode::new(Ok(1));
        let assembler = make_assembler(node, gas(Decimal::ONE, Decimal::ONE));
        let fee = Some(Fee::new(1, "adv4tnt", 1));

        let a = assembler
            .assemble(&[withdraw_message()], fee.clone(), &PUBLIC_KEY, SequenceState::new(1, 2))
            .await
            .unwrap();
        let b = assembler
            .assemble(&[withdraw_message()], fee, &PUBLIC_KEY, SequenceState::new(1, 2))
            .await
            .unwrap();
        assert_eq!(a.sign_bytes(), b.sign_bytes());
    }
}
