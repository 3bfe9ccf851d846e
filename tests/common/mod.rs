//! 测试辅助模块
//! 提供内存中的模拟节点和测试配置

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use prost::Message as _;
use rust_decimal::Decimal;
use v4_client::{
    config::{
        BroadcastConfig, Config, GasConfig, LoggingConfig, NetworkConfig, SequenceConfig,
        TxConfig, WalletConfig,
    },
    domain::{verify_signature, Address, SequenceState, Wallet, DEFAULT_HD_PATH},
    proto::{
        cosmos::{AuthInfo, PubKey, SignDoc, TxBody, TxRaw},
        dydx::{
            MsgCancelOrder, MsgPlaceOrder, MSG_CANCEL_ORDER_TYPE_URL, MSG_PLACE_ORDER_TYPE_URL,
            ORDER_FLAGS_SHORT_TERM,
        },
    },
    service::{
        signer::tx_hash, BroadcastMode, NodeClient, NodeError, TxResponse, ValidatorClient,
    },
};

pub const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const SECOND_MNEMONIC: &str =
    "legal winner thank year wave sausage worth useful legal winner thank yellow";
pub const CHAIN_ID: &str = "dydx-testnet-4";
pub const FEE_DENOM: &str = "adv4tnt";

pub fn test_wallet() -> Wallet {
    Wallet::from_mnemonic(TEST_MNEMONIC, "dydx").expect("test mnemonic is valid")
}

pub fn second_wallet() -> Wallet {
    Wallet::from_mnemonic(SECOND_MNEMONIC, "dydx").expect("test mnemonic is valid")
}

/// 不读环境变量的测试配置；退避时间极短
pub fn test_config() -> Config {
    Config {
        network: NetworkConfig {
            name: "local".into(),
            chain_id: CHAIN_ID.into(),
            rest_endpoint: "http://localhost:1317".into(),
            fee_denom: FEE_DENOM.into(),
            request_timeout_secs: 5,
        },
        wallet: WalletConfig {
            address_prefix: "dydx".into(),
            hd_path: DEFAULT_HD_PATH.into(),
        },
        gas: GasConfig {
            gas_multiplier: Decimal::new(15, 1),
            gas_price: Decimal::from(25),
        },
        tx: TxConfig::default(),
        broadcast: BroadcastConfig {
            mode: BroadcastMode::Sync,
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 4,
        },
        sequence: SequenceConfig {
            cache_ttl_secs: 300,
            max_sequence_rebuilds: 1,
        },
        logging: LoggingConfig {
            level: "debug".into(),
            format: "text".into(),
        },
    }
}

pub fn client_for(node: &Arc<MockChain>) -> ValidatorClient {
    client_with(test_config(), node)
}

pub fn client_with(config: Config, node: &Arc<MockChain>) -> ValidatorClient {
    ValidatorClient::new(&config, node.clone())
}

/// 广播脚本中的一步
#[derive(Debug, Clone)]
pub enum BroadcastStep {
    /// 按链规则执行
    Execute,
    /// 不执行，直接返回该应答
    Respond(TxResponse),
    /// 不执行，返回该错误
    Fail(NodeError),
    /// 执行（交易上链）但客户端收到错误，模拟超时
    ExecuteThenFail(NodeError),
}

/// 内存中的模拟链
///
/// 校验签名与序列号，接受后递增序列号；仅含短期订单的交易不消耗序列号。
pub struct MockChain {
    chain_id: String,
    accounts: Mutex<HashMap<String, SequenceState>>,
    gas_used: Mutex<Result<u64, NodeError>>,
    script: Mutex<VecDeque<BroadcastStep>>,
    query_failures: Mutex<VecDeque<NodeError>>,
    broadcast_delay: Mutex<Duration>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
    pub account_queries: AtomicU32,
    pub simulations: AtomicU32,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chain_id: CHAIN_ID.into(),
            accounts: Mutex::new(HashMap::new()),
            gas_used: Mutex::new(Ok(100_000)),
            script: Mutex::new(VecDeque::new()),
            query_failures: Mutex::new(VecDeque::new()),
            broadcast_delay: Mutex::new(Duration::ZERO),
            broadcasts: Mutex::new(Vec::new()),
            account_queries: AtomicU32::new(0),
            simulations: AtomicU32::new(0),
        })
    }

    pub fn with_account(self: Arc<Self>, address: &Address, state: SequenceState) -> Arc<Self> {
        self.set_account(address, state);
        self
    }

    pub fn set_account(&self, address: &Address, state: SequenceState) {
        self.accounts
            .lock()
            .unwrap()
            .insert(address.to_string(), state);
    }

    pub fn account(&self, address: &Address) -> Option<SequenceState> {
        self.accounts.lock().unwrap().get(address.as_str()).copied()
    }

    pub fn set_gas_used(&self, result: Result<u64, NodeError>) {
        *self.gas_used.lock().unwrap() = result;
    }

    pub fn set_broadcast_delay(&self, delay: Duration) {
        *self.broadcast_delay.lock().unwrap() = delay;
    }

    pub fn push_step(&self, step: BroadcastStep) {
        self.script.lock().unwrap().push_back(step);
    }

    /// 下一次账户查询返回该错误
    pub fn push_query_failure(&self, error: NodeError) {
        self.query_failures.lock().unwrap().push_back(error);
    }

    pub fn queries(&self) -> u32 {
        self.account_queries.load(Ordering::SeqCst)
    }

    pub fn simulation_count(&self) -> u32 {
        self.simulations.load(Ordering::SeqCst)
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }

    /// 每次广播（包括重试）使用的序列号
    pub fn broadcast_sequences(&self) -> Vec<u64> {
        self.broadcasts
            .lock()
            .unwrap()
            .iter()
            .map(|tx| decode_tx(tx).2.signer_infos[0].sequence)
            .collect()
    }

    pub fn broadcast_txs(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().unwrap().clone()
    }

    fn signer_address(auth_info: &AuthInfo) -> Address {
        let any = auth_info.signer_infos[0]
            .public_key
            .as_ref()
            .expect("signer public key");
        let key = PubKey::decode(any.value.as_slice()).expect("secp256k1 pubkey").key;
        Address::from_public_key(&key, "dydx").expect("33-byte key")
    }

    /// 检查序列号；`commit` 时执行交易
    fn check_tx(&self, tx_bytes: &[u8], commit: bool) -> Result<(), (u32, String)> {
        let (raw, body, auth_info) = decode_tx(tx_bytes);
        let signer = &auth_info.signer_infos[0];
        let address = Self::signer_address(&auth_info);

        let mut accounts = self.accounts.lock().unwrap();
        let Some(state) = accounts.get_mut(address.as_str()) else {
            return Err((9, format!("account {} not found: unknown address", address)));
        };

        if commit {
            let sign_doc = SignDoc {
                body_bytes: raw.body_bytes.clone(),
                auth_info_bytes: raw.auth_info_bytes.clone(),
                chain_id: self.chain_id.clone(),
                account_number: state.account_number,
            };
            let key = PubKey::decode(signer.public_key.as_ref().unwrap().value.as_slice())
                .unwrap()
                .key;
            if !verify_signature(&key, &sign_doc.encode_to_vec(), &raw.signatures[0]) {
                return Err((4, "signature verification failed: unauthorized".into()));
            }
        }

        if consumes_sequence(&body) {
            if signer.sequence != state.sequence {
                return Err((
                    32,
                    format!(
                        "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                        state.sequence, signer.sequence
                    ),
                ));
            }
            if commit {
                state.sequence += 1;
            }
        }

        Ok(())
    }

    fn execute(&self, tx_bytes: &[u8]) -> TxResponse {
        let hash = tx_hash(tx_bytes);
        match self.check_tx(tx_bytes, true) {
            Ok(()) => TxResponse::accepted(hash),
            Err((code, log)) => TxResponse::with_code(hash, code, "sdk", log),
        }
    }
}

fn decode_tx(tx_bytes: &[u8]) -> (TxRaw, TxBody, AuthInfo) {
    let raw = TxRaw::decode(tx_bytes).expect("TxRaw");
    let body = TxBody::decode(raw.body_bytes.as_slice()).expect("TxBody");
    let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice()).expect("AuthInfo");
    (raw, body, auth_info)
}

fn consumes_sequence(body: &TxBody) -> bool {
    !body.messages.iter().all(|any| {
        let flags = match any.type_url.as_str() {
            MSG_PLACE_ORDER_TYPE_URL => MsgPlaceOrder::decode(any.value.as_slice())
                .ok()
                .and_then(|m| m.order)
                .and_then(|o| o.order_id)
                .map(|id| id.order_flags),
            MSG_CANCEL_ORDER_TYPE_URL => MsgCancelOrder::decode(any.value.as_slice())
                .ok()
                .and_then(|m| m.order_id)
                .map(|id| id.order_flags),
            _ => None,
        };
        flags == Some(ORDER_FLAGS_SHORT_TERM)
    })
}

#[async_trait]
impl NodeClient for MockChain {
    async fn query_account(&self, address: &Address) -> Result<SequenceState, NodeError> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.query_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.account(address)
            .ok_or_else(|| NodeError::AccountNotFound(address.to_string()))
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, NodeError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        if let Err((code, log)) = self.check_tx(tx_bytes, false) {
            return Err(NodeError::Abci {
                code: 2,
                codespace: "grpc".into(),
                message: format!("{} (sdk code {})", log, code),
            });
        }
        self.gas_used.lock().unwrap().clone()
    }

    async fn broadcast_tx(
        &self,
        tx_bytes: &[u8],
        _mode: BroadcastMode,
    ) -> Result<TxResponse, NodeError> {
        let delay = *self.broadcast_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.broadcasts.lock().unwrap().push(tx_bytes.to_vec());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BroadcastStep::Execute);

        match step {
            BroadcastStep::Execute => Ok(self.execute(tx_bytes)),
            BroadcastStep::Respond(resp) => Ok(resp),
            BroadcastStep::Fail(e) => Err(e),
            BroadcastStep::ExecuteThenFail(e) => {
                self.execute(tx_bytes);
                Err(e)
            }
        }
    }
}
