pub mod broadcast_client;
pub mod message_builder;
pub mod node_client;
pub mod sequence_cache;
pub mod signer;
pub mod transaction_assembler;
pub mod transaction_retry;
pub mod validator_client;

pub use broadcast_client::{BroadcastClient, BroadcastResult};
pub use message_builder::{GoodTil, Message, OrderCondition, OrderParams, OrderRef, USDC_ASSET_ID};
pub use node_client::{BroadcastMode, NodeClient, NodeError, RestNodeClient, TxResponse};
pub use sequence_cache::{AccountSequenceCache, SequenceLease};
pub use signer::{SignedTransaction, Signer};
pub use transaction_assembler::{TransactionAssembler, UnsignedTransaction};
pub use transaction_retry::RetryConfig;
pub use validator_client::ValidatorClient;
