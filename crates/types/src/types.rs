use std::{fmt, path::PathBuf};

use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use solana_clock::Slot;
use solana_transaction_error::TransactionError;

use crate::{
    CONFIRMED_SLOT_DEPTH, DEFAULT_FAUCET_KEYPAIR_PATH, DEFAULT_FAUCET_TARGET_LAMPORTS,
    DEFAULT_MAINNET_RPC_URL, DEFAULT_MAX_AIRDROP_LAMPORTS, DEFAULT_MAX_TOP_UP_ITERATIONS,
    DEFAULT_NETWORK_HOST, DEFAULT_RPC_PORT, DEFAULT_SLOT_TIME_MS, DEFAULT_WS_PORT,
    FINALIZED_SLOT_DEPTH,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionConfirmationStatus {
    Processed,
    Confirmed,
    Finalized,
}

impl TransactionConfirmationStatus {
    /// Derives a confirmation level from how many slots have elapsed since the
    /// transaction landed.
    pub fn from_slot_distance(transaction_slot: Slot, current_slot: Slot) -> Self {
        let depth = current_slot.saturating_sub(transaction_slot);
        if depth >= FINALIZED_SLOT_DEPTH {
            TransactionConfirmationStatus::Finalized
        } else if depth >= CONFIRMED_SLOT_DEPTH {
            TransactionConfirmationStatus::Confirmed
        } else {
            TransactionConfirmationStatus::Processed
        }
    }

    pub fn confirmations(transaction_slot: Slot, current_slot: Slot) -> Option<usize> {
        let depth = current_slot.saturating_sub(transaction_slot);
        if depth >= FINALIZED_SLOT_DEPTH {
            None
        } else {
            Some(depth as usize)
        }
    }
}

/// A captured submission, immutable once recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: Slot,
    pub block_time: Option<i64>,
    pub fee: u64,
    pub err: Option<TransactionError>,
    /// Wire bytes of the versioned transaction, base64 encoded.
    pub raw_transaction: String,
    pub logs: Vec<String>,
    pub inner_instructions: Vec<InnerInstructionGroup>,
    pub compute_units_consumed: Option<u64>,
    pub return_data: Option<ReturnDataRecord>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalanceRecord>,
    pub post_token_balances: Vec<TokenBalanceRecord>,
    pub pre_account_states: Vec<AccountSnapshot>,
    pub post_account_states: Vec<AccountSnapshot>,
    /// Static keys followed by the loaded ones.
    pub account_keys: Vec<AccountRoleRecord>,
    #[serde(default)]
    pub loaded_addresses: LoadedAddressesRecord,
}

impl TransactionRecord {
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }

    pub fn mentions(&self, address: &str) -> bool {
        self.account_keys.iter().any(|k| k.pubkey == address)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerInstructionGroup {
    /// Index of the top-level instruction that issued these calls.
    pub index: u8,
    pub instructions: Vec<InnerInstructionRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerInstructionRecord {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    /// Base-58 instruction data.
    pub data: String,
    pub stack_height: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnDataRecord {
    pub program_id: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceRecord {
    pub account_index: u8,
    pub mint: String,
    pub owner: Option<String>,
    pub program_id: Option<String>,
    /// Raw base-unit amount as a decimal string.
    pub amount: String,
    pub decimals: u8,
}

impl TokenBalanceRecord {
    pub fn zeroed_like(other: &TokenBalanceRecord) -> Self {
        Self {
            amount: "0".to_string(),
            ..other.clone()
        }
    }

    pub fn raw_amount(&self) -> u64 {
        self.amount.parse().unwrap_or(0)
    }
}

/// Keys a v0 message pulled in through address lookup tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedAddressesRecord {
    pub writable: Vec<String>,
    pub readonly: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRoleRecord {
    pub pubkey: String,
    pub signer: bool,
    pub writable: bool,
}

/// Latest known state of an account. Data is only retained for
/// token-program-owned accounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub address: String,
    pub lamports: u64,
    pub owner: String,
    pub executable: bool,
    pub rent_epoch: u64,
    pub space: u64,
    /// Base64 encoded account data.
    pub data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub slot: Slot,
    pub block_height: u64,
    pub block_time: i64,
    pub blockhash: String,
    pub previous_blockhash: String,
    pub parent_slot: Slot,
}

#[derive(Debug)]
pub enum ClockCommand {
    Pause,
    Resume,
    Toggle,
    UpdateSlotInterval(u64),
}

pub enum ClockEvent {
    Tick,
}

#[derive(Debug)]
pub enum NodeCommand {
    UpdateClock(ClockCommand),
    Terminate,
}

#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Node is serving, with the number of transactions found in the index.
    Ready(u64),
    Aborted(String),
    Shutdown,
    FaucetFunded(DateTime<Local>, String, u64),
    SlotAdvanced(Slot),
    TransactionProcessed(DateTime<Local>, String, Option<TransactionError>),
    InfoLog(DateTime<Local>, String),
    ErrorLog(DateTime<Local>, String),
    WarnLog(DateTime<Local>, String),
    DebugLog(DateTime<Local>, String),
}

impl NodeEvent {
    pub fn info<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InfoLog(Local::now(), msg.into())
    }

    pub fn warn<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::WarnLog(Local::now(), msg.into())
    }

    pub fn error<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::ErrorLog(Local::now(), msg.into())
    }

    pub fn debug<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::DebugLog(Local::now(), msg.into())
    }

    pub fn faucet_funded(address: String, lamports: u64) -> Self {
        Self::FaucetFunded(Local::now(), address, lamports)
    }

    pub fn transaction_processed(signature: String, err: Option<TransactionError>) -> Self {
        Self::TransactionProcessed(Local::now(), signature, err)
    }
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEvent::Ready(count) => write!(f, "Node ready ({count} indexed transactions)"),
            NodeEvent::Aborted(reason) => write!(f, "Node aborted: {reason}"),
            NodeEvent::Shutdown => write!(f, "Node shutting down"),
            NodeEvent::FaucetFunded(_, address, lamports) => {
                write!(f, "Faucet {address} holds {lamports} lamports")
            }
            NodeEvent::SlotAdvanced(slot) => write!(f, "Slot {slot}"),
            NodeEvent::TransactionProcessed(_, signature, err) => match err {
                Some(err) => write!(f, "Transaction {signature} failed: {err}"),
                None => write!(f, "Transaction {signature} processed"),
            },
            NodeEvent::InfoLog(_, msg)
            | NodeEvent::ErrorLog(_, msg)
            | NodeEvent::WarnLog(_, msg)
            | NodeEvent::DebugLog(_, msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub ws_port: u16,
}

impl RpcConfig {
    pub fn get_rpc_base_url(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
    pub fn get_ws_base_url(&self) -> String {
        format!("{}:{}", self.bind_host, self.ws_port)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_NETWORK_HOST.to_string(),
            bind_port: DEFAULT_RPC_PORT,
            ws_port: DEFAULT_WS_PORT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaucetConfig {
    pub keypair_path: PathBuf,
    pub target_lamports: u64,
    /// Largest credit the engine accepts in a single funding call.
    pub max_airdrop_lamports: u64,
    pub max_top_up_iterations: usize,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            keypair_path: PathBuf::from(DEFAULT_FAUCET_KEYPAIR_PATH),
            target_lamports: DEFAULT_FAUCET_TARGET_LAMPORTS,
            max_airdrop_lamports: DEFAULT_MAX_AIRDROP_LAMPORTS,
            max_top_up_iterations: DEFAULT_MAX_TOP_UP_ITERATIONS,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// `None` keeps the index in an isolated in-memory database.
    pub db_path: Option<String>,
}

impl StoreConfig {
    pub fn is_persistent(&self) -> bool {
        self.db_path.as_deref().is_some_and(|p| p != ":memory:")
    }

    pub fn database_url(&self) -> &str {
        self.db_path.as_deref().unwrap_or(":memory:")
    }
}

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub rpc: RpcConfig,
    pub faucet: FaucetConfig,
    pub store: StoreConfig,
    pub slot_time_ms: u64,
    pub remote_rpc_url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            faucet: FaucetConfig::default(),
            store: StoreConfig::default(),
            slot_time_ms: DEFAULT_SLOT_TIME_MS,
            remote_rpc_url: DEFAULT_MAINNET_RPC_URL.to_string(),
        }
    }
}

pub type NodeEventSender = Sender<NodeEvent>;
