use jsonrpc_core::Result;
use jsonrpc_derive::rpc;
use solana_client::{
    rpc_config::RpcContextConfig,
    rpc_custom_error::RpcCustomError,
    rpc_response::{RpcIdentity, RpcResponseContext},
};
use solana_clock::Slot;
use solana_epoch_info::EpochInfo;
use solana_rpc_client_api::response::Response as RpcResponse;

use super::RunloopContext;
use crate::{
    SOLFORGE_IDENTITY_PUBKEY,
    error::SolforgeError,
    rpc::{State, utils::verify_pubkey},
};

const SOLFORGE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Protocol version reported to clients that gate features on it.
pub const SOLANA_CORE_VERSION: &str = "3.0.0";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SolforgeRpcVersionInfo {
    /// The current version of solforge
    pub solforge_version: String,
    /// The protocol version solforge mirrors
    pub solana_core: String,
    /// first 4 bytes of the FeatureSet identifier
    pub feature_set: Option<u32>,
}

#[rpc]
pub trait Minimal {
    type Metadata;

    /// Returns the balance (in lamports) of the account at the provided public key.
    ///
    /// Unknown accounts report a balance of `0`.
    ///
    /// ## Example Request
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "id": 1,
    ///   "method": "getBalance",
    ///   "params": ["4Nd1mXUmh23rQk8VN7wM9hEnfxqrrB1yrn11eW9gMoVr"]
    /// }
    /// ```
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": { "context": { "slot": 1085597 }, "value": 20392800 },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "getBalance")]
    fn get_balance(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<u64>>;

    /// Returns information about the current epoch, derived from the local clock.
    #[rpc(meta, name = "getEpochInfo")]
    fn get_epoch_info(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<EpochInfo>;

    /// Returns the blockhash the node started with.
    #[rpc(meta, name = "getGenesisHash")]
    fn get_genesis_hash(&self, meta: Self::Metadata) -> Result<String>;

    /// Always `"ok"` while the node is serving.
    #[rpc(meta, name = "getHealth")]
    fn get_health(&self, meta: Self::Metadata) -> Result<String>;

    #[rpc(meta, name = "getIdentity")]
    fn get_identity(&self, meta: Self::Metadata) -> Result<RpcIdentity>;

    /// Returns the current slot.
    ///
    /// The local clock has no forks, so every commitment level reports the
    /// same slot. `minContextSlot` is honoured.
    #[rpc(meta, name = "getSlot")]
    fn get_slot(&self, meta: Self::Metadata, config: Option<RpcContextConfig>) -> Result<Slot>;

    #[rpc(meta, name = "getBlockHeight")]
    fn get_block_height(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<u64>;

    /// Returns the number of transactions accepted since genesis, including
    /// the ones found in the index at startup.
    #[rpc(meta, name = "getTransactionCount")]
    fn get_transaction_count(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<u64>;

    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": { "solforge-version": "0.3.0", "solana-core": "3.0.0", "feature-set": 0 },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "getVersion")]
    fn get_version(&self, meta: Self::Metadata) -> Result<SolforgeRpcVersionInfo>;

    /// Lowest slot with a recorded block, `0` on an empty index.
    #[rpc(meta, name = "getFirstAvailableBlock")]
    fn get_first_available_block(&self, meta: Self::Metadata) -> Result<Slot>;

    #[rpc(meta, name = "minimumLedgerSlot")]
    fn minimum_ledger_slot(&self, meta: Self::Metadata) -> Result<Slot>;
}

pub(super) fn check_min_context_slot(slot: Slot, config: &Option<RpcContextConfig>) -> Result<()> {
    if let Some(min_context_slot) = config.as_ref().and_then(|c| c.min_context_slot) {
        if slot < min_context_slot {
            return Err(RpcCustomError::MinContextSlotNotReached {
                context_slot: slot,
            }
            .into());
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct SolforgeMinimalRpc;
impl Minimal for SolforgeMinimalRpc {
    type Metadata = Option<RunloopContext>;

    fn get_balance(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<u64>> {
        let pubkey = verify_pubkey(&pubkey_str)?;
        let clock = meta.clock_snapshot()?;
        check_min_context_slot(clock.slot, &config)?;
        let balance = meta.with_state_reader(|state| state.engine.get_balance(&pubkey))?;
        Ok(RpcResponse {
            context: RpcResponseContext::new(clock.slot),
            value: balance,
        })
    }

    fn get_epoch_info(
        &self,
        meta: Self::Metadata,
        _config: Option<RpcContextConfig>,
    ) -> Result<EpochInfo> {
        Ok(meta.clock_snapshot()?.epoch_info())
    }

    fn get_genesis_hash(&self, meta: Self::Metadata) -> Result<String> {
        meta.with_state_reader(|state| state.genesis_hash.to_string())
            .map_err(Into::into)
    }

    fn get_health(&self, _meta: Self::Metadata) -> Result<String> {
        Ok("ok".to_string())
    }

    fn get_identity(&self, _meta: Self::Metadata) -> Result<RpcIdentity> {
        Ok(RpcIdentity {
            identity: SOLFORGE_IDENTITY_PUBKEY.to_string(),
        })
    }

    fn get_slot(&self, meta: Self::Metadata, config: Option<RpcContextConfig>) -> Result<Slot> {
        let slot = meta.clock_snapshot()?.slot;
        check_min_context_slot(slot, &config)?;
        Ok(slot)
    }

    fn get_block_height(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<u64> {
        let clock = meta.clock_snapshot()?;
        check_min_context_slot(clock.slot, &config)?;
        Ok(clock.block_height)
    }

    fn get_transaction_count(
        &self,
        meta: Self::Metadata,
        _config: Option<RpcContextConfig>,
    ) -> Result<u64> {
        Ok(meta.clock_snapshot()?.transaction_count)
    }

    fn get_version(&self, _: Self::Metadata) -> Result<SolforgeRpcVersionInfo> {
        Ok(SolforgeRpcVersionInfo {
            solforge_version: SOLFORGE_VERSION.to_string(),
            solana_core: SOLANA_CORE_VERSION.to_string(),
            feature_set: Some(0),
        })
    }

    fn get_first_available_block(&self, meta: Self::Metadata) -> Result<Slot> {
        let first = meta.with_state_reader(|state| {
            state
                .store
                .get_block_slots(0, None, 1)
                .map_err(SolforgeError::from)
        })??;
        Ok(first.first().copied().unwrap_or_default())
    }

    fn minimum_ledger_slot(&self, meta: Self::Metadata) -> Result<Slot> {
        self.get_first_available_block(meta)
    }
}
