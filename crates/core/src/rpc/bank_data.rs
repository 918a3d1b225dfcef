use jsonrpc_core::Result;
use jsonrpc_derive::rpc;
use solana_client::{rpc_config::RpcContextConfig, rpc_custom_error::RpcCustomError};
use solana_clock::Slot;
use solana_commitment_config::CommitmentConfig;
use solana_epoch_schedule::EpochSchedule;
use solforge_types::SLOTS_PER_EPOCH;

use super::{RunloopContext, State};
use crate::SOLFORGE_IDENTITY_PUBKEY;

const MAX_SLOT_LEADERS_LIMIT: u64 = 5000;

#[rpc]
pub trait BankData {
    type Metadata;

    /// Returns the minimum balance required for rent exemption based on the given data length.
    ///
    /// ## Example Request
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "id": 1,
    ///   "method": "getMinimumBalanceForRentExemption",
    ///   "params": [50]
    /// }
    /// ```
    ///
    /// ## Example Response
    /// ```json
    /// { "jsonrpc": "2.0", "result": 1238880, "id": 1 }
    /// ```
    #[rpc(meta, name = "getMinimumBalanceForRentExemption")]
    fn get_minimum_balance_for_rent_exemption(
        &self,
        meta: Self::Metadata,
        data_len: usize,
        commitment: Option<CommitmentConfig>,
    ) -> Result<u64>;

    /// Returns the epoch schedule. Epochs have a fixed length and no warmup.
    #[rpc(meta, name = "getEpochSchedule")]
    fn get_epoch_schedule(&self, meta: Self::Metadata) -> Result<EpochSchedule>;

    /// The node is the only leader, so this is always its identity.
    #[rpc(meta, name = "getSlotLeader")]
    fn get_slot_leader(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<String>;

    /// Returns `limit` copies of the node identity, one per slot from
    /// `start_slot`.
    #[rpc(meta, name = "getSlotLeaders")]
    fn get_slot_leaders(
        &self,
        meta: Self::Metadata,
        start_slot: Slot,
        limit: u64,
    ) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct SolforgeBankDataRpc;
impl BankData for SolforgeBankDataRpc {
    type Metadata = Option<RunloopContext>;

    fn get_minimum_balance_for_rent_exemption(
        &self,
        meta: Self::Metadata,
        data_len: usize,
        _commitment: Option<CommitmentConfig>,
    ) -> Result<u64> {
        meta.with_state_reader(move |state| state.engine.minimum_balance_for_rent_exemption(data_len))
            .map_err(Into::into)
    }

    fn get_epoch_schedule(&self, _meta: Self::Metadata) -> Result<EpochSchedule> {
        Ok(EpochSchedule::custom(SLOTS_PER_EPOCH, SLOTS_PER_EPOCH, false))
    }

    fn get_slot_leader(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<String> {
        let slot = meta.clock_snapshot()?.slot;
        if let Some(min_context_slot) = config.and_then(|c| c.min_context_slot) {
            if slot < min_context_slot {
                return Err(RpcCustomError::MinContextSlotNotReached { context_slot: slot }.into());
            }
        }
        Ok(SOLFORGE_IDENTITY_PUBKEY.to_string())
    }

    fn get_slot_leaders(
        &self,
        _meta: Self::Metadata,
        _start_slot: Slot,
        limit: u64,
    ) -> Result<Vec<String>> {
        if limit > MAX_SLOT_LEADERS_LIMIT {
            return Err(jsonrpc_core::Error::invalid_params(format!(
                "Invalid limit; max {MAX_SLOT_LEADERS_LIMIT}"
            )));
        }
        Ok(vec![SOLFORGE_IDENTITY_PUBKEY.to_string(); limit as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::TestSetup;

    #[test]
    fn test_get_minimum_balance_for_rent_exemption() {
        let setup = TestSetup::new(SolforgeBankDataRpc);
        let empty = setup
            .rpc
            .get_minimum_balance_for_rent_exemption(Some(setup.context.clone()), 0, None)
            .unwrap();
        let mint_sized = setup
            .rpc
            .get_minimum_balance_for_rent_exemption(Some(setup.context), 82, None)
            .unwrap();
        assert_eq!(empty, 890_880);
        assert!(mint_sized > empty);
    }

    #[test]
    fn test_get_epoch_schedule() {
        let setup = TestSetup::new(SolforgeBankDataRpc);
        let schedule = setup.rpc.get_epoch_schedule(Some(setup.context)).unwrap();
        assert_eq!(schedule.slots_per_epoch, SLOTS_PER_EPOCH);
        assert!(!schedule.warmup);
    }

    #[test]
    fn test_get_slot_leader() {
        let setup = TestSetup::new(SolforgeBankDataRpc);
        let leader = setup.rpc.get_slot_leader(Some(setup.context), None).unwrap();
        assert_eq!(leader, SOLFORGE_IDENTITY_PUBKEY.to_string());
    }

    #[test]
    fn test_get_slot_leaders_limit() {
        let setup = TestSetup::new(SolforgeBankDataRpc);
        let leaders = setup
            .rpc
            .get_slot_leaders(Some(setup.context.clone()), 0, 3)
            .unwrap();
        assert_eq!(leaders.len(), 3);
        assert!(
            setup
                .rpc
                .get_slot_leaders(Some(setup.context), 0, MAX_SLOT_LEADERS_LIMIT + 1)
                .is_err()
        );
    }
}
