use jsonrpc_core::{Error, Result};
use jsonrpc_derive::rpc;
use serde_json::{Value, json};
use solana_client::{
    rpc_config::{
        RpcBlockConfig, RpcBlocksConfigWrapper, RpcContextConfig, RpcEncodingConfigWrapper,
        RpcRequestAirdropConfig, RpcSendTransactionConfig, RpcSignatureStatusConfig,
        RpcSignaturesForAddressConfig, RpcSimulateTransactionConfig, RpcTransactionConfig,
    },
    rpc_response::{
        RpcBlockhash, RpcConfirmedTransactionStatusWithSignature, RpcPrioritizationFee,
        RpcResponseContext,
    },
};
use solana_clock::{Slot, UnixTimestamp};
use solana_message::VersionedMessage;
use solana_rpc_client_api::response::Response as RpcResponse;
use solana_transaction_error::TransactionError;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, TransactionBinaryEncoding,
    TransactionConfirmationStatus, TransactionDetails, UiConfirmedBlock, UiTransactionEncoding,
};
use solforge_types::{
    DEFAULT_SIGNATURES_FOR_ADDRESS_LIMIT, MAX_GET_BLOCKS_RANGE,
    ReturnDataRecord, TransactionConfirmationStatus as SlotDepth,
};

use super::{
    RunloopContext, State,
    minimal::check_min_context_slot,
    utils::{verify_hash, verify_pubkey, verify_signature},
};
use crate::{
    codec::{decode_transaction, decode_transaction_with_fallback},
    error::{SolforgeError, SolforgeResult},
    localnet::capture::transaction_fee,
    types::{SignatureStatusView, StoredTransaction},
};

/// Largest `limit` accepted by `getBlocksWithLimit`.
const MAX_GET_BLOCKS_LIMIT: usize = 500_000;
/// Largest batch accepted by `getSignatureStatuses`.
const MAX_SIGNATURE_STATUSES: usize = 256;

/// Outcome of a dry run. Nothing is recorded and `accounts` is always null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResultView {
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
    pub return_data: Option<Value>,
    pub accounts: Option<Vec<Value>>,
}

fn return_data_json(return_data: &ReturnDataRecord) -> Value {
    json!({
        "programId": return_data.program_id,
        "data": [return_data.data, "base64"],
    })
}

#[rpc]
pub trait Full {
    type Metadata;

    /// Submits a signed transaction through the capture pipeline.
    ///
    /// The transaction is executed immediately. On success it is recorded, the
    /// clock advances by one slot and the base-58 signature is returned. An
    /// engine rejection is returned as error `-32003` with the engine's error
    /// in `data.err`, and nothing is recorded.
    ///
    /// Without an explicit `encoding`, base64 is tried first and base58 second.
    ///
    /// ## Example Request
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "id": 1,
    ///   "method": "sendTransaction",
    ///   "params": ["AVXo5X7UNzpuOmYzkZ+fqHDGiRLTSMlWlUCcZKzEV5CIKlrdvZa3/2GrJJfPrXgZqJbYDaGiOnP99tI/sRJfiwwBAAEDRQ/n5E5CLbMbHanUG3+iVvBAWZu0WFM6NoB5xfybQ7kNwwgfIhv6odn2qTUu/gOisDtaeCW1qlwW/gx3ccr/4wAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAvsInicc+E3IZzLqeA+iM5cn9kSaeFzOuClz1Z2kZQy0BAgIAAQwCAAAAAPIFKgEAAAA=", {"encoding": "base64"}]
    /// }
    /// ```
    #[rpc(meta, name = "sendTransaction")]
    fn send_transaction(
        &self,
        meta: Self::Metadata,
        data: String,
        config: Option<RpcSendTransactionConfig>,
    ) -> Result<String>;

    /// Dry-runs a transaction against the current state.
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": {
    ///     "context": { "slot": 218 },
    ///     "value": {
    ///       "err": null,
    ///       "logs": [
    ///         "Program 11111111111111111111111111111111 invoke [1]",
    ///         "Program 11111111111111111111111111111111 success"
    ///       ],
    ///       "unitsConsumed": 150,
    ///       "returnData": null,
    ///       "accounts": null
    ///     }
    ///   },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "simulateTransaction")]
    fn simulate_transaction(
        &self,
        meta: Self::Metadata,
        data: String,
        config: Option<RpcSimulateTransactionConfig>,
    ) -> Result<RpcResponse<SimulationResultView>>;

    /// Transfers `lamports` from the faucet to `pubkey_str`. The transfer goes
    /// through the capture pipeline like any other submission.
    #[rpc(meta, name = "requestAirdrop")]
    fn request_airdrop(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        lamports: u64,
        config: Option<RpcRequestAirdropConfig>,
    ) -> Result<String>;

    /// Returns the status of each signature, or `null` when it is unknown.
    ///
    /// Lookups go to the in-memory map, then the index, then the engine's own
    /// history. The confirmation level follows the slot distance from the
    /// current slot.
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": {
    ///     "context": { "slot": 82 },
    ///     "value": [
    ///       {
    ///         "slot": 72,
    ///         "confirmations": 10,
    ///         "err": null,
    ///         "status": { "Ok": null },
    ///         "confirmationStatus": "confirmed"
    ///       },
    ///       null
    ///     ]
    ///   },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "getSignatureStatuses")]
    fn get_signature_statuses(
        &self,
        meta: Self::Metadata,
        signature_strs: Vec<String>,
        config: Option<RpcSignatureStatusConfig>,
    ) -> Result<RpcResponse<Vec<Option<SignatureStatusView>>>>;

    /// Returns a recorded transaction in `json`, `jsonParsed`, `base64` or
    /// `base58` form, or `null` when the signature is unknown.
    #[rpc(meta, name = "getTransaction")]
    fn get_transaction(
        &self,
        meta: Self::Metadata,
        signature_str: String,
        config: Option<RpcEncodingConfigWrapper<RpcTransactionConfig>>,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>>;

    /// Returns the signatures that touched `address`, newest first.
    ///
    /// `before` and `until` are exclusive cursors. An unknown cursor yields an
    /// empty list, as does an address with no history.
    #[rpc(meta, name = "getSignaturesForAddress")]
    fn get_signatures_for_address(
        &self,
        meta: Self::Metadata,
        address: String,
        config: Option<RpcSignaturesForAddressConfig>,
    ) -> Result<Vec<RpcConfirmedTransactionStatusWithSignature>>;

    /// Returns a closed slot with its transactions, or `null` if the slot
    /// was never recorded.
    #[rpc(meta, name = "getBlock")]
    fn get_block(
        &self,
        meta: Self::Metadata,
        slot: Slot,
        config: Option<RpcEncodingConfigWrapper<RpcBlockConfig>>,
    ) -> Result<Option<UiConfirmedBlock>>;

    #[rpc(meta, name = "getBlockTime")]
    fn get_block_time(&self, meta: Self::Metadata, slot: Slot) -> Result<Option<UnixTimestamp>>;

    /// Returns recorded slots between `start_slot` and `end_slot` inclusive.
    /// The range may not exceed 500,000 slots.
    #[rpc(meta, name = "getBlocks")]
    fn get_blocks(
        &self,
        meta: Self::Metadata,
        start_slot: Slot,
        wrapper: Option<RpcBlocksConfigWrapper>,
        config: Option<RpcContextConfig>,
    ) -> Result<Vec<Slot>>;

    #[rpc(meta, name = "getBlocksWithLimit")]
    fn get_blocks_with_limit(
        &self,
        meta: Self::Metadata,
        start_slot: Slot,
        limit: usize,
        config: Option<RpcContextConfig>,
    ) -> Result<Vec<Slot>>;

    /// Returns the current blockhash and the last block height at which it
    /// stays valid.
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": {
    ///     "context": { "slot": 2792 },
    ///     "value": {
    ///       "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
    ///       "lastValidBlockHeight": 3090
    ///     }
    ///   },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "getLatestBlockhash")]
    fn get_latest_blockhash(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<RpcBlockhash>>;

    #[rpc(meta, name = "isBlockhashValid")]
    fn is_blockhash_valid(
        &self,
        meta: Self::Metadata,
        blockhash: String,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<bool>>;

    /// Fee for a base64 message: a flat fee per required signature.
    #[rpc(meta, name = "getFeeForMessage")]
    fn get_fee_for_message(
        &self,
        meta: Self::Metadata,
        encoded: String,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<Option<u64>>>;

    /// There is no fee market, so this is always empty.
    #[rpc(meta, name = "getRecentPrioritizationFees")]
    fn get_recent_prioritization_fees(
        &self,
        meta: Self::Metadata,
        pubkey_strs: Option<Vec<String>>,
    ) -> Result<Vec<RpcPrioritizationFee>>;
}

#[derive(Clone)]
pub struct SolforgeFullRpc;
impl Full for SolforgeFullRpc {
    type Metadata = Option<RunloopContext>;

    fn send_transaction(
        &self,
        meta: Self::Metadata,
        data: String,
        config: Option<RpcSendTransactionConfig>,
    ) -> Result<String> {
        let config = config.unwrap_or_default();
        let (_, tx) = decode_transaction_with_fallback(&data, config.encoding)?;
        let locker = meta.get_locker()?;
        let signature = locker.send_transaction(tx)?;
        Ok(signature)
    }

    fn simulate_transaction(
        &self,
        meta: Self::Metadata,
        data: String,
        config: Option<RpcSimulateTransactionConfig>,
    ) -> Result<RpcResponse<SimulationResultView>> {
        let config = config.unwrap_or_default();
        let (_, mut tx) = decode_transaction_with_fallback(&data, config.encoding)?;
        let locker = meta.get_locker()?;
        let slot = meta.clock_snapshot()?.slot;

        if config.replace_recent_blockhash {
            let blockhash = locker.with_state_reader(|state| state.latest_blockhash());
            tx.message.set_recent_blockhash(blockhash);
        }
        let capture = locker.simulate_transaction(tx);

        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value: SimulationResultView {
                err: capture.err,
                logs: capture.logs,
                units_consumed: capture.compute_units_consumed,
                return_data: capture.return_data.as_ref().map(return_data_json),
                accounts: None,
            },
        })
    }

    fn request_airdrop(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        lamports: u64,
        _config: Option<RpcRequestAirdropConfig>,
    ) -> Result<String> {
        let pubkey = verify_pubkey(&pubkey_str)?;
        let locker = meta.get_locker()?;
        let signature = locker.request_airdrop(&pubkey, lamports)?;
        Ok(signature)
    }

    fn get_signature_statuses(
        &self,
        meta: Self::Metadata,
        signature_strs: Vec<String>,
        _config: Option<RpcSignatureStatusConfig>,
    ) -> Result<RpcResponse<Vec<Option<SignatureStatusView>>>> {
        if signature_strs.len() > MAX_SIGNATURE_STATUSES {
            return Err(Error::invalid_params(format!(
                "Too many inputs provided; max {MAX_SIGNATURE_STATUSES}"
            )));
        }
        for signature in signature_strs.iter() {
            verify_signature(signature)?;
        }
        let locker = meta.get_locker()?;
        let current_slot = locker.clock_snapshot().slot;

        let value = signature_strs
            .iter()
            .map(|signature| {
                locker
                    .get_signature_status(signature)
                    .map(|status| SignatureStatusView::new(status.slot, status.err, current_slot))
            })
            .collect();
        Ok(RpcResponse {
            context: RpcResponseContext::new(current_slot),
            value,
        })
    }

    fn get_transaction(
        &self,
        meta: Self::Metadata,
        signature_str: String,
        config: Option<RpcEncodingConfigWrapper<RpcTransactionConfig>>,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        verify_signature(&signature_str)?;
        let config = config.map(|c| c.convert_to_current()).unwrap_or_default();
        let encoding = config.encoding.unwrap_or(UiTransactionEncoding::Json);

        let Some(record) =
            meta.with_state_reader(|state| state.get_transaction_record(&signature_str))??
        else {
            return Ok(None);
        };
        let stored = StoredTransaction::from_record(record)?;
        Ok(Some(
            stored.encode(encoding, config.max_supported_transaction_version)?,
        ))
    }

    fn get_signatures_for_address(
        &self,
        meta: Self::Metadata,
        address: String,
        config: Option<RpcSignaturesForAddressConfig>,
    ) -> Result<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        let pubkey = verify_pubkey(&address)?;
        let config = config.unwrap_or_default();
        let limit = config.limit.unwrap_or(DEFAULT_SIGNATURES_FOR_ADDRESS_LIMIT);
        if limit == 0 || limit > DEFAULT_SIGNATURES_FOR_ADDRESS_LIMIT {
            return Err(Error::invalid_params(format!(
                "Invalid limit; max {DEFAULT_SIGNATURES_FOR_ADDRESS_LIMIT}"
            )));
        }
        if let Some(before) = config.before.as_deref() {
            verify_signature(before)?;
        }
        if let Some(until) = config.until.as_deref() {
            verify_signature(until)?;
        }
        let current_slot = meta.clock_snapshot()?.slot;

        let entries = meta.with_state_reader(|state| {
            state
                .store
                .get_signatures_for_address(
                    &pubkey.to_string(),
                    config.before.as_deref(),
                    config.until.as_deref(),
                    limit,
                )
                .map_err(SolforgeError::from)
        })??;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let confirmation_status =
                    match SlotDepth::from_slot_distance(entry.slot, current_slot) {
                        SlotDepth::Processed => TransactionConfirmationStatus::Processed,
                        SlotDepth::Confirmed => TransactionConfirmationStatus::Confirmed,
                        SlotDepth::Finalized => TransactionConfirmationStatus::Finalized,
                    };
                RpcConfirmedTransactionStatusWithSignature {
                    signature: entry.signature,
                    slot: entry.slot,
                    err: entry.err.map(Into::into),
                    memo: None,
                    block_time: entry.block_time,
                    confirmation_status: Some(confirmation_status),
                }
            })
            .collect())
    }

    fn get_block(
        &self,
        meta: Self::Metadata,
        slot: Slot,
        config: Option<RpcEncodingConfigWrapper<RpcBlockConfig>>,
    ) -> Result<Option<UiConfirmedBlock>> {
        let config = config.map(|c| c.convert_to_current()).unwrap_or_default();
        let encoding = config.encoding.unwrap_or(UiTransactionEncoding::Json);
        let details = config.transaction_details.unwrap_or(TransactionDetails::Full);
        let max_version = config.max_supported_transaction_version;

        let (block, records) = meta.with_state_reader(|state| {
            let Some(block) = state.store.get_block(slot)? else {
                return Ok::<_, SolforgeError>((None, vec![]));
            };
            let records = state.store.get_transactions_in_slot(slot)?;
            Ok((Some(block), records))
        })??;
        let Some(block) = block else {
            return Ok(None);
        };

        let (transactions, signatures) = match details {
            TransactionDetails::Full => {
                let transactions = records
                    .into_iter()
                    .map(|record| {
                        StoredTransaction::from_record(record)?.encode_with_meta(encoding, max_version)
                    })
                    .collect::<SolforgeResult<Vec<_>>>()?;
                (Some(transactions), None)
            }
            TransactionDetails::Accounts => {
                let transactions = records
                    .into_iter()
                    .map(|record| StoredTransaction::from_record(record)?.encode_accounts(max_version))
                    .collect::<SolforgeResult<Vec<_>>>()?;
                (Some(transactions), None)
            }
            TransactionDetails::Signatures => {
                let signatures = records.into_iter().map(|record| record.signature).collect();
                (None, Some(signatures))
            }
            TransactionDetails::None => (None, None),
        };
        Ok(Some(UiConfirmedBlock {
            previous_blockhash: block.previous_blockhash,
            blockhash: block.blockhash,
            parent_slot: block.parent_slot,
            transactions,
            signatures,
            rewards: config.rewards.unwrap_or(true).then(Vec::new),
            num_reward_partitions: None,
            block_time: Some(block.block_time),
            block_height: Some(block.block_height),
        }))
    }

    fn get_block_time(&self, meta: Self::Metadata, slot: Slot) -> Result<Option<UnixTimestamp>> {
        let block_time = meta.with_state_reader(|state| {
            state.store.get_block_time(slot).map_err(SolforgeError::from)
        })??;
        Ok(block_time)
    }

    fn get_blocks(
        &self,
        meta: Self::Metadata,
        start_slot: Slot,
        wrapper: Option<RpcBlocksConfigWrapper>,
        config: Option<RpcContextConfig>,
    ) -> Result<Vec<Slot>> {
        let (end_slot, wrapped_config) = match wrapper {
            Some(RpcBlocksConfigWrapper::EndSlotOnly(end_slot)) => (end_slot, None),
            Some(RpcBlocksConfigWrapper::ConfigOnly(config)) => (None, config),
            None => (None, None),
        };
        let config = config.or(wrapped_config);
        let current_slot = meta.clock_snapshot()?.slot;
        check_min_context_slot(current_slot, &config)?;

        let end_slot = end_slot.unwrap_or(current_slot);
        if end_slot < start_slot {
            return Ok(vec![]);
        }
        if end_slot - start_slot > MAX_GET_BLOCKS_RANGE {
            return Err(Error::invalid_params(format!(
                "Slot range too large; max {MAX_GET_BLOCKS_RANGE}"
            )));
        }

        let slots = meta.with_state_reader(|state| {
            state
                .store
                .get_block_slots(start_slot, Some(end_slot), MAX_GET_BLOCKS_RANGE as usize + 1)
                .map_err(SolforgeError::from)
        })??;
        Ok(slots)
    }

    fn get_blocks_with_limit(
        &self,
        meta: Self::Metadata,
        start_slot: Slot,
        limit: usize,
        config: Option<RpcContextConfig>,
    ) -> Result<Vec<Slot>> {
        if limit > MAX_GET_BLOCKS_LIMIT {
            return Err(Error::invalid_params(format!(
                "Limit too large; max {MAX_GET_BLOCKS_LIMIT}"
            )));
        }
        let current_slot = meta.clock_snapshot()?.slot;
        check_min_context_slot(current_slot, &config)?;
        if limit == 0 {
            return Ok(vec![]);
        }

        let slots = meta.with_state_reader(|state| {
            state
                .store
                .get_block_slots(start_slot, None, limit)
                .map_err(SolforgeError::from)
        })??;
        Ok(slots)
    }

    fn get_latest_blockhash(
        &self,
        meta: Self::Metadata,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<RpcBlockhash>> {
        let slot = meta.clock_snapshot()?.slot;
        check_min_context_slot(slot, &config)?;
        let (blockhash, last_valid_block_height) = meta.with_state_reader(|state| {
            (state.latest_blockhash(), state.last_valid_block_height())
        })?;
        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value: RpcBlockhash {
                blockhash: blockhash.to_string(),
                last_valid_block_height,
            },
        })
    }

    fn is_blockhash_valid(
        &self,
        meta: Self::Metadata,
        blockhash: String,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<bool>> {
        let hash = verify_hash(&blockhash)?;
        let slot = meta.clock_snapshot()?.slot;
        check_min_context_slot(slot, &config)?;
        let is_valid = meta.with_state_reader(|state| state.is_blockhash_valid(&hash))?;
        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value: is_valid,
        })
    }

    fn get_fee_for_message(
        &self,
        meta: Self::Metadata,
        encoded: String,
        config: Option<RpcContextConfig>,
    ) -> Result<RpcResponse<Option<u64>>> {
        let (_, message) =
            decode_transaction::<VersionedMessage>(&encoded, TransactionBinaryEncoding::Base64)?;
        let slot = meta.clock_snapshot()?.slot;
        check_min_context_slot(slot, &config)?;
        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value: Some(transaction_fee(&message)),
        })
    }

    fn get_recent_prioritization_fees(
        &self,
        _meta: Self::Metadata,
        pubkey_strs: Option<Vec<String>>,
    ) -> Result<Vec<RpcPrioritizationFee>> {
        for pubkey in pubkey_strs.unwrap_or_default().iter() {
            verify_pubkey(pubkey)?;
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use jsonrpc_core::ErrorCode;
    use solana_compute_budget_interface::ComputeBudgetInstruction;
    use solana_instruction::Instruction;
    use solana_keypair::Keypair;
    use solana_message::{Message, v0};
    use solana_native_token::LAMPORTS_PER_SOL;
    use solana_pubkey::Pubkey;
    use solana_signer::Signer;
    use solana_system_interface::instruction as system_instruction;
    use solana_transaction::{Transaction, versioned::VersionedTransaction};
    use solforge_types::LAMPORTS_PER_SIGNATURE;

    use super::*;
    use crate::{codec::encode_base64, tests::helpers::TestSetup};

    fn faucet_transfer(setup: &TestSetup<SolforgeFullRpc>, to: &Pubkey, lamports: u64) -> String {
        let faucet = setup.faucet();
        let blockhash = setup
            .context
            .locker
            .with_state_reader(|state| state.latest_blockhash());
        let tx = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(&faucet.pubkey(), to, lamports)],
            Some(&faucet.pubkey()),
            &[&faucet],
            blockhash,
        );
        encode_base64(bincode::serialize(&tx).unwrap())
    }

    fn balance(setup: &TestSetup<SolforgeFullRpc>, pubkey: &Pubkey) -> u64 {
        setup
            .context
            .locker
            .with_state_reader(|state| state.engine.get_balance(pubkey))
    }

    #[test]
    fn test_send_transaction_moves_lamports() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let recipient = Pubkey::new_unique();
        let faucet = setup.faucet().pubkey();
        let faucet_before = balance(&setup, &faucet);

        let data = faucet_transfer(&setup, &recipient, LAMPORTS_PER_SOL);
        let signature = setup
            .rpc
            .send_transaction(Some(setup.context.clone()), data, None)
            .unwrap();

        assert_eq!(balance(&setup, &recipient), LAMPORTS_PER_SOL);
        assert_eq!(
            balance(&setup, &faucet),
            faucet_before - LAMPORTS_PER_SOL - LAMPORTS_PER_SIGNATURE
        );
        let recorded = setup
            .context
            .locker
            .with_state_reader(|state| state.transactions.contains_key(&signature));
        assert!(recorded);
    }

    #[test]
    fn test_send_transaction_base58_fallback() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let recipient = Pubkey::new_unique();
        let base64 = faucet_transfer(&setup, &recipient, LAMPORTS_PER_SOL);
        let bytes = crate::codec::decode_base64(&base64).unwrap();
        let base58 = crate::codec::encode_base58(bytes);

        setup
            .rpc
            .send_transaction(Some(setup.context.clone()), base58, None)
            .unwrap();
        assert_eq!(balance(&setup, &recipient), LAMPORTS_PER_SOL);
    }

    #[test]
    fn test_send_transaction_failure_records_nothing() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let broke = Keypair::new();
        let blockhash = setup
            .context
            .locker
            .with_state_reader(|state| state.latest_blockhash());
        let tx = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(
                &broke.pubkey(),
                &Pubkey::new_unique(),
                LAMPORTS_PER_SOL,
            )],
            Some(&broke.pubkey()),
            &[&broke],
            blockhash,
        );
        let data = encode_base64(bincode::serialize(&tx).unwrap());

        let err = setup
            .rpc
            .send_transaction(Some(setup.context.clone()), data, None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError(-32003));
        assert!(err.data.unwrap().get("err").is_some());

        let count = setup
            .context
            .locker
            .with_state_reader(|state| state.transactions.len());
        assert_eq!(count, 0);
    }

    #[test]
    fn test_send_transaction_rejects_garbage() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let err = setup
            .rpc
            .send_transaction(Some(setup.context), "not a transaction!".into(), None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[test]
    fn test_simulate_transaction_has_no_side_effects() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let recipient = Pubkey::new_unique();
        let data = faucet_transfer(&setup, &recipient, LAMPORTS_PER_SOL);
        let slot_before = setup.context.locker.clock_snapshot().slot;

        let res = setup
            .rpc
            .simulate_transaction(Some(setup.context.clone()), data, None)
            .unwrap();
        assert!(res.value.err.is_none());
        assert!(!res.value.logs.is_empty());
        assert!(res.value.accounts.is_none());
        assert!(res.value.units_consumed.is_some());

        assert_eq!(balance(&setup, &recipient), 0);
        assert_eq!(setup.context.locker.clock_snapshot().slot, slot_before);
        let json = serde_json::to_value(&res.value).unwrap();
        assert!(json.get("unitsConsumed").is_some());
        assert_eq!(json["accounts"], Value::Null);
    }

    #[test]
    fn test_simulate_replaces_blockhash() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let faucet = setup.faucet();
        let msg = v0::Message::try_compile(
            &faucet.pubkey(),
            &[system_instruction::transfer(
                &faucet.pubkey(),
                &Pubkey::new_unique(),
                LAMPORTS_PER_SOL,
            )],
            &[],
            solana_hash::Hash::new_unique(),
        )
        .unwrap();
        let tx = VersionedTransaction::try_new(VersionedMessage::V0(msg), &[&faucet]).unwrap();
        let data = encode_base64(bincode::serialize(&tx).unwrap());

        let res = setup
            .rpc
            .simulate_transaction(
                Some(setup.context),
                data,
                Some(RpcSimulateTransactionConfig {
                    replace_recent_blockhash: true,
                    encoding: Some(UiTransactionEncoding::Base64),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert!(res.value.err.is_none());
    }

    #[test]
    fn test_request_airdrop_and_status() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let recipient = Pubkey::new_unique();
        let signature = setup
            .rpc
            .request_airdrop(
                Some(setup.context.clone()),
                recipient.to_string(),
                LAMPORTS_PER_SOL,
                None,
            )
            .unwrap();
        setup.context.locker.confirm_submission();
        assert_eq!(balance(&setup, &recipient), LAMPORTS_PER_SOL);

        let unknown = Keypair::new().sign_message(b"unknown").to_string();
        let res = setup
            .rpc
            .get_signature_statuses(Some(setup.context), vec![signature, unknown], None)
            .unwrap();
        let status = res.value[0].as_ref().unwrap();
        assert!(status.err.is_none());
        assert_eq!(status.status, Ok(()));
        assert_eq!(
            status.confirmation_status,
            Some(TransactionConfirmationStatus::Confirmed)
        );
        assert!(res.value[1].is_none());
    }

    #[test]
    fn test_signature_statuses_rejects_bad_signature() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let err = setup
            .rpc
            .get_signature_statuses(Some(setup.context), vec!["nope".into()], None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[test]
    fn test_get_transaction_json_parsed() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let recipient = Pubkey::new_unique();
        let signature = setup.transfer(&recipient, LAMPORTS_PER_SOL);

        let tx = setup
            .rpc
            .get_transaction(
                Some(setup.context.clone()),
                signature.clone(),
                Some(RpcEncodingConfigWrapper::Current(Some(RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::JsonParsed),
                    ..Default::default()
                }))),
            )
            .unwrap()
            .unwrap();
        assert_eq!(tx.transaction.version, None);
        let tx = serde_json::to_value(tx).unwrap();
        let instruction = &tx["transaction"]["message"]["instructions"][0];
        assert_eq!(instruction["program"], "system");
        assert_eq!(instruction["parsed"]["type"], "transfer");
        assert_eq!(
            instruction["parsed"]["info"]["destination"],
            recipient.to_string()
        );
        assert_eq!(tx["meta"]["err"], Value::Null);

        let missing = setup
            .rpc
            .get_transaction(
                Some(setup.context),
                Keypair::new().sign_message(b"missing").to_string(),
                None,
            )
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_get_signatures_for_address() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let recipient = Pubkey::new_unique();
        let empty = setup
            .rpc
            .get_signatures_for_address(Some(setup.context.clone()), recipient.to_string(), None)
            .unwrap();
        assert!(empty.is_empty());

        let first = setup.transfer(&recipient, LAMPORTS_PER_SOL);
        let second = setup.transfer(&recipient, LAMPORTS_PER_SOL);
        let history = setup
            .rpc
            .get_signatures_for_address(Some(setup.context.clone()), recipient.to_string(), None)
            .unwrap();
        assert_eq!(
            history.iter().map(|h| h.signature.clone()).collect::<Vec<_>>(),
            vec![second.clone(), first.clone()]
        );

        let older = setup
            .rpc
            .get_signatures_for_address(
                Some(setup.context),
                recipient.to_string(),
                Some(RpcSignaturesForAddressConfig {
                    before: Some(second),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].signature, first);
    }

    #[test]
    fn test_get_block_contains_transaction() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let signature = setup.transfer(&Pubkey::new_unique(), LAMPORTS_PER_SOL);
        let slot = setup
            .context
            .locker
            .get_signature_status(&signature)
            .unwrap()
            .slot;

        let block = setup
            .rpc
            .get_block(
                Some(setup.context.clone()),
                slot,
                Some(RpcEncodingConfigWrapper::Current(Some(RpcBlockConfig {
                    transaction_details: Some(TransactionDetails::Signatures),
                    ..Default::default()
                }))),
            )
            .unwrap()
            .unwrap();
        assert_eq!(block.signatures, Some(vec![signature.clone()]));
        assert!(block.transactions.is_none());
        assert_eq!(block.rewards, Some(vec![]));

        let full = setup
            .rpc
            .get_block(Some(setup.context.clone()), slot, None)
            .unwrap()
            .unwrap();
        let transactions = full.transactions.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].meta.as_ref().unwrap().err, None);

        let block_time = setup
            .rpc
            .get_block_time(Some(setup.context.clone()), slot)
            .unwrap();
        assert!(block_time.is_some());

        let blocks = setup
            .rpc
            .get_blocks(Some(setup.context.clone()), 0, None, None)
            .unwrap();
        assert!(blocks.contains(&slot));

        let missing = setup
            .rpc
            .get_block(Some(setup.context), slot + 1_000, None)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_get_blocks_range_limits() {
        let setup = TestSetup::new(SolforgeFullRpc);
        assert!(
            setup
                .rpc
                .get_blocks(
                    Some(setup.context.clone()),
                    0,
                    Some(RpcBlocksConfigWrapper::EndSlotOnly(Some(
                        MAX_GET_BLOCKS_RANGE + 1
                    ))),
                    None,
                )
                .is_err()
        );
        let reversed = setup
            .rpc
            .get_blocks(
                Some(setup.context.clone()),
                10,
                Some(RpcBlocksConfigWrapper::EndSlotOnly(Some(5))),
                None,
            )
            .unwrap();
        assert!(reversed.is_empty());
        assert!(
            setup
                .rpc
                .get_blocks_with_limit(Some(setup.context), 0, MAX_GET_BLOCKS_LIMIT + 1, None)
                .is_err()
        );
    }

    #[test]
    fn test_latest_blockhash_rotates() {
        let mut setup = TestSetup::new(SolforgeFullRpc);
        let first = setup
            .rpc
            .get_latest_blockhash(Some(setup.context.clone()), None)
            .unwrap()
            .value;
        assert!(
            setup
                .rpc
                .is_blockhash_valid(Some(setup.context.clone()), first.blockhash.clone(), None)
                .unwrap()
                .value
        );

        setup.context.locker.tick();
        setup.refresh_clock();
        let second = setup
            .rpc
            .get_latest_blockhash(Some(setup.context.clone()), None)
            .unwrap()
            .value;
        assert_ne!(first.blockhash, second.blockhash);
        assert!(second.last_valid_block_height > first.last_valid_block_height);

        let unknown = solana_hash::Hash::new_unique().to_string();
        assert!(
            !setup
                .rpc
                .is_blockhash_valid(Some(setup.context), unknown, None)
                .unwrap()
                .value
        );
    }

    #[test]
    fn test_get_fee_for_message() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let payer = Pubkey::new_unique();
        let message = VersionedMessage::Legacy(Message::new(
            &[system_instruction::transfer(&payer, &Pubkey::new_unique(), 1)],
            Some(&payer),
        ));
        let encoded = encode_base64(bincode::serialize(&message).unwrap());
        let fee = setup
            .rpc
            .get_fee_for_message(Some(setup.context.clone()), encoded, None)
            .unwrap()
            .value;
        assert_eq!(fee, Some(LAMPORTS_PER_SIGNATURE));

        // priced compute is free here; precompile signatures are not
        let message = VersionedMessage::Legacy(Message::new(
            &[
                ComputeBudgetInstruction::set_compute_unit_price(50_000),
                Instruction::new_with_bytes(solana_sdk_ids::ed25519_program::id(), &[1, 0], vec![]),
                system_instruction::transfer(&payer, &Pubkey::new_unique(), 1),
            ],
            Some(&payer),
        ));
        let encoded = encode_base64(bincode::serialize(&message).unwrap());
        let fee = setup
            .rpc
            .get_fee_for_message(Some(setup.context), encoded, None)
            .unwrap()
            .value;
        assert_eq!(fee, Some(2 * LAMPORTS_PER_SIGNATURE));
    }

    #[test]
    fn test_recent_prioritization_fees_empty() {
        let setup = TestSetup::new(SolforgeFullRpc);
        let fees = setup
            .rpc
            .get_recent_prioritization_fees(
                Some(setup.context),
                Some(vec![Pubkey::new_unique().to_string()]),
            )
            .unwrap();
        assert!(fees.is_empty());
    }
}
