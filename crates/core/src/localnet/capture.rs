//! Pre/post state capture around a submitted transaction.

use std::collections::BTreeSet;

use litesvm::types::{
    FailedTransactionMetadata, SimulatedTransactionInfo, TransactionMetadata, TransactionResult,
};
use solana_account::Account;
use solana_address_lookup_table_interface::state::AddressLookupTable;
use solana_fee::{SignatureCounts, calculate_signature_fee};
use solana_message::{VersionedMessage, v0::LoadedAddresses};
use solana_pubkey::Pubkey;
use solana_sdk_ids::{
    address_lookup_table, ed25519_program, secp256k1_program, secp256r1_program, system_program,
};
use solana_transaction_error::TransactionError;
use solforge_types::{
    AccountSnapshot, InnerInstructionGroup, InnerInstructionRecord, LAMPORTS_PER_SIGNATURE,
    ReturnDataRecord, TokenBalanceRecord,
};

use super::engine::ExecutionEngine;
use crate::{
    codec::{encode_base58, encode_base64},
    parsers::{
        accounts::{unpack_mint, unpack_token_account},
        is_token_program,
    },
};

/// Execution outcome normalised across send, simulate and failure results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureMetadata {
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
    pub inner_instructions: Vec<InnerInstructionGroup>,
    pub compute_units_consumed: Option<u64>,
    pub return_data: Option<ReturnDataRecord>,
}

impl CaptureMetadata {
    pub fn from_send_result(result: &TransactionResult) -> Self {
        match result {
            Ok(meta) => Self::from_metadata(meta, None),
            Err(failure) => Self::from_failure(failure),
        }
    }

    pub fn from_simulation(
        result: &Result<SimulatedTransactionInfo, FailedTransactionMetadata>,
    ) -> Self {
        match result {
            Ok(info) => Self::from_metadata(&info.meta, None),
            Err(failure) => Self::from_failure(failure),
        }
    }

    fn from_failure(failure: &FailedTransactionMetadata) -> Self {
        Self::from_metadata(&failure.meta, Some(failure.err.clone()))
    }

    fn from_metadata(meta: &TransactionMetadata, err: Option<TransactionError>) -> Self {
        let inner_instructions = meta
            .inner_instructions
            .iter()
            .enumerate()
            .filter(|(_, group)| !group.is_empty())
            .map(|(index, group)| InnerInstructionGroup {
                index: index as u8,
                instructions: group
                    .iter()
                    .map(|inner| InnerInstructionRecord {
                        program_id_index: inner.instruction.program_id_index,
                        accounts: inner.instruction.accounts.clone(),
                        data: encode_base58(&inner.instruction.data),
                        stack_height: Some(inner.stack_height as u32),
                    })
                    .collect(),
            })
            .collect();

        let return_data = (!meta.return_data.data.is_empty()).then(|| ReturnDataRecord {
            program_id: meta.return_data.program_id.to_string(),
            data: encode_base64(&meta.return_data.data),
        });

        Self {
            err,
            logs: meta.logs.clone(),
            inner_instructions,
            compute_units_consumed: Some(meta.compute_units_consumed),
            return_data,
        }
    }
}

/// Fee the engine debits from the payer: one signature fee per transaction
/// signature and per precompile-verified signature. The engine charges no
/// prioritization fee, so compute unit prices do not change the total.
pub fn transaction_fee(message: &VersionedMessage) -> u64 {
    let keys = message.static_account_keys();
    let precompile_signatures = |program: &Pubkey| -> u64 {
        message
            .instructions()
            .iter()
            .filter(|ix| keys.get(ix.program_id_index as usize) == Some(program))
            .map(|ix| u64::from(ix.data.first().copied().unwrap_or(0)))
            .sum()
    };
    let counts = SignatureCounts {
        num_transaction_signatures: u64::from(message.header().num_required_signatures),
        num_ed25519_signatures: precompile_signatures(&ed25519_program::id()),
        num_secp256k1_signatures: precompile_signatures(&secp256k1_program::id()),
        num_secp256r1_signatures: precompile_signatures(&secp256r1_program::id()),
    };
    calculate_signature_fee(counts, LAMPORTS_PER_SIGNATURE, true)
}

/// Resolves the lookup-table keys of a v0 message, writable addresses of
/// every table first. `None` when a table is missing or an index does not
/// resolve; legacy messages load nothing.
pub fn loaded_addresses(
    engine: &ExecutionEngine,
    message: &VersionedMessage,
) -> Option<LoadedAddresses> {
    let Some(lookups) = message.address_table_lookups() else {
        return Some(LoadedAddresses::default());
    };
    lookups
        .iter()
        .map(|lookup| {
            let account = engine.get_account(&lookup.account_key)?;
            if account.owner != address_lookup_table::id() {
                return None;
            }
            let table = AddressLookupTable::deserialize(&account.data).ok()?;
            let resolve = |indexes: &[u8]| {
                indexes
                    .iter()
                    .map(|index| table.addresses.get(*index as usize).copied())
                    .collect::<Option<Vec<_>>>()
            };
            Some(LoadedAddresses {
                writable: resolve(&lookup.writable_indexes)?,
                readonly: resolve(&lookup.readonly_indexes)?,
            })
        })
        .collect()
}

/// Snapshot of an account as the index stores it. Missing accounts are
/// recorded as empty system accounts.
pub fn account_snapshot(address: &Pubkey, account: Option<&Account>) -> AccountSnapshot {
    match account {
        Some(account) => AccountSnapshot {
            address: address.to_string(),
            lamports: account.lamports,
            owner: account.owner.to_string(),
            executable: account.executable,
            rent_epoch: account.rent_epoch,
            space: account.data.len() as u64,
            data: is_token_program(&account.owner).then(|| encode_base64(&account.data)),
        },
        None => AccountSnapshot {
            address: address.to_string(),
            lamports: 0,
            owner: system_program::id().to_string(),
            executable: false,
            rent_epoch: 0,
            space: 0,
            data: None,
        },
    }
}

pub fn snapshot_accounts(engine: &ExecutionEngine, keys: &[Pubkey]) -> Vec<AccountSnapshot> {
    keys.iter()
        .map(|key| account_snapshot(key, engine.get_account(key).as_ref()))
        .collect()
}

pub fn balances(engine: &ExecutionEngine, keys: &[Pubkey]) -> Vec<u64> {
    keys.iter().map(|key| engine.get_balance(key)).collect()
}

pub fn mint_decimals(engine: &ExecutionEngine, mint: &Pubkey) -> Option<u8> {
    let account = engine.get_account(mint)?;
    if !is_token_program(&account.owner) {
        return None;
    }
    unpack_mint(&account.data).map(|m| m.decimals)
}

/// Indices of keys that may hold token balances: every account passed to a
/// token-program instruction, plus every static key owned by a token program.
pub fn token_account_candidates(
    engine: &ExecutionEngine,
    message: &VersionedMessage,
    keys: &[Pubkey],
) -> BTreeSet<usize> {
    let mut candidates = BTreeSet::new();
    for instruction in message.instructions() {
        let Some(program_id) = keys.get(instruction.program_id_index as usize) else {
            continue;
        };
        if is_token_program(program_id) {
            candidates.extend(instruction.accounts.iter().map(|i| *i as usize));
        }
    }
    candidates.extend(owned_by_token_program(engine, keys));
    candidates.retain(|i| *i < keys.len());
    candidates
}

pub fn owned_by_token_program(engine: &ExecutionEngine, keys: &[Pubkey]) -> Vec<usize> {
    keys.iter()
        .enumerate()
        .filter(|(_, key)| {
            engine
                .get_account(key)
                .is_some_and(|account| is_token_program(&account.owner))
        })
        .map(|(index, _)| index)
        .collect()
}

pub fn token_balances(
    engine: &ExecutionEngine,
    keys: &[Pubkey],
    candidates: &BTreeSet<usize>,
) -> Vec<TokenBalanceRecord> {
    candidates
        .iter()
        .filter_map(|index| {
            let key = keys.get(*index)?;
            let account = engine.get_account(key)?;
            if !is_token_program(&account.owner) {
                return None;
            }
            let state = unpack_token_account(&account.data)?;
            let decimals = mint_decimals(engine, &state.mint)?;
            Some(TokenBalanceRecord {
                account_index: u8::try_from(*index).ok()?,
                mint: state.mint.to_string(),
                owner: Some(state.owner.to_string()),
                program_id: Some(account.owner.to_string()),
                amount: state.amount.to_string(),
                decimals,
            })
        })
        .collect()
}

/// Adds a zero-amount pre entry for every token account that only exists
/// after execution, keeping both lists ordered by account index.
pub fn pad_pre_token_balances(
    pre: &mut Vec<TokenBalanceRecord>,
    post: &[TokenBalanceRecord],
) {
    for balance in post {
        if !pre.iter().any(|p| p.account_index == balance.account_index) {
            pre.push(TokenBalanceRecord::zeroed_like(balance));
        }
    }
    pre.sort_by_key(|b| b.account_index);
}

#[cfg(test)]
mod tests {
    use solana_instruction::Instruction;
    use solana_message::{Message, v0, v0::MessageAddressTableLookup};
    use solana_system_interface::instruction as system_instruction;

    use super::*;

    fn balance(index: u8, amount: &str) -> TokenBalanceRecord {
        TokenBalanceRecord {
            account_index: index,
            mint: "mint".into(),
            owner: Some("owner".into()),
            program_id: Some(spl_token_interface::id().to_string()),
            amount: amount.into(),
            decimals: 6,
        }
    }

    #[test]
    fn precompile_signatures_are_charged() {
        let payer = Pubkey::new_unique();
        let verify = Instruction::new_with_bytes(ed25519_program::id(), &[2, 0], vec![]);
        let transfer = system_instruction::transfer(&payer, &Pubkey::new_unique(), 1);

        let plain = VersionedMessage::Legacy(Message::new(&[transfer.clone()], Some(&payer)));
        assert_eq!(transaction_fee(&plain), LAMPORTS_PER_SIGNATURE);

        let with_precompile =
            VersionedMessage::Legacy(Message::new(&[verify, transfer], Some(&payer)));
        assert_eq!(transaction_fee(&with_precompile), 3 * LAMPORTS_PER_SIGNATURE);
    }

    #[test]
    fn missing_lookup_table_does_not_resolve() {
        let engine = ExecutionEngine::new(LAMPORTS_PER_SIGNATURE).unwrap();
        let payer = Pubkey::new_unique();
        let legacy = VersionedMessage::Legacy(Message::new(&[], Some(&payer)));
        assert_eq!(
            loaded_addresses(&engine, &legacy),
            Some(LoadedAddresses::default())
        );

        let v0 = VersionedMessage::V0(v0::Message {
            address_table_lookups: vec![MessageAddressTableLookup {
                account_key: Pubkey::new_unique(),
                writable_indexes: vec![0],
                readonly_indexes: vec![],
            }],
            ..v0::Message::default()
        });
        assert_eq!(loaded_addresses(&engine, &v0), None);
    }

    #[test]
    fn created_token_accounts_get_zero_pre_balance() {
        let mut pre = vec![balance(3, "10")];
        let post = vec![balance(1, "5"), balance(3, "5")];
        pad_pre_token_balances(&mut pre, &post);
        assert_eq!(pre.len(), 2);
        assert_eq!(pre[0].account_index, 1);
        assert_eq!(pre[0].amount, "0");
        assert_eq!(pre[1].amount, "10");
    }

    #[test]
    fn snapshot_keeps_data_only_for_token_accounts() {
        let address = Pubkey::new_unique();
        let token = Account {
            lamports: 10,
            data: vec![1, 2, 3],
            owner: spl_token_interface::id(),
            executable: false,
            rent_epoch: 0,
        };
        assert_eq!(
            account_snapshot(&address, Some(&token)).data.as_deref(),
            Some("AQID")
        );
        let plain = Account {
            owner: Pubkey::new_unique(),
            ..token
        };
        let snapshot = account_snapshot(&address, Some(&plain));
        assert_eq!(snapshot.data, None);
        assert_eq!(snapshot.space, 3);

        let missing = account_snapshot(&address, None);
        assert_eq!(missing.lamports, 0);
        assert_eq!(missing.owner, system_program::id().to_string());
    }

    #[test]
    fn failed_result_keeps_error_and_logs() {
        let failure = FailedTransactionMetadata {
            err: TransactionError::InsufficientFundsForFee,
            meta: TransactionMetadata {
                logs: vec!["Program log: out of funds".into()],
                compute_units_consumed: 42,
                ..TransactionMetadata::default()
            },
        };
        let capture = CaptureMetadata::from_send_result(&Err(failure));
        assert_eq!(capture.err, Some(TransactionError::InsufficientFundsForFee));
        assert_eq!(capture.logs.len(), 1);
        assert_eq!(capture.compute_units_consumed, Some(42));
        assert!(capture.inner_instructions.is_empty());
        assert_eq!(capture.return_data, None);
    }
}
