//! Opcode-to-name table used when no decoder can fully decode a payload.

use solana_pubkey::Pubkey;
use solana_sdk_ids::{
    address_lookup_table, bpf_loader_upgradeable, compute_budget, stake, system_program, vote,
};

use crate::parsers::{ASSOCIATED_TOKEN_PROGRAM_ID, is_token_program};

const TOKEN_INSTRUCTIONS: &[&str] = &[
    "initializeMint",
    "initializeAccount",
    "initializeMultisig",
    "transfer",
    "approve",
    "revoke",
    "setAuthority",
    "mintTo",
    "burn",
    "closeAccount",
    "freezeAccount",
    "thawAccount",
    "transferChecked",
    "approveChecked",
    "mintToChecked",
    "burnChecked",
    "initializeAccount2",
    "syncNative",
    "initializeAccount3",
    "initializeMultisig2",
    "initializeMint2",
    "getAccountDataSize",
    "initializeImmutableOwner",
    "amountToUiAmount",
    "uiAmountToAmount",
    "initializeMintCloseAuthority",
    "transferFeeExtension",
    "confidentialTransferExtension",
    "defaultAccountStateExtension",
    "reallocate",
    "memoTransferExtension",
    "createNativeMint",
    "initializeNonTransferableMint",
    "interestBearingMintExtension",
    "cpiGuardExtension",
    "initializePermanentDelegate",
    "transferHookExtension",
    "confidentialTransferFeeExtension",
    "withdrawExcessLamports",
    "metadataPointerExtension",
    "groupPointerExtension",
    "groupMemberPointerExtension",
    "confidentialMintBurnExtension",
    "scaledUiAmountExtension",
    "pausableExtension",
];

const SYSTEM_INSTRUCTIONS: &[&str] = &[
    "createAccount",
    "assign",
    "transfer",
    "createAccountWithSeed",
    "advanceNonce",
    "withdrawFromNonce",
    "initializeNonce",
    "authorizeNonce",
    "allocate",
    "allocateWithSeed",
    "assignWithSeed",
    "transferWithSeed",
    "upgradeNonce",
];

const STAKE_INSTRUCTIONS: &[&str] = &[
    "initialize",
    "authorize",
    "delegate",
    "split",
    "withdraw",
    "deactivate",
    "setLockup",
    "merge",
    "authorizeWithSeed",
    "initializeChecked",
    "authorizeChecked",
    "authorizeCheckedWithSeed",
    "setLockupChecked",
    "getMinimumDelegation",
    "deactivateDelinquent",
    "redelegate",
    "moveStake",
    "moveLamports",
];

const VOTE_INSTRUCTIONS: &[&str] = &[
    "initialize",
    "authorize",
    "vote",
    "withdraw",
    "updateValidatorIdentity",
    "updateCommission",
    "voteSwitch",
    "authorizeChecked",
    "updateVoteState",
    "updateVoteStateSwitch",
    "authorizeWithSeed",
    "authorizeCheckedWithSeed",
    "compactUpdateVoteState",
    "compactUpdateVoteStateSwitch",
    "towerSync",
    "towerSyncSwitch",
];

const LOOKUP_TABLE_INSTRUCTIONS: &[&str] = &[
    "createLookupTable",
    "freezeLookupTable",
    "extendLookupTable",
    "deactivateLookupTable",
    "closeLookupTable",
];

const UPGRADEABLE_LOADER_INSTRUCTIONS: &[&str] = &[
    "initializeBuffer",
    "write",
    "deployWithMaxDataLen",
    "upgrade",
    "setAuthority",
    "close",
    "extendProgram",
    "setAuthorityChecked",
    "migrate",
    "extendProgramChecked",
];

const COMPUTE_BUDGET_INSTRUCTIONS: &[&str] = &[
    "requestUnitsDeprecated",
    "requestHeapFrame",
    "setComputeUnitLimit",
    "setComputeUnitPrice",
    "setLoadedAccountsDataSizeLimit",
];

const ASSOCIATED_TOKEN_INSTRUCTIONS: &[&str] = &["create", "createIdempotent", "recoverNested"];

pub fn token_instruction_name(opcode: u8) -> Option<&'static str> {
    TOKEN_INSTRUCTIONS.get(opcode as usize).copied()
}

fn by_u8(table: &'static [&'static str], data: &[u8]) -> Option<&'static str> {
    table.get(*data.first()? as usize).copied()
}

fn by_u32(table: &'static [&'static str], data: &[u8]) -> Option<&'static str> {
    let discriminant = u32::from_le_bytes(data.get(..4)?.try_into().ok()?);
    table.get(discriminant as usize).copied()
}

/// Program name and instruction type for a known program's opcode. Both
/// token programs report `spl-token`, as the transaction-status parser does.
pub fn instruction_name(program_id: &Pubkey, data: &[u8]) -> Option<(&'static str, &'static str)> {
    if is_token_program(program_id) {
        return Some(("spl-token", token_instruction_name(*data.first()?)?));
    }
    if *program_id == ASSOCIATED_TOKEN_PROGRAM_ID {
        // an empty payload is the original `create`
        let name = if data.is_empty() {
            "create"
        } else {
            by_u8(ASSOCIATED_TOKEN_INSTRUCTIONS, data)?
        };
        return Some(("spl-associated-token-account", name));
    }
    let (program, name) = if *program_id == system_program::id() {
        ("system", by_u32(SYSTEM_INSTRUCTIONS, data)?)
    } else if *program_id == stake::id() {
        ("stake", by_u32(STAKE_INSTRUCTIONS, data)?)
    } else if *program_id == vote::id() {
        ("vote", by_u32(VOTE_INSTRUCTIONS, data)?)
    } else if *program_id == address_lookup_table::id() {
        ("address-lookup-table", by_u32(LOOKUP_TABLE_INSTRUCTIONS, data)?)
    } else if *program_id == bpf_loader_upgradeable::id() {
        (
            "bpf-upgradeable-loader",
            by_u32(UPGRADEABLE_LOADER_INSTRUCTIONS, data)?,
        )
    } else if *program_id == compute_budget::id() {
        ("compute-budget", by_u8(COMPUTE_BUDGET_INSTRUCTIONS, data)?)
    } else {
        return None;
    };
    Some((program, name))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(system_program::id(), vec![2, 0, 0, 0] => Some(("system", "transfer")) ; "system transfer")]
    #[test_case(stake::id(), vec![5, 0, 0, 0] => Some(("stake", "deactivate")) ; "stake deactivate")]
    #[test_case(vote::id(), vec![14, 0, 0, 0] => Some(("vote", "towerSync")) ; "vote tower sync")]
    #[test_case(bpf_loader_upgradeable::id(), vec![3, 0, 0, 0] => Some(("bpf-upgradeable-loader", "upgrade")) ; "loader upgrade")]
    #[test_case(compute_budget::id(), vec![3] => Some(("compute-budget", "setComputeUnitPrice")) ; "compute price")]
    #[test_case(ASSOCIATED_TOKEN_PROGRAM_ID, vec![] => Some(("spl-associated-token-account", "create")) ; "ata legacy create")]
    #[test_case(spl_token_2022_interface::id(), vec![44] => Some(("spl-token", "pausableExtension")) ; "token pausable")]
    #[test_case(system_program::id(), vec![99, 0, 0, 0] => None ; "unknown system opcode")]
    #[test_case(system_program::id(), vec![2] => None ; "short discriminant")]
    fn names(program: Pubkey, data: Vec<u8>) -> Option<(&'static str, &'static str)> {
        instruction_name(&program, &data)
    }
}
