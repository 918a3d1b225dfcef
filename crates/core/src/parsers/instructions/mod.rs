//! Decodes instruction payloads into the `jsonParsed` shape.
//!
//! Decoders are tried in the order of [`INSTRUCTION_DECODERS`]. A decoder that
//! matches the program id but cannot decode the payload yields `None`, and the
//! next matching decoder gets a chance. When every decoder declines, the
//! opcode-name table in [`names`] is consulted before falling back to the raw
//! `{programId, accounts, data}` view.
//!
//! Most programs are decoded by the transaction-status parser; compute budget
//! payloads are borsh-decoded here, and token instructions get an extra
//! key-tolerant tier.

mod compute_budget;
pub mod names;
mod token;

use serde_json::{Map, Value, json};
use solana_message::{AccountKeys, compiled_instruction::CompiledInstruction};
use solana_pubkey::Pubkey;
use solana_sdk_ids::{
    address_lookup_table, bpf_loader, bpf_loader_upgradeable, stake, system_program, vote,
};
use solana_transaction_status::{
    UiParsedInstruction, UiPartiallyDecodedInstruction,
    parse_instruction::{self, ParsedInstruction},
};

use crate::{
    codec::{decode_base58, encode_base58},
    parsers::{ASSOCIATED_TOKEN_PROGRAM_ID, MEMO_V1_PROGRAM_ID, MEMO_V3_PROGRAM_ID},
};

/// Mint and decimals observed in the enclosing transaction's token balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenHint {
    pub mint: Pubkey,
    pub decimals: u8,
}

pub struct InstructionInput<'a> {
    pub program_id: &'a Pubkey,
    /// Indices into `account_keys`.
    pub accounts: &'a [u8],
    pub data: &'a [u8],
    pub account_keys: &'a [Pubkey],
    pub token_hints: &'a [TokenHint],
}

impl InstructionInput<'_> {
    /// Key at position `position` of the instruction's account list.
    pub fn account(&self, position: usize) -> Option<&Pubkey> {
        let index = *self.accounts.get(position)? as usize;
        self.account_keys.get(index)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Fills whichever of `labels` resolve, skipping missing positions.
    pub fn partial_accounts(&self, labels: &[&str]) -> Map<String, Value> {
        let mut info = Map::new();
        for (position, label) in labels.iter().enumerate() {
            if let Some(key) = self.account(position) {
                info.insert(label.to_string(), json!(key.to_string()));
            }
        }
        info
    }
}

pub type DecodeFn = fn(&InstructionInput) -> Option<Value>;

pub struct InstructionDecoder {
    pub program: &'static str,
    pub matches: fn(&Pubkey) -> bool,
    /// Returns `{type, info}` (or a bare value for memo), `None` to decline.
    pub decode: DecodeFn,
}

pub const INSTRUCTION_DECODERS: &[InstructionDecoder] = &[
    InstructionDecoder {
        program: "spl-token",
        matches: crate::parsers::is_token_program,
        decode: token::decode,
    },
    InstructionDecoder {
        program: "spl-associated-token-account",
        matches: is_associated_token_program,
        decode: decode_with_reference,
    },
    InstructionDecoder {
        program: "system",
        matches: system_program::check_id,
        decode: decode_with_reference,
    },
    InstructionDecoder {
        program: "compute-budget",
        matches: compute_budget::matches,
        decode: compute_budget::decode,
    },
    InstructionDecoder {
        program: "stake",
        matches: stake::check_id,
        decode: decode_with_reference,
    },
    InstructionDecoder {
        program: "vote",
        matches: vote::check_id,
        decode: decode_with_reference,
    },
    InstructionDecoder {
        program: "address-lookup-table",
        matches: address_lookup_table::check_id,
        decode: decode_with_reference,
    },
    InstructionDecoder {
        program: "spl-memo",
        matches: is_memo_program,
        decode: decode_with_reference,
    },
    InstructionDecoder {
        program: "bpf-loader",
        matches: bpf_loader::check_id,
        decode: decode_with_reference,
    },
    InstructionDecoder {
        program: "bpf-upgradeable-loader",
        matches: bpf_loader_upgradeable::check_id,
        decode: decode_with_reference,
    },
];

fn is_associated_token_program(program_id: &Pubkey) -> bool {
    *program_id == ASSOCIATED_TOKEN_PROGRAM_ID
}

fn is_memo_program(program_id: &Pubkey) -> bool {
    *program_id == MEMO_V1_PROGRAM_ID || *program_id == MEMO_V3_PROGRAM_ID
}

/// Runs the transaction-status parser. Instructions that reference keys
/// outside `account_keys` are declined before it indexes them.
pub(crate) fn decode_with_reference(input: &InstructionInput) -> Option<Value> {
    if input
        .accounts
        .iter()
        .any(|index| *index as usize >= input.account_keys.len())
    {
        return None;
    }
    let instruction = CompiledInstruction {
        program_id_index: 0,
        accounts: input.accounts.to_vec(),
        data: input.data.to_vec(),
    };
    let account_keys = AccountKeys::new(input.account_keys, None);
    parse_instruction::parse(input.program_id, &instruction, &account_keys, None)
        .ok()
        .map(|parsed| parsed.parsed)
}

pub fn parse_instruction(
    program_id: &Pubkey,
    accounts: &[u8],
    data_base58: &str,
    account_keys: &[Pubkey],
    token_hints: &[TokenHint],
    stack_height: Option<u32>,
) -> UiParsedInstruction {
    let Some(data) = decode_base58(data_base58) else {
        return raw_instruction(program_id, accounts, data_base58, account_keys, stack_height);
    };
    let input = InstructionInput {
        program_id,
        accounts,
        data: &data,
        account_keys,
        token_hints,
    };

    for decoder in INSTRUCTION_DECODERS {
        if !(decoder.matches)(program_id) {
            continue;
        }
        if let Some(parsed) = (decoder.decode)(&input) {
            return UiParsedInstruction::Parsed(ParsedInstruction {
                program: decoder.program.to_string(),
                program_id: program_id.to_string(),
                parsed,
                stack_height,
            });
        }
    }

    if let Some((program, instruction_type)) = names::instruction_name(program_id, &data) {
        return UiParsedInstruction::Parsed(ParsedInstruction {
            program: program.to_string(),
            program_id: program_id.to_string(),
            parsed: json!({ "type": instruction_type, "info": {} }),
            stack_height,
        });
    }

    raw_instruction(program_id, accounts, data_base58, account_keys, stack_height)
}

pub fn parse_compiled_instruction(
    instruction: &CompiledInstruction,
    account_keys: &[Pubkey],
    token_hints: &[TokenHint],
    stack_height: Option<u32>,
) -> UiParsedInstruction {
    let Some(program_id) = account_keys.get(instruction.program_id_index as usize) else {
        return UiParsedInstruction::PartiallyDecoded(UiPartiallyDecodedInstruction {
            program_id: format!("unknown:{}", instruction.program_id_index),
            accounts: vec![],
            data: encode_base58(&instruction.data),
            stack_height,
        });
    };
    parse_instruction(
        program_id,
        &instruction.accounts,
        &encode_base58(&instruction.data),
        account_keys,
        token_hints,
        stack_height,
    )
}

fn raw_instruction(
    program_id: &Pubkey,
    accounts: &[u8],
    data_base58: &str,
    account_keys: &[Pubkey],
    stack_height: Option<u32>,
) -> UiParsedInstruction {
    UiParsedInstruction::PartiallyDecoded(UiPartiallyDecodedInstruction {
        program_id: program_id.to_string(),
        accounts: accounts
            .iter()
            .filter_map(|i| account_keys.get(*i as usize))
            .map(|k| k.to_string())
            .collect(),
        data: data_base58.to_string(),
        stack_height,
    })
}

/// Resolves an instruction's account indices to keys.
pub fn instruction_account_keys(indices: &[u8], account_keys: &[Pubkey]) -> Option<Vec<Pubkey>> {
    indices
        .iter()
        .map(|i| account_keys.get(*i as usize).copied())
        .collect()
}

/// Maps keys back to their index in `account_keys`.
pub fn instruction_account_indices(keys: &[Pubkey], account_keys: &[Pubkey]) -> Option<Vec<u8>> {
    keys.iter()
        .map(|key| {
            account_keys
                .iter()
                .position(|k| k == key)
                .and_then(|p| u8::try_from(p).ok())
        })
        .collect()
}

pub(crate) fn typed(instruction_type: &str, info: Map<String, Value>) -> Value {
    json!({ "type": instruction_type, "info": Value::Object(info) })
}
