use serde_json::{Map, Value, json};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_pubkey::Pubkey;
use solana_sdk_ids::compute_budget;

use super::{InstructionInput, typed};

pub fn matches(program_id: &Pubkey) -> bool {
    *program_id == compute_budget::id()
}

/// The payload must be exactly one borsh-encoded instruction.
pub fn decode(input: &InstructionInput) -> Option<Value> {
    let instruction = borsh::from_slice::<ComputeBudgetInstruction>(input.data).ok()?;
    let mut info = Map::new();
    let instruction_type = match instruction {
        ComputeBudgetInstruction::Unused => return None,
        ComputeBudgetInstruction::RequestHeapFrame(bytes) => {
            info.insert("bytes".into(), json!(bytes));
            "requestHeapFrame"
        }
        ComputeBudgetInstruction::SetComputeUnitLimit(units) => {
            info.insert("units".into(), json!(units));
            "setComputeUnitLimit"
        }
        ComputeBudgetInstruction::SetComputeUnitPrice(micro_lamports) => {
            info.insert("microLamports".into(), json!(micro_lamports));
            "setComputeUnitPrice"
        }
        ComputeBudgetInstruction::SetLoadedAccountsDataSizeLimit(bytes) => {
            info.insert("bytes".into(), json!(bytes));
            "setLoadedAccountsDataSizeLimit"
        }
    };
    Some(typed(instruction_type, info))
}
