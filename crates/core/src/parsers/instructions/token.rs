//! SPL Token and Token-2022 instructions.
//!
//! The strict tier is the transaction-status token parser. When the keys do
//! not line up with the payload, the payload is still unpacked through the
//! token interface and whatever keys are present are attached.

use serde_json::{Map, Value, json};
use solana_program_option::COption;
use solana_pubkey::Pubkey;
use solana_transaction_status::parse_token::{UiAuthorityType, UiExtensionType};
use spl_token_2022_interface::instruction::{AuthorityType, TokenInstruction};

use super::{InstructionInput, decode_with_reference, names::token_instruction_name, typed};
use crate::parsers::accounts::token::ui_token_amount;

/// Instruction type and account labels of a base instruction (opcodes 0
/// through 24). The flag marks a trailing authority that may be a multisig.
struct Layout {
    name: &'static str,
    labels: &'static [&'static str],
    authority: bool,
}

impl Layout {
    const fn new(name: &'static str, labels: &'static [&'static str], authority: bool) -> Self {
        Self {
            name,
            labels,
            authority,
        }
    }
}

#[allow(deprecated)]
fn layout(instruction: &TokenInstruction) -> Option<Layout> {
    let layout = match instruction {
        TokenInstruction::InitializeMint { .. } => {
            Layout::new("initializeMint", &["mint", "rentSysvar"], false)
        }
        TokenInstruction::InitializeMint2 { .. } => Layout::new("initializeMint2", &["mint"], false),
        TokenInstruction::InitializeAccount => Layout::new(
            "initializeAccount",
            &["account", "mint", "owner", "rentSysvar"],
            false,
        ),
        TokenInstruction::InitializeMultisig { .. } => {
            Layout::new("initializeMultisig", &["multisig", "rentSysvar"], false)
        }
        TokenInstruction::InitializeMultisig2 { .. } => {
            Layout::new("initializeMultisig2", &["multisig"], false)
        }
        TokenInstruction::Transfer { .. } => {
            Layout::new("transfer", &["source", "destination", "authority"], true)
        }
        TokenInstruction::Approve { .. } => {
            Layout::new("approve", &["source", "delegate", "owner"], true)
        }
        TokenInstruction::Revoke => Layout::new("revoke", &["source", "owner"], true),
        TokenInstruction::SetAuthority { authority_type, .. } => match authority_type {
            AuthorityType::AccountOwner | AuthorityType::CloseAccount => {
                Layout::new("setAuthority", &["account", "authority"], true)
            }
            _ => Layout::new("setAuthority", &["mint", "authority"], true),
        },
        TokenInstruction::MintTo { .. } => {
            Layout::new("mintTo", &["mint", "account", "mintAuthority"], true)
        }
        TokenInstruction::MintToChecked { .. } => {
            Layout::new("mintToChecked", &["mint", "account", "mintAuthority"], true)
        }
        TokenInstruction::Burn { .. } => {
            Layout::new("burn", &["account", "mint", "authority"], true)
        }
        TokenInstruction::BurnChecked { .. } => {
            Layout::new("burnChecked", &["account", "mint", "authority"], true)
        }
        TokenInstruction::CloseAccount => {
            Layout::new("closeAccount", &["account", "destination", "owner"], true)
        }
        TokenInstruction::FreezeAccount => Layout::new(
            "freezeAccount",
            &["account", "mint", "freezeAuthority"],
            true,
        ),
        TokenInstruction::ThawAccount => {
            Layout::new("thawAccount", &["account", "mint", "freezeAuthority"], true)
        }
        TokenInstruction::TransferChecked { .. } => Layout::new(
            "transferChecked",
            &["source", "mint", "destination", "authority"],
            true,
        ),
        TokenInstruction::ApproveChecked { .. } => Layout::new(
            "approveChecked",
            &["source", "mint", "delegate", "owner"],
            true,
        ),
        TokenInstruction::InitializeAccount2 { .. } => Layout::new(
            "initializeAccount2",
            &["account", "mint", "rentSysvar"],
            false,
        ),
        TokenInstruction::SyncNative => Layout::new("syncNative", &["account"], false),
        TokenInstruction::InitializeAccount3 { .. } => {
            Layout::new("initializeAccount3", &["account", "mint"], false)
        }
        TokenInstruction::GetAccountDataSize { .. } => {
            Layout::new("getAccountDataSize", &["mint"], false)
        }
        TokenInstruction::InitializeImmutableOwner => {
            Layout::new("initializeImmutableOwner", &["account"], false)
        }
        TokenInstruction::AmountToUiAmount { .. } => {
            Layout::new("amountToUiAmount", &["mint"], false)
        }
        TokenInstruction::UiAmountToAmount { .. } => {
            Layout::new("uiAmountToAmount", &["mint"], false)
        }
        _ => return None,
    };
    Some(layout)
}

fn checked_decimals(instruction: &TokenInstruction) -> Option<u8> {
    match instruction {
        TokenInstruction::TransferChecked { decimals, .. }
        | TokenInstruction::ApproveChecked { decimals, .. }
        | TokenInstruction::MintToChecked { decimals, .. }
        | TokenInstruction::BurnChecked { decimals, .. } => Some(*decimals),
        _ => None,
    }
}

fn optional_key(key: &COption<Pubkey>) -> Value {
    match key {
        COption::Some(key) => json!(key.to_string()),
        COption::None => Value::Null,
    }
}

#[allow(deprecated)]
fn data_fields(instruction: &TokenInstruction, info: &mut Map<String, Value>) {
    match instruction {
        TokenInstruction::InitializeMint {
            decimals,
            mint_authority,
            freeze_authority,
        }
        | TokenInstruction::InitializeMint2 {
            decimals,
            mint_authority,
            freeze_authority,
        } => {
            info.insert("decimals".into(), json!(decimals));
            info.insert("mintAuthority".into(), json!(mint_authority.to_string()));
            if freeze_authority.is_some() {
                info.insert("freezeAuthority".into(), optional_key(freeze_authority));
            }
        }
        TokenInstruction::InitializeMultisig { m } | TokenInstruction::InitializeMultisig2 { m } => {
            info.insert("m".into(), json!(m));
        }
        TokenInstruction::Transfer { amount }
        | TokenInstruction::Approve { amount }
        | TokenInstruction::MintTo { amount }
        | TokenInstruction::Burn { amount }
        | TokenInstruction::AmountToUiAmount { amount } => {
            info.insert("amount".into(), json!(amount.to_string()));
        }
        TokenInstruction::SetAuthority {
            authority_type,
            new_authority,
        } => {
            info.insert(
                "authorityType".into(),
                json!(UiAuthorityType::from(authority_type.clone())),
            );
            info.insert("newAuthority".into(), optional_key(new_authority));
        }
        TokenInstruction::TransferChecked { amount, decimals }
        | TokenInstruction::ApproveChecked { amount, decimals }
        | TokenInstruction::MintToChecked { amount, decimals }
        | TokenInstruction::BurnChecked { amount, decimals } => {
            info.insert("tokenAmount".into(), json!(ui_token_amount(*amount, *decimals)));
        }
        TokenInstruction::InitializeAccount2 { owner }
        | TokenInstruction::InitializeAccount3 { owner } => {
            info.insert("owner".into(), json!(owner.to_string()));
        }
        TokenInstruction::GetAccountDataSize { extension_types } => {
            if !extension_types.is_empty() {
                let types: Vec<UiExtensionType> = extension_types
                    .iter()
                    .copied()
                    .map(UiExtensionType::from)
                    .collect();
                info.insert("extensionTypes".into(), json!(types));
            }
        }
        TokenInstruction::UiAmountToAmount { ui_amount } => {
            info.insert("uiAmount".into(), json!(ui_amount));
        }
        _ => {}
    }
}

fn multisig_label(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => format!("multisig{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "multisig".to_string(),
    }
}

/// Moves the authority entry to its multisig name when surplus signer
/// accounts follow it.
fn apply_multisig(input: &InstructionInput, layout: &Layout, info: &mut Map<String, Value>) {
    if !layout.authority || input.account_count() <= layout.labels.len() {
        return;
    }
    let Some(authority_label) = layout.labels.last() else {
        return;
    };
    if let Some(authority) = info.remove(*authority_label) {
        info.insert(multisig_label(authority_label), authority);
    }
    let signers: Vec<String> = (layout.labels.len()..input.account_count())
        .filter_map(|position| input.account(position))
        .map(|k| k.to_string())
        .collect();
    info.insert("signers".into(), json!(signers));
}

/// Data only; keys are filled when present, and a missing mint is recovered
/// from the transaction's token-balance hints.
fn decode_unchecked(input: &InstructionInput, instruction: &TokenInstruction) -> Option<Value> {
    let layout = layout(instruction)?;
    let mut info = input.partial_accounts(layout.labels);
    apply_multisig(input, &layout, &mut info);
    if layout.labels.contains(&"mint") && !info.contains_key("mint") {
        if let Some(mint) = mint_from_hints(input, checked_decimals(instruction)) {
            info.insert("mint".into(), json!(mint.to_string()));
        }
    }
    data_fields(instruction, &mut info);
    Some(typed(layout.name, info))
}

fn mint_from_hints(input: &InstructionInput, decimals: Option<u8>) -> Option<Pubkey> {
    let mut candidates = input
        .token_hints
        .iter()
        .filter(|hint| decimals.is_none_or(|d| d == hint.decimals))
        .map(|hint| hint.mint);
    let first = candidates.next()?;
    if candidates.all(|mint| mint == first) {
        Some(first)
    } else {
        None
    }
}

pub fn decode(input: &InstructionInput) -> Option<Value> {
    let opcode = *input.data.first()?;
    if let Some(parsed) = decode_with_reference(input) {
        return Some(parsed);
    }
    if let Some(parsed) = TokenInstruction::unpack(input.data)
        .ok()
        .and_then(|instruction| decode_unchecked(input, &instruction))
    {
        return Some(parsed);
    }
    let name = token_instruction_name(opcode)?;
    Some(typed(name, Map::new()))
}

#[cfg(test)]
mod tests {
    use solana_instruction::Instruction;
    use solana_message::Message;

    use super::*;
    use crate::parsers::instructions::TokenHint;

    fn input_for<'a>(
        ix: &'a Instruction,
        account_keys: &'a [Pubkey],
        indices: &'a [u8],
        hints: &'a [TokenHint],
    ) -> InstructionInput<'a> {
        InstructionInput {
            program_id: &ix.program_id,
            accounts: indices,
            data: &ix.data,
            account_keys,
            token_hints: hints,
        }
    }

    fn compiled(ix: &Instruction, payer: &Pubkey) -> (Vec<Pubkey>, Vec<u8>) {
        let message = Message::new(std::slice::from_ref(ix), Some(payer));
        (
            message.account_keys.clone(),
            message.instructions[0].accounts.clone(),
        )
    }

    #[test]
    fn transfer_checked_is_strictly_decoded() {
        let source = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let ix = spl_token_interface::instruction::transfer_checked(
            &spl_token_interface::id(),
            &source,
            &mint,
            &destination,
            &owner,
            &[],
            1_500_000,
            6,
        )
        .unwrap();
        let (keys, indices) = compiled(&ix, &owner);
        let parsed = decode(&input_for(&ix, &keys, &indices, &[])).unwrap();
        assert_eq!(parsed["type"], "transferChecked");
        let info = &parsed["info"];
        assert_eq!(info["source"], source.to_string());
        assert_eq!(info["mint"], mint.to_string());
        assert_eq!(info["destination"], destination.to_string());
        assert_eq!(info["authority"], owner.to_string());
        assert_eq!(info["tokenAmount"]["amount"], "1500000");
        assert_eq!(info["tokenAmount"]["uiAmount"], 1.5);
        assert_eq!(info["tokenAmount"]["uiAmountString"], "1.5");
    }

    #[test]
    fn multisig_transfer_lists_signers() {
        let source = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let multisig = Pubkey::new_unique();
        let signer_a = Pubkey::new_unique();
        let signer_b = Pubkey::new_unique();
        let ix = spl_token_interface::instruction::transfer(
            &spl_token_interface::id(),
            &source,
            &destination,
            &multisig,
            &[&signer_a, &signer_b],
            10,
        )
        .unwrap();
        let (keys, indices) = compiled(&ix, &signer_a);
        let parsed = decode(&input_for(&ix, &keys, &indices, &[])).unwrap();
        let info = &parsed["info"];
        assert_eq!(info["multisigAuthority"], multisig.to_string());
        assert!(info.get("authority").is_none());
        assert_eq!(
            info["signers"],
            json!([signer_a.to_string(), signer_b.to_string()])
        );
        assert_eq!(info["amount"], "10");
    }

    #[test]
    fn missing_mint_is_recovered_from_hints() {
        let source = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let ix = spl_token_interface::instruction::transfer_checked(
            &spl_token_interface::id(),
            &source,
            &mint,
            &destination,
            &owner,
            &[],
            5,
            2,
        )
        .unwrap();
        let keys = vec![owner, source, destination, ix.program_id];
        // only source is supplied
        let indices = [1u8];
        let hints = [
            TokenHint {
                mint,
                decimals: 2,
            },
            TokenHint {
                mint: Pubkey::new_unique(),
                decimals: 9,
            },
        ];
        let parsed = decode(&input_for(&ix, &keys, &indices, &hints)).unwrap();
        assert_eq!(parsed["type"], "transferChecked");
        assert_eq!(parsed["info"]["source"], source.to_string());
        assert_eq!(parsed["info"]["mint"], mint.to_string());
        assert_eq!(parsed["info"]["tokenAmount"]["uiAmountString"], "0.05");
        assert!(parsed["info"].get("destination").is_none());
    }

    #[test]
    fn short_set_authority_keeps_payload() {
        let account = Pubkey::new_unique();
        let new_owner = Pubkey::new_unique();
        let ix = spl_token_interface::instruction::set_authority(
            &spl_token_interface::id(),
            &account,
            Some(&new_owner),
            spl_token_interface::instruction::AuthorityType::AccountOwner,
            &Pubkey::new_unique(),
            &[],
        )
        .unwrap();
        let keys = vec![account];
        let parsed = decode(&input_for(&ix, &keys, &[0], &[])).unwrap();
        assert_eq!(parsed["type"], "setAuthority");
        assert_eq!(parsed["info"]["account"], account.to_string());
        assert_eq!(parsed["info"]["authorityType"], "accountOwner");
        assert_eq!(parsed["info"]["newAuthority"], new_owner.to_string());
    }

    #[test]
    fn extension_opcode_is_named() {
        let program = spl_token_2022_interface::id();
        let data = [39u8, 0, 1, 2];
        let input = InstructionInput {
            program_id: &program,
            accounts: &[],
            data: &data,
            account_keys: &[],
            token_hints: &[],
        };
        let parsed = decode(&input).unwrap();
        assert_eq!(parsed, json!({"type": "metadataPointerExtension", "info": {}}));
    }

    #[test]
    fn token_2022_extension_is_decoded() {
        let mint = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let ix =
            spl_token_2022_interface::extension::metadata_pointer::instruction::initialize(
                &spl_token_2022_interface::id(),
                &mint,
                Some(authority),
                Some(mint),
            )
            .unwrap();
        let (keys, indices) = compiled(&ix, &authority);
        let parsed = decode(&input_for(&ix, &keys, &indices, &[])).unwrap();
        assert_eq!(parsed["type"], "initializeMetadataPointer");
        assert_eq!(parsed["info"]["mint"], mint.to_string());
        assert_eq!(parsed["info"]["authority"], authority.to_string());
        assert_eq!(parsed["info"]["metadataAddress"], mint.to_string());
    }

    #[test]
    fn initialize_mint_reports_authorities() {
        let mint = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let freeze = Pubkey::new_unique();
        let ix = spl_token_interface::instruction::initialize_mint2(
            &spl_token_interface::id(),
            &mint,
            &authority,
            Some(&freeze),
            9,
        )
        .unwrap();
        let (keys, indices) = compiled(&ix, &authority);
        let parsed = decode(&input_for(&ix, &keys, &indices, &[])).unwrap();
        assert_eq!(parsed["type"], "initializeMint2");
        assert_eq!(parsed["info"]["decimals"], 9);
        assert_eq!(parsed["info"]["mintAuthority"], authority.to_string());
        assert_eq!(parsed["info"]["freezeAuthority"], freeze.to_string());
    }

    #[test]
    fn empty_payload_declines() {
        let program = spl_token_interface::id();
        let input = InstructionInput {
            program_id: &program,
            accounts: &[],
            data: &[],
            account_keys: &[],
            token_hints: &[],
        };
        assert!(decode(&input).is_none());
    }
}
