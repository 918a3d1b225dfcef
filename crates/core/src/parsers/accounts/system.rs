use serde_json::json;
use solana_account_decoder::parse_account_data::ParsedAccount;
use solana_sdk_ids::system_program;

use super::{AccountInput, MintDecimals};

/// Plain wallets carry no data; nonce accounts are left to the account
/// decoder.
pub fn matches(input: &AccountInput) -> bool {
    *input.owner == system_program::id() && input.data.is_empty()
}

pub fn decode(input: &AccountInput, _: MintDecimals) -> Option<ParsedAccount> {
    Some(ParsedAccount {
        program: "system".to_string(),
        parsed: json!({ "type": "account", "info": { "lamports": input.lamports } }),
        space: 0,
    })
}
