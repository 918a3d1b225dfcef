//! Decodes raw account data into the `jsonParsed` shape.
//!
//! Empty system accounts are rendered here. Everything else goes through
//! `solana_account_decoder`; token accounts are given their mint's decimals
//! first.

mod system;
pub mod token;

use solana_account_decoder::parse_account_data::{
    PARSABLE_PROGRAM_IDS, ParsedAccount, parse_account_data_v3,
};
use solana_pubkey::Pubkey;

pub use token::{unpack_mint, unpack_token_account};

use crate::parsers::is_token_program;

pub struct AccountInput<'a> {
    pub address: &'a Pubkey,
    pub owner: &'a Pubkey,
    pub data: &'a [u8],
    pub lamports: u64,
    pub executable: bool,
    pub rent_epoch: u64,
}

/// Resolves a mint's decimals, used to render token account amounts.
pub type MintDecimals<'a> = &'a dyn Fn(&Pubkey) -> Option<u8>;

pub struct AccountDecoder {
    pub matches: fn(&AccountInput) -> bool,
    pub decode: fn(&AccountInput, MintDecimals) -> Option<ParsedAccount>,
}

pub const ACCOUNT_DECODERS: &[AccountDecoder] = &[
    AccountDecoder {
        matches: system::matches,
        decode: system::decode,
    },
    AccountDecoder {
        matches: token::matches,
        decode: token::decode,
    },
    AccountDecoder {
        matches: is_parsable_owner,
        decode: decode_owned,
    },
];

/// Nonce, loader, stake, vote, sysvar, config and lookup-table accounts.
fn is_parsable_owner(input: &AccountInput) -> bool {
    PARSABLE_PROGRAM_IDS.contains_key(input.owner) && !is_token_program(input.owner)
}

fn decode_owned(input: &AccountInput, _: MintDecimals) -> Option<ParsedAccount> {
    parse_account_data_v3(input.address, input.owner, input.data, None).ok()
}

pub fn parse_account(input: &AccountInput, mint_decimals: MintDecimals) -> Option<ParsedAccount> {
    ACCOUNT_DECODERS
        .iter()
        .filter(|decoder| (decoder.matches)(input))
        .find_map(|decoder| (decoder.decode)(input, mint_decimals))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use solana_loader_v3_interface::state::UpgradeableLoaderState;
    use solana_sdk_ids::{bpf_loader_upgradeable, system_program};

    use super::*;

    fn parse(owner: &Pubkey, data: &[u8], lamports: u64) -> Option<ParsedAccount> {
        let address = Pubkey::new_unique();
        let input = AccountInput {
            address: &address,
            owner,
            data,
            lamports,
            executable: false,
            rent_epoch: u64::MAX,
        };
        parse_account(&input, &|_| None)
    }

    #[test]
    fn unknown_owner_is_not_parsed() {
        assert!(parse(&Pubkey::new_unique(), &[1, 2, 3], 10).is_none());
    }

    #[test]
    fn empty_system_account() {
        let parsed = parse(&system_program::id(), &[], 1_500).unwrap();
        assert_eq!(parsed.program, "system");
        assert_eq!(parsed.space, 0);
        assert_eq!(
            parsed.parsed,
            json!({"type": "account", "info": {"lamports": 1_500}})
        );
    }

    #[test]
    fn initialized_nonce_account() {
        let authority = Pubkey::new_unique();
        let mut data = Vec::with_capacity(80);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(authority.as_ref());
        data.extend_from_slice(&[7u8; 32]);
        data.extend_from_slice(&5_000u64.to_le_bytes());

        let parsed = parse(&system_program::id(), &data, 1).unwrap();
        assert_eq!(parsed.program, "nonce");
        assert_eq!(parsed.space, 80);
        assert_eq!(parsed.parsed["type"], "initialized");
        assert_eq!(parsed.parsed["info"]["authority"], authority.to_string());
        assert_eq!(
            parsed.parsed["info"]["feeCalculator"]["lamportsPerSignature"],
            "5000"
        );

        // allocated system data that is not a nonce
        assert!(parse(&system_program::id(), &[0; 12], 1).is_none());
    }

    #[test]
    fn program_points_at_program_data() {
        let programdata_address = Pubkey::new_unique();
        let data = bincode::serialize(&UpgradeableLoaderState::Program {
            programdata_address,
        })
        .unwrap();
        let parsed = parse(&bpf_loader_upgradeable::id(), &data, 1).unwrap();
        assert_eq!(parsed.program, "bpf-upgradeable-loader");
        assert_eq!(parsed.parsed["type"], "program");
        assert_eq!(
            parsed.parsed["info"]["programData"],
            programdata_address.to_string()
        );
    }

    #[test]
    fn program_data_carries_elf() {
        let authority = Pubkey::new_unique();
        let mut data = bincode::serialize(&UpgradeableLoaderState::ProgramData {
            slot: 9,
            upgrade_authority_address: Some(authority),
        })
        .unwrap();
        data.extend_from_slice(b"\x7fELF");
        let parsed = parse(&bpf_loader_upgradeable::id(), &data, 1).unwrap();
        assert_eq!(parsed.parsed["type"], "programData");
        assert_eq!(parsed.parsed["info"]["slot"], 9);
        assert_eq!(parsed.parsed["info"]["authority"], authority.to_string());
        assert_eq!(
            parsed.parsed["info"]["data"],
            json!([crate::codec::encode_base64(b"\x7fELF"), "base64"])
        );
    }

    #[test]
    fn unknown_loader_tag_declines() {
        assert!(parse(&bpf_loader_upgradeable::id(), &7u32.to_le_bytes(), 1).is_none());
        assert_eq!(
            parse(&bpf_loader_upgradeable::id(), &0u32.to_le_bytes(), 1)
                .map(|parsed| parsed.parsed["type"].clone()),
            Some(Value::from("uninitialized"))
        );
    }
}
