//! SPL Token and Token-2022 state.
//!
//! Both programs share the base mint and account layouts, so everything here
//! unpacks through the Token-2022 types, which also accept classic data.

use solana_account_decoder::{
    parse_account_data::{
        AccountAdditionalDataV3, ParsedAccount, SplTokenAdditionalDataV2, parse_account_data_v3,
    },
    parse_token::{UiTokenAmount, get_token_account_mint, token_amount_to_ui_amount_v3},
};
use solana_program_option::COption;
use solana_program_pack::Pack;
use solana_pubkey::Pubkey;
use spl_token_2022_interface::{
    extension::{StateWithExtensions, StateWithExtensionsMut},
    state::{Account, Mint},
};

use super::{AccountInput, MintDecimals};
use crate::parsers::is_token_program;

/// Base mint state, ignoring any extensions. `None` for anything that is not
/// an initialized mint.
pub fn unpack_mint(data: &[u8]) -> Option<Mint> {
    StateWithExtensions::<Mint>::unpack(data)
        .ok()
        .map(|state| state.base)
}

/// Base token account state, ignoring any extensions.
pub fn unpack_token_account(data: &[u8]) -> Option<Account> {
    StateWithExtensions::<Account>::unpack(data)
        .ok()
        .map(|state| state.base)
}

/// Packs an extension-free mint.
pub fn pack_mint(mint: &Mint) -> Vec<u8> {
    let mut data = vec![0; Mint::LEN];
    mint.pack_into_slice(&mut data);
    data
}

/// Rewrites the mint authority of packed mint data in place, leaving supply,
/// decimals and any extensions untouched.
pub fn set_mint_authority(data: &mut [u8], authority: &Pubkey) -> Option<()> {
    let mut state = StateWithExtensionsMut::<Mint>::unpack(data).ok()?;
    state.base.mint_authority = COption::Some(*authority);
    state.pack_base();
    Some(())
}

pub fn ui_token_amount(amount: u64, decimals: u8) -> UiTokenAmount {
    token_amount_to_ui_amount_v3(amount, &SplTokenAdditionalDataV2::with_decimals(decimals))
}

pub fn matches(input: &AccountInput) -> bool {
    is_token_program(input.owner)
}

/// Token accounts need their mint's decimals; without them the account is
/// left unparsed.
pub fn decode(input: &AccountInput, mint_decimals: MintDecimals) -> Option<ParsedAccount> {
    let additional_data = match get_token_account_mint(input.data) {
        Some(mint) => Some(AccountAdditionalDataV3 {
            spl_token_additional_data: Some(SplTokenAdditionalDataV2::with_decimals(
                mint_decimals(&mint)?,
            )),
        }),
        None => None,
    };
    parse_account_data_v3(input.address, input.owner, input.data, additional_data).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use spl_token_2022_interface::extension::{
        BaseStateWithExtensionsMut, ExtensionType, metadata_pointer::MetadataPointer,
        mint_close_authority::MintCloseAuthority,
    };

    use super::*;

    fn parse(owner: &Pubkey, data: &[u8], decimals: Option<u8>) -> Option<ParsedAccount> {
        let address = Pubkey::new_unique();
        let input = AccountInput {
            address: &address,
            owner,
            data,
            lamports: 1,
            executable: false,
            rent_epoch: 0,
        };
        decode(&input, &move |_| decimals)
    }

    fn mint(authority: Option<Pubkey>, supply: u64, decimals: u8) -> Mint {
        Mint {
            mint_authority: authority.into(),
            supply,
            decimals,
            is_initialized: true,
            freeze_authority: COption::None,
        }
    }

    #[test]
    fn classic_mint_is_parsed() {
        let authority = Pubkey::new_unique();
        let packed = pack_mint(&mint(Some(authority), 1_000_000, 6));
        assert_eq!(packed.len(), Mint::LEN);

        let classic = spl_token_interface::state::Mint::unpack(&packed).unwrap();
        assert_eq!(classic.mint_authority, COption::Some(authority));
        assert_eq!(classic.decimals, 6);

        let parsed = parse(&spl_token_interface::id(), &packed, None).unwrap();
        assert_eq!(parsed.program, "spl-token");
        assert_eq!(parsed.space, Mint::LEN as u64);
        assert_eq!(parsed.parsed["type"], "mint");
        assert_eq!(parsed.parsed["info"]["supply"], "1000000");
        assert_eq!(parsed.parsed["info"]["mintAuthority"], authority.to_string());
        assert_eq!(parsed.parsed["info"]["freezeAuthority"], Value::Null);
    }

    #[test]
    fn adopting_authority_is_idempotent() {
        let faucet = Pubkey::new_unique();
        let mut data = pack_mint(&mint(None, 77, 2));
        set_mint_authority(&mut data, &faucet).unwrap();
        let once = data.clone();
        set_mint_authority(&mut data, &faucet).unwrap();
        assert_eq!(data, once);
        let adopted = unpack_mint(&data).unwrap();
        assert_eq!(adopted.mint_authority, COption::Some(faucet));
        assert_eq!(adopted.supply, 77);
        assert_eq!(adopted.decimals, 2);
    }

    #[test]
    fn adopting_authority_keeps_extensions() {
        let close_authority = Pubkey::new_unique();
        let len =
            ExtensionType::try_calculate_account_len::<Mint>(&[ExtensionType::MintCloseAuthority])
                .unwrap();
        let mut data = vec![0u8; len];
        {
            let mut state = StateWithExtensionsMut::<Mint>::unpack_uninitialized(&mut data).unwrap();
            let extension = state.init_extension::<MintCloseAuthority>(true).unwrap();
            extension.close_authority = Some(close_authority).try_into().unwrap();
            state.base = mint(None, 5, 0);
            state.pack_base();
            state.init_account_type().unwrap();
        }
        let before = data[Mint::LEN..].to_vec();

        let faucet = Pubkey::new_unique();
        set_mint_authority(&mut data, &faucet).unwrap();
        assert_eq!(data[Mint::LEN..], before[..]);
        assert_eq!(
            unpack_mint(&data).unwrap().mint_authority,
            COption::Some(faucet)
        );
        assert!(set_mint_authority(&mut [0u8; 40], &faucet).is_none());
    }

    #[test]
    fn token_account_with_amount() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let account = spl_token_interface::state::Account {
            mint,
            owner,
            amount: 2_500_000,
            state: spl_token_interface::state::AccountState::Initialized,
            ..Default::default()
        };
        let mut data = vec![0u8; Account::LEN];
        account.pack_into_slice(&mut data);

        let unpacked = unpack_token_account(&data).unwrap();
        assert_eq!(unpacked.mint, mint);
        assert_eq!(unpacked.amount, 2_500_000);
        assert!(unpack_mint(&data).is_none());

        let parsed = parse(&spl_token_interface::id(), &data, Some(6)).unwrap();
        let info = &parsed.parsed["info"];
        assert_eq!(parsed.parsed["type"], "account");
        assert_eq!(info["owner"], owner.to_string());
        assert_eq!(info["state"], "initialized");
        assert_eq!(info["isNative"], false);
        assert_eq!(info["tokenAmount"]["amount"], "2500000");
        assert_eq!(info["tokenAmount"]["uiAmountString"], "2.5");
        assert!(info.get("delegate").is_none());

        // without the mint's decimals the account cannot be rendered
        assert!(parse(&spl_token_interface::id(), &data, None).is_none());
    }

    #[test]
    fn token_2022_mint_reports_extensions() {
        let authority = Pubkey::new_unique();
        let mint_address = Pubkey::new_unique();
        let len = ExtensionType::try_calculate_account_len::<Mint>(&[
            ExtensionType::MetadataPointer,
        ])
        .unwrap();
        let mut data = vec![0u8; len];
        {
            let mut state = StateWithExtensionsMut::<Mint>::unpack_uninitialized(&mut data).unwrap();
            let pointer = state.init_extension::<MetadataPointer>(true).unwrap();
            pointer.authority = Some(authority).try_into().unwrap();
            pointer.metadata_address = Some(mint_address).try_into().unwrap();
            state.base = mint(Some(authority), 0, 9);
            state.pack_base();
            state.init_account_type().unwrap();
        }

        let parsed = parse(&spl_token_2022_interface::id(), &data, None).unwrap();
        assert_eq!(parsed.program, "spl-token-2022");
        assert_eq!(parsed.parsed["type"], "mint");
        assert_eq!(
            parsed.parsed["info"]["extensions"],
            json!([{
                "extension": "metadataPointer",
                "state": {
                    "authority": authority.to_string(),
                    "metadataAddress": mint_address.to_string(),
                },
            }])
        );
        assert_eq!(unpack_mint(&data).unwrap().decimals, 9);
    }

    #[test]
    fn short_data_declines() {
        assert!(parse(&spl_token_interface::id(), &[0u8; 40], Some(0)).is_none());
        assert!(unpack_mint(&[0u8; 40]).is_none());
        assert!(unpack_token_account(&[0u8; 40]).is_none());
    }

    #[test]
    fn ui_amounts_trim_trailing_zeros() {
        let amount = ui_token_amount(1_500_000, 6);
        assert_eq!(amount.amount, "1500000");
        assert_eq!(amount.ui_amount_string, "1.5");
        assert_eq!(amount.ui_amount, Some(1.5));
        assert_eq!(ui_token_amount(42, 0).ui_amount_string, "42");
    }
}
