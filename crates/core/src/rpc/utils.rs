use solana_account::Account;
use solana_account_decoder::{UiAccount, UiAccountData, UiAccountEncoding, UiDataSliceConfig};
use solana_client::{
    rpc_config::RpcTokenAccountsFilter, rpc_filter::RpcFilterType,
    rpc_request::TokenAccountsFilter,
};
use solana_hash::Hash;
use solana_pubkey::{ParsePubkeyError, Pubkey};
use solana_signature::Signature;

use crate::{
    codec::{encode_base58, encode_base64},
    error::{SolforgeError, SolforgeResult},
    parsers::{AccountInput, parse_account},
};

pub fn verify_pubkey(input: &str) -> SolforgeResult<Pubkey> {
    input
        .parse()
        .map_err(|e: ParsePubkeyError| SolforgeError::invalid_pubkey(input, e.to_string()))
}

pub fn verify_pubkeys(input: &[String]) -> SolforgeResult<Vec<Pubkey>> {
    input
        .iter()
        .enumerate()
        .map(|(i, s)| {
            verify_pubkey(s)
                .map_err(|e| SolforgeError::invalid_pubkey_at_index(s, i, e.to_string()))
        })
        .collect::<SolforgeResult<Vec<_>>>()
}

pub fn verify_hash(input: &str) -> SolforgeResult<Hash> {
    input
        .parse()
        .map_err(|e| SolforgeError::invalid_params(format!("Invalid param: {e:?}")))
}

pub fn verify_signature(input: &str) -> SolforgeResult<Signature> {
    input
        .parse()
        .map_err(|e| SolforgeError::invalid_signature(input, format!("{e:?}")))
}

pub fn verify_token_account_filter(
    token_account_filter: RpcTokenAccountsFilter,
) -> SolforgeResult<TokenAccountsFilter> {
    match token_account_filter {
        RpcTokenAccountsFilter::Mint(mint_str) => {
            let mint = verify_pubkey(&mint_str)?;
            Ok(TokenAccountsFilter::Mint(mint))
        }
        RpcTokenAccountsFilter::ProgramId(program_id_str) => {
            let program_id = verify_pubkey(&program_id_str)?;
            Ok(TokenAccountsFilter::ProgramId(program_id))
        }
    }
}

pub fn verify_filters(filters: &mut [RpcFilterType]) -> SolforgeResult<()> {
    for filter in filters.iter_mut() {
        filter
            .verify()
            .map_err(|e| SolforgeError::invalid_params(format!("Invalid param: {e:?}")))?;
        if let RpcFilterType::Memcmp(compare) = filter {
            if let Err(err) = compare.convert_to_raw_bytes() {
                return Err(SolforgeError::invalid_params(format!(
                    "Invalid param: {err:?}"
                )));
            }
        }
    }
    Ok(())
}

/// True when `data` passes every filter. Token account state filters are
/// applied to token accounts only.
pub fn apply_filters(data: &[u8], filters: &[RpcFilterType]) -> bool {
    filters.iter().all(|filter| match filter {
        RpcFilterType::DataSize(size) => data.len() as u64 == *size,
        RpcFilterType::Memcmp(compare) => compare.bytes_match(data),
        RpcFilterType::TokenAccountState => {
            crate::parsers::accounts::unpack_token_account(data).is_some()
        }
    })
}

fn slice_data<'a>(data: &'a [u8], data_slice: Option<UiDataSliceConfig>) -> &'a [u8] {
    let Some(UiDataSliceConfig { offset, length }) = data_slice else {
        return data;
    };
    if offset >= data.len() {
        return &[];
    }
    let end = offset.saturating_add(length).min(data.len());
    &data[offset..end]
}

/// Renders an account the way `getAccountInfo` does for `encoding`.
/// `jsonParsed` falls back to base64 when no parser claims the account.
pub fn encode_ui_account(
    pubkey: &Pubkey,
    account: &Account,
    encoding: UiAccountEncoding,
    mint_decimals: &dyn Fn(&Pubkey) -> Option<u8>,
    data_slice: Option<UiDataSliceConfig>,
) -> UiAccount {
    let data = match encoding {
        UiAccountEncoding::JsonParsed => {
            let input = AccountInput {
                address: pubkey,
                owner: &account.owner,
                data: &account.data,
                lamports: account.lamports,
                executable: account.executable,
                rent_epoch: account.rent_epoch,
            };
            match parse_account(&input, mint_decimals) {
                Some(parsed) => UiAccountData::Json(parsed),
                None => UiAccountData::Binary(
                    encode_base64(slice_data(&account.data, data_slice)),
                    UiAccountEncoding::Base64,
                ),
            }
        }
        UiAccountEncoding::Binary => {
            UiAccountData::LegacyBinary(encode_base58(slice_data(&account.data, data_slice)))
        }
        UiAccountEncoding::Base58 => UiAccountData::Binary(
            encode_base58(slice_data(&account.data, data_slice)),
            UiAccountEncoding::Base58,
        ),
        UiAccountEncoding::Base64 | UiAccountEncoding::Base64Zstd => UiAccountData::Binary(
            encode_base64(slice_data(&account.data, data_slice)),
            UiAccountEncoding::Base64,
        ),
    };
    UiAccount {
        lamports: account.lamports,
        data,
        owner: account.owner.to_string(),
        executable: account.executable,
        rent_epoch: account.rent_epoch,
        space: Some(account.data.len() as u64),
    }
}

#[cfg(test)]
mod tests {
    use solana_client::rpc_filter::Memcmp;

    use super::*;

    #[test]
    fn pubkeys_report_failing_index() {
        let good = Pubkey::new_unique().to_string();
        let err = verify_pubkeys(&[good, "nope".to_string()]).unwrap_err();
        let err: jsonrpc_core::Error = err.into();
        assert!(err.message.contains("index 1") || err.message.contains("nope"));
    }

    #[test]
    fn memcmp_and_size_filters() {
        let data = vec![1u8, 2, 3, 4];
        let mut filters = vec![
            RpcFilterType::DataSize(4),
            RpcFilterType::Memcmp(Memcmp::new_raw_bytes(1, vec![2, 3])),
        ];
        verify_filters(&mut filters).unwrap();
        assert!(apply_filters(&data, &filters));
        assert!(!apply_filters(&[1, 2, 3], &filters));
        assert!(!apply_filters(&[1, 9, 3, 4], &filters));
    }

    #[test]
    fn data_slice_is_clamped() {
        let data = [0u8, 1, 2, 3, 4];
        assert_eq!(
            slice_data(&data, Some(UiDataSliceConfig { offset: 3, length: 10 })),
            &[3, 4]
        );
        assert!(slice_data(&data, Some(UiDataSliceConfig { offset: 9, length: 1 })).is_empty());
        assert_eq!(slice_data(&data, None), &data);
    }

    #[test]
    fn unparsed_account_falls_back_to_base64() {
        let pubkey = Pubkey::new_unique();
        let account = Account {
            lamports: 5,
            data: vec![7, 7],
            owner: Pubkey::new_unique(),
            executable: false,
            rent_epoch: 0,
        };
        let ui = encode_ui_account(&pubkey, &account, UiAccountEncoding::JsonParsed, &|_| None, None);
        assert_eq!(ui.data, UiAccountData::Binary("Bwc=".into(), UiAccountEncoding::Base64));
        assert_eq!(ui.space, Some(2));
    }
}
