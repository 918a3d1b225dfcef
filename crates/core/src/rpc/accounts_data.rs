use jsonrpc_core::Result;
use jsonrpc_derive::rpc;
use solana_account_decoder::{UiAccount, UiAccountEncoding, parse_token::UiTokenAmount};
use solana_client::{rpc_config::RpcAccountInfoConfig, rpc_response::RpcResponseContext};
use solana_commitment_config::CommitmentConfig;
use solana_rpc_client_api::response::Response as RpcResponse;

use super::{
    RunloopContext, State,
    utils::{encode_ui_account, verify_pubkey, verify_pubkeys},
};
use crate::{
    error::SolforgeError,
    parsers::{
        accounts::{token::ui_token_amount, unpack_mint, unpack_token_account},
        is_token_program,
    },
};

/// Upper bound on `getMultipleAccounts` keys, as enforced by validators.
pub const MAX_MULTIPLE_ACCOUNTS: usize = 100;

#[rpc]
pub trait AccountsData {
    type Metadata;

    /// Returns all information associated with the account of the provided pubkey.
    ///
    /// `encoding` defaults to `binary` (plain base-58). With `jsonParsed`,
    /// accounts no parser claims come back as base64.
    ///
    /// ## Example Request
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "id": 1,
    ///   "method": "getAccountInfo",
    ///   "params": [
    ///     "vines1vzrYbzLMRdu58ou5XTby4qAqVRLmqo36NKPTg",
    ///     { "encoding": "base64" }
    ///   ]
    /// }
    /// ```
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": {
    ///     "context": { "slot": 134461197 },
    ///     "value": {
    ///       "data": ["", "base64"],
    ///       "executable": false,
    ///       "lamports": 410426055,
    ///       "owner": "11111111111111111111111111111111",
    ///       "rentEpoch": 0,
    ///       "space": 0
    ///     }
    ///   },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "getAccountInfo")]
    fn get_account_info(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Option<UiAccount>>>;

    /// Returns the account information for a list of pubkeys, in request
    /// order, with `null` for unknown accounts.
    #[rpc(meta, name = "getMultipleAccounts")]
    fn get_multiple_accounts(
        &self,
        meta: Self::Metadata,
        pubkey_strs: Vec<String>,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Vec<Option<UiAccount>>>>;

    /// Returns the token balance of an SPL Token account.
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": {
    ///     "context": { "slot": 1114 },
    ///     "value": {
    ///       "amount": "9864",
    ///       "decimals": 2,
    ///       "uiAmount": 98.64,
    ///       "uiAmountString": "98.64"
    ///     }
    ///   },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "getTokenAccountBalance")]
    fn get_token_account_balance(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        commitment: Option<CommitmentConfig>,
    ) -> Result<RpcResponse<UiTokenAmount>>;

    /// Returns the total supply of an SPL Token mint.
    #[rpc(meta, name = "getTokenSupply")]
    fn get_token_supply(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        commitment: Option<CommitmentConfig>,
    ) -> Result<RpcResponse<UiTokenAmount>>;
}

#[derive(Clone)]
pub struct SolforgeAccountsDataRpc;
impl AccountsData for SolforgeAccountsDataRpc {
    type Metadata = Option<RunloopContext>;

    fn get_account_info(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Option<UiAccount>>> {
        let pubkey = verify_pubkey(&pubkey_str)?;
        let config = config.unwrap_or_default();
        let encoding = config.encoding.unwrap_or(UiAccountEncoding::Binary);
        let slot = meta.clock_snapshot()?.slot;
        let locker = meta.get_locker()?;

        let account = locker.get_account(&pubkey);
        let value = account.map(|account| {
            locker.with_state_reader(|state| {
                encode_ui_account(
                    &pubkey,
                    &account,
                    encoding,
                    &|mint| state.mint_decimals(mint),
                    config.data_slice,
                )
            })
        });
        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value,
        })
    }

    fn get_multiple_accounts(
        &self,
        meta: Self::Metadata,
        pubkey_strs: Vec<String>,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Vec<Option<UiAccount>>>> {
        if pubkey_strs.len() > MAX_MULTIPLE_ACCOUNTS {
            return Err(SolforgeError::invalid_params(format!(
                "Too many inputs provided; max {MAX_MULTIPLE_ACCOUNTS}"
            ))
            .into());
        }
        let pubkeys = verify_pubkeys(&pubkey_strs)?;
        let config = config.unwrap_or_default();
        let encoding = config.encoding.unwrap_or(UiAccountEncoding::Base64);
        let slot = meta.clock_snapshot()?.slot;
        let locker = meta.get_locker()?;

        let accounts = locker.get_accounts(&pubkeys);
        let value = locker.with_state_reader(|state| {
            pubkeys
                .iter()
                .zip(accounts)
                .map(|(pubkey, account)| {
                    account.map(|account| {
                        encode_ui_account(
                            pubkey,
                            &account,
                            encoding,
                            &|mint| state.mint_decimals(mint),
                            config.data_slice,
                        )
                    })
                })
                .collect()
        });
        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value,
        })
    }

    fn get_token_account_balance(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        _commitment: Option<CommitmentConfig>,
    ) -> Result<RpcResponse<UiTokenAmount>> {
        let pubkey = verify_pubkey(&pubkey_str)?;
        let slot = meta.clock_snapshot()?.slot;

        let amount = meta.with_state_reader(|state| {
            let account = state
                .engine
                .get_account(&pubkey)
                .ok_or_else(|| SolforgeError::account_not_found(pubkey))?;
            if !is_token_program(&account.owner) {
                return Err(SolforgeError::invalid_account_data(
                    pubkey,
                    "Account is not owned by Token or Token-2022 program",
                ));
            }
            let token_account = unpack_token_account(&account.data)
                .ok_or_else(SolforgeError::unpack_token_account)?;
            let decimals = state
                .mint_decimals(&token_account.mint)
                .ok_or_else(|| SolforgeError::token_mint_not_found(token_account.mint))?;
            Ok(ui_token_amount(token_account.amount, decimals))
        })??;

        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value: amount,
        })
    }

    fn get_token_supply(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        _commitment: Option<CommitmentConfig>,
    ) -> Result<RpcResponse<UiTokenAmount>> {
        let mint = verify_pubkey(&mint_str)?;
        let slot = meta.clock_snapshot()?.slot;

        let supply = meta.with_state_reader(|state| {
            let account = state
                .engine
                .get_account(&mint)
                .ok_or_else(|| SolforgeError::token_mint_not_found(mint))?;
            if !is_token_program(&account.owner) {
                return Err(SolforgeError::invalid_account_data(
                    mint,
                    "Account is not a token mint account",
                ));
            }
            let mint_state =
                unpack_mint(&account.data).ok_or_else(SolforgeError::unpack_mint_account)?;
            Ok(ui_token_amount(mint_state.supply, mint_state.decimals))
        })??;

        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value: supply,
        })
    }
}
