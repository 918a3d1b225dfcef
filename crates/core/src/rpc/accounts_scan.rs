use jsonrpc_core::Result;
use jsonrpc_derive::rpc;
use solana_account::Account;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcTokenAccountsFilter},
    rpc_request::TokenAccountsFilter,
    rpc_response::{RpcKeyedAccount, RpcResponseContext, RpcTokenAccountBalance},
};
use solana_commitment_config::CommitmentConfig;
use solana_program_option::COption;
use solana_pubkey::Pubkey;
use solana_rpc_client_api::response::{OptionalContext, Response as RpcResponse};
use solforge_types::DEFAULT_OWNER_SCAN_LIMIT;

use super::{
    RunloopContext, State,
    utils::{
        apply_filters, encode_ui_account, verify_filters, verify_pubkey,
        verify_token_account_filter,
    },
};
use crate::{
    error::{SolforgeError, SolforgeResult},
    localnet::LocalnetState,
    parsers::{
        accounts::{token::ui_token_amount, unpack_mint, unpack_token_account},
        is_token_program,
    },
};

/// `getTokenLargestAccounts` returns at most this many accounts.
const MAX_LARGEST_ACCOUNTS: usize = 20;

#[rpc]
pub trait AccountsScan {
    type Metadata;

    /// Returns all accounts owned by the provided program.
    ///
    /// Candidates come from the index's owner scan; each is re-read from the
    /// engine so results reflect the live state. Supported filters are
    /// `dataSize`, `memcmp` and `tokenAccountState`. A cold index yields an
    /// empty list.
    ///
    /// ## Example Request
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "id": 1,
    ///   "method": "getProgramAccounts",
    ///   "params": [
    ///     "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
    ///     { "encoding": "jsonParsed", "filters": [{ "dataSize": 165 }] }
    ///   ]
    /// }
    /// ```
    #[rpc(meta, name = "getProgramAccounts")]
    fn get_program_accounts(
        &self,
        meta: Self::Metadata,
        program_id_str: String,
        config: Option<RpcProgramAccountsConfig>,
    ) -> Result<OptionalContext<Vec<RpcKeyedAccount>>>;

    /// Returns the token accounts held by `owner_str`, filtered by mint or by
    /// token program.
    #[rpc(meta, name = "getTokenAccountsByOwner")]
    fn get_token_accounts_by_owner(
        &self,
        meta: Self::Metadata,
        owner_str: String,
        token_account_filter: RpcTokenAccountsFilter,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Vec<RpcKeyedAccount>>>;

    /// Returns the token accounts that approved `delegate_str`.
    #[rpc(meta, name = "getTokenAccountsByDelegate")]
    fn get_token_accounts_by_delegate(
        &self,
        meta: Self::Metadata,
        delegate_str: String,
        token_account_filter: RpcTokenAccountsFilter,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Vec<RpcKeyedAccount>>>;

    /// Returns the 20 largest accounts of a mint, largest first.
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": {
    ///     "context": { "slot": 1114 },
    ///     "value": [
    ///       {
    ///         "address": "FYjHNoFtSQ5uijKrZFyYAxvEr87hsKXkXcxkcmkBAf4r",
    ///         "amount": "771",
    ///         "decimals": 2,
    ///         "uiAmount": 7.71,
    ///         "uiAmountString": "7.71"
    ///       }
    ///     ]
    ///   },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "getTokenLargestAccounts")]
    fn get_token_largest_accounts(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        commitment: Option<CommitmentConfig>,
    ) -> Result<RpcResponse<Vec<RpcTokenAccountBalance>>>;
}

/// Live accounts owned by `program_id`, using the index to find candidates.
fn scan_program(state: &LocalnetState, program_id: &Pubkey) -> SolforgeResult<Vec<(Pubkey, Account)>> {
    let snapshots = state
        .store
        .get_accounts_by_owner(&program_id.to_string(), DEFAULT_OWNER_SCAN_LIMIT)?;
    Ok(snapshots
        .iter()
        .filter_map(|snapshot| {
            let pubkey: Pubkey = snapshot.address.parse().ok()?;
            let account = state.engine.get_account(&pubkey)?;
            (account.owner == *program_id).then_some((pubkey, account))
        })
        .collect())
}

enum TokenAccountRole {
    Owner,
    Delegate,
}

fn scan_token_accounts(
    state: &LocalnetState,
    holder: &Pubkey,
    role: TokenAccountRole,
    filter: &TokenAccountsFilter,
) -> SolforgeResult<Vec<(Pubkey, Account)>> {
    let (programs, mint) = match filter {
        TokenAccountsFilter::ProgramId(program_id) => {
            if !is_token_program(program_id) {
                return Err(SolforgeError::invalid_params(format!(
                    "Invalid param: unrecognized Token program id {program_id}"
                )));
            }
            (vec![*program_id], None)
        }
        TokenAccountsFilter::Mint(mint) => {
            let programs = match state.engine.get_account(mint) {
                Some(account) if is_token_program(&account.owner) => vec![account.owner],
                _ => vec![spl_token_interface::id(), spl_token_2022_interface::id()],
            };
            (programs, Some(*mint))
        }
    };

    let mut found = vec![];
    for program_id in programs {
        for (pubkey, account) in scan_program(state, &program_id)? {
            let Some(token_account) = unpack_token_account(&account.data) else {
                continue;
            };
            let holder_matches = match role {
                TokenAccountRole::Owner => token_account.owner == *holder,
                TokenAccountRole::Delegate => token_account.delegate == COption::Some(*holder),
            };
            if holder_matches && mint.is_none_or(|mint| token_account.mint == mint) {
                found.push((pubkey, account));
            }
        }
    }
    Ok(found)
}

fn keyed_accounts(
    state: &LocalnetState,
    accounts: Vec<(Pubkey, Account)>,
    config: &RpcAccountInfoConfig,
) -> Vec<RpcKeyedAccount> {
    let encoding = config.encoding.unwrap_or(UiAccountEncoding::Binary);
    accounts
        .into_iter()
        .map(|(pubkey, account)| RpcKeyedAccount {
            pubkey: pubkey.to_string(),
            account: encode_ui_account(
                &pubkey,
                &account,
                encoding,
                &|mint| state.mint_decimals(mint),
                config.data_slice,
            ),
        })
        .collect()
}

#[derive(Clone)]
pub struct SolforgeAccountsScanRpc;
impl AccountsScan for SolforgeAccountsScanRpc {
    type Metadata = Option<RunloopContext>;

    fn get_program_accounts(
        &self,
        meta: Self::Metadata,
        program_id_str: String,
        config: Option<RpcProgramAccountsConfig>,
    ) -> Result<OptionalContext<Vec<RpcKeyedAccount>>> {
        let program_id = verify_pubkey(&program_id_str)?;
        let config = config.unwrap_or_default();
        let mut filters = config.filters.unwrap_or_default();
        verify_filters(&mut filters)?;
        let slot = meta.clock_snapshot()?.slot;

        let accounts = meta.with_state_reader(|state| {
            let matching: Vec<(Pubkey, Account)> = scan_program(state, &program_id)?
                .into_iter()
                .filter(|(_, account)| apply_filters(&account.data, &filters))
                .collect();
            Ok::<_, SolforgeError>(keyed_accounts(state, matching, &config.account_config))
        })??;

        Ok(if config.with_context.unwrap_or(false) {
            OptionalContext::Context(RpcResponse {
                context: RpcResponseContext::new(slot),
                value: accounts,
            })
        } else {
            OptionalContext::NoContext(accounts)
        })
    }

    fn get_token_accounts_by_owner(
        &self,
        meta: Self::Metadata,
        owner_str: String,
        token_account_filter: RpcTokenAccountsFilter,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Vec<RpcKeyedAccount>>> {
        let owner = verify_pubkey(&owner_str)?;
        let filter = verify_token_account_filter(token_account_filter)?;
        let config = config.unwrap_or_default();
        let slot = meta.clock_snapshot()?.slot;

        let value = meta.with_state_reader(|state| {
            let found = scan_token_accounts(state, &owner, TokenAccountRole::Owner, &filter)?;
            Ok::<_, SolforgeError>(keyed_accounts(state, found, &config))
        })??;
        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value,
        })
    }

    fn get_token_accounts_by_delegate(
        &self,
        meta: Self::Metadata,
        delegate_str: String,
        token_account_filter: RpcTokenAccountsFilter,
        config: Option<RpcAccountInfoConfig>,
    ) -> Result<RpcResponse<Vec<RpcKeyedAccount>>> {
        let delegate = verify_pubkey(&delegate_str)?;
        let filter = verify_token_account_filter(token_account_filter)?;
        let config = config.unwrap_or_default();
        let slot = meta.clock_snapshot()?.slot;

        let value = meta.with_state_reader(|state| {
            let found = scan_token_accounts(state, &delegate, TokenAccountRole::Delegate, &filter)?;
            Ok::<_, SolforgeError>(keyed_accounts(state, found, &config))
        })??;
        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value,
        })
    }

    fn get_token_largest_accounts(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        _commitment: Option<CommitmentConfig>,
    ) -> Result<RpcResponse<Vec<RpcTokenAccountBalance>>> {
        let mint = verify_pubkey(&mint_str)?;
        let slot = meta.clock_snapshot()?.slot;

        let value = meta.with_state_reader(|state| {
            let mint_account = state
                .engine
                .get_account(&mint)
                .ok_or_else(|| SolforgeError::token_mint_not_found(mint))?;
            if !is_token_program(&mint_account.owner) {
                return Err(SolforgeError::unpack_mint_account());
            }
            let decimals = unpack_mint(&mint_account.data)
                .ok_or_else(SolforgeError::unpack_mint_account)?
                .decimals;

            let mut balances: Vec<(Pubkey, u64)> = scan_program(state, &mint_account.owner)?
                .into_iter()
                .filter_map(|(pubkey, account)| {
                    let token_account = unpack_token_account(&account.data)?;
                    (token_account.mint == mint).then_some((pubkey, token_account.amount))
                })
                .collect();
            balances.sort_by(|a, b| b.1.cmp(&a.1));
            balances.truncate(MAX_LARGEST_ACCOUNTS);

            Ok::<_, SolforgeError>(
                balances
                    .into_iter()
                    .map(|(pubkey, amount)| RpcTokenAccountBalance {
                        address: pubkey.to_string(),
                        amount: ui_token_amount(amount, decimals),
                    })
                    .collect::<Vec<_>>(),
            )
        })??;

        Ok(RpcResponse {
            context: RpcResponseContext::new(slot),
            value,
        })
    }
}
