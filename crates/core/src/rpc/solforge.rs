use jsonrpc_core::{BoxFuture, Result};
use jsonrpc_derive::rpc;
use solana_epoch_info::EpochInfo;
use solana_pubkey::Pubkey;
use solforge_types::{ClockCommand, NodeCommand};
use spl_token_2022_interface::state::Mint;

use super::{RunloopContext, State, utils::verify_pubkey};
use crate::{
    codec::decode_base64,
    error::SolforgeError,
    parsers::accounts::unpack_mint,
};

/// Decimals of a mint created without an explicit value.
const DEFAULT_MINT_DECIMALS: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetStatus {
    pub address: String,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub slot: u64,
    pub block_height: u64,
    pub transaction_count: u64,
    pub faucet: FaucetStatus,
    pub known_mints: usize,
    pub known_programs: usize,
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintView {
    pub mint: String,
    pub decimals: u8,
    pub supply: String,
    pub mint_authority: Option<String>,
}

impl MintView {
    fn new(mint: &Pubkey, state: &Mint) -> Self {
        Self {
            mint: mint.to_string(),
            decimals: state.decimals,
            supply: state.supply.to_string(),
            mint_authority: Option::<Pubkey>::from(state.mint_authority)
                .map(|authority| authority.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMintConfig {
    pub decimals: Option<u8>,
    pub mint: Option<String>,
    pub authority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintToResult {
    pub signature: String,
    pub token_account: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneConfig {
    /// Overrides the node's remote endpoint for this call.
    pub endpoint: Option<String>,
}

#[rpc]
pub trait Solforge {
    type Metadata;

    /// Returns the node's clock, faucet, registry and persistence state.
    ///
    /// ## Example Response
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "result": {
    ///     "slot": 42,
    ///     "blockHeight": 42,
    ///     "transactionCount": 3,
    ///     "faucet": { "address": "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2", "balance": 499999000000000 },
    ///     "knownMints": 2,
    ///     "knownPrograms": 0,
    ///     "persistent": false
    ///   },
    ///   "id": 1
    /// }
    /// ```
    #[rpc(meta, name = "solforgeGetStatus")]
    fn get_status(&self, meta: Self::Metadata) -> Result<NodeStatus>;

    /// Lists every mint the node has seen, with its current supply.
    #[rpc(meta, name = "solforgeListMints")]
    fn list_mints(&self, meta: Self::Metadata) -> Result<Vec<MintView>>;

    #[rpc(meta, name = "solforgeListPrograms")]
    fn list_programs(&self, meta: Self::Metadata) -> Result<Vec<String>>;

    /// Writes a fresh mint account. The mint authority defaults to the
    /// faucet, and the mint address to a new random key.
    ///
    /// ## Example Request
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "id": 1,
    ///   "method": "solforgeCreateMint",
    ///   "params": [{ "decimals": 6 }]
    /// }
    /// ```
    #[rpc(meta, name = "solforgeCreateMint")]
    fn create_mint(
        &self,
        meta: Self::Metadata,
        config: Option<CreateMintConfig>,
    ) -> Result<MintView>;

    /// Mints `amount` base units to the owner's associated token account,
    /// creating it when needed. The transaction is signed by the faucet and
    /// recorded like any other submission. The faucet must be the mint
    /// authority.
    #[rpc(meta, name = "solforgeMintTo")]
    fn mint_to(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        owner_str: String,
        amount: u64,
    ) -> Result<MintToResult>;

    /// Rewrites the mint authority of `mint_str` to the faucet. Calling it
    /// again is a no-op.
    #[rpc(meta, name = "solforgeAdoptMintAuthority")]
    fn adopt_mint_authority(&self, meta: Self::Metadata, mint_str: String) -> Result<MintView>;

    /// Copies an account from the remote endpoint into the local ledger.
    /// Returns the addresses written. A missing account is error `-32004`.
    #[rpc(meta, name = "solforgeCloneAccount")]
    fn clone_account(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>>;

    /// Copies a program and, when upgradeable, its programdata account.
    #[rpc(meta, name = "solforgeCloneProgram")]
    fn clone_program(
        &self,
        meta: Self::Metadata,
        program_id_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>>;

    #[rpc(meta, name = "solforgeCloneTokenMint")]
    fn clone_token_mint(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>>;

    /// Copies the owner's associated token account for `mint_str`. The mint
    /// is copied too when it is not present locally.
    #[rpc(meta, name = "solforgeCloneTokenAccount")]
    fn clone_token_account(
        &self,
        meta: Self::Metadata,
        owner_str: String,
        mint_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>>;

    /// Deploys a base64 ELF as an upgradeable program owned by the faucet.
    #[rpc(meta, name = "solforgeLoadProgram")]
    fn load_program(
        &self,
        meta: Self::Metadata,
        program_id_str: String,
        elf_base64: String,
    ) -> Result<String>;

    /// Stops slot production until `solforgeResumeClock`. Submissions still
    /// advance the clock.
    #[rpc(meta, name = "solforgePauseClock")]
    fn pause_clock(&self, meta: Self::Metadata) -> Result<EpochInfo>;

    #[rpc(meta, name = "solforgeResumeClock")]
    fn resume_clock(&self, meta: Self::Metadata) -> Result<EpochInfo>;
}

fn addresses(pubkeys: Vec<Pubkey>) -> Vec<String> {
    pubkeys.iter().map(|pubkey| pubkey.to_string()).collect()
}

#[derive(Clone)]
pub struct SolforgeAdminRpc;
impl Solforge for SolforgeAdminRpc {
    type Metadata = Option<RunloopContext>;

    fn get_status(&self, meta: Self::Metadata) -> Result<NodeStatus> {
        let status = meta.with_state_reader(|state| NodeStatus {
            slot: state.clock.slot,
            block_height: state.clock.block_height,
            transaction_count: state.clock.transaction_count,
            faucet: FaucetStatus {
                address: state.faucet.pubkey().to_string(),
                balance: state.faucet.balance(&state.engine),
            },
            known_mints: state.known_mints.len(),
            known_programs: state.known_programs.len(),
            persistent: state.store.is_persistent(),
        })?;
        Ok(status)
    }

    fn list_mints(&self, meta: Self::Metadata) -> Result<Vec<MintView>> {
        let mints = meta.with_state_reader(|state| {
            state
                .known_mints
                .iter()
                .filter_map(|mint| {
                    let account = state.engine.get_account(mint)?;
                    let mint_state = unpack_mint(&account.data)?;
                    Some(MintView::new(mint, &mint_state))
                })
                .collect::<Vec<_>>()
        })?;
        Ok(mints)
    }

    fn list_programs(&self, meta: Self::Metadata) -> Result<Vec<String>> {
        let programs = meta.with_state_reader(|state| {
            state
                .known_programs
                .iter()
                .map(|program| program.to_string())
                .collect::<Vec<_>>()
        })?;
        Ok(programs)
    }

    fn create_mint(
        &self,
        meta: Self::Metadata,
        config: Option<CreateMintConfig>,
    ) -> Result<MintView> {
        let config = config.unwrap_or_default();
        let mint = config.mint.as_deref().map(verify_pubkey).transpose()?;
        let authority = config.authority.as_deref().map(verify_pubkey).transpose()?;
        let decimals = config.decimals.unwrap_or(DEFAULT_MINT_DECIMALS);

        let locker = meta.get_locker()?;
        let (mint, mint_state) = locker.create_mint(decimals, mint, authority)?;
        Ok(MintView::new(&mint, &mint_state))
    }

    fn mint_to(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        owner_str: String,
        amount: u64,
    ) -> Result<MintToResult> {
        let mint = verify_pubkey(&mint_str)?;
        let owner = verify_pubkey(&owner_str)?;
        let locker = meta.get_locker()?;
        let receipt = locker.mint_to(&mint, &owner, amount)?;
        Ok(MintToResult {
            signature: receipt.signature,
            token_account: receipt.token_account.to_string(),
        })
    }

    fn adopt_mint_authority(&self, meta: Self::Metadata, mint_str: String) -> Result<MintView> {
        let mint = verify_pubkey(&mint_str)?;
        let locker = meta.get_locker()?;
        let mint_state = locker.adopt_mint_authority(&mint)?;
        Ok(MintView::new(&mint, &mint_state))
    }

    fn clone_account(
        &self,
        meta: Self::Metadata,
        pubkey_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>> {
        let pubkey = match verify_pubkey(&pubkey_str) {
            Ok(res) => res,
            Err(e) => return e.into(),
        };
        let (locker, remote) = match meta
            .get_locker()
            .and_then(|locker| Ok((locker, meta.get_remote_client(config.unwrap_or_default().endpoint)?)))
        {
            Ok(res) => res,
            Err(e) => return e.into(),
        };

        Box::pin(async move {
            let cloned = locker.clone_account(&remote, pubkey).await?;
            Ok(addresses(cloned))
        })
    }

    fn clone_program(
        &self,
        meta: Self::Metadata,
        program_id_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>> {
        let program_id = match verify_pubkey(&program_id_str) {
            Ok(res) => res,
            Err(e) => return e.into(),
        };
        let (locker, remote) = match meta
            .get_locker()
            .and_then(|locker| Ok((locker, meta.get_remote_client(config.unwrap_or_default().endpoint)?)))
        {
            Ok(res) => res,
            Err(e) => return e.into(),
        };

        Box::pin(async move {
            let cloned = locker.clone_program(&remote, program_id).await?;
            Ok(addresses(cloned))
        })
    }

    fn clone_token_mint(
        &self,
        meta: Self::Metadata,
        mint_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>> {
        let mint = match verify_pubkey(&mint_str) {
            Ok(res) => res,
            Err(e) => return e.into(),
        };
        let (locker, remote) = match meta
            .get_locker()
            .and_then(|locker| Ok((locker, meta.get_remote_client(config.unwrap_or_default().endpoint)?)))
        {
            Ok(res) => res,
            Err(e) => return e.into(),
        };

        Box::pin(async move {
            let cloned = locker.clone_token_mint(&remote, mint).await?;
            Ok(addresses(cloned))
        })
    }

    fn clone_token_account(
        &self,
        meta: Self::Metadata,
        owner_str: String,
        mint_str: String,
        config: Option<CloneConfig>,
    ) -> BoxFuture<Result<Vec<String>>> {
        let (owner, mint) = match verify_pubkey(&owner_str)
            .and_then(|owner| Ok((owner, verify_pubkey(&mint_str)?)))
        {
            Ok(res) => res,
            Err(e) => return e.into(),
        };
        let (locker, remote) = match meta
            .get_locker()
            .and_then(|locker| Ok((locker, meta.get_remote_client(config.unwrap_or_default().endpoint)?)))
        {
            Ok(res) => res,
            Err(e) => return e.into(),
        };

        Box::pin(async move {
            let cloned = locker.clone_token_account(&remote, owner, mint).await?;
            Ok(addresses(cloned))
        })
    }

    fn load_program(
        &self,
        meta: Self::Metadata,
        program_id_str: String,
        elf_base64: String,
    ) -> Result<String> {
        let program_id = verify_pubkey(&program_id_str)?;
        let elf = decode_base64(&elf_base64)
            .ok_or_else(|| SolforgeError::invalid_base64_data("program", "invalid base64"))?;
        if elf.is_empty() {
            return Err(SolforgeError::invalid_params("program data is empty").into());
        }
        let locker = meta.get_locker()?;
        locker.load_program(program_id, &elf)?;
        Ok(program_id.to_string())
    }

    fn pause_clock(&self, meta: Self::Metadata) -> Result<EpochInfo> {
        let node_commands_tx = meta.get_node_commands_tx()?;
        node_commands_tx
            .try_send(NodeCommand::UpdateClock(ClockCommand::Pause))
            .map_err(SolforgeError::from)?;
        Ok(meta.clock_snapshot()?.epoch_info())
    }

    fn resume_clock(&self, meta: Self::Metadata) -> Result<EpochInfo> {
        let node_commands_tx = meta.get_node_commands_tx()?;
        node_commands_tx
            .try_send(NodeCommand::UpdateClock(ClockCommand::Resume))
            .map_err(SolforgeError::from)?;
        Ok(meta.clock_snapshot()?.epoch_info())
    }
}

#[cfg(test)]
mod tests {
    use jsonrpc_core::ErrorCode;
    use solana_signer::Signer;

    use super::*;
    use crate::tests::helpers::TestSetup;

    #[test]
    fn test_get_status() {
        let setup = TestSetup::new(SolforgeAdminRpc);
        let status = setup.rpc.get_status(Some(setup.context.clone())).unwrap();
        assert_eq!(status.faucet.address, setup.faucet().pubkey().to_string());
        assert!(status.faucet.balance > 0);
        assert!(!status.persistent);
        // The native mint is known from the start.
        assert_eq!(status.known_mints, 1);
    }

    #[test]
    fn test_create_mint_defaults_to_faucet_authority() {
        let setup = TestSetup::new(SolforgeAdminRpc);
        let mint = setup
            .rpc
            .create_mint(
                Some(setup.context.clone()),
                Some(CreateMintConfig {
                    decimals: Some(6),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(mint.decimals, 6);
        assert_eq!(mint.supply, "0");
        assert_eq!(
            mint.mint_authority,
            Some(setup.faucet().pubkey().to_string())
        );

        let mints = setup.rpc.list_mints(Some(setup.context)).unwrap();
        assert!(mints.iter().any(|m| m.mint == mint.mint));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mint_to_updates_supply() {
        let setup = TestSetup::new(SolforgeAdminRpc);
        let mint = setup
            .rpc
            .create_mint(Some(setup.context.clone()), None)
            .unwrap();
        let owner = Pubkey::new_unique();
        let res = setup
            .rpc
            .mint_to(
                Some(setup.context.clone()),
                mint.mint.clone(),
                owner.to_string(),
                5_000,
            )
            .unwrap();
        assert!(
            setup
                .context
                .locker
                .get_signature_status(&res.signature)
                .is_some()
        );

        let mints = setup.rpc.list_mints(Some(setup.context)).unwrap();
        let updated = mints.iter().find(|m| m.mint == mint.mint).unwrap();
        assert_eq!(updated.supply, "5000");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_adopt_mint_authority_is_idempotent() {
        let setup = TestSetup::new(SolforgeAdminRpc);
        let foreign = Pubkey::new_unique();
        let mint = setup
            .rpc
            .create_mint(
                Some(setup.context.clone()),
                Some(CreateMintConfig {
                    decimals: Some(2),
                    authority: Some(foreign.to_string()),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(mint.mint_authority, Some(foreign.to_string()));

        let err = setup
            .rpc
            .mint_to(
                Some(setup.context.clone()),
                mint.mint.clone(),
                Pubkey::new_unique().to_string(),
                1,
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);

        let first = setup
            .rpc
            .adopt_mint_authority(Some(setup.context.clone()), mint.mint.clone())
            .unwrap();
        let second = setup
            .rpc
            .adopt_mint_authority(Some(setup.context), mint.mint.clone())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.decimals, 2);
        assert_eq!(first.supply, "0");
    }

    #[test]
    fn test_load_program_rejects_bad_payload() {
        let setup = TestSetup::new(SolforgeAdminRpc);
        let err = setup
            .rpc
            .load_program(
                Some(setup.context),
                Pubkey::new_unique().to_string(),
                "%%%".into(),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[test]
    fn test_pause_and_resume_send_clock_commands() {
        let setup = TestSetup::new(SolforgeAdminRpc);
        setup.rpc.pause_clock(Some(setup.context.clone())).unwrap();
        setup.rpc.resume_clock(Some(setup.context)).unwrap();
        assert!(matches!(
            setup.node_commands_rx.try_recv(),
            Ok(NodeCommand::UpdateClock(ClockCommand::Pause))
        ));
        assert!(matches!(
            setup.node_commands_rx.try_recv(),
            Ok(NodeCommand::UpdateClock(ClockCommand::Resume))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clone_account_missing_on_remote() {
        let setup = TestSetup::new(SolforgeAdminRpc);
        // Nothing listens on this port, so the fetch fails as a client error.
        let port = crate::tests::helpers::get_free_port().unwrap();
        let res = setup
            .rpc
            .clone_account(
                Some(setup.context),
                Pubkey::new_unique().to_string(),
                Some(CloneConfig {
                    endpoint: Some(format!("http://127.0.0.1:{port}")),
                }),
            )
            .await;
        assert!(res.is_err());
    }
}
