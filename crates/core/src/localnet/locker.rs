use std::sync::Arc;

use crossbeam_channel::Sender;
use solana_account::Account;
use solana_client::rpc_response::SlotInfo;
use solana_clock::Slot;
use solana_keypair::Keypair;
use solana_loader_v3_interface::get_program_data_address;
use solana_message::Message;
use solana_program_option::COption;
use solana_program_pack::Pack;
use solana_pubkey::Pubkey;
use solana_sdk_ids::bpf_loader_upgradeable;
use solana_signer::Signer;
use solana_transaction::{Transaction, versioned::VersionedTransaction};
use solforge_types::NodeEvent;
use spl_associated_token_account_interface::{
    address::get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use spl_token_2022_interface::state::Mint;
use tokio::sync::{RwLock, mpsc::UnboundedReceiver};

use super::{
    capture::CaptureMetadata,
    clock::ClockState,
    remote::RemoteClient,
    state::{LocalnetState, SignatureStatus},
};
use crate::{
    error::{SolforgeError, SolforgeResult},
    parsers::{
        accounts::{
            token::{pack_mint, set_mint_authority},
            unpack_mint, unpack_token_account,
        },
        is_token_program,
    },
};

pub struct LocalnetLocker(pub Arc<RwLock<LocalnetState>>);

impl Clone for LocalnetLocker {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Outcome of a faucet-signed `mintTo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintToReceipt {
    pub signature: String,
    pub token_account: Pubkey,
}

impl LocalnetLocker {
    pub fn new(state: LocalnetState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    /// Runs `reader` under a blocking read lock.
    pub fn with_state_reader<T, F>(&self, reader: F) -> T
    where
        F: FnOnce(&LocalnetState) -> T,
    {
        let read_lock = self.0.clone();
        tokio::task::block_in_place(move || {
            let read_guard = read_lock.blocking_read();
            reader(&read_guard)
        })
    }

    /// Runs `writer` under a blocking write lock.
    pub fn with_state_writer<T, F>(&self, writer: F) -> T
    where
        F: FnOnce(&mut LocalnetState) -> T,
    {
        let write_lock = self.0.clone();
        tokio::task::block_in_place(move || {
            let mut write_guard = write_lock.blocking_write();
            writer(&mut write_guard)
        })
    }

    pub fn clock_snapshot(&self) -> ClockState {
        self.with_state_reader(|state| state.clock)
    }

    pub fn node_events_tx(&self) -> Sender<NodeEvent> {
        self.with_state_reader(|state| state.node_events_tx.clone())
    }

    pub fn register_signature_listener(&self) -> UnboundedReceiver<String> {
        self.with_state_writer(|state| state.register_signature_listener())
    }

    pub fn register_slot_listener(&self) -> UnboundedReceiver<SlotInfo> {
        self.with_state_writer(|state| state.register_slot_listener())
    }

    pub fn send_transaction(&self, tx: VersionedTransaction) -> SolforgeResult<String> {
        self.with_state_writer(move |state| state.process_transaction(tx))
    }

    pub fn simulate_transaction(&self, tx: VersionedTransaction) -> CaptureMetadata {
        self.with_state_reader(move |state| state.simulate_transaction(tx))
    }

    /// Faucet transfer routed through the capture pipeline.
    pub fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> SolforgeResult<String> {
        self.with_state_writer(|state| {
            let blockhash = state.latest_blockhash();
            let tx = state.faucet.airdrop_transaction(pubkey, lamports, blockhash);
            state.process_transaction(tx.into())
        })
    }

    pub fn get_signature_status(&self, signature: &str) -> Option<SignatureStatus> {
        self.with_state_reader(|state| state.get_signature_status(signature))
    }

    pub fn confirm_submission(&self) -> Slot {
        self.with_state_writer(|state| state.confirm_submission())
    }

    pub fn tick(&self) -> Slot {
        self.with_state_writer(|state| state.tick())
    }

    /// Engine lookup that also refreshes the index snapshots of whatever was
    /// found.
    pub fn get_accounts(&self, pubkeys: &[Pubkey]) -> Vec<Option<Account>> {
        self.with_state_reader(|state| {
            let found: Vec<(Pubkey, Option<Account>)> = pubkeys
                .iter()
                .map(|key| (*key, state.engine.get_account(key)))
                .collect();
            state.index_accounts(&found);
            found.into_iter().map(|(_, account)| account).collect()
        })
    }

    pub fn get_account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.get_accounts(std::slice::from_ref(pubkey))
            .pop()
            .flatten()
    }

    pub fn create_mint(
        &self,
        decimals: u8,
        mint: Option<Pubkey>,
        authority: Option<Pubkey>,
    ) -> SolforgeResult<(Pubkey, Mint)> {
        let mint = mint.unwrap_or_else(|| Keypair::new().pubkey());
        self.with_state_writer(|state| {
            let mint_state = Mint {
                mint_authority: COption::Some(authority.unwrap_or_else(|| state.faucet.pubkey())),
                supply: 0,
                decimals,
                is_initialized: true,
                freeze_authority: COption::None,
            };
            let account = Account {
                lamports: state.engine.minimum_balance_for_rent_exemption(Mint::LEN),
                data: pack_mint(&mint_state),
                owner: spl_token_interface::id(),
                executable: false,
                rent_epoch: 0,
            };
            state.write_account(mint, account)?;
            state.known_mints.insert(mint);
            Ok((mint, mint_state))
        })
    }

    /// Creates the owner's associated account if needed and mints `amount`
    /// base units into it, signed by the faucet.
    pub fn mint_to(&self, mint: &Pubkey, owner: &Pubkey, amount: u64) -> SolforgeResult<MintToReceipt> {
        self.with_state_writer(|state| {
            let mint_account = state
                .engine
                .get_account(mint)
                .ok_or_else(|| SolforgeError::token_mint_not_found(*mint))?;
            if !is_token_program(&mint_account.owner) {
                return Err(SolforgeError::unpack_mint_account());
            }
            let mint_state =
                unpack_mint(&mint_account.data).ok_or_else(SolforgeError::unpack_mint_account)?;
            let faucet = state.faucet.pubkey();
            if mint_state.mint_authority != COption::Some(faucet) {
                return Err(SolforgeError::invalid_params(format!(
                    "mint authority of {mint} is not the faucet; adopt it first"
                )));
            }

            let token_program = mint_account.owner;
            let token_account =
                get_associated_token_address_with_program_id(owner, mint, &token_program);
            let create_ix =
                create_associated_token_account_idempotent(&faucet, owner, mint, &token_program);
            let mint_ix = if token_program == spl_token_2022_interface::id() {
                spl_token_2022_interface::instruction::mint_to(
                    &token_program,
                    mint,
                    &token_account,
                    &faucet,
                    &[],
                    amount,
                )
            } else {
                spl_token_interface::instruction::mint_to(
                    &token_program,
                    mint,
                    &token_account,
                    &faucet,
                    &[],
                    amount,
                )
            };
            let mint_ix = mint_ix.map_err(|e| SolforgeError::internal(e.to_string()))?;

            let tx = Transaction::new(
                &[state.faucet.keypair()],
                Message::new(&[create_ix, mint_ix], Some(&faucet)),
                state.latest_blockhash(),
            );
            let signature = state.process_transaction(tx.into())?;
            Ok(MintToReceipt {
                signature,
                token_account,
            })
        })
    }

    /// Makes the faucet the mint authority. Supply, decimals and any
    /// extension data are left as they are.
    pub fn adopt_mint_authority(&self, mint: &Pubkey) -> SolforgeResult<Mint> {
        self.with_state_writer(|state| {
            let mut account = state
                .engine
                .get_account(mint)
                .ok_or_else(|| SolforgeError::token_mint_not_found(*mint))?;
            if !is_token_program(&account.owner) {
                return Err(SolforgeError::unpack_mint_account());
            }
            let faucet = state.faucet.pubkey();
            set_mint_authority(&mut account.data, &faucet)
                .ok_or_else(SolforgeError::unpack_mint_account)?;
            let mint_state =
                unpack_mint(&account.data).ok_or_else(SolforgeError::unpack_mint_account)?;
            state.write_account(*mint, account)?;
            state.known_mints.insert(*mint);
            Ok(mint_state)
        })
    }

    pub fn load_program(&self, program_id: Pubkey, elf: &[u8]) -> SolforgeResult<()> {
        self.with_state_writer(|state| {
            let authority = state.faucet.pubkey();
            let slot = state.clock.slot;
            state
                .engine
                .add_program(program_id, elf, Some(authority), slot)?;
            state.known_programs.insert(program_id);
            Ok(())
        })
    }

    pub async fn clone_account(&self, remote: &RemoteClient, pubkey: Pubkey) -> SolforgeResult<Vec<Pubkey>> {
        let account = remote.get_required_account(&pubkey).await?;
        self.with_state_writer(|state| state.write_account(pubkey, account))?;
        Ok(vec![pubkey])
    }

    /// Clones a program and, for upgradeable programs, its programdata
    /// account.
    pub async fn clone_program(&self, remote: &RemoteClient, program_id: Pubkey) -> SolforgeResult<Vec<Pubkey>> {
        let program = remote.get_required_account(&program_id).await?;
        let programdata = if program.owner == bpf_loader_upgradeable::id() {
            let address = get_program_data_address(&program_id);
            remote
                .get_optional_account(&address)
                .await
                .map(|account| (address, account))
        } else {
            None
        };

        self.with_state_writer(|state| {
            let mut cloned = vec![];
            if let Some((address, account)) = programdata {
                state.write_account(address, account)?;
                cloned.push(address);
            }
            state.write_account(program_id, program)?;
            state.known_programs.insert(program_id);
            cloned.insert(0, program_id);
            Ok(cloned)
        })
    }

    pub async fn clone_token_mint(&self, remote: &RemoteClient, mint: Pubkey) -> SolforgeResult<Vec<Pubkey>> {
        let account = remote.get_required_account(&mint).await?;
        if !is_token_program(&account.owner) || unpack_mint(&account.data).is_none() {
            return Err(SolforgeError::unpack_mint_account());
        }
        self.with_state_writer(|state| {
            state.write_account(mint, account)?;
            state.known_mints.insert(mint);
            Ok(vec![mint])
        })
    }

    /// Clones `owner`'s associated account for `mint`, bringing the mint along
    /// when it is not already present locally.
    pub async fn clone_token_account(
        &self,
        remote: &RemoteClient,
        owner: Pubkey,
        mint: Pubkey,
    ) -> SolforgeResult<Vec<Pubkey>> {
        let local_mint = self.with_state_reader(|state| state.engine.get_account(&mint));
        let remote_mint = match local_mint {
            Some(_) => None,
            None => remote.get_optional_account(&mint).await,
        };
        let token_program = local_mint
            .as_ref()
            .or(remote_mint.as_ref())
            .map(|account| account.owner)
            .filter(is_token_program)
            .unwrap_or_else(spl_token_interface::id);

        let token_account =
            get_associated_token_address_with_program_id(&owner, &mint, &token_program);
        let account = remote.get_required_account(&token_account).await?;
        if unpack_token_account(&account.data).is_none() {
            return Err(SolforgeError::unpack_token_account());
        }

        self.with_state_writer(|state| {
            let mut cloned = vec![token_account];
            if let Some(mint_account) = remote_mint {
                state.write_account(mint, mint_account)?;
                cloned.push(mint);
            }
            state.write_account(token_account, account)?;
            state.known_mints.insert(mint);
            Ok(cloned)
        })
    }

    pub fn shutdown(&self) {
        self.with_state_reader(|state| state.shutdown());
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;
    use solana_native_token::LAMPORTS_PER_SOL;

    use super::*;
    use crate::{
        localnet::{engine::ExecutionEngine, faucet::Faucet},
        storage::IndexStore,
    };

    fn test_locker() -> LocalnetLocker {
        let engine = ExecutionEngine::new(100 * LAMPORTS_PER_SOL).unwrap();
        let store = IndexStore::connect(":memory:").unwrap();
        let (tx, _rx) = unbounded();
        let mut state =
            LocalnetState::with_components(engine, store, Faucet::new(Keypair::new()), tx)
                .unwrap();
        state.fund_faucet(500 * LAMPORTS_PER_SOL, 20);
        LocalnetLocker::new(state)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mint_scenario_yields_one_whole_token() {
        let locker = test_locker();
        let (mint, created) = locker.create_mint(6, None, None).unwrap();
        assert_eq!(created.decimals, 6);

        let owner = Pubkey::new_unique();
        let receipt = locker.mint_to(&mint, &owner, 1_000_000).unwrap();
        let account = locker.get_account(&receipt.token_account).unwrap();
        let state = unpack_token_account(&account.data).unwrap();
        assert_eq!(state.amount, 1_000_000);
        assert_eq!(state.owner, owner);
        assert_eq!(state.mint, mint);

        let record = locker
            .with_state_reader(|s| s.get_transaction_record(&receipt.signature))
            .unwrap()
            .unwrap();
        let post = &record.post_token_balances[0];
        assert_eq!(post.amount, "1000000");
        assert_eq!(post.decimals, 6);
        // account created by the transaction gets a zero pre-balance
        assert_eq!(record.pre_token_balances[0].amount, "0");
        assert!(locker.with_state_reader(|s| s.known_mints.contains(&mint)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn adopt_authority_is_idempotent() {
        let locker = test_locker();
        let foreign = Pubkey::new_unique();
        let (mint, _) = locker.create_mint(9, None, Some(foreign)).unwrap();
        let faucet = locker.with_state_reader(|s| s.faucet.pubkey());

        let owner = Pubkey::new_unique();
        assert!(locker.mint_to(&mint, &owner, 1).is_err());

        let first = locker.adopt_mint_authority(&mint).unwrap();
        let second = locker.adopt_mint_authority(&mint).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.mint_authority, COption::Some(faucet));
        assert_eq!(first.decimals, 9);
        assert_eq!(first.supply, 0);
        assert!(locker.mint_to(&mint, &owner, 5).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn airdrop_goes_through_capture() {
        let locker = test_locker();
        let target = Pubkey::new_unique();
        let signature = locker.request_airdrop(&target, LAMPORTS_PER_SOL).unwrap();
        assert_eq!(
            locker.get_account(&target).map(|a| a.lamports),
            Some(LAMPORTS_PER_SOL)
        );
        let status = locker.get_signature_status(&signature).unwrap();
        assert_eq!(status.err, None);
        // the index saw the recipient through the opportunistic upsert
        let indexed = locker.with_state_reader(|s| s.store.get_account(&target.to_string()));
        assert!(indexed.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_airdrops_in_one_slot_both_land() {
        let locker = test_locker();
        let target = Pubkey::new_unique();
        let slot = locker.clock_snapshot().slot;
        let first = locker.request_airdrop(&target, LAMPORTS_PER_SOL).unwrap();
        let second = locker.request_airdrop(&target, LAMPORTS_PER_SOL).unwrap();
        assert_eq!(locker.clock_snapshot().slot, slot);
        assert_ne!(first, second);
        assert_eq!(
            locker.get_account(&target).map(|a| a.lamports),
            Some(2 * LAMPORTS_PER_SOL)
        );
        assert_eq!(locker.get_signature_status(&second).unwrap().err, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn adopt_on_missing_mint_fails() {
        let locker = test_locker();
        assert!(locker.adopt_mint_authority(&Pubkey::new_unique()).is_err());
    }
}
