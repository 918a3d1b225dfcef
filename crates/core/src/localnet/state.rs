use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::Utc;
use crossbeam_channel::Sender;
use solana_account::Account;
use solana_client::rpc_response::SlotInfo;
use solana_clock::Slot;
use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_sdk_ids::bpf_loader_upgradeable;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_error::TransactionError;
use solforge_types::{
    AccountRoleRecord, AccountSnapshot, BlockRecord, FINALIZED_SLOT_DEPTH, LoadedAddressesRecord,
    MAX_RECENT_BLOCKHASHES, NodeConfig, NodeEvent, TransactionRecord,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::{
    capture::{self, CaptureMetadata},
    clock::ClockState,
    engine::ExecutionEngine,
    faucet::{Faucet, TopUpReport},
};
use crate::{
    codec::{account_roles, encode_base64},
    error::{SolforgeError, SolforgeResult},
    parsers::{
        accounts::{unpack_mint, unpack_token_account},
        is_token_program,
    },
    storage::IndexStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: Slot,
    pub err: Option<TransactionError>,
}

/// Everything the node mutates, owned in one place and guarded by the locker.
pub struct LocalnetState {
    pub engine: ExecutionEngine,
    pub clock: ClockState,
    pub store: IndexStore,
    pub faucet: Faucet,
    pub known_mints: BTreeSet<Pubkey>,
    pub known_programs: BTreeSet<Pubkey>,
    /// Authoritative until restart; the index holds the durable copy.
    pub transactions: HashMap<String, TransactionRecord>,
    pub genesis_hash: Hash,
    recent_blockhashes: VecDeque<(Hash, u64)>,
    signature_listeners: Vec<UnboundedSender<String>>,
    slot_listeners: Vec<UnboundedSender<SlotInfo>>,
    pub node_events_tx: Sender<NodeEvent>,
}

impl LocalnetState {
    pub fn new(config: &NodeConfig, node_events_tx: Sender<NodeEvent>) -> SolforgeResult<Self> {
        let store = IndexStore::connect(config.store.database_url())?;
        let faucet = Faucet::load_or_create(&config.faucet.keypair_path)?;
        let engine = ExecutionEngine::new(config.faucet.max_airdrop_lamports)?;
        let mut state = Self::with_components(engine, store, faucet, node_events_tx)?;

        let report = state.fund_faucet(
            config.faucet.target_lamports,
            config.faucet.max_top_up_iterations,
        );
        let _ = state.node_events_tx.send(NodeEvent::faucet_funded(
            state.faucet.pubkey().to_string(),
            report.balance,
        ));
        Ok(state)
    }

    /// Assembles a state from prepared parts, resuming the clock from the
    /// index.
    pub fn with_components(
        mut engine: ExecutionEngine,
        store: IndexStore,
        faucet: Faucet,
        node_events_tx: Sender<NodeEvent>,
    ) -> SolforgeResult<Self> {
        let clock = ClockState::resume_from(store.get_max_slot()?, store.count_transactions()?);
        if clock.slot > 0 {
            engine.warp_to_slot(clock.slot);
        }
        let genesis_hash = engine.latest_blockhash();
        let mut recent_blockhashes = VecDeque::new();
        recent_blockhashes.push_back((genesis_hash, clock.block_height));

        Ok(Self {
            engine,
            clock,
            store,
            faucet,
            known_mints: BTreeSet::from([spl_token_interface::native_mint::ID]),
            known_programs: BTreeSet::new(),
            transactions: HashMap::new(),
            genesis_hash,
            recent_blockhashes,
            signature_listeners: vec![],
            slot_listeners: vec![],
            node_events_tx,
        })
    }

    pub fn fund_faucet(&mut self, target: u64, max_iterations: usize) -> TopUpReport {
        let cap = self.engine.max_airdrop_lamports();
        self.faucet
            .top_up(&mut self.engine, target, cap, max_iterations)
    }

    pub fn latest_blockhash(&self) -> Hash {
        self.engine.latest_blockhash()
    }

    pub fn last_valid_block_height(&self) -> u64 {
        self.clock.block_height + MAX_RECENT_BLOCKHASHES
    }

    pub fn is_blockhash_valid(&self, blockhash: &Hash) -> bool {
        self.recent_blockhashes.iter().any(|(hash, _)| hash == blockhash)
    }

    pub fn register_signature_listener(&mut self) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        self.signature_listeners.push(tx);
        rx
    }

    pub fn register_slot_listener(&mut self) -> UnboundedReceiver<SlotInfo> {
        let (tx, rx) = unbounded_channel();
        self.slot_listeners.push(tx);
        rx
    }

    fn notify_signature(&mut self, signature: &str) {
        self.signature_listeners
            .retain(|listener| listener.send(signature.to_string()).is_ok());
    }

    fn notify_slot(&mut self, slot: Slot) {
        let info = SlotInfo {
            slot,
            parent: slot.saturating_sub(1),
            root: slot.saturating_sub(FINALIZED_SLOT_DEPTH),
        };
        self.slot_listeners
            .retain(|listener| listener.send(info.clone()).is_ok());
    }

    /// Runs `tx` through the engine and records the full capture. Engine
    /// rejections are returned as transaction failures and leave no record.
    pub fn process_transaction(&mut self, tx: VersionedTransaction) -> SolforgeResult<String> {
        let signature = tx.signatures.first().copied().unwrap_or_default();
        if tx.message.static_account_keys().is_empty() {
            return Ok(signature.to_string());
        }
        let loaded_addresses = capture::loaded_addresses(&self.engine, &tx.message)
            .unwrap_or_default();
        let keys: Vec<Pubkey> = tx
            .message
            .static_account_keys()
            .iter()
            .chain(&loaded_addresses.writable)
            .chain(&loaded_addresses.readonly)
            .copied()
            .collect();
        let raw_transaction = bincode::serialize(&tx)
            .map_err(|e| SolforgeError::internal(format!("unable to encode transaction: {e}")))?;

        let pre_balances = capture::balances(&self.engine, &keys);
        let pre_account_states = capture::snapshot_accounts(&self.engine, &keys);
        let mut token_candidates =
            capture::token_account_candidates(&self.engine, &tx.message, &keys);
        let mut pre_token_balances =
            capture::token_balances(&self.engine, &keys, &token_candidates);

        let roles = account_roles(&tx.message);
        let fee = capture::transaction_fee(&tx.message);
        let result = self.engine.send_transaction(tx);
        let capture = CaptureMetadata::from_send_result(&result);

        let signature = signature.to_string();
        if let Some(err) = capture.err {
            let _ = self
                .node_events_tx
                .send(NodeEvent::transaction_processed(signature, Some(err.clone())));
            return Err(SolforgeError::transaction_failed(&err, capture.logs));
        }
        self.notify_signature(&signature);

        token_candidates.extend(capture::owned_by_token_program(&self.engine, &keys));
        let post_token_balances = capture::token_balances(&self.engine, &keys, &token_candidates);
        capture::pad_pre_token_balances(&mut pre_token_balances, &post_token_balances);
        let post_balances = capture::balances(&self.engine, &keys);
        let post_account_states = capture::snapshot_accounts(&self.engine, &keys);

        let account_keys = keys
            .iter()
            .zip(roles.iter())
            .map(|(key, role)| AccountRoleRecord {
                pubkey: key.to_string(),
                signer: role.signer,
                writable: role.writable,
            })
            .collect();

        let record = TransactionRecord {
            signature: signature.clone(),
            slot: self.clock.slot,
            block_time: Some(Utc::now().timestamp()),
            fee,
            err: None,
            raw_transaction: encode_base64(&raw_transaction),
            logs: capture.logs,
            inner_instructions: capture.inner_instructions,
            compute_units_consumed: capture.compute_units_consumed,
            return_data: capture.return_data,
            pre_balances,
            post_balances,
            pre_token_balances,
            post_token_balances,
            pre_account_states,
            post_account_states,
            account_keys,
            loaded_addresses: LoadedAddressesRecord {
                writable: loaded_addresses.writable.iter().map(|k| k.to_string()).collect(),
                readonly: loaded_addresses.readonly.iter().map(|k| k.to_string()).collect(),
            },
        };
        self.learn_registries(&keys);
        self.record_transaction(record);
        let _ = self
            .node_events_tx
            .send(NodeEvent::transaction_processed(signature.clone(), None));
        Ok(signature)
    }

    /// Dry run; nothing is recorded and nobody is notified.
    pub fn simulate_transaction(&self, tx: VersionedTransaction) -> CaptureMetadata {
        CaptureMetadata::from_simulation(&self.engine.simulate_transaction(tx))
    }

    pub fn record_transaction(&mut self, record: TransactionRecord) {
        if let Err(e) = self.store.insert_transaction(&record) {
            warn!("unable to index transaction {}: {e}", record.signature);
        }
        self.transactions.insert(record.signature.clone(), record);
    }

    pub fn get_transaction_record(&self, signature: &str) -> SolforgeResult<Option<TransactionRecord>> {
        if let Some(record) = self.transactions.get(signature) {
            return Ok(Some(record.clone()));
        }
        Ok(self.store.get_transaction(signature)?)
    }

    /// Resolves a signature through the in-memory map, then the index, then
    /// the engine's own history.
    pub fn get_signature_status(&self, signature: &str) -> Option<SignatureStatus> {
        if let Some(record) = self.transactions.get(signature) {
            return Some(SignatureStatus {
                slot: record.slot,
                err: record.err.clone(),
            });
        }
        match self.store.get_signature_statuses(&[signature.to_string()]) {
            Ok(statuses) => {
                if let Some((slot, err)) = statuses.get(signature) {
                    return Some(SignatureStatus {
                        slot: *slot,
                        err: err.clone(),
                    });
                }
            }
            Err(e) => warn!("status lookup for {signature} failed: {e}"),
        }
        let parsed: Signature = signature.parse().ok()?;
        self.engine
            .get_transaction(&parsed)
            .map(|result| SignatureStatus {
                slot: self.clock.slot,
                err: result.as_ref().err().map(|failure| failure.err.clone()),
            })
    }

    /// Closes the current slot: records its block, rotates the blockhash,
    /// moves the clock forward and tells slot listeners.
    pub fn advance_slot(&mut self) -> Slot {
        let closing_hash = self.latest_blockhash();
        let previous_hash = self
            .recent_blockhashes
            .iter()
            .rev()
            .nth(1)
            .map(|(hash, _)| *hash)
            .unwrap_or(self.genesis_hash);
        let block = BlockRecord {
            slot: self.clock.slot,
            block_height: self.clock.block_height,
            block_time: Utc::now().timestamp(),
            blockhash: closing_hash.to_string(),
            previous_blockhash: previous_hash.to_string(),
            parent_slot: self.clock.slot.saturating_sub(1),
        };
        if let Err(e) = self.store.record_block(&block) {
            warn!("unable to index block {}: {e}", block.slot);
        }

        self.engine.expire_blockhash();
        self.clock.advance();
        self.engine.warp_to_slot(self.clock.slot);

        self.recent_blockhashes
            .push_back((self.latest_blockhash(), self.clock.block_height));
        while self.recent_blockhashes.len() > MAX_RECENT_BLOCKHASHES as usize {
            self.recent_blockhashes.pop_front();
        }

        let slot = self.clock.slot;
        self.notify_slot(slot);
        slot
    }

    /// Applied after an accepted `sendTransaction` or `requestAirdrop`.
    pub fn confirm_submission(&mut self) -> Slot {
        self.clock.transaction_count += 1;
        self.advance_slot()
    }

    /// Clock tick: a zero-lamport self-transfer from the faucet, then a slot
    /// advance. The transfer is not recorded and its failure is only logged.
    pub fn tick(&mut self) -> Slot {
        let tx = self.faucet.self_transfer(self.latest_blockhash());
        if let Err(failure) = self.engine.send_transaction(tx) {
            warn!("tick transaction failed: {}", failure.err);
        }
        self.advance_slot()
    }

    /// Best-effort refresh of the index's account snapshots.
    pub fn index_accounts(&self, accounts: &[(Pubkey, Option<Account>)]) {
        let snapshots: Vec<AccountSnapshot> = accounts
            .iter()
            .filter(|(_, account)| account.is_some())
            .map(|(key, account)| capture::account_snapshot(key, account.as_ref()))
            .collect();
        if snapshots.is_empty() {
            return;
        }
        if let Err(e) = self.store.upsert_accounts(&snapshots, self.clock.slot) {
            warn!("unable to index {} account snapshots: {e}", snapshots.len());
        }
    }

    /// Writes an account into the engine and mirrors it in the index.
    pub fn write_account(&mut self, pubkey: Pubkey, account: Account) -> SolforgeResult<()> {
        self.engine.set_account(pubkey, account.clone())?;
        self.index_accounts(&[(pubkey, Some(account))]);
        self.learn_registries(&[pubkey]);
        Ok(())
    }

    pub fn mint_decimals(&self, mint: &Pubkey) -> Option<u8> {
        capture::mint_decimals(&self.engine, mint)
    }

    /// Picks up mints and upgradeable programs among `keys`.
    fn learn_registries(&mut self, keys: &[Pubkey]) {
        for key in keys {
            let Some(account) = self.engine.get_account(key) else {
                continue;
            };
            if is_token_program(&account.owner) {
                if unpack_mint(&account.data).is_some() {
                    self.known_mints.insert(*key);
                } else if let Some(token_account) = unpack_token_account(&account.data) {
                    self.known_mints.insert(token_account.mint);
                }
            } else if account.executable && account.owner == bpf_loader_upgradeable::id() {
                self.known_programs.insert(*key);
            }
        }
    }

    pub fn shutdown(&self) {
        self.store.shutdown();
    }
}
