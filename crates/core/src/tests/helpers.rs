#![allow(dead_code)]
use std::net::TcpListener;

use crossbeam_channel::Receiver;
use solana_keypair::Keypair;
use solana_native_token::LAMPORTS_PER_SOL;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;
use solana_transaction::{Transaction, versioned::VersionedTransaction};
use solforge_types::{DEFAULT_MAINNET_RPC_URL, NodeCommand, NodeEvent, RpcConfig};

use crate::{
    localnet::{ExecutionEngine, Faucet, LocalnetLocker, LocalnetState},
    rpc::RunloopContext,
    storage::IndexStore,
};

pub const TEST_FAUCET_LAMPORTS: u64 = 1_000 * LAMPORTS_PER_SOL;

pub fn get_free_port() -> Result<u16, String> {
    let listener =
        TcpListener::bind("127.0.0.1:0").map_err(|e| format!("Failed to bind to port 0: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("failed to parse address: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// A funded, in-memory localnet with no servers attached.
pub fn test_locker() -> (LocalnetLocker, Receiver<NodeEvent>) {
    let (node_events_tx, node_events_rx) = crossbeam_channel::unbounded();
    let engine = ExecutionEngine::new(10_000 * LAMPORTS_PER_SOL).unwrap();
    let store = IndexStore::connect(":memory:").unwrap();
    let faucet = Faucet::new(Keypair::new());
    let mut state = LocalnetState::with_components(engine, store, faucet, node_events_tx).unwrap();
    state.fund_faucet(TEST_FAUCET_LAMPORTS, 10);
    (LocalnetLocker::new(state), node_events_rx)
}

#[derive(Clone)]
pub struct TestSetup<T>
where
    T: Clone,
{
    pub context: RunloopContext,
    pub rpc: T,
    pub node_commands_rx: Receiver<NodeCommand>,
    pub node_events_rx: Receiver<NodeEvent>,
}

impl<T> TestSetup<T>
where
    T: Clone,
{
    pub fn new(rpc: T) -> Self {
        let (node_commands_tx, node_commands_rx) = crossbeam_channel::unbounded();
        let (locker, node_events_rx) = test_locker();
        let clock = locker.clock_snapshot();

        TestSetup {
            context: RunloopContext {
                locker,
                node_commands_tx,
                remote_rpc_url: DEFAULT_MAINNET_RPC_URL.to_string(),
                rpc_config: RpcConfig::default(),
                clock,
            },
            rpc,
            node_commands_rx,
            node_events_rx,
        }
    }

    /// Refreshes the dispatch-time clock snapshot, as the middleware would.
    pub fn refresh_clock(&mut self) {
        self.context.clock = self.context.locker.clock_snapshot();
    }

    pub fn faucet(&self) -> Keypair {
        self.context
            .locker
            .with_state_reader(|state| state.faucet.keypair().insecure_clone())
    }

    /// Submits a faucet-signed transfer through the capture pipeline, then
    /// closes the slot like the middleware does after `sendTransaction`.
    pub fn transfer(&self, to: &Pubkey, lamports: u64) -> String {
        let faucet = self.faucet();
        let blockhash = self
            .context
            .locker
            .with_state_reader(|state| state.latest_blockhash());
        let tx = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(&faucet.pubkey(), to, lamports)],
            Some(&faucet.pubkey()),
            &[&faucet],
            blockhash,
        );
        let signature = self
            .context
            .locker
            .send_transaction(VersionedTransaction::from(tx))
            .unwrap();
        self.context.locker.confirm_submission();
        signature
    }
}
