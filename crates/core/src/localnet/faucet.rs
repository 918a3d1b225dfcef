use std::{fs, path::Path};

use solana_hash::Hash;
use solana_instruction::Instruction;
use solana_keypair::Keypair;
use solana_message::Message;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;
use solana_transaction::Transaction;
use solforge_types::LAMPORTS_PER_SIGNATURE;

use super::engine::ExecutionEngine;
use crate::{
    error::{SolforgeError, SolforgeResult},
    parsers::MEMO_V3_PROGRAM_ID,
};

/// The node's funding account. Persisted as a JSON array of 64 bytes, the
/// format the Solana CLI uses for keypair files.
pub struct Faucet {
    keypair: Keypair,
    airdrops: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopUpReport {
    pub iterations: usize,
    pub funded_lamports: u64,
    pub balance: u64,
    pub reached_target: bool,
}

impl Faucet {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            airdrops: 0,
        }
    }

    pub fn load_or_create<P: AsRef<Path>>(path: P) -> SolforgeResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                SolforgeError::internal(format!("unable to read {}: {e}", path.display()))
            })?;
            let bytes: Vec<u8> = serde_json::from_str(&contents)
                .map_err(|e| SolforgeError::deserialize_error("faucet keypair", e))?;
            let keypair = Keypair::try_from(bytes.as_slice())
                .map_err(|e| SolforgeError::deserialize_error("faucet keypair", e))?;
            debug!("loaded faucet {} from {}", keypair.pubkey(), path.display());
            return Ok(Self::new(keypair));
        }

        let keypair = Keypair::new();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SolforgeError::internal(format!("unable to create {}: {e}", parent.display()))
                })?;
            }
        }
        let encoded = serde_json::to_string(&keypair.to_bytes().to_vec())
            .map_err(|e| SolforgeError::internal(e.to_string()))?;
        fs::write(path, encoded).map_err(|e| {
            SolforgeError::internal(format!("unable to write {}: {e}", path.display()))
        })?;
        debug!("generated faucet {} at {}", keypair.pubkey(), path.display());
        Ok(Self::new(keypair))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn balance(&self, engine: &ExecutionEngine) -> u64 {
        engine.get_balance(&self.pubkey())
    }

    pub fn transfer_transaction(&self, to: &Pubkey, lamports: u64, blockhash: Hash) -> Transaction {
        let ix = system_instruction::transfer(&self.pubkey(), to, lamports);
        Transaction::new(
            &[&self.keypair],
            Message::new(&[ix], Some(&self.pubkey())),
            blockhash,
        )
    }

    /// Transfer tagged with a memo carrying a per-faucet sequence number, so
    /// repeated airdrops under one blockhash still get distinct signatures.
    pub fn airdrop_transaction(&mut self, to: &Pubkey, lamports: u64, blockhash: Hash) -> Transaction {
        self.airdrops += 1;
        let memo = format!("solforge airdrop {}", self.airdrops);
        let instructions = [
            system_instruction::transfer(&self.pubkey(), to, lamports),
            Instruction::new_with_bytes(MEMO_V3_PROGRAM_ID, memo.as_bytes(), vec![]),
        ];
        Transaction::new(
            &[&self.keypair],
            Message::new(&instructions, Some(&self.pubkey())),
            blockhash,
        )
    }

    /// Zero-lamport transfer to itself, used to keep the engine producing
    /// fresh state on every tick.
    pub fn self_transfer(&self, blockhash: Hash) -> Transaction {
        self.transfer_transaction(&self.pubkey(), 0, blockhash)
    }

    /// Funds the faucet up to `target` lamports through short-lived feeder
    /// accounts, each credited with at most `cap` lamports. Individual
    /// failures are logged and skipped.
    pub fn top_up(
        &self,
        engine: &mut ExecutionEngine,
        target: u64,
        cap: u64,
        max_iterations: usize,
    ) -> TopUpReport {
        let mut report = TopUpReport::default();
        let starting_balance = self.balance(engine);

        while report.iterations < max_iterations {
            let balance = self.balance(engine);
            if balance >= target {
                break;
            }
            report.iterations += 1;

            let remaining = target - balance;
            let amount = cap.min(remaining.saturating_add(LAMPORTS_PER_SIGNATURE));
            if amount <= LAMPORTS_PER_SIGNATURE {
                warn!("faucet top-up cap of {cap} lamports cannot cover the transfer fee");
                break;
            }

            let feeder = Keypair::new();
            match engine.airdrop(&feeder.pubkey(), amount) {
                Ok(Ok(_)) => {}
                Ok(Err(failure)) => {
                    warn!("faucet feeder airdrop failed: {}", failure.err);
                    continue;
                }
                Err(e) => {
                    warn!("faucet feeder airdrop rejected: {e}");
                    continue;
                }
            }

            let blockhash = engine.latest_blockhash();
            let sweep = amount - LAMPORTS_PER_SIGNATURE;
            if let Err(first) = engine.send_transaction(feeder_transfer(
                &feeder,
                &self.pubkey(),
                sweep,
                blockhash,
            )) {
                let reserve = engine.minimum_balance_for_rent_exemption(0);
                let retry = sweep.saturating_sub(reserve);
                if retry == 0 {
                    warn!("faucet sweep failed: {}", first.err);
                    continue;
                }
                if let Err(second) = engine.send_transaction(feeder_transfer(
                    &feeder,
                    &self.pubkey(),
                    retry,
                    blockhash,
                )) {
                    warn!(
                        "faucet sweep failed twice: {} then {}",
                        first.err, second.err
                    );
                }
            }
        }

        report.balance = self.balance(engine);
        report.funded_lamports = report.balance.saturating_sub(starting_balance);
        report.reached_target = report.balance >= target;
        if !report.reached_target {
            warn!(
                "faucet stopped at {} of {} lamports after {} iterations",
                report.balance, target, report.iterations
            );
        }
        report
    }
}

fn feeder_transfer(feeder: &Keypair, to: &Pubkey, lamports: u64, blockhash: Hash) -> Transaction {
    let ix = system_instruction::transfer(&feeder.pubkey(), to, lamports);
    Transaction::new(&[feeder], Message::new(&[ix], Some(&feeder.pubkey())), blockhash)
}
