use litesvm::{
    LiteSVM,
    types::{FailedTransactionMetadata, SimulatedTransactionInfo, TransactionResult},
};
use solana_account::Account;
use solana_clock::Slot;
use solana_hash::Hash;
use solana_loader_v3_interface::{get_program_data_address, state::UpgradeableLoaderState};
use solana_program_option::COption;
use solana_program_pack::Pack;
use solana_pubkey::Pubkey;
use solana_sdk_ids::bpf_loader_upgradeable;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use spl_token_interface::state::Mint;

use crate::error::{SolforgeError, SolforgeResult};

/// Thin wrapper over the in-process SVM. Everything the node knows about
/// ledger state goes through here.
pub struct ExecutionEngine {
    pub svm: LiteSVM,
    max_airdrop_lamports: u64,
}

impl ExecutionEngine {
    pub fn new(max_airdrop_lamports: u64) -> SolforgeResult<Self> {
        let mut engine = Self {
            svm: LiteSVM::new()
                .with_blockhash_check(false)
                .with_sigverify(false),
            max_airdrop_lamports,
        };
        create_native_mint(&mut engine)?;
        Ok(engine)
    }

    pub fn max_airdrop_lamports(&self) -> u64 {
        self.max_airdrop_lamports
    }

    pub fn get_account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.svm.get_account(pubkey)
    }

    pub fn get_balance(&self, pubkey: &Pubkey) -> u64 {
        self.svm.get_balance(pubkey).unwrap_or(0)
    }

    pub fn set_account(&mut self, pubkey: Pubkey, account: Account) -> SolforgeResult<()> {
        self.svm
            .set_account(pubkey, account)
            .map_err(|e| SolforgeError::set_account(pubkey, e))
    }

    /// Credits `lamports` from the engine's internal funding account. Requests
    /// above the per-call cap are rejected.
    pub fn airdrop(&mut self, pubkey: &Pubkey, lamports: u64) -> SolforgeResult<TransactionResult> {
        if lamports > self.max_airdrop_lamports {
            return Err(SolforgeError::invalid_params(format!(
                "airdrop of {lamports} lamports exceeds the per-call cap of {}",
                self.max_airdrop_lamports
            )));
        }
        Ok(self.svm.airdrop(pubkey, lamports))
    }

    /// Installs an upgradeable program: the programdata account first, then
    /// the executable program account pointing at it.
    pub fn add_program(
        &mut self,
        program_id: Pubkey,
        elf: &[u8],
        upgrade_authority: Option<Pubkey>,
        slot: Slot,
    ) -> SolforgeResult<()> {
        let programdata_address = get_program_data_address(&program_id);

        let mut programdata = bincode::serialize(&UpgradeableLoaderState::ProgramData {
            slot,
            upgrade_authority_address: upgrade_authority,
        })
        .map_err(|e| SolforgeError::internal(e.to_string()))?;
        programdata.resize(UpgradeableLoaderState::size_of_programdata_metadata(), 0);
        programdata.extend_from_slice(elf);
        let programdata_account = Account {
            lamports: self.minimum_balance_for_rent_exemption(programdata.len()),
            data: programdata,
            owner: bpf_loader_upgradeable::id(),
            executable: false,
            rent_epoch: 0,
        };
        self.set_account(programdata_address, programdata_account)?;

        let program = bincode::serialize(&UpgradeableLoaderState::Program {
            programdata_address,
        })
        .map_err(|e| SolforgeError::internal(e.to_string()))?;
        let program_account = Account {
            lamports: self.minimum_balance_for_rent_exemption(program.len()),
            data: program,
            owner: bpf_loader_upgradeable::id(),
            executable: true,
            rent_epoch: 0,
        };
        self.set_account(program_id, program_account)
    }

    pub fn send_transaction(&mut self, tx: impl Into<VersionedTransaction>) -> TransactionResult {
        self.svm.send_transaction(tx)
    }

    pub fn simulate_transaction(
        &self,
        tx: impl Into<VersionedTransaction>,
    ) -> Result<SimulatedTransactionInfo, FailedTransactionMetadata> {
        self.svm.simulate_transaction(tx)
    }

    pub fn latest_blockhash(&self) -> Hash {
        self.svm.latest_blockhash()
    }

    pub fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> u64 {
        self.svm.minimum_balance_for_rent_exemption(data_len)
    }

    /// Engine-side execution history, used when neither the in-memory map nor
    /// the index knows a signature.
    pub fn get_transaction(&self, signature: &Signature) -> Option<&TransactionResult> {
        self.svm.get_transaction(signature)
    }

    pub fn expire_blockhash(&mut self) {
        self.svm.expire_blockhash();
    }

    pub fn warp_to_slot(&mut self, slot: Slot) {
        self.svm.warp_to_slot(slot);
    }
}

fn create_native_mint(engine: &mut ExecutionEngine) -> SolforgeResult<()> {
    let mut data = vec![0; Mint::LEN];
    let mint = Mint {
        mint_authority: COption::None,
        supply: 0,
        decimals: spl_token_interface::native_mint::DECIMALS,
        is_initialized: true,
        freeze_authority: COption::None,
    };
    Mint::pack(mint, &mut data).map_err(|e| SolforgeError::internal(e.to_string()))?;
    let account = Account {
        lamports: engine.minimum_balance_for_rent_exemption(data.len()),
        data,
        owner: spl_token_interface::ID,
        executable: false,
        rent_epoch: 0,
    };
    engine.set_account(spl_token_interface::native_mint::ID, account)
}

#[cfg(test)]
mod tests {
    use solana_keypair::Keypair;
    use solana_message::Message;
    use solana_native_token::LAMPORTS_PER_SOL;
    use solana_signer::Signer;
    use solana_system_interface::instruction as system_instruction;
    use solana_transaction::Transaction;

    use super::*;

    #[test]
    fn native_mint_is_present() {
        let engine = ExecutionEngine::new(LAMPORTS_PER_SOL).unwrap();
        let account = engine
            .get_account(&spl_token_interface::native_mint::ID)
            .unwrap();
        let mint = Mint::unpack(&account.data).unwrap();
        assert_eq!(mint.decimals, 9);
        assert!(mint.is_initialized);
    }

    #[test]
    fn airdrop_is_capped() {
        let mut engine = ExecutionEngine::new(LAMPORTS_PER_SOL).unwrap();
        let target = Pubkey::new_unique();
        assert!(engine.airdrop(&target, 2 * LAMPORTS_PER_SOL).is_err());
        assert!(engine.airdrop(&target, LAMPORTS_PER_SOL).unwrap().is_ok());
        assert_eq!(engine.get_balance(&target), LAMPORTS_PER_SOL);
    }

    #[test]
    fn transfer_moves_lamports() {
        let mut engine = ExecutionEngine::new(10 * LAMPORTS_PER_SOL).unwrap();
        let payer = Keypair::new();
        let recipient = Pubkey::new_unique();
        engine
            .airdrop(&payer.pubkey(), 10 * LAMPORTS_PER_SOL)
            .unwrap()
            .unwrap();
        let ix = system_instruction::transfer(&payer.pubkey(), &recipient, LAMPORTS_PER_SOL);
        let tx = Transaction::new(
            &[&payer],
            Message::new(&[ix], Some(&payer.pubkey())),
            engine.latest_blockhash(),
        );
        let signature = tx.signatures[0];
        engine.send_transaction(tx).unwrap();
        assert_eq!(engine.get_balance(&recipient), LAMPORTS_PER_SOL);
        assert!(engine.get_transaction(&signature).is_some());
    }

    #[test]
    fn unknown_balance_is_zero() {
        let engine = ExecutionEngine::new(LAMPORTS_PER_SOL).unwrap();
        assert_eq!(engine.get_balance(&Pubkey::new_unique()), 0);
    }
}
