//! The in-process ledger: execution engine, clock, faucet and the capture
//! pipeline that feeds the index.

pub mod capture;
pub mod clock;
pub mod engine;
pub mod faucet;
pub mod locker;
pub mod remote;
pub mod state;

pub use clock::{ClockState, start_clock_runloop};
pub use engine::ExecutionEngine;
pub use faucet::{Faucet, TopUpReport};
pub use locker::{LocalnetLocker, MintToReceipt};
pub use remote::RemoteClient;
pub use state::{LocalnetState, SignatureStatus};
