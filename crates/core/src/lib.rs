#[macro_use]
extern crate log;

#[allow(unused_imports)]
#[macro_use]
extern crate serde_derive;

#[allow(unused_imports)]
#[cfg(test)]
#[macro_use]
extern crate serde_json;

pub mod codec;
pub mod error;
pub mod localnet;
pub mod parsers;
pub mod rpc;
pub mod runloops;
pub mod storage;
pub mod types;

use crossbeam_channel::{Receiver, Sender};
pub use jsonrpc_core;
pub use jsonrpc_http_server;
pub use litesvm;
use localnet::{LocalnetLocker, LocalnetState};
use solana_pubkey::Pubkey;
use solforge_types::{NodeCommand, NodeConfig, NodeEvent};

pub const SOLFORGE_IDENTITY_PUBKEY: Pubkey =
    Pubkey::from_str_const("So1ForgeSo1ForgeSo1ForgeSo1ForgeSo1ForgeSo1");

/// Opens the index, funds the faucet and serves the node until terminated.
pub async fn start_local_node(
    config: NodeConfig,
    node_events_tx: Sender<NodeEvent>,
    node_commands_tx: Sender<NodeCommand>,
    node_commands_rx: Receiver<NodeCommand>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = LocalnetState::new(&config, node_events_tx)?;
    let locker = LocalnetLocker::new(state);
    runloops::start_local_node_runloop(locker, config, node_commands_tx, node_commands_rx).await
}

#[cfg(test)]
mod tests;
