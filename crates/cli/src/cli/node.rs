use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, error, info, warn};
use solforge_core::start_local_node;
use solforge_types::{NodeCommand, NodeConfig, NodeEvent};

use super::StartNode;

pub async fn handle_start_node_command(cmd: StartNode) -> Result<(), String> {
    let config = cmd.node_config();
    let (node_events_tx, node_events_rx) = unbounded();
    let (node_commands_tx, node_commands_rx) = unbounded();

    let node_config = config.clone();
    let commands_tx = node_commands_tx.clone();
    let events_tx = node_events_tx.clone();
    let _handle = hiro_system_kit::thread_named("solforge")
        .spawn(move || {
            let future = start_local_node(node_config, events_tx.clone(), commands_tx, node_commands_rx);
            if let Err(e) = hiro_system_kit::nestable_block_on(future) {
                let _ = events_tx.send(NodeEvent::Aborted(e.to_string()));
            }
        })
        .map_err(|e| format!("{}", e))?;

    log_events(&config, node_events_rx, node_commands_tx)
}

fn log_events(
    config: &NodeConfig,
    node_events_rx: Receiver<NodeEvent>,
    node_commands_tx: Sender<NodeCommand>,
) -> Result<(), String> {
    let runloop_terminator = Arc::new(AtomicBool::new(false));
    let do_stop_loop = runloop_terminator.clone();
    let terminate_tx = node_commands_tx.clone();
    ctrlc::set_handler(move || {
        do_stop_loop.store(true, Ordering::Relaxed);
        let _ = terminate_tx.send(NodeCommand::Terminate);
    })
    .map_err(|e| format!("Error setting Ctrl-C handler: {e}"))?;

    loop {
        let event = match node_events_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                if runloop_terminator.load(Ordering::Relaxed) {
                    // Give the runloop a moment to flush the index.
                    match node_events_rx.recv_timeout(Duration::from_secs(2)) {
                        Ok(NodeEvent::Shutdown) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match event {
            NodeEvent::Ready(transaction_count) => {
                info!(
                    "Node ready with {} indexed transactions. RPC: http://{} WebSocket: ws://{}",
                    transaction_count,
                    config.rpc.get_rpc_base_url(),
                    config.rpc.get_ws_base_url()
                );
            }
            NodeEvent::Aborted(reason) => {
                error!("{}", reason);
                return Err(reason);
            }
            NodeEvent::Shutdown => {
                info!("{}", event);
                break;
            }
            NodeEvent::SlotAdvanced(_) => {
                debug!("{}", event);
            }
            NodeEvent::FaucetFunded(..) | NodeEvent::TransactionProcessed(..) => {
                info!("{}", event);
            }
            NodeEvent::InfoLog(_dt, log) => info!("{}", log),
            NodeEvent::WarnLog(_dt, log) => warn!("{}", log),
            NodeEvent::ErrorLog(_dt, log) => error!("{}", log),
            NodeEvent::DebugLog(_dt, log) => debug!("{}", log),
        }
    }
    Ok(())
}
