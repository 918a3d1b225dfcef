use std::{net::SocketAddr, sync::Arc, thread::JoinHandle};

use crossbeam_channel::{Receiver, Sender, select};
use jsonrpc_core::MetaIoHandler;
use jsonrpc_http_server::{
    AccessControlAllowOrigin, cors::AccessControlAllowHeaders, DomainsValidation, ServerBuilder,
};
use jsonrpc_pubsub::{PubSubHandler, Session};
use jsonrpc_ws_server::{RequestContext, ServerBuilder as WsServerBuilder};
use solforge_types::{ClockEvent, NodeCommand, NodeConfig, NodeEvent};

use crate::{
    localnet::{LocalnetLocker, start_clock_runloop},
    rpc::{
        self, HealthRequestMiddleware, SolforgeMiddleware, SolforgeWebsocketMeta,
        SolforgeWebsocketMiddleware, accounts_data::AccountsData, accounts_scan::AccountsScan,
        bank_data::BankData, full::Full, minimal::Minimal, solforge::Solforge, ws::Rpc,
    },
};

/// Checks if a port is available for binding.
pub fn check_port_availability(addr: SocketAddr, server_type: &str) -> Result<(), String> {
    match std::net::TcpListener::bind(addr) {
        Ok(_listener) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Err(format!(
            "{} port {} is already in use. Try --port or --ws-port to use a different port.",
            server_type,
            addr.port()
        )),
        Err(e) => Err(format!(
            "Failed to bind {} server to {}: {}",
            server_type, addr, e
        )),
    }
}

/// Starts both servers and the clock, then drives the node until a
/// `Terminate` command arrives or every command sender is dropped.
pub async fn start_local_node_runloop(
    locker: LocalnetLocker,
    config: NodeConfig,
    node_commands_tx: Sender<NodeCommand>,
    node_commands_rx: Receiver<NodeCommand>,
) -> Result<(), Box<dyn std::error::Error>> {
    let node_events_tx = locker.node_events_tx();

    let (_rpc_handle, _ws_handle) =
        start_rpc_servers_runloop(&config, &node_commands_tx, locker.clone()).await?;

    let (clock_event_rx, clock_command_tx) =
        start_clock_runloop(config.slot_time_ms, Some(node_events_tx.clone()));

    let transaction_count = locker.clock_snapshot().transaction_count;
    let _ = node_events_tx.send(NodeEvent::Ready(transaction_count));

    loop {
        select! {
            recv(clock_event_rx) -> msg => match msg {
                Ok(ClockEvent::Tick) => {
                    let slot = locker.tick();
                    let _ = node_events_tx.send(NodeEvent::SlotAdvanced(slot));
                }
                Err(_) => {
                    let _ = node_events_tx.send(NodeEvent::error("Clock runloop stopped"));
                    break;
                }
            },
            recv(node_commands_rx) -> msg => match msg {
                Ok(NodeCommand::UpdateClock(update)) => {
                    let _ = clock_command_tx.send(update);
                }
                Ok(NodeCommand::Terminate) | Err(_) => {
                    locker.shutdown();
                    break;
                }
            },
        }
    }
    let _ = node_events_tx.send(NodeEvent::Shutdown);
    Ok(())
}

async fn start_rpc_servers_runloop(
    config: &NodeConfig,
    node_commands_tx: &Sender<NodeCommand>,
    locker: LocalnetLocker,
) -> Result<(JoinHandle<()>, JoinHandle<()>), String> {
    let rpc_addr: SocketAddr = config
        .rpc
        .get_rpc_base_url()
        .parse()
        .map_err(|e: std::net::AddrParseError| e.to_string())?;
    let ws_addr: SocketAddr = config
        .rpc
        .get_ws_base_url()
        .parse()
        .map_err(|e: std::net::AddrParseError| e.to_string())?;

    check_port_availability(rpc_addr, "RPC")?;
    check_port_availability(ws_addr, "WebSocket")?;

    let node_events_tx = locker.node_events_tx();
    let middleware = SolforgeMiddleware::new(
        locker,
        node_commands_tx,
        &config.rpc,
        &config.remote_rpc_url,
    );

    let rpc_handle =
        start_http_rpc_server_runloop(rpc_addr, middleware.clone(), node_events_tx.clone())?;
    let ws_handle = start_ws_rpc_server_runloop(ws_addr, middleware, node_events_tx)?;
    Ok((rpc_handle, ws_handle))
}

/// Every HTTP method the node serves, behind the clock-advancing middleware.
pub fn build_http_io_handler(
    middleware: SolforgeMiddleware,
) -> MetaIoHandler<Option<rpc::RunloopContext>, SolforgeMiddleware> {
    let mut io = MetaIoHandler::with_middleware(middleware);
    io.extend_with(rpc::minimal::SolforgeMinimalRpc.to_delegate());
    io.extend_with(rpc::full::SolforgeFullRpc.to_delegate());
    io.extend_with(rpc::accounts_data::SolforgeAccountsDataRpc.to_delegate());
    io.extend_with(rpc::accounts_scan::SolforgeAccountsScanRpc.to_delegate());
    io.extend_with(rpc::bank_data::SolforgeBankDataRpc.to_delegate());
    io.extend_with(rpc::solforge::SolforgeAdminRpc.to_delegate());
    io
}

fn start_http_rpc_server_runloop(
    server_bind: SocketAddr,
    middleware: SolforgeMiddleware,
    node_events_tx: Sender<NodeEvent>,
) -> Result<JoinHandle<()>, String> {
    let io = build_http_io_handler(middleware);

    let handle = hiro_system_kit::thread_named("RPC Handler")
        .spawn(move || {
            let server = match ServerBuilder::new(io)
                .cors(DomainsValidation::AllowOnly(vec![
                    AccessControlAllowOrigin::Any,
                ]))
                .cors_allow_headers(AccessControlAllowHeaders::Any)
                .request_middleware(HealthRequestMiddleware)
                .threads(6)
                .start_http(&server_bind)
            {
                Ok(server) => server,
                Err(e) => {
                    let _ = node_events_tx.send(NodeEvent::Aborted(format!(
                        "Failed to start RPC server: {:?}",
                        e
                    )));
                    return;
                }
            };

            server.wait();
            let _ = node_events_tx.send(NodeEvent::Shutdown);
        })
        .map_err(|e| format!("Failed to spawn RPC Handler thread: {:?}", e))?;

    Ok(handle)
}

fn start_ws_rpc_server_runloop(
    ws_server_bind: SocketAddr,
    middleware: SolforgeMiddleware,
    node_events_tx: Sender<NodeEvent>,
) -> Result<JoinHandle<()>, String> {
    let ws_middleware = SolforgeWebsocketMiddleware::new(middleware.clone(), None);
    let mut rpc_io = PubSubHandler::new(MetaIoHandler::with_middleware(ws_middleware));

    let handle = hiro_system_kit::thread_named("WebSocket RPC Handler")
        .spawn(move || {
            // Subscription feeds run as tasks on this runtime.
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = node_events_tx.send(NodeEvent::Aborted(format!(
                        "Failed to build WebSocket runtime: {e}"
                    )));
                    return;
                }
            };

            let tokio_handle = runtime.handle().clone();
            runtime.block_on(async move {
                rpc_io.extend_with(
                    rpc::ws::SolforgeWsRpc::new(&middleware.locker, tokio_handle).to_delegate(),
                );
                let server = match WsServerBuilder::new(rpc_io)
                    .session_meta_extractor(move |ctx: &RequestContext| {
                        Some(SolforgeWebsocketMeta::new(
                            middleware.runloop_context(),
                            Some(Arc::new(Session::new(ctx.sender()))),
                        ))
                    })
                    .start(&ws_server_bind)
                {
                    Ok(server) => server,
                    Err(e) => {
                        let _ = node_events_tx.send(NodeEvent::Aborted(format!(
                            "Failed to start WebSocket RPC server: {:?}",
                            e
                        )));
                        return;
                    }
                };
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = server.wait() {
                        error!("WebSocket server stopped: {e:?}");
                    }
                })
                .await
                .ok();

                let _ = node_events_tx.send(NodeEvent::Shutdown);
            });
        })
        .map_err(|e| format!("Failed to spawn WebSocket RPC Handler thread: {:?}", e))?;
    Ok(handle)
}
