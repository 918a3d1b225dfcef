use std::{str::FromStr, time::Duration};

use crossbeam_channel::{Receiver, Sender, unbounded};
use jsonrpc_core_client::transports::http;
use serde_json::Value;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_hash::Hash;
use solana_keypair::Keypair;
use solana_native_token::LAMPORTS_PER_SOL;
use solana_pubkey::Pubkey;
use solana_rpc_client_api::config::RpcEncodingConfigWrapper;
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;
use solana_transaction::{Transaction, versioned::VersionedTransaction};
use solana_transaction_status::UiTransactionEncoding;
use solforge_types::{
    FaucetConfig, NodeCommand, NodeConfig, NodeEvent, RpcConfig, StoreConfig,
};
use tempfile::TempDir;
use test_case::test_case;

use crate::{
    codec::encode_base64,
    localnet::Faucet,
    rpc::{full::FullClient, minimal::MinimalClient, solforge::SolforgeClient},
    start_local_node,
    tests::helpers::get_free_port,
};

#[derive(Clone, Copy, Debug)]
enum IndexKind {
    InMemory,
    OnDisk,
}

struct TestNode {
    rpc_url: String,
    node_events_rx: Receiver<NodeEvent>,
    node_commands_tx: Sender<NodeCommand>,
    faucet: Keypair,
    _workdir: TempDir,
}

fn node_config(workdir: &TempDir, index: IndexKind, slot_time_ms: u64) -> NodeConfig {
    let db_path = match index {
        IndexKind::InMemory => None,
        IndexKind::OnDisk => Some(workdir.path().join("index.sqlite").display().to_string()),
    };
    NodeConfig {
        rpc: RpcConfig {
            bind_host: "127.0.0.1".to_string(),
            bind_port: get_free_port().unwrap(),
            ws_port: get_free_port().unwrap(),
        },
        faucet: FaucetConfig {
            keypair_path: workdir.path().join("faucet.json"),
            target_lamports: 1_000 * LAMPORTS_PER_SOL,
            ..FaucetConfig::default()
        },
        store: StoreConfig { db_path },
        slot_time_ms,
        ..NodeConfig::default()
    }
}

fn wait_for_ready(node_events_rx: &Receiver<NodeEvent>) {
    loop {
        match node_events_rx.recv_timeout(Duration::from_secs(30)) {
            Ok(NodeEvent::Ready(_)) => break,
            Ok(NodeEvent::Aborted(e)) => panic!("node aborted: {e}"),
            Ok(_) => (),
            Err(e) => panic!("node never became ready: {e:?}"),
        }
    }
}

fn start_node_with(config: NodeConfig, workdir: TempDir) -> TestNode {
    let faucet = Faucet::load_or_create(&config.faucet.keypair_path)
        .unwrap()
        .keypair()
        .insecure_clone();
    let rpc_url = format!("http://{}", config.rpc.get_rpc_base_url());
    let (node_events_tx, node_events_rx) = unbounded();
    let (node_commands_tx, node_commands_rx) = unbounded();
    let commands_tx = node_commands_tx.clone();

    let _handle = hiro_system_kit::thread_named("test").spawn(move || {
        let future = start_local_node(config, node_events_tx, commands_tx, node_commands_rx);
        if let Err(e) = hiro_system_kit::nestable_block_on(future) {
            panic!("{e:?}");
        }
    });

    wait_for_ready(&node_events_rx);
    TestNode {
        rpc_url,
        node_events_rx,
        node_commands_tx,
        faucet,
        _workdir: workdir,
    }
}

fn start_node(index: IndexKind, slot_time_ms: u64) -> TestNode {
    let workdir = tempfile::tempdir().unwrap();
    let config = node_config(&workdir, index, slot_time_ms);
    start_node_with(config, workdir)
}

/// Sends a faucet transfer over HTTP and returns its signature.
async fn send_transfer(node: &TestNode, full_client: &FullClient, to: &Pubkey) -> String {
    let blockhash = full_client
        .get_latest_blockhash(None)
        .await
        .map(|r| Hash::from_str(&r.value.blockhash).expect("Failed to deserialize blockhash"))
        .expect("Failed to get blockhash");
    let tx = Transaction::new_signed_with_payer(
        &[system_instruction::transfer(
            &node.faucet.pubkey(),
            to,
            LAMPORTS_PER_SOL,
        )],
        Some(&node.faucet.pubkey()),
        &[&node.faucet],
        blockhash,
    );
    let encoded = encode_base64(&bincode::serialize(&VersionedTransaction::from(tx)).unwrap());
    full_client
        .send_transaction(encoded, None)
        .await
        .expect("sendTransaction failed")
}

#[test_case(IndexKind::InMemory; "with in-memory index")]
#[test_case(IndexKind::OnDisk; "with on-disk index")]
#[tokio::test(flavor = "multi_thread")]
async fn test_node_ready(index: IndexKind) {
    let node = start_node(index, 60_000);
    let solforge_client = http::connect::<SolforgeClient>(&node.rpc_url)
        .await
        .expect("Failed to connect to solforge");
    let status = solforge_client.get_status().await.unwrap();
    assert_eq!(status.faucet.address, node.faucet.pubkey().to_string());
    assert!(status.faucet.balance >= 1_000 * LAMPORTS_PER_SOL);
    assert_eq!(status.persistent, matches!(index, IndexKind::OnDisk));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clock_ticks() {
    let node = start_node(IndexKind::InMemory, 5);
    let mut ticks = 0;
    while ticks < 10 {
        match node.node_events_rx.recv_timeout(Duration::from_secs(10)) {
            Ok(NodeEvent::SlotAdvanced(_)) => ticks += 1,
            Ok(_) => (),
            Err(e) => panic!("not enough ticks: {e:?}"),
        }
    }
    let minimal_client = http::connect::<MinimalClient>(&node.rpc_url).await.unwrap();
    assert!(minimal_client.get_slot(None).await.unwrap() >= 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_check_and_batch() {
    let node = start_node(IndexKind::InMemory, 60_000);
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{}/health", node.rpc_url))
        .send()
        .await
        .unwrap();
    assert!(health.status().is_success());
    assert_eq!(health.text().await.unwrap(), "ok");

    let batch: Value = client
        .post(&node.rpc_url)
        .json(&serde_json::json!([
            { "jsonrpc": "2.0", "id": 1, "method": "getHealth" },
            { "jsonrpc": "2.0", "id": 2, "method": "getSlot" },
            { "jsonrpc": "2.0", "id": 3, "method": "noSuchMethod" },
        ]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let responses = batch.as_array().unwrap();
    assert_eq!(responses.len(), 3);
    let by_id = |id: u64| responses.iter().find(|r| r["id"] == id).unwrap();
    assert_eq!(by_id(1)["result"], "ok");
    assert!(by_id(2)["result"].is_u64());
    assert_eq!(by_id(3)["error"]["code"], -32601);
}

#[test_case(IndexKind::InMemory; "with in-memory index")]
#[test_case(IndexKind::OnDisk; "with on-disk index")]
#[tokio::test(flavor = "multi_thread")]
async fn test_transfer_is_captured(index: IndexKind) {
    let node = start_node(index, 60_000);
    let minimal_client = http::connect::<MinimalClient>(&node.rpc_url).await.unwrap();
    let full_client = http::connect::<FullClient>(&node.rpc_url).await.unwrap();

    let slot_before = minimal_client.get_slot(None).await.unwrap();
    let recipient = Pubkey::new_unique();
    let signature = send_transfer(&node, &full_client, &recipient).await;

    let balance = minimal_client
        .get_balance(recipient.to_string(), None)
        .await
        .unwrap();
    assert_eq!(balance.value, LAMPORTS_PER_SOL);
    assert_eq!(minimal_client.get_slot(None).await.unwrap(), slot_before + 1);

    let transaction = full_client
        .get_transaction(
            signature.clone(),
            Some(RpcEncodingConfigWrapper::Current(Some(RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::JsonParsed),
                ..RpcTransactionConfig::default()
            }))),
        )
        .await
        .unwrap()
        .expect("transaction should be recorded");
    assert_eq!(transaction.slot, slot_before);
    let transaction = serde_json::to_value(transaction).unwrap();
    assert_eq!(transaction["meta"]["err"], Value::Null);
    assert_eq!(transaction["transaction"]["signatures"][0], signature);
    let instruction = &transaction["transaction"]["message"]["instructions"][0];
    assert_eq!(instruction["program"], "system");
    assert_eq!(instruction["parsed"]["type"], "transfer");
    assert_eq!(
        instruction["parsed"]["info"]["destination"],
        recipient.to_string()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_survives_restart() {
    let workdir = tempfile::tempdir().unwrap();
    let config = node_config(&workdir, IndexKind::OnDisk, 60_000);
    // The first node borrows the working directory; the second one owns it.
    let first = start_node_with(config, tempfile::tempdir().unwrap());
    let full_client = http::connect::<FullClient>(&first.rpc_url).await.unwrap();
    let signature = send_transfer(&first, &full_client, &Pubkey::new_unique()).await;
    let recorded_slot = full_client
        .get_transaction(signature.clone(), None)
        .await
        .unwrap()
        .map(|tx| tx.slot)
        .unwrap();
    first.node_commands_tx.send(NodeCommand::Terminate).unwrap();
    loop {
        match first.node_events_rx.recv_timeout(Duration::from_secs(10)) {
            Ok(NodeEvent::Shutdown) => break,
            Ok(_) => (),
            Err(e) => panic!("node did not shut down: {e:?}"),
        }
    }

    let config = node_config(&workdir, IndexKind::OnDisk, 60_000);
    let second = start_node_with(config, workdir);
    let full_client = http::connect::<FullClient>(&second.rpc_url).await.unwrap();
    let minimal_client = http::connect::<MinimalClient>(&second.rpc_url).await.unwrap();

    let transaction = full_client
        .get_transaction(signature, None)
        .await
        .unwrap()
        .expect("transaction should survive a restart");
    assert_eq!(transaction.slot, recorded_slot);
    assert!(minimal_client.get_slot(None).await.unwrap() > recorded_slot);
}
