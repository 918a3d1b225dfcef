use std::{
    collections::HashMap,
    sync::{Arc, RwLock, atomic},
    time::Duration,
};

use jsonrpc_core::{Error, ErrorCode, Result};
use jsonrpc_derive::rpc;
use jsonrpc_pubsub::{
    SubscriptionId,
    typed::{Sink, Subscriber},
};
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    rpc_config::{
        RpcBlockSubscribeConfig, RpcBlockSubscribeFilter, RpcProgramAccountsConfig,
        RpcSignatureSubscribeConfig, RpcTransactionLogsFilter,
    },
    rpc_response::{
        ProcessedSignatureResult, RpcKeyedAccount, RpcLogsResponse, RpcResponseContext,
        RpcSignatureResult,
    },
};
use solana_commitment_config::CommitmentConfig;
use solana_pubkey::Pubkey;
use solana_rpc_client_api::response::{Response as RpcResponse, SlotInfo};
use solforge_types::{SIGNATURE_POLL_INTERVAL_MS, SIGNATURE_POLL_MAX_ATTEMPTS, TransactionRecord};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{
    SolforgeWebsocketMeta, State,
    utils::{apply_filters, encode_ui_account, verify_filters, verify_pubkey, verify_signature},
};
use crate::localnet::LocalnetLocker;

type SignatureSinks = HashMap<SubscriptionId, (String, Sink<RpcResponse<RpcSignatureResult>>)>;
type LogsSinks =
    HashMap<SubscriptionId, (RpcTransactionLogsFilter, Sink<RpcResponse<RpcLogsResponse>>)>;
type SlotSinks = HashMap<SubscriptionId, Sink<SlotInfo>>;
type ProgramSinks = HashMap<SubscriptionId, ProgramSubscription>;
type BlockSinks = HashMap<SubscriptionId, Sink<RpcResponse<serde_json::Value>>>;

pub struct ProgramSubscription {
    program_id: Pubkey,
    config: RpcProgramAccountsConfig,
    sink: Sink<RpcResponse<RpcKeyedAccount>>,
}

#[rpc]
pub trait Rpc {
    type Metadata;

    /// Subscribe to the outcome of a transaction.
    ///
    /// The subscription is one-shot: a single `signatureNotification` is sent
    /// once the transaction is recorded, then the subscription is dropped. If
    /// the transaction is already recorded, the notification is sent right
    /// away.
    ///
    /// ## Example WebSocket Request
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "id": 1,
    ///   "method": "signatureSubscribe",
    ///   "params": ["2id3YC2jK9G5Wo2phDx4gJVAew8DcY5NAojnVuao8rkxwPYPe8cSwE5GzhEgJA2y8fVjDEo6iR6ykBvDxrTQrtpb"]
    /// }
    /// ```
    ///
    /// ## Example WebSocket Notification
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "method": "signatureNotification",
    ///   "params": {
    ///     "result": { "context": { "slot": 12 }, "value": { "err": null } },
    ///     "subscription": 0
    ///   }
    /// }
    /// ```
    #[pubsub(
        subscription = "signatureNotification",
        subscribe,
        name = "signatureSubscribe"
    )]
    fn signature_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<RpcSignatureResult>>,
        signature_str: String,
        config: Option<RpcSignatureSubscribeConfig>,
    );

    #[pubsub(
        subscription = "signatureNotification",
        unsubscribe,
        name = "signatureUnsubscribe"
    )]
    fn signature_unsubscribe(
        &self,
        meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool>;

    /// Subscribe to the logs of recorded transactions. The filter is `all`,
    /// `allWithVotes` or `{ "mentions": [address] }`.
    #[pubsub(subscription = "logsNotification", subscribe, name = "logsSubscribe")]
    fn logs_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<RpcLogsResponse>>,
        filter: Option<RpcTransactionLogsFilter>,
        commitment: Option<CommitmentConfig>,
    );

    #[pubsub(
        subscription = "logsNotification",
        unsubscribe,
        name = "logsUnsubscribe"
    )]
    fn logs_unsubscribe(
        &self,
        meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool>;

    /// Subscribe to slot changes. One notification per closed slot.
    ///
    /// ## Example WebSocket Notification
    /// ```json
    /// {
    ///   "jsonrpc": "2.0",
    ///   "method": "slotNotification",
    ///   "params": {
    ///     "result": { "parent": 75, "root": 44, "slot": 76 },
    ///     "subscription": 0
    ///   }
    /// }
    /// ```
    #[pubsub(subscription = "slotNotification", subscribe, name = "slotSubscribe")]
    fn slot_subscribe(&self, meta: Self::Metadata, subscriber: Subscriber<SlotInfo>);

    #[pubsub(
        subscription = "slotNotification",
        unsubscribe,
        name = "slotUnsubscribe"
    )]
    fn slot_unsubscribe(
        &self,
        meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool>;

    /// Subscribe to accounts owned by a program. A notification is sent for
    /// every owned account a recorded transaction touched, after filters.
    #[pubsub(
        subscription = "programNotification",
        subscribe,
        name = "programSubscribe"
    )]
    fn program_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<RpcKeyedAccount>>,
        program_id_str: String,
        config: Option<RpcProgramAccountsConfig>,
    );

    #[pubsub(
        subscription = "programNotification",
        unsubscribe,
        name = "programUnsubscribe"
    )]
    fn program_unsubscribe(
        &self,
        meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool>;

    /// Accepted for client compatibility. An id is returned but no block
    /// notifications are produced.
    #[pubsub(subscription = "blockNotification", subscribe, name = "blockSubscribe")]
    fn block_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<serde_json::Value>>,
        filter: RpcBlockSubscribeFilter,
        config: Option<RpcBlockSubscribeConfig>,
    );

    #[pubsub(
        subscription = "blockNotification",
        unsubscribe,
        name = "blockUnsubscribe"
    )]
    fn block_unsubscribe(
        &self,
        meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool>;
}

/// Subscription maps shared between the RPC handlers and the background
/// tasks that feed them.
#[derive(Clone, Default)]
pub struct Subscriptions {
    pub signature: Arc<RwLock<SignatureSinks>>,
    pub logs: Arc<RwLock<LogsSinks>>,
    pub slot: Arc<RwLock<SlotSinks>>,
    pub program: Arc<RwLock<ProgramSinks>>,
    pub block: Arc<RwLock<BlockSinks>>,
}

fn logs_filter_matches(filter: &RpcTransactionLogsFilter, record: &TransactionRecord) -> bool {
    match filter {
        RpcTransactionLogsFilter::All | RpcTransactionLogsFilter::AllWithVotes => true,
        RpcTransactionLogsFilter::Mentions(addresses) => {
            addresses.iter().any(|address| record.mentions(address))
        }
    }
}

fn signature_result(record: &TransactionRecord) -> RpcResponse<RpcSignatureResult> {
    RpcResponse {
        context: RpcResponseContext::new(record.slot),
        value: RpcSignatureResult::ProcessedSignature(ProcessedSignatureResult {
            err: record.err.clone().map(Into::into),
        }),
    }
}

impl Subscriptions {
    /// Fans a freshly recorded transaction out to every matching subscriber.
    /// Signature subscriptions are consumed; sinks that fail are dropped.
    pub fn dispatch(&self, locker: &LocalnetLocker, record: &TransactionRecord) {
        if let Ok(mut guard) = self.signature.write() {
            guard.retain(|_, (signature, sink)| {
                if *signature != record.signature {
                    return true;
                }
                if let Err(e) = sink.notify(Ok(signature_result(record))) {
                    debug!("signature subscriber went away: {e}");
                }
                false
            });
        }

        if let Ok(mut guard) = self.logs.write() {
            guard.retain(|_, (filter, sink)| {
                if !logs_filter_matches(filter, record) {
                    return true;
                }
                sink.notify(Ok(RpcResponse {
                    context: RpcResponseContext::new(record.slot),
                    value: RpcLogsResponse {
                        signature: record.signature.clone(),
                        err: record.err.clone().map(Into::into),
                        logs: record.logs.clone(),
                    },
                }))
                .is_ok()
            });
        }

        let Ok(mut guard) = self.program.write() else {
            return;
        };
        if guard.is_empty() {
            return;
        }
        let touched: Vec<Pubkey> = record
            .account_keys
            .iter()
            .filter_map(|key| key.pubkey.parse().ok())
            .collect();
        locker.with_state_reader(|state| {
            let accounts: Vec<_> = touched
                .iter()
                .filter_map(|pubkey| Some((*pubkey, state.engine.get_account(pubkey)?)))
                .collect();
            guard.retain(|_, subscription| {
                let filters = subscription.config.filters.clone().unwrap_or_default();
                let encoding = subscription
                    .config
                    .account_config
                    .encoding
                    .unwrap_or(UiAccountEncoding::Binary);
                accounts
                    .iter()
                    .filter(|(_, account)| account.owner == subscription.program_id)
                    .filter(|(_, account)| apply_filters(&account.data, &filters))
                    .all(|(pubkey, account)| {
                        let keyed = RpcKeyedAccount {
                            pubkey: pubkey.to_string(),
                            account: encode_ui_account(
                                pubkey,
                                account,
                                encoding,
                                &|mint| state.mint_decimals(mint),
                                subscription.config.account_config.data_slice,
                            ),
                        };
                        subscription
                            .sink
                            .notify(Ok(RpcResponse {
                                context: RpcResponseContext::new(record.slot),
                                value: keyed,
                            }))
                            .is_ok()
                    })
            });
        });
    }

    pub fn notify_slot(&self, slot_info: &SlotInfo) {
        if let Ok(mut guard) = self.slot.write() {
            guard.retain(|_, sink| sink.notify(Ok(slot_info.clone())).is_ok());
        }
    }
}

/// Waits for the record behind `signature` to become readable.
async fn poll_record(locker: &LocalnetLocker, signature: &str) -> Option<TransactionRecord> {
    for _ in 0..SIGNATURE_POLL_MAX_ATTEMPTS {
        let record = locker.with_state_reader(|state| state.get_transaction_record(signature));
        match record {
            Ok(Some(record)) => return Some(record),
            Ok(None) => {}
            Err(e) => warn!("lookup of {signature} failed: {e}"),
        }
        tokio::time::sleep(Duration::from_millis(SIGNATURE_POLL_INTERVAL_MS)).await;
    }
    None
}

async fn watch_signatures(
    locker: LocalnetLocker,
    subscriptions: Subscriptions,
    mut signatures_rx: UnboundedReceiver<String>,
) {
    while let Some(signature) = signatures_rx.recv().await {
        let locker = locker.clone();
        let subscriptions = subscriptions.clone();
        tokio::spawn(async move {
            match poll_record(&locker, &signature).await {
                Some(record) => subscriptions.dispatch(&locker, &record),
                None => debug!("no record for {signature}, dropping notification"),
            }
        });
    }
}

async fn forward_slots(subscriptions: Subscriptions, mut slots_rx: UnboundedReceiver<SlotInfo>) {
    while let Some(slot_info) = slots_rx.recv().await {
        subscriptions.notify_slot(&slot_info);
    }
}

pub struct SolforgeWsRpc {
    pub uid: atomic::AtomicUsize,
    pub subscriptions: Subscriptions,
    pub tokio_handle: tokio::runtime::Handle,
}

impl SolforgeWsRpc {
    /// Registers with the node's signature and slot listeners and spawns the
    /// tasks that feed subscribers.
    pub fn new(locker: &LocalnetLocker, tokio_handle: tokio::runtime::Handle) -> Self {
        let subscriptions = Subscriptions::default();
        tokio_handle.spawn(watch_signatures(
            locker.clone(),
            subscriptions.clone(),
            locker.register_signature_listener(),
        ));
        tokio_handle.spawn(forward_slots(
            subscriptions.clone(),
            locker.register_slot_listener(),
        ));
        Self {
            uid: atomic::AtomicUsize::new(0),
            subscriptions,
            tokio_handle,
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::Number(self.uid.fetch_add(1, atomic::Ordering::SeqCst) as u64)
    }
}

fn reject<T>(subscriber: Subscriber<T>, error: Error) {
    if let Err(e) = subscriber.reject(error) {
        error!("Failed to reject subscriber: {:?}", e);
    }
}

fn remove_subscription<V>(
    map: &RwLock<HashMap<SubscriptionId, V>>,
    subscription: &SubscriptionId,
) -> Result<bool> {
    let Ok(mut guard) = map.write() else {
        error!("Failed to acquire write lock on subscription map");
        return Err(Error::internal_error());
    };
    match guard.remove(subscription) {
        Some(_) => Ok(true),
        None => Err(Error {
            code: ErrorCode::InvalidParams,
            message: "Invalid subscription id.".into(),
            data: None,
        }),
    }
}

impl Rpc for SolforgeWsRpc {
    type Metadata = Option<SolforgeWebsocketMeta>;

    fn signature_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<RpcSignatureResult>>,
        signature_str: String,
        _config: Option<RpcSignatureSubscribeConfig>,
    ) {
        let _ = meta
            .as_ref()
            .map(|m| m.log_debug("Websocket 'signature_subscribe' connection established"));

        if let Err(e) = verify_signature(&signature_str) {
            return reject(subscriber, e.into());
        }
        let locker = match meta.get_locker() {
            Ok(locker) => locker,
            Err(e) => return reject(subscriber, e.into()),
        };

        let sub_id = self.next_id();
        let Ok(sink) = subscriber.assign_id(sub_id.clone()) else {
            error!("Failed to assign subscription ID");
            return;
        };
        let Ok(mut guard) = self.subscriptions.signature.write() else {
            error!("Failed to acquire write lock on signature subscriptions");
            return;
        };
        guard.insert(sub_id.clone(), (signature_str.clone(), sink));
        drop(guard);

        // Registered first so a transaction landing right now is not missed.
        let record = locker.with_state_reader(|state| state.get_transaction_record(&signature_str));
        if let Ok(Some(record)) = record {
            if let Ok(mut guard) = self.subscriptions.signature.write() {
                if let Some((_, sink)) = guard.remove(&sub_id) {
                    let _ = sink.notify(Ok(signature_result(&record)));
                }
            }
        }
    }

    fn signature_unsubscribe(
        &self,
        _meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        remove_subscription(&self.subscriptions.signature, &subscription)
    }

    fn logs_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<RpcLogsResponse>>,
        filter: Option<RpcTransactionLogsFilter>,
        _commitment: Option<CommitmentConfig>,
    ) {
        let _ = meta
            .as_ref()
            .map(|m| m.log_debug("Websocket 'logs_subscribe' connection established"));

        let filter = filter.unwrap_or(RpcTransactionLogsFilter::All);
        if let RpcTransactionLogsFilter::Mentions(addresses) = &filter {
            if addresses.len() != 1 {
                return reject(
                    subscriber,
                    Error::invalid_params("Invalid Request: Only 1 address supported"),
                );
            }
            if let Err(e) = verify_pubkey(&addresses[0]) {
                return reject(subscriber, e.into());
            }
        }

        let sub_id = self.next_id();
        let Ok(sink) = subscriber.assign_id(sub_id.clone()) else {
            error!("Failed to assign subscription ID");
            return;
        };
        match self.subscriptions.logs.write() {
            Ok(mut guard) => {
                guard.insert(sub_id, (filter, sink));
            }
            Err(_) => error!("Failed to acquire write lock on logs subscriptions"),
        }
    }

    fn logs_unsubscribe(
        &self,
        _meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        remove_subscription(&self.subscriptions.logs, &subscription)
    }

    fn slot_subscribe(&self, meta: Self::Metadata, subscriber: Subscriber<SlotInfo>) {
        let _ = meta
            .as_ref()
            .map(|m| m.log_debug("Websocket 'slot_subscribe' connection established"));

        let sub_id = self.next_id();
        let Ok(sink) = subscriber.assign_id(sub_id.clone()) else {
            error!("Failed to assign subscription ID");
            return;
        };
        match self.subscriptions.slot.write() {
            Ok(mut guard) => {
                guard.insert(sub_id, sink);
            }
            Err(_) => error!("Failed to acquire write lock on slot subscriptions"),
        }
    }

    fn slot_unsubscribe(
        &self,
        _meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        remove_subscription(&self.subscriptions.slot, &subscription)
    }

    fn program_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<RpcKeyedAccount>>,
        program_id_str: String,
        config: Option<RpcProgramAccountsConfig>,
    ) {
        let _ = meta
            .as_ref()
            .map(|m| m.log_debug("Websocket 'program_subscribe' connection established"));

        let program_id = match verify_pubkey(&program_id_str) {
            Ok(program_id) => program_id,
            Err(e) => return reject(subscriber, e.into()),
        };
        let mut config = config.unwrap_or_default();
        if let Some(filters) = config.filters.as_mut() {
            if let Err(e) = verify_filters(filters) {
                return reject(subscriber, e.into());
            }
        }

        let sub_id = self.next_id();
        let Ok(sink) = subscriber.assign_id(sub_id.clone()) else {
            error!("Failed to assign subscription ID");
            return;
        };
        match self.subscriptions.program.write() {
            Ok(mut guard) => {
                guard.insert(
                    sub_id,
                    ProgramSubscription {
                        program_id,
                        config,
                        sink,
                    },
                );
            }
            Err(_) => error!("Failed to acquire write lock on program subscriptions"),
        }
    }

    fn program_unsubscribe(
        &self,
        _meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        remove_subscription(&self.subscriptions.program, &subscription)
    }

    fn block_subscribe(
        &self,
        meta: Self::Metadata,
        subscriber: Subscriber<RpcResponse<serde_json::Value>>,
        _filter: RpcBlockSubscribeFilter,
        _config: Option<RpcBlockSubscribeConfig>,
    ) {
        let _ = meta
            .as_ref()
            .map(|m| m.log_debug("Websocket 'block_subscribe' connection established"));

        let sub_id = self.next_id();
        let Ok(sink) = subscriber.assign_id(sub_id.clone()) else {
            error!("Failed to assign subscription ID");
            return;
        };
        match self.subscriptions.block.write() {
            Ok(mut guard) => {
                guard.insert(sub_id, sink);
            }
            Err(_) => error!("Failed to acquire write lock on block subscriptions"),
        }
    }

    fn block_unsubscribe(
        &self,
        _meta: Option<Self::Metadata>,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        remove_subscription(&self.subscriptions.block, &subscription)
    }
}
