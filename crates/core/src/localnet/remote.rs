use std::time::Duration;

use solana_account::Account;
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_client::RpcClientConfig};
use solana_commitment_config::CommitmentConfig;
use solana_pubkey::Pubkey;
use solana_rpc_client::http_sender::HttpSender;

use crate::error::{SolforgeError, SolforgeResult};

const REMOTE_TIMEOUT_SECS: u64 = 30;

/// Client for the upstream cluster that accounts and programs are cloned from.
pub struct RemoteClient {
    pub client: RpcClient,
}

impl Clone for RemoteClient {
    fn clone(&self) -> Self {
        RemoteClient::new(self.client.url())
    }
}

impl RemoteClient {
    pub fn new<U: ToString>(remote_rpc_url: U) -> Self {
        let url = remote_rpc_url.to_string();
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(REMOTE_TIMEOUT_SECS))
            .build()
        {
            Ok(http) => RpcClient::new_sender(
                HttpSender::new_with_client(url, http),
                RpcClientConfig::with_commitment(CommitmentConfig::confirmed()),
            ),
            Err(e) => {
                warn!("unable to build remote http client, using defaults: {e}");
                RpcClient::new_with_commitment(url, CommitmentConfig::confirmed())
            }
        };
        RemoteClient { client }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    pub async fn get_account(&self, pubkey: &Pubkey) -> SolforgeResult<Option<Account>> {
        self.client
            .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
            .await
            .map(|response| response.value)
            .map_err(|e| SolforgeError::get_account(*pubkey, e))
    }

    /// Fetches an account that must exist upstream.
    pub async fn get_required_account(&self, pubkey: &Pubkey) -> SolforgeResult<Account> {
        self.get_account(pubkey)
            .await?
            .ok_or_else(|| SolforgeError::remote_account_not_found(pubkey, &self.url()))
    }

    /// Secondary fetches never fail the caller.
    pub async fn get_optional_account(&self, pubkey: &Pubkey) -> Option<Account> {
        match self.get_account(pubkey).await {
            Ok(account) => account,
            Err(e) => {
                warn!("secondary fetch of {pubkey} failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_keeps_endpoint() {
        let remote = RemoteClient::new("http://127.0.0.1:1");
        assert_eq!(remote.clone().url(), "http://127.0.0.1:1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_endpoint_is_an_error() {
        let remote = RemoteClient::new("http://127.0.0.1:1");
        let pubkey = Pubkey::new_unique();
        assert!(remote.get_account(&pubkey).await.is_err());
        assert!(remote.get_optional_account(&pubkey).await.is_none());
    }
}
