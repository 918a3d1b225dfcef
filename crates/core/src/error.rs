use std::{fmt::Display, future::Future, pin::Pin};

use crossbeam_channel::TrySendError;
use jsonrpc_core::{Error, ErrorCode, Result};
use serde::Serialize;
use serde_json::json;
use solana_pubkey::Pubkey;
use solana_transaction_error::TransactionError;

use crate::storage::StorageError;

/// Transaction rejected by the engine, or a simulation that failed.
pub const TRANSACTION_FAILURE_CODE: i64 = -32003;
/// Account requested for cloning does not exist on the remote endpoint.
pub const REMOTE_ACCOUNT_NOT_FOUND_CODE: i64 = -32004;

pub type SolforgeResult<T> = std::result::Result<T, SolforgeError>;

#[derive(Debug, Clone)]
pub struct SolforgeError(Error);

impl From<SolforgeError> for String {
    fn from(e: SolforgeError) -> Self {
        e.0.to_string()
    }
}

impl From<SolforgeError> for Error {
    fn from(e: SolforgeError) -> Self {
        e.0
    }
}

impl std::error::Error for SolforgeError {}

impl std::fmt::Display for SolforgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let Error {
            code,
            message,
            data,
        } = &self.0;

        let core = if code.description().eq(message) {
            code.description()
        } else {
            format!("{}: {}", code.description(), message)
        };

        if let Some(data_value) = data {
            write!(f, "{}: {}", core, data_value)
        } else {
            write!(f, "{}", core)
        }
    }
}

impl<T> From<SolforgeError> for Pin<Box<dyn Future<Output = Result<T>> + Send>> {
    fn from(e: SolforgeError) -> Self {
        Box::pin(async move { Err(e.into()) })
    }
}

impl<T> From<TrySendError<T>> for SolforgeError {
    fn from(val: TrySendError<T>) -> Self {
        let mut error = Error::internal_error();
        error.data = Some(json!(format!(
            "Failed to send command on channel: {}",
            val
        )));
        Self(error)
    }
}

impl SolforgeError {
    pub fn code(&self) -> &ErrorCode {
        &self.0.code
    }

    pub fn missing_context() -> Self {
        let mut error = Error::internal_error();
        error.data = Some(json!("Failed to access internal node context"));
        Self(error)
    }

    pub fn set_account<T>(pubkey: Pubkey, e: T) -> Self
    where
        T: ToString,
    {
        let mut error = Error::internal_error();
        error.data = Some(json!(format!(
            "Failed to set account {}: {}",
            pubkey,
            e.to_string()
        )));
        Self(error)
    }

    pub fn get_account<T>(pubkey: Pubkey, e: T) -> Self
    where
        T: ToString,
    {
        let mut error = Error::internal_error();
        error.data = Some(json!(format!(
            "Failed to fetch account {} from remote: {}",
            pubkey,
            e.to_string()
        )));
        Self(error)
    }

    /// The engine rejected a transaction. The engine's error value is carried
    /// verbatim in `data.err`.
    pub fn transaction_failed(err: &TransactionError, logs: Vec<String>) -> Self {
        Self(Error {
            code: ErrorCode::ServerError(TRANSACTION_FAILURE_CODE),
            message: format!("Transaction simulation failed: {err}"),
            data: Some(json!({
                "err": err,
                "logs": logs,
            })),
        })
    }

    pub fn remote_account_not_found<P>(pubkey: P, endpoint: &str) -> Self
    where
        P: Display,
    {
        Self(Error {
            code: ErrorCode::ServerError(REMOTE_ACCOUNT_NOT_FOUND_CODE),
            message: format!("Account {pubkey} not found on {endpoint}"),
            data: None,
        })
    }

    pub fn invalid_params<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self(Error::invalid_params(message))
    }

    pub fn invalid_pubkey<D>(pubkey: &str, data: D) -> Self
    where
        D: Serialize,
    {
        let mut error = Error::invalid_params(format!("Invalid pubkey '{pubkey}'"));
        error.data = Some(json!(data));
        Self(error)
    }

    pub fn invalid_pubkey_at_index<D>(pubkey: &str, index: usize, data: D) -> Self
    where
        D: Serialize,
    {
        let mut error =
            Error::invalid_params(format!("Invalid pubkey '{pubkey}' at index {index}"));
        error.data = Some(json!(data));
        Self(error)
    }

    pub fn invalid_signature<D>(signature: &str, data: D) -> Self
    where
        D: Serialize,
    {
        let mut error = Error::invalid_params(format!("Invalid signature {signature}"));
        error.data = Some(json!(data));
        Self(error)
    }

    pub fn account_not_found<P>(pubkey: P) -> Self
    where
        P: Display,
    {
        Self(Error::invalid_params(format!("Account {pubkey} not found")))
    }

    pub fn invalid_account_data<P, M>(pubkey: P, message: M) -> Self
    where
        P: Display,
        M: Display,
    {
        Self(Error::invalid_params(format!(
            "invalid account data {pubkey}: {message}"
        )))
    }

    pub fn invalid_base64_data<D>(typing: &str, data: D) -> Self
    where
        D: Display,
    {
        let mut error = Error::invalid_params(format!("Invalid base64 {typing}"));
        error.data = Some(json!(data.to_string()));
        Self(error)
    }

    pub fn deserialize_error<D>(typing: &str, data: D) -> Self
    where
        D: Display,
    {
        let mut error = Error::invalid_params(format!("Failed to deserialize {typing}"));
        error.data = Some(json!(data.to_string()));
        Self(error)
    }

    pub fn internal<D>(data: D) -> Self
    where
        D: Serialize,
    {
        let mut error = Error::internal_error();
        error.data = Some(json!(data));
        Self(error)
    }

    pub fn token_mint_not_found(mint: Pubkey) -> Self {
        Self(Error::invalid_params(format!("Token mint {mint} not found")))
    }

    pub fn unpack_token_account() -> Self {
        Self(Error::invalid_params(
            "Invalid param: not a Token account".to_string(),
        ))
    }

    pub fn unpack_mint_account() -> Self {
        Self(Error::invalid_params(
            "Invalid param: not a Token mint".to_string(),
        ))
    }
}

impl From<StorageError> for SolforgeError {
    fn from(e: StorageError) -> Self {
        let mut error = Error::internal_error();
        error.data = Some(json!(format!("Storage error: {}", e)));
        SolforgeError(error)
    }
}
