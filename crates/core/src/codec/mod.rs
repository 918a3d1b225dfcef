//! Encoding primitives shared by the parsers, the capture pipeline and the
//! RPC layer.

mod transaction;

use base64::prelude::*;
pub use transaction::{
    AccountRole, account_roles, decode_transaction, decode_transaction_with_fallback,
};

pub fn encode_base58<T: AsRef<[u8]>>(bytes: T) -> String {
    bs58::encode(bytes).into_string()
}

pub fn decode_base58(encoded: &str) -> Option<Vec<u8>> {
    bs58::decode(encoded).into_vec().ok()
}

pub fn encode_base64<T: AsRef<[u8]>>(bytes: T) -> String {
    BASE64_STANDARD.encode(bytes)
}

pub fn decode_base64(encoded: &str) -> Option<Vec<u8>> {
    BASE64_STANDARD.decode(encoded).ok()
}
