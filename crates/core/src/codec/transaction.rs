use std::any::type_name;

use base64::prelude::*;
use bincode::Options;
use solana_message::{MessageHeader, VersionedMessage};
use solana_packet::PACKET_DATA_SIZE;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_status::{TransactionBinaryEncoding, UiTransactionEncoding};

use crate::error::{SolforgeError, SolforgeResult};

const MAX_BASE58_SIZE: usize = 1683; // Golden, bump if PACKET_DATA_SIZE changes
const MAX_BASE64_SIZE: usize = 1644; // Golden, bump if PACKET_DATA_SIZE changes

pub fn decode_transaction<T>(
    encoded: &str,
    encoding: TransactionBinaryEncoding,
) -> SolforgeResult<(Vec<u8>, T)>
where
    T: serde::de::DeserializeOwned,
{
    let wire_output = match encoding {
        TransactionBinaryEncoding::Base58 => {
            if encoded.len() > MAX_BASE58_SIZE {
                return Err(SolforgeError::invalid_params(format!(
                    "base58 encoded {} too large: {} bytes (max: encoded/raw {}/{})",
                    type_name::<T>(),
                    encoded.len(),
                    MAX_BASE58_SIZE,
                    PACKET_DATA_SIZE,
                )));
            }
            bs58::decode(encoded).into_vec().map_err(|e| {
                SolforgeError::invalid_params(format!("invalid base58 encoding: {e:?}"))
            })?
        }
        TransactionBinaryEncoding::Base64 => {
            if encoded.len() > MAX_BASE64_SIZE {
                return Err(SolforgeError::invalid_params(format!(
                    "base64 encoded {} too large: {} bytes (max: encoded/raw {}/{})",
                    type_name::<T>(),
                    encoded.len(),
                    MAX_BASE64_SIZE,
                    PACKET_DATA_SIZE,
                )));
            }
            BASE64_STANDARD.decode(encoded).map_err(|e| {
                SolforgeError::invalid_params(format!("invalid base64 encoding: {e:?}"))
            })?
        }
    };
    if wire_output.len() > PACKET_DATA_SIZE {
        return Err(SolforgeError::invalid_params(format!(
            "decoded {} too large: {} bytes (max: {} bytes)",
            type_name::<T>(),
            wire_output.len(),
            PACKET_DATA_SIZE
        )));
    }
    bincode::options()
        .with_limit(PACKET_DATA_SIZE as u64)
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .deserialize_from(&wire_output[..])
        .map_err(|err| SolforgeError::deserialize_error(type_name::<T>(), err))
        .map(|output| (wire_output, output))
}

/// Decodes a wire transaction. An explicit encoding is honoured as-is; when the
/// caller gave none, base64 is tried first and base58 second.
pub fn decode_transaction_with_fallback(
    encoded: &str,
    encoding: Option<UiTransactionEncoding>,
) -> SolforgeResult<(Vec<u8>, VersionedTransaction)> {
    match encoding {
        Some(encoding) => {
            let binary_encoding = encoding.into_binary_encoding().ok_or_else(|| {
                SolforgeError::invalid_params(format!(
                    "unsupported encoding: {encoding}. Supported encodings: base58, base64"
                ))
            })?;
            decode_transaction(encoded, binary_encoding)
        }
        None => decode_transaction(encoded, TransactionBinaryEncoding::Base64).or_else(
            |base64_err| {
                decode_transaction(encoded, TransactionBinaryEncoding::Base58)
                    .map_err(|_| base64_err)
            },
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRole {
    pub signer: bool,
    pub writable: bool,
}

/// Signer and writable flags for every static account key, derived from the
/// message header, followed by the writable then readonly loaded addresses.
pub fn account_roles(message: &VersionedMessage) -> Vec<AccountRole> {
    let static_len = message.static_account_keys().len();
    let mut roles = header_roles(message.header(), static_len);
    if let VersionedMessage::V0(v0) = message {
        let writable: usize = v0
            .address_table_lookups
            .iter()
            .map(|l| l.writable_indexes.len())
            .sum();
        let readonly: usize = v0
            .address_table_lookups
            .iter()
            .map(|l| l.readonly_indexes.len())
            .sum();
        roles.extend((0..writable).map(|_| AccountRole {
            signer: false,
            writable: true,
        }));
        roles.extend((0..readonly).map(|_| AccountRole {
            signer: false,
            writable: false,
        }));
    }
    roles
}

fn header_roles(header: &MessageHeader, key_count: usize) -> Vec<AccountRole> {
    let required = header.num_required_signatures as usize;
    let readonly_signed = header.num_readonly_signed_accounts as usize;
    let readonly_unsigned = header.num_readonly_unsigned_accounts as usize;
    (0..key_count)
        .map(|i| {
            if i < required {
                AccountRole {
                    signer: true,
                    writable: i < required.saturating_sub(readonly_signed),
                }
            } else {
                AccountRole {
                    signer: false,
                    writable: i < key_count.saturating_sub(readonly_unsigned),
                }
            }
        })
        .collect()
}
