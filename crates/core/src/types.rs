use solana_message::{VersionedMessage, compiled_instruction::CompiledInstruction};
use solana_pubkey::Pubkey;
use solana_transaction::versioned::{TransactionVersion, VersionedTransaction};
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction,
    EncodedTransactionWithStatusMeta, TransactionBinaryEncoding, TransactionConfirmationStatus,
    UiAccountsList, UiAddressTableLookup, UiCompiledInstruction, UiInnerInstructions, UiInstruction,
    UiLoadedAddresses, UiMessage, UiParsedMessage, UiRawMessage, UiReturnDataEncoding,
    UiTransaction, UiTransactionEncoding, UiTransactionReturnData, UiTransactionStatusMeta,
    UiTransactionTokenBalance,
    option_serializer::OptionSerializer,
    parse_accounts::{ParsedAccount, ParsedAccountSource},
};
use solforge_types::{
    InnerInstructionGroup, TokenBalanceRecord, TransactionConfirmationStatus as SlotDepth,
    TransactionRecord,
};

use crate::{
    codec::{decode_base58, decode_base64, encode_base58},
    error::{SolforgeError, SolforgeResult},
    parsers::{TokenHint, accounts::token::ui_token_amount, parse_compiled_instruction},
};

/// A recorded transaction joined with its decoded wire form.
#[derive(Debug, Clone)]
pub struct StoredTransaction {
    pub record: TransactionRecord,
    pub transaction: VersionedTransaction,
}

/// Status row returned by `getSignatureStatuses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatusView {
    pub slot: u64,
    pub confirmations: Option<usize>,
    pub err: Option<solana_transaction_error::TransactionError>,
    pub status: Result<(), solana_transaction_error::TransactionError>,
    pub confirmation_status: Option<TransactionConfirmationStatus>,
}

impl SignatureStatusView {
    pub fn new(
        slot: u64,
        err: Option<solana_transaction_error::TransactionError>,
        current_slot: u64,
    ) -> Self {
        let confirmation_status = match SlotDepth::from_slot_distance(slot, current_slot) {
            SlotDepth::Processed => TransactionConfirmationStatus::Processed,
            SlotDepth::Confirmed => TransactionConfirmationStatus::Confirmed,
            SlotDepth::Finalized => TransactionConfirmationStatus::Finalized,
        };
        Self {
            slot,
            confirmations: SlotDepth::confirmations(slot, current_slot),
            status: match &err {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            },
            err,
            confirmation_status: Some(confirmation_status),
        }
    }
}

impl StoredTransaction {
    pub fn from_record(record: TransactionRecord) -> SolforgeResult<Self> {
        let bytes = decode_base64(&record.raw_transaction).ok_or_else(|| {
            SolforgeError::internal(format!(
                "stored transaction {} is not valid base64",
                record.signature
            ))
        })?;
        let transaction: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| SolforgeError::deserialize_error("VersionedTransaction", e.to_string()))?;
        Ok(Self {
            record,
            transaction,
        })
    }

    /// Static keys followed by the writable then readonly loaded addresses.
    pub fn account_keys(&self) -> Vec<Pubkey> {
        let loaded = &self.record.loaded_addresses;
        let loaded_keys = loaded
            .writable
            .iter()
            .chain(&loaded.readonly)
            .filter_map(|key| key.parse().ok());
        self.transaction
            .message
            .static_account_keys()
            .iter()
            .copied()
            .chain(loaded_keys)
            .collect()
    }

    fn token_hints(&self) -> Vec<TokenHint> {
        let mut hints: Vec<TokenHint> = self
            .record
            .pre_token_balances
            .iter()
            .chain(self.record.post_token_balances.iter())
            .filter_map(|balance| {
                Some(TokenHint {
                    mint: balance.mint.parse().ok()?,
                    decimals: balance.decimals,
                })
            })
            .collect();
        hints.sort();
        hints.dedup();
        hints
    }

    /// `version` field: absent for legacy transactions unless the caller
    /// declared support for versioned ones.
    fn version(
        &self,
        max_supported_version: Option<u8>,
    ) -> SolforgeResult<Option<TransactionVersion>> {
        match (max_supported_version, self.transaction.version()) {
            (None, TransactionVersion::LEGACY) => Ok(None),
            (None, TransactionVersion::Number(version)) => Err(unsupported_version(version)),
            (Some(_), TransactionVersion::LEGACY) => Ok(Some(TransactionVersion::LEGACY)),
            (Some(max), TransactionVersion::Number(version)) if version <= max => {
                Ok(Some(TransactionVersion::Number(version)))
            }
            (Some(_), TransactionVersion::Number(version)) => Err(unsupported_version(version)),
        }
    }

    /// Renders the `getTransaction` result for `encoding`.
    pub fn encode(
        &self,
        encoding: UiTransactionEncoding,
        max_supported_version: Option<u8>,
    ) -> SolforgeResult<EncodedConfirmedTransactionWithStatusMeta> {
        Ok(EncodedConfirmedTransactionWithStatusMeta {
            slot: self.record.slot,
            transaction: self.encode_with_meta(encoding, max_supported_version)?,
            block_time: self.record.block_time,
        })
    }

    /// The transaction and its meta, as `getBlock` lists them.
    pub fn encode_with_meta(
        &self,
        encoding: UiTransactionEncoding,
        max_supported_version: Option<u8>,
    ) -> SolforgeResult<EncodedTransactionWithStatusMeta> {
        let version = self.version(max_supported_version)?;
        let transaction = match encoding {
            UiTransactionEncoding::Binary => {
                EncodedTransaction::LegacyBinary(encode_base58(self.wire_bytes()))
            }
            UiTransactionEncoding::Base58 => EncodedTransaction::Binary(
                encode_base58(self.wire_bytes()),
                TransactionBinaryEncoding::Base58,
            ),
            UiTransactionEncoding::Base64 => EncodedTransaction::Binary(
                self.record.raw_transaction.clone(),
                TransactionBinaryEncoding::Base64,
            ),
            UiTransactionEncoding::Json => EncodedTransaction::Json(UiTransaction {
                signatures: self.signatures(),
                message: UiMessage::Raw(self.raw_message()),
            }),
            UiTransactionEncoding::JsonParsed => EncodedTransaction::Json(UiTransaction {
                signatures: self.signatures(),
                message: UiMessage::Parsed(self.parsed_message()),
            }),
        };
        Ok(EncodedTransactionWithStatusMeta {
            transaction,
            meta: Some(self.meta(encoding == UiTransactionEncoding::JsonParsed)),
            version,
        })
    }

    /// `transactionDetails: accounts` form: keys with their roles, and a
    /// meta without instructions or logs.
    pub fn encode_accounts(
        &self,
        max_supported_version: Option<u8>,
    ) -> SolforgeResult<EncodedTransactionWithStatusMeta> {
        let version = self.version(max_supported_version)?;
        let meta = UiTransactionStatusMeta {
            inner_instructions: OptionSerializer::Skip,
            log_messages: OptionSerializer::Skip,
            loaded_addresses: OptionSerializer::Skip,
            return_data: OptionSerializer::Skip,
            compute_units_consumed: OptionSerializer::Skip,
            ..self.meta(true)
        };
        Ok(EncodedTransactionWithStatusMeta {
            transaction: EncodedTransaction::Accounts(UiAccountsList {
                signatures: self.signatures(),
                account_keys: self.parsed_account_keys(),
            }),
            meta: Some(meta),
            version,
        })
    }

    fn wire_bytes(&self) -> Vec<u8> {
        decode_base64(&self.record.raw_transaction).unwrap_or_default()
    }

    fn signatures(&self) -> Vec<String> {
        self.transaction
            .signatures
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn address_table_lookups(&self) -> Option<Vec<UiAddressTableLookup>> {
        match &self.transaction.message {
            VersionedMessage::Legacy(_) => None,
            VersionedMessage::V0(message) => Some(
                message
                    .address_table_lookups
                    .iter()
                    .map(UiAddressTableLookup::from)
                    .collect(),
            ),
        }
    }

    fn raw_message(&self) -> UiRawMessage {
        let message = &self.transaction.message;
        UiRawMessage {
            header: *message.header(),
            account_keys: message
                .static_account_keys()
                .iter()
                .map(ToString::to_string)
                .collect(),
            recent_blockhash: message.recent_blockhash().to_string(),
            instructions: message
                .instructions()
                .iter()
                .map(|ix| UiCompiledInstruction::from(ix, None))
                .collect(),
            address_table_lookups: self.address_table_lookups(),
        }
    }

    fn parsed_account_keys(&self) -> Vec<ParsedAccount> {
        let static_len = self.transaction.message.static_account_keys().len();
        self.record
            .account_keys
            .iter()
            .enumerate()
            .map(|(index, role)| ParsedAccount {
                pubkey: role.pubkey.clone(),
                writable: role.writable,
                signer: role.signer,
                source: Some(if index < static_len {
                    ParsedAccountSource::Transaction
                } else {
                    ParsedAccountSource::LookupTable
                }),
            })
            .collect()
    }

    fn parsed_message(&self) -> UiParsedMessage {
        let keys = self.account_keys();
        let hints = self.token_hints();
        let message = &self.transaction.message;
        UiParsedMessage {
            account_keys: self.parsed_account_keys(),
            recent_blockhash: message.recent_blockhash().to_string(),
            instructions: message
                .instructions()
                .iter()
                .map(|ix| UiInstruction::Parsed(parse_compiled_instruction(ix, &keys, &hints, None)))
                .collect(),
            address_table_lookups: self.address_table_lookups(),
        }
    }

    /// Parsed meta leaves out `loadedAddresses`; those keys are already in
    /// the parsed account list.
    fn meta(&self, parsed: bool) -> UiTransactionStatusMeta {
        let record = &self.record;
        let loaded_addresses = if parsed {
            OptionSerializer::Skip
        } else {
            OptionSerializer::Some(UiLoadedAddresses {
                writable: record.loaded_addresses.writable.clone(),
                readonly: record.loaded_addresses.readonly.clone(),
            })
        };
        UiTransactionStatusMeta {
            err: record.err.clone().map(Into::into),
            status: match &record.err {
                Some(err) => Err(err.clone().into()),
                None => Ok(()),
            },
            fee: record.fee,
            pre_balances: record.pre_balances.clone(),
            post_balances: record.post_balances.clone(),
            inner_instructions: OptionSerializer::Some(self.inner_instructions(parsed)),
            log_messages: OptionSerializer::Some(record.logs.clone()),
            pre_token_balances: OptionSerializer::Some(ui_token_balances(
                &record.pre_token_balances,
            )),
            post_token_balances: OptionSerializer::Some(ui_token_balances(
                &record.post_token_balances,
            )),
            rewards: OptionSerializer::Some(vec![]),
            loaded_addresses,
            return_data: OptionSerializer::or_skip(record.return_data.as_ref().map(|data| {
                UiTransactionReturnData {
                    program_id: data.program_id.clone(),
                    data: (data.data.clone(), UiReturnDataEncoding::Base64),
                }
            })),
            compute_units_consumed: OptionSerializer::or_skip(record.compute_units_consumed),
            cost_units: OptionSerializer::Skip,
        }
    }

    fn inner_instructions(&self, parsed: bool) -> Vec<UiInnerInstructions> {
        let keys = self.account_keys();
        let hints = self.token_hints();
        self.record
            .inner_instructions
            .iter()
            .map(|group: &InnerInstructionGroup| UiInnerInstructions {
                index: group.index,
                instructions: group
                    .instructions
                    .iter()
                    .map(|ix| {
                        let compiled = UiCompiledInstruction {
                            program_id_index: ix.program_id_index,
                            accounts: ix.accounts.clone(),
                            data: ix.data.clone(),
                            stack_height: ix.stack_height,
                        };
                        if !parsed {
                            return UiInstruction::Compiled(compiled);
                        }
                        let instruction = CompiledInstruction {
                            program_id_index: ix.program_id_index,
                            accounts: ix.accounts.clone(),
                            data: decode_base58(&ix.data).unwrap_or_default(),
                        };
                        UiInstruction::Parsed(parse_compiled_instruction(
                            &instruction,
                            &keys,
                            &hints,
                            ix.stack_height,
                        ))
                    })
                    .collect(),
            })
            .collect()
    }
}

fn unsupported_version(version: u8) -> SolforgeError {
    SolforgeError::invalid_params(format!(
        "Transaction version ({version}) is not supported by the requesting client. \
         Please try the request again with the following configuration parameter: \
         \"maxSupportedTransactionVersion\": {version}"
    ))
}

pub fn ui_token_balances(balances: &[TokenBalanceRecord]) -> Vec<UiTransactionTokenBalance> {
    balances
        .iter()
        .map(|balance| UiTransactionTokenBalance {
            account_index: balance.account_index,
            mint: balance.mint.clone(),
            ui_token_amount: ui_token_amount(balance.raw_amount(), balance.decimals),
            owner: OptionSerializer::or_skip(balance.owner.clone()),
            program_id: OptionSerializer::or_skip(balance.program_id.clone()),
        })
        .collect()
}
