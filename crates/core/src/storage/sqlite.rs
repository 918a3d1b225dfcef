use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use solana_clock::Slot;
use solana_transaction_error::TransactionError;
use solforge_db::{
    diesel::{
        self, Connection, QueryableByName, RunQueryDsl,
        connection::SimpleConnection,
        r2d2::{ConnectionManager, Pool, PooledConnection},
        sql_query,
        sql_types::{BigInt, Bool, Integer, Nullable, Text},
    },
    schema::ALL_TABLES,
};
use solforge_types::{AccountSnapshot, BlockRecord, TransactionRecord};

use super::{SignatureEntry, StorageError, StorageResult};

type SqlitePool = Pool<ConnectionManager<diesel::SqliteConnection>>;

const NAME: &str = "SQLite";

/// Applies pragmas when each pool connection is created.
#[derive(Debug)]
struct SqlitePragmaCustomizer {
    is_file_based: bool,
}

impl diesel::r2d2::CustomizeConnection<diesel::SqliteConnection, diesel::r2d2::Error>
    for SqlitePragmaCustomizer
{
    fn on_acquire(&self, conn: &mut diesel::SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let pragmas = if self.is_file_based {
            "PRAGMA synchronous=NORMAL; PRAGMA temp_store=MEMORY; PRAGMA mmap_size=268435456; PRAGMA cache_size=-64000; PRAGMA busy_timeout=5000;"
        } else {
            "PRAGMA synchronous=OFF; PRAGMA temp_store=MEMORY; PRAGMA cache_size=-64000; PRAGMA busy_timeout=5000;"
        };
        conn.batch_execute(pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Counter for unique in-memory database names.
static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(QueryableByName, Debug)]
struct RecordRow {
    #[diesel(sql_type = Text)]
    record: String,
}

#[derive(QueryableByName, Debug)]
struct SeqRow {
    #[diesel(sql_type = BigInt)]
    seq: i64,
}

#[derive(QueryableByName, Debug)]
struct StatusRow {
    #[diesel(sql_type = BigInt)]
    slot: i64,
    #[diesel(sql_type = Nullable<Text>)]
    err: Option<String>,
}

#[derive(QueryableByName, Debug)]
struct HistoryRow {
    #[diesel(sql_type = Text)]
    signature: String,
    #[diesel(sql_type = BigInt)]
    slot: i64,
    #[diesel(sql_type = Nullable<Text>)]
    err: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    block_time: Option<i64>,
}

#[derive(QueryableByName, Debug)]
struct AccountRow {
    #[diesel(sql_type = Text)]
    address: String,
    #[diesel(sql_type = BigInt)]
    lamports: i64,
    #[diesel(sql_type = Text)]
    owner: String,
    #[diesel(sql_type = Bool)]
    executable: bool,
    #[diesel(sql_type = Text)]
    rent_epoch: String,
    #[diesel(sql_type = BigInt)]
    space: i64,
    #[diesel(sql_type = Nullable<Text>)]
    data: Option<String>,
}

impl From<AccountRow> for AccountSnapshot {
    fn from(row: AccountRow) -> Self {
        AccountSnapshot {
            address: row.address,
            lamports: row.lamports as u64,
            owner: row.owner,
            executable: row.executable,
            rent_epoch: row.rent_epoch.parse().unwrap_or(u64::MAX),
            space: row.space as u64,
            data: row.data,
        }
    }
}

#[derive(QueryableByName, Debug)]
struct BlockRow {
    #[diesel(sql_type = BigInt)]
    slot: i64,
    #[diesel(sql_type = BigInt)]
    block_height: i64,
    #[diesel(sql_type = BigInt)]
    block_time: i64,
    #[diesel(sql_type = Text)]
    blockhash: String,
    #[diesel(sql_type = Text)]
    previous_blockhash: String,
    #[diesel(sql_type = BigInt)]
    parent_slot: i64,
}

impl From<BlockRow> for BlockRecord {
    fn from(row: BlockRow) -> Self {
        BlockRecord {
            slot: row.slot as u64,
            block_height: row.block_height as u64,
            block_time: row.block_time,
            blockhash: row.blockhash,
            previous_blockhash: row.previous_blockhash,
            parent_slot: row.parent_slot as u64,
        }
    }
}

#[derive(QueryableByName, Debug)]
struct SlotRow {
    #[diesel(sql_type = Nullable<BigInt>)]
    slot: Option<i64>,
}

#[derive(QueryableByName, Debug)]
struct BlockTimeRow {
    #[diesel(sql_type = Nullable<BigInt>)]
    block_time: Option<i64>,
}

#[derive(QueryableByName, Debug)]
struct CountRecord {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Durable index of transactions, account snapshots and blocks.
#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
    is_file_based: bool,
    connection_string: String,
}

impl IndexStore {
    /// Opens the index. `:memory:` yields a database private to this store.
    pub fn connect(database_url: &str) -> StorageResult<Self> {
        debug!("Connecting to SQLite index: {}", database_url);

        let connection_string = if database_url == ":memory:" {
            // Unique name per store; cache=shared so pool connections share it
            let id = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("file:memdb{}?mode=memory&cache=shared", id)
        } else if database_url.starts_with("file:") {
            if database_url.contains('?') {
                format!("{}&mode=rwc", database_url)
            } else {
                format!("{}?mode=rwc", database_url)
            }
        } else {
            format!("file:{}?mode=rwc", database_url)
        };
        let is_file_based = database_url != ":memory:";

        let manager = ConnectionManager::<diesel::SqliteConnection>::new(&connection_string);
        let pool = Pool::builder()
            .max_size(10)
            .connection_customizer(Box::new(SqlitePragmaCustomizer { is_file_based }))
            .build(manager)
            .map_err(|e| StorageError::PooledConnectionError(NAME.into(), e))?;

        let store = IndexStore {
            pool,
            is_file_based,
            connection_string,
        };
        store.ensure_tables_exist()?;
        Ok(store)
    }

    pub fn is_persistent(&self) -> bool {
        self.is_file_based
    }

    fn connection(
        &self,
    ) -> StorageResult<PooledConnection<ConnectionManager<diesel::SqliteConnection>>> {
        self.pool
            .get()
            .map_err(|e| StorageError::PooledConnectionError(NAME.into(), e))
    }

    fn ensure_tables_exist(&self) -> StorageResult<()> {
        let mut conn = self.connection()?;
        if self.is_file_based {
            // journal_mode=WAL persists to file; wal_autocheckpoint is per-connection
            conn.batch_execute("PRAGMA journal_mode=WAL; PRAGMA wal_autocheckpoint=1000;")
                .map_err(|e| StorageError::create_table("pragma_init", NAME, e))?;
        }
        for (table, ddl) in ALL_TABLES {
            debug!("Ensuring table '{}' exists", table);
            conn.batch_execute(ddl)
                .map_err(|e| StorageError::create_table(table, NAME, e))?;
        }
        Ok(())
    }

    /// Writes the transaction row, its account roles and the post-execution
    /// account snapshots in one atomic unit. Re-inserting a known signature is
    /// a no-op for the transaction row.
    pub fn insert_transaction(&self, record: &TransactionRecord) -> StorageResult<()> {
        let record_json = serde_json::to_string(record)
            .map_err(|e| StorageError::SerializeValueError(NAME.into(), e))?;
        let err_json = record
            .err
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::SerializeValueError(NAME.into(), e))?;

        let mut pooled = self.connection()?;
        let conn: &mut diesel::SqliteConnection = &mut pooled;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            sql_query(
                "INSERT OR IGNORE INTO transactions (signature, slot, block_time, fee, err, raw, record) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind::<Text, _>(&record.signature)
            .bind::<BigInt, _>(record.slot as i64)
            .bind::<Nullable<BigInt>, _>(record.block_time)
            .bind::<BigInt, _>(record.fee as i64)
            .bind::<Nullable<Text>, _>(err_json.clone())
            .bind::<Text, _>(&record.raw_transaction)
            .bind::<Text, _>(&record_json)
            .execute(conn)?;

            let seq = sql_query("SELECT seq FROM transactions WHERE signature = ?")
                .bind::<Text, _>(&record.signature)
                .get_result::<SeqRow>(conn)?
                .seq;

            for (index, role) in record.account_keys.iter().enumerate() {
                sql_query(
                    "INSERT OR IGNORE INTO transaction_accounts (signature, account, account_index, is_signer, is_writable, seq) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind::<Text, _>(&record.signature)
                .bind::<Text, _>(&role.pubkey)
                .bind::<Integer, _>(index as i32)
                .bind::<Bool, _>(role.signer)
                .bind::<Bool, _>(role.writable)
                .bind::<BigInt, _>(seq)
                .execute(conn)?;
            }

            for snapshot in &record.post_account_states {
                upsert_account(conn, snapshot, record.slot)?;
            }
            Ok(())
        })
        .map_err(|e| StorageError::store("transactions", NAME, &record.signature, e))?;

        debug!("Indexed transaction {}", record.signature);
        Ok(())
    }

    pub fn upsert_accounts(&self, snapshots: &[AccountSnapshot], slot: Slot) -> StorageResult<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let mut pooled = self.connection()?;
        let conn: &mut diesel::SqliteConnection = &mut pooled;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            for snapshot in snapshots {
                upsert_account(conn, snapshot, slot)?;
            }
            Ok(())
        })
        .map_err(|e| StorageError::store("accounts", NAME, "*batch*", e))
    }

    pub fn get_account(&self, address: &str) -> StorageResult<Option<AccountSnapshot>> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "SELECT address, lamports, owner, executable, rent_epoch, space, data FROM accounts WHERE address = ?",
        )
        .bind::<Text, _>(address)
        .load::<AccountRow>(&mut *conn)
        .map_err(|e| StorageError::get("accounts", NAME, address, e))?;
        Ok(rows.into_iter().next().map(AccountSnapshot::from))
    }

    pub fn get_accounts_by_owner(
        &self,
        owner: &str,
        limit: usize,
    ) -> StorageResult<Vec<AccountSnapshot>> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "SELECT address, lamports, owner, executable, rent_epoch, space, data FROM accounts WHERE owner = ? ORDER BY address LIMIT ?",
        )
        .bind::<Text, _>(owner)
        .bind::<BigInt, _>(limit as i64)
        .load::<AccountRow>(&mut *conn)
        .map_err(|e| StorageError::get("accounts", NAME, owner, e))?;
        Ok(rows.into_iter().map(AccountSnapshot::from).collect())
    }

    fn resolve_cursor(
        conn: &mut diesel::SqliteConnection,
        signature: &str,
    ) -> StorageResult<Option<i64>> {
        let rows = sql_query("SELECT seq FROM transactions WHERE signature = ?")
            .bind::<Text, _>(signature)
            .load::<SeqRow>(conn)
            .map_err(|e| StorageError::get("transactions", NAME, signature, e))?;
        Ok(rows.first().map(|r| r.seq))
    }

    /// Newest first. `before` and `until` are exclusive signature cursors; an
    /// unknown cursor yields an empty page.
    pub fn get_signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        until: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<SignatureEntry>> {
        let mut conn = self.connection()?;
        let before_seq = match before {
            Some(signature) => match Self::resolve_cursor(&mut conn, signature)? {
                Some(seq) => seq,
                None => return Ok(vec![]),
            },
            None => i64::MAX,
        };
        let until_seq = match until {
            Some(signature) => match Self::resolve_cursor(&mut conn, signature)? {
                Some(seq) => seq,
                None => return Ok(vec![]),
            },
            None => 0,
        };

        let rows = sql_query(
            "SELECT t.signature, t.slot, t.err, t.block_time FROM transaction_accounts a JOIN transactions t ON t.signature = a.signature WHERE a.account = ? AND a.seq < ? AND a.seq > ? ORDER BY a.seq DESC LIMIT ?",
        )
        .bind::<Text, _>(address)
        .bind::<BigInt, _>(before_seq)
        .bind::<BigInt, _>(until_seq)
        .bind::<BigInt, _>(limit as i64)
        .load::<HistoryRow>(&mut *conn)
        .map_err(|e| StorageError::get("transaction_accounts", NAME, address, e))?;

        rows.into_iter()
            .map(|row| {
                Ok(SignatureEntry {
                    signature: row.signature,
                    slot: row.slot as u64,
                    err: decode_err(row.err.as_deref())?,
                    block_time: row.block_time,
                })
            })
            .collect()
    }

    /// Slot and outcome for every known signature. Unknown signatures are
    /// absent from the map.
    pub fn get_signature_statuses(
        &self,
        signatures: &[String],
    ) -> StorageResult<HashMap<String, (Slot, Option<TransactionError>)>> {
        let mut conn = self.connection()?;
        let mut statuses = HashMap::new();
        for signature in signatures {
            let rows = sql_query("SELECT slot, err FROM transactions WHERE signature = ?")
                .bind::<Text, _>(signature)
                .load::<StatusRow>(&mut *conn)
                .map_err(|e| StorageError::get("transactions", NAME, signature, e))?;
            if let Some(row) = rows.into_iter().next() {
                statuses.insert(
                    signature.clone(),
                    (row.slot as u64, decode_err(row.err.as_deref())?),
                );
            }
        }
        Ok(statuses)
    }

    pub fn get_transaction(&self, signature: &str) -> StorageResult<Option<TransactionRecord>> {
        let mut conn = self.connection()?;
        let rows = sql_query("SELECT record FROM transactions WHERE signature = ?")
            .bind::<Text, _>(signature)
            .load::<RecordRow>(&mut *conn)
            .map_err(|e| StorageError::get("transactions", NAME, signature, e))?;
        rows.into_iter()
            .next()
            .map(|row| decode_record(&row.record))
            .transpose()
    }

    /// Transactions landed in `slot`, in insertion order.
    pub fn get_transactions_in_slot(&self, slot: Slot) -> StorageResult<Vec<TransactionRecord>> {
        let mut conn = self.connection()?;
        let rows = sql_query("SELECT record FROM transactions WHERE slot = ? ORDER BY seq ASC")
            .bind::<BigInt, _>(slot as i64)
            .load::<RecordRow>(&mut *conn)
            .map_err(|e| StorageError::get("transactions", NAME, &slot.to_string(), e))?;
        rows.iter().map(|row| decode_record(&row.record)).collect()
    }

    /// Block time recorded for `slot`, falling back to any transaction that
    /// landed in it.
    pub fn get_block_time(&self, slot: Slot) -> StorageResult<Option<i64>> {
        if let Some(block) = self.get_block(slot)? {
            return Ok(Some(block.block_time));
        }
        let mut conn = self.connection()?;
        let rows = sql_query(
            "SELECT block_time FROM transactions WHERE slot = ? AND block_time IS NOT NULL LIMIT 1",
        )
        .bind::<BigInt, _>(slot as i64)
        .load::<BlockTimeRow>(&mut *conn)
        .map_err(|e| StorageError::get("transactions", NAME, &slot.to_string(), e))?;
        Ok(rows.into_iter().next().and_then(|r| r.block_time))
    }

    pub fn record_block(&self, block: &BlockRecord) -> StorageResult<()> {
        let mut conn = self.connection()?;
        sql_query(
            "INSERT OR REPLACE INTO blocks (slot, block_height, block_time, blockhash, previous_blockhash, parent_slot) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind::<BigInt, _>(block.slot as i64)
        .bind::<BigInt, _>(block.block_height as i64)
        .bind::<BigInt, _>(block.block_time)
        .bind::<Text, _>(&block.blockhash)
        .bind::<Text, _>(&block.previous_blockhash)
        .bind::<BigInt, _>(block.parent_slot as i64)
        .execute(&mut *conn)
        .map_err(|e| StorageError::store("blocks", NAME, &block.slot.to_string(), e))?;
        Ok(())
    }

    pub fn get_block(&self, slot: Slot) -> StorageResult<Option<BlockRecord>> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "SELECT slot, block_height, block_time, blockhash, previous_blockhash, parent_slot FROM blocks WHERE slot = ?",
        )
        .bind::<BigInt, _>(slot as i64)
        .load::<BlockRow>(&mut *conn)
        .map_err(|e| StorageError::get("blocks", NAME, &slot.to_string(), e))?;
        Ok(rows.into_iter().next().map(BlockRecord::from))
    }

    /// Recorded block slots in `[start, end]`, ascending.
    pub fn get_block_slots(
        &self,
        start: Slot,
        end: Option<Slot>,
        limit: usize,
    ) -> StorageResult<Vec<Slot>> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "SELECT slot FROM blocks WHERE slot >= ? AND slot <= ? ORDER BY slot ASC LIMIT ?",
        )
        .bind::<BigInt, _>(start as i64)
        .bind::<BigInt, _>(end.map(|e| e.min(i64::MAX as u64) as i64).unwrap_or(i64::MAX))
        .bind::<BigInt, _>(limit as i64)
        .load::<SlotRow>(&mut *conn)
        .map_err(|e| StorageError::get("blocks", NAME, &start.to_string(), e))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.slot.map(|s| s as u64))
            .collect())
    }

    /// Highest slot seen in either the blocks or the transactions table.
    pub fn get_max_slot(&self) -> StorageResult<Option<Slot>> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "SELECT MAX(slot) AS slot FROM (SELECT MAX(slot) AS slot FROM blocks UNION ALL SELECT MAX(slot) AS slot FROM transactions)",
        )
        .load::<SlotRow>(&mut *conn)
        .map_err(|e| StorageError::get("blocks", NAME, "max(slot)", e))?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.slot)
            .map(|s| s as u64))
    }

    pub fn count_transactions(&self) -> StorageResult<u64> {
        let mut conn = self.connection()?;
        let records = sql_query("SELECT COUNT(*) as count FROM transactions")
            .load::<CountRecord>(&mut *conn)
            .map_err(|e| StorageError::count("transactions", NAME, e))?;
        Ok(records.first().map(|r| r.count as u64).unwrap_or(0))
    }

    /// Flushes the WAL into the main database file.
    pub fn shutdown(&self) {
        if !self.is_file_based {
            return;
        }
        debug!("Checkpointing WAL for '{}'", self.connection_string);
        match self.pool.get() {
            Ok(mut conn) => {
                if let Err(e) = conn.batch_execute("PRAGMA wal_checkpoint(TRUNCATE);") {
                    debug!("WAL checkpoint failed: {}", e);
                }
            }
            Err(e) => debug!("WAL checkpoint skipped: {}", e),
        }
    }
}

fn upsert_account(
    conn: &mut diesel::SqliteConnection,
    snapshot: &AccountSnapshot,
    slot: Slot,
) -> Result<usize, diesel::result::Error> {
    sql_query(
        "INSERT INTO accounts (address, lamports, owner, executable, rent_epoch, space, data, updated_slot) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(address) DO UPDATE SET lamports = excluded.lamports, owner = excluded.owner, executable = excluded.executable, rent_epoch = excluded.rent_epoch, space = excluded.space, data = excluded.data, updated_slot = excluded.updated_slot",
    )
    .bind::<Text, _>(&snapshot.address)
    .bind::<BigInt, _>(snapshot.lamports as i64)
    .bind::<Text, _>(&snapshot.owner)
    .bind::<Bool, _>(snapshot.executable)
    .bind::<Text, _>(snapshot.rent_epoch.to_string())
    .bind::<BigInt, _>(snapshot.space as i64)
    .bind::<Nullable<Text>, _>(snapshot.data.clone())
    .bind::<BigInt, _>(slot as i64)
    .execute(conn)
}

fn decode_err(err: Option<&str>) -> StorageResult<Option<TransactionError>> {
    err.map(serde_json::from_str)
        .transpose()
        .map_err(|e| StorageError::DeserializeValueError(NAME.into(), e))
}

fn decode_record(record: &str) -> StorageResult<TransactionRecord> {
    serde_json::from_str(record).map_err(|e| StorageError::DeserializeValueError(NAME.into(), e))
}
