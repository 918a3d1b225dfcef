//! DDL for the solforge index. Statements are idempotent and applied on every
//! store connect.

pub const CREATE_TRANSACTIONS: &str = "
    CREATE TABLE IF NOT EXISTS transactions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        signature TEXT NOT NULL UNIQUE,
        slot BIGINT NOT NULL,
        block_time BIGINT,
        fee BIGINT NOT NULL,
        err TEXT,
        raw TEXT NOT NULL,
        record TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_slot ON transactions (slot);
";

pub const CREATE_TRANSACTION_ACCOUNTS: &str = "
    CREATE TABLE IF NOT EXISTS transaction_accounts (
        signature TEXT NOT NULL,
        account TEXT NOT NULL,
        account_index INTEGER NOT NULL,
        is_signer BOOLEAN NOT NULL,
        is_writable BOOLEAN NOT NULL,
        seq BIGINT NOT NULL,
        PRIMARY KEY (signature, account_index)
    );
    CREATE INDEX IF NOT EXISTS idx_transaction_accounts_account
        ON transaction_accounts (account, seq DESC);
";

pub const CREATE_ACCOUNTS: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        address TEXT PRIMARY KEY NOT NULL,
        lamports BIGINT NOT NULL,
        owner TEXT NOT NULL,
        executable BOOLEAN NOT NULL,
        rent_epoch TEXT NOT NULL,
        space BIGINT NOT NULL,
        data TEXT,
        updated_slot BIGINT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts (owner);
";

pub const CREATE_BLOCKS: &str = "
    CREATE TABLE IF NOT EXISTS blocks (
        slot BIGINT PRIMARY KEY NOT NULL,
        block_height BIGINT NOT NULL,
        block_time BIGINT NOT NULL,
        blockhash TEXT NOT NULL,
        previous_blockhash TEXT NOT NULL,
        parent_slot BIGINT NOT NULL
    );
";

/// Every table in creation order.
pub const ALL_TABLES: &[(&str, &str)] = &[
    ("transactions", CREATE_TRANSACTIONS),
    ("transaction_accounts", CREATE_TRANSACTION_ACCOUNTS),
    ("accounts", CREATE_ACCOUNTS),
    ("blocks", CREATE_BLOCKS),
];
