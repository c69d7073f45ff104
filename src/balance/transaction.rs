//! Immutable audit records of balance movements

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::fmt;

use crate::core_types::{OrderId, UserId};
use crate::db::StoreError;

const TRX_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const TRX_ID_LEN: usize = 10;

/// Random 10-character `[0-9A-Z]` reference
pub fn generate_trx_id() -> String {
    let mut rng = rand::thread_rng();
    (0..TRX_ID_LEN)
        .map(|_| TRX_ID_ALPHABET[rng.gen_range(0..TRX_ID_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i16)]
pub enum TransactionKind {
    PlayOrder = 0,
    AddBalance = 1,
    Refund = 2,
}

impl TransactionKind {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransactionKind::PlayOrder),
            1 => Some(TransactionKind::AddBalance),
            2 => Some(TransactionKind::Refund),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::PlayOrder => "PLAY_ORDER",
            TransactionKind::AddBalance => "ADD_BALANCE",
            TransactionKind::Refund => "REFUND",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub transaction_id: i64,
    pub user_id: UserId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub trx_id: String,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Append one record with a fresh `trx_id`
    async fn record(&self, tx: NewTransaction) -> Result<Transaction, StoreError>;
}

pub struct PgTransactionLog {
    pool: PgPool,
}

impl PgTransactionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionLog for PgTransactionLog {
    async fn record(&self, tx: NewTransaction) -> Result<Transaction, StoreError> {
        let trx_id = generate_trx_id();
        let row = sqlx::query(
            r#"INSERT INTO transactions_tb (user_id, amount, kind, trx_id, order_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING transaction_id, created_at"#,
        )
        .bind(tx.user_id)
        .bind(tx.amount)
        .bind(tx.kind.id())
        .bind(&trx_id)
        .bind(tx.order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Transaction {
            transaction_id: row.try_get("transaction_id")?,
            user_id: tx.user_id,
            amount: tx.amount,
            kind: tx.kind,
            trx_id,
            order_id: tx.order_id,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub struct MemoryTransactionLog {
        records: Mutex<Vec<Transaction>>,
        fail: AtomicBool,
    }

    impl MemoryTransactionLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn records(&self) -> Vec<Transaction> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransactionLog for MemoryTransactionLog {
        async fn record(&self, tx: NewTransaction) -> Result<Transaction, StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Database("mock transaction log failure".into()));
            }
            let mut records = self.records.lock().unwrap();
            let record = Transaction {
                transaction_id: records.len() as i64 + 1,
                user_id: tx.user_id,
                amount: tx.amount,
                kind: tx.kind,
                trx_id: generate_trx_id(),
                order_id: tx.order_id,
                created_at: Utc::now(),
            };
            records.push(record.clone());
            Ok(record)
        }
    }
}
