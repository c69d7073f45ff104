//! Balance ledger, locked balance mutations and the audit transaction log

pub mod ledger;
pub mod service;
pub mod transaction;

pub use ledger::{BalanceLedger, PgBalanceLedger};
pub use service::{BalanceError, BalanceService};
pub use transaction::{
    NewTransaction, PgTransactionLog, Transaction, TransactionKind, TransactionLog,
    generate_trx_id,
};

#[cfg(test)]
pub use ledger::mock::MemoryLedger;
#[cfg(test)]
pub use transaction::mock::MemoryTransactionLog;
