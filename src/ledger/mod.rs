pub mod api;
pub mod migrate;
pub mod models;
pub mod service;

pub use migrate::{migrate_legacy_transaction, LegacyTransaction, MigratedTransaction};
pub use models::{
    BatchOutcome, LedgerTransaction, PaymentMethod, TransactionAction, TransactionDetails,
    TransactionEntity, TransactionFilter, TransactionPage, TransactionStats, TransactionStatus,
};
pub use service::LedgerService;
