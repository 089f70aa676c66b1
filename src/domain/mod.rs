pub mod transaction;

pub use transaction::{NewPayment, TransactionRecord, TxStatus};
