pub mod abi;
pub mod client;

pub use client::{ChainClient, ChainError, GasEstimate, TransferEvent, TxReceipt};
