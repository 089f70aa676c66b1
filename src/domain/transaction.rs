//! Transaction domain entity.
//! Framework-agnostic representation of one transfer attempt or detected
//! on-chain event.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a transaction record.
///
/// Transitions are monotonic: `Pending` may move to `Confirmed` or `Failed`;
/// both of those are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        matches!(self, TxStatus::Pending) && next.is_terminal()
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TxStatus::Pending),
            "confirmed" => Ok(TxStatus::Confirmed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Domain entity representing a transaction record.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub tx_hash: Option<String>,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub from_address: String,
    pub to_address: String,
    pub amount: BigDecimal,
    pub memo: Option<String>,
    pub payment_link_id: Option<Uuid>,
    pub status: TxStatus,
    pub block_number: Option<i64>,
    pub gas_used: Option<i64>,
    pub gas_price: Option<i64>,
    pub network: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted from the payment submission flow.
#[derive(Debug)]
pub struct NewPayment {
    pub from_address: String,
    pub to_address: String,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub network: String,
    pub tx_hash: Option<String>,
    pub memo: Option<String>,
    pub payment_link_id: Option<Uuid>,
}

impl TransactionRecord {
    /// A pending record created by the payment submission flow before (or
    /// right after) broadcast. The monitoring core owns status updates from
    /// this point on.
    pub fn new_payment(payment: NewPayment) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tx_hash: payment.tx_hash,
            from_user_id: payment.from_user_id,
            to_user_id: payment.to_user_id,
            from_address: payment.from_address.to_lowercase(),
            to_address: payment.to_address.to_lowercase(),
            amount: payment.amount,
            memo: payment.memo,
            payment_link_id: payment.payment_link_id,
            status: TxStatus::Pending,
            block_number: None,
            gas_used: None,
            gas_price: None,
            network: payment.network,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record for an externally observed deposit to a known user's address.
    /// External deposits are only seen once they have landed on-chain, so
    /// the record is born confirmed.
    pub fn external_deposit(
        tx_hash: String,
        from_address: String,
        to_address: String,
        to_user_id: Uuid,
        amount: BigDecimal,
        block_number: i64,
        network: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tx_hash: Some(tx_hash),
            from_user_id: None,
            to_user_id: Some(to_user_id),
            from_address: from_address.to_lowercase(),
            to_address: to_address.to_lowercase(),
            amount,
            memo: None,
            payment_link_id: None,
            status: TxStatus::Confirmed,
            block_number: Some(block_number),
            gas_used: None,
            gas_price: None,
            network,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions_to_terminal_states() {
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Confirmed));
        assert!(TxStatus::Pending.can_transition_to(TxStatus::Failed));
    }

    #[test]
    fn terminal_states_never_transition() {
        for terminal in [TxStatus::Confirmed, TxStatus::Failed] {
            assert!(!terminal.can_transition_to(TxStatus::Pending));
            assert!(!terminal.can_transition_to(TxStatus::Confirmed));
            assert!(!terminal.can_transition_to(TxStatus::Failed));
        }
    }

    #[test]
    fn pending_is_not_a_transition_target() {
        assert!(!TxStatus::Pending.can_transition_to(TxStatus::Pending));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [TxStatus::Pending, TxStatus::Confirmed, TxStatus::Failed] {
            assert_eq!(TxStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(TxStatus::from_str("reverted").is_err());
    }

    #[test]
    fn new_payment_starts_pending_with_lowercased_addresses() {
        let record = TransactionRecord::new_payment(NewPayment {
            from_address: "0xAbCd000000000000000000000000000000000001".to_string(),
            to_address: "0xABCD000000000000000000000000000000000002".to_string(),
            from_user_id: None,
            to_user_id: None,
            amount: BigDecimal::from(10),
            network: "base".to_string(),
            tx_hash: None,
            memo: None,
            payment_link_id: None,
        });

        assert_eq!(record.status, TxStatus::Pending);
        assert_eq!(
            record.from_address,
            "0xabcd000000000000000000000000000000000001"
        );
        assert!(record.block_number.is_none());
    }

    #[test]
    fn external_deposit_is_born_confirmed() {
        let record = TransactionRecord::external_deposit(
            "0xabc".to_string(),
            "0xAbCd000000000000000000000000000000000001".to_string(),
            "0xabcd000000000000000000000000000000000002".to_string(),
            Uuid::new_v4(),
            BigDecimal::from(5),
            100,
            "base".to_string(),
        );

        assert_eq!(record.status, TxStatus::Confirmed);
        assert_eq!(record.block_number, Some(100));
        assert!(record.from_user_id.is_none());
        assert_eq!(
            record.from_address,
            "0xabcd000000000000000000000000000000000001"
        );
    }
}
