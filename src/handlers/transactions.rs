use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{NewPayment, TransactionRecord};
use crate::error::AppError;
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitPaymentPayload {
    pub from_address: String,
    pub to_address: String,
    pub amount: BigDecimal,
    pub network: String,
    pub tx_hash: Option<String>,
    pub memo: Option<String>,
    pub payment_link_id: Option<Uuid>,
}

/// Payment submission: creates the pending record the monitoring core takes
/// ownership of. The hash may already be known (submitted after broadcast)
/// or attached later.
pub async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<SubmitPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let networks: Vec<&str> = state.chains.keys().map(String::as_str).collect();

    validation::validate_address("from_address", &payload.from_address)?;
    validation::validate_address("to_address", &payload.to_address)?;
    validation::validate_amount(&payload.amount)?;
    validation::validate_network(&payload.network, &networks)?;
    if let Some(tx_hash) = &payload.tx_hash {
        validation::validate_tx_hash(tx_hash)?;
    }
    if let Some(memo) = &payload.memo {
        validation::validate_max_len("memo", memo, validation::MEMO_MAX_LEN)?;
    }

    let from_user_id = state
        .users
        .lookup_by_address(&payload.from_address.to_lowercase())
        .await?;
    let to_user_id = state
        .users
        .lookup_by_address(&payload.to_address.to_lowercase())
        .await?;

    let record = TransactionRecord::new_payment(NewPayment {
        from_address: payload.from_address,
        to_address: payload.to_address,
        from_user_id,
        to_user_id,
        amount: payload.amount,
        network: payload.network,
        tx_hash: payload.tx_hash.map(|h| h.to_lowercase()),
        memo: payload.memo,
        payment_link_id: payload.payment_link_id,
    });

    let inserted = state.store.insert(&record).await?;

    Ok((StatusCode::CREATED, Json(inserted)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionRecord>, AppError> {
    let record = state.store.get(id).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Uuid,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const HISTORY_MAX_LIMIT: i64 = 100;

/// Transactions sent or received by a user, newest first.
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionRecord>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, HISTORY_MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let records = state.store.list_for_user(query.user_id, limit, offset).await?;
    Ok(Json(records))
}
