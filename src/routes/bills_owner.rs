use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    auth::require_owner,
    error::{AppError, AppResult},
    schemas::{BillPath, UtilityBillPath},
    services::{audit::write_audit_log, ledger},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/bills/owner", axum::routing::get(list_owner_bills))
        .route(
            "/bills/owner/{bill_id}/verify",
            axum::routing::post(verify_bill),
        )
        .route(
            "/bills/owner/{bill_id}/send-back",
            axum::routing::post(send_back_bill),
        )
        .route(
            "/bills/owner/{bill_id}/remind",
            axum::routing::post(remind_bill),
        )
        .route(
            "/bills/owner/utilities",
            axum::routing::get(list_owner_utilities),
        )
        .route(
            "/bills/owner/utilities/{utility_id}/verify",
            axum::routing::post(verify_utility_bill),
        )
        .route(
            "/bills/owner/utilities/{utility_id}/reject",
            axum::routing::post(reject_utility_bill),
        )
}

/// Rent bills across this owner's properties, most recent due date first.
async fn list_owner_bills(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    let bills = ledger::list_bills_for_owner(&state.db_pool, owner.id).await?;
    Ok(Json(json!({ "data": bills })))
}

async fn verify_bill(
    State(state): State<AppState>,
    Path(path): Path<BillPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    let bill = ledger::verify_bill(&state.db_pool, owner.id, path.bill_id).await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "verify",
        "rent_ledger",
        Some(bill.id),
        None,
        Some(json!({ "status": bill.status })),
    )
    .await;

    Ok(Json(json!({ "success": true, "bill": bill })))
}

async fn send_back_bill(
    State(state): State<AppState>,
    Path(path): Path<BillPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    let bill = ledger::send_back_bill(&state.db_pool, owner.id, path.bill_id).await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "send_back",
        "rent_ledger",
        Some(bill.id),
        None,
        Some(json!({ "status": bill.status })),
    )
    .await;

    Ok(Json(json!({ "success": true, "bill": bill })))
}

async fn remind_bill(
    State(state): State<AppState>,
    Path(path): Path<BillPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    let bill = ledger::remind_bill(&state.db_pool, owner.id, path.bill_id).await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "remind",
        "rent_ledger",
        Some(bill.id),
        None,
        None,
    )
    .await;

    Ok(Json(json!({ "success": true, "bill": bill })))
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct UtilityBillRow {
    id: i64,
    tenant_id: i64,
    amount: f64,
    bill_type: String,
    status: String,
    verification: String,
    receipt_path: Option<String>,
    bill_year: i32,
    bill_month: i32,
    created_at: DateTime<Utc>,
    tenant_name: Option<String>,
}

/// Utility submissions from tenants currently assigned to this owner's rooms.
async fn list_owner_utilities(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;

    let rows = sqlx::query_as::<_, UtilityBillRow>(
        "SELECT ub.id, ub.tenant_id, ub.amount::float8 AS amount, ub.bill_type, \
                ub.status, ub.verification, ub.receipt_path, ub.bill_year, ub.bill_month, \
                ub.created_at, \
                u.first_name || ' ' || u.last_name AS tenant_name \
         FROM utility_bills ub \
         LEFT JOIN users u ON u.id = ub.tenant_id \
         WHERE EXISTS ( \
             SELECT 1 FROM room_tenants rt \
             JOIN rooms r ON r.id = rt.room_id \
             JOIN properties p ON p.id = r.property_id \
             WHERE rt.tenant_id = ub.tenant_id AND p.owner_id = $1 \
         ) \
         ORDER BY ub.created_at DESC \
         LIMIT 500",
    )
    .bind(owner.id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(json!({ "data": rows })))
}

const UTILITY_OWNERSHIP_GUARD: &str = "EXISTS ( \
     SELECT 1 FROM room_tenants rt \
     JOIN rooms r ON r.id = rt.room_id \
     JOIN properties p ON p.id = r.property_id \
     WHERE rt.tenant_id = utility_bills.tenant_id AND p.owner_id = $2)";

async fn update_utility_verification(
    state: &AppState,
    owner_id: i64,
    utility_id: i64,
    verification: &str,
    status: &str,
) -> AppResult<UtilityBillRow> {
    let sql = format!(
        "UPDATE utility_bills \
         SET verification = $3, status = $4 \
         WHERE id = $1 AND verification = 'pending' AND {UTILITY_OWNERSHIP_GUARD} \
         RETURNING id, tenant_id, amount::float8 AS amount, bill_type, status, \
                   verification, receipt_path, bill_year, bill_month, created_at, \
                   NULL::text AS tenant_name"
    );

    sqlx::query_as::<_, UtilityBillRow>(&sql)
        .bind(utility_id)
        .bind(owner_id)
        .bind(verification)
        .bind(status)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Bill not found or not authorized.".to_string()))
}

async fn verify_utility_bill(
    State(state): State<AppState>,
    Path(path): Path<UtilityBillPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    let bill =
        update_utility_verification(&state, owner.id, path.utility_id, "verified", "paid").await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "verify",
        "utility_bills",
        Some(bill.id),
        None,
        Some(json!({ "verification": bill.verification })),
    )
    .await;

    Ok(Json(json!({ "success": true, "bill": bill })))
}

async fn reject_utility_bill(
    State(state): State<AppState>,
    Path(path): Path<UtilityBillPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    let bill =
        update_utility_verification(&state, owner.id, path.utility_id, "rejected", "unpaid")
            .await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "reject",
        "utility_bills",
        Some(bill.id),
        None,
        Some(json!({ "verification": bill.verification })),
    )
    .await;

    Ok(Json(json!({ "success": true, "bill": bill })))
}
