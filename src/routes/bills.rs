use axum::{
    extract::{Multipart, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Datelike;
use serde_json::{json, Map, Value};

use crate::{
    auth::require_tenant,
    error::{AppError, AppResult},
    repository::table_service::{create_row, list_rows},
    schemas::{clamp_limit_in_range, UtilityHistoryQuery},
    services::{audit::write_audit_log, ledger, uploads},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/bills/rent", axum::routing::get(list_rent_bills))
        .route(
            "/bills/rent/unpaid",
            axum::routing::get(list_unpaid_rent_bills),
        )
        .route(
            "/bills/rent/payment",
            axum::routing::post(submit_rent_payment),
        )
        .route(
            "/bills/utilities",
            axum::routing::get(list_utility_bills).post(submit_utility_bill),
        )
}

async fn list_rent_bills(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let tenant = require_tenant(&state, &headers)?;
    let bills = ledger::list_bills_for_tenant(&state.db_pool, tenant.id).await?;
    Ok(Json(json!({ "data": bills })))
}

async fn list_unpaid_rent_bills(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let tenant = require_tenant(&state, &headers)?;
    let bills = ledger::list_unpaid_bills_for_tenant(&state.db_pool, tenant.id).await?;
    Ok(Json(json!({ "data": bills })))
}

struct PaymentSubmission {
    bill_year: Option<i32>,
    bill_month: Option<i32>,
    amount: Option<f64>,
    receipt: Option<(String, Vec<u8>)>,
}

async fn read_payment_multipart(multipart: &mut Multipart) -> AppResult<PaymentSubmission> {
    let mut submission = PaymentSubmission {
        bill_year: None,
        bill_month: None,
        amount: None,
        receipt: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(format!("Invalid multipart payload: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "bill_year" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid field: {error}")))?;
                submission.bill_year = raw.trim().parse::<i32>().ok();
            }
            "bill_month" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid field: {error}")))?;
                submission.bill_month = raw.trim().parse::<i32>().ok();
            }
            "amount" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid field: {error}")))?;
                let trimmed = raw.trim().to_string();
                if !trimmed.is_empty() {
                    submission.amount = Some(
                        trimmed
                            .parse::<f64>()
                            .map_err(|_| AppError::BadRequest("Invalid amount.".to_string()))?,
                    );
                }
            }
            "receipt" => {
                let original_name = field.file_name().unwrap_or("receipt").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid upload: {error}")))?;
                if !bytes.is_empty() {
                    submission.receipt = Some((original_name, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }

    Ok(submission)
}

/// Tenant submits a proof of payment for a specific billed month.
/// Moves the matching ledger row Unpaid/Pending → Pending.
async fn submit_rent_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let tenant = require_tenant(&state, &headers)?;
    let submission = read_payment_multipart(&mut multipart).await?;

    // All validation happens before any storage mutation.
    let bill_year = submission
        .bill_year
        .ok_or_else(|| AppError::BadRequest("bill_year is required.".to_string()))?;
    let bill_month = submission
        .bill_month
        .filter(|month| (1..=12).contains(month))
        .ok_or_else(|| AppError::BadRequest("bill_month must be between 1 and 12.".to_string()))?;
    if submission.amount.is_some_and(|amount| amount < 0.0) {
        return Err(AppError::BadRequest("Invalid amount.".to_string()));
    }

    let receipt_path = match &submission.receipt {
        Some((original_name, bytes)) => {
            let relative = uploads::build_relative_path(
                tenant.id,
                "rent",
                chrono::Utc::now().date_naive(),
                original_name,
            );
            Some(uploads::store_file(&state.config.uploads_dir, &relative, bytes).await?)
        }
        None => None,
    };

    let bill = ledger::submit_payment(
        &state.db_pool,
        tenant.id,
        bill_year,
        bill_month,
        receipt_path.as_deref(),
    )
    .await?;

    write_audit_log(
        &state.db_pool,
        Some(tenant.id),
        "submit_payment",
        "rent_ledger",
        Some(bill.id),
        None,
        Some(json!({
            "bill_year": bill_year,
            "bill_month": bill_month,
            "amount": submission.amount,
            "receipt_path": receipt_path,
        })),
    )
    .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "message": "Payment submitted. Awaiting owner verification.",
            "bill": bill,
        })),
    ))
}

/// Ad-hoc utility/other charge. No generation algorithm and no month
/// uniqueness applies here; year/month are reporting tags only.
async fn submit_utility_bill(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let tenant = require_tenant(&state, &headers)?;

    let mut amount: Option<f64> = None;
    let mut bill_type = "utilities".to_string();
    let mut receipt: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(format!("Invalid multipart payload: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "amount" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid field: {error}")))?;
                amount = Some(
                    raw.trim()
                        .parse::<f64>()
                        .map_err(|_| AppError::BadRequest("Invalid amount.".to_string()))?,
                );
            }
            "bill_type" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid field: {error}")))?;
                if !raw.trim().is_empty() {
                    bill_type = raw.trim().to_string();
                }
            }
            "receipt" => {
                let original_name = field.file_name().unwrap_or("receipt").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid upload: {error}")))?;
                if !bytes.is_empty() {
                    receipt = Some((original_name, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }

    let amount = amount
        .ok_or_else(|| AppError::BadRequest("amount is required.".to_string()))?;
    if amount < 0.0 {
        return Err(AppError::BadRequest("Invalid amount.".to_string()));
    }

    let today = chrono::Utc::now().date_naive();
    let receipt_path = match &receipt {
        Some((original_name, bytes)) => {
            let relative =
                uploads::build_relative_path(tenant.id, &bill_type, today, original_name);
            Some(uploads::store_file(&state.config.uploads_dir, &relative, bytes).await?)
        }
        None => None,
    };

    let mut record = Map::new();
    record.insert("tenant_id".to_string(), json!(tenant.id));
    record.insert("amount".to_string(), json!(amount));
    record.insert("bill_type".to_string(), Value::String(bill_type));
    record.insert("bill_year".to_string(), json!(today.year()));
    record.insert("bill_month".to_string(), json!(today.month() as i32));
    if let Some(path) = &receipt_path {
        record.insert("receipt_path".to_string(), Value::String(path.clone()));
    }

    let created = create_row(&state.db_pool, "utility_bills", &record).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "message": "Payment submitted. Verification status set to pending.",
            "bill": created,
        })),
    ))
}

async fn list_utility_bills(
    State(state): State<AppState>,
    Query(query): Query<UtilityHistoryQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let tenant = require_tenant(&state, &headers)?;

    let mut filters = Map::new();
    filters.insert("tenant_id".to_string(), json!(tenant.id));
    if let Some(bill_type) = query
        .bill_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        filters.insert("bill_type".to_string(), Value::String(bill_type.to_string()));
    }

    let rows = list_rows(
        &state.db_pool,
        "utility_bills",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}
