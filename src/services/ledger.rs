use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

/// Single opaque message for both "no such bill" and "not your bill" so the
/// caller cannot probe for other owners' data.
const NOT_FOUND_OR_UNAUTHORIZED: &str = "Bill not found or not authorized.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Unpaid,
    Pending,
    Paid,
}

impl BillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "unpaid" => Some(Self::Unpaid),
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerAction {
    None,
    Verify,
    SendBack,
    Remind,
}

impl OwnerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Verify => "verify",
            Self::SendBack => "send_back",
            Self::Remind => "remind",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "none" => Some(Self::None),
            "verify" => Some(Self::Verify),
            "send_back" => Some(Self::SendBack),
            "remind" => Some(Self::Remind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct RentBill {
    pub id: i64,
    pub owner_id: i64,
    pub tenant_id: i64,
    pub room_id: i64,
    pub property_id: i64,
    pub payment_day: i32,
    pub move_in: NaiveDate,
    pub bill_year: i32,
    pub bill_month: i32,
    pub due_date: NaiveDate,
    pub status: String,
    pub receipt_path: Option<String>,
    pub owner_action: String,
    pub created_at: DateTime<Utc>,
}

impl RentBill {
    pub fn status(&self) -> Option<BillStatus> {
        BillStatus::parse(&self.status)
    }
}

/// Owner dashboard row: ledger entry joined with the room's rent and the
/// tenant's display name.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct OwnerBillRow {
    pub id: i64,
    pub tenant_id: i64,
    pub room_id: i64,
    pub property_id: i64,
    pub bill_year: i32,
    pub bill_month: i32,
    pub due_date: NaiveDate,
    pub status: String,
    pub receipt_path: Option<String>,
    pub owner_action: String,
    pub created_at: DateTime<Utc>,
    pub monthly_rent: Option<f64>,
    pub tenant_name: Option<String>,
}

const BILL_COLUMNS: &str = "id, owner_id, tenant_id, room_id, property_id, payment_day, \
     move_in, bill_year, bill_month, due_date, status, receipt_path, owner_action, created_at";

const SUBMIT_PAYMENT_SQL: &str = "UPDATE rent_ledger \
     SET status = $1, receipt_path = $2, owner_action = $3 \
     WHERE tenant_id = $4 AND room_id = $5 AND bill_year = $6 AND bill_month = $7 \
       AND status <> $8 \
     RETURNING id, owner_id, tenant_id, room_id, property_id, payment_day, \
       move_in, bill_year, bill_month, due_date, status, receipt_path, owner_action, created_at";

const VERIFY_SQL: &str = "UPDATE rent_ledger \
     SET status = $1, owner_action = $2 \
     WHERE id = $3 AND owner_id = $4 AND status = $5 \
     RETURNING id, owner_id, tenant_id, room_id, property_id, payment_day, \
       move_in, bill_year, bill_month, due_date, status, receipt_path, owner_action, created_at";

const SEND_BACK_SQL: &str = "UPDATE rent_ledger \
     SET status = $1, receipt_path = NULL, owner_action = $2 \
     WHERE id = $3 AND owner_id = $4 AND status = $5 \
     RETURNING id, owner_id, tenant_id, room_id, property_id, payment_day, \
       move_in, bill_year, bill_month, due_date, status, receipt_path, owner_action, created_at";

const REMIND_SQL: &str = "UPDATE rent_ledger \
     SET owner_action = $1 \
     WHERE id = $2 AND owner_id = $3 \
     RETURNING id, owner_id, tenant_id, room_id, property_id, payment_day, \
       move_in, bill_year, bill_month, due_date, status, receipt_path, owner_action, created_at";

/// Tenant submits a proof of payment for a given month.
/// Unpaid/Pending → Pending; attaches the receipt and clears any prior
/// owner action. Paid rows are final and never re-entered.
pub async fn submit_payment(
    pool: &PgPool,
    tenant_id: i64,
    bill_year: i32,
    bill_month: i32,
    receipt_path: Option<&str>,
) -> AppResult<RentBill> {
    // The ledger key includes the room, so resolve the tenant's current
    // assignment first.
    let room_id: Option<i64> =
        sqlx::query_scalar("SELECT room_id FROM room_tenants WHERE tenant_id = $1 LIMIT 1")
            .bind(tenant_id)
            .fetch_optional(pool)
            .await?;
    let room_id = room_id
        .ok_or_else(|| AppError::NotFound("You are not assigned to a room.".to_string()))?;

    sqlx::query_as::<_, RentBill>(SUBMIT_PAYMENT_SQL)
        .bind(BillStatus::Pending.as_str())
        .bind(receipt_path)
        .bind(OwnerAction::None.as_str())
        .bind(tenant_id)
        .bind(room_id)
        .bind(bill_year)
        .bind(bill_month)
        .bind(BillStatus::Paid.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("No rent bill found for that month.".to_string()))
}

/// Owner confirms a submitted payment: Pending → Paid.
pub async fn verify_bill(pool: &PgPool, owner_id: i64, bill_id: i64) -> AppResult<RentBill> {
    sqlx::query_as::<_, RentBill>(VERIFY_SQL)
        .bind(BillStatus::Paid.as_str())
        .bind(OwnerAction::Verify.as_str())
        .bind(bill_id)
        .bind(owner_id)
        .bind(BillStatus::Pending.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND_OR_UNAUTHORIZED.to_string()))
}

/// Owner rejects a submitted payment: Pending → Unpaid, receipt cleared.
pub async fn send_back_bill(pool: &PgPool, owner_id: i64, bill_id: i64) -> AppResult<RentBill> {
    sqlx::query_as::<_, RentBill>(SEND_BACK_SQL)
        .bind(BillStatus::Unpaid.as_str())
        .bind(OwnerAction::SendBack.as_str())
        .bind(bill_id)
        .bind(owner_id)
        .bind(BillStatus::Pending.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND_OR_UNAUTHORIZED.to_string()))
}

/// Owner nudges the tenant. Informational only: stamps the action and leaves
/// the status untouched.
pub async fn remind_bill(pool: &PgPool, owner_id: i64, bill_id: i64) -> AppResult<RentBill> {
    sqlx::query_as::<_, RentBill>(REMIND_SQL)
        .bind(OwnerAction::Remind.as_str())
        .bind(bill_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND_OR_UNAUTHORIZED.to_string()))
}

/// Unpaid bills for a tenant, earliest due date first.
pub async fn list_unpaid_bills_for_tenant(
    pool: &PgPool,
    tenant_id: i64,
) -> AppResult<Vec<RentBill>> {
    let rows = sqlx::query_as::<_, RentBill>(&format!(
        "SELECT {BILL_COLUMNS} FROM rent_ledger \
         WHERE tenant_id = $1 AND status = $2 \
         ORDER BY due_date ASC"
    ))
    .bind(tenant_id)
    .bind(BillStatus::Unpaid.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Full bill history for a tenant, most recent due date first.
pub async fn list_bills_for_tenant(pool: &PgPool, tenant_id: i64) -> AppResult<Vec<RentBill>> {
    let rows = sqlx::query_as::<_, RentBill>(&format!(
        "SELECT {BILL_COLUMNS} FROM rent_ledger \
         WHERE tenant_id = $1 \
         ORDER BY due_date DESC"
    ))
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All bills across an owner's properties, most recent due date first,
/// joined with the room's rent and the tenant's name for display.
pub async fn list_bills_for_owner(pool: &PgPool, owner_id: i64) -> AppResult<Vec<OwnerBillRow>> {
    let rows = sqlx::query_as::<_, OwnerBillRow>(
        "SELECT b.id, b.tenant_id, b.room_id, b.property_id, b.bill_year, b.bill_month, \
                b.due_date, b.status, b.receipt_path, b.owner_action, b.created_at, \
                r.monthly_rent::float8 AS monthly_rent, \
                u.first_name || ' ' || u.last_name AS tenant_name \
         FROM rent_ledger b \
         LEFT JOIN rooms r ON r.id = b.room_id \
         LEFT JOIN users u ON u.id = b.tenant_id \
         WHERE b.owner_id = $1 \
         ORDER BY b.due_date DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [BillStatus::Unpaid, BillStatus::Pending, BillStatus::Paid] {
            assert_eq!(BillStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BillStatus::parse("late"), None);
    }

    #[test]
    fn owner_action_round_trips() {
        for action in [
            OwnerAction::None,
            OwnerAction::Verify,
            OwnerAction::SendBack,
            OwnerAction::Remind,
        ] {
            assert_eq!(OwnerAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(OwnerAction::parse("nag"), None);
    }

    #[test]
    fn verify_and_send_back_require_pending_and_ownership() {
        for sql in [VERIFY_SQL, SEND_BACK_SQL] {
            assert!(sql.contains("owner_id = $4"));
            assert!(sql.contains("status = $5"));
        }
    }

    #[test]
    fn send_back_clears_the_receipt() {
        assert!(SEND_BACK_SQL.contains("receipt_path = NULL"));
        assert!(!VERIFY_SQL.contains("receipt_path = NULL"));
    }

    #[test]
    fn remind_never_touches_status() {
        assert!(!REMIND_SQL.contains("SET status"));
        assert!(!REMIND_SQL.contains("AND status"));
        assert!(REMIND_SQL.contains("owner_id = $3"));
    }

    #[test]
    fn paid_rows_are_not_resubmittable() {
        assert!(SUBMIT_PAYMENT_SQL.contains("status <> $8"));
    }
}
