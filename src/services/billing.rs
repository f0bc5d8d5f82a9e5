use chrono::{Datelike, NaiveDate};
use sqlx::PgPool;
use tracing::{info, warn};

/// Result of one bill-generation run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BillGenerationSummary {
    pub tenancies: u32,
    pub bills_created: u32,
    pub skipped_missing_room: u32,
    pub errors: u32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TenancyRow {
    tenant_id: i64,
    room_id: i64,
    move_in: NaiveDate,
    payment_day: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct OwnerChain {
    property_id: i64,
    owner_id: i64,
}

/// Lazy sequence of (year, month) pairs, inclusive on both ends.
#[derive(Debug, Clone)]
pub struct MonthRange {
    next: Option<(i32, u32)>,
    end: (i32, u32),
}

/// Walk calendar months from the move-in month through (end_year, end_month).
/// Empty when the move-in month is after the target — a tenancy that has not
/// started yet never produces a bill.
pub fn month_range(move_in: NaiveDate, end_year: i32, end_month: u32) -> MonthRange {
    let start = (move_in.year(), move_in.month());
    let end = (end_year, end_month);
    MonthRange {
        next: (start <= end).then_some(start),
        end,
    }
}

impl Iterator for MonthRange {
    type Item = (i32, u32);

    fn next(&mut self) -> Option<(i32, u32)> {
        let current = self.next?;
        self.next = if current == self.end {
            None
        } else if current.1 == 12 {
            Some((current.0 + 1, 1))
        } else {
            Some((current.0, current.1 + 1))
        };
        Some(current)
    }
}

/// Last valid day of a month: day 0 of the following month.
pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Map a payment-day preference onto a concrete date within the month.
/// Preferences below 1 become the 1st; preferences past the end of the month
/// clamp to the last valid day, so every month yields exactly one due date.
pub fn resolve_due_date(year: i32, month: u32, preferred_day: i32) -> NaiveDate {
    let last = last_day_of_month(year, month);
    let day = preferred_day.clamp(1, last as i32) as u32;
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid for the month")
}

#[derive(Debug, Clone)]
pub struct NewRentBill {
    pub owner_id: i64,
    pub tenant_id: i64,
    pub room_id: i64,
    pub property_id: i64,
    pub payment_day: i32,
    pub move_in: NaiveDate,
    pub bill_year: i32,
    pub bill_month: i32,
    pub due_date: NaiveDate,
}

const INSERT_BILL_SQL: &str = "INSERT INTO rent_ledger \
     (owner_id, tenant_id, room_id, property_id, payment_day, move_in, \
      bill_year, bill_month, due_date) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
     ON CONFLICT (tenant_id, room_id, bill_year, bill_month) DO NOTHING";

/// Idempotency boundary. The unique key on (tenant_id, room_id, bill_year,
/// bill_month) makes a concurrent duplicate a no-op, not an error.
/// Returns whether a new row was written.
pub async fn insert_bill_if_absent(pool: &PgPool, bill: &NewRentBill) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(INSERT_BILL_SQL)
        .bind(bill.owner_id)
        .bind(bill.tenant_id)
        .bind(bill.room_id)
        .bind(bill.property_id)
        .bind(bill.payment_day)
        .bind(bill.move_in)
        .bind(bill.bill_year)
        .bind(bill.bill_month)
        .bind(bill.due_date)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Ensure one rent-ledger row per tenancy per calendar month from move-in
/// through `today`'s month. Safe to call any number of times, from any
/// trigger; identical inputs produce identical ledger state.
pub async fn generate_bills_up_to(pool: &PgPool, today: NaiveDate) -> BillGenerationSummary {
    let mut summary = BillGenerationSummary::default();

    let tenancies = match sqlx::query_as::<_, TenancyRow>(
        "SELECT tenant_id, room_id, move_in, payment_day FROM room_tenants ORDER BY id",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(error) => {
            warn!(error = %error, "Bill generation: could not list tenancies");
            summary.errors += 1;
            return summary;
        }
    };

    for tenancy in tenancies {
        summary.tenancies += 1;

        let chain = match sqlx::query_as::<_, OwnerChain>(
            "SELECT r.property_id, p.owner_id \
             FROM rooms r JOIN properties p ON p.id = r.property_id \
             WHERE r.id = $1",
        )
        .bind(tenancy.room_id)
        .fetch_optional(pool)
        .await
        {
            Ok(Some(chain)) => chain,
            Ok(None) => {
                // Stale tenancy pointing at a deleted room: skip, keep going.
                warn!(
                    room_id = tenancy.room_id,
                    tenant_id = tenancy.tenant_id,
                    "Bill generation: room not found for tenancy, skipping"
                );
                summary.skipped_missing_room += 1;
                continue;
            }
            Err(error) => {
                warn!(
                    room_id = tenancy.room_id,
                    error = %error,
                    "Bill generation: owner chain lookup failed"
                );
                summary.errors += 1;
                continue;
            }
        };

        // Months must land in chronological order; "earliest unpaid" queries
        // downstream assume no gaps.
        for (year, month) in month_range(tenancy.move_in, today.year(), today.month()) {
            let bill = NewRentBill {
                owner_id: chain.owner_id,
                tenant_id: tenancy.tenant_id,
                room_id: tenancy.room_id,
                property_id: chain.property_id,
                payment_day: tenancy.payment_day,
                move_in: tenancy.move_in,
                bill_year: year,
                bill_month: month as i32,
                due_date: resolve_due_date(year, month, tenancy.payment_day),
            };
            match insert_bill_if_absent(pool, &bill).await {
                Ok(true) => summary.bills_created += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        tenant_id = tenancy.tenant_id,
                        room_id = tenancy.room_id,
                        year,
                        month,
                        error = %error,
                        "Bill generation: insert failed, abandoning this tenancy"
                    );
                    summary.errors += 1;
                    break;
                }
            }
        }
    }

    info!(
        tenancies = summary.tenancies,
        created = summary.bills_created,
        skipped = summary.skipped_missing_room,
        errors = summary.errors,
        "Bill generation completed"
    );

    summary
}

/// Fire-and-continue generation for request-path triggers (login, tenant
/// assignment). The primary operation never blocks on or fails because of
/// bill generation.
pub fn spawn_generation(pool: PgPool, trigger: &'static str) {
    tokio::spawn(async move {
        let today = chrono::Utc::now().date_naive();
        let summary = generate_bills_up_to(&pool, today).await;
        if summary.bills_created > 0 || summary.errors > 0 {
            info!(
                trigger,
                created = summary.bills_created,
                errors = summary.errors,
                "Request-triggered bill generation finished"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
    }

    #[test]
    fn walks_from_move_in_month_through_target() {
        let months: Vec<_> = month_range(date(2024, 1, 15), 2024, 4).collect();
        assert_eq!(months, vec![(2024, 1), (2024, 2), (2024, 3), (2024, 4)]);
    }

    #[test]
    fn rolls_december_into_january() {
        let months: Vec<_> = month_range(date(2023, 11, 3), 2024, 2).collect();
        assert_eq!(
            months,
            vec![(2023, 11), (2023, 12), (2024, 1), (2024, 2)]
        );
    }

    #[test]
    fn empty_when_move_in_is_after_target() {
        assert_eq!(month_range(date(2025, 3, 10), 2025, 1).count(), 0);
        assert_eq!(month_range(date(2026, 1, 1), 2025, 12).count(), 0);
    }

    #[test]
    fn single_month_when_move_in_is_the_target_month() {
        let months: Vec<_> = month_range(date(2025, 6, 30), 2025, 6).collect();
        assert_eq!(months, vec![(2025, 6)]);
    }

    #[test]
    fn range_is_restartable() {
        let range = month_range(date(2024, 10, 1), 2025, 2);
        let first: Vec<_> = range.clone().collect();
        let second: Vec<_> = range.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn last_day_handles_leap_years() {
        assert_eq!(last_day_of_month(2024, 2), 29);
        assert_eq!(last_day_of_month(2025, 2), 28);
        assert_eq!(last_day_of_month(2024, 4), 30);
        assert_eq!(last_day_of_month(2024, 12), 31);
    }

    #[test]
    fn due_date_clamps_to_month_length() {
        assert_eq!(resolve_due_date(2024, 2, 31), date(2024, 2, 29));
        assert_eq!(resolve_due_date(2025, 2, 30), date(2025, 2, 28));
        assert_eq!(resolve_due_date(2024, 4, 31), date(2024, 4, 30));
        assert_eq!(resolve_due_date(2024, 1, 31), date(2024, 1, 31));
    }

    #[test]
    fn due_date_floors_at_the_first() {
        assert_eq!(resolve_due_date(2025, 2, 1), date(2025, 2, 1));
        assert_eq!(resolve_due_date(2025, 2, 0), date(2025, 2, 1));
        assert_eq!(resolve_due_date(2025, 2, -4), date(2025, 2, 1));
    }

    // Move-in 2024-01-15 with payment day 31, generated up to April 2024,
    // must produce exactly these four due dates.
    #[test]
    fn generation_schedule_is_deterministic() {
        let due_dates: Vec<_> = month_range(date(2024, 1, 15), 2024, 4)
            .map(|(year, month)| resolve_due_date(year, month, 31))
            .collect();
        assert_eq!(
            due_dates,
            vec![
                date(2024, 1, 31),
                date(2024, 2, 29),
                date(2024, 3, 31),
                date(2024, 4, 30),
            ]
        );
    }

    #[test]
    fn insert_statement_relies_on_the_unique_key() {
        assert!(INSERT_BILL_SQL
            .contains("ON CONFLICT (tenant_id, room_id, bill_year, bill_month) DO NOTHING"));
    }
}
