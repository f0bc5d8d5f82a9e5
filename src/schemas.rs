use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

fn default_limit_200() -> i64 {
    200
}

fn default_sort_desc() -> String {
    "desc".to_string()
}

// ===== Auth =====

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct SignupInput {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

// ===== Properties & rooms =====

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub property_name: String,
    #[validate(length(min = 1, max = 500))]
    pub address: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdatePropertyInput {
    pub property_name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateRoomInput {
    #[validate(length(min = 1, max = 50))]
    pub room_number: String,
    #[validate(length(min = 1, max = 100))]
    pub room_type: String,
    #[validate(range(min = 0.0))]
    pub monthly_rent: f64,
    pub capacity: Option<i32>,
    pub amenities: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct AssignTenantInput {
    #[validate(email)]
    pub tenant_email: String,
    pub move_in: NaiveDate,
    #[validate(range(min = 1, max = 31))]
    pub payment_day: i32,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateTenancyInput {
    pub move_in: Option<NaiveDate>,
    #[validate(range(min = 1, max = 31))]
    pub payment_day: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyPath {
    pub property_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomPath {
    pub property_id: i64,
    pub room_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomTenantPath {
    pub property_id: i64,
    pub room_id: i64,
    pub tenant_id: i64,
}

// ===== Bills =====

#[derive(Debug, Clone, Deserialize)]
pub struct BillPath {
    pub bill_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtilityBillPath {
    pub utility_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtilityHistoryQuery {
    pub bill_type: Option<String>,
    #[serde(default = "default_limit_200")]
    pub limit: i64,
}

// ===== Concerns =====

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateConcernInput {
    pub owner_id: i64,
    pub property_id: i64,
    pub room_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct ConcernReplyInput {
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcernPath {
    pub concern_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcernsHistoryQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub word: Option<String>,
    #[serde(default = "default_sort_desc")]
    pub sort: String,
    #[serde(default = "default_limit_200")]
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::{clamp_limit_in_range, AssignTenantInput, SignupInput};

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(0, 1, 500), 1);
        assert_eq!(clamp_limit_in_range(9999, 1, 500), 500);
        assert_eq!(clamp_limit_in_range(42, 1, 500), 42);
    }

    #[test]
    fn payment_day_must_be_a_calendar_day() {
        let valid = AssignTenantInput {
            tenant_email: "t@example.com".to_string(),
            move_in: chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            payment_day: 31,
        };
        assert!(valid.validate().is_ok());

        let out_of_range = AssignTenantInput {
            payment_day: 32,
            ..valid.clone()
        };
        assert!(out_of_range.validate().is_err());

        let zero = AssignTenantInput {
            payment_day: 0,
            ..valid
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn signup_requires_well_formed_fields() {
        let input = SignupInput {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "not-an-email".to_string(),
            phone: "0917".to_string(),
            password: "long-enough-pw".to_string(),
            role: "tenant".to_string(),
        };
        assert!(input.validate().is_err());
    }
}
