use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_tenant,
    error::{AppError, AppResult},
    repository::table_service::update_row,
    services::uploads,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/tenants/me/profile",
        axum::routing::get(get_profile).put(update_profile),
    )
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    address: Option<String>,
    emergency_contact: Option<String>,
    profile_picture: Option<String>,
}

fn profile_json(row: &ProfileRow) -> Value {
    let full_name = [row.first_name.as_str(), row.last_name.as_str()]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    json!({
        "id": row.id,
        "full_name": full_name,
        "email": row.email,
        "phone": row.phone.clone().unwrap_or_default(),
        "address": row.address.clone().unwrap_or_default(),
        "emergency_contact": row.emergency_contact.clone().unwrap_or_default(),
        "profile_picture": row.profile_picture,
    })
}

async fn fetch_profile(state: &AppState, user_id: i64) -> AppResult<ProfileRow> {
    sqlx::query_as::<_, ProfileRow>(
        "SELECT id, first_name, last_name, email, phone, address, \
                emergency_contact, profile_picture \
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found.".to_string()))
}

async fn get_profile(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let tenant = require_tenant(&state, &headers)?;
    let profile = fetch_profile(&state, tenant.id).await?;
    Ok(Json(profile_json(&profile)))
}

/// Multipart update: text fields plus an optional `profile_picture` file.
async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let tenant = require_tenant(&state, &headers)?;

    let mut patch = Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(format!("Invalid multipart payload: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "full_name" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid field: {error}")))?;
                let mut parts = raw.split_whitespace();
                if let Some(first) = parts.next() {
                    patch.insert("first_name".to_string(), Value::String(first.to_string()));
                    let rest = parts.collect::<Vec<_>>().join(" ");
                    if !rest.is_empty() {
                        patch.insert("last_name".to_string(), Value::String(rest));
                    }
                }
            }
            "email" | "phone" | "address" | "emergency_contact" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid field: {error}")))?;
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    patch.insert(name.clone(), Value::String(trimmed.to_string()));
                }
            }
            "profile_picture" => {
                let original_name = field.file_name().unwrap_or("picture").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| AppError::BadRequest(format!("Invalid upload: {error}")))?;
                if bytes.is_empty() {
                    continue;
                }
                let relative = uploads::build_relative_path(
                    tenant.id,
                    "profile",
                    chrono::Utc::now().date_naive(),
                    &original_name,
                );
                let stored =
                    uploads::store_file(&state.config.uploads_dir, &relative, &bytes).await?;
                patch.insert("profile_picture".to_string(), Value::String(stored));
            }
            _ => {}
        }
    }

    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    update_row(&state.db_pool, "users", tenant.id, &patch).await?;

    let profile = fetch_profile(&state, tenant.id).await?;
    Ok(Json(json!({
        "message": "Profile updated",
        "profile": profile_json(&profile),
    })))
}
