use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::{
    auth::{require_owner, require_tenant, AuthUser},
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, list_rows, update_row},
    schemas::{
        validate_input, AssignTenantInput, CreatePropertyInput, CreateRoomInput, PropertyPath,
        RoomPath, RoomTenantPath, UpdatePropertyInput, UpdateTenancyInput,
    },
    services::audit::write_audit_log,
    services::billing::spawn_generation,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/properties",
            axum::routing::get(list_properties).post(create_property),
        )
        .route(
            "/properties/{property_id}",
            axum::routing::put(update_property).delete(delete_property),
        )
        .route(
            "/properties/{property_id}/rooms",
            axum::routing::get(list_rooms_with_tenants).post(create_room),
        )
        .route(
            "/properties/{property_id}/rooms/{room_id}",
            axum::routing::delete(delete_room),
        )
        .route(
            "/properties/{property_id}/rooms/{room_id}/assign-tenant",
            axum::routing::post(assign_tenant),
        )
        .route(
            "/properties/{property_id}/rooms/{room_id}/tenants/{tenant_id}",
            axum::routing::put(update_tenancy).delete(remove_tenant),
        )
        .route("/tenants/me/room", axum::routing::get(my_room))
}

/// Room must exist under this property and belong to this owner.
/// The two failure causes collapse into one opaque not-found.
async fn assert_room_owner(
    state: &AppState,
    property_id: i64,
    room_id: i64,
    owner: &AuthUser,
) -> AppResult<()> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT r.id FROM rooms r \
         JOIN properties p ON p.id = r.property_id \
         WHERE r.id = $1 AND r.property_id = $2 AND p.owner_id = $3",
    )
    .bind(room_id)
    .bind(property_id)
    .bind(owner.id)
    .fetch_optional(&state.db_pool)
    .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("Room not found or unauthorized.".to_string()))
}

async fn assert_property_owner(
    state: &AppState,
    property_id: i64,
    owner: &AuthUser,
) -> AppResult<()> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM properties WHERE id = $1 AND owner_id = $2")
            .bind(property_id)
            .bind(owner.id)
            .fetch_optional(&state.db_pool)
            .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("Property not found or unauthorized.".to_string()))
}

async fn list_properties(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;

    let mut filters = Map::new();
    filters.insert("owner_id".to_string(), json!(owner.id));
    let rows = list_rows(
        &state.db_pool,
        "properties",
        Some(&filters),
        500,
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePropertyInput>,
) -> AppResult<impl IntoResponse> {
    let owner = require_owner(&state, &headers)?;
    validate_input(&payload)?;

    let mut record = Map::new();
    record.insert("owner_id".to_string(), json!(owner.id));
    record.insert(
        "property_name".to_string(),
        Value::String(payload.property_name),
    );
    record.insert("address".to_string(), Value::String(payload.address));
    if let Some(description) = payload.description {
        record.insert("description".to_string(), Value::String(description));
    }

    let created = create_row(&state.db_pool, "properties", &record).await?;
    let entity_id = created.get("id").and_then(Value::as_i64);

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "create",
        "properties",
        entity_id,
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn update_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePropertyInput>,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    assert_property_owner(&state, path.property_id, &owner).await?;

    let mut patch = Map::new();
    if let Some(name) = payload.property_name {
        patch.insert("property_name".to_string(), Value::String(name));
    }
    if let Some(address) = payload.address {
        patch.insert("address".to_string(), Value::String(address));
    }
    if let Some(description) = payload.description {
        patch.insert("description".to_string(), Value::String(description));
    }
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    let updated = update_row(&state.db_pool, "properties", path.property_id, &patch).await?;
    Ok(Json(updated))
}

/// Deleting a property cascades to rooms and tenancies. Historical ledger
/// rows are intentionally left untouched.
async fn delete_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    assert_property_owner(&state, path.property_id, &owner).await?;

    let deleted = delete_row(&state.db_pool, "properties", path.property_id).await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "delete",
        "properties",
        Some(path.property_id),
        Some(deleted.clone()),
        None,
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
struct RoomTenantInfo {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    move_in: NaiveDate,
    payment_day: i32,
}

async fn tenants_for_room(state: &AppState, room_id: i64) -> AppResult<Vec<RoomTenantInfo>> {
    let rows = sqlx::query_as::<_, RoomTenantInfo>(
        "SELECT u.id, u.first_name, u.last_name, u.email, u.phone, \
                rt.move_in, rt.payment_day \
         FROM room_tenants rt JOIN users u ON u.id = rt.tenant_id \
         WHERE rt.room_id = $1 \
         ORDER BY rt.created_at",
    )
    .bind(room_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(rows)
}

async fn list_rooms_with_tenants(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    assert_property_owner(&state, path.property_id, &owner).await?;

    let mut filters = Map::new();
    filters.insert("property_id".to_string(), json!(path.property_id));
    let rooms = list_rows(
        &state.db_pool,
        "rooms",
        Some(&filters),
        500,
        0,
        "room_number",
        true,
    )
    .await?;

    let mut enriched = Vec::with_capacity(rooms.len());
    for room in rooms {
        let room_id = room.get("id").and_then(Value::as_i64).unwrap_or_default();
        let tenants = tenants_for_room(&state, room_id).await?;
        let mut entry = room;
        if let Some(object) = entry.as_object_mut() {
            object.insert("tenants".to_string(), json!(tenants));
        }
        enriched.push(entry);
    }

    Ok(Json(json!({ "data": enriched })))
}

async fn create_room(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomInput>,
) -> AppResult<impl IntoResponse> {
    let owner = require_owner(&state, &headers)?;
    validate_input(&payload)?;
    assert_property_owner(&state, path.property_id, &owner).await?;

    let mut record = Map::new();
    record.insert("property_id".to_string(), json!(path.property_id));
    record.insert(
        "room_number".to_string(),
        Value::String(payload.room_number),
    );
    record.insert("room_type".to_string(), Value::String(payload.room_type));
    record.insert("monthly_rent".to_string(), json!(payload.monthly_rent));
    if let Some(capacity) = payload.capacity {
        record.insert("capacity".to_string(), json!(capacity));
    }
    if let Some(amenities) = payload.amenities {
        record.insert("amenities".to_string(), Value::String(amenities));
    }

    let created = create_row(&state.db_pool, "rooms", &record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn delete_room(
    State(state): State<AppState>,
    Path(path): Path<RoomPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    assert_room_owner(&state, path.property_id, path.room_id, &owner).await?;

    delete_row(&state.db_pool, "rooms", path.room_id).await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "delete",
        "rooms",
        Some(path.room_id),
        None,
        None,
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

async fn assign_tenant(
    State(state): State<AppState>,
    Path(path): Path<RoomPath>,
    headers: HeaderMap,
    Json(payload): Json<AssignTenantInput>,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    validate_input(&payload)?;
    assert_room_owner(&state, path.property_id, path.room_id, &owner).await?;

    let tenant_email = payload.tenant_email.trim().to_lowercase();
    let tenant_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND role = 'tenant'")
            .bind(&tenant_email)
            .fetch_optional(&state.db_pool)
            .await?;
    let tenant_id = tenant_id.ok_or_else(|| {
        AppError::NotFound("Tenant with this email not found.".to_string())
    })?;

    // One active room per tenant.
    let already_assigned: Option<i64> =
        sqlx::query_scalar("SELECT id FROM room_tenants WHERE tenant_id = $1 LIMIT 1")
            .bind(tenant_id)
            .fetch_optional(&state.db_pool)
            .await?;
    if already_assigned.is_some() {
        return Err(AppError::BadRequest(
            "Tenant is already assigned to a room.".to_string(),
        ));
    }

    let mut record = Map::new();
    record.insert("room_id".to_string(), json!(path.room_id));
    record.insert("tenant_id".to_string(), json!(tenant_id));
    record.insert(
        "move_in".to_string(),
        Value::String(payload.move_in.to_string()),
    );
    record.insert("payment_day".to_string(), json!(payload.payment_day));

    let created = create_row(&state.db_pool, "room_tenants", &record).await?;

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "create",
        "room_tenants",
        created.get("id").and_then(Value::as_i64),
        None,
        Some(created),
    )
    .await;

    // The new tenant must see historical bills from move-in immediately.
    spawn_generation(state.db_pool.clone(), "assignment");

    let tenants = tenants_for_room(&state, path.room_id).await?;
    Ok(Json(json!({
        "room_id": path.room_id,
        "tenants": tenants,
    })))
}

async fn update_tenancy(
    State(state): State<AppState>,
    Path(path): Path<RoomTenantPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTenancyInput>,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    validate_input(&payload)?;
    assert_room_owner(&state, path.property_id, path.room_id, &owner).await?;

    if payload.move_in.is_none() && payload.payment_day.is_none() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    let updated = sqlx::query(
        "UPDATE room_tenants \
         SET move_in = COALESCE($1, move_in), payment_day = COALESCE($2, payment_day) \
         WHERE room_id = $3 AND tenant_id = $4",
    )
    .bind(payload.move_in)
    .bind(payload.payment_day)
    .bind(path.room_id)
    .bind(path.tenant_id)
    .execute(&state.db_pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Tenant is not assigned to this room.".to_string(),
        ));
    }

    // Already-generated ledger rows keep their original snapshot; only
    // future months pick up the new preference.
    spawn_generation(state.db_pool.clone(), "tenancy-update");

    Ok(Json(json!({ "success": true })))
}

async fn remove_tenant(
    State(state): State<AppState>,
    Path(path): Path<RoomTenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    assert_room_owner(&state, path.property_id, path.room_id, &owner).await?;

    let deleted = sqlx::query("DELETE FROM room_tenants WHERE room_id = $1 AND tenant_id = $2")
        .bind(path.room_id)
        .bind(path.tenant_id)
        .execute(&state.db_pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Tenant is not assigned to this room.".to_string(),
        ));
    }

    write_audit_log(
        &state.db_pool,
        Some(owner.id),
        "delete",
        "room_tenants",
        None,
        Some(json!({ "room_id": path.room_id, "tenant_id": path.tenant_id })),
        None,
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, sqlx::FromRow)]
struct MyRoomRow {
    room_id: i64,
    room_number: String,
    room_type: String,
    monthly_rent: f64,
    capacity: Option<i32>,
    amenities: Option<String>,
    property_id: i64,
    property_name: String,
    address: String,
    owner_id: i64,
    owner_first_name: String,
    owner_last_name: String,
    owner_email: String,
    owner_phone: Option<String>,
    move_in: NaiveDate,
    payment_day: i32,
}

async fn my_room(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let tenant = require_tenant(&state, &headers)?;

    let assignment = sqlx::query_as::<_, MyRoomRow>(
        "SELECT r.id AS room_id, r.room_number, r.room_type, \
                r.monthly_rent::float8 AS monthly_rent, r.capacity, r.amenities, \
                p.id AS property_id, p.property_name, p.address, \
                u.id AS owner_id, u.first_name AS owner_first_name, \
                u.last_name AS owner_last_name, u.email AS owner_email, \
                u.phone AS owner_phone, \
                rt.move_in, rt.payment_day \
         FROM room_tenants rt \
         JOIN rooms r ON r.id = rt.room_id \
         JOIN properties p ON p.id = r.property_id \
         JOIN users u ON u.id = p.owner_id \
         WHERE rt.tenant_id = $1 \
         LIMIT 1",
    )
    .bind(tenant.id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Not assigned to any room.".to_string()))?;

    Ok(Json(json!({
        "room": {
            "id": assignment.room_id,
            "room_number": assignment.room_number,
            "room_type": assignment.room_type,
            "monthly_rent": assignment.monthly_rent,
            "capacity": assignment.capacity,
            "amenities": assignment.amenities,
        },
        "property": {
            "id": assignment.property_id,
            "property_name": assignment.property_name,
            "address": assignment.address,
        },
        "owner": {
            "id": assignment.owner_id,
            "first_name": assignment.owner_first_name,
            "last_name": assignment.owner_last_name,
            "email": assignment.owner_email,
            "phone": assignment.owner_phone,
        },
        "move_in": assignment.move_in,
        "payment_day": assignment.payment_day,
    })))
}
