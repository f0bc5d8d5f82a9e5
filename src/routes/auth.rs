use axum::{extract::State, response::IntoResponse, Json};
use serde_json::{json, Map, Value};

use crate::{
    auth::{hash_password, issue_token, verify_password, UserRole},
    error::{AppError, AppResult},
    repository::table_service::create_row,
    schemas::{validate_input, LoginInput, SignupInput},
    services::billing::spawn_generation,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/auth/signup", axum::routing::post(signup))
        .route("/auth/login", axum::routing::post(login))
}

#[derive(Debug, sqlx::FromRow)]
struct LoginRow {
    id: i64,
    email: String,
    password_hash: String,
    first_name: String,
    role: String,
    is_verified: bool,
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let role = UserRole::parse(&payload.role)
        .ok_or_else(|| AppError::BadRequest("Role must be 'tenant' or 'owner'.".to_string()))?;

    let email = payload.email.trim().to_lowercase();
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db_pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("Email already exists.".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;

    let mut record = Map::new();
    record.insert("email".to_string(), Value::String(email));
    record.insert("password_hash".to_string(), Value::String(password_hash));
    record.insert(
        "first_name".to_string(),
        Value::String(payload.first_name.trim().to_string()),
    );
    record.insert(
        "last_name".to_string(),
        Value::String(payload.last_name.trim().to_string()),
    );
    record.insert("phone".to_string(), Value::String(payload.phone.clone()));
    record.insert("role".to_string(), Value::String(role.as_str().to_string()));

    create_row(&state.db_pool, "users", &record).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({ "message": "Signup successful! You can now log in." })),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> AppResult<Json<Value>> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest(
            "Please enter email and password.".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, LoginRow>(
        "SELECT id, email, password_hash, first_name, role, is_verified \
         FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::BadRequest("Invalid login credentials.".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::BadRequest("Invalid login credentials.".to_string()));
    }

    if !user.is_verified {
        return Err(AppError::Unauthorized(
            "Please verify your account before logging in.".to_string(),
        ));
    }

    let role = UserRole::parse(&user.role)
        .ok_or_else(|| AppError::Internal("Unknown role on user record.".to_string()))?;

    let token = issue_token(
        &state.config.jwt_secret,
        user.id,
        &user.email,
        role,
        state.config.jwt_expiry_hours,
    )?;

    // A returning tenant must immediately see correct historical bills.
    // Generation is fire-and-continue: it never blocks or fails the login.
    if role == UserRole::Tenant {
        spawn_generation(state.db_pool.clone(), "login");
    }

    Ok(Json(json!({
        "message": "Login successful!",
        "token": token,
        "user": {
            "id": user.id,
            "email": user.email,
            "first_name": user.first_name,
            "role": user.role,
        }
    })))
}
