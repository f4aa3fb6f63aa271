use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    auth::{new_token, verify_password},
    database::{branch_id_for_username, branch_view, get_admin, get_branch, put_session},
    error::AppError,
    models::{Role, Session},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub profile: serde_json::Value,
}

/// Admin first, branch second; unknown username and wrong password collapse
/// into the same 401 body.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let mut conn = state.redis.clone();

    let admin = get_admin(&mut conn).await?;
    if request.username == admin.username {
        if !verify_password(&request.password, &admin.password_salt, &admin.password_hash) {
            return Err(AppError::Unauthorized);
        }

        let token = new_token();
        let session = Session {
            role: Role::Admin,
            branch_id: None,
        };
        put_session(&mut conn, &token, &session, state.config.session_ttl_secs).await?;

        info!("admin logged in");
        return Ok(Json(LoginResponse {
            token,
            role: Role::Admin,
            profile: json!({ "username": admin.username }),
        }));
    }

    let branch_id = branch_id_for_username(&mut conn, &request.username)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let branch = get_branch(&mut conn, branch_id).await?;

    if !verify_password(&request.password, &branch.password_salt, &branch.password_hash) {
        return Err(AppError::Unauthorized);
    }

    let token = new_token();
    let session = Session {
        role: Role::Branch,
        branch_id: Some(branch_id),
    };
    put_session(&mut conn, &token, &session, state.config.session_ttl_secs).await?;

    info!("branch {} logged in", branch.branch_name);
    let profile = serde_json::to_value(branch_view(&mut conn, branch).await?)?;

    Ok(Json(LoginResponse {
        token,
        role: Role::Branch,
        profile,
    }))
}
