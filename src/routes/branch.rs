//! Branch management: creation and listing (admin), the tagged registry-edit
//! endpoint, per-branch credential updates, supplier edits, and the
//! column-visibility blob.
//!
//! Suppliers and voucher books are addressed by their immutable ids, never by
//! list position, so concurrent edits cannot land on the wrong element.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use redis::AsyncCommands;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{AuthSession, make_credentials},
    database::{
        all_branches, branch_view, claim_username, get_branch, put_branch, release_username,
        used_key,
    },
    error::AppError,
    models::{Branch, BranchView, Role, Supplier, VoucherBook},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBranch {
    pub username: String,
    pub password: String,
    pub branch_name: String,
}

fn require_filled(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub async fn create(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewBranch>,
) -> Result<Json<BranchView>, AppError> {
    auth.require_admin()?;

    require_filled(&request.username, "username")?;
    require_filled(&request.password, "password")?;
    require_filled(&request.branch_name, "branchName")?;

    let mut conn = state.redis.clone();

    let id = Uuid::new_v4();
    if !claim_username(&mut conn, &request.username, id).await? {
        return Err(AppError::Conflict(format!(
            "Username {} is already taken",
            request.username
        )));
    }

    let (password_hash, password_salt) = make_credentials(&request.password);
    let branch = Branch {
        id,
        username: request.username,
        password_hash,
        password_salt,
        branch_name: request.branch_name,
        vouchers: Vec::new(),
        suppliers: Vec::new(),
        column_visibility: BTreeMap::new(),
        created_at: Utc::now(),
    };

    put_branch(&mut conn, &branch).await?;
    info!("created branch {}", branch.branch_name);

    Ok(Json(branch_view(&mut conn, branch).await?))
}

pub async fn list(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BranchView>>, AppError> {
    auth.require_admin()?;

    let mut conn = state.redis.clone();

    let mut views = Vec::new();
    for branch in all_branches(&mut conn).await? {
        views.push(branch_view(&mut conn, branch).await?);
    }

    Ok(Json(views))
}

pub async fn get_one(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BranchView>, AppError> {
    if auth.role != Role::Admin && auth.branch_id != Some(id) {
        return Err(AppError::Unauthorized);
    }

    let mut conn = state.redis.clone();
    let branch = get_branch(&mut conn, id).await?;

    Ok(Json(branch_view(&mut conn, branch).await?))
}

/// The multi-purpose registry-edit endpoint. The `action` tag makes the body
/// shape explicit per operation.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BranchAction {
    AddSupplier { name: String },
    AddVoucher { name: String, start: i64, end: i64 },
    EditVoucher { id: Uuid, name: String, start: i64, end: i64 },
    DeleteVoucher { id: Uuid },
}

fn check_book_range(start: i64, end: i64) -> Result<(), AppError> {
    if start > end {
        return Err(AppError::Validation(format!(
            "Voucher book range is inverted: {start} > {end}"
        )));
    }
    Ok(())
}

pub async fn apply_action(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(action): Json<BranchAction>,
) -> Result<Json<BranchView>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let mut branch = get_branch(&mut conn, branch_id).await?;

    match action {
        BranchAction::AddSupplier { name } => {
            require_filled(&name, "name")?;
            if branch.suppliers.iter().any(|supplier| supplier.name == name) {
                return Err(AppError::Conflict(format!(
                    "Supplier {name} already exists"
                )));
            }

            branch.suppliers.push(Supplier {
                id: Uuid::new_v4(),
                name,
            });
        }
        BranchAction::AddVoucher { name, start, end } => {
            require_filled(&name, "name")?;
            check_book_range(start, end)?;
            if branch.vouchers.iter().any(|book| book.name == name) {
                return Err(AppError::Conflict(format!(
                    "Voucher book {name} already exists"
                )));
            }

            branch.vouchers.push(VoucherBook {
                id: Uuid::new_v4(),
                name,
                start,
                end,
            });
        }
        BranchAction::EditVoucher { id, name, start, end } => {
            require_filled(&name, "name")?;
            check_book_range(start, end)?;
            if branch
                .vouchers
                .iter()
                .any(|book| book.id != id && book.name == name)
            {
                return Err(AppError::Conflict(format!(
                    "Voucher book {name} already exists"
                )));
            }

            let book = branch
                .vouchers
                .iter_mut()
                .find(|book| book.id == id)
                .ok_or(AppError::NotFound("Voucher book"))?;

            book.name = name;
            book.start = start;
            book.end = end;
        }
        BranchAction::DeleteVoucher { id } => {
            let before = branch.vouchers.len();
            branch.vouchers.retain(|book| book.id != id);
            if branch.vouchers.len() == before {
                return Err(AppError::NotFound("Voucher book"));
            }

            // The registry set goes with the book.
            let _: () = conn.del(used_key(branch_id, id)).await?;
        }
    }

    put_branch(&mut conn, &branch).await?;

    Ok(Json(branch_view(&mut conn, branch).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBranch {
    pub branch_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceBranch {
    pub branch_name: String,
    pub username: String,
    pub password: String,
}

async fn apply_update(
    state: &AppState,
    id: Uuid,
    update: UpdateBranch,
) -> Result<Json<BranchView>, AppError> {
    let mut conn = state.redis.clone();
    let mut branch = get_branch(&mut conn, id).await?;

    if let Some(branch_name) = update.branch_name {
        require_filled(&branch_name, "branchName")?;
        branch.branch_name = branch_name;
    }

    if let Some(username) = update.username {
        require_filled(&username, "username")?;
        if username != branch.username {
            if !claim_username(&mut conn, &username, id).await? {
                return Err(AppError::Conflict(format!(
                    "Username {username} is already taken"
                )));
            }
            release_username(&mut conn, &branch.username).await?;
            branch.username = username;
        }
    }

    if let Some(password) = update.password {
        require_filled(&password, "password")?;
        let (password_hash, password_salt) = make_credentials(&password);
        branch.password_hash = password_hash;
        branch.password_salt = password_salt;
    }

    put_branch(&mut conn, &branch).await?;

    Ok(Json(branch_view(&mut conn, branch).await?))
}

pub async fn update(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBranch>,
) -> Result<Json<BranchView>, AppError> {
    auth.require_admin()?;

    apply_update(&state, id, request).await
}

pub async fn replace(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplaceBranch>,
) -> Result<Json<BranchView>, AppError> {
    auth.require_admin()?;

    apply_update(
        &state,
        id,
        UpdateBranch {
            branch_name: Some(request.branch_name),
            username: Some(request.username),
            password: Some(request.password),
        },
    )
    .await
}

pub async fn get_columns(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, bool>>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let branch = get_branch(&mut conn, branch_id).await?;

    Ok(Json(branch.column_visibility))
}

/// Stored and returned verbatim; the server does not interpret column names.
pub async fn set_columns(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(columns): Json<BTreeMap<String, bool>>,
) -> Result<Json<BTreeMap<String, bool>>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let mut branch = get_branch(&mut conn, branch_id).await?;

    branch.column_visibility = columns;
    put_branch(&mut conn, &branch).await?;

    Ok(Json(branch.column_visibility))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSupplier {
    pub name: String,
}

pub async fn edit_supplier(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RenameSupplier>,
) -> Result<Json<BranchView>, AppError> {
    let branch_id = auth.require_branch()?;
    require_filled(&request.name, "name")?;

    let mut conn = state.redis.clone();
    let mut branch = get_branch(&mut conn, branch_id).await?;

    if branch
        .suppliers
        .iter()
        .any(|supplier| supplier.id != id && supplier.name == request.name)
    {
        return Err(AppError::Conflict(format!(
            "Supplier {} already exists",
            request.name
        )));
    }

    let supplier = branch
        .suppliers
        .iter_mut()
        .find(|supplier| supplier.id == id)
        .ok_or(AppError::NotFound("Supplier"))?;
    supplier.name = request.name;

    put_branch(&mut conn, &branch).await?;

    Ok(Json(branch_view(&mut conn, branch).await?))
}

pub async fn delete_supplier(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BranchView>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let mut branch = get_branch(&mut conn, branch_id).await?;

    let before = branch.suppliers.len();
    branch.suppliers.retain(|supplier| supplier.id != id);
    if branch.suppliers.len() == before {
        return Err(AppError::NotFound("Supplier"));
    }

    put_branch(&mut conn, &branch).await?;

    Ok(Json(branch_view(&mut conn, branch).await?))
}
