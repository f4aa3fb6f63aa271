//! # Redis
//!
//! All persistent state lives in Redis:
//!
//! - `admin`: JSON credential record, seeded at startup
//! - `branches` hash: branch id -> branch JSON
//! - `branch_usernames` hash: username -> branch id (uniqueness guard via `HSETNX`)
//! - `entries:{branchId}` hash: entry id -> voucher-entry JSON
//! - `used:{branchId}:{bookId}` set: reserved voucher-number tokens for one book
//! - `session:{token}`: session JSON with TTL
//!
//! The registry sets are the coordination point of the whole system: `SADD`
//! is the add-if-absent reservation primitive, and the scripts in
//! [`crate::reservation`] pair a registry write with its entry write in one
//! atomic unit.

use std::time::Duration;

use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    models::{Admin, Branch, BranchView, Session, VoucherBookView, VoucherEntry},
};

pub const ADMIN: &str = "admin";
pub const BRANCHES: &str = "branches";
pub const BRANCH_USERNAMES: &str = "branch_usernames";

pub fn entries_key(branch_id: Uuid) -> String {
    format!("entries:{branch_id}")
}

pub fn used_key(branch_id: Uuid, book_id: Uuid) -> String {
    format!("used:{branch_id}:{book_id}")
}

pub fn session_key(token: &str) -> String {
    format!("session:{token}")
}

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(2)
        .set_connection_timeout(Duration::from_secs(1));

    let client = Client::open(redis_url).unwrap();

    client
        .get_connection_manager_with_config(config)
        .await
        .unwrap()
}

/// Seeds the admin record on first boot. Existing credentials are left alone
/// so a restart never silently resets them.
pub async fn ensure_admin(conn: &mut ConnectionManager, config: &Config) -> Result<(), AppError> {
    let admin = crate::auth::make_admin(&config.admin_username, &config.admin_password);
    let json = serde_json::to_string(&admin)?;

    let _: bool = conn.set_nx(ADMIN, json).await?;
    Ok(())
}

pub async fn get_admin(conn: &mut ConnectionManager) -> Result<Admin, AppError> {
    let json: Option<String> = conn.get(ADMIN).await?;
    let json = json.ok_or(AppError::NotFound("Admin"))?;

    Ok(serde_json::from_str(&json)?)
}

pub async fn get_branch(conn: &mut ConnectionManager, id: Uuid) -> Result<Branch, AppError> {
    let json: Option<String> = conn.hget(BRANCHES, id.to_string()).await?;
    let json = json.ok_or(AppError::NotFound("Branch"))?;

    Ok(serde_json::from_str(&json)?)
}

pub async fn put_branch(conn: &mut ConnectionManager, branch: &Branch) -> Result<(), AppError> {
    let json = serde_json::to_string(branch)?;

    let _: () = conn.hset(BRANCHES, branch.id.to_string(), json).await?;
    Ok(())
}

pub async fn all_branches(conn: &mut ConnectionManager) -> Result<Vec<Branch>, AppError> {
    let values: Vec<String> = conn.hvals(BRANCHES).await?;

    let mut branches = Vec::with_capacity(values.len());
    for json in values {
        branches.push(serde_json::from_str(&json)?);
    }

    Ok(branches)
}

pub async fn branch_id_for_username(
    conn: &mut ConnectionManager,
    username: &str,
) -> Result<Option<Uuid>, AppError> {
    let id: Option<String> = conn.hget(BRANCH_USERNAMES, username).await?;

    Ok(id.and_then(|id| id.parse().ok()))
}

/// Add-if-absent on the username index. `false` means the name is taken.
pub async fn claim_username(
    conn: &mut ConnectionManager,
    username: &str,
    branch_id: Uuid,
) -> Result<bool, AppError> {
    let claimed: bool = conn
        .hset_nx(BRANCH_USERNAMES, username, branch_id.to_string())
        .await?;

    Ok(claimed)
}

pub async fn release_username(
    conn: &mut ConnectionManager,
    username: &str,
) -> Result<(), AppError> {
    let _: () = conn.hdel(BRANCH_USERNAMES, username).await?;
    Ok(())
}

pub async fn get_entry(
    conn: &mut ConnectionManager,
    branch_id: Uuid,
    entry_id: Uuid,
) -> Result<VoucherEntry, AppError> {
    let json: Option<String> = conn.hget(entries_key(branch_id), entry_id.to_string()).await?;
    let json = json.ok_or(AppError::NotFound("Voucher entry"))?;

    Ok(serde_json::from_str(&json)?)
}

pub async fn put_entry(
    conn: &mut ConnectionManager,
    entry: &VoucherEntry,
) -> Result<(), AppError> {
    let json = serde_json::to_string(entry)?;

    let _: () = conn
        .hset(entries_key(entry.branch_id), entry.id.to_string(), json)
        .await?;
    Ok(())
}

pub async fn all_entries(
    conn: &mut ConnectionManager,
    branch_id: Uuid,
) -> Result<Vec<VoucherEntry>, AppError> {
    let values: Vec<String> = conn.hvals(entries_key(branch_id)).await?;

    let mut entries = Vec::with_capacity(values.len());
    for json in values {
        entries.push(serde_json::from_str(&json)?);
    }

    Ok(entries)
}

pub async fn used_numbers(
    conn: &mut ConnectionManager,
    branch_id: Uuid,
    book_id: Uuid,
) -> Result<Vec<String>, AppError> {
    let mut numbers: Vec<String> = conn.smembers(used_key(branch_id, book_id)).await?;
    numbers.sort();

    Ok(numbers)
}

/// Reassembles the registry sets onto the branch for API responses.
pub async fn branch_view(
    conn: &mut ConnectionManager,
    branch: Branch,
) -> Result<BranchView, AppError> {
    let mut vouchers = Vec::with_capacity(branch.vouchers.len());
    for book in &branch.vouchers {
        let used_vouchers = used_numbers(conn, branch.id, book.id).await?;
        vouchers.push(VoucherBookView {
            book: book.clone(),
            used_vouchers,
        });
    }

    Ok(BranchView {
        id: branch.id,
        username: branch.username,
        branch_name: branch.branch_name,
        vouchers,
        suppliers: branch.suppliers,
        column_visibility: branch.column_visibility,
        created_at: branch.created_at,
    })
}

pub async fn put_session(
    conn: &mut ConnectionManager,
    token: &str,
    session: &Session,
    ttl_secs: u64,
) -> Result<(), AppError> {
    let json = serde_json::to_string(session)?;

    let _: () = conn.set_ex(session_key(token), json, ttl_secs).await?;
    Ok(())
}

pub async fn get_session(
    conn: &mut ConnectionManager,
    token: &str,
) -> Result<Option<Session>, AppError> {
    let json: Option<String> = conn.get(session_key(token)).await?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}
