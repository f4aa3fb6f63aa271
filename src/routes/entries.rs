//! Voucher-entry CRUD, status toggles, the report query, and the two bulk
//! import endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthSession,
    database::{all_entries, get_branch, get_entry, put_entry},
    error::AppError,
    import::{ImportRow, coerce_batch, validate_batch},
    models::{self, VoucherEntry, VoucherStatus},
    report::{ReportPage, ReportParams, ReportQuery, run_report},
    reservation,
    reservation::{check_in_range, find_book},
    state::AppState,
};

/// The caller-editable fields of an entry. Client-supplied `netBalance` and
/// `status` are ignored and recomputed server-side.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryForm {
    pub voucher_book: String,
    pub voucher_no: String,
    #[serde(default)]
    pub invoice_no: Option<String>,
    #[serde(default)]
    pub voucher_given_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub dues: f64,
    #[serde(default, rename = "return")]
    pub return_amount: f64,
    #[serde(default)]
    pub discount_advance: f64,
    #[serde(default)]
    pub chq_cash_issued_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub amount_paid: f64,
    #[serde(default)]
    pub voucher_cleared_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl EntryForm {
    /// Applies the form onto an entry shell, recomputing the derived fields.
    fn fill(self, mut entry: VoucherEntry) -> VoucherEntry {
        entry.voucher_book = self.voucher_book;
        entry.voucher_no = self.voucher_no;
        entry.invoice_no = self.invoice_no;
        entry.voucher_given_date = self.voucher_given_date;
        entry.supplier = self.supplier;
        entry.amount = self.amount;
        entry.dues = self.dues;
        entry.return_amount = self.return_amount;
        entry.discount_advance = self.discount_advance;
        entry.net_balance = models::net_balance(
            self.amount,
            self.dues,
            self.return_amount,
            self.discount_advance,
        );
        entry.chq_cash_issued_date = self.chq_cash_issued_date;
        entry.amount_paid = self.amount_paid;
        entry.voucher_cleared_date = self.voucher_cleared_date;
        entry.remarks = self.remarks;
        entry.status = VoucherStatus::derived(entry.voucher_cleared_date.as_ref());

        entry
    }
}

pub async fn create(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(form): Json<EntryForm>,
) -> Result<Json<VoucherEntry>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let branch = get_branch(&mut conn, branch_id).await?;

    let book = find_book(&branch, &form.voucher_book)?;
    check_in_range(book, &form.voucher_no)?;
    let book_id = book.id;

    let shell = VoucherEntry {
        id: Uuid::new_v4(),
        branch_id,
        voucher_book: String::new(),
        voucher_no: String::new(),
        invoice_no: None,
        voucher_given_date: None,
        supplier: String::new(),
        amount: 0.0,
        dues: 0.0,
        return_amount: 0.0,
        discount_advance: 0.0,
        net_balance: 0.0,
        chq_cash_issued_date: None,
        amount_paid: 0.0,
        voucher_cleared_date: None,
        remarks: None,
        status: VoucherStatus::Pending,
        created_at: Utc::now(),
    };
    let entry = form.fill(shell);

    reservation::create_entry(&mut conn, book_id, &entry).await?;
    info!("recorded voucher {} in book {}", entry.voucher_no, entry.voucher_book);

    Ok(Json(entry))
}

pub async fn list(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<Json<ReportPage>, AppError> {
    let branch_id = auth.branch_scope(params.branch_id)?;
    let query = ReportQuery::from_params(&params)?;

    let mut conn = state.redis.clone();
    get_branch(&mut conn, branch_id).await?;
    let entries = all_entries(&mut conn, branch_id).await?;

    Ok(Json(run_report(entries, &query)))
}

pub async fn get_one(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoucherEntry>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let entry = get_entry(&mut conn, branch_id, id).await?;

    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub form: EntryForm,
}

/// Edit, including a possible move to another book/number slot. The slot
/// move and the rewrite are one atomic step; an in-place edit (same book and
/// number) never touches the registry.
pub async fn update(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(request): Json<EditEntry>,
) -> Result<Json<VoucherEntry>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let branch = get_branch(&mut conn, branch_id).await?;
    let existing = get_entry(&mut conn, branch_id, request.id).await?;

    let new_book = find_book(&branch, &request.form.voucher_book)?;
    check_in_range(new_book, &request.form.voucher_no)?;
    let new_book_id = new_book.id;

    // The old claim may have no registry left if its book was deleted.
    let old_book_id = find_book(&branch, &existing.voucher_book)
        .ok()
        .map(|book| book.id);
    let old_number = existing.voucher_no.clone();

    let was_cancelled = existing.status == VoucherStatus::Cancel;
    let mut entry = request.form.fill(existing);
    if was_cancelled {
        entry.status = VoucherStatus::Cancel;
    }

    reservation::move_entry(&mut conn, old_book_id, &old_number, new_book_id, &entry).await?;

    Ok(Json(entry))
}

pub async fn delete(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let branch = get_branch(&mut conn, branch_id).await?;
    let entry = get_entry(&mut conn, branch_id, id).await?;

    let book_id = find_book(&branch, &entry.voucher_book).ok().map(|book| book.id);
    reservation::delete_entry(&mut conn, book_id, &entry).await?;

    info!("deleted voucher {} in book {}", entry.voucher_no, entry.voucher_book);

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Flips an entry in and out of `cancel`; leaving `cancel` lands back on the
/// status its clearing date implies.
pub async fn toggle_cancel(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoucherEntry>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let mut entry = get_entry(&mut conn, branch_id, id).await?;

    entry.status = if entry.status == VoucherStatus::Cancel {
        VoucherStatus::derived(entry.voucher_cleared_date.as_ref())
    } else {
        VoucherStatus::Cancel
    };

    put_entry(&mut conn, &entry).await?;

    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidToggle {
    pub id: Uuid,
    #[serde(default)]
    pub amount_paid: Option<f64>,
}

/// Marks an entry paid (clearing date now, paid amount defaulting to the net
/// balance) or reverts it to unpaid when it already carries a clearing date.
/// Cancelled entries keep their cancel status either way.
pub async fn toggle_paid(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(request): Json<PaidToggle>,
) -> Result<Json<VoucherEntry>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let mut entry = get_entry(&mut conn, branch_id, request.id).await?;

    if entry.voucher_cleared_date.is_some() {
        entry.voucher_cleared_date = None;
        entry.amount_paid = 0.0;
    } else {
        entry.voucher_cleared_date = Some(Utc::now());
        entry.amount_paid = request.amount_paid.unwrap_or(entry.net_balance);
    }

    if entry.status != VoucherStatus::Cancel {
        entry.status = VoucherStatus::derived(entry.voucher_cleared_date.as_ref());
    }

    put_entry(&mut conn, &entry).await?;

    Ok(Json(entry))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub imported: usize,
}

/// Strict import: the whole batch is validated, then reserved and inserted
/// as one unit. One bad row and nothing persists.
pub async fn import_strict(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(rows): Json<Vec<ImportRow>>,
) -> Result<Json<ImportResult>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let branch = get_branch(&mut conn, branch_id).await?;

    let prepared = validate_batch(&branch, &rows)?;
    let imported = prepared.len();

    reservation::bulk_create(&mut conn, branch_id, &prepared).await?;
    info!("imported {imported} vouchers into branch {}", branch.branch_name);

    Ok(Json(ImportResult {
        success: true,
        imported,
    }))
}

/// Permissive import: rows are coerced and inserted as-is; registry adds are
/// best-effort and nothing is checked against existing reservations.
pub async fn import_simple(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(rows): Json<Vec<ImportRow>>,
) -> Result<Json<ImportResult>, AppError> {
    let branch_id = auth.require_branch()?;

    let mut conn = state.redis.clone();
    let branch = get_branch(&mut conn, branch_id).await?;

    let prepared = coerce_batch(&branch, &rows);
    let imported = prepared.len();

    if !prepared.is_empty() {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for (book_id, entry) in &prepared {
            pipe.hset(
                crate::database::entries_key(branch_id),
                entry.id.to_string(),
                serde_json::to_string(entry)?,
            )
            .ignore();

            if let Some(book_id) = book_id {
                pipe.sadd(
                    crate::database::used_key(branch_id, *book_id),
                    &entry.voucher_no,
                )
                .ignore();
            }
        }

        let _: () = pipe.query_async(&mut conn).await?;
    }

    info!("imported {imported} vouchers (permissive) into branch {}", branch.branch_name);

    Ok(Json(ImportResult {
        success: true,
        imported,
    }))
}
