//! # Bulk import
//!
//! Row shaping for the two import endpoints. Spreadsheet-shaped JSON is
//! loosely typed — amounts arrive as numbers or strings, dates as plain days
//! or full timestamps — so every field goes through explicit coercion before
//! anything touches storage:
//!
//! - amount-like fields default to 0 when missing or unparsable
//! - `netBalance` is recomputed, whatever the file said
//! - `status` derives from the presence of a clearing date
//! - voucher numbers are stringified the same way for every row
//!
//! Strict mode additionally requires each row to name a known book and carry
//! an in-range number, and rejects the whole batch on the first bad row.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{self, Branch, VoucherEntry, VoucherStatus},
    reservation::{check_in_range, find_book},
};

/// One candidate row as it appears in the uploaded file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    #[serde(default)]
    pub voucher_book: Option<String>,
    #[serde(default)]
    pub voucher_no: Option<Value>,
    #[serde(default)]
    pub invoice_no: Option<String>,
    #[serde(default)]
    pub voucher_given_date: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub dues: Option<Value>,
    #[serde(default, rename = "return")]
    pub return_amount: Option<Value>,
    #[serde(default)]
    pub discount_advance: Option<Value>,
    #[serde(default)]
    pub chq_cash_issued_date: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<Value>,
    #[serde(default)]
    pub voucher_cleared_date: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Numbers pass through, numeric strings parse, everything else is 0.
pub fn coerce_amount(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// The voucher-number cell stringified: integers lose no padding they never
/// had, strings keep theirs ("007" stays "007").
pub fn coerce_token(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts plain days and RFC 3339 timestamps; anything else is absent.
pub fn coerce_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(day) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(day.and_time(NaiveTime::MIN).and_utc());
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Shapes one row into an entry. The caller decides what `voucher_book` and
/// `voucher_no` must look like; this only fills and derives fields.
pub fn build_entry(branch_id: Uuid, row: &ImportRow, token: String) -> VoucherEntry {
    let amount = coerce_amount(row.amount.as_ref());
    let dues = coerce_amount(row.dues.as_ref());
    let return_amount = coerce_amount(row.return_amount.as_ref());
    let discount_advance = coerce_amount(row.discount_advance.as_ref());

    let voucher_cleared_date = coerce_date(row.voucher_cleared_date.as_deref());

    VoucherEntry {
        id: Uuid::new_v4(),
        branch_id,
        voucher_book: row.voucher_book.clone().unwrap_or_default(),
        voucher_no: token,
        invoice_no: row.invoice_no.clone(),
        voucher_given_date: coerce_date(row.voucher_given_date.as_deref()),
        supplier: row.supplier.clone().unwrap_or_default(),
        amount,
        dues,
        return_amount,
        discount_advance,
        net_balance: models::net_balance(amount, dues, return_amount, discount_advance),
        chq_cash_issued_date: coerce_date(row.chq_cash_issued_date.as_deref()),
        amount_paid: coerce_amount(row.amount_paid.as_ref()),
        status: VoucherStatus::derived(voucher_cleared_date.as_ref()),
        voucher_cleared_date,
        remarks: row.remarks.clone(),
        created_at: Utc::now(),
    }
}

/// Strict mode: every row must resolve to a known book and an in-range
/// number before anything is committed. Returns `(book id, entry)` pairs
/// ready for the all-or-nothing reservation script.
pub fn validate_batch(
    branch: &Branch,
    rows: &[ImportRow],
) -> Result<Vec<(Uuid, VoucherEntry)>, AppError> {
    let mut prepared = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let row_no = index + 1;

        let book_name = row
            .voucher_book
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::Validation(format!("Row {row_no}: missing voucher book")))?;

        let book = find_book(branch, book_name)
            .map_err(|_| AppError::Validation(format!("Row {row_no}: unknown voucher book {book_name:?}")))?;

        let token = coerce_token(row.voucher_no.as_ref())
            .ok_or_else(|| AppError::Validation(format!("Row {row_no}: missing voucher number")))?;

        check_in_range(book, &token)
            .map_err(|err| AppError::Validation(format!("Row {row_no}: {err}")))?;

        prepared.push((book.id, build_entry(branch.id, row, token)));
    }

    Ok(prepared)
}

/// Permissive mode: rows go in as-is after coercion. A row whose book
/// resolves and whose number cell is non-empty also gets a registry add; the
/// rest are inserted without one.
pub fn coerce_batch(branch: &Branch, rows: &[ImportRow]) -> Vec<(Option<Uuid>, VoucherEntry)> {
    rows.iter()
        .map(|row| {
            let token = coerce_token(row.voucher_no.as_ref());
            let book_id = match (&token, row.voucher_book.as_deref()) {
                (Some(_), Some(name)) => find_book(branch, name).ok().map(|book| book.id),
                _ => None,
            };

            (book_id, build_entry(branch.id, row, token.unwrap_or_default()))
        })
        .collect()
}
