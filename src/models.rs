//! Record types stored in Redis and their wire representations.
//!
//! Three collections:
//! - `admin`: single credential record
//! - `branches` hash: branch id -> [`Branch`] JSON
//! - `entries:{branchId}` hash: entry id -> [`VoucherEntry`] JSON
//!
//! Voucher-number registries live outside the branch JSON as one Redis set
//! per book (`used:{branchId}:{bookId}`) so reservations can use the
//! server-side set primitives. Reads reassemble `usedVouchers` onto
//! [`BranchView`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Branch,
}

/// The single privileged credential pair, seeded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
}

/// A named numeric range of voucher numbers belonging to a branch.
///
/// The `id` is immutable and is what edit/delete requests address, so
/// concurrent list reordering cannot shift which book an edit lands on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherBook {
    pub id: Uuid,
    pub name: String,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
}

/// A tenant unit: credentials, voucher books, supplier list, UI preferences.
///
/// This is the stored shape. Password fields never leave the server; API
/// responses go through [`BranchView`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
    pub branch_name: String,
    #[serde(default)]
    pub vouchers: Vec<VoucherBook>,
    #[serde(default)]
    pub suppliers: Vec<Supplier>,
    #[serde(default)]
    pub column_visibility: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherBookView {
    #[serde(flatten)]
    pub book: VoucherBook,
    pub used_vouchers: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchView {
    pub id: Uuid,
    pub username: String,
    pub branch_name: String,
    pub vouchers: Vec<VoucherBookView>,
    pub suppliers: Vec<Supplier>,
    pub column_visibility: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Pending,
    Active,
    Cancel,
}

impl VoucherStatus {
    /// `active` once a clearing date exists, `pending` until then.
    pub fn derived(cleared: Option<&DateTime<Utc>>) -> Self {
        if cleared.is_some() {
            VoucherStatus::Active
        } else {
            VoucherStatus::Pending
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(VoucherStatus::Pending),
            "active" => Some(VoucherStatus::Active),
            "cancel" => Some(VoucherStatus::Cancel),
            _ => None,
        }
    }
}

/// One recorded transaction against a voucher number in a voucher book.
///
/// `voucherBook` holds the book *name*, not a reference; `voucherNo` is kept
/// as the decimal-string token the caller supplied ("007" and "7" are
/// distinct tokens in the registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherEntry {
    pub id: Uuid,
    pub branch_id: Uuid,
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
    pub net_balance: f64,
    #[serde(default)]
    pub chq_cash_issued_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub amount_paid: f64,
    #[serde(default)]
    pub voucher_cleared_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remarks: Option<String>,
    pub status: VoucherStatus,
    pub created_at: DateTime<Utc>,
}

/// Always recomputed server-side; client-supplied values are ignored.
pub fn net_balance(amount: f64, dues: f64, return_amount: f64, discount_advance: f64) -> f64 {
    amount - dues - return_amount - discount_advance
}

/// The session blob behind a bearer token (`session:{token}` with TTL).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<Uuid>,
}
