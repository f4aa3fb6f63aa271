//! # Report queries
//!
//! Filtered, sorted, paginated views over one branch's voucher entries plus
//! aggregate sums over the same filter. Entries are fetched as a whole (the
//! dataset is one back-office branch's rows) and shaped in process; absent
//! filters pass everything through.

use std::cmp::Ordering;

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{VoucherEntry, VoucherStatus},
};

pub const MAX_PAGE_SIZE: usize = 500;
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Raw query-string parameters, exactly as the client sent them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportParams {
    pub branch_id: Option<Uuid>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub voucher_no: Option<String>,
    pub supplier: Option<String>,
    pub status: Option<String>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub given_from: Option<String>,
    pub given_to: Option<String>,
    pub cleared_from: Option<String>,
    pub cleared_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    VoucherNo,
    InvoiceNo,
    Supplier,
    Amount,
    NetBalance,
    VoucherGivenDate,
    VoucherClearedDate,
    Status,
}

impl SortField {
    /// Allow-listed wire names; anything else is rejected at the boundary.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "createdAt" => Ok(SortField::CreatedAt),
            "voucherNo" => Ok(SortField::VoucherNo),
            "invoiceNo" => Ok(SortField::InvoiceNo),
            "supplier" => Ok(SortField::Supplier),
            "amount" => Ok(SortField::Amount),
            "netBalance" => Ok(SortField::NetBalance),
            "voucherGivenDate" => Ok(SortField::VoucherGivenDate),
            "voucherClearedDate" => Ok(SortField::VoucherClearedDate),
            "status" => Ok(SortField::Status),
            other => Err(AppError::Validation(format!(
                "Cannot sort by {other:?}"
            ))),
        }
    }
}

/// An inclusive date window. A missing bound is unconstrained; an entry
/// without the date only matches a fully open window.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateWindow {
    fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    fn contains(&self, value: Option<&DateTime<Utc>>) -> bool {
        if self.is_open() {
            return true;
        }

        let Some(value) = value else {
            return false;
        };

        if let Some(from) = self.from {
            if *value < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if *value > to {
                return false;
            }
        }

        true
    }
}

/// Validated form of [`ReportParams`].
#[derive(Debug)]
pub struct ReportQuery {
    pub page: usize,
    pub page_size: usize,
    pub sort: SortField,
    pub descending: bool,
    pub voucher_no: Option<String>,
    pub supplier: Option<String>,
    pub status: Option<VoucherStatus>,
    pub created: DateWindow,
    pub given: DateWindow,
    pub cleared: DateWindow,
}

impl ReportQuery {
    pub fn from_params(params: &ReportParams) -> Result<Self, AppError> {
        let page = params.page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }

        let page_size = params
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let sort = match params.sort_by.as_deref() {
            Some(field) => SortField::parse(field)?,
            None => SortField::CreatedAt,
        };

        let descending = match params.sort_dir.as_deref() {
            None => true,
            Some("desc") => true,
            Some("asc") => false,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "sortDir must be asc or desc, got {other:?}"
                )));
            }
        };

        let status = match params.status.as_deref() {
            None => None,
            Some(value) => Some(VoucherStatus::parse(value).ok_or_else(|| {
                AppError::Validation(format!("Unknown status {value:?}"))
            })?),
        };

        Ok(Self {
            page,
            page_size,
            sort,
            descending,
            voucher_no: params.voucher_no.as_deref().map(str::to_lowercase),
            supplier: params.supplier.as_deref().map(str::to_lowercase),
            status,
            created: window(params.created_from.as_deref(), params.created_to.as_deref())?,
            given: window(params.given_from.as_deref(), params.given_to.as_deref())?,
            cleared: window(params.cleared_from.as_deref(), params.cleared_to.as_deref())?,
        })
    }
}

fn parse_day(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date {value:?}, expected YYYY-MM-DD")))
}

fn window(from: Option<&str>, to: Option<&str>) -> Result<DateWindow, AppError> {
    let from = match from {
        Some(value) => Some(parse_day(value)?.and_time(NaiveTime::MIN).and_utc()),
        None => None,
    };

    // The upper bound is a whole day: advance to the next midnight minus 1ms.
    let to = match to {
        Some(value) => {
            let day = parse_day(value)?;
            let next = day
                .checked_add_days(Days::new(1))
                .ok_or_else(|| AppError::Validation(format!("Date {value:?} is out of range")))?;
            Some(next.and_time(NaiveTime::MIN).and_utc() - Duration::milliseconds(1))
        }
        None => None,
    };

    Ok(DateWindow { from, to })
}

fn matches(entry: &VoucherEntry, query: &ReportQuery) -> bool {
    if let Some(needle) = &query.voucher_no {
        if !entry.voucher_no.to_lowercase().contains(needle) {
            return false;
        }
    }

    if let Some(needle) = &query.supplier {
        if !entry.supplier.to_lowercase().contains(needle) {
            return false;
        }
    }

    if let Some(status) = query.status {
        if entry.status != status {
            return false;
        }
    }

    query.created.contains(Some(&entry.created_at))
        && query.given.contains(entry.voucher_given_date.as_ref())
        && query.cleared.contains(entry.voucher_cleared_date.as_ref())
}

fn compare(a: &VoucherEntry, b: &VoucherEntry, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::VoucherNo => a.voucher_no.cmp(&b.voucher_no),
        SortField::InvoiceNo => a.invoice_no.cmp(&b.invoice_no),
        SortField::Supplier => a.supplier.cmp(&b.supplier),
        SortField::Amount => a.amount.total_cmp(&b.amount),
        SortField::NetBalance => a.net_balance.total_cmp(&b.net_balance),
        SortField::VoucherGivenDate => a.voucher_given_date.cmp(&b.voucher_given_date),
        SortField::VoucherClearedDate => a.voucher_cleared_date.cmp(&b.voucher_cleared_date),
        SortField::Status => a.status.cmp(&b.status),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    pub entries: Vec<VoucherEntry>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_amount: f64,
    pub total_net_balance: f64,
}

/// Filters, sums, sorts, and pages in that order; the sums cover the whole
/// filtered set, not just the returned page.
pub fn run_report(entries: Vec<VoucherEntry>, query: &ReportQuery) -> ReportPage {
    let mut filtered: Vec<VoucherEntry> = entries
        .into_iter()
        .filter(|entry| matches(entry, query))
        .collect();

    let total = filtered.len();
    let total_amount = filtered.iter().map(|entry| entry.amount).sum();
    let total_net_balance = filtered.iter().map(|entry| entry.net_balance).sum();

    filtered.sort_by(|a, b| {
        let ordering = compare(a, b, query.sort);
        if query.descending { ordering.reverse() } else { ordering }
    });

    let entries: Vec<VoucherEntry> = filtered
        .into_iter()
        .skip((query.page - 1).saturating_mul(query.page_size))
        .take(query.page_size)
        .collect();

    ReportPage {
        entries,
        page: query.page,
        page_size: query.page_size,
        total,
        total_amount,
        total_net_balance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(no: &str, supplier: &str, status: VoucherStatus) -> VoucherEntry {
        VoucherEntry {
            id: Uuid::new_v4(),
            branch_id: Uuid::nil(),
            voucher_book: "A".into(),
            voucher_no: no.into(),
            invoice_no: None,
            voucher_given_date: None,
            supplier: supplier.into(),
            amount: 100.0,
            dues: 0.0,
            return_amount: 0.0,
            discount_advance: 0.0,
            net_balance: 100.0,
            chq_cash_issued_date: None,
            amount_paid: 0.0,
            voucher_cleared_date: None,
            remarks: None,
            status,
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    fn query(params: ReportParams) -> ReportQuery {
        ReportQuery::from_params(&params).unwrap()
    }

    #[test]
    fn test_no_filters_passes_everything() {
        let entries = vec![
            entry("1", "Acme", VoucherStatus::Pending),
            entry("2", "Globex", VoucherStatus::Active),
        ];

        let page = run_report(entries, &query(ReportParams::default()));
        assert_eq!(page.total, 2);
        assert_eq!(page.total_amount, 200.0);
        assert_eq!(page.total_net_balance, 200.0);
    }

    #[test]
    fn test_substring_filters_case_insensitive() {
        let entries = vec![
            entry("1001", "Acme Traders", VoucherStatus::Pending),
            entry("2002", "Globex", VoucherStatus::Pending),
        ];

        let q = query(ReportParams {
            supplier: Some("ACME".into()),
            ..Default::default()
        });
        let page = run_report(entries.clone(), &q);
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].supplier, "Acme Traders");

        let q = query(ReportParams {
            voucher_no: Some("00".into()),
            ..Default::default()
        });
        assert_eq!(run_report(entries, &q).total, 2);
    }

    #[test]
    fn test_status_filter_exact() {
        let entries = vec![
            entry("1", "Acme", VoucherStatus::Pending),
            entry("2", "Acme", VoucherStatus::Active),
            entry("3", "Acme", VoucherStatus::Cancel),
        ];

        let q = query(ReportParams {
            status: Some("pending".into()),
            ..Default::default()
        });
        let page = run_report(entries, &q);
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].voucher_no, "1");
    }

    #[test]
    fn test_created_window_end_of_day() {
        let mut late = entry("1", "Acme", VoucherStatus::Pending);
        late.created_at = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 0).unwrap();

        let mut next_month = entry("2", "Acme", VoucherStatus::Pending);
        next_month.created_at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let q = query(ReportParams {
            created_from: Some("2024-01-01".into()),
            created_to: Some("2024-01-31".into()),
            ..Default::default()
        });

        let page = run_report(vec![late, next_month], &q);
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].voucher_no, "1");
    }

    #[test]
    fn test_date_window_excludes_missing_dates() {
        let mut cleared = entry("1", "Acme", VoucherStatus::Active);
        cleared.voucher_cleared_date = Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap());
        let uncleared = entry("2", "Acme", VoucherStatus::Pending);

        let q = query(ReportParams {
            cleared_from: Some("2024-03-01".into()),
            cleared_to: Some("2024-03-31".into()),
            ..Default::default()
        });

        let page = run_report(vec![cleared, uncleared], &q);
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].voucher_no, "1");
    }

    #[test]
    fn test_default_sort_is_created_desc() {
        let mut older = entry("old", "Acme", VoucherStatus::Pending);
        older.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newer = entry("new", "Acme", VoucherStatus::Pending);
        newer.created_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let page = run_report(vec![older, newer], &query(ReportParams::default()));
        assert_eq!(page.entries[0].voucher_no, "new");
    }

    #[test]
    fn test_sort_by_amount_asc() {
        let mut small = entry("1", "Acme", VoucherStatus::Pending);
        small.amount = 10.0;
        let mut big = entry("2", "Acme", VoucherStatus::Pending);
        big.amount = 500.0;

        let q = query(ReportParams {
            sort_by: Some("amount".into()),
            sort_dir: Some("asc".into()),
            ..Default::default()
        });

        let page = run_report(vec![big, small], &q);
        assert_eq!(page.entries[0].voucher_no, "1");
    }

    #[test]
    fn test_sort_field_allow_list() {
        let result = ReportQuery::from_params(&ReportParams {
            sort_by: Some("passwordHash".into()),
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_bad_sort_dir_rejected() {
        let result = ReportQuery::from_params(&ReportParams {
            sort_dir: Some("sideways".into()),
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_bad_status_rejected() {
        let result = ReportQuery::from_params(&ReportParams {
            status: Some("paid".into()),
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_bad_date_rejected() {
        let result = ReportQuery::from_params(&ReportParams {
            created_from: Some("01/15/2024".into()),
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_page_zero_rejected() {
        let result = ReportQuery::from_params(&ReportParams {
            page: Some(0),
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_page_size_capped() {
        let q = query(ReportParams {
            page_size: Some(100_000),
            ..Default::default()
        });

        assert_eq!(q.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_pagination_slices_but_sums_do_not() {
        let entries: Vec<VoucherEntry> = (0..7)
            .map(|i| {
                let mut e = entry(&i.to_string(), "Acme", VoucherStatus::Pending);
                e.created_at = Utc.with_ymd_and_hms(2024, 1, 1 + i, 0, 0, 0).unwrap();
                e
            })
            .collect();

        let q = query(ReportParams {
            page: Some(2),
            page_size: Some(3),
            sort_dir: Some("asc".into()),
            ..Default::default()
        });

        let page = run_report(entries, &q);
        assert_eq!(page.total, 7);
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0].voucher_no, "3");
        assert_eq!(page.total_amount, 700.0);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let entries = vec![entry("1", "Acme", VoucherStatus::Pending)];

        let q = query(ReportParams {
            page: Some(5),
            ..Default::default()
        });

        let page = run_report(entries, &q);
        assert_eq!(page.total, 1);
        assert!(page.entries.is_empty());
    }
}
