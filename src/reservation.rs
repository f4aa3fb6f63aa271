//! # Voucher-number reservation
//!
//! Guarantees that at most one live entry holds a given
//! `(branch, book, voucherNo)`. The registry is a Redis set per book and the
//! reservation primitive is `SADD`'s add-if-absent semantics; the scripts
//! below pair the registry write with the entry write so neither can exist
//! without the other.
//!
//! Tokens are compared as the decimal strings callers supply: `"007"` and
//! `"7"` are distinct registry members even though both parse into the same
//! range position. The import path stringifies numbers consistently; manual
//! entry is taken verbatim.

use redis::{Script, aio::ConnectionManager};
use uuid::Uuid;

use crate::{
    database::{entries_key, used_key},
    error::AppError,
    models::{Branch, VoucherBook, VoucherEntry},
};

/// Reserve-and-create as one unit: nothing is written when the number is
/// already in the registry.
const CREATE_LUA: &str = r"
if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[2], ARGV[2], ARGV[3])
return 1
";

/// Slot move for the edit path: claim the new number, drop the old claim, and
/// rewrite the entry, all in one script so two concurrent edits cannot both
/// win the same number. ARGV[5] is '0' for an in-place edit (same book and
/// number), ARGV[6] is '0' when the old claim has no registry left to drop
/// (its book was deleted).
const MOVE_LUA: &str = r"
if ARGV[5] == '1' then
  if redis.call('SADD', KEYS[2], ARGV[2]) == 0 then
    return 0
  end
  if ARGV[6] == '1' then
    redis.call('SREM', KEYS[1], ARGV[1])
  end
end
redis.call('HSET', KEYS[3], ARGV[3], ARGV[4])
return 1
";

/// Strict bulk import: reserve every number, then insert every row. On the
/// first number already present, un-reserve everything added so far and
/// report the 1-based row; zero rows persist and zero numbers stay reserved.
/// KEYS[1] is the entries hash, KEYS[2..] one registry set per row; ARGV is
/// (number, entry id, entry json) per row.
const BULK_LUA: &str = r"
local rows = #KEYS - 1
for i = 1, rows do
  if redis.call('SADD', KEYS[i + 1], ARGV[i * 3 - 2]) == 0 then
    for j = 1, i - 1 do
      redis.call('SREM', KEYS[j + 1], ARGV[j * 3 - 2])
    end
    return i
  end
end
for i = 1, rows do
  redis.call('HSET', KEYS[1], ARGV[i * 3 - 1], ARGV[i * 3])
end
return 0
";

pub fn find_book<'a>(branch: &'a Branch, name: &str) -> Result<&'a VoucherBook, AppError> {
    branch
        .vouchers
        .iter()
        .find(|book| book.name == name)
        .ok_or(AppError::NotFound("Voucher book"))
}

/// A token must parse as an integer inside the book's inclusive range. The
/// token itself is not rewritten.
pub fn check_in_range(book: &VoucherBook, token: &str) -> Result<(), AppError> {
    let number: i64 = token.parse().map_err(|_| {
        AppError::Validation(format!("Voucher number {token:?} is not numeric"))
    })?;

    if number < book.start || number > book.end {
        return Err(AppError::Validation(format!(
            "Voucher number {token} is outside the range {}-{} of book {}",
            book.start, book.end, book.name
        )));
    }

    Ok(())
}

pub async fn create_entry(
    conn: &mut ConnectionManager,
    book_id: Uuid,
    entry: &VoucherEntry,
) -> Result<(), AppError> {
    let json = serde_json::to_string(entry)?;

    let reserved: i64 = Script::new(CREATE_LUA)
        .key(used_key(entry.branch_id, book_id))
        .key(entries_key(entry.branch_id))
        .arg(&entry.voucher_no)
        .arg(entry.id.to_string())
        .arg(json)
        .invoke_async(conn)
        .await?;

    if reserved == 0 {
        return Err(AppError::Conflict(format!(
            "Voucher number {} is already used",
            entry.voucher_no
        )));
    }

    Ok(())
}

/// Rewrites an edited entry, moving its registry claim when the book/number
/// slot changed. `old_book_id` is `None` when the previous book no longer
/// exists and there is no claim to drop.
pub async fn move_entry(
    conn: &mut ConnectionManager,
    old_book_id: Option<Uuid>,
    old_number: &str,
    new_book_id: Uuid,
    entry: &VoucherEntry,
) -> Result<(), AppError> {
    let json = serde_json::to_string(entry)?;

    let new_key = used_key(entry.branch_id, new_book_id);
    let old_key = old_book_id
        .map(|id| used_key(entry.branch_id, id))
        .unwrap_or_else(|| new_key.clone());

    let moved = old_book_id != Some(new_book_id) || old_number != entry.voucher_no;

    let reserved: i64 = Script::new(MOVE_LUA)
        .key(old_key)
        .key(&new_key)
        .key(entries_key(entry.branch_id))
        .arg(old_number)
        .arg(&entry.voucher_no)
        .arg(entry.id.to_string())
        .arg(json)
        .arg(if moved { "1" } else { "0" })
        .arg(if old_book_id.is_some() { "1" } else { "0" })
        .invoke_async(conn)
        .await?;

    if reserved == 0 {
        return Err(AppError::Conflict(format!(
            "Voucher number {} is already used",
            entry.voucher_no
        )));
    }

    Ok(())
}

/// Deletes an entry and releases its number. `book_id` is `None` when the
/// book was removed after the entry was recorded; the registry set went with
/// it, so only the entry itself is deleted.
pub async fn delete_entry(
    conn: &mut ConnectionManager,
    book_id: Option<Uuid>,
    entry: &VoucherEntry,
) -> Result<(), AppError> {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .hdel(entries_key(entry.branch_id), entry.id.to_string())
        .ignore();

    if let Some(book_id) = book_id {
        pipe.srem(used_key(entry.branch_id, book_id), &entry.voucher_no)
            .ignore();
    }

    let _: () = pipe.query_async(conn).await?;
    Ok(())
}

/// Strict-mode batch insert: all rows and all reservations, or nothing.
pub async fn bulk_create(
    conn: &mut ConnectionManager,
    branch_id: Uuid,
    rows: &[(Uuid, VoucherEntry)],
) -> Result<(), AppError> {
    if rows.is_empty() {
        return Ok(());
    }

    let script = Script::new(BULK_LUA);
    let mut invocation = script.key(entries_key(branch_id));

    for (book_id, _) in rows {
        invocation.key(used_key(branch_id, *book_id));
    }

    for (_, entry) in rows {
        invocation
            .arg(&entry.voucher_no)
            .arg(entry.id.to_string())
            .arg(serde_json::to_string(entry)?);
    }

    let failed_row: i64 = invocation.invoke_async(conn).await?;

    if failed_row > 0 {
        let (_, entry) = &rows[(failed_row - 1) as usize];
        return Err(AppError::Conflict(format!(
            "Row {}: voucher number {} is already used",
            failed_row, entry.voucher_no
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn branch_with_book(name: &str, start: i64, end: i64) -> Branch {
        Branch {
            id: Uuid::new_v4(),
            username: "b1".into(),
            password_hash: String::new(),
            password_salt: String::new(),
            branch_name: "Branch One".into(),
            vouchers: vec![VoucherBook {
                id: Uuid::new_v4(),
                name: name.into(),
                start,
                end,
            }],
            suppliers: Vec::new(),
            column_visibility: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_find_book() {
        let branch = branch_with_book("A", 1, 100);

        assert!(find_book(&branch, "A").is_ok());
        assert!(matches!(
            find_book(&branch, "B"),
            Err(AppError::NotFound("Voucher book"))
        ));
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let branch = branch_with_book("A", 10, 20);
        let book = &branch.vouchers[0];

        assert!(check_in_range(book, "10").is_ok());
        assert!(check_in_range(book, "20").is_ok());
        assert!(matches!(
            check_in_range(book, "9"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            check_in_range(book, "21"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_padded_token_is_in_range() {
        // "007" passes the range check while staying a distinct token.
        let branch = branch_with_book("A", 1, 10);
        let book = &branch.vouchers[0];

        assert!(check_in_range(book, "007").is_ok());
        assert!(check_in_range(book, "7").is_ok());
    }

    #[test]
    fn test_non_numeric_token() {
        let branch = branch_with_book("A", 1, 10);
        let book = &branch.vouchers[0];

        assert!(matches!(
            check_in_range(book, "abc"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            check_in_range(book, " 7"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            check_in_range(book, ""),
            Err(AppError::Validation(_))
        ));
    }
}
