//! Credential hashing and bearer-token sessions.
//!
//! Passwords are stored as iterated salted SHA-256 (random 16-byte salt per
//! record, hex-encoded) and verified with a constant-time comparison. Tokens
//! are opaque UUID v4 strings mapped to a [`Session`] in Redis with a TTL, so
//! revocation is just key expiry.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    database::get_session,
    error::AppError,
    models::{Admin, Role},
    state::AppState,
};

const HASH_ROUNDS: u32 = 10_000;

pub fn new_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    salt
}

/// Iterated `sha256(salt || material)`, hex-encoded.
pub fn hash_password(password: &str, salt: &[u8]) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize();

    for _ in 1..HASH_ROUNDS {
        digest = Sha256::new().chain_update(salt).chain_update(digest).finalize();
    }

    hex(digest.as_slice())
}

/// (hash, salt) pair for a fresh credential, both hex-encoded.
pub fn make_credentials(password: &str) -> (String, String) {
    let salt = new_salt();

    (hash_password(password, &salt), hex(&salt))
}

pub fn make_admin(username: &str, password: &str) -> Admin {
    let (password_hash, password_salt) = make_credentials(password);

    Admin {
        username: username.to_string(),
        password_hash,
        password_salt,
    }
}

pub fn verify_password(password: &str, salt_hex: &str, hash_hex: &str) -> bool {
    let Some(salt) = unhex(salt_hex) else {
        return false;
    };

    let candidate = hash_password(password, &salt);

    constant_time_eq(candidate.as_bytes(), hash_hex.as_bytes())
}

pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Inspects every byte regardless of where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }

    diff == 0
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if !s.is_ascii() || s.len() % 2 != 0 {
        return None;
    }

    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// The authenticated caller, resolved from the `Authorization: Bearer` header
/// against the session store.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

impl AuthSession {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }

    /// The branch a branch token is bound to.
    pub fn require_branch(&self) -> Result<Uuid, AppError> {
        match (self.role, self.branch_id) {
            (Role::Branch, Some(id)) => Ok(id),
            _ => Err(AppError::Unauthorized),
        }
    }

    /// Which branch a read is scoped to: branch tokens always their own,
    /// admins whichever `branchId` they named.
    pub fn branch_scope(&self, requested: Option<Uuid>) -> Result<Uuid, AppError> {
        match self.role {
            Role::Branch => self.branch_id.ok_or(AppError::Unauthorized),
            Role::Admin => requested
                .ok_or_else(|| AppError::Validation("branchId is required".to_string())),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;

        let mut conn = state.redis.clone();
        let session = get_session(&mut conn, token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthSession {
            role: session.role,
            branch_id: session.branch_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_round_trip() {
        let (hash, salt) = make_credentials("hunter2");

        assert!(verify_password("hunter2", &salt, &hash));
        assert!(!verify_password("hunter3", &salt, &hash));
        assert!(!verify_password("", &salt, &hash));
    }

    #[test]
    fn test_salts_differ() {
        let (hash_a, salt_a) = make_credentials("same");
        let (hash_b, salt_b) = make_credentials("same");

        assert_ne!(salt_a, salt_b);
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_hex_round_trip() {
        let bytes = [0x00, 0x0f, 0xff, 0x42];

        assert_eq!(hex(&bytes), "000fff42");
        assert_eq!(unhex("000fff42"), Some(bytes.to_vec()));
        assert_eq!(unhex("xyz"), None);
        assert_eq!(unhex("abc"), None);
    }

    #[test]
    fn test_verify_rejects_bad_salt() {
        assert!(!verify_password("pw", "not-hex", "deadbeef"));
    }
}
