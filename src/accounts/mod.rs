//! Account lookups against the relational store.
//!
//! The authentication core treats accounts as an external collaborator: a few
//! narrow queries plus a password update. Claims embedded in tokens are never
//! trusted for role or active status; callers re-fetch the row here.

use anyhow::{Context, Result};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use utoipa::ToSchema;

/// Account roles, ordered by privilege for the staff hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Student,
    Faculty,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Student => "student",
            Self::Faculty => "faculty",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "staff" => Some(Self::Staff),
            "student" => Some(Self::Student),
            "faculty" => Some(Self::Faculty),
            _ => None,
        }
    }

    /// Role hierarchy: `admin` satisfies every requirement, `staff` satisfies
    /// `staff`; students and faculty never satisfy a staff requirement.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        match required {
            Self::Admin => matches!(self, Self::Admin),
            Self::Staff => matches!(self, Self::Admin | Self::Staff),
            Self::Student => matches!(self, Self::Student),
            Self::Faculty => matches!(self, Self::Faculty),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub password_hash: String,
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Result<Account> {
    let role: String = row.get("role");
    let role = Role::parse(&role).with_context(|| format!("unknown account role: {role}"))?;
    Ok(Account {
        id: row.get("id"),
        name: row.get("name"),
        username: row.get("username"),
        email: row.get("email"),
        role,
        is_active: row.get("is_active"),
        password_hash: row.get("password_hash"),
    })
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Account>> {
    let query = r"
        SELECT id, name, username, email, role, is_active, password_hash
        FROM accounts
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch account by id")?;
    row.as_ref().map(account_from_row).transpose()
}

/// Look up by username first, then by lowercased email.
pub async fn find_by_username_or_email(pool: &PgPool, identifier: &str) -> Result<Option<Account>> {
    let query = r"
        SELECT id, name, username, email, role, is_active, password_hash
        FROM accounts
        WHERE username = $1 OR email = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identifier)
        .bind(identifier.to_lowercase())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch account by username or email")?;
    row.as_ref().map(account_from_row).transpose()
}

pub async fn update_password(pool: &PgPool, id: i64, password_hash: &str) -> Result<bool> {
    let query = r"
        UPDATE accounts
        SET password_hash = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update account password")?;
    Ok(result.rows_affected() > 0)
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. An unparseable hash counts as a
/// mismatch rather than an error so a corrupt row cannot lock up login.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn comparable time when no account matched, so response timing does not
/// reveal whether a username exists.
pub fn burn_password_verification(password: &str) {
    let salt = SaltString::generate(&mut OsRng);
    let _ = Argon2::default().hash_password(password.as_bytes(), &salt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Admin, Role::Staff, Role::Student, Role::Faculty] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("librarian"), None);
    }

    #[test]
    fn role_hierarchy() {
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::Admin.satisfies(Role::Staff));
        assert!(Role::Staff.satisfies(Role::Staff));
        assert!(!Role::Staff.satisfies(Role::Admin));
        assert!(!Role::Student.satisfies(Role::Staff));
        assert!(!Role::Faculty.satisfies(Role::Admin));
    }

    #[test]
    fn password_hash_verifies() -> anyhow::Result<()> {
        let hash = hash_password("correct horse battery staple")?;
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
        Ok(())
    }

    #[test]
    fn unparseable_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn hashes_are_salted() -> anyhow::Result<()> {
        let first = hash_password("password")?;
        let second = hash_password("password")?;
        assert_ne!(first, second);
        Ok(())
    }
}
