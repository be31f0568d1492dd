//! Postgres-backed identity store.
//!
//! The `users_pkey` unique constraint is the arbiter for allocation races:
//! if two signups compute the same identifier, the loser's insert fails with
//! SQLSTATE 23505 and is retried once with a fresh allocation. A violation
//! of `users_email_key` is a genuine conflict and is never retried.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::error::IdentityError;
use super::store::IdentityStore;
use super::user::{NewUser, User, UserId};

const EMAIL_CONSTRAINT: &str = "users_email_key";

const SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        password_hash TEXT NOT NULL,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        phone TEXT
    )
";

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `users` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), IdentityError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "CREATE",
            db.statement = SCHEMA_SQL
        );
        sqlx::query(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to create users table")?;
        Ok(())
    }

    async fn max_allocated_suffix<'e, E>(executor: E) -> Result<u32>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        // Matches only well-formed identifiers; stray rows cannot poison the
        // sequence.
        let query = r"
            SELECT COALESCE(MAX(CAST(SUBSTRING(user_id FROM 2) AS BIGINT)), 0) AS max_suffix
            FROM users
            WHERE user_id ~ '^P[0-9]+$'
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(executor)
            .instrument(span)
            .await
            .context("failed to read max allocated user id")?;
        let max: i64 = row.get("max_suffix");
        u32::try_from(max).context("allocated user id suffix out of range")
    }

    async fn try_insert(&self, user: &User) -> Result<InsertOutcome, IdentityError> {
        let query = r"
            INSERT INTO users (user_id, password_hash, name, email, phone)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user.user_id.to_string())
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) => match unique_violation_constraint(&err) {
                Some(constraint) if constraint == EMAIL_CONSTRAINT => {
                    Err(IdentityError::Conflict(format!(
                        "email {} already registered",
                        user.email
                    )))
                }
                Some(_) => Ok(InsertOutcome::IdTaken),
                None => Err(anyhow::Error::from(err)
                    .context("failed to insert user")
                    .into()),
            },
        }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, IdentityError> {
        let raw_id: String = row.get("user_id");
        let user_id: UserId = raw_id.parse()?;
        Ok(User {
            user_id,
            password_hash: row.get("password_hash"),
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
        })
    }
}

enum InsertOutcome {
    Inserted,
    IdTaken,
}

fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn allocate_next_id(&self) -> Result<UserId, IdentityError> {
        let max = Self::max_allocated_suffix(&self.pool).await?;
        Ok(UserId::from_suffix(max).next())
    }

    async fn insert_user(&self, user: User) -> Result<User, IdentityError> {
        match self.try_insert(&user).await? {
            InsertOutcome::Inserted => Ok(user),
            InsertOutcome::IdTaken => Err(IdentityError::Conflict(format!(
                "user id {} already exists",
                user.user_id
            ))),
        }
    }

    async fn create_user(&self, profile: NewUser) -> Result<User, IdentityError> {
        // One bounded retry: a concurrent signup may win the allocated
        // identifier between the scan and the insert.
        for _ in 0..2 {
            let user_id = self.allocate_next_id().await?;
            let candidate = profile.clone().with_id(user_id);
            match self.try_insert(&candidate).await? {
                InsertOutcome::Inserted => return Ok(candidate),
                InsertOutcome::IdTaken => continue,
            }
        }
        Err(IdentityError::Conflict(
            "lost user id allocation race twice".to_string(),
        ))
    }

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<User>, IdentityError> {
        let query = r"
            SELECT user_id, password_hash, name, email, phone
            FROM users
            WHERE user_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by id")?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError> {
        let query = r"
            SELECT user_id, password_hash, name, email, phone
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by email")?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn update_password_hash(
        &self,
        user_id: &UserId,
        password_hash: &str,
    ) -> Result<(), IdentityError> {
        let query = "UPDATE users SET password_hash = $1 WHERE user_id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(password_hash)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_extracts_constraint() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
            constraint: Some("users_email_key"),
        }));
        assert_eq!(
            unique_violation_constraint(&err).as_deref(),
            Some("users_email_key")
        );

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
            constraint: None,
        }));
        assert_eq!(unique_violation_constraint(&err), None);

        assert_eq!(unique_violation_constraint(&sqlx::Error::RowNotFound), None);
    }
}
