//! src/database/session.rs
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// Strongly typed convenience layer over a connection pool.
///
/// The session does not build SQL; it takes prepared `query_as` values and
/// keeps the fetch/execute/transaction plumbing in one place:
///
/// ```no_run
/// # #[derive(sqlx::FromRow)]
/// # struct User { user_id: uuid::Uuid, username: String }
/// # async fn example(session: plinth::database::Session) -> Result<(), sqlx::Error> {
/// let user: Option<User> = session
///     .find(sqlx::query_as("SELECT * FROM users WHERE username = $1").bind("ursula"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    pool: PgPool,
}

impl Session {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The first matching row, or `None` when nothing matches.
    pub async fn find<'q, T>(
        &self,
        query: QueryAs<'q, Postgres, T, PgArguments>,
    ) -> Result<Option<T>, sqlx::Error>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        query.fetch_optional(&self.pool).await
    }

    /// Exactly one matching row; anything else is an error.
    pub async fn one<'q, T>(
        &self,
        query: QueryAs<'q, Postgres, T, PgArguments>,
    ) -> Result<T, sqlx::Error>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        query.fetch_one(&self.pool).await
    }

    /// Every matching row.
    pub async fn all<'q, T>(
        &self,
        query: QueryAs<'q, Postgres, T, PgArguments>,
    ) -> Result<Vec<T>, sqlx::Error>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        query.fetch_all(&self.pool).await
    }

    /// Run a statement and report how many rows it touched. Covers inserts,
    /// updates, and deletes alike.
    pub async fn execute<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<u64, sqlx::Error> {
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    /// Open an explicit transaction. Dropping the guard without committing
    /// rolls it back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }
}
