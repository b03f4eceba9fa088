use shared::UserId;
use sqlx::PgPool;

use crate::models::{CreateUser, UpdateUser, User};

pub struct UserRepository;

impl UserRepository {
    pub async fn create(pool: &PgPool, input: CreateUser) -> Result<User, sqlx::Error> {
        let id = UserId::new();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, main_calendar_id, timezone)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, main_calendar_id, timezone, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(&input.email)
        .bind(&input.main_calendar_id)
        .bind(&input.timezone)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: UserId) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, main_calendar_id, timezone, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, main_calendar_id, timezone, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Every user with a main calendar configured, the population the
    /// reconciler and periodic_sync job iterate over.
    pub async fn list_with_main_calendar(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, main_calendar_id, timezone, created_at, updated_at
            FROM users
            WHERE main_calendar_id IS NOT NULL
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: UserId,
        input: UpdateUser,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                main_calendar_id = COALESCE($2, main_calendar_id),
                timezone = COALESCE($3, timezone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, main_calendar_id, timezone, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(input.main_calendar_id.flatten())
        .bind(&input.timezone)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: UserId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
