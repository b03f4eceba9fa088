use sqlx::PgPool;

use crate::models::JobLock;

pub struct JobLockRepository;

impl JobLockRepository {
    /// Acquire the named job lock, reclaiming a stale one held past
    /// `reclaim_after`. Returns `true` if the caller now holds the lock.
    pub async fn try_acquire(
        pool: &PgPool,
        job_name: &str,
        holder: &str,
        reclaim_after: chrono::Duration,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_locks (job_name, locked_at, locked_by)
            VALUES ($1, NOW(), $2)
            ON CONFLICT (job_name) DO UPDATE SET locked_at = NOW(), locked_by = $2
            WHERE job_locks.locked_at < NOW() - $3::interval
            "#,
        )
        .bind(job_name)
        .bind(holder)
        .bind(reclaim_after)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn release(pool: &PgPool, job_name: &str, holder: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM job_locks WHERE job_name = $1 AND locked_by = $2")
            .bind(job_name)
            .bind(holder)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn find(pool: &PgPool, job_name: &str) -> Result<Option<JobLock>, sqlx::Error> {
        sqlx::query_as::<_, JobLock>("SELECT * FROM job_locks WHERE job_name = $1")
            .bind(job_name)
            .fetch_optional(pool)
            .await
    }
}
