use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{AchievementReference, AchievementStats, AchievementStatus},
    response::Page,
};

/// Which reference rows a listing may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceScope {
    /// Every row (admin).
    All,
    /// Rows of one student profile.
    Student(Uuid),
    /// Rows of every student advised by this lecturer profile.
    Advisor(Uuid),
}

/// ReferenceStore
///
/// Accessor for `achievement_references`, the relational shadow of each achievement
/// document. Every status transition is a conditional write on the expected current
/// status; the returned `bool` says whether a row matched.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn create(&self, student_id: Uuid, achievement_id: &str)
    -> AppResult<AchievementReference>;
    async fn find_by_achievement(&self, achievement_id: &str)
    -> AppResult<Option<AchievementReference>>;
    async fn list(
        &self,
        scope: ReferenceScope,
        status: Option<AchievementStatus>,
        page: Page,
    ) -> AppResult<(Vec<AchievementReference>, i64)>;
    /// draft → submitted, stamping `submitted_at`.
    async fn mark_submitted(&self, achievement_id: &str) -> AppResult<bool>;
    /// submitted → verified, stamping `verified_at` and `verified_by`.
    async fn mark_verified(&self, achievement_id: &str, verifier: Uuid) -> AppResult<bool>;
    /// submitted → rejected with the reviewer's note.
    async fn mark_rejected(&self, achievement_id: &str, verifier: Uuid, note: &str)
    -> AppResult<bool>;
    /// Soft-deletes a draft row.
    async fn soft_delete(&self, achievement_id: &str) -> AppResult<bool>;
    async fn status_counts(&self, scope: ReferenceScope) -> AppResult<AchievementStats>;
}

/// ReferenceState
///
/// Shared handle to the reference accessor.
pub type ReferenceState = Arc<dyn ReferenceStore>;

const REFERENCE_COLUMNS: &str = "r.id, r.student_id, r.mongo_achievement_id, r.status, \
     r.submitted_at, r.verified_at, r.verified_by, r.rejection_note, r.is_deleted, \
     r.created_at, r.updated_at";

/// Appends the `FROM`/`WHERE` clauses shared by listing, counting and statistics.
fn push_scope(
    builder: &mut QueryBuilder<'_, Postgres>,
    scope: ReferenceScope,
    status: Option<AchievementStatus>,
) {
    builder.push(" FROM achievement_references r");
    if matches!(scope, ReferenceScope::Advisor(_)) {
        builder.push(" JOIN students s ON s.id = r.student_id");
    }
    builder.push(" WHERE r.is_deleted = false");
    match scope {
        ReferenceScope::All => {}
        ReferenceScope::Student(student_id) => {
            builder.push(" AND r.student_id = ");
            builder.push_bind(student_id);
        }
        ReferenceScope::Advisor(lecturer_id) => {
            builder.push(" AND s.advisor_id = ");
            builder.push_bind(lecturer_id);
        }
    }
    if let Some(status) = status {
        builder.push(" AND r.status = ");
        builder.push_bind(status);
    }
}

pub struct PostgresReferenceStore {
    pool: PgPool,
}

impl PostgresReferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceStore for PostgresReferenceStore {
    async fn create(
        &self,
        student_id: Uuid,
        achievement_id: &str,
    ) -> AppResult<AchievementReference> {
        let reference = sqlx::query_as::<_, AchievementReference>(
            r#"
            INSERT INTO achievement_references (id, student_id, mongo_achievement_id, status)
            VALUES ($1, $2, $3, 'draft')
            RETURNING id, student_id, mongo_achievement_id, status, submitted_at, verified_at,
                      verified_by, rejection_note, is_deleted, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(achievement_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(reference)
    }

    async fn find_by_achievement(
        &self,
        achievement_id: &str,
    ) -> AppResult<Option<AchievementReference>> {
        let query = format!(
            "SELECT {REFERENCE_COLUMNS} FROM achievement_references r \
             WHERE r.mongo_achievement_id = $1 AND r.is_deleted = false"
        );
        let reference = sqlx::query_as::<_, AchievementReference>(&query)
            .bind(achievement_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reference)
    }

    /// list
    ///
    /// Builds the scoped query with `QueryBuilder` so every filter value is bound, never
    /// interpolated. Newest first.
    async fn list(
        &self,
        scope: ReferenceScope,
        status: Option<AchievementStatus>,
        page: Page,
    ) -> AppResult<(Vec<AchievementReference>, i64)> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*)");
        push_scope(&mut count, scope, status);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {REFERENCE_COLUMNS}"));
        push_scope(&mut builder, scope, status);
        builder.push(" ORDER BY r.created_at DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());

        let references = builder
            .build_query_as::<AchievementReference>()
            .fetch_all(&self.pool)
            .await?;
        Ok((references, total))
    }

    async fn mark_submitted(&self, achievement_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE achievement_references \
             SET status = 'submitted', submitted_at = NOW(), updated_at = NOW() \
             WHERE mongo_achievement_id = $1 AND status = 'draft' AND is_deleted = false",
        )
        .bind(achievement_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_verified(&self, achievement_id: &str, verifier: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE achievement_references \
             SET status = 'verified', verified_at = NOW(), verified_by = $2, updated_at = NOW() \
             WHERE mongo_achievement_id = $1 AND status = 'submitted' AND is_deleted = false",
        )
        .bind(achievement_id)
        .bind(verifier)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_rejected(
        &self,
        achievement_id: &str,
        verifier: Uuid,
        note: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE achievement_references \
             SET status = 'rejected', rejection_note = $3, verified_at = NOW(), \
                 verified_by = $2, updated_at = NOW() \
             WHERE mongo_achievement_id = $1 AND status = 'submitted' AND is_deleted = false",
        )
        .bind(achievement_id)
        .bind(verifier)
        .bind(note)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, achievement_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE achievement_references SET is_deleted = true, updated_at = NOW() \
             WHERE mongo_achievement_id = $1 AND status = 'draft' AND is_deleted = false",
        )
        .bind(achievement_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn status_counts(&self, scope: ReferenceScope) -> AppResult<AchievementStats> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT r.status, COUNT(*)");
        push_scope(&mut builder, scope, None);
        builder.push(" GROUP BY r.status");

        let rows: Vec<(AchievementStatus, i64)> =
            builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(tally(rows))
    }
}

/// Folds `(status, count)` rows into the stats shape.
pub fn tally(rows: impl IntoIterator<Item = (AchievementStatus, i64)>) -> AchievementStats {
    let mut stats = AchievementStats::default();
    for (status, count) in rows {
        match status {
            AchievementStatus::Draft => stats.draft += count,
            AchievementStatus::Submitted => stats.submitted += count,
            AchievementStatus::Verified => stats.verified += count,
            AchievementStatus::Rejected => stats.rejected += count,
        }
        stats.total += count;
    }
    stats
}
