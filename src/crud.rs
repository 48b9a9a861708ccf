use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{query_as, types::Json, Pool, Postgres};
use uuid::Uuid;

use crate::{
    catalog::{CategoryId, Hint, Question, QuestionCatalog, QuestionId},
    error::MatchError,
    game::Match,
    model::{MatchModel, QuestionModel},
    repository::{MatchFilter, MatchRepository},
    scoring::Level,
};

const MATCH_COLUMNS: &str = r#"
    id, owner_id, status, selected_categories, teams, timer_seconds,
    usage, rounds, summary, finished_at, version, created_at, updated_at
"#;

pub async fn crud_get_matches(
    db: &Pool<Postgres>,
    owner: Uuid,
    filter: &MatchFilter,
) -> Result<Vec<Match>, anyhow::Error> {
    let matches: Vec<MatchModel> = sqlx::query_as(&format!(
        r#"
        SELECT {MATCH_COLUMNS}
        FROM matches
        WHERE owner_id = $1 AND ($2::match_status IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(owner)
    .bind(filter.status)
    .bind(filter.limit as i64)
    .bind(filter.offset as i64)
    .fetch_all(db)
    .await
    .map_err(|e| anyhow!("Unable to query model from db: {}", e))?;

    matches.into_iter().map(Match::try_from).collect()
}

pub async fn crud_get_match(db: &Pool<Postgres>, id: Uuid) -> Result<Option<Match>, anyhow::Error> {
    let match_model: Option<MatchModel> = sqlx::query_as(&format!(
        r#"
        SELECT {MATCH_COLUMNS}
        FROM matches
        WHERE id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .map_err(|e| anyhow!("Unable to query model from db: {}", e))?;

    match_model.map(Match::try_from).transpose()
}

pub async fn crud_create_match(db: &Pool<Postgres>, m: &Match) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO matches (
            id, owner_id, status, selected_categories, teams, timer_seconds,
            usage, rounds, summary, finished_at, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(m.id())
    .bind(m.owner())
    .bind(m.status())
    .bind(Json(m.selected_categories()))
    .bind(Json(m.teams()))
    .bind(m.timer_seconds() as i32)
    .bind(Json(m.usage()))
    .bind(Json(m.rounds()))
    .bind(m.summary().map(Json))
    .bind(m.finished_at())
    .bind(m.version())
    .bind(m.created_at())
    .bind(m.updated_at())
    .execute(db)
    .await
    .map_err(|e| anyhow!("Unable to insert model into db: {}", e))?;

    Ok(())
}

/// Writes the whole aggregate in one statement, guarded by the version it was loaded at.
/// Returns false when no row matched.
pub async fn crud_update_match(
    db: &Pool<Postgres>,
    m: &Match,
    expected_version: i64,
) -> Result<bool, anyhow::Error> {
    let result = sqlx::query(
        r#"
        UPDATE matches
        SET (status, teams, usage, rounds, summary, finished_at, version, updated_at)
          = ($3, $4, $5, $6, $7, $8, $9, $10)
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(m.id())
    .bind(expected_version)
    .bind(m.status())
    .bind(Json(m.teams()))
    .bind(Json(m.usage()))
    .bind(Json(m.rounds()))
    .bind(m.summary().map(Json))
    .bind(m.finished_at())
    .bind(m.version())
    .bind(m.updated_at())
    .execute(db)
    .await
    .map_err(|e| anyhow!("Unable to update model in db: {}", e))?;

    Ok(result.rows_affected() == 1)
}

pub async fn crud_delete_match(db: &Pool<Postgres>, id: Uuid) -> Result<bool> {
    let result = sqlx::query(r#"DELETE FROM matches WHERE id = $1"#)
        .bind(id)
        .execute(db)
        .await
        .map_err(|e| anyhow!("Unable to delete model from db: {}", e))?;

    Ok(result.rows_affected() > 0)
}

pub async fn crud_get_active_categories(
    db: &Pool<Postgres>,
    ids: &[CategoryId],
) -> Result<Vec<CategoryId>> {
    let ids: Vec<Uuid> = ids.iter().map(|c| c.0).collect();
    let found: Vec<(Uuid,)> =
        query_as(r#"SELECT id FROM categories WHERE id = ANY($1) AND active"#)
            .bind(&ids)
            .fetch_all(db)
            .await
            .map_err(|e| anyhow!("Unable to query categories from db: {}", e))?;

    Ok(found.into_iter().map(|(id,)| CategoryId(id)).collect())
}

pub async fn crud_find_unused_question(
    db: &Pool<Postgres>,
    category: CategoryId,
    level: Level,
    excluded: &[QuestionId],
) -> Result<Option<Question>> {
    let excluded: Vec<Uuid> = excluded.iter().map(|q| q.0).collect();
    let question: Option<QuestionModel> = query_as(
        r#"
        SELECT id, category_id, level, prompt, hint
        FROM questions
        WHERE category_id = $1
          AND level = $2
          AND points = $3
          AND status = 'active'
          AND NOT (id = ANY($4))
        ORDER BY created_at
        LIMIT 1
        "#,
    )
    .bind(category.0)
    .bind(i16::from(level.as_u8()))
    .bind(level.points() as i32)
    .bind(&excluded)
    .fetch_optional(db)
    .await
    .map_err(|e| anyhow!("Unable to query questions from db: {}", e))?;

    question.map(Question::try_from).transpose()
}

pub async fn crud_get_question_hint(db: &Pool<Postgres>, id: QuestionId) -> Result<Option<Hint>> {
    let hint: Option<(Json<Hint>,)> = query_as(r#"SELECT hint FROM questions WHERE id = $1"#)
        .bind(id.0)
        .fetch_optional(db)
        .await
        .map_err(|e| anyhow!("Unable to query questions from db: {}", e))?;

    Ok(hint.map(|(Json(h),)| h))
}

pub async fn crud_get_question_answer(
    db: &Pool<Postgres>,
    id: QuestionId,
) -> Result<Option<Option<Value>>> {
    let answer: Option<(Option<Json<Value>>,)> =
        query_as(r#"SELECT answer FROM questions WHERE id = $1"#)
            .bind(id.0)
            .fetch_optional(db)
            .await
            .map_err(|e| anyhow!("Unable to query questions from db: {}", e))?;

    Ok(answer.map(|(a,)| a.map(|Json(v)| v)))
}

/// Match storage backed by Postgres.
#[derive(Clone)]
pub struct PgMatchRepository {
    db: Pool<Postgres>,
}

impl PgMatchRepository {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MatchRepository for PgMatchRepository {
    async fn insert(&self, m: &Match) -> Result<(), MatchError> {
        Ok(crud_create_match(&self.db, m).await?)
    }

    async fn load(&self, id: Uuid) -> Result<Option<Match>, MatchError> {
        Ok(crud_get_match(&self.db, id).await?)
    }

    async fn save(&self, m: &Match, expected_version: i64) -> Result<(), MatchError> {
        if crud_update_match(&self.db, m, expected_version).await? {
            return Ok(());
        }
        // Either gone or someone else committed first
        match crud_get_match(&self.db, m.id()).await? {
            Some(_) => Err(MatchError::Conflict(m.id())),
            None => Err(MatchError::MatchNotFound(m.id())),
        }
    }

    async fn list(&self, owner: Uuid, filter: &MatchFilter) -> Result<Vec<Match>, MatchError> {
        Ok(crud_get_matches(&self.db, owner, filter).await?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, MatchError> {
        Ok(crud_delete_match(&self.db, id).await?)
    }
}

/// Question catalog backed by the `categories` and `questions` tables.
#[derive(Clone)]
pub struct PgQuestionCatalog {
    db: Pool<Postgres>,
}

impl PgQuestionCatalog {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QuestionCatalog for PgQuestionCatalog {
    async fn active_categories(&self, ids: &[CategoryId]) -> Result<Vec<CategoryId>, MatchError> {
        Ok(crud_get_active_categories(&self.db, ids).await?)
    }

    async fn find_unused_question(
        &self,
        category: CategoryId,
        level: Level,
        excluded: &[QuestionId],
    ) -> Result<Option<Question>, MatchError> {
        Ok(crud_find_unused_question(&self.db, category, level, excluded).await?)
    }

    async fn question_hint(&self, id: QuestionId) -> Result<Option<Hint>, MatchError> {
        Ok(crud_get_question_hint(&self.db, id).await?)
    }

    async fn question_answer(&self, id: QuestionId) -> Result<Option<Option<Value>>, MatchError> {
        Ok(crud_get_question_answer(&self.db, id).await?)
    }
}
