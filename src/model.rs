use anyhow::{anyhow, Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

use crate::catalog::{CategoryId, Hint, Question, QuestionId};
use crate::game::{Completion, Match, MatchStatus, Teams};
use crate::ledger::RoundLedger;
use crate::scoring::Level;
use crate::summary::Summary;
use crate::usage::UsageTracker;

// For sqlx
#[derive(Debug, sqlx::FromRow)]
pub struct MatchModel {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: MatchStatus,
    pub selected_categories: Json<Vec<CategoryId>>,
    pub teams: Json<Teams>,
    pub timer_seconds: i32,
    pub usage: Json<UsageTracker>,
    pub rounds: Json<RoundLedger>,
    pub summary: Option<Json<Summary>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<MatchModel> for Match {
    type Error = Error;

    fn try_from(m: MatchModel) -> Result<Self, Self::Error> {
        let completion = match (m.status, m.finished_at, m.summary) {
            (MatchStatus::Active, None, None) => None,
            (MatchStatus::Finished, Some(finished_at), Some(Json(summary))) => Some(Completion {
                finished_at,
                summary,
            }),
            (status, finished_at, _) => {
                return Err(anyhow!(
                    "Match {} is {:?} but finished_at is {:?}",
                    m.id,
                    status,
                    finished_at
                ))
            }
        };
        let timer_seconds = u32::try_from(m.timer_seconds)
            .map_err(|_| anyhow!("Match {} has a negative timer", m.id))?;

        Ok(Match {
            id: m.id,
            owner: m.owner_id,
            selected_categories: m.selected_categories.0,
            teams: m.teams.0,
            timer_seconds,
            usage: m.usage.0,
            rounds: m.rounds.0,
            completion,
            created_at: m.created_at,
            updated_at: m.updated_at,
            version: m.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct QuestionModel {
    pub id: Uuid,
    pub category_id: Uuid,
    pub level: i16,
    pub prompt: Json<Value>,
    pub hint: Json<Hint>,
}

impl TryFrom<QuestionModel> for Question {
    type Error = Error;

    fn try_from(q: QuestionModel) -> Result<Self, Self::Error> {
        Ok(Question {
            id: QuestionId(q.id),
            category: CategoryId(q.category_id),
            level: Level::try_from(q.level)?,
            prompt: q.prompt.0,
            hint_available: q.hint.0.enabled,
        })
    }
}
