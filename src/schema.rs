use anyhow::{anyhow, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::{CategoryId, QuestionId};
use crate::game::{Match, MatchStatus, NewMatch, Teams, TeamsPatch};
use crate::ledger::Round;
use crate::repository::{MatchFilter, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::scoring::{JudgeSelection, Level};
use crate::service::ServedQuestion;
use crate::summary::{Scores, Summary, Winner};
use crate::usage::UsageEntry;

#[derive(Deserialize, Debug, Default)]
pub struct ListMatchesQuery {
    pub status: Option<MatchStatus>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl From<ListMatchesQuery> for MatchFilter {
    fn from(q: ListMatchesQuery) -> Self {
        Self {
            status: q.status,
            offset: q.offset.unwrap_or(0),
            limit: q.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateMatchSchema {
    pub selected_category_ids: Vec<CategoryId>,
    #[serde(rename = "teamA_name")]
    pub team_a_name: Option<String>,
    #[serde(rename = "teamB_name")]
    pub team_b_name: Option<String>,
    pub timer_seconds: Option<i64>,
}

impl CreateMatchSchema {
    pub fn into_new_match(self, owner: Uuid) -> NewMatch {
        NewMatch {
            owner,
            categories: self.selected_category_ids,
            team_a_name: self.team_a_name,
            team_b_name: self.team_b_name,
            timer_seconds: self.timer_seconds,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct PatchTeamsSchema {
    #[serde(rename = "teamA_name")]
    pub team_a_name: Option<String>,
    #[serde(rename = "teamB_name")]
    pub team_b_name: Option<String>,
    #[serde(rename = "avatar_keyA")]
    pub avatar_key_a: Option<String>,
    #[serde(rename = "avatar_keyB")]
    pub avatar_key_b: Option<String>,
}

impl From<PatchTeamsSchema> for TeamsPatch {
    fn from(p: PatchTeamsSchema) -> Self {
        Self {
            team_a_name: p.team_a_name,
            team_b_name: p.team_b_name,
            avatar_key_a: p.avatar_key_a,
            avatar_key_b: p.avatar_key_b,
        }
    }
}

// Level and selection stay loose here so bad values get their own error codes
#[derive(Deserialize, Debug)]
pub struct NextQuestionSchema {
    pub category_id: CategoryId,
    pub level: i64,
}

#[derive(Deserialize, Debug)]
pub struct JudgeSchema {
    pub round_no: u32,
    pub judge_selection: String,
}

// For json response
#[derive(Debug, Serialize)]
pub struct GetMatchSchema {
    pub id: Uuid,
    pub status: MatchStatus,
    pub selected_category_ids: Vec<CategoryId>,
    pub teams: Teams,
    pub scores: Scores,
    pub timer_seconds: u32,
    pub usage: Vec<UsageEntry>,
    pub rounds: Vec<Round>,
    pub summary: Option<Summary>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Match> for GetMatchSchema {
    fn from(m: &Match) -> Self {
        Self {
            id: m.id(),
            status: m.status(),
            selected_category_ids: m.selected_categories().to_vec(),
            teams: m.teams().clone(),
            scores: m.scores(),
            timer_seconds: m.timer_seconds(),
            usage: m.usage().clone().into(),
            rounds: m.rounds().iter().cloned().collect(),
            summary: m.summary().cloned(),
            finished_at: m.finished_at(),
            created_at: m.created_at(),
            updated_at: m.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicQuestionSchema {
    pub id: QuestionId,
    pub prompt: Value,
    pub hint_available: bool,
}

#[derive(Debug, Serialize)]
pub struct NextQuestionResponse {
    pub match_id: Uuid,
    pub round_no: u32,
    pub timer_seconds: u32,
    pub category_id: CategoryId,
    pub level: Level,
    pub points: u32,
    pub question: PublicQuestionSchema,
}

impl From<ServedQuestion> for NextQuestionResponse {
    fn from(served: ServedQuestion) -> Self {
        Self {
            match_id: served.match_id,
            round_no: served.round.round_no,
            timer_seconds: served.timer_seconds,
            category_id: served.round.category_id,
            level: served.round.level,
            points: served.round.points,
            question: PublicQuestionSchema {
                id: served.question.id,
                prompt: served.question.prompt,
                hint_available: served.question.hint_available,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LastRoundSchema {
    pub round_no: u32,
    pub judge_selection: JudgeSelection,
    pub scored_points: u32,
}

#[derive(Debug, Serialize)]
pub struct JudgeResponse {
    pub ok: bool,
    pub scores: Scores,
    pub last_round: LastRoundSchema,
}

#[derive(Debug, Serialize)]
pub struct WinnerSchema {
    pub result: Winner,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FinishResponse {
    pub status: MatchStatus,
    pub scores: Scores,
    pub winner: WinnerSchema,
    pub summary: Summary,
}

impl TryFrom<&Match> for FinishResponse {
    type Error = Error;

    fn try_from(m: &Match) -> Result<Self, Self::Error> {
        let summary = m
            .summary()
            .ok_or_else(|| anyhow!("Match {} has no summary", m.id()))?
            .clone();
        let name = summary
            .winner
            .team()
            .map(|team| m.teams().get(team).name.clone());

        Ok(Self {
            status: m.status(),
            scores: summary.scores,
            winner: WinnerSchema {
                result: summary.winner,
                name,
            },
            summary,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_list_limit_is_clamped() {
        let filter: MatchFilter = ListMatchesQuery {
            limit: Some(10_000),
            ..Default::default()
        }
        .into();
        assert_eq!(filter.limit, MAX_LIST_LIMIT);

        let filter: MatchFilter = ListMatchesQuery {
            limit: Some(0),
            ..Default::default()
        }
        .into();
        assert_eq!(filter.limit, 1);

        let filter: MatchFilter = ListMatchesQuery::default().into();
        assert_eq!(filter.limit, DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn test_create_schema_field_names() {
        let body: CreateMatchSchema = serde_json::from_value(json!({
            "selected_category_ids": [Uuid::nil()],
            "teamA_name": "Falcons",
            "timer_seconds": 30
        }))
        .unwrap();
        assert_eq!(body.team_a_name.as_deref(), Some("Falcons"));
        assert!(body.team_b_name.is_none());
        assert_eq!(body.timer_seconds, Some(30));
    }

    #[test]
    fn test_finish_response_names_winner() {
        let mut m = Match::create(
            Uuid::new_v4(),
            NewMatch {
                owner: Uuid::new_v4(),
                categories: vec![CategoryId(Uuid::new_v4())],
                team_a_name: Some("Falcons".into()),
                team_b_name: Some("Owls".into()),
                timer_seconds: None,
            },
            10,
            Utc::now(),
        )
        .unwrap();
        assert!(FinishResponse::try_from(&m).is_err());

        m.finish(Utc::now()).unwrap();
        let body = serde_json::to_value(FinishResponse::try_from(&m).unwrap()).unwrap();
        assert_eq!(body["status"], "finished");
        assert_eq!(body["winner"]["result"], "DRAW");
        assert!(body["winner"]["name"].is_null());
        assert_eq!(body["summary"]["total_rounds"], 0);
    }
}
