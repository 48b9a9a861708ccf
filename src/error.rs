//! Error types for the match engine and its HTTP adapter.
//!
//! `MatchError` is the domain taxonomy: every variant has a stable `code()`
//! that clients can match on. `AppError` is what handlers return; it renders
//! the `{ "error": { code, message, details } }` body.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{CategoryId, QuestionId};
use crate::scoring::Level;
use crate::usage::QUOTA_PER_SLOT;

pub const MAX_CATEGORIES: usize = 6;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Between 1 and 6 categories must be selected, got {0}")]
    MaxCategoriesExceeded(usize),

    #[error("Category {0} not found or inactive")]
    UnknownCategory(CategoryId),

    #[error("Category {0} selected more than once")]
    DuplicateCategory(CategoryId),

    #[error("Category {0} is not one of this match's selected categories")]
    CategoryNotSelected(CategoryId),

    #[error("Invalid level {0}, expected 1, 2 or 3")]
    InvalidLevel(i64),

    #[error("Invalid judge selection {0:?}, expected TEAM_A, TEAM_B or NO_ONE")]
    InvalidJudgeSelection(String),

    #[error("Invalid timer {0}s, expected 1 to 300")]
    InvalidTimer(i64),

    #[error("Level quota exceeded (max 2 questions per category per level)")]
    LevelQuotaExceeded { category: CategoryId, level: Level },

    #[error("No questions left for this category and level")]
    NoQuestionsLeft { category: CategoryId, level: Level },

    #[error("Round {0} already judged")]
    RoundAlreadyJudged(u32),

    #[error("Match is finished")]
    MatchFinished,

    #[error("Match already finished")]
    MatchAlreadyFinished,

    #[error("Match not found")]
    MatchNotFound(Uuid),

    #[error("Round {0} not found")]
    RoundNotFound(u32),

    #[error("Question {0} not found")]
    QuestionNotFound(QuestionId),

    #[error("Question catalog did not answer within {0}ms")]
    CatalogTimeout(u64),

    #[error("Match {0} was modified concurrently")]
    Conflict(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl MatchError {
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::MaxCategoriesExceeded(_) => "MAX_CATEGORIES_EXCEEDED",
            MatchError::UnknownCategory(_)
            | MatchError::DuplicateCategory(_)
            | MatchError::CategoryNotSelected(_) => "INVALID_CATEGORIES",
            MatchError::InvalidLevel(_) => "INVALID_LEVEL",
            MatchError::InvalidJudgeSelection(_) => "INVALID_JUDGE_SELECTION",
            MatchError::InvalidTimer(_) => "INVALID_TIMER",
            MatchError::LevelQuotaExceeded { .. } => "LEVEL_QUOTA_EXCEEDED",
            MatchError::NoQuestionsLeft { .. } => "NO_QUESTIONS_LEFT_FOR_LEVEL",
            MatchError::RoundAlreadyJudged(_) => "ROUND_ALREADY_JUDGED",
            MatchError::MatchFinished => "MATCH_FINISHED",
            MatchError::MatchAlreadyFinished => "MATCH_ALREADY_FINISHED",
            MatchError::MatchNotFound(_) => "MATCH_NOT_FOUND",
            MatchError::RoundNotFound(_) => "ROUND_NOT_FOUND",
            MatchError::QuestionNotFound(_) => "QUESTION_NOT_FOUND",
            MatchError::CatalogTimeout(_) => "CATALOG_UNAVAILABLE",
            MatchError::Conflict(_) => "MATCH_CONFLICT",
            MatchError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            MatchError::MaxCategoriesExceeded(_)
            | MatchError::UnknownCategory(_)
            | MatchError::DuplicateCategory(_)
            | MatchError::CategoryNotSelected(_)
            | MatchError::InvalidLevel(_)
            | MatchError::InvalidJudgeSelection(_)
            | MatchError::InvalidTimer(_) => StatusCode::BAD_REQUEST,
            MatchError::LevelQuotaExceeded { .. }
            | MatchError::NoQuestionsLeft { .. }
            | MatchError::RoundAlreadyJudged(_)
            | MatchError::MatchFinished
            | MatchError::MatchAlreadyFinished
            | MatchError::Conflict(_) => StatusCode::CONFLICT,
            MatchError::MatchNotFound(_)
            | MatchError::RoundNotFound(_)
            | MatchError::QuestionNotFound(_) => StatusCode::NOT_FOUND,
            MatchError::CatalogTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            MatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn details(&self) -> Value {
        match self {
            MatchError::MaxCategoriesExceeded(count) => {
                json!({ "max": MAX_CATEGORIES, "count": count })
            }
            MatchError::UnknownCategory(category)
            | MatchError::DuplicateCategory(category)
            | MatchError::CategoryNotSelected(category) => json!({ "category_id": category }),
            MatchError::InvalidLevel(level) => json!({ "level": level }),
            MatchError::InvalidJudgeSelection(selection) => {
                json!({ "judge_selection": selection })
            }
            MatchError::InvalidTimer(seconds) => json!({ "timer_seconds": seconds }),
            MatchError::LevelQuotaExceeded { category, level } => json!({
                "category_id": category,
                "level": level,
                "max_per_level": QUOTA_PER_SLOT,
            }),
            MatchError::NoQuestionsLeft { category, level } => {
                json!({ "category_id": category, "level": level })
            }
            MatchError::RoundAlreadyJudged(round_no) | MatchError::RoundNotFound(round_no) => {
                json!({ "round_no": round_no })
            }
            MatchError::MatchNotFound(id) | MatchError::Conflict(id) => json!({ "match_id": id }),
            MatchError::QuestionNotFound(id) => json!({ "question_id": id }),
            MatchError::CatalogTimeout(ms) => json!({ "timeout_ms": ms }),
            MatchError::MatchFinished
            | MatchError::MatchAlreadyFinished
            | MatchError::Storage(_) => json!({}),
        }
    }
}

/// Error returned from every handler.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: message.into(),
            details: json!({}),
        }
    }
}

impl From<MatchError> for AppError {
    fn from(e: MatchError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            tracing::error!(code = e.code(), "{:#}", e);
        }
        Self {
            status,
            code: e.code(),
            // Storage detail stays in the logs
            message: match e {
                MatchError::Storage(_) => "Internal server error".to_string(),
                ref other => other.to_string(),
            },
            details: e.details(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        MatchError::Storage(e).into()
    }
}

impl AppError {
    fn invalid_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_REQUEST",
            message,
            details: json!({}),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        }));

        (self.status, body).into_response()
    }
}
