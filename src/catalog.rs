//! Read-only question catalog.
//!
//! The match engine only ever asks the catalog for "some active question in
//! this category and level that is not in this exclusion list". It never sees
//! answers unless the match owner asks for them explicitly.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::MatchError;
use crate::scoring::Level;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub Uuid);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub Uuid);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The public face of a question: what players may see when it is served.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub category: CategoryId,
    pub level: Level,
    pub prompt: Value,
    pub hint_available: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hint {
    pub enabled: bool,
    pub content: Option<Value>,
}

#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// Returns the subset of `ids` that exist and are active.
    async fn active_categories(&self, ids: &[CategoryId]) -> Result<Vec<CategoryId>, MatchError>;

    /// Picks an active question for `category`/`level` whose id is not in `excluded`.
    async fn find_unused_question(
        &self,
        category: CategoryId,
        level: Level,
        excluded: &[QuestionId],
    ) -> Result<Option<Question>, MatchError>;

    async fn question_hint(&self, id: QuestionId) -> Result<Option<Hint>, MatchError>;

    /// `Ok(None)` when the question does not exist, `Ok(Some(None))` when it has no answer.
    async fn question_answer(&self, id: QuestionId) -> Result<Option<Option<Value>>, MatchError>;
}

/// A question as stored by the in-memory catalog, answer included.
#[derive(Clone, Debug)]
pub struct StoredQuestion {
    pub question: Question,
    pub hint: Hint,
    pub answer: Option<Value>,
}

/// Catalog held in process memory, for tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    categories: DashMap<CategoryId, bool>,
    // Insertion order is the pick order
    questions: DashMap<CategoryId, Vec<StoredQuestion>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&self, active: bool) -> CategoryId {
        let id = CategoryId(Uuid::new_v4());
        self.categories.insert(id, active);
        id
    }

    /// Adds a plain text question and returns its id.
    pub fn add_question(&self, category: CategoryId, level: Level, text: &str) -> QuestionId {
        let id = QuestionId(Uuid::new_v4());
        self.insert(StoredQuestion {
            question: Question {
                id,
                category,
                level,
                prompt: serde_json::json!({ "text": text }),
                hint_available: false,
            },
            hint: Hint {
                enabled: false,
                content: None,
            },
            answer: None,
        });
        id
    }

    pub fn insert(&self, stored: StoredQuestion) {
        self.questions
            .entry(stored.question.category)
            .or_default()
            .push(stored);
    }

    fn stored(&self, id: QuestionId) -> Option<StoredQuestion> {
        self.questions.iter().find_map(|entry| {
            entry
                .value()
                .iter()
                .find(|s| s.question.id == id)
                .cloned()
        })
    }
}

#[async_trait]
impl QuestionCatalog for InMemoryCatalog {
    async fn active_categories(&self, ids: &[CategoryId]) -> Result<Vec<CategoryId>, MatchError> {
        Ok(ids
            .iter()
            .filter(|id| self.categories.get(*id).map(|a| *a).unwrap_or(false))
            .copied()
            .collect())
    }

    async fn find_unused_question(
        &self,
        category: CategoryId,
        level: Level,
        excluded: &[QuestionId],
    ) -> Result<Option<Question>, MatchError> {
        let excluded: HashSet<&QuestionId> = excluded.iter().collect();
        Ok(self.questions.get(&category).and_then(|questions| {
            questions
                .iter()
                .map(|s| &s.question)
                .find(|q| q.level == level && !excluded.contains(&q.id))
                .cloned()
        }))
    }

    async fn question_hint(&self, id: QuestionId) -> Result<Option<Hint>, MatchError> {
        Ok(self.stored(id).map(|s| s.hint))
    }

    async fn question_answer(&self, id: QuestionId) -> Result<Option<Option<Value>>, MatchError> {
        Ok(self.stored(id).map(|s| s.answer))
    }
}
