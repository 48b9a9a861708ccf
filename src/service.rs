//! Match orchestration: ownership checks, per-match serialization and commit.
//!
//! Every transition runs under the match's lock and follows the same shape:
//! load a private copy, mutate it, save it with a version check. A request
//! that fails or is dropped before the save leaves storage untouched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::{CategoryId, Hint, Question, QuestionCatalog};
use crate::error::MatchError;
use crate::events::{EventBus, MatchEvent, Scoreboard};
use crate::game::{JudgeOutcome, Match, NewMatch, TeamsPatch};
use crate::ledger::Round;
use crate::locks::MatchLocks;
use crate::repository::{MatchFilter, MatchRepository};
use crate::scoring::{JudgeSelection, Level};

#[derive(Clone, Copy, Debug)]
pub struct EngineSettings {
    pub catalog_timeout: Duration,
    pub default_timer_seconds: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            catalog_timeout: Duration::from_secs(2),
            default_timer_seconds: 10,
        }
    }
}

/// A question handed to the players, with the round it opened.
#[derive(Clone, Debug)]
pub struct ServedQuestion {
    pub match_id: Uuid,
    pub round: Round,
    pub question: Question,
    pub timer_seconds: u32,
}

pub struct MatchService {
    repo: Arc<dyn MatchRepository>,
    catalog: Arc<dyn QuestionCatalog>,
    locks: MatchLocks,
    events: EventBus,
    settings: EngineSettings,
}

impl MatchService {
    pub fn new(
        repo: Arc<dyn MatchRepository>,
        catalog: Arc<dyn QuestionCatalog>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repo,
            catalog,
            locks: MatchLocks::new(),
            events: EventBus::new(),
            settings,
        }
    }

    /// Starts following a match. The subscription is taken before the
    /// scoreboard is read, so every change after the snapshot arrives on the
    /// receiver. Events carry absolute scores, so one already reflected in the
    /// snapshot is harmless.
    pub async fn watch(
        &self,
        id: Uuid,
    ) -> Result<(broadcast::Receiver<MatchEvent>, Scoreboard), MatchError> {
        let rx = self.events.subscribe(id);
        match self.scoreboard(id).await {
            Ok(board) => Ok((rx, board)),
            Err(e) => {
                drop(rx);
                self.events.release(id);
                Err(e)
            }
        }
    }

    /// Call once a viewer's receiver has been dropped.
    pub fn unwatch(&self, id: Uuid) {
        self.events.release(id);
    }

    /// Loads a match and hides it from everyone but its owner.
    async fn load_owned(&self, owner: Uuid, id: Uuid) -> Result<Match, MatchError> {
        match self.repo.load(id).await? {
            Some(m) if m.owner() == owner => Ok(m),
            _ => Err(MatchError::MatchNotFound(id)),
        }
    }

    #[instrument(skip(self, new), fields(owner = %new.owner, categories = new.categories.len()))]
    pub async fn create(&self, new: NewMatch) -> Result<Match, MatchError> {
        crate::game::validate_categories(&new.categories)?;

        let active = self.catalog.active_categories(&new.categories).await?;
        if let Some(missing) = new.categories.iter().find(|c| !active.contains(*c)) {
            return Err(MatchError::UnknownCategory(*missing));
        }

        let m = Match::create(
            Uuid::new_v4(),
            new,
            self.settings.default_timer_seconds,
            Utc::now(),
        )?;
        self.repo.insert(&m).await?;
        info!(match_id = %m.id(), "match created");
        Ok(m)
    }

    pub async fn get(&self, owner: Uuid, id: Uuid) -> Result<Match, MatchError> {
        self.load_owned(owner, id).await
    }

    pub async fn list(&self, owner: Uuid, filter: &MatchFilter) -> Result<Vec<Match>, MatchError> {
        self.repo.list(owner, filter).await
    }

    /// Public view for live viewers, not restricted to the owner.
    pub async fn scoreboard(&self, id: Uuid) -> Result<Scoreboard, MatchError> {
        self.repo
            .load(id)
            .await?
            .map(|m| Scoreboard::from(&m))
            .ok_or(MatchError::MatchNotFound(id))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, owner: Uuid, id: Uuid) -> Result<(), MatchError> {
        let _guard = self.locks.acquire(id).await;
        self.load_owned(owner, id).await?;
        if !self.repo.delete(id).await? {
            return Err(MatchError::MatchNotFound(id));
        }
        info!("match deleted");
        Ok(())
    }

    #[instrument(skip(self, patch))]
    pub async fn patch_teams(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: TeamsPatch,
    ) -> Result<Match, MatchError> {
        let _guard = self.locks.acquire(id).await;
        let mut m = self.load_owned(owner, id).await?;
        let expected = m.version();
        m.update_teams(patch, Utc::now())?;
        self.repo.save(&m, expected).await?;
        Ok(m)
    }

    /// Serves the next question for `category`/`level`.
    ///
    /// The quota check, catalog lookup, usage reservation and round append all
    /// happen under the match lock, so two callers racing for the last slot
    /// cannot both get a question.
    #[instrument(skip(self, category, level), fields(category = %category, level = %level))]
    pub async fn next_question(
        &self,
        owner: Uuid,
        id: Uuid,
        category: CategoryId,
        level: Level,
    ) -> Result<ServedQuestion, MatchError> {
        let _guard = self.locks.acquire(id).await;
        let mut m = self.load_owned(owner, id).await?;
        let expected = m.version();

        let excluded = m.prepare_question(category, level).map_err(|e| {
            debug!(code = e.code(), "question refused");
            e
        })?;

        let timeout = self.settings.catalog_timeout;
        let lookup = self
            .catalog
            .find_unused_question(category, level, &excluded);
        let question = match tokio::time::timeout(timeout, lookup).await {
            Ok(found) => found?,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "question catalog timed out");
                return Err(MatchError::CatalogTimeout(timeout.as_millis() as u64));
            }
        };
        let question = question.ok_or(MatchError::NoQuestionsLeft { category, level })?;

        let round = m.serve_question(category, level, question.id, Utc::now())?;
        self.repo.save(&m, expected).await?;

        debug!(round_no = round.round_no, question_id = %question.id, "round opened");
        self.events.publish(MatchEvent::RoundServed {
            match_id: id,
            round_no: round.round_no,
            category_id: category,
            level,
            points: round.points,
        });

        Ok(ServedQuestion {
            match_id: id,
            round,
            question,
            timer_seconds: m.timer_seconds(),
        })
    }

    #[instrument(skip(self, selection), fields(selection = %selection))]
    pub async fn judge(
        &self,
        owner: Uuid,
        id: Uuid,
        round_no: u32,
        selection: JudgeSelection,
    ) -> Result<JudgeOutcome, MatchError> {
        let _guard = self.locks.acquire(id).await;
        let mut m = self.load_owned(owner, id).await?;
        let expected = m.version();

        let outcome = m.judge(round_no, selection, Utc::now())?;
        self.repo.save(&m, expected).await?;

        debug!(scored_points = outcome.scored_points, "round judged");
        self.events.publish(MatchEvent::RoundJudged {
            match_id: id,
            round_no,
            judge_selection: selection,
            scored_points: outcome.scored_points,
            scores: outcome.scores,
        });
        Ok(outcome)
    }

    /// Finishes the match. Finishing twice fails with `MatchAlreadyFinished`;
    /// the stored summary stays readable through `get`.
    #[instrument(skip(self))]
    pub async fn finish(&self, owner: Uuid, id: Uuid) -> Result<Match, MatchError> {
        let _guard = self.locks.acquire(id).await;
        let mut m = self.load_owned(owner, id).await?;
        let expected = m.version();

        let summary = m.finish(Utc::now())?.clone();
        self.repo.save(&m, expected).await?;

        info!(winner = ?summary.winner, total_rounds = summary.total_rounds, "match finished");
        self.events.publish(MatchEvent::MatchFinished {
            match_id: id,
            scores: summary.scores,
            winner: summary.winner,
        });
        Ok(m)
    }

    pub async fn round_hint(&self, owner: Uuid, id: Uuid, round_no: u32) -> Result<Hint, MatchError> {
        let m = self.load_owned(owner, id).await?;
        let question_id = m.round(round_no)?.question_id;
        self.catalog
            .question_hint(question_id)
            .await?
            .ok_or(MatchError::QuestionNotFound(question_id))
    }

    pub async fn round_answer(
        &self,
        owner: Uuid,
        id: Uuid,
        round_no: u32,
    ) -> Result<Option<Value>, MatchError> {
        let m = self.load_owned(owner, id).await?;
        let question_id = m.round(round_no)?.question_id;
        self.catalog
            .question_answer(question_id)
            .await?
            .ok_or(MatchError::QuestionNotFound(question_id))
    }
}
