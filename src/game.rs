//! The match aggregate and its state machine.
//!
//! A match is `Active` until it is finished, and `Finished` forever after.
//! Every mutation goes through a method here that checks the current state
//! first, so a rejected call leaves the aggregate exactly as it was.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

use crate::catalog::{CategoryId, QuestionId};
use crate::error::{MatchError, MAX_CATEGORIES};
use crate::ledger::{Round, RoundLedger};
use crate::scoring::{JudgeSelection, Level, Team};
use crate::summary::{Scores, Summary};
use crate::usage::UsageTracker;

pub const MIN_TIMER_SECONDS: u32 = 1;
pub const MAX_TIMER_SECONDS: u32 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "match_status", rename_all = "lowercase")]
pub enum MatchStatus {
    Active,
    Finished,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub name: String,
    pub avatar_key: Option<String>,
    pub score: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teams {
    #[serde(rename = "A")]
    pub a: TeamInfo,
    #[serde(rename = "B")]
    pub b: TeamInfo,
}

impl Teams {
    pub fn get(&self, team: Team) -> &TeamInfo {
        match team {
            Team::A => &self.a,
            Team::B => &self.b,
        }
    }

    fn get_mut(&mut self, team: Team) -> &mut TeamInfo {
        match team {
            Team::A => &mut self.a,
            Team::B => &mut self.b,
        }
    }

    pub fn scores(&self) -> Scores {
        Scores {
            team_a: self.a.score,
            team_b: self.b.score,
        }
    }
}

/// Set exactly once, when the match finishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
}

/// Input for creating a match.
#[derive(Clone, Debug, Default)]
pub struct NewMatch {
    pub owner: Uuid,
    pub categories: Vec<CategoryId>,
    pub team_a_name: Option<String>,
    pub team_b_name: Option<String>,
    pub timer_seconds: Option<i64>,
}

/// Changes to team display data. `None` leaves a field as it is.
#[derive(Clone, Debug, Default)]
pub struct TeamsPatch {
    pub team_a_name: Option<String>,
    pub team_b_name: Option<String>,
    pub avatar_key_a: Option<String>,
    pub avatar_key_b: Option<String>,
}

/// Result of a successful judge call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub round_no: u32,
    pub judge_selection: JudgeSelection,
    pub scored_points: u32,
    pub scores: Scores,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub(crate) id: Uuid,
    pub(crate) owner: Uuid,
    pub(crate) selected_categories: Vec<CategoryId>,
    pub(crate) teams: Teams,
    pub(crate) timer_seconds: u32,
    pub(crate) usage: UsageTracker,
    pub(crate) rounds: RoundLedger,
    pub(crate) completion: Option<Completion>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    /// Bumped on every committed transition.
    pub(crate) version: i64,
}

/// 1 to 6 distinct categories.
pub fn validate_categories(categories: &[CategoryId]) -> Result<(), MatchError> {
    if categories.is_empty() || categories.len() > MAX_CATEGORIES {
        return Err(MatchError::MaxCategoriesExceeded(categories.len()));
    }
    let mut seen = HashSet::with_capacity(categories.len());
    for category in categories {
        if !seen.insert(category) {
            return Err(MatchError::DuplicateCategory(*category));
        }
    }
    Ok(())
}

/// Takes the raw requested value so negative and oversized timers fail the same way.
pub fn validate_timer(timer_seconds: Option<i64>, default: u32) -> Result<u32, MatchError> {
    match timer_seconds {
        None => Ok(default),
        Some(t) => u32::try_from(t)
            .ok()
            .filter(|t| (MIN_TIMER_SECONDS..=MAX_TIMER_SECONDS).contains(t))
            .ok_or(MatchError::InvalidTimer(t)),
    }
}

impl Match {
    /// Builds a fresh active match. Category existence is checked by the caller.
    pub fn create(
        id: Uuid,
        new: NewMatch,
        default_timer_seconds: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, MatchError> {
        validate_categories(&new.categories)?;
        let timer_seconds = validate_timer(new.timer_seconds, default_timer_seconds)?;

        Ok(Self {
            id,
            owner: new.owner,
            selected_categories: new.categories,
            teams: Teams {
                a: TeamInfo {
                    name: new.team_a_name.unwrap_or_default(),
                    ..TeamInfo::default()
                },
                b: TeamInfo {
                    name: new.team_b_name.unwrap_or_default(),
                    ..TeamInfo::default()
                },
            },
            timer_seconds,
            usage: UsageTracker::new(),
            rounds: RoundLedger::new(),
            completion: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn status(&self) -> MatchStatus {
        match self.completion {
            Some(_) => MatchStatus::Finished,
            None => MatchStatus::Active,
        }
    }

    pub fn selected_categories(&self) -> &[CategoryId] {
        &self.selected_categories
    }

    pub fn teams(&self) -> &Teams {
        &self.teams
    }

    pub fn scores(&self) -> Scores {
        self.teams.scores()
    }

    pub fn timer_seconds(&self) -> u32 {
        self.timer_seconds
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn rounds(&self) -> &RoundLedger {
        &self.rounds
    }

    pub fn round(&self, round_no: u32) -> Result<&Round, MatchError> {
        self.rounds
            .get(round_no)
            .ok_or(MatchError::RoundNotFound(round_no))
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completion.as_ref().map(|c| c.finished_at)
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.completion.as_ref().map(|c| &c.summary)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    fn ensure_active(&self) -> Result<(), MatchError> {
        match self.completion {
            Some(_) => Err(MatchError::MatchFinished),
            None => Ok(()),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    /// Checks that a question may be served for `category`/`level` and returns
    /// the question ids the catalog has to skip.
    pub fn prepare_question(
        &self,
        category: CategoryId,
        level: Level,
    ) -> Result<Vec<QuestionId>, MatchError> {
        self.ensure_active()?;
        if !self.selected_categories.contains(&category) {
            return Err(MatchError::CategoryNotSelected(category));
        }
        self.usage.check_slot(category, level)
    }

    /// Reserves quota for `question_id` and opens a new unjudged round for it.
    pub fn serve_question(
        &mut self,
        category: CategoryId,
        level: Level,
        question_id: QuestionId,
        now: DateTime<Utc>,
    ) -> Result<Round, MatchError> {
        self.prepare_question(category, level)?;
        self.usage.reserve_slot(category, level, question_id)?;
        let round = self.rounds.append(category, level, question_id, now).clone();
        self.touch(now);
        Ok(round)
    }

    pub fn judge(
        &mut self,
        round_no: u32,
        selection: JudgeSelection,
        now: DateTime<Utc>,
    ) -> Result<JudgeOutcome, MatchError> {
        self.ensure_active()?;
        let delta = self.rounds.judge(round_no, selection, now)?;
        if let Some(team) = delta.team {
            let info = self.teams.get_mut(team);
            info.score = info.score.saturating_add(delta.points);
        }
        self.touch(now);
        Ok(JudgeOutcome {
            round_no,
            judge_selection: selection,
            scored_points: delta.points,
            scores: self.scores(),
        })
    }

    /// Freezes the match and stores its summary. A finished match is never
    /// finished again, so the summary is computed exactly once.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<&Summary, MatchError> {
        if self.completion.is_some() {
            return Err(MatchError::MatchAlreadyFinished);
        }
        let summary = Summary::compute(&self.rounds, self.scores());
        self.touch(now);
        let completion = self.completion.insert(Completion {
            finished_at: now,
            summary,
        });
        Ok(&completion.summary)
    }

    pub fn update_teams(&mut self, patch: TeamsPatch, now: DateTime<Utc>) -> Result<(), MatchError> {
        self.ensure_active()?;
        if let Some(name) = patch.team_a_name {
            self.teams.a.name = name;
        }
        if let Some(name) = patch.team_b_name {
            self.teams.b.name = name;
        }
        if let Some(key) = patch.avatar_key_a {
            self.teams.a.avatar_key = Some(key);
        }
        if let Some(key) = patch.avatar_key_b {
            self.teams.b.avatar_key = Some(key);
        }
        self.touch(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::Winner;

    fn category() -> CategoryId {
        CategoryId(Uuid::new_v4())
    }

    fn question() -> QuestionId {
        QuestionId(Uuid::new_v4())
    }

    fn new_match(categories: Vec<CategoryId>) -> Match {
        Match::create(
            Uuid::new_v4(),
            NewMatch {
                owner: Uuid::new_v4(),
                categories,
                team_a_name: Some("A".into()),
                team_b_name: Some("B".into()),
                timer_seconds: None,
            },
            10,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_validates_category_count() {
        assert!(matches!(
            validate_categories(&[]),
            Err(MatchError::MaxCategoriesExceeded(0))
        ));
        let seven: Vec<CategoryId> = (0..7).map(|_| category()).collect();
        assert!(matches!(
            validate_categories(&seven),
            Err(MatchError::MaxCategoriesExceeded(7))
        ));
        assert!(validate_categories(&seven[..6]).is_ok());
        assert!(validate_categories(&seven[..1]).is_ok());
    }

    #[test]
    fn test_create_rejects_duplicate_categories() {
        let c = category();
        assert!(matches!(
            validate_categories(&[c, c]),
            Err(MatchError::DuplicateCategory(_))
        ));
    }

    #[test]
    fn test_timer_bounds() {
        assert_eq!(validate_timer(None, 10).unwrap(), 10);
        assert_eq!(validate_timer(Some(300), 10).unwrap(), 300);
        assert!(validate_timer(Some(0), 10).is_err());
        assert!(validate_timer(Some(301), 10).is_err());
        assert!(matches!(
            validate_timer(Some(-5), 10),
            Err(MatchError::InvalidTimer(-5))
        ));
        assert!(validate_timer(Some(i64::from(u32::MAX) + 1), 10).is_err());
    }

    #[test]
    fn test_new_match_is_active_and_empty() {
        let m = new_match(vec![category()]);
        assert_eq!(m.status(), MatchStatus::Active);
        assert!(m.finished_at().is_none());
        assert!(m.rounds().is_empty());
        assert_eq!(m.scores(), Scores::default());
        assert_eq!(m.teams().a.name, "A");
        assert_eq!(m.timer_seconds(), 10);
    }

    #[test]
    fn test_serve_requires_selected_category() {
        let mut m = new_match(vec![category()]);
        let other = category();
        let err = m
            .serve_question(other, Level::One, question(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CATEGORIES");
        assert!(m.rounds().is_empty());
    }

    #[test]
    fn test_third_question_for_slot_rejected() {
        let c = category();
        let mut m = new_match(vec![c]);
        m.serve_question(c, Level::One, question(), Utc::now())
            .unwrap();
        m.serve_question(c, Level::One, question(), Utc::now())
            .unwrap();
        let version = m.version();

        let err = m
            .serve_question(c, Level::One, question(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "LEVEL_QUOTA_EXCEEDED");
        assert_eq!(m.rounds().len(), 2);
        assert_eq!(m.version(), version);
    }

    #[test]
    fn test_judging_level_two_for_team_a() {
        let c = category();
        let mut m = new_match(vec![c]);
        let round = m
            .serve_question(c, Level::Two, question(), Utc::now())
            .unwrap();

        let outcome = m
            .judge(round.round_no, JudgeSelection::TeamA, Utc::now())
            .unwrap();
        assert_eq!(outcome.scored_points, 200);
        assert_eq!(outcome.scores.team_a, 200);
        assert_eq!(outcome.scores.team_b, 0);

        let err = m
            .judge(round.round_no, JudgeSelection::TeamB, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "ROUND_ALREADY_JUDGED");
        assert_eq!(m.scores().team_a, 200);
        assert_eq!(m.scores().team_b, 0);
    }

    #[test]
    fn test_no_one_leaves_scores_unchanged() {
        let c = category();
        let mut m = new_match(vec![c]);
        m.serve_question(c, Level::Three, question(), Utc::now())
            .unwrap();
        let outcome = m.judge(1, JudgeSelection::NoOne, Utc::now()).unwrap();
        assert_eq!(outcome.scored_points, 0);
        assert_eq!(m.scores(), Scores::default());
    }

    #[test]
    fn test_finished_match_is_frozen() {
        let c = category();
        let mut m = new_match(vec![c]);
        m.serve_question(c, Level::One, question(), Utc::now())
            .unwrap();
        m.finish(Utc::now()).unwrap();
        assert_eq!(m.status(), MatchStatus::Finished);
        assert!(m.finished_at().is_some());

        let err = m
            .serve_question(c, Level::Two, question(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "MATCH_FINISHED");
        let err = m.judge(1, JudgeSelection::TeamA, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "MATCH_FINISHED");
        let err = m
            .update_teams(TeamsPatch::default(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "MATCH_FINISHED");
    }

    #[test]
    fn test_finish_twice_keeps_first_summary() {
        let c = category();
        let mut m = new_match(vec![c]);
        m.serve_question(c, Level::One, question(), Utc::now())
            .unwrap();
        m.judge(1, JudgeSelection::TeamB, Utc::now()).unwrap();
        let first = m.finish(Utc::now()).unwrap().clone();
        let finished_at = m.finished_at();

        let err = m.finish(Utc::now()).unwrap_err();
        assert_eq!(err.code(), "MATCH_ALREADY_FINISHED");
        assert_eq!(m.summary(), Some(&first));
        assert_eq!(m.finished_at(), finished_at);
        assert_eq!(first.winner, Winner::TeamB);
    }

    #[test]
    fn test_unjudged_rounds_count_but_do_not_score() {
        let c = category();
        let mut m = new_match(vec![c]);
        m.serve_question(c, Level::Three, question(), Utc::now())
            .unwrap();
        m.serve_question(c, Level::One, question(), Utc::now())
            .unwrap();
        m.judge(2, JudgeSelection::TeamA, Utc::now()).unwrap();

        let summary = m.finish(Utc::now()).unwrap();
        assert_eq!(summary.total_rounds, 2);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.scores.team_a, 100);
        assert_eq!(summary.winner, Winner::TeamA);
    }

    #[test]
    fn test_update_teams_patches_only_given_fields() {
        let mut m = new_match(vec![category()]);
        m.update_teams(
            TeamsPatch {
                team_b_name: Some("Blue".into()),
                avatar_key_a: Some("avatars/red.png".into()),
                ..TeamsPatch::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(m.teams().a.name, "A");
        assert_eq!(m.teams().a.avatar_key.as_deref(), Some("avatars/red.png"));
        assert_eq!(m.teams().b.name, "Blue");
    }
}
