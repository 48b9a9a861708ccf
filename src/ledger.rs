//! Append-only record of the rounds played in a match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{CategoryId, QuestionId};
use crate::error::MatchError;
use crate::scoring::{score_delta, JudgeSelection, Level, ScoreDelta, Team};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round_no: u32,
    pub category_id: CategoryId,
    pub level: Level,
    pub points: u32,
    pub question_id: QuestionId,
    pub judge_selection: Option<JudgeSelection>,
    pub scored_team: Option<Team>,
    pub scored_points: u32,
    pub created_at: DateTime<Utc>,
    pub judged_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn is_judged(&self) -> bool {
        self.judge_selection.is_some()
    }
}

/// Rounds in creation order. `round_no` is the 1-based position, so numbers
/// are never reused and rounds are never removed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundLedger {
    rounds: Vec<Round>,
}

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn next_round_no(&self) -> u32 {
        self.rounds.len() as u32 + 1
    }

    pub fn get(&self, round_no: u32) -> Option<&Round> {
        let index = round_no.checked_sub(1)? as usize;
        self.rounds.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Round> {
        self.rounds.iter()
    }

    pub fn append(
        &mut self,
        category_id: CategoryId,
        level: Level,
        question_id: QuestionId,
        now: DateTime<Utc>,
    ) -> &Round {
        let round = Round {
            round_no: self.next_round_no(),
            category_id,
            level,
            points: level.points(),
            question_id,
            judge_selection: None,
            scored_team: None,
            scored_points: 0,
            created_at: now,
            judged_at: None,
        };
        self.rounds.push(round);
        &self.rounds[self.rounds.len() - 1]
    }

    /// Records the verdict for `round_no`. A round can be judged exactly once.
    pub fn judge(
        &mut self,
        round_no: u32,
        selection: JudgeSelection,
        now: DateTime<Utc>,
    ) -> Result<ScoreDelta, MatchError> {
        let index = round_no
            .checked_sub(1)
            .map(|i| i as usize)
            .filter(|i| *i < self.rounds.len())
            .ok_or(MatchError::RoundNotFound(round_no))?;
        let round = &mut self.rounds[index];
        if round.is_judged() {
            return Err(MatchError::RoundAlreadyJudged(round_no));
        }

        let delta = score_delta(round.level, selection);
        round.judge_selection = Some(selection);
        round.scored_team = delta.team;
        round.scored_points = delta.points;
        round.judged_at = Some(now);
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ledger_with(levels: &[Level]) -> RoundLedger {
        let mut ledger = RoundLedger::new();
        let c = CategoryId(Uuid::new_v4());
        for level in levels {
            ledger.append(c, *level, QuestionId(Uuid::new_v4()), Utc::now());
        }
        ledger
    }

    #[test]
    fn test_round_numbers_are_sequential() {
        let ledger = ledger_with(&[Level::One, Level::Three, Level::Two]);
        let numbers: Vec<u32> = ledger.iter().map(|r| r.round_no).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(ledger.get(2).unwrap().points, 500);
        assert!(ledger.get(0).is_none());
        assert!(ledger.get(4).is_none());
    }

    #[test]
    fn test_judge_once() {
        let mut ledger = ledger_with(&[Level::Two]);

        let delta = ledger.judge(1, JudgeSelection::TeamA, Utc::now()).unwrap();
        assert_eq!(delta.team, Some(Team::A));
        assert_eq!(delta.points, 200);

        let round = ledger.get(1).unwrap();
        assert_eq!(round.judge_selection, Some(JudgeSelection::TeamA));
        assert_eq!(round.scored_team, Some(Team::A));
        assert_eq!(round.scored_points, 200);
        assert!(round.judged_at.is_some());

        let err = ledger
            .judge(1, JudgeSelection::TeamB, Utc::now())
            .unwrap_err();
        assert!(matches!(err, MatchError::RoundAlreadyJudged(1)));
        assert_eq!(ledger.get(1).unwrap().scored_team, Some(Team::A));
    }

    #[test]
    fn test_judge_unknown_round() {
        let mut ledger = ledger_with(&[Level::One]);
        assert!(matches!(
            ledger.judge(0, JudgeSelection::NoOne, Utc::now()),
            Err(MatchError::RoundNotFound(0))
        ));
        assert!(matches!(
            ledger.judge(2, JudgeSelection::NoOne, Utc::now()),
            Err(MatchError::RoundNotFound(2))
        ));
    }

    #[test]
    fn test_no_one_records_verdict_without_points() {
        let mut ledger = ledger_with(&[Level::Three]);
        let delta = ledger.judge(1, JudgeSelection::NoOne, Utc::now()).unwrap();
        assert_eq!(delta.points, 0);

        let round = ledger.get(1).unwrap();
        assert!(round.is_judged());
        assert_eq!(round.scored_team, None);
        assert_eq!(round.scored_points, 0);
    }
}
