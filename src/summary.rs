use serde::{Deserialize, Serialize};

use crate::ledger::RoundLedger;
use crate::scoring::{JudgeSelection, Team};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    TeamA,
    TeamB,
    Draw,
}

impl Winner {
    pub fn team(self) -> Option<Team> {
        match self {
            Winner::TeamA => Some(Team::A),
            Winner::TeamB => Some(Team::B),
            Winner::Draw => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(rename = "teamA")]
    pub team_a: u32,
    #[serde(rename = "teamB")]
    pub team_b: u32,
}

impl Scores {
    /// Equal scores are a draw.
    pub fn winner(&self) -> Winner {
        match self.team_a.cmp(&self.team_b) {
            std::cmp::Ordering::Greater => Winner::TeamA,
            std::cmp::Ordering::Less => Winner::TeamB,
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }
}

/// Final statistics of a match, computed once when it finishes.
///
/// `total_rounds` counts every round that was served. Rounds that were never
/// judged score nothing and are counted in `unresolved`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "teamA_correct")]
    pub team_a_correct: u32,
    #[serde(rename = "teamB_correct")]
    pub team_b_correct: u32,
    pub no_one: u32,
    pub unresolved: u32,
    pub total_rounds: u32,
    pub scores: Scores,
    pub winner: Winner,
}

impl Summary {
    pub fn compute(ledger: &RoundLedger, scores: Scores) -> Self {
        let mut summary = Summary {
            team_a_correct: 0,
            team_b_correct: 0,
            no_one: 0,
            unresolved: 0,
            total_rounds: ledger.len() as u32,
            scores,
            winner: scores.winner(),
        };
        for round in ledger.iter() {
            match round.judge_selection {
                Some(JudgeSelection::TeamA) => summary.team_a_correct += 1,
                Some(JudgeSelection::TeamB) => summary.team_b_correct += 1,
                Some(JudgeSelection::NoOne) => summary.no_one += 1,
                None => summary.unresolved += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CategoryId, QuestionId};
    use crate::scoring::Level;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_winner_by_strict_comparison() {
        let s = |a, b| Scores {
            team_a: a,
            team_b: b,
        };
        assert_eq!(s(300, 200).winner(), Winner::TeamA);
        assert_eq!(s(0, 100).winner(), Winner::TeamB);
        assert_eq!(s(500, 500).winner(), Winner::Draw);
        assert_eq!(s(0, 0).winner(), Winner::Draw);
    }

    #[test]
    fn test_counts_verdicts_and_unresolved() {
        let c = CategoryId(Uuid::new_v4());
        let mut ledger = RoundLedger::new();
        for level in [Level::One, Level::Two, Level::Three, Level::One] {
            ledger.append(c, level, QuestionId(Uuid::new_v4()), Utc::now());
        }
        ledger.judge(1, JudgeSelection::TeamA, Utc::now()).unwrap();
        ledger.judge(2, JudgeSelection::TeamB, Utc::now()).unwrap();
        ledger.judge(3, JudgeSelection::NoOne, Utc::now()).unwrap();

        let summary = Summary::compute(
            &ledger,
            Scores {
                team_a: 100,
                team_b: 200,
            },
        );
        assert_eq!(summary.team_a_correct, 1);
        assert_eq!(summary.team_b_correct, 1);
        assert_eq!(summary.no_one, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.total_rounds, 4);
        assert_eq!(summary.winner, Winner::TeamB);
    }

    #[test]
    fn test_wire_field_names() {
        let summary = Summary::compute(&RoundLedger::new(), Scores::default());
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["teamA_correct"], 0);
        assert_eq!(value["scores"]["teamB"], 0);
        assert_eq!(value["winner"], "DRAW");
    }
}
