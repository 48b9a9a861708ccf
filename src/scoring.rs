use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Difficulty level of a question. Only 1, 2 and 3 exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    One,
    Two,
    Three,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::One, Level::Two, Level::Three];

    /// Points awarded for a correct answer at this level.
    pub fn points(self) -> u32 {
        match self {
            Level::One => 100,
            Level::Two => 200,
            Level::Three => 500,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Level::One => 1,
            Level::Two => 2,
            Level::Three => 3,
        }
    }
}

impl TryFrom<i64> for Level {
    type Error = MatchError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Level::One),
            2 => Ok(Level::Two),
            3 => Ok(Level::Three),
            _ => Err(MatchError::InvalidLevel(n)),
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = MatchError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Level::try_from(i64::from(n))
    }
}

// For sqlx rows, which carry smallint
impl TryFrom<i16> for Level {
    type Error = MatchError;

    fn try_from(n: i16) -> Result<Self, Self::Error> {
        Level::try_from(i64::from(n))
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.as_u8()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    A,
    B,
}

/// The judge's verdict for a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JudgeSelection {
    TeamA,
    TeamB,
    NoOne,
}

impl JudgeSelection {
    pub fn team(self) -> Option<Team> {
        match self {
            JudgeSelection::TeamA => Some(Team::A),
            JudgeSelection::TeamB => Some(Team::B),
            JudgeSelection::NoOne => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JudgeSelection::TeamA => "TEAM_A",
            JudgeSelection::TeamB => "TEAM_B",
            JudgeSelection::NoOne => "NO_ONE",
        }
    }
}

impl FromStr for JudgeSelection {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEAM_A" => Ok(JudgeSelection::TeamA),
            "TEAM_B" => Ok(JudgeSelection::TeamB),
            "NO_ONE" => Ok(JudgeSelection::NoOne),
            _ => Err(MatchError::InvalidJudgeSelection(s.to_string())),
        }
    }
}

impl fmt::Display for JudgeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score change produced by judging a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreDelta {
    pub team: Option<Team>,
    pub points: u32,
}

/// Maps a verdict on a question of `level` to the points it is worth.
/// Nobody scores on `NO_ONE`, and there is no partial credit.
pub fn score_delta(level: Level, selection: JudgeSelection) -> ScoreDelta {
    match selection.team() {
        Some(team) => ScoreDelta {
            team: Some(team),
            points: level.points(),
        },
        None => ScoreDelta {
            team: None,
            points: 0,
        },
    }
}
