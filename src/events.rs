//! Scoreboard events broadcast to live viewers of a match.
//!
//! Events carry round metadata and scores only, never question content.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::catalog::CategoryId;
use crate::game::{Match, MatchStatus};
use crate::scoring::{JudgeSelection, Level};
use crate::summary::{Scores, Winner};

/// Events buffered per match before a slow viewer starts lagging.
pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    RoundServed {
        match_id: Uuid,
        round_no: u32,
        category_id: CategoryId,
        level: Level,
        points: u32,
    },
    RoundJudged {
        match_id: Uuid,
        round_no: u32,
        judge_selection: JudgeSelection,
        scored_points: u32,
        scores: Scores,
    },
    MatchFinished {
        match_id: Uuid,
        scores: Scores,
        winner: Winner,
    },
}

impl MatchEvent {
    pub fn match_id(&self) -> Uuid {
        match self {
            MatchEvent::RoundServed { match_id, .. }
            | MatchEvent::RoundJudged { match_id, .. }
            | MatchEvent::MatchFinished { match_id, .. } => *match_id,
        }
    }
}

/// Sent once when a viewer connects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scoreboard {
    pub match_id: Uuid,
    pub status: MatchStatus,
    pub team_a_name: String,
    pub team_b_name: String,
    pub scores: Scores,
    pub rounds_played: u32,
}

impl From<&Match> for Scoreboard {
    fn from(m: &Match) -> Self {
        Self {
            match_id: m.id(),
            status: m.status(),
            team_a_name: m.teams().a.name.clone(),
            team_b_name: m.teams().b.name.clone(),
            scores: m.scores(),
            rounds_played: m.rounds().len() as u32,
        }
    }
}

/// One broadcast channel per watched match, so a busy match never pushes
/// another match's events out of its viewers' queues.
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<DashMap<Uuid, broadcast::Sender<MatchEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events for matches nobody watches are dropped.
    pub fn publish(&self, event: MatchEvent) {
        let match_id = event.match_id();
        let delivered = match self.channels.get(&match_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => return,
        };
        if !delivered {
            self.release(match_id);
        }
    }

    pub fn subscribe(&self, match_id: Uuid) -> broadcast::Receiver<MatchEvent> {
        self.channels
            .entry(match_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drops the match's channel once its last viewer is gone.
    pub fn release(&self, match_id: Uuid) {
        self.channels
            .remove_if(&match_id, |_, tx| tx.receiver_count() == 0);
    }

    /// Number of matches with a live channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
