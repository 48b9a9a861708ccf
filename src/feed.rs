//! What a scoreboard viewer receives over its socket.
//!
//! The first frame is `{"type": "scoreboard", ...}` with the current state,
//! followed by the match's events. A viewer that falls behind gets a fresh
//! scoreboard in place of the events it missed. The feed ends once the match
//! is finished.

use std::future::Future;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::MatchError;
use crate::events::{MatchEvent, Scoreboard};
use crate::game::MatchStatus;

pub fn scoreboard_frame(board: &Scoreboard) -> Message {
    Message::Text(json!({ "type": "scoreboard", "scoreboard": board }).to_string())
}

fn event_frame(event: &MatchEvent) -> Message {
    Message::Text(json!(event).to_string())
}

/// Streams one match to one viewer. `refresh` reloads the scoreboard after
/// the viewer lagged. Returns when the match finishes, the match is gone or
/// the sink fails.
pub async fn forward_scoreboard<S, F, Fut>(
    sink: &mut S,
    mut rx: broadcast::Receiver<MatchEvent>,
    initial: Scoreboard,
    refresh: F,
) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Scoreboard, MatchError>>,
{
    let match_id = initial.match_id;
    sink.send(scoreboard_frame(&initial)).await?;
    if initial.status == MatchStatus::Finished {
        return Ok(());
    }

    loop {
        match rx.recv().await {
            Ok(event) => {
                sink.send(event_frame(&event)).await?;
                if let MatchEvent::MatchFinished { .. } = event {
                    return Ok(());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%match_id, skipped, "viewer lagged behind, resending scoreboard");
                let board = match refresh().await {
                    Ok(board) => board,
                    Err(e) => {
                        tracing::debug!(%match_id, code = e.code(), "scoreboard no longer available");
                        return Ok(());
                    }
                };
                sink.send(scoreboard_frame(&board)).await?;
                if board.status == MatchStatus::Finished {
                    return Ok(());
                }
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures::channel::mpsc;
    use futures::StreamExt;
    use serde_json::Value;
    use uuid::Uuid;

    use crate::catalog::{CategoryId, InMemoryCatalog};
    use crate::events::{EventBus, CHANNEL_CAPACITY};
    use crate::game::NewMatch;
    use crate::repository::InMemoryMatchRepository;
    use crate::scoring::{JudgeSelection, Level};
    use crate::service::{EngineSettings, MatchService};
    use crate::summary::{Scores, Winner};

    async fn run<F, Fut>(rx: broadcast::Receiver<MatchEvent>, initial: Scoreboard, refresh: F) -> Vec<Value>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Scoreboard, MatchError>>,
    {
        let (mut tx, frames) = mpsc::unbounded::<Message>();
        forward_scoreboard(&mut tx, rx, initial, refresh).await.unwrap();
        drop(tx);
        frames
            .map(|frame| match frame {
                Message::Text(text) => serde_json::from_str(&text).unwrap(),
                other => panic!("unexpected frame {:?}", other),
            })
            .collect()
            .await
    }

    fn service_with_category() -> (MatchService, CategoryId) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let category = catalog.add_category(true);
        catalog.add_question(category, Level::One, "capital of Chile");
        let service = MatchService::new(
            Arc::new(InMemoryMatchRepository::new()),
            catalog,
            EngineSettings::default(),
        );
        (service, category)
    }

    async fn new_match(service: &MatchService, owner: Uuid, category: CategoryId) -> Uuid {
        service
            .create(NewMatch {
                owner,
                categories: vec![category],
                ..NewMatch::default()
            })
            .await
            .unwrap()
            .id()
    }

    #[tokio::test]
    async fn test_snapshot_then_events_until_finished() {
        let (service, category) = service_with_category();
        let owner = Uuid::new_v4();
        let id = new_match(&service, owner, category).await;

        let (rx, board) = service.watch(id).await.unwrap();
        // Played while the socket is still being set up
        service.next_question(owner, id, category, Level::One).await.unwrap();
        service.judge(owner, id, 1, JudgeSelection::TeamA).await.unwrap();
        service.finish(owner, id).await.unwrap();

        let frames = run(rx, board, || service.scoreboard(id)).await;
        let types: Vec<&str> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec!["scoreboard", "round_served", "round_judged", "match_finished"]
        );
        assert_eq!(frames[0]["scoreboard"]["scores"]["teamA"], 0);
        assert_eq!(frames[2]["scores"]["teamA"], 100);
        assert_eq!(frames[3]["winner"], "TEAM_A");

        for frame in &frames {
            let text = frame.to_string();
            assert!(!text.contains("prompt"), "{}", text);
            assert!(!text.contains("question_id"), "{}", text);
            assert!(!text.contains("capital of Chile"), "{}", text);
        }
    }

    #[tokio::test]
    async fn test_other_matches_are_not_forwarded() {
        let (service, category) = service_with_category();
        let owner = Uuid::new_v4();
        let watched = new_match(&service, owner, category).await;
        let other = new_match(&service, owner, category).await;

        let (rx, board) = service.watch(watched).await.unwrap();
        service.next_question(owner, other, category, Level::One).await.unwrap();
        service.finish(owner, other).await.unwrap();
        service.finish(owner, watched).await.unwrap();

        let frames = run(rx, board, || service.scoreboard(watched)).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["type"], "match_finished");
        assert_eq!(frames[1]["match_id"], watched.to_string());
    }

    #[tokio::test]
    async fn test_finished_match_sends_only_snapshot() {
        let (service, category) = service_with_category();
        let owner = Uuid::new_v4();
        let id = new_match(&service, owner, category).await;
        service.finish(owner, id).await.unwrap();

        let (rx, board) = service.watch(id).await.unwrap();
        let frames = run(rx, board, || service.scoreboard(id)).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["scoreboard"]["status"], "finished");
    }

    #[tokio::test]
    async fn test_lagged_viewer_gets_fresh_scoreboard() {
        let bus = EventBus::new();
        let match_id = Uuid::new_v4();
        let rx = bus.subscribe(match_id);
        let board = |team_a: u32| Scoreboard {
            match_id,
            status: MatchStatus::Active,
            team_a_name: "Falcons".into(),
            team_b_name: "Owls".into(),
            scores: Scores { team_a, team_b: 0 },
            rounds_played: 0,
        };

        for round_no in 1..=(CHANNEL_CAPACITY as u32 + 5) {
            bus.publish(MatchEvent::RoundJudged {
                match_id,
                round_no,
                judge_selection: JudgeSelection::TeamA,
                scored_points: 100,
                scores: Scores {
                    team_a: round_no * 100,
                    team_b: 0,
                },
            });
        }
        bus.publish(MatchEvent::MatchFinished {
            match_id,
            scores: Scores::default(),
            winner: Winner::TeamA,
        });

        let frames = run(rx, board(0), || async { Ok(board(6900)) }).await;
        assert_eq!(frames[0]["type"], "scoreboard");
        assert_eq!(frames[1]["type"], "scoreboard");
        assert_eq!(frames[1]["scoreboard"]["scores"]["teamA"], 6900);
        assert_eq!(frames.last().unwrap()["type"], "match_finished");
        assert_eq!(frames.len(), 2 + CHANNEL_CAPACITY);
    }
}
