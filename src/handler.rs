use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{MatchEvent, Scoreboard};
use crate::extract::{JsonBody, Owner, PathParams, QueryParams};
use crate::feed::forward_scoreboard;
use crate::schema::{
    AnswerResponse, CreateMatchSchema, FinishResponse, GetMatchSchema, JudgeResponse, JudgeSchema,
    LastRoundSchema, ListMatchesQuery, NextQuestionResponse, NextQuestionSchema, PatchTeamsSchema,
};
use crate::scoring::{JudgeSelection, Level};
use crate::AppState;

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn get_matches_handler(
    Owner(owner): Owner,
    QueryParams(query): QueryParams<ListMatchesQuery>,
    State(data): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let matches = data.matches.list(owner, &query.into()).await?;
    let matches: Vec<GetMatchSchema> = matches.iter().map(GetMatchSchema::from).collect();

    Ok(Json(json!({
        "count": matches.len(),
        "matches": matches
    })))
}

pub async fn create_match_handler(
    Owner(owner): Owner,
    State(data): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateMatchSchema>,
) -> Result<impl IntoResponse, AppError> {
    let m = data.matches.create(body.into_new_match(owner)).await?;
    Ok((StatusCode::CREATED, Json(GetMatchSchema::from(&m))))
}

pub async fn get_match_by_id_handler(
    Owner(owner): Owner,
    PathParams(match_id): PathParams<Uuid>,
    State(data): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let m = data.matches.get(owner, match_id).await?;
    Ok(Json(GetMatchSchema::from(&m)))
}

pub async fn delete_match_handler(
    Owner(owner): Owner,
    PathParams(match_id): PathParams<Uuid>,
    State(data): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    data.matches.delete(owner, match_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn patch_teams_handler(
    Owner(owner): Owner,
    PathParams(match_id): PathParams<Uuid>,
    State(data): State<Arc<AppState>>,
    JsonBody(body): JsonBody<PatchTeamsSchema>,
) -> Result<impl IntoResponse, AppError> {
    let m = data
        .matches
        .patch_teams(owner, match_id, body.into())
        .await?;
    Ok(Json(GetMatchSchema::from(&m)))
}

pub async fn next_question_handler(
    Owner(owner): Owner,
    PathParams(match_id): PathParams<Uuid>,
    State(data): State<Arc<AppState>>,
    JsonBody(body): JsonBody<NextQuestionSchema>,
) -> Result<impl IntoResponse, AppError> {
    let level = Level::try_from(body.level)?;
    let served = data
        .matches
        .next_question(owner, match_id, body.category_id, level)
        .await?;
    Ok(Json(NextQuestionResponse::from(served)))
}

pub async fn judge_handler(
    Owner(owner): Owner,
    PathParams(match_id): PathParams<Uuid>,
    State(data): State<Arc<AppState>>,
    JsonBody(body): JsonBody<JudgeSchema>,
) -> Result<impl IntoResponse, AppError> {
    let selection: JudgeSelection = body.judge_selection.parse()?;
    let outcome = data
        .matches
        .judge(owner, match_id, body.round_no, selection)
        .await?;

    Ok(Json(JudgeResponse {
        ok: true,
        scores: outcome.scores,
        last_round: LastRoundSchema {
            round_no: outcome.round_no,
            judge_selection: outcome.judge_selection,
            scored_points: outcome.scored_points,
        },
    }))
}

pub async fn finish_match_handler(
    Owner(owner): Owner,
    PathParams(match_id): PathParams<Uuid>,
    State(data): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let m = data.matches.finish(owner, match_id).await?;
    Ok(Json(FinishResponse::try_from(&m)?))
}

pub async fn round_hint_handler(
    Owner(owner): Owner,
    PathParams((match_id, round_no)): PathParams<(Uuid, u32)>,
    State(data): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(data.matches.round_hint(owner, match_id, round_no).await?))
}

pub async fn round_answer_handler(
    Owner(owner): Owner,
    PathParams((match_id, round_no)): PathParams<(Uuid, u32)>,
    State(data): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let answer = data.matches.round_answer(owner, match_id, round_no).await?;
    Ok(Json(AnswerResponse { answer }))
}

pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    PathParams(match_id): PathParams<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribed before the upgrade, so nothing published during the handshake is lost.
    // Unknown matches are refused here.
    let (rx, scoreboard) = state.matches.watch(match_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket_connection(socket, state, rx, scoreboard)))
}

async fn handle_socket_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    rx: broadcast::Receiver<MatchEvent>,
    initial: Scoreboard,
) {
    let match_id = initial.match_id;

    let current_connections = state.connection_count.fetch_add(1, Ordering::SeqCst);
    tracing::info!(
        %match_id,
        "New viewer. Total connections: {}",
        current_connections + 1
    );

    let (mut sender, mut receiver) = socket.split();

    // Sends the scoreboard, then this match's events
    let mut send_task = {
        let state = state.clone();
        tokio::spawn(async move {
            let refresh = || state.matches.scoreboard(match_id);
            if let Err(e) = forward_scoreboard(&mut sender, rx, initial, refresh).await {
                tracing::debug!(%match_id, "viewer socket closed: {}", e);
            }
            let _ = sender.close().await;
        })
    };

    // Viewers only listen; drain until the client goes away
    let mut receive_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    let client_left = tokio::select! {
        _ = &mut send_task => {
            receive_task.abort();
            false
        }
        _ = &mut receive_task => true,
    };
    if client_left {
        send_task.abort();
        // The receiver has to be dropped before the channel can be released
        let _ = send_task.await;
    }

    state.matches.unwatch(match_id);
    let remaining = state.connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
    tracing::info!(%match_id, "Viewer left. Remaining connections: {}", remaining);
}
