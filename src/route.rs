use std::sync::Arc;

use axum::{
    routing::{any, get, patch, post},
    Router,
};

use crate::handler::{
    create_match_handler, delete_match_handler, finish_match_handler, get_match_by_id_handler,
    get_matches_handler, handle_websocket, health_handler, judge_handler, next_question_handler,
    patch_teams_handler, round_answer_handler, round_hint_handler,
};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/matches/:match_id", any(handle_websocket))
        .route(
            "/api/matches",
            get(get_matches_handler).post(create_match_handler),
        )
        .route(
            "/api/matches/:match_id",
            get(get_match_by_id_handler).delete(delete_match_handler),
        )
        .route("/api/matches/:match_id/teams", patch(patch_teams_handler))
        .route(
            "/api/matches/:match_id/next-question",
            post(next_question_handler),
        )
        .route("/api/matches/:match_id/judge", post(judge_handler))
        .route("/api/matches/:match_id/finish", post(finish_match_handler))
        .route(
            "/api/matches/:match_id/rounds/:round_no/hint",
            get(round_hint_handler),
        )
        .route(
            "/api/matches/:match_id/rounds/:round_no/answer",
            get(round_answer_handler),
        )
        .with_state(state)
}
