//! View feed request handlers

use super::server::AppContext;
use crate::connection::ConnectionState;
use crate::marquee::Marquee;
use crate::playback::DisplayedCall;
use axum::{extract::State, Json};
use qcall_common::CallEvent;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
    pub uptime_secs: i64,
    pub audio_output: String,
    pub connection: ConnectionState,
}

#[derive(Debug, Serialize)]
pub struct DisplayResponse {
    pub display: Option<DisplayedCall>,
}

#[derive(Debug, Serialize)]
pub struct BoardResponse {
    pub board: Vec<CallEvent>,
}

#[derive(Debug, Serialize)]
pub struct MarqueeResponse {
    pub marquee: Option<Marquee>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub state: ConnectionState,
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let uptime = qcall_common::time::now() - ctx.state.started_at;
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "announcer".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        uptime_secs: uptime.num_seconds(),
        audio_output: ctx.audio_output.clone(),
        connection: ctx.state.get_connection().await,
    })
}

/// GET /api/v1/display - the call currently on screen, if any
pub async fn get_display(State(ctx): State<AppContext>) -> Json<DisplayResponse> {
    Json(DisplayResponse {
        display: ctx.state.get_display().await,
    })
}

/// GET /api/v1/board
pub async fn get_board(State(ctx): State<AppContext>) -> Json<BoardResponse> {
    Json(BoardResponse {
        board: ctx.state.get_board().await,
    })
}

/// GET /api/v1/marquee - last successfully polled marquee
pub async fn get_marquee(State(ctx): State<AppContext>) -> Json<MarqueeResponse> {
    Json(MarqueeResponse {
        marquee: ctx.state.get_marquee().await,
    })
}

/// GET /api/v1/connection
pub async fn get_connection(State(ctx): State<AppContext>) -> Json<ConnectionResponse> {
    Json(ConnectionResponse {
        state: ctx.state.get_connection().await,
    })
}
