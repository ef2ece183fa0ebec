//! HTTP request handlers (SPEC_FULL.md §4.10). Each handler deserializes a
//! request, calls exactly one method on a service in `AppState`, and maps
//! the result to a response — no session, plugin, or lifecycle logic lives
//! here.

use super::types::{
    AdminStatsResponse, AnswerRequest, CandidateListResponse, CandidateRequest, CheckScriptRequest,
    CheckScriptResponse, CommandRequest, CommandResponse, CreateSessionRequest, ErrorResponse,
    HeartbeatRequest, MjpegQuery, OfferResponse, ResumeAutomationRequest, SessionListResponse,
    SessionResponse, StartManualRequest, StreamEntrySummary, StreamListResponse, SuccessResponse,
};
use super::AppState;
use crate::dispatcher::Command;
use crate::errors::CoreError;
use crate::live_stream::StreamParams;
use crate::session::{CreateOptions, SessionKey};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream;
use std::time::Duration;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tenants/:tenant_id/sessions", post(create_session))
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/status",
            get(get_status),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/heartbeat",
            post(heartbeat),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/manual/start",
            post(start_manual),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/manual/resume",
            post(resume_automation),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/commands",
            post(dispatch_command),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/release",
            post(release_session),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/stream/mjpeg",
            get(mjpeg_stream),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/webrtc/offer",
            post(create_offer),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/webrtc/answer",
            post(set_answer),
        )
        .route(
            "/tenants/:tenant_id/sessions/:profile_id/webrtc/candidates",
            post(add_remote_candidate).get(get_local_candidates),
        )
        .route("/scripts/check", post(check_script))
        .route("/admin/sessions", get(admin_sessions))
        .route("/admin/streams", get(admin_streams))
        .route("/admin/stats", get(admin_stats))
        .with_state(state)
}

/// Maps every `CoreError` variant to an HTTP status — the only place in the
/// transport layer that knows this mapping.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::ProfileNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::NoWebRtcConnection(_) => StatusCode::NOT_FOUND,
            CoreError::DriverOpenFailed { .. } => StatusCode::BAD_GATEWAY,
            CoreError::DriverOperationFailed(_) => StatusCode::BAD_GATEWAY,
            CoreError::PageClosed => StatusCode::CONFLICT,
            CoreError::PriorityConflict { .. } => StatusCode::CONFLICT,
            CoreError::ManualModeRequired => StatusCode::FORBIDDEN,
            CoreError::ScriptUnsafe(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::FingerprintLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::InvalidCandidate(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorResponse::new(self.0.to_string()))).into_response()
    }
}

async fn create_session(
    State(state): State<AppState>,
    Path(tenant_id): Path<u64>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, req.profile_id);
    let opts = CreateOptions {
        headless: req.headless,
        cleanup_policy: None,
        expires_in: req.expires_in_secs.map(Duration::from_secs),
    };
    state.pool.create(key, opts).await?;
    let status = status_for(&state, key).await?;
    Ok(Json(SessionResponse { status }))
}

async fn get_status(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
) -> Result<Json<SessionResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    let status = status_for(&state, key).await?;
    Ok(Json(SessionResponse { status }))
}

async fn status_for(state: &AppState, key: SessionKey) -> Result<crate::session::SessionStatus, ApiError> {
    state
        .pool
        .snapshot()
        .await
        .into_iter()
        .find(|s| s.key == key)
        .ok_or_else(|| ApiError(CoreError::SessionNotFound(key)))
}

async fn heartbeat(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    state.lifecycle.heartbeat(key, req.client_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn start_manual(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
    Json(req): Json<StartManualRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    state.lifecycle.start_manual(key, req.priority).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn resume_automation(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
    Json(req): Json<ResumeAutomationRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    state.lifecycle.resume_automation(key, req.force).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn dispatch_command(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    let command: Command = req.into();
    let result = state.dispatcher.dispatch(key, command).await?;
    Ok(Json(CommandResponse { result }))
}

async fn release_session(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    state.pool.release(key, false).await?;
    state.webrtc.close(key).await;
    Ok(Json(SuccessResponse { success: true }))
}

/// Streams MJPEG frames as a `multipart/x-mixed-replace` body until the
/// session disappears or a frame can't be produced, at which point the
/// stream entry is unregistered and the body ends.
async fn mjpeg_stream(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
    Query(query): Query<MjpegQuery>,
) -> Result<Response, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    if state.pool.get(key).await.is_none() {
        return Err(ApiError(CoreError::SessionNotFound(key)));
    }
    let defaults = StreamParams::default();
    let params = StreamParams {
        fps: query.fps.unwrap_or(defaults.fps),
        quality: query.quality.unwrap_or(defaults.quality),
        width: query.width,
        height: query.height,
    };
    let frame_interval = Duration::from_millis(1000 / u64::from(params.fps.max(1)));
    state
        .live_stream
        .register(key, crate::live_stream::StreamKind::Mjpeg, params)
        .await;

    let live_stream = state.live_stream.clone();
    let body_stream = stream::unfold((live_stream, key), move |(live_stream, key)| async move {
        tokio::time::sleep(frame_interval).await;
        match live_stream.next_frame(key).await {
            Ok(frame) => {
                let mut chunk = Vec::with_capacity(frame.jpeg.len() + 64);
                chunk.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: ");
                chunk.extend_from_slice(frame.jpeg.len().to_string().as_bytes());
                chunk.extend_from_slice(b"\r\n\r\n");
                chunk.extend_from_slice(&frame.jpeg);
                chunk.extend_from_slice(b"\r\n");
                Some((Ok::<_, std::io::Error>(chunk), (live_stream, key)))
            }
            Err(_) => {
                live_stream.unregister(key).await;
                None
            }
        }
    });

    Response::builder()
        .header("Content-Type", "multipart/x-mixed-replace; boundary=frame")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError(CoreError::DriverOperationFailed(crate::errors::DriverError::Transient(e.to_string()))))
}

async fn create_offer(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
) -> Result<Json<OfferResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    let sdp = state.webrtc.create_offer(key).await?;
    Ok(Json(OfferResponse { sdp }))
}

async fn set_answer(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    state.webrtc.set_answer(key, &req.sdp).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn add_remote_candidate(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
    Json(req): Json<CandidateRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    state.webrtc.add_remote_candidate(key, req.into()).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_local_candidates(
    State(state): State<AppState>,
    Path((tenant_id, profile_id)): Path<(u64, u64)>,
) -> Result<Json<CandidateListResponse>, ApiError> {
    let key = SessionKey::new(tenant_id, profile_id);
    let (candidates, gathering_state) = state.webrtc.get_local_candidates(key).await?;
    Ok(Json(CandidateListResponse {
        candidates: candidates.into_iter().map(Into::into).collect(),
        gathering_state: match gathering_state {
            crate::webrtc::GatheringState::New => "new",
            crate::webrtc::GatheringState::Gathering => "gathering",
            crate::webrtc::GatheringState::Complete => "complete",
        },
    }))
}

async fn check_script(
    State(state): State<AppState>,
    Json(req): Json<CheckScriptRequest>,
) -> Json<CheckScriptResponse> {
    let verdict = state.safety.check(&req.code, req.strict);
    Json(verdict.into())
}

async fn admin_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.pool.snapshot().await,
    })
}

async fn admin_streams(State(state): State<AppState>) -> Json<StreamListResponse> {
    let streams = state
        .live_stream
        .snapshot()
        .await
        .into_iter()
        .map(|(key, kind)| StreamEntrySummary { key, kind })
        .collect();
    Json(StreamListResponse { streams })
}

async fn admin_stats(State(state): State<AppState>) -> Json<AdminStatsResponse> {
    Json(AdminStatsResponse {
        active_sessions: state.pool.snapshot().await.len(),
        registered_streams: state.live_stream.snapshot().await.len(),
    })
}
