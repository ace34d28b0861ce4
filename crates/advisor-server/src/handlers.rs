//! HTTP/WebSocket Handlers

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use advisor_core::{provider::ModelInfo, AgentError, ReplyBuffer, SessionId, TurnOutcome};
use bond_advisor::{
    view::{self, InstrumentRow, MarketView, TranscriptView},
    AdvisorError, AdvisorySession, RiskProfile, SessionEvent,
};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub market: String,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct RiskProfileRequest {
    pub risk_profile: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Frames sent over the chat WebSocket
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One delta plus everything received so far, cursor included
    Chunk { delta: String, display: String },
    Done { content: String },
    Error { error: String },
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn api_error(err: &AdvisorError) -> ApiError {
    let (status, code) = match err {
        AdvisorError::Agent(AgentError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        AdvisorError::Agent(AgentError::Session(_)) => (StatusCode::CONFLICT, "SESSION_BUSY"),
        AdvisorError::Agent(AgentError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "EMPTY_MESSAGE"),
        AdvisorError::InvalidRiskProfile(_) => (StatusCode::BAD_REQUEST, "INVALID_RISK_PROFILE"),
        _ => {
            tracing::error!("Advisor error: {}", err);
            (StatusCode::BAD_GATEWAY, "ADVISOR_OFFLINE")
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.advisor.provider();
    let provider_connected = provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: provider.name().to_string(),
        provider_connected,
        market: state.advisor.market().name().to_string(),
        sessions: state.sessions.len(),
    })
}

/// Models offered by the provider
pub async fn list_models(State(state): State<AppState>) -> ApiResult<Json<Vec<ModelInfo>>> {
    let models = state
        .advisor
        .provider()
        .list_models()
        .await
        .map_err(|e| api_error(&e.into()))?;
    Ok(Json(models))
}

/// Yield metrics, market status and chart series
pub async fn market(State(state): State<AppState>) -> ApiResult<Json<MarketView>> {
    view::market_view(state.advisor.market())
        .map(Json)
        .ok_or_else(|| api_error(&AdvisorError::MarketData("yield series is empty".into())))
}

/// The bond ETF pool
pub async fn instruments(State(state): State<AppState>) -> Json<Vec<InstrumentRow>> {
    Json(view::instrument_rows(state.advisor.market().instruments()))
}

/// Start a session seeded with the greeting
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<TranscriptView>)> {
    let session = AdvisorySession::start();
    let transcript = view::transcript_view(&session);

    state
        .sessions
        .insert(session)
        .map_err(|e| api_error(&e.into()))?;
    tracing::info!(session = %transcript.session_id, "session created");

    Ok((StatusCode::CREATED, Json(transcript)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TranscriptView>> {
    let session = state
        .sessions
        .get(&SessionId::from_string(id))
        .map_err(|e| api_error(&e.into()))?;
    Ok(Json(view::transcript_view(&session)))
}

/// End a session, e.g. when the page is closed
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = SessionId::from_string(id);
    let removed = state
        .sessions
        .remove(&id)
        .map_err(|e| api_error(&e.into()))?;
    if !removed {
        return Err(api_error(&AgentError::NotFound(format!("session {id}")).into()));
    }

    tracing::info!(session = %id, "session ended");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_risk_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RiskProfileRequest>,
) -> ApiResult<Json<TranscriptView>> {
    let profile: RiskProfile = payload.risk_profile.parse().map_err(|e| api_error(&e))?;
    apply_event(&state, &SessionId::from_string(id), SessionEvent::SelectRisk(profile))
}

/// Clear the whole history. The greeting is not re-added.
pub async fn clear_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TranscriptView>> {
    apply_event(&state, &SessionId::from_string(id), SessionEvent::Clear)
}

fn apply_event(state: &AppState, id: &SessionId, event: SessionEvent) -> ApiResult<Json<TranscriptView>> {
    let transcript = state
        .sessions
        .update(id, |s| {
            Ok(s.apply(event).map(|delta| {
                tracing::debug!(session = %id, ?delta, "session event applied");
                view::transcript_view(s)
            }))
        })
        .map_err(|e| api_error(&e.into()))?
        .map_err(|e| api_error(&e))?;
    Ok(Json(transcript))
}

/// One full turn, reply returned whole
pub async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let id = SessionId::from_string(id);
    let report = state
        .advisor
        .chat(&state.sessions, &id, &payload.message, |_| {})
        .await
        .map_err(|e| api_error(&e))?;

    match report.outcome {
        TurnOutcome::Completed(message) => Ok(Json(ChatResponse {
            message,
            session_id: id.to_string(),
            model: state.advisor.options().model.clone(),
        })),
        TurnOutcome::Failed { error, .. } => Err(api_error(&error.into())),
    }
}

/// WebSocket streaming chat
pub async fn chat_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let id = SessionId::from_string(id);
    if let Err(e) = state.sessions.get(&id) {
        return api_error(&e.into()).into_response();
    }
    ws.on_upgrade(move |socket| handle_stream(socket, state, id))
}

async fn handle_stream(socket: WebSocket, state: AppState, id: SessionId) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let request: ChatRequest = match serde_json::from_str(text.as_str()) {
            Ok(r) => r,
            Err(e) => {
                let frame = ServerFrame::Error {
                    error: format!("Invalid request: {e}"),
                };
                if !send_frame(&mut sender, &frame).await {
                    break;
                }
                continue;
            }
        };

        if !stream_turn(&state, &id, &request.message, &mut sender).await {
            break;
        }
    }

    tracing::debug!(session = %id, "chat stream closed");
}

/// Run one turn, forwarding every delta to `sink`.
///
/// The turn is always closed on the session, including when the client goes
/// away mid-reply or this future is dropped. Returns `false` once the client
/// can no longer be reached.
pub async fn stream_turn<S>(state: &AppState, id: &SessionId, message: &str, sink: &mut S) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    let advisor = &state.advisor;
    let turn = match advisor.open_turn(&state.sessions, id, message) {
        Ok(turn) => turn,
        Err(e) => {
            let frame = ServerFrame::Error {
                error: e.user_message(),
            };
            return send_frame(sink, &frame).await;
        }
    };

    let mut connected = true;
    let outcome = match advisor.stream_reply(turn.pending().risk_profile, message).await {
        Err(e) => TurnOutcome::Failed {
            partial: String::new(),
            error: e.into_agent_error(),
        },
        Ok(mut stream) => {
            let mut buffer = ReplyBuffer::new();
            loop {
                match stream.next().await {
                    Some(Ok(delta)) => {
                        buffer.push(&delta);
                        let frame = ServerFrame::Chunk {
                            delta,
                            display: buffer.display(),
                        };
                        if !send_frame(sink, &frame).await {
                            connected = false;
                            break TurnOutcome::Failed {
                                partial: buffer.text().to_string(),
                                error: AgentError::Transport("client disconnected".into()),
                            };
                        }
                    }
                    Some(Err(error)) => {
                        break TurnOutcome::Failed {
                            partial: buffer.text().to_string(),
                            error,
                        };
                    }
                    None => break TurnOutcome::Completed(buffer.finish()),
                }
            }
        }
    };

    let report = turn.finish(outcome);
    if !connected {
        return false;
    }

    let frame = match report.outcome {
        TurnOutcome::Completed(content) => ServerFrame::Done { content },
        TurnOutcome::Failed { error, .. } => ServerFrame::Error {
            error: error.user_message(),
        },
    };
    send_frame(sink, &frame).await
}

async fn send_frame<S>(sink: &mut S, frame: &ServerFrame) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Could not encode frame: {}", e);
            return true;
        }
    };
    sink.send(WsMessage::Text(text.into())).await.is_ok()
}
