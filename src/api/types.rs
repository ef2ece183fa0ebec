//! API request and response types (SPEC_FULL.md §6.1). Plain DTOs only — no
//! service logic lives here.

use crate::dispatcher::{Command, CommandKind};
use crate::live_stream::StreamKind;
use crate::safety::{RiskLevel, Verdict};
use crate::session::{Priority, SessionKey, SessionStatus};
use crate::webrtc::IceCandidate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub profile_id: u64,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
}

fn default_headless() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StartManualRequest {
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Deserialize)]
pub struct ResumeAutomationRequest {
    #[serde(default)]
    pub force: bool,
}

/// Wire shape for a dispatched command. Tagged by `type` so the body doubles
/// as a discriminated union across every `CommandKind` variant.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKindRequest {
    Click {
        x: f64,
        y: f64,
    },
    Fill {
        selector: String,
        text: String,
    },
    Hover {
        selector: String,
    },
    Press {
        key: String,
    },
    Screenshot {
        #[serde(default = "default_quality")]
        quality: u8,
    },
    Evaluate {
        code: String,
    },
    Navigate {
        url: String,
    },
    GetBrowserInfo,
}

fn default_quality() -> u8 {
    80
}

impl From<CommandKindRequest> for CommandKind {
    fn from(req: CommandKindRequest) -> Self {
        match req {
            CommandKindRequest::Click { x, y } => CommandKind::Click { x, y },
            CommandKindRequest::Fill { selector, text } => CommandKind::Fill { selector, text },
            CommandKindRequest::Hover { selector } => CommandKind::Hover { selector },
            CommandKindRequest::Press { key } => CommandKind::Press { key },
            CommandKindRequest::Screenshot { quality } => CommandKind::Screenshot { quality },
            CommandKindRequest::Evaluate { code } => CommandKind::Evaluate { code },
            CommandKindRequest::Navigate { url } => CommandKind::Navigate { url },
            CommandKindRequest::GetBrowserInfo => CommandKind::GetBrowserInfo,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(flatten)]
    pub kind: CommandKindRequest,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub require_manual: bool,
    #[serde(default)]
    pub interrupt_automation: bool,
}

impl From<CommandRequest> for Command {
    fn from(req: CommandRequest) -> Self {
        Command {
            kind: req.kind.into(),
            priority: req.priority,
            require_manual: req.require_manual,
            interrupt_automation: req.interrupt_automation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub result: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckScriptRequest {
    pub code: String,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckScriptResponse {
    pub level: RiskLevel,
    pub score: i32,
    pub risks: Vec<String>,
    pub safe_to_run: bool,
}

impl From<Verdict> for CheckScriptResponse {
    fn from(v: Verdict) -> Self {
        Self {
            level: v.level,
            score: v.score,
            risks: v.risks,
            safe_to_run: v.safe_to_run,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OfferResponse {
    pub sdp: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub sdp: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CandidateRequest {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_mline_index: Option<u32>,
}

impl From<CandidateRequest> for IceCandidate {
    fn from(req: CandidateRequest) -> Self {
        IceCandidate {
            candidate: req.candidate,
            sdp_mid: req.sdp_mid,
            sdp_mline_index: req.sdp_mline_index,
        }
    }
}

impl From<IceCandidate> for CandidateRequest {
    fn from(c: IceCandidate) -> Self {
        Self {
            candidate: c.candidate,
            sdp_mid: c.sdp_mid,
            sdp_mline_index: c.sdp_mline_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CandidateListResponse {
    pub candidates: Vec<CandidateRequest>,
    pub gathering_state: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

/// Query params for `GET .../stream/mjpeg` (SPEC_FULL.md §6.1
/// `Stream.RegisterMJPEG({fps, quality, w?, h?})`). Absent fields fall back
/// to `StreamParams::default()`.
#[derive(Debug, Deserialize)]
pub struct MjpegQuery {
    pub fps: Option<u32>,
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StreamEntrySummary {
    pub key: SessionKey,
    pub kind: StreamKind,
}

#[derive(Debug, Serialize)]
pub struct StreamListResponse {
    pub streams: Vec<StreamEntrySummary>,
}

#[derive(Debug, Serialize)]
pub struct AdminStatsResponse {
    pub active_sessions: usize,
    pub registered_streams: usize,
}
