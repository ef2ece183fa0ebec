//! WebRTC signaling coordinator (SPEC_FULL.md §4.7). Grounded directly on
//! `webrtc_service.py`'s half-trickle protocol: remote candidates that
//! arrive before the SDP answer is set must be cached, then drained in
//! arrival order immediately after `SetAnswer` returns.

use crate::errors::CoreError;
use crate::live_stream::{LiveStreamManager, StreamKind, StreamParams};
use crate::session::SessionKey;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u32>,
}

fn candidate_grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^candidate:\S+ \d+ (udp|tcp) \d+ \S+ \d+ typ (host|srflx|prflx|relay)",
        )
        .expect("static candidate grammar compiles")
    })
}

fn validate(candidate: &str) -> Result<(), CoreError> {
    if candidate_grammar().is_match(candidate) {
        Ok(())
    } else {
        Err(CoreError::InvalidCandidate(candidate.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

struct Connection {
    local_candidates: Vec<IceCandidate>,
    gathering_state: GatheringState,
    remote_description_set: bool,
    early_remote_candidates: VecDeque<IceCandidate>,
    applied_remote_candidates: Vec<IceCandidate>,
}

impl Connection {
    fn new() -> Self {
        Self {
            local_candidates: Vec::new(),
            gathering_state: GatheringState::New,
            remote_description_set: false,
            early_remote_candidates: VecDeque::new(),
            applied_remote_candidates: Vec::new(),
        }
    }
}

pub struct WebRtcCoordinator {
    connections: Mutex<HashMap<SessionKey, Connection>>,
    live_stream: Arc<LiveStreamManager>,
}

impl WebRtcCoordinator {
    pub fn new(live_stream: Arc<LiveStreamManager>) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            live_stream,
        }
    }

    /// Creates the peer connection and returns a placeholder SDP offer. A
    /// real implementation attaches a `VideoStreamTrack` fed by
    /// `LiveStreamManager::next_frame`; the coordinator's own
    /// responsibility — candidate caching — does not depend on that wiring.
    pub async fn create_offer(&self, key: SessionKey) -> Result<String, CoreError> {
        let mut connections = self.connections.lock().await;
        let conn = connections.entry(key).or_insert_with(Connection::new);
        conn.gathering_state = GatheringState::Gathering;
        self.live_stream
            .register(key, StreamKind::WebRtc, StreamParams::default())
            .await;
        Ok(format!("v=0\r\no=- {key} offer\r\n"))
    }

    /// Sets the remote answer, then drains any early remote candidates in
    /// arrival order — the core correctness property of this subsystem.
    pub async fn set_answer(&self, key: SessionKey, _sdp: &str) -> Result<(), CoreError> {
        let mut connections = self.connections.lock().await;
        let conn = connections.get_mut(&key).ok_or(CoreError::NoWebRtcConnection(key))?;
        conn.remote_description_set = true;
        while let Some(candidate) = conn.early_remote_candidates.pop_front() {
            conn.applied_remote_candidates.push(candidate);
        }
        Ok(())
    }

    /// Caches the candidate if no peer connection exists yet, or if the
    /// remote description has not been set; otherwise applies it directly.
    pub async fn add_remote_candidate(&self, key: SessionKey, candidate: IceCandidate) -> Result<(), CoreError> {
        validate(&candidate.candidate)?;
        let mut connections = self.connections.lock().await;
        let conn = connections.entry(key).or_insert_with(Connection::new);
        if conn.remote_description_set {
            conn.applied_remote_candidates.push(candidate);
        } else {
            conn.early_remote_candidates.push_back(candidate);
        }
        Ok(())
    }

    pub async fn add_local_candidate(&self, key: SessionKey, candidate: IceCandidate) -> Result<(), CoreError> {
        validate(&candidate.candidate)?;
        let mut connections = self.connections.lock().await;
        let conn = connections.get_mut(&key).ok_or(CoreError::NoWebRtcConnection(key))?;
        conn.local_candidates.push(candidate);
        Ok(())
    }

    pub async fn get_local_candidates(&self, key: SessionKey) -> Result<(Vec<IceCandidate>, GatheringState), CoreError> {
        let connections = self.connections.lock().await;
        let conn = connections.get(&key).ok_or(CoreError::NoWebRtcConnection(key))?;
        Ok((conn.local_candidates.clone(), conn.gathering_state))
    }

    pub async fn applied_remote_candidates(&self, key: SessionKey) -> Vec<IceCandidate> {
        self.connections
            .lock()
            .await
            .get(&key)
            .map(|c| c.applied_remote_candidates.clone())
            .unwrap_or_default()
    }

    pub async fn close(&self, key: SessionKey) {
        self.connections.lock().await.remove(&key);
        self.live_stream.unregister(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 192.168.0.{n} 5000{n} typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }
    }

    fn coordinator() -> WebRtcCoordinator {
        let pool = Arc::new(crate::session::SessionPool::new(
            Arc::new(crate::driver::MockBrowserDriver),
            Arc::new(crate::collaborators::InMemoryFingerprintStore::new()),
            Arc::new(crate::collaborators::InMemoryPluginConfigStore::new()),
            Arc::new(crate::collaborators::InMemoryNotificationDispatcher::new()),
            crate::config::Config::default(),
        ));
        WebRtcCoordinator::new(Arc::new(LiveStreamManager::new(pool)))
    }

    #[tokio::test]
    async fn early_candidates_drain_in_arrival_order_after_answer() {
        let key = SessionKey::new(3, 9);
        let coord = coordinator();
        coord.create_offer(key).await.unwrap();
        coord.add_remote_candidate(key, candidate(1)).await.unwrap();
        coord.add_remote_candidate(key, candidate(2)).await.unwrap();
        coord.set_answer(key, "v=0").await.unwrap();
        let applied = coord.applied_remote_candidates(key).await;
        assert_eq!(applied, vec![candidate(1), candidate(2)]);
    }

    #[tokio::test]
    async fn candidate_after_answer_applies_immediately() {
        let key = SessionKey::new(4, 4);
        let coord = coordinator();
        coord.create_offer(key).await.unwrap();
        coord.set_answer(key, "v=0").await.unwrap();
        coord.add_remote_candidate(key, candidate(5)).await.unwrap();
        let applied = coord.applied_remote_candidates(key).await;
        assert_eq!(applied, vec![candidate(5)]);
    }

    #[tokio::test]
    async fn invalid_candidate_is_rejected_and_never_cached() {
        let key = SessionKey::new(5, 5);
        let coord = coordinator();
        coord.create_offer(key).await.unwrap();
        let bad = IceCandidate {
            candidate: "not a candidate".into(),
            sdp_mid: None,
            sdp_mline_index: None,
        };
        let err = coord.add_remote_candidate(key, bad).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidCandidate(_)));
        assert!(coord.applied_remote_candidates(key).await.is_empty());
    }

    #[tokio::test]
    async fn close_clears_both_caches() {
        let key = SessionKey::new(6, 6);
        let coord = coordinator();
        coord.create_offer(key).await.unwrap();
        coord.add_remote_candidate(key, candidate(1)).await.unwrap();
        coord.close(key).await;
        let err = coord.set_answer(key, "v=0").await.unwrap_err();
        assert!(matches!(err, CoreError::NoWebRtcConnection(_)));
    }
}
