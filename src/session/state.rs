//! Pure lifecycle transition function, grounded on the teacher's
//! `state_machine::transition` (a side-effect-free function returning the
//! caller a list of effects to perform, rather than performing I/O itself).

use super::types::{LifecycleState, Priority, SessionKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    pub max_idle: Duration,
    pub max_no_heartbeat: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub key: SessionKey,
    pub lifecycle: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub manual_mode: bool,
    pub current_priority: Priority,
    pub clients: HashMap<String, DateTime<Utc>>,
    pub cleanup_policy: CleanupPolicy,
}

impl SessionState {
    pub fn new(key: SessionKey, cleanup_policy: CleanupPolicy, expires_at: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            key,
            lifecycle: LifecycleState::Initializing,
            created_at: now,
            expires_at,
            last_activity: now,
            last_heartbeat: now,
            manual_mode: false,
            current_priority: Priority::Normal,
            clients: HashMap::new(),
            cleanup_policy,
        }
    }

    pub fn is_observed(&self, now: DateTime<Utc>) -> bool {
        let timeout = self.cleanup_policy.max_no_heartbeat;
        self.clients
            .values()
            .any(|beat| now.signed_duration_since(*beat).to_std().unwrap_or_default() <= timeout)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    DriverReady,
    Heartbeat { client_id: String, now: DateTime<Utc> },
    StartManual { priority: Priority, now: DateTime<Utc> },
    ResumeAutomation { force: bool, now: DateTime<Utc> },
    CommandGate { priority: Priority, require_manual: bool, interrupt_automation: bool, now: DateTime<Utc> },
    SweepTick { now: DateTime<Utc> },
    BeginTerminate,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ForceResumeAutomation,
    ReleaseForHeartbeatTimeout,
    ReleaseForIdleTimeout,
    ReleaseForExpiry,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("command requires manual mode")]
    ManualModeRequired,
    #[error("priority {requested:?} does not exceed current manual priority {current:?}")]
    PriorityConflict { requested: Priority, current: Priority },
    #[error("session is terminating or terminated")]
    SessionTerminal,
}

/// Advances `state` in place for `event`, returning effects the caller (the
/// pool, dispatcher, or sweeper) must perform — driver calls, notifications,
/// and the like never happen inside this function.
pub fn transition(state: &mut SessionState, event: Event) -> Result<Vec<Effect>, TransitionError> {
    match event {
        Event::DriverReady => {
            state.lifecycle = LifecycleState::Active;
            Ok(vec![])
        }

        Event::Heartbeat { client_id, now } => {
            state.clients.insert(client_id, now);
            state.last_heartbeat = now;
            state.last_activity = now;
            Ok(vec![])
        }

        Event::StartManual { priority, now } => {
            if state.manual_mode && priority <= state.current_priority {
                return Err(TransitionError::PriorityConflict {
                    requested: priority,
                    current: state.current_priority,
                });
            }
            state.manual_mode = true;
            state.current_priority = priority;
            state.lifecycle = LifecycleState::Paused;
            state.last_activity = now;
            Ok(vec![])
        }

        Event::ResumeAutomation { force: _, now } => {
            state.manual_mode = false;
            state.current_priority = Priority::Normal;
            if state.lifecycle == LifecycleState::Paused {
                state.lifecycle = LifecycleState::Active;
            }
            state.last_activity = now;
            Ok(vec![])
        }

        Event::CommandGate {
            priority,
            require_manual,
            interrupt_automation,
            now,
        } => {
            if matches!(state.lifecycle, LifecycleState::Terminating | LifecycleState::Terminated) {
                return Err(TransitionError::SessionTerminal);
            }
            if require_manual && !state.manual_mode {
                return Err(TransitionError::ManualModeRequired);
            }
            if state.manual_mode && priority <= state.current_priority {
                return Err(TransitionError::PriorityConflict {
                    requested: priority,
                    current: state.current_priority,
                });
            }
            if interrupt_automation && !state.manual_mode {
                state.manual_mode = true;
                state.current_priority = priority;
                state.lifecycle = LifecycleState::Paused;
            }
            if state.lifecycle == LifecycleState::Idle {
                state.lifecycle = LifecycleState::Active;
            }
            state.last_activity = now;
            Ok(vec![])
        }

        Event::SweepTick { now } => {
            let mut effects = vec![];
            state
                .clients
                .retain(|_, beat| now.signed_duration_since(*beat).to_std().unwrap_or_default() <= state.cleanup_policy.max_no_heartbeat);

            let no_heartbeat_age = now
                .signed_duration_since(state.last_heartbeat)
                .to_std()
                .unwrap_or_default();

            if state.clients.is_empty() {
                if state.manual_mode && no_heartbeat_age > state.cleanup_policy.max_no_heartbeat {
                    effects.push(Effect::ForceResumeAutomation);
                }
                if no_heartbeat_age > state.cleanup_policy.max_no_heartbeat {
                    effects.push(Effect::ReleaseForHeartbeatTimeout);
                } else if state.lifecycle == LifecycleState::Idle {
                    let idle_age = now
                        .signed_duration_since(state.last_activity)
                        .to_std()
                        .unwrap_or_default();
                    if idle_age > state.cleanup_policy.max_idle {
                        effects.push(Effect::ReleaseForIdleTimeout);
                    }
                } else if state.lifecycle == LifecycleState::Active {
                    state.lifecycle = LifecycleState::Idle;
                }
            }

            if let Some(expires_at) = state.expires_at {
                if now >= expires_at {
                    effects.push(Effect::ReleaseForExpiry);
                }
            }

            Ok(effects)
        }

        Event::BeginTerminate => {
            state.lifecycle = LifecycleState::Terminating;
            Ok(vec![])
        }

        Event::Terminated => {
            state.lifecycle = LifecycleState::Terminated;
            Ok(vec![])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(now: DateTime<Utc>) -> SessionState {
        let mut s = SessionState::new(
            SessionKey::new(1, 1),
            CleanupPolicy {
                max_idle: Duration::from_secs(1800),
                max_no_heartbeat: Duration::from_secs(60),
            },
            None,
        );
        s.created_at = now;
        s.last_activity = now;
        s.last_heartbeat = now;
        s.lifecycle = LifecycleState::Active;
        s
    }

    #[test]
    fn heartbeat_never_creates_or_changes_lifecycle() {
        let now = Utc::now();
        let mut s = fresh(now);
        let before = s.lifecycle;
        transition(&mut s, Event::Heartbeat { client_id: "c1".into(), now }).unwrap();
        assert_eq!(s.lifecycle, before);
        assert!(s.clients.contains_key("c1"));
    }

    #[test]
    fn manual_priority_gate() {
        let now = Utc::now();
        let mut s = fresh(now);
        transition(&mut s, Event::StartManual { priority: Priority::High, now }).unwrap();
        assert_eq!(s.lifecycle, LifecycleState::Paused);

        let err = transition(
            &mut s,
            Event::CommandGate {
                priority: Priority::Normal,
                require_manual: false,
                interrupt_automation: false,
                now,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::PriorityConflict {
                requested: Priority::Normal,
                current: Priority::High,
            }
        );

        transition(
            &mut s,
            Event::CommandGate {
                priority: Priority::Critical,
                require_manual: false,
                interrupt_automation: false,
                now,
            },
        )
        .unwrap();
    }

    #[test]
    fn sweep_releases_on_heartbeat_timeout_regardless_of_active_or_idle() {
        let now = Utc::now();
        let mut active = fresh(now);
        active.last_heartbeat = now - chrono::Duration::seconds(120);
        let effects = transition(&mut active, Event::SweepTick { now }).unwrap();
        assert!(effects.contains(&Effect::ReleaseForHeartbeatTimeout));

        let mut idle = fresh(now);
        idle.lifecycle = LifecycleState::Idle;
        idle.last_heartbeat = now - chrono::Duration::seconds(120);
        let effects = transition(&mut idle, Event::SweepTick { now }).unwrap();
        assert!(effects.contains(&Effect::ReleaseForHeartbeatTimeout));
    }

    #[test]
    fn sweep_never_releases_an_observed_session() {
        let now = Utc::now();
        let mut s = fresh(now);
        s.clients.insert("c1".into(), now);
        let effects = transition(&mut s, Event::SweepTick { now }).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn sweep_force_resumes_manual_mode_after_heartbeat_timeout() {
        let now = Utc::now();
        let mut s = fresh(now);
        transition(&mut s, Event::StartManual { priority: Priority::High, now }).unwrap();
        s.last_heartbeat = now - chrono::Duration::seconds(120);
        let effects = transition(&mut s, Event::SweepTick { now }).unwrap();
        assert!(effects.contains(&Effect::ForceResumeAutomation));
    }
}
