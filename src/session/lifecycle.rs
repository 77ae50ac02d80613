// Copyright (c) 2025 - Cowboy AI, Inc.
//! Session Lifecycle State Machine
//!
//! ```text
//! Active ──Refresh──▶ Active (expiry extended)
//! Active ──Tick(now ≥ expiry)──▶ Expired
//! Active | Expired ──Revoke──▶ Revoked
//! ```
//!
//! `Expired` and `Revoked` are terminal for refresh.

use chrono::{DateTime, Duration, Utc};

use crate::state_machine::{StateMachine, TransitionError, TransitionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active { expires_at: DateTime<Utc> },
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// A token validated against the session at `at`
    Refresh { at: DateTime<Utc>, timeout: Duration },
    /// Observe the clock
    Tick { now: DateTime<Utc> },
    /// DELETE or reaper
    Revoke,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            SessionStatus::Active { .. } => "Active",
            SessionStatus::Expired => "Expired",
            SessionStatus::Revoked => "Revoked",
        }
    }
}

impl StateMachine for SessionStatus {
    type Input = SessionInput;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use SessionInput::*;
        use SessionStatus::*;

        match (*self, *input) {
            (Active { expires_at }, Refresh { at, .. }) if at >= expires_at => {
                Err(TransitionError::PreconditionFailed(format!(
                    "session expired at {}",
                    expires_at
                )))
            }
            (Active { .. }, Refresh { at, timeout }) => Ok((
                Active {
                    expires_at: at + timeout,
                },
                (),
            )),
            (Active { expires_at }, Tick { now }) if now >= expires_at => Ok((Expired, ())),
            (state, Tick { .. }) => Ok((state, ())),
            (Active { .. } | Expired, Revoke) => Ok((Revoked, ())),
            (state, input) => Err(TransitionError::InvalidTransition {
                from: state.name().to_string(),
                to: match input {
                    Refresh { .. } => "Active".to_string(),
                    _ => "Revoked".to_string(),
                },
            }),
        }
    }

    fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_refresh_extends_window() {
        let state = SessionStatus::Active { expires_at: t(30) };
        let (next, _) = state
            .transition(&SessionInput::Refresh {
                at: t(20),
                timeout: Duration::seconds(30),
            })
            .unwrap();
        assert_eq!(next, SessionStatus::Active { expires_at: t(50) });
    }

    #[test]
    fn test_tick_expires() {
        let state = SessionStatus::Active { expires_at: t(30) };
        let (same, _) = state.transition(&SessionInput::Tick { now: t(29) }).unwrap();
        assert!(same.is_active());

        let (expired, _) = state.transition(&SessionInput::Tick { now: t(30) }).unwrap();
        assert_eq!(expired, SessionStatus::Expired);
        assert!(expired.is_terminal());
    }

    #[test]
    fn test_terminal_states_refuse_refresh() {
        let refresh = SessionInput::Refresh {
            at: t(0),
            timeout: Duration::seconds(30),
        };
        assert!(!SessionStatus::Expired.can_transition(&refresh));
        assert!(!SessionStatus::Revoked.can_transition(&refresh));
        assert!(!SessionStatus::Revoked.can_transition(&SessionInput::Revoke));
        assert!(SessionStatus::Expired.can_transition(&SessionInput::Revoke));
    }
}
