// Copyright (c) 2025 - Cowboy AI, Inc.
//! Session manager: login, token validation, reaping

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    SessionClaims, SessionInput, SessionLease, SessionStatus, TokenSigner, UserDirectory,
    SESSIONS_URI, SESSION_SERVICE_URI, SESSION_TIMEOUT_PROPERTY,
};
use crate::aggregate::{
    handle_refresh_session, AggregateStore, CreateResourceCommand, DeleteCommand,
    RefreshSessionCommand,
};
use crate::bus::{publish_committed, EventBus};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::errors::{EngineError, EngineResult, FieldError, FieldErrorKind};
use crate::events::ResourceEvent;
use crate::privilege::{CallerIdentity, PrivilegeMap, Verb, CONFIGURE_MANAGER, CONFIGURE_SELF};
use crate::service::{MemberFactory, MemberRequest, NewMember};
use crate::state_machine::StateMachine;

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Token from `X-Auth-Token`, or from `Authorization: Bearer`
pub fn bearer_token(headers: &BTreeMap<String, String>) -> Option<&str> {
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    };

    header(AUTH_TOKEN_HEADER)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            header("Authorization").and_then(|v| {
                v.split_once(' ')
                    .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("Bearer"))
                    .map(|(_, token)| token.trim())
            })
        })
}

pub struct SessionManager {
    store: Arc<AggregateStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    signer: TokenSigner,
    users: Arc<dyn UserDirectory>,
    token_lifetime: Duration,
    default_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<AggregateStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        signer: TokenSigner,
        users: Arc<dyn UserDirectory>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            signer,
            users,
            token_lifetime: seconds(config.token_lifetime),
            default_timeout: seconds(config.timeout),
        }
    }

    /// Factory for POSTs to the Sessions collection
    pub fn factory(&self) -> SessionFactory {
        SessionFactory {
            signer: self.signer.clone(),
            users: Arc::clone(&self.users),
            token_lifetime: self.token_lifetime,
        }
    }

    /// Idle timeout from the session service, as currently configured
    pub async fn session_timeout(&self) -> Duration {
        let Some((_, handle)) = self.store.resolve(SESSION_SERVICE_URI).await else {
            return self.default_timeout;
        };
        let service = handle.read().await;
        service
            .state
            .properties
            .get(SESSION_TIMEOUT_PROPERTY)
            .and_then(Value::as_u64)
            .map(seconds)
            .unwrap_or(self.default_timeout)
    }

    /// Caller identity for a request; anonymous unless a valid token is present
    pub async fn authenticate(&self, headers: &BTreeMap<String, String>) -> CallerIdentity {
        match bearer_token(headers) {
            Some(token) => self
                .validate(token)
                .await
                .unwrap_or_else(CallerIdentity::anonymous),
            None => CallerIdentity::anonymous(),
        }
    }

    /// Verify a token against its session and refresh the session
    ///
    /// A token granting no privileges identifies nobody.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Option<CallerIdentity> {
        let now = self.clock.now();
        let claims = match self.signer.verify(token, now) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error = %err, "token rejected");
                return None;
            }
        };
        if claims.privileges.is_empty() {
            debug!(session = %claims.sessionuri, "token grants no privileges");
            return None;
        }

        let Some((_, handle)) = self.store.resolve(&claims.sessionuri).await else {
            debug!(session = %claims.sessionuri, "token names an unknown session");
            return None;
        };
        let timeout = self.session_timeout().await;

        let mut session = handle.write().await;
        let lease = session.state.session.as_ref()?;
        if lease.username != claims.sub {
            warn!(session = %claims.sessionuri, "token subject does not own the session");
            return None;
        }

        let status = lease.status(now, timeout, session.state.is_removed());
        if let Err(err) = status.transition(&SessionInput::Refresh { at: now, timeout }) {
            debug!(session = %claims.sessionuri, error = %err, "session not active");
            return None;
        }

        let command = RefreshSessionCommand {
            timestamp: now,
            correlation_id: Uuid::now_v7(),
        };
        let refreshed = handle_refresh_session(&session.state, &command).ok()?;
        let event = ResourceEvent::SessionTokenRefreshed(refreshed);
        if let Err(err) = self.store.commit(&mut session, vec![event.clone()]).await {
            warn!(error = %err, "failed to record session refresh");
            return None;
        }
        drop(session);

        publish_committed(self.bus.as_ref(), &[event]).await;
        Some(CallerIdentity::user(claims.sub, claims.privileges))
    }

    /// Delete every session whose idle window has elapsed
    pub async fn reap_expired(&self) -> usize {
        let now = self.clock.now();
        let timeout = self.session_timeout().await;
        let prefix = format!("{}/", SESSIONS_URI);
        let mut reaped = 0;

        for uri in self.store.uris().await {
            if !uri.starts_with(&prefix) {
                continue;
            }
            let Some((id, handle)) = self.store.resolve(&uri).await else {
                continue;
            };

            let expired = {
                let aggregate = handle.read().await;
                match &aggregate.state.session {
                    Some(lease) if aggregate.state.is_live() => {
                        lease.status(now, timeout, false) == SessionStatus::Expired
                    }
                    _ => false,
                }
            };
            if !expired {
                continue;
            }

            let command = DeleteCommand {
                caller: CallerIdentity::internal(),
                timestamp: now,
                correlation_id: Uuid::now_v7(),
            };
            match self.store.remove(id, &command).await {
                Ok(events) => {
                    publish_committed(self.bus.as_ref(), &events).await;
                    info!(session = %uri, "expired session removed");
                    reaped += 1;
                }
                Err(err) => warn!(session = %uri, error = %err, "failed to remove expired session"),
            }
        }

        reaped
    }
}

/// Run [`SessionManager::reap_expired`] every `every`
pub fn spawn_session_reaper(
    manager: Arc<SessionManager>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let reaped = manager.reap_expired().await;
            if reaped > 0 {
                debug!(reaped, "session reaper pass");
            }
        }
    })
}

/// Login: turns `{"UserName","Password"}` into a session resource and token
#[derive(Clone)]
pub struct SessionFactory {
    signer: TokenSigner,
    users: Arc<dyn UserDirectory>,
    token_lifetime: Duration,
}

impl MemberFactory for SessionFactory {
    fn build(&self, request: &MemberRequest<'_>) -> EngineResult<NewMember> {
        let field = |name: &str| {
            request
                .body
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    FieldError::new(
                        name,
                        FieldErrorKind::MalformedBody,
                        format!("{} is required and must be a string", name),
                    )
                })
        };
        let (username, password) = match (field("UserName"), field("Password")) {
            (Ok(u), Ok(p)) => (u, p),
            (u, p) => {
                return Err(EngineError::Validation(
                    [u.err(), p.err()].into_iter().flatten().collect(),
                ))
            }
        };

        let Some(privileges) = self.users.authenticate(username, password) else {
            info!(user = %username, "login rejected");
            return Err(EngineError::Unauthorized {
                verb: Verb::Post,
                uri: request.collection.uri.clone(),
                required: Vec::new(),
            });
        };

        let id = Uuid::now_v7().simple().to_string();
        let uri = format!("{}/{}", request.collection.uri, id);
        let claims = SessionClaims::new(
            username,
            privileges.iter().cloned(),
            &uri,
            request.timestamp,
            self.token_lifetime,
        );
        let token = self
            .signer
            .mint(&claims)
            .map_err(|e| EngineError::internal(format!("token mint failed: {}", e)))?;

        let command = CreateResourceCommand::new(
            &uri,
            "#Session.v1_0_2.Session",
            "/redfish/v1/$metadata#Session.Session",
            request.timestamp,
            request.correlation_id,
        )
        .with_properties(json!({
            "Id": id,
            "Name": "User Session",
            "Description": "User Session",
            "UserName": username,
        }))
        .with_privileges(
            PrivilegeMap::new()
                .allow(Verb::Get, [CONFIGURE_MANAGER, CONFIGURE_SELF])
                .allow(Verb::Delete, [CONFIGURE_MANAGER, CONFIGURE_SELF]),
        )
        .with_session(SessionLease::new(username, privileges, request.timestamp));

        info!(user = %username, session = %uri, "session created");
        Ok(NewMember::new(command).with_header(AUTH_TOKEN_HEADER, token))
    }
}

/// Longest accepted timeout or lifetime: one hundred years
const MAX_SECONDS: u64 = 100 * 365 * 86_400;

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_SECONDS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_bearer_token_sources() {
        assert_eq!(bearer_token(&headers(&[("x-auth-token", "abc")])), Some("abc"));
        assert_eq!(
            bearer_token(&headers(&[("Authorization", "Bearer xyz")])),
            Some("xyz")
        );
        assert_eq!(bearer_token(&headers(&[("Authorization", "Basic xyz")])), None);
        assert_eq!(bearer_token(&headers(&[])), None);
    }
}
