//! Call signaling relay
//!
//! Calls are independent pairwise sessions. The relay forwards call
//! lifecycle notices and opaque WebRTC negotiation payloads between the two
//! parties; media never passes through here. Undeliverable events are
//! dropped and reported as `TargetUnreachable`, which callers log and swallow.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use huddle_shared::UserId;
use serde_json::Value;

use super::dispatcher::Dispatcher;
use super::events::{CallEvent, CallKind, EndReason, ServerEvent, SignalEvent};
use crate::error::{CoordinatorError, CoordinatorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Ringing,
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSession {
    pub kind: CallKind,
    pub state: CallState,
}

/// Which negotiation message is being relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Ice,
}

pub struct CallRelay {
    dispatcher: Arc<Dispatcher>,
    /// Keyed by (caller, callee)
    sessions: Mutex<HashMap<(UserId, UserId), CallSession>>,
    /// Drop accept/reject that match no ringing call
    strict_sessions: bool,
}

impl CallRelay {
    pub fn new(dispatcher: Arc<Dispatcher>, strict_sessions: bool) -> Self {
        Self {
            dispatcher,
            sessions: Mutex::new(HashMap::new()),
            strict_sessions,
        }
    }

    /// Ring `callee`. Dropped silently if the callee has no live connection.
    pub async fn initiate(
        &self,
        caller: UserId,
        callee: UserId,
        kind: CallKind,
    ) -> CoordinatorResult<usize> {
        if caller == callee {
            return Err(CoordinatorError::InvalidEvent("cannot call yourself".to_string()));
        }

        // Recorded before delivery so a fast accept finds it
        self.sessions.lock().await.insert(
            (caller, callee),
            CallSession {
                kind,
                state: CallState::Ringing,
            },
        );

        let delivered = self
            .dispatcher
            .to_identity(&callee, CallEvent::CallIncoming { from_id: caller, kind })
            .await;

        if delivered == 0 {
            self.sessions.lock().await.remove(&(caller, callee));
            return Err(CoordinatorError::TargetUnreachable);
        }

        tracing::info!(caller = %caller, callee = %callee, kind = ?kind, "Call ringing");
        Ok(delivered)
    }

    /// Callee picks up; every connection of the caller is told
    pub async fn accept(&self, callee: UserId, caller: UserId) -> CoordinatorResult<usize> {
        {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(&(caller, callee)) {
                Some(session) if session.state == CallState::Ringing => {
                    session.state = CallState::Accepted;
                }
                _ if self.strict_sessions => {
                    tracing::warn!(
                        caller = %caller,
                        callee = %callee,
                        "Dropping call accept without a ringing call"
                    );
                    return Err(CoordinatorError::InvalidEvent(
                        "no ringing call from this caller".to_string(),
                    ));
                }
                _ => {}
            }
        }

        self.deliver(&caller, CallEvent::CallAccepted { from_id: callee })
            .await
    }

    /// Callee declines; the session is discarded
    pub async fn reject(&self, callee: UserId, caller: UserId) -> CoordinatorResult<usize> {
        {
            let mut sessions = self.sessions.lock().await;
            let ringing = matches!(
                sessions.get(&(caller, callee)),
                Some(CallSession {
                    state: CallState::Ringing,
                    ..
                })
            );
            if !ringing && self.strict_sessions {
                tracing::warn!(
                    caller = %caller,
                    callee = %callee,
                    "Dropping call reject without a ringing call"
                );
                return Err(CoordinatorError::InvalidEvent(
                    "no ringing call from this caller".to_string(),
                ));
            }
            if ringing {
                sessions.remove(&(caller, callee));
            }
        }

        self.deliver(&caller, CallEvent::CallRejected { from_id: callee })
            .await
    }

    /// Hang up on every listed participant
    pub async fn end(&self, user_id: UserId, participants: &[UserId]) -> usize {
        let mut peers: Vec<UserId> = participants
            .iter()
            .copied()
            .filter(|p| *p != user_id)
            .collect();
        peers.sort();
        peers.dedup();

        {
            let mut sessions = self.sessions.lock().await;
            for peer in &peers {
                sessions.remove(&(user_id, *peer));
                sessions.remove(&(*peer, user_id));
            }
        }

        let mut delivered = 0;
        for peer in &peers {
            delivered += self
                .dispatcher
                .to_identity(
                    peer,
                    CallEvent::CallEnded {
                        from_id: user_id,
                        reason: EndReason::Hangup,
                    },
                )
                .await;
        }

        tracing::info!(user_id = %user_id, participants = peers.len(), "Call ended");
        delivered
    }

    /// The identity went offline: end its calls and tell each peer
    pub async fn abandon(&self, user_id: UserId) -> usize {
        let peers: Vec<UserId> = {
            let mut sessions = self.sessions.lock().await;
            let mut peers = Vec::new();
            sessions.retain(|(caller, callee), _| {
                if *caller == user_id {
                    peers.push(*callee);
                    false
                } else if *callee == user_id {
                    peers.push(*caller);
                    false
                } else {
                    true
                }
            });
            peers.sort();
            peers.dedup();
            peers
        };

        let mut delivered = 0;
        for peer in &peers {
            delivered += self
                .dispatcher
                .to_identity(
                    peer,
                    CallEvent::CallEnded {
                        from_id: user_id,
                        reason: EndReason::Abandoned,
                    },
                )
                .await;
        }

        if !peers.is_empty() {
            tracing::info!(user_id = %user_id, peers = peers.len(), "Calls abandoned");
        }
        delivered
    }

    /// Relay an opaque negotiation payload verbatim
    pub async fn signal(
        &self,
        kind: SignalKind,
        from: UserId,
        to: UserId,
        payload: Value,
    ) -> CoordinatorResult<usize> {
        let event = match kind {
            SignalKind::Offer => SignalEvent::SignalOffer {
                from_id: from,
                payload,
            },
            SignalKind::Answer => SignalEvent::SignalAnswer {
                from_id: from,
                payload,
            },
            SignalKind::Ice => SignalEvent::SignalIce {
                from_id: from,
                payload,
            },
        };
        self.deliver(&to, event).await
    }

    pub async fn session(&self, caller: UserId, callee: UserId) -> Option<CallSession> {
        self.sessions.lock().await.get(&(caller, callee)).copied()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn deliver(
        &self,
        target: &UserId,
        event: impl Into<ServerEvent>,
    ) -> CoordinatorResult<usize> {
        match self.dispatcher.to_identity(target, event).await {
            0 => Err(CoordinatorError::TargetUnreachable),
            delivered => Ok(delivered),
        }
    }
}
