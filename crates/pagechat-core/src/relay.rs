//! The background relay.
//!
//! The relay is the only component that touches the network or asks the host
//! which page is active. The panel reaches it exclusively through a
//! [`RelayHandle`]; every request gets exactly one [`RelayReply`], and every
//! failure on the way is folded into that reply instead of escaping.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::backend::BackendClient;
use crate::error::{ProtocolError, TabQueryError};
use crate::protocol::{
    DecodedRequest, RelayEnvelope, RelayReply, RelayRequest, RelayResponse, RequestId, WireMessage,
};

/// Asks the host for the URL of the active, focused tab.
#[async_trait]
pub trait TabQuery: Send + Sync {
    /// `Ok(None)` when there is no active tab or it has no URL.
    async fn active_tab_url(&self) -> Result<Option<String>, TabQueryError>;
}

/// Replace internal error markers before the conversation leaves the process.
/// Every other entry, and the order, is kept exactly.
pub fn sanitize_messages(messages: Vec<WireMessage>) -> Vec<WireMessage> {
    messages
        .into_iter()
        .map(|message| {
            if message.role == "error" {
                WireMessage::new("assistant", "")
            } else {
                message
            }
        })
        .collect()
}

/// Keep only the most recent `limit` messages.
pub fn trim_history(mut messages: Vec<WireMessage>, limit: Option<usize>) -> Vec<WireMessage> {
    if let Some(limit) = limit {
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
    }
    messages
}

pub struct Relay<T> {
    backend: BackendClient,
    tabs: T,
    history_limit: Option<usize>,
}

impl<T: TabQuery + 'static> Relay<T> {
    pub fn new(backend: BackendClient, tabs: T) -> Self {
        Self { backend, tabs, history_limit: None }
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// One full round trip: resolve the tab, sanitize, POST, convert.
    pub async fn handle_user_message(&self, messages: Vec<WireMessage>) -> RelayResponse {
        let url = self.resolve_tab_url().await;
        let messages = trim_history(sanitize_messages(messages), self.history_limit);

        tracing::info!(messages = messages.len(), url = %url, "forwarding conversation to backend");

        let request = RelayRequest { messages, url };
        match self.backend.ask(&request).await {
            Ok(answer) => RelayResponse::answer(answer),
            Err(e) => {
                tracing::warn!(error = %e, "backend request failed");
                RelayResponse::failure(e.to_string())
            }
        }
    }

    /// Decode a raw envelope and answer it. Malformed envelopes are answered
    /// with a failure carrying whatever id could be read from them.
    pub async fn handle(&self, raw: Value) -> RelayReply {
        let fallback_id = raw
            .get("id")
            .and_then(Value::as_u64)
            .map(RequestId)
            .unwrap_or(RequestId(0));

        match RelayEnvelope::decode(raw) {
            Ok(DecodedRequest::UserMessage { id, messages }) => {
                tracing::debug!(request = %id, "relay received user message");
                RelayReply { id, response: self.handle_user_message(messages).await }
            }
            Err(e) => {
                tracing::warn!(request = %fallback_id, error = %e, "rejected malformed envelope");
                RelayReply { id: fallback_id, response: RelayResponse::failure(e.to_string()) }
            }
        }
    }

    async fn resolve_tab_url(&self) -> String {
        match self.tabs.active_tab_url().await {
            Ok(url) => url.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "could not resolve active tab, sending empty url");
                String::new()
            }
        }
    }

    /// Run the relay on its own task. Each request is handled on a task of
    /// its own, so simultaneous requests are independent round trips.
    pub fn spawn(self) -> RelayHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Value, oneshot::Sender<RelayReply>)>();
        let relay = Arc::new(self);

        tokio::spawn(async move {
            while let Some((raw, reply_tx)) = rx.recv().await {
                let relay = Arc::clone(&relay);
                tokio::spawn(async move {
                    let reply = relay.handle(raw).await;
                    if reply_tx.send(reply).is_err() {
                        tracing::debug!("requester went away before the reply was ready");
                    }
                });
            }
            tracing::debug!("relay channel closed");
        });

        RelayHandle { tx }
    }
}

/// The panel's side of the message channel to the relay.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<(Value, oneshot::Sender<RelayReply>)>,
}

impl RelayHandle {
    /// Send an envelope and wait for its reply. Never fails: a relay that is
    /// gone produces a failure reply.
    pub async fn request(&self, envelope: &RelayEnvelope) -> RelayReply {
        let unavailable = || RelayReply {
            id: envelope.id,
            response: RelayResponse::failure(ProtocolError::RelayUnavailable.to_string()),
        };

        let raw = match serde_json::to_value(envelope) {
            Ok(raw) => raw,
            Err(e) => {
                return RelayReply {
                    id: envelope.id,
                    response: RelayResponse::failure(ProtocolError::Malformed(e.to_string()).to_string()),
                }
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send((raw, reply_tx)).is_err() {
            return unavailable();
        }

        reply_rx.await.unwrap_or_else(|_| unavailable())
    }
}
