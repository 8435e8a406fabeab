//! Chat panel state machine.
//!
//! ```text
//! Idle --submit--> AwaitingReply --answer--> TypingOut --reveal done--> Idle
//!                        \--failure / bad reply (error message)--> Idle
//! ```
//!
//! The panel does no I/O of its own apart from writing the transcript through
//! to its store: `submit` hands back the envelope to send, and the host feeds
//! replies and reveal progress back in.

use crate::input::InputField;
use crate::protocol::{RelayEnvelope, RelayReply, ReplyOutcome, RequestId};
use crate::reveal::Reveal;
use crate::state::{ChatMessage, Transcript};
use crate::storage::{self, KeyValueStore};

pub const UNEXPECTED_REPLY: &str = "Received an unexpected reply from the relay.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    AwaitingReply { request: RequestId },
    TypingOut { request: RequestId, content: String, shown: usize },
}

/// What the host should do after a reply was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Start revealing this text
    Reveal(String),
    /// The transcript already reflects the reply
    Settled,
    /// The reply answered a request the panel no longer waits for
    Stale,
}

pub struct ChatPanel<S> {
    store: S,
    transcript: Transcript,
    state: PanelState,
    input: InputField,
    next_request: u64,
}

impl<S: KeyValueStore> ChatPanel<S> {
    /// Load the stored transcript once. Missing or unreadable data falls back
    /// to the greeting without writing anything.
    pub fn mount(store: S) -> Self {
        let transcript = match storage::load_transcript(&store) {
            Ok(Some(transcript)) => transcript,
            Ok(None) => Transcript::greeting(),
            Err(e) => {
                tracing::warn!(error = %e, "stored transcript unreadable, starting fresh");
                Transcript::greeting()
            }
        };

        Self {
            store,
            transcript,
            state: PanelState::Idle,
            input: InputField::new(),
            next_request: 1,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn input(&self) -> &InputField {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputField {
        &mut self.input
    }

    pub fn is_idle(&self) -> bool {
        self.state == PanelState::Idle
    }

    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self.state, PanelState::AwaitingReply { .. })
    }

    /// The part of the answer revealed so far, while typing out
    pub fn revealed_text(&self) -> Option<&str> {
        match &self.state {
            PanelState::TypingOut { content, shown, .. } => Some(Reveal::prefix(content, *shown)),
            _ => None,
        }
    }

    /// Append the user's message and return the envelope to send. `None` for
    /// blank text or while a previous turn is still in progress.
    pub fn submit(&mut self, text: &str) -> Option<RelayEnvelope> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if !self.is_idle() {
            tracing::debug!(state = ?self.state, "submit ignored while a reply is pending");
            return None;
        }

        self.replace_transcript(self.transcript.with(ChatMessage::user(text)));
        self.input.clear();

        let request = RequestId(self.next_request);
        self.next_request += 1;
        self.state = PanelState::AwaitingReply { request };

        tracing::info!(request = %request, "submitting message");
        Some(RelayEnvelope::user_message(request, self.transcript.messages()))
    }

    /// Submit whatever is in the input field
    pub fn submit_input(&mut self) -> Option<RelayEnvelope> {
        let text = self.input.value().to_string();
        self.submit(&text)
    }

    pub fn on_relay_reply(&mut self, reply: RelayReply) -> ReplyDisposition {
        let request = match self.state {
            PanelState::AwaitingReply { request } if request == reply.id => request,
            _ => {
                tracing::debug!(reply = %reply.id, state = ?self.state, "discarding stale reply");
                return ReplyDisposition::Stale;
            }
        };

        match reply.response.outcome() {
            ReplyOutcome::Answer(content) => {
                self.state = PanelState::TypingOut { request, content: content.to_string(), shown: 0 };
                ReplyDisposition::Reveal(content.to_string())
            }
            ReplyOutcome::Failure(error) => {
                self.finish_with(ChatMessage::error(error));
                ReplyDisposition::Settled
            }
            ReplyOutcome::Violation => {
                tracing::warn!(request = %request, response = ?reply.response, "reply matched no known shape");
                self.finish_with(ChatMessage::error(UNEXPECTED_REPLY));
                ReplyDisposition::Settled
            }
        }
    }

    pub fn on_reveal_progress(&mut self, shown_chars: usize) {
        if let PanelState::TypingOut { shown, .. } = &mut self.state {
            *shown = shown_chars;
        }
    }

    pub fn on_reveal_complete(&mut self) {
        match std::mem::replace(&mut self.state, PanelState::Idle) {
            PanelState::TypingOut { content, .. } => {
                self.replace_transcript(self.transcript.with(ChatMessage::assistant(content)));
            }
            other => self.state = other,
        }
    }

    /// Reset to the greeting and drop any pending reply or reveal.
    pub fn clear(&mut self) {
        self.state = PanelState::Idle;
        self.replace_transcript(Transcript::greeting());
    }

    fn finish_with(&mut self, message: ChatMessage) {
        self.state = PanelState::Idle;
        self.replace_transcript(self.transcript.with(message));
    }

    fn replace_transcript(&mut self, transcript: Transcript) {
        self.transcript = transcript;
        if let Err(e) = storage::save_transcript(&self.store, &self.transcript) {
            tracing::warn!(error = %e, "failed to persist transcript");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::protocol::{RelayCommand, RelayResponse};
    use crate::state::DEFAULT_GREETING;
    use crate::storage::{load_transcript, MemoryStore, TRANSCRIPT_KEY};
    use serde_json::Value;
    use std::sync::Arc;

    fn panel() -> (ChatPanel<Arc<MemoryStore>>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ChatPanel::mount(Arc::clone(&store)), store)
    }

    fn reply(id: RequestId, response: RelayResponse) -> RelayReply {
        RelayReply { id, response }
    }

    fn request_id(envelope: &RelayEnvelope) -> RequestId {
        envelope.id
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<Value>, StorageError> {
            Err(StorageError::NoDataDir)
        }
        fn set(&self, _key: &str, _value: Value) -> Result<(), StorageError> {
            Err(StorageError::NoDataDir)
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::NoDataDir)
        }
    }

    #[test]
    fn test_mount_without_storage_uses_greeting_and_writes_nothing() {
        let (panel, store) = panel();
        assert_eq!(panel.transcript(), &Transcript::greeting());
        assert_eq!(store.get(TRANSCRIPT_KEY).unwrap(), None);
    }

    #[test]
    fn test_mount_with_unreadable_storage_uses_greeting() {
        let store = Arc::new(MemoryStore::new());
        store.set(TRANSCRIPT_KEY, serde_json::json!("garbage")).unwrap();

        let panel = ChatPanel::mount(Arc::clone(&store));
        assert_eq!(panel.transcript(), &Transcript::greeting());
        assert_eq!(store.get(TRANSCRIPT_KEY).unwrap(), Some(serde_json::json!("garbage")));
    }

    #[test]
    fn test_blank_submit_does_nothing() {
        let (mut panel, store) = panel();
        assert!(panel.submit("").is_none());
        assert!(panel.submit("   ").is_none());
        assert!(panel.submit("\n\t").is_none());
        assert_eq!(panel.transcript(), &Transcript::greeting());
        assert!(panel.is_idle());
        assert_eq!(store.get(TRANSCRIPT_KEY).unwrap(), None);
    }

    #[test]
    fn test_submit_appends_clears_input_and_waits() {
        let (mut panel, store) = panel();
        "What is this?".chars().for_each(|c| panel.input_mut().insert(c));

        let envelope = panel.submit_input().unwrap();

        assert!(panel.input().is_empty());
        assert!(panel.is_awaiting_reply());
        assert_eq!(panel.transcript().last(), Some(&ChatMessage::user("What is this?")));
        assert_eq!(load_transcript(&*store).unwrap().as_ref(), Some(panel.transcript()));

        let RelayCommand::UserMessage { messages } = &envelope.command;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"], DEFAULT_GREETING);
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn test_second_submit_refused_while_waiting() {
        let (mut panel, _) = panel();
        panel.submit("one").unwrap();
        assert!(panel.submit("two").is_none());
        assert_eq!(panel.transcript().len(), 2);
    }

    #[test]
    fn test_answer_appended_only_after_reveal_completes() {
        let (mut panel, store) = panel();
        let id = request_id(&panel.submit("hello").unwrap());

        let disposition = panel.on_relay_reply(reply(id, RelayResponse::answer("Hi there")));
        assert_eq!(disposition, ReplyDisposition::Reveal("Hi there".to_string()));
        assert_eq!(panel.transcript().len(), 2);
        assert_eq!(panel.revealed_text(), Some(""));

        panel.on_reveal_progress(2);
        assert_eq!(panel.revealed_text(), Some("Hi"));
        assert_eq!(panel.transcript().len(), 2);

        panel.on_reveal_complete();
        assert!(panel.is_idle());
        assert_eq!(panel.transcript().last(), Some(&ChatMessage::assistant("Hi there")));
        assert_eq!(load_transcript(&*store).unwrap().as_ref(), Some(panel.transcript()));
    }

    #[test]
    fn test_failure_appends_one_error_and_returns_to_idle() {
        let (mut panel, _) = panel();
        let id = request_id(&panel.submit("hello").unwrap());

        let disposition = panel.on_relay_reply(reply(
            id,
            RelayResponse::failure("Backend returned status 500: Internal Server Error"),
        ));

        assert_eq!(disposition, ReplyDisposition::Settled);
        assert!(panel.is_idle());
        assert_eq!(panel.transcript().len(), 3);
        assert_eq!(
            panel.transcript().last(),
            Some(&ChatMessage::error("Backend returned status 500: Internal Server Error"))
        );
    }

    #[test]
    fn test_shapeless_reply_is_a_generic_error() {
        let (mut panel, _) = panel();
        let id = request_id(&panel.submit("hello").unwrap());

        panel.on_relay_reply(reply(id, RelayResponse { success: true, content: None, error: None }));
        assert!(panel.is_idle());
        assert_eq!(panel.transcript().last(), Some(&ChatMessage::error(UNEXPECTED_REPLY)));
    }

    #[test]
    fn test_clear_resets_and_persists_greeting() {
        let (mut panel, store) = panel();
        let id = request_id(&panel.submit("hello").unwrap());
        panel.on_relay_reply(reply(id, RelayResponse::answer("Hi there")));

        panel.clear();

        assert!(panel.is_idle());
        assert_eq!(panel.revealed_text(), None);
        assert_eq!(
            panel.transcript().messages(),
            &[ChatMessage::assistant("Hello! How can I help you today?")]
        );
        assert_eq!(
            store.get(TRANSCRIPT_KEY).unwrap(),
            Some(serde_json::json!([{ "role": "assistant", "content": "Hello! How can I help you today?" }]))
        );
    }

    #[test]
    fn test_late_reply_after_clear_is_discarded() {
        let (mut panel, _) = panel();
        let id = request_id(&panel.submit("hello").unwrap());
        panel.clear();

        assert_eq!(panel.on_relay_reply(reply(id, RelayResponse::answer("late"))), ReplyDisposition::Stale);
        assert_eq!(panel.transcript(), &Transcript::greeting());
    }

    #[test]
    fn test_reply_for_other_request_is_discarded() {
        let (mut panel, _) = panel();
        let id = request_id(&panel.submit("hello").unwrap());

        let other = RequestId(id.0 + 100);
        assert_eq!(panel.on_relay_reply(reply(other, RelayResponse::answer("x"))), ReplyDisposition::Stale);
        assert!(panel.is_awaiting_reply());
    }

    #[test]
    fn test_reveal_complete_outside_typing_is_ignored() {
        let (mut panel, _) = panel();
        panel.on_reveal_complete();
        assert_eq!(panel.transcript(), &Transcript::greeting());
        assert!(panel.is_idle());
    }

    #[test]
    fn test_remount_restores_identical_transcript() {
        let store = Arc::new(MemoryStore::new());
        let mut panel = ChatPanel::mount(Arc::clone(&store));
        let id = request_id(&panel.submit("first").unwrap());
        panel.on_relay_reply(reply(id, RelayResponse::failure("down")));
        let id = request_id(&panel.submit("second").unwrap());
        panel.on_relay_reply(reply(id, RelayResponse::answer("up again")));
        panel.on_reveal_complete();
        let before = panel.transcript().clone();
        drop(panel);

        let remounted = ChatPanel::mount(store);
        assert_eq!(remounted.transcript(), &before);
        assert_eq!(remounted.transcript().len(), 5);
    }

    #[test]
    fn test_storage_failures_never_surface() {
        let mut panel = ChatPanel::mount(FailingStore);
        assert_eq!(panel.transcript(), &Transcript::greeting());

        let id = request_id(&panel.submit("hello").unwrap());
        panel.on_relay_reply(reply(id, RelayResponse::answer("ok")));
        panel.on_reveal_complete();
        assert_eq!(panel.transcript().len(), 3);
    }

    mod relay_tests {
        use super::*;
        use crate::backend::BackendClient;
        use crate::error::TabQueryError;
        use crate::relay::{Relay, TabQuery};
        use crate::reveal::{RevealFrame, RevealTask};
        use crate::state::ChatRole;
        use async_trait::async_trait;
        use std::time::Duration;
        use tokio::sync::mpsc;
        use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

        struct PageTab;

        #[async_trait]
        impl TabQuery for PageTab {
            async fn active_tab_url(&self) -> Result<Option<String>, TabQueryError> {
                Ok(Some("https://example.com/post".to_string()))
            }
        }

        /// Run the reveal for `content` and feed its frames back into the panel
        async fn reveal_into(panel: &mut ChatPanel<Arc<MemoryStore>>, content: String) {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let _task = RevealTask::spawn(content, Duration::from_millis(1), move |frame| {
                let _ = tx.send(frame);
            });

            while let Some(frame) = rx.recv().await {
                match frame {
                    RevealFrame::Progress { shown } => panel.on_reveal_progress(shown),
                    RevealFrame::Complete => {
                        panel.on_reveal_complete();
                        break;
                    }
                }
            }
        }

        #[tokio::test]
        async fn test_backend_answer_is_revealed_then_stored() {
            let mock_server = MockServer::start().await;

            Mock::given(matchers::method("POST"))
                .and(matchers::path("/response/"))
                .and(matchers::body_json(serde_json::json!({
                    "messages": [
                        { "role": "assistant", "content": DEFAULT_GREETING },
                        { "role": "user", "content": "hello" }
                    ],
                    "url": "https://example.com/post"
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "answer": "Hi there" })))
                .expect(1)
                .mount(&mock_server)
                .await;

            let relay = Relay::new(BackendClient::new(&mock_server.uri()), PageTab).spawn();
            let (mut panel, store) = panel();

            let envelope = panel.submit("hello").unwrap();
            let reply = relay.request(&envelope).await;

            let content = match panel.on_relay_reply(reply) {
                ReplyDisposition::Reveal(content) => content,
                other => panic!("Expected Reveal, got {:?}", other),
            };
            assert_eq!(content, "Hi there");
            assert_eq!(panel.transcript().len(), 2);

            reveal_into(&mut panel, content).await;

            assert!(panel.is_idle());
            assert_eq!(
                panel.transcript().messages(),
                &[
                    ChatMessage::assistant(DEFAULT_GREETING),
                    ChatMessage::user("hello"),
                    ChatMessage::assistant("Hi there"),
                ]
            );
            assert_eq!(load_transcript(&*store).unwrap().as_ref(), Some(panel.transcript()));
        }

        #[tokio::test]
        async fn test_backend_server_error_becomes_error_message() {
            let mock_server = MockServer::start().await;

            Mock::given(matchers::method("POST"))
                .and(matchers::path("/response/"))
                .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
                .expect(1)
                .mount(&mock_server)
                .await;

            let relay = Relay::new(BackendClient::new(&mock_server.uri()), PageTab).spawn();
            let (mut panel, store) = panel();

            let envelope = panel.submit("hello").unwrap();
            let reply = relay.request(&envelope).await;

            assert_eq!(panel.on_relay_reply(reply), ReplyDisposition::Settled);
            assert!(panel.is_idle());
            assert_eq!(panel.transcript().len(), 3);

            let last = panel.transcript().last().unwrap();
            assert_eq!(last.role, ChatRole::Error);
            assert!(last.content.contains("500"));
            assert!(last.content.contains("Internal Server Error"));
            assert_eq!(load_transcript(&*store).unwrap().as_ref(), Some(panel.transcript()));
        }
    }
}
