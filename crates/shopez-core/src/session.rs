//! Conversation state machine
//!
//! `ChatSession` owns the transcript and the request lifecycle. It is driven
//! by a single owner feeding it [`SessionEvent`]s; any network work it wants
//! done comes back as an [`Effect`] for [`dispatch`] to run.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::ShopBackend;
use crate::state::{ChatMessage, RequestId, RequestState, ABORTED, ERROR_PREFIX, GREETING};

/// Identifies an outgoing chat request and the transcript it was sent from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub id: RequestId,
    /// Number of aborts seen before the request was sent.
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    UserSubmitted(String),
    ResponseReceived { ticket: Ticket, text: String },
    ResponseFailed { ticket: Ticket, error: String },
    AbortRequested,
}

/// Network work requested by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SendChat { ticket: Ticket, message: String },
    SendAbort,
}

/// What to do with a reply to a request sent before the latest abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Append it anyway. The reply shows up under the reset greeting.
    #[default]
    Append,
    Discard,
}

#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    request: RequestState,
    next_id: u64,
    generation: u64,
    stale_policy: StalePolicy,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(StalePolicy::default())
    }
}

impl ChatSession {
    pub fn new(stale_policy: StalePolicy) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(GREETING)],
            request: RequestState::Idle,
            next_id: 0,
            generation: 0,
            stale_policy,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn request_state(&self) -> RequestState {
        self.request
    }

    pub fn is_busy(&self) -> bool {
        self.request.is_busy()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn handle(&mut self, event: SessionEvent) -> Option<Effect> {
        match event {
            SessionEvent::UserSubmitted(text) => self.submit(text),
            SessionEvent::ResponseReceived { ticket, text } => {
                self.settle(ticket, ChatMessage::assistant(text));
                None
            }
            SessionEvent::ResponseFailed { ticket, error } => {
                self.settle(
                    ticket,
                    ChatMessage::assistant(format!("{}{}", ERROR_PREFIX, error)),
                );
                None
            }
            SessionEvent::AbortRequested => Some(self.abort()),
        }
    }

    /// Append the user's message and hand back the request to send.
    /// Blank input is ignored.
    pub fn submit(&mut self, text: String) -> Option<Effect> {
        if text.trim().is_empty() {
            return None;
        }

        self.next_id += 1;
        let ticket = Ticket {
            id: RequestId(self.next_id),
            generation: self.generation,
        };
        tracing::debug!(request = %ticket.id, "sending chat message");

        self.messages.push(ChatMessage::user(text.clone()));
        self.request = RequestState::Sending(ticket.id);

        Some(Effect::SendChat {
            ticket,
            message: text,
        })
    }

    /// Reset the transcript. Requests already in flight are not cancelled.
    pub fn abort(&mut self) -> Effect {
        self.generation += 1;
        self.messages = vec![ChatMessage::assistant(ABORTED)];
        self.request = RequestState::Idle;
        tracing::info!(generation = self.generation, "order aborted");
        Effect::SendAbort
    }

    fn settle(&mut self, ticket: Ticket, message: ChatMessage) {
        if self.request == RequestState::Sending(ticket.id) {
            self.request = RequestState::Idle;
        }

        if ticket.generation < self.generation && self.stale_policy == StalePolicy::Discard {
            tracing::debug!(request = %ticket.id, "discarding reply from before abort");
            return;
        }

        self.messages.push(message);
    }
}

/// Run `effect` on a background task.
///
/// Chat results are reported on `events`. Abort results never are; a failed
/// abort is only logged.
pub fn dispatch<B>(
    backend: Arc<B>,
    effect: Effect,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()>
where
    B: ShopBackend + ?Sized + 'static,
{
    tokio::spawn(async move {
        match effect {
            Effect::SendChat { ticket, message } => {
                let event = match backend.chat(&message).await {
                    Ok(text) => SessionEvent::ResponseReceived { ticket, text },
                    Err(e) => {
                        tracing::debug!(request = %ticket.id, error = %e, "chat request failed");
                        SessionEvent::ResponseFailed {
                            ticket,
                            error: e.to_string(),
                        }
                    }
                };
                if events.send(event).is_err() {
                    tracing::debug!(request = %ticket.id, "session closed before reply arrived");
                }
            }
            Effect::SendAbort => {
                if let Err(e) = backend.abort().await {
                    tracing::warn!(error = %e, "failed to abort order");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::state::ChatRole;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct FakeBackend {
        reply: Result<String, String>,
        gate: Option<Arc<Notify>>,
        abort_fails: bool,
        aborts: AtomicUsize,
        sent: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                gate: None,
                abort_fails: false,
                aborts: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                reply: Err(error.to_string()),
                ..Self::replying("")
            }
        }
    }

    #[async_trait]
    impl ShopBackend for FakeBackend {
        async fn chat(&self, message: &str) -> Result<String, ClientError> {
            self.sent.lock().unwrap().push(message.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reply.clone().map_err(ClientError::Decode)
        }

        async fn abort(&self) -> Result<(), ClientError> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            if self.abort_fails {
                Err(ClientError::Decode("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn ticket_of(effect: Option<Effect>) -> Ticket {
        match effect {
            Some(Effect::SendChat { ticket, .. }) => ticket,
            other => panic!("expected SendChat, got {other:?}"),
        }
    }

    #[test]
    fn test_starts_with_greeting() {
        let session = ChatSession::default();
        assert_eq!(session.messages(), &[ChatMessage::assistant(GREETING)]);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_blank_submit_is_ignored() {
        let mut session = ChatSession::default();
        for text in ["", "   ", "\t\n"] {
            assert_eq!(session.handle(SessionEvent::UserSubmitted(text.into())), None);
        }
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.request_state(), RequestState::Idle);
    }

    #[test]
    fn test_submit_appends_user_message_before_reply() {
        let mut session = ChatSession::default();
        let effect = session.handle(SessionEvent::UserSubmitted("milk".into()));

        match effect {
            Some(Effect::SendChat { ticket, message }) => {
                assert_eq!(message, "milk");
                assert_eq!(ticket.id, RequestId(1));
                assert_eq!(ticket.generation, 0);
            }
            other => panic!("expected SendChat, got {other:?}"),
        }
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1], ChatMessage::user("milk"));
        assert_eq!(session.request_state(), RequestState::Sending(RequestId(1)));
    }

    #[test]
    fn test_reply_appends_and_goes_idle() {
        let mut session = ChatSession::default();
        let ticket = ticket_of(session.submit("milk".into()));
        session.handle(SessionEvent::ResponseReceived {
            ticket,
            text: "Here are 3 options".into(),
        });

        assert_eq!(
            session.messages().last(),
            Some(&ChatMessage::assistant("Here are 3 options"))
        );
        assert!(!session.is_busy());
    }

    #[test]
    fn test_failure_becomes_error_message() {
        let mut session = ChatSession::default();
        let ticket = ticket_of(session.submit("milk".into()));
        session.handle(SessionEvent::ResponseFailed {
            ticket,
            error: "connection refused".into(),
        });

        let last = session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert!(last.content.starts_with("❌ Error:"));
        assert_eq!(last.content, "❌ Error: connection refused");
        assert!(!session.is_busy());
    }

    #[test]
    fn test_abort_leaves_single_message() {
        let mut session = ChatSession::default();
        for item in ["milk", "eggs", "bread"] {
            session.submit(item.into());
        }
        assert!(session.is_busy());

        let effect = session.handle(SessionEvent::AbortRequested);
        assert_eq!(effect, Some(Effect::SendAbort));
        assert_eq!(session.messages(), &[ChatMessage::assistant(ABORTED)]);
        assert!(!session.is_busy());
        assert_eq!(session.generation(), 1);

        // Aborting an already reset session still leaves exactly one message
        session.abort();
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_reply_after_abort_is_still_appended() {
        let mut session = ChatSession::default();
        let ticket = ticket_of(session.submit("milk".into()));
        session.abort();

        session.handle(SessionEvent::ResponseReceived {
            ticket,
            text: "Added milk".into(),
        });
        assert_eq!(
            session.messages(),
            &[ChatMessage::assistant(ABORTED), ChatMessage::assistant("Added milk")]
        );
        assert!(!session.is_busy());
    }

    #[test]
    fn test_reply_after_abort_discarded_when_configured() {
        let mut session = ChatSession::new(StalePolicy::Discard);
        let stale = ticket_of(session.submit("milk".into()));
        session.abort();
        let fresh = ticket_of(session.submit("eggs".into()));

        session.handle(SessionEvent::ResponseReceived {
            ticket: stale,
            text: "Added milk".into(),
        });
        assert_eq!(session.messages().len(), 2);
        assert!(session.is_busy());

        session.handle(SessionEvent::ResponseReceived {
            ticket: fresh,
            text: "Added eggs".into(),
        });
        assert_eq!(session.messages().last(), Some(&ChatMessage::assistant("Added eggs")));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_older_reply_does_not_clear_newer_request() {
        let mut session = ChatSession::default();
        let first = ticket_of(session.submit("milk".into()));
        let second = ticket_of(session.submit("eggs".into()));

        session.handle(SessionEvent::ResponseReceived {
            ticket: first,
            text: "one".into(),
        });
        assert_eq!(session.request_state(), RequestState::Sending(second.id));

        session.handle(SessionEvent::ResponseReceived {
            ticket: second,
            text: "two".into(),
        });
        assert_eq!(session.request_state(), RequestState::Idle);
    }

    #[test]
    fn test_messages_keep_append_order() {
        let mut session = ChatSession::default();
        let a = ticket_of(session.submit("milk".into()));
        let b = ticket_of(session.submit("milk".into()));
        session.handle(SessionEvent::ResponseReceived { ticket: b, text: "second".into() });
        session.handle(SessionEvent::ResponseReceived { ticket: a, text: "first".into() });

        let contents: Vec<&str> = session.messages()[1..]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["milk", "milk", "second", "first"]);
    }

    #[tokio::test]
    async fn test_dispatch_reports_reply() {
        let backend = Arc::new(FakeBackend::replying("Here are 3 options"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::default();

        let effect = session.submit("milk".into()).unwrap();
        dispatch(backend.clone(), effect, tx);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::ResponseReceived { .. }));
        session.handle(event);

        assert_eq!(backend.sent.lock().unwrap().as_slice(), ["milk"]);
        assert_eq!(
            session.messages().last(),
            Some(&ChatMessage::assistant("Here are 3 options"))
        );
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_dispatch_reports_failure() {
        let backend = Arc::new(FakeBackend::failing("expected value at line 1"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::default();

        let effect = session.submit("milk".into()).unwrap();
        dispatch(backend, effect, tx);
        session.handle(rx.recv().await.unwrap());

        let last = session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert!(last.content.starts_with("❌ Error:"));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_failed_abort_is_not_reported() {
        let backend = Arc::new(FakeBackend {
            abort_fails: true,
            ..FakeBackend::replying("")
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::default();

        let effect = session.handle(SessionEvent::AbortRequested).unwrap();
        dispatch(backend.clone(), effect, tx).await.unwrap();

        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(session.messages(), &[ChatMessage::assistant(ABORTED)]);
    }

    #[tokio::test]
    async fn test_in_flight_reply_lands_after_abort() {
        let gate = Arc::new(Notify::new());
        let backend: Arc<dyn ShopBackend> = Arc::new(FakeBackend {
            gate: Some(gate.clone()),
            ..FakeBackend::replying("Added milk")
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::default();

        let send = session.submit("milk".into()).unwrap();
        dispatch(backend.clone(), send, tx.clone());

        let abort = session.handle(SessionEvent::AbortRequested).unwrap();
        dispatch(backend, abort, tx).await.unwrap();
        assert_eq!(session.messages().len(), 1);

        gate.notify_one();
        session.handle(rx.recv().await.unwrap());

        assert_eq!(
            session.messages(),
            &[ChatMessage::assistant(ABORTED), ChatMessage::assistant("Added milk")]
        );
    }
}
