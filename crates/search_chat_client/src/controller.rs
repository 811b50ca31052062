//! Stream session controller: owns the single live generation of a
//! conversation, starts and cancels streamed queries, and applies their
//! events to the transcript guarded by generation identity.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::Client;
use crate::messages::StreamCallbacks;
use crate::sessions::SessionDetail;
use crate::transcript::{Message, Role, Transcript};

/// Status label shown until the first token arrives.
const INITIAL_STATUS: &str = "Searching...";

type SessionHook = Box<dyn FnMut(&str) + Send>;

/// The one live generation of a conversation.
struct LiveGeneration {
    id: u64,
    token: CancellationToken,
    message_index: usize,
}

struct ControllerState {
    transcript: Transcript,
    /// Monotonic generation counter; event application compares against the
    /// live slot so stale callbacks from a superseded stream are dropped.
    generation: u64,
    live: Option<LiveGeneration>,
    session_hook: Option<SessionHook>,
}

impl ControllerState {
    fn is_current(&self, generation: u64) -> bool {
        self.live.as_ref().map(|live| live.id) == Some(generation)
    }
}

/// Per-conversation controller. At most one generation streams at a time:
/// starting a new query supersedes the previous one (frozen, partial content
/// kept, no error), and `cancel` freezes it silently.
pub struct StreamController {
    client: Client,
    state: Arc<Mutex<ControllerState>>,
}

fn lock_state(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StreamController {
    /// Create a controller, resuming `session_id` when present.
    pub fn new(client: Client, session_id: Option<String>) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(ControllerState {
                transcript: Transcript::new(session_id),
                generation: 0,
                live: None,
                session_hook: None,
            })),
        }
    }

    /// Register a hook invoked once when the backend assigns a session id to
    /// a conversation that started without one.
    pub fn on_session_adopted(&self, hook: impl FnMut(&str) + Send + 'static) {
        lock_state(&self.state).session_hook = Some(Box::new(hook));
    }

    /// Start a new query. A still-streaming generation is superseded first.
    /// Returns immediately; events apply asynchronously on the spawned task.
    pub fn start(&self, query: &str) -> JoinHandle<()> {
        let (generation, token, message_index, session_id) = {
            let mut st = lock_state(&self.state);
            if let Some(previous) = st.live.take() {
                debug!(generation = previous.id, "superseding live generation");
                previous.token.cancel();
                st.transcript.apply_cancelled(previous.message_index);
            }
            st.generation += 1;
            let generation = st.generation;
            st.transcript.push_user(query);
            let message_index = st.transcript.begin_assistant(INITIAL_STATUS);
            let token = CancellationToken::new();
            st.live = Some(LiveGeneration {
                id: generation,
                token: token.clone(),
                message_index,
            });
            (generation, token, message_index, st.transcript.session_id.clone())
        };

        let client = self.client.clone();
        let state = self.state.clone();
        let query = query.to_string();
        tokio::spawn(async move {
            let mut callbacks = reconciling_callbacks(state.clone(), generation, message_index);
            let result = client
                .search_stream(&query, session_id.as_deref(), &token, &mut callbacks)
                .await;

            let mut st = lock_state(&state);
            if st.is_current(generation) {
                // Failure to establish the stream at all: error-only message.
                if let Err(error) = result {
                    warn!(%error, "failed to open search stream");
                    st.transcript.apply_error(message_index, &error.to_string());
                }
                st.live = None;
            }
        })
    }

    /// Cancel the live generation, if any. Silent: the message freezes with
    /// its partial content and no error. No-op when idle.
    pub fn cancel(&self) {
        let mut st = lock_state(&self.state);
        if let Some(live) = st.live.take() {
            debug!(generation = live.id, "cancelling live generation");
            live.token.cancel();
            st.transcript.apply_cancelled(live.message_index);
        }
    }

    /// Replace the transcript with server-side history. Ignored while a
    /// generation is streaming.
    pub fn load_history(&self, detail: &SessionDetail) {
        let mut st = lock_state(&self.state);
        if st.live.is_some() {
            return;
        }
        let mut transcript = Transcript::new(Some(detail.session.id.clone()));
        for entry in &detail.history {
            let message = match entry.role {
                Role::User => Message::user(entry.content.clone()),
                Role::Assistant => {
                    Message::assistant_history(entry.content.clone(), entry.sources.clone())
                }
            };
            transcript.messages.push(message);
        }
        st.transcript = transcript;
    }

    /// Clone of the current transcript.
    pub fn snapshot(&self) -> Transcript {
        lock_state(&self.state).transcript.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        lock_state(&self.state).transcript.session_id.clone()
    }

    pub fn is_streaming(&self) -> bool {
        lock_state(&self.state).live.is_some()
    }
}

/// Callbacks that apply events through the transcript reconciler, each one a
/// no-op once the generation is no longer the live one.
fn reconciling_callbacks(
    state: Arc<Mutex<ControllerState>>,
    generation: u64,
    message_index: usize,
) -> StreamCallbacks {
    let status_state = state.clone();
    let session_state = state.clone();
    let sources_state = state.clone();
    let token_state = state.clone();
    let done_state = state.clone();
    let error_state = state;

    StreamCallbacks {
        on_status: Some(Box::new(move |status| {
            let mut st = lock_state(&status_state);
            if st.is_current(generation) {
                st.transcript.apply_status(message_index, status);
            }
        })),
        on_session: Some(Box::new(move |id| {
            let mut st = lock_state(&session_state);
            if st.is_current(generation) && st.transcript.session_id.is_none() {
                st.transcript.session_id = Some(id.to_string());
                if let Some(hook) = st.session_hook.as_mut() {
                    hook(id);
                }
            }
        })),
        on_sources: Some(Box::new(move |payload| {
            let mut st = lock_state(&sources_state);
            if st.is_current(generation) {
                st.transcript.apply_sources(message_index, payload);
            }
        })),
        on_token: Some(Box::new(move |token| {
            let mut st = lock_state(&token_state);
            if st.is_current(generation) {
                st.transcript.apply_token(message_index, token);
            }
        })),
        on_done: Some(Box::new(move |payload| {
            let mut st = lock_state(&done_state);
            if st.is_current(generation) {
                st.transcript.apply_done(message_index, payload);
                st.live = None;
            }
        })),
        on_error: Some(Box::new(move |error| {
            let mut st = lock_state(&error_state);
            if st.is_current(generation) {
                st.transcript.apply_error(message_index, error);
                st.live = None;
            }
        })),
    }
}
