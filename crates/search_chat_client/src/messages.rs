//! Typed events of the search stream and the dispatcher that routes decoded
//! frames to registered callbacks. Wire kinds and payload shapes match the
//! backend protocol (status, session, sources, token, done, error).

use serde::{Deserialize, Serialize};

use crate::decoder::Frame;

/// Closed set of recognized stream events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Status,
    SessionAssigned,
    SourcesFound,
    TokenAppended,
    Completed,
    Failed,
}

impl EventKind {
    /// Map a wire kind name to an event. Unknown names yield `None` so the
    /// caller can skip them (forward compatibility with backend additions).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "session" => Some(Self::SessionAssigned),
            "sources" => Some(Self::SourcesFound),
            "token" => Some(Self::TokenAppended),
            "done" => Some(Self::Completed),
            "error" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Kind of a retrieved source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Page,
    Pdf,
}

/// One retrieved source attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: String,
    pub title: String,
    pub score: f64,
}

/// Payload of a `sources` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesPayload {
    pub count: u64,
    pub items: Vec<SourceItem>,
    #[serde(rename = "searchTimeMs")]
    pub search_time_ms: u64,
}

/// Payload of a `done` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonePayload {
    #[serde(rename = "totalTimeMs")]
    pub total_time_ms: u64,
}

/// Registered handlers for the six stream events. Unset slots drop the event.
#[derive(Default)]
pub struct StreamCallbacks {
    pub on_status: Option<Box<dyn FnMut(&str) + Send>>,
    pub on_session: Option<Box<dyn FnMut(&str) + Send>>,
    pub on_sources: Option<Box<dyn FnMut(SourcesPayload) + Send>>,
    pub on_token: Option<Box<dyn FnMut(&str) + Send>>,
    pub on_done: Option<Box<dyn FnMut(DonePayload) + Send>>,
    pub on_error: Option<Box<dyn FnMut(&str) + Send>>,
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_status", &self.on_status.is_some())
            .field("on_session", &self.on_session.is_some())
            .field("on_sources", &self.on_sources.is_some())
            .field("on_token", &self.on_token.is_some())
            .field("on_done", &self.on_done.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Whether the stream continues after a dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    /// `done`/`error` was delivered (or a structured payload failed to
    /// decode); nothing further may be applied to this generation.
    Terminal,
}

/// Route one frame to the matching callback, in arrival order. Unknown kinds
/// are ignored. A `sources`/`done` payload that fails to decode surfaces
/// through `on_error` like a `Failed` event, never as a panic.
pub fn dispatch(frame: &Frame, callbacks: &mut StreamCallbacks) -> Dispatch {
    let Some(kind) = EventKind::parse(&frame.kind) else {
        tracing::debug!(kind = %frame.kind, "ignoring unrecognized event kind");
        return Dispatch::Continue;
    };

    match kind {
        EventKind::Status => {
            if let Some(handler) = callbacks.on_status.as_mut() {
                handler(&frame.data);
            }
            Dispatch::Continue
        }
        EventKind::SessionAssigned => {
            if let Some(handler) = callbacks.on_session.as_mut() {
                handler(&frame.data);
            }
            Dispatch::Continue
        }
        EventKind::SourcesFound => match serde_json::from_str::<SourcesPayload>(&frame.data) {
            Ok(payload) => {
                if let Some(handler) = callbacks.on_sources.as_mut() {
                    handler(payload);
                }
                Dispatch::Continue
            }
            Err(error) => fail_decode(callbacks, "sources", &error),
        },
        EventKind::TokenAppended => {
            if let Some(handler) = callbacks.on_token.as_mut() {
                handler(&frame.data);
            }
            Dispatch::Continue
        }
        EventKind::Completed => match serde_json::from_str::<DonePayload>(&frame.data) {
            Ok(payload) => {
                if let Some(handler) = callbacks.on_done.as_mut() {
                    handler(payload);
                }
                Dispatch::Terminal
            }
            Err(error) => fail_decode(callbacks, "done", &error),
        },
        EventKind::Failed => {
            if let Some(handler) = callbacks.on_error.as_mut() {
                handler(&frame.data);
            }
            Dispatch::Terminal
        }
    }
}

fn fail_decode(
    callbacks: &mut StreamCallbacks,
    payload_kind: &str,
    error: &serde_json::Error,
) -> Dispatch {
    tracing::warn!(%error, payload_kind, "failed to decode structured payload");
    if let Some(handler) = callbacks.on_error.as_mut() {
        handler(&format!(
            "failed to decode {} payload: {}",
            payload_kind, error
        ));
    }
    Dispatch::Terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn frame(kind: &str, data: &str) -> Frame {
        Frame {
            kind: kind.into(),
            data: data.into(),
        }
    }

    #[test]
    fn parses_all_known_kinds() {
        assert_eq!(EventKind::parse("status"), Some(EventKind::Status));
        assert_eq!(EventKind::parse("session"), Some(EventKind::SessionAssigned));
        assert_eq!(EventKind::parse("sources"), Some(EventKind::SourcesFound));
        assert_eq!(EventKind::parse("token"), Some(EventKind::TokenAppended));
        assert_eq!(EventKind::parse("done"), Some(EventKind::Completed));
        assert_eq!(EventKind::parse("error"), Some(EventKind::Failed));
        assert_eq!(EventKind::parse("ping"), None);
    }

    #[test]
    fn sources_payload_uses_wire_field_names() {
        let json = r#"{"count":1,"items":[{"type":"pdf","url":"https://x/y.pdf","title":"Y","score":0.87}],"searchTimeMs":12}"#;
        let payload: SourcesPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.count, 1);
        assert_eq!(payload.search_time_ms, 12);
        assert_eq!(payload.items[0].kind, SourceKind::Pdf);
        assert_eq!(payload.items[0].title, "Y");
    }

    #[test]
    fn done_payload_uses_wire_field_names() {
        let payload: DonePayload = serde_json::from_str(r#"{"totalTimeMs":42}"#).unwrap();
        assert_eq!(payload.total_time_ms, 42);
    }

    #[test]
    fn dispatch_routes_token_verbatim() {
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_clone = seen.clone();
        let mut callbacks = StreamCallbacks {
            on_token: Some(Box::new(move |t| seen_clone.lock().unwrap().push_str(t))),
            ..Default::default()
        };
        assert_eq!(
            dispatch(&frame("token", " He said:\t"), &mut callbacks),
            Dispatch::Continue
        );
        assert_eq!(*seen.lock().unwrap(), " He said:\t");
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut callbacks = StreamCallbacks {
            on_error: Some(Box::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        assert_eq!(dispatch(&frame("ping", "{}"), &mut callbacks), Dispatch::Continue);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn done_and_error_are_terminal() {
        let mut callbacks = StreamCallbacks::default();
        assert_eq!(
            dispatch(&frame("done", r#"{"totalTimeMs":1}"#), &mut callbacks),
            Dispatch::Terminal
        );
        assert_eq!(dispatch(&frame("error", "boom"), &mut callbacks), Dispatch::Terminal);
    }

    #[test]
    fn malformed_sources_payload_surfaces_as_error() {
        let seen = Arc::new(Mutex::new(None::<String>));
        let seen_clone = seen.clone();
        let mut callbacks = StreamCallbacks {
            on_error: Some(Box::new(move |msg| {
                *seen_clone.lock().unwrap() = Some(msg.to_string());
            })),
            ..Default::default()
        };
        let outcome = dispatch(&frame("sources", "not json"), &mut callbacks);
        assert_eq!(outcome, Dispatch::Terminal);
        let msg = seen.lock().unwrap().clone().unwrap();
        assert!(msg.contains("sources"), "got: {}", msg);
    }
}
