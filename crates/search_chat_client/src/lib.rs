//! Streaming search-chat client library (config, wire-frame decoding, event
//! dispatch, stream session control, transcript reconciliation).
//! Used by the `search-chat` CLI and embeddable frontends.

pub mod client;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod messages;
pub mod sessions;
pub mod transcript;

pub use client::{Client, ClientError};
pub use config::{default_config_path, BackendSection, ChatSection, Config, ConfigError};
pub use controller::StreamController;
pub use decoder::{Frame, FrameDecoder};
pub use messages::{
    dispatch, Dispatch, DonePayload, EventKind, SourceItem, SourceKind, SourcesPayload,
    StreamCallbacks,
};
pub use sessions::{HistoryMessage, SessionDetail, SessionSummary};
pub use transcript::{Message, Role, Transcript};
