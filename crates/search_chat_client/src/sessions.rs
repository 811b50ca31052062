//! Plain request/response session API: list, fetch history, rename, delete,
//! health. The backend wraps responses in a `{"success": ...}` envelope.

use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientError};
use crate::messages::SourcesPayload;
use crate::transcript::Role;

/// One entry of the session list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A persisted message as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<SourcesPayload>,
}

/// A session and its full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    pub session: SessionSummary,
    pub history: Vec<HistoryMessage>,
}

#[derive(Deserialize)]
struct SessionListEnvelope {
    success: bool,
    #[serde(default)]
    sessions: Vec<SessionSummary>,
}

#[derive(Deserialize)]
struct SessionDetailEnvelope {
    success: bool,
    session: Option<SessionSummary>,
    #[serde(default)]
    history: Vec<HistoryMessage>,
}

#[derive(Deserialize)]
struct AckEnvelope {
    success: bool,
}

#[derive(Deserialize)]
struct HealthEnvelope {
    status: String,
}

impl Client {
    /// List all stored sessions.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ClientError> {
        let envelope: SessionListEnvelope = self
            .http()
            .get(self.endpoint("/api/sessions"))
            .send()
            .await?
            .json()
            .await?;
        if !envelope.success {
            return Err(ClientError::InvalidResponse(
                "session list request was not successful".into(),
            ));
        }
        Ok(envelope.sessions)
    }

    /// Fetch one session and its message history.
    pub async fn get_session(&self, id: &str) -> Result<SessionDetail, ClientError> {
        let envelope: SessionDetailEnvelope = self
            .http()
            .get(self.endpoint(&format!("/api/sessions/{id}")))
            .send()
            .await?
            .json()
            .await?;
        match (envelope.success, envelope.session) {
            (true, Some(session)) => Ok(SessionDetail {
                session,
                history: envelope.history,
            }),
            _ => Err(ClientError::InvalidResponse(format!(
                "session {id} not found"
            ))),
        }
    }

    /// Rename a session. Returns whether the backend accepted the change.
    pub async fn rename_session(&self, id: &str, title: &str) -> Result<bool, ClientError> {
        let envelope: AckEnvelope = self
            .http()
            .patch(self.endpoint(&format!("/api/sessions/{id}")))
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.success)
    }

    /// Delete a session. Returns whether the backend accepted the deletion.
    pub async fn delete_session(&self, id: &str) -> Result<bool, ClientError> {
        let envelope: AckEnvelope = self
            .http()
            .delete(self.endpoint(&format!("/api/sessions/{id}")))
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.success)
    }

    /// Check backend health. Any transport or decode failure reads as
    /// unhealthy rather than an error.
    pub async fn health(&self) -> bool {
        let response = match self.http().get(self.endpoint("/api/health")).send().await {
            Ok(response) => response,
            Err(_) => return false,
        };
        match response.json::<HealthEnvelope>().await {
            Ok(envelope) => envelope.status == "healthy",
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_message_decodes_with_sources() {
        let json = r#"{
            "role": "assistant",
            "content": "answer",
            "created_at": "2026-01-01T00:00:00Z",
            "sources": {
                "count": 1,
                "items": [{"type":"page","url":"https://a","title":"A","score":0.4}],
                "searchTimeMs": 8
            }
        }"#;
        let message: HistoryMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.role, Role::Assistant);
        let sources = message.sources.unwrap();
        assert_eq!(sources.search_time_ms, 8);
        assert_eq!(sources.items[0].title, "A");
    }

    #[test]
    fn history_message_sources_default_to_none() {
        let json = r#"{"role":"user","content":"q","created_at":"2026-01-01T00:00:00Z"}"#;
        let message: HistoryMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.sources, None);
    }
}
