//! QA-side entities (§3): `Conversation` owns an ordered sequence of
//! `Message`s; each message may carry chunk citations.
//!
//! New entities grounded in the sibling repo's `agent::message` chat
//! message shapes (`role`, `content`) generalized with the citation
//! list the QA Orchestrator (§4.I) requires.

use serde::{Deserialize, Serialize};

/// Speaker of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human asking questions.
    User,
    /// The QA Orchestrator's answer.
    Assistant,
}

/// A chunk reference supporting a claim in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// The cited chunk's id.
    pub chunk_id: i64,
    /// The chunk's retrieval score at the time of citation.
    pub score: f32,
}

/// One turn in a [`Conversation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Database identity, `None` until persisted.
    pub id: Option<i64>,
    /// Owning conversation id.
    pub conversation_id: String,
    /// Speaker.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Supporting chunk citations, empty for user messages.
    pub citations: Vec<Citation>,
    /// Creation timestamp, Unix seconds.
    pub created_at: i64,
}

/// An ordered sequence of question/answer turns scoped to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque, unique identity.
    pub conversation_id: String,
    /// Scoping project id.
    pub project_id: String,
    /// Creation timestamp, Unix seconds.
    pub created_at: i64,
}

impl Conversation {
    /// Creates a new, empty conversation.
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, project_id: impl Into<String>, now: i64) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            project_id: project_id.into(),
            created_at: now,
        }
    }
}

impl Message {
    /// Creates a user message with no citations.
    #[must_use]
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>, now: i64) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            citations: Vec::new(),
            created_at: now,
        }
    }

    /// Creates an assistant message with the given citations.
    #[must_use]
    pub fn assistant(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        citations: Vec<Citation>,
        now: i64,
    ) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: content.into(),
            citations,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_has_no_citations() {
        let msg = Message::user("c1", "what is X?", 0);
        assert_eq!(msg.role, Role::User);
        assert!(msg.citations.is_empty());
    }

    #[test]
    fn assistant_message_carries_citations() {
        let citations = vec![Citation {
            chunk_id: 42,
            score: 0.9,
        }];
        let msg = Message::assistant("c1", "X is defined as...", citations.clone(), 1);
        assert_eq!(msg.citations.len(), 1);
        assert_eq!(msg.citations[0].chunk_id, 42);
    }
}
