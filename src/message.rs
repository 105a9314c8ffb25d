//! Chat turns and the append-only message log

use std::collections::HashSet;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of generated message ids
const ID_LEN: usize = 7;

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Seed context, never triggers a reaction
    System,
    /// Transcribed user speech
    Human,
    /// Model reply; `function` output is folded in here
    #[serde(alias = "function")]
    Ai,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a message with a freshly generated id
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
        }
    }
}

/// Ordered, append-only sequence of chat turns
///
/// Entries are never reordered or edited. `version` increments on every
/// append so observers can tell log states apart.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    ids: HashSet<String>,
    version: u64,
}

impl MessageLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new turn and return it
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Message {
        let mut message = Message::new(role, content);
        self.push(&mut message);
        message
    }

    /// Append `message`, regenerating its id first if the log already holds it
    pub fn push(&mut self, message: &mut Message) {
        while self.ids.contains(&message.id) {
            message.id = generate_id();
        }

        self.ids.insert(message.id.clone());
        self.messages.push(message.clone());
        self.version += 1;
    }

    /// Newest entry
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// All entries, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Entries in display order (most recent first)
    pub fn iter_recent_first(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().rev()
    }

    /// Render the log as `role: content` lines, most recent first
    #[must_use]
    pub fn transcript(&self) -> String {
        self.iter_recent_first()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}

/// Generate a short alphanumeric id
fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_unique_ids() {
        let mut log = MessageLog::new();
        for i in 0..500 {
            log.append(Role::Human, format!("turn {i}"));
        }

        let ids: HashSet<_> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 500);
        assert!(log.messages().iter().all(|m| m.id.len() == ID_LEN));
    }

    #[test]
    fn append_bumps_version_and_keeps_order() {
        let mut log = MessageLog::new();
        assert!(log.is_empty());
        assert_eq!(log.version(), 0);

        log.append(Role::Human, "hello");
        log.append(Role::Ai, "hi there");

        assert_eq!(log.version(), 2);
        assert_eq!(log.last().map(|m| m.role), Some(Role::Ai));

        let recent: Vec<_> = log.iter_recent_first().map(|m| m.content.as_str()).collect();
        assert_eq!(recent, ["hi there", "hello"]);
    }

    #[test]
    fn transcript_lists_newest_first() {
        let mut log = MessageLog::new();
        assert_eq!(log.transcript(), "");

        log.append(Role::System, "be brief");
        log.append(Role::Human, "hello");
        log.append(Role::Ai, "hi there");

        assert_eq!(log.transcript(), "ai: hi there\nhuman: hello\nsystem: be brief");
    }

    #[test]
    fn push_regenerates_colliding_id() {
        let mut log = MessageLog::new();
        let first = log.append(Role::Human, "one");

        let mut duplicate = Message {
            id: first.id.clone(),
            role: Role::Ai,
            content: "two".to_string(),
        };
        log.push(&mut duplicate);

        assert_ne!(duplicate.id, first.id);
        assert_eq!(log.last(), Some(&duplicate));
    }

    #[test]
    fn role_wire_format() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"abc","role":"human","content":"hey"}"#).unwrap();
        assert_eq!(msg.role, Role::Human);

        let json = serde_json::to_value(Message {
            id: "x".to_string(),
            role: Role::Ai,
            content: "yo".to_string(),
        })
        .unwrap();
        assert_eq!(json["role"], "ai");
    }

    #[test]
    fn function_role_is_read_as_ai() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"f1","role":"function","content":"42"}"#).unwrap();
        assert_eq!(msg.role, Role::Ai);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let res: std::result::Result<Message, _> =
            serde_json::from_str(r#"{"id":"u","role":"tool","content":""}"#);
        assert!(res.is_err());
    }
}
