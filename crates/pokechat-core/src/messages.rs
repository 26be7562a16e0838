use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

/// One entry of a conversation history. Never mutated once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Content of the most recent user message, if any.
pub fn latest_user_content(history: &[Message]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_chat_request() {
        let msg = Message {
            id: MessageId::from_raw("m1"),
            role: Role::User,
            content: "show me pikachu".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"id": "m1", "role": "user", "content": "show me pikachu"}));
    }

    #[test]
    fn all_roles_parse() {
        for (raw, role) in [
            ("user", Role::User),
            ("assistant", Role::Assistant),
            ("system", Role::System),
            ("tool", Role::Tool),
        ] {
            let parsed: Role = serde_json::from_str(&format!("\"{raw}\"")).unwrap();
            assert_eq!(parsed, role);
            assert_eq!(parsed.as_str(), raw);
        }
    }

    #[test]
    fn unknown_role_rejected() {
        let res = serde_json::from_str::<Message>(r#"{"id":"x","role":"robot","content":"hi"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn latest_user_content_skips_assistant_turns() {
        let history = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
            Message::assistant("another reply"),
        ];
        assert_eq!(latest_user_content(&history), Some("second"));
        assert_eq!(latest_user_content(&[]), None);
    }
}
